// Generation request and result types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::EngineError;

/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 8192;
/// Upper bound for a per-request `max_tokens` override.
pub const MAX_TOKENS_LIMIT: u32 = 2048;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// A text completion request as received on `POST /generate`.
///
/// Unset overrides are filled from configuration by the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Check field bounds before anything reaches the model.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.prompt.is_empty() {
            return Err(EngineError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }

        let prompt_chars = self.prompt.chars().count();
        if prompt_chars > MAX_PROMPT_CHARS {
            return Err(EngineError::InvalidRequest(format!(
                "prompt is {prompt_chars} characters, limit is {MAX_PROMPT_CHARS}"
            )));
        }

        if let Some(max_tokens) = self.max_tokens {
            if !(1..=MAX_TOKENS_LIMIT).contains(&max_tokens) {
                return Err(EngineError::InvalidRequest(format!(
                    "max_tokens must be between 1 and {MAX_TOKENS_LIMIT}, got {max_tokens}"
                )));
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
                return Err(EngineError::InvalidRequest(format!(
                    "temperature must be between 0.0 and {MAX_TEMPERATURE}, got {temperature}"
                )));
            }
        }

        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(EngineError::InvalidRequest(format!(
                    "top_p must be between 0.0 and 1.0, got {top_p}"
                )));
            }
        }

        Ok(())
    }
}

/// Outcome of one completed generation. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    text: String,
    tokens_used: u64,
    processing_time: Duration,
    model: String,
}

impl InferenceResult {
    pub fn new(
        text: impl Into<String>,
        tokens_used: u64,
        processing_time: Duration,
        model: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            tokens_used,
            processing_time,
            model: model.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn processing_time(&self) -> Duration {
        self.processing_time
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

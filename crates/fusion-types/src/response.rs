// JSON bodies returned by the HTTP surface

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::request::InferenceResult;

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub status: String,
    pub timestamp: DateTime<Local>,
}

impl ServiceInfo {
    pub fn running(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            status: "running".to_string(),
            timestamp: Local::now(),
        }
    }
}

/// Body of a successful `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub id: String,
    pub text: String,
    pub model: String,
    pub tokens_used: u64,
    /// Seconds.
    pub processing_time: f64,
    pub timestamp: DateTime<Local>,
}

impl GenerateResponse {
    pub fn from_result(id: impl Into<String>, result: &InferenceResult) -> Self {
        Self {
            id: id.into(),
            text: result.text().to_string(),
            model: result.model().to_string(),
            tokens_used: result.tokens_used(),
            processing_time: result.processing_time().as_secs_f64(),
            timestamp: Local::now(),
        }
    }
}

/// Body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            error: error.into(),
            detail,
            timestamp: Local::now(),
        }
    }
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        ErrorBody::new(err.label(), Some(err.to_string()))
    }
}

use std::time::Duration;

use thiserror::Error;

use crate::status::ModelPhase;

/// Every failure the engine reports, from startup gating down to a single
/// generate call.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Insufficient system resources: {available_gb:.2}GB available, {required_gb:.1}GB required")]
    InsufficientResources { available_gb: f64, required_gb: f64 },

    #[error("Failed to load model: {0}")]
    ModelLoadFailed(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Text generation failed: {0}")]
    GenerationFailed(String),

    #[error("Generation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Server busy: {limit} requests already in flight")]
    Busy { limit: usize },

    #[error("Cannot {action} while model is {from}")]
    InvalidTransition {
        action: &'static str,
        from: ModelPhase,
    },

    #[error("Model worker has stopped")]
    WorkerStopped,
}

impl EngineError {
    /// Short human-readable category, used as the `error` field of error bodies.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InsufficientResources { .. } => "Insufficient system resources",
            EngineError::ModelLoadFailed(_) => "Failed to load model",
            EngineError::ModelNotLoaded => "Model not loaded",
            EngineError::InvalidRequest(_) => "Invalid request",
            EngineError::GenerationFailed(_) => "Text generation failed",
            EngineError::Timeout(_) => "Request timed out",
            EngineError::Busy { .. } => "Server busy",
            EngineError::InvalidTransition { .. } => "Invalid model state transition",
            EngineError::WorkerStopped => "Internal server error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = EngineError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Generation timed out after 30.0s");
    }

    #[test]
    fn test_transition_message() {
        let err = EngineError::InvalidTransition {
            action: "load",
            from: ModelPhase::Loaded,
        };
        assert_eq!(err.to_string(), "Cannot load while model is loaded");
    }

    #[test]
    fn test_generation_failure_keeps_cause() {
        let err = EngineError::GenerationFailed("decode failed".to_string());
        assert!(err.to_string().contains("decode failed"));
        assert_eq!(err.label(), "Text generation failed");
    }
}

// Model lifecycle state as seen from outside the lifecycle manager

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of the single model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPhase {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

impl fmt::Display for ModelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelPhase::Unloaded => "unloaded",
            ModelPhase::Loading => "loading",
            ModelPhase::Loaded => "loaded",
            ModelPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Read-only view of the model state, served by `/model/info` and nested in
/// the health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub is_loaded: bool,
    pub state: ModelPhase,
    pub model_path: Option<String>,
    /// Seconds spent in the last successful load.
    pub load_time: Option<f64>,
    pub inference_count: u64,
    pub context_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelStatus {
    pub fn unloaded() -> Self {
        Self {
            is_loaded: false,
            state: ModelPhase::Unloaded,
            model_path: None,
            load_time: None,
            inference_count: 0,
            context_length: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_uses_snake_case_fields() {
        let status = ModelStatus {
            is_loaded: true,
            state: ModelPhase::Loaded,
            model_path: Some("./models/phi.gguf".to_string()),
            load_time: Some(1.5),
            inference_count: 3,
            context_length: Some(4096),
            error: None,
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["is_loaded"], true);
        assert_eq!(json["state"], "loaded");
        assert_eq!(json["inference_count"], 3);
        assert_eq!(json["context_length"], 4096);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_status_carries_error() {
        let status = ModelStatus {
            state: ModelPhase::Failed,
            error: Some("file not found".to_string()),
            ..ModelStatus::unloaded()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error"], "file not found");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ModelPhase::Loading.to_string(), "loading");
        assert_eq!(ModelPhase::default(), ModelPhase::Unloaded);
    }
}

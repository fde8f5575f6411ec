// Web server modules for the inference service

pub mod app_state;
pub mod chat;
pub mod config;
#[cfg(feature = "llama")]
pub mod llama_backend;
pub mod logger;
#[cfg(any(test, feature = "mock"))]
pub mod mock_backend;
pub mod model_manager;
pub mod models;
pub mod request_parsing;
pub mod resource_gate;
pub mod response_helpers;
pub mod routes;
pub mod server;

// Re-export commonly used types
pub use app_state::{AppState, SharedAppState};
pub use chat::{InferenceExecutor, PromptTemplate};
pub use config::{ServerConfig, SystemMode};
pub use model_manager::{ModelLifecycleManager, SharedModelManager};
pub use models::{LanguageModel, ModelLoader};
pub use resource_gate::ResourceGate;

// Shared state handed to every request handler

use std::sync::Arc;

use super::chat::InferenceExecutor;
use super::config::ServerConfig;
use super::model_manager::{ModelLifecycleManager, SharedModelManager};
use super::models::ModelLoader;
use super::resource_gate::ResourceGate;

// Commands queued ahead of the model worker before callers wait
const MODEL_QUEUE_CAPACITY: usize = 32;

pub struct AppState {
    pub config: ServerConfig,
    pub manager: SharedModelManager,
    pub executor: InferenceExecutor,
    pub gate: ResourceGate,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    /// Spawns the model worker, so this must run inside a tokio runtime.
    /// Nothing is loaded yet.
    pub fn new(config: ServerConfig, gate: ResourceGate, loader: Arc<dyn ModelLoader>) -> Self {
        let capacity = MODEL_QUEUE_CAPACITY.max(config.max_concurrent_requests.get() + 4);
        let manager = Arc::new(ModelLifecycleManager::spawn(loader, capacity));
        let executor = InferenceExecutor::new(manager.clone(), config.executor_settings());
        Self {
            config,
            manager,
            executor,
            gate,
        }
    }

    /// Indent JSON and echo request bodies in development mode.
    pub fn pretty(&self) -> bool {
        self.config.is_development()
    }
}

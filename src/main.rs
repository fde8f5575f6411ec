// Neural Stream Fusion Engine server binary

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info};

use neural_stream_fusion::web::logger::init_logging;
use neural_stream_fusion::web::server::serve;
use neural_stream_fusion::web::{AppState, ModelLoader, ResourceGate, ServerConfig};

#[cfg(feature = "llama")]
fn build_loader(config: &ServerConfig) -> anyhow::Result<Arc<dyn ModelLoader>> {
    use neural_stream_fusion::web::llama_backend::LlamaLoader;

    let loader = LlamaLoader::new(config.llama_options()).map_err(anyhow::Error::msg)?;
    Ok(Arc::new(loader))
}

#[cfg(all(feature = "mock", not(feature = "llama")))]
fn build_loader(_config: &ServerConfig) -> anyhow::Result<Arc<dyn ModelLoader>> {
    use neural_stream_fusion::web::mock_backend::MockLoader;

    log::warn!("Running with the scripted mock model; no weights are loaded");
    Ok(Arc::new(MockLoader::canned()))
}

#[cfg(not(any(feature = "llama", feature = "mock")))]
fn build_loader(_config: &ServerConfig) -> anyhow::Result<Arc<dyn ModelLoader>> {
    bail!("no model backend compiled in; rebuild with --features llama (or mock)")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to set up logging: {e}");
    }

    info!(
        "Starting Neural Stream Fusion Engine v{} ({:?} mode)",
        env!("CARGO_PKG_VERSION"),
        config.system_mode
    );

    let gate = ResourceGate::new();
    gate.ensure_startup_resources()
        .context("startup resource check failed")?;

    let loader = build_loader(&config)?;
    let model_path = config.model_path.clone();
    let context_length = config.context_length;
    let state = Arc::new(AppState::new(config, gate, loader));

    if let Err(e) = state.manager.load(model_path, context_length).await {
        error!("Initial model load failed: {e}");
        state.manager.shutdown().await;
        bail!(e);
    }

    let served = serve(state.clone()).await;

    info!("Releasing model");
    state.manager.shutdown().await;

    served.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}

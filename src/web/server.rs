// HTTP server bootstrap

use std::convert::Infallible;

use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use log::{info, warn};

use super::app_state::SharedAppState;
use super::routes::handle_request;

const ENDPOINTS: &[(&str, &str)] = &[
    ("GET  /", "Service info"),
    ("GET  /health", "Host and model health"),
    ("POST /generate", "Generate a completion"),
    ("GET  /model/info", "Model lifecycle status"),
    ("POST /model/load", "Load a model"),
    ("POST /model/unload", "Unload the current model"),
];

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {e}");
        // Without a signal handler, run until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

/// Serve until ctrl-c. In-flight requests finish before this returns.
pub async fn serve(state: SharedAppState) -> Result<(), hyper::Error> {
    let addr = state.config.bind_addr();

    let make_svc = make_service_fn({
        let state = state.clone();
        move |_conn| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
            }
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);

    info!("Neural Stream Fusion Engine listening on http://{addr}");
    info!("Available endpoints:");
    for (route, description) in ENDPOINTS {
        info!("  {route:<20} - {description}");
    }

    server.with_graceful_shutdown(shutdown_signal()).await
}

// Route handler modules and the request dispatcher

pub mod generate;
pub mod health;
pub mod model;
pub mod root;

use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{debug, error};

use super::app_state::SharedAppState;
use super::response_helpers::{cors_preflight, json_error};

/// Entry point for every connection's requests. A panic anywhere below is
/// turned into a 500 instead of tearing down the connection.
pub async fn handle_request(
    req: Request<Body>,
    state: SharedAppState,
) -> Result<Response<Body>, Infallible> {
    let pretty = state.pretty();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match AssertUnwindSafe(dispatch(req, state)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Handler panicked on {method} {path}: {message}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                Some(message),
                pretty,
            )
        }
    };

    debug!("{method} {path} -> {}", response.status().as_u16());
    Ok(response)
}

async fn dispatch(req: Request<Body>, state: SharedAppState) -> Response<Body> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => root::handle(&state),
        (&Method::GET, "/health") => health::handle(&state).await,
        (&Method::POST, "/generate") => generate::handle(req, &state).await,
        (&Method::GET, "/model/info") => model::handle_info(&state),
        (&Method::POST, "/model/load") => model::handle_load(req, &state).await,
        (&Method::POST, "/model/unload") => model::handle_unload(&state).await,
        (&Method::OPTIONS, _) => cors_preflight(),
        (method, path) => json_error(
            StatusCode::NOT_FOUND,
            "Not found",
            Some(format!("No route for {method} {path}")),
            state.pretty(),
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::web::mock_backend::MockLoader;

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(boxed.as_ref()), "owned boom");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = state_with(MockLoader::canned(), &[]);
        let response = call(&state, request(Method::GET, "/nope", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let json = body_json(response).await;
        assert_eq!(json["error"], "Not found");
        assert!(json["detail"].as_str().unwrap().contains("/nope"));
    }

    #[tokio::test]
    async fn test_wrong_method_is_404() {
        let state = state_with(MockLoader::canned(), &[]);
        let response = call(&state, request(Method::GET, "/generate", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preflight() {
        let state = state_with(MockLoader::canned(), &[]);
        let response = call(&state, request(Method::OPTIONS, "/generate", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}

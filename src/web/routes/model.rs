// Model route handlers

use std::path::PathBuf;

use hyper::{Body, Request, Response, StatusCode};
use log::info;
use serde::Deserialize;

use fusion_types::EngineError;

use crate::web::app_state::AppState;
use crate::web::request_parsing::parse_optional_json_body;
use crate::web::response_helpers::{error_response, json_response};

/// Body of `POST /model/load`. Missing fields fall back to the configured model.
#[derive(Debug, Default, Deserialize)]
pub struct ModelLoadRequest {
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub context_length: Option<u32>,
}

pub fn handle_info(state: &AppState) -> Response<Body> {
    json_response(StatusCode::OK, &state.manager.status(), state.pretty())
}

pub async fn handle_load(req: Request<Body>, state: &AppState) -> Response<Body> {
    let pretty = state.pretty();
    let log_body = state.config.is_development();
    let body: ModelLoadRequest =
        match parse_optional_json_body(req.into_body(), log_body, pretty).await {
            Ok(body) => body,
            Err(response) => return response,
        };

    if body.context_length == Some(0) {
        let err = EngineError::InvalidRequest("context_length must be positive".to_string());
        return error_response(&err, pretty);
    }

    let path = body
        .model_path
        .unwrap_or_else(|| state.config.model_path.clone());
    let context_length = body.context_length.unwrap_or(state.config.context_length);

    info!("Load requested: {} (context {context_length})", path.display());
    match state.manager.load(path, context_length).await {
        Ok(_) => json_response(StatusCode::OK, &state.manager.status(), pretty),
        Err(e) => error_response(&e, pretty),
    }
}

pub async fn handle_unload(state: &AppState) -> Response<Body> {
    match state.manager.unload().await {
        Ok(()) => json_response(StatusCode::OK, &state.manager.status(), state.pretty()),
        Err(e) => error_response(&e, state.pretty()),
    }
}

// Text generation route handler

use hyper::{Body, Request, Response, StatusCode};
use log::{info, warn};
use uuid::Uuid;

use fusion_types::{GenerateResponse, InferenceRequest};

use crate::web::app_state::AppState;
use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{error_response, json_response};

const PROMPT_PREVIEW_CHARS: usize = 50;

fn preview(prompt: &str) -> String {
    let mut chars = prompt.chars();
    let head: String = chars.by_ref().take(PROMPT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

pub async fn handle(req: Request<Body>, state: &AppState) -> Response<Body> {
    let pretty = state.pretty();
    let request: InferenceRequest =
        match parse_json_body(req.into_body(), state.config.is_development(), pretty).await {
            Ok(request) => request,
            Err(response) => return response,
        };

    let id = Uuid::new_v4().to_string();
    if state.config.is_development() {
        info!("[{id}] Generate: {:?}", preview(&request.prompt));
    } else {
        info!(
            "[{id}] Generate: {} prompt chars",
            request.prompt.chars().count()
        );
    }

    match state.executor.generate(&request).await {
        Ok(result) => {
            info!(
                "[{id}] Completed in {:.2}s, {} tokens",
                result.processing_time().as_secs_f64(),
                result.tokens_used()
            );
            json_response(
                StatusCode::OK,
                &GenerateResponse::from_result(id, &result),
                pretty,
            )
        }
        Err(e) => {
            warn!("[{id}] Generate failed: {e}");
            error_response(&e, pretty)
        }
    }
}

// Request parsing utilities for HTTP handlers

use hyper::{Body, Response, StatusCode};
use log::{debug, warn};
use serde::de::DeserializeOwned;

use super::response_helpers::json_error;

/// Parse a JSON request body into a typed structure.
///
/// Returns the deserialized value on success, or a ready 400 response on
/// failure. `log_body` echoes the raw body at debug level and is only set in
/// development mode.
pub async fn parse_json_body<T: DeserializeOwned>(
    body: Body,
    log_body: bool,
    pretty: bool,
) -> Result<T, Response<Body>> {
    let body_bytes = hyper::body::to_bytes(body).await.map_err(|e| {
        warn!("Failed to read request body: {e}");
        json_error(StatusCode::BAD_REQUEST, "Failed to read request body", None, pretty)
    })?;

    if log_body {
        if let Ok(body_str) = std::str::from_utf8(&body_bytes) {
            debug!("Request body: {body_str}");
        }
    }

    serde_json::from_slice::<T>(&body_bytes).map_err(|e| {
        warn!("JSON parsing error: {e}");
        json_error(
            StatusCode::BAD_REQUEST,
            "Invalid JSON format",
            Some(e.to_string()),
            pretty,
        )
    })
}

/// Like [`parse_json_body`], but an empty body yields `T::default()`.
pub async fn parse_optional_json_body<T: DeserializeOwned + Default>(
    body: Body,
    log_body: bool,
    pretty: bool,
) -> Result<T, Response<Body>> {
    let body_bytes = hyper::body::to_bytes(body).await.map_err(|e| {
        warn!("Failed to read request body: {e}");
        json_error(StatusCode::BAD_REQUEST, "Failed to read request body", None, pretty)
    })?;

    if body_bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    parse_json_body(Body::from(body_bytes), log_body, pretty).await
}

// HTTP response helper functions shared by every route handler

use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::{Body, Response, StatusCode};
use serde::Serialize;

use fusion_types::{EngineError, ErrorBody};

/// Standard CORS headers
const CORS_ORIGIN: &str = "*";
const CORS_METHODS: &str = "GET, POST, OPTIONS";
const CORS_HEADERS: &str = "content-type, authorization";

fn with_cors(status: StatusCode, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(CORS_ORIGIN));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(CORS_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(CORS_HEADERS));
    response
}

/// Build a JSON response with CORS headers. `pretty` indents the body.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T, pretty: bool) -> Response<Body> {
    let json = if pretty {
        serde_json::to_string_pretty(body)
    } else {
        serde_json::to_string(body)
    }
    .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());

    let mut response = with_cors(status, Body::from(json));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Build a JSON error response
pub fn json_error(
    status: StatusCode,
    error: &str,
    detail: Option<String>,
    pretty: bool,
) -> Response<Body> {
    json_response(status, &ErrorBody::new(error, detail), pretty)
}

pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Busy { .. } => StatusCode::TOO_MANY_REQUESTS,
        EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render an engine error with its mapped status code
pub fn error_response(err: &EngineError, pretty: bool) -> Response<Body> {
    json_response(status_for(err), &ErrorBody::from(err), pretty)
}

/// CORS preflight response
pub fn cors_preflight() -> Response<Body> {
    with_cors(StatusCode::OK, Body::empty())
}

// Service banner

use hyper::{Body, Response, StatusCode};

use fusion_types::ServiceInfo;

use crate::web::app_state::AppState;
use crate::web::response_helpers::json_response;

pub const SERVICE_NAME: &str = "Neural Stream Fusion Engine";

pub fn handle(state: &AppState) -> Response<Body> {
    let info = ServiceInfo::running(SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    json_response(StatusCode::OK, &info, state.pretty())
}

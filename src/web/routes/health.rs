// Health check route handler

use hyper::{Body, Response, StatusCode};

use crate::web::app_state::AppState;
use crate::web::response_helpers::json_response;

/// Always 200; a stressed host is reported as `"warning"` in the body.
pub async fn handle(state: &AppState) -> Response<Body> {
    let snapshot = state.gate.snapshot(state.manager.status()).await;
    json_response(StatusCode::OK, &snapshot, state.pretty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::mock_backend::MockLoader;
    use crate::web::routes::test_support::*;
    use hyper::Method;

    #[tokio::test]
    async fn test_health_with_model_loaded() {
        let state = loaded_state(MockLoader::canned()).await;
        let response = call(&state, request(Method::GET, "/health", "")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let status = json["status"].as_str().unwrap();
        assert!(status == "healthy" || status == "warning");
        assert_eq!(json["model_loaded"], true);
        assert_eq!(json["model_info"]["state"], "loaded");
        assert!(json["memory_usage"]["total_gb"].as_f64().unwrap() > 0.0);
        assert!(json["cpu_usage"].is_number());
        assert!(json["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_health_without_model() {
        let state = state_with(MockLoader::canned(), &[]);
        let json = body_json(call(&state, request(Method::GET, "/health", "")).await).await;
        assert_eq!(json["model_loaded"], false);
        assert_eq!(json["model_info"]["state"], "unloaded");
    }
}

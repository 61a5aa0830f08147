//! Health and liveness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::{AppState, HTTP_CALL_SITE, MESSAGE_CALL_SITE};

/// Reports the components behind each call site and process uptime.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let http: Vec<&str> = state
        .http
        .as_deref()
        .map(|d| d.registry().names().collect())
        .unwrap_or_default();
    let message: Vec<&str> = state
        .message
        .as_deref()
        .map(|d| d.registry().names().collect())
        .unwrap_or_default();

    Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "fanout_timeout_ms": state.config.fanout_timeout_ms,
        "cancel_losers": state.config.cancel_losers,
        "call_sites": {
            HTTP_CALL_SITE: http,
            MESSAGE_CALL_SITE: message,
        },
    }))
}

/// Liveness probe: always 200 while the process is serving.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::test_support::{body_json, gateway};

    fn config() -> GatewayConfig {
        GatewayConfig {
            endpoints: vec![
                "zeta=http://127.0.0.1:1".parse().unwrap(),
                "alpha=http://127.0.0.1:2".parse().unwrap(),
            ],
            cancel_losers: true,
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn health_lists_components_per_call_site() {
        let response = gateway(config())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["call_sites"]["http"], json!(["alpha", "zeta"]));
        assert_eq!(body["call_sites"]["message"], json!([]));
        assert_eq!(body["cancel_losers"], true);
        assert_eq!(body["fanout_timeout_ms"], 30_000);
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);

        let response = gateway(config())
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

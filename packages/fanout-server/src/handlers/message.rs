//! `POST /message`: race a structured message across the message backends.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use fanout_core::{Context, Traced};
use serde_json::json;

use super::{AppState, GatewayError, MESSAGE_CALL_SITE};
use crate::message::Message;
use crate::observability::{record_dispatch, DispatchOutcome};
use crate::spans::{append_span_headers, span_views};

/// Answers with `{message, spans}` built from the first decodable reply.
///
/// # Errors
///
/// Returns [`GatewayError::BadRequest`] for an undecodable or unroutable message and
/// [`GatewayError::Dispatch`] when no backend replied in time.
pub async fn message_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    payload: Result<Json<Message>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Some(dispatcher) = state.message.as_deref() else {
        return Err(GatewayError::NotMounted {
            call_site: MESSAGE_CALL_SITE,
        });
    };

    let Json(message) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge
        } else {
            GatewayError::BadRequest(rejection.body_text())
        }
    })?;
    message.check().map_err(GatewayError::BadRequest)?;

    let started = Instant::now();
    let result = dispatcher.dispatch(&ctx, message).await;
    let spans = match &result {
        Ok(reply) => reply.spans.as_slice(),
        Err(err) => err.spans(),
    };
    record_dispatch(
        MESSAGE_CALL_SITE,
        DispatchOutcome::of(&result),
        started.elapsed(),
        spans,
    );

    let Traced {
        value: reply,
        spans,
    } = result?;
    let mut headers = HeaderMap::new();
    append_span_headers(&mut headers, &spans);
    let body = json!({
        "message": reply,
        "spans": span_views(&spans),
    });
    Ok((headers, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::test_support::{body_json, endpoint, gateway, spawn_backend};

    async fn echo_backend(delay: Duration, tag: &'static str) -> reqwest::Url {
        let url = spawn_backend(Router::new().route(
            "/inbox",
            post(move |Json(mut msg): Json<Message>| async move {
                tokio::time::sleep(delay).await;
                std::mem::swap(&mut msg.source, &mut msg.destination);
                msg.payload = json!({ "handled_by": tag });
                Json(msg)
            }),
        ))
        .await;
        url.join("inbox").unwrap()
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::post("/message")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn fastest_reply_wins_and_carries_spans() {
        let fast = echo_backend(Duration::from_millis(10), "fast").await;
        let slow = echo_backend(Duration::from_secs(5), "slow").await;
        let router = gateway(GatewayConfig {
            message_endpoints: vec![endpoint("fast", &fast), endpoint("slow", &slow)],
            ..GatewayConfig::default()
        });

        let response = router
            .oneshot(post_json(
                r#"{"source":"mac:1","destination":"event:x","payload":{"n":1}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"]["source"], "event:x");
        assert_eq!(body["message"]["destination"], "mac:1");
        assert_eq!(body["message"]["payload"]["handled_by"], "fast");
        let spans = body["spans"].as_array().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0]["name"], "fast");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let inbox = echo_backend(Duration::ZERO, "unused").await;
        let router = gateway(GatewayConfig {
            message_endpoints: vec![endpoint("m", &inbox)],
            ..GatewayConfig::default()
        });

        let response = router
            .clone()
            .oneshot(post_json("{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(post_json(r#"{"source":"","destination":"d"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "bad request: message source must not be empty"
        );
    }

    #[tokio::test]
    async fn unmounted_call_site_reports_not_found() {
        let state = AppState {
            http: None,
            message: None,
            config: std::sync::Arc::new(GatewayConfig::default()),
            start_time: Instant::now(),
        };
        let err = message_handler(
            State(state),
            Extension(Context::background()),
            Ok(Json(Message {
                source: "a".into(),
                destination: "b".into(),
                transaction_uuid: uuid::Uuid::new_v4(),
                content_type: "application/json".into(),
                payload: serde_json::Value::Null,
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::NotMounted {
                call_site: MESSAGE_CALL_SITE
            }
        ));
    }
}

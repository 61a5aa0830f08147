//! Translation of gateway failures into HTTP responses.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fanout_core::DispatchError;
use serde_json::json;

use crate::endpoint::EndpointError;
use crate::spans::{append_span_headers, span_views};

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("the {call_site} call site has no backends")]
    NotMounted { call_site: &'static str },
    #[error(transparent)]
    Dispatch(#[from] DispatchError<EndpointError>),
}

impl GatewayError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotMounted { .. } => StatusCode::NOT_FOUND,
            Self::Dispatch(err) if err.is_cancelled() => StatusCode::GATEWAY_TIMEOUT,
            Self::Dispatch(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Dispatch(err) => {
                let mut headers = HeaderMap::new();
                append_span_headers(&mut headers, err.spans());
                let body = json!({
                    "error": err.to_string(),
                    "cause": err.cause_message(),
                    "spans": span_views(err.spans()),
                });
                (status, headers, Json(body)).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

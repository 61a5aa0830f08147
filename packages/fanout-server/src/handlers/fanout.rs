//! `ANY /fanout/{*path}`: replay the request against every HTTP backend.

use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use bytes::Bytes;
use fanout_core::Context;

use super::{AppState, GatewayError, HTTP_CALL_SITE};
use crate::endpoint::{GatewayRequest, GatewayResponse};
use crate::observability::{record_dispatch, DispatchOutcome};
use crate::spans::append_span_headers;

/// Route prefix stripped before the path is appended to each backend's base url.
pub const FANOUT_PREFIX: &str = "/fanout";

/// Races the inbound request across the HTTP backends and relays the first 2xx reply,
/// annotated with span headers.
///
/// # Errors
///
/// Returns [`GatewayError::Dispatch`] when no backend succeeded in time.
pub async fn fanout_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let Some(dispatcher) = state.http.as_deref() else {
        return Err(GatewayError::NotMounted {
            call_site: HTTP_CALL_SITE,
        });
    };

    let request = GatewayRequest {
        method,
        path_and_query: backend_path(&uri),
        headers,
        body,
    };

    let started = Instant::now();
    let result = dispatcher.dispatch(&ctx, request).await;
    let spans = match &result {
        Ok(response) => response.spans.as_slice(),
        Err(err) => err.spans(),
    };
    record_dispatch(
        HTTP_CALL_SITE,
        DispatchOutcome::of(&result),
        started.elapsed(),
        spans,
    );

    Ok(relay(result?))
}

/// The part of `uri` after [`FANOUT_PREFIX`], always starting with `/`.
fn backend_path(uri: &Uri) -> String {
    let full = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let rest = full.strip_prefix(FANOUT_PREFIX).unwrap_or(full);
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

fn relay(response: GatewayResponse) -> Response {
    let GatewayResponse {
        status,
        mut headers,
        body,
        spans,
    } = response;
    append_span_headers(&mut headers, &spans);
    (status, headers, body).into_response()
}

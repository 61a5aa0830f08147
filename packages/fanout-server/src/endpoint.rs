//! HTTP backends raced by the `/fanout` call site.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fanout_core::{Context, ContextError, MergeSpans, Operation, Span};
use http::header::{self, HeaderMap, HeaderName};
use http::{Method, StatusCode};
use reqwest::Url;

/// Why a single backend attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
    #[error("{url} sent an undecodable reply: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("cannot build target url from {base} and {path}: {reason}")]
    InvalidTarget {
        base: String,
        path: String,
        reason: String,
    },
    #[error("attempt abandoned: {0}")]
    Cancelled(#[from] ContextError),
}

/// Hop-by-hop and recomputed headers are never forwarded in either direction.
fn is_skipped(name: &HeaderName) -> bool {
    [
        header::CONNECTION,
        header::CONTENT_LENGTH,
        header::HOST,
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-connection"),
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ]
    .contains(name)
}

/// Copies `headers`, minus hop-by-hop ones.
#[must_use]
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_skipped(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// Inbound request as it is replayed against every backend.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    /// Path (with leading `/`) and optional query, relative to each backend's base url.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The winning backend's reply plus the spans of the fan-out that produced it.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub spans: Vec<Span>,
}

impl MergeSpans for GatewayResponse {
    fn merge_spans(mut self, spans: Vec<Span>) -> Self {
        self.spans.extend(spans);
        self
    }
}

// ---------------------------------------------------------------------------
// HttpEndpoint
// ---------------------------------------------------------------------------

/// Replays a [`GatewayRequest`] against one base url. Any 2xx reply is a success.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    base: Url,
    client: reqwest::Client,
}

impl HttpEndpoint {
    #[must_use]
    pub fn new(base: Url, client: reqwest::Client) -> Self {
        Self { base, client }
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Appends the path of `path_and_query` to the base url's path. A query on the
    /// base is kept ahead of the request's own query; any base fragment is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidTarget`] if the base url cannot take a path.
    pub fn target(&self, path_and_query: &str) -> Result<Url, EndpointError> {
        if self.base.cannot_be_a_base() {
            return Err(EndpointError::InvalidTarget {
                base: self.base.to_string(),
                path: path_and_query.to_string(),
                reason: "base url cannot carry a path".to_string(),
            });
        }

        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let query = match (self.base.query(), query) {
            (Some(base), Some(request)) => Some(format!("{base}&{request}")),
            (base, request) => base.or(request).map(str::to_string),
        };

        let mut url = self.base.clone();
        url.set_path(&format!("{}{path}", self.base.path().trim_end_matches('/')));
        url.set_query(query.as_deref().filter(|q| !q.is_empty()));
        url.set_fragment(None);
        Ok(url)
    }
}

#[async_trait]
impl Operation<GatewayRequest> for HttpEndpoint {
    type Response = GatewayResponse;
    type Error = EndpointError;

    async fn call(
        &self,
        ctx: Context,
        request: Arc<GatewayRequest>,
    ) -> Result<GatewayResponse, EndpointError> {
        let url = self.target(&request.path_and_query)?;
        let url_str = url.to_string();

        let send = self
            .client
            .request(request.method.clone(), url)
            .headers(forwardable_headers(&request.headers))
            .body(request.body.clone())
            .send();

        let response = tokio::select! {
            biased;
            cause = ctx.done() => return Err(cause.into()),
            result = send => result.map_err(|source| EndpointError::Transport {
                url: url_str.clone(),
                source,
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::Status {
                url: url_str,
                status,
            });
        }
        let headers = forwardable_headers(response.headers());

        let body = tokio::select! {
            biased;
            cause = ctx.done() => return Err(cause.into()),
            result = response.bytes() => result.map_err(|source| EndpointError::Transport {
                url: url_str,
                source,
            })?,
        };

        Ok(GatewayResponse {
            status,
            headers,
            body,
            spans: Vec::new(),
        })
    }
}

//! HTTP middleware stack for the gateway.
//!
//! Middleware ordering follows the outer-to-inner convention: the first layer
//! listed is the outermost (sees the request first and the response last).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use axum::http::header::HeaderName;
use axum::http::Request;
use fanout_core::Context;
use tower::{Layer, Service, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;

// ---------------------------------------------------------------------------
// FanoutDeadlineLayer
// ---------------------------------------------------------------------------

/// Tower layer that gives every request a fan-out [`Context`] bounded by `timeout`.
///
/// The context is inserted into the request extensions for handlers to extract, and
/// is cancelled once the response is produced or the request future is dropped
/// (client disconnect).
#[derive(Debug, Clone, Copy)]
pub struct FanoutDeadlineLayer {
    timeout: Duration,
}

impl FanoutDeadlineLayer {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for FanoutDeadlineLayer {
    type Service = FanoutDeadlineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FanoutDeadlineService {
            inner,
            timeout: self.timeout,
        }
    }
}

/// Service wrapper produced by [`FanoutDeadlineLayer`].
#[derive(Debug, Clone)]
pub struct FanoutDeadlineService<S> {
    inner: S,
    timeout: Duration,
}

impl<S, B> Service<Request<B>> for FanoutDeadlineService<S>
where
    S: Service<Request<B>> + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let (ctx, cancel) = Context::background().with_timeout(self.timeout);
        req.extensions_mut().insert(ctx);
        let guard = cancel.cancel_on_drop();

        let fut = self.inner.call(req);
        Box::pin(async move {
            let _guard = guard;
            fut.await
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP layers
// ---------------------------------------------------------------------------

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        FanoutDeadlineLayer,
        tower::layer::util::Stack<
            RequestBodyLimitLayer,
            tower::layer::util::Stack<
                TraceLayer<
                    tower_http::classify::SharedClassifier<
                        tower_http::classify::ServerErrorsAsFailures,
                    >,
                >,
                tower::layer::util::Stack<
                    SetRequestIdLayer<MakeRequestUuid>,
                    tower::layer::util::Identity,
                >,
            >,
        >,
    >,
>;

/// Builds the gateway's Tower middleware stack.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID v4 `X-Request-Id` unless the client sent one
/// 2. `Tracing` -- request/response trace spans
/// 3. `RequestBodyLimit` -- rejects bodies over `max_body_bytes` with 413
/// 4. `FanoutDeadline` -- attaches the per-request fan-out [`Context`]
/// 5. `PropagateRequestId` -- copies `X-Request-Id` onto the response
#[must_use]
pub fn build_http_layers(config: &GatewayConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(FanoutDeadlineLayer::new(config.fanout_timeout()))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use fanout_core::ContextError;
    use tokio::sync::oneshot;
    use tokio::time::Instant;
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn build_http_layers_does_not_panic_with_defaults() {
        let _layers = build_http_layers(&GatewayConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn inserts_context_with_deadline() {
        let svc = FanoutDeadlineLayer::new(Duration::from_millis(250)).layer(
            tower::service_fn(|req: Request<()>| async move {
                let ctx = req.extensions().get::<Context>().cloned();
                Ok::<_, Infallible>(ctx)
            }),
        );

        let before = Instant::now();
        let ctx = svc.oneshot(Request::new(())).await.unwrap().unwrap();

        assert_eq!(ctx.deadline(), Some(before + Duration::from_millis(250)));
        // The request has completed, so its context is released.
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn context_expires_while_handler_runs() {
        let svc = FanoutDeadlineLayer::new(Duration::from_millis(10)).layer(
            tower::service_fn(|req: Request<()>| async move {
                let ctx = req.extensions().get::<Context>().cloned().unwrap();
                Ok::<_, Infallible>(ctx.done().await)
            }),
        );

        let cause = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(cause, ContextError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn dropping_the_request_future_cancels_the_context() {
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let svc = FanoutDeadlineLayer::new(Duration::from_secs(60)).layer(
            tower::service_fn(move |req: Request<()>| {
                let ctx = req.extensions().get::<Context>().cloned().unwrap();
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(ctx);
                }
                async move {
                    std::future::pending::<()>().await;
                    Ok::<_, Infallible>(())
                }
            }),
        );

        let call = tokio::spawn(svc.oneshot(Request::new(())));
        let ctx = rx.await.unwrap();
        assert!(!ctx.is_done());

        call.abort();
        assert_eq!(ctx.done().await, ContextError::Canceled);
    }
}

//! Gateway module with deferred startup lifecycle.
//!
//! `new()` builds the dispatchers, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. Splitting
//! `start()` from `serve()` lets callers learn the bound port (port 0 in tests)
//! before traffic flows.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post};
use axum::Router;
use fanout_core::{ConstructionError, DispatchConfig, Dispatcher, MergeSpans, Operation, Registry};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{EndpointSpec, GatewayConfig};
use crate::endpoint::{EndpointError, HttpEndpoint};
use crate::handlers::{
    fanout_handler, health_handler, liveness_handler, message_handler, AppState,
};
use crate::message::MessageEndpoint;
use crate::middleware::build_http_layers;

/// Owns the gateway's dispatchers and HTTP server.
pub struct GatewayModule {
    config: Arc<GatewayConfig>,
    listener: Option<TcpListener>,
    state: AppState,
}

impl GatewayModule {
    /// Validates `config` and builds one dispatcher per call site that has backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a call site has duplicate
    /// component names, or the HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        let dispatch = DispatchConfig {
            cancel_losers: config.cancel_losers,
        };

        let http = build_dispatcher(&config.endpoints, &dispatch, |spec| {
            HttpEndpoint::new(spec.url.clone(), client.clone())
        })
        .context("invalid --endpoint set")?;
        let message = build_dispatcher(&config.message_endpoints, &dispatch, |spec| {
            MessageEndpoint::new(spec.url.clone(), client.clone())
        })
        .context("invalid --message-endpoint set")?;

        let config = Arc::new(config);
        let state = AppState {
            http: http.map(Arc::new),
            message: message.map(Arc::new),
            config: Arc::clone(&config),
            start_time: Instant::now(),
        };

        Ok(Self {
            config,
            listener: None,
            state,
        })
    }

    /// Assembles the axum router with all mounted routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- component names per call site, uptime
    /// - `GET /health/live` -- liveness probe
    /// - `ANY /fanout`, `ANY /fanout/{*path}` -- when HTTP backends are configured
    /// - `POST /message` -- when message backends are configured
    pub fn build_router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Binds the TCP listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .context("start() must be called before serve()")?;
        let router = build_router(self.state);

        info!("serving fan-out gateway");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("gateway stopped");
        Ok(())
    }
}

fn build_router(state: AppState) -> Router {
    let layers = build_http_layers(&state.config);
    let body_limit = DefaultBodyLimit::max(state.config.max_body_bytes);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler));
    if state.http.is_some() {
        router = router
            .route("/fanout", any(fanout_handler))
            .route("/fanout/{*path}", any(fanout_handler));
    }
    if state.message.is_some() {
        router = router.route("/message", post(message_handler));
    }

    router.layer(body_limit).layer(layers).with_state(state)
}

/// One dispatcher over `specs`, or `None` when the call site has no backends.
fn build_dispatcher<Req, Resp, O>(
    specs: &[EndpointSpec],
    config: &DispatchConfig,
    make: impl Fn(&EndpointSpec) -> O,
) -> Result<Option<Dispatcher<Req, Resp, EndpointError>>, ConstructionError>
where
    Req: Send + Sync + 'static,
    Resp: MergeSpans + Send + 'static,
    O: Operation<Req, Response = Resp, Error = EndpointError> + 'static,
{
    if specs.is_empty() {
        return Ok(None);
    }

    let registry = specs
        .iter()
        .fold(Registry::builder(), |builder, spec| {
            builder.component(spec.name.clone(), make(spec))
        })
        .build()?;
    info!(
        components = ?registry.names().collect::<Vec<_>>(),
        cancel_losers = config.cancel_losers,
        "fan-out registry built"
    );

    Ok(Some(Dispatcher::new(registry).with_config(config.clone())))
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}

//! Fan-out gateway: HTTP front end over [`fanout_core`].
//!
//! - [`config`]: flags and environment variables
//! - [`endpoint`]: HTTP backends for `ANY /fanout/*`
//! - [`message`]: structured message backends for `POST /message`
//! - [`handlers`]: axum handlers, shared state, error translation
//! - [`middleware`]: request ids, tracing, body limit, per-request fan-out deadline
//! - [`spans`]: span headers and JSON views
//! - [`observability`]: tracing subscriber, Prometheus recorder, dispatch metrics
//! - [`module`]: server lifecycle

pub mod config;
pub mod endpoint;
pub mod handlers;
pub mod message;
pub mod middleware;
pub mod module;
pub mod observability;
pub mod spans;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ConfigError, EndpointSpec, GatewayConfig, LogFormat};
pub use endpoint::{EndpointError, GatewayRequest, GatewayResponse, HttpEndpoint};
pub use handlers::{AppState, GatewayError};
pub use message::{Message, MessageEndpoint};
pub use middleware::{build_http_layers, FanoutDeadlineLayer};
pub use module::{shutdown_signal, GatewayModule};

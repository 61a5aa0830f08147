//! HTTP handlers for the gateway.
//!
//! Defines `AppState` (the shared state carried through axum extractors) and
//! re-exports every handler for router assembly.

pub mod error;
pub mod fanout;
pub mod health;
pub mod message;

pub use error::GatewayError;
pub use fanout::fanout_handler;
pub use health::{health_handler, liveness_handler};
pub use message::message_handler;

use std::sync::Arc;
use std::time::Instant;

use fanout_core::{Dispatcher, Traced};

use crate::config::GatewayConfig;
use crate::endpoint::{EndpointError, GatewayRequest, GatewayResponse};
use crate::message::Message;

/// Metric and log label of the `/fanout` call site.
pub const HTTP_CALL_SITE: &str = "http";
/// Metric and log label of the `/message` call site.
pub const MESSAGE_CALL_SITE: &str = "message";

pub type HttpDispatcher = Dispatcher<GatewayRequest, GatewayResponse, EndpointError>;
pub type MessageDispatcher = Dispatcher<Message, Traced<Message>, EndpointError>;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// A call site with no configured backends has no dispatcher and no route.
#[derive(Clone)]
pub struct AppState {
    pub http: Option<Arc<HttpDispatcher>>,
    pub message: Option<Arc<MessageDispatcher>>,
    pub config: Arc<GatewayConfig>,
    /// Process start time, used for uptime.
    pub start_time: Instant,
}

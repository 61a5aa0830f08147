//! Fan-out core: race N named operations and keep the first success, with a span per attempt.
//!
//! - [`context`]: cancellation scopes, deadlines, and the fanned-out request accessor
//! - [`span`]: per-attempt timing records and the [`Spanner`] that produces them
//! - [`merge`]: the [`MergeSpans`] capability responses implement to absorb spans
//! - [`registry`]: the [`Operation`] contract and the immutable component [`Registry`]
//! - [`dispatcher`]: the [`Dispatcher`] race loop
//! - [`error`]: construction and dispatch errors

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod merge;
pub mod registry;
pub mod span;

pub use context::{from_context, CancelHandle, Context, ContextError};
pub use dispatcher::{DispatchConfig, Dispatcher};
pub use error::{ConstructionError, DispatchError};
pub use merge::{MergeSpans, Traced};
pub use registry::{operation_fn, BoxedOperation, Operation, OperationFn, Registry, RegistryBuilder};
pub use span::{Clock, Span, SpanTimer, Spanner, SystemClock};

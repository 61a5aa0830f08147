//! The fan-out race: one task per component, first success wins.
//!
//! [`Dispatcher::dispatch`] spawns every registered operation onto the tokio runtime,
//! then waits on whichever happens first: an attempt finishing, or the caller's
//! [`Context`] ending. The first successful response is returned immediately with the
//! spans of every attempt observed so far folded in through [`MergeSpans`]. Attempts
//! still running at that point are left to finish on their own unless
//! [`DispatchConfig::cancel_losers`] is set.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info_span, Instrument};

use crate::context::{CancelHandle, Context, ContextError};
use crate::error::{ConstructionError, DispatchError};
use crate::merge::MergeSpans;
use crate::registry::{BoxedOperation, Registry};
use crate::span::{Span, Spanner};

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

/// Behavioural switches for a [`Dispatcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchConfig {
    /// When set, the context handed to attempts is cancelled and the remaining
    /// tasks are aborted as soon as the dispatch returns. Off by default: losing
    /// attempts keep running until they observe the caller's context themselves.
    pub cancel_losers: bool,
}

// ---------------------------------------------------------------------------
// Outcome / InFlight
// ---------------------------------------------------------------------------

/// Result of one attempt. The component name travels on the span.
struct Outcome<Resp, E> {
    span: Span,
    result: Result<Resp, E>,
}

/// Attempts spawned by one dispatch. Whatever is still running when this is dropped
/// is either detached or, with `cancel_losers`, cancelled and aborted.
struct InFlight<T: 'static> {
    set: JoinSet<T>,
    losers: Option<CancelHandle>,
}

impl<T: 'static> Drop for InFlight<T> {
    fn drop(&mut self) {
        match &self.losers {
            Some(losers) => {
                losers.cancel();
                self.set.abort_all();
            }
            None => self.set.detach_all(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Races every component of a [`Registry`] for each request.
///
/// Built once and reused across calls; `dispatch` takes `&self` and may run
/// concurrently from many tasks.
pub struct Dispatcher<Req, Resp, E> {
    registry: Registry<Req, Resp, E>,
    spanner: Spanner,
    config: DispatchConfig,
}

impl<Req, Resp, E> Dispatcher<Req, Resp, E>
where
    Req: Send + Sync + 'static,
    Resp: MergeSpans + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Creates a dispatcher with a system-clock [`Spanner`] and default config.
    #[must_use]
    pub fn new(registry: Registry<Req, Resp, E>) -> Self {
        Self {
            registry,
            spanner: Spanner::new(),
            config: DispatchConfig::default(),
        }
    }

    /// Builds the registry and dispatcher in one step.
    ///
    /// # Errors
    ///
    /// Propagates [`Registry::new`] validation failures.
    pub fn from_components<I, N>(components: I) -> Result<Self, ConstructionError>
    where
        I: IntoIterator<Item = (N, BoxedOperation<Req, Resp, E>)>,
        N: Into<String>,
    {
        Registry::new(components).map(Self::new)
    }

    #[must_use]
    pub fn with_spanner(mut self, spanner: Spanner) -> Self {
        self.spanner = spanner;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Registry<Req, Resp, E> {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Sends `request` to every component and resolves with the first success.
    ///
    /// Operations receive a context derived from `ctx` that also carries the request
    /// (see [`from_context`](crate::from_context)).
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Cancelled`] if `ctx` is done before any component succeeds,
    ///   with the spans observed up to that point.
    /// - [`DispatchError::AllFailed`] if every component fails, carrying the error that
    ///   arrived last and one span per component.
    ///
    /// # Panics
    ///
    /// Re-raises the panic of any operation whose attempt panicked before a winner
    /// was chosen.
    pub async fn dispatch(&self, ctx: &Context, request: Req) -> Result<Resp, DispatchError<E>> {
        let request = Arc::new(request);

        let (scope, losers) = if self.config.cancel_losers {
            let (scope, handle) = ctx.with_cancel();
            (scope, Some(handle))
        } else {
            (ctx.clone(), None)
        };
        let derived = scope.with_fanout_request(Arc::clone(&request));

        let mut in_flight = InFlight {
            set: JoinSet::new(),
            losers,
        };

        for (name, op) in self.registry.snapshot() {
            let ctx = derived.clone();
            let request = Arc::clone(&request);
            let spanner = self.spanner.clone();
            let attempt = info_span!("fanout_attempt", component = %name);

            in_flight.set.spawn(
                async move {
                    let timer = spanner.start(name.as_ref());
                    let result = op.call(ctx, request).await;
                    let span = timer.finish(result.as_ref().err());
                    Outcome { span, result }
                }
                .instrument(attempt),
            );
        }

        let mut spans = Vec::with_capacity(in_flight.set.len());
        let mut last_error = None;

        while !in_flight.set.is_empty() {
            let joined = tokio::select! {
                biased;
                cause = ctx.done() => return Err(DispatchError::Cancelled { cause, spans }),
                Some(joined) = in_flight.set.join_next() => joined,
            };

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                // Aborted by runtime shutdown; no outcome to record.
                Err(_) => continue,
            };

            spans.push(outcome.span);
            match outcome.result {
                Ok(response) => return Ok(response.merge_spans(spans)),
                Err(err) => last_error = Some(err),
            }
        }

        match last_error {
            Some(cause) => Err(DispatchError::AllFailed { cause, spans }),
            None => Err(DispatchError::Cancelled {
                cause: ContextError::Canceled,
                spans,
            }),
        }
    }
}

impl<Req, Resp, E> Clone for Dispatcher<Req, Resp, E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            spanner: self.spanner.clone(),
            config: self.config.clone(),
        }
    }
}

impl<Req, Resp, E> fmt::Debug for Dispatcher<Req, Resp, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

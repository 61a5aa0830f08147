//! Cancellation, deadlines, and the request currently being fanned out.
//!
//! A [`Context`] is cheap to clone and is handed to every [`Operation`](crate::Operation)
//! attempt. It answers two questions: "should this work stop?" ([`Context::done`],
//! [`Context::err`]) and "which request is this fan-out serving?" ([`from_context`]).
//!
//! Contexts form a tree. Cancelling a parent cancels every context derived from it;
//! a derived deadline is never later than its parent's.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Why a [`Context`] is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The context (or one of its ancestors) was cancelled explicitly.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Holder for the fanned-out request. The type is private so only this crate can
/// populate it; readers go through [`from_context`].
#[derive(Clone)]
struct FanoutRequest(Arc<dyn Any + Send + Sync>);

/// Cancellation scope with an optional deadline.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    fanout: Option<FanoutRequest>,
}

impl Context {
    /// Root context: never cancelled, no deadline, carries no request.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            fanout: None,
        }
    }

    /// Derives a child that can be cancelled independently of `self`.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let token = self.token.child_token();
        let child = Self {
            token: token.clone(),
            deadline: self.deadline,
            fanout: self.fanout.clone(),
        };
        (child, CancelHandle { token })
    }

    /// Derives a cancellable child that is also done at `deadline`, or at the
    /// parent's deadline if that comes first.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelHandle) {
        let (mut child, handle) = self.with_cancel();
        child.deadline = Some(self.deadline.map_or(deadline, |parent| parent.min(deadline)));
        (child, handle)
    }

    /// Shorthand for [`with_deadline`](Self::with_deadline) at `now + timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The instant at which this context expires, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, or `None` while it is still live.
    ///
    /// Explicit cancellation takes precedence over an expired deadline.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Non-blocking check equivalent to `self.err().is_some()`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    ///
    /// Cancel-safe; may be polled from `tokio::select!` repeatedly.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => ContextError::Canceled,
                () = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Canceled
            }
        }
    }

    /// Copy of `self` that carries `request` for [`from_context`].
    pub(crate) fn with_fanout_request<R>(&self, request: Arc<R>) -> Self
    where
        R: Any + Send + Sync,
    {
        Self {
            token: self.token.clone(),
            deadline: self.deadline,
            fanout: Some(FanoutRequest(request)),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("carries_request", &self.fanout.is_some())
            .finish()
    }
}

/// Cancels the [`Context`] it was returned with (and all of its descendants).
///
/// Dropping the handle does not cancel; use [`CancelHandle::cancel_on_drop`] for that.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancels the associated context. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) (or an ancestor's cancellation) has happened.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Converts the handle into a guard that cancels the context when dropped.
    #[must_use]
    pub fn cancel_on_drop(self) -> DropGuard {
        self.token.drop_guard()
    }
}

/// Returns the request currently being fanned out, if `ctx` was derived by a
/// [`Dispatcher`](crate::Dispatcher) for a request of type `R`.
///
/// Only meaningful inside the dynamic scope of one `dispatch` call.
#[must_use]
pub fn from_context<R>(ctx: &Context) -> Option<Arc<R>>
where
    R: Any + Send + Sync,
{
    let FanoutRequest(request) = ctx.fanout.as_ref()?;
    Arc::clone(request).downcast::<R>().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

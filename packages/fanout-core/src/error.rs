//! Errors raised when building a fan-out and when a dispatch produces no winner.

use std::fmt;

use crate::context::ContextError;
use crate::span::Span;

/// A fan-out was configured incorrectly. Detected at startup, never per call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    #[error("a fan-out requires at least one component")]
    NoComponents,
    #[error("component names must not be empty")]
    EmptyName,
    #[error("duplicate component name: {name}")]
    DuplicateComponent { name: String },
}

/// Why a dispatch produced no response. Both variants carry the spans observed
/// before the dispatch gave up, in completion order.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError<E> {
    /// The caller's context ended before any component succeeded.
    #[error("fan-out abandoned: {cause}")]
    Cancelled {
        #[source]
        cause: ContextError,
        spans: Vec<Span>,
    },
    /// Every component failed; `cause` is the error drained last.
    #[error("all {} components failed: {cause}", .spans.len())]
    AllFailed { cause: E, spans: Vec<Span> },
}

impl<E> DispatchError<E> {
    /// Spans of every attempt observed before the dispatch ended.
    #[must_use]
    pub fn spans(&self) -> &[Span] {
        match self {
            Self::Cancelled { spans, .. } | Self::AllFailed { spans, .. } => spans,
        }
    }

    #[must_use]
    pub fn into_spans(self) -> Vec<Span> {
        match self {
            Self::Cancelled { spans, .. } | Self::AllFailed { spans, .. } => spans,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The context error, if the dispatch was cancelled.
    #[must_use]
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            Self::Cancelled { cause, .. } => Some(*cause),
            Self::AllFailed { .. } => None,
        }
    }

    /// The last component error, if every component failed.
    #[must_use]
    pub fn component_error(&self) -> Option<&E> {
        match self {
            Self::AllFailed { cause, .. } => Some(cause),
            Self::Cancelled { .. } => None,
        }
    }
}

impl<E: fmt::Display> DispatchError<E> {
    /// The causal message alone, without the aggregate prefix.
    #[must_use]
    pub fn cause_message(&self) -> String {
        match self {
            Self::Cancelled { cause, .. } => cause.to_string(),
            Self::AllFailed { cause, .. } => cause.to_string(),
        }
    }
}

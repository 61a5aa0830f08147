//! The mergeable-response capability.
//!
//! On success the dispatcher hands every collected [`Span`] to the winning response
//! through [`MergeSpans::merge_spans`]. The default method ignores the spans, so a
//! response type that has no place to store them opts in with an empty impl and is
//! returned unchanged.

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// A response that can absorb the spans of a fan-out and return an augmented self.
pub trait MergeSpans: Sized {
    /// Folds `spans` into `self`. The default implementation discards them.
    #[must_use]
    fn merge_spans(self, spans: Vec<Span>) -> Self {
        let _ = spans;
        self
    }
}

macro_rules! pass_through {
    ($($ty:ty),* $(,)?) => {
        $(impl MergeSpans for $ty {})*
    };
}

pass_through!((), bool, String, Vec<u8>, u16, u32, u64, i32, i64);

impl<T: MergeSpans> MergeSpans for Box<T> {
    fn merge_spans(self, spans: Vec<Span>) -> Self {
        Box::new((*self).merge_spans(spans))
    }
}

/// Wraps any value together with the spans that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traced<T> {
    pub value: T,
    pub spans: Vec<Span>,
}

impl<T> Traced<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            spans: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> MergeSpans for Traced<T> {
    fn merge_spans(mut self, spans: Vec<Span>) -> Self {
        self.spans.extend(spans);
        self
    }
}

impl<T> From<T> for Traced<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

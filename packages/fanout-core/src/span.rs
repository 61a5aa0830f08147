//! Per-attempt timing and outcome records.
//!
//! A [`Spanner`] hands out [`SpanTimer`]s; finishing a timer consumes it and yields
//! an immutable [`Span`]. Because `finish` takes the timer by value, a span can only
//! be produced once per attempt.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Abstraction over wall-clock time so span timings can be controlled in tests.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// Default clock that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Immutable record of one attempt: what ran, when, for how long, and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    name: String,
    start: SystemTime,
    duration: Duration,
    error: Option<String>,
}

impl Span {
    /// Name of the component this span was recorded for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock time at which the attempt started.
    #[must_use]
    pub fn start(&self) -> SystemTime {
        self.start
    }

    /// How long the attempt ran.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Rendered terminal error, or `None` if the attempt succeeded.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Factory for [`SpanTimer`]s. Cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct Spanner {
    clock: Arc<dyn Clock>,
}

impl Spanner {
    /// Creates a spanner backed by [`SystemClock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a spanner backed by a custom clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Starts timing an attempt named `name`.
    #[must_use]
    pub fn start(&self, name: impl Into<String>) -> SpanTimer {
        SpanTimer {
            name: name.into(),
            start: self.clock.now(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl Default for Spanner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Spanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spanner").finish_non_exhaustive()
    }
}

/// An attempt in progress. Must be finished exactly once.
#[must_use = "a SpanTimer records nothing until it is finished"]
pub struct SpanTimer {
    name: String,
    start: SystemTime,
    clock: Arc<dyn Clock>,
}

impl SpanTimer {
    /// Stops the timer and records `err` (if any) as the attempt's terminal error.
    pub fn finish<E>(self, err: Option<&E>) -> Span
    where
        E: fmt::Display + ?Sized,
    {
        let duration = self
            .clock
            .now()
            .duration_since(self.start)
            .unwrap_or(Duration::ZERO);

        Span {
            name: self.name,
            start: self.start,
            duration,
            error: err.map(ToString::to_string),
        }
    }

    /// Stops the timer for a successful attempt.
    pub fn finish_ok(self) -> Span {
        self.finish::<str>(None)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SpanTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanTimer")
            .field("name", &self.name)
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

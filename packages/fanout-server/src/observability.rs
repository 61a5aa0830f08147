//! Tracing subscriber setup and the gateway's dispatch metrics.
//!
//! The dispatcher only reports spans; this module turns them into log events and
//! `metrics` facade records, labelled by call site.

use std::time::Duration;

use anyhow::{Context as _, Result};
use fanout_core::{DispatchError, Span};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level` when set.
///
/// # Errors
///
/// Returns an error if `default_level` is not a valid filter or a global
/// subscriber is already installed.
pub fn init_tracing(format: LogFormat, default_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid log level `{default_level}`"))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    }
    .context("failed to initialize tracing subscriber")?;

    tracing::info!(log_format = ?format, "tracing initialized");
    Ok(())
}

/// Installs the Prometheus recorder with an HTTP listener on `port`.
///
/// # Errors
///
/// Returns an error if the recorder or its listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("failed to install Prometheus recorder")?;

    tracing::info!(port, "prometheus metrics endpoint initialized");
    Ok(())
}

// ---------------------------------------------------------------------------
// Dispatch recording
// ---------------------------------------------------------------------------

/// Outcome label of a finished dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    AllFailed,
    Cancelled,
}

impl DispatchOutcome {
    #[must_use]
    pub fn of<T, E>(result: &Result<T, DispatchError<E>>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(DispatchError::AllFailed { .. }) => Self::AllFailed,
            Err(DispatchError::Cancelled { .. }) => Self::Cancelled,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::AllFailed => "all_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Logs and counts one finished dispatch and each of its component spans.
pub fn record_dispatch(
    call_site: &'static str,
    outcome: DispatchOutcome,
    elapsed: Duration,
    spans: &[Span],
) {
    let outcome_label = outcome.as_str();
    counter!("fanout_dispatch_total", "call_site" => call_site, "outcome" => outcome_label)
        .increment(1);
    histogram!(
        "fanout_dispatch_duration_seconds",
        "call_site" => call_site,
        "outcome" => outcome_label
    )
    .record(elapsed.as_secs_f64());

    for span in spans {
        record_component(call_site, span);
    }

    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match outcome {
        DispatchOutcome::Success => tracing::info!(
            call_site,
            outcome = outcome_label,
            duration_ms,
            spans = spans.len(),
            "fan-out complete"
        ),
        DispatchOutcome::AllFailed | DispatchOutcome::Cancelled => tracing::warn!(
            call_site,
            outcome = outcome_label,
            duration_ms,
            spans = spans.len(),
            "fan-out failed"
        ),
    }
}

fn record_component(call_site: &'static str, span: &Span) {
    let outcome = if span.is_success() { "ok" } else { "error" };
    let component = span.name().to_string();

    counter!(
        "fanout_component_total",
        "call_site" => call_site,
        "component" => component.clone(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "fanout_component_duration_seconds",
        "call_site" => call_site,
        "component" => component
    )
    .record(span.duration().as_secs_f64());

    tracing::debug!(
        call_site,
        component = span.name(),
        duration_us = u64::try_from(span.duration().as_micros()).unwrap_or(u64::MAX),
        error = span.error(),
        "component attempt"
    );
}

//! Exposing fan-out spans to HTTP clients.
//!
//! Every span becomes an `X-Fanout-Span: "name","start_ms","duration"` header; a
//! failed span additionally adds `X-Fanout-Error: "name","message"`. JSON bodies use
//! [`SpanView`].

use std::time::UNIX_EPOCH;

use fanout_core::Span;
use http::header::{HeaderMap, HeaderValue};
use serde::Serialize;

pub const SPAN_HEADER: &str = "x-fanout-span";
pub const ERROR_HEADER: &str = "x-fanout-error";

/// JSON rendering of a [`Span`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanView {
    pub name: String,
    /// Start time in milliseconds since the Unix epoch.
    pub start_ms: u64,
    pub duration_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Span> for SpanView {
    fn from(span: &Span) -> Self {
        Self {
            name: span.name().to_string(),
            start_ms: start_millis(span),
            duration_us: u64::try_from(span.duration().as_micros()).unwrap_or(u64::MAX),
            error: span.error().map(str::to_string),
        }
    }
}

#[must_use]
pub fn span_views(spans: &[Span]) -> Vec<SpanView> {
    spans.iter().map(SpanView::from).collect()
}

/// Appends the span headers for `spans` to `headers`, in span order.
pub fn append_span_headers(headers: &mut HeaderMap, spans: &[Span]) {
    for span in spans {
        let value = format!(
            "{},{},{}",
            quoted(span.name()),
            quoted(&start_millis(span).to_string()),
            quoted(&format!("{:?}", span.duration())),
        );
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.append(SPAN_HEADER, value);
        }

        if let Some(error) = span.error() {
            let value = format!("{},{}", quoted(span.name()), quoted(error));
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.append(ERROR_HEADER, value);
            }
        }
    }
}

fn start_millis(span: &Span) -> u64 {
    span.start()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Double-quotes `raw`, escaping quotes and backslashes. Anything that is not
/// visible ASCII or a space is replaced with `?` so the result is a valid header value.
fn quoted(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out.push('"');
    out
}

//! # Instrumentation Wrappers
//!
//! Attaches an observability span to any operation without altering its
//! calling contract: a synchronous operation stays synchronous, a future
//! stays a future suspending at the same points. Entry, exit, and failure
//! are recorded on the span; errors pass through unchanged.
//!
//! Two adapter forms exist, one per calling convention:
//! [`with_span`] for plain calls and [`with_span_async`] for futures.
//! [`OpSpan`] is the manual escape hatch for attaching attributes produced
//! mid-operation.
//!
//! Span data is exported through whatever `tracing-opentelemetry` layer the
//! process installed; with none, the wrappers degrade to plain `tracing`
//! spans.
//!
//! ## Example
//!
//! ```rust
//! use keel_trace::{OpSpan, with_span};
//!
//! let result: Result<u32, std::num::ParseIntError> =
//!     with_span("checkout.parse_quantity", || "3".parse());
//! assert_eq!(result.unwrap(), 3);
//!
//! let span = OpSpan::child("checkout.reserve");
//! span.attr("entity.id", "item:42");
//! drop(span);
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::Status;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, Span, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Runs a synchronous operation inside a new span nested under the span
/// active in the calling context.
///
/// Completion marks the span OK; a failure is recorded on the span and the
/// identical error is returned to the caller. The value is returned
/// directly — wrapping never introduces a deferred result.
pub fn with_span<T, E: Display>(
    name: &'static str,
    op: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let span = info_span!("operation", otel.name = name);
    let result = span.in_scope(op);
    match &result {
        Ok(_) => span.set_status(Status::Ok),
        Err(e) => record_failure(&span, e),
    }
    result
}

/// Wraps a future in a new span nested under the caller's active span,
/// preserving its suspension points exactly.
///
/// The caller still awaits the wrapped operation to obtain the result. If
/// the wrapped future is dropped before completion (cancellation, timeout),
/// the span is closed marked errored rather than left open — span lifetime
/// is bounded by the invocation.
pub async fn with_span_async<T, E, F>(name: &'static str, fut: F) -> Result<T, E>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    let span = info_span!("operation", otel.name = name);

    let guard = CancelGuard { span: span.clone(), armed: AtomicBool::new(true) };
    let result = fut.instrument(span.clone()).await;
    guard.disarm();

    match &result {
        Ok(_) => span.set_status(Status::Ok),
        Err(e) => record_failure(&span, e),
    }
    result
}

/// Closes the span as cancelled when an in-flight operation is dropped.
struct CancelGuard {
    span: Span,
    armed: AtomicBool,
}

impl CancelGuard {
    fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed.load(Ordering::Acquire) {
            self.span.add_event("cancelled", Vec::new());
            self.span.set_status(Status::error("operation cancelled"));
        }
    }
}

/// A manually managed sub-span for recording context produced mid-operation
/// (e.g. the identifier of an entity created halfway through).
///
/// Opened nested under the currently active span; closed on drop, marked OK
/// unless [`OpSpan::fail`] was called.
#[derive(Debug)]
pub struct OpSpan {
    span: Span,
    failed: AtomicBool,
}

impl OpSpan {
    /// Opens a named sub-span under the active span.
    #[must_use]
    pub fn child(name: &'static str) -> Self {
        let span = info_span!("operation", otel.name = name);
        Self { span, failed: AtomicBool::new(false) }
    }

    /// Attaches an attribute. Keys are unique; setting the same key again
    /// replaces the previous value.
    pub fn attr(&self, key: &'static str, value: impl Into<opentelemetry::Value>) {
        self.span.set_attribute(key, value.into());
    }

    /// Records a failure on the sub-span; drop will close it marked errored.
    pub fn fail(&self, err: &dyn Display) {
        self.failed.store(true, Ordering::Release);
        record_failure(&self.span, err);
    }

    /// Runs `f` with this sub-span entered, so nested spans and events
    /// attach beneath it.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }

    /// Handle to the underlying tracing span.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OpSpan {
    fn drop(&mut self) {
        if !self.failed.load(Ordering::Acquire) {
            self.span.set_status(Status::Ok);
        }
    }
}

/// Records an error on `span` following the OpenTelemetry exception
/// conventions, then marks the span errored.
fn record_failure(span: &Span, err: &dyn Display) {
    let message = err.to_string();
    span.add_event("exception", vec![KeyValue::new("exception.message", message.clone())]);
    span.set_status(Status::error(message));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_wrapper_returns_the_value_directly() {
        let result: Result<u32, std::num::ParseIntError> = with_span("test.parse", || "7".parse());
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn sync_wrapper_passes_the_error_through_unchanged() {
        let result: Result<(), &str> = with_span("test.fail", || Err("boom"));
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[test]
    fn guard_disarms_on_completion() {
        let guard = CancelGuard { span: Span::none(), armed: AtomicBool::new(true) };
        guard.disarm();
        assert!(!guard.armed.load(Ordering::Acquire));
    }
}

//! Prometheus Metrics Module
//!
//! Exposes stream client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound frames and dispatched events by kind
//! - **Errors**: Decode failures and transport errors
//! - **Connection**: Reconnect outcomes
//! - **Subscriptions**: Registered channel count
//!
//! Recording functions are no-ops until a recorder is installed, so library
//! users that never call [`init_metrics`] pay nothing.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::streaming::EventKind;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// With `listen` set, an HTTP scrape endpoint is served on that address;
/// this must run inside a Tokio runtime. Later calls are no-ops.
///
/// # Errors
///
/// Returns an error if the recorder or the listener cannot be installed.
pub fn init_metrics(listen: Option<SocketAddr>) -> Result<(), BuildError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let builder = PrometheusBuilder::new();
    match listen {
        Some(addr) => builder.with_http_listener(addr).install()?,
        None => {
            builder.install_recorder()?;
        }
    }

    let _ = INSTALLED.set(());
    register_metrics();
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "polygon_stream_frames_received_total",
        "Total data frames read from the stream"
    );
    describe_counter!(
        "polygon_stream_events_dispatched_total",
        "Total events delivered to handlers by kind"
    );
    describe_counter!(
        "polygon_stream_decode_errors_total",
        "Total frames or envelopes that failed to decode"
    );
    describe_counter!(
        "polygon_stream_handler_panics_total",
        "Total handler invocations that panicked by kind"
    );
    describe_counter!(
        "polygon_stream_transport_errors_total",
        "Total read errors by kind"
    );
    describe_counter!(
        "polygon_stream_reconnects_total",
        "Total reconnect attempts by outcome"
    );
    describe_gauge!(
        "polygon_stream_channels",
        "Number of channels with a registered handler"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// Transport reopened, authenticated and subscriptions replayed.
    Restored,
    /// The attempt failed and may be retried.
    Failed,
    /// Attempts exhausted; the read loop stopped.
    Exhausted,
}

impl ReconnectOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Restored => "restored",
            Self::Failed => "failed",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Record a frame read from the transport.
pub fn record_frame_received() {
    counter!("polygon_stream_frames_received_total").increment(1);
}

/// Record an event delivered to a handler.
pub fn record_event_dispatched(kind: EventKind) {
    counter!(
        "polygon_stream_events_dispatched_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a decode failure. `scope` is `"frame"` or an event kind label.
pub fn record_decode_error(scope: &str) {
    counter!(
        "polygon_stream_decode_errors_total",
        "scope" => scope.to_string()
    )
    .increment(1);
}

/// Record a handler that panicked while handling an event.
pub fn record_handler_panic(kind: EventKind) {
    counter!(
        "polygon_stream_handler_panics_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a read error seen by the read loop.
pub fn record_transport_error(error_type: &'static str) {
    counter!(
        "polygon_stream_transport_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a reconnect attempt.
pub fn record_reconnect(outcome: ReconnectOutcome) {
    counter!(
        "polygon_stream_reconnects_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Update the registered channel count.
#[allow(clippy::cast_precision_loss)]
pub fn set_channels(count: usize) {
    gauge!("polygon_stream_channels").set(count as f64);
}

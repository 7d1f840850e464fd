//! Frame Codec and Dispatch
//!
//! Decodes inbound Polygon frames and routes each event to the handler
//! registered for its channel.
//!
//! # Frame Format
//!
//! A frame is a JSON array of envelopes, each tagged by `ev`. One frame may
//! batch events of several channels:
//!
//! ```json
//! [{"ev":"T","sym":"AAPL",...},{"ev":"Q","sym":"AAPL",...}]
//! ```
//!
//! # Failure Isolation
//!
//! - Envelopes for unsubscribed or unknown channels are skipped
//! - An envelope that fails to decode is logged and skipped; the rest of
//!   the batch is still dispatched
//! - A frame that is not an array is reported as [`DecodeError::Frame`]
//!
//! None of these touch the connection; reconnection is reserved for
//! transport failures.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use super::messages::{STATUS_EVENT, StatusMessage};
use crate::domain::streaming::{EventKind, StreamEvent};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::metrics;

/// Decode errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a JSON array of envelopes.
    #[error("malformed frame: {0}")]
    Frame(#[source] serde_json::Error),

    /// An envelope does not match the schema of its tag.
    #[error("malformed {tag} envelope: {source}")]
    Envelope {
        /// Envelope tag
        tag: &'static str,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of dispatching one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Envelopes delivered to a handler.
    pub delivered: usize,
    /// Envelopes ignored (no handler, unknown tag, or status notice).
    pub skipped: usize,
    /// Envelopes that failed to decode or whose handler panicked.
    pub failed: usize,
}

impl DispatchSummary {
    /// Total envelopes seen in the frame.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

/// Decode one envelope into the record type of its kind.
///
/// # Errors
///
/// Returns [`DecodeError::Envelope`] if the envelope does not match the schema.
pub fn decode_event(kind: EventKind, envelope: Value) -> Result<StreamEvent, DecodeError> {
    let wrap = |source| DecodeError::Envelope {
        tag: kind.tag(),
        source,
    };

    let event = match kind {
        EventKind::MinuteAggregate => {
            StreamEvent::MinuteAggregate(serde_json::from_value(envelope).map_err(wrap)?)
        }
        EventKind::SecondAggregate => {
            StreamEvent::SecondAggregate(serde_json::from_value(envelope).map_err(wrap)?)
        }
        EventKind::Trade => StreamEvent::Trade(serde_json::from_value(envelope).map_err(wrap)?),
        EventKind::Quote => StreamEvent::Quote(serde_json::from_value(envelope).map_err(wrap)?),
    };

    Ok(event)
}

/// Routes decoded events to registered handlers.
#[derive(Debug, Clone)]
pub struct FrameDispatcher {
    registry: Arc<SubscriptionRegistry>,
}

impl FrameDispatcher {
    /// Create a dispatcher over a registry.
    #[must_use]
    pub const fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Decode a frame and invoke the handler of every subscribed envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Frame`] if the frame is not a JSON array.
    /// Per-envelope failures are counted in the summary instead.
    pub fn dispatch(&self, frame: &str) -> Result<DispatchSummary, DecodeError> {
        let envelopes: Vec<Value> = serde_json::from_str(frame).map_err(|e| {
            metrics::record_decode_error("frame");
            DecodeError::Frame(e)
        })?;

        let mut summary = DispatchSummary::default();

        for envelope in envelopes {
            let Some(tag) = envelope
                .get("ev")
                .and_then(Value::as_str)
                .map(str::to_owned)
            else {
                tracing::trace!("Skipping envelope without event tag");
                summary.skipped += 1;
                continue;
            };
            let tag = tag.as_str();

            if tag == STATUS_EVENT {
                if let Ok(status) = serde_json::from_value::<StatusMessage>(envelope) {
                    tracing::debug!(status = %status.status, message = %status.message, "Stream status");
                }
                summary.skipped += 1;
                continue;
            }

            let Some(handler) = self.registry.lookup(tag) else {
                summary.skipped += 1;
                continue;
            };

            let Some(kind) = EventKind::from_tag(tag) else {
                tracing::trace!(tag, "Skipping envelope with unknown tag");
                summary.skipped += 1;
                continue;
            };

            match decode_event(kind, envelope) {
                Ok(event) => {
                    if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                        tracing::error!(channel = tag, "Handler panicked");
                        metrics::record_handler_panic(kind);
                        summary.failed += 1;
                        continue;
                    }
                    metrics::record_event_dispatched(kind);
                    summary.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable envelope");
                    metrics::record_decode_error(kind.as_str());
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

// =============================================================================
// Tests
// =============================================================================

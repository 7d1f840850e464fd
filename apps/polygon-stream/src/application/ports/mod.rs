//! Port Interfaces
//!
//! Contracts the stream core needs from the outside world, following the
//! Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Connector`]: dials the feed endpoint and yields a [`Transport`]
//! - [`Transport`]: full-duplex text message connection
//!
//! The WebSocket adapter lives in `infrastructure::polygon::websocket`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// Errors produced by a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The endpoint could not be reached.
    #[error("dial failed: {0}")]
    Dial(String),

    /// The connection was closed through a close handshake.
    #[error("connection closed (code {code:?}): {reason}")]
    Closed {
        /// Close code sent by the peer, if any
        code: Option<u16>,
        /// Close reason sent by the peer
        reason: String,
    },

    /// I/O or protocol failure on an open connection.
    #[error("I/O error: {0}")]
    Io(String),

    /// No message arrived within the read deadline.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Build a close error without code or reason.
    #[must_use]
    pub const fn closed() -> Self {
        Self::Closed {
            code: None,
            reason: String::new(),
        }
    }

    /// Whether this error reports a close handshake rather than an abnormal
    /// disconnect.
    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Metric label for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Dial(_) => "dial",
            Self::Closed { .. } => "closed",
            Self::Io(_) => "io",
            Self::Timeout(_) => "timeout",
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// A full-duplex, message-oriented connection.
///
/// Sends and receives may run concurrently: one task can block in
/// [`Transport::recv`] while another sends control frames.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one text message.
    async fn send(&self, text: String) -> Result<(), TransportError>;

    /// Receive the next text message, waiting as long as needed.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Receive the next text message with a read deadline scoped to this call.
    async fn recv_within(&self, deadline: Duration) -> Result<String, TransportError> {
        tokio::time::timeout(deadline, self.recv())
            .await
            .map_err(|_| TransportError::Timeout(deadline))?
    }

    /// Send a normal-closure close frame.
    async fn send_close(&self) -> Result<(), TransportError>;

    /// Close the underlying connection.
    async fn close(&self) -> Result<(), TransportError>;
}

// =============================================================================
// Connector
// =============================================================================

/// Dials an endpoint and returns a fresh [`Transport`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection to `url`.
    async fn connect(&self, url: &str) -> Result<Arc<dyn Transport>, TransportError>;
}

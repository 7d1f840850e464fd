//! Polygon WebSocket Authentication
//!
//! Performs the one-shot authentication exchange on a freshly opened
//! transport.
//!
//! # Authentication Flow
//!
//! 1. Send `{"action":"auth","params":"<key id>"}`
//! 2. Read the next message, waiting at most [`AUTH_TIMEOUT`]
//! 3. Succeed iff it decodes as `{"status": ...}` and the status equals
//!    `"success"` ignoring case
//!
//! The read deadline applies to the acknowledgment only; later reads on the
//! same transport are unbounded.

use std::time::Duration;

use thiserror::Error;

use super::messages::{AuthAck, ControlMessage};
use crate::application::ports::{Transport, TransportError};
use crate::infrastructure::config::Credentials;

// =============================================================================
// Constants
// =============================================================================

/// Maximum time to wait for the authentication acknowledgment.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The server answered with a non-success status.
    #[error("authentication rejected: status {0:?}")]
    Rejected(String),

    /// No acknowledgment arrived in time.
    #[error("authentication timeout: no acknowledgment within {0:?}")]
    Timeout(Duration),

    /// The acknowledgment could not be decoded.
    #[error("invalid authentication acknowledgment: {0}")]
    InvalidMessage(String),

    /// Sending the request or reading the reply failed.
    #[error("transport failure during authentication: {0}")]
    Transport(TransportError),
}

// =============================================================================
// Authentication State
// =============================================================================

/// Authentication state of the current transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No handshake has succeeded on the current transport.
    #[default]
    Unauthenticated,

    /// Authentication request sent, awaiting acknowledgment.
    Authenticating,

    /// Acknowledged with a success status.
    Authenticated,
}

impl AuthState {
    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// Run the authentication exchange on `transport`.
///
/// # Errors
///
/// Returns an [`AuthError`] if the request cannot be sent, the reply does not
/// arrive within `timeout`, cannot be decoded, or carries a non-success
/// status.
pub async fn authenticate(
    transport: &dyn Transport,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<(), AuthError> {
    let request = ControlMessage::auth(credentials.key_id())
        .to_json()
        .map_err(|e| AuthError::InvalidMessage(format!("failed to serialize auth: {e}")))?;

    transport.send(request).await.map_err(AuthError::Transport)?;

    let reply = transport.recv_within(timeout).await.map_err(|e| match e {
        TransportError::Timeout(after) => AuthError::Timeout(after),
        other => AuthError::Transport(other),
    })?;

    let ack: AuthAck =
        serde_json::from_str(&reply).map_err(|e| AuthError::InvalidMessage(e.to_string()))?;

    if ack.is_success() {
        tracing::debug!(key = %credentials, "Authentication acknowledged");
        Ok(())
    } else {
        Err(AuthError::Rejected(ack.status))
    }
}

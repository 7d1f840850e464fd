//! Polygon WebSocket Control Messages
//!
//! Wire format types for the control plane of the Polygon stream. Market
//! data records live in [`crate::domain::streaming`].
//!
//! # Message Types
//!
//! ## Outbound (Client -> Server)
//! - `{"action":"auth","params":"<key id>"}`
//! - `{"action":"subscribe","params":"<channel>"}`
//!
//! ## Inbound (Server -> Client)
//! - Auth acknowledgment: `{"status":"success"}`
//! - Status envelopes inside data frames:
//!   `[{"ev":"status","status":"success","message":"subscribed to: T"}]`

use serde::{Deserialize, Serialize};

/// Envelope tag carried by status notices.
pub const STATUS_EVENT: &str = "status";

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Control action sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Authenticate the connection.
    Auth,
    /// Subscribe to a channel.
    Subscribe,
}

/// Control message.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "subscribe", "params": "T"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    /// Action to perform
    pub action: ControlAction,

    /// Action parameter (key id or channel)
    pub params: String,
}

impl ControlMessage {
    /// Create an authentication request.
    #[must_use]
    pub fn auth(key_id: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Auth,
            params: key_id.into(),
        }
    }

    /// Create a subscribe request.
    #[must_use]
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Subscribe,
            params: channel.into(),
        }
    }

    /// Serialize the message to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (should not happen with valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound Messages (Server -> Client)
// =============================================================================

/// Authentication acknowledgment.
///
/// # Wire Format (JSON)
/// ```json
/// {"status": "success"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthAck {
    /// Outcome reported by the server
    pub status: String,
}

impl AuthAck {
    /// Check if the server accepted the credentials (case-insensitive).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

/// Status notice delivered inside a data frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusMessage {
    /// Status keyword
    #[serde(default)]
    pub status: String,

    /// Human-readable detail
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_wire_format() {
        let json = ControlMessage::auth("PKTEST").to_json().unwrap();
        assert_eq!(json, r#"{"action":"auth","params":"PKTEST"}"#);
    }

    #[test]
    fn subscribe_request_wire_format() {
        let json = ControlMessage::subscribe("T").to_json().unwrap();
        assert_eq!(json, r#"{"action":"subscribe","params":"T"}"#);
    }

    #[test]
    fn auth_ack_status_is_case_insensitive() {
        for status in ["success", "SUCCESS", "Success"] {
            let ack: AuthAck =
                serde_json::from_str(&format!(r#"{{"status":"{status}"}}"#)).unwrap();
            assert!(ack.is_success(), "{status} should be accepted");
        }
    }

    #[test]
    fn auth_ack_failure_status() {
        let ack: AuthAck = serde_json::from_str(r#"{"status":"auth_failed"}"#).unwrap();
        assert!(!ack.is_success());
    }

    #[test]
    fn auth_ack_requires_status() {
        assert!(serde_json::from_str::<AuthAck>(r#"{"message":"hello"}"#).is_err());
    }

    #[test]
    fn status_message_defaults() {
        let msg: StatusMessage = serde_json::from_str(r#"{"ev":"status"}"#).unwrap();
        assert!(msg.status.is_empty());
        assert!(msg.message.is_empty());
    }
}

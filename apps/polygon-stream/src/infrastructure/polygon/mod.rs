//! Polygon Stream Adapters
//!
//! Client for Polygon's stock data stream:
//!
//! - **Connection**: open, authenticate, read loop, reconnect, close
//! - **Dispatch**: decodes frames and routes events to channel handlers
//! - **WebSocket**: `tokio-tungstenite` transport

pub mod auth;
pub mod codec;
pub mod connection;
pub mod messages;
pub mod reconnect;
pub mod stream;
pub mod websocket;

pub use auth::{AUTH_TIMEOUT, AuthError, AuthState, authenticate};
pub use codec::{DecodeError, DispatchSummary, FrameDispatcher, decode_event};
pub use connection::{ConnectionLifecycle, ConnectionState, ReconnectError, StreamError};
pub use messages::{AuthAck, ControlAction, ControlMessage, STATUS_EVENT, StatusMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use stream::Stream;
pub use websocket::{WebSocketConnector, WebSocketTransport};

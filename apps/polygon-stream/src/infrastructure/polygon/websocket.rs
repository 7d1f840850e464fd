//! WebSocket Transport Adapter
//!
//! Implements the [`Connector`] and [`Transport`] ports on top of
//! `tokio-tungstenite`.
//!
//! The socket is split so that the read loop can block in `recv` while
//! callers send control frames through the write half.
//!
//! # Error Classification
//!
//! - Close frame received, stream ended, or `ConnectionClosed`/`AlreadyClosed`
//!   → [`TransportError::Closed`]
//! - Anything else → [`TransportError::Io`]

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::application::ports::{Connector, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Connector
// =============================================================================

/// Dials WebSocket endpoints (`ws://` or `wss://`).
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Transport>, TransportError> {
        tracing::info!(url, "Connecting to Polygon stream");

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Dial(e.to_string()))?;

        let (write, read) = ws_stream.split();

        Ok(Arc::new(WebSocketTransport {
            write: Mutex::new(write),
            read: Mutex::new(read),
        }))
    }
}

// =============================================================================
// Transport
// =============================================================================

/// An open WebSocket connection.
pub struct WebSocketTransport {
    write: Mutex<SplitSink<WsStream, Message>>,
    read: Mutex<SplitStream<WsStream>>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        self.write
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(classify)
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut read = self.read.lock().await;

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(_) => {
                        tracing::debug!(len = data.len(), "Ignoring non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => return Err(close_error(frame)),
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite
                }
                Some(Err(e)) => return Err(classify(e)),
                None => return Err(TransportError::closed()),
            }
        }
    }

    async fn send_close(&self) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: String::new().into(),
        };

        self.write
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await
            .map_err(classify)
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self.write.lock().await.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }
}

fn close_error(frame: Option<CloseFrame>) -> TransportError {
    frame.map_or_else(TransportError::closed, |frame| TransportError::Closed {
        code: Some(u16::from(frame.code)),
        reason: frame.reason.as_str().to_owned(),
    })
}

fn classify(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::closed(),
        other => TransportError::Io(other.to_string()),
    }
}

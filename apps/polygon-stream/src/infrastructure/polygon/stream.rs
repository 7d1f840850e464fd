//! Stream Facade
//!
//! The public entry point: subscribe a handler to a channel, close the
//! stream. Construct one per process in the composition root and share it
//! through an `Arc`.

use std::sync::Arc;

use super::connection::{ConnectionLifecycle, ConnectionState, StreamError};
use super::websocket::WebSocketConnector;
use crate::application::ports::Connector;
use crate::domain::streaming::StreamEvent;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::config::StreamConfig;

/// Polygon market data stream.
///
/// The first [`subscribe`](Self::subscribe) dials the endpoint,
/// authenticates and starts the background read loop; later calls reuse the
/// connection. Events for a channel are delivered to its handler on the
/// read loop task, so handlers should return quickly.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use polygon_stream::{Stream, StreamConfig, StreamEvent};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = Arc::new(Stream::new(StreamConfig::from_env()?));
///
/// stream
///     .subscribe("T", |event| {
///         if let StreamEvent::Trade(trade) = event {
///             println!("{} {}", trade.symbol, trade.price);
///         }
///     })
///     .await?;
///
/// stream.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Stream {
    registry: Arc<SubscriptionRegistry>,
    lifecycle: Arc<ConnectionLifecycle>,
}

impl Stream {
    /// Create a stream that connects over WebSocket.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector::new()))
    }

    /// Create a stream that dials through a custom connector.
    #[must_use]
    pub fn with_connector(config: StreamConfig, connector: Arc<dyn Connector>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            config,
            connector,
            Arc::clone(&registry),
        ));
        Self {
            registry,
            lifecycle,
        }
    }

    /// Subscribe `handler` to `channel`, replacing any previous handler.
    ///
    /// # Errors
    ///
    /// Returns the first failure among dialing, authentication and sending
    /// the subscribe frame, or [`StreamError::Closed`] after
    /// [`close`](Self::close). A failed call leaves the previous handler of
    /// the channel (if any) in place.
    pub async fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> Result<(), StreamError>
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.lifecycle
            .subscribe(channel.into(), Arc::new(handler))
            .await
    }

    /// Close the stream gracefully. The read loop stops without reconnecting.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Close`] if the close sequence fails.
    pub async fn close(&self) -> Result<(), StreamError> {
        self.lifecycle.close().await
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// Whether the current connection is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lifecycle.is_authenticated()
    }

    /// Whether the background read loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Channels with a registered handler, sorted.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.registry.channels()
    }

    /// The underlying lifecycle, for callers that drive it step by step.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<ConnectionLifecycle> {
        &self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockConnector, MockTransport, Transport, TransportError};
    use crate::infrastructure::config::Credentials;

    fn config() -> StreamConfig {
        StreamConfig::new(
            "ws://127.0.0.1:1/stocks",
            Credentials::new("PKTEST").unwrap(),
        )
    }

    #[tokio::test]
    async fn subscribe_propagates_dial_failure() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .returning(|_| Err(TransportError::Dial("connection refused".to_string())));

        let stream = Stream::with_connector(config(), Arc::new(connector));
        let err = stream.subscribe("T", |_| {}).await.unwrap_err();

        assert!(matches!(err, StreamError::Dial(_)));
        assert!(stream.channels().is_empty());
        assert!(!stream.is_running());
        assert_eq!(stream.state(), ConnectionState::Unopened);
    }

    #[tokio::test]
    async fn failed_send_rolls_back_registration() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|text| text.contains(r#""action":"auth""#))
            .returning(|_| Ok(()));
        transport
            .expect_recv_within()
            .returning(|_| Ok(r#"{"status":"success"}"#.to_string()));
        transport
            .expect_send()
            .withf(|text| text.contains(r#""action":"subscribe""#))
            .returning(|_| Err(TransportError::Io("broken pipe".to_string())));
        // Once subscribe releases the lock the read loop sees a dead
        // transport and keeps failing to redial until closed.
        transport
            .expect_recv()
            .returning(|| Err(TransportError::closed()));
        transport.expect_send_close().returning(|| Ok(()));
        transport.expect_close().returning(|| Ok(()));

        let slot = parking_lot::Mutex::new(Some(transport));
        let mut connector = MockConnector::new();
        connector.expect_connect().returning(move |_| match slot.lock().take() {
            Some(transport) => Ok(Arc::new(transport) as Arc<dyn Transport>),
            None => Err(TransportError::Dial("connection refused".to_string())),
        });

        let stream = Stream::with_connector(config(), Arc::new(connector));

        let err = stream.subscribe("T", |_| {}).await.unwrap_err();
        assert!(matches!(err, StreamError::Send(TransportError::Io(_))));
        assert!(stream.channels().is_empty());

        stream.close().await.unwrap();
    }
}

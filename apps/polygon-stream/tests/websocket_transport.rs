//! WebSocket Transport Integration Tests
//!
//! Runs the stream against a local `tokio-tungstenite` server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use polygon_stream::{
    ConnectionState, Credentials, Stream, StreamConfig, StreamError, StreamEvent,
};

use support::{TRADE, batch, eventually};

/// Accept one connection, ack auth with `auth_status`, answer every
/// subscribe with a trade frame, and report every text frame received.
async fn spawn_server(auth_status: &'static str) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let text = text.as_str().to_owned();
            let _ = seen_tx.send(text.clone());

            let reply = if text.contains(r#""action":"auth""#) {
                format!(r#"{{"status":"{auth_status}"}}"#)
            } else {
                batch(&[TRADE])
            };
            if ws.send(Message::Text(reply.into())).await.is_err() {
                break;
            }
        }
    });

    (format!("ws://{addr}/stocks"), seen_rx)
}

fn config(url: String) -> StreamConfig {
    let mut config = StreamConfig::new(url, Credentials::new("PKTEST").unwrap());
    config.auth_timeout = Duration::from_secs(2);
    config
}

#[tokio::test]
async fn subscribe_receive_and_close_over_websocket() {
    let (url, mut seen) = spawn_server("success").await;
    let stream = Stream::new(config(url));
    let recorder = support::Recorder::default();

    stream.subscribe("T", recorder.handler()).await.unwrap();

    assert_eq!(
        seen.recv().await.unwrap(),
        r#"{"action":"auth","params":"PKTEST"}"#
    );
    assert_eq!(
        seen.recv().await.unwrap(),
        r#"{"action":"subscribe","params":"T"}"#
    );

    eventually("trade over websocket", || recorder.len() == 1).await;
    assert!(matches!(&recorder.events()[0], StreamEvent::Trade(t) if t.symbol == "AAPL"));

    let _ = stream.close().await;

    eventually("read loop to stop", || !stream.is_running()).await;
    assert_eq!(stream.state(), ConnectionState::ClosedGraceful);
}

#[tokio::test]
async fn rejected_auth_over_websocket() {
    let (url, _seen) = spawn_server("auth_failed").await;
    let stream = Stream::new(config(url));

    let err = stream.subscribe("T", |_| {}).await.unwrap_err();

    assert!(matches!(err, StreamError::Auth(_)));
    assert!(stream.channels().is_empty());
    assert_eq!(stream.state(), ConnectionState::Unopened);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_dial_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let stream = Stream::new(config(format!("ws://{addr}/stocks")));
    let err = stream.subscribe("T", |_| {}).await.unwrap_err();

    assert!(matches!(err, StreamError::Dial(_)));
    assert_eq!(stream.state(), ConnectionState::Unopened);
}

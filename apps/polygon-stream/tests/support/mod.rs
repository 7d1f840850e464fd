//! Shared fixtures: an in-memory scripted transport and connector.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use polygon_stream::{
    Connector, Credentials, Handler, ReconnectSettings, StreamConfig, StreamEvent, Transport,
    TransportError,
};

pub const AUTH_FRAME: &str = r#"{"action":"auth","params":"PKTEST"}"#;

pub const TRADE: &str = r#"{"ev":"T","sym":"AAPL","x":4,"i":"1","z":3,"p":126.55,"s":100,"c":[0],"t":1614008504208}"#;
pub const QUOTE: &str = r#"{"ev":"Q","sym":"AMD","bx":12,"bp":87.66,"bs":1,"ax":11,"ap":87.68,"as":4,"c":1,"t":1614009105335}"#;
pub const MINUTE_AGG: &str = r#"{"ev":"AM","sym":"SPY","v":1200,"av":30000,"op":390.1,"vw":391.2,"o":391.0,"c":391.5,"h":391.9,"l":390.8,"a":390.9,"s":1614009060000,"e":1614009120000}"#;
pub const SECOND_AGG: &str = r#"{"ev":"A","sym":"SPY","v":12,"o":391.0,"c":391.1,"h":391.1,"l":391.0,"s":1614009060000,"e":1614009061000}"#;

pub fn subscribe_frame(channel: &str) -> String {
    format!(r#"{{"action":"subscribe","params":"{channel}"}}"#)
}

pub fn batch(envelopes: &[&str]) -> String {
    format!("[{}]", envelopes.join(","))
}

// =============================================================================
// Scripted Transport
// =============================================================================

/// How the scripted server answers an auth request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReply {
    Success,
    Reject,
    Silent,
}

type Inbound = Result<String, TransportError>;

/// A transport whose inbound side is fed by the test.
pub struct ScriptedTransport {
    auth: AuthReply,
    sent: Mutex<Vec<String>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    closed: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(auth: AuthReply) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            auth,
            sent: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a data frame for the next read.
    pub fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.inbound_tx.send(Ok(frame.into()));
    }

    /// Make the next read fail.
    pub fn push_error(&self, error: TransportError) {
        let _ = self.inbound_tx.send(Err(error));
    }

    /// Frames written by the client, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::closed());
        }

        if text.contains(r#""action":"auth""#) {
            match self.auth {
                AuthReply::Success => self.push_frame(r#"{"status":"success"}"#),
                AuthReply::Reject => self.push_frame(r#"{"status":"auth_failed"}"#),
                AuthReply::Silent => {}
            }
        }

        self.sent.lock().push(text);
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        match self.inbound_rx.lock().await.recv().await {
            Some(item) => item,
            None => Err(TransportError::closed()),
        }
    }

    async fn send_close(&self) -> Result<(), TransportError> {
        // The peer answers a close frame with its own.
        self.push_error(TransportError::Closed {
            code: Some(1000),
            reason: String::new(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Scripted Connector
// =============================================================================

/// Hands out a fresh [`ScriptedTransport`] per dial and remembers them all.
pub struct ScriptedConnector {
    auth: Mutex<AuthReply>,
    failures: AtomicUsize,
    dials: AtomicUsize,
    transports: Mutex<Vec<Arc<ScriptedTransport>>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            auth: Mutex::new(AuthReply::Success),
            failures: AtomicUsize::new(0),
            dials: AtomicUsize::new(0),
            transports: Mutex::new(Vec::new()),
        })
    }

    /// Answer auth on transports dialed from now on with `reply`.
    pub fn set_auth(&self, reply: AuthReply) {
        *self.auth.lock() = reply;
    }

    /// Refuse the next `n` dials.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Dial attempts so far, failed ones included.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Successfully opened transports so far.
    pub fn opened(&self) -> usize {
        self.transports.lock().len()
    }

    pub fn transport(&self, index: usize) -> Arc<ScriptedTransport> {
        Arc::clone(&self.transports.lock()[index])
    }

    pub fn latest(&self) -> Arc<ScriptedTransport> {
        Arc::clone(self.transports.lock().last().expect("no transport opened"))
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn Transport>, TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        let refuse = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(TransportError::Dial("connection refused".to_string()));
        }

        let transport = Arc::new(ScriptedTransport::new(*self.auth.lock()));
        self.transports.lock().push(Arc::clone(&transport));
        Ok(transport as Arc<dyn Transport>)
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn test_config() -> StreamConfig {
    let mut config = StreamConfig::new(
        "ws://scripted.invalid/stocks",
        Credentials::new("PKTEST").unwrap(),
    );
    config.auth_timeout = Duration::from_millis(200);
    config.reconnect = ReconnectSettings {
        delay_initial: Duration::from_millis(5),
        delay_max: Duration::from_millis(20),
        delay_multiplier: 2.0,
        max_attempts: 0,
    };
    config
}

/// Collects every event delivered to the handlers it creates.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl Recorder {
    pub fn handler(&self) -> impl Fn(StreamEvent) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event| events.lock().push(event)
    }

    pub fn boxed(&self) -> Handler {
        Arc::new(self.handler())
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

//! Connection Lifecycle
//!
//! Owns the current transport and drives it through
//! open → authenticate → run → error/close → reopen.
//!
//! # Locking
//!
//! One async mutex guards the current transport, its generation, the
//! authentication flag, the closed flag and whether a read loop is active.
//! Dialing, the auth exchange and control-frame sends happen under it, so
//! subscribe frames go out in the order their callers acquire the lock.
//!
//! The read loop snapshots the current transport and blocks in `recv`
//! outside the lock. When the read fails, it re-takes the lock and compares
//! generations: if someone already replaced the transport it simply reads
//! from the new one.
//!
//! # Error Handling
//!
//! | Read error                        | closed flag | Action                 |
//! |-----------------------------------|-------------|------------------------|
//! | any                               | set         | stop the loop          |
//! | close handshake or I/O failure    | clear       | reopen, restore, read  |
//!
//! Restoring a reopened transport re-authenticates and replays a subscribe
//! frame for every registered channel. Failed attempts back off through
//! [`ReconnectPolicy`]; the first reopen is immediate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex as SyncMutex;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::auth::{self, AuthError, AuthState};
use super::codec::FrameDispatcher;
use super::messages::ControlMessage;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{Connector, Transport, TransportError};
use crate::domain::subscription::{Channel, Handler, SubscriptionRegistry};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::metrics::{self, ReconnectOutcome};

// =============================================================================
// Error Types
// =============================================================================

/// Errors returned to callers of the stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The endpoint could not be dialed.
    #[error("failed to open stream: {0}")]
    Dial(#[source] TransportError),

    /// The authentication exchange failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A control frame could not be written.
    #[error("failed to send control frame: {0}")]
    Send(#[source] TransportError),

    /// The close sequence failed.
    #[error("failed to close stream: {0}")]
    Close(#[source] TransportError),

    /// A control frame could not be encoded.
    #[error("failed to encode control frame: {0}")]
    Encode(#[source] serde_json::Error),

    /// No transport is open.
    #[error("stream is not connected")]
    NotConnected,

    /// The stream was closed by the caller.
    #[error("stream is closed")]
    Closed,
}

/// Errors that end a reconnect episode.
#[derive(Debug, Error)]
pub enum ReconnectError {
    /// The policy ran out of attempts.
    #[error("reconnect abandoned after {attempts} failed attempts: {last}")]
    Exhausted {
        /// Failed attempts recorded by the policy
        attempts: u32,
        /// Error of the final attempt
        last: StreamError,
    },

    /// The stream was closed while reconnecting.
    #[error("stream closed while reconnecting")]
    Closed,
}

// =============================================================================
// Connection State
// =============================================================================

/// Observable state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Unopened,
    /// Transport open; handshake not yet acknowledged.
    Authenticating,
    /// Authenticated; frames are read when the loop runs.
    Running,
    /// Close requested; close frame in flight.
    Closing,
    /// Closed by the caller.
    ClosedGraceful,
    /// Disconnected unexpectedly and not (yet) restored.
    ClosedAbnormal,
}

impl ConnectionState {
    /// Whether the stream ended, gracefully or not.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedGraceful | Self::ClosedAbnormal)
    }

    /// State label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::Authenticating => "authenticating",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::ClosedGraceful => "closed_graceful",
            Self::ClosedAbnormal => "closed_abnormal",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Lock-guarded State
// =============================================================================

#[derive(Default)]
struct Inner {
    transport: Option<Arc<dyn Transport>>,
    generation: u64,
    auth: AuthState,
    authenticated: Arc<AtomicBool>,
    closed: bool,
    reading: bool,
}

impl Inner {
    fn install(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
        self.generation += 1;
        self.set_auth(AuthState::Unauthenticated);
    }

    fn discard(&mut self) -> Option<Arc<dyn Transport>> {
        self.set_auth(AuthState::Unauthenticated);
        self.transport.take()
    }

    fn set_auth(&mut self, auth: AuthState) {
        self.auth = auth;
        self.authenticated.store(auth.is_authenticated(), Ordering::Release);
    }

    fn is_live(&self) -> bool {
        self.transport.is_some() && self.auth.is_authenticated()
    }
}

// =============================================================================
// Connection Lifecycle
// =============================================================================

/// Manages the single current transport of a stream.
pub struct ConnectionLifecycle {
    config: StreamConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: FrameDispatcher,
    inner: Mutex<Inner>,
    authenticated: Arc<AtomicBool>,
    state: SyncMutex<ConnectionState>,
    task: SyncMutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ConnectionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ConnectionLifecycle {
    /// Create a lifecycle that dials through `connector` and dispatches
    /// frames to the handlers in `registry`.
    #[must_use]
    pub fn new(
        config: StreamConfig,
        connector: Arc<dyn Connector>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        let inner = Inner::default();
        Self {
            config,
            connector,
            dispatcher: FrameDispatcher::new(Arc::clone(&registry)),
            registry,
            authenticated: Arc::clone(&inner.authenticated),
            inner: Mutex::new(inner),
            state: SyncMutex::new(ConnectionState::Unopened),
            task: SyncMutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether the current transport has been authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Whether the background read loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            tracing::trace!(from = %previous, to = %state, "Connection state changed");
        }
    }

    // -------------------------------------------------------------------------
    // Open / Authenticate / Send
    // -------------------------------------------------------------------------

    /// Dial the endpoint unless a transport is already open.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Dial`] if the endpoint cannot be reached (the
    /// lifecycle stays unopened so a later call can retry), or
    /// [`StreamError::Closed`] after [`close`](Self::close).
    pub async fn ensure_open(&self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;
        self.open_locked(&mut inner).await.map(|_| ())
    }

    async fn open_locked(&self, inner: &mut Inner) -> Result<Arc<dyn Transport>, StreamError> {
        if inner.closed {
            return Err(StreamError::Closed);
        }
        if let Some(transport) = &inner.transport {
            return Ok(Arc::clone(transport));
        }

        let transport = self
            .connector
            .connect(&self.config.url)
            .await
            .map_err(StreamError::Dial)?;

        inner.install(Arc::clone(&transport));
        self.set_state(ConnectionState::Authenticating);
        tracing::info!(url = %self.config.url, generation = inner.generation, "Stream opened");

        Ok(transport)
    }

    /// Authenticate the current transport. Returns immediately if it already is.
    ///
    /// On failure the transport is closed and dropped, so the next
    /// [`ensure_open`](Self::ensure_open) dials afresh.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Auth`] if the handshake fails,
    /// [`StreamError::NotConnected`] if no transport is open, or
    /// [`StreamError::Closed`] after [`close`](Self::close).
    pub async fn authenticate(&self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;
        self.authenticate_locked(&mut inner).await
    }

    async fn authenticate_locked(&self, inner: &mut Inner) -> Result<(), StreamError> {
        if inner.closed {
            return Err(StreamError::Closed);
        }
        if inner.auth.is_authenticated() {
            return Ok(());
        }
        let transport = inner.transport.clone().ok_or(StreamError::NotConnected)?;

        inner.set_auth(AuthState::Authenticating);
        self.set_state(ConnectionState::Authenticating);

        match auth::authenticate(
            transport.as_ref(),
            &self.config.credentials,
            self.config.auth_timeout,
        )
        .await
        {
            Ok(()) => {
                inner.set_auth(AuthState::Authenticated);
                self.set_state(ConnectionState::Running);
                tracing::info!(generation = inner.generation, "Stream authenticated");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stream authentication failed");
                if let Some(transport) = inner.discard() {
                    shutdown(transport.as_ref()).await;
                }
                self.set_state(ConnectionState::Unopened);
                Err(e.into())
            }
        }
    }

    /// Send a subscribe control frame for `channel` on the current transport.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Send`] if the write fails or
    /// [`StreamError::NotConnected`] if no transport is open.
    pub async fn send_subscribe(&self, channel: &str) -> Result<(), StreamError> {
        let inner = self.inner.lock().await;
        send_subscribe_locked(&inner, channel).await
    }

    /// Open, authenticate, start the read loop, register `handler` and send
    /// the subscribe frame for `channel`, all under one lock acquisition.
    ///
    /// If the subscribe frame cannot be sent, the registration is rolled back
    /// to whatever handler the channel had before.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage.
    pub async fn subscribe(
        self: &Arc<Self>,
        channel: Channel,
        handler: Handler,
    ) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;

        self.open_locked(&mut inner).await?;
        self.authenticate_locked(&mut inner).await?;
        self.start_locked(&mut inner);

        let previous = self.registry.register(channel.clone(), handler);

        if let Err(e) = send_subscribe_locked(&inner, &channel).await {
            match previous {
                Some(previous) => {
                    self.registry.register(channel, previous);
                }
                None => {
                    self.registry.remove(&channel);
                }
            }
            return Err(e);
        }

        metrics::set_channels(self.registry.len());
        tracing::info!(channel = %channel, "Subscribed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Read Loop
    // -------------------------------------------------------------------------

    /// Start the background read loop unless one is already running.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] after [`close`](Self::close).
    pub async fn start(self: &Arc<Self>) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(StreamError::Closed);
        }
        self.start_locked(&mut inner);
        Ok(())
    }

    fn start_locked(self: &Arc<Self>, inner: &mut Inner) {
        if inner.reading && self.is_running() {
            return;
        }
        if inner.reading {
            tracing::error!("Read loop died unexpectedly, restarting");
        }
        inner.reading = true;

        let lifecycle = Arc::clone(self);
        let handle = tokio::spawn(async move { lifecycle.run_loop().await });
        *self.task.lock() = Some(handle);
        tracing::debug!("Read loop started");
    }

    async fn run_loop(self: Arc<Self>) {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::from_settings(
            &self.config.reconnect,
        ));

        loop {
            let snapshot = {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    inner.reading = false;
                    break;
                }
                inner
                    .transport
                    .as_ref()
                    .map(|transport| (Arc::clone(transport), inner.generation))
            };

            let Some((transport, generation)) = snapshot else {
                if !self.reconnect(&mut policy).await {
                    break;
                }
                continue;
            };

            match transport.recv().await {
                Ok(frame) => {
                    metrics::record_frame_received();
                    match self.dispatcher.dispatch(&frame) {
                        Ok(summary) => {
                            tracing::trace!(
                                delivered = summary.delivered,
                                skipped = summary.skipped,
                                failed = summary.failed,
                                "Frame dispatched"
                            );
                        }
                        Err(e) => tracing::warn!(error = %e, "Dropping malformed frame"),
                    }
                }
                Err(err) => {
                    if !self.handle_error(err, generation, &mut policy).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(state = %self.state(), "Read loop stopped");
    }

    /// Decide what a read error means. Returns `false` when the loop must stop.
    async fn handle_error(
        &self,
        err: TransportError,
        generation: u64,
        policy: &mut ReconnectPolicy,
    ) -> bool {
        metrics::record_transport_error(err.kind());

        {
            let mut inner = self.inner.lock().await;

            if inner.closed {
                tracing::info!(error = %err, "Stream closed, stopping read loop");
                inner.reading = false;
                return false;
            }

            if inner.generation != generation {
                return true;
            }

            if err.is_close() {
                tracing::warn!(error = %err, "Server closed the stream unexpectedly");
            } else {
                tracing::warn!(error = %err, "Stream read failed");
            }

            if let Some(transport) = inner.discard() {
                shutdown(transport.as_ref()).await;
            }
            self.set_state(ConnectionState::ClosedAbnormal);
        }

        self.reconnect(policy).await
    }

    // -------------------------------------------------------------------------
    // Reconnection
    // -------------------------------------------------------------------------

    /// Reopen and restore until success, close, or exhaustion. Returns
    /// `false` when the loop must stop.
    async fn reconnect(&self, policy: &mut ReconnectPolicy) -> bool {
        match self.reopen(policy).await {
            Ok(()) => {
                policy.reset();
                true
            }
            Err(ReconnectError::Closed) => true,
            Err(e) => {
                let mut inner = self.inner.lock().await;
                if !inner.closed && inner.is_live() {
                    tracing::info!("Stream restored by another caller");
                    policy.reset();
                    return true;
                }
                tracing::error!(error = %e, "Giving up on stream");
                metrics::record_reconnect(ReconnectOutcome::Exhausted);
                inner.reading = false;
                if !inner.closed {
                    self.set_state(ConnectionState::ClosedAbnormal);
                }
                false
            }
        }
    }

    async fn reopen(&self, policy: &mut ReconnectPolicy) -> Result<(), ReconnectError> {
        loop {
            match self.restore().await {
                Ok(replayed) => {
                    metrics::record_reconnect(ReconnectOutcome::Restored);
                    tracing::info!(channels = replayed, "Stream restored");
                    return Ok(());
                }
                Err(StreamError::Closed) => return Err(ReconnectError::Closed),
                Err(e) => {
                    metrics::record_reconnect(ReconnectOutcome::Failed);

                    let Some(delay) = policy.next_delay() else {
                        return Err(ReconnectError::Exhausted {
                            attempts: policy.attempt_count(),
                            last: e,
                        });
                    };

                    tracing::warn!(
                        error = %e,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnect failed, retrying"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => return Err(ReconnectError::Closed),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Make the current transport usable again: open, authenticate and
    /// replay every registered channel. Returns the number replayed.
    async fn restore(&self) -> Result<usize, StreamError> {
        let mut inner = self.inner.lock().await;

        self.open_locked(&mut inner).await?;
        self.authenticate_locked(&mut inner).await?;

        let channels = self.registry.channels();
        for channel in &channels {
            if let Err(e) = send_subscribe_locked(&inner, channel).await {
                if let Some(transport) = inner.discard() {
                    shutdown(transport.as_ref()).await;
                }
                self.set_state(ConnectionState::ClosedAbnormal);
                return Err(e);
            }
        }

        Ok(channels.len())
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Close the stream gracefully.
    ///
    /// Sends a close frame, marks the stream closed and closes the transport.
    /// The read loop observes the close on its next read and stops without
    /// reconnecting. With no transport open this is a no-op, except that a
    /// read loop waiting to reconnect is told to stop.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Close`] if the close sequence fails. The stream
    /// is closed either way.
    pub async fn close(&self) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().await;

        let Some(transport) = inner.discard() else {
            if inner.reading && !inner.closed {
                inner.closed = true;
                self.cancel.cancel();
                self.set_state(ConnectionState::ClosedGraceful);
                tracing::info!("Stream closed while reconnecting");
            }
            return Ok(());
        };

        tracing::info!("Closing stream");
        self.set_state(ConnectionState::Closing);
        inner.closed = true;
        self.cancel.cancel();

        let sent = transport.send_close().await;
        let closed = transport.close().await;
        self.set_state(ConnectionState::ClosedGraceful);

        sent.and(closed).map_err(StreamError::Close)
    }
}

async fn send_subscribe_locked(inner: &Inner, channel: &str) -> Result<(), StreamError> {
    let transport = inner.transport.as_ref().ok_or(StreamError::NotConnected)?;
    let frame = ControlMessage::subscribe(channel)
        .to_json()
        .map_err(StreamError::Encode)?;

    transport.send(frame).await.map_err(StreamError::Send)?;
    tracing::debug!(channel, "Subscribe frame sent");
    Ok(())
}

async fn shutdown(transport: &dyn Transport) {
    if let Err(e) = transport.close().await {
        tracing::debug!(error = %e, "Error closing discarded transport");
    }
}

// =============================================================================
// Tests
// =============================================================================

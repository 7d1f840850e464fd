//! Subscription Registry
//!
//! Maps channel tags to the handler that receives their events.
//!
//! # Design
//!
//! - At most one handler per channel; registering again replaces it
//! - Lookups hand out a cloned `Arc`, so handlers run without the lock held
//!   and may themselves register or look up channels
//! - Entries survive reconnects; the connection lifecycle replays
//!   [`SubscriptionRegistry::channels`] after reopening the transport

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::streaming::StreamEvent;

// =============================================================================
// Types
// =============================================================================

/// A channel tag (e.g. `"T"`, `"Q"`, `"AM"`, `"A"`).
pub type Channel = String;

/// Callback invoked with every decoded event of a subscribed channel.
pub type Handler = Arc<dyn Fn(StreamEvent) + Send + Sync>;

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe channel → handler map.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use polygon_stream::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
/// registry.register("T", Arc::new(|event| println!("{event:?}")));
///
/// assert!(registry.lookup("T").is_some());
/// assert!(registry.lookup("Q").is_none());
/// ```
#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: RwLock<HashMap<Channel, Handler>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a channel, replacing any previous one.
    ///
    /// Returns the replaced handler, if there was one.
    pub fn register(&self, channel: impl Into<Channel>, handler: Handler) -> Option<Handler> {
        self.handlers.write().insert(channel.into(), handler)
    }

    /// Look up the handler for a channel.
    #[must_use]
    pub fn lookup(&self, channel: &str) -> Option<Handler> {
        self.handlers.read().get(channel).cloned()
    }

    /// Remove the handler for a channel.
    pub fn remove(&self, channel: &str) -> Option<Handler> {
        self.handlers.write().remove(channel)
    }

    /// All registered channels, sorted for stable replay order.
    #[must_use]
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.handlers.read().keys().cloned().collect();
        channels.sort_unstable();
        channels
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check if no channel is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

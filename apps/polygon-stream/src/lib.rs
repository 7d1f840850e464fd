#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Polygon Stream - Market Data Client
//!
//! Maintains one WebSocket connection to Polygon's stock stream,
//! authenticates it, and delivers each decoded event to the handler
//! subscribed to its channel. Abnormal disconnects are repaired in the
//! background: the transport is reopened, re-authenticated and every
//! subscription replayed.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Event records and the channel registry
//!   - `streaming`: Aggregates, trades, quotes and the `StreamEvent` sum type
//!   - `subscription`: Channel → handler map
//!
//! - **Application**: Port definitions
//!   - `ports`: `Connector` and `Transport`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `polygon`: Connection lifecycle, auth, dispatch, reconnect, WebSocket
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! Polygon WS ──► Transport ──► read loop ──► FrameDispatcher ──► handler("T")
//!                    ▲                                      └──► handler("Q")
//!                    │
//!   subscribe() ─────┘ (open → auth → subscribe frame)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{
    EventKind, MINUTE_AGGS, QUOTES, SECOND_AGGS, StreamAggregate, StreamEvent, StreamQuote,
    StreamTrade, TRADES,
};
pub use domain::subscription::{Channel, Handler, SubscriptionRegistry};

// Ports
pub use application::ports::{Connector, Transport, TransportError};

// Stream client
pub use infrastructure::polygon::{
    AuthError, ConnectionState, DecodeError, DispatchSummary, ReconnectError, Stream, StreamError,
    WebSocketConnector,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, ReconnectSettings, StreamConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

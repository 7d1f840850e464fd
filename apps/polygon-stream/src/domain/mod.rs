//! Domain Layer - Core streaming types.
//!
//! Event records and subscription bookkeeping. Nothing in this layer
//! performs I/O.

/// Market data event types (aggregates, trades, quotes).
pub mod streaming;

/// Channel → handler registry.
pub mod subscription;

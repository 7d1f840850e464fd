//! Application Layer - Port definitions.
//!
//! Interfaces through which the stream core reaches the network.

/// Port interfaces for external systems (transport, dialer).
pub mod ports;

//! Configuration Module
//!
//! Environment-driven configuration for the stream client.

mod settings;

pub use settings::{
    ConfigError, Credentials, DEFAULT_AUTH_TIMEOUT, DEFAULT_ENDPOINT, ReconnectSettings,
    STREAM_PATH, StreamConfig, stream_url,
};

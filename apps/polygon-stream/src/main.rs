//! Polygon Stream Binary
//!
//! Subscribes to Polygon stock channels and logs every event until
//! interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin polygon-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `APCA_API_KEY_ID`: API key id used for stream authentication
//!
//! ## Optional
//! - `POLYGON_WS_URL`: Stream endpoint (default: alpaca.socket.polygon.io)
//! - `POLYGON_STREAM_CHANNELS`: Comma-separated channels (default: T,Q)
//! - `POLYGON_STREAM_AUTH_TIMEOUT_SECS`: Auth acknowledgment timeout (default: 5)
//! - `POLYGON_STREAM_RECONNECT_DELAY_INITIAL_MS`: First retry delay (default: 500)
//! - `POLYGON_STREAM_RECONNECT_DELAY_MAX_SECS`: Retry delay cap (default: 30)
//! - `POLYGON_STREAM_RECONNECT_DELAY_MULTIPLIER`: Backoff factor (default: 2.0)
//! - `POLYGON_STREAM_RECONNECT_MAX_ATTEMPTS`: Failed retries before giving up (default: 0 = unlimited)
//! - `POLYGON_STREAM_METRICS_ADDR`: Prometheus scrape address (default: unset)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log filter (default: polygon_stream=info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use polygon_stream::infrastructure::telemetry;
use polygon_stream::{ConnectionState, Stream, StreamConfig, StreamEvent, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Upper bound on the close handshake at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the watchdog checks that the read loop is alive.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting Polygon stream");

    let config = StreamConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    init_metrics(config.metrics_addr).context("failed to install metrics recorder")?;

    let channels = config.channels.clone();
    let stream = Arc::new(Stream::new(config));

    for channel in &channels {
        stream
            .subscribe(channel.as_str(), log_event)
            .await
            .with_context(|| format!("failed to subscribe to {channel}"))?;
    }

    tracing::info!(channels = ?stream.channels(), "Stream ready");

    let shutdown_token = CancellationToken::new();
    tokio::spawn(watch_read_loop(Arc::clone(&stream), shutdown_token.clone()));

    tokio::select! {
        result = await_signal() => result?,
        () = shutdown_token.cancelled() => {
            tracing::error!(state = %stream.state(), "Read loop stopped, shutting down");
        }
    }
    shutdown_token.cancel();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, stream.close()).await {
        Ok(Ok(())) => tracing::info!("Stream closed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Stream close failed"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Stream close timed out"
        ),
    }

    if stream.state() == ConnectionState::ClosedAbnormal {
        return Err(anyhow!("stream ended abnormally"));
    }

    tracing::info!("Polygon stream stopped");
    Ok(())
}

fn log_event(event: StreamEvent) {
    match &event {
        StreamEvent::MinuteAggregate(agg) | StreamEvent::SecondAggregate(agg) => {
            tracing::info!(
                channel = event.channel(),
                symbol = %agg.symbol,
                open = %agg.open,
                close = %agg.close,
                volume = agg.volume,
                "Aggregate"
            );
        }
        StreamEvent::Trade(trade) => {
            tracing::info!(
                symbol = %trade.symbol,
                price = %trade.price,
                size = trade.size,
                "Trade"
            );
        }
        StreamEvent::Quote(quote) => {
            tracing::info!(
                symbol = %quote.symbol,
                bid = %quote.bid_price,
                ask = %quote.ask_price,
                "Quote"
            );
        }
    }
}

/// Cancel `token` once the read loop has stopped on its own.
async fn watch_read_loop(stream: Arc<Stream>, token: CancellationToken) {
    let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            _ = interval.tick() => {
                if !stream.is_running() {
                    token.cancel();
                    return;
                }
            }
        }
    }
}

fn log_config(config: &StreamConfig) {
    tracing::info!(
        url = %config.url,
        credentials = %config.credentials,
        channels = ?config.channels,
        "Configuration loaded"
    );
    tracing::debug!(
        auth_timeout_ms = config.auth_timeout.as_millis(),
        reconnect_initial_ms = config.reconnect.delay_initial.as_millis(),
        reconnect_max_ms = config.reconnect.delay_max.as_millis(),
        reconnect_multiplier = config.reconnect.delay_multiplier,
        reconnect_max_attempts = config.reconnect.max_attempts,
        "Reconnect settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn await_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                tracing::info!("Received Ctrl+C, initiating shutdown");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
        tracing::info!("Received Ctrl+C, initiating shutdown");
    }

    Ok(())
}

//! Logging setup for Callrelay Server.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,callrelay_server=debug,callrelay_signaling=debug";

/// Initialize the global tracing subscriber.
///
/// # Configuration
///
/// Environment variables:
/// - `RUST_LOG`: Log filter (default: info, debug for the callrelay crates)
/// - `CALLRELAY_LOG_FORMAT`: `pretty` for multi-line development output,
///   anything else for compact single-line output
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let pretty = std::env::var("CALLRELAY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("pretty"))
        .unwrap_or(false);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if pretty {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()?;
    }

    tracing::info!(pretty, "Telemetry initialized");

    Ok(())
}

/// Log the final shutdown line.
pub fn shutdown() {
    tracing::info!("Telemetry shutdown complete");
}

//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `CALLRELAY_BIND_ADDR`: Listen address. Default: `0.0.0.0:3000`
//! - `CALLRELAY_OUTBOUND_BUFFER`: Per-connection outbound queue size. Default: `64`
//! - `CALLRELAY_STALE_SWEEP_SECS`: Interval of the stale registration sweep,
//!   `0` disables it. Default: `30`
//! - `CALLRELAY_DRAIN_TIMEOUT_SECS`: How long shutdown waits for open
//!   connections to close. Default: `10`
//!
//! # Examples
//!
//! ```bash
//! CALLRELAY_BIND_ADDR=127.0.0.1:8080 cargo run -p callrelay-server
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_OUTBOUND_BUFFER: usize = 64;
const DEFAULT_STALE_SWEEP_SECS: u64 = 30;
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,
    /// Capacity of each connection's outbound event queue
    pub outbound_buffer: usize,
    /// Interval of the stale registration sweep (None disables it)
    pub stale_sweep_interval: Option<Duration>,
    /// Upper bound on waiting for connections to close during shutdown
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            stale_sweep_interval: Some(Duration::from_secs(DEFAULT_STALE_SWEEP_SECS)),
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = {
            let var = "CALLRELAY_BIND_ADDR";
            let raw = lookup(var).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
            raw.parse::<SocketAddr>()
                .map_err(|e| ConfigError::invalid(var, &raw, e))?
        };

        let outbound_buffer = match parse_number::<usize>(&lookup, "CALLRELAY_OUTBOUND_BUFFER")? {
            Some(0) => {
                return Err(ConfigError::invalid(
                    "CALLRELAY_OUTBOUND_BUFFER",
                    "0",
                    "must be at least 1",
                ))
            }
            Some(n) => n,
            None => DEFAULT_OUTBOUND_BUFFER,
        };

        let stale_sweep_interval =
            match parse_number::<u64>(&lookup, "CALLRELAY_STALE_SWEEP_SECS")? {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => Some(Duration::from_secs(DEFAULT_STALE_SWEEP_SECS)),
            };

        let drain_timeout = Duration::from_secs(
            parse_number::<u64>(&lookup, "CALLRELAY_DRAIN_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_DRAIN_TIMEOUT_SECS),
        );

        Ok(Self {
            bind_addr,
            outbound_buffer,
            stale_sweep_interval,
            drain_timeout,
        })
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Bind address: {}", self.bind_addr);
        info!("Outbound buffer per connection: {}", self.outbound_buffer);
        match self.stale_sweep_interval {
            Some(interval) => info!("Stale registration sweep: every {}s", interval.as_secs()),
            None => info!("Stale registration sweep: disabled"),
        }
        info!("Shutdown drain timeout: {}s", self.drain_timeout.as_secs());
    }

    /// Create a test configuration bound to an ephemeral local port.
    #[cfg(test)]
    pub fn test_local() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            outbound_buffer: 16,
            stale_sweep_interval: None,
            drain_timeout: Duration::from_secs(1),
        }
    }
}

fn parse_number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(var, &raw, e)),
        None => Ok(None),
    }
}

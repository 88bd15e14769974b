//! Error types for the signaling relay.

use thiserror::Error;

use crate::registry::ConnectionId;

/// Errors produced while decoding or encoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match any known event
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Signaling errors.
///
/// These never escape the relay: every one of them is handled locally
/// (dropped, logged, or turned into `call:unavailable`).
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The target connection's outbound channel is gone
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// The target connection is not draining its outbound channel
    #[error("Connection {0} outbound channel is full")]
    ChannelFull(ConnectionId),
}

//! Connection Registry implementation.
//!
//! Tracks which live connection currently represents each identifier.

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::SignalingError;
use crate::protocol::ServerEvent;

/// Opaque identifier a client registers under (a phone number in practice).
///
/// Never empty or whitespace-only. The content is otherwise not validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier, rejecting empty and whitespace-only strings.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique id of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Non-owning handle used to deliver events to a connection.
///
/// The transport task holds the receiving end of the channel. Dropping
/// handles never closes the transport.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, sender }
    }

    /// Create a handle with a fresh id and a bounded outbound channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(ConnectionId::new(), tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Hand an event to the connection's outbound path.
    ///
    /// Never waits: a connection that stops reading fills its channel and
    /// further events for it are refused with `ChannelFull`.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), SignalingError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SignalingError::ChannelFull(self.id),
            mpsc::error::TrySendError::Closed(_) => SignalingError::ConnectionClosed(self.id),
        })
    }

    /// Whether the transport side of this connection has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Registration stored in the registry.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub handle: ConnectionHandle,
    pub registered_at: DateTime<Utc>,
}

/// Registry of live signaling connections.
///
/// Thread-safe map from identifier to the connection currently registered
/// under it. At most one entry exists per identifier; the last registration
/// wins. Uses DashMap so lookups from many connection tasks do not contend
/// on a single lock, and no shard lock is held while events are delivered.
///
/// ## Usage
///
/// ```ignore
/// let registry = ConnectionRegistry::new();
///
/// // When a connection announces its identifier:
/// let (handle, rx) = ConnectionHandle::channel(64);
/// registry.register(identifier.clone(), handle.clone());
///
/// // When routing a signaling event:
/// if let Some(target) = registry.lookup(&to) {
///     target.deliver(event)?;
/// }
///
/// // When the connection closes:
/// registry.unregister(&identifier, handle.id());
/// ```
pub struct ConnectionRegistry {
    connections: DashMap<Identifier, RegistryEntry>,
}

impl ConnectionRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection under an identifier.
    ///
    /// Unconditionally replaces any existing registration for the
    /// identifier, which covers a client reconnecting before its old
    /// connection is cleaned up. Returns the replaced entry, if any.
    #[instrument(skip(self, handle), fields(identifier = %identifier, connection_id = %handle.id()))]
    pub fn register(&self, identifier: Identifier, handle: ConnectionHandle) -> Option<RegistryEntry> {
        let entry = RegistryEntry {
            handle,
            registered_at: Utc::now(),
        };
        let existing = self.connections.insert(identifier, entry);
        match &existing {
            Some(previous) => debug!(
                previous_connection_id = %previous.handle.id(),
                previous_registered_at = %previous.registered_at,
                "Replaced existing registration"
            ),
            None => debug!("Registered connection"),
        }
        existing
    }

    /// Resolve an identifier to its live connection.
    ///
    /// The handle is cloned out, so no map lock is held by the caller.
    pub fn lookup(&self, identifier: &Identifier) -> Option<ConnectionHandle> {
        self.connections
            .get(identifier)
            .map(|entry| entry.value().handle.clone())
    }

    /// Remove the registration for `identifier`, but only if it still
    /// belongs to `connection_id`.
    ///
    /// If a newer connection has registered under the same identifier in
    /// the meantime, nothing is removed. Returns true if an entry was removed.
    #[instrument(skip(self), fields(identifier = %identifier, connection_id = %connection_id))]
    pub fn unregister(&self, identifier: &Identifier, connection_id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(identifier, |_, entry| entry.handle.id() == connection_id);
        if removed.is_some() {
            debug!("Unregistered connection");
            true
        } else {
            debug!("Registration absent or owned by a newer connection, left in place");
            false
        }
    }

    /// Check if an identifier currently has a live registration.
    pub fn is_registered(&self, identifier: &Identifier) -> bool {
        self.connections.contains_key(identifier)
    }

    /// Get the number of registered identifiers.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Remove registrations whose connection has gone away.
    ///
    /// Catches connections whose task ended without running its close hook.
    /// Each removal is guarded on the connection id observed during the scan.
    pub fn cleanup_stale(&self) -> usize {
        let stale: Vec<(Identifier, ConnectionId)> = self
            .connections
            .iter()
            .filter(|entry| entry.value().handle.is_closed())
            .map(|entry| (entry.key().clone(), entry.value().handle.id()))
            .collect();

        let mut removed = 0;
        for (identifier, connection_id) in stale {
            if self
                .connections
                .remove_if(&identifier, |_, entry| {
                    entry.handle.id() == connection_id && entry.handle.is_closed()
                })
                .is_some()
            {
                debug!(identifier = %identifier, connection_id = %connection_id, "Removed stale registration");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(count = removed, "Cleaned up stale registrations");
        }

        removed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

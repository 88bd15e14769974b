//! Connection Registry for signaling presence.
//!
//! This module provides a thread-safe registry that maps the identifier a
//! client registered under to the one live connection currently representing
//! it, so signaling events can be routed by identifier.
//!
//! ## Architecture
//!
//! Each connection owns the receiving end of a bounded channel; the registry
//! only stores a cloneable sender handle tagged with the connection's id.
//!
//! ```text
//! transport task (+1000) <-> ConnectionRegistry <-> transport task (+2000)
//!          |                        |                        |
//!          v                        v                        v
//!   mpsc::Receiver        DashMap<Identifier,         mpsc::Receiver
//!                          ConnectionHandle>
//! ```
//!
//! Removal is always guarded on the connection id: a connection that closes
//! after a newer connection registered under the same identifier leaves the
//! newer mapping in place.

mod connection_registry;

pub use connection_registry::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, Identifier, RegistryEntry,
};

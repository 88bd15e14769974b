//! # callrelay-signaling
//!
//! Presence-tracked signaling relay for establishing direct peer calls.
//!
//! Clients connect over a message-framed transport, announce the identifier
//! they want to be reached under, and exchange session descriptions and
//! connectivity candidates with each other by identifier. The relay never
//! inspects or stores those payloads.
//!
//! ## Architecture
//!
//! - **Registry**: concurrent index from identifier to the one live
//!   connection currently representing it.
//! - **Relay**: resolves the target of each signaling event through the
//!   registry and forwards it, or reports `call:unavailable` to the sender.
//! - **Session**: per-connection lifecycle glue. Decodes inbound frames,
//!   tracks which identifier the connection holds and releases it on close.
//!
//! ```text
//! transport task (A) -> ConnectionSession -> SignalingRelay -> ConnectionRegistry
//!                                                  |
//!                                                  v
//!                                      mpsc::Sender<ServerEvent> -> transport task (B)
//! ```
//!
//! The transport itself (WebSocket upgrade, socket I/O) lives in
//! `callrelay-server`.

pub mod protocol;
pub mod registry;
pub mod relay;
pub mod session;

mod error;

pub use error::{ProtocolError, SignalingError};
pub use protocol::{
    ClientEvent, ServerEvent, Signal, SignalFields, SignalKind, SignalPayload, SignalRequest,
};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, Identifier};
pub use relay::{DispatchOutcome, SignalingRelay};
pub use session::{ConnectionSession, SessionOutcome};

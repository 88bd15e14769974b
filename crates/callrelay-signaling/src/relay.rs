//! Signaling Relay.
//!
//! Forwards offer / answer / ice-candidate / hangup events between
//! identifiers. Payloads are opaque; the relay keeps no per-call state and
//! does not enforce any exchange order.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::SignalingError;
use crate::protocol::{ServerEvent, SignalRequest};
use crate::registry::{ConnectionHandle, ConnectionRegistry, Identifier};

/// What happened to a dispatched event.
///
/// Informational only: none of these is an error for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Malformed event, dropped without any response
    Dropped,
    /// Handed to the target connection's outbound path
    Forwarded,
    /// Target not reachable, `call:unavailable` sent back to the origin
    Unavailable,
    /// Target is not reading; its outbound channel was full and the event was dropped
    ChannelFull,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Dropped => write!(f, "dropped"),
            DispatchOutcome::Forwarded => write!(f, "forwarded"),
            DispatchOutcome::Unavailable => write!(f, "unavailable"),
            DispatchOutcome::ChannelFull => write!(f, "channel_full"),
        }
    }
}

/// Stateless forwarding service shared by every connection.
#[derive(Debug, Clone)]
pub struct SignalingRelay {
    registry: Arc<ConnectionRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this relay resolves identifiers against.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Route one signaling event from `origin` to its target identifier.
    ///
    /// Never waits on the target: delivery is a non-blocking enqueue, so a
    /// target that stops reading costs its senders dropped events rather than
    /// a stalled connection task. A connection's events are dispatched one
    /// after another by its own task, so events from one sender reach a
    /// target in the order sent.
    #[instrument(skip_all, fields(connection_id = %origin.id(), event = %request.kind))]
    pub async fn dispatch(&self, origin: &ConnectionHandle, request: SignalRequest) -> DispatchOutcome {
        let Some(signal) = request.validate() else {
            debug!("Dropping malformed signaling event");
            return DispatchOutcome::Dropped;
        };

        let (to, event) = signal.into_delivery();

        let Some(target) = self.registry.lookup(&to) else {
            debug!(to = %to, "Target not registered");
            return self.report_unavailable(origin, to);
        };

        match target.deliver(event) {
            Ok(()) => {
                debug!(to = %to, target_connection_id = %target.id(), "Forwarded signaling event");
                DispatchOutcome::Forwarded
            }
            Err(SignalingError::ChannelFull(target_id)) => {
                warn!(to = %to, target_connection_id = %target_id, "Target outbound channel full, dropping event");
                DispatchOutcome::ChannelFull
            }
            Err(e @ SignalingError::ConnectionClosed(_)) => {
                debug!(to = %to, error = %e, "Target connection gone, dropping its registration");
                self.registry.unregister(&to, target.id());
                self.report_unavailable(origin, to)
            }
        }
    }

    fn report_unavailable(&self, origin: &ConnectionHandle, to: Identifier) -> DispatchOutcome {
        let event = ServerEvent::Unavailable {
            to: to.into_string(),
        };
        if let Err(e) = origin.deliver(event) {
            debug!(error = %e, "Could not queue unavailable notice for origin");
        }
        DispatchOutcome::Unavailable
    }
}

//! Per-connection session state.
//!
//! A `ConnectionSession` lives inside one transport task. It remembers the
//! identifier the connection registered under, feeds decoded events to the
//! relay and releases the registration when the connection closes.

use tracing::{debug, info};

use crate::protocol::ClientEvent;
use crate::registry::{ConnectionHandle, Identifier};
use crate::relay::{DispatchOutcome, SignalingRelay};

/// Result of handling one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The connection is now registered under this identifier
    Registered(Identifier),
    /// Frame produced no action (undecodable, or an empty registration)
    Ignored,
    /// A signaling event went through the relay
    Dispatched(DispatchOutcome),
}

/// Signaling state of one open connection.
#[derive(Debug)]
pub struct ConnectionSession {
    relay: SignalingRelay,
    handle: ConnectionHandle,
    identifier: Option<Identifier>,
}

impl ConnectionSession {
    /// Start a session for a newly opened connection.
    ///
    /// Nothing is registered until the client sends `register`.
    pub fn open(relay: SignalingRelay, handle: ConnectionHandle) -> Self {
        debug!(connection_id = %handle.id(), "Signaling session opened");
        Self {
            relay,
            handle,
            identifier: None,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Identifier this connection is currently registered under.
    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    /// Decode and handle one text frame.
    pub async fn handle_text(&mut self, frame: &str) -> SessionOutcome {
        match ClientEvent::decode(frame) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                debug!(connection_id = %self.handle.id(), error = %e, "Dropping undecodable frame");
                SessionOutcome::Ignored
            }
        }
    }

    /// Handle one decoded client event.
    pub async fn handle_event(&mut self, event: ClientEvent) -> SessionOutcome {
        match event {
            ClientEvent::Register(identifier) => {
                match identifier.and_then(Identifier::new) {
                    Some(identifier) => {
                        self.register(identifier.clone());
                        SessionOutcome::Registered(identifier)
                    }
                    None => {
                        debug!(connection_id = %self.handle.id(), "Ignoring registration without identifier");
                        SessionOutcome::Ignored
                    }
                }
            }
            signal => match signal.into_signal_request() {
                Some(request) => {
                    SessionOutcome::Dispatched(self.relay.dispatch(&self.handle, request).await)
                }
                None => SessionOutcome::Ignored,
            },
        }
    }

    /// Register this connection under `identifier`.
    ///
    /// A connection holds one identifier at a time: switching to a different
    /// identifier releases the previous one first.
    pub fn register(&mut self, identifier: Identifier) {
        let registry = self.relay.registry();

        if let Some(previous) = self.identifier.take() {
            if previous != identifier {
                registry.unregister(&previous, self.handle.id());
            }
        }

        registry.register(identifier.clone(), self.handle.clone());
        info!(
            connection_id = %self.handle.id(),
            identifier = %identifier,
            "Connection registered"
        );
        self.identifier = Some(identifier);
    }

    /// Release this connection's registration.
    ///
    /// Must complete before the connection is considered closed so later
    /// lookups cannot resolve to it. A registration that a newer connection
    /// has taken over is left alone.
    pub fn close(self) {
        if let Some(identifier) = &self.identifier {
            let removed = self
                .relay
                .registry()
                .unregister(identifier, self.handle.id());
            info!(
                connection_id = %self.handle.id(),
                identifier = %identifier,
                removed,
                "Signaling session closed"
            );
        } else {
            debug!(connection_id = %self.handle.id(), "Signaling session closed before registering");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerEvent;
    use crate::registry::ConnectionRegistry;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn id(value: &str) -> Identifier {
        Identifier::new(value).unwrap()
    }

    fn open(relay: &SignalingRelay) -> (ConnectionSession, mpsc::Receiver<ServerEvent>) {
        let (handle, rx) = ConnectionHandle::channel(16);
        (ConnectionSession::open(relay.clone(), handle), rx)
    }

    fn relay() -> SignalingRelay {
        SignalingRelay::new(Arc::new(ConnectionRegistry::new()))
    }

    #[tokio::test]
    async fn test_register_frame() {
        let relay = relay();
        let (mut session, _rx) = open(&relay);

        let outcome = session
            .handle_text(r#"{"event":"register","data":"+1000"}"#)
            .await;

        assert_eq!(outcome, SessionOutcome::Registered(id("+1000")));
        assert_eq!(session.identifier(), Some(&id("+1000")));
        assert_eq!(
            relay.registry().lookup(&id("+1000")).unwrap().id(),
            session.handle().id()
        );
    }

    #[tokio::test]
    async fn test_empty_registration_is_ignored() {
        let relay = relay();
        let (mut session, _rx) = open(&relay);

        for frame in [
            r#"{"event":"register","data":""}"#,
            r#"{"event":"register","data":null}"#,
        ] {
            assert_eq!(session.handle_text(frame).await, SessionOutcome::Ignored);
        }
        assert!(session.identifier().is_none());
        assert_eq!(relay.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_ignored() {
        let relay = relay();
        let (mut session, mut rx) = open(&relay);

        assert_eq!(session.handle_text("{oops").await, SessionOutcome::Ignored);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_switching_identifier_releases_previous() {
        let relay = relay();
        let (mut session, _rx) = open(&relay);

        session.register(id("+1000"));
        session.register(id("+1001"));

        assert!(!relay.registry().is_registered(&id("+1000")));
        assert!(relay.registry().is_registered(&id("+1001")));
        assert_eq!(relay.registry().connection_count(), 1);
    }

    #[tokio::test]
    async fn test_close_unregisters() {
        let relay = relay();
        let (mut session, _rx) = open(&relay);

        session.register(id("+1000"));
        session.close();

        assert!(!relay.registry().is_registered(&id("+1000")));
    }

    #[tokio::test]
    async fn test_close_after_takeover_keeps_newer_registration() {
        let relay = relay();
        let (mut old, _rx_old) = open(&relay);
        let (mut new, _rx_new) = open(&relay);

        old.register(id("+1000"));
        new.register(id("+1000"));
        old.close();

        assert_eq!(
            relay.registry().lookup(&id("+1000")).unwrap().id(),
            new.handle().id()
        );
    }

    #[tokio::test]
    async fn test_signal_frame_is_dispatched() {
        let relay = relay();
        let (mut a, _rx_a) = open(&relay);
        let (mut b, mut rx_b) = open(&relay);
        a.register(id("+1000"));
        b.register(id("+2000"));

        let outcome = a
            .handle_text(r#"{"event":"call:hangup","data":{"to":"+2000","from":"+1000"}}"#)
            .await;

        assert_eq!(outcome, SessionOutcome::Dispatched(DispatchOutcome::Forwarded));
        assert_eq!(
            rx_b.try_recv().unwrap(),
            ServerEvent::Hangup {
                from: "+1000".to_string()
            }
        );
    }
}

//! Test utilities for driving the relay through simulated connections.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use callrelay_signaling::{
    ConnectionHandle, ConnectionRegistry, ConnectionSession, ServerEvent, SignalingRelay,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Default timeout for waiting on delivered events.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a tracing subscriber once so `RUST_LOG` works in tests.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A relay with its own empty registry.
pub fn new_relay() -> SignalingRelay {
    init_tracing();
    SignalingRelay::new(Arc::new(ConnectionRegistry::new()))
}

/// A simulated client: a session plus the receiving end of its outbound path.
pub struct TestClient {
    pub session: ConnectionSession,
    pub inbox: mpsc::Receiver<ServerEvent>,
}

impl TestClient {
    /// Open a connection without registering.
    pub fn connect(relay: &SignalingRelay) -> Self {
        let (handle, inbox) = ConnectionHandle::channel(32);
        Self {
            session: ConnectionSession::open(relay.clone(), handle),
            inbox,
        }
    }

    /// Open a connection and register it under `identifier`.
    pub async fn connect_as(relay: &SignalingRelay, identifier: &str) -> Self {
        let mut client = Self::connect(relay);
        client.send(&register_frame(identifier)).await;
        client
    }

    /// Send a raw text frame as if it came off the wire.
    pub async fn send(&mut self, frame: &str) {
        self.session.handle_text(frame).await;
    }

    /// Wait for the next delivered event.
    pub async fn recv(&mut self) -> ServerEvent {
        timeout(DEFAULT_TIMEOUT, self.inbox.recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Outbound channel closed")
    }

    /// Assert nothing has been delivered.
    pub fn assert_no_events(&mut self) {
        if let Ok(event) = self.inbox.try_recv() {
            panic!("Unexpected event delivered: {:?}", event);
        }
    }
}

pub fn register_frame(identifier: &str) -> String {
    serde_json::json!({"event": "register", "data": identifier}).to_string()
}

pub fn offer_frame(to: &str, from: &str, sdp: &str) -> String {
    serde_json::json!({
        "event": "call:offer",
        "data": {"to": to, "from": from, "offer": {"type": "offer", "sdp": sdp}}
    })
    .to_string()
}

pub fn answer_frame(to: &str, from: &str, sdp: &str) -> String {
    serde_json::json!({
        "event": "call:answer",
        "data": {"to": to, "from": from, "answer": {"type": "answer", "sdp": sdp}}
    })
    .to_string()
}

pub fn candidate_frame(to: &str, from: &str, candidate: &str) -> String {
    serde_json::json!({
        "event": "call:ice-candidate",
        "data": {"to": to, "from": from, "candidate": {"candidate": candidate, "sdpMid": "0"}}
    })
    .to_string()
}

pub fn hangup_frame(to: &str, from: &str) -> String {
    serde_json::json!({"event": "call:hangup", "data": {"to": to, "from": from}}).to_string()
}

//! Wire protocol for the signaling relay.
//!
//! Each transport frame carries one JSON event of the form
//! `{"event": "<name>", "data": <payload>}`.
//!
//! Client → server:
//! - `register`: data is the identifier string
//! - `call:offer`: `{to, from, offer}`
//! - `call:answer`: `{to, from, answer}`
//! - `call:ice-candidate`: `{to, from, candidate}`
//! - `call:hangup`: `{to, from}`
//!
//! Server → client:
//! - `call:offer` / `call:answer` / `call:ice-candidate`: `{from, <payload>}`
//! - `call:hangup`: `{from}`
//! - `call:unavailable`: `{to}`
//!
//! Session descriptions and candidates are opaque JSON values. They are
//! carried through unchanged and never inspected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::registry::Identifier;

/// Event sent by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announce the identifier this connection should be reachable under
    #[serde(rename = "register")]
    Register(Option<String>),
    #[serde(rename = "call:offer")]
    Offer(SignalFields),
    #[serde(rename = "call:answer")]
    Answer(SignalFields),
    #[serde(rename = "call:ice-candidate")]
    IceCandidate(SignalFields),
    #[serde(rename = "call:hangup")]
    Hangup(SignalFields),
}

impl ClientEvent {
    /// Decode a client event from a text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Split a signaling event into a relay request.
    ///
    /// Returns `None` for `register`, which is handled by the session.
    pub fn into_signal_request(self) -> Option<SignalRequest> {
        let (kind, fields) = match self {
            ClientEvent::Register(_) => return None,
            ClientEvent::Offer(fields) => (SignalKind::Offer, fields),
            ClientEvent::Answer(fields) => (SignalKind::Answer, fields),
            ClientEvent::IceCandidate(fields) => (SignalKind::IceCandidate, fields),
            ClientEvent::Hangup(fields) => (SignalKind::Hangup, fields),
        };
        Some(SignalRequest { kind, fields })
    }
}

impl FromStr for ClientEvent {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Raw fields of a signaling event as they arrived.
///
/// Everything is optional here: presence is checked by
/// [`SignalRequest::validate`], not by the decoder, so a frame with a
/// missing field is dropped by the relay instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Value>,
}

/// The four signaling event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    Hangup,
}

impl SignalKind {
    /// Wire event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "call:offer",
            SignalKind::Answer => "call:answer",
            SignalKind::IceCandidate => "call:ice-candidate",
            SignalKind::Hangup => "call:hangup",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unvalidated signaling event addressed to another identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRequest {
    pub kind: SignalKind,
    pub fields: SignalFields,
}

impl SignalRequest {
    pub fn new(kind: SignalKind, fields: SignalFields) -> Self {
        Self { kind, fields }
    }

    /// Check required fields and produce a routable signal.
    ///
    /// `to` and `from` must be non-empty. A whitespace-only identifier
    /// counts as empty, since `register` can never claim one; otherwise
    /// identifiers are used exactly as sent. Offer, answer and ice-candidate
    /// also need their payload, which must not be `null` or an empty string.
    /// Returns `None` for anything malformed.
    pub fn validate(self) -> Option<Signal> {
        let SignalFields {
            to,
            from,
            offer,
            answer,
            candidate,
        } = self.fields;

        let to = Identifier::new(to?)?;
        let from = Identifier::new(from?)?;

        let payload = match self.kind {
            SignalKind::Offer => SignalPayload::Offer(opaque_payload(offer)?),
            SignalKind::Answer => SignalPayload::Answer(opaque_payload(answer)?),
            SignalKind::IceCandidate => SignalPayload::IceCandidate(opaque_payload(candidate)?),
            SignalKind::Hangup => SignalPayload::Hangup,
        };

        Some(Signal { to, from, payload })
    }
}

fn opaque_payload(value: Option<Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(other),
    }
}

/// Kind-specific payload of a validated signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPayload {
    Offer(Value),
    Answer(Value),
    IceCandidate(Value),
    Hangup,
}

/// A validated signaling event ready to be routed.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub to: Identifier,
    pub from: Identifier,
    pub payload: SignalPayload,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self.payload {
            SignalPayload::Offer(_) => SignalKind::Offer,
            SignalPayload::Answer(_) => SignalKind::Answer,
            SignalPayload::IceCandidate(_) => SignalKind::IceCandidate,
            SignalPayload::Hangup => SignalKind::Hangup,
        }
    }

    /// Target identifier and the event to hand to the target's connection.
    pub fn into_delivery(self) -> (Identifier, ServerEvent) {
        let from = self.from.into_string();
        let event = match self.payload {
            SignalPayload::Offer(offer) => ServerEvent::Offer { from, offer },
            SignalPayload::Answer(answer) => ServerEvent::Answer { from, answer },
            SignalPayload::IceCandidate(candidate) => ServerEvent::IceCandidate { from, candidate },
            SignalPayload::Hangup => ServerEvent::Hangup { from },
        };
        (self.to, event)
    }
}

/// Event sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "call:offer")]
    Offer { from: String, offer: Value },
    #[serde(rename = "call:answer")]
    Answer { from: String, answer: Value },
    #[serde(rename = "call:ice-candidate")]
    IceCandidate { from: String, candidate: Value },
    #[serde(rename = "call:hangup")]
    Hangup { from: String },
    /// The identifier the sender tried to reach has no live connection
    #[serde(rename = "call:unavailable")]
    Unavailable { to: String },
}

impl ServerEvent {
    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Offer { .. } => "call:offer",
            ServerEvent::Answer { .. } => "call:answer",
            ServerEvent::IceCandidate { .. } => "call:ice-candidate",
            ServerEvent::Hangup { .. } => "call:hangup",
            ServerEvent::Unavailable { .. } => "call:unavailable",
        }
    }
}

impl FromStr for ServerEvent {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

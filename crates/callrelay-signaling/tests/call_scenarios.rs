//! End-to-end call setup scenarios driven through connection sessions.

mod common;

use callrelay_signaling::{Identifier, ServerEvent};
use common::*;
use serde_json::json;

fn id(value: &str) -> Identifier {
    Identifier::new(value).unwrap()
}

#[tokio::test]
async fn offer_is_delivered_only_to_target() {
    let relay = new_relay();
    let mut alice = TestClient::connect_as(&relay, "+1000").await;
    let mut bob = TestClient::connect_as(&relay, "+2000").await;

    alice.send(&offer_frame("+2000", "+1000", "v=0...")).await;

    assert_eq!(
        bob.recv().await,
        ServerEvent::Offer {
            from: "+1000".to_string(),
            offer: json!({"type": "offer", "sdp": "v=0..."}),
        }
    );
    bob.assert_no_events();
    alice.assert_no_events();
}

#[tokio::test]
async fn never_registered_target_is_unavailable() {
    let relay = new_relay();
    let mut alice = TestClient::connect_as(&relay, "+1000").await;

    alice.send(&hangup_frame("+9999", "+1000")).await;

    assert_eq!(
        alice.recv().await,
        ServerEvent::Unavailable {
            to: "+9999".to_string()
        }
    );
    alice.assert_no_events();
}

#[tokio::test]
async fn answer_and_candidate_to_departed_peer_are_unavailable() {
    let relay = new_relay();
    let mut alice = TestClient::connect_as(&relay, "+1000").await;
    let bob = TestClient::connect_as(&relay, "+2000").await;

    bob.session.close();

    alice.send(&answer_frame("+2000", "+1000", "v=0 alice")).await;
    alice.send(&candidate_frame("+2000", "+1000", "candidate:1")).await;

    for _ in 0..2 {
        assert_eq!(
            alice.recv().await,
            ServerEvent::Unavailable {
                to: "+2000".to_string()
            }
        );
    }
    alice.assert_no_events();
}

#[tokio::test]
async fn disconnected_target_is_unavailable() {
    let relay = new_relay();
    let alice = TestClient::connect_as(&relay, "+1000").await;
    let mut bob = TestClient::connect_as(&relay, "+2000").await;

    alice.session.close();

    bob.send(&offer_frame("+1000", "+2000", "v=0...")).await;

    assert_eq!(
        bob.recv().await,
        ServerEvent::Unavailable {
            to: "+1000".to_string()
        }
    );
}

#[tokio::test]
async fn stale_close_after_reconnect_keeps_new_connection() {
    let relay = new_relay();
    let stale = TestClient::connect_as(&relay, "+1000").await;
    let mut reconnected = TestClient::connect_as(&relay, "+1000").await;
    let mut bob = TestClient::connect_as(&relay, "+2000").await;

    // The old connection's close handler fires after the reconnect
    stale.session.close();

    assert_eq!(
        relay.registry().lookup(&id("+1000")).unwrap().id(),
        reconnected.session.handle().id()
    );

    bob.send(&offer_frame("+1000", "+2000", "v=0...")).await;

    assert_eq!(
        reconnected.recv().await,
        ServerEvent::Offer {
            from: "+2000".to_string(),
            offer: json!({"type": "offer", "sdp": "v=0..."}),
        }
    );
    bob.assert_no_events();
}

#[tokio::test]
async fn full_call_exchange_preserves_order() {
    let relay = new_relay();
    let mut alice = TestClient::connect_as(&relay, "+1000").await;
    let mut bob = TestClient::connect_as(&relay, "+2000").await;

    alice.send(&offer_frame("+2000", "+1000", "v=0 alice")).await;
    alice.send(&candidate_frame("+2000", "+1000", "candidate:1")).await;
    alice.send(&candidate_frame("+2000", "+1000", "candidate:2")).await;

    assert_eq!(bob.recv().await.name(), "call:offer");
    match bob.recv().await {
        ServerEvent::IceCandidate { from, candidate } => {
            assert_eq!(from, "+1000");
            assert_eq!(candidate["candidate"], "candidate:1");
        }
        other => panic!("Expected first candidate, got {:?}", other),
    }
    match bob.recv().await {
        ServerEvent::IceCandidate { candidate, .. } => {
            assert_eq!(candidate["candidate"], "candidate:2")
        }
        other => panic!("Expected second candidate, got {:?}", other),
    }

    bob.send(&answer_frame("+1000", "+2000", "v=0 bob")).await;
    assert_eq!(
        alice.recv().await,
        ServerEvent::Answer {
            from: "+2000".to_string(),
            answer: json!({"type": "answer", "sdp": "v=0 bob"}),
        }
    );

    alice.send(&hangup_frame("+2000", "+1000")).await;
    assert_eq!(
        bob.recv().await,
        ServerEvent::Hangup {
            from: "+1000".to_string()
        }
    );

    alice.assert_no_events();
    bob.assert_no_events();
}

#[tokio::test]
async fn malformed_events_produce_no_feedback() {
    let relay = new_relay();
    let mut alice = TestClient::connect_as(&relay, "+1000").await;
    let mut bob = TestClient::connect_as(&relay, "+2000").await;

    alice
        .send(r#"{"event":"call:offer","data":{"to":"+2000","from":"+1000"}}"#)
        .await;
    alice
        .send(r#"{"event":"call:answer","data":{"from":"+1000","answer":{"sdp":"x"}}}"#)
        .await;
    alice.send(r#"{"event":"call:hangup","data":{"to":"+9999"}}"#).await;
    alice.send("definitely not json").await;

    alice.assert_no_events();
    bob.assert_no_events();
}

#[tokio::test]
async fn concurrent_senders_each_keep_their_order() {
    let relay = new_relay();
    let mut target = TestClient::connect_as(&relay, "+3000").await;

    let mut senders = Vec::new();
    for n in 0..4 {
        let relay = relay.clone();
        senders.push(tokio::spawn(async move {
            let me = format!("+10{}", n);
            let mut client = TestClient::connect_as(&relay, &me).await;
            for i in 0..5 {
                client
                    .send(&candidate_frame("+3000", &me, &format!("candidate:{}", i)))
                    .await;
            }
            client
        }));
    }

    let mut _clients = Vec::new();
    for sender in senders {
        _clients.push(sender.await.unwrap());
    }

    let mut last_seen = std::collections::HashMap::new();
    for _ in 0..20 {
        match target.recv().await {
            ServerEvent::IceCandidate { from, candidate } => {
                let seq: i64 = candidate["candidate"]
                    .as_str()
                    .unwrap()
                    .trim_start_matches("candidate:")
                    .parse()
                    .unwrap();
                let previous = last_seen.insert(from, seq).unwrap_or(-1);
                assert!(seq > previous, "events from one sender were reordered");
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }
    target.assert_no_events();
}

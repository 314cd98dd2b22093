//! Two client calls talking through an in-process relay router

use async_trait::async_trait;
use callrelay_client_core::{
    CallOutcome, ClientCall, ClientCallState, ConnectionState, EndpointController, Result,
};
use callrelay_signaling_core::{
    ClientMessage, EndReason, NegotiationPayload, ServerMessage, SignalingConnection,
    SignalingRouter,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Default)]
struct FakePeerConnection {
    ops: Mutex<Vec<String>>,
}

impl FakePeerConnection {
    fn saw(&self, op: &str) -> bool {
        self.ops.lock().iter().any(|recorded| recorded == op)
    }
}

#[async_trait]
impl EndpointController for FakePeerConnection {
    async fn attach_local_audio(&self) -> Result<()> {
        self.ops.lock().push("attach".to_string());
        Ok(())
    }

    async fn create_offer(&self) -> Result<NegotiationPayload> {
        Ok(json!({"type": "offer", "sdp": "v=0 offer"}))
    }

    async fn create_answer(&self, offer: &NegotiationPayload) -> Result<NegotiationPayload> {
        assert!(self.saw("remote:offer"), "answer created before the offer was applied");
        assert_eq!(offer["type"], "offer");
        Ok(json!({"type": "answer", "sdp": "v=0 answer"}))
    }

    async fn set_local_description(&self, _description: &NegotiationPayload) -> Result<()> {
        Ok(())
    }

    async fn set_remote_description(&self, description: &NegotiationPayload) -> Result<()> {
        let kind = description["type"].as_str().unwrap_or("unknown");
        self.ops.lock().push(format!("remote:{}", kind));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &NegotiationPayload) -> Result<()> {
        let name = candidate["candidate"].as_str().unwrap_or("unknown");
        self.ops.lock().push(format!("ice:{}", name));
        Ok(())
    }

    fn close(&self) {
        self.ops.lock().push("close".to_string());
    }
}

struct Endpoint {
    call: ClientCall<FakePeerConnection>,
    conn: Arc<SignalingConnection>,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Endpoint {
    fn join(router: &SignalingRouter, name: &str) -> Self {
        let (conn, rx) = SignalingConnection::new(None);
        let endpoint = Self {
            call: ClientCall::new(FakePeerConnection::default()),
            conn: Arc::new(conn),
            rx,
        };
        endpoint.send(router, vec![ClientMessage::Join { identifier: name.into() }]);
        endpoint
    }

    fn send(&self, router: &SignalingRouter, messages: Vec<ClientMessage>) {
        for message in messages {
            // Rejections come back as messages
            let _ = router.handle(&self.conn, message);
        }
    }
}

/// Deliver relay messages until nobody has anything left to say
async fn settle(router: &SignalingRouter, endpoints: &mut [&mut Endpoint]) {
    loop {
        let mut progressed = false;
        for endpoint in endpoints.iter_mut() {
            while let Ok(message) = endpoint.rx.try_recv() {
                progressed = true;
                let out = endpoint.call.handle(message).await.unwrap();
                endpoint.send(router, out);
            }
        }
        if !progressed {
            break;
        }
    }
}

#[tokio::test]
async fn test_alice_calls_bob() {
    let router = SignalingRouter::new();
    let mut alice = Endpoint::join(&router, "alice");
    let mut bob = Endpoint::join(&router, "bob");

    let out = alice.call.dial("bob".into()).await.unwrap();
    alice.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    assert_eq!(bob.call.state(), ClientCallState::Ringing);
    assert_eq!(alice.call.session_id(), bob.call.session_id());

    let out = bob.call.accept().await.unwrap();
    bob.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    assert_eq!(alice.call.state(), ClientCallState::Negotiating);
    assert_eq!(bob.call.state(), ClientCallState::Negotiating);
    assert!(alice.call.controller().saw("remote:answer"));

    let out = alice.call.on_local_candidate(json!({"candidate": "a1"}));
    alice.send(&router, out);
    let out = bob.call.on_local_candidate(json!({"candidate": "b1"}));
    bob.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    assert!(bob.call.controller().saw("ice:a1"));
    assert!(alice.call.controller().saw("ice:b1"));

    let out = alice.call.on_connection_state(ConnectionState::Connected);
    alice.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    assert_eq!(alice.call.state(), ClientCallState::Negotiating);

    let out = bob.call.on_connection_state(ConnectionState::Connected);
    bob.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    assert_eq!(alice.call.state(), ClientCallState::Active);
    assert_eq!(bob.call.state(), ClientCallState::Active);

    let out = bob.call.hang_up();
    bob.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    assert_eq!(alice.call.outcome(), Some(&CallOutcome::Ended(EndReason::Hangup)));
    assert_eq!(bob.call.outcome(), Some(&CallOutcome::HungUp));
    assert!(alice.call.controller().saw("close"));
    assert!(bob.call.controller().saw("close"));
    assert!(router.sessions().is_empty());
}

#[tokio::test]
async fn test_calling_someone_who_has_not_joined() {
    let router = SignalingRouter::new();
    let mut alice = Endpoint::join(&router, "alice");

    let out = alice.call.dial("carol".into()).await.unwrap();
    alice.send(&router, out);
    settle(&router, &mut [&mut alice]).await;
    assert_eq!(alice.call.outcome(), Some(&CallOutcome::Unavailable("carol".into())));

    // carol shows up; the next attempt rings
    let mut carol = Endpoint::join(&router, "carol");
    alice.call.reset().unwrap();
    let out = alice.call.dial("carol".into()).await.unwrap();
    alice.send(&router, out);
    settle(&router, &mut [&mut alice, &mut carol]).await;
    assert_eq!(carol.call.state(), ClientCallState::Ringing);
    assert_eq!(alice.call.state(), ClientCallState::Dialing);
}

#[tokio::test]
async fn test_peer_dropping_mid_negotiation_closes_media() {
    let router = SignalingRouter::new();
    let mut alice = Endpoint::join(&router, "alice");
    let mut bob = Endpoint::join(&router, "bob");

    let out = alice.call.dial("bob".into()).await.unwrap();
    alice.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    let out = bob.call.accept().await.unwrap();
    bob.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;

    router.disconnect(&bob.conn);
    settle(&router, &mut [&mut alice]).await;

    assert_eq!(
        alice.call.outcome(),
        Some(&CallOutcome::Ended(EndReason::PeerDisconnected))
    );
    assert!(alice.call.controller().saw("close"));
}

#[tokio::test]
async fn test_crossed_calls_settle_on_one_session() {
    let router = SignalingRouter::new();
    let mut alice = Endpoint::join(&router, "alice");
    let mut bob = Endpoint::join(&router, "bob");

    // Both dial before either hears from the relay
    let out = alice.call.dial("bob".into()).await.unwrap();
    alice.send(&router, out);
    let out = bob.call.dial("alice".into()).await.unwrap();
    bob.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;

    assert_eq!(router.sessions().len(), 1);
    assert_eq!(alice.call.state(), ClientCallState::Dialing);
    assert_eq!(bob.call.state(), ClientCallState::Ringing);
    assert_eq!(bob.call.outcome(), None);
    assert_eq!(alice.call.session_id(), bob.call.session_id());

    let out = bob.call.accept().await.unwrap();
    bob.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    assert_eq!(alice.call.state(), ClientCallState::Negotiating);
    assert_eq!(bob.call.state(), ClientCallState::Negotiating);
    assert!(bob.call.controller().saw("remote:offer"));
    assert!(alice.call.controller().saw("remote:answer"));

    let out = alice.call.hang_up();
    alice.send(&router, out);
    settle(&router, &mut [&mut alice, &mut bob]).await;
    assert_eq!(bob.call.outcome(), Some(&CallOutcome::Ended(EndReason::Hangup)));
    assert!(router.sessions().is_empty());
}

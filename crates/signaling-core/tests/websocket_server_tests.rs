//! End-to-end tests over real WebSocket connections

use callrelay_signaling_core::{
    ClientMessage, EndReason, ErrorKind, Identifier, RelayConfig, ServerMessage, SessionId, SignalingServer,
};
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestRelay {
    addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

async fn start_relay() -> TestRelay {
    let config = RelayConfig::new().with_bind_address("127.0.0.1:0");
    let server = SignalingServer::bind(config).await.unwrap();
    let addr = server.local_addr();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let _ = server
            .run_until(async move {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    TestRelay {
        addr,
        _shutdown: shutdown_tx,
    }
}

async fn connect(relay: &TestRelay) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}/ws", relay.addr)).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, message: ClientMessage) {
    ws.send(Message::Text(message.to_json().unwrap())).await.unwrap();
}

async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(&text).unwrap();
        }
    }
}

async fn join(relay: &TestRelay, name: &str) -> Ws {
    let mut ws = connect(relay).await;
    send(&mut ws, ClientMessage::Join { identifier: name.into() }).await;
    assert_eq!(recv(&mut ws).await, ServerMessage::Joined { identifier: name.into() });
    ws
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_call_over_websocket() {
    let relay = start_relay().await;
    let mut alice = join(&relay, "alice").await;
    let mut bob = join(&relay, "bob").await;

    send(&mut alice, ClientMessage::Call { receiver_identifier: "bob".into() }).await;
    let session_id = match recv(&mut bob).await {
        ServerMessage::IncomingCall {
            session_id,
            caller_identifier,
        } => {
            assert_eq!(caller_identifier, Identifier::from("alice"));
            session_id
        }
        other => panic!("unexpected {:?}", other),
    };
    assert!(matches!(recv(&mut alice).await, ServerMessage::CallPlaced { .. }));

    send(
        &mut bob,
        ClientMessage::AcceptCall {
            session_id: Some(session_id.clone()),
            caller_identifier: None,
        },
    )
    .await;
    assert_eq!(
        recv(&mut alice).await,
        ServerMessage::CallAccepted { session_id: session_id.clone() }
    );

    let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n"});
    send(
        &mut alice,
        ClientMessage::Offer { session_id: session_id.clone(), payload: offer.clone() },
    )
    .await;
    assert_eq!(
        recv(&mut bob).await,
        ServerMessage::Offer { session_id: session_id.clone(), payload: offer }
    );

    let answer = json!({"type": "answer", "sdp": "v=0\r\n"});
    send(
        &mut bob,
        ClientMessage::Answer { session_id: session_id.clone(), payload: answer.clone() },
    )
    .await;
    assert_eq!(
        recv(&mut alice).await,
        ServerMessage::Answer { session_id: session_id.clone(), payload: answer }
    );

    send(&mut alice, ClientMessage::Connected { session_id: session_id.clone() }).await;
    send(&mut bob, ClientMessage::Connected { session_id: session_id.clone() }).await;
    let connected = ServerMessage::CallConnected { session_id: session_id.clone() };
    assert_eq!(recv(&mut alice).await, connected);
    assert_eq!(recv(&mut bob).await, connected);

    send(
        &mut bob,
        ClientMessage::EndCall {
            session_id: Some(session_id.clone()),
            peer_identifier: None,
        },
    )
    .await;
    assert_eq!(
        recv(&mut alice).await,
        ServerMessage::CallEnded { session_id, reason: EndReason::Hangup }
    );
}

#[tokio::test]
async fn test_closing_socket_ends_call() {
    let relay = start_relay().await;
    let mut alice = join(&relay, "alice").await;
    let mut bob = join(&relay, "bob").await;

    send(&mut alice, ClientMessage::Call { receiver_identifier: "bob".into() }).await;
    let _incoming = recv(&mut bob).await;
    let session_id: SessionId = match recv(&mut alice).await {
        ServerMessage::CallPlaced { session_id, .. } => session_id,
        other => panic!("unexpected {:?}", other),
    };

    bob.close(None).await.unwrap();

    assert_eq!(
        recv(&mut alice).await,
        ServerMessage::CallEnded { session_id, reason: EndReason::PeerDisconnected }
    );

    send(&mut alice, ClientMessage::Call { receiver_identifier: "bob".into() }).await;
    assert_eq!(
        recv(&mut alice).await,
        ServerMessage::UserUnavailable { identifier: "bob".into() }
    );
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_connection_survives() {
    let relay = start_relay().await;
    let mut ws = connect(&relay).await;

    ws.send(Message::Text("{\"type\":\"teleport\"}".to_string())).await.unwrap();
    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Malformed),
        other => panic!("unexpected {:?}", other),
    }

    send(&mut ws, ClientMessage::Join { identifier: "dave".into() }).await;
    assert_eq!(recv(&mut ws).await, ServerMessage::Joined { identifier: "dave".into() });
}

#[tokio::test]
async fn test_health_and_stats_endpoints() {
    let relay = start_relay().await;
    let _alice = join(&relay, "alice").await;

    let health = http_get(relay.addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"));
    assert!(health.ends_with("ok"));

    let stats = http_get(relay.addr, "/stats").await;
    assert!(stats.starts_with("HTTP/1.1 200"));
    assert!(stats.contains("\"online\":1"));
}

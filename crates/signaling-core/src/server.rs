//! WebSocket transport for the signaling router
//!
//! One task per socket reads text frames and hands them to the router; a
//! second task drains the connection's outbound queue into the socket. The
//! router never awaits on a socket.

use crate::config::RelayConfig;
use crate::error::Result;
use crate::router::{RelayStats, SignalingConnection, SignalingRouter};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// HTTP routes: `/health`, `/stats` and the WebSocket endpoint
pub fn app(router: Arc<SignalingRouter>, ws_path: &str) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route(ws_path, get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(router)
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(router): State<Arc<SignalingRouter>>) -> Json<RelayStats> {
    Json(router.stats())
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(router): State<Arc<SignalingRouter>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, remote, router))
}

async fn serve_socket(socket: WebSocket, remote: SocketAddr, router: Arc<SignalingRouter>) {
    let (conn, mut outbound) = SignalingConnection::new(Some(remote));
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    info!("WebSocket connection {} from {}", conn_id, remote);

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode outbound message on {}: {}", conn_id, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Write to {} failed: {}", conn_id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // Rejections are already reported to the client
                let _ = router.handle_frame(&conn, &text);
            }
            Ok(Message::Binary(bytes)) => {
                let _ = router.handle_frame(&conn, &String::from_utf8_lossy(&bytes));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Read from {} failed: {}", conn_id, e);
                break;
            }
        }
    }

    router.disconnect(&conn);
    // Last sender goes away here, so the writer flushes and stops
    drop(conn);
    let _ = writer.await;
    info!("WebSocket connection {} closed", conn_id);
}

/// Bound relay server
pub struct SignalingServer {
    config: RelayConfig,
    router: Arc<SignalingRouter>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SignalingServer {
    /// Bind the listener; the server does not accept until run
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.socket_addr()?).await?;
        let local_addr = listener.local_addr()?;
        let router = Arc::new(SignalingRouter::with_retention(
            config.terminated_session_retention,
        ));

        info!("Signaling relay listening on {}{}", local_addr, config.ws_path);
        Ok(Self {
            config,
            router,
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn router(&self) -> Arc<SignalingRouter> {
        self.router.clone()
    }

    /// Serve until the process is stopped
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = app(self.router, &self.config.ws_path);
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("Signaling relay stopped");
        Ok(())
    }
}

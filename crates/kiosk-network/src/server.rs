//! Serving surface for display clients.
//!
//! ```text
//! GET /        ──► kiosk page (embedded HTML)
//! GET /ws      ──► WebSocket, one text frame per scan result:
//!                  {"event":"scan_result","data":{"status":..,"card_id":..,"msg":..}}
//! GET /health  ──► {"status":"ok","subscribers":N}
//! ```
//!
//! The server never touches the reader. It only subscribes to the
//! [`EventBroadcaster`] that the poll loop publishes to.
//!
//! # Example Usage
//!
//! ```no_run
//! use kiosk_network::{EventBroadcaster, KioskServer};
//! use tokio::sync::watch;
//!
//! # async fn example() -> kiosk_network::Result<()> {
//! let broadcaster = EventBroadcaster::new(64);
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let server = KioskServer::bind("0.0.0.0:5000".parse().unwrap(), broadcaster, shutdown_rx).await?;
//! let task = tokio::spawn(server.serve());
//!
//! // ... later
//! shutdown_tx.send(true).ok();
//! task.await.ok();
//! # Ok(())
//! # }
//! ```

use crate::broadcaster::{EventBroadcaster, Subscription};
use crate::error::{NetworkError, Result};
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{Html, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use kiosk_core::ScanResultMessage;
use kiosk_core::constants::SCAN_RESULT_EVENT;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Envelope of every message pushed to display clients.
#[derive(Debug, Serialize)]
struct EventEnvelope<'a> {
    event: &'static str,
    data: &'a ScanResultMessage,
}

/// Encode a scan result as the text frame sent to display clients.
///
/// # Examples
///
/// ```
/// use kiosk_core::{ScanResultMessage, ScanStatus};
/// use kiosk_network::server::encode_scan_result;
///
/// let message = ScanResultMessage {
///     status: ScanStatus::Success,
///     card_id: "04A1B2C3".to_string(),
///     msg: None,
/// };
/// assert_eq!(
///     encode_scan_result(&message).unwrap(),
///     r#"{"event":"scan_result","data":{"status":"success","card_id":"04A1B2C3"}}"#
/// );
/// ```
pub fn encode_scan_result(message: &ScanResultMessage) -> serde_json::Result<String> {
    serde_json::to_string(&EventEnvelope {
        event: SCAN_RESULT_EVENT,
        data: message,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    subscribers: usize,
}

#[derive(Debug, Clone)]
struct AppState {
    broadcaster: EventBroadcaster,
    shutdown: watch::Receiver<bool>,
}

/// Resolve once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Build the router without binding, e.g. for embedding.
pub fn router(broadcaster: EventBroadcaster, shutdown: watch::Receiver<bool>) -> Router {
    let state = AppState {
        broadcaster,
        shutdown,
    };

    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscribers: state.broadcaster.subscriber_count(),
    })
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Subscribe before the upgrade so nothing published after the handshake
    // is missed
    let subscription = state.broadcaster.subscribe();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| ws_session(socket, subscription, shutdown))
}

async fn ws_session(
    socket: WebSocket,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    let session = Uuid::new_v4();
    info!(%session, "Display client connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else { break };
                let text = match encode_scan_result(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(%session, error = %e, "Failed to encode scan result");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(other)) => debug!(%session, ?other, "Ignoring client message"),
                }
            }
            _ = shutdown_requested(&mut shutdown) => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    info!(%session, "Display client disconnected");
}

/// HTTP + WebSocket server for the kiosk page.
#[derive(Debug)]
pub struct KioskServer {
    listener: TcpListener,
    router: Router,
    shutdown: watch::Receiver<bool>,
    local_addr: SocketAddr,
}

impl KioskServer {
    /// Bind the server. Nothing is served until [`serve`](Self::serve).
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::BindFailed` if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        broadcaster: EventBroadcaster,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetworkError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| NetworkError::BindFailed { addr, source })?;

        info!(addr = %local_addr, "Kiosk server listening");

        Ok(Self {
            listener,
            router: router(broadcaster, shutdown.clone()),
            shutdown,
            local_addr,
        })
    }

    /// Get the bound address (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until shutdown is requested, then drain open connections.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Serve` if the accept loop fails.
    pub async fn serve(self) -> Result<()> {
        let mut shutdown = self.shutdown;

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await })
            .await
            .map_err(NetworkError::Serve)?;

        info!("Kiosk server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::ScanStatus;

    #[test]
    fn test_encode_error_result_includes_msg() {
        let message = ScanResultMessage {
            status: ScanStatus::Error,
            card_id: "04A1B2C3".to_string(),
            msg: Some("Server could not be reached (connection failed)".to_string()),
        };

        let value: serde_json::Value =
            serde_json::from_str(&encode_scan_result(&message).unwrap()).unwrap();
        assert_eq!(value["event"], "scan_result");
        assert_eq!(value["data"]["status"], "error");
        assert_eq!(value["data"]["card_id"], "04A1B2C3");
        assert_eq!(
            value["data"]["msg"],
            "Server could not be reached (connection failed)"
        );
    }

    #[test]
    fn test_index_page_connects_to_ws() {
        assert!(INDEX_HTML.contains("/ws"));
        assert!(INDEX_HTML.contains("scan_result"));
    }

    #[tokio::test]
    async fn test_shutdown_requested_on_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        shutdown_requested(&mut rx).await;
    }
}

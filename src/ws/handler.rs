//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::lobby::LobbyManager;
use crate::util::rate_limit::ClientRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// How often the server pings each client. A client that sent nothing
/// since the previous ping is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Last time anything arrived from a client
#[derive(Debug)]
pub struct Liveness {
    last_seen: Mutex<Instant>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn seen_since(&self, instant: Instant) -> bool {
        *self.last_seen.lock() >= instant
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    info!(client_id = %client_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Register before greeting so nothing addressed to the client is lost
    let outbound_rx = state.lobbies.register_client(client_id);

    if let Err(e) = send_msg(&mut ws_sink, &ServerMsg::Connected { client_id }).await {
        error!(client_id = %client_id, error = %e, "Failed to send welcome");
        state.lobbies.unregister_client(client_id);
        return;
    }

    run_session(client_id, &state.lobbies, ws_sink, ws_stream, outbound_rx).await;

    // Cleanup on disconnect
    state.lobbies.unregister_client(client_id);

    info!(client_id = %client_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    client_id: Uuid,
    lobbies: &LobbyManager,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = ClientRateLimiter::new();
    let liveness = Arc::new(Liveness::new());

    // Spawn writer task: outbound queue and heartbeats -> WebSocket
    let writer_liveness = liveness.clone();
    let mut writer_handle = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick completes immediately
        heartbeat.tick().await;
        let mut last_ping: Option<Instant> = None;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(client_id = %client_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if let Some(sent) = last_ping {
                        if !writer_liveness.seen_since(sent) {
                            info!(client_id = %client_id, "Heartbeat missed, closing connection");
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    last_ping = Some(Instant::now());
                    if ws_sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader loop: WebSocket -> lobby service / room
    loop {
        let frame = tokio::select! {
            frame = ws_stream.next() => frame,
            _ = &mut writer_handle => {
                debug!(client_id = %client_id, "Writer finished");
                return;
            }
        };

        let Some(result) = frame else { break };
        liveness.touch();

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(client_id = %client_id, "Rate limited client message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => lobbies.handle_message(client_id, client_msg),
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(client_id = %client_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(client_id = %client_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(client_id = %client_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(client_id = %client_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(client_id = %client_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

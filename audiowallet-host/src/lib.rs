//! The venue host: a single process that announces itself, accepts durable
//! bidirectional client sessions, owns the room/peer/file-index state, and
//! brokers relay transfers (§1-§2). `Host` wires components A-F together;
//! [`dispatcher::Dispatcher`] is component G.

pub mod announcer;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod index;
pub mod registry;
pub mod relay;
pub mod room;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use audiowallet_core::{
    CloseReason, ErrorCode, Message, BINARY_FRAME_OVERHEAD, DEFAULT_MAX_TEXT_FRAME_BYTES,
};
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{self, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::announcer::Advertisement;
use crate::config::HostConfig;
use crate::dispatcher::{Dispatcher, now_ms};
use crate::error::HostError;
use crate::index::FileIndex;
use crate::registry::PeerRegistry;
use crate::relay::RelayBroker;
use crate::room::RoomManager;
use crate::session::Outbound;

fn random_hex_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    config: Arc<HostConfig>,
}

/// The assembled venue host: every subsystem (§4.A-F), the dispatcher
/// (§4.G), and the background tasks that drive liveness and relay
/// timeouts (§5).
pub struct Host {
    config: Arc<HostConfig>,
    dispatcher: Arc<Dispatcher>,
    liveness_task: JoinHandle<()>,
    relay_sweep_task: JoinHandle<()>,
    announcer_join: Option<JoinHandle<()>>,
}

impl Host {
    /// Assembles every subsystem from `config` and starts the background
    /// sweep tasks. The room is created immediately (§3 Room lifecycle:
    /// "created at host startup").
    pub fn new(config: HostConfig) -> Self {
        let config = Arc::new(config);
        let host_peer_id = random_hex_id();
        let room_id = random_hex_id();
        let now = now_ms();

        let room = Arc::new(RoomManager::new(
            room_id.clone(),
            config.room_name.clone(),
            config.locked,
            now,
            host_peer_id.clone(),
        ));
        let registry = Arc::new(PeerRegistry::new());
        let index = Arc::new(FileIndex::new(config.max_file_bytes));
        let relay = Arc::new(RelayBroker::new(
            config.max_in_flight_bytes_per_transfer,
            config.idle_transfer_timeout_ms,
            audiowallet_core::TRANSFER_LINGER_MS,
        ));

        let announcer = if config.announce {
            let (handle, join) = announcer::spawn(Advertisement {
                room_name: config.room_name.clone(),
                room_id: room_id.clone(),
                locked: config.locked,
                port: config.port,
            });
            (Some(handle), Some(join))
        } else {
            (None, None)
        };

        let dispatcher = Arc::new(Dispatcher {
            registry,
            room,
            index,
            relay,
            announcer: announcer.0,
            config: config.clone(),
            host_peer_id,
        });

        let liveness_task = spawn_liveness_sweep(dispatcher.clone(), config.heartbeat_interval_ms);
        let relay_sweep_task = spawn_relay_sweep(dispatcher.clone());

        Host {
            config,
            dispatcher,
            liveness_task,
            relay_sweep_task,
            announcer_join: announcer.1,
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    fn state(&self) -> AppState {
        AppState {
            dispatcher: self.dispatcher.clone(),
            config: self.config.clone(),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state())
    }

    /// Serves connections until `shutdown` resolves (§5 "graceful
    /// shutdown"). Does not itself tear down subsystems; call
    /// [`Host::shutdown`] afterwards.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), HostError> {
        info!(
            "venue host listening on {}",
            listener.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_owned())
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| HostError::Serve(err.to_string()))
    }

    /// Explicit, ordered teardown (§9: "dispatcher -> sessions -> broker ->
    /// registry -> index -> announcer"). The dispatcher has already
    /// stopped accepting new work once `serve` returns; this closes every
    /// live session, stops the relay broker's sweep, closes the room,
    /// stops the registry's liveness sweep, and finally lets the
    /// announcer's task exit (it unregisters its mDNS record on the way
    /// out) once the last reference to the dispatcher — and therefore to
    /// its [`announcer::AnnouncerHandle`], registry, and index — is
    /// dropped.
    pub async fn shutdown(self) {
        info!("venue host shutting down");

        for peer in self.dispatcher.registry.snapshot().await {
            let _ = peer.tx.send(Outbound::Close(CloseReason::Normal));
        }

        self.relay_sweep_task.abort();
        self.dispatcher.room.close().await;
        self.liveness_task.abort();

        let announcer_join = self.announcer_join;
        drop(self.dispatcher);
        if let Some(join) = announcer_join {
            let _ = join.await;
        }
    }
}

fn spawn_liveness_sweep(dispatcher: Arc<Dispatcher>, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        loop {
            ticker.tick().await;
            dispatcher.sweep_heartbeats().await;
        }
    })
}

fn spawn_relay_sweep(dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(1_000));
        loop {
            ticker.tick().await;
            dispatcher.sweep_relay().await;
        }
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new().route("/", get(ws_handler)).route("/healthz", get(healthz_handler)).with_state(state)
}

async fn healthz_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({"ok": true}))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_binary = state.config.chunk_size_bytes + BINARY_FRAME_OVERHEAD;
    let max_frame = max_binary.max(DEFAULT_MAX_TEXT_FRAME_BYTES);
    ws.max_frame_size(max_frame).on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        ping_interval.tick().await;
        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(Outbound::Text(message)) => {
                            if ws_sender.send(ws::Message::Text(message.to_json().into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Chunk { frame, _permit }) => {
                            if ws_sender.send(ws::Message::Binary(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Close(reason)) => {
                            let _ = ws_sender.send(ws::Message::Close(Some(close_frame(reason)))).await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_sender.send(ws::Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let max_text = DEFAULT_MAX_TEXT_FRAME_BYTES;
    let max_binary = state.config.chunk_size_bytes + BINARY_FRAME_OVERHEAD;
    let mut peer_id: Option<String> = None;

    while let Some(next) = ws_receiver.next().await {
        let message = match next {
            Ok(message) => message,
            Err(err) => {
                warn!("websocket receive error: {}", err);
                break;
            }
        };

        match message {
            ws::Message::Text(text) => {
                if text.len() > max_text {
                    let _ = tx.send(Outbound::Close(CloseReason::FrameTooLarge));
                    break;
                }
                match Message::from_json(&text) {
                    Ok(parsed) => dispatch_message(&state, &tx, &mut peer_id, parsed).await,
                    Err(err) => {
                        warn!("invalid message from session: {}", err);
                        let _ = tx.send(Outbound::text(Message::Error {
                            code: ErrorCode::InvalidMessage.as_str().to_owned(),
                            message: err.to_string(),
                            ts: now_ms(),
                        }));
                    }
                }
            }
            ws::Message::Binary(data) => {
                if data.len() > max_binary {
                    let _ = tx.send(Outbound::Close(CloseReason::FrameTooLarge));
                    break;
                }
                match audiowallet_core::decode_chunk_frame(&data) {
                    Ok((transfer_id, chunk)) => {
                        if let Some(pid) = &peer_id {
                            state.dispatcher.handle_binary_chunk(pid, &transfer_id, chunk).await;
                        }
                    }
                    Err(err) => warn!("malformed binary frame discarded: {}", err),
                }
            }
            ws::Message::Close(_) => break,
            ws::Message::Ping(_) | ws::Message::Pong(_) => {}
        }
    }

    if let Some(pid) = peer_id {
        state.dispatcher.depart_peer(&pid, None).await;
    }
    writer.abort();
}

async fn dispatch_message(
    state: &AppState,
    tx: &mpsc::UnboundedSender<Outbound>,
    peer_id: &mut Option<String>,
    message: Message,
) {
    match message {
        Message::Hello {
            peer_id: pid,
            device_name,
            platform,
            admin_token,
            ..
        } => {
            state
                .dispatcher
                .handle_hello(tx.clone(), pid.clone(), device_name, platform, admin_token)
                .await;
            *peer_id = Some(pid);
        }
        other => {
            let Some(pid) = peer_id.clone() else {
                let _ = tx.send(Outbound::text(Message::Error {
                    code: ErrorCode::NotRegistered.as_str().to_owned(),
                    message: "HELLO required before any other message".to_owned(),
                    ts: now_ms(),
                }));
                return;
            };
            match other {
                Message::JoinRoom { .. } => state.dispatcher.handle_join_room(&pid).await,
                Message::LeaveRoom { .. } => {
                    state.dispatcher.depart_peer(&pid, None).await;
                    *peer_id = None;
                }
                Message::ShareFiles { files, .. } => state.dispatcher.handle_share_files(&pid, files).await,
                Message::UnshareFiles { file_ids, .. } => state.dispatcher.handle_unshare_files(&pid, file_ids).await,
                Message::RequestFile { file_id, .. } => state.dispatcher.handle_request_file(&pid, file_id).await,
                Message::RelayPull { file_id, transfer_id, .. } => {
                    state.dispatcher.handle_relay_pull(&pid, file_id, transfer_id).await
                }
                Message::RelayPushMeta {
                    transfer_id,
                    file_id,
                    size,
                    mime_type,
                    sha256,
                    ..
                } => {
                    state
                        .dispatcher
                        .handle_relay_push_meta(&pid, transfer_id, file_id, size, mime_type, sha256)
                        .await
                }
                Message::RelayComplete { transfer_id, file_id, .. } => {
                    state.dispatcher.handle_relay_complete(&pid, transfer_id, file_id).await
                }
                Message::RelayError { transfer_id, error, .. } => {
                    state.dispatcher.handle_relay_error(&pid, transfer_id, error).await
                }
                Message::Heartbeat { .. } => state.dispatcher.handle_heartbeat(&pid).await,
                _ => {
                    warn!(peer_id = %pid, "unexpected message type from client");
                    let _ = tx.send(Outbound::text(Message::Error {
                        code: ErrorCode::InvalidMessage.as_str().to_owned(),
                        message: "unexpected message type for this direction".to_owned(),
                        ts: now_ms(),
                    }));
                }
            }
        }
    }
}

fn close_frame(reason: CloseReason) -> ws::CloseFrame {
    let code = match reason {
        CloseReason::Normal => 1000,
        CloseReason::Replaced => 4001,
        CloseReason::FrameTooLarge => 4002,
        CloseReason::ProtocolError => 4003,
        CloseReason::HeartbeatTimeout => 4004,
    };
    ws::CloseFrame {
        code,
        reason: reason.as_str().into(),
    }
}

//! Dispatcher (§4.G): orchestrates components A-F. Owns no socket directly
//! — each handler receives the already-parsed message fields, mutates the
//! owning subsystem, and turns the outcome into concrete sends through the
//! peer registry. This is where §4.G's admission table (locks, liveness,
//! ownership) is enforced; the subsystems themselves stay policy-free.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use audiowallet_core::{
    Capabilities, CloseReason, ErrorCode, FileId, Message, Platform, ShareFileDescriptor, TransferState,
};
use tracing::{info, warn};

use crate::announcer::{Advertisement, AnnouncerHandle};
use crate::config::HostConfig;
use crate::index::FileIndex;
use crate::registry::PeerRegistry;
use crate::relay::{RelayBroker, SweepEvent};
use crate::room::RoomManager;
use crate::session::Outbound;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct Dispatcher {
    pub registry: Arc<PeerRegistry>,
    pub room: Arc<RoomManager>,
    pub index: Arc<FileIndex>,
    pub relay: Arc<RelayBroker>,
    pub announcer: Option<AnnouncerHandle>,
    pub config: Arc<HostConfig>,
    pub host_peer_id: String,
}

impl Dispatcher {
    async fn send_to(&self, peer_id: &str, message: Message) {
        if let Some(entry) = self.registry.get(peer_id).await {
            let _ = entry.tx.send(Outbound::text(message));
        }
    }

    async fn send_error(&self, peer_id: &str, code: ErrorCode, message: &str) {
        self.send_to(
            peer_id,
            Message::Error {
                code: code.as_str().to_owned(),
                message: message.to_owned(),
                ts: now_ms(),
            },
        )
        .await;
    }

    async fn broadcast(&self, message: Message, exclude: Option<&str>) {
        for entry in self.registry.snapshot().await {
            if Some(entry.peer.peer_id.as_str()) == exclude {
                continue;
            }
            let _ = entry.tx.send(Outbound::text(message.clone()));
        }
    }

    /// `HELLO` (§4.G). Registers the peer, superseding any previous session
    /// under the same `peerId` (§3 Peer invariant, close code `REPLACED`).
    pub async fn handle_hello(
        &self,
        tx: tokio::sync::mpsc::UnboundedSender<Outbound>,
        peer_id: String,
        device_name: String,
        platform: Platform,
        admin_token: Option<String>,
    ) {
        let now = now_ms();
        let is_admin = self.room.is_host_identity(&peer_id)
            || matches!(
                (&self.config.admin_token, &admin_token),
                (Some(expected), Some(got)) if expected == got
            );

        if let Some(previous_tx) = self
            .registry
            .register(peer_id.clone(), device_name, platform, is_admin, now, tx.clone())
            .await
        {
            info!(peer_id, "HELLO superseded an existing session");
            let _ = previous_tx.send(Outbound::Close(CloseReason::Replaced));
        } else {
            info!(peer_id, is_admin, "peer registered");
        }

        let _ = tx.send(Outbound::text(Message::Welcome {
            host_id: self.host_peer_id.clone(),
            capabilities: Capabilities {
                relay: true,
                max_file_mb: (self.config.max_file_bytes / (1024 * 1024)) as u32,
            },
            ts: now,
        }));
    }

    /// `JOIN_ROOM` (§4.G): replies `ROOM_INFO` + `INDEX_FULL`, then
    /// broadcasts `PEER_JOINED` to the rest of the room (unless the caller
    /// is the host's own identity, per the table's footnote).
    pub async fn handle_join_room(&self, peer_id: &str) {
        let now = now_ms();
        let room = self.room.get().await;
        let peer_count = self.registry.count().await;
        self.send_to(
            peer_id,
            Message::RoomInfo {
                room_id: room.room_id.clone(),
                room_name: room.name.clone(),
                host_id: self.host_peer_id.clone(),
                peer_count,
                locked: room.locked,
                ts: now,
            },
        )
        .await;

        let files = self.index.full_snapshot().await;
        self.send_to(peer_id, Message::IndexFull { files, ts: now }).await;

        if peer_id == self.room.host_peer_id() {
            return;
        }
        let Some(entry) = self.registry.get(peer_id).await else {
            return;
        };
        let summary = audiowallet_core::PeerSummary {
            peer_id: entry.peer.peer_id.clone(),
            device_name: entry.peer.device_name.clone(),
            platform: entry.peer.platform,
            shared_file_count: entry.peer.shared_file_count,
        };
        for other in self.registry.snapshot().await {
            if other.peer.peer_id != peer_id {
                let _ = other.tx.send(Outbound::text(Message::PeerJoined {
                    peer: summary.clone(),
                    ts: now,
                }));
            }
        }
    }

    /// `SHARE_FILES` (§4.G, §4.E): rejected wholesale with `ROOM_LOCKED`
    /// while the room is locked and the caller is not admin; otherwise
    /// each entry is validated independently by the index.
    pub async fn handle_share_files(&self, peer_id: &str, files: Vec<ShareFileDescriptor>) {
        let now = now_ms();
        let room = self.room.get().await;
        let is_admin = self.registry.is_admin(peer_id).await;
        if room.locked && !is_admin {
            self.send_error(peer_id, ErrorCode::RoomLocked, "room is locked").await;
            return;
        }
        let Some(entry) = self.registry.get(peer_id).await else {
            self.send_error(peer_id, ErrorCode::NotRegistered, "HELLO required").await;
            return;
        };

        let outcome = self
            .index
            .upsert_many(&peer_id.to_owned(), &entry.peer.device_name, files, now)
            .await;

        if !outcome.accepted.is_empty() {
            let count = self.index.count_owned_by(peer_id).await;
            self.registry.set_shared_file_count(peer_id, count).await;
            self.broadcast(
                Message::IndexUpsert {
                    files: outcome.accepted,
                    ts: now,
                },
                None,
            )
            .await;
        }
        for (file_id, code) in outcome.rejected {
            self.send_error(peer_id, code, &format!("file {file_id} rejected")).await;
        }
    }

    /// `UNSHARE_FILES` (§4.G, §4.E).
    pub async fn handle_unshare_files(&self, peer_id: &str, file_ids: Vec<FileId>) {
        let now = now_ms();
        let is_admin = self.registry.is_admin(peer_id).await;
        let removed = self.index.remove_many(peer_id, &file_ids, is_admin).await;
        if removed.is_empty() {
            return;
        }
        let count = self.index.count_owned_by(peer_id).await;
        self.registry.set_shared_file_count(peer_id, count).await;
        self.broadcast(
            Message::IndexRemove {
                file_ids: removed,
                ts: now,
            },
            None,
        )
        .await;
    }

    /// `REQUEST_FILE` (§4.G): always answered with `relay:true` (§4.F — no
    /// direct peer-to-peer path exists in this core).
    pub async fn handle_request_file(&self, peer_id: &str, file_id: String) {
        let now = now_ms();
        match self.index.get(&file_id).await {
            Some(descriptor) => {
                self.send_to(
                    peer_id,
                    Message::FileOffer {
                        file_id: descriptor.file_id,
                        owner_peer_id: descriptor.owner_peer_id,
                        relay: true,
                        ts: now,
                    },
                )
                .await;
            }
            None => self.send_error(peer_id, ErrorCode::FileNotFound, "file not found").await,
        }
    }

    /// `RELAY_PULL` (§4.F step 1-2, §4.G).
    pub async fn handle_relay_pull(&self, requester_peer_id: &str, file_id: String, transfer_id: String) {
        let now = now_ms();
        let Some(descriptor) = self.index.get(&file_id).await else {
            self.send_error(requester_peer_id, ErrorCode::FileNotFound, "file not found").await;
            return;
        };
        if !self.registry.is_live(&descriptor.owner_peer_id).await {
            self.send_error(requester_peer_id, ErrorCode::OwnerOffline, "owner offline").await;
            return;
        }

        match self
            .relay
            .pull(
                transfer_id.clone(),
                file_id.clone(),
                requester_peer_id.to_owned(),
                descriptor.owner_peer_id.clone(),
                now,
            )
            .await
        {
            Ok(accepted) => {
                self.send_to(
                    &accepted.owner_peer_id,
                    Message::RelayPull {
                        file_id,
                        transfer_id,
                        requester_peer_id: Some(requester_peer_id.to_owned()),
                        ts: now,
                    },
                )
                .await;
            }
            Err(code) => self.send_error(requester_peer_id, code, "duplicate transfer id").await,
        }
    }

    /// `RELAY_PUSH_META` (§4.F step 3).
    pub async fn handle_relay_push_meta(
        &self,
        owner_peer_id: &str,
        transfer_id: String,
        file_id: String,
        size: u64,
        mime_type: String,
        sha256: String,
    ) {
        let now = now_ms();
        let Some(descriptor) = self.index.get(&file_id).await else {
            self.send_error(owner_peer_id, ErrorCode::FileNotFound, "file not found").await;
            return;
        };

        match self
            .relay
            .push_meta(
                &transfer_id,
                owner_peer_id,
                size,
                mime_type,
                sha256,
                descriptor.size_bytes,
                &descriptor.sha256,
                now,
            )
            .await
        {
            Ok(accepted) => {
                self.send_to(
                    &accepted.requester_peer_id,
                    Message::TransferStart {
                        transfer_id,
                        file_id,
                        size: accepted.size,
                        mime_type: accepted.mime_type,
                        ts: now,
                    },
                )
                .await;
            }
            Err(code) => self.send_error(owner_peer_id, code, "push meta rejected").await,
        }
    }

    /// One binary chunk (§4.F step 4). Unknown or out-of-state transfer
    /// ids are discarded, not a session-closing error.
    pub async fn handle_binary_chunk(&self, sender_peer_id: &str, transfer_id: &str, chunk: &[u8]) {
        let now = now_ms();
        match self.relay.admit_chunk(transfer_id, sender_peer_id, chunk.len()).await {
            Ok((requester_peer_id, permit)) => {
                if let Ok(frame) = audiowallet_core::encode_chunk_frame(transfer_id, chunk)
                    && let Some(entry) = self.registry.get(&requester_peer_id).await
                {
                    let _ = entry.tx.send(Outbound::chunk(frame, permit));
                }
                if let Some(forward) = self.relay.record_chunk(transfer_id, now).await
                    && forward.should_emit_progress
                {
                    self.send_to(
                        &requester_peer_id,
                        Message::TransferProgress {
                            transfer_id: transfer_id.to_owned(),
                            bytes_transferred: forward.bytes_transferred,
                            ts: now,
                        },
                    )
                    .await;
                }
            }
            Err(()) => {
                if self.relay.chunk_for_unknown_transfer(transfer_id).await {
                    warn!(transfer_id, "chunk for unknown transfer discarded");
                } else {
                    warn!(transfer_id, sender = sender_peer_id, "chunk rejected: wrong sender or state");
                }
            }
        }
    }

    /// `RELAY_COMPLETE` (§4.F step 5).
    pub async fn handle_relay_complete(&self, owner_peer_id: &str, transfer_id: String, file_id: String) {
        let now = now_ms();
        match self.relay.complete(&transfer_id, owner_peer_id, now).await {
            Ok(done) => {
                self.send_to(
                    &done.requester_peer_id,
                    Message::TransferComplete {
                        transfer_id,
                        file_id,
                        sha256: done.sha256,
                        ts: now,
                    },
                )
                .await;
            }
            Err(code) => self.send_error(owner_peer_id, code, "relay complete rejected").await,
        }
    }

    /// `RELAY_ERROR` from either party: terminates the transfer and
    /// relays the error to the counterparty verbatim.
    pub async fn handle_relay_error(&self, caller_peer_id: &str, transfer_id: String, error: String) {
        let now = now_ms();
        match self.relay.terminate(&transfer_id, TransferState::Error, now).await {
            Some((requester_peer_id, owner_peer_id)) => {
                let counterpart = if caller_peer_id == owner_peer_id {
                    requester_peer_id
                } else {
                    owner_peer_id
                };
                self.send_to(
                    &counterpart,
                    Message::RelayError {
                        transfer_id,
                        error,
                        ts: now,
                    },
                )
                .await;
            }
            None => self.send_error(caller_peer_id, ErrorCode::TransferNotFound, "transfer not found").await,
        }
    }

    /// `HEARTBEAT` (§4.G, §4.C).
    pub async fn handle_heartbeat(&self, peer_id: &str) {
        self.registry.touch(peer_id, now_ms()).await;
    }

    /// Full peer departure, shared by `LEAVE_ROOM`, socket close, and the
    /// heartbeat-timeout sweep (§4.C "removal is atomic"). `close_reason`
    /// is only meaningful when the peer's socket is still open (the
    /// heartbeat sweep case); a clean `LEAVE_ROOM`/disconnect has no
    /// listener left to receive it.
    pub async fn depart_peer(&self, peer_id: &str, close_reason: Option<CloseReason>) {
        let Some(entry) = self.registry.remove(peer_id).await else {
            return;
        };
        if let Some(reason) = close_reason {
            let _ = entry.tx.send(Outbound::Close(reason));
        }

        let now = now_ms();
        for (transfer_id, counterpart, peer_is_owner) in self.relay.transfers_involving(peer_id).await {
            let state = if peer_is_owner { TransferState::Error } else { TransferState::Cancelled };
            self.relay.terminate(&transfer_id, state, now).await;
            if peer_is_owner {
                self.send_error(&counterpart, ErrorCode::OwnerGone, "owner disconnected").await;
            } else {
                self.send_to(
                    &counterpart,
                    Message::RelayError {
                        transfer_id,
                        error: ErrorCode::RequesterGone.as_str().to_owned(),
                        ts: now,
                    },
                )
                .await;
            }
        }

        let purged = self.index.purge_owner(peer_id).await;
        self.broadcast(
            Message::PeerLeft {
                peer_id: peer_id.to_owned(),
                ts: now,
            },
            None,
        )
        .await;
        if !purged.is_empty() {
            self.broadcast(
                Message::IndexRemove {
                    file_ids: purged,
                    ts: now,
                },
                None,
            )
            .await;
        }
        info!(peer_id, "peer departed");
    }

    /// Host-local admin action (§3 invariant 3, §4.D `setLock`): no wire
    /// message triggers this directly in §6's schema list, so it is
    /// exposed as an API the embedding process (CLI, admin surface) calls.
    pub async fn set_room_lock(&self, locked: bool) {
        let now = now_ms();
        let room = self.room.set_lock(locked, now).await;
        self.republish(&room).await;
        if self.registry.count().await == 0 {
            return;
        }
        self.broadcast(
            Message::RoomInfo {
                room_id: room.room_id.clone(),
                room_name: room.name.clone(),
                host_id: self.host_peer_id.clone(),
                peer_count: self.registry.count().await,
                locked: room.locked,
                ts: now,
            },
            None,
        )
        .await;
    }

    async fn republish(&self, room: &audiowallet_core::Room) {
        if let Some(announcer) = &self.announcer {
            announcer.republish(Advertisement {
                room_name: room.name.clone(),
                room_id: room.room_id.clone(),
                locked: room.locked,
                port: self.config.port,
            });
        }
    }

    /// Liveness sweep (§4.C, `HEARTBEAT_INTERVAL`): evicts peers whose
    /// `lastSeen` exceeds `HEARTBEAT_TIMEOUT`.
    pub async fn sweep_heartbeats(&self) {
        let now = now_ms();
        let expired = self.registry.expired(now, self.config.heartbeat_timeout_ms).await;
        for peer_id in expired {
            warn!(peer_id, "heartbeat timeout, evicting peer");
            self.depart_peer(&peer_id, Some(CloseReason::HeartbeatTimeout)).await;
        }
    }

    /// Relay sweep (§4.F: idle timeout + terminal linger).
    pub async fn sweep_relay(&self) {
        let now = now_ms();
        for event in self.relay.sweep(now).await {
            match event {
                SweepEvent::Stalled {
                    transfer_id,
                    requester_peer_id,
                    owner_peer_id,
                } => {
                    warn!(transfer_id, "transfer stalled (idle timeout)");
                    self.send_error(&requester_peer_id, ErrorCode::Stalled, "transfer stalled").await;
                    self.send_error(&owner_peer_id, ErrorCode::Stalled, "transfer stalled").await;
                }
            }
        }
    }
}

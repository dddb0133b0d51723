//! Relay Broker (§4.F): the state machine matching a requester's
//! `RELAY_PULL` to an owner's `RELAY_PUSH_META`, carrying chunks between
//! them, and tracking per-transfer progress and terminal state.
//!
//! Flow control: each transfer owns a [`tokio::sync::Semaphore`] seeded
//! with `maxInFlightBytesPerTransfer` permits. Admitting a chunk acquires
//! `chunk.len()` permits *before* the chunk is queued on the requester's
//! outbound channel; the permit travels with the queued frame
//! ([`crate::session::Outbound::Chunk`]) and is released only once the
//! requester's writer task has actually written it to the socket. A slow
//! requester therefore backs the acquire up, which stalls the broker
//! call the owner's read loop is blocked inside — exactly the backpressure
//! §5 specifies, with no separate signalling needed.

use std::{collections::HashMap, sync::Arc};

use audiowallet_core::{ErrorCode, FileId, PeerId, TransferId, TransferState};
use tokio::sync::{RwLock, Semaphore};
use tracing::{info_span, warn};

#[derive(Debug)]
pub struct TransferEntry {
    pub file_id: FileId,
    pub requester_peer_id: PeerId,
    pub owner_peer_id: PeerId,
    pub size: u64,
    pub mime_type: String,
    pub sha256: String,
    pub state: TransferState,
    pub bytes_transferred: u64,
    pub started_at_ms: u64,
    pub last_chunk_at_ms: u64,
    pub last_progress_sent_ms: u64,
    pub last_progress_bytes: u64,
    pub terminal_since_ms: Option<u64>,
    pub semaphore: Arc<Semaphore>,
}

impl TransferEntry {
    fn span(&self, transfer_id: &str) -> tracing::Span {
        info_span!("transfer", transfer_id, file_id = %self.file_id, state = ?self.state)
    }
}

/// What `forward_chunk` tells the dispatcher to do with one binary frame.
pub struct ChunkForward {
    pub requester_peer_id: PeerId,
    pub bytes_transferred: u64,
    pub should_emit_progress: bool,
}

pub struct PullAccepted {
    pub owner_peer_id: PeerId,
}

pub struct PushMetaAccepted {
    pub requester_peer_id: PeerId,
    pub size: u64,
    pub mime_type: String,
}

pub struct CompleteAccepted {
    pub requester_peer_id: PeerId,
    pub sha256: String,
}

/// A transfer the sweep found timed out or ready to drop.
pub enum SweepEvent {
    /// An `UPLOADING` transfer received no chunk for
    /// `idleTransferTimeoutMs`; both sides are notified.
    Stalled {
        transfer_id: TransferId,
        requester_peer_id: PeerId,
        owner_peer_id: PeerId,
    },
}

#[derive(Default)]
struct Inner {
    transfers: HashMap<TransferId, TransferEntry>,
}

pub struct RelayBroker {
    inner: RwLock<Inner>,
    max_in_flight_bytes: u64,
    idle_timeout_ms: u64,
    linger_ms: u64,
}

impl RelayBroker {
    pub fn new(max_in_flight_bytes: u64, idle_timeout_ms: u64, linger_ms: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_in_flight_bytes,
            idle_timeout_ms,
            linger_ms,
        }
    }

    /// `RELAY_PULL` (§4.F step 1-2). Validation of `fileId`/owner liveness
    /// happens in the dispatcher (it owns the file index and peer
    /// registry); this only guards against a duplicate `transferId`.
    pub async fn pull(
        &self,
        transfer_id: TransferId,
        file_id: FileId,
        requester_peer_id: PeerId,
        owner_peer_id: PeerId,
        now_ms: u64,
    ) -> Result<PullAccepted, ErrorCode> {
        let mut inner = self.inner.write().await;
        if inner.transfers.contains_key(&transfer_id) {
            return Err(ErrorCode::TransferExists);
        }
        inner.transfers.insert(
            transfer_id,
            TransferEntry {
                file_id,
                requester_peer_id,
                owner_peer_id: owner_peer_id.clone(),
                size: 0,
                mime_type: String::new(),
                sha256: String::new(),
                state: TransferState::Pending,
                bytes_transferred: 0,
                started_at_ms: now_ms,
                last_chunk_at_ms: now_ms,
                last_progress_sent_ms: now_ms,
                last_progress_bytes: 0,
                terminal_since_ms: None,
                semaphore: Arc::new(Semaphore::new(self.max_in_flight_bytes.max(1) as usize)),
            },
        );
        Ok(PullAccepted { owner_peer_id })
    }

    /// `RELAY_PUSH_META` (§4.F step 3): cross-checks the owner's declared
    /// metadata against the index entry and transitions PENDING ->
    /// UPLOADING.
    pub async fn push_meta(
        &self,
        transfer_id: &str,
        caller_peer_id: &str,
        declared_size: u64,
        mime_type: String,
        sha256: String,
        index_size: u64,
        index_sha256: &str,
        now_ms: u64,
    ) -> Result<PushMetaAccepted, ErrorCode> {
        let mut inner = self.inner.write().await;
        let entry = inner.transfers.get_mut(transfer_id).ok_or(ErrorCode::TransferNotFound)?;
        if entry.owner_peer_id != caller_peer_id || entry.state != TransferState::Pending {
            return Err(ErrorCode::TransferNotFound);
        }
        if declared_size != index_size || sha256 != index_sha256 {
            entry.state = TransferState::Error;
            entry.terminal_since_ms = Some(now_ms);
            return Err(ErrorCode::SizeMismatch);
        }

        entry.size = declared_size;
        entry.mime_type = mime_type.clone();
        entry.sha256 = sha256;
        entry.state = TransferState::Uploading;
        entry.last_chunk_at_ms = now_ms;
        let _span = entry.span(transfer_id).entered();

        Ok(PushMetaAccepted {
            requester_peer_id: entry.requester_peer_id.clone(),
            size: entry.size,
            mime_type,
        })
    }

    /// Admit one binary chunk (§4.F step 4). Acquires the transfer's
    /// in-flight budget before returning so the caller can attach the
    /// permit to the outbound frame.
    pub async fn admit_chunk(
        &self,
        transfer_id: &str,
        sender_peer_id: &str,
        chunk_len: usize,
    ) -> Result<(PeerId, tokio::sync::OwnedSemaphorePermit), ()> {
        let semaphore = {
            let inner = self.inner.read().await;
            let Some(entry) = inner.transfers.get(transfer_id) else {
                return Err(());
            };
            if entry.owner_peer_id != sender_peer_id || entry.state != TransferState::Uploading {
                return Err(());
            }
            entry.semaphore.clone()
        };

        let permits = (chunk_len.max(1) as u32).min(i32::MAX as u32 - 1);
        let permit = semaphore.acquire_many_owned(permits).await.map_err(|_| ())?;

        let mut inner = self.inner.write().await;
        let Some(entry) = inner.transfers.get_mut(transfer_id) else {
            return Err(());
        };
        entry.bytes_transferred += chunk_len as u64;
        let requester_peer_id = entry.requester_peer_id.clone();
        Ok((requester_peer_id, permit))
    }

    /// Records a chunk's effect on progress-reporting cadence (§4.F step
    /// 4, `PROGRESS_INTERVAL`/`PROGRESS_BYTES`) and freshens `last_chunk_at`
    /// for the idle-timeout sweep. Call after `admit_chunk` succeeds, with
    /// a wall-clock `now_ms` the semaphore itself doesn't have access to.
    pub async fn record_chunk(&self, transfer_id: &str, now_ms: u64) -> Option<ChunkForward> {
        let mut inner = self.inner.write().await;
        let entry = inner.transfers.get_mut(transfer_id)?;
        entry.last_chunk_at_ms = now_ms;
        let due_by_time = now_ms.saturating_sub(entry.last_progress_sent_ms) >= crate::PROGRESS_INTERVAL_MS;
        let due_by_bytes =
            entry.bytes_transferred.saturating_sub(entry.last_progress_bytes) >= crate::PROGRESS_BYTES;
        let should_emit_progress = due_by_time || due_by_bytes;
        if should_emit_progress {
            entry.last_progress_sent_ms = now_ms;
            entry.last_progress_bytes = entry.bytes_transferred;
        }
        Some(ChunkForward {
            requester_peer_id: entry.requester_peer_id.clone(),
            bytes_transferred: entry.bytes_transferred,
            should_emit_progress,
        })
    }

    /// Unknown-`transferId` chunk (§4.F failure policy): discarded, not a
    /// session-closing error. Logged by the caller.
    pub async fn chunk_for_unknown_transfer(&self, transfer_id: &str) -> bool {
        let inner = self.inner.read().await;
        !inner.transfers.contains_key(transfer_id)
    }

    /// `RELAY_COMPLETE` (§4.F step 5).
    pub async fn complete(&self, transfer_id: &str, caller_peer_id: &str, now_ms: u64) -> Result<CompleteAccepted, ErrorCode> {
        let mut inner = self.inner.write().await;
        let entry = inner.transfers.get_mut(transfer_id).ok_or(ErrorCode::TransferNotFound)?;
        if entry.owner_peer_id != caller_peer_id || entry.state != TransferState::Uploading {
            return Err(ErrorCode::TransferNotFound);
        }
        if entry.bytes_transferred != entry.size {
            entry.state = TransferState::Error;
            entry.terminal_since_ms = Some(now_ms);
            warn!(transfer_id, expected = entry.size, got = entry.bytes_transferred, "size mismatch at RELAY_COMPLETE");
            return Err(ErrorCode::SizeMismatch);
        }
        entry.state = TransferState::Complete;
        entry.terminal_since_ms = Some(now_ms);
        Ok(CompleteAccepted {
            requester_peer_id: entry.requester_peer_id.clone(),
            sha256: entry.sha256.clone(),
        })
    }

    /// `RELAY_ERROR` from either party, or an explicit requester cancel.
    pub async fn terminate(&self, transfer_id: &str, state: TransferState, now_ms: u64) -> Option<(PeerId, PeerId)> {
        let mut inner = self.inner.write().await;
        let entry = inner.transfers.get_mut(transfer_id)?;
        entry.state = state;
        entry.terminal_since_ms = Some(now_ms);
        Some((entry.requester_peer_id.clone(), entry.owner_peer_id.clone()))
    }

    /// A peer (owner or requester) disconnected. Returns every in-flight
    /// transfer that peer was part of, with the counterparty to notify.
    pub async fn transfers_involving(&self, peer_id: &str) -> Vec<(TransferId, PeerId, bool)> {
        let inner = self.inner.read().await;
        inner
            .transfers
            .iter()
            .filter(|(_, entry)| matches!(entry.state, TransferState::Pending | TransferState::Uploading))
            .filter_map(|(transfer_id, entry)| {
                if entry.owner_peer_id == peer_id {
                    Some((transfer_id.clone(), entry.requester_peer_id.clone(), true))
                } else if entry.requester_peer_id == peer_id {
                    Some((transfer_id.clone(), entry.owner_peer_id.clone(), false))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Periodic sweep (§4.F: idle timeout, terminal linger). Transitions
    /// stalled `UPLOADING` transfers to `ERROR` and drops transfers that
    /// have lingered past `TRANSFER_LINGER_MS` in a terminal state.
    pub async fn sweep(&self, now_ms: u64) -> Vec<SweepEvent> {
        let mut inner = self.inner.write().await;
        let mut events = Vec::new();
        let mut to_drop = Vec::new();

        for (transfer_id, entry) in inner.transfers.iter_mut() {
            match entry.state {
                TransferState::Uploading
                    if now_ms.saturating_sub(entry.last_chunk_at_ms) > self.idle_timeout_ms =>
                {
                    entry.state = TransferState::Error;
                    entry.terminal_since_ms = Some(now_ms);
                    events.push(SweepEvent::Stalled {
                        transfer_id: transfer_id.clone(),
                        requester_peer_id: entry.requester_peer_id.clone(),
                        owner_peer_id: entry.owner_peer_id.clone(),
                    });
                }
                TransferState::Complete | TransferState::Error | TransferState::Cancelled => {
                    if let Some(since) = entry.terminal_since_ms
                        && now_ms.saturating_sub(since) > self.linger_ms
                    {
                        to_drop.push(transfer_id.clone());
                    }
                }
                _ => {}
            }
        }

        for transfer_id in to_drop {
            inner.transfers.remove(&transfer_id);
        }
        events
    }

    pub async fn exists(&self, transfer_id: &str) -> bool {
        self.inner.read().await.transfers.contains_key(transfer_id)
    }
}

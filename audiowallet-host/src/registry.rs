//! Peer Registry (§4.C): the live set of authenticated peers, keyed by the
//! peer-chosen `peerId`, with heartbeat-driven liveness. Guarded by a single
//! coarse lock, the discipline this crate holds uniformly across every
//! shared subsystem (§5) — the same choice the teacher makes for its one
//! `RelayState`.

use std::{collections::HashMap, sync::Arc};

use audiowallet_core::{Peer, PeerId, Platform};
use tokio::sync::{RwLock, mpsc};

use crate::session::Outbound;

/// Everything the registry keeps about one connected peer beyond the
/// wire-facing [`Peer`] projection.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub peer: Peer,
    /// Resolved once at `HELLO` time: `peerId == hostPeerId` or a valid
    /// `adminToken` was presented (§3 invariant 3, §4.D `isAdmin`).
    pub is_admin: bool,
    pub tx: mpsc::UnboundedSender<Outbound>,
    pub last_seen_ms: u64,
}

#[derive(Debug, Default)]
struct Inner {
    peers: HashMap<PeerId, PeerEntry>,
}

/// `peerId -> {session handle, metadata, lastSeen}` (§4.C).
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Register a peer, superseding any previous session under the same
    /// `peerId` (§3 Peer invariant). Returns the superseded session's
    /// outbound channel so the caller can close it with `REPLACED`.
    pub async fn register(
        &self,
        peer_id: PeerId,
        device_name: String,
        platform: Platform,
        is_admin: bool,
        joined_at_ms: u64,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Option<mpsc::UnboundedSender<Outbound>> {
        let entry = PeerEntry {
            peer: Peer {
                peer_id: peer_id.clone(),
                device_name,
                platform,
                joined_at: joined_at_ms,
                shared_file_count: 0,
            },
            is_admin,
            tx,
            last_seen_ms: joined_at_ms,
        };
        let mut inner = self.inner.write().await;
        inner.peers.insert(peer_id, entry).map(|previous| previous.tx)
    }

    pub async fn touch(&self, peer_id: &str, now_ms: u64) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.peers.get_mut(peer_id) {
            entry.last_seen_ms = now_ms;
        }
    }

    pub async fn remove(&self, peer_id: &str) -> Option<PeerEntry> {
        let mut inner = self.inner.write().await;
        inner.peers.remove(peer_id)
    }

    pub async fn get(&self, peer_id: &str) -> Option<PeerEntry> {
        let inner = self.inner.read().await;
        inner.peers.get(peer_id).cloned()
    }

    pub async fn is_live(&self, peer_id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.peers.contains_key(peer_id)
    }

    pub async fn is_admin(&self, peer_id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.peers.get(peer_id).is_some_and(|entry| entry.is_admin)
    }

    pub async fn set_shared_file_count(&self, peer_id: &str, count: usize) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.peers.get_mut(peer_id) {
            entry.peer.shared_file_count = count;
        }
    }

    /// Every connected peer, for `WELCOME`-adjacent bookkeeping and
    /// broadcast fan-out.
    pub async fn snapshot(&self) -> Vec<PeerEntry> {
        let inner = self.inner.read().await;
        inner.peers.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.peers.len()
    }

    /// Peers whose `last_seen_ms` is older than `now_ms - timeout_ms`
    /// (§4.C liveness task, `HEARTBEAT_TIMEOUT`).
    pub async fn expired(&self, now_ms: u64, timeout_ms: u64) -> Vec<PeerId> {
        let inner = self.inner.read().await;
        inner
            .peers
            .iter()
            .filter(|(_, entry)| now_ms.saturating_sub(entry.last_seen_ms) > timeout_ms)
            .map(|(peer_id, _)| peer_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tx() -> mpsc::UnboundedSender<Outbound> {
        mpsc::unbounded_channel().0
    }

    #[tokio::test]
    async fn register_supersedes_previous_session() {
        let registry = PeerRegistry::new();
        registry
            .register("p1".into(), "A".into(), Platform::Android, false, 1, make_tx())
            .await;
        let superseded = registry
            .register("p1".into(), "A2".into(), Platform::Android, false, 2, make_tx())
            .await;
        assert!(superseded.is_some());
        assert_eq!(registry.count().await, 1);
        let entry = registry.get("p1").await.unwrap();
        assert_eq!(entry.peer.device_name, "A2");
    }

    #[tokio::test]
    async fn heartbeat_timeout_expires_stale_peers() {
        let registry = PeerRegistry::new();
        registry
            .register("p1".into(), "A".into(), Platform::Ios, false, 0, make_tx())
            .await;
        assert!(registry.expired(10_000, 45_000).await.is_empty());
        assert_eq!(registry.expired(50_000, 45_000).await, vec!["p1".to_owned()]);
    }

    #[tokio::test]
    async fn touch_resets_liveness() {
        let registry = PeerRegistry::new();
        registry
            .register("p1".into(), "A".into(), Platform::Ios, false, 0, make_tx())
            .await;
        registry.touch("p1", 40_000).await;
        assert!(registry.expired(60_000, 45_000).await.is_empty());
    }
}

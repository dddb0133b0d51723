//! Room Manager (§4.D): the single active room record. Exactly zero or one
//! `Room` exists at any moment (§3); the host creates it at startup and the
//! manager mutates it in place for the lifetime of the process.

use audiowallet_core::{PeerId, Room, RoomId};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug)]
struct Inner {
    room: Room,
    closed: bool,
}

/// Holds the one [`Room`] and answers the admission question every
/// mutation to the shared file index depends on.
#[derive(Debug)]
pub struct RoomManager {
    inner: RwLock<Inner>,
    host_peer_id: PeerId,
}

impl RoomManager {
    /// Create the room the host starts with (§3 Room lifecycle: "created at
    /// host startup").
    pub fn new(room_id: RoomId, name: String, locked: bool, now_ms: u64, host_peer_id: PeerId) -> Self {
        Self {
            inner: RwLock::new(Inner {
                room: Room {
                    room_id,
                    name,
                    locked,
                    created_at: now_ms,
                    updated_at: now_ms,
                },
                closed: false,
            }),
            host_peer_id,
        }
    }

    pub async fn get(&self) -> Room {
        self.inner.read().await.room.clone()
    }

    pub async fn set_lock(&self, locked: bool, now_ms: u64) -> Room {
        let mut inner = self.inner.write().await;
        inner.room.locked = locked;
        inner.room.updated_at = now_ms;
        inner.room.clone()
    }

    pub async fn rename(&self, name: String, now_ms: u64) -> Room {
        let mut inner = self.inner.write().await;
        inner.room.name = name;
        inner.room.updated_at = now_ms;
        inner.room.clone()
    }

    /// `close()` (§4.D): marks the room destroyed as the last step of the
    /// room's lifecycle (§3 "destroyed on host shutdown"). Called from
    /// [`crate::Host::shutdown`] once every session has been closed and
    /// the relay broker has stopped, before the registry and index are
    /// dropped.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        inner.closed = true;
        info!(room_id = %inner.room.room_id, "room closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    /// True iff `peer_id` is the host's own identity (§3 invariant 3,
    /// §4.D). Admin-by-token is resolved once at `HELLO` time and cached on
    /// the peer's registry entry; this covers only the room-creator half of
    /// `isAdmin`.
    pub fn is_host_identity(&self, peer_id: &str) -> bool {
        peer_id == self.host_peer_id
    }

    pub fn host_peer_id(&self) -> &str {
        &self.host_peer_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_mutation_bumps_updated_at() {
        let manager = RoomManager::new("r1".into(), "Club".into(), false, 100, "host1".into());
        let room = manager.set_lock(true, 200).await;
        assert!(room.locked);
        assert_eq!(room.updated_at, 200);
        assert_eq!(room.created_at, 100);
    }

    #[test]
    fn host_identity_matches_configured_peer_id() {
        let manager = RoomManager::new("r1".into(), "Club".into(), false, 0, "host1".into());
        assert!(manager.is_host_identity("host1"));
        assert!(!manager.is_host_identity("p2"));
    }

    #[tokio::test]
    async fn close_marks_the_room_closed() {
        let manager = RoomManager::new("r1".into(), "Club".into(), false, 0, "host1".into());
        assert!(!manager.is_closed().await);
        manager.close().await;
        assert!(manager.is_closed().await);
    }
}

//! File Index (§4.E): the authoritative `fileId -> FileDescriptor` map. All
//! mutation goes through `upsert_many`/`remove_many`/`purge_owner`, each of
//! which returns the accepted/removed subset so the dispatcher can decide
//! what to broadcast — the index itself never reaches into peer sessions,
//! keeping state mutation and notification fan-out separate (§9 "replace
//! callback-webs").

use std::collections::HashMap;

use audiowallet_core::{
    ErrorCode, FileDescriptor, FileId, PeerId, ShareFileDescriptor, check_size_within, is_valid_sha256_hex,
};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<FileId, FileDescriptor>,
}

/// Result of one `SHARE_FILES` batch: the entries actually applied, and
/// per-entry rejections for the ones that were not.
#[derive(Debug, Default)]
pub struct UpsertOutcome {
    pub accepted: Vec<FileDescriptor>,
    pub rejected: Vec<(FileId, ErrorCode)>,
}

pub struct FileIndex {
    inner: RwLock<Inner>,
    max_file_bytes: u64,
}

impl FileIndex {
    pub fn new(max_file_bytes: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_file_bytes,
        }
    }

    /// `upsertMany` (§4.E). The whole-batch `ROOM_LOCKED` rejection is the
    /// caller's responsibility (the index has no notion of the room); this
    /// only applies the per-entry validations: size ceiling, sha256 shape,
    /// and same-owner-only overwrite.
    pub async fn upsert_many(
        &self,
        owner_peer_id: &PeerId,
        owner_name: &str,
        files: Vec<ShareFileDescriptor>,
        now_ms: u64,
    ) -> UpsertOutcome {
        let mut inner = self.inner.write().await;
        let mut outcome = UpsertOutcome::default();

        for file in files {
            if check_size_within(file.size_bytes, self.max_file_bytes).is_err() {
                outcome.rejected.push((file.file_id, ErrorCode::FileTooLarge));
                continue;
            }
            if !is_valid_sha256_hex(&file.sha256) {
                outcome.rejected.push((file.file_id, ErrorCode::InvalidMessage));
                continue;
            }
            if let Some(existing) = inner.files.get(&file.file_id)
                && existing.owner_peer_id != *owner_peer_id
            {
                outcome.rejected.push((file.file_id, ErrorCode::IdCollision));
                continue;
            }

            let descriptor = FileDescriptor {
                file_id: file.file_id.clone(),
                title: file.title,
                artist: file.artist,
                album: file.album,
                duration_seconds: file.duration_seconds,
                size_bytes: file.size_bytes,
                mime_type: file.mime_type,
                sha256: file.sha256,
                owner_peer_id: owner_peer_id.clone(),
                owner_name: owner_name.to_owned(),
                added_at: now_ms,
            };
            inner.files.insert(file.file_id, descriptor.clone());
            outcome.accepted.push(descriptor);
        }

        outcome
    }

    /// `removeMany` (§4.E): removes only entries owned by `caller_peer_id`
    /// unless `caller_is_admin`. Returns the `fileId`s actually removed.
    pub async fn remove_many(&self, caller_peer_id: &str, file_ids: &[FileId], caller_is_admin: bool) -> Vec<FileId> {
        let mut inner = self.inner.write().await;
        let mut removed = Vec::new();
        for file_id in file_ids {
            let owned_by_caller = inner
                .files
                .get(file_id)
                .is_some_and(|descriptor| descriptor.owner_peer_id == caller_peer_id);
            if owned_by_caller || caller_is_admin {
                if inner.files.remove(file_id).is_some() {
                    removed.push(file_id.clone());
                }
            }
        }
        removed
    }

    /// `purgeOwner` (§4.E): used by the peer registry's liveness sweep and
    /// by `LEAVE_ROOM`/socket close. Removes every file owned by `peer_id`
    /// atomically with the caller's peer removal (§3 invariant 1).
    pub async fn purge_owner(&self, peer_id: &str) -> Vec<FileId> {
        let mut inner = self.inner.write().await;
        let to_remove: Vec<FileId> = inner
            .files
            .iter()
            .filter(|(_, descriptor)| descriptor.owner_peer_id == peer_id)
            .map(|(file_id, _)| file_id.clone())
            .collect();
        for file_id in &to_remove {
            inner.files.remove(file_id);
        }
        to_remove
    }

    pub async fn get(&self, file_id: &str) -> Option<FileDescriptor> {
        self.inner.read().await.files.get(file_id).cloned()
    }

    /// `fullSnapshot` (§4.E), sent as `INDEX_FULL` immediately after
    /// `ROOM_INFO`. A single read-lock acquisition gives the
    /// point-in-time consistency the ordering guarantee in §4.E demands:
    /// no concurrent upsert/remove can interleave with the snapshot itself.
    pub async fn full_snapshot(&self) -> Vec<FileDescriptor> {
        self.inner.read().await.files.values().cloned().collect()
    }

    pub async fn count_owned_by(&self, peer_id: &str) -> usize {
        self.inner
            .read()
            .await
            .files
            .values()
            .filter(|descriptor| descriptor.owner_peer_id == peer_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, size: u64) -> ShareFileDescriptor {
        ShareFileDescriptor {
            file_id: id.to_owned(),
            title: "T".to_owned(),
            artist: None,
            album: None,
            duration_seconds: None,
            size_bytes: size,
            mime_type: "audio/mpeg".to_owned(),
            sha256: "a".repeat(64),
        }
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let index = FileIndex::new(100);
        let outcome = index.upsert_many(&"p1".to_owned(), "A", vec![file("f1", 200)], 0).await;
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected, vec![("f1".to_owned(), ErrorCode::FileTooLarge)]);
    }

    #[tokio::test]
    async fn second_owner_collides_on_same_file_id() {
        let index = FileIndex::new(1_000_000);
        index.upsert_many(&"p1".to_owned(), "A", vec![file("f1", 10)], 0).await;
        let outcome = index.upsert_many(&"p2".to_owned(), "B", vec![file("f1", 10)], 0).await;
        assert_eq!(outcome.rejected, vec![("f1".to_owned(), ErrorCode::IdCollision)]);
        assert_eq!(index.get("f1").await.unwrap().owner_peer_id, "p1");
    }

    #[tokio::test]
    async fn same_owner_may_overwrite_its_own_file_id() {
        let index = FileIndex::new(1_000_000);
        index.upsert_many(&"p1".to_owned(), "A", vec![file("f1", 10)], 0).await;
        let outcome = index.upsert_many(&"p1".to_owned(), "A", vec![file("f1", 20)], 5).await;
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(index.get("f1").await.unwrap().size_bytes, 20);
    }

    #[tokio::test]
    async fn purge_owner_removes_only_that_owners_files() {
        let index = FileIndex::new(1_000_000);
        index.upsert_many(&"p1".to_owned(), "A", vec![file("f1", 10)], 0).await;
        index.upsert_many(&"p2".to_owned(), "B", vec![file("f2", 10)], 0).await;
        let purged = index.purge_owner("p1").await;
        assert_eq!(purged, vec!["f1".to_owned()]);
        assert!(index.get("f1").await.is_none());
        assert!(index.get("f2").await.is_some());
    }

    #[tokio::test]
    async fn non_admin_cannot_remove_others_files() {
        let index = FileIndex::new(1_000_000);
        index.upsert_many(&"p1".to_owned(), "A", vec![file("f1", 10)], 0).await;
        let removed = index.remove_many("p2", &["f1".to_owned()], false).await;
        assert!(removed.is_empty());
        assert!(index.get("f1").await.is_some());
    }

    #[tokio::test]
    async fn admin_can_remove_any_file() {
        let index = FileIndex::new(1_000_000);
        index.upsert_many(&"p1".to_owned(), "A", vec![file("f1", 10)], 0).await;
        let removed = index.remove_many("admin", &["f1".to_owned()], true).await;
        assert_eq!(removed, vec!["f1".to_owned()]);
    }
}

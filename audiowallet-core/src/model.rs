//! The authoritative data model the venue host mutates: peers, the room,
//! the file index, and relay transfers. Clients only ever see projections
//! of these types carried over the wire in [`crate::message`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub type PeerId = String;
pub type RoomId = String;
pub type FileId = String;
pub type TransferId = String;

/// Declared client platform, carried in `HELLO` and echoed in `PEER_JOINED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
    Unknown,
}

/// A connected, authenticated peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: PeerId,
    pub device_name: String,
    pub platform: Platform,
    pub joined_at: u64,
    pub shared_file_count: usize,
}

/// The single active room. Exactly zero or one exists at any moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: RoomId,
    pub name: String,
    pub locked: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// An entry in the shared file index, owned by exactly one connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub file_id: FileId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_seconds: Option<u32>,
    pub size_bytes: u64,
    pub mime_type: String,
    pub sha256: String,
    pub owner_peer_id: PeerId,
    pub owner_name: String,
    pub added_at: u64,
}

/// The fields a client supplies for a shared file; the host fills in
/// `owner_peer_id`, `owner_name` and `added_at` on acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareFileDescriptor {
    pub file_id: FileId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_seconds: Option<u32>,
    pub size_bytes: u64,
    pub mime_type: String,
    pub sha256: String,
}

/// Lifecycle state of one owner-to-requester byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferState {
    Pending,
    Uploading,
    Complete,
    Error,
    Cancelled,
}

/// One relay transfer, identified by a requester-chosen `transfer_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub transfer_id: TransferId,
    pub file_id: FileId,
    pub requester_peer_id: PeerId,
    pub owner_peer_id: PeerId,
    pub size: u64,
    pub mime_type: String,
    pub sha256: String,
    pub state: TransferState,
    pub bytes_transferred: u64,
    pub started_at: u64,
    pub last_chunk_at: u64,
}

/// Validate that `value` is exactly 64 lowercase hex characters.
pub fn is_valid_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit()) && value.bytes().all(|b| !b.is_ascii_uppercase())
}

/// Validate `size_bytes` against the configured maximum, returning a typed
/// error rather than a bool so callers can propagate the limit in `ERROR`.
pub fn check_size_within(size_bytes: u64, max_bytes: u64) -> Result<(), CoreError> {
    if size_bytes > max_bytes {
        Err(CoreError::SizeExceedsMax {
            size: size_bytes,
            max: max_bytes,
        })
    } else {
        Ok(())
    }
}

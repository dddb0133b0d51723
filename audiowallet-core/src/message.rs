//! JSON message schema exchanged over the text side of a session (§6).
//!
//! Every message carries `ts` (wall-clock milliseconds). Messages are
//! modelled as one discriminated enum rather than separate client/host
//! enums because several variants (`RELAY_PULL`, `RELAY_ERROR`) are
//! relayed verbatim in one direction and re-emitted in the other; keeping
//! one wire vocabulary avoids duplicating every field twice.

use serde::{Deserialize, Serialize};

use crate::model::{FileDescriptor, Platform, ShareFileDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub relay: bool,
    #[serde(rename = "maxFileMB")]
    pub max_file_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub peer_id: String,
    pub device_name: String,
    pub platform: Platform,
    pub shared_file_count: usize,
}

/// One protocol message, in either direction.
///
/// `#[serde(tag = "type")]` matches the wire's `{"type": "HELLO", ...}`
/// shape; unknown `type` values fail to deserialize into this enum and
/// the dispatcher turns that into `ERROR{code: INVALID_MESSAGE}` rather
/// than panicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(clippy::large_enum_variant)]
pub enum Message {
    #[serde(rename = "HELLO")]
    Hello {
        #[serde(rename = "peerId")]
        peer_id: String,
        #[serde(rename = "deviceName")]
        device_name: String,
        platform: Platform,
        #[serde(rename = "appVersion", skip_serializing_if = "Option::is_none", default)]
        app_version: Option<String>,
        #[serde(rename = "adminToken", skip_serializing_if = "Option::is_none", default)]
        admin_token: Option<String>,
        ts: u64,
    },
    #[serde(rename = "WELCOME")]
    Welcome {
        #[serde(rename = "hostId")]
        host_id: String,
        capabilities: Capabilities,
        ts: u64,
    },
    #[serde(rename = "JOIN_ROOM")]
    JoinRoom {
        #[serde(rename = "roomId", skip_serializing_if = "Option::is_none", default)]
        room_id: Option<String>,
        ts: u64,
    },
    #[serde(rename = "LEAVE_ROOM")]
    LeaveRoom { ts: u64 },
    #[serde(rename = "ROOM_INFO")]
    RoomInfo {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "roomName")]
        room_name: String,
        #[serde(rename = "hostId")]
        host_id: String,
        #[serde(rename = "peerCount")]
        peer_count: usize,
        locked: bool,
        ts: u64,
    },
    #[serde(rename = "PEER_JOINED")]
    PeerJoined { peer: PeerSummary, ts: u64 },
    #[serde(rename = "PEER_LEFT")]
    PeerLeft {
        #[serde(rename = "peerId")]
        peer_id: String,
        ts: u64,
    },
    #[serde(rename = "SHARE_FILES")]
    ShareFiles { files: Vec<ShareFileDescriptor>, ts: u64 },
    #[serde(rename = "UNSHARE_FILES")]
    UnshareFiles {
        #[serde(rename = "fileIds")]
        file_ids: Vec<String>,
        ts: u64,
    },
    #[serde(rename = "INDEX_FULL")]
    IndexFull { files: Vec<FileDescriptor>, ts: u64 },
    #[serde(rename = "INDEX_UPSERT")]
    IndexUpsert { files: Vec<FileDescriptor>, ts: u64 },
    #[serde(rename = "INDEX_REMOVE")]
    IndexRemove {
        #[serde(rename = "fileIds")]
        file_ids: Vec<String>,
        ts: u64,
    },
    #[serde(rename = "REQUEST_FILE")]
    RequestFile {
        #[serde(rename = "fileId")]
        file_id: String,
        #[serde(rename = "ownerPeerId")]
        owner_peer_id: String,
        ts: u64,
    },
    #[serde(rename = "FILE_OFFER")]
    FileOffer {
        #[serde(rename = "fileId")]
        file_id: String,
        #[serde(rename = "ownerPeerId")]
        owner_peer_id: String,
        relay: bool,
        ts: u64,
    },
    #[serde(rename = "RELAY_PULL")]
    RelayPull {
        #[serde(rename = "fileId")]
        file_id: String,
        #[serde(rename = "transferId")]
        transfer_id: String,
        #[serde(rename = "requesterPeerId", skip_serializing_if = "Option::is_none", default)]
        requester_peer_id: Option<String>,
        ts: u64,
    },
    #[serde(rename = "RELAY_PUSH_META")]
    RelayPushMeta {
        #[serde(rename = "transferId")]
        transfer_id: String,
        #[serde(rename = "fileId")]
        file_id: String,
        size: u64,
        #[serde(rename = "mimeType")]
        mime_type: String,
        sha256: String,
        ts: u64,
    },
    #[serde(rename = "RELAY_COMPLETE")]
    RelayComplete {
        #[serde(rename = "transferId")]
        transfer_id: String,
        #[serde(rename = "fileId")]
        file_id: String,
        ts: u64,
    },
    #[serde(rename = "RELAY_ERROR")]
    RelayError {
        #[serde(rename = "transferId")]
        transfer_id: String,
        error: String,
        ts: u64,
    },
    #[serde(rename = "TRANSFER_START")]
    TransferStart {
        #[serde(rename = "transferId")]
        transfer_id: String,
        #[serde(rename = "fileId")]
        file_id: String,
        size: u64,
        #[serde(rename = "mimeType")]
        mime_type: String,
        ts: u64,
    },
    #[serde(rename = "TRANSFER_PROGRESS")]
    TransferProgress {
        #[serde(rename = "transferId")]
        transfer_id: String,
        #[serde(rename = "bytesTransferred")]
        bytes_transferred: u64,
        ts: u64,
    },
    #[serde(rename = "TRANSFER_COMPLETE")]
    TransferComplete {
        #[serde(rename = "transferId")]
        transfer_id: String,
        #[serde(rename = "fileId")]
        file_id: String,
        sha256: String,
        ts: u64,
    },
    #[serde(rename = "HEARTBEAT")]
    Heartbeat { ts: u64 },
    #[serde(rename = "ERROR")]
    Error {
        code: String,
        message: String,
        ts: u64,
    },
}

impl Message {
    /// Parse one text frame as a `Message`, surfacing schema violations as
    /// a `CoreError` instead of a panic.
    pub fn from_json(text: &str) -> Result<Self, crate::error::CoreError> {
        serde_json::from_str(text).map_err(|err| crate::error::CoreError::InvalidJson(err.to_string()))
    }

    /// Serialize to the compact JSON carried on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Message always serializes")
    }
}

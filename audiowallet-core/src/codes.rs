//! Wire-level error codes (§7) and session close codes (§6/§7).

use serde::{Deserialize, Serialize};

/// `ERROR.code` values the host can send a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotRegistered,
    NoRoom,
    RoomLocked,
    FileNotFound,
    OwnerOffline,
    TransferExists,
    TransferNotFound,
    SizeMismatch,
    FileTooLarge,
    InvalidMessage,
    FrameTooLarge,
    Stalled,
    PeerGone,
    RequesterGone,
    OwnerGone,
    Cancelled,
    /// `SHARE_FILES` reused a `fileId` already owned by a different peer
    /// (§4.E); not in the canonical §7 code table, added to give that
    /// rejection a wire-distinguishable code rather than overloading
    /// `InvalidMessage`.
    IdCollision,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotRegistered => "NOT_REGISTERED",
            ErrorCode::NoRoom => "NO_ROOM",
            ErrorCode::RoomLocked => "ROOM_LOCKED",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::OwnerOffline => "OWNER_OFFLINE",
            ErrorCode::TransferExists => "TRANSFER_EXISTS",
            ErrorCode::TransferNotFound => "TRANSFER_NOT_FOUND",
            ErrorCode::SizeMismatch => "SIZE_MISMATCH",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::FrameTooLarge => "FRAME_TOO_LARGE",
            ErrorCode::Stalled => "STALLED",
            ErrorCode::PeerGone => "PEER_GONE",
            ErrorCode::RequesterGone => "REQUESTER_GONE",
            ErrorCode::OwnerGone => "OWNER_GONE",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::IdCollision => "ID_COLLISION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport close codes (§6 "Closure codes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    Replaced,
    FrameTooLarge,
    ProtocolError,
    HeartbeatTimeout,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Normal => "NORMAL",
            CloseReason::Replaced => "REPLACED",
            CloseReason::FrameTooLarge => "FRAME_TOO_LARGE",
            CloseReason::ProtocolError => "PROTOCOL_ERROR",
            CloseReason::HeartbeatTimeout => "HEARTBEAT_TIMEOUT",
        }
    }
}

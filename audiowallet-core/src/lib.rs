//! Wire protocol and data model shared by the venue host and any client:
//! message schemas, binary chunk framing, and the entities the host's
//! state machines operate on.

pub mod codes;
pub mod error;
pub mod message;
pub mod model;
pub mod service_name;
pub mod wire;

pub use codes::{CloseReason, ErrorCode};
pub use error::CoreError;
pub use message::{Capabilities, Message, PeerSummary};
pub use model::{
    FileDescriptor, FileId, Peer, PeerId, Platform, Room, RoomId, ShareFileDescriptor, Transfer,
    TransferId, TransferState, check_size_within, is_valid_sha256_hex,
};
pub use service_name::sanitize_service_name;
pub use wire::{
    BINARY_FRAME_OVERHEAD, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TEXT_FRAME_BYTES, decode_chunk_frame,
    encode_chunk_frame,
};

/// mDNS service type published by the Service Announcer (§6, literal,
/// case-insensitive).
pub const SERVICE_TYPE: &str = "_audiowallet._tcp.local.";

/// Protocol version carried in the `v` TXT key (§4.A, §6).
pub const PROTOCOL_VERSION: &str = "1";

/// Default session endpoint port (§6 `port`).
pub const DEFAULT_PORT: u16 = 8787;

/// Default per-file size ceiling in bytes (§6 `maxFileMB`, §3 `MAX_FILE_SIZE`).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Default heartbeat liveness interval (§4.C, §6 `heartbeatIntervalMs`).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;

/// Default heartbeat timeout before a peer is considered gone (§4.C, §6).
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 45_000;

/// Default idle transfer timeout (§4.F, §6 `idleTransferTimeoutMs`).
pub const DEFAULT_IDLE_TRANSFER_TIMEOUT_MS: u64 = 30_000;

/// Default outbound send timeout (§5, §6 `sendTimeoutMs`).
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 30_000;

/// Default per-transfer backpressure window (§5, §6 `maxInFlightBytesPerTransfer`).
pub const DEFAULT_MAX_IN_FLIGHT_BYTES: u64 = 1024 * 1024;

/// How long a terminal transfer lingers before being dropped (§4.F).
pub const TRANSFER_LINGER_MS: u64 = 5_000;

/// Minimum interval between `TRANSFER_PROGRESS` messages (§4.F `PROGRESS_INTERVAL`).
pub const PROGRESS_INTERVAL_MS: u64 = 500;

/// Byte threshold that also triggers a `TRANSFER_PROGRESS` message (§4.F `PROGRESS_BYTES`).
pub const PROGRESS_BYTES: u64 = 512 * 1024;

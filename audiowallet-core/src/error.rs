use thiserror::Error;

/// Errors produced while encoding, decoding, or validating protocol data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("binary frame too short to contain a transfer id header")]
    FrameTooShort,
    #[error("transfer id length {0} exceeds remaining frame bytes")]
    TransferIdOutOfRange(usize),
    #[error("transfer id is not valid ASCII")]
    TransferIdNotAscii,
    #[error("message is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("size {size} exceeds the maximum of {max} bytes")]
    SizeExceedsMax { size: u64, max: u64 },
}

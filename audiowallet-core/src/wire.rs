//! Binary chunk framing (§4.B, §6): a 4-byte big-endian length, the ASCII
//! `transferId`, then raw chunk bytes. Used for every binary websocket
//! frame; text frames carry [`crate::message::Message`] JSON and never
//! go through here.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::CoreError;

/// Default size of one relay chunk (§6 `chunkSizeBytes`).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default maximum text frame size (§4.B).
pub const DEFAULT_MAX_TEXT_FRAME_BYTES: usize = 64 * 1024;

/// Per-frame overhead budget added on top of the chunk size when bounding
/// binary frames (4-byte length prefix + transfer id bytes).
pub const BINARY_FRAME_OVERHEAD: usize = 256;

/// Encode a chunk frame: `u32_be(len(transfer_id)) || transfer_id || chunk`.
pub fn encode_chunk_frame(transfer_id: &str, chunk: &[u8]) -> Result<Vec<u8>, CoreError> {
    if !transfer_id.is_ascii() {
        return Err(CoreError::TransferIdNotAscii);
    }
    let id_bytes = transfer_id.as_bytes();
    let id_len = u32::try_from(id_bytes.len()).map_err(|_| CoreError::TransferIdOutOfRange(id_bytes.len()))?;

    let mut out = BytesMut::with_capacity(4 + id_bytes.len() + chunk.len());
    out.put_u32(id_len);
    out.extend_from_slice(id_bytes);
    out.extend_from_slice(chunk);
    Ok(out.to_vec())
}

/// Decode a chunk frame, returning the transfer id and a borrowed slice of
/// the chunk bytes so the caller can forward without copying.
pub fn decode_chunk_frame(frame: &[u8]) -> Result<(String, &[u8]), CoreError> {
    if frame.len() < 4 {
        return Err(CoreError::FrameTooShort);
    }
    let mut cursor = frame;
    let id_len = cursor.get_u32() as usize;
    if id_len > cursor.len() {
        return Err(CoreError::TransferIdOutOfRange(id_len));
    }
    let (id_bytes, chunk) = cursor.split_at(id_len);
    let transfer_id = std::str::from_utf8(id_bytes)
        .map_err(|_| CoreError::TransferIdNotAscii)?
        .to_owned();
    Ok((transfer_id, chunk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_frame_roundtrip() {
        let frame = encode_chunk_frame("t1", b"hello world").unwrap();
        let (transfer_id, chunk) = decode_chunk_frame(&frame).unwrap();
        assert_eq!(transfer_id, "t1");
        assert_eq!(chunk, b"hello world");
    }

    #[test]
    fn empty_chunk_is_valid() {
        let frame = encode_chunk_frame("t2", &[]).unwrap();
        let (transfer_id, chunk) = decode_chunk_frame(&frame).unwrap();
        assert_eq!(transfer_id, "t2");
        assert!(chunk.is_empty());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        assert!(decode_chunk_frame(&[0, 0, 0]).is_err());
        assert!(decode_chunk_frame(&[0, 0, 0, 5, b'a']).is_err());
    }

    #[test]
    fn non_ascii_transfer_id_is_rejected() {
        assert!(encode_chunk_frame("t-\u{1F600}", b"x").is_err());
    }
}

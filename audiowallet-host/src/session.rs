//! Session Endpoint framing (§4.B): what travels down one peer's per-
//! connection outbound queue. A session's writer task (see `lib.rs`) drains
//! this channel and turns each [`Outbound`] into exactly one websocket
//! frame, text or binary.
//!
//! Binary chunks carry an [`tokio::sync::OwnedSemaphorePermit`] riding
//! alongside the bytes: the relay broker (`relay.rs`) acquires it from the
//! transfer's `MAX_IN_FLIGHT_BYTES` semaphore before admitting the chunk,
//! and it is only released once the writer task actually finishes writing
//! the frame to the socket. That is the "awaiting outbound buffer capacity"
//! backpressure point §5 requires: a slow requester's writer drains
//! permits no faster than its socket accepts bytes, so the broker's
//! `acquire` for the *next* chunk blocks, which in turn stalls the read
//! loop pulling chunks from the owner.

use audiowallet_core::{CloseReason, Message};
use tokio::sync::OwnedSemaphorePermit;

#[derive(Debug)]
pub enum Outbound {
    Text(Message),
    Chunk {
        frame: Vec<u8>,
        _permit: Option<OwnedSemaphorePermit>,
    },
    /// Close the session's websocket with the given transport close code
    /// (§6/§7 "Closure codes"), then stop the writer task.
    Close(CloseReason),
}

impl Outbound {
    pub fn text(message: Message) -> Self {
        Outbound::Text(message)
    }

    pub fn chunk(frame: Vec<u8>, permit: OwnedSemaphorePermit) -> Self {
        Outbound::Chunk {
            frame,
            _permit: Some(permit),
        }
    }
}

//! Protocol codec
//!
//! Message framing for the wire protocol.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Len (4)  │     Payload (JSON)          │
//! └──────────┴─────────────────────────────┘
//! ```
//!
//! The length is big-endian and counts payload bytes only. Each frame holds
//! exactly one JSON object.

use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{IdError, Result};

/// Header size: 4 bytes length
pub const HEADER_SIZE: usize = 4;

/// Maximum payload size (1 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

/// Encode a payload into a frame
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(IdError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Serialize a message as JSON and frame it
pub fn encode_message<T: Serialize>(message: &T) -> Result<Bytes> {
    let payload = serde_json::to_vec(message)?;
    encode_frame(&payload)
}

/// Read one frame's payload from a stream
///
/// Returns `Ok(None)` on a clean end-of-stream before a new header.
/// Blocks until a complete frame is received or an error occurs.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Bytes>> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let payload_len = u32::from_be_bytes(header);
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(IdError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut payload = BytesMut::zeroed(payload_len as usize);
    reader.read_exact(&mut payload)?;
    Ok(Some(payload.freeze()))
}

/// Write one frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    Ok(())
}

/// Serialize, frame and write a message
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let frame = encode_message(message)?;
    write_frame(writer, &frame)
}

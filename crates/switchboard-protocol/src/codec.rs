//! Codec for encoding and decoding Switchboard frames.
//!
//! Wire format: a 4-byte big-endian length prefix followed by the
//! MessagePack-encoded frame body.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Maximum frame size (4 MiB). Signaling payloads are small; anything past
/// this is a protocol violation, not a large message.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode a frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode a frame to a standalone buffer.
///
/// # Errors
///
/// Returns an error if the frame is too large or serialization fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame, appending to an existing buffer.
///
/// # Errors
///
/// Returns an error if the frame is too large or serialization fails.
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let body = rmp_serde::to_vec_named(frame)?;

    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);

    Ok(())
}

/// Decode a single frame from a byte slice.
///
/// # Errors
///
/// Returns [`ProtocolError::Incomplete`] if the slice does not hold a full
/// frame, or a decode error if the body is invalid.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    let body_len = peek_length(data)?;

    let total = LENGTH_PREFIX_SIZE + body_len;
    if data.len() < total {
        return Err(ProtocolError::Incomplete(total - data.len()));
    }

    let frame = rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total])?;
    Ok(frame)
}

/// Try to decode a frame from a streaming buffer, advancing it on success.
///
/// Returns `Ok(None)` when the buffer holds only a partial frame; the caller
/// should read more bytes and retry.
///
/// # Errors
///
/// Returns an error if the frame is oversized or the body is invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let body_len = match peek_length(buf) {
        Ok(len) => len,
        Err(ProtocolError::Incomplete(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    if buf.len() < LENGTH_PREFIX_SIZE + body_len {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let body = buf.split_to(body_len);
    let frame = rmp_serde::from_slice(&body)?;

    Ok(Some(frame))
}

/// Read and validate the length prefix without consuming it.
fn peek_length(data: &[u8]) -> Result<usize, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    Ok(length)
}

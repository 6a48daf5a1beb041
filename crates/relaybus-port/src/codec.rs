use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PortError, Result};

/// Frame header: magic (2) + length (4) + kind (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "RB" (0x52 0x42).
pub const MAGIC: [u8; 2] = [0x52, 0x42];

/// Default maximum frame body size: 16 MiB.
pub const DEFAULT_MAX_BODY: usize = 16 * 1024 * 1024;

/// Frame kind: origin handshake, exchanged once per connection.
pub const KIND_HELLO: u16 = 1;
/// Frame kind: an event envelope in transit.
pub const KIND_EVENT: u16 = 2;

/// A framed message on the wire.
#[derive(Debug, Clone)]
pub struct Frame {
    /// What the body is (hello or event envelope).
    pub kind: u16,
    /// The JSON body bytes.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: u16, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Kind     │ Body             │
/// │ 0x52 0x42    │ (4B LE)   │ (2B LE)  │ (Length bytes)   │
/// │ "RB"         │           │          │                  │
/// └──────────────┴───────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(kind: u16, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if body.len() > u32::MAX as usize {
        return Err(PortError::BodyTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(body.len() as u32);
    dst.put_u16_le(kind);
    dst.put_slice(body);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_body: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(PortError::InvalidMagic);
    }

    let body_len = u32::from_le_bytes(src[2..6].try_into().unwrap()) as usize;
    let kind = u16::from_le_bytes(src[6..8].try_into().unwrap());

    if body_len > max_body {
        return Err(PortError::BodyTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();

    Ok(Some(Frame { kind, body }))
}

use crate::error::{AccelError, Result};

/// Size of the fixed frame header on the wire.
pub const HEADER_SIZE: usize = 8;

/// Largest frame payload a peer will accept (4 GiB).
pub const MAX_MESSAGE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// What follows the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// An rkyv-encoded [`WireMessage`](super::WireMessage).
    Control = 0,
    /// A [`SegmentHeader`](super::SegmentHeader) followed by raw payload bytes.
    Segment = 1,
}

impl FrameKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Control),
            1 => Some(Self::Segment),
            _ => None,
        }
    }
}

/// Frame header: `[payload_len: u32 LE][kind: u8][reserved: 3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub payload_len: u32,
    pub kind: FrameKind,
}

impl Header {
    pub fn new(payload_len: usize, kind: FrameKind) -> Result<Self> {
        let payload_len = u32::try_from(payload_len).map_err(|_| {
            AccelError::EncodeFailed(format!("frame payload of {payload_len} bytes too large"))
        })?;
        Ok(Self { payload_len, kind })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[4] = self.kind as u8;
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let payload_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let kind = FrameKind::from_u8(buf[4])
            .ok_or_else(|| AccelError::DecodeFailed(format!("unknown frame kind {}", buf[4])))?;
        Ok(Self { payload_len, kind })
    }
}

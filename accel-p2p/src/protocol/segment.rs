//! Segment frames carry payload data.
//!
//! A message whose payload exceeds the destination's `max_segment_size` is
//! split into several segments. Every segment repeats the full message
//! metadata so the receiver can reassemble by `(src, seq)` without
//! per-message setup.

use crate::error::{AccelError, Result};
use crate::types::{DataType, Rank, SessionId, Tag};

/// Encoded size of a [`SegmentHeader`].
pub const SEGMENT_HEADER_SIZE: usize = 45;

/// `[seq u64][src u32][tag u32][session_id u32][dtype u8][count u64][total_len u64][offset u64]`,
/// all little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Per-link message sequence number, used for acks.
    pub seq: u64,
    pub src: Rank,
    pub tag: Tag,
    /// Session id of the destination endpoint.
    pub session_id: SessionId,
    pub dtype: DataType,
    /// Element count of the whole message.
    pub count: u64,
    /// Byte length of the whole message payload.
    pub total_len: u64,
    /// Byte offset of this segment within the payload.
    pub offset: u64,
}

impl SegmentHeader {
    pub fn encode(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut buf = [0u8; SEGMENT_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.seq.to_le_bytes());
        buf[8..12].copy_from_slice(&self.src.to_le_bytes());
        buf[12..16].copy_from_slice(&self.tag.to_le_bytes());
        buf[16..20].copy_from_slice(&self.session_id.to_le_bytes());
        buf[20] = self.dtype as u8;
        buf[21..29].copy_from_slice(&self.count.to_le_bytes());
        buf[29..37].copy_from_slice(&self.total_len.to_le_bytes());
        buf[37..45].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < SEGMENT_HEADER_SIZE {
            return Err(AccelError::DecodeFailed(format!(
                "segment header needs {SEGMENT_HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }
        let u64_at = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[i..i + 8]);
            u64::from_le_bytes(b)
        };
        let u32_at = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        let dtype = DataType::from_u8(buf[20])
            .ok_or_else(|| AccelError::DecodeFailed(format!("unknown dtype {}", buf[20])))?;
        Ok(Self {
            seq: u64_at(0),
            src: u32_at(8),
            tag: u32_at(12),
            session_id: u32_at(16),
            dtype,
            count: u64_at(21),
            total_len: u64_at(29),
            offset: u64_at(37),
        })
    }
}

use crate::error::{AccelError, Result};
use crate::protocol::header::{FrameKind, HEADER_SIZE, Header};
use crate::protocol::message::WireMessage;

/// Encode a control message as a complete frame (header + rkyv payload).
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>> {
    let payload = rkyv::to_bytes::<rkyv::rancor::Error>(msg)
        .map_err(|e| AccelError::EncodeFailed(e.to_string()))?;
    let header = Header::new(payload.len(), FrameKind::Control)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode the payload of a control frame.
pub fn decode_payload(payload: &[u8]) -> Result<WireMessage> {
    // rkyv wants aligned input; socket reads give no such guarantee.
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(payload.len());
    aligned.extend_from_slice(payload);
    rkyv::from_bytes::<WireMessage, rkyv::rancor::Error>(&aligned)
        .map_err(|e| AccelError::DecodeFailed(e.to_string()))
}

/// Decode a complete control frame produced by [`encode_message`].
pub fn decode_message(buf: &[u8]) -> Result<WireMessage> {
    let header_bytes: &[u8; HEADER_SIZE] = buf
        .get(..HEADER_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| AccelError::DecodeFailed("frame shorter than header".into()))?;
    let header = Header::decode(header_bytes)?;
    if header.kind != FrameKind::Control {
        return Err(AccelError::DecodeFailed(format!(
            "expected control frame, got {:?}",
            header.kind
        )));
    }
    let end = HEADER_SIZE + header.payload_len as usize;
    let payload = buf
        .get(HEADER_SIZE..end)
        .ok_or_else(|| AccelError::DecodeFailed("truncated control frame".into()))?;
    decode_payload(payload)
}

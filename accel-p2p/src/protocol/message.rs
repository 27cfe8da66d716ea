use crate::types::{Rank, SessionId};

/// Control messages exchanged between ranks.
///
/// Payload data does not flow through this enum: it travels as segment
/// frames (a fixed binary header followed by raw bytes).
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// First frame on every outbound link.
    Hello {
        protocol_version: u16,
        rank: Rank,
        session_id: SessionId,
    },

    /// Non-root rank has reached barrier `epoch`.
    Barrier { epoch: u64 },

    /// Root releases barrier `epoch`.
    BarrierAck { epoch: u64 },

    /// Receiver consumed the message with sequence number `seq`.
    Ack { seq: u64 },
}

//! Outer RPC envelope. Grounded on the teacher's `net::protocol` header and
//! sequence-wraparound comparator; the payload variants are generalized to
//! this engine's RPC surface instead of the teacher's game-specific ones.
//! `SnapshotData` carries the hand-rolled bit-packed bytes from
//! [`crate::codec::SnapshotCodec`] untouched - `rkyv` only ever sees it as an
//! opaque `Vec<u8>`.

use rkyv::{rancor, Archive, Deserialize, Serialize};
use thiserror::Error;

pub const PROTOCOL_MAGIC: u32 = 0x41524332; // "ARC2"
pub const PROTOCOL_VERSION: u32 = 1;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD)) || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Circular comparison over a 16-bit sequence space, per the wraparound rule
/// in the wire protocol: `(a - b) mod 65536 < 32768`.
#[inline]
pub fn sequence16_greater_than(a: u16, b: u16) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < 0x8000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32, ack: u32, ack_bitfield: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
            ack,
            ack_bitfield,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PlayerInput {
    pub direction: [f32; 2],
    pub tick: u32,
    pub render_time_ms: u32,
    pub last_received_sequence: u16,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum PacketType {
    ConnectionRequest { client_salt: u64 },
    ConnectionChallenge { server_salt: u64, challenge: u64 },
    ChallengeResponse { combined_salt: u64 },
    ConnectionAccepted { peer_id: u32, entity_id: u32 },
    ConnectionDenied { reason: String },
    PlayerInput(PlayerInput),
    SnapshotData(Vec<u8>),
    RequestFullSnapshot,
    ClockSyncRequest { client_send_time_ms: u32 },
    ClockSyncReply {
        client_send_time_ms: u32,
        server_receive_time_ms: u32,
        server_send_time_ms: u32,
    },
    Disconnect,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: PacketType,
}

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

impl Packet {
    pub fn new(header: PacketHeader, payload: PacketType) -> Self {
        Self { header, payload }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        rkyv::from_bytes::<Self, rancor::Error>(data).map_err(PacketError::Deserialize)
    }
}

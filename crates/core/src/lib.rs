pub mod bitstream;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod entity;
pub mod interest;
pub mod lag_compensation;
pub mod protocol;
pub mod quant;
pub mod server_protocol;
pub mod simulation;
pub mod snapshot;
pub mod transport;

pub use bitstream::{BitReader, BitStreamError, BitWriter};
pub use chunk::{world_to_chunk, ChunkCoord, ChunkIndex};
pub use codec::{CodecError, HeaderPeek, SnapshotCodec};
pub use config::NetworkConfig;
pub use entity::{Entity, EntityId, EntityState, EntityType, PeerId, StateFlags, World};
pub use interest::InterestManager;
pub use lag_compensation::{LagCompensation, WorldHistoryFrame};
pub use protocol::{
    sequence16_greater_than, sequence_greater_than, Packet, PacketError, PacketHeader, PacketType,
    PlayerInput, PROTOCOL_MAGIC, PROTOCOL_VERSION,
};
pub use quant::{PositionCodec, VelocityCodec};
pub use server_protocol::{sanitize_direction, InputSample, PeerProtocolState, ServerProtocol};
pub use simulation::{
    apply_input_velocity, DirectPhysicsEngine, FixedTimestep, MovingObstacle, ObstacleState,
    PendingInputs, PhysicsEngine,
};
pub use snapshot::{Snapshot, SnapshotHistory};
pub use transport::{
    AckTracker, ClientConnection, ConnectionManager, ConnectionState, NetworkEndpoint,
    NetworkSimulator, NetworkStats, PacketLossSimulation, ReceiveTracker,
};

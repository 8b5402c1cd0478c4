//! Bit-packed `Snapshot` serialization: header framing, per-entity delta
//! encoding against an optional baseline, and the `peek_header` fast path
//! the client uses to pick a baseline before paying for a full decode.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::bitstream::{BitReader, BitStreamError, BitWriter};
use crate::config::NetworkConfig;
use crate::entity::{EntityId, EntityState, EntityType};
use crate::quant::{PositionCodec, VelocityCodec};
use crate::snapshot::Snapshot;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("read past end of buffer")]
    BufferUnderrun,
    #[error("varint exceeded 5 continuation bytes")]
    VarintOverflow,
    #[error("baseline_sequence {expected} required but {found:?} supplied")]
    BaselineMismatch { expected: u16, found: Option<u16> },
}

impl From<BitStreamError> for CodecError {
    fn from(e: BitStreamError) -> Self {
        match e {
            BitStreamError::BufferUnderrun => CodecError::BufferUnderrun,
            BitStreamError::VarintOverflow => CodecError::VarintOverflow,
        }
    }
}

pub struct HeaderPeek {
    pub sequence: u16,
    pub timestamp_ms: u32,
    pub baseline_sequence: u16,
}

pub struct SnapshotCodec {
    position_codec: PositionCodec,
    velocity_codec: VelocityCodec,
    sprite_bits: u32,
    flags_bits: u32,
    type_bits: u32,
}

impl SnapshotCodec {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            position_codec: PositionCodec {
                world_min: config.world_min,
                world_max: config.world_max,
                bits: config.position_bits,
            },
            velocity_codec: VelocityCodec {
                max_velocity: config.max_velocity,
                bits: config.velocity_bits,
            },
            sprite_bits: 8,
            flags_bits: 8,
            type_bits: 4,
        }
    }

    /// Decodes only the 144-bit fixed-size header prefix, without touching
    /// the entity body or mutating any reader state beyond the local cursor.
    pub fn peek_header(&self, bytes: &[u8]) -> Result<HeaderPeek, CodecError> {
        let mut reader = BitReader::new(bytes);
        let sequence = reader.read_bits(16)? as u16;
        let timestamp_ms = reader.read_bits(32)?;
        let baseline_sequence = reader.read_bits(16)? as u16;
        Ok(HeaderPeek {
            sequence,
            timestamp_ms,
            baseline_sequence,
        })
    }

    pub fn encode(&self, snapshot: &Snapshot, baseline: Option<&Snapshot>) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(snapshot.sequence as u32, 16);
        w.write_bits(snapshot.timestamp_ms, 32);
        w.write_bits(snapshot.baseline_sequence as u32, 16);
        w.write_bits(snapshot.states.len() as u32, 16);
        w.write_bits(snapshot.player_entity_id, 32);
        w.write_bits(snapshot.last_processed_input_tick, 32);

        let mut previous_id: u32 = 0;
        for (&id, state) in snapshot.states.iter() {
            w.write_varint(id - previous_id);
            previous_id = id;

            let baseline_state = baseline.and_then(|b| b.states.get(&id));
            if let Some(prior) = baseline_state {
                let changed = !prior.states_equal(state);
                w.write_bits(changed as u32, 1);
                if !changed {
                    continue;
                }
            }
            self.write_state(&mut w, state);
        }

        w.into_bytes()
    }

    fn write_state(&self, w: &mut BitWriter, state: &EntityState) {
        w.write_bits(self.position_codec.encode_axis(state.position.x), self.position_codec.bits);
        w.write_bits(self.position_codec.encode_axis(state.position.y), self.position_codec.bits);
        w.write_bits(self.velocity_codec.encode_axis(state.velocity.x), self.velocity_codec.bits);
        w.write_bits(self.velocity_codec.encode_axis(state.velocity.y), self.velocity_codec.bits);
        w.write_bits(state.sprite_frame as u32, self.sprite_bits);
        w.write_bits(state.state_flags.bits() as u32, self.flags_bits);
        w.write_bits(state.entity_type.to_code() as u32, self.type_bits);
    }

    fn read_state(&self, r: &mut BitReader) -> Result<EntityState, CodecError> {
        let x = self.position_codec.decode_axis(r.read_bits(self.position_codec.bits)?);
        let y = self.position_codec.decode_axis(r.read_bits(self.position_codec.bits)?);
        let vx = self.velocity_codec.decode_axis(r.read_bits(self.velocity_codec.bits)?);
        let vy = self.velocity_codec.decode_axis(r.read_bits(self.velocity_codec.bits)?);
        let sprite_frame = r.read_bits(self.sprite_bits)? as u8;
        let state_flags = crate::entity::StateFlags::from_bits_truncate(r.read_bits(self.flags_bits)? as u8);
        let entity_type = EntityType::from_code(r.read_bits(self.type_bits)? as u8);
        Ok(EntityState {
            position: glam::Vec2::new(x, y),
            velocity: glam::Vec2::new(vx, vy),
            sprite_frame,
            state_flags,
            entity_type,
        })
    }

    pub fn decode(&self, bytes: &[u8], baseline: Option<&Snapshot>) -> Result<Snapshot, CodecError> {
        let mut r = BitReader::new(bytes);
        let sequence = r.read_bits(16)? as u16;
        let timestamp_ms = r.read_bits(32)?;
        let baseline_sequence = r.read_bits(16)? as u16;
        let entity_count = r.read_bits(16)?;
        let player_entity_id = r.read_bits(32)?;
        let last_processed_input_tick = r.read_bits(32)?;

        if baseline_sequence > 0 {
            let ok = baseline.map(|b| b.sequence) == Some(baseline_sequence);
            if !ok {
                return Err(CodecError::BaselineMismatch {
                    expected: baseline_sequence,
                    found: baseline.map(|b| b.sequence),
                });
            }
        }

        let mut states = BTreeMap::new();
        let mut previous_id: u32 = 0;
        for _ in 0..entity_count {
            let id = previous_id + r.read_varint()?;
            previous_id = id;

            let baseline_state: Option<&EntityState> = if baseline_sequence > 0 {
                baseline.and_then(|b| b.states.get(&id))
            } else {
                None
            };

            let state = if let Some(prior) = baseline_state {
                let changed = r.read_bits(1)? != 0;
                if changed {
                    self.read_state(&mut r)?
                } else {
                    *prior
                }
            } else {
                self.read_state(&mut r)?
            };
            states.insert(id as EntityId, state);
        }

        Ok(Snapshot {
            sequence,
            timestamp_ms,
            baseline_sequence,
            player_entity_id,
            last_processed_input_tick,
            states,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityType, StateFlags};
    use glam::Vec2;

    fn config() -> NetworkConfig {
        NetworkConfig::default()
    }

    fn entity_state(pos: (f32, f32), vel: (f32, f32), entity_type: EntityType) -> EntityState {
        EntityState {
            position: Vec2::new(pos.0, pos.1),
            velocity: Vec2::new(vel.0, vel.1),
            sprite_frame: 2,
            state_flags: StateFlags::empty(),
            entity_type,
        }
    }

    fn snapshot(sequence: u16, baseline_sequence: u16, states: Vec<(EntityId, EntityState)>) -> Snapshot {
        Snapshot {
            sequence,
            timestamp_ms: sequence as u32 * 100,
            baseline_sequence,
            player_entity_id: 1,
            last_processed_input_tick: 5,
            states: states.into_iter().collect(),
        }
    }

    #[test]
    fn first_snapshot_roundtrips_without_baseline() {
        let codec = SnapshotCodec::new(&config());
        let s = snapshot(
            1,
            0,
            vec![
                (1, entity_state((100.0, 200.0), (5.0, 0.0), EntityType::Player)),
                (2, entity_state((150.0, 300.0), (0.0, 3.0), EntityType::Npc)),
            ],
        );
        let bytes = codec.encode(&s, None);

        let header = codec.peek_header(&bytes).unwrap();
        assert_eq!(header.sequence, 1);
        assert_eq!(header.baseline_sequence, 0);

        let decoded = codec.decode(&bytes, None).unwrap();
        assert_eq!(decoded.states.len(), 2);
        for (id, state) in &s.states {
            let got = decoded.states.get(id).unwrap();
            assert!(got.states_equal(state), "entity {id} mismatch");
        }
    }

    #[test]
    fn delta_unchanged_entities_emit_only_changed_bit() {
        let codec = SnapshotCodec::new(&config());
        let baseline_snap = snapshot(
            1,
            0,
            vec![(1, entity_state((100.0, 200.0), (5.0, 0.0), EntityType::Player))],
        );
        let next = snapshot(
            2,
            1,
            vec![(1, entity_state((100.0, 200.0), (5.0, 0.0), EntityType::Player))],
        );
        let bytes = codec.encode(&next, Some(&baseline_snap));
        // header (18 bytes) + varint(1)=1 byte + 1 bit changed flag -> rounds to 1 byte.
        assert!(bytes.len() <= 18 + 1 + 1);

        let decoded = codec.decode(&bytes, Some(&baseline_snap)).unwrap();
        let got = decoded.states.get(&1).unwrap();
        let want = baseline_snap.states.get(&1).unwrap();
        assert!(got.states_equal(want));
    }

    #[test]
    fn new_entity_against_baseline_gets_full_state_no_changed_bit() {
        let codec = SnapshotCodec::new(&config());
        let baseline_snap = snapshot(
            1,
            0,
            vec![
                (1, entity_state((0.0, 0.0), (0.0, 0.0), EntityType::Player)),
                (2, entity_state((0.0, 0.0), (0.0, 0.0), EntityType::Npc)),
            ],
        );
        let next = snapshot(
            2,
            1,
            vec![
                (1, entity_state((0.0, 0.0), (0.0, 0.0), EntityType::Player)),
                (2, entity_state((0.0, 0.0), (0.0, 0.0), EntityType::Npc)),
                (3, entity_state((10.0, 20.0), (1.0, 1.0), EntityType::Npc)),
            ],
        );
        let bytes = codec.encode(&next, Some(&baseline_snap));
        let decoded = codec.decode(&bytes, Some(&baseline_snap)).unwrap();
        let got = decoded.states.get(&3).unwrap();
        let want = next.states.get(&3).unwrap();
        assert!(got.states_equal(want));
    }

    #[test]
    fn decode_requires_matching_baseline_sequence() {
        let codec = SnapshotCodec::new(&config());
        let baseline_snap = snapshot(100, 0, vec![(1, entity_state((0.0, 0.0), (0.0, 0.0), EntityType::Player))]);
        let wrong_baseline = snapshot(50, 0, vec![(1, entity_state((0.0, 0.0), (0.0, 0.0), EntityType::Player))]);
        let next = snapshot(102, 100, vec![(1, entity_state((0.0, 0.0), (0.0, 0.0), EntityType::Player))]);
        let bytes = codec.encode(&next, Some(&baseline_snap));

        assert!(codec.decode(&bytes, None).is_err());
        let err = codec.decode(&bytes, Some(&wrong_baseline)).unwrap_err();
        assert!(matches!(err, CodecError::BaselineMismatch { .. }));
    }

    #[test]
    fn packet_loss_recovery_across_skipped_sequence() {
        // s100 acked; s101 lost; s102 built against s100 baseline still.
        let codec = SnapshotCodec::new(&config());
        let s100 = snapshot(100, 0, vec![(1, entity_state((1.0, 1.0), (0.0, 0.0), EntityType::Player))]);
        let s102 = snapshot(102, 100, vec![(1, entity_state((5.0, 5.0), (1.0, 1.0), EntityType::Player))]);
        let bytes = codec.encode(&s102, Some(&s100));
        let decoded = codec.decode(&bytes, Some(&s100)).unwrap();
        assert!(decoded.states.get(&1).unwrap().states_equal(s102.states.get(&1).unwrap()));
    }

    #[test]
    fn bufferunderrun_on_truncated_payload() {
        let codec = SnapshotCodec::new(&config());
        let s = snapshot(1, 0, vec![(1, entity_state((0.0, 0.0), (0.0, 0.0), EntityType::Player))]);
        let mut bytes = codec.encode(&s, None);
        bytes.truncate(bytes.len() - 2);
        assert_eq!(codec.decode(&bytes, None), Err(CodecError::BufferUnderrun));
    }
}

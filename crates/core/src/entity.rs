//! Entity and World types, grounded on the teacher's `snapshot::entity`/`snapshot::world`
//! pair but trimmed to the 2D, physics-external data model this engine uses.

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::chunk::{world_to_chunk, ChunkCoord, ChunkIndex};

pub type EntityId = u32;
pub type PeerId = u32;

bitflags::bitflags! {
    /// Facing and misc per-entity bits, quantized to 8 bits on the wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct StateFlags: u8 {
        const FACING_LEFT = 0b0000_0001;
        const CROUCHING   = 0b0000_0010;
        const SPRINTING   = 0b0000_0100;
        const DEAD        = 0b0000_1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Player,
    Npc,
    MovingObstacle,
}

impl EntityType {
    pub fn to_code(self) -> u8 {
        match self {
            EntityType::Player => 0,
            EntityType::Npc => 1,
            EntityType::MovingObstacle => 2,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => EntityType::Player,
            1 => EntityType::Npc,
            _ => EntityType::MovingObstacle,
        }
    }
}

/// The network-relevant subset of an entity's state; this is exactly what
/// rides inside a `Snapshot`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub sprite_frame: u8,
    pub state_flags: StateFlags,
    pub entity_type: EntityType,
}

impl EntityState {
    /// The server's changed-detection predicate: positions/velocities within
    /// 0.01 unit, discrete fields exactly equal.
    pub fn states_equal(&self, other: &EntityState) -> bool {
        self.position.distance(other.position) < 0.01
            && self.velocity.distance(other.velocity) < 0.01
            && self.sprite_frame == other.sprite_frame
            && self.state_flags == other.state_flags
            && self.entity_type == other.entity_type
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub entity_type: EntityType,
    pub position: Vec2,
    pub velocity: Vec2,
    pub sprite_frame: u8,
    pub state_flags: StateFlags,
    pub chunk_coord: ChunkCoord,
    pub owner_peer: Option<PeerId>,
}

impl Entity {
    pub fn new(id: EntityId, entity_type: EntityType, position: Vec2, chunk_size: i32) -> Self {
        Self {
            id,
            entity_type,
            position,
            velocity: Vec2::ZERO,
            sprite_frame: 0,
            state_flags: StateFlags::empty(),
            chunk_coord: world_to_chunk(position, chunk_size),
            owner_peer: None,
        }
    }

    pub fn state(&self) -> EntityState {
        EntityState {
            position: self.position,
            velocity: self.velocity,
            sprite_frame: self.sprite_frame,
            state_flags: self.state_flags,
            entity_type: self.entity_type,
        }
    }
}

/// Authoritative world: the single owner of entity position/velocity/chunk
/// membership. Mutated exclusively by the simulation tick.
pub struct World {
    entities: HashMap<EntityId, Entity>,
    chunk_index: ChunkIndex,
    next_entity_id: EntityId,
    chunk_size: i32,
}

impl World {
    pub fn new(chunk_size: i32) -> Self {
        Self {
            entities: HashMap::new(),
            chunk_index: ChunkIndex::new(),
            next_entity_id: 1,
            chunk_size,
        }
    }

    pub fn spawn(&mut self, entity_type: EntityType, position: Vec2) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        let entity = Entity::new(id, entity_type, position, self.chunk_size);
        self.chunk_index.insert(entity.chunk_coord, id);
        self.entities.insert(id, entity);
        id
    }

    pub fn spawn_player(&mut self, peer: PeerId, position: Vec2) -> EntityId {
        let id = self.spawn(EntityType::Player, position);
        self.entities.get_mut(&id).unwrap().owner_peer = Some(peer);
        id
    }

    pub fn despawn(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.remove(&id) {
            self.chunk_index.remove(entity.chunk_coord, id);
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn chunk_index(&self) -> &ChunkIndex {
        &self.chunk_index
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Re-derives `chunk_coord` for `id` from its current position and
    /// updates the `ChunkIndex` if it moved to a new chunk. Called once per
    /// tick per entity whose position the physics step touched.
    pub fn resync_chunk(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let new_coord = world_to_chunk(entity.position, self.chunk_size);
        if new_coord != entity.chunk_coord {
            self.chunk_index.remove(entity.chunk_coord, id);
            self.chunk_index.insert(new_coord, id);
            entity.chunk_coord = new_coord;
        }
    }
}

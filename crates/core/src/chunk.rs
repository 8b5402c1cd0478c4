//! Spatial chunk index: maps an integer 2D coordinate, at `chunk_size` world
//! units granularity, to the entity ids currently occupying it.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;

use crate::entity::EntityId;

pub type ChunkCoord = (i32, i32);

pub fn world_to_chunk(pos: Vec2, chunk_size: i32) -> ChunkCoord {
    (
        (pos.x / chunk_size as f32).floor() as i32,
        (pos.y / chunk_size as f32).floor() as i32,
    )
}

/// `BTreeSet` per chunk keeps entity ids ascending for free, matching the
/// encoding's id-order determinism requirement.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    chunks: BTreeMap<ChunkCoord, BTreeSet<EntityId>>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coord: ChunkCoord, id: EntityId) {
        self.chunks.entry(coord).or_default().insert(id);
    }

    pub fn remove(&mut self, coord: ChunkCoord, id: EntityId) {
        if let Some(set) = self.chunks.get_mut(&coord) {
            set.remove(&id);
            if set.is_empty() {
                self.chunks.remove(&coord);
            }
        }
    }

    pub fn entities_in(&self, coord: ChunkCoord) -> BTreeSet<EntityId> {
        self.chunks.get(&coord).cloned().unwrap_or_default()
    }

    /// All entities in the `(2*radius+1)^2` square of chunks centered on `center`.
    pub fn entities_in_radius(&self, center: ChunkCoord, radius: i32) -> BTreeSet<EntityId> {
        let mut result = BTreeSet::new();
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                let coord = (center.0 + dx, center.1 + dy);
                if let Some(set) = self.chunks.get(&coord) {
                    result.extend(set.iter().copied());
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_to_chunk_floor_divides() {
        assert_eq!(world_to_chunk(Vec2::new(0.0, 0.0), 64), (0, 0));
        assert_eq!(world_to_chunk(Vec2::new(63.9, 0.0), 64), (0, 0));
        assert_eq!(world_to_chunk(Vec2::new(64.0, 0.0), 64), (1, 0));
        assert_eq!(world_to_chunk(Vec2::new(-1.0, 0.0), 64), (-1, 0));
    }

    #[test]
    fn radius_query_covers_neighboring_chunks() {
        let mut idx = ChunkIndex::new();
        idx.insert((0, 0), 1);
        idx.insert((2, 0), 2);
        idx.insert((5, 5), 3);

        let found = idx.entities_in_radius((0, 0), 2);
        assert!(found.contains(&1));
        assert!(found.contains(&2));
        assert!(!found.contains(&3));
    }

    #[test]
    fn remove_drops_empty_bucket() {
        let mut idx = ChunkIndex::new();
        idx.insert((1, 1), 7);
        idx.remove((1, 1), 7);
        assert!(idx.entities_in((1, 1)).is_empty());
    }
}

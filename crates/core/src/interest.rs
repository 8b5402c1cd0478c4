//! Spatial interest management: picks which entities a peer's snapshot
//! includes, with hysteresis to suppress flicker at the visibility edge.

use std::collections::HashSet;

use glam::Vec2;

use crate::chunk::{world_to_chunk, ChunkIndex};
use crate::config::NetworkConfig;
use crate::entity::{EntityId, PeerId};

pub struct InterestManager {
    chunk_size: i32,
    radius: i32,
    max_entities: usize,
    hysteresis_bonus: f32,
    previously_visible: std::collections::HashMap<PeerId, HashSet<EntityId>>,
}

impl InterestManager {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            radius: config.interest_radius,
            max_entities: config.max_entities_per_snapshot,
            hysteresis_bonus: config.hysteresis_bonus,
            previously_visible: std::collections::HashMap::new(),
        }
    }

    /// Returns the ordered (ascending id, player first) set of entity ids
    /// visible to `peer`, and records it as that peer's new hysteresis
    /// baseline.
    pub fn select_visible(
        &mut self,
        peer: PeerId,
        player_id: EntityId,
        center: Vec2,
        chunk_index: &ChunkIndex,
        positions: impl Fn(EntityId) -> Option<Vec2>,
    ) -> Vec<EntityId> {
        let center_chunk = world_to_chunk(center, self.chunk_size);
        let mut collected = chunk_index.entities_in_radius(center_chunk, self.radius);
        collected.insert(player_id);

        let previously = self
            .previously_visible
            .get(&peer)
            .cloned()
            .unwrap_or_default();

        let selected: Vec<EntityId> = if collected.len() <= self.max_entities {
            collected.into_iter().collect()
        } else {
            let mut others: Vec<EntityId> = collected.into_iter().filter(|&id| id != player_id).collect();
            others.sort_by(|&a, &b| {
                let score_a = Self::score(a, center, &previously, self.hysteresis_bonus, &positions);
                let score_b = Self::score(b, center, &previously, self.hysteresis_bonus, &positions);
                score_a
                    .partial_cmp(&score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
            let mut result = vec![player_id];
            result.extend(others.into_iter().take(self.max_entities - 1));
            result.sort();
            result
        };

        let mut ordered = selected;
        ordered.sort();
        self.previously_visible
            .insert(peer, ordered.iter().copied().collect());
        ordered
    }

    fn score(
        id: EntityId,
        center: Vec2,
        previously_visible: &HashSet<EntityId>,
        hysteresis_bonus: f32,
        positions: &impl Fn(EntityId) -> Option<Vec2>,
    ) -> f32 {
        let pos = positions(id).unwrap_or(center);
        let dist_sq = center.distance_squared(pos);
        if previously_visible.contains(&id) {
            dist_sq - hysteresis_bonus
        } else {
            dist_sq
        }
    }

    pub fn forget_peer(&mut self, peer: PeerId) {
        self.previously_visible.remove(&peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_index(positions: &HashMap<EntityId, Vec2>, chunk_size: i32) -> ChunkIndex {
        let mut idx = ChunkIndex::new();
        for (&id, &pos) in positions {
            idx.insert(world_to_chunk(pos, chunk_size), id);
        }
        idx
    }

    #[test]
    fn within_budget_returns_everything_in_radius() {
        let config = NetworkConfig::default();
        let mut mgr = InterestManager::new(&config);
        let mut positions = HashMap::new();
        positions.insert(1, Vec2::ZERO);
        positions.insert(2, Vec2::new(10.0, 10.0));
        let idx = make_index(&positions, config.chunk_size);

        let visible = mgr.select_visible(1, 1, Vec2::ZERO, &idx, |id| positions.get(&id).copied());
        assert_eq!(visible, vec![1, 2]);
    }

    #[test]
    fn player_always_included_even_outside_radius() {
        let config = NetworkConfig::default();
        let mut mgr = InterestManager::new(&config);
        let mut positions = HashMap::new();
        positions.insert(1, Vec2::new(100_000.0, 100_000.0));
        let idx = make_index(&positions, config.chunk_size);

        let visible = mgr.select_visible(1, 1, Vec2::new(100_000.0, 100_000.0), &idx, |id| {
            positions.get(&id).copied()
        });
        assert!(visible.contains(&1));
    }

    #[test]
    fn hysteresis_keeps_previously_visible_entity_over_budget() {
        let mut config = NetworkConfig::default();
        config.max_entities_per_snapshot = 2;
        let mut mgr = InterestManager::new(&config);

        let mut positions = HashMap::new();
        positions.insert(1, Vec2::ZERO); // player
        positions.insert(2, Vec2::new(50.0, 0.0)); // slightly farther, previously visible
        positions.insert(3, Vec2::new(40.0, 0.0)); // closer, newly appearing
        let idx = make_index(&positions, config.chunk_size);

        let first = mgr.select_visible(1, 1, Vec2::ZERO, &idx, |id| positions.get(&id).copied());
        assert!(first.contains(&2) || first.contains(&3));

        // Force entity 2 into the "previously visible" set directly, then
        // re-run with both 2 and 3 competing for the one remaining slot.
        mgr.previously_visible.insert(1, [1, 2].into_iter().collect());
        let second = mgr.select_visible(1, 1, Vec2::ZERO, &idx, |id| positions.get(&id).copied());
        assert!(second.contains(&2));
        assert!(!second.contains(&3));
    }

    #[test]
    fn result_is_ascending_id_order() {
        let config = NetworkConfig::default();
        let mut mgr = InterestManager::new(&config);
        let mut positions = HashMap::new();
        positions.insert(5, Vec2::ZERO);
        positions.insert(1, Vec2::new(1.0, 1.0));
        positions.insert(3, Vec2::new(2.0, 2.0));
        let idx = make_index(&positions, config.chunk_size);

        let visible = mgr.select_visible(1, 5, Vec2::ZERO, &idx, |id| positions.get(&id).copied());
        let mut sorted = visible.clone();
        sorted.sort();
        assert_eq!(visible, sorted);
    }
}

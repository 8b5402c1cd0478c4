//! Fixed-timestep simulation driver, grounded on the teacher's
//! `simulation::tick::FixedTimestep`/`SimulationLoop` pair, generalized to
//! drive an external, 2D `PhysicsEngine` instead of an embedded 3D solver.

use std::collections::HashMap;

use glam::Vec2;

use crate::entity::{Entity, EntityId, PeerId, World};

/// Resolves collisions for a simulation step. Physics is an external
/// collaborator: it mutates entities in place and returns nothing, matching
/// `PhysicsEngine.resolve(entities, dt)` in the design notes.
pub trait PhysicsEngine {
    fn resolve(&mut self, entities: &mut World, dt: f32);
}

/// A trivial physics engine with no collision response: integrates velocity
/// into position and clamps to the configured world bounds. Good enough to
/// exercise the rest of the pipeline without a real solver plugged in.
pub struct DirectPhysicsEngine {
    pub world_min: f32,
    pub world_max: f32,
}

impl PhysicsEngine for DirectPhysicsEngine {
    fn resolve(&mut self, world: &mut World, dt: f32) {
        let ids: Vec<EntityId> = world.entities().map(|e| e.id).collect();
        for id in ids {
            if let Some(entity) = world.get_mut(id) {
                entity.position += entity.velocity * dt;
                entity.position = entity.position.clamp(
                    Vec2::splat(self.world_min),
                    Vec2::splat(self.world_max),
                );
            }
            world.resync_chunk(id);
        }
    }
}

pub struct FixedTimestep {
    pub tick_delta: f32,
    accumulator: f32,
    pub current_tick: u32,
}

impl FixedTimestep {
    pub fn new(tick_delta: f32) -> Self {
        Self {
            tick_delta,
            accumulator: 0.0,
            current_tick: 0,
        }
    }

    pub fn accumulate(&mut self, frame_dt: f32) {
        self.accumulator += frame_dt;
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.tick_delta
    }

    pub fn consume_tick(&mut self) {
        self.accumulator -= self.tick_delta;
        self.current_tick += 1;
    }

    /// Fraction of the way into the next tick; useful for render-side
    /// extrapolation probes even though this engine's Interpolator never
    /// extrapolates past the latest snapshot.
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.tick_delta
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObstacleState {
    GoingToEnd,
    GoingToStart,
}

/// Scripted moving obstacle: ping-pongs between two endpoints.
pub struct MovingObstacle {
    pub entity_id: EntityId,
    pub start: Vec2,
    pub end: Vec2,
    pub speed: f32,
    pub state: ObstacleState,
}

const ARRIVAL_THRESHOLD: f32 = 10.0;

impl MovingObstacle {
    pub fn new(entity_id: EntityId, start: Vec2, end: Vec2, speed: f32) -> Self {
        Self {
            entity_id,
            start,
            end,
            speed,
            state: ObstacleState::GoingToEnd,
        }
    }

    fn target(&self) -> Vec2 {
        match self.state {
            ObstacleState::GoingToEnd => self.end,
            ObstacleState::GoingToStart => self.start,
        }
    }

    pub fn step(&mut self, world: &mut World, dt: f32) {
        let Some(entity) = world.get_mut(self.entity_id) else {
            return;
        };
        let target = self.target();
        let to_target = target - entity.position;
        let distance = to_target.length();

        if distance < ARRIVAL_THRESHOLD {
            self.state = match self.state {
                ObstacleState::GoingToEnd => ObstacleState::GoingToStart,
                ObstacleState::GoingToStart => ObstacleState::GoingToEnd,
            };
            entity.velocity = Vec2::ZERO;
        } else {
            let direction = to_target / distance;
            entity.velocity = direction * self.speed;
            entity.position += entity.velocity * dt;
        }
        world.resync_chunk(self.entity_id);
    }
}

/// Per-peer pending input, most recent by tick wins for a given step.
#[derive(Debug, Default)]
pub struct PendingInputs {
    by_peer: HashMap<PeerId, (u32, Vec2)>,
}

impl PendingInputs {
    pub fn enqueue(&mut self, peer: PeerId, tick: u32, direction: Vec2) {
        let replace = match self.by_peer.get(&peer) {
            Some((existing_tick, _)) => tick >= *existing_tick,
            None => true,
        };
        if replace {
            self.by_peer.insert(peer, (tick, direction));
        }
    }

    pub fn drain(&mut self) -> HashMap<PeerId, Vec2> {
        std::mem::take(&mut self.by_peer)
            .into_iter()
            .map(|(peer, (_, dir))| (peer, dir))
            .collect()
    }
}

/// `velocity = direction.normalized() * player_speed`, shared verbatim by the
/// server tick and the client's local prediction so the two stay in lockstep.
pub fn apply_input_velocity(entity: &mut Entity, direction: Vec2, player_speed: f32) {
    entity.velocity = if direction.length_squared() > 0.0 {
        direction.normalize() * player_speed
    } else {
        Vec2::ZERO
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    #[test]
    fn fixed_timestep_accumulates_whole_ticks() {
        let mut ts = FixedTimestep::new(1.0 / 30.0);
        ts.accumulate(1.0 / 30.0 * 2.5);
        let mut ticks = 0;
        while ts.should_tick() {
            ts.consume_tick();
            ticks += 1;
        }
        assert_eq!(ticks, 2);
        assert!(ts.alpha() > 0.0 && ts.alpha() < 1.0);
    }

    #[test]
    fn pending_inputs_keeps_most_recent_tick() {
        let mut inputs = PendingInputs::default();
        inputs.enqueue(1, 5, Vec2::new(1.0, 0.0));
        inputs.enqueue(1, 3, Vec2::new(0.0, 1.0));
        let drained = inputs.drain();
        assert_eq!(drained.get(&1).unwrap(), &Vec2::new(1.0, 0.0));
    }

    #[test]
    fn moving_obstacle_ping_pongs_between_endpoints() {
        let mut world = World::new(64);
        let id = world.spawn(EntityType::MovingObstacle, Vec2::ZERO);
        let mut obstacle = MovingObstacle::new(id, Vec2::ZERO, Vec2::new(100.0, 0.0), 1000.0);

        for _ in 0..5 {
            obstacle.step(&mut world, 1.0 / 30.0);
        }
        assert_eq!(obstacle.state, ObstacleState::GoingToStart);
    }

    #[test]
    fn direct_physics_integrates_velocity() {
        let mut world = World::new(64);
        let id = world.spawn(EntityType::Player, Vec2::ZERO);
        world.get_mut(id).unwrap().velocity = Vec2::new(10.0, 0.0);
        let mut physics = DirectPhysicsEngine {
            world_min: -1024.0,
            world_max: 1024.0,
        };
        physics.resolve(&mut world, 1.0);
        assert_eq!(world.get(id).unwrap().position, Vec2::new(10.0, 0.0));
    }

    #[test]
    fn direct_physics_clamps_to_world_bounds() {
        let mut world = World::new(64);
        let id = world.spawn(EntityType::Player, Vec2::new(1020.0, 0.0));
        world.get_mut(id).unwrap().velocity = Vec2::new(100.0, 0.0);
        let mut physics = DirectPhysicsEngine {
            world_min: -1024.0,
            world_max: 1024.0,
        };
        physics.resolve(&mut world, 1.0);
        assert_eq!(world.get(id).unwrap().position.x, 1024.0);
    }
}

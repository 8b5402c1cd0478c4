//! World history ring and rewind-and-raycast hit verification. Grounded in
//! shape on the teacher's `physics::snapshot::PhysicsHistory` ring-by-tick,
//! replacing the rapier3d rigid-body snapshot with a plain position map.

use std::collections::{HashMap, VecDeque};

use glam::Vec2;

use crate::config::NetworkConfig;
use crate::entity::EntityId;

pub type WorldHistoryFrame = HashMap<EntityId, Vec2>;

pub struct LagCompensation {
    frames: VecDeque<(u32, WorldHistoryFrame)>,
    capacity: u32,
    hit_radius: f32,
    tick_rate: u32,
}

impl LagCompensation {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity: config.lag_comp_history_ticks,
            hit_radius: config.hit_radius,
            tick_rate: config.tick_rate,
        }
    }

    pub fn record(&mut self, tick: u32, frame: WorldHistoryFrame) {
        self.frames.push_back((tick, frame));
        while let Some(&(oldest_tick, _)) = self.frames.front() {
            if tick.saturating_sub(oldest_tick) > self.capacity {
                self.frames.pop_front();
            } else {
                break;
            }
        }
    }

    fn get(&self, tick: u32) -> Option<&WorldHistoryFrame> {
        self.frames.iter().find(|(t, _)| *t == tick).map(|(_, f)| f)
    }

    fn current_tick(&self) -> Option<u32> {
        self.frames.back().map(|(t, _)| *t)
    }

    /// Rewinds to `client_reported_time_ms`, interpolates each entity's
    /// recorded position, and returns the id of the nearest entity the ray
    /// intersects, if any.
    pub fn verify_hit(&self, origin: Vec2, direction_unit: Vec2, client_reported_time_ms: u32) -> Option<EntityId> {
        let t_float = client_reported_time_ms as f32 * self.tick_rate as f32 / 1000.0;
        let t0 = t_float.floor() as u32;
        let alpha = t_float - t0 as f32;

        let frame0 = match self.get(t0) {
            Some(frame) => frame,
            None => {
                let current = self.current_tick()?;
                if t0.abs_diff(current) < 2 {
                    self.frames.back().map(|(_, f)| f)?
                } else {
                    return None;
                }
            }
        };
        let frame1 = self.get(t0 + 1).unwrap_or(frame0);

        let mut best: Option<(EntityId, f32)> = None;
        for (&id, &pos0) in frame0.iter() {
            let pos1 = frame1.get(&id).copied().unwrap_or(pos0);
            let pos = pos0.lerp(pos1, alpha);
            if let Some(t) = ray_circle_intersection(origin, direction_unit, pos, self.hit_radius) {
                if best.map(|(_, best_t)| t < best_t).unwrap_or(true) {
                    best = Some((id, t));
                }
            }
        }
        best.map(|(id, _)| id)
    }
}

/// Smallest positive ray parameter `t` such that `origin + t*direction` lies
/// on the circle of `radius` centered at `center`, or `None` if the ray
/// misses or the circle is entirely behind the origin.
fn ray_circle_intersection(origin: Vec2, direction_unit: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let to_center = center - origin;
    let projection = to_center.dot(direction_unit);
    let closest = origin + direction_unit * projection;
    let distance_sq = closest.distance_squared(center);
    let radius_sq = radius * radius;
    if distance_sq > radius_sq {
        return None;
    }
    let half_chord = (radius_sq - distance_sq).sqrt();
    let t_near = projection - half_chord;
    let t_far = projection + half_chord;
    if t_near >= 0.0 {
        Some(t_near)
    } else if t_far >= 0.0 {
        Some(t_far)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetworkConfig {
        NetworkConfig::default()
    }

    #[test]
    fn ray_hits_circle_dead_center() {
        let t = ray_circle_intersection(Vec2::new(-100.0, 0.0), Vec2::X, Vec2::ZERO, 16.0);
        assert_eq!(t, Some(84.0));
    }

    #[test]
    fn ray_misses_circle_outside_radius() {
        let t = ray_circle_intersection(Vec2::new(-100.0, 100.0), Vec2::X, Vec2::ZERO, 16.0);
        assert!(t.is_none());
    }

    #[test]
    fn verify_hit_interpolates_between_recorded_ticks() {
        let mut lag_comp = LagCompensation::new(&config());
        let mut frame0 = WorldHistoryFrame::new();
        frame0.insert(1, Vec2::new(0.0, 0.0));
        lag_comp.record(10, frame0);

        let mut frame1 = WorldHistoryFrame::new();
        frame1.insert(1, Vec2::new(30.0, 0.0));
        lag_comp.record(11, frame1);

        // tick_rate=30 -> 1 tick = 33.33ms; request time halfway between tick 10 and 11.
        let time_ms = (10.5 * 1000.0 / 30.0) as u32;
        let hit = lag_comp.verify_hit(Vec2::new(-100.0, 0.0), Vec2::X, time_ms);
        assert_eq!(hit, Some(1));
    }

    #[test]
    fn too_old_request_returns_none() {
        let mut lag_comp = LagCompensation::new(&config());
        lag_comp.record(100, WorldHistoryFrame::new());
        let hit = lag_comp.verify_hit(Vec2::ZERO, Vec2::X, 0);
        assert!(hit.is_none());
    }

    #[test]
    fn eviction_respects_capacity() {
        let mut config = config();
        config.lag_comp_history_ticks = 2;
        let mut lag_comp = LagCompensation::new(&config);
        for tick in 0..10 {
            lag_comp.record(tick, WorldHistoryFrame::new());
        }
        assert!(lag_comp.frames.len() <= 3);
    }
}

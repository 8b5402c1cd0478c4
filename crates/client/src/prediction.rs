//! Local input prediction and server reconciliation, structured after the
//! teacher's `ClientPrediction` (pending-command queue + replay-on-ack) but
//! driven by the engine's own `apply_input_velocity`/direct-integration
//! movement model instead of yaw/pitch-based 3D movement.

use std::collections::VecDeque;

use glam::Vec2;

use arcnet_core::NetworkConfig;

#[derive(Debug, Clone, Copy)]
struct PendingInput {
    tick: u32,
    direction: Vec2,
    dt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedState {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Runs the same `velocity = direction.normalized() * player_speed` step the
/// server applies, then integrates position by `dt`. Kept free-standing
/// (rather than depending on `arcnet_core::Entity`/`World`) since prediction
/// only ever needs the local player's own position/velocity pair.
fn step(state: PredictedState, direction: Vec2, player_speed: f32, dt: f32) -> PredictedState {
    let velocity = if direction.length_squared() > 0.0 {
        direction.normalize() * player_speed
    } else {
        Vec2::ZERO
    };
    PredictedState {
        position: state.position + velocity * dt,
        velocity,
    }
}

/// How long the predicted-state ring keeps entries for, in seconds. Must
/// comfortably outlive a round trip so `reconcile` can always look up the
/// prediction that was actually in effect at `acked_tick`, not just the
/// live (several-ticks-ahead) predicted state.
const PREDICTED_STATE_HISTORY_SECONDS: u32 = 2;

/// Predicts local movement ahead of server acknowledgment, replaying
/// unacknowledged inputs whenever the server's reconciled state diverges
/// from what was predicted by more than `reconcile_threshold`.
pub struct PredictionController {
    pending: VecDeque<PendingInput>,
    /// One entry per tick applied, most recent last, so `reconcile` can
    /// compare the server's authoritative state for `acked_tick` against
    /// what was actually predicted for that tick rather than the current
    /// (further-ahead) predicted state.
    history: VecDeque<(u32, PredictedState)>,
    history_capacity: usize,
    state: PredictedState,
    player_speed: f32,
    reconcile_threshold: f32,
    last_acked_tick: u32,
    last_correction: Option<Vec2>,
}

impl PredictionController {
    pub fn new(config: &NetworkConfig) -> Self {
        let history_capacity = (config.tick_rate * PREDICTED_STATE_HISTORY_SECONDS).max(1) as usize;
        Self {
            pending: VecDeque::new(),
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            state: PredictedState { position: Vec2::ZERO, velocity: Vec2::ZERO },
            player_speed: config.player_speed,
            reconcile_threshold: config.reconcile_threshold,
            last_acked_tick: 0,
            last_correction: None,
        }
    }

    pub fn predicted_position(&self) -> Vec2 {
        self.state.position
    }

    pub fn predicted_velocity(&self) -> Vec2 {
        self.state.velocity
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Applies an input locally and remembers it for later replay. Call this
    /// the same tick the input is sent to the server.
    pub fn apply_input(&mut self, tick: u32, direction: Vec2, dt: f32) {
        self.state = step(self.state, direction, self.player_speed, dt);
        self.pending.push_back(PendingInput { tick, direction, dt });
        self.history.push_back((tick, self.state));
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// Reconciles against the server's authoritative position for
    /// `acked_tick`, dropping every pending input up to and including that
    /// tick and replaying whatever remains on top of the corrected state.
    /// The misprediction error is measured against the state this
    /// controller actually predicted *for `acked_tick`* (from `history`),
    /// not the live predicted state, which by the time an ack arrives is
    /// already several ticks further ahead than the tick being acked.
    /// Returns `true` if a correction beyond the threshold was applied.
    pub fn reconcile(&mut self, acked_tick: u32, server_position: Vec2, server_velocity: Vec2) -> bool {
        if acked_tick != 0 && !arcnet_core::sequence_greater_than(acked_tick, self.last_acked_tick) {
            return false;
        }
        self.last_acked_tick = acked_tick;

        while let Some(front) = self.pending.front() {
            if front.tick <= acked_tick {
                self.pending.pop_front();
            } else {
                break;
            }
        }

        let predicted_at_ack = self
            .history
            .iter()
            .find(|(tick, _)| *tick == acked_tick)
            .map(|(_, state)| state.position)
            .unwrap_or(self.state.position);
        while let Some((tick, _)) = self.history.front() {
            if *tick <= acked_tick {
                self.history.pop_front();
            } else {
                break;
            }
        }

        let error = (predicted_at_ack - server_position).length();
        let corrected = error > self.reconcile_threshold;

        let mut replay_state = PredictedState { position: server_position, velocity: server_velocity };
        if corrected {
            self.last_correction = Some(predicted_at_ack - server_position);
        }

        for input in self.pending.iter() {
            replay_state = step(replay_state, input.direction, self.player_speed, input.dt);
        }
        self.state = replay_state;

        corrected
    }

    pub fn last_correction(&self) -> Option<Vec2> {
        self.last_correction
    }

    pub fn reset(&mut self, position: Vec2) {
        self.pending.clear();
        self.history.clear();
        self.state = PredictedState { position, velocity: Vec2::ZERO };
        self.last_acked_tick = 0;
        self.last_correction = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetworkConfig {
        NetworkConfig::default()
    }

    #[test]
    fn applying_input_advances_predicted_position() {
        let mut controller = PredictionController::new(&config());
        controller.apply_input(1, Vec2::new(1.0, 0.0), 1.0 / 30.0);
        assert!(controller.predicted_position().x > 0.0);
        assert_eq!(controller.pending_count(), 1);
    }

    #[test]
    fn reconcile_drops_acked_inputs_and_replays_rest() {
        let mut controller = PredictionController::new(&config());
        for tick in 1..=3u32 {
            controller.apply_input(tick, Vec2::new(1.0, 0.0), 1.0 / 30.0);
        }
        assert_eq!(controller.pending_count(), 3);

        controller.reconcile(1, controller.predicted_position(), Vec2::ZERO);
        assert_eq!(controller.pending_count(), 2);
    }

    #[test]
    fn large_divergence_is_reported_as_a_correction() {
        let mut controller = PredictionController::new(&config());
        controller.apply_input(1, Vec2::new(1.0, 0.0), 1.0);
        let far_away = Vec2::new(-1000.0, -1000.0);
        let corrected = controller.reconcile(1, far_away, Vec2::ZERO);
        assert!(corrected);
        assert!(controller.last_correction().is_some());
    }

    #[test]
    fn small_divergence_is_not_flagged_as_correction() {
        let mut controller = PredictionController::new(&config());
        controller.apply_input(1, Vec2::new(1.0, 0.0), 1.0 / 30.0);
        let close_enough = controller.predicted_position();
        let corrected = controller.reconcile(1, close_enough, Vec2::ZERO);
        assert!(!corrected);
    }

    #[test]
    fn zero_misprediction_is_a_no_op_even_several_ticks_into_the_round_trip() {
        let mut controller = PredictionController::new(&config());
        let dt = 1.0 / 30.0;
        let direction = Vec2::new(1.0, 0.0);

        // Ticks 1..=5 predicted locally before the ack for tick 1 arrives,
        // mirroring travel during an ordinary RTT. The live predicted
        // position (tick 5) is well past where it was at tick 1.
        for tick in 1..=5u32 {
            controller.apply_input(tick, direction, dt);
        }
        let position_at_tick_1 = controller
            .history
            .iter()
            .find(|(tick, _)| *tick == 1)
            .unwrap()
            .1
            .position;
        assert_ne!(position_at_tick_1, controller.predicted_position());

        // Server agrees exactly with what was predicted for tick 1.
        let corrected = controller.reconcile(1, position_at_tick_1, Vec2::new(player_speed(), 0.0));
        assert!(!corrected);
        assert!(controller.last_correction().is_none());
    }

    fn player_speed() -> f32 {
        NetworkConfig::default().player_speed
    }

    #[test]
    fn reset_clears_pending_and_state() {
        let mut controller = PredictionController::new(&config());
        controller.apply_input(1, Vec2::new(1.0, 0.0), 1.0 / 30.0);
        controller.reset(Vec2::new(5.0, 5.0));
        assert_eq!(controller.predicted_position(), Vec2::new(5.0, 5.0));
        assert_eq!(controller.pending_count(), 0);
    }
}

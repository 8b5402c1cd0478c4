//! Packet-loss/jitter injection and per-connection counters. Directly
//! grounded on the teacher's `net::stats`, including its hand-rolled
//! time-seeded pseudo-randomness (the teacher never pulls in the `rand`
//! crate for this, and neither does this module).

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

pub fn rand_u64() -> u64 {
    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64,
    );
    hasher.finish()
}

pub fn rand_percent() -> f32 {
    (rand_u64() % 10_000) as f32 / 100.0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
    pub duplicate_percent: f32,
}

impl PacketLossSimulation {
    pub fn should_drop(&self) -> bool {
        self.enabled && rand_percent() < self.loss_percent
    }

    pub fn should_duplicate(&self) -> bool {
        self.enabled && rand_percent() < self.duplicate_percent
    }

    pub fn delay_ms(&self) -> u32 {
        if !self.enabled || self.max_latency_ms == 0 {
            return 0;
        }
        let span = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = if span > 0 { (rand_u64() % span as u64) as u32 } else { 0 };
        self.min_latency_ms + jitter
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
    pub packet_loss_percent: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_simulation_never_drops() {
        let sim = PacketLossSimulation::default();
        for _ in 0..50 {
            assert!(!sim.should_drop());
        }
    }

    #[test]
    fn full_loss_always_drops() {
        let sim = PacketLossSimulation {
            enabled: true,
            loss_percent: 100.0,
            ..Default::default()
        };
        for _ in 0..20 {
            assert!(sim.should_drop());
        }
    }

    #[test]
    fn delay_stays_within_configured_bounds() {
        let sim = PacketLossSimulation {
            enabled: true,
            min_latency_ms: 20,
            max_latency_ms: 60,
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = sim.delay_ms();
            assert!(delay >= 20 && delay <= 60);
        }
    }
}

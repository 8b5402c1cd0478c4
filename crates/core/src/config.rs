//! Tunables shared by server and client, gathered into one struct per the
//! teacher's `PlayerConfig`/`ServerConfig` pattern: a plain data struct with a
//! `Default` impl holding every numeric constant, instead of scattered consts.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConfig {
    pub tick_rate: u32,
    pub snapshot_rate: u32,

    pub world_min: f32,
    pub world_max: f32,
    pub position_bits: u32,
    pub velocity_bits: u32,
    pub max_velocity: f32,

    pub chunk_size: i32,
    pub interest_radius: i32,
    pub max_entities_per_snapshot: usize,
    pub hysteresis_bonus: f32,

    pub history_size: usize,
    pub lag_comp_history_ticks: u32,

    pub player_speed: f32,
    pub reconcile_threshold: f32,

    pub interpolation_delay_ms: f32,
    pub jitter_buffer_ms: f32,

    pub input_send_rate: u32,
    pub clock_sync_interval_ms: u64,

    pub connection_timeout_secs: u64,
    pub snapshot_starvation_secs: u64,

    pub hit_radius: f32,
    pub max_packet_bytes: usize,
}

impl NetworkConfig {
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn total_client_delay_ms(&self) -> f32 {
        self.interpolation_delay_ms + self.jitter_buffer_ms
    }

    /// `true` when the tick/snapshot ratio and the client delay budget are
    /// internally consistent; callers build a `NetworkConfig` once at
    /// startup and should check this before running anything.
    pub fn is_consistent(&self) -> bool {
        self.snapshot_rate > 0
            && self.tick_rate % self.snapshot_rate == 0
            && self.total_client_delay_ms() >= (1000.0 / self.snapshot_rate as f32) + self.jitter_buffer_ms
    }

    pub fn ticks_per_snapshot(&self) -> u32 {
        self.tick_rate / self.snapshot_rate
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            snapshot_rate: 10,

            world_min: -1024.0,
            world_max: 1024.0,
            position_bits: 18,
            velocity_bits: 11,
            max_velocity: 256.0,

            chunk_size: 64,
            interest_radius: 2,
            max_entities_per_snapshot: 100,
            hysteresis_bonus: 10_000.0,

            history_size: 60,
            lag_comp_history_ticks: 40,

            player_speed: 200.0,
            reconcile_threshold: 2.0,

            interpolation_delay_ms: 100.0,
            jitter_buffer_ms: 50.0,

            input_send_rate: 20,
            clock_sync_interval_ms: 1_000,

            connection_timeout_secs: 10,
            snapshot_starvation_secs: 5,

            hit_radius: 16.0,
            max_packet_bytes: 1400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_consistent() {
        assert!(NetworkConfig::default().is_consistent());
    }

    #[test]
    fn rejects_non_integer_tick_ratio() {
        let mut cfg = NetworkConfig::default();
        cfg.snapshot_rate = 7;
        assert!(!cfg.is_consistent());
    }

    #[test]
    fn rejects_undersized_client_delay() {
        let mut cfg = NetworkConfig::default();
        cfg.interpolation_delay_ms = 10.0;
        cfg.jitter_buffer_ms = 10.0;
        assert!(!cfg.is_consistent());
    }
}

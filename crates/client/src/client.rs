//! Top-level client orchestrator: owns the network connection, snapshot
//! buffer, interpolator and prediction controller, and drives them each
//! frame. Mirrors the shape of the server crate's `GameServer`.

use std::collections::BTreeMap;
use std::time::Instant;

use glam::Vec2;

use arcnet_core::EntityId;

use crate::buffer::SnapshotBuffer;
use crate::config::ClientConfig;
use crate::interpolation::{InterpolatedEntity, Interpolator};
use crate::network::{ClientEvent, ClientState, NetworkClient};
use crate::prediction::PredictionController;

pub struct ClientApp {
    network: NetworkClient,
    buffer: SnapshotBuffer,
    interpolator: Interpolator,
    prediction: PredictionController,
    config: ClientConfig,
    local_tick: u32,
    last_frame: Instant,
    snapshots_received: u64,
    corrections: u64,
}

impl ClientApp {
    pub fn new(config: ClientConfig) -> std::io::Result<Self> {
        let network = NetworkClient::connect(
            "0.0.0.0:0",
            &config.server_addr,
            config.network.input_send_rate,
            config.network.clock_sync_interval_ms,
        )?;
        Ok(Self {
            buffer: SnapshotBuffer::new(&config.network),
            interpolator: Interpolator::new(&config.network),
            prediction: PredictionController::new(&config.network),
            network,
            config,
            local_tick: 0,
            last_frame: Instant::now(),
            snapshots_received: 0,
            corrections: 0,
        })
    }

    pub fn begin_handshake(&mut self) {
        self.network.begin_handshake();
    }

    pub fn connection_state(&self) -> ClientState {
        self.network.state()
    }

    /// One frame's worth of work: send/receive network traffic, decode any
    /// arrived snapshots, reconcile prediction, and advance the render
    /// clock. `input_direction` is the raw (unnormalized) movement intent
    /// for this frame, already sanitized at the input-capture boundary.
    pub fn tick(&mut self, input_direction: Vec2) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f64();
        self.last_frame = now;

        self.local_tick = self.local_tick.wrapping_add(1);
        let events = self.network.poll(input_direction, self.local_tick);

        if self.network.state() == ClientState::Connected {
            self.prediction.apply_input(self.local_tick, input_direction, dt as f32);
        }

        for event in events {
            if let ClientEvent::Snapshot(bytes) = event {
                self.ingest_snapshot(&bytes);
            }
        }

        if let Some(latest) = self.buffer.latest() {
            let client_now_ms = self.local_tick as f64 * 1000.0 / self.config.network.tick_rate as f64;
            let server_now = self.network.clock.server_time_now_ms(client_now_ms as u32);
            if !self.interpolator.is_initialized() {
                self.interpolator.on_first_snapshot(latest.timestamp_ms);
            }
            self.interpolator.advance(dt, server_now, latest.timestamp_ms);
        }
    }

    fn ingest_snapshot(&mut self, bytes: &[u8]) {
        let Ok(snapshot) = self.buffer.ingest(bytes) else { return };
        self.snapshots_received += 1;

        if let Some(entity_id) = self.network.entity_id() {
            if let Some(state) = snapshot.states.get(&entity_id) {
                if self.prediction.reconcile(snapshot.last_processed_input_tick, state.position, state.velocity) {
                    self.corrections += 1;
                }
            }
        }
    }

    pub fn interpolated_entities(&self) -> BTreeMap<EntityId, InterpolatedEntity> {
        match self.buffer.interpolation_pair(self.interpolator.render_time_ms()) {
            Some((from, to)) => self.interpolator.interpolate(from, to),
            None => BTreeMap::new(),
        }
    }

    pub fn predicted_position(&self) -> Vec2 {
        self.prediction.predicted_position()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            state: self.network.state(),
            peer_id: self.network.peer_id(),
            entity_id: self.network.entity_id(),
            rtt_ms: self.network.clock.last_rtt_ms(),
            clock_offset_ms: self.network.clock.smoothed_offset_ms(),
            buffered_snapshots: self.buffer.len(),
            snapshots_received: self.snapshots_received,
            corrections: self.corrections,
            network_stats: self.network.stats(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientStats {
    pub state: ClientState,
    pub peer_id: Option<u32>,
    pub entity_id: Option<u32>,
    pub rtt_ms: f64,
    pub clock_offset_ms: f64,
    pub buffered_snapshots: usize,
    pub snapshots_received: u64,
    pub corrections: u64,
    pub network_stats: arcnet_core::NetworkStats,
}

//! The authoritative game loop: owns the world, the per-peer protocol state,
//! and the transport layer, and ties them together each tick. Grounded on
//! the teacher's `GameServer`, but the teacher's `broadcast_snapshots` never
//! actually wired a baseline/delta codec into the send path - that wiring
//! (interest selection -> codec encode -> `ServerProtocol::store_snapshot`)
//! is this module's own addition.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec2;

use arcnet_core::{
    sanitize_direction, ConnectionManager, ConnectionState, EntityType, FixedTimestep,
    InputSample, InterestManager, LagCompensation, MovingObstacle, NetworkEndpoint,
    NetworkSimulator, NetworkStats, Packet, PacketHeader, PacketLossSimulation, PacketType,
    PendingInputs, PhysicsEngine, ServerProtocol, Snapshot, SnapshotCodec, World, WorldHistoryFrame,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};

pub struct GameServer {
    endpoint: NetworkEndpoint,
    connections: ConnectionManager,
    config: ServerConfig,
    world: World,
    protocol: ServerProtocol,
    interest: InterestManager,
    codec: SnapshotCodec,
    lag_compensation: LagCompensation,
    pending_inputs: PendingInputs,
    physics: Box<dyn PhysicsEngine>,
    obstacles: Vec<MovingObstacle>,
    timestep: FixedTimestep,
    last_frame_time: Instant,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<ServerEvent>,
    /// Per-addr loss/latency injection for outbound packets, driven by
    /// `ServerConfig::global_packet_loss` and live `set_packet_loss_sim`
    /// calls from the operator console. Inbound loss is simulated directly
    /// off `ClientConnection::packet_loss_sim` in `process_network`.
    simulator: NetworkSimulator,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid bind address"))?;
        let endpoint = NetworkEndpoint::bind(addr)?;

        let world = World::new(config.network.chunk_size);
        let codec = SnapshotCodec::new(&config.network);
        let interest = InterestManager::new(&config.network);
        let protocol = ServerProtocol::new(&config.network);
        let lag_compensation = LagCompensation::new(&config.network);
        let timestep = FixedTimestep::new(config.network.tick_delta());
        let connections =
            ConnectionManager::with_timeout(config.max_clients, config.network.connection_timeout_secs);

        let physics: Box<dyn PhysicsEngine> = Box::new(arcnet_core::DirectPhysicsEngine {
            world_min: config.network.world_min,
            world_max: config.network.world_max,
        });

        Ok(Self {
            endpoint,
            connections,
            world,
            protocol,
            interest,
            codec,
            lag_compensation,
            pending_inputs: PendingInputs::default(),
            physics,
            obstacles: Vec::new(),
            timestep,
            last_frame_time: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            pending_events: VecDeque::new(),
            simulator: NetworkSimulator::new(),
            config,
        })
    }

    /// Spawns a scripted moving obstacle that ping-pongs between `start` and `end`.
    pub fn spawn_obstacle(&mut self, start: Vec2, end: Vec2, speed: f32) {
        let id = self.world.spawn(EntityType::MovingObstacle, start);
        self.obstacles.push(MovingObstacle::new(id, start, end, speed));
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown_connections();
    }

    pub fn shutdown_connections(&mut self) {
        let peer_ids: Vec<u32> = self.connections.iter().map(|c| c.peer_id).collect();
        for peer_id in peer_ids {
            self.kick_client(peer_id, DisconnectReason::Kicked);
        }
    }

    pub fn kick_client(&mut self, peer_id: u32, reason: DisconnectReason) {
        if let Some(client) = self.connections.get(peer_id) {
            let addr = client.addr;
            let packet = Packet::new(PacketHeader::new(0, 0, 0), PacketType::Disconnect);
            self.send_packet(packet, addr);
        }

        if let Some(client) = self.connections.remove(peer_id) {
            if let Some(entity_id) = client.entity_id {
                self.world.despawn(entity_id);
            }
            self.protocol.remove_peer(peer_id);
            self.interest.forget_peer(peer_id);
            self.simulator.set_config(client.addr, PacketLossSimulation::default());
            self.pending_events.push_back(ServerEvent::ClientDisconnected { peer_id, reason });
        }
    }

    /// Routes a packet through the outbound loss/latency simulator before
    /// it ever reaches the socket: dropped outright, sent immediately, or
    /// queued for delayed release and later flushed from `process_network`.
    fn send_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if self.simulator.should_drop(&addr) {
            return;
        }
        let delay = self.simulator.delay_for(&addr);
        if delay.is_zero() {
            if let Err(e) = self.endpoint.send_to(&packet, addr) {
                self.pending_events.push_back(ServerEvent::Error { message: format!("send to {addr}: {e}") });
            }
        } else {
            self.simulator.enqueue_outbound(packet, addr);
        }
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let frame_dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        if let Err(e) = self.process_network() {
            self.pending_events.push_back(ServerEvent::Error { message: format!("network error: {e}") });
        }

        self.timestep.accumulate(frame_dt);
        while self.timestep.should_tick() {
            self.timestep.consume_tick();
            self.tick();
        }

        for peer_id in self.connections.cleanup_timed_out() {
            self.protocol.remove_peer(peer_id);
            self.interest.forget_peer(peer_id);
            self.pending_events.push_back(ServerEvent::ClientDisconnected {
                peer_id,
                reason: DisconnectReason::Timeout,
            });
        }
    }

    fn tick(&mut self) {
        let dt = self.config.network.tick_delta();
        let tick = self.timestep.current_tick;

        for (peer, direction) in self.pending_inputs.drain() {
            if let Some(client) = self.connections.get(peer) {
                if let Some(entity_id) = client.entity_id {
                    if let Some(entity) = self.world.get_mut(entity_id) {
                        arcnet_core::apply_input_velocity(entity, direction, self.config.network.player_speed);
                    }
                }
            }
        }

        self.physics.resolve(&mut self.world, dt);
        for obstacle in &mut self.obstacles {
            obstacle.step(&mut self.world, dt);
        }

        let mut frame = WorldHistoryFrame::new();
        for entity in self.world.entities() {
            frame.insert(entity.id, entity.position);
        }
        self.lag_compensation.record(tick, frame);

        if tick % self.config.network.ticks_per_snapshot() == 0 {
            self.broadcast_snapshots(tick);
        }
    }

    fn broadcast_snapshots(&mut self, tick: u32) {
        let timestamp_ms = (tick as f32 * self.config.network.tick_delta() * 1000.0) as u32;
        let peer_ids = self.protocol.peer_ids();

        for peer_id in peer_ids {
            let Some(client) = self.connections.get(peer_id) else { continue };
            let Some(player_entity_id) = client.entity_id else { continue };
            let addr = client.addr;
            let Some(player) = self.world.get(player_entity_id) else { continue };
            let center = player.position;

            let chunk_index = self.world.chunk_index();
            let visible = self.interest.select_visible(peer_id, player_entity_id, center, chunk_index, |id| {
                self.world.get(id).map(|e| e.position)
            });

            let states = visible
                .into_iter()
                .filter_map(|id| self.world.get(id).map(|e| (id, e.state())))
                .collect();

            let Some((sequence, baseline)) = self.protocol.begin_snapshot(peer_id) else { continue };
            let last_processed_input_tick = self
                .protocol
                .peer_state(peer_id)
                .map(|s| s.last_input_tick)
                .unwrap_or(0);

            let mut snapshot = Snapshot {
                sequence,
                timestamp_ms,
                baseline_sequence: baseline.as_ref().map(|b| b.sequence).unwrap_or(0),
                player_entity_id,
                last_processed_input_tick,
                states,
            };

            let mut bytes = self.codec.encode(&snapshot, baseline.as_ref());
            let mut dropped = 0u32;
            while bytes.len() > self.config.network.max_packet_bytes && snapshot.states.len() > 1 {
                let farthest = snapshot
                    .states
                    .iter()
                    .filter(|(&id, _)| id != player_entity_id)
                    .max_by(|(_, a), (_, b)| {
                        let da = a.position.distance_squared(center);
                        let db = b.position.distance_squared(center);
                        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(&id, _)| id);
                let Some(drop_id) = farthest else { break };
                snapshot.states.remove(&drop_id);
                dropped += 1;
                bytes = self.codec.encode(&snapshot, baseline.as_ref());
            }
            if dropped > 0 {
                log::warn!(
                    "peer {peer_id}: dropped {dropped} lowest-priority entities to fit snapshot in {} bytes",
                    self.config.network.max_packet_bytes
                );
            }

            let packet = Packet::new(PacketHeader::new(sequence as u32, 0, 0), PacketType::SnapshotData(bytes));
            self.send_packet(packet, addr);

            self.protocol.store_snapshot(peer_id, snapshot);
        }
    }

    fn process_network(&mut self) -> io::Result<()> {
        for (packet, addr) in self.endpoint.receive() {
            let dropped = self
                .connections
                .get_by_addr(&addr)
                .is_some_and(|c| c.packet_loss_sim.should_drop());
            if dropped {
                continue;
            }
            self.handle_packet(packet, addr)?;
        }

        for (packet, addr) in self.simulator.take_outbound() {
            if let Err(e) = self.endpoint.send_to(&packet, addr) {
                self.pending_events.push_back(ServerEvent::Error { message: format!("send to {addr}: {e}") });
            }
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) -> io::Result<()> {
        match packet.payload {
            PacketType::ConnectionRequest { client_salt } => self.handle_connection_request(addr, client_salt)?,
            PacketType::ChallengeResponse { combined_salt } => self.handle_challenge_response(addr, combined_salt)?,
            PacketType::PlayerInput(input) => self.handle_player_input(addr, input),
            PacketType::RequestFullSnapshot => self.handle_request_full_snapshot(addr),
            PacketType::ClockSyncRequest { client_send_time_ms } => self.handle_clock_sync(addr, client_send_time_ms)?,
            PacketType::Disconnect => self.handle_disconnect(addr),
            _ => {}
        }

        if let Some(client) = self.connections.get_by_addr_mut(&addr) {
            client.touch();
        }

        Ok(())
    }

    fn handle_connection_request(&mut self, addr: SocketAddr, client_salt: u64) -> io::Result<()> {
        self.pending_events.push_back(ServerEvent::ClientConnecting { addr });
        let global_loss = self.config.global_packet_loss;

        let client = match self.connections.get_or_create_pending(addr, client_salt) {
            Ok(c) => c,
            Err(reason) => {
                let packet = Packet::new(
                    PacketHeader::new(0, 0, 0),
                    PacketType::ConnectionDenied { reason: reason.to_string() },
                );
                self.send_packet(packet, addr);
                self.pending_events.push_back(ServerEvent::ConnectionDenied { addr, reason: reason.to_string() });
                return Ok(());
            }
        };

        if let Some(sim) = global_loss {
            client.packet_loss_sim = sim;
        }

        let server_salt = client.server_salt;
        let challenge = client.combined_salt();
        let packet = Packet::new(
            PacketHeader::new(client.send_sequence, 0, 0),
            PacketType::ConnectionChallenge { server_salt, challenge },
        );
        client.send_sequence += 1;

        if let Some(sim) = global_loss {
            self.simulator.set_config(addr, sim);
        }
        self.send_packet(packet, addr);
        Ok(())
    }

    fn handle_challenge_response(&mut self, addr: SocketAddr, combined_salt: u64) -> io::Result<()> {
        let Some(client) = self.connections.get_by_addr_mut(&addr) else { return Ok(()) };

        if combined_salt != client.combined_salt() {
            self.pending_events
                .push_back(ServerEvent::Error { message: format!("bad challenge response from {addr}") });
            return Ok(());
        }

        client.state = ConnectionState::Connected;
        let peer_id = client.peer_id;
        let send_sequence = client.send_sequence;
        client.send_sequence += 1;

        let entity_id = self.world.spawn_player(peer_id, Vec2::ZERO);
        if let Some(client) = self.connections.get_mut(peer_id) {
            client.entity_id = Some(entity_id);
        }
        self.protocol.register_peer(peer_id, entity_id);

        self.pending_events.push_back(ServerEvent::ClientConnected { peer_id, addr, entity_id });

        let packet = Packet::new(
            PacketHeader::new(send_sequence, 0, 0),
            PacketType::ConnectionAccepted { peer_id, entity_id },
        );
        self.send_packet(packet, addr);
        Ok(())
    }

    fn handle_player_input(&mut self, addr: SocketAddr, input: arcnet_core::PlayerInput) {
        let Some(client) = self.connections.get_by_addr(&addr) else { return };
        if client.state != ConnectionState::Connected {
            return;
        }
        let peer_id = client.peer_id;

        let direction = sanitize_direction(Vec2::new(input.direction[0], input.direction[1]));
        self.pending_inputs.enqueue(peer_id, input.tick, direction);
        self.protocol.apply_input(InputSample {
            peer: peer_id,
            direction,
            tick: input.tick,
            ack: input.last_received_sequence,
        });
    }

    fn handle_request_full_snapshot(&mut self, addr: SocketAddr) {
        if let Some(client) = self.connections.get_by_addr(&addr) {
            self.protocol.request_keyframe(client.peer_id);
        }
    }

    fn handle_clock_sync(&mut self, addr: SocketAddr, client_send_time_ms: u32) -> io::Result<()> {
        let server_receive_time_ms = monotonic_ms();
        let server_send_time_ms = monotonic_ms();
        let packet = Packet::new(
            PacketHeader::new(0, 0, 0),
            PacketType::ClockSyncReply { client_send_time_ms, server_receive_time_ms, server_send_time_ms },
        );
        self.send_packet(packet, addr);
        Ok(())
    }

    fn handle_disconnect(&mut self, addr: SocketAddr) {
        if let Some(client) = self.connections.get_by_addr(&addr) {
            let peer_id = client.peer_id;
            self.kick_client(peer_id, DisconnectReason::Graceful);
        }
    }

    /// Live packet-loss injection for a single peer, reachable from the
    /// operator console's kick/loss controls. Updates both the inbound
    /// (`packet_loss_sim`, read in `process_network`) and outbound
    /// (`simulator`, read by `send_packet`) paths so the change takes
    /// effect in both directions immediately.
    pub fn set_packet_loss_sim(&mut self, peer_id: u32, sim: PacketLossSimulation) {
        if let Some(client) = self.connections.get_mut(peer_id) {
            client.packet_loss_sim = sim;
        }
        if let Some(client) = self.connections.get(peer_id) {
            self.simulator.set_config(client.addr, sim);
        }
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.timestep.current_tick,
            client_count: self.connections.connected_count(),
            max_clients: self.config.max_clients,
            entity_count: self.world.len(),
            network_stats: self.endpoint.stats,
        }
    }

    pub fn client_infos(&self) -> Vec<ClientInfo> {
        self.connections
            .iter()
            .filter(|c| c.state == ConnectionState::Connected)
            .map(|c| ClientInfo {
                peer_id: c.peer_id,
                addr: c.addr.to_string(),
                entity_id: c.entity_id,
            })
            .collect()
    }
}

fn monotonic_ms() -> u32 {
    use std::sync::OnceLock;
    static START: OnceLock<Instant> = OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u32
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u32,
    pub client_count: usize,
    pub max_clients: usize,
    pub entity_count: usize,
    pub network_stats: NetworkStats,
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub peer_id: u32,
    pub addr: String,
    pub entity_id: Option<u32>,
}

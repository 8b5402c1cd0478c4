//! Client-side connection state machine: UDP handshake, periodic input
//! send, clock sync, and snapshot receive, grounded on the teacher's
//! `net::client` connect/update loop but built on this engine's own
//! transport/protocol types.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use arcnet_core::{
    sanitize_direction, NetworkEndpoint, Packet, PacketHeader, PacketType, PlayerInput,
};
use glam::Vec2;

use crate::clock::ClockSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    ChallengeResponse,
    Connected,
    Disconnected,
}

fn monotonic_ms(epoch: Instant) -> u32 {
    epoch.elapsed().as_millis() as u32
}

/// Drives one connection to a single server: the handshake, periodic input
/// send at `input_send_rate`, periodic clock sync, and dispatch of inbound
/// packets into whatever the caller's update loop needs (snapshot bytes,
/// clock sync replies, connection acceptance/denial).
pub struct NetworkClient {
    endpoint: NetworkEndpoint,
    server_addr: SocketAddr,
    state: ClientState,
    client_salt: u64,
    server_salt: u64,
    peer_id: Option<u32>,
    entity_id: Option<u32>,
    send_sequence: u32,
    epoch: Instant,
    last_input_send: Instant,
    input_send_interval: Duration,
    last_clock_sync: Instant,
    clock_sync_interval: Duration,
    pub clock: ClockSync,
    last_received_sequence: u16,
    deny_reason: Option<String>,
}

pub enum ClientEvent {
    Connected { peer_id: u32, entity_id: u32 },
    Denied { reason: String },
    Snapshot(Vec<u8>),
}

impl NetworkClient {
    pub fn connect(
        bind_addr: &str,
        server_addr: &str,
        input_send_rate: u32,
        clock_sync_interval_ms: u64,
    ) -> std::io::Result<Self> {
        let endpoint = NetworkEndpoint::bind(bind_addr.parse().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad bind address")
        })?)?;
        let server_addr: SocketAddr = server_addr
            .parse()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad server address"))?;

        let client_salt = pseudo_random_salt();

        Ok(Self {
            endpoint,
            server_addr,
            state: ClientState::Connecting,
            client_salt,
            server_salt: 0,
            peer_id: None,
            entity_id: None,
            send_sequence: 0,
            epoch: Instant::now(),
            last_input_send: Instant::now(),
            input_send_interval: Duration::from_millis(1000 / input_send_rate.max(1) as u64),
            last_clock_sync: Instant::now(),
            clock_sync_interval: Duration::from_millis(clock_sync_interval_ms),
            clock: ClockSync::new(),
            last_received_sequence: 0,
            deny_reason: None,
        })
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn peer_id(&self) -> Option<u32> {
        self.peer_id
    }

    pub fn entity_id(&self) -> Option<u32> {
        self.entity_id
    }

    pub fn deny_reason(&self) -> Option<&str> {
        self.deny_reason.as_deref()
    }

    pub fn stats(&self) -> arcnet_core::NetworkStats {
        self.endpoint.stats
    }

    fn next_sequence(&mut self) -> u32 {
        let seq = self.send_sequence;
        self.send_sequence += 1;
        seq
    }

    fn send(&mut self, payload: PacketType) {
        let seq = self.next_sequence();
        let packet = Packet::new(PacketHeader::new(seq, 0, 0), payload);
        let _ = self.endpoint.send_to(&packet, self.server_addr);
    }

    pub fn begin_handshake(&mut self) {
        self.send(PacketType::ConnectionRequest { client_salt: self.client_salt });
    }

    pub fn request_full_snapshot(&mut self) {
        self.send(PacketType::RequestFullSnapshot);
    }

    pub fn disconnect(&mut self) {
        if self.state == ClientState::Connected {
            self.send(PacketType::Disconnect);
        }
        self.state = ClientState::Disconnected;
    }

    /// Called once per frame: sends input/clock-sync on their own cadences
    /// and drains the socket, turning accepted packets into `ClientEvent`s.
    pub fn poll(&mut self, direction: Vec2, tick: u32) -> Vec<ClientEvent> {
        let now = Instant::now();

        if self.state == ClientState::Connected && now.duration_since(self.last_input_send) >= self.input_send_interval {
            self.last_input_send = now;
            let input = PlayerInput {
                direction: sanitize_direction(direction).to_array(),
                tick,
                render_time_ms: monotonic_ms(self.epoch),
                last_received_sequence: self.last_received_sequence,
            };
            self.send(PacketType::PlayerInput(input));
        }

        if now.duration_since(self.last_clock_sync) >= self.clock_sync_interval {
            self.last_clock_sync = now;
            let send_time = monotonic_ms(self.epoch);
            self.clock.on_request_sent(send_time);
            self.send(PacketType::ClockSyncRequest { client_send_time_ms: send_time });
        }

        let mut events = Vec::new();
        let received = self.endpoint.receive();
        for (packet, _addr) in received {
            self.last_received_sequence = packet.header.sequence as u16;
            if let Some(event) = self.handle_packet(packet.payload) {
                events.push(event);
            }
        }
        events
    }

    fn handle_packet(&mut self, payload: PacketType) -> Option<ClientEvent> {
        match payload {
            PacketType::ConnectionChallenge { server_salt, challenge } => {
                self.server_salt = server_salt;
                self.state = ClientState::ChallengeResponse;
                self.send(PacketType::ChallengeResponse { combined_salt: challenge });
                None
            }
            PacketType::ConnectionAccepted { peer_id, entity_id } => {
                self.peer_id = Some(peer_id);
                self.entity_id = Some(entity_id);
                self.state = ClientState::Connected;
                Some(ClientEvent::Connected { peer_id, entity_id })
            }
            PacketType::ConnectionDenied { reason } => {
                self.deny_reason = Some(reason.clone());
                self.state = ClientState::Disconnected;
                Some(ClientEvent::Denied { reason })
            }
            PacketType::SnapshotData(bytes) => Some(ClientEvent::Snapshot(bytes)),
            PacketType::ClockSyncReply { client_send_time_ms, server_receive_time_ms, server_send_time_ms } => {
                let now = monotonic_ms(self.epoch);
                self.clock.on_reply(client_send_time_ms, server_receive_time_ms, server_send_time_ms, now);
                None
            }
            PacketType::Disconnect => {
                self.state = ClientState::Disconnected;
                None
            }
            _ => None,
        }
    }
}

fn pseudo_random_salt() -> u64 {
    use std::hash::{BuildHasher, Hash, Hasher};
    let mut hasher = std::collections::hash_map::RandomState::new().build_hasher();
    Instant::now().hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_client_starts_connecting() {
        let client = NetworkClient::connect("127.0.0.1:0", "127.0.0.1:7777", 20, 1000).unwrap();
        assert_eq!(client.state(), ClientState::Connecting);
        assert!(client.peer_id().is_none());
    }

    #[test]
    fn challenge_response_advances_state_and_replies() {
        let mut client = NetworkClient::connect("127.0.0.1:0", "127.0.0.1:7777", 20, 1000).unwrap();
        let event = client.handle_packet(PacketType::ConnectionChallenge { server_salt: 42, challenge: 99 });
        assert!(event.is_none());
        assert_eq!(client.state(), ClientState::ChallengeResponse);
        assert_eq!(client.server_salt, 42);
    }

    #[test]
    fn acceptance_populates_identity() {
        let mut client = NetworkClient::connect("127.0.0.1:0", "127.0.0.1:7777", 20, 1000).unwrap();
        let event = client.handle_packet(PacketType::ConnectionAccepted { peer_id: 7, entity_id: 3 });
        assert_eq!(client.peer_id(), Some(7));
        assert_eq!(client.entity_id(), Some(3));
        assert!(matches!(event, Some(ClientEvent::Connected { peer_id: 7, entity_id: 3 })));
    }

    #[test]
    fn denial_disconnects_and_records_reason() {
        let mut client = NetworkClient::connect("127.0.0.1:0", "127.0.0.1:7777", 20, 1000).unwrap();
        client.handle_packet(PacketType::ConnectionDenied { reason: "server full".to_string() });
        assert_eq!(client.state(), ClientState::Disconnected);
        assert_eq!(client.deny_reason(), Some("server full"));
    }
}

//! Per-peer connection bookkeeping and the salt-challenge handshake state
//! machine. Adapted from the teacher's `net::connection`: the connection
//! state machine and salt exchange are unchanged, but the struct is
//! generalized to carry this engine's snapshot-protocol peer id instead of
//! the teacher's lobby-aware client fields.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::transport::stats::{rand_u64, PacketLossSimulation};
use crate::transport::tracking::ReceiveTracker;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ChallengeResponse,
    Connected,
    Disconnecting,
}

#[derive(Debug)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    pub peer_id: u32,
    pub state: ConnectionState,
    pub client_salt: u64,
    pub server_salt: u64,
    pub last_receive_time: Instant,
    pub entity_id: Option<u32>,
    pub receive_tracker: ReceiveTracker,
    pub send_sequence: u32,
    pub packet_loss_sim: PacketLossSimulation,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, peer_id: u32, client_salt: u64) -> Self {
        Self {
            addr,
            peer_id,
            state: ConnectionState::Connecting,
            client_salt,
            server_salt: rand_u64(),
            last_receive_time: Instant::now(),
            entity_id: None,
            receive_tracker: ReceiveTracker::new(),
            send_sequence: 0,
            packet_loss_sim: PacketLossSimulation::default(),
        }
    }

    pub fn combined_salt(&self) -> u64 {
        self.client_salt ^ self.server_salt
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }
}

#[derive(Debug)]
pub struct ConnectionManager {
    clients_by_addr: HashMap<SocketAddr, u32>,
    clients: HashMap<u32, ClientConnection>,
    next_peer_id: u32,
    max_clients: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(max_clients: usize, timeout_secs: u64) -> Self {
        Self {
            clients_by_addr: HashMap::new(),
            clients: HashMap::new(),
            next_peer_id: 1,
            max_clients,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn get_or_create_pending(
        &mut self,
        addr: SocketAddr,
        client_salt: u64,
    ) -> Result<&mut ClientConnection, &'static str> {
        if let Some(&peer_id) = self.clients_by_addr.get(&addr) {
            return Ok(self.clients.get_mut(&peer_id).unwrap());
        }

        if self.clients.len() >= self.max_clients {
            return Err("server full");
        }

        let peer_id = self.next_peer_id;
        self.next_peer_id += 1;

        let connection = ClientConnection::new(addr, peer_id, client_salt);
        self.clients.insert(peer_id, connection);
        self.clients_by_addr.insert(addr, peer_id);

        Ok(self.clients.get_mut(&peer_id).unwrap())
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&ClientConnection> {
        self.clients_by_addr.get(addr).and_then(|id| self.clients.get(id))
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut ClientConnection> {
        let id = *self.clients_by_addr.get(addr)?;
        self.clients.get_mut(&id)
    }

    pub fn get(&self, peer_id: u32) -> Option<&ClientConnection> {
        self.clients.get(&peer_id)
    }

    pub fn get_mut(&mut self, peer_id: u32) -> Option<&mut ClientConnection> {
        self.clients.get_mut(&peer_id)
    }

    pub fn remove(&mut self, peer_id: u32) -> Option<ClientConnection> {
        let conn = self.clients.remove(&peer_id)?;
        self.clients_by_addr.remove(&conn.addr);
        Some(conn)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientConnection> {
        self.clients.values_mut()
    }

    pub fn cleanup_timed_out(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_timed_out(self.timeout))
            .map(|(&id, _)| id)
            .collect();

        for id in &timed_out {
            self.remove(*id);
        }

        timed_out
    }

    pub fn connected_count(&self) -> usize {
        self.clients.values().filter(|c| c.state == ConnectionState::Connected).count()
    }

    pub fn total_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn new_address_gets_a_fresh_peer_id() {
        let mut mgr = ConnectionManager::new(8);
        let conn = mgr.get_or_create_pending(addr(1000), 42).unwrap();
        assert_eq!(conn.peer_id, 1);
        assert_eq!(conn.client_salt, 42);
    }

    #[test]
    fn repeated_request_from_same_addr_reuses_connection() {
        let mut mgr = ConnectionManager::new(8);
        mgr.get_or_create_pending(addr(1000), 1).unwrap();
        let conn = mgr.get_or_create_pending(addr(1000), 99).unwrap();
        assert_eq!(conn.peer_id, 1);
        assert_eq!(conn.client_salt, 1, "salt from the original request is preserved");
    }

    #[test]
    fn server_full_rejects_new_connections() {
        let mut mgr = ConnectionManager::new(1);
        mgr.get_or_create_pending(addr(1000), 1).unwrap();
        assert!(mgr.get_or_create_pending(addr(1001), 2).is_err());
    }

    #[test]
    fn combined_salt_xors_both_sides() {
        let conn = ClientConnection::new(addr(1000), 1, 0b1010);
        let combined = conn.combined_salt();
        assert_eq!(combined, 0b1010 ^ conn.server_salt);
    }
}

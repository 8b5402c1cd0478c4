//! A bound, non-blocking UDP socket paired with connection stats. Adapted
//! from the teacher's `net::endpoint`: the drain-and-validate receive loop is
//! unchanged, only the header/packet types are swapped for this engine's.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::protocol::{Packet, PacketError};
use crate::transport::stats::NetworkStats;

const MAX_PACKET_SIZE: usize = 1400;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    pub remote_addr: Option<SocketAddr>,
    pub stats: NetworkStats,
    recv_buffer: [u8; MAX_PACKET_SIZE],
    timeout: Duration,
    last_receive_time: Instant,
    running: bool,
}

impl NetworkEndpoint {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            remote_addr: None,
            stats: NetworkStats::default(),
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            last_receive_time: Instant::now(),
            running: true,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn send_to(&mut self, packet: &Packet, addr: SocketAddr) -> Result<(), PacketError> {
        let bytes = packet.serialize()?;
        if self.socket.send_to(&bytes, addr).is_ok() {
            self.stats.packets_sent += 1;
            self.stats.bytes_sent += bytes.len() as u64;
        }
        Ok(())
    }

    pub fn send(&mut self, packet: &Packet) -> Result<(), PacketError> {
        if let Some(addr) = self.remote_addr {
            self.send_to(packet, addr)
        } else {
            Ok(())
        }
    }

    /// Drains every datagram currently queued on the socket, validating each
    /// header before handing it back. Malformed headers are dropped silently;
    /// everything else updates receive stats and the timeout clock.
    pub fn receive(&mut self) -> Vec<(Packet, SocketAddr)> {
        let mut received = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((len, addr)) => {
                    self.stats.bytes_received += len as u64;
                    match Packet::deserialize(&self.recv_buffer[..len]) {
                        Ok(packet) if packet.header.is_valid() => {
                            self.stats.packets_received += 1;
                            self.last_receive_time = Instant::now();
                            received.push((packet, addr));
                        }
                        _ => {
                            self.stats.packets_lost += 1;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }

        received
    }

    pub fn is_timed_out(&self) -> bool {
        self.last_receive_time.elapsed() > self.timeout
    }

    pub fn reset(&mut self) {
        self.last_receive_time = Instant::now();
    }

    pub fn shutdown(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PacketHeader, PacketType};

    fn bind_any() -> NetworkEndpoint {
        NetworkEndpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    #[test]
    fn send_and_receive_roundtrips_a_packet() {
        let mut a = bind_any();
        let mut b = bind_any();
        let b_addr = b.local_addr();

        let packet = Packet::new(PacketHeader::new(1, 0, 0), PacketType::RequestFullSnapshot);
        a.send_to(&packet, b_addr).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let received = b.receive();
        assert_eq!(received.len(), 1);
    }

    #[test]
    fn fresh_endpoint_is_not_timed_out() {
        let endpoint = bind_any();
        assert!(!endpoint.is_timed_out());
    }

    #[test]
    fn shutdown_marks_endpoint_not_running() {
        let mut endpoint = bind_any();
        assert!(endpoint.is_running());
        endpoint.shutdown();
        assert!(!endpoint.is_running());
    }
}

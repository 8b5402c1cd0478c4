//! Test-only inbound/outbound packet queues with simulated delay, carried
//! over from the teacher's `net::simulator` essentially unchanged. Used by
//! integration tests to exercise loss/jitter/reordering without a real flaky
//! network.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::protocol::Packet;
use crate::transport::stats::PacketLossSimulation;

#[derive(Debug)]
struct DelayedPacket {
    release_time: Instant,
    packet: Packet,
    addr: SocketAddr,
}

impl PartialEq for DelayedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time
    }
}

impl Eq for DelayedPacket {}

impl PartialOrd for DelayedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order turns BinaryHeap (a max-heap) into a min-heap on release_time.
        other.release_time.cmp(&self.release_time)
    }
}

#[derive(Debug, Default)]
pub struct NetworkSimulator {
    configs: HashMap<SocketAddr, PacketLossSimulation>,
    inbound_queue: BinaryHeap<DelayedPacket>,
    outbound_queue: BinaryHeap<DelayedPacket>,
}

impl NetworkSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&mut self, addr: SocketAddr, config: PacketLossSimulation) {
        if config.enabled {
            self.configs.insert(addr, config);
        } else {
            self.configs.remove(&addr);
        }
    }

    pub fn get_config(&self, addr: &SocketAddr) -> Option<&PacketLossSimulation> {
        self.configs.get(addr)
    }

    pub fn should_drop(&self, addr: &SocketAddr) -> bool {
        self.configs.get(addr).is_some_and(|sim| sim.should_drop())
    }

    pub fn delay_for(&self, addr: &SocketAddr) -> Duration {
        self.configs
            .get(addr)
            .map_or(Duration::ZERO, |sim| Duration::from_millis(sim.delay_ms() as u64))
    }

    pub fn enqueue_inbound(&mut self, packet: Packet, addr: SocketAddr) {
        let release_time = Instant::now() + self.delay_for(&addr);
        self.inbound_queue.push(DelayedPacket { release_time, packet, addr });
    }

    pub fn enqueue_outbound(&mut self, packet: Packet, addr: SocketAddr) {
        let release_time = Instant::now() + self.delay_for(&addr);
        self.outbound_queue.push(DelayedPacket { release_time, packet, addr });
    }

    pub fn take_inbound(&mut self) -> Vec<(Packet, SocketAddr)> {
        Self::drain_ready(&mut self.inbound_queue)
    }

    pub fn take_outbound(&mut self) -> Vec<(Packet, SocketAddr)> {
        Self::drain_ready(&mut self.outbound_queue)
    }

    fn drain_ready(queue: &mut BinaryHeap<DelayedPacket>) -> Vec<(Packet, SocketAddr)> {
        let mut packets = Vec::new();
        let now = Instant::now();
        while let Some(delayed) = queue.peek() {
            if delayed.release_time <= now {
                let delayed = queue.pop().unwrap();
                packets.push((delayed.packet, delayed.addr));
            } else {
                break;
            }
        }
        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Packet, PacketHeader, PacketType};

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn packet() -> Packet {
        Packet::new(PacketHeader::new(1, 0, 0), PacketType::RequestFullSnapshot)
    }

    #[test]
    fn zero_delay_packet_is_immediately_ready() {
        let mut sim = NetworkSimulator::new();
        sim.enqueue_inbound(packet(), addr());
        let ready = sim.take_inbound();
        assert_eq!(ready.len(), 1);
    }

    #[test]
    fn delayed_packet_is_not_ready_before_release_time() {
        let mut sim = NetworkSimulator::new();
        sim.set_config(
            addr(),
            PacketLossSimulation {
                enabled: true,
                min_latency_ms: 500,
                max_latency_ms: 500,
                ..Default::default()
            },
        );
        sim.enqueue_inbound(packet(), addr());
        assert!(sim.take_inbound().is_empty());
    }

    #[test]
    fn removing_config_clears_future_delay() {
        let mut sim = NetworkSimulator::new();
        sim.set_config(
            addr(),
            PacketLossSimulation {
                enabled: true,
                min_latency_ms: 500,
                max_latency_ms: 500,
                ..Default::default()
            },
        );
        sim.set_config(addr(), PacketLossSimulation::default());
        assert!(sim.get_config(&addr()).is_none());
        assert_eq!(sim.delay_for(&addr()), Duration::ZERO);
    }
}

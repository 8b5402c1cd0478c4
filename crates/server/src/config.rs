//! Server-specific configuration, grounded on the teacher's `ServerConfig`:
//! a plain struct with a `Default` impl layered on top of `arcnet_core::NetworkConfig`.

use arcnet_core::{NetworkConfig, PacketLossSimulation};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub max_clients: usize,
    pub global_packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            max_clients: 32,
            global_packet_loss: None,
        }
    }
}

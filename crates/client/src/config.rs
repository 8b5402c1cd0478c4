//! Client-specific configuration, layered on `arcnet_core::NetworkConfig`
//! the same way the server's `ServerConfig` is.

use arcnet_core::NetworkConfig;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    pub server_addr: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            server_addr: "127.0.0.1:7777".to_string(),
        }
    }
}

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::Context;
use lcrmeter_core::config::MeterSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address for the HTTP server to listen on
    pub http_addr: SocketAddr,
    pub meter: MeterSettings,
    /// Expose the built-in simulator as a pseudo-port
    pub simulator: bool,
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: ServerConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)),
            meter: MeterSettings::default(),
            simulator: false,
        }
    }
}

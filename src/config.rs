use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_port: u16,
    pub client_port: u16,
    pub broadcast_address: Ipv4Addr,
    pub bind_client_port: bool,
    pub receive_timeout_seconds: u64,
    pub max_attempts: u32,
    pub tick_millis: u64,
    pub simulated_clients: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 67,
            client_port: 68,
            broadcast_address: Ipv4Addr::BROADCAST,
            bind_client_port: true,
            receive_timeout_seconds: 5,
            max_attempts: 3,
            tick_millis: 1000,
            simulated_clients: 5,
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            return Err(Error::InvalidConfig(
                "server_port must be greater than 0".to_string(),
            ));
        }

        if self.receive_timeout_seconds == 0 {
            return Err(Error::InvalidConfig(
                "receive_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.tick_millis == 0 {
            return Err(Error::InvalidConfig(
                "tick_millis must be greater than 0".to_string(),
            ));
        }

        if self.simulated_clients == 0 {
            return Err(Error::InvalidConfig(
                "simulated_clients must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Destination for DISCOVER and rebinding REQUEST messages.
    pub fn server_broadcast(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.broadcast_address, self.server_port))
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_seconds)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

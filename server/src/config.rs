use crate::master::DEFAULT_HEARTBEAT_INTERVAL;
use shared::{PluginEntry, PluginManifest, DEFAULT_PASSWORD, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct MasterConfig {
    pub addr: SocketAddr,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub server_name: String,
    pub max_connections: usize,
    /// None runs with the default password.
    pub password: Option<String>,
    pub plugins: PluginManifest,
    pub master: Option<MasterConfig>,
    pub connection_timeout: Duration,
    pub ping_interval: Duration,
    /// How often pending change lists are flushed.
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            server_name: "Relay server".to_string(),
            max_connections: 64,
            password: None,
            plugins: PluginManifest::default(),
            master: None,
            connection_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl ServerConfig {
    pub fn with_master(mut self, addr: SocketAddr) -> Self {
        self.master = Some(MasterConfig {
            addr,
            interval: DEFAULT_HEARTBEAT_INTERVAL,
        });
        self
    }

    pub fn effective_password(&self) -> &str {
        effective_password(self.password.as_deref())
    }
}

/// Empty or missing passwords fall back to the default.
pub fn effective_password(password: Option<&str>) -> &str {
    match password {
        Some(password) if !password.is_empty() => password,
        _ => DEFAULT_PASSWORD,
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal checksum.
pub fn parse_checksum(value: &str) -> Result<u32, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid checksum '{}': {}", value, e))
}

/// Parses `NAME` or `NAME=HASH[,HASH...]` into a manifest entry.
pub fn parse_plugin(value: &str) -> Result<PluginEntry, String> {
    let (name, hashes) = match value.split_once('=') {
        Some((name, hashes)) => (name.trim(), Some(hashes)),
        None => (value.trim(), None),
    };

    if name.is_empty() {
        return Err(format!("plugin '{}' has no name", value));
    }

    let hashes = match hashes {
        Some(list) => list
            .split(',')
            .filter(|hash| !hash.trim().is_empty())
            .map(parse_checksum)
            .collect::<Result<Vec<u32>, String>>()?,
        None => Vec::new(),
    };

    Ok(PluginEntry::new(name, hashes))
}

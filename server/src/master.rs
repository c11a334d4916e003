//! Master directory heartbeat client.
//!
//! The server announces itself to a master directory on a fixed interval.
//! Each heartbeat carries the current population and the plugin manifest so
//! players can pick a compatible server before connecting.

use crate::transport::Outbox;
use log::{debug, info};
use shared::{Datagram, ServerInfo};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub struct MasterClient {
    master_addr: SocketAddr,
    interval: Duration,
    plugins: Vec<(String, u32)>,
    heartbeats_sent: u64,
    acknowledged: bool,
}

impl MasterClient {
    pub fn new(master_addr: SocketAddr, interval: Duration) -> Self {
        Self {
            master_addr,
            interval,
            plugins: Vec::new(),
            heartbeats_sent: 0,
            acknowledged: false,
        }
    }

    pub fn push_plugin_entry(&mut self, name: impl Into<String>, hash: u32) {
        self.plugins.push((name.into(), hash));
    }

    pub fn plugins(&self) -> &[(String, u32)] {
        &self.plugins
    }

    pub fn master_addr(&self) -> SocketAddr {
        self.master_addr
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Queues one heartbeat. `info` supplies everything but the plugins.
    pub fn send_heartbeat(&mut self, mut info: ServerInfo, out: &mut Outbox) {
        info.plugins = self.plugins.clone();
        debug!(
            "Heartbeat to {}: {}/{} players",
            self.master_addr, info.players, info.max_players
        );
        out.send_to(self.master_addr, Datagram::MasterHeartbeat(info));
        self.heartbeats_sent += 1;
    }

    /// Consumes master replies. Returns false for datagrams meant for the
    /// regular connection path.
    pub fn process(&mut self, datagram: &Datagram, addr: SocketAddr) -> bool {
        match datagram {
            Datagram::MasterAck if addr == self.master_addr => {
                if !self.acknowledged {
                    info!("Master server {} acknowledged this server", addr);
                }
                self.acknowledged = true;
                true
            }
            _ => false,
        }
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Outgoing;

    fn master_addr() -> SocketAddr {
        "10.0.0.1:25560".parse().unwrap()
    }

    #[test]
    fn test_heartbeat_carries_plugins() {
        let mut master = MasterClient::new(master_addr(), DEFAULT_HEARTBEAT_INTERVAL);
        master.push_plugin_entry("Morrowind.esm", 0x7B6AF5B9);
        master.push_plugin_entry("Custom.esp", 0);

        let mut out = Outbox::new();
        master.send_heartbeat(
            ServerInfo {
                name: "Vvardenfell".to_string(),
                players: 3,
                max_players: 16,
                ..Default::default()
            },
            &mut out,
        );

        match out.iter().next() {
            Some(Outgoing::Datagram {
                addr,
                datagram: Datagram::MasterHeartbeat(info),
            }) => {
                assert_eq!(*addr, master_addr());
                assert_eq!(info.players, 3);
                assert_eq!(info.plugins.len(), 2);
                assert_eq!(info.plugins[0], ("Morrowind.esm".to_string(), 0x7B6AF5B9));
            }
            other => panic!("Expected heartbeat, got {:?}", other),
        }
        assert_eq!(master.heartbeats_sent(), 1);
    }

    #[test]
    fn test_ack_only_from_master() {
        let mut master = MasterClient::new(master_addr(), DEFAULT_HEARTBEAT_INTERVAL);
        let stranger: SocketAddr = "10.0.0.2:25560".parse().unwrap();

        assert!(!master.process(&Datagram::MasterAck, stranger));
        assert!(!master.is_acknowledged());
        assert!(master.process(&Datagram::MasterAck, master_addr()));
        assert!(master.is_acknowledged());
        assert!(!master.process(&Datagram::Disconnect, master_addr()));
    }
}

//! Transport connection tracking for the relay server
//!
//! This module owns the table of accepted UDP peers and turns raw datagrams
//! into transport events for the dispatcher:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Capacity enforcement and protocol version checks
//! - Liveness tracking through pings and smoothed round-trip times
//!
//! Connection identities are random 64-bit guids, so a peer that reconnects
//! from the same address is never confused with its previous connection.

use crate::transport::{ConnectionId, EventKind, Outbox, TransportEvent};
use log::{debug, info, warn};
use shared::{Datagram, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Weight of a new sample in the smoothed round-trip time.
const RTT_GAIN: f32 = 0.125;

/// One accepted peer.
#[derive(Debug)]
pub struct Connection {
    pub guid: ConnectionId,
    pub addr: SocketAddr,
    /// Last time we received any datagram from this peer
    pub last_seen: Instant,
    rtt_ms: Option<f32>,
}

impl Connection {
    pub fn new(guid: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            guid,
            addr,
            last_seen: Instant::now(),
            rtt_ms: None,
        }
    }

    /// Returns true if nothing arrived from this peer within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Folds a round-trip sample into the smoothed estimate.
    pub fn record_rtt(&mut self, sample_ms: f32) {
        self.rtt_ms = Some(match self.rtt_ms {
            Some(current) => current + RTT_GAIN * (sample_ms - current),
            None => sample_ms,
        });
    }

    pub fn average_ping(&self) -> Option<f32> {
        self.rtt_ms
    }
}

/// Table of accepted peers, shared between the main loop and the liveness task.
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, Connection>,
    by_addr: HashMap<SocketAddr, ConnectionId>,
    max_connections: usize,
    timeout: Duration,
}

impl ConnectionTable {
    pub fn new(max_connections: usize, timeout: Duration) -> Self {
        Self {
            connections: HashMap::new(),
            by_addr: HashMap::new(),
            max_connections,
            timeout,
        }
    }

    /// Classifies one inbound datagram and queues any transport-level reply.
    ///
    /// Returns the event the dispatcher should see, if any. Datagrams from
    /// unknown addresses only get through as connection attempts or pings.
    pub fn classify(
        &mut self,
        datagram: Datagram,
        addr: SocketAddr,
        now_ms: u64,
        out: &mut Outbox,
    ) -> Option<TransportEvent> {
        match datagram {
            Datagram::Connect { protocol_version } => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        "Refusing {}: protocol version {} (server runs {})",
                        addr, protocol_version, PROTOCOL_VERSION
                    );
                    out.send_to(
                        addr,
                        Datagram::Refused {
                            reason: format!("protocol version {} required", PROTOCOL_VERSION),
                        },
                    );
                    return None;
                }

                if let Some(existing) = self.find_by_addr(addr) {
                    // Lost Accepted; answer again without a second event
                    out.send_to(addr, Datagram::Accepted { guid: existing.0 });
                    return None;
                }

                match self.add_connection(addr) {
                    Some(guid) => {
                        out.send_to(addr, Datagram::Accepted { guid: guid.0 });
                        Some(TransportEvent::new(
                            guid,
                            addr,
                            EventKind::NewIncomingConnection,
                        ))
                    }
                    None => {
                        out.send_to(addr, Datagram::NoFreeSlots);
                        Some(TransportEvent::new(
                            ConnectionId::UNASSIGNED,
                            addr,
                            EventKind::NoFreeIncomingConnections,
                        ))
                    }
                }
            }
            Datagram::Disconnect => {
                let guid = self.find_by_addr(addr)?;
                self.remove(&guid);
                Some(TransportEvent::new(
                    guid,
                    addr,
                    EventKind::DisconnectionNotification,
                ))
            }
            Datagram::Ping { timestamp } => {
                out.send_to(addr, Datagram::Pong { timestamp });
                let guid = self.find_by_addr(addr)?;
                self.touch(guid);
                Some(TransportEvent::new(guid, addr, EventKind::ConnectedPing))
            }
            Datagram::Pong { timestamp } => {
                self.record_pong(addr, timestamp, now_ms);
                None
            }
            Datagram::Message(frame) => match self.find_by_addr(addr) {
                Some(guid) => {
                    self.touch(guid);
                    Some(TransportEvent::message(guid, addr, frame))
                }
                None => {
                    debug!("Dropping message from unconnected {}", addr);
                    None
                }
            },
            other => {
                debug!("Ignoring unexpected datagram {:?} from {}", other, addr);
                None
            }
        }
    }

    /// Accepts a new peer. Returns None if the server is at capacity.
    pub fn add_connection(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let mut guid = ConnectionId::random();
        while self.connections.contains_key(&guid) {
            guid = ConnectionId::random();
        }

        info!("Connection {} accepted from {}", guid, addr);
        self.connections.insert(guid, Connection::new(guid, addr));
        self.by_addr.insert(addr, guid);

        Some(guid)
    }

    pub fn remove(&mut self, guid: &ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(guid)?;
        self.by_addr.remove(&connection.addr);
        debug!("Connection {} removed", guid);
        Some(connection)
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.by_addr.get(&addr).copied()
    }

    pub fn addr_of(&self, guid: ConnectionId) -> Option<SocketAddr> {
        self.connections.get(&guid).map(|connection| connection.addr)
    }

    pub fn touch(&mut self, guid: ConnectionId) {
        if let Some(connection) = self.connections.get_mut(&guid) {
            connection.last_seen = Instant::now();
        }
    }

    /// Records the answer to one of our pings.
    pub fn record_pong(&mut self, addr: SocketAddr, sent_at_ms: u64, now_ms: u64) {
        let Some(guid) = self.find_by_addr(addr) else {
            return;
        };
        if let Some(connection) = self.connections.get_mut(&guid) {
            connection.last_seen = Instant::now();
            connection.record_rtt(now_ms.saturating_sub(sent_at_ms) as f32);
        }
    }

    /// Removes peers that stayed silent past the timeout and returns them.
    pub fn check_timeouts(&mut self) -> Vec<(ConnectionId, SocketAddr)> {
        let timed_out: Vec<(ConnectionId, SocketAddr)> = self
            .connections
            .values()
            .filter(|connection| connection.is_timed_out(self.timeout))
            .map(|connection| (connection.guid, connection.addr))
            .collect();

        for (guid, addr) in &timed_out {
            info!("Connection {} from {} timed out", guid, addr);
            self.remove(guid);
        }

        timed_out
    }

    pub fn addrs(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.connections
            .values()
            .map(|connection| (connection.guid, connection.addr))
            .collect()
    }

    pub fn average_ping(&self, guid: ConnectionId) -> Option<f32> {
        self.connections.get(&guid)?.average_ping()
    }

    pub fn pings(&self) -> Vec<(ConnectionId, Option<f32>)> {
        self.connections
            .values()
            .map(|connection| (connection.guid, connection.average_ping()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

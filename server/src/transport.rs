//! Boundary types between the socket layer and the dispatcher.
//!
//! The socket layer turns datagrams into [`TransportEvent`]s. The dispatcher
//! answers by queueing [`Outgoing`] actions in an [`Outbox`], which the main
//! loop flushes after every event. Nothing in the dispatcher touches a socket.

use rand::Rng;
use shared::Datagram;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Opaque identity of one transport connection, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Identity used for events that belong to no accepted connection.
    pub const UNASSIGNED: ConnectionId = ConnectionId(0);

    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let guid: u64 = rng.gen();
            if guid != Self::UNASSIGNED.0 {
                return ConnectionId(guid);
            }
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    NewIncomingConnection,
    DisconnectionNotification,
    ConnectionLost,
    NoFreeIncomingConnections,
    ConnectedPing,
    Message(Vec<u8>),
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewIncomingConnection => "new incoming connection",
            EventKind::DisconnectionNotification => "disconnection notification",
            EventKind::ConnectionLost => "connection lost",
            EventKind::NoFreeIncomingConnections => "no free incoming connections",
            EventKind::ConnectedPing => "ping",
            EventKind::Message(_) => "message",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub conn: ConnectionId,
    pub addr: SocketAddr,
    pub kind: EventKind,
}

impl TransportEvent {
    pub fn new(conn: ConnectionId, addr: SocketAddr, kind: EventKind) -> Self {
        Self { conn, addr, kind }
    }

    pub fn message(conn: ConnectionId, addr: SocketAddr, frame: Vec<u8>) -> Self {
        Self::new(conn, addr, EventKind::Message(frame))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Application frame for one connection.
    Frame { conn: ConnectionId, frame: Vec<u8> },
    /// Raw datagram for an address that may not be a connection.
    Datagram { addr: SocketAddr, datagram: Datagram },
    /// Notify the peer and forget the connection.
    Close { conn: ConnectionId },
}

/// Ordered queue of outbound actions produced while handling one event.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, conn: ConnectionId, frame: Vec<u8>) {
        self.queue.push(Outgoing::Frame { conn, frame });
    }

    pub fn send_to(&mut self, addr: SocketAddr, datagram: Datagram) {
        self.queue.push(Outgoing::Datagram { addr, datagram });
    }

    pub fn close(&mut self, conn: ConnectionId) {
        self.queue.push(Outgoing::Close { conn });
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Outgoing> {
        self.queue.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outgoing> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Frames queued for `conn`, in order.
    pub fn frames_for(&self, conn: ConnectionId) -> Vec<&[u8]> {
        self.queue
            .iter()
            .filter_map(|item| match item {
                Outgoing::Frame { conn: to, frame } if *to == conn => Some(frame.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn is_closing(&self, conn: ConnectionId) -> bool {
        self.queue
            .iter()
            .any(|item| matches!(item, Outgoing::Close { conn: to } if *to == conn))
    }
}

/// Current wall-clock time in milliseconds.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:25565".parse().unwrap()
    }

    #[test]
    fn test_random_ids_are_assigned() {
        for _ in 0..100 {
            assert_ne!(ConnectionId::random(), ConnectionId::UNASSIGNED);
        }
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(0xABCD).to_string(), "000000000000abcd");
    }

    #[test]
    fn test_outbox_preserves_order() {
        let conn = ConnectionId(7);
        let mut outbox = Outbox::new();
        outbox.send(conn, vec![1]);
        outbox.send_to(test_addr(), Datagram::MasterAck);
        outbox.send(conn, vec![2]);
        outbox.close(conn);

        assert_eq!(outbox.len(), 4);
        assert_eq!(outbox.frames_for(conn), vec![&[1u8][..], &[2u8][..]]);
        assert!(outbox.is_closing(conn));
        assert!(!outbox.is_closing(ConnectionId(8)));

        let drained: Vec<Outgoing> = outbox.drain().collect();
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[3], Outgoing::Close { conn });
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_timestamp_advances() {
        let first = timestamp_ms();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timestamp_ms() > first);
    }
}

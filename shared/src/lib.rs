//! Wire types shared between the relay server and its clients.
//!
//! Every UDP datagram carries one bincode-encoded [`Datagram`]. Connection
//! management travels as dedicated variants; gameplay traffic rides inside
//! [`Datagram::Message`] as an application frame whose first byte is the
//! packet identifier (see [`ids`] and [`stream`]).

use bincode::Options;
use serde::{Deserialize, Serialize};

pub mod ids;
pub mod manifest;
pub mod records;
pub mod stream;

pub use manifest::{PluginEntry, PluginManifest};
pub use stream::{ReadStream, WireError, WriteStream, FRAME_HEADER_LEN};

pub const PROTOCOL_VERSION: u32 = 7;
pub const DEFAULT_PORT: u16 = 25565;
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Password a server runs with when none is configured.
pub const DEFAULT_PASSWORD: &str = "SuperPassword";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Datagram {
    Connect { protocol_version: u32 },
    Accepted { guid: u64 },
    Refused { reason: String },
    NoFreeSlots,
    Disconnect,
    Ping { timestamp: u64 },
    Pong { timestamp: u64 },
    Message(Vec<u8>),

    MasterQuery,
    MasterInfo(ServerInfo),
    MasterHeartbeat(ServerInfo),
    MasterAck,
}

impl Datagram {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        Ok(stream::bounded(data.len() as u64).deserialize(data)?)
    }
}

/// Summary a server reports to the master directory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ServerInfo {
    pub name: String,
    pub version: u32,
    pub players: u32,
    pub max_players: u32,
    pub passworded: bool,
    pub plugins: Vec<(String, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datagram_message_keeps_bytes() {
        let datagram = Datagram::Message(vec![ids::ID_PLAYER_POSITION, 1, 2, 3]);
        let bytes = datagram.encode().unwrap();
        match Datagram::decode(&bytes).unwrap() {
            Datagram::Message(data) => assert_eq!(data, vec![ids::ID_PLAYER_POSITION, 1, 2, 3]),
            other => panic!("Wrong datagram after decode: {:?}", other),
        }
    }

    #[test]
    fn test_datagram_decode_rejects_garbage() {
        assert!(Datagram::decode(&[]).is_err());
        assert!(Datagram::decode(&[0xFF, 0xFF, 0xFF, 0xFF]).is_err());
    }

    #[test]
    fn test_datagram_decode_rejects_oversized_length() {
        // Refused { reason } claiming a terabyte of text
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());
        bytes.extend_from_slice(b"abc");
        assert!(Datagram::decode(&bytes).is_err());
    }

    #[test]
    fn test_server_info_in_heartbeat() {
        let info = ServerInfo {
            name: "relay".to_string(),
            version: PROTOCOL_VERSION,
            players: 3,
            max_players: 16,
            passworded: true,
            plugins: vec![("Morrowind.esm".to_string(), 0x7B6A_F5B9)],
        };
        let bytes = Datagram::MasterHeartbeat(info.clone()).encode().unwrap();
        assert_eq!(Datagram::decode(&bytes).unwrap(), Datagram::MasterHeartbeat(info));
    }
}

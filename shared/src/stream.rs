//! Application frame encoding.
//!
//! A frame is `[id: u8][guid: u64 little-endian][body]`, where the body is a
//! sequence of bincode values written by a processor. A frame with an empty
//! body is a request for the receiver to send that packet back.

use crate::ids::PacketId;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const FRAME_HEADER_LEN: usize = 9;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame of {0} bytes is shorter than its header")]
    Truncated(usize),
    #[error("malformed packet body: {0}")]
    Body(#[from] bincode::Error),
}

/// Cursor over one inbound frame.
#[derive(Debug)]
pub struct ReadStream<'a> {
    id: PacketId,
    guid: u64,
    body: &'a [u8],
}

impl<'a> ReadStream<'a> {
    pub fn new(frame: &'a [u8]) -> Result<Self, WireError> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(WireError::Truncated(frame.len()));
        }

        let mut guid = [0u8; 8];
        guid.copy_from_slice(&frame[1..FRAME_HEADER_LEN]);

        Ok(Self {
            id: frame[0],
            guid: u64::from_le_bytes(guid),
            body: &frame[FRAME_HEADER_LEN..],
        })
    }

    pub fn id(&self) -> PacketId {
        self.id
    }

    /// Subject guid written by the sender. Servers ignore it for inbound
    /// traffic and trust the transport identity instead.
    pub fn guid(&self) -> u64 {
        self.guid
    }

    pub fn is_request(&self) -> bool {
        self.body.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.body.len()
    }

    /// Reads the next value. Length prefixes larger than the rest of the
    /// body fail before anything is allocated.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T, WireError> {
        let limit = self.body.len() as u64;
        Ok(bounded(limit).deserialize_from(&mut self.body)?)
    }
}

/// Same layout as `bincode::serialize`, capped at `limit` bytes of input.
pub(crate) fn bounded(limit: u64) -> impl Options {
    bincode::options()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
}

/// Builder for one outbound frame.
#[derive(Debug, Clone)]
pub struct WriteStream {
    buf: Vec<u8>,
}

impl WriteStream {
    pub fn new(id: PacketId, guid: u64) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.push(id);
        buf.extend_from_slice(&guid.to_le_bytes());
        Self { buf }
    }

    /// Header-only frame asking the peer to send packet `id`.
    pub fn request(id: PacketId, guid: u64) -> Vec<u8> {
        Self::new(id, guid).into_bytes()
    }

    pub fn id(&self) -> PacketId {
        self.buf[0]
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), WireError> {
        bincode::serialize_into(&mut self.buf, value)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == FRAME_HEADER_LEN
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ID_CHAT_MESSAGE, ID_HANDSHAKE};

    #[test]
    fn test_header_layout() {
        let frame = WriteStream::request(ID_HANDSHAKE, 0x0102_0304_0506_0708);
        assert_eq!(frame.len(), FRAME_HEADER_LEN);
        assert_eq!(frame[0], ID_HANDSHAKE);
        assert_eq!(&frame[1..], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_sequential_reads() {
        let mut stream = WriteStream::new(ID_CHAT_MESSAGE, 42);
        stream.write("hello").unwrap();
        stream.write(&7u32).unwrap();
        assert!(!stream.is_empty());

        let frame = stream.into_bytes();
        let mut reader = ReadStream::new(&frame).unwrap();
        assert_eq!(reader.id(), ID_CHAT_MESSAGE);
        assert_eq!(reader.guid(), 42);
        assert!(!reader.is_request());

        let text: String = reader.read().unwrap();
        let number: u32 = reader.read().unwrap();
        assert_eq!(text, "hello");
        assert_eq!(number, 7);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_frame() {
        match ReadStream::new(&[ID_HANDSHAKE, 1, 2]) {
            Err(WireError::Truncated(3)) => {}
            other => panic!("Expected truncation error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_length_prefix_fails() {
        let mut stream = WriteStream::new(ID_HANDSHAKE, 1);
        stream.write(&(1u64 << 40)).unwrap();
        stream.write(b"abc").unwrap();
        let frame = stream.into_bytes();

        let mut reader = ReadStream::new(&frame).unwrap();
        match reader.read::<String>() {
            Err(WireError::Body(_)) => {}
            other => panic!("Expected body error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_nested_prefix_fails() {
        let mut stream = WriteStream::new(ID_HANDSHAKE, 1);
        stream.write(&1u64).unwrap();
        stream.write(&(1u64 << 40)).unwrap();
        stream.write(b"abc").unwrap();
        let frame = stream.into_bytes();

        let mut reader = ReadStream::new(&frame).unwrap();
        assert!(reader.read::<Vec<String>>().is_err());
    }

    #[test]
    fn test_reading_past_body_fails() {
        let frame = WriteStream::request(ID_HANDSHAKE, 1);
        let mut reader = ReadStream::new(&frame).unwrap();
        assert!(reader.is_request());
        assert!(reader.read::<String>().is_err());
    }
}

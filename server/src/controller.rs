//! Per-domain packet processor tables.

use crate::processors::world::MpNumCounter;
use crate::script::ScriptHooks;
use crate::session::SlotId;
use crate::transport::ConnectionId;
use shared::ids::{self, Domain, PacketId};
use shared::{ReadStream, WireError, WriteStream};
use std::collections::BTreeMap;

/// Who receives the re-encoded packet after a processor applied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    None,
    /// Every post-loaded session except the sender.
    Others,
    /// Every post-loaded session, sender included.
    All,
}

/// What a processor may touch besides its target while applying a packet.
pub struct ApplyContext<'a> {
    pub sender: ConnectionId,
    pub slot: Option<SlotId>,
    pub hooks: &'a mut dyn ScriptHooks,
    pub mp_num: &'a mut MpNumCounter,
}

/// Decodes, applies and re-encodes one packet type against a target `T`.
pub trait Processor<T>: Send + Sync {
    fn id(&self) -> PacketId;

    fn name(&self) -> &'static str {
        ids::packet_name(self.id())
    }

    fn decode(&self, target: &mut T, stream: &mut ReadStream<'_>) -> Result<(), WireError>;

    fn encode(&self, target: &T, stream: &mut WriteStream) -> Result<(), WireError>;

    fn apply(&self, target: &mut T, ctx: &mut ApplyContext<'_>) -> Relay;

    /// Full frame for `target`, with `guid` as the subject.
    fn frame(&self, guid: u64, target: &T) -> Result<Vec<u8>, WireError> {
        let mut stream = WriteStream::new(self.id(), guid);
        self.encode(target, &mut stream)?;
        Ok(stream.into_bytes())
    }
}

pub struct PacketController<T> {
    domain: Domain,
    processors: BTreeMap<PacketId, Box<dyn Processor<T>>>,
}

impl<T> PacketController<T> {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            processors: BTreeMap::new(),
        }
    }

    /// Adds a processor. Registering an id twice or outside this controller's
    /// domain is a construction bug.
    pub fn with(mut self, processor: Box<dyn Processor<T>>) -> Self {
        let id = processor.id();
        assert_eq!(
            Domain::of(id),
            Some(self.domain),
            "{} does not belong to the {} controller",
            ids::packet_name(id),
            self.domain.as_str()
        );
        let previous = self.processors.insert(id, processor);
        assert!(previous.is_none(), "{} registered twice", ids::packet_name(id));
        self
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn contains_packet(&self, id: PacketId) -> bool {
        self.processors.contains_key(&id)
    }

    pub fn get_packet(&self, id: PacketId) -> Option<&dyn Processor<T>> {
        self.processors.get(&id).map(|processor| processor.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = PacketId> + '_ {
        self.processors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ids::{ID_ACTOR_LIST, ID_CHAT_MESSAGE};

    struct Counter;

    impl Processor<u32> for Counter {
        fn id(&self) -> PacketId {
            ID_CHAT_MESSAGE
        }

        fn decode(&self, target: &mut u32, stream: &mut ReadStream<'_>) -> Result<(), WireError> {
            *target = stream.read()?;
            Ok(())
        }

        fn encode(&self, target: &u32, stream: &mut WriteStream) -> Result<(), WireError> {
            stream.write(target)
        }

        fn apply(&self, target: &mut u32, _ctx: &mut ApplyContext<'_>) -> Relay {
            *target += 1;
            Relay::All
        }
    }

    struct WrongDomain;

    impl Processor<u32> for WrongDomain {
        fn id(&self) -> PacketId {
            ID_ACTOR_LIST
        }

        fn decode(&self, _: &mut u32, _: &mut ReadStream<'_>) -> Result<(), WireError> {
            Ok(())
        }

        fn encode(&self, _: &u32, _: &mut WriteStream) -> Result<(), WireError> {
            Ok(())
        }

        fn apply(&self, _: &mut u32, _: &mut ApplyContext<'_>) -> Relay {
            Relay::None
        }
    }

    #[test]
    fn test_membership_and_lookup_agree() {
        let controller = PacketController::<u32>::new(Domain::Player).with(Box::new(Counter));

        for id in 0..=u8::MAX {
            assert_eq!(controller.contains_packet(id), controller.get_packet(id).is_some());
        }
        assert_eq!(controller.ids().collect::<Vec<_>>(), vec![ID_CHAT_MESSAGE]);
        assert_eq!(controller.get_packet(ID_CHAT_MESSAGE).unwrap().name(), "ID_CHAT_MESSAGE");
    }

    #[test]
    fn test_frame_encodes_target() {
        let frame = Counter.frame(77, &41).unwrap();
        let mut stream = ReadStream::new(&frame).unwrap();
        assert_eq!(stream.id(), ID_CHAT_MESSAGE);
        assert_eq!(stream.guid(), 77);

        let mut target = 0;
        Counter.decode(&mut target, &mut stream).unwrap();
        assert_eq!(target, 41);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let _ = PacketController::<u32>::new(Domain::Player)
            .with(Box::new(Counter))
            .with(Box::new(Counter));
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn test_foreign_id_panics() {
        let _ = PacketController::<u32>::new(Domain::Player).with(Box::new(WrongDomain));
    }
}

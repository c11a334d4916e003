use crate::controller::{ApplyContext, PacketController, Processor, Relay};
use crate::script::ScriptHooks;
use shared::ids::*;
use shared::records::WorldEvent;
use shared::{ReadStream, WireError, WriteStream};

/// Source of multiplayer numbers for objects the server places.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MpNumCounter {
    current: u32,
}

impl MpNumCounter {
    pub fn new(start: u32) -> Self {
        Self { current: start }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn set(&mut self, value: u32) {
        self.current = value;
    }

    /// Advances the counter and reports the new value to the hooks.
    pub fn increment(&mut self, hooks: &mut dyn ScriptHooks) -> u32 {
        self.current = self.current.wrapping_add(1);
        hooks.on_mp_num_increment(self.current);
        self.current
    }
}

/// Stores the event and relays it unchanged.
struct EventProcessor {
    id: PacketId,
    relay: Relay,
}

impl Processor<WorldEvent> for EventProcessor {
    fn id(&self) -> PacketId {
        self.id
    }

    fn decode(&self, event: &mut WorldEvent, stream: &mut ReadStream<'_>) -> Result<(), WireError> {
        *event = stream.read()?;
        Ok(())
    }

    fn encode(&self, event: &WorldEvent, stream: &mut WriteStream) -> Result<(), WireError> {
        stream.write(event)
    }

    fn apply(&self, _event: &mut WorldEvent, _ctx: &mut ApplyContext<'_>) -> Relay {
        self.relay
    }
}

/// Numbers freshly placed objects and echoes the result to everyone,
/// placer included, so all clients agree on the numbers.
struct ObjectPlaceProcessor;

impl Processor<WorldEvent> for ObjectPlaceProcessor {
    fn id(&self) -> PacketId {
        ID_OBJECT_PLACE
    }

    fn decode(&self, event: &mut WorldEvent, stream: &mut ReadStream<'_>) -> Result<(), WireError> {
        *event = stream.read()?;
        Ok(())
    }

    fn encode(&self, event: &WorldEvent, stream: &mut WriteStream) -> Result<(), WireError> {
        stream.write(event)
    }

    fn apply(&self, event: &mut WorldEvent, ctx: &mut ApplyContext<'_>) -> Relay {
        for object in event.objects.iter_mut().filter(|object| object.mp_num == 0) {
            object.mp_num = ctx.mp_num.increment(&mut *ctx.hooks);
        }
        Relay::All
    }
}

pub fn world_controller() -> PacketController<WorldEvent> {
    let relayed = [
        ID_OBJECT_DELETE,
        ID_OBJECT_LOCK,
        ID_DOOR_STATE,
        ID_MUSIC_PLAY,
        ID_VIDEO_PLAY,
        ID_SCRIPT_GLOBAL_SHORT,
    ];

    relayed.into_iter().fold(
        PacketController::<WorldEvent>::new(Domain::World).with(Box::new(ObjectPlaceProcessor)),
        |controller, id| {
            controller.with(Box::new(EventProcessor {
                id,
                relay: Relay::Others,
            }))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ConnectionId;
    use shared::records::WorldObject;

    #[derive(Default)]
    struct Recorder {
        increments: Vec<u32>,
    }

    impl ScriptHooks for Recorder {
        fn on_mp_num_increment(&mut self, value: u32) {
            self.increments.push(value);
        }
    }

    #[test]
    fn test_controller_covers_world_range() {
        let controller = world_controller();
        for id in WORLD_PACKETS {
            assert!(controller.contains_packet(*id));
        }
        assert_eq!(controller.len(), WORLD_PACKETS.len());
    }

    #[test]
    fn test_counter_notifies_hooks() {
        let mut hooks = Recorder::default();
        let mut counter = MpNumCounter::new(10);

        assert_eq!(counter.increment(&mut hooks), 11);
        assert_eq!(counter.increment(&mut hooks), 12);
        assert_eq!(hooks.increments, vec![11, 12]);
        assert_eq!(counter.current(), 12);
    }

    #[test]
    fn test_object_place_numbers_new_objects_only() {
        let controller = world_controller();
        let processor = controller.get_packet(ID_OBJECT_PLACE).unwrap();

        let mut event = WorldEvent {
            cell: "Balmora".to_string(),
            objects: vec![
                WorldObject {
                    ref_id: "chair".to_string(),
                    ..Default::default()
                },
                WorldObject {
                    ref_id: "table".to_string(),
                    mp_num: 3,
                    ..Default::default()
                },
            ],
        };

        let mut hooks = Recorder::default();
        let mut mp_num = MpNumCounter::new(100);
        let mut ctx = ApplyContext {
            sender: ConnectionId(1),
            slot: Some(0),
            hooks: &mut hooks,
            mp_num: &mut mp_num,
        };

        assert_eq!(processor.apply(&mut event, &mut ctx), Relay::All);
        assert_eq!(event.objects[0].mp_num, 101);
        assert_eq!(event.objects[1].mp_num, 3);
        assert_eq!(hooks.increments, vec![101]);
    }
}

use crate::controller::{ApplyContext, PacketController, Processor, Relay};
use shared::ids::*;
use shared::records::ActorList;
use shared::{ReadStream, WireError, WriteStream};

struct ActorProcessor {
    id: PacketId,
    relay: Relay,
}

impl Processor<ActorList> for ActorProcessor {
    fn id(&self) -> PacketId {
        self.id
    }

    fn decode(&self, list: &mut ActorList, stream: &mut ReadStream<'_>) -> Result<(), WireError> {
        *list = stream.read()?;
        Ok(())
    }

    fn encode(&self, list: &ActorList, stream: &mut WriteStream) -> Result<(), WireError> {
        stream.write(list)
    }

    fn apply(&self, list: &mut ActorList, _ctx: &mut ApplyContext<'_>) -> Relay {
        if list.actors.is_empty() {
            return Relay::None;
        }
        self.relay
    }
}

pub fn actor_controller() -> PacketController<ActorList> {
    // The full list is the cell authority's snapshot and only matters to the server
    let relays = [
        (ID_ACTOR_LIST, Relay::None),
        (ID_ACTOR_POSITION, Relay::Others),
        (ID_ACTOR_ANIM_PLAY, Relay::Others),
        (ID_ACTOR_STATS_DYNAMIC, Relay::Others),
        (ID_ACTOR_ATTACK, Relay::Others),
        (ID_ACTOR_DEATH, Relay::Others),
    ];

    relays
        .into_iter()
        .fold(PacketController::<ActorList>::new(Domain::Actor), |controller, (id, relay)| {
            controller.with(Box::new(ActorProcessor { id, relay }))
        })
}

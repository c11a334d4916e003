use crate::controller::{ApplyContext, PacketController, Processor, Relay};
use crate::session::Session;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::ids::*;
use shared::records::{ChangeBuffers, ChatMessage, Handshake};
use shared::{ReadStream, WireError, WriteStream};

/// Stores one session record verbatim and relays it per `relay`.
pub struct RecordProcessor<R> {
    id: PacketId,
    relay: Relay,
    get: fn(&Session) -> &R,
    get_mut: fn(&mut Session) -> &mut R,
}

impl<R> RecordProcessor<R> {
    pub fn new(
        id: PacketId,
        relay: Relay,
        get: fn(&Session) -> &R,
        get_mut: fn(&mut Session) -> &mut R,
    ) -> Self {
        Self {
            id,
            relay,
            get,
            get_mut,
        }
    }
}

impl<R> Processor<Session> for RecordProcessor<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn id(&self) -> PacketId {
        self.id
    }

    fn decode(&self, session: &mut Session, stream: &mut ReadStream<'_>) -> Result<(), WireError> {
        *(self.get_mut)(session) = stream.read()?;
        Ok(())
    }

    fn encode(&self, session: &Session, stream: &mut WriteStream) -> Result<(), WireError> {
        stream.write((self.get)(session))
    }

    fn apply(&self, _session: &mut Session, _ctx: &mut ApplyContext<'_>) -> Relay {
        self.relay
    }
}

/// Name and password. Validation happens in the dispatcher, which must see
/// the decoded values before deciding whether to keep the session.
struct HandshakeProcessor;

impl Processor<Session> for HandshakeProcessor {
    fn id(&self) -> PacketId {
        ID_HANDSHAKE
    }

    fn decode(&self, session: &mut Session, stream: &mut ReadStream<'_>) -> Result<(), WireError> {
        let handshake: Handshake = stream.read()?;
        session.name = handshake.name;
        session.password = handshake.password;
        Ok(())
    }

    fn encode(&self, session: &Session, stream: &mut WriteStream) -> Result<(), WireError> {
        stream.write(&session.name)
    }

    fn apply(&self, _session: &mut Session, _ctx: &mut ApplyContext<'_>) -> Relay {
        Relay::None
    }
}

/// Header-only control packets.
struct SignalProcessor(PacketId);

impl Processor<Session> for SignalProcessor {
    fn id(&self) -> PacketId {
        self.0
    }

    fn decode(&self, _session: &mut Session, _stream: &mut ReadStream<'_>) -> Result<(), WireError> {
        Ok(())
    }

    fn encode(&self, _session: &Session, _stream: &mut WriteStream) -> Result<(), WireError> {
        Ok(())
    }

    fn apply(&self, _session: &mut Session, _ctx: &mut ApplyContext<'_>) -> Relay {
        Relay::None
    }
}

struct ChatProcessor;

impl Processor<Session> for ChatProcessor {
    fn id(&self) -> PacketId {
        ID_CHAT_MESSAGE
    }

    fn decode(&self, session: &mut Session, stream: &mut ReadStream<'_>) -> Result<(), WireError> {
        session.chat = stream.read()?;
        Ok(())
    }

    fn encode(&self, session: &Session, stream: &mut WriteStream) -> Result<(), WireError> {
        stream.write(&session.chat)
    }

    fn apply(&self, session: &mut Session, _ctx: &mut ApplyContext<'_>) -> Relay {
        let text = session.chat.text.trim();
        if text.is_empty() {
            return Relay::None;
        }
        session.chat = ChatMessage {
            text: format!("{}: {}", session.display_name(), text),
        };
        Relay::All
    }
}

struct GuiMessageBoxProcessor;

impl Processor<Session> for GuiMessageBoxProcessor {
    fn id(&self) -> PacketId {
        ID_GUI_MESSAGEBOX
    }

    fn decode(&self, session: &mut Session, stream: &mut ReadStream<'_>) -> Result<(), WireError> {
        session.gui_message_box = stream.read()?;
        Ok(())
    }

    fn encode(&self, session: &Session, stream: &mut WriteStream) -> Result<(), WireError> {
        stream.write(&session.gui_message_box)
    }

    fn apply(&self, session: &mut Session, ctx: &mut ApplyContext<'_>) -> Relay {
        if let Some(slot) = ctx.slot {
            let answer = &session.gui_message_box;
            ctx.hooks.on_gui_action(slot, answer.id, &answer.data);
        }
        Relay::None
    }
}

/// Frames for every non-empty change list in `buffers`, subject `guid`.
pub fn change_frames(guid: u64, buffers: &ChangeBuffers) -> Result<Vec<Vec<u8>>, WireError> {
    fn push<T: Serialize>(
        frames: &mut Vec<Vec<u8>>,
        id: PacketId,
        guid: u64,
        list: &shared::records::ChangeList<T>,
    ) -> Result<(), WireError> {
        if list.is_empty() {
            return Ok(());
        }
        let mut stream = WriteStream::new(id, guid);
        stream.write(list)?;
        frames.push(stream.into_bytes());
        Ok(())
    }

    let mut frames = Vec::new();
    push(&mut frames, ID_PLAYER_INVENTORY, guid, &buffers.inventory)?;
    push(&mut frames, ID_PLAYER_SPELLBOOK, guid, &buffers.spellbook)?;
    push(&mut frames, ID_PLAYER_JOURNAL, guid, &buffers.journal)?;
    push(&mut frames, ID_PLAYER_FACTION, guid, &buffers.faction)?;
    push(&mut frames, ID_PLAYER_TOPIC, guid, &buffers.topic)?;
    push(&mut frames, ID_PLAYER_KILL_COUNT, guid, &buffers.kill)?;
    push(&mut frames, ID_PLAYER_BOOK, guid, &buffers.book)?;
    Ok(frames)
}

pub fn player_controller() -> PacketController<Session> {
    PacketController::<Session>::new(Domain::Player)
        .with(Box::new(HandshakeProcessor))
        .with(Box::new(SignalProcessor(ID_LOADED)))
        .with(Box::new(SignalProcessor(ID_USER_DISCONNECTED)))
        .with(Box::new(ChatProcessor))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_BASEINFO,
            Relay::Others,
            |s| &s.base_info,
            |s| &mut s.base_info,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_STATS_DYNAMIC,
            Relay::Others,
            |s| &s.stats,
            |s| &mut s.stats,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_ATTRIBUTE,
            Relay::Others,
            |s| &s.attributes,
            |s| &mut s.attributes,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_SKILL,
            Relay::Others,
            |s| &s.skills,
            |s| &mut s.skills,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_POSITION,
            Relay::Others,
            |s| &s.position,
            |s| &mut s.position,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_CELL_CHANGE,
            Relay::Others,
            |s| &s.cell,
            |s| &mut s.cell,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_EQUIPMENT,
            Relay::Others,
            |s| &s.equipment,
            |s| &mut s.equipment,
        )))
        // Private progress stays between the client and the server
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_INVENTORY,
            Relay::None,
            |s| &s.changes.inventory,
            |s| &mut s.changes.inventory,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_SPELLBOOK,
            Relay::None,
            |s| &s.changes.spellbook,
            |s| &mut s.changes.spellbook,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_JOURNAL,
            Relay::None,
            |s| &s.changes.journal,
            |s| &mut s.changes.journal,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_FACTION,
            Relay::Others,
            |s| &s.changes.faction,
            |s| &mut s.changes.faction,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_TOPIC,
            Relay::None,
            |s| &s.changes.topic,
            |s| &mut s.changes.topic,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_KILL_COUNT,
            Relay::Others,
            |s| &s.changes.kill,
            |s| &mut s.changes.kill,
        )))
        .with(Box::new(RecordProcessor::new(
            ID_PLAYER_BOOK,
            Relay::None,
            |s| &s.changes.book,
            |s| &mut s.changes.book,
        )))
        .with(Box::new(GuiMessageBoxProcessor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::MpNumCounter;
    use crate::script::ScriptHooks;
    use crate::session::SlotId;
    use crate::transport::ConnectionId;
    use shared::records::{ChangeAction, GuiMessageBox, KillCount, Position};

    #[derive(Default)]
    struct GuiRecorder {
        answers: Vec<(SlotId, i32, String)>,
    }

    impl ScriptHooks for GuiRecorder {
        fn on_gui_action(&mut self, slot: SlotId, box_id: i32, data: &str) {
            self.answers.push((slot, box_id, data.to_string()));
        }
    }

    fn apply(processor: &dyn Processor<Session>, session: &mut Session, hooks: &mut dyn ScriptHooks) -> Relay {
        let mut mp_num = MpNumCounter::default();
        let mut ctx = ApplyContext {
            sender: session.guid(),
            slot: Some(4),
            hooks,
            mp_num: &mut mp_num,
        };
        processor.apply(session, &mut ctx)
    }

    #[test]
    fn test_controller_covers_player_range() {
        let controller = player_controller();
        for id in PLAYER_PACKETS {
            assert!(controller.contains_packet(*id), "missing {}", packet_name(*id));
        }
        assert_eq!(controller.len(), PLAYER_PACKETS.len());
        assert!(!controller.contains_packet(ID_GAME_PREINIT));
    }

    #[test]
    fn test_record_processor_stores_and_reencodes() {
        let controller = player_controller();
        let processor = controller.get_packet(ID_PLAYER_POSITION).unwrap();

        let mut stream = WriteStream::new(ID_PLAYER_POSITION, 0);
        stream
            .write(&Position {
                pos: [1.0, 2.0, 3.0],
                rot: [0.0; 3],
            })
            .unwrap();
        let frame = stream.into_bytes();

        let mut session = Session::new(ConnectionId(5));
        processor
            .decode(&mut session, &mut ReadStream::new(&frame).unwrap())
            .unwrap();
        assert_eq!(session.position.pos, [1.0, 2.0, 3.0]);

        let relayed = processor.frame(session.guid().0, &session).unwrap();
        assert_eq!(&relayed[FRAME_BODY..], &frame[FRAME_BODY..]);
        assert_eq!(apply(processor, &mut session, &mut GuiRecorder::default()), Relay::Others);
    }

    const FRAME_BODY: usize = shared::FRAME_HEADER_LEN;

    #[test]
    fn test_handshake_decodes_credentials() {
        let controller = player_controller();
        let mut stream = WriteStream::new(ID_HANDSHAKE, 0);
        stream
            .write(&Handshake {
                name: "Nerevar".to_string(),
                password: "secret".to_string(),
            })
            .unwrap();
        let frame = stream.into_bytes();

        let mut session = Session::new(ConnectionId(5));
        controller
            .get_packet(ID_HANDSHAKE)
            .unwrap()
            .decode(&mut session, &mut ReadStream::new(&frame).unwrap())
            .unwrap();

        assert_eq!(session.name, "Nerevar");
        assert_eq!(session.password, "secret");
    }

    #[test]
    fn test_chat_prefixes_sender_name() {
        let controller = player_controller();
        let processor = controller.get_packet(ID_CHAT_MESSAGE).unwrap();
        let mut session = Session::new(ConnectionId(5));
        session.name = "Nerevar".to_string();
        session.chat.text = "  hello  ".to_string();

        assert_eq!(apply(processor, &mut session, &mut GuiRecorder::default()), Relay::All);
        assert_eq!(session.chat.text, "Nerevar: hello");

        session.chat.text = "   ".to_string();
        assert_eq!(apply(processor, &mut session, &mut GuiRecorder::default()), Relay::None);
    }

    #[test]
    fn test_message_box_answer_reaches_hooks() {
        let controller = player_controller();
        let processor = controller.get_packet(ID_GUI_MESSAGEBOX).unwrap();
        let mut session = Session::new(ConnectionId(5));
        session.gui_message_box = GuiMessageBox {
            id: 12,
            kind: 1,
            label: "Continue?".to_string(),
            data: "yes".to_string(),
        };

        let mut hooks = GuiRecorder::default();
        assert_eq!(apply(processor, &mut session, &mut hooks), Relay::None);
        assert_eq!(hooks.answers, vec![(4, 12, "yes".to_string())]);
    }

    #[test]
    fn test_change_frames_skip_empty_lists() {
        let mut buffers = ChangeBuffers::default();
        assert!(change_frames(1, &buffers).unwrap().is_empty());

        buffers.kill.push(
            ChangeAction::Add,
            KillCount {
                ref_id: "cliff racer".to_string(),
                number: 1,
            },
        );
        buffers.topic.push(ChangeAction::Add, "latest rumors".to_string());

        let frames = change_frames(1, &buffers).unwrap();
        let ids: Vec<PacketId> = frames.iter().map(|frame| frame[0]).collect();
        assert_eq!(ids, vec![ID_PLAYER_TOPIC, ID_PLAYER_KILL_COUNT]);
    }
}

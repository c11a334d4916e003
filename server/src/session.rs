//! Per-connection player sessions and the slot table.

use crate::transport::ConnectionId;
use log::debug;
use shared::records::{
    Attributes, BaseInfo, CellState, ChangeBuffers, ChatMessage, DynamicStats, Equipment,
    GuiMessageBox, Position, Skills,
};
use std::collections::{BTreeMap, HashMap};

/// Compact player identifier handed to scripts.
pub type SlotId = u16;

/// Loading progress of a session. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadState {
    NotLoaded,
    Loaded,
    PostLoaded,
}

impl LoadState {
    pub fn next(self) -> Option<LoadState> {
        match self {
            LoadState::NotLoaded => Some(LoadState::Loaded),
            LoadState::Loaded => Some(LoadState::PostLoaded),
            LoadState::PostLoaded => None,
        }
    }
}

/// Server-side view of one player.
#[derive(Debug)]
pub struct Session {
    guid: ConnectionId,
    slot: Option<SlotId>,
    handshaked: bool,
    load_state: LoadState,

    pub name: String,
    pub password: String,
    pub base_info: BaseInfo,
    pub stats: DynamicStats,
    pub attributes: Attributes,
    pub skills: Skills,
    pub position: Position,
    pub cell: CellState,
    pub equipment: Equipment,
    pub chat: ChatMessage,
    pub gui_message_box: GuiMessageBox,
    /// Changes most recently reported by the client.
    pub changes: ChangeBuffers,
    /// Server-originated changes waiting for the next flush.
    pub outbound: ChangeBuffers,
}

impl Session {
    pub fn new(guid: ConnectionId) -> Self {
        Self {
            guid,
            slot: None,
            handshaked: false,
            load_state: LoadState::NotLoaded,
            name: String::new(),
            password: String::new(),
            base_info: BaseInfo::default(),
            stats: DynamicStats::default(),
            attributes: Attributes::default(),
            skills: Skills::default(),
            position: Position::default(),
            cell: CellState::default(),
            equipment: Equipment::default(),
            chat: ChatMessage::default(),
            gui_message_box: GuiMessageBox::default(),
            changes: ChangeBuffers::default(),
            outbound: ChangeBuffers::default(),
        }
    }

    pub fn guid(&self) -> ConnectionId {
        self.guid
    }

    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }

    pub fn is_handshaked(&self) -> bool {
        self.handshaked
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn is_post_loaded(&self) -> bool {
        self.load_state == LoadState::PostLoaded
    }

    /// Moves to `to` if it is the immediate successor of the current state.
    pub fn advance_load_state(&mut self, to: LoadState) -> bool {
        if self.load_state.next() == Some(to) {
            self.load_state = to;
            true
        } else {
            false
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<unnamed>"
        } else {
            &self.name
        }
    }

    pub fn take_outbound(&mut self) -> ChangeBuffers {
        std::mem::take(&mut self.outbound)
    }
}

/// All sessions, keyed by connection, plus the slot assignments.
///
/// Invariant: a slot maps to a connection exactly when that connection's
/// session is handshaked and records the same slot.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    slots: BTreeMap<SlotId, ConnectionId>,
    max_slots: usize,
}

impl SessionRegistry {
    pub fn new(max_slots: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            slots: BTreeMap::new(),
            max_slots: max_slots.min(SlotId::MAX as usize + 1),
        }
    }

    /// Creates a fresh session. Returns None if `conn` already has one.
    pub fn create(&mut self, conn: ConnectionId) -> Option<&mut Session> {
        if self.sessions.contains_key(&conn) {
            return None;
        }
        Some(self.sessions.entry(conn).or_insert_with(|| Session::new(conn)))
    }

    pub fn get(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    pub fn get_mut(&mut self, conn: ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(&conn)
    }

    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.sessions.contains_key(&conn)
    }

    /// Marks the session handshaked and gives it the lowest free slot.
    ///
    /// Returns None if the session is missing, already handshaked, or no
    /// slot is free.
    pub fn complete_handshake(&mut self, conn: ConnectionId) -> Option<SlotId> {
        let session = self.sessions.get_mut(&conn)?;
        if session.handshaked {
            return None;
        }

        let slot = (0..self.max_slots)
            .map(|slot| slot as SlotId)
            .find(|slot| !self.slots.contains_key(slot))?;

        session.handshaked = true;
        session.slot = Some(slot);
        self.slots.insert(slot, conn);
        debug!("Connection {} holds slot {}", conn, slot);
        Some(slot)
    }

    /// Destroys a session and frees its slot.
    pub fn remove(&mut self, conn: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&conn)?;
        if let Some(slot) = session.slot {
            self.slots.remove(&slot);
        }
        Some(session)
    }

    pub fn by_slot(&self, slot: SlotId) -> Option<&Session> {
        self.slots.get(&slot).and_then(|conn| self.sessions.get(conn))
    }

    pub fn by_slot_mut(&mut self, slot: SlotId) -> Option<&mut Session> {
        let conn = *self.slots.get(&slot)?;
        self.sessions.get_mut(&conn)
    }

    /// Post-loaded connections in slot order, optionally skipping one.
    pub fn post_loaded(&self, except: Option<ConnectionId>) -> Vec<ConnectionId> {
        self.slots
            .values()
            .filter(|conn| Some(**conn) != except)
            .filter(|conn| {
                self.sessions
                    .get(conn)
                    .map_or(false, |session| session.is_post_loaded())
            })
            .copied()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn handshaked_count(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_state_moves_forward_only() {
        let mut session = Session::new(ConnectionId(1));
        assert_eq!(session.load_state(), LoadState::NotLoaded);

        assert!(!session.advance_load_state(LoadState::PostLoaded));
        assert!(session.advance_load_state(LoadState::Loaded));
        assert!(!session.advance_load_state(LoadState::Loaded));
        assert!(!session.advance_load_state(LoadState::NotLoaded));
        assert!(session.advance_load_state(LoadState::PostLoaded));
        assert!(session.is_post_loaded());
        assert_eq!(LoadState::PostLoaded.next(), None);
    }

    #[test]
    fn test_create_is_unique() {
        let mut registry = SessionRegistry::new(4);
        assert!(registry.create(ConnectionId(1)).is_some());
        assert!(registry.create(ConnectionId(1)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_slots_are_lowest_free() {
        let mut registry = SessionRegistry::new(4);
        for conn in 1..=3 {
            registry.create(ConnectionId(conn));
        }

        assert_eq!(registry.complete_handshake(ConnectionId(1)), Some(0));
        assert_eq!(registry.complete_handshake(ConnectionId(2)), Some(1));
        assert_eq!(registry.complete_handshake(ConnectionId(2)), None);

        registry.remove(ConnectionId(1));
        assert_eq!(registry.complete_handshake(ConnectionId(3)), Some(0));
        assert_eq!(registry.by_slot(0).unwrap().guid(), ConnectionId(3));
        assert_eq!(registry.handshaked_count(), 2);
    }

    #[test]
    fn test_no_slot_when_full() {
        let mut registry = SessionRegistry::new(1);
        registry.create(ConnectionId(1));
        registry.create(ConnectionId(2));

        assert_eq!(registry.complete_handshake(ConnectionId(1)), Some(0));
        assert_eq!(registry.complete_handshake(ConnectionId(2)), None);
        assert!(!registry.get(ConnectionId(2)).unwrap().is_handshaked());
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut registry = SessionRegistry::new(2);
        registry.create(ConnectionId(9));
        registry.complete_handshake(ConnectionId(9));

        let removed = registry.remove(ConnectionId(9)).unwrap();
        assert_eq!(removed.slot(), Some(0));
        assert!(registry.by_slot(0).is_none());
        assert!(registry.remove(ConnectionId(9)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_post_loaded_in_slot_order() {
        let mut registry = SessionRegistry::new(8);
        for conn in [30, 10, 20] {
            registry.create(ConnectionId(conn));
            registry.complete_handshake(ConnectionId(conn));
        }
        for conn in [30, 10] {
            let session = registry.get_mut(ConnectionId(conn)).unwrap();
            session.advance_load_state(LoadState::Loaded);
            session.advance_load_state(LoadState::PostLoaded);
        }

        assert_eq!(
            registry.post_loaded(None),
            vec![ConnectionId(30), ConnectionId(10)]
        );
        assert_eq!(
            registry.post_loaded(Some(ConnectionId(30))),
            vec![ConnectionId(10)]
        );
    }

    #[test]
    fn test_take_outbound_leaves_empty_buffers() {
        let mut session = Session::new(ConnectionId(1));
        session
            .outbound
            .topic
            .push(shared::records::ChangeAction::Add, "mages guild".to_string());

        let pending = session.take_outbound();
        assert_eq!(pending.topic.len(), 1);
        assert!(session.outbound.is_empty());
    }
}

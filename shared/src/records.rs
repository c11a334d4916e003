//! Packet bodies.
//!
//! Processors serialize these with bincode after the frame header. The relay
//! core only routes them; their fields mean something to game clients.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Handshake {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BaseInfo {
    pub name: String,
    pub race: String,
    pub head: String,
    pub hair: String,
    pub is_male: bool,
    pub birthsign: String,
    pub creature_ref_id: String,
}

/// `[current, base]` pairs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct DynamicStats {
    pub health: [f32; 2],
    pub magicka: [f32; 2],
    pub fatigue: [f32; 2],
}

pub const ATTRIBUTE_COUNT: usize = 8;
pub const SKILL_COUNT: usize = 27;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Attributes {
    pub base: [i32; ATTRIBUTE_COUNT],
    pub modifier: [i32; ATTRIBUTE_COUNT],
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Skills {
    pub base: [i32; SKILL_COUNT],
    pub progress: [f32; SKILL_COUNT],
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub pos: [f32; 3],
    pub rot: [f32; 3],
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CellState {
    pub description: String,
    pub is_exterior: bool,
    pub grid_x: i32,
    pub grid_y: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Item {
    pub ref_id: String,
    pub count: i32,
    pub charge: i32,
}

pub const EQUIPMENT_SLOTS: usize = 19;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Equipment {
    pub slots: Vec<Option<Item>>,
}

impl Default for Equipment {
    fn default() -> Self {
        Self {
            slots: vec![None; EQUIPMENT_SLOTS],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ChatMessage {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct GuiMessageBox {
    pub id: i32,
    pub kind: u8,
    pub label: String,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeAction {
    #[default]
    Set,
    Add,
    Remove,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChangeList<T> {
    pub action: ChangeAction,
    pub items: Vec<T>,
}

impl<T> Default for ChangeList<T> {
    fn default() -> Self {
        Self {
            action: ChangeAction::Set,
            items: Vec::new(),
        }
    }
}

impl<T> ChangeList<T> {
    pub fn push(&mut self, action: ChangeAction, item: T) {
        if self.items.is_empty() {
            self.action = action;
        }
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.action = ChangeAction::Set;
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct JournalItem {
    pub quest: String,
    pub index: i32,
    pub actor_ref_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FactionChange {
    pub faction_id: String,
    pub rank: i32,
    pub reputation: i32,
    pub is_expelled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct KillCount {
    pub ref_id: String,
    pub number: i32,
}

/// The seven change-list kinds a player packet can carry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeBuffers {
    pub inventory: ChangeList<Item>,
    pub spellbook: ChangeList<String>,
    pub journal: ChangeList<JournalItem>,
    pub faction: ChangeList<FactionChange>,
    pub topic: ChangeList<String>,
    pub kill: ChangeList<KillCount>,
    pub book: ChangeList<String>,
}

impl ChangeBuffers {
    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty()
            && self.spellbook.is_empty()
            && self.journal.is_empty()
            && self.faction.is_empty()
            && self.topic.is_empty()
            && self.kill.is_empty()
            && self.book.is_empty()
    }

    pub fn clear(&mut self) {
        self.inventory.clear();
        self.spellbook.clear();
        self.journal.clear();
        self.faction.clear();
        self.topic.clear();
        self.kill.clear();
        self.book.clear();
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BaseActor {
    pub ref_id: String,
    pub ref_num: u32,
    pub mp_num: u32,
    pub position: Position,
    pub stats: DynamicStats,
    pub animation: String,
    pub killer_guid: Option<u64>,
}

/// Actor updates for one cell.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ActorList {
    pub cell: String,
    pub actors: Vec<BaseActor>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WorldObject {
    pub ref_id: String,
    pub ref_num: u32,
    pub mp_num: u32,
    pub count: i32,
    pub position: Position,
    pub state: i32,
    pub filename: String,
}

/// Object updates for one cell.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WorldEvent {
    pub cell: String,
    pub objects: Vec<WorldObject>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_change_list_keeps_first_action() {
        let mut list = ChangeList::default();
        list.push(ChangeAction::Add, "spell_a".to_string());
        list.push(ChangeAction::Remove, "spell_b".to_string());

        assert_eq!(list.action, ChangeAction::Add);
        assert_eq!(list.len(), 2);

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.action, ChangeAction::Set);
    }

    #[test]
    fn test_change_buffers_empty_until_any_push() {
        let mut buffers = ChangeBuffers::default();
        assert!(buffers.is_empty());

        buffers.kill.push(
            ChangeAction::Set,
            KillCount {
                ref_id: "mudcrab".to_string(),
                number: 3,
            },
        );
        assert!(!buffers.is_empty());

        buffers.clear();
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_equipment_default_has_every_slot() {
        let equipment = Equipment::default();
        assert_eq!(equipment.slots.len(), EQUIPMENT_SLOTS);
        assert!(equipment.slots.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn test_position_body_decodes() {
        let position = Position {
            pos: [12.5, -4.25, 100.0],
            rot: [0.0, 0.0, 1.57],
        };
        let bytes = bincode::serialize(&position).unwrap();
        let decoded: Position = bincode::deserialize(&bytes).unwrap();

        assert_approx_eq!(decoded.pos[0], 12.5, 0.0001);
        assert_approx_eq!(decoded.pos[1], -4.25, 0.0001);
        assert_approx_eq!(decoded.rot[2], 1.57, 0.0001);
    }
}

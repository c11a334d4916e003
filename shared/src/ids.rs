//! Application packet identifiers.
//!
//! The first byte of every application frame. Identifiers are split into
//! disjoint ranges, one per packet domain, so a single lookup decides which
//! controller owns a packet.

pub type PacketId = u8;

/// Plugin compatibility probe, sent before any session exists.
pub const ID_GAME_PREINIT: PacketId = 134;

// Player domain
pub const ID_HANDSHAKE: PacketId = 135;
pub const ID_LOADED: PacketId = 136;
pub const ID_USER_DISCONNECTED: PacketId = 137;
pub const ID_CHAT_MESSAGE: PacketId = 138;
pub const ID_PLAYER_BASEINFO: PacketId = 139;
pub const ID_PLAYER_STATS_DYNAMIC: PacketId = 140;
pub const ID_PLAYER_ATTRIBUTE: PacketId = 141;
pub const ID_PLAYER_SKILL: PacketId = 142;
pub const ID_PLAYER_POSITION: PacketId = 143;
pub const ID_PLAYER_CELL_CHANGE: PacketId = 144;
pub const ID_PLAYER_EQUIPMENT: PacketId = 145;
pub const ID_PLAYER_INVENTORY: PacketId = 146;
pub const ID_PLAYER_SPELLBOOK: PacketId = 147;
pub const ID_PLAYER_JOURNAL: PacketId = 148;
pub const ID_PLAYER_FACTION: PacketId = 149;
pub const ID_PLAYER_TOPIC: PacketId = 150;
pub const ID_PLAYER_KILL_COUNT: PacketId = 151;
pub const ID_PLAYER_BOOK: PacketId = 152;
pub const ID_GUI_MESSAGEBOX: PacketId = 153;

// Actor domain
pub const ID_ACTOR_LIST: PacketId = 160;
pub const ID_ACTOR_POSITION: PacketId = 161;
pub const ID_ACTOR_ANIM_PLAY: PacketId = 162;
pub const ID_ACTOR_STATS_DYNAMIC: PacketId = 163;
pub const ID_ACTOR_ATTACK: PacketId = 164;
pub const ID_ACTOR_DEATH: PacketId = 165;

// World domain
pub const ID_OBJECT_PLACE: PacketId = 180;
pub const ID_OBJECT_DELETE: PacketId = 181;
pub const ID_OBJECT_LOCK: PacketId = 182;
pub const ID_DOOR_STATE: PacketId = 183;
pub const ID_MUSIC_PLAY: PacketId = 184;
pub const ID_VIDEO_PLAY: PacketId = 185;
pub const ID_SCRIPT_GLOBAL_SHORT: PacketId = 186;

pub const PLAYER_PACKETS: &[PacketId] = &[
    ID_HANDSHAKE,
    ID_LOADED,
    ID_USER_DISCONNECTED,
    ID_CHAT_MESSAGE,
    ID_PLAYER_BASEINFO,
    ID_PLAYER_STATS_DYNAMIC,
    ID_PLAYER_ATTRIBUTE,
    ID_PLAYER_SKILL,
    ID_PLAYER_POSITION,
    ID_PLAYER_CELL_CHANGE,
    ID_PLAYER_EQUIPMENT,
    ID_PLAYER_INVENTORY,
    ID_PLAYER_SPELLBOOK,
    ID_PLAYER_JOURNAL,
    ID_PLAYER_FACTION,
    ID_PLAYER_TOPIC,
    ID_PLAYER_KILL_COUNT,
    ID_PLAYER_BOOK,
    ID_GUI_MESSAGEBOX,
];

pub const ACTOR_PACKETS: &[PacketId] = &[
    ID_ACTOR_LIST,
    ID_ACTOR_POSITION,
    ID_ACTOR_ANIM_PLAY,
    ID_ACTOR_STATS_DYNAMIC,
    ID_ACTOR_ATTACK,
    ID_ACTOR_DEATH,
];

pub const WORLD_PACKETS: &[PacketId] = &[
    ID_OBJECT_PLACE,
    ID_OBJECT_DELETE,
    ID_OBJECT_LOCK,
    ID_DOOR_STATE,
    ID_MUSIC_PLAY,
    ID_VIDEO_PLAY,
    ID_SCRIPT_GLOBAL_SHORT,
];

/// Player state pushed in both directions when a session finishes loading.
pub const SYNC_PACKETS: &[PacketId] = &[
    ID_PLAYER_BASEINFO,
    ID_PLAYER_STATS_DYNAMIC,
    ID_PLAYER_ATTRIBUTE,
    ID_PLAYER_SKILL,
    ID_PLAYER_POSITION,
    ID_PLAYER_CELL_CHANGE,
    ID_PLAYER_EQUIPMENT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Player,
    Actor,
    World,
}

impl Domain {
    pub fn of(id: PacketId) -> Option<Domain> {
        if PLAYER_PACKETS.contains(&id) {
            Some(Domain::Player)
        } else if ACTOR_PACKETS.contains(&id) {
            Some(Domain::Actor)
        } else if WORLD_PACKETS.contains(&id) {
            Some(Domain::World)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Player => "player",
            Domain::Actor => "actor",
            Domain::World => "world",
        }
    }
}

/// Human-readable name for log lines.
pub fn packet_name(id: PacketId) -> &'static str {
    match id {
        ID_GAME_PREINIT => "ID_GAME_PREINIT",
        ID_HANDSHAKE => "ID_HANDSHAKE",
        ID_LOADED => "ID_LOADED",
        ID_USER_DISCONNECTED => "ID_USER_DISCONNECTED",
        ID_CHAT_MESSAGE => "ID_CHAT_MESSAGE",
        ID_PLAYER_BASEINFO => "ID_PLAYER_BASEINFO",
        ID_PLAYER_STATS_DYNAMIC => "ID_PLAYER_STATS_DYNAMIC",
        ID_PLAYER_ATTRIBUTE => "ID_PLAYER_ATTRIBUTE",
        ID_PLAYER_SKILL => "ID_PLAYER_SKILL",
        ID_PLAYER_POSITION => "ID_PLAYER_POSITION",
        ID_PLAYER_CELL_CHANGE => "ID_PLAYER_CELL_CHANGE",
        ID_PLAYER_EQUIPMENT => "ID_PLAYER_EQUIPMENT",
        ID_PLAYER_INVENTORY => "ID_PLAYER_INVENTORY",
        ID_PLAYER_SPELLBOOK => "ID_PLAYER_SPELLBOOK",
        ID_PLAYER_JOURNAL => "ID_PLAYER_JOURNAL",
        ID_PLAYER_FACTION => "ID_PLAYER_FACTION",
        ID_PLAYER_TOPIC => "ID_PLAYER_TOPIC",
        ID_PLAYER_KILL_COUNT => "ID_PLAYER_KILL_COUNT",
        ID_PLAYER_BOOK => "ID_PLAYER_BOOK",
        ID_GUI_MESSAGEBOX => "ID_GUI_MESSAGEBOX",
        ID_ACTOR_LIST => "ID_ACTOR_LIST",
        ID_ACTOR_POSITION => "ID_ACTOR_POSITION",
        ID_ACTOR_ANIM_PLAY => "ID_ACTOR_ANIM_PLAY",
        ID_ACTOR_STATS_DYNAMIC => "ID_ACTOR_STATS_DYNAMIC",
        ID_ACTOR_ATTACK => "ID_ACTOR_ATTACK",
        ID_ACTOR_DEATH => "ID_ACTOR_DEATH",
        ID_OBJECT_PLACE => "ID_OBJECT_PLACE",
        ID_OBJECT_DELETE => "ID_OBJECT_DELETE",
        ID_OBJECT_LOCK => "ID_OBJECT_LOCK",
        ID_DOOR_STATE => "ID_DOOR_STATE",
        ID_MUSIC_PLAY => "ID_MUSIC_PLAY",
        ID_VIDEO_PLAY => "ID_VIDEO_PLAY",
        ID_SCRIPT_GLOBAL_SHORT => "ID_SCRIPT_GLOBAL_SHORT",
        _ => "UNKNOWN",
    }
}

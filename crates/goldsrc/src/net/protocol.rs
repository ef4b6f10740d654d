use bitflags::bitflags;
use glam::Vec3;

use crate::delta::EventArgs;

pub const PROTOCOL_VERSION: u32 = 48;
pub const DEFAULT_PORT: u16 = 27015;

/// Opcodes at or above this value are registered game messages.
pub const GAME_MESSAGE_BASE: u8 = 64;

/// Game messages registered with this size carry a leading length byte.
pub const VARIABLE_GAME_MESSAGE_SIZE: u8 = 255;

pub const MAX_ENTITY_INDEX_BITS: u32 = 11;
pub const MAX_ENTITIES: u32 = 1 << MAX_ENTITY_INDEX_BITS;
pub const MAX_RESOURCE_INDEX_BITS: u32 = 12;

/// Server to client message opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerMessage {
    Bad = 0,
    Nop,
    Disconnect,
    Event,
    Version,
    SetView,
    Sound,
    Time,
    Print,
    StuffText,
    SetAngle,
    ServerInfo,
    LightStyle,
    UpdateUserInfo,
    DeltaDescription,
    ClientData,
    StopSound,
    Pings,
    Particle,
    Damage,
    SpawnStatic,
    EventReliable,
    SpawnBaseline,
    TempEntity,
    SetPause,
    SignonNum,
    CenterPrint,
    KilledMonster,
    FoundSecret,
    SpawnStaticSound,
    Intermission,
    Finale,
    CdTrack,
    Restore,
    Cutscene,
    WeaponAnim,
    DecalName,
    RoomType,
    AddAngle,
    NewUserMsg,
    PacketEntities,
    DeltaPacketEntities,
    Choke,
    ResourceList,
    NewMoveVars,
    ResourceRequest,
    Customization,
    CrosshairAngle,
    SoundFade,
    FileTransferFailed,
    Hltv,
    Director,
    VoiceInit,
    VoiceData,
    SendExtraInfo,
    TimeScale,
    ResourceLocation,
    SendCvarValue,
    SendCvarValue2,
}

impl ServerMessage {
    const ALL: [ServerMessage; 59] = [
        Self::Bad,
        Self::Nop,
        Self::Disconnect,
        Self::Event,
        Self::Version,
        Self::SetView,
        Self::Sound,
        Self::Time,
        Self::Print,
        Self::StuffText,
        Self::SetAngle,
        Self::ServerInfo,
        Self::LightStyle,
        Self::UpdateUserInfo,
        Self::DeltaDescription,
        Self::ClientData,
        Self::StopSound,
        Self::Pings,
        Self::Particle,
        Self::Damage,
        Self::SpawnStatic,
        Self::EventReliable,
        Self::SpawnBaseline,
        Self::TempEntity,
        Self::SetPause,
        Self::SignonNum,
        Self::CenterPrint,
        Self::KilledMonster,
        Self::FoundSecret,
        Self::SpawnStaticSound,
        Self::Intermission,
        Self::Finale,
        Self::CdTrack,
        Self::Restore,
        Self::Cutscene,
        Self::WeaponAnim,
        Self::DecalName,
        Self::RoomType,
        Self::AddAngle,
        Self::NewUserMsg,
        Self::PacketEntities,
        Self::DeltaPacketEntities,
        Self::Choke,
        Self::ResourceList,
        Self::NewMoveVars,
        Self::ResourceRequest,
        Self::Customization,
        Self::CrosshairAngle,
        Self::SoundFade,
        Self::FileTransferFailed,
        Self::Hltv,
        Self::Director,
        Self::VoiceInit,
        Self::VoiceData,
        Self::SendExtraInfo,
        Self::TimeScale,
        Self::ResourceLocation,
        Self::SendCvarValue,
        Self::SendCvarValue2,
    ];

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Self::ALL.get(opcode as usize).copied()
    }

    pub fn opcode(self) -> u8 {
        self as u8
    }
}

/// Client to server message opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientMessage {
    Bad = 0,
    Nop = 1,
    Move = 2,
    StringCmd = 3,
    Delta = 4,
    ResourceList = 5,
    TMove = 6,
    FileConsistency = 7,
    VoiceData = 8,
    Hltv = 9,
    CvarValue = 10,
    CvarValue2 = 11,
}

/// Connectionless reply kinds, identified by their leading ASCII byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPacket {
    Print,
    Challenge,
    Accepted,
    Password,
    Reject,
    InfoOld,
    InfoNew,
    Players,
    Rules,
}

impl ServerPacket {
    pub fn from_byte(op: u8) -> Option<Self> {
        Some(match op {
            b'l' => Self::Print,
            b'A' => Self::Challenge,
            b'B' => Self::Accepted,
            b'8' => Self::Password,
            b'9' => Self::Reject,
            b'm' => Self::InfoOld,
            b'I' => Self::InfoNew,
            b'D' => Self::Players,
            b'E' => Self::Rules,
            _ => return None,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResourceFlags: u32 {
        const FATAL_IF_MISSING = 1 << 0;
        const WAS_MISSING = 1 << 1;
        const CUSTOM = 1 << 2;
        const REQUESTED = 1 << 3;
        const PRECACHED = 1 << 4;
        const ALWAYS = 1 << 5;
        const PADDING = 1 << 6;
        const CHECK_FILE = 1 << 7;
        /// Carries a server-issued consistency value. Never sent on the wire.
        const RESERVED = 1 << 8;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SoundFlags: u32 {
        const VOLUME = 1 << 0;
        const ATTENUATION = 1 << 1;
        const LONG_INDEX = 1 << 2;
        const PITCH = 1 << 3;
        const SENTENCE = 1 << 4;
        const STOP = 1 << 5;
        const CHANGE_VOLUME = 1 << 6;
        const CHANGE_PITCH = 1 << 7;
        const SPAWNING = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Sound,
    Skin,
    Model,
    Decal,
    Generic,
    EventScript,
    World,
    Unknown(u8),
}

impl ResourceType {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::Sound,
            1 => Self::Skin,
            2 => Self::Model,
            3 => Self::Decal,
            4 => Self::Generic,
            5 => Self::EventScript,
            6 => Self::World,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceType,
    pub name: String,
    pub index: u16,
    pub size: u32,
    pub flags: ResourceFlags,
    pub hash: Option<[u8; 16]>,
    /// De-obfuscated consistency value, present when `flags` has `RESERVED`.
    pub reserved: u32,
}

/// A custom resource (spray, model) announced for another player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customization {
    pub player: u8,
    pub resource: Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub protocol: i32,
    pub spawn_count: i32,
    pub map_crc: i32,
    pub client_dll_hash: [u8; 16],
    pub max_players: u8,
    pub player_index: u8,
    pub deathmatch: bool,
    pub game_dir: String,
    pub hostname: String,
    pub map: String,
    pub map_list: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerInfo {
    pub user_id: i32,
    pub info: String,
    pub hash: [u8; 16],
    pub ping: u16,
    pub loss: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub flags: SoundFlags,
    pub volume: u8,
    pub attenuation: f32,
    pub channel: u8,
    pub entity: u16,
    pub index: u16,
    pub origin: Vec3,
    pub pitch: u8,
}

pub const VOLUME_NORMAL: u8 = 255;
pub const ATTENUATION_NORMAL: f32 = 0.8;
pub const PITCH_NORMAL: u8 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct StaticSound {
    pub origin: Vec3,
    pub index: u16,
    pub volume: u8,
    pub attenuation: u8,
    pub entity: u16,
    pub pitch: u8,
    pub flags: u8,
}

/// A fired client-side event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameEvent {
    pub index: u16,
    pub packet_index: Option<u16>,
    pub args: Option<EventArgs>,
    pub fire_time: f32,
    pub reliable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameMessage {
    pub name: String,
    pub size: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveVars {
    pub gravity: f32,
    pub stop_speed: f32,
    pub max_speed: f32,
    pub spectator_max_speed: f32,
    pub accelerate: f32,
    pub air_accelerate: f32,
    pub water_accelerate: f32,
    pub friction: f32,
    pub edge_friction: f32,
    pub water_friction: f32,
    pub ent_gravity: f32,
    pub bounce: f32,
    pub step_size: f32,
    pub max_velocity: f32,
    pub z_max: f32,
    pub wave_height: f32,
    pub footsteps: bool,
    pub roll_angle: f32,
    pub roll_speed: f32,
    pub sky_color: Vec3,
    pub sky_vec: Vec3,
    pub sky_name: String,
}

pub const TE_BSPDECAL: u8 = 13;
pub const TE_TEXTMESSAGE: u8 = 29;

const TE_VARIABLE: i8 = -1;

/// Payload length per temp-entity kind. Negative entries are variable
/// (`-1`) or unknown (`-2`).
const TE_LENGTH: [i8; 128] = [
    24, 20, 6, 11, 6, 10, 12, 17, 16, 6, 6, 6, 8, -1, 9, 19, //
    -2, 10, 16, 24, 24, 24, 10, 11, 16, 19, -2, 12, 16, -1, 19, 17, //
    -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, //
    -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, //
    -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, //
    -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, -2, //
    -2, -2, -2, 2, 10, 14, 12, 14, 9, 5, 17, 13, 24, 9, 17, 7, //
    10, 19, 19, 12, 7, 7, 9, 16, 18, 6, 10, 13, 7, 1, 18, 15, //
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempEntityLength {
    Fixed(usize),
    Variable,
}

pub fn temp_entity_length(kind: u8) -> Option<TempEntityLength> {
    match TE_LENGTH.get(kind as usize).copied() {
        Some(TE_VARIABLE) => Some(TempEntityLength::Variable),
        Some(len) if len >= 0 => Some(TempEntityLength::Fixed(len as usize)),
        _ => None,
    }
}

/// Builds a `\key\value` info string, skipping empty values.
pub fn info_string<'a>(pairs: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
    let mut out = String::new();
    for (key, value) in pairs {
        if value.is_empty() {
            continue;
        }
        out.push('\\');
        out.push_str(key);
        out.push('\\');
        out.push_str(value);
    }
    out
}

/// Looks up a key in a `\key\value` info string.
pub fn info_value<'a>(info: &'a str, key: &str) -> Option<&'a str> {
    let mut parts = info.trim_start_matches('\\').split('\\');
    while let (Some(k), Some(v)) = (parts.next(), parts.next()) {
        if k == key {
            return Some(v);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_opcode_table_is_ordered() {
        assert_eq!(ServerMessage::from_opcode(0), Some(ServerMessage::Bad));
        assert_eq!(ServerMessage::from_opcode(11), Some(ServerMessage::ServerInfo));
        assert_eq!(
            ServerMessage::from_opcode(41),
            Some(ServerMessage::DeltaPacketEntities)
        );
        assert_eq!(ServerMessage::from_opcode(43), Some(ServerMessage::ResourceList));
        assert_eq!(
            ServerMessage::from_opcode(58),
            Some(ServerMessage::SendCvarValue2)
        );
        assert_eq!(ServerMessage::from_opcode(59), None);

        for opcode in 0..59u8 {
            let message = ServerMessage::from_opcode(opcode).unwrap();
            assert_eq!(message.opcode(), opcode);
        }
    }

    #[test]
    fn test_temp_entity_lengths() {
        assert_eq!(temp_entity_length(0), Some(TempEntityLength::Fixed(24)));
        assert_eq!(
            temp_entity_length(TE_BSPDECAL),
            Some(TempEntityLength::Variable)
        );
        assert_eq!(
            temp_entity_length(TE_TEXTMESSAGE),
            Some(TempEntityLength::Variable)
        );
        assert_eq!(temp_entity_length(16), None);
        assert_eq!(temp_entity_length(200), None);
    }

    #[test]
    fn test_info_string_skips_empty_values() {
        let mut pairs = BTreeMap::new();
        pairs.insert("name".to_string(), "Player".to_string());
        pairs.insert("password".to_string(), String::new());
        pairs.insert("rate".to_string(), "25000".to_string());

        let info = info_string(&pairs);
        assert_eq!(info, "\\name\\Player\\rate\\25000");
        assert_eq!(info_value(&info, "rate"), Some("25000"));
        assert_eq!(info_value(&info, "password"), None);
    }
}

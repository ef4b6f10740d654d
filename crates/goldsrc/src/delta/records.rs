//! Typed records carried by delta tables and the declarative field lists
//! that map table field names onto record members.

use glam::Vec3;

use super::table::FieldValue;

/// Reads and writes one record member.
pub enum Access<T> {
    Int(fn(&T) -> i64, fn(&mut T, i64)),
    Float(fn(&T) -> f32, fn(&mut T, f32)),
    Text(fn(&T) -> &str, fn(&mut T, String)),
}

// Derived impls would require `T: Copy`.
impl<T> Clone for Access<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Access<T> {}

pub struct FieldBinding<T> {
    pub name: &'static str,
    pub access: Access<T>,
}

impl<T> Clone for FieldBinding<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldBinding<T> {}

impl<T> FieldBinding<T> {
    pub fn get(&self, record: &T) -> FieldValue {
        match self.access {
            Access::Int(get, _) => FieldValue::Integer(get(record)),
            Access::Float(get, _) => FieldValue::Float(get(record)),
            Access::Text(get, _) => FieldValue::Text(get(record).to_string()),
        }
    }

    pub fn set(&self, record: &mut T, value: FieldValue) {
        match (self.access, value) {
            (Access::Int(_, set), value) => set(record, value.as_i64()),
            (Access::Float(_, set), value) => set(record, value.as_f32()),
            (Access::Text(_, set), FieldValue::Text(text)) => set(record, text),
            (Access::Text(..), other) => {
                log::warn!("Field {} expected text, got {:?}", self.name, other);
            }
        }
    }
}

/// A record shape that delta tables can patch.
pub trait DeltaRecord: Sized + 'static {
    const NAME: &'static str;
    /// Table names describing this record.
    const TABLES: &'static [&'static str];

    fn fields() -> &'static [FieldBinding<Self>];
}

macro_rules! int {
    ($name:literal, $($member:tt)+) => {
        FieldBinding {
            name: $name,
            access: Access::Int(|r| r.$($member)+ as i64, |r, v| r.$($member)+ = v as _),
        }
    };
}

macro_rules! float {
    ($name:literal, $($member:tt)+) => {
        FieldBinding {
            name: $name,
            access: Access::Float(|r| r.$($member)+, |r, v| r.$($member)+ = v),
        }
    };
}

macro_rules! text {
    ($name:literal, $($member:tt)+) => {
        FieldBinding {
            name: $name,
            access: Access::Text(|r| r.$($member)+.as_str(), |r, v| r.$($member)+ = v),
        }
    };
}

pub const ENTITY_TABLE: &str = "entity_state_t";
pub const PLAYER_TABLE: &str = "entity_state_player_t";
pub const CUSTOM_TABLE: &str = "custom_entity_state_t";
pub const CLIENT_DATA_TABLE: &str = "clientdata_t";
pub const WEAPON_DATA_TABLE: &str = "weapon_data_t";
pub const EVENT_TABLE: &str = "event_t";
pub const USER_CMD_TABLE: &str = "usercmd_t";

/// Which entity table a record is encoded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityShape {
    Normal,
    Player,
    Custom,
}

impl EntityShape {
    pub fn table(self) -> &'static str {
        match self {
            Self::Normal => ENTITY_TABLE,
            Self::Player => PLAYER_TABLE,
            Self::Custom => CUSTOM_TABLE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub origin: Vec3,
    pub angles: Vec3,
    pub model_index: i32,
    pub sequence: i32,
    pub frame: f32,
    pub colormap: i32,
    pub skin: i16,
    pub solid: i16,
    pub effects: i32,
    pub scale: f32,
    pub eflags: u8,
    pub render_mode: i32,
    pub render_amount: i32,
    pub render_color: [u8; 3],
    pub render_fx: i32,
    pub move_type: i32,
    pub anim_time: f32,
    pub frame_rate: f32,
    pub body: i32,
    pub controller: [u8; 4],
    pub blending: [u8; 4],
    pub velocity: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub aiment: i32,
    pub owner: i32,
    pub friction: f32,
    pub gravity: f32,
    pub team: i32,
    pub player_class: i32,
    pub health: i32,
    pub spectator: i32,
    pub weapon_model: i32,
    pub gait_sequence: i32,
    pub base_velocity: Vec3,
    pub use_hull: i32,
    pub old_buttons: i32,
    pub on_ground: i32,
    pub step_left: i32,
    pub fall_velocity: f32,
    pub weapon_anim: i32,
    pub start_pos: Vec3,
    pub end_pos: Vec3,
    pub impact_time: f32,
    pub start_time: f32,
    pub iuser: [i32; 4],
    pub fuser: [f32; 4],
    pub vuser: [Vec3; 4],
}

static ENTITY_FIELDS: &[FieldBinding<Entity>] = &[
    float!("origin[0]", origin.x),
    float!("origin[1]", origin.y),
    float!("origin[2]", origin.z),
    float!("angles[0]", angles.x),
    float!("angles[1]", angles.y),
    float!("angles[2]", angles.z),
    int!("modelindex", model_index),
    int!("sequence", sequence),
    float!("frame", frame),
    int!("colormap", colormap),
    int!("skin", skin),
    int!("solid", solid),
    int!("effects", effects),
    float!("scale", scale),
    int!("eflags", eflags),
    int!("rendermode", render_mode),
    int!("renderamt", render_amount),
    int!("rendercolor.r", render_color[0]),
    int!("rendercolor.g", render_color[1]),
    int!("rendercolor.b", render_color[2]),
    int!("renderfx", render_fx),
    int!("movetype", move_type),
    float!("animtime", anim_time),
    float!("framerate", frame_rate),
    int!("body", body),
    int!("controller[0]", controller[0]),
    int!("controller[1]", controller[1]),
    int!("controller[2]", controller[2]),
    int!("controller[3]", controller[3]),
    int!("blending[0]", blending[0]),
    int!("blending[1]", blending[1]),
    float!("velocity[0]", velocity.x),
    float!("velocity[1]", velocity.y),
    float!("velocity[2]", velocity.z),
    float!("mins[0]", mins.x),
    float!("mins[1]", mins.y),
    float!("mins[2]", mins.z),
    float!("maxs[0]", maxs.x),
    float!("maxs[1]", maxs.y),
    float!("maxs[2]", maxs.z),
    int!("aiment", aiment),
    int!("owner", owner),
    float!("friction", friction),
    float!("gravity", gravity),
    int!("team", team),
    int!("playerclass", player_class),
    int!("health", health),
    int!("spectator", spectator),
    int!("weaponmodel", weapon_model),
    int!("gaitsequence", gait_sequence),
    float!("basevelocity[0]", base_velocity.x),
    float!("basevelocity[1]", base_velocity.y),
    float!("basevelocity[2]", base_velocity.z),
    int!("usehull", use_hull),
    int!("oldbuttons", old_buttons),
    int!("onground", on_ground),
    int!("iStepLeft", step_left),
    float!("flFallVelocity", fall_velocity),
    int!("weaponanim", weapon_anim),
    float!("startpos[0]", start_pos.x),
    float!("startpos[1]", start_pos.y),
    float!("startpos[2]", start_pos.z),
    float!("endpos[0]", end_pos.x),
    float!("endpos[1]", end_pos.y),
    float!("endpos[2]", end_pos.z),
    float!("impacttime", impact_time),
    float!("starttime", start_time),
    int!("iuser1", iuser[0]),
    int!("iuser2", iuser[1]),
    int!("iuser3", iuser[2]),
    int!("iuser4", iuser[3]),
    float!("fuser1", fuser[0]),
    float!("fuser2", fuser[1]),
    float!("fuser3", fuser[2]),
    float!("fuser4", fuser[3]),
    float!("vuser1[0]", vuser[0].x),
    float!("vuser1[1]", vuser[0].y),
    float!("vuser1[2]", vuser[0].z),
    float!("vuser2[0]", vuser[1].x),
    float!("vuser2[1]", vuser[1].y),
    float!("vuser2[2]", vuser[1].z),
    float!("vuser3[0]", vuser[2].x),
    float!("vuser3[1]", vuser[2].y),
    float!("vuser3[2]", vuser[2].z),
    float!("vuser4[0]", vuser[3].x),
    float!("vuser4[1]", vuser[3].y),
    float!("vuser4[2]", vuser[3].z),
];

impl DeltaRecord for Entity {
    const NAME: &'static str = "entity";
    const TABLES: &'static [&'static str] = &[ENTITY_TABLE, PLAYER_TABLE, CUSTOM_TABLE];

    fn fields() -> &'static [FieldBinding<Self>] {
        ENTITY_FIELDS
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientData {
    pub origin: Vec3,
    pub velocity: Vec3,
    pub view_model: i32,
    pub punch_angle: Vec3,
    pub flags: i32,
    pub water_level: i32,
    pub water_type: i32,
    pub view_ofs: Vec3,
    pub health: f32,
    pub in_duck: i32,
    pub weapons: i32,
    pub time_step_sound: i32,
    pub duck_time: i32,
    pub swim_time: i32,
    pub water_jump_time: i32,
    pub max_speed: f32,
    pub fov: f32,
    pub weapon_anim: i32,
    pub id: i32,
    pub ammo_shells: i32,
    pub ammo_nails: i32,
    pub ammo_cells: i32,
    pub ammo_rockets: i32,
    pub next_attack: f32,
    pub tf_state: i32,
    pub push_msec: i32,
    pub dead_flag: i32,
    pub phys_info: String,
    pub iuser: [i32; 4],
    pub fuser: [f32; 4],
    pub vuser: [Vec3; 4],
}

static CLIENT_DATA_FIELDS: &[FieldBinding<ClientData>] = &[
    float!("origin[0]", origin.x),
    float!("origin[1]", origin.y),
    float!("origin[2]", origin.z),
    float!("velocity[0]", velocity.x),
    float!("velocity[1]", velocity.y),
    float!("velocity[2]", velocity.z),
    int!("viewmodel", view_model),
    float!("punchangle[0]", punch_angle.x),
    float!("punchangle[1]", punch_angle.y),
    float!("punchangle[2]", punch_angle.z),
    int!("flags", flags),
    int!("waterlevel", water_level),
    int!("watertype", water_type),
    float!("view_ofs[0]", view_ofs.x),
    float!("view_ofs[1]", view_ofs.y),
    float!("view_ofs[2]", view_ofs.z),
    float!("health", health),
    int!("bInDuck", in_duck),
    int!("weapons", weapons),
    int!("flTimeStepSound", time_step_sound),
    int!("flDuckTime", duck_time),
    int!("flSwimTime", swim_time),
    int!("waterjumptime", water_jump_time),
    float!("maxspeed", max_speed),
    float!("fov", fov),
    int!("weaponanim", weapon_anim),
    int!("m_iId", id),
    int!("ammo_shells", ammo_shells),
    int!("ammo_nails", ammo_nails),
    int!("ammo_cells", ammo_cells),
    int!("ammo_rockets", ammo_rockets),
    float!("m_flNextAttack", next_attack),
    int!("tfstate", tf_state),
    int!("pushmsec", push_msec),
    int!("deadflag", dead_flag),
    text!("physinfo", phys_info),
    int!("iuser1", iuser[0]),
    int!("iuser2", iuser[1]),
    int!("iuser3", iuser[2]),
    int!("iuser4", iuser[3]),
    float!("fuser1", fuser[0]),
    float!("fuser2", fuser[1]),
    float!("fuser3", fuser[2]),
    float!("fuser4", fuser[3]),
    float!("vuser1[0]", vuser[0].x),
    float!("vuser1[1]", vuser[0].y),
    float!("vuser1[2]", vuser[0].z),
    float!("vuser2[0]", vuser[1].x),
    float!("vuser2[1]", vuser[1].y),
    float!("vuser2[2]", vuser[1].z),
    float!("vuser3[0]", vuser[2].x),
    float!("vuser3[1]", vuser[2].y),
    float!("vuser3[2]", vuser[2].z),
    float!("vuser4[0]", vuser[3].x),
    float!("vuser4[1]", vuser[3].y),
    float!("vuser4[2]", vuser[3].z),
];

impl DeltaRecord for ClientData {
    const NAME: &'static str = "client data";
    const TABLES: &'static [&'static str] = &[CLIENT_DATA_TABLE];

    fn fields() -> &'static [FieldBinding<Self>] {
        CLIENT_DATA_FIELDS
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeaponData {
    pub id: i32,
    pub clip: i32,
    pub next_primary_attack: f32,
    pub next_secondary_attack: f32,
    pub time_weapon_idle: f32,
    pub in_reload: i32,
    pub in_special_reload: i32,
    pub next_reload: f32,
    pub pump_time: f32,
    pub reload_time: f32,
    pub aimed_damage: f32,
    pub next_aim_bonus: f32,
    pub in_zoom: i32,
    pub weapon_state: i32,
    pub iuser: [i32; 4],
    pub fuser: [f32; 4],
}

static WEAPON_DATA_FIELDS: &[FieldBinding<WeaponData>] = &[
    int!("m_iId", id),
    int!("m_iClip", clip),
    float!("m_flNextPrimaryAttack", next_primary_attack),
    float!("m_flNextSecondaryAttack", next_secondary_attack),
    float!("m_flTimeWeaponIdle", time_weapon_idle),
    int!("m_fInReload", in_reload),
    int!("m_fInSpecialReload", in_special_reload),
    float!("m_flNextReload", next_reload),
    float!("m_flPumpTime", pump_time),
    float!("m_fReloadTime", reload_time),
    float!("m_fAimedDamage", aimed_damage),
    float!("m_fNextAimBonus", next_aim_bonus),
    int!("m_fInZoom", in_zoom),
    int!("m_iWeaponState", weapon_state),
    int!("iuser1", iuser[0]),
    int!("iuser2", iuser[1]),
    int!("iuser3", iuser[2]),
    int!("iuser4", iuser[3]),
    float!("fuser1", fuser[0]),
    float!("fuser2", fuser[1]),
    float!("fuser3", fuser[2]),
    float!("fuser4", fuser[3]),
];

impl DeltaRecord for WeaponData {
    const NAME: &'static str = "weapon data";
    const TABLES: &'static [&'static str] = &[WEAPON_DATA_TABLE];

    fn fields() -> &'static [FieldBinding<Self>] {
        WEAPON_DATA_FIELDS
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventArgs {
    pub entity_index: i32,
    pub origin: Vec3,
    pub angles: Vec3,
    pub ducking: i32,
    pub fparam1: f32,
    pub fparam2: f32,
    pub iparam1: i32,
    pub iparam2: i32,
    pub bparam1: i32,
    pub bparam2: i32,
}

static EVENT_FIELDS: &[FieldBinding<EventArgs>] = &[
    int!("entindex", entity_index),
    float!("origin[0]", origin.x),
    float!("origin[1]", origin.y),
    float!("origin[2]", origin.z),
    float!("angles[0]", angles.x),
    float!("angles[1]", angles.y),
    float!("angles[2]", angles.z),
    int!("ducking", ducking),
    float!("fparam1", fparam1),
    float!("fparam2", fparam2),
    int!("iparam1", iparam1),
    int!("iparam2", iparam2),
    int!("bparam1", bparam1),
    int!("bparam2", bparam2),
];

impl DeltaRecord for EventArgs {
    const NAME: &'static str = "event";
    const TABLES: &'static [&'static str] = &[EVENT_TABLE];

    fn fields() -> &'static [FieldBinding<Self>] {
        EVENT_FIELDS
    }
}

/// Per-tick movement intent sent to the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserCmd {
    pub lerp_msec: i16,
    pub msec: u8,
    pub view_angles: Vec3,
    pub forward_move: f32,
    pub side_move: f32,
    pub up_move: f32,
    pub light_level: u8,
    pub buttons: u16,
    pub impulse: u8,
    pub weapon_select: u8,
    pub impact_index: i32,
    pub impact_position: Vec3,
}

static USER_CMD_FIELDS: &[FieldBinding<UserCmd>] = &[
    int!("lerp_msec", lerp_msec),
    int!("msec", msec),
    float!("viewangles[0]", view_angles.x),
    float!("viewangles[1]", view_angles.y),
    float!("viewangles[2]", view_angles.z),
    float!("forwardmove", forward_move),
    float!("sidemove", side_move),
    float!("upmove", up_move),
    int!("lightlevel", light_level),
    int!("buttons", buttons),
    int!("impulse", impulse),
    int!("weaponselect", weapon_select),
    int!("impact_index", impact_index),
    float!("impact_position[0]", impact_position.x),
    float!("impact_position[1]", impact_position.y),
    float!("impact_position[2]", impact_position.z),
];

impl DeltaRecord for UserCmd {
    const NAME: &'static str = "user command";
    const TABLES: &'static [&'static str] = &[USER_CMD_TABLE];

    fn fields() -> &'static [FieldBinding<Self>] {
        USER_CMD_FIELDS
    }
}

/// Accessor slot of each table field within the record bound to `table`.
pub(crate) fn resolve_slots(table: &str, names: &[&str]) -> Vec<Option<usize>> {
    fn lookup<T: DeltaRecord>(names: &[&str]) -> Vec<Option<usize>> {
        names
            .iter()
            .map(|name| T::fields().iter().position(|b| b.name == *name))
            .collect()
    }

    match table {
        ENTITY_TABLE | PLAYER_TABLE | CUSTOM_TABLE => lookup::<Entity>(names),
        CLIENT_DATA_TABLE => lookup::<ClientData>(names),
        WEAPON_DATA_TABLE => lookup::<WeaponData>(names),
        EVENT_TABLE => lookup::<EventArgs>(names),
        USER_CMD_TABLE => lookup::<UserCmd>(names),
        _ => vec![None; names.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_unique<T: DeltaRecord>() {
        let mut seen = HashSet::new();
        for binding in T::fields() {
            assert!(seen.insert(binding.name), "duplicate {}", binding.name);
        }
    }

    #[test]
    fn test_binding_names_are_unique() {
        assert_unique::<Entity>();
        assert_unique::<ClientData>();
        assert_unique::<WeaponData>();
        assert_unique::<EventArgs>();
        assert_unique::<UserCmd>();
    }

    #[test]
    fn test_binding_get_set() {
        let binding = Entity::fields()
            .iter()
            .find(|b| b.name == "rendercolor.g")
            .unwrap();
        let mut entity = Entity::default();
        binding.set(&mut entity, FieldValue::Integer(200));
        assert_eq!(entity.render_color, [0, 200, 0]);
        assert_eq!(binding.get(&entity), FieldValue::Integer(200));
    }

    #[test]
    fn test_text_binding_ignores_numbers() {
        let binding = ClientData::fields()
            .iter()
            .find(|b| b.name == "physinfo")
            .unwrap();
        let mut data = ClientData::default();
        binding.set(&mut data, FieldValue::Text("slj\\1".into()));
        binding.set(&mut data, FieldValue::Integer(4));
        assert_eq!(data.phys_info, "slj\\1");
    }

    #[test]
    fn test_unbound_tables_resolve_to_nothing() {
        assert_eq!(resolve_slots("custom_t", &["origin[0]"]), vec![None]);
        assert_eq!(
            resolve_slots(USER_CMD_TABLE, &["msec", "bogus"]),
            vec![Some(1), None]
        );
    }
}

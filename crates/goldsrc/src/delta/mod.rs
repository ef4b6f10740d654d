//! Schema-driven delta compression.
//!
//! The server describes each record layout at runtime as a table of bit
//! packed fields. Records are then sent as sparse patches against a
//! previous value: a presence mask followed by the changed fields only.

mod codec;
mod records;
mod table;

pub use codec::{Delta, write_description};
pub use records::{
    Access, CLIENT_DATA_TABLE, CUSTOM_TABLE, ClientData, DeltaRecord, ENTITY_TABLE, EVENT_TABLE,
    Entity, EntityShape, EventArgs, FieldBinding, PLAYER_TABLE, USER_CMD_TABLE, UserCmd,
    WEAPON_DATA_TABLE, WeaponData,
};
pub use table::{
    DT_ANGLE, DT_BYTE, DT_FLOAT, DT_INTEGER, DT_SHORT, DT_SIGNED, DT_STRING, DT_TIMEWINDOW_8,
    DT_TIMEWINDOW_BIG, DeltaError, Field, FieldKind, FieldValue, MAX_FIELDS, Table,
};

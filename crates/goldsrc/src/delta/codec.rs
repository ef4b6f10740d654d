use std::collections::HashMap;

use crate::net::BitBuffer;

use super::records::{
    CLIENT_DATA_TABLE, ClientData, DeltaRecord, EVENT_TABLE, Entity, EntityShape, EventArgs,
    USER_CMD_TABLE, UserCmd, WEAPON_DATA_TABLE, WeaponData, resolve_slots,
};
use super::table::{DeltaError, Field, FieldValue, MAX_FIELD_BITS, Table};

const META_TYPE: usize = 0;
const META_NAME: usize = 1;
const META_OFFSET: usize = 2;
const META_SIZE: usize = 3;
const META_BITS: usize = 4;
const META_SCALE: usize = 5;
const META_POST_SCALE: usize = 6;

/// Registry of learned delta tables.
#[derive(Debug, Clone)]
pub struct Delta {
    meta: Table,
    tables: HashMap<String, Table>,
}

impl Default for Delta {
    fn default() -> Self {
        Self::new()
    }
}

impl Delta {
    pub fn new() -> Self {
        Self {
            meta: Table::meta(),
            tables: HashMap::new(),
        }
    }

    /// Reads `count` field descriptors and stores them as table `name`.
    pub fn learn(&mut self, buf: &mut BitBuffer, name: &str, count: usize) -> Result<(), DeltaError> {
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let mut field = Field::default();
            for (index, value) in self.meta.decode(buf)? {
                match index {
                    META_TYPE => field.set_tag(value.as_i64() as u32),
                    META_NAME => field.name = value.as_str().unwrap_or_default().to_string(),
                    META_OFFSET => field.offset = value.as_i64() as u16,
                    META_SIZE => field.size = value.as_i64() as u8,
                    META_BITS => field.bits = value.as_i64() as u32,
                    META_SCALE => field.scale = value.as_f32(),
                    META_POST_SCALE => field.post_scale = value.as_f32(),
                    _ => {}
                }
            }
            if field.bits > MAX_FIELD_BITS {
                return Err(DeltaError::FieldWidth {
                    field: field.name,
                    bits: field.bits,
                });
            }
            fields.push(field);
        }

        log::debug!("Learned delta table {} with {} fields", name, fields.len());
        self.insert(Table::new(name, fields));
        Ok(())
    }

    /// Registers a table, binding its fields to the matching record members.
    pub fn insert(&mut self, mut table: Table) {
        let names: Vec<&str> = table.fields().iter().map(|f| f.name.as_str()).collect();
        let slots = resolve_slots(table.name(), &names);
        for (field, slot) in table.fields().iter().zip(&slots) {
            if slot.is_none() {
                log::trace!("Field {}.{} has no record member", table.name(), field.name);
            }
        }
        table.slots = slots;
        self.tables.insert(table.name().to_string(), table);
    }

    pub fn table(&self, name: &str) -> Result<&Table, DeltaError> {
        self.tables
            .get(name)
            .ok_or_else(|| DeltaError::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn decode(
        &self,
        buf: &mut BitBuffer,
        name: &str,
    ) -> Result<Vec<(usize, FieldValue)>, DeltaError> {
        self.table(name)?.decode(buf)
    }

    /// Decodes a record into a name-keyed map.
    pub fn decode_named(
        &self,
        buf: &mut BitBuffer,
        name: &str,
    ) -> Result<HashMap<String, FieldValue>, DeltaError> {
        let table = self.table(name)?;
        Ok(table
            .decode(buf)?
            .into_iter()
            .filter_map(|(i, v)| table.field(i).map(|f| (f.name.clone(), v)))
            .collect())
    }

    pub fn encode(
        &self,
        buf: &mut BitBuffer,
        name: &str,
        values: &[(usize, FieldValue)],
    ) -> Result<(), DeltaError> {
        self.table(name)?.encode(buf, values)
    }

    fn bound_table<T: DeltaRecord>(&self, name: &str) -> Result<&Table, DeltaError> {
        let table = self.table(name)?;
        if !T::TABLES.contains(&name) {
            return Err(DeltaError::RecordMismatch {
                table: name.to_string(),
                record: T::NAME,
            });
        }
        Ok(table)
    }

    /// Patches `record` with the fields present in the stream.
    pub fn read<T: DeltaRecord>(
        &self,
        buf: &mut BitBuffer,
        name: &str,
        record: &mut T,
    ) -> Result<(), DeltaError> {
        let table = self.bound_table::<T>(name)?;
        let bindings = T::fields();
        for (index, value) in table.decode(buf)? {
            if let Some(Some(slot)) = table.slots.get(index) {
                bindings[*slot].set(record, value);
            }
        }
        Ok(())
    }

    /// Writes the fields of `new` that differ from `old`.
    pub fn write<T: DeltaRecord>(
        &self,
        buf: &mut BitBuffer,
        name: &str,
        new: &T,
        old: &T,
    ) -> Result<(), DeltaError> {
        let table = self.bound_table::<T>(name)?;
        let bindings = T::fields();
        let changed: Vec<(usize, FieldValue)> = table
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let binding = &bindings[(*slot)?];
                let value = binding.get(new);
                (value != binding.get(old)).then_some((index, value))
            })
            .collect();
        table.encode(buf, &changed)
    }

    pub fn read_entity(
        &self,
        buf: &mut BitBuffer,
        shape: EntityShape,
        entity: &mut Entity,
    ) -> Result<(), DeltaError> {
        self.read(buf, shape.table(), entity)
    }

    pub fn read_client_data(
        &self,
        buf: &mut BitBuffer,
        data: &mut ClientData,
    ) -> Result<(), DeltaError> {
        self.read(buf, CLIENT_DATA_TABLE, data)
    }

    pub fn read_weapon_data(
        &self,
        buf: &mut BitBuffer,
        data: &mut WeaponData,
    ) -> Result<(), DeltaError> {
        self.read(buf, WEAPON_DATA_TABLE, data)
    }

    pub fn read_event(&self, buf: &mut BitBuffer, args: &mut EventArgs) -> Result<(), DeltaError> {
        self.read(buf, EVENT_TABLE, args)
    }

    pub fn write_user_cmd(
        &self,
        buf: &mut BitBuffer,
        new: &UserCmd,
        old: &UserCmd,
    ) -> Result<(), DeltaError> {
        self.write(buf, USER_CMD_TABLE, new, old)
    }
}

/// Writes `table` as a run of descriptors readable by [`Delta::learn`].
pub fn write_description(buf: &mut BitBuffer, table: &Table) -> Result<(), DeltaError> {
    let meta = Table::meta();
    let blank = Field::default();
    for field in table.fields() {
        let tag = field_tag(field);
        let mut values = vec![
            (META_TYPE, FieldValue::Integer(tag as i64)),
            (META_NAME, FieldValue::Text(field.name.clone())),
        ];
        if field.offset != blank.offset {
            values.push((META_OFFSET, FieldValue::Integer(field.offset as i64)));
        }
        if field.size != blank.size {
            values.push((META_SIZE, FieldValue::Integer(field.size as i64)));
        }
        values.push((META_BITS, FieldValue::Integer(field.bits as i64)));
        values.push((META_SCALE, FieldValue::Float(field.scale)));
        values.push((META_POST_SCALE, FieldValue::Float(field.post_scale)));
        meta.encode(buf, &values)?;
    }
    Ok(())
}

fn field_tag(field: &Field) -> u32 {
    use super::table::*;

    let base = match field.kind {
        FieldKind::Byte => DT_BYTE,
        FieldKind::Short => DT_SHORT,
        FieldKind::Float => DT_FLOAT,
        FieldKind::Integer => DT_INTEGER,
        FieldKind::Angle => DT_ANGLE,
        FieldKind::TimeWindow8 => DT_TIMEWINDOW_8,
        FieldKind::TimeWindowBig => DT_TIMEWINDOW_BIG,
        FieldKind::String => DT_STRING,
        FieldKind::Unknown(tag) => tag,
    };
    if field.signed { base | DT_SIGNED } else { base }
}

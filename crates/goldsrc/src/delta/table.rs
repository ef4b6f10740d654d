use std::collections::HashMap;

use crate::net::{BitBuffer, BufferError};

pub const DT_BYTE: u32 = 1 << 0;
pub const DT_SHORT: u32 = 1 << 1;
pub const DT_FLOAT: u32 = 1 << 2;
pub const DT_INTEGER: u32 = 1 << 3;
pub const DT_ANGLE: u32 = 1 << 4;
pub const DT_TIMEWINDOW_8: u32 = 1 << 5;
pub const DT_TIMEWINDOW_BIG: u32 = 1 << 6;
pub const DT_STRING: u32 = 1 << 7;
pub const DT_SIGNED: u32 = 1 << 31;

/// Presence masks are at most seven bytes long.
pub const MAX_FIELDS: usize = 7 * 8;

/// Widest value a single field read can produce.
pub const MAX_FIELD_BITS: u32 = 32;

const SCALE_EPSILON: f32 = 0.0001;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeltaError {
    #[error("unknown delta table {0:?}")]
    UnknownTable(String),
    #[error("field {field:?} has unknown type tag {tag:#x}")]
    UnknownFieldType { field: String, tag: u32 },
    #[error("field {field:?} is {bits} bits wide")]
    FieldWidth { field: String, bits: u32 },
    #[error("integer field {0:?} carries a scale")]
    ScaledInteger(String),
    #[error("field index {index} out of range for table {table:?}")]
    FieldIndex { table: String, index: usize },
    #[error("table {table:?} does not describe a {record}")]
    RecordMismatch { table: String, record: &'static str },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Byte,
    Short,
    Float,
    Integer,
    Angle,
    TimeWindow8,
    TimeWindowBig,
    String,
    Unknown(u32),
}

impl FieldKind {
    pub fn from_tag(tag: u32) -> Self {
        match tag & !DT_SIGNED {
            DT_BYTE => Self::Byte,
            DT_SHORT => Self::Short,
            DT_FLOAT => Self::Float,
            DT_INTEGER => Self::Integer,
            DT_ANGLE => Self::Angle,
            DT_TIMEWINDOW_8 => Self::TimeWindow8,
            DT_TIMEWINDOW_BIG => Self::TimeWindowBig,
            DT_STRING => Self::String,
            other => Self::Unknown(other),
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f32),
    Text(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Integer(v) => *v,
            Self::Float(v) => *v as i64,
            Self::Text(s) => s.parse().unwrap_or_default(),
        }
    }

    pub fn as_f32(&self) -> f32 {
        match self {
            Self::Integer(v) => *v as f32,
            Self::Float(v) => *v,
            Self::Text(s) => s.parse().unwrap_or_default(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub signed: bool,
    pub bits: u32,
    pub scale: f32,
    pub post_scale: f32,
    /// Informational only.
    pub offset: u16,
    /// Informational only.
    pub size: u8,
}

impl Default for Field {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: FieldKind::Unknown(0),
            signed: false,
            bits: 1,
            scale: 1.0,
            post_scale: 1.0,
            offset: 0,
            size: 0,
        }
    }
}

fn is_unit(value: f32) -> bool {
    (value - 1.0).abs() < SCALE_EPSILON
}

impl Field {
    pub fn new(name: &str, tag: u32, bits: u32, scale: f32, post_scale: f32) -> Self {
        let mut field = Self {
            name: name.to_string(),
            bits,
            scale,
            post_scale,
            ..Self::default()
        };
        field.set_tag(tag);
        field
    }

    pub fn set_tag(&mut self, tag: u32) {
        self.kind = FieldKind::from_tag(tag);
        self.signed = tag & DT_SIGNED != 0;
    }

    fn read_number(&self, buf: &mut BitBuffer) -> Result<i64, BufferError> {
        Ok(if self.signed {
            buf.read_sbits(self.bits)? as i64
        } else {
            buf.read_bits(self.bits)? as i64
        })
    }

    fn write_number(&self, buf: &mut BitBuffer, value: i64) {
        if self.signed {
            buf.write_sbits(value as i32, self.bits);
        } else {
            let mask = if self.bits >= 32 {
                u32::MAX
            } else {
                (1u32 << self.bits) - 1
            };
            buf.write_bits(value as u32 & mask, self.bits);
        }
    }

    pub fn read(&self, buf: &mut BitBuffer) -> Result<FieldValue, DeltaError> {
        match self.kind {
            FieldKind::Byte | FieldKind::Short | FieldKind::Integer => {
                if !is_unit(self.scale) || !is_unit(self.post_scale) {
                    return Err(DeltaError::ScaledInteger(self.name.clone()));
                }
                Ok(FieldValue::Integer(self.read_number(buf)?))
            }
            FieldKind::TimeWindow8 => Ok(FieldValue::Float(buf.read_sbits(8)? as f32)),
            FieldKind::Float | FieldKind::TimeWindowBig => {
                let mut value = self.read_number(buf)? as f32;
                if !is_unit(self.scale) {
                    value /= self.scale;
                }
                if !is_unit(self.post_scale) {
                    value *= self.post_scale;
                }
                Ok(FieldValue::Float(value))
            }
            FieldKind::Angle => Ok(FieldValue::Float(buf.read_bit_angle(self.bits)?)),
            FieldKind::String => Ok(FieldValue::Text(buf.read_string()?)),
            FieldKind::Unknown(tag) => Err(DeltaError::UnknownFieldType {
                field: self.name.clone(),
                tag,
            }),
        }
    }

    pub fn write(&self, buf: &mut BitBuffer, value: &FieldValue) -> Result<(), DeltaError> {
        match self.kind {
            FieldKind::Byte | FieldKind::Short | FieldKind::Integer => {
                if !is_unit(self.scale) || !is_unit(self.post_scale) {
                    return Err(DeltaError::ScaledInteger(self.name.clone()));
                }
                self.write_number(buf, value.as_i64());
            }
            FieldKind::TimeWindow8 => buf.write_sbits(value.as_f32() as i32, 8),
            FieldKind::Float | FieldKind::TimeWindowBig => {
                let mut scaled = value.as_f32();
                if !is_unit(self.scale) {
                    scaled *= self.scale;
                }
                if !is_unit(self.post_scale) {
                    scaled /= self.post_scale;
                }
                self.write_number(buf, scaled.round() as i64);
            }
            FieldKind::Angle => buf.write_bit_angle(value.as_f32(), self.bits),
            FieldKind::String => buf.write_string(value.as_str().unwrap_or_default()),
            FieldKind::Unknown(tag) => {
                return Err(DeltaError::UnknownFieldType {
                    field: self.name.clone(),
                    tag,
                });
            }
        }
        Ok(())
    }
}

/// An ordered, named field schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    name: String,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    /// Record accessor slot for each field, resolved when the table is bound.
    pub(crate) slots: Vec<Option<usize>>,
}

impl Table {
    pub fn new(name: &str, fields: Vec<Field>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            name: name.to_string(),
            slots: vec![None; fields.len()],
            fields,
            index,
        }
    }

    /// The fixed schema that describes field descriptors themselves.
    pub fn meta() -> Self {
        Self::new(
            "delta_description_t",
            vec![
                Field::new("fieldType", DT_INTEGER, 32, 1.0, 1.0),
                Field::new("fieldName", DT_STRING, 1, 1.0, 1.0),
                Field::new("fieldOffset", DT_INTEGER, 16, 1.0, 1.0),
                Field::new("fieldSize", DT_INTEGER, 8, 1.0, 1.0),
                Field::new("significant_bits", DT_INTEGER, 8, 1.0, 1.0),
                Field::new("premultiply", DT_FLOAT, 32, 4000.0, 1.0),
                Field::new("postmultiply", DT_FLOAT, 32, 4000.0, 1.0),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reads a presence mask and the fields it selects.
    pub fn decode(&self, buf: &mut BitBuffer) -> Result<Vec<(usize, FieldValue)>, DeltaError> {
        let count = buf.read_bits(3)? as usize;
        let mut mask = 0u64;
        for byte in 0..count {
            mask |= (buf.read_bits(8)? as u64) << (byte * 8);
        }

        let mut values = Vec::new();
        for (index, field) in self.fields.iter().enumerate().take(MAX_FIELDS) {
            if mask & (1 << index) == 0 {
                continue;
            }
            values.push((index, field.read(buf)?));
        }
        Ok(values)
    }

    /// Writes the given fields, which must be sorted by ascending index.
    pub fn encode(
        &self,
        buf: &mut BitBuffer,
        values: &[(usize, FieldValue)],
    ) -> Result<(), DeltaError> {
        let mut mask = 0u64;
        for &(index, _) in values {
            if index >= self.fields.len() || index >= MAX_FIELDS {
                return Err(DeltaError::FieldIndex {
                    table: self.name.clone(),
                    index,
                });
            }
            mask |= 1 << index;
        }

        let count = match values.iter().map(|(i, _)| *i).max() {
            Some(last) => last / 8 + 1,
            None => 0,
        };

        buf.write_bits(count as u32, 3);
        for byte in 0..count {
            buf.write_bits(((mask >> (byte * 8)) & 0xFF) as u32, 8);
        }

        let mut ordered: Vec<&(usize, FieldValue)> = values.iter().collect();
        ordered.sort_by_key(|(i, _)| *i);
        for (index, value) in ordered {
            self.fields[*index].write(buf, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            "sample_t",
            vec![
                Field::new("count", DT_INTEGER, 10, 1.0, 1.0),
                Field::new("offset", DT_INTEGER | DT_SIGNED, 12, 1.0, 1.0),
                Field::new("speed", DT_FLOAT | DT_SIGNED, 20, 8.0, 1.0),
                Field::new("yaw", DT_ANGLE, 16, 1.0, 1.0),
                Field::new("label", DT_STRING, 1, 1.0, 1.0),
                Field::new("delay", DT_TIMEWINDOW_8, 8, 1.0, 1.0),
                Field::new("pad0", DT_BYTE, 8, 1.0, 1.0),
                Field::new("pad1", DT_BYTE, 8, 1.0, 1.0),
                Field::new("tail", DT_SHORT, 16, 1.0, 1.0),
            ],
        )
    }

    #[test]
    fn test_decode_reads_only_present_fields() {
        let table = sample();
        let mut buf = BitBuffer::new();
        table
            .encode(
                &mut buf,
                &[
                    (1, FieldValue::Integer(-300)),
                    (2, FieldValue::Float(-12.375)),
                    (4, FieldValue::Text("crate".into())),
                ],
            )
            .unwrap();

        buf.rewind();
        let values = table.decode(&mut buf).unwrap();
        assert_eq!(
            values,
            vec![
                (1, FieldValue::Integer(-300)),
                (2, FieldValue::Float(-12.375)),
                (4, FieldValue::Text("crate".into())),
            ]
        );
    }

    #[test]
    fn test_mask_length_tracks_highest_index() {
        let table = sample();

        let mut buf = BitBuffer::new();
        table.encode(&mut buf, &[]).unwrap();
        assert_eq!(buf.bit_position(), 3);

        let mut buf = BitBuffer::new();
        table
            .encode(&mut buf, &[(8, FieldValue::Integer(7))])
            .unwrap();
        buf.rewind();
        assert_eq!(buf.read_bits(3).unwrap(), 2);
        assert_eq!(buf.read_bits(8).unwrap(), 0);
        assert_eq!(buf.read_bits(8).unwrap(), 1);
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let table = Table::new("bad_t", vec![Field::new("odd", 1 << 12, 8, 1.0, 1.0)]);
        let mut buf = BitBuffer::new();
        buf.write_bits(1, 3);
        buf.write_bits(1, 8);
        buf.write_bits(0xFF, 8);
        buf.rewind();
        assert!(matches!(
            table.decode(&mut buf),
            Err(DeltaError::UnknownFieldType { tag: 0x1000, .. })
        ));
    }

    #[test]
    fn test_scaled_integer_is_rejected() {
        let table = Table::new("bad_t", vec![Field::new("n", DT_INTEGER, 8, 2.0, 1.0)]);
        let mut buf = BitBuffer::new();
        buf.write_bits(1, 3);
        buf.write_bits(1, 8);
        buf.write_bits(3, 8);
        buf.rewind();
        assert!(matches!(
            table.decode(&mut buf),
            Err(DeltaError::ScaledInteger(_))
        ));
    }

    #[test]
    fn test_float_quantization() {
        let table = sample();
        let mut buf = BitBuffer::new();
        table
            .encode(&mut buf, &[(2, FieldValue::Float(3.14159))])
            .unwrap();
        buf.rewind();
        let values = table.decode(&mut buf).unwrap();
        let decoded = values[0].1.as_f32();
        assert!((decoded - 3.14159).abs() <= 1.0 / 8.0);
    }

    #[test]
    fn test_index_lookup() {
        let table = sample();
        assert_eq!(table.index_of("yaw"), Some(3));
        assert_eq!(table.index_of("missing"), None);
    }
}

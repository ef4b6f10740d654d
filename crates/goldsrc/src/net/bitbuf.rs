use glam::Vec3;

/// Failure modes of [`BitBuffer`] reads and splices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("read past end of buffer: wanted {wanted} bits at bit {position}, {available} available")]
    Underflow {
        wanted: usize,
        position: usize,
        available: usize,
    },
    #[error("range {start}..{end} out of bounds for {size} bytes")]
    OutOfRange { start: usize, end: usize, size: usize },
}

/// Growable byte buffer with a single bit-granular cursor.
///
/// Bits are packed least-significant first, so byte-aligned multi-byte
/// values come out little-endian. Writes at the cursor overwrite existing
/// bytes and extend the buffer as needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer {
    data: Vec<u8>,
    position: usize,
}

impl BitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Cursor in whole bytes, rounded up past a partially consumed byte.
    pub fn position(&self) -> usize {
        self.position.div_ceil(8)
    }

    pub fn bit_position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, byte: usize) -> Result<(), BufferError> {
        self.set_bit_position(byte * 8)
    }

    pub fn set_bit_position(&mut self, bit: usize) -> Result<(), BufferError> {
        if bit > self.data.len() * 8 {
            return Err(BufferError::OutOfRange {
                start: bit / 8,
                end: bit.div_ceil(8),
                size: self.data.len(),
            });
        }
        self.position = bit;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Moves the cursor by whole bytes relative to where it is now.
    pub fn seek(&mut self, bytes: isize) -> Result<(), BufferError> {
        let target = self.position as isize + bytes * 8;
        if target < 0 {
            return Err(BufferError::OutOfRange {
                start: 0,
                end: 0,
                size: self.data.len(),
            });
        }
        self.set_bit_position(target as usize)
    }

    /// Skips forward to the next byte boundary.
    pub fn align(&mut self) {
        self.position = self.position.div_ceil(8) * 8;
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position())
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn remaining_bytes(&self) -> &[u8] {
        &self.data[self.position().min(self.data.len())..]
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.position = 0;
    }

    /// Removes `len` bytes starting at byte `start` and returns them.
    ///
    /// The cursor keeps pointing at the same logical byte: if the removed
    /// range lies before it, it moves back accordingly.
    pub fn splice(&mut self, start: usize, len: usize) -> Result<Vec<u8>, BufferError> {
        let end = start + len;
        if end > self.data.len() {
            return Err(BufferError::OutOfRange {
                start,
                end,
                size: self.data.len(),
            });
        }

        let removed: Vec<u8> = self.data.drain(start..end).collect();

        let start_bit = start * 8;
        let end_bit = end * 8;
        if self.position >= end_bit {
            self.position -= len * 8;
        } else if self.position > start_bit {
            self.position = start_bit;
        }

        Ok(removed)
    }

    fn ensure_readable(&self, bits: usize) -> Result<(), BufferError> {
        let available = (self.data.len() * 8).saturating_sub(self.position);
        if bits > available {
            return Err(BufferError::Underflow {
                wanted: bits,
                position: self.position,
                available,
            });
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_bits(1)? != 0)
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u32, BufferError> {
        debug_assert!(count <= 32);
        let count = count as usize;
        self.ensure_readable(count)?;

        let mut value = 0u64;
        let mut read = 0;
        while read < count {
            let byte = self.data[self.position >> 3];
            let offset = self.position & 7;
            let take = (8 - offset).min(count - read);
            let bits = (byte as u64 >> offset) & ((1u64 << take) - 1);
            value |= bits << read;
            read += take;
            self.position += take;
        }

        Ok(value as u32)
    }

    pub fn peek_bits(&mut self, count: u32) -> Result<u32, BufferError> {
        let position = self.position;
        let value = self.read_bits(count);
        self.position = position;
        value
    }

    /// Sign bit first, then a `count - 1` bit magnitude.
    pub fn read_sbits(&mut self, count: u32) -> Result<i32, BufferError> {
        let negative = self.read_bit()?;
        let magnitude = self.read_bits(count.saturating_sub(1))? as i32;
        Ok(if negative { -magnitude } else { magnitude })
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_i8(&mut self) -> Result<i8, BufferError> {
        Ok(self.read_bits(8)? as u8 as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, BufferError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_i16(&mut self) -> Result<i16, BufferError> {
        Ok(self.read_bits(16)? as u16 as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, BufferError> {
        self.read_bits(32)
    }

    pub fn read_i32(&mut self) -> Result<i32, BufferError> {
        Ok(self.read_bits(32)? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, BufferError> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, BufferError> {
        self.ensure_readable(len * 8)?;

        if self.position % 8 == 0 {
            let start = self.position / 8;
            self.position += len * 8;
            return Ok(self.data[start..start + len].to_vec());
        }

        (0..len).map(|_| self.read_u8()).collect()
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut out = [0u8; N];
        for byte in out.iter_mut() {
            *byte = self.read_u8()?;
        }
        Ok(out)
    }

    pub fn skip(&mut self, bytes: usize) -> Result<(), BufferError> {
        self.ensure_readable(bytes * 8)?;
        self.position += bytes * 8;
        Ok(())
    }

    /// Reads a NUL-terminated string. Running out of data also terminates it.
    pub fn read_string(&mut self) -> Result<String, BufferError> {
        let mut bytes = Vec::new();
        while self.position + 8 <= self.data.len() * 8 {
            match self.read_u8()? {
                0 => break,
                byte => bytes.push(byte),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fixed-width string field, padded with NULs.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String, BufferError> {
        let bytes = self.read_bytes(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Whole-unit coordinate stored as eighths in an `i16`.
    pub fn read_coord(&mut self) -> Result<f32, BufferError> {
        Ok(self.read_i16()? as f32 / 8.0)
    }

    pub fn read_hires_angle(&mut self) -> Result<f32, BufferError> {
        Ok(self.read_i16()? as f32 * (360.0 / 65536.0))
    }

    pub fn read_bit_angle(&mut self, bits: u32) -> Result<f32, BufferError> {
        let value = self.read_bits(bits)?;
        Ok(value as f32 * (360.0 / (1u64 << bits) as f32))
    }

    pub fn read_bit_coord(&mut self) -> Result<f32, BufferError> {
        let has_int = self.read_bit()?;
        let has_fraction = self.read_bit()?;
        if !has_int && !has_fraction {
            return Ok(0.0);
        }

        let negative = self.read_bit()?;
        let int = if has_int { self.read_bits(12)? } else { 0 };
        let fraction = if has_fraction { self.read_bits(3)? } else { 0 };

        let value = int as f32 + fraction as f32 / 8.0;
        Ok(if negative { -value } else { value })
    }

    /// Three presence bits followed by a bit coord for each present axis.
    pub fn read_bit_vec3(&mut self) -> Result<Vec3, BufferError> {
        let present = [self.read_bit()?, self.read_bit()?, self.read_bit()?];
        let mut out = Vec3::ZERO;
        for (axis, has) in present.into_iter().enumerate() {
            if has {
                out[axis] = self.read_bit_coord()?;
            }
        }
        Ok(out)
    }

    pub fn write_bit(&mut self, value: bool) {
        self.write_bits(value as u32, 1);
    }

    pub fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        let count = count as usize;
        let value = value as u64;

        let mut written = 0;
        while written < count {
            let index = self.position >> 3;
            if index >= self.data.len() {
                self.data.push(0);
            }

            let offset = self.position & 7;
            let take = (8 - offset).min(count - written);
            let mask = (((1u16 << take) - 1) as u8) << offset;
            let bits = ((((value >> written) & ((1u64 << take) - 1)) as u8) << offset) & mask;

            self.data[index] = (self.data[index] & !mask) | bits;
            written += take;
            self.position += take;
        }
    }

    pub fn write_sbits(&mut self, value: i32, count: u32) {
        self.write_bit(value < 0);
        self.write_bits(value.unsigned_abs(), count.saturating_sub(1));
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bits(value as u32, 8);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_bits(value as u8 as u32, 8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(value as u32, 16);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_bits(value as u16 as u32, 16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(value, 32);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bits(value as u32, 32);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bits(value.to_bits(), 32);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.position % 8 == 0 {
            let start = self.position / 8;
            let overlap = self.data.len().saturating_sub(start).min(bytes.len());
            self.data[start..start + overlap].copy_from_slice(&bytes[..overlap]);
            self.data.extend_from_slice(&bytes[overlap..]);
            self.position += bytes.len() * 8;
            return;
        }

        for &byte in bytes {
            self.write_u8(byte);
        }
    }

    pub fn write_string(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
        self.write_u8(0);
    }

    pub fn write_coord(&mut self, value: f32) {
        self.write_i16((value * 8.0) as i16);
    }

    pub fn write_bit_angle(&mut self, angle: f32, bits: u32) {
        let steps = (1u64 << bits) as f32;
        let mask = ((1u64 << bits) - 1) as i64;
        let value = ((angle / 360.0 * steps) as i64) & mask;
        self.write_bits(value as u32, bits);
    }

    pub fn write_bit_coord(&mut self, value: f32) {
        let negative = value < 0.0;
        let magnitude = value.abs();
        let int = magnitude as u32;
        let fraction = ((magnitude - int as f32) * 8.0) as u32;

        self.write_bit(int != 0);
        self.write_bit(fraction != 0);
        if int != 0 || fraction != 0 {
            self.write_bit(negative);
            if int != 0 {
                self.write_bits(int, 12);
            }
            if fraction != 0 {
                self.write_bits(fraction, 3);
            }
        }
    }

    pub fn write_bit_vec3(&mut self, value: Vec3) {
        for axis in 0..3 {
            self.write_bit(value[axis] != 0.0);
        }
        for axis in 0..3 {
            if value[axis] != 0.0 {
                self.write_bit_coord(value[axis]);
            }
        }
    }

    /// Writes whole NUL bits up to the next byte boundary.
    pub fn pad_to_byte(&mut self) {
        let pad = (8 - (self.position & 7)) & 7;
        if pad > 0 {
            self.write_bits(0, pad as u32);
        }
    }
}

impl From<Vec<u8>> for BitBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_cross_byte_boundaries() {
        let mut buf = BitBuffer::new();
        buf.write_bits(0b101, 3);
        buf.write_bits(0x3FF, 10);
        buf.write_bits(0xDEADBEEF, 32);
        buf.write_bit(true);

        buf.rewind();
        assert_eq!(buf.read_bits(3).unwrap(), 0b101);
        assert_eq!(buf.read_bits(10).unwrap(), 0x3FF);
        assert_eq!(buf.read_bits(32).unwrap(), 0xDEADBEEF);
        assert!(buf.read_bit().unwrap());
    }

    #[test]
    fn test_aligned_values_are_little_endian() {
        let mut buf = BitBuffer::new();
        buf.write_u16(0x1234);
        buf.write_i32(-2);
        assert_eq!(buf.as_bytes(), &[0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF]);

        buf.rewind();
        assert_eq!(buf.read_u16().unwrap(), 0x1234);
        assert_eq!(buf.read_i32().unwrap(), -2);
    }

    #[test]
    fn test_signed_bits() {
        let mut buf = BitBuffer::new();
        buf.write_sbits(-37, 9);
        buf.write_sbits(37, 9);
        buf.rewind();
        assert_eq!(buf.read_sbits(9).unwrap(), -37);
        assert_eq!(buf.read_sbits(9).unwrap(), 37);
    }

    #[test]
    fn test_underflow_is_an_error() {
        let mut buf = BitBuffer::from_bytes(vec![0xFF]);
        assert!(buf.read_bits(4).is_ok());
        assert!(matches!(
            buf.read_bits(8),
            Err(BufferError::Underflow { wanted: 8, .. })
        ));
    }

    #[test]
    fn test_strings_unaligned() {
        let mut buf = BitBuffer::new();
        buf.write_bit(true);
        buf.write_string("sound/ambience.wav");
        buf.write_string("");
        buf.rewind();
        assert!(buf.read_bit().unwrap());
        assert_eq!(buf.read_string().unwrap(), "sound/ambience.wav");
        assert_eq!(buf.read_string().unwrap(), "");
    }

    #[test]
    fn test_splice_keeps_cursor() {
        let mut buf = BitBuffer::from_bytes(vec![1, 2, 3, 4, 5, 6]);
        buf.set_position(1).unwrap();

        let removed = buf.splice(3, 2).unwrap();
        assert_eq!(removed, vec![4, 5]);
        assert_eq!(buf.as_bytes(), &[1, 2, 3, 6]);
        assert_eq!(buf.read_u8().unwrap(), 2);

        assert!(buf.splice(3, 5).is_err());
    }

    #[test]
    fn test_bit_coord() {
        let mut buf = BitBuffer::new();
        buf.write_bit_vec3(Vec3::new(-12.5, 0.0, 100.125));
        buf.rewind();
        assert_eq!(buf.read_bit_vec3().unwrap(), Vec3::new(-12.5, 0.0, 100.125));
    }

    #[test]
    fn test_bit_angle_wraps() {
        let mut buf = BitBuffer::new();
        buf.write_bit_angle(90.0, 16);
        buf.write_bit_angle(-90.0, 16);
        buf.rewind();
        assert!((buf.read_bit_angle(16).unwrap() - 90.0).abs() < 0.01);
        assert!((buf.read_bit_angle(16).unwrap() - 270.0).abs() < 0.01);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut buf = BitBuffer::from_bytes(vec![0xFF, 0xFF, 0x01]);
        assert_eq!(buf.peek_bits(16).unwrap(), 0xFFFF);
        assert_eq!(buf.bit_position(), 0);
    }

    #[test]
    fn test_has_remaining_respects_partial_byte() {
        let mut buf = BitBuffer::from_bytes(vec![0xAA]);
        buf.read_bits(3).unwrap();
        assert!(!buf.has_remaining());
    }
}

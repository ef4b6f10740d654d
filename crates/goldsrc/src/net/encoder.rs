//! Keyed packet obfuscation and the checksums used on the wire.
//!
//! Munging is a reversible scramble, not encryption. Each whole 4-byte
//! word is XORed with the key, byte-swapped and masked with a table entry.
//! Trailing bytes that do not fill a word pass through unchanged.

const MUNGE_TABLE: [u8; 16] = [
    0x7A, 0x64, 0x05, 0xF1, 0x1B, 0x9B, 0xA0, 0xB5, 0xCA, 0xED, 0x61, 0x0D, 0x4A, 0xDF, 0x8E, 0xC7,
];

const MUNGE_TABLE2: [u8; 16] = [
    0x05, 0x61, 0x7A, 0xED, 0x1B, 0xCA, 0x0D, 0x9B, 0x4A, 0xF1, 0x64, 0xC7, 0xB5, 0x8E, 0xDF, 0xA0,
];

const MUNGE_TABLE3: [u8; 16] = [
    0x20, 0x07, 0x13, 0x61, 0x03, 0x45, 0x17, 0x72, 0x0A, 0x2D, 0x48, 0x0C, 0x4A, 0x12, 0xA9, 0xB5,
];

const CRC_TABLE: [u32; 256] = build_crc_table();

/// Bytes of the checksum table a sequence number may select.
const CRC_TABLE_SPAN: u32 = (CRC_TABLE.len() * 4 - 4) as u32;

const CHECKSUM_PREFIX: usize = 60;

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

#[inline]
fn mask(table: &[u8; 16], word: usize, byte: usize) -> u8 {
    0xA5 | (byte << byte) as u8 | byte as u8 | table[(word + byte) & 0x0F]
}

fn munge_with(data: &mut [u8], key: u32, table: &[u8; 16]) {
    for (word, chunk) in data.chunks_exact_mut(4).enumerate() {
        let mut c = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        c ^= !key;
        c = c.swap_bytes();

        let mut bytes = c.to_le_bytes();
        for (byte, b) in bytes.iter_mut().enumerate() {
            *b ^= mask(table, word, byte);
        }

        c = u32::from_le_bytes(bytes) ^ key;
        chunk.copy_from_slice(&c.to_le_bytes());
    }
}

fn unmunge_with(data: &mut [u8], key: u32, table: &[u8; 16]) {
    for (word, chunk) in data.chunks_exact_mut(4).enumerate() {
        let mut c = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        c ^= key;

        let mut bytes = c.to_le_bytes();
        for (byte, b) in bytes.iter_mut().enumerate() {
            *b ^= mask(table, word, byte);
        }

        c = u32::from_le_bytes(bytes).swap_bytes();
        c ^= !key;
        chunk.copy_from_slice(&c.to_le_bytes());
    }
}

/// Move command payloads and resource reserved values.
pub fn munge(data: &mut [u8], key: u32) {
    munge_with(data, key, &MUNGE_TABLE);
}

pub fn unmunge(data: &mut [u8], key: u32) {
    unmunge_with(data, key, &MUNGE_TABLE);
}

/// Channel packet bodies and the spawn checksum.
pub fn munge2(data: &mut [u8], key: u32) {
    munge_with(data, key, &MUNGE_TABLE2);
}

pub fn unmunge2(data: &mut [u8], key: u32) {
    unmunge_with(data, key, &MUNGE_TABLE2);
}

/// Map checksum in the server info message.
pub fn munge3(data: &mut [u8], key: u32) {
    munge_with(data, key, &MUNGE_TABLE3);
}

pub fn unmunge3(data: &mut [u8], key: u32) {
    unmunge_with(data, key, &MUNGE_TABLE3);
}

/// Munges a single integer as one little-endian word.
pub fn munge2_i32(value: i32, key: u32) -> i32 {
    let mut bytes = value.to_le_bytes();
    munge2(&mut bytes, key);
    i32::from_le_bytes(bytes)
}

pub fn unmunge3_i32(value: i32, key: u32) -> i32 {
    let mut bytes = value.to_le_bytes();
    unmunge3(&mut bytes, key);
    i32::from_le_bytes(bytes)
}

pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Checksum byte guarding a move command.
///
/// At most the first 60 bytes of `base` are mixed with four bytes of the
/// CRC table chosen by `sequence`.
pub fn block_sequence_crc_byte(base: &[u8], sequence: u32) -> u8 {
    let mut block = Vec::with_capacity(CHECKSUM_PREFIX + 4);
    block.extend_from_slice(&base[..base.len().min(CHECKSUM_PREFIX)]);

    let offset = (sequence % CRC_TABLE_SPAN) as usize;
    for pos in offset..offset + 4 {
        block.push((CRC_TABLE[pos / 4] >> ((pos % 4) * 8)) as u8);
    }

    crc32(&block) as u8
}

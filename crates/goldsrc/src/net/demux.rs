use std::time::Instant;

use super::bitbuf::BitBuffer;
use super::fragment::{FragmentError, FragmentPool};

pub const CONNECTIONLESS_TAG: i32 = -1;
pub const SPLIT_TAG: i32 = -2;

const TAG_SIZE: usize = 4;
/// Tag, transfer index and the packed total/ordinal byte.
const SPLIT_HEADER_SIZE: usize = TAG_SIZE + 4 + 1;

/// A classified inbound datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Out-of-channel payload with the tag stripped.
    Connectionless(BitBuffer),
    /// In-channel datagram, untouched.
    Regular(Vec<u8>),
}

/// Classifies datagrams by their leading tag and reassembles split
/// connectionless payloads.
#[derive(Debug, Default)]
pub struct Networking {
    splits: FragmentPool<i32>,
}

impl Networking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, data: &[u8], now: Instant) -> Result<Option<Inbound>, FragmentError> {
        if data.len() <= TAG_SIZE {
            log::trace!("Dropped {} byte datagram", data.len());
            return Ok(None);
        }

        let tag = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        match tag {
            CONNECTIONLESS_TAG => Ok(Some(Inbound::Connectionless(BitBuffer::from_bytes(
                &data[TAG_SIZE..],
            )))),
            SPLIT_TAG => self.read_split(data, now),
            _ => Ok(Some(Inbound::Regular(data.to_vec()))),
        }
    }

    fn read_split(&mut self, data: &[u8], now: Instant) -> Result<Option<Inbound>, FragmentError> {
        if data.len() < SPLIT_HEADER_SIZE {
            log::trace!("Dropped truncated split packet");
            return Ok(None);
        }

        let index = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let packed = data[8];
        let total = (packed & 0x0F) as usize;
        let ordinal = (packed >> 4) as usize;

        log::trace!("Split packet {} ({}/{})", index, ordinal + 1, total);

        self.splits.expire(now);
        match self
            .splits
            .insert(index, total, ordinal, data[SPLIT_HEADER_SIZE..].to_vec(), now)?
        {
            Some(joined) => self.classify(&joined, now),
            None => Ok(None),
        }
    }

    pub fn pending_splits(&self) -> usize {
        self.splits.len()
    }

    pub fn clear(&mut self) {
        self.splits.clear();
    }

    /// Prefixes `payload` with the connectionless tag.
    pub fn connectionless(payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(TAG_SIZE + payload.len());
        data.extend_from_slice(&CONNECTIONLESS_TAG.to_le_bytes());
        data.extend_from_slice(payload);
        data
    }
}

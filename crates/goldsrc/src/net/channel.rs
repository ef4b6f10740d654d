use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bzip2::Compression;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;

use super::bitbuf::{BitBuffer, BufferError};
use super::encoder::{munge2, unmunge2};
use super::fragment::{FragmentError, FragmentPool};

pub const HEADER_SIZE: usize = 8;
pub const MIN_PACKET_SIZE: usize = 16;

const RELIABLE_FLAG: u32 = 1 << 31;
const FRAGMENT_FLAG: u32 = 1 << 30;
const SECURITY_FLAG: u32 = 1 << 30;
const SEQUENCE_MASK: u32 = !(RELIABLE_FLAG | FRAGMENT_FLAG);

const COMPRESSED_MAGIC: &str = "BZ2";
const COMPRESSED_FILE: &str = "bz2";

/// Flag byte, packed total/ordinal, offset and size.
const FRAGMENT_HEADER_SIZE: usize = 9;

const PADDING_BYTE: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("decompression failed: {0}")]
    Compression(#[from] io::Error),
    #[error("malformed fragment: {0}")]
    Fragment(#[from] FragmentError),
    #[error("file fragment offset {offset} precedes the carrier payload")]
    FileOffset { offset: usize },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Bytes per outbound fragment chunk.
    pub fragment_size: usize,
    pub compress_fragments: bool,
    /// Reliable bytes per datagram beyond the first message.
    pub reliable_budget: usize,
    pub fragment_expiry: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            fragment_size: 512,
            compress_fragments: true,
            reliable_budget: 1024,
            fragment_expiry: super::fragment::FRAGMENT_EXPIRY,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Stale, duplicate and reserved packets.
    pub packets_dropped: u64,
    /// Sequence numbers skipped over by accepted packets.
    pub packets_lost: u64,
    pub rtt_ms: f32,
}

/// Something the channel hands up to the message layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A run of server messages, positioned at the first opcode.
    Messages(BitBuffer),
    /// A completed file transfer.
    File { name: String, data: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FragmentHeader {
    total: u16,
    ordinal: u16,
    offset: u16,
    size: u16,
}

impl FragmentHeader {
    fn read(buf: &mut BitBuffer) -> Result<Self, BufferError> {
        let total = buf.read_u16()?;
        let ordinal = buf.read_u16()?;
        let offset = buf.read_u16()?;
        let size = buf.read_u16()?;
        Ok(Self {
            total,
            ordinal,
            offset,
            size,
        })
    }

    fn slot(&self) -> Result<usize, FragmentError> {
        let error = FragmentError {
            ordinal: self.ordinal as usize,
            total: self.total as usize,
        };
        match self.ordinal {
            0 => Err(error),
            n if n > self.total => Err(error),
            n => Ok(n as usize - 1),
        }
    }
}

#[derive(Debug, Clone)]
struct OutgoingFragment {
    total: u16,
    ordinal: u16,
    data: Vec<u8>,
}

/// Sequenced session with a reliable sub-stream over an unreliable
/// datagram transport.
#[derive(Debug)]
pub struct Channel {
    address: SocketAddr,
    config: ChannelConfig,

    incoming_sequence: u32,
    incoming_acknowledgement: u32,
    incoming_reliable: bool,
    incoming_time: Instant,

    outgoing_sequence: u32,
    outgoing_reliable: bool,
    reliable_sequence: u32,

    reliable_messages: VecDeque<Vec<u8>>,
    reliable_sent: usize,
    fragments: VecDeque<OutgoingFragment>,
    fragment_in_flight: bool,
    /// A transfer requested while a reliable bundle was in flight.
    fragments_deferred: bool,

    normal_fragments: FragmentPool<u16>,
    file_fragments: FragmentPool<u16>,

    latency: Duration,
    latency_probe: Option<(u32, Instant)>,

    stats: ChannelStats,
}

impl Channel {
    pub fn new(address: SocketAddr, config: ChannelConfig, now: Instant) -> Self {
        let expiry = config.fragment_expiry;
        Self {
            address,
            config,
            incoming_sequence: 0,
            incoming_acknowledgement: 0,
            incoming_reliable: false,
            incoming_time: now,
            outgoing_sequence: 0,
            outgoing_reliable: false,
            reliable_sequence: 0,
            reliable_messages: VecDeque::new(),
            reliable_sent: 0,
            fragments: VecDeque::new(),
            fragment_in_flight: false,
            fragments_deferred: false,
            normal_fragments: FragmentPool::with_expiry(expiry),
            file_fragments: FragmentPool::with_expiry(expiry),
            latency: Duration::ZERO,
            latency_probe: None,
            stats: ChannelStats::default(),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn incoming_sequence(&self) -> u32 {
        self.incoming_sequence
    }

    pub fn incoming_acknowledgement(&self) -> u32 {
        self.incoming_acknowledgement
    }

    pub fn incoming_time(&self) -> Instant {
        self.incoming_time
    }

    pub fn outgoing_sequence(&self) -> u32 {
        self.outgoing_sequence
    }

    /// Sequence number the next transmitted datagram will carry.
    pub fn next_sequence(&self) -> u32 {
        self.outgoing_sequence.wrapping_add(1) & SEQUENCE_MASK
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn pending_reliable(&self) -> usize {
        self.reliable_messages.len()
    }

    pub fn pending_fragments(&self) -> usize {
        self.fragments.len()
    }

    pub fn push_reliable(&mut self, message: Vec<u8>) {
        self.reliable_messages.push_back(message);
    }

    pub fn clear(&mut self, now: Instant) {
        let address = self.address;
        let config = self.config.clone();
        *self = Self::new(address, config, now);
    }

    /// Moves every reliable message not yet in flight into one fragmented
    /// transfer. Returns the number of fragments queued.
    ///
    /// Nothing happens when the queued data fits in a single chunk. While a
    /// reliable bundle is unacknowledged the transfer is postponed until
    /// that bundle is settled, so the reliable stream keeps its order.
    pub fn create_fragments(&mut self) -> Result<usize, ChannelError> {
        if self.reliable_sent > 0 {
            log::debug!(
                "Fragmented transfer waits for {} reliable messages",
                self.reliable_sent
            );
            self.fragments_deferred = true;
            return Ok(0);
        }
        self.fragments_deferred = false;

        let chunk_size = self.config.fragment_size.max(1);
        let pending: usize = self
            .reliable_messages
            .iter()
            .skip(self.reliable_sent)
            .map(|m| 4 + m.len())
            .sum();
        if pending <= chunk_size {
            return Ok(0);
        }

        let mut flat = BitBuffer::with_capacity(pending);
        for message in self.reliable_messages.drain(self.reliable_sent..) {
            flat.write_u32(message.len() as u32);
            flat.write_bytes(&message);
        }
        let mut data = flat.into_bytes();

        if self.config.compress_fragments {
            let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(&data)?;
            let compressed = encoder.finish()?;
            if compressed.len() + COMPRESSED_MAGIC.len() + 1 < data.len() {
                let mut buf = BitBuffer::with_capacity(compressed.len() + 4);
                buf.write_string(COMPRESSED_MAGIC);
                buf.write_bytes(&compressed);
                data = buf.into_bytes();
            }
        }

        let total = data.len().div_ceil(chunk_size) as u16;
        for (i, chunk) in data.chunks(chunk_size).enumerate() {
            self.fragments.push_back(OutgoingFragment {
                total,
                ordinal: i as u16 + 1,
                data: chunk.to_vec(),
            });
        }

        log::debug!(
            "Split {} reliable bytes into {} fragments",
            pending,
            total
        );
        Ok(total as usize)
    }

    /// Builds the next datagram with `payload` appended as the unreliable
    /// part.
    pub fn transmit(&mut self, payload: &[u8], now: Instant) -> Vec<u8> {
        self.outgoing_sequence = self.next_sequence();

        let mut send_fragment = false;
        let mut send_reliable = false;
        if self.incoming_acknowledgement >= self.reliable_sequence {
            send_fragment = !self.fragments.is_empty();
            send_reliable = !send_fragment && !self.reliable_messages.is_empty();
        }

        let reliable = send_fragment || send_reliable;
        if reliable {
            self.reliable_sequence = self.outgoing_sequence;
            if self.latency_probe.is_none() {
                self.latency_probe = Some((self.outgoing_sequence, now));
            }
        }

        let mut sequence = self.outgoing_sequence;
        if reliable {
            sequence |= RELIABLE_FLAG;
        }
        if send_fragment {
            sequence |= FRAGMENT_FLAG;
        }
        let mut ack = self.incoming_sequence;
        if self.outgoing_reliable {
            ack |= RELIABLE_FLAG;
        }

        let mut buf = BitBuffer::with_capacity(MIN_PACKET_SIZE + payload.len());
        buf.write_u32(sequence);
        buf.write_u32(ack);

        if send_fragment {
            if let Some(fragment) = self.fragments.front() {
                buf.write_u8(1);
                buf.write_u16(fragment.total);
                buf.write_u16(fragment.ordinal);
                buf.write_u16(0);
                buf.write_u16(fragment.data.len() as u16);
                buf.write_u8(0);
                buf.write_bytes(&fragment.data);
                self.fragment_in_flight = true;
            }
        } else if send_reliable {
            self.write_reliable(&mut buf);
        }

        buf.write_bytes(payload);
        while buf.len() < MIN_PACKET_SIZE {
            buf.write_u8(PADDING_BYTE);
        }

        let mut data = buf.into_bytes();
        munge2(&mut data[HEADER_SIZE..], sequence & 0xFF);

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += data.len() as u64;
        data
    }

    fn write_reliable(&mut self, buf: &mut BitBuffer) {
        let start = buf.len();
        let mut sent = 0;
        for message in &self.reliable_messages {
            if sent > 0 && buf.len() - start + message.len() > self.config.reliable_budget {
                break;
            }
            buf.write_u32(message.len() as u32);
            buf.write_bytes(message);
            sent += 1;
        }
        self.reliable_sent = sent;
    }

    /// Parses an inbound datagram.
    ///
    /// Returns `Ok(None)` for packets that are dropped: too short, reserved,
    /// stale or duplicate.
    pub fn process(
        &mut self,
        data: &[u8],
        now: Instant,
    ) -> Result<Option<Vec<Delivery>>, ChannelError> {
        if data.len() < HEADER_SIZE {
            self.stats.packets_dropped += 1;
            return Ok(None);
        }

        let mut buf = BitBuffer::from_bytes(data);
        let raw_sequence = buf.read_u32()?;
        let raw_ack = buf.read_u32()?;

        if raw_ack & SECURITY_FLAG != 0 {
            log::trace!("Dropped packet with reserved bit set");
            self.stats.packets_dropped += 1;
            return Ok(None);
        }

        let reliable = raw_sequence & RELIABLE_FLAG != 0;
        let fragmented = raw_sequence & FRAGMENT_FLAG != 0;
        let reliable_ack = raw_ack & RELIABLE_FLAG != 0;
        let sequence = raw_sequence & SEQUENCE_MASK;
        let ack = raw_ack & SEQUENCE_MASK;

        if sequence <= self.incoming_sequence {
            log::trace!(
                "Dropped {} packet {}",
                if sequence == self.incoming_sequence { "duplicate" } else { "stale" },
                sequence
            );
            self.stats.packets_dropped += 1;
            return Ok(None);
        }

        unmunge2(&mut buf.as_bytes_mut()[HEADER_SIZE..], raw_sequence & 0xFF);

        let gap = sequence - self.incoming_sequence - 1;
        if gap > 0 && self.incoming_sequence > 0 {
            log::debug!("Lost {} packets before {}", gap, sequence);
            self.stats.packets_lost += gap as u64;
        }

        self.stats.packets_received += 1;
        self.stats.bytes_received += data.len() as u64;
        self.incoming_time = now;
        self.incoming_sequence = sequence;
        self.incoming_acknowledgement = ack;

        if reliable {
            self.outgoing_reliable = !self.outgoing_reliable;
        }

        if self.incoming_acknowledgement >= self.reliable_sequence {
            if reliable_ack != self.incoming_reliable {
                self.incoming_reliable = reliable_ack;
                self.acknowledge();
            } else {
                self.reliable_sent = 0;
                self.fragment_in_flight = false;
            }
        }

        if self.fragments_deferred && self.reliable_sent == 0 {
            self.create_fragments()?;
        }

        if let Some((probe, sent)) = self.latency_probe {
            if ack >= probe {
                self.update_latency(now.saturating_duration_since(sent));
                self.latency_probe = None;
            }
        }

        let mut deliveries = if fragmented {
            self.read_fragments(&mut buf, now)?
        } else {
            Vec::new()
        };

        self.normal_fragments.expire(now);
        self.file_fragments.expire(now);

        deliveries.push(Delivery::Messages(buf));
        Ok(Some(deliveries))
    }

    fn acknowledge(&mut self) {
        if self.fragment_in_flight {
            self.fragment_in_flight = false;
            if let Some(fragment) = self.fragments.pop_front() {
                if fragment.ordinal == fragment.total {
                    log::debug!("Fragmented transfer of {} acknowledged", fragment.total);
                }
            }
        } else {
            let count = self.reliable_sent.min(self.reliable_messages.len());
            self.reliable_messages.drain(..count);
        }
        self.reliable_sent = 0;
    }

    fn update_latency(&mut self, sample: Duration) {
        const ALPHA: f32 = 0.125;

        self.latency = sample;
        let ms = sample.as_secs_f32() * 1000.0;
        self.stats.rtt_ms = if self.stats.rtt_ms == 0.0 {
            ms
        } else {
            (1.0 - ALPHA) * self.stats.rtt_ms + ALPHA * ms
        };
    }

    fn read_fragments(
        &mut self,
        buf: &mut BitBuffer,
        now: Instant,
    ) -> Result<Vec<Delivery>, ChannelError> {
        let carrier_size = buf.len();
        let mut deliveries = Vec::new();

        if buf.read_u8()? != 0 {
            let header = FragmentHeader::read(buf)?;
            let skip = if buf.peek_bits(8)? != 0 {
                FRAGMENT_HEADER_SIZE
            } else {
                1
            };

            let start = buf.position() + skip + header.offset as usize;
            let chunk = buf.splice(start, header.size as usize)?;
            let slot = header.slot()?;

            if let Some(data) =
                self.normal_fragments
                    .insert(header.total, header.total as usize, slot, chunk, now)?
            {
                log::debug!("Completed {} normal fragments", header.total);
                deliveries.push(Delivery::Messages(decompress_messages(data)?));
            }
        }

        if buf.read_u8()? != 0 {
            let removed = carrier_size - buf.len();
            let header = FragmentHeader::read(buf)?;

            let start = (buf.position() + header.offset as usize)
                .checked_sub(removed)
                .ok_or(ChannelError::FileOffset {
                    offset: header.offset as usize,
                })?;
            let chunk = buf.splice(start, header.size as usize)?;
            let slot = header.slot()?;

            if let Some(data) =
                self.file_fragments
                    .insert(header.total, header.total as usize, slot, chunk, now)?
            {
                log::debug!("Completed {} file fragments", header.total);
                deliveries.push(decode_file(data)?);
            }
        }

        Ok(deliveries)
    }
}

fn decompress(data: &[u8], capacity: usize) -> Result<Vec<u8>, ChannelError> {
    let mut out = Vec::with_capacity(capacity);
    BzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn decompress_messages(data: Vec<u8>) -> Result<BitBuffer, ChannelError> {
    let mut buf = BitBuffer::from_bytes(data);
    if buf.read_string()? != COMPRESSED_MAGIC {
        buf.rewind();
        return Ok(buf);
    }
    let inflated = decompress(buf.remaining_bytes(), 65536)?;
    Ok(BitBuffer::from_bytes(inflated))
}

fn decode_file(data: Vec<u8>) -> Result<Delivery, ChannelError> {
    let mut buf = BitBuffer::from_bytes(data);
    let name = buf.read_string()?;
    let compressed = buf.read_string()? == COMPRESSED_FILE;
    let size = buf.read_u32()? as usize;

    let data = if compressed {
        decompress(buf.remaining_bytes(), size)?
    } else {
        buf.read_bytes(size)?
    };
    Ok(Delivery::File { name, data })
}

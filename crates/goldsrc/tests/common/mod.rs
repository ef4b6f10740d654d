#![allow(dead_code)]

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use goldsrc::net::encoder::{munge2, munge3, unmunge2};
use goldsrc::net::protocol::ServerMessage;
use goldsrc::{AssetStore, BitBuffer, Client, ClientConfig, ConnectionState, MemoryAssets, NoHooks};

pub const RELIABLE_FLAG: u32 = 1 << 31;
pub const FRAGMENT_FLAG: u32 = 1 << 30;
const SEQUENCE_MASK: u32 = !(RELIABLE_FLAG | FRAGMENT_FLAG);
const CONNECTIONLESS_TAG: [u8; 4] = [0xFF; 4];

/// Asset store that stays readable after the client takes ownership.
#[derive(Clone, Default)]
pub struct SharedAssets(pub Rc<RefCell<MemoryAssets>>);

impl SharedAssets {
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.0.borrow().get(path).map(<[u8]>::to_vec)
    }
}

impl AssetStore for SharedAssets {
    fn exists(&self, path: &str) -> bool {
        self.0.borrow().exists(path)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.0.borrow().read(path)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        self.0.borrow_mut().write(path, data)
    }
}

pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.set_user_info("name", "Tester");
    config
}

pub fn new_client(assets: SharedAssets) -> Client {
    Client::new(test_config(), Box::new(NoHooks), Box::new(assets))
}

/// One client datagram with its reliable section split out.
#[derive(Debug)]
pub struct Outbound {
    pub sequence: u32,
    pub ack: u32,
    pub reliable: Vec<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl Outbound {
    pub fn is_reliable(&self) -> bool {
        self.sequence & RELIABLE_FLAG != 0
    }

    /// String commands in the reliable section.
    pub fn commands(&self) -> Vec<String> {
        self.reliable
            .iter()
            .filter(|m| m.first() == Some(&3))
            .map(|m| {
                let text = &m[1..];
                let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
                String::from_utf8_lossy(&text[..end]).into_owned()
            })
            .collect()
    }
}

/// Splits `u32 length + message` records off the front of a body. The
/// first record that does not look like a client message ends the run.
fn split_reliable(body: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>) {
    let mut reliable = Vec::new();
    let mut pos = 0;
    while body.len() - pos > 4 {
        let len = u32::from_le_bytes([body[pos], body[pos + 1], body[pos + 2], body[pos + 3]]) as usize;
        if len == 0 || pos + 4 + len > body.len() || !matches!(body[pos + 4], 3 | 5 | 10 | 11) {
            break;
        }
        reliable.push(body[pos + 4..pos + 4 + len].to_vec());
        pos += 4 + len;
    }
    (reliable, body[pos..].to_vec())
}

/// Scripted server end of a connection.
pub struct FakeServer {
    pub addr: SocketAddr,
    sequence: u32,
    ack: u32,
    reliable_toggle: bool,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            addr: "10.0.0.1:27015".parse().unwrap(),
            sequence: 0,
            ack: 0,
            reliable_toggle: false,
        }
    }

    pub fn connectionless(&self, client: &mut Client, text: &[u8], now: Instant) {
        let mut data = CONNECTIONLESS_TAG.to_vec();
        data.extend_from_slice(text);
        client.receive(self.addr, &data, now);
    }

    /// Drives the handshake until the client has a channel.
    pub fn connect(&mut self, client: &mut Client, now: Instant) {
        client.connect(self.addr, now).unwrap();
        client.drain_outgoing();
        self.connectionless(client, b"A00000000 12345 2\n\0", now);
        client.drain_outgoing();
        self.connectionless(client, b"B\0", now);
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    /// Sends a datagram carrying `messages` as its body.
    pub fn send(&mut self, client: &mut Client, messages: &[u8], now: Instant) {
        self.send_with(client, 0, messages, now);
    }

    pub fn send_with(&mut self, client: &mut Client, flags: u32, body: &[u8], now: Instant) {
        self.sequence += 1;
        let mut buf = BitBuffer::new();
        buf.write_u32(self.sequence | flags);
        buf.write_u32(if self.reliable_toggle { self.ack | RELIABLE_FLAG } else { self.ack });
        buf.write_bytes(body);
        let mut data = buf.into_bytes();
        munge2(&mut data[8..], (self.sequence | flags) & 0xFF);
        client.receive(self.addr, &data, now);
    }

    /// Lets the client transmit once and returns what reached the server.
    pub fn pump(&mut self, client: &mut Client, now: Instant) -> Vec<Outbound> {
        client.transmit(now);
        let server = self.addr;
        client
            .drain_outgoing()
            .into_iter()
            .filter(|(addr, _)| *addr == server)
            .map(|(_, data)| self.open(&data))
            .collect()
    }

    /// Parses a client datagram and records it for the next acknowledgement.
    pub fn open(&mut self, data: &[u8]) -> Outbound {
        let mut data = data.to_vec();
        let sequence = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let ack = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        unmunge2(&mut data[8..], sequence & 0xFF);

        self.ack = sequence & SEQUENCE_MASK;
        let reliable = sequence & RELIABLE_FLAG != 0;
        if reliable {
            self.reliable_toggle = !self.reliable_toggle;
        }

        let (reliable_messages, payload) = if reliable && sequence & FRAGMENT_FLAG == 0 {
            split_reliable(&data[8..])
        } else {
            (Vec::new(), data[8..].to_vec())
        };

        Outbound {
            sequence,
            ack,
            reliable: reliable_messages,
            payload,
        }
    }
}

/// Server info announcing `game_dir` with the map checksum obfuscated the
/// way the server sends it.
pub fn server_info(spawn_count: i32, player_index: u8, map_crc: i32, game_dir: &str) -> Vec<u8> {
    let mut crc = map_crc.to_le_bytes();
    munge3(&mut crc, ((-1 - player_index as i32) & 0xFF) as u32);

    let mut buf = BitBuffer::new();
    buf.write_u8(ServerMessage::ServerInfo as u8);
    buf.write_i32(48);
    buf.write_i32(spawn_count);
    buf.write_bytes(&crc);
    buf.write_bytes(&[0; 16]);
    buf.write_u8(32);
    buf.write_u8(player_index);
    buf.write_u8(1);
    buf.write_string(game_dir);
    buf.write_string("Test Server");
    buf.write_string("de_test");
    buf.write_string("");
    buf.write_u8(0);
    buf.into_bytes()
}

/// Body of a datagram that completes a single-fragment file transfer,
/// followed by `messages`.
pub fn file_transfer(name: &str, data: &[u8], messages: &[u8]) -> Vec<u8> {
    let mut file = BitBuffer::new();
    file.write_string(name);
    file.write_string("");
    file.write_u32(data.len() as u32);
    file.write_bytes(data);
    let file = file.into_bytes();

    let mut body = BitBuffer::new();
    body.write_u8(0);
    body.write_u8(1);
    body.write_u16(1);
    body.write_u16(1);
    body.write_u16(0);
    body.write_u16(file.len() as u16);
    body.write_bytes(&file);
    body.write_bytes(messages);
    body.into_bytes()
}

pub fn later(now: Instant, ms: u64) -> Instant {
    now + Duration::from_millis(ms)
}

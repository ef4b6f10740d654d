//! Client protocol state machine.
//!
//! The host owns the socket and the clock. It feeds datagrams in with
//! [`Client::receive`], drives time with [`Client::update`], and sends
//! whatever [`Client::flush`] or [`Client::drain_outgoing`] hands back. All
//! calls must come from one thread.

mod config;
mod connectionless;
mod entities;
mod events;
mod hooks;
mod read;
mod resources;
mod write;

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use glam::Vec3;

use crate::assets::AssetStore;
use crate::delta::{ClientData, Delta, DeltaError, UserCmd, WeaponData};
use crate::net::protocol::{
    ClientMessage, Customization, DEFAULT_PORT, GameMessage, MoveVars, PlayerInfo, ServerInfo,
};
use crate::net::{
    BitBuffer, BufferError, Channel, ChannelError, Delivery, Inbound, Networking, Transport,
};

pub use config::ClientConfig;
pub use entities::Entities;
pub use events::{ClientEvent, DisconnectReason};
pub use hooks::{ClientHooks, NoHooks};
pub use resources::{Resources, is_required, resource_hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Disconnected,
    Challenging,
    Connecting,
    Connected,
    GameStarted,
}

/// Malformed or unexpected in-channel data. Always ends the session.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown message opcode {0}")]
    UnknownOpcode(u8),
    #[error("game message {0} was never registered")]
    UnregisteredGameMessage(u8),
    #[error("unknown temp entity type {0}")]
    UnknownTempEntity(u8),
    #[error("entity {entity} references missing baseline {baseline}")]
    MissingBaseline { entity: u16, baseline: u16 },
    #[error("entity index {0} out of range")]
    EntityIndexOutOfRange(u32),
    #[error("entity {entity} references missing extra baseline {baseline}")]
    MissingExtraBaseline { entity: u16, baseline: usize },
    #[error(transparent)]
    Delta(#[from] DeltaError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
}

/// Everything the server told us about the current level.
#[derive(Debug, Default)]
pub struct Session {
    pub info: ServerInfo,
    pub signon: u8,
    pub time: f32,
    pub time_scale: f32,
    pub paused: bool,
    pub view_entity: i16,
    pub view_angles: Vec3,
    pub entities: Entities,
    pub resources: Resources,
    pub client_data: ClientData,
    pub weapons: BTreeMap<u8, WeaponData>,
    pub players: BTreeMap<u8, PlayerInfo>,
    pub customizations: Vec<Customization>,
    pub game_messages: HashMap<u8, GameMessage>,
    pub light_styles: BTreeMap<u8, String>,
    pub move_vars: MoveVars,
    /// Incoming sequence of the snapshot the server should delta against.
    pub delta_sequence: u8,
    pub last_cmd: UserCmd,
    pub fallback_dir: String,
    pub download_url: String,
}

impl Session {
    pub fn is_player_index(&self, index: u16) -> bool {
        index >= 1 && index <= self.info.max_players as u16
    }
}

pub struct Client {
    config: ClientConfig,
    hooks: Box<dyn ClientHooks>,
    assets: Box<dyn AssetStore>,

    state: ConnectionState,
    server: Option<SocketAddr>,
    networking: Networking,
    channel: Option<Channel>,
    delta: Delta,
    session: Session,

    outgoing: Vec<(SocketAddr, Vec<u8>)>,
    events: Vec<ClientEvent>,

    last_challenge: Option<Instant>,
    last_activity: Option<Instant>,
    last_transmit: Option<Instant>,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        hooks: Box<dyn ClientHooks>,
        assets: Box<dyn AssetStore>,
    ) -> Self {
        Self {
            config,
            hooks,
            assets,
            state: ConnectionState::Disconnected,
            server: None,
            networking: Networking::new(),
            channel: None,
            delta: Delta::new(),
            session: Session::default(),
            outgoing: Vec::new(),
            events: Vec::new(),
            last_challenge: None,
            last_activity: None,
            last_transmit: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state >= ConnectionState::Connected
    }

    pub fn server(&self) -> Option<SocketAddr> {
        self.server
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Starts the handshake with `addr`. A zero port means the default.
    pub fn connect(&mut self, mut addr: SocketAddr, now: Instant) -> Result<(), ClientError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }

        if addr.port() == 0 {
            addr.set_port(DEFAULT_PORT);
        }

        log::info!("Connecting to {}", addr);

        self.session = Session::default();
        self.server = Some(addr);
        self.state = ConnectionState::Challenging;
        self.send_challenge_request(now);
        Ok(())
    }

    /// Tears the session down and reports `reason`. Does nothing when
    /// already disconnected.
    pub fn disconnect(&mut self, reason: DisconnectReason) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        log::info!("Disconnected: {}", reason);

        self.reset();
        self.events.push(ClientEvent::Disconnected { reason });
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.server = None;
        self.channel = None;
        self.networking.clear();
        self.delta.clear();
        self.session = Session::default();
        self.last_challenge = None;
        self.last_activity = None;
        self.last_transmit = None;
    }

    fn fail(&mut self, error: ProtocolError) {
        log::warn!("Protocol error: {}", error);
        self.disconnect(DisconnectReason::Protocol(error.to_string()));
    }

    /// Feeds one inbound datagram.
    pub fn receive(&mut self, from: SocketAddr, data: &[u8], now: Instant) {
        let inbound = match self.networking.classify(data, now) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => return,
            Err(e) => {
                log::debug!("Dropped split packet from {}: {}", from, e);
                return;
            }
        };

        match inbound {
            Inbound::Connectionless(buf) => self.read_connectionless(from, buf, now),
            Inbound::Regular(data) => self.read_regular(from, &data, now),
        }
    }

    fn read_regular(&mut self, from: SocketAddr, data: &[u8], now: Instant) {
        if self.state < ConnectionState::Connected || self.server != Some(from) {
            log::trace!("Ignored in-channel packet from {}", from);
            return;
        }

        let Some(channel) = self.channel.as_mut() else {
            return;
        };

        let deliveries = match channel.process(data, now) {
            Ok(Some(deliveries)) => deliveries,
            Ok(None) => return,
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };

        self.last_activity = Some(now);

        for delivery in deliveries {
            let result = match delivery {
                Delivery::Messages(mut buf) => self.read_messages(&mut buf),
                Delivery::File { name, data } => {
                    self.receive_file(&name, &data);
                    Ok(())
                }
            };

            if let Err(e) = result {
                self.fail(e);
                return;
            }

            if self.state == ConnectionState::Disconnected {
                return;
            }
        }
    }

    fn receive_file(&mut self, name: &str, data: &[u8]) {
        let path = format!("{}/{}", self.session.info.game_dir, name);
        if let Err(e) = self.assets.write(&path, data) {
            log::warn!("Failed to store {}: {}", path, e);
        }

        self.session.resources.complete(name);

        log::info!(
            "Received {} ({} bytes, {} left)",
            name,
            data.len(),
            self.session.resources.download_queue().len()
        );

        self.events.push(ClientEvent::FileReceived {
            name: name.to_string(),
            size: data.len(),
        });
    }

    /// Builds and queues the next in-channel datagram.
    pub fn transmit(&mut self, now: Instant) {
        if self.state < ConnectionState::Connected {
            return;
        }

        let Some(sequence) = self.channel.as_ref().map(Channel::next_sequence) else {
            return;
        };

        let payload = match self.write_messages(sequence) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        if let Some(channel) = self.channel.as_mut() {
            let data = channel.transmit(&payload, now);
            self.outgoing.push((channel.address(), data));
        }
    }

    /// Handshake retries and the inactivity timeout.
    pub fn frame(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Challenging => {
                let due = self
                    .last_challenge
                    .is_none_or(|last| now.saturating_duration_since(last) >= self.config.challenge_retry());
                if due {
                    log::debug!("Retrying challenge request");
                    self.send_challenge_request(now);
                }
            }
            _ => {
                let idle = self
                    .last_activity
                    .map(|last| now.saturating_duration_since(last))
                    .unwrap_or_default();
                if idle >= self.config.timeout() {
                    log::warn!("Server timed out after {:?}", idle);
                    self.disconnect(DisconnectReason::TimedOut);
                }
            }
        }
    }

    /// Runs `frame` and, on the configured interval, `transmit`.
    pub fn update(&mut self, now: Instant) {
        self.frame(now);

        let due = self
            .last_transmit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.transmit_interval());
        if due && self.state >= ConnectionState::Connected {
            self.transmit(now);
            self.last_transmit = Some(now);
        }
    }

    /// Sends every queued datagram through `transport`.
    pub fn flush(&mut self, transport: &mut impl Transport) -> io::Result<usize> {
        let mut sent = 0;
        for (addr, data) in self.outgoing.drain(..) {
            transport.send(addr, &data)?;
            sent += 1;
        }
        Ok(sent)
    }

    pub fn drain_outgoing(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Queues a reliable console command for the server.
    pub fn send_command(&mut self, command: &str) -> Result<(), ClientError> {
        if self.state < ConnectionState::Connected {
            return Err(ClientError::InvalidState {
                operation: "send a command",
                state: self.state,
            });
        }
        self.queue_command(command);
        Ok(())
    }

    fn queue_command(&mut self, command: &str) {
        let Some(channel) = self.channel.as_mut() else {
            log::warn!("Cannot send {:?}, not connected", command);
            return;
        };

        let mut buf = BitBuffer::with_capacity(command.len() + 2);
        buf.write_u8(ClientMessage::StringCmd as u8);
        buf.write_string(command);
        channel.push_reliable(buf.into_bytes());

        log::debug!("Forward {:?}", command);
    }

    /// Changes a user-info value. Takes effect on the next connect.
    pub fn set_user_info(&mut self, key: &str, value: &str) {
        self.config.set_user_info(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use std::time::Duration;

    fn client() -> Client {
        Client::new(
            ClientConfig::default(),
            Box::new(NoHooks),
            Box::new(MemoryAssets::new()),
        )
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:27015".parse().unwrap()
    }

    #[test]
    fn test_connect_requires_disconnected() {
        let mut client = client();
        let now = Instant::now();
        client.connect(addr(), now).unwrap();
        assert_eq!(client.state(), ConnectionState::Challenging);
        assert!(matches!(
            client.connect(addr(), now),
            Err(ClientError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_connect_fills_default_port() {
        let mut client = client();
        client
            .connect("127.0.0.1:0".parse().unwrap(), Instant::now())
            .unwrap();
        assert_eq!(client.server().unwrap().port(), DEFAULT_PORT);
    }

    #[test]
    fn test_challenge_retried_on_interval() {
        let mut client = client();
        let start = Instant::now();
        client.connect(addr(), start).unwrap();
        assert_eq!(client.drain_outgoing().len(), 1);

        client.frame(start + Duration::from_millis(500));
        assert!(client.drain_outgoing().is_empty());

        client.frame(start + Duration::from_millis(2000));
        let sent = client.drain_outgoing();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.ends_with(b"getchallenge steam\0"));
    }

    #[test]
    fn test_send_command_requires_connection() {
        let mut client = client();
        assert!(client.send_command("status").is_err());
    }

    #[test]
    fn test_disconnect_when_idle_is_silent() {
        let mut client = client();
        client.disconnect(DisconnectReason::Requested);
        assert!(client.drain_events().is_empty());

        client.connect(addr(), Instant::now()).unwrap();
        client.disconnect(DisconnectReason::Requested);
        assert_eq!(
            client.drain_events(),
            vec![ClientEvent::Disconnected {
                reason: DisconnectReason::Requested
            }]
        );
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.server().is_none());
    }
}

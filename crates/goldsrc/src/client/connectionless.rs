use std::net::SocketAddr;
use std::time::Instant;

use crate::net::protocol::{PROTOCOL_VERSION, ServerPacket, info_string};
use crate::net::{BitBuffer, Channel, Networking};

use super::{Client, ClientEvent, ConnectionState, DisconnectReason};

impl Client {
    pub(super) fn send_challenge_request(&mut self, now: Instant) {
        if let Some(server) = self.server {
            self.send_connectionless(server, b"getchallenge steam\0");
            self.last_challenge = Some(now);
        }
    }

    fn send_connectionless(&mut self, addr: SocketAddr, payload: &[u8]) {
        self.outgoing.push((addr, Networking::connectionless(payload)));
    }

    pub(super) fn read_connectionless(&mut self, from: SocketAddr, mut buf: BitBuffer, now: Instant) {
        let Ok(op) = buf.read_u8() else {
            return;
        };

        let result = match ServerPacket::from_byte(op) {
            Some(ServerPacket::Print) => buf.read_string().map(|text| {
                log::info!("{}: {}", from, text.trim_end());
                self.events.push(ClientEvent::Print { text });
            }),
            Some(ServerPacket::Challenge) => buf
                .read_string()
                .map(|text| self.handle_challenge(from, &text, now)),
            Some(ServerPacket::Accepted) => {
                self.handle_connection_accepted(from, now);
                Ok(())
            }
            Some(ServerPacket::Reject) => buf
                .read_string()
                .map(|reason| self.handle_connection_denied(from, &reason)),
            Some(other) => {
                log::debug!("Ignored {:?} packet from {}", other, from);
                Ok(())
            }
            None => {
                log::trace!("Unknown connectionless op {:#x} from {}", op, from);
                Ok(())
            }
        };

        if let Err(e) = result {
            log::debug!("Malformed connectionless packet from {}: {}", from, e);
        }
    }

    fn handle_challenge(&mut self, from: SocketAddr, text: &str, now: Instant) {
        if self.state != ConnectionState::Challenging || self.server != Some(from) {
            return;
        }

        let Some(challenge) = text.split_whitespace().nth(1) else {
            log::warn!("Challenge reply without a token: {:?}", text);
            return;
        };

        log::debug!("Received challenge {} from {}", challenge, from);

        let request = format!(
            "connect {} {} \"{}\" \"{}\"",
            PROTOCOL_VERSION,
            challenge,
            info_string(&self.config.prot_info),
            info_string(&self.config.user_info)
        );

        let mut payload = BitBuffer::with_capacity(request.len() + 1 + self.config.certificate.len());
        payload.write_string(&request);
        payload.write_bytes(&self.config.certificate);
        self.send_connectionless(from, payload.as_bytes());

        self.state = ConnectionState::Connecting;
        self.last_activity = Some(now);
    }

    fn handle_connection_accepted(&mut self, from: SocketAddr, now: Instant) {
        if self.state != ConnectionState::Connecting || self.server != Some(from) {
            return;
        }

        log::info!("Connection accepted by {}", from);

        self.channel = Some(Channel::new(from, self.config.channel_config(), now));
        self.state = ConnectionState::Connected;
        self.last_activity = Some(now);
        self.queue_command("new");
    }

    fn handle_connection_denied(&mut self, from: SocketAddr, reason: &str) {
        if self.server != Some(from) {
            return;
        }

        let reason = reason.trim_end().to_string();
        log::warn!("Connection rejected: {}", reason);
        self.disconnect(DisconnectReason::Rejected(reason));
    }
}

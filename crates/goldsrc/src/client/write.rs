use crate::delta::UserCmd;
use crate::net::BitBuffer;
use crate::net::encoder::{block_sequence_crc_byte, munge, munge2_i32};
use crate::net::protocol::ClientMessage;

use super::{Client, ProtocolError};

/// Opcode, size, checksum.
const MOVE_PREFIX: usize = 3;

impl Client {
    /// Unreliable part of the datagram that will carry `sequence`.
    pub(super) fn write_messages(&mut self, sequence: u32) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = BitBuffer::new();

        if self.session.resources.finish_verification() {
            self.write_spawn(&mut buf)?;
        }

        if self.session.signon == 2 {
            if !self.config.hltv {
                self.write_move(&mut buf, sequence)?;
            }
            self.write_delta(&mut buf);
        }

        Ok(buf.into_bytes())
    }

    /// Consistency reply and spawn request, sent once the last download
    /// has landed.
    fn write_spawn(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        if self.session.resources.confirmation_required() {
            self.session.resources.write_file_consistency(
                buf,
                &self.session.info.game_dir,
                self.assets.as_ref(),
            );
        } else {
            log::debug!("Resource confirmation not required");
        }

        let spawn_count = self.session.info.spawn_count;
        let crc = munge2_i32(
            self.session.info.map_crc,
            ((-1 - spawn_count) & 0xFF) as u32,
        );
        self.queue_command(&format!("spawn {} {}", spawn_count, crc));

        if let Some(channel) = self.channel.as_mut() {
            channel.create_fragments()?;
        }
        Ok(())
    }

    fn write_move(&mut self, buf: &mut BitBuffer, sequence: u32) -> Result<(), ProtocolError> {
        let start = buf.len();

        buf.write_u8(ClientMessage::Move as u8);
        buf.write_u8(0); // size
        buf.write_u8(0); // checksum
        buf.write_u8(0); // loss flags
        buf.write_u8(0); // backup count
        buf.write_u8(1); // command count

        let mut cmd = UserCmd::default();
        self.hooks.think(&mut cmd);
        self.delta
            .write_user_cmd(buf, &cmd, &self.session.last_cmd)?;
        buf.pad_to_byte();

        let bytes = buf.as_bytes_mut();
        let body = start + MOVE_PREFIX;
        let size = bytes.len() - body;
        let checksum = block_sequence_crc_byte(&bytes[body..], sequence);
        bytes[start + 1] = size as u8;
        bytes[start + 2] = checksum;
        munge(&mut bytes[body..], sequence);

        self.session.last_cmd = cmd;
        Ok(())
    }

    fn write_delta(&self, buf: &mut BitBuffer) {
        buf.write_u8(ClientMessage::Delta as u8);
        buf.write_u8(self.session.delta_sequence);
    }
}

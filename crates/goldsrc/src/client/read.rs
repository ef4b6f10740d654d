use glam::Vec3;

use crate::delta::{Entity, EntityShape, EventArgs};
use crate::net::BitBuffer;
use crate::net::protocol::{
    ATTENUATION_NORMAL, ClientMessage, Customization, GAME_MESSAGE_BASE, GameEvent, GameMessage,
    MAX_ENTITIES, MAX_ENTITY_INDEX_BITS, MoveVars, PITCH_NORMAL, Resource, ResourceFlags,
    ResourceType, ServerMessage, Sound, SoundFlags, StaticSound, TE_BSPDECAL, TE_TEXTMESSAGE,
    TempEntityLength, VARIABLE_GAME_MESSAGE_SIZE, VOLUME_NORMAL, info_value, temp_entity_length,
};

use super::{Client, ClientEvent, ConnectionState, DisconnectReason, ProtocolError, Session};

const BASELINE_TERMINATOR: u32 = 0xFFFF;
const PACKET_ENTITIES_TERMINATOR: u32 = 0;
const ENTITY_TYPE_BEAM: u32 = 2;
const EVENT_INDEX_BITS: u32 = 10;
const WEAPON_INDEX_BITS: u32 = 6;

impl Client {
    /// Dispatches every message in `buf`. Stops at the first error or when a
    /// message ends the session.
    pub(super) fn read_messages(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        while buf.has_remaining() {
            let opcode = buf.read_u8()?;

            if opcode >= GAME_MESSAGE_BASE {
                self.read_game_message(buf, opcode)?;
                continue;
            }

            let message =
                ServerMessage::from_opcode(opcode).ok_or(ProtocolError::UnknownOpcode(opcode))?;
            log::trace!("Message {:?}", message);

            match message {
                ServerMessage::Nop
                | ServerMessage::Choke
                | ServerMessage::KilledMonster
                | ServerMessage::FoundSecret
                | ServerMessage::Intermission => {}
                ServerMessage::Disconnect => {
                    let reason = buf.read_string()?;
                    self.disconnect(DisconnectReason::Server(reason.trim_end().to_string()));
                }
                ServerMessage::Event => self.read_events(buf)?,
                ServerMessage::Version => {
                    let version = buf.read_i32()?;
                    log::debug!("Server version {}", version);
                }
                ServerMessage::SetView => self.session.view_entity = buf.read_i16()?,
                ServerMessage::Sound => self.read_sound(buf)?,
                ServerMessage::Time => self.session.time = buf.read_f32()?,
                ServerMessage::Print => {
                    let text = buf.read_string()?;
                    log::info!("{}", text.trim_end());
                    self.events.push(ClientEvent::Print { text });
                }
                ServerMessage::StuffText => {
                    let text = buf.read_string()?;
                    self.read_stuff_text(&text);
                }
                ServerMessage::SetAngle => {
                    self.session.view_angles = Vec3::new(
                        buf.read_hires_angle()?,
                        buf.read_hires_angle()?,
                        buf.read_hires_angle()?,
                    );
                }
                ServerMessage::ServerInfo => self.read_server_info(buf)?,
                ServerMessage::LightStyle => {
                    let index = buf.read_u8()?;
                    let pattern = buf.read_string()?;
                    self.session.light_styles.insert(index, pattern.clone());
                    self.events.push(ClientEvent::LightStyle { index, pattern });
                }
                ServerMessage::UpdateUserInfo => {
                    let index = buf.read_u8()?;
                    let player = self.session.players.entry(index).or_default();
                    player.user_id = buf.read_i32()?;
                    player.info = buf.read_string()?;
                    player.hash = buf.read_array::<16>()?;
                    log::debug!(
                        "Player {} is {:?}",
                        index,
                        info_value(&player.info, "name").unwrap_or("")
                    );
                }
                ServerMessage::DeltaDescription => {
                    let name = buf.read_string()?;
                    let count = buf.read_bits(16)? as usize;
                    self.delta.learn(buf, &name, count)?;
                    buf.align();
                }
                ServerMessage::ClientData => self.read_client_data(buf)?,
                ServerMessage::StopSound => {
                    let packed = buf.read_i16()?;
                    log::trace!("Stop sound on entity {} channel {}", packed >> 3, packed & 7);
                }
                ServerMessage::Pings => self.read_pings(buf)?,
                ServerMessage::Particle => {
                    buf.skip(3 * 2 + 3 + 2)?;
                }
                ServerMessage::EventReliable => self.read_event_reliable(buf)?,
                ServerMessage::SpawnBaseline => self.read_spawn_baseline(buf)?,
                ServerMessage::TempEntity => self.read_temp_entity(buf)?,
                ServerMessage::SetPause => self.session.paused = buf.read_u8()? != 0,
                ServerMessage::SignonNum => {
                    self.session.signon = buf.read_u8()?;
                    log::debug!("Signon {}", self.session.signon);
                    if self.session.signon == 1 {
                        self.queue_command("sendents");
                    }
                }
                ServerMessage::CenterPrint => {
                    let text = buf.read_string()?;
                    self.events.push(ClientEvent::CenterPrint { text });
                }
                ServerMessage::SpawnStaticSound => self.read_static_sound(buf)?,
                ServerMessage::Finale | ServerMessage::Cutscene => {
                    let text = buf.read_string()?;
                    log::debug!("{:?}: {}", message, text);
                }
                ServerMessage::CdTrack | ServerMessage::WeaponAnim => {
                    let first = buf.read_u8()?;
                    let second = buf.read_u8()?;
                    log::trace!("{:?} {} {}", message, first, second);
                }
                ServerMessage::DecalName => {
                    let index = buf.read_u8()?;
                    let name = buf.read_string()?;
                    log::debug!("Decal {} is {}", index, name);
                }
                ServerMessage::RoomType => {
                    let room = buf.read_i16()?;
                    log::trace!("Room type {}", room);
                }
                ServerMessage::AddAngle => {
                    self.session.view_angles.y += buf.read_hires_angle()?;
                }
                ServerMessage::NewUserMsg => {
                    let index = buf.read_u8()?;
                    let size = buf.read_u8()?;
                    let name = buf.read_fixed_string(16)?;
                    log::trace!("Game message {} registered as {}", index, name);
                    self.session
                        .game_messages
                        .insert(index, GameMessage { name, size });
                }
                ServerMessage::PacketEntities => self.read_packet_entities(buf, false)?,
                ServerMessage::DeltaPacketEntities => self.read_packet_entities(buf, true)?,
                ServerMessage::ResourceList => {
                    let spawn_count = self.session.info.spawn_count;
                    self.session.resources.read_list(buf, spawn_count)?;
                    self.verify_resources()?;
                }
                ServerMessage::NewMoveVars => self.session.move_vars = read_move_vars(buf)?,
                ServerMessage::ResourceRequest => self.read_resource_request(buf)?,
                ServerMessage::Customization => {
                    let customization = read_customization(buf)?;
                    log::debug!(
                        "Player {} customization {}",
                        customization.player,
                        customization.resource.name
                    );
                    self.session.customizations.push(customization);
                }
                ServerMessage::CrosshairAngle => {
                    let pitch = buf.read_i8()? as f32 / 5.0;
                    let yaw = buf.read_i8()? as f32 / 5.0;
                    log::trace!("Crosshair angle {} {}", pitch, yaw);
                }
                ServerMessage::SoundFade => {
                    buf.skip(4)?;
                }
                ServerMessage::FileTransferFailed => {
                    let name = buf.read_string()?;
                    log::warn!("Failed to download {}", name);
                    self.session.resources.complete(&name);
                    self.events.push(ClientEvent::FileTransferFailed { name });
                }
                ServerMessage::Hltv => log::warn!("Relay control message received"),
                ServerMessage::Director => {
                    let len = buf.read_u8()? as usize;
                    buf.skip(len)?;
                }
                ServerMessage::VoiceInit => {
                    let codec = buf.read_string()?;
                    let quality = buf.read_u8()?;
                    log::debug!("Voice codec {} quality {}", codec, quality);
                }
                ServerMessage::VoiceData => {
                    let _player = buf.read_u8()?;
                    let len = buf.read_u16()? as usize;
                    buf.skip(len)?;
                }
                ServerMessage::SendExtraInfo => {
                    self.session.fallback_dir = buf.read_string()?;
                    let _allow_cheats = buf.read_u8()?;
                }
                ServerMessage::TimeScale => self.session.time_scale = buf.read_f32()?,
                ServerMessage::ResourceLocation => {
                    self.session.download_url = buf.read_string()?;
                }
                ServerMessage::SendCvarValue => {
                    let name = buf.read_string()?;
                    self.reply_cvar_value(None, &name);
                }
                ServerMessage::SendCvarValue2 => {
                    let request = buf.read_u32()?;
                    let name = buf.read_string()?;
                    self.reply_cvar_value(Some(request), &name);
                }
                ServerMessage::Bad
                | ServerMessage::Damage
                | ServerMessage::SpawnStatic
                | ServerMessage::Restore => return Err(ProtocolError::UnknownOpcode(opcode)),
            }

            if self.state == ConnectionState::Disconnected {
                break;
            }
        }

        Ok(())
    }

    fn read_game_message(&mut self, buf: &mut BitBuffer, opcode: u8) -> Result<(), ProtocolError> {
        let message = self
            .session
            .game_messages
            .get(&opcode)
            .ok_or(ProtocolError::UnregisteredGameMessage(opcode))?;

        let size = match message.size {
            VARIABLE_GAME_MESSAGE_SIZE => buf.read_u8()?,
            size => size,
        };
        let name = message.name.clone();
        let data = buf.read_bytes(size as usize)?;

        log::trace!("Game message {} ({} bytes)", name, data.len());
        self.events.push(ClientEvent::GameMessage { name, data });
        Ok(())
    }

    fn read_server_info(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        self.session = Session::default();
        let info = &mut self.session.info;

        info.protocol = buf.read_i32()?;
        info.spawn_count = buf.read_i32()?;
        let map_crc = buf.read_i32()?;
        info.client_dll_hash = buf.read_array::<16>()?;
        info.max_players = buf.read_u8()?;
        info.player_index = buf.read_u8()?;
        info.map_crc = crate::net::encoder::unmunge3_i32(
            map_crc,
            ((-1 - info.player_index as i32) & 0xFF) as u32,
        );
        info.deathmatch = buf.read_u8()? != 0;
        info.game_dir = buf.read_string()?;
        info.hostname = buf.read_string()?;
        info.map = buf.read_string()?;
        info.map_list = buf.read_string()?;
        buf.skip(1)?;

        if info.protocol != crate::net::protocol::PROTOCOL_VERSION as i32 {
            log::warn!("Server speaks protocol {}", info.protocol);
        }

        log::info!(
            "Server info: {} on {} ({}, {} players)",
            info.hostname,
            info.map,
            info.game_dir,
            info.max_players
        );

        self.events.push(ClientEvent::GameInitialized);
        self.queue_command("sendres");
        Ok(())
    }

    fn read_stuff_text(&mut self, text: &str) {
        for command in split_commands(text) {
            let name = command
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_lowercase();
            if name.is_empty() {
                continue;
            }

            if name == "reconnect" {
                self.reconnect();
            } else if !self.hooks.execute(command) {
                self.queue_command(command);
            }
        }
    }

    /// Restarts the signon sequence on the existing channel.
    fn reconnect(&mut self) {
        log::info!("Reconnecting");
        self.session = Session::default();
        self.state = ConnectionState::Connected;
        self.queue_command("new");
    }

    fn read_events(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        let count = buf.read_bits(5)?;

        for _ in 0..count {
            let mut event = GameEvent {
                index: buf.read_bits(EVENT_INDEX_BITS)? as u16,
                ..Default::default()
            };

            if buf.read_bit()? {
                event.packet_index = Some(buf.read_bits(MAX_ENTITY_INDEX_BITS)? as u16);
                if buf.read_bit()? {
                    let mut args = EventArgs::default();
                    self.delta.read_event(buf, &mut args)?;
                    event.args = Some(args);
                }
            }

            if buf.read_bit()? {
                event.fire_time = buf.read_bits(16)? as f32 / 100.0;
            }

            self.events.push(ClientEvent::Event(event));
        }

        buf.align();
        Ok(())
    }

    fn read_event_reliable(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        let index = buf.read_bits(EVENT_INDEX_BITS)? as u16;
        let mut args = EventArgs::default();
        self.delta.read_event(buf, &mut args)?;

        let fire_time = if buf.read_bit()? {
            buf.read_bits(16)? as f32 / 100.0
        } else {
            0.0
        };
        buf.align();

        self.events.push(ClientEvent::Event(GameEvent {
            index,
            packet_index: None,
            args: Some(args),
            fire_time,
            reliable: true,
        }));
        Ok(())
    }

    fn read_sound(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        let flags = SoundFlags::from_bits_retain(buf.read_bits(9)?);

        let volume = if flags.contains(SoundFlags::VOLUME) {
            buf.read_bits(8)? as u8
        } else {
            VOLUME_NORMAL
        };
        let attenuation = if flags.contains(SoundFlags::ATTENUATION) {
            buf.read_bits(8)? as f32 / 64.0
        } else {
            ATTENUATION_NORMAL
        };

        let channel = buf.read_bits(3)? as u8;
        let entity = buf.read_bits(MAX_ENTITY_INDEX_BITS)? as u16;
        let index = if flags.contains(SoundFlags::LONG_INDEX) {
            buf.read_bits(16)? as u16
        } else {
            buf.read_bits(8)? as u16
        };
        let origin = buf.read_bit_vec3()?;
        let pitch = if flags.contains(SoundFlags::PITCH) {
            buf.read_bits(8)? as u8
        } else {
            PITCH_NORMAL
        };
        buf.align();

        self.events.push(ClientEvent::Sound(Sound {
            flags,
            volume,
            attenuation,
            channel,
            entity,
            index,
            origin,
            pitch,
        }));
        Ok(())
    }

    fn read_static_sound(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        let origin = Vec3::new(buf.read_coord()?, buf.read_coord()?, buf.read_coord()?);
        let sound = StaticSound {
            origin,
            index: buf.read_i16()? as u16,
            volume: buf.read_u8()?,
            attenuation: buf.read_u8()?,
            entity: buf.read_i16()? as u16,
            pitch: buf.read_u8()?,
            flags: buf.read_u8()?,
        };
        self.events.push(ClientEvent::StaticSound(sound));
        Ok(())
    }

    fn read_client_data(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        if self.config.hltv {
            return Ok(());
        }

        if buf.read_bit()? {
            let _delta_sequence = buf.read_u8()?;
        }

        self.delta
            .read_client_data(buf, &mut self.session.client_data)?;

        while buf.read_bit()? {
            let index = buf.read_bits(WEAPON_INDEX_BITS)? as u8;
            let weapon = self.session.weapons.entry(index).or_default();
            self.delta.read_weapon_data(buf, weapon)?;
        }

        buf.align();
        Ok(())
    }

    fn read_pings(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        while buf.read_bit()? {
            let index = buf.read_bits(5)? as u8;
            let player = self.session.players.entry(index).or_default();
            player.ping = buf.read_bits(12)? as u16;
            player.loss = buf.read_bits(7)? as u8;
        }
        buf.align();
        Ok(())
    }

    fn read_spawn_baseline(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        let entities = &mut self.session.entities;

        while buf.peek_bits(16)? != BASELINE_TERMINATOR {
            let index = buf.read_bits(MAX_ENTITY_INDEX_BITS)? as u16;
            let shape = if buf.read_bits(2)? & ENTITY_TYPE_BEAM != 0 {
                EntityShape::Custom
            } else if self.session.info.max_players as u16 >= index && index >= 1 {
                EntityShape::Player
            } else {
                EntityShape::Normal
            };
            self.delta
                .read_entity(buf, shape, entities.baseline_mut(index))?;
        }
        buf.read_bits(16)?;

        let extra_count = buf.read_bits(6)? as usize;
        let mut extras = Vec::with_capacity(extra_count);
        for _ in 0..extra_count {
            let mut extra = Entity::default();
            self.delta.read_entity(buf, EntityShape::Normal, &mut extra)?;
            extras.push(extra);
        }
        buf.align();

        log::debug!(
            "{} baselines, {} extra baselines",
            entities.baselines_len(),
            extras.len()
        );

        entities.set_extra_baselines(extras);
        entities.seed_from_baselines();
        Ok(())
    }

    fn read_packet_entities(&mut self, buf: &mut BitBuffer, delta: bool) -> Result<(), ProtocolError> {
        if self.session.signon == 1 {
            self.session.signon = 2;
            self.state = ConnectionState::GameStarted;
            if self.config.hltv {
                self.queue_command("spectate");
            }
            log::info!("Game started");
            self.events.push(ClientEvent::GameStarted);
        }

        let count = buf.read_u16()? as usize;
        let mut index = 0u16;

        if delta {
            let _from = buf.read_u8()?;
            if let Some(channel) = &self.channel {
                self.session.delta_sequence = (channel.incoming_sequence() & 0xFF) as u8;
            }

            while buf.peek_bits(16)? != PACKET_ENTITIES_TERMINATOR {
                let remove = buf.read_bit()?;
                index = read_entity_index(buf, index)?;

                if remove {
                    if !self.session.entities.remove(index) {
                        log::warn!("Removal of missing entity {}", index);
                    }
                    continue;
                }

                self.read_entity_update(buf, index, false)?;
            }
            buf.read_bits(16)?;

            if self.session.entities.len() != count {
                log::debug!(
                    "Entity count mismatch: have {}, server has {}",
                    self.session.entities.len(),
                    count
                );
            }
        } else {
            self.session.entities.clear_live();

            for _ in 0..count {
                index = if buf.read_bit()? {
                    checked_entity_index(index as u32 + 1)?
                } else {
                    read_entity_index(buf, index)?
                };
                self.read_entity_update(buf, index, true)?;
            }
            buf.read_bits(16)?;
        }

        buf.align();
        Ok(())
    }

    /// One upsert record: shape bit, optional baseline selector, then the
    /// delta against the entity's current state.
    fn read_entity_update(
        &mut self,
        buf: &mut BitBuffer,
        index: u16,
        full: bool,
    ) -> Result<(), ProtocolError> {
        let entities = &mut self.session.entities;
        entities.activate(index);

        let custom = buf.read_bit()?;

        if entities.extra_baselines_len() > 0 && buf.read_bit()? {
            let extra = buf.read_bits(6)? as usize;
            let baseline = entities
                .extra_baseline(extra)
                .cloned()
                .ok_or(ProtocolError::MissingExtraBaseline {
                    entity: index,
                    baseline: extra,
                })?;
            log::trace!("Entity {} from extra baseline {}", index, extra);
            *entities.state_mut(index) = baseline;
        } else if full && buf.read_bit()? {
            let base = buf.read_bits(6)? as u16;
            let baseline = entities
                .baseline(base)
                .cloned()
                .ok_or(ProtocolError::MissingBaseline {
                    entity: index,
                    baseline: base,
                })?;
            log::trace!("Entity {} from baseline {}", index, base);
            *entities.state_mut(index) = baseline;
        }

        let shape = if custom {
            EntityShape::Custom
        } else if self.session.is_player_index(index) {
            EntityShape::Player
        } else {
            EntityShape::Normal
        };

        self.delta
            .read_entity(buf, shape, self.session.entities.state_mut(index))?;
        Ok(())
    }

    fn read_temp_entity(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        let kind = buf.read_u8()?;
        let start = buf.position();

        match temp_entity_length(kind).ok_or(ProtocolError::UnknownTempEntity(kind))? {
            TempEntityLength::Fixed(len) => buf.skip(len)?,
            TempEntityLength::Variable if kind == TE_BSPDECAL => {
                buf.skip(8)?;
                if buf.read_u16()? != 0 {
                    buf.skip(2)?;
                }
            }
            TempEntityLength::Variable if kind == TE_TEXTMESSAGE => {
                buf.skip(5)?;
                if buf.read_u8()? == 2 {
                    buf.skip(2)?;
                }
                buf.skip(14)?;
                buf.read_string()?;
            }
            TempEntityLength::Variable => return Err(ProtocolError::UnknownTempEntity(kind)),
        }

        let data = buf.as_bytes()[start..buf.position()].to_vec();
        self.events.push(ClientEvent::TempEntity { kind, data });
        Ok(())
    }

    fn read_resource_request(&mut self, buf: &mut BitBuffer) -> Result<(), ProtocolError> {
        let spawn_count = buf.read_i32()?;
        let _range = buf.read_i32()?;

        if spawn_count != self.session.info.spawn_count {
            log::warn!(
                "Resource request for spawn {}, we are at {}",
                spawn_count,
                self.session.info.spawn_count
            );
            return Ok(());
        }

        if let Some(channel) = self.channel.as_mut() {
            let mut reply = BitBuffer::with_capacity(3);
            reply.write_u8(ClientMessage::ResourceList as u8);
            reply.write_u16(0);
            channel.push_reliable(reply.into_bytes());
        }
        Ok(())
    }

    fn reply_cvar_value(&mut self, request: Option<u32>, name: &str) {
        let value = self
            .config
            .user_info
            .get(name)
            .cloned()
            .unwrap_or_else(|| "Bad CVAR request".to_string());
        log::debug!("Cvar query {} -> {}", name, value);

        let Some(channel) = self.channel.as_mut() else {
            return;
        };

        let mut reply = BitBuffer::new();
        match request {
            Some(id) => {
                reply.write_u8(ClientMessage::CvarValue2 as u8);
                reply.write_u32(id);
                reply.write_string(name);
            }
            None => reply.write_u8(ClientMessage::CvarValue as u8),
        }
        reply.write_string(&value);
        channel.push_reliable(reply.into_bytes());
    }

    /// Queues downloads for missing resources and ships the commands as one
    /// fragmented transfer when they do not fit a datagram.
    pub(super) fn verify_resources(&mut self) -> Result<(), ProtocolError> {
        let queued = self.session.resources.verify(
            &self.session.info.game_dir,
            &self.config.fallback_game_dir,
            self.assets.as_ref(),
            self.hooks.as_mut(),
        );

        for name in queued {
            self.queue_command(&format!("dlfile {}", name));
        }

        if let Some(channel) = self.channel.as_mut() {
            channel.create_fragments()?;
        }
        Ok(())
    }
}

/// Absolute 11-bit index, or a 6-bit step from `previous`.
fn read_entity_index(buf: &mut BitBuffer, previous: u16) -> Result<u16, ProtocolError> {
    let index = if buf.read_bit()? {
        buf.read_bits(MAX_ENTITY_INDEX_BITS)?
    } else {
        previous as u32 + buf.read_bits(6)?
    };
    checked_entity_index(index)
}

fn checked_entity_index(index: u32) -> Result<u16, ProtocolError> {
    if index >= MAX_ENTITIES {
        return Err(ProtocolError::EntityIndexOutOfRange(index));
    }
    Ok(index as u16)
}

/// Splits console text on `;` and newlines outside quotes.
fn split_commands(text: &str) -> Vec<&str> {
    let mut commands = Vec::new();
    let mut quoted = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' | '\n' if !quoted => {
                commands.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    commands.push(text[start..].trim());

    commands.retain(|c| !c.is_empty());
    commands
}

fn read_move_vars(buf: &mut BitBuffer) -> Result<MoveVars, ProtocolError> {
    let mut vars = MoveVars {
        gravity: buf.read_f32()?,
        stop_speed: buf.read_f32()?,
        max_speed: buf.read_f32()?,
        spectator_max_speed: buf.read_f32()?,
        accelerate: buf.read_f32()?,
        air_accelerate: buf.read_f32()?,
        water_accelerate: buf.read_f32()?,
        friction: buf.read_f32()?,
        edge_friction: buf.read_f32()?,
        water_friction: buf.read_f32()?,
        ent_gravity: buf.read_f32()?,
        bounce: buf.read_f32()?,
        step_size: buf.read_f32()?,
        max_velocity: buf.read_f32()?,
        z_max: buf.read_f32()?,
        wave_height: buf.read_f32()?,
        footsteps: buf.read_u8()? != 0,
        roll_angle: buf.read_f32()?,
        roll_speed: buf.read_f32()?,
        ..Default::default()
    };
    vars.sky_color = Vec3::new(buf.read_f32()?, buf.read_f32()?, buf.read_f32()?);
    vars.sky_vec = Vec3::new(buf.read_f32()?, buf.read_f32()?, buf.read_f32()?);
    vars.sky_name = buf.read_string()?;
    Ok(vars)
}

fn read_customization(buf: &mut BitBuffer) -> Result<Customization, ProtocolError> {
    let player = buf.read_u8()?;
    let kind = ResourceType::from_wire(buf.read_u8()?);
    let name = buf.read_string()?;
    let index = buf.read_u16()?;
    let size = buf.read_u32()?;
    let flags = ResourceFlags::from_bits_retain(buf.read_u8()? as u32);
    let hash = if flags.contains(ResourceFlags::CUSTOM) {
        Some(buf.read_array::<16>()?)
    } else {
        None
    };

    Ok(Customization {
        player,
        resource: Resource {
            kind,
            name,
            index,
            size,
            flags,
            hash,
            reserved: 0,
        },
    })
}

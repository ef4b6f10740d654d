use md5::{Digest, Md5};

use crate::assets::AssetStore;
use crate::net::encoder::unmunge;
use crate::net::protocol::{
    ClientMessage, MAX_RESOURCE_INDEX_BITS, Resource, ResourceFlags, ResourceType,
};
use crate::net::{BitBuffer, BufferError};

use super::hooks::ClientHooks;

/// Server resource list and the download bookkeeping built from it.
#[derive(Debug, Default)]
pub struct Resources {
    list: Vec<Resource>,
    confirmation_required: bool,
    download_queue: Vec<String>,
    verifying: bool,
    verified: bool,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn list(&self) -> &[Resource] {
        &self.list
    }

    pub fn confirmation_required(&self) -> bool {
        self.confirmation_required
    }

    pub fn download_queue(&self) -> &[String] {
        &self.download_queue
    }

    pub fn is_verifying(&self) -> bool {
        self.verifying
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Replaces the list with the one in `buf` and restarts verification.
    pub fn read_list(&mut self, buf: &mut BitBuffer, spawn_count: i32) -> Result<(), BufferError> {
        let count = buf.read_bits(MAX_RESOURCE_INDEX_BITS)? as usize;
        let mut list = Vec::with_capacity(count);

        for _ in 0..count {
            let kind = ResourceType::from_wire(buf.read_bits(4)? as u8);
            let name = buf.read_string()?;
            let index = buf.read_bits(MAX_RESOURCE_INDEX_BITS)? as u16;
            let size = buf.read_bits(24)?;
            let mut flags = ResourceFlags::from_bits_retain(buf.read_bits(3)?);

            let hash = if flags.contains(ResourceFlags::CUSTOM) {
                Some(buf.read_array::<16>()?)
            } else {
                None
            };

            let mut reserved = 0;
            if buf.read_bit()? {
                let mut bytes = buf.read_array::<4>()?;
                unmunge(&mut bytes, spawn_count as u32);
                reserved = u32::from_le_bytes(bytes);
                flags |= ResourceFlags::RESERVED;
            }

            list.push(Resource {
                kind,
                name,
                index,
                size,
                flags,
                hash,
                reserved,
            });
        }

        self.confirmation_required = buf.read_bit()?;
        if self.confirmation_required {
            let mut index = 0usize;
            while buf.read_bit()? {
                if buf.read_bit()? {
                    index += buf.read_bits(5)? as usize;
                } else {
                    index = buf.read_bits(10)? as usize;
                }

                match list.get_mut(index) {
                    Some(resource) => resource.flags |= ResourceFlags::CHECK_FILE,
                    None => log::warn!("Consistency index {} past {} resources", index, list.len()),
                }
            }
        }

        buf.align();

        for resource in &mut list {
            if resource.kind == ResourceType::Sound {
                resource.name = format!("sound/{}", resource.name);
            }
        }

        log::info!("{} resources received", list.len());

        self.list = list;
        self.verifying = true;
        self.verified = false;
        Ok(())
    }

    /// Queues every missing resource not already queued and returns the
    /// newly queued names.
    pub fn verify(
        &mut self,
        game_dir: &str,
        fallback_dir: &str,
        assets: &dyn AssetStore,
        hooks: &mut dyn ClientHooks,
    ) -> Vec<String> {
        let mut queued = Vec::new();

        for resource in &self.list {
            if !matches!(
                resource.kind,
                ResourceType::Model | ResourceType::Sound | ResourceType::Generic
            ) {
                continue;
            }

            if resource.kind == ResourceType::Model && resource.name.starts_with('*') {
                continue;
            }

            if self.download_queue.contains(&resource.name) {
                continue;
            }

            if !is_required(resource, game_dir, fallback_dir, assets, hooks) {
                continue;
            }

            log::debug!("Queued download of {}", resource.name);
            self.download_queue.push(resource.name.clone());
            queued.push(resource.name.clone());
        }

        queued
    }

    /// Drops `name` from the download queue.
    pub fn complete(&mut self, name: &str) -> bool {
        let before = self.download_queue.len();
        self.download_queue.retain(|queued| queued != name);
        before != self.download_queue.len()
    }

    /// Ends verification once nothing is left to download. Returns `true`
    /// exactly once per resource list.
    pub fn finish_verification(&mut self) -> bool {
        if !self.verifying || !self.download_queue.is_empty() {
            return false;
        }
        self.verifying = false;
        self.verified = true;
        true
    }

    /// Writes the consistency reply for every checkfile resource and
    /// returns how many entries it holds.
    pub fn write_file_consistency(
        &self,
        buf: &mut BitBuffer,
        game_dir: &str,
        assets: &dyn AssetStore,
    ) -> usize {
        let start = buf.len();
        buf.write_u8(ClientMessage::FileConsistency as u8);
        buf.write_u16(0);

        let mut count = 0usize;
        for (position, resource) in self.list.iter().enumerate() {
            if !resource.flags.contains(ResourceFlags::CHECK_FILE) {
                continue;
            }

            buf.write_bit(true);
            buf.write_bits(position as u32, MAX_RESOURCE_INDEX_BITS);

            if resource.flags.contains(ResourceFlags::RESERVED) {
                buf.write_bits(resource.reserved >> 8, 24);
            } else {
                let path = format!("{}/{}", game_dir, resource.name);
                let hash = match assets.read(&path) {
                    Ok(data) => resource_hash(&data),
                    Err(e) => {
                        log::warn!("Cannot hash {}: {}", path, e);
                        0
                    }
                };
                buf.write_u32(hash);
            }
            count += 1;
        }

        buf.write_bit(false);
        buf.pad_to_byte();

        let bytes = buf.as_bytes_mut();
        bytes[start + 1..start + 3].copy_from_slice(&(count as u16).to_le_bytes());

        log::info!("{} resources confirmed", count);
        count
    }
}

/// Whether `resource` has to be downloaded before spawning.
pub fn is_required(
    resource: &Resource,
    game_dir: &str,
    fallback_dir: &str,
    assets: &dyn AssetStore,
    hooks: &mut dyn ClientHooks,
) -> bool {
    if assets.exists(&format!("{}/{}", game_dir, resource.name))
        || assets.exists(&format!("{}/{}", fallback_dir, resource.name))
    {
        return false;
    }

    if hooks.is_resource_required(resource) {
        return true;
    }

    // Reserved consistency values are answered without the file.
    resource.flags.contains(ResourceFlags::CHECK_FILE)
        && !resource.flags.contains(ResourceFlags::RESERVED)
}

/// First four bytes of the MD5 digest, little-endian.
pub fn resource_hash(data: &[u8]) -> u32 {
    let digest = Md5::digest(data);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

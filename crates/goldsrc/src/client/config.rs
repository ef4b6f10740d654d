use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::net::ChannelConfig;
use crate::net::fragment::FRAGMENT_EXPIRY;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_secs: u64,
    pub challenge_retry_ms: u64,
    pub transmit_interval_ms: u64,
    pub fragment_size: usize,
    pub compress_fragments: bool,
    pub reliable_budget: usize,
    /// Connect as a spectating relay instead of a player.
    pub hltv: bool,
    pub fallback_game_dir: String,
    pub user_info: BTreeMap<String, String>,
    pub prot_info: BTreeMap<String, String>,
    pub certificate: Vec<u8>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let user_info = [
            ("cl_dlmax", "512"),
            ("cl_lc", "1"),
            ("cl_lw", "1"),
            ("cl_updaterate", "101"),
            ("model", "gordon"),
            ("rate", "25000"),
            ("topcolor", "0"),
            ("bottomcolor", "0"),
            ("name", "Player"),
            ("password", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            timeout_secs: 30,
            challenge_retry_ms: 2000,
            transmit_interval_ms: 10,
            fragment_size: 512,
            compress_fragments: true,
            reliable_budget: 1024,
            hltv: false,
            fallback_game_dir: "valve".to_string(),
            user_info,
            prot_info: BTreeMap::new(),
            certificate: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Relay preset: spectator user-info, relay protocol info and no movement.
    pub fn hltv() -> Self {
        let mut config = Self::default();
        config.hltv = true;

        for (key, value) in [("*hltv", "1"), ("hspecs", "0"), ("hslots", "0"), ("hdelay", "30")] {
            config.user_info.insert(key.to_string(), value.to_string());
        }
        for (key, value) in [
            ("prot", "2"),
            ("unique", "-1"),
            ("raw", "861078331b85a424935805ca54f82891"),
        ] {
            config.prot_info.insert(key.to_string(), value.to_string());
        }

        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn challenge_retry(&self) -> Duration {
        Duration::from_millis(self.challenge_retry_ms)
    }

    pub fn transmit_interval(&self) -> Duration {
        Duration::from_millis(self.transmit_interval_ms)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            fragment_size: self.fragment_size,
            compress_fragments: self.compress_fragments,
            reliable_budget: self.reliable_budget,
            fragment_expiry: FRAGMENT_EXPIRY,
        }
    }

    pub fn set_user_info(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.user_info.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_info() {
        let config = ClientConfig::default();
        assert_eq!(config.user_info["name"], "Player");
        assert_eq!(config.user_info["rate"], "25000");
        assert_eq!(config.user_info["password"], "");
        assert!(config.prot_info.is_empty());
        assert!(!config.hltv);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_hltv_preset() {
        let config = ClientConfig::hltv();
        assert!(config.hltv);
        assert_eq!(config.user_info["*hltv"], "1");
        assert_eq!(config.prot_info["prot"], "2");
        assert_eq!(config.prot_info["unique"], "-1");
    }

    #[test]
    fn test_channel_config_follows_fields() {
        let config = ClientConfig {
            fragment_size: 128,
            compress_fragments: false,
            ..Default::default()
        };
        let channel = config.channel_config();
        assert_eq!(channel.fragment_size, 128);
        assert!(!channel.compress_fragments);
    }
}

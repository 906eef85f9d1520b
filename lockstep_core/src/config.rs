//! Configuration system.
//!
//! Loads lockstep configuration from JSON strings/files (file IO left to
//! the binary crates).

use serde::{Deserialize, Serialize};

/// Root configuration shared by `lockstep_client`/`lockstep_relay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockstepConfig {
    /// Relay listen/connect address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// A net-tick occurs every `net_tick_scale` local ticks.
    #[serde(default = "default_net_tick_scale")]
    pub net_tick_scale: u32,
    /// A sync hash is sent every `sync_frame_scale` net-frames.
    #[serde(default = "default_sync_frame_scale")]
    pub sync_frame_scale: u32,
    /// Advertised order latency, in net-frames, between issuing an order
    /// locally and it being scheduled for dispatch.
    #[serde(default = "default_order_latency")]
    pub order_latency: u32,
    /// Handshake password; empty means no password.
    #[serde(default)]
    pub password: String,
    /// Player name, used only for lobby/chat display.
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

fn default_net_tick_scale() -> u32 {
    1
}

fn default_sync_frame_scale() -> u32 {
    10
}

fn default_order_latency() -> u32 {
    2
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for LockstepConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            net_tick_scale: default_net_tick_scale(),
            sync_frame_scale: default_sync_frame_scale(),
            order_latency: default_order_latency(),
            password: String::new(),
            player_name: default_player_name(),
        }
    }
}

impl LockstepConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let config = LockstepConfig::from_json_str(r#"{"server_addr":"127.0.0.1:9000"}"#).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:9000");
        assert_eq!(config.net_tick_scale, 1);
        assert_eq!(config.sync_frame_scale, 10);
        assert_eq!(config.order_latency, 2);
        assert_eq!(config.password, "");
    }
}

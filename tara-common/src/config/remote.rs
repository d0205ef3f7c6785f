// tara-common/src/config/remote.rs

use serde::{Deserialize, Serialize};

/// Robot-side endpoint of remote teleoperation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub port_cmd: u16,
    pub port_observations: u16,
    /// Without a command for this long the robot is stopped.
    pub watchdog_timeout_ms: u64,
    pub max_loop_freq_hz: u32,
    /// Stop serving after this many seconds; runs until cancelled when unset.
    pub connection_time_s: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port_cmd: 6001,
            port_observations: 6002,
            watchdog_timeout_ms: 2000,
            max_loop_freq_hz: 20,
            connection_time_s: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub remote_ip: String,
    pub port_cmd: u16,
    pub port_observations: u16,
    pub polling_timeout_ms: u64,
    pub connect_timeout_s: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_ip: "127.0.0.1".to_string(),
            port_cmd: 6001,
            port_observations: 6002,
            polling_timeout_ms: 15,
            connect_timeout_s: 10,
        }
    }
}

//! tara-common/src/config/mod.rs
//!
//! Device and session configuration. Device configs are serde-tagged by
//! their `type` field so the same structures load from CLI flags (via a JSON
//! object) and from TOML files.

pub mod camera;
pub mod robot;
pub mod teleop;
pub mod dataset;
pub mod remote;
pub mod session;

use std::path::PathBuf;

/// Highest control-loop rate accepted anywhere.
pub const MAX_FPS: u32 = 1000;

pub use camera::{parse_cameras, CameraConfig, CameraKind, IndexOrPath};
pub use robot::{DriveMode, NewRobotConfig, RobotConfig, So101FollowerConfig, TaraBaseConfig, TaraConfig};
pub use teleop::{GamepadTaraConfig, So101LeaderConfig, TaraLeaderConfig, TeleoperatorConfig};
pub use dataset::DatasetConfig;
pub use remote::{ClientConfig, HostConfig};
pub use session::{PairConfig, TeleoperateFile};

/// Root of all locally cached state (calibration files, datasets).
pub fn cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("tara")
}

/// `<cache>/tara/calibration/<category>/<device_type>`, where category is
/// `robots` or `teleoperators`.
pub fn default_calibration_dir(category: &str, device_type: &str) -> PathBuf {
    cache_root().join("calibration").join(category).join(device_type)
}

pub fn default_dataset_root() -> PathBuf {
    cache_root().join("datasets")
}

// tara-common/src/config/session.rs
//
// Multi-pair teleoperation file, e.g.
//
//   fps = 30
//   [[pairs]]
//   robot = { type = "tarabase", port = "/dev/ttyUSB0" }
//   teleop = { type = "gamepadtara" }

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::config::robot::RobotConfig;
use crate::config::MAX_FPS;
use crate::config::teleop::TeleoperatorConfig;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub robot: RobotConfig,
    pub teleop: TeleoperatorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleoperateFile {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub teleop_time_s: Option<f64>,
    #[serde(default)]
    pub display_data: bool,
    pub pairs: Vec<PairConfig>,
}

fn default_fps() -> u32 {
    60
}

impl TeleoperateFile {
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let file: TeleoperateFile = toml::from_str(text)?;
        if file.pairs.is_empty() {
            return Err(Error::Config("teleoperate file lists no pairs".into()));
        }
        if !(1..=MAX_FPS).contains(&file.fps) {
            return Err(Error::Config(format!("fps must be in 1..={MAX_FPS}, got {}", file.fps)));
        }
        for pair in &file.pairs {
            pair.robot.validate()?;
            pair.teleop.validate()?;
        }
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_limits_in_file_are_rejected() {
        let follower = r#"
            [[pairs]]
            robot = { type = "so101_follower", mock = true, max_relative_target = nan }
            teleop = { type = "so101_leader", mock = true }
        "#;
        assert!(matches!(TeleoperateFile::from_toml_str(follower), Err(Error::Config(_))));

        let base = r#"
            [[pairs]]
            robot = { type = "tarabase", mock = true, max_linear_speed = nan }
            teleop = { type = "gamepadtara", mock = true }
        "#;
        assert!(matches!(TeleoperateFile::from_toml_str(base), Err(Error::Config(_))));
    }

    #[test]
    fn fps_outside_loop_range_is_rejected() {
        let text = r#"
            fps = 4294967295
            [[pairs]]
            robot = { type = "tarabase", mock = true }
            teleop = { type = "gamepadtara", mock = true }
        "#;
        assert!(matches!(TeleoperateFile::from_toml_str(text), Err(Error::Config(_))));
    }

    #[test]
    fn parses_dual_pair_file() {
        let text = r#"
            fps = 30
            display_data = true

            [[pairs]]
            robot = { type = "tara", left_port = "/dev/ttyACM0", right_port = "/dev/ttyACM1" }
            teleop = { type = "tara_leader", left_port = "/dev/ttyACM2", right_port = "/dev/ttyACM3" }

            [[pairs]]
            robot = { type = "tarabase", port = "/dev/ttyUSB0", max_wheel_rpm = 6.0 }
            teleop = { type = "gamepadtara" }
        "#;

        let file = TeleoperateFile::from_toml_str(text).unwrap();
        assert_eq!(file.fps, 30);
        assert!(file.display_data);
        assert_eq!(file.pairs.len(), 2);
        assert_eq!(file.pairs[0].robot.type_name(), "tara");
        assert_eq!(file.pairs[1].teleop.type_name(), "gamepadtara");
    }

    #[test]
    fn empty_pairs_is_a_config_error() {
        let err = TeleoperateFile::from_toml_str("pairs = []");
        assert!(matches!(err, Err(Error::Config(_))));
    }
}

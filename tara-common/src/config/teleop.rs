// tara-common/src/config/teleop.rs

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TeleoperatorConfig {
    #[serde(rename = "gamepadtara")]
    GamepadTara(GamepadTaraConfig),
    #[serde(rename = "tara_leader")]
    TaraLeader(TaraLeaderConfig),
    #[serde(rename = "so101_leader")]
    So101Leader(So101LeaderConfig),
}

impl TeleoperatorConfig {
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        let cfg: TeleoperatorConfig = serde_json::from_value(value)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TeleoperatorConfig::GamepadTara(_) => "gamepadtara",
            TeleoperatorConfig::TaraLeader(_) => "tara_leader",
            TeleoperatorConfig::So101Leader(_) => "so101_leader",
        }
    }

    pub fn is_mock(&self) -> bool {
        match self {
            TeleoperatorConfig::GamepadTara(c) => c.mock,
            TeleoperatorConfig::TaraLeader(c) => c.mock,
            TeleoperatorConfig::So101Leader(c) => c.mock,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            TeleoperatorConfig::GamepadTara(c) => {
                if !(0.0..1.0).contains(&c.deadzone) {
                    return Err(Error::Config(format!("deadzone must be in [0, 1), got {}", c.deadzone)));
                }
                Ok(())
            }
            TeleoperatorConfig::TaraLeader(c) => {
                if !c.mock && (c.left_port.is_empty() || c.right_port.is_empty()) {
                    return Err(Error::Config("tara_leader needs both `left_port` and `right_port`".into()));
                }
                Ok(())
            }
            TeleoperatorConfig::So101Leader(c) => {
                if !c.mock && c.port.is_empty() {
                    return Err(Error::Config("so101_leader needs `port`".into()));
                }
                Ok(())
            }
        }
    }
}

/// Gamepad driving a TaraBase. Emits normalized `left_wheel` / `right_wheel`
/// values in [-1.0, 1.0]; the robot config owns the speed limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamepadTaraConfig {
    pub id: Option<String>,
    /// Stick values below this magnitude are treated as zero.
    pub deadzone: f64,
    pub gamepad_index: usize,
    pub mock: bool,
}

impl Default for GamepadTaraConfig {
    fn default() -> Self {
        Self { id: None, deadzone: 0.1, gamepad_index: 0, mock: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaraLeaderConfig {
    pub id: Option<String>,
    pub left_port: String,
    pub right_port: String,
    pub use_degrees: bool,
    pub calibration_dir: Option<PathBuf>,
    pub mock: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct So101LeaderConfig {
    pub id: Option<String>,
    pub port: String,
    pub use_degrees: bool,
    pub calibration_dir: Option<PathBuf>,
    pub mock: bool,
}

// tara-common/src/config/robot.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use crate::config::camera::CameraConfig;
use crate::config::default_calibration_dir;
use crate::error::Error;

/// Every robot the `tara` tool can drive, keyed by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RobotConfig {
    #[serde(rename = "tarabase")]
    TaraBase(TaraBaseConfig),
    #[serde(rename = "tara")]
    Tara(TaraConfig),
    #[serde(rename = "so101_follower")]
    So101Follower(So101FollowerConfig),
    #[serde(rename = "new_robot")]
    NewRobot(NewRobotConfig),
}

impl RobotConfig {
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        let cfg: RobotConfig = serde_json::from_value(value)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RobotConfig::TaraBase(_) => "tarabase",
            RobotConfig::Tara(_) => "tara",
            RobotConfig::So101Follower(_) => "so101_follower",
            RobotConfig::NewRobot(_) => "new_robot",
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            RobotConfig::TaraBase(c) => c.id.as_deref(),
            RobotConfig::Tara(c) => c.id.as_deref(),
            RobotConfig::So101Follower(c) => c.id.as_deref(),
            RobotConfig::NewRobot(c) => c.id.as_deref(),
        }
    }

    pub fn is_mock(&self) -> bool {
        match self {
            RobotConfig::TaraBase(c) => c.mock,
            RobotConfig::Tara(c) => c.mock,
            RobotConfig::So101Follower(c) => c.mock,
            RobotConfig::NewRobot(c) => c.mock,
        }
    }

    pub fn cameras(&self) -> Option<&BTreeMap<String, CameraConfig>> {
        match self {
            RobotConfig::Tara(c) => Some(&c.cameras),
            RobotConfig::So101Follower(c) => Some(&c.cameras),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            RobotConfig::TaraBase(c) => c.validate(),
            RobotConfig::Tara(c) => {
                if !c.mock && (c.left_port.is_empty() || c.right_port.is_empty()) {
                    return Err(Error::Config("tara needs both `left_port` and `right_port`".into()));
                }
                validate_relative_target(c.max_relative_target)?;
                validate_cameras(&c.cameras)
            }
            RobotConfig::So101Follower(c) => {
                if !c.mock && c.port.is_empty() {
                    return Err(Error::Config("so101_follower needs `port`".into()));
                }
                validate_relative_target(c.max_relative_target)?;
                validate_cameras(&c.cameras)
            }
            RobotConfig::NewRobot(_) => Ok(()),
        }
    }
}

fn validate_relative_target(limit: Option<f64>) -> Result<(), Error> {
    match limit {
        Some(v) if !(v > 0.0 && v.is_finite()) => {
            Err(Error::Config(format!("max_relative_target must be a positive number, got {v}")))
        }
        _ => Ok(()),
    }
}

fn validate_cameras(cameras: &BTreeMap<String, CameraConfig>) -> Result<(), Error> {
    for (name, cam) in cameras {
        cam.validate(name)?;
    }
    Ok(())
}

/// How twist actions (`linear_x`, `linear_y`, `angular_z`) become wheel speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// Fixed wheel speeds once an axis passes the 0.5 threshold.
    #[default]
    Discrete,
    /// Differential-drive kinematics, speed proportional to the command.
    Proportional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaraBaseConfig {
    pub id: Option<String>,
    /// Serial device of the wheel controller (e.g. /dev/ttyUSB0, COM3).
    pub port: String,
    pub slave_id: u8,
    pub baudrate: u32,
    /// m/s
    pub max_linear_speed: f64,
    /// rad/s
    pub max_angular_speed: f64,
    /// Wheel speed (rpm) that a normalized wheel command of 1.0 maps to.
    pub max_wheel_rpm: f64,
    /// Wheel speed (rpm) for in-place turns in discrete mode.
    pub turn_wheel_rpm: f64,
    /// Kinematic commands above this rpm are refused.
    pub max_kinematic_rpm: f64,
    pub emergency_stop_enabled: bool,
    pub drive_mode: DriveMode,
    pub mock: bool,
}

impl Default for TaraBaseConfig {
    fn default() -> Self {
        Self {
            id: None,
            port: "/dev/ttyUSB0".to_string(),
            slave_id: 1,
            baudrate: 115_200,
            max_linear_speed: 1.0,
            max_angular_speed: 1.0,
            max_wheel_rpm: 5.0,
            turn_wheel_rpm: 3.0,
            max_kinematic_rpm: 10.0,
            emergency_stop_enabled: true,
            drive_mode: DriveMode::Discrete,
            mock: false,
        }
    }
}

impl TaraBaseConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.max_wheel_rpm > 0.0 && self.max_wheel_rpm <= 3000.0) {
            return Err(Error::Config(format!(
                "max_wheel_rpm must be in (0, 3000], got {}",
                self.max_wheel_rpm
            )));
        }
        if !(self.turn_wheel_rpm >= 0.0 && self.turn_wheel_rpm <= 3000.0) {
            return Err(Error::Config(format!(
                "turn_wheel_rpm must be in [0, 3000], got {}",
                self.turn_wheel_rpm
            )));
        }
        for (name, value) in [
            ("max_linear_speed", self.max_linear_speed),
            ("max_angular_speed", self.max_angular_speed),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(Error::Config(format!("{name} must be a finite, non-negative number, got {value}")));
            }
        }
        if !(self.max_kinematic_rpm > 0.0 && self.max_kinematic_rpm <= 3000.0) {
            return Err(Error::Config(format!(
                "max_kinematic_rpm must be in (0, 3000], got {}",
                self.max_kinematic_rpm
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaraConfig {
    pub id: Option<String>,
    pub left_port: String,
    pub right_port: String,
    /// Report body joints in degrees instead of [-100, 100].
    pub use_degrees: bool,
    /// Caps how far a single goal may move from the present position.
    pub max_relative_target: Option<f64>,
    pub disable_torque_on_disconnect: bool,
    pub cameras: BTreeMap<String, CameraConfig>,
    pub calibration_dir: Option<PathBuf>,
    pub mock: bool,
}

impl Default for TaraConfig {
    fn default() -> Self {
        Self {
            id: None,
            left_port: String::new(),
            right_port: String::new(),
            use_degrees: false,
            max_relative_target: None,
            disable_torque_on_disconnect: true,
            cameras: BTreeMap::new(),
            calibration_dir: None,
            mock: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct So101FollowerConfig {
    pub id: Option<String>,
    pub port: String,
    pub use_degrees: bool,
    pub max_relative_target: Option<f64>,
    pub disable_torque_on_disconnect: bool,
    pub cameras: BTreeMap<String, CameraConfig>,
    pub calibration_dir: Option<PathBuf>,
    pub mock: bool,
}

impl Default for So101FollowerConfig {
    fn default() -> Self {
        Self {
            id: None,
            port: String::new(),
            use_degrees: false,
            max_relative_target: None,
            disable_torque_on_disconnect: true,
            cameras: BTreeMap::new(),
            calibration_dir: None,
            mock: false,
        }
    }
}

/// Placeholder robot used to document how a new robot type plugs in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewRobotConfig {
    pub id: Option<String>,
    /// Run without real hardware.
    pub mock: bool,
    pub calibration_dir: PathBuf,
}

impl Default for NewRobotConfig {
    fn default() -> Self {
        Self {
            id: None,
            mock: false,
            calibration_dir: default_calibration_dir("robots", "new_robot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tarabase_from_flags_object() {
        let cfg = RobotConfig::from_value(json!({
            "type": "tarabase",
            "port": "/dev/ttyUSB1",
            "max_wheel_rpm": 8.0,
            "drive_mode": "proportional",
        }))
        .unwrap();

        let RobotConfig::TaraBase(base) = cfg else { panic!("expected tarabase") };
        assert_eq!(base.port, "/dev/ttyUSB1");
        assert_eq!(base.max_wheel_rpm, 8.0);
        assert_eq!(base.drive_mode, DriveMode::Proportional);
        assert_eq!(base.slave_id, 1);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(RobotConfig::from_value(json!({ "type": "koch" })).is_err());
    }

    #[test]
    fn tara_requires_ports_unless_mocked() {
        let err = RobotConfig::from_value(json!({ "type": "tara", "left_port": "/dev/ttyUSB0" }));
        assert!(matches!(err, Err(Error::Config(_))));

        let ok = RobotConfig::from_value(json!({ "type": "tara", "mock": true }));
        assert!(ok.is_ok());
    }

    #[test]
    fn zero_wheel_rpm_is_invalid() {
        let err = RobotConfig::from_value(json!({ "type": "tarabase", "max_wheel_rpm": 0.0 }));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn nan_limits_are_invalid() {
        let follower = So101FollowerConfig { mock: true, max_relative_target: Some(f64::NAN), ..Default::default() };
        assert!(matches!(RobotConfig::So101Follower(follower).validate(), Err(Error::Config(_))));

        for field in ["max_linear_speed", "max_angular_speed", "max_kinematic_rpm"] {
            let mut base = TaraBaseConfig::default();
            match field {
                "max_linear_speed" => base.max_linear_speed = f64::NAN,
                "max_angular_speed" => base.max_angular_speed = f64::NAN,
                _ => base.max_kinematic_rpm = f64::NAN,
            }
            assert!(matches!(base.validate(), Err(Error::Config(_))), "{field}");
        }

        let mut tara = TaraConfig { mock: true, ..TaraConfig::default() };
        tara.max_relative_target = Some(f64::INFINITY);
        assert!(RobotConfig::Tara(tara).validate().is_err());
    }

    #[test]
    fn new_robot_defaults_into_cache_dir() {
        let cfg = NewRobotConfig::default();
        assert!(cfg.calibration_dir.ends_with("calibration/robots/new_robot"));
        assert!(!cfg.mock);
    }
}

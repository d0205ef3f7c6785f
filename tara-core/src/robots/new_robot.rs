//! tara-core/src/robots/new_robot.rs
//!
//! Template for adding a robot type. Connection state and calibration are
//! real; every hardware operation reports `Error::NotImplemented`.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use tara_common::config::NewRobotConfig;
use tara_common::models::{Action, Features, Observation};
use tara_common::traits::Robot;

use crate::Error;

const DEVICE: &str = "new_robot";
pub const DUMMY_CALIBRATION_FILE: &str = "dummy_calibration.json";

/// Creates `calibration_dir` and writes `{"calibrated": true}` into
/// `dummy_calibration.json`. Returns the file path.
pub fn run_new_robot_calibration(calibration_dir: &Path) -> Result<PathBuf, Error> {
    info!("Running calibration for NewRobot...");
    std::fs::create_dir_all(calibration_dir)?;

    let file = calibration_dir.join(DUMMY_CALIBRATION_FILE);
    std::fs::write(&file, serde_json::to_string(&json!({ "calibrated": true }))?)?;
    info!("Dummy calibration data saved to {}", file.display());
    Ok(file)
}

pub struct NewRobot {
    config: NewRobotConfig,
    connected: bool,
}

impl NewRobot {
    pub fn new(config: NewRobotConfig) -> Self {
        Self { config, connected: false }
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::not_connected(DEVICE))
        }
    }

    /// One leader-to-follower step. Not available for this robot.
    pub async fn teleop_step(&mut self) -> Result<(Observation, Action), Error> {
        self.ensure_connected()?;
        Err(Error::NotImplemented("NewRobot specific teleoperation logic".into()))
    }
}

#[async_trait]
impl Robot for NewRobot {
    fn name(&self) -> String {
        DEVICE.to_string()
    }

    fn action_features(&self) -> Features {
        Features::new()
    }

    fn observation_features(&self) -> Features {
        Features::new()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_calibrated(&self) -> bool {
        self.config.calibration_dir.join(DUMMY_CALIBRATION_FILE).is_file()
    }

    /// Calibrates, marks the robot connected, then reports that the
    /// hardware connection itself is missing.
    async fn connect(&mut self, _calibrate: bool) -> Result<(), Error> {
        if self.connected {
            return Err(Error::already_connected(DEVICE));
        }
        run_new_robot_calibration(&self.config.calibration_dir)?;
        self.connected = true;
        Err(Error::NotImplemented("NewRobot specific connection logic".into()))
    }

    async fn calibrate(&mut self) -> Result<(), Error> {
        run_new_robot_calibration(&self.config.calibration_dir).map(|_| ())
    }

    async fn configure(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        Err(Error::NotImplemented("NewRobot specific configuration".into()))
    }

    async fn get_observation(&mut self) -> Result<Observation, Error> {
        self.ensure_connected()?;
        Err(Error::NotImplemented("NewRobot specific observation capturing logic".into()))
    }

    async fn send_action(&mut self, _action: &Action) -> Result<Action, Error> {
        self.ensure_connected()?;
        Err(Error::NotImplemented("NewRobot specific action sending logic".into()))
    }

    async fn emergency_stop(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        Err(Error::NotImplemented("NewRobot specific emergency stop".into()))
    }

    /// Marks the robot disconnected, then reports the missing hardware
    /// teardown.
    async fn disconnect(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        self.connected = false;
        Err(Error::NotImplemented("NewRobot specific disconnection logic".into()))
    }
}

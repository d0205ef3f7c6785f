// tara-core/src/robots/arm.rs
//
// One SO101 arm on its own servo bus. Shared by the follower robots and the
// leader teleoperators.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use tara_common::config::default_calibration_dir;
use tara_common::models::calibration::filter_by_prefix;
use tara_common::models::features::float_features;
use tara_common::models::{CalibrationMap, Features, MotorCalibration, Observation};
use tara_common::traits::OperatorPrompt;

use crate::feetech::{table, FeetechBus, Motor, NormMode};
use crate::sim::{spawn_servo_sim, ServoSimHandle};
use crate::transport::open_serial;
use crate::Error;

pub const SO101_JOINTS: [&str; 6] = [
    "shoulder_pan",
    "shoulder_lift",
    "elbow_flex",
    "wrist_flex",
    "wrist_roll",
    "gripper",
];

pub const SERVO_BAUDRATE: u32 = 1_000_000;

/// Motor table for one arm. Names get `{prefix}_` when a prefix is given.
pub fn arm_motors(prefix: Option<&str>, use_degrees: bool) -> Vec<(String, Motor)> {
    let body = if use_degrees { NormMode::Degrees } else { NormMode::RangeM100To100 };
    SO101_JOINTS
        .iter()
        .enumerate()
        .map(|(i, joint)| {
            let name = match prefix {
                Some(p) => format!("{p}_{joint}"),
                None => joint.to_string(),
            };
            let mode = if *joint == "gripper" { NormMode::Range0To100 } else { body };
            (name, Motor::sts3215(i as u8 + 1, mode))
        })
        .collect()
}

/// `<dir>/<id or type>.json`, with `dir` defaulting under the cache root.
pub fn calibration_file(
    category: &str,
    device_type: &str,
    id: Option<&str>,
    dir: Option<&Path>,
) -> PathBuf {
    let dir = dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_calibration_dir(category, device_type));
    dir.join(format!("{}.json", id.unwrap_or(device_type)))
}

pub struct Arm {
    label: String,
    port: String,
    mock: bool,
    bus: FeetechBus,
    sim: Option<ServoSimHandle>,
}

impl Arm {
    pub fn new(
        label: &str,
        port: &str,
        prefix: Option<&str>,
        use_degrees: bool,
        calibration: &CalibrationMap,
        mock: bool,
    ) -> Self {
        let own = match prefix {
            Some(p) => filter_by_prefix(calibration, p),
            None => calibration.clone(),
        };
        let bus_label = if mock { format!("mock:{label}") } else { port.to_string() };
        Self {
            label: label.to_string(),
            port: port.to_string(),
            mock,
            bus: FeetechBus::new(bus_label, arm_motors(prefix, use_degrees), own),
            sim: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bus(&self) -> &FeetechBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut FeetechBus {
        &mut self.bus
    }

    pub fn sim_handle(&self) -> Option<&ServoSimHandle> {
        self.sim.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.bus.is_connected()
    }

    pub fn is_calibrated(&self) -> bool {
        self.bus.is_calibrated()
    }

    pub fn owns(&self, motor: &str) -> bool {
        self.bus.motor_names().any(|m| m == motor)
    }

    pub fn position_features(&self) -> Features {
        float_features(self.bus.motor_names().map(|m| format!("{m}.pos")))
    }

    pub async fn connect(&mut self) -> Result<(), Error> {
        let link = if self.mock {
            let ids: Vec<u8> = (1..=SO101_JOINTS.len() as u8).collect();
            let (link, handle) = spawn_servo_sim(&ids);
            self.sim = Some(handle);
            link
        } else {
            open_serial(&self.port, SERVO_BAUDRATE)?
        };
        self.bus.connect(link).await
    }

    /// Pushes the loaded calibration into the motors.
    pub async fn apply_calibration(&mut self) -> Result<(), Error> {
        let cal = self.bus.calibration().clone();
        self.bus.write_calibration(&cal).await
    }

    /// Interactive homing and range recording. Returns the new calibration,
    /// already written to the motors.
    pub async fn calibrate(&mut self, prompt: &dyn OperatorPrompt) -> Result<CalibrationMap, Error> {
        info!("Calibrating {} arm", self.label);
        self.bus.disable_torque().await?;
        self.bus.set_position_mode().await?;

        prompt
            .wait_for_enter(&format!(
                "Move {} arm to the middle of its range of motion and press ENTER....",
                self.label
            ))
            .await?;
        let homings = self.bus.set_half_turn_homings().await?;

        let stop_message = format!(
            "Move all {} arm joints sequentially through their entire ranges of motion.\n\
             Recording positions. Press ENTER to stop...",
            self.label
        );
        let stop = async {
            if let Err(e) = prompt.wait_for_enter(&stop_message).await {
                warn!("Prompt failed, stopping range recording: {:?}", e);
            }
        };
        let (mins, maxes) = self.bus.record_ranges_of_motion(stop).await?;

        let mut calibration = CalibrationMap::new();
        for (name, motor) in self.motor_ids() {
            let (Some(h), Some(lo), Some(hi)) = (homings.get(&name), mins.get(&name), maxes.get(&name)) else {
                return Err(Error::Calibration(format!("no readings for motor `{name}`")));
            };
            calibration.insert(
                name,
                MotorCalibration { id: motor, drive_mode: 0, homing_offset: *h, range_min: *lo, range_max: *hi },
            );
        }
        self.bus.write_calibration(&calibration).await?;
        Ok(calibration)
    }

    /// Position mode with a soft PID and torque on.
    pub async fn configure_follower(&mut self) -> Result<(), Error> {
        self.bus.disable_torque().await?;
        self.bus.configure_motors().await?;
        for (name, _) in self.motor_ids() {
            self.bus.write(table::OPERATING_MODE, &name, table::operating_mode::POSITION).await?;
            // Default P is 32; lower avoids shaking.
            self.bus.write(table::P_COEFFICIENT, &name, 16).await?;
            self.bus.write(table::I_COEFFICIENT, &name, 0).await?;
            self.bus.write(table::D_COEFFICIENT, &name, 32).await?;
        }
        self.bus.enable_torque().await
    }

    /// Torque stays off so the operator can move the arm by hand.
    pub async fn configure_leader(&mut self) -> Result<(), Error> {
        self.bus.disable_torque().await?;
        self.bus.configure_motors().await?;
        self.bus.set_position_mode().await
    }

    /// Present positions keyed `{motor}.pos`.
    pub async fn read_positions(&mut self) -> Result<Observation, Error> {
        let positions = self.bus.read_positions().await?;
        Ok(positions.into_iter().map(|(m, v)| (format!("{m}.pos"), v)).collect())
    }

    pub async fn write_goals(&mut self, goals: &BTreeMap<String, f64>) -> Result<(), Error> {
        self.bus.write_goal_positions(goals).await
    }

    pub async fn disconnect(&mut self, disable_torque: bool) -> Result<(), Error> {
        let result = self.bus.disconnect(disable_torque).await;
        self.sim = None;
        result
    }

    fn motor_ids(&self) -> Vec<(String, u8)> {
        self.bus
            .motor_names()
            .map(|name| (name.to_string(), self.bus.motor(name).map(|m| m.id).unwrap_or(0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_motor_table() {
        let motors = arm_motors(Some("left"), false);
        assert_eq!(motors.len(), 6);
        assert_eq!(motors[0].0, "left_shoulder_pan");
        assert_eq!(motors[0].1.id, 1);
        assert_eq!(motors[5].0, "left_gripper");
        assert_eq!(motors[5].1.norm_mode, NormMode::Range0To100);
        assert_eq!(motors[2].1.norm_mode, NormMode::RangeM100To100);
    }

    #[test]
    fn calibration_file_falls_back_to_type_name() {
        let path = calibration_file("robots", "tara", None, Some(Path::new("/tmp/cal")));
        assert_eq!(path, PathBuf::from("/tmp/cal/tara.json"));
        let path = calibration_file("robots", "tara", Some("blue"), Some(Path::new("/tmp/cal")));
        assert_eq!(path, PathBuf::from("/tmp/cal/blue.json"));
    }
}

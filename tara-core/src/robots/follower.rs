//! tara-core/src/robots/follower.rs
//!
//! Position-controlled SO101 follower arms: `tara` drives a left and a right
//! arm (motor names prefixed `left_`/`right_`), `so101_follower` a single arm.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use tara_common::config::{CameraConfig, So101FollowerConfig, TaraConfig};
use tara_common::models::calibration::{load_calibration, save_calibration};
use tara_common::models::{Action, CalibrationMap, Features, Observation};
use tara_common::traits::{OperatorPrompt, Robot};

use crate::robots::arm::{calibration_file, Arm};
use crate::safety::ensure_safe_goal_position;
use crate::Error;

pub struct FollowerArms {
    kind: &'static str,
    id: Option<String>,
    arms: Vec<Arm>,
    cameras: BTreeMap<String, CameraConfig>,
    max_relative_target: Option<f64>,
    disable_torque_on_disconnect: bool,
    calibration_path: PathBuf,
    prompt: Arc<dyn OperatorPrompt>,
}

impl FollowerArms {
    pub fn tara(config: TaraConfig, prompt: Arc<dyn OperatorPrompt>) -> Result<Self, Error> {
        let path = calibration_file("robots", "tara", config.id.as_deref(), config.calibration_dir.as_deref());
        let calibration = load_calibration(&path)?.unwrap_or_default();
        let arms = vec![
            Arm::new("left", &config.left_port, Some("left"), config.use_degrees, &calibration, config.mock),
            Arm::new("right", &config.right_port, Some("right"), config.use_degrees, &calibration, config.mock),
        ];
        Ok(Self {
            kind: "tara",
            id: config.id,
            arms,
            cameras: config.cameras,
            max_relative_target: config.max_relative_target,
            disable_torque_on_disconnect: config.disable_torque_on_disconnect,
            calibration_path: path,
            prompt,
        })
    }

    pub fn so101(config: So101FollowerConfig, prompt: Arc<dyn OperatorPrompt>) -> Result<Self, Error> {
        let path = calibration_file(
            "robots",
            "so101_follower",
            config.id.as_deref(),
            config.calibration_dir.as_deref(),
        );
        let calibration = load_calibration(&path)?.unwrap_or_default();
        let arms = vec![Arm::new("main", &config.port, None, config.use_degrees, &calibration, config.mock)];
        Ok(Self {
            kind: "so101_follower",
            id: config.id,
            arms,
            cameras: config.cameras,
            max_relative_target: config.max_relative_target,
            disable_torque_on_disconnect: config.disable_torque_on_disconnect,
            calibration_path: path,
            prompt,
        })
    }

    pub fn calibration_path(&self) -> &PathBuf {
        &self.calibration_path
    }

    pub fn arms(&self) -> &[Arm] {
        &self.arms
    }

    fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("{} {}", self.kind, id),
            None => self.kind.to_string(),
        }
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::not_connected(self.label()))
        }
    }

    /// Goals for one arm, in bus motor names, clamped when a relative
    /// limit is set.
    async fn arm_goals(
        arm: &mut Arm,
        action: &Action,
        max_relative_target: Option<f64>,
    ) -> Result<BTreeMap<String, f64>, Error> {
        let mut goals: BTreeMap<String, f64> = action
            .iter()
            .filter_map(|(key, value)| {
                let motor = key.strip_suffix(".pos")?;
                arm.owns(motor).then(|| (motor.to_string(), *value))
            })
            .collect();

        if let (Some(limit), false) = (max_relative_target, goals.is_empty()) {
            let present = arm.read_positions().await?;
            let goal_present = goals
                .iter()
                .filter_map(|(motor, goal)| {
                    present.get(&format!("{motor}.pos")).map(|p| (motor.clone(), (*goal, *p)))
                })
                .collect();
            let safe = ensure_safe_goal_position(&goal_present, limit);
            goals.extend(safe);
        }
        Ok(goals)
    }
}

#[async_trait]
impl Robot for FollowerArms {
    fn name(&self) -> String {
        self.kind.to_string()
    }

    fn action_features(&self) -> Features {
        self.arms.iter().flat_map(|a| a.position_features()).collect()
    }

    fn observation_features(&self) -> Features {
        self.action_features()
    }

    fn is_connected(&self) -> bool {
        self.arms.iter().all(|a| a.is_connected())
    }

    fn is_calibrated(&self) -> bool {
        self.arms.iter().all(|a| a.is_calibrated())
    }

    async fn connect(&mut self, calibrate: bool) -> Result<(), Error> {
        if self.is_connected() {
            return Err(Error::already_connected(self.label()));
        }
        for arm in self.arms.iter_mut() {
            if !arm.is_connected() {
                arm.connect().await?;
            }
        }

        if !self.is_calibrated() && calibrate {
            self.calibrate().await?;
        } else if self.is_calibrated() {
            for arm in self.arms.iter_mut() {
                arm.apply_calibration().await?;
            }
        } else {
            warn!("{} is not calibrated; positions cannot be normalized", self.label());
        }

        for name in self.cameras.keys() {
            warn!("Camera `{}` is configured but frame capture is not available", name);
        }

        self.configure().await?;
        info!("{} connected.", self.label());
        Ok(())
    }

    async fn calibrate(&mut self) -> Result<(), Error> {
        info!("Running calibration of {}", self.label());
        let mut combined = CalibrationMap::new();
        for arm in self.arms.iter_mut() {
            let cal = arm.calibrate(self.prompt.as_ref()).await?;
            combined.extend(cal);
        }
        save_calibration(&self.calibration_path, &combined)?;
        self.prompt
            .announce(&format!("Calibration saved to {}", self.calibration_path.display()));
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), Error> {
        for arm in self.arms.iter_mut() {
            arm.configure_follower().await?;
        }
        Ok(())
    }

    async fn get_observation(&mut self) -> Result<Observation, Error> {
        self.ensure_connected()?;
        let mut obs = Observation::new();
        for arm in self.arms.iter_mut() {
            let start = std::time::Instant::now();
            obs.extend(arm.read_positions().await?);
            debug!("{} read {} arm state: {:.1}ms", self.kind, arm.label(), start.elapsed().as_secs_f64() * 1e3);
        }
        Ok(obs)
    }

    async fn send_action(&mut self, action: &Action) -> Result<Action, Error> {
        self.ensure_connected()?;
        let limit = self.max_relative_target;
        let mut sent = Action::new();
        for arm in self.arms.iter_mut() {
            let goals = Self::arm_goals(arm, action, limit).await?;
            if goals.is_empty() {
                continue;
            }
            arm.write_goals(&goals).await?;
            sent.extend(goals.into_iter().map(|(m, v)| (format!("{m}.pos"), v)));
        }
        Ok(sent)
    }

    /// Holds every joint where it is.
    async fn emergency_stop(&mut self) -> Result<(), Error> {
        for arm in self.arms.iter_mut().filter(|a| a.is_connected()) {
            let present = arm.bus_mut().read_positions().await?;
            arm.write_goals(&present).await?;
        }
        warn!("Emergency stop on {}: holding current pose", self.label());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        let disable = self.disable_torque_on_disconnect;
        for arm in self.arms.iter_mut() {
            arm.disconnect(disable).await?;
        }
        info!("{} disconnected.", self.label());
        Ok(())
    }
}

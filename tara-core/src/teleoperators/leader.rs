// tara-core/src/teleoperators/leader.rs
//
// Hand-moved SO101 leader arms. Torque stays off; the action is the present
// pose of every joint.

use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use tracing::{info, warn};

use tara_common::config::{So101LeaderConfig, TaraLeaderConfig};
use tara_common::models::calibration::{load_calibration, save_calibration};
use tara_common::models::{Action, CalibrationMap, Features};
use tara_common::traits::{OperatorPrompt, Teleoperator};

use crate::robots::arm::{calibration_file, Arm};
use crate::Error;

pub struct LeaderArms {
    kind: &'static str,
    id: Option<String>,
    arms: Vec<Arm>,
    calibration_path: PathBuf,
    prompt: Arc<dyn OperatorPrompt>,
}

impl LeaderArms {
    pub fn tara(config: TaraLeaderConfig, prompt: Arc<dyn OperatorPrompt>) -> Result<Self, Error> {
        let path = calibration_file(
            "teleoperators",
            "tara_leader",
            config.id.as_deref(),
            config.calibration_dir.as_deref(),
        );
        let calibration = load_calibration(&path)?.unwrap_or_default();
        Ok(Self {
            kind: "tara_leader",
            id: config.id,
            arms: vec![
                Arm::new("left", &config.left_port, Some("left"), config.use_degrees, &calibration, config.mock),
                Arm::new("right", &config.right_port, Some("right"), config.use_degrees, &calibration, config.mock),
            ],
            calibration_path: path,
            prompt,
        })
    }

    pub fn so101(config: So101LeaderConfig, prompt: Arc<dyn OperatorPrompt>) -> Result<Self, Error> {
        let path = calibration_file(
            "teleoperators",
            "so101_leader",
            config.id.as_deref(),
            config.calibration_dir.as_deref(),
        );
        let calibration = load_calibration(&path)?.unwrap_or_default();
        Ok(Self {
            kind: "so101_leader",
            id: config.id,
            arms: vec![Arm::new("main", &config.port, None, config.use_degrees, &calibration, config.mock)],
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
}

#[async_trait]
impl Teleoperator for LeaderArms {
    fn name(&self) -> String {
        self.kind.to_string()
    }

    fn action_features(&self) -> Features {
        self.arms.iter().flat_map(|a| a.position_features()).collect()
    }

    fn feedback_features(&self) -> Features {
        Features::new()
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
        self.configure().await?;
        info!("{} connected.", self.label());
        Ok(())
    }

    async fn calibrate(&mut self) -> Result<(), Error> {
        info!("Running calibration of {}", self.label());
        let mut combined = CalibrationMap::new();
        for arm in self.arms.iter_mut() {
            combined.extend(arm.calibrate(self.prompt.as_ref()).await?);
        }
        save_calibration(&self.calibration_path, &combined)?;
        self.prompt
            .announce(&format!("Calibration saved to {}", self.calibration_path.display()));
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), Error> {
        for arm in self.arms.iter_mut() {
            arm.configure_leader().await?;
        }
        Ok(())
    }

    async fn get_action(&mut self) -> Result<Action, Error> {
        if !self.is_connected() {
            return Err(Error::not_connected(self.label()));
        }
        let mut action = Action::new();
        for arm in self.arms.iter_mut() {
            action.extend(arm.read_positions().await?);
        }
        Ok(action)
    }

    async fn send_feedback(&mut self, _feedback: &Action) -> Result<(), Error> {
        Err(Error::NotImplemented(format!("force feedback on {}", self.kind)))
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::not_connected(self.label()));
        }
        for arm in self.arms.iter_mut() {
            arm.disconnect(false).await?;
        }
        info!("{} disconnected.", self.label());
        Ok(())
    }
}

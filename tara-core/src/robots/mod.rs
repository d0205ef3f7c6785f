// tara-core/src/robots/mod.rs

pub mod arm;
pub mod follower;
pub mod new_robot;
pub mod tarabase;

use std::sync::Arc;

use tara_common::config::RobotConfig;
use tara_common::traits::{OperatorPrompt, Robot};
use crate::Error;

pub use follower::FollowerArms;
pub use new_robot::NewRobot;
pub use tarabase::TaraBase;

/// Builds the robot described by `config`. Nothing is opened until
/// `connect`.
pub fn make_robot_from_config(
    config: &RobotConfig,
    prompt: Arc<dyn OperatorPrompt>,
) -> Result<Box<dyn Robot>, Error> {
    config.validate()?;
    let robot: Box<dyn Robot> = match config {
        RobotConfig::TaraBase(c) => Box::new(TaraBase::new(c.clone())),
        RobotConfig::Tara(c) => Box::new(FollowerArms::tara(c.clone(), prompt)?),
        RobotConfig::So101Follower(c) => Box::new(FollowerArms::so101(c.clone(), prompt)?),
        RobotConfig::NewRobot(c) => Box::new(NewRobot::new(c.clone())),
    };
    Ok(robot)
}

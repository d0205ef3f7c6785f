// tara-core/src/teleoperators/mod.rs

pub mod gamepad;
pub mod leader;

use std::sync::Arc;

use tara_common::config::TeleoperatorConfig;
use tara_common::traits::{OperatorPrompt, Teleoperator};
use crate::Error;

pub use gamepad::{GamepadSource, GamepadTara, GilrsSource, ScriptedSource, StickState};
pub use leader::LeaderArms;

pub fn make_teleoperator_from_config(
    config: &TeleoperatorConfig,
    prompt: Arc<dyn OperatorPrompt>,
) -> Result<Box<dyn Teleoperator>, Error> {
    config.validate()?;
    let teleop: Box<dyn Teleoperator> = match config {
        TeleoperatorConfig::GamepadTara(c) => Box::new(GamepadTara::new(c.clone())),
        TeleoperatorConfig::TaraLeader(c) => Box::new(LeaderArms::tara(c.clone(), prompt)?),
        TeleoperatorConfig::So101Leader(c) => Box::new(LeaderArms::so101(c.clone(), prompt)?),
    };
    Ok(teleop)
}

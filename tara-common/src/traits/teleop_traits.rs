// tara-common/src/traits/teleop_traits.rs

use async_trait::async_trait;
use crate::error::Error;
use crate::models::{Action, Features};

/// A human input device (gamepad, leader arm) producing actions.
///
/// Control values are reported normalized; scaling them to physical units is
/// the robot's job.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Teleoperator: Send {
    fn name(&self) -> String;

    fn action_features(&self) -> Features;
    fn feedback_features(&self) -> Features;

    fn is_connected(&self) -> bool;
    fn is_calibrated(&self) -> bool;

    async fn connect(&mut self, calibrate: bool) -> Result<(), Error>;
    async fn calibrate(&mut self) -> Result<(), Error>;
    async fn configure(&mut self) -> Result<(), Error>;

    async fn get_action(&mut self) -> Result<Action, Error>;
    async fn send_feedback(&mut self, feedback: &Action) -> Result<(), Error>;

    async fn disconnect(&mut self) -> Result<(), Error>;
}

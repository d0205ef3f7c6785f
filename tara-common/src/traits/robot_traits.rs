// tara-common/src/traits/robot_traits.rs

use async_trait::async_trait;
use crate::error::Error;
use crate::models::{Action, Features, Observation};

/// A physical (or simulated) robot that can be commanded with actions
/// and observed.
///
/// Lifecycle: `connect` -> any number of `get_observation` / `send_action`
/// -> `disconnect`. Calling an I/O method on a disconnected robot returns
/// `Error::DeviceNotConnected`.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Robot: Send {
    /// Registered type name, e.g. `tarabase`.
    fn name(&self) -> String;

    fn action_features(&self) -> Features;
    fn observation_features(&self) -> Features;

    fn is_connected(&self) -> bool;
    fn is_calibrated(&self) -> bool;

    /// Opens the hardware link. Runs calibration first when the robot is not
    /// calibrated and `calibrate` is true.
    async fn connect(&mut self, calibrate: bool) -> Result<(), Error>;
    async fn calibrate(&mut self) -> Result<(), Error>;
    async fn configure(&mut self) -> Result<(), Error>;

    async fn get_observation(&mut self) -> Result<Observation, Error>;

    /// Returns the action that actually reached the hardware, which may be
    /// clipped or scaled relative to the request.
    async fn send_action(&mut self, action: &Action) -> Result<Action, Error>;

    /// Brings every actuator to a safe standstill.
    async fn emergency_stop(&mut self) -> Result<(), Error>;

    async fn disconnect(&mut self) -> Result<(), Error>;
}

//! tara-core/src/robots/tarabase.rs
//!
//! Two-wheel differential base driven through the Modbus wheel controller.
//!
//! Accepted actions:
//! - wheel schema: `left_wheel`, `right_wheel` in [-1, 1], scaled by
//!   `max_wheel_rpm`. Signs are wire signs (forward is left negative,
//!   right positive), which is what the gamepad teleoperator emits.
//! - twist schema: `linear_x`, `linear_y`, `angular_z`, interpreted per
//!   `drive_mode`.

use std::f64::consts::PI;
use std::time::Duration;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use tara_common::config::{DriveMode, TaraBaseConfig};
use tara_common::models::action::value_or_zero;
use tara_common::models::features::float_features;
use tara_common::models::{Action, Features, Observation};
use tara_common::traits::Robot;

use crate::drivers::kinematics::{twist_to_wheel_rpm, WHEEL_BASE_M, WHEEL_RADIUS_M};
use crate::drivers::WheelDriver;
use crate::sim::{spawn_wheel_sim, WheelSimHandle};
use crate::transport::open_serial;
use crate::Error;

pub const LEFT_WHEEL: &str = "left_wheel";
pub const RIGHT_WHEEL: &str = "right_wheel";

const TWIST_THRESHOLD: f64 = 0.5;

pub struct TaraBase {
    config: TaraBaseConfig,
    driver: Option<WheelDriver>,
    sim: Option<WheelSimHandle>,
    /// Last wire command (left, right) in rpm.
    last_wire: (i16, i16),
    estopped: bool,
}

impl TaraBase {
    pub fn new(config: TaraBaseConfig) -> Self {
        Self { config, driver: None, sim: None, last_wire: (0, 0), estopped: false }
    }

    /// The simulated controller behind a `mock` base, once connected.
    pub fn sim_handle(&self) -> Option<&WheelSimHandle> {
        self.sim.as_ref()
    }

    fn driver(&mut self) -> Result<&mut WheelDriver, Error> {
        self.driver.as_mut().ok_or_else(|| Error::not_connected("tarabase"))
    }

    /// Wire speeds for a request, plus the action reported back.
    fn plan(&self, action: &Action) -> Result<((i16, i16), Action), Error> {
        let cfg = &self.config;
        if action.contains_key(LEFT_WHEEL) || action.contains_key(RIGHT_WHEEL) {
            let left = value_or_zero(action, LEFT_WHEEL).clamp(-1.0, 1.0);
            let right = value_or_zero(action, RIGHT_WHEEL).clamp(-1.0, 1.0);
            let wire = (
                (left * cfg.max_wheel_rpm).round() as i16,
                (right * cfg.max_wheel_rpm).round() as i16,
            );
            return Ok((wire, wheel_action(left, right)));
        }

        let lin = cfg.max_linear_speed;
        let x = value_or_zero(action, "linear_x").clamp(-lin, lin);
        let y = value_or_zero(action, "linear_y").clamp(-lin, lin);
        let ang = cfg.max_angular_speed;
        let z = value_or_zero(action, "angular_z").clamp(-ang, ang);

        let wire = match cfg.drive_mode {
            DriveMode::Discrete => discrete_twist(x, y, cfg.max_wheel_rpm, cfg.turn_wheel_rpm),
            DriveMode::Proportional => {
                twist_to_wheel_rpm(x, z.to_degrees(), cfg.max_kinematic_rpm)?.to_wire()
            }
        };
        let scale = cfg.max_wheel_rpm;
        Ok((wire, wheel_action(wire.0 as f64 / scale, wire.1 as f64 / scale)))
    }

    async fn stop_robot(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            if let Err(e) = driver.set_velocity(0, 0).await {
                error!("Error stopping tarabase: {:?}", e);
            }
        }
        self.last_wire = (0, 0);
    }

    /// Stops the base, waits for it to settle and returns a fresh observation.
    pub async fn reset(&mut self) -> Result<Observation, Error> {
        if self.driver.is_none() {
            return Err(Error::not_connected("tarabase"));
        }
        self.stop_robot().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.get_observation().await
    }
}

fn wheel_action(left: f64, right: f64) -> Action {
    let mut out = Action::new();
    out.insert(LEFT_WHEEL.to_string(), left);
    out.insert(RIGHT_WHEEL.to_string(), right);
    out
}

/// Fixed-speed mapping: `x` drives forward/backward, `y` turns in place and
/// takes precedence.
fn discrete_twist(x: f64, y: f64, wheel_rpm: f64, turn_rpm: f64) -> (i16, i16) {
    let wheel = wheel_rpm.round() as i16;
    let turn = turn_rpm.round() as i16;
    let mut wire = (0, 0);
    if x.abs() >= TWIST_THRESHOLD {
        wire = if x > 0.0 { (-wheel, wheel) } else { (wheel, -wheel) };
    }
    if y.abs() >= TWIST_THRESHOLD {
        wire = if y > 0.0 { (-turn, -turn) } else { (turn, turn) };
    }
    wire
}

/// Body velocity (m/s, rad/s) from wire wheel speeds.
fn body_twist(left_wire_rpm: f64, right_wire_rpm: f64) -> (f64, f64) {
    let to_m_s = |rpm: f64| rpm * 2.0 * PI * WHEEL_RADIUS_M / 60.0;
    let v_left = to_m_s(-left_wire_rpm);
    let v_right = to_m_s(right_wire_rpm);
    ((v_left + v_right) / 2.0, (v_right - v_left) / WHEEL_BASE_M)
}

#[async_trait]
impl Robot for TaraBase {
    fn name(&self) -> String {
        "tarabase".to_string()
    }

    fn action_features(&self) -> Features {
        float_features([LEFT_WHEEL, RIGHT_WHEEL])
    }

    fn observation_features(&self) -> Features {
        float_features([
            "current_linear_x",
            "current_linear_y",
            "current_angular_z",
            "current_left",
            "current_right",
        ])
    }

    fn is_connected(&self) -> bool {
        self.driver.is_some()
    }

    fn is_calibrated(&self) -> bool {
        true
    }

    async fn connect(&mut self, _calibrate: bool) -> Result<(), Error> {
        if self.driver.is_some() {
            return Err(Error::already_connected("tarabase"));
        }
        let link = if self.config.mock {
            let (link, handle) = spawn_wheel_sim(self.config.slave_id);
            self.sim = Some(handle);
            link
        } else {
            info!("Connecting to tarabase on port {}", self.config.port);
            open_serial(&self.config.port, self.config.baudrate)?
        };

        let driver = WheelDriver::connect(link, self.config.slave_id).await.map_err(|e| {
            error!("Failed to connect to tarabase: {:?}", e);
            e
        })?;
        self.driver = Some(driver);
        self.last_wire = (0, 0);
        self.estopped = false;
        info!("tarabase connected");
        Ok(())
    }

    async fn calibrate(&mut self) -> Result<(), Error> {
        info!("tarabase has no calibration step");
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), Error> {
        debug!("tarabase uses controller defaults");
        Ok(())
    }

    async fn get_observation(&mut self) -> Result<Observation, Error> {
        let fallback = self.last_wire;
        let measured = self.driver()?.actual_velocity().await;
        let (left, right) = match measured {
            Ok(v) => (v.left, v.right),
            Err(e) => {
                warn!("Could not read wheel velocity, using last command: {:?}", e);
                (fallback.0 as f64, fallback.1 as f64)
            }
        };
        let (linear, angular) = body_twist(left, right);

        let mut obs = Observation::new();
        obs.insert("current_linear_x".into(), linear);
        obs.insert("current_linear_y".into(), 0.0);
        obs.insert("current_angular_z".into(), angular);
        obs.insert("current_left".into(), left);
        obs.insert("current_right".into(), right);
        Ok(obs)
    }

    async fn send_action(&mut self, action: &Action) -> Result<Action, Error> {
        if self.driver.is_none() {
            return Err(Error::not_connected("tarabase"));
        }
        let (wire, sent) = self.plan(action)?;

        let estopped = self.estopped;
        let driver = self.driver()?;
        let result = async {
            if estopped {
                driver.clear_fault().await?;
            }
            driver.set_velocity(wire.0, wire.1).await
        }
        .await;

        match result {
            Ok(()) => {
                self.estopped = false;
                self.last_wire = wire;
                debug!("tarabase wheels left={} right={} rpm", wire.0, wire.1);
                Ok(sent)
            }
            Err(e) => {
                error!("Error sending action to tarabase: {:?}", e);
                self.stop_robot().await;
                Err(e)
            }
        }
    }

    async fn emergency_stop(&mut self) -> Result<(), Error> {
        let use_estop = self.config.emergency_stop_enabled;
        let Some(driver) = self.driver.as_mut() else { return Ok(()) };
        if use_estop {
            driver.emergency_stop().await?;
            self.estopped = true;
        } else {
            driver.stop_motors().await?;
        }
        self.last_wire = (0, 0);
        warn!("Emergency stop activated on tarabase");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        if self.driver.is_none() {
            return Ok(());
        }
        self.stop_robot().await;
        if let Some(driver) = self.driver.take() {
            driver.disconnect().await;
        }
        info!("Disconnected from tarabase");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_turn_overrides_forward() {
        assert_eq!(discrete_twist(1.0, 0.0, 5.0, 3.0), (-5, 5));
        assert_eq!(discrete_twist(-0.7, 0.0, 5.0, 3.0), (5, -5));
        assert_eq!(discrete_twist(1.0, 0.6, 5.0, 3.0), (-3, -3));
        assert_eq!(discrete_twist(0.0, -0.9, 5.0, 3.0), (3, 3));
        assert_eq!(discrete_twist(0.4, 0.4, 5.0, 3.0), (0, 0));
    }

    #[test]
    fn body_twist_of_forward_command() {
        let (v, w) = body_twist(-5.0, 5.0);
        assert!(v > 0.0);
        assert!(w.abs() < 1e-12);
    }
}

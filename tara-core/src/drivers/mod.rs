// tara-core/src/drivers/mod.rs

pub mod wheel_driver;
pub mod kinematics;

pub use wheel_driver::{WheelDriver, WheelPositions, WheelVelocities};
pub use kinematics::{twist_to_wheel_rpm, WheelRpm};

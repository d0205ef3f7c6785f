// tara-common/src/models/mod.rs

pub mod action;
pub mod calibration;
pub mod features;

pub use action::{Action, Observation};
pub use calibration::{CalibrationMap, MotorCalibration};
pub use features::{FeatureKind, Features};

// tara-core/src/lib.rs

pub mod transport;
pub mod modbus;
pub mod drivers;
pub mod feetech;
pub mod safety;
pub mod sim;
pub mod robots;
pub mod teleoperators;
pub mod prompt;
pub mod control;
pub mod dataset;
pub mod remote;

pub use tara_common::error::Error;
pub use robots::make_robot_from_config;
pub use teleoperators::make_teleoperator_from_config;

//! tara-core/src/feetech/mod.rs
//!
//! Feetech STS serial servo bus (STS3215 on the SO101 arms).

pub mod protocol;
pub mod table;
pub mod normalize;
pub mod bus;

pub use bus::{FeetechBus, Motor};
pub use normalize::NormMode;
pub use table::Register;

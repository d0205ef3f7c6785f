// tara-core/src/sim/mod.rs
//
// In-process stand-ins for the hardware, used by `mock = true` configs and
// by tests. Each sim owns one end of a duplex pipe and speaks the real wire
// protocol on it.

pub mod wheel;
pub mod servo;

pub use wheel::{spawn_wheel_sim, WheelSimHandle};
pub use servo::{spawn_servo_sim, ServoSimHandle};

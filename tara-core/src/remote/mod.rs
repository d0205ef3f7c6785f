// tara-core/src/remote/mod.rs
//
// Remote teleoperation over UDP. The host runs next to the robot; the client
// runs next to the operator and the teleoperator.

pub mod protocol;
pub mod host;
pub mod client;

pub use protocol::RemoteMessage;
pub use host::{RobotHost, StepOutcome};
pub use client::{run_client, RobotClient};

// tara-common/src/traits/mod.rs

pub mod robot_traits;
pub mod teleop_traits;
pub mod prompt_traits;

pub use robot_traits::Robot;
pub use teleop_traits::Teleoperator;
pub use prompt_traits::OperatorPrompt;

#[cfg(any(test, feature = "mocks"))]
pub use robot_traits::MockRobot;
#[cfg(any(test, feature = "mocks"))]
pub use teleop_traits::MockTeleoperator;

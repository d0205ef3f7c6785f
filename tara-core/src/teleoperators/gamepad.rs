//! tara-core/src/teleoperators/gamepad.rs
//!
//! Gamepad teleoperator for the wheel base. The left stick's Y axis drives
//! forward/backward, its X axis turns in place. Output is normalized
//! `left_wheel`/`right_wheel` in [-1, 1]; the robot owns speed scaling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use async_trait::async_trait;
use gilrs::{Axis, Gilrs};
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

use tara_common::config::GamepadTaraConfig;
use tara_common::models::action::zero_action;
use tara_common::models::features::float_features;
use tara_common::models::{Action, Features};
use tara_common::traits::Teleoperator;

use crate::Error;

/// Stick magnitude below which an axis is ignored after the deadzone.
const ACTIVE_THRESHOLD: f64 = 0.1;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Stick deflection in [-1, 1]. `forward` is up, `turn` is left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StickState {
    pub forward: f64,
    pub turn: f64,
}

/// Where stick readings come from.
pub trait GamepadSource: Send {
    fn sticks(&mut self) -> Result<StickState, Error>;
    fn stop(&mut self);
}

/// Reads a physical gamepad on a dedicated thread (gilrs handles are not
/// `Send`) and publishes the latest stick state.
pub struct GilrsSource {
    state: watch::Receiver<StickState>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl GilrsSource {
    /// Starts the reader thread and waits until gamepad `index` is found.
    pub async fn spawn(index: usize) -> Result<Self, Error> {
        let (state_tx, state_rx) = watch::channel(StickState::default());
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String, Error>>();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let thread = std::thread::Builder::new()
            .name("gamepad".into())
            .spawn(move || poll_gamepad(index, state_tx, ready_tx, flag))?;

        let name = ready_rx
            .await
            .map_err(|_| Error::Gamepad("gamepad thread exited before reporting".into()))??;
        info!("Connected to gamepad controller `{}`", name);

        Ok(Self { state: state_rx, running, thread: Some(thread) })
    }
}

fn poll_gamepad(
    index: usize,
    state_tx: watch::Sender<StickState>,
    ready_tx: oneshot::Sender<Result<String, Error>>,
    running: Arc<AtomicBool>,
) {
    let mut gilrs = match Gilrs::new() {
        Ok(g) => g,
        Err(e) => {
            let _ = ready_tx.send(Err(Error::Gamepad(format!("cannot initialise gamepad input: {e}"))));
            return;
        }
    };
    let Some((id, name)) = gilrs.gamepads().nth(index).map(|(id, pad)| (id, pad.name().to_string())) else {
        let _ = ready_tx.send(Err(Error::Gamepad(format!("no gamepad at index {index}"))));
        return;
    };
    let _ = ready_tx.send(Ok(name));

    while running.load(Ordering::Relaxed) {
        while gilrs.next_event().is_some() {}
        let pad = gilrs.gamepad(id);
        let sticks = if pad.is_connected() {
            StickState {
                forward: pad.value(Axis::LeftStickY) as f64,
                turn: -(pad.value(Axis::LeftStickX) as f64),
            }
        } else {
            StickState::default()
        };
        if state_tx.send(sticks).is_err() {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

impl GamepadSource for GilrsSource {
    fn sticks(&mut self) -> Result<StickState, Error> {
        if self.thread.as_ref().is_some_and(|t| t.is_finished()) {
            return Err(Error::Gamepad("gamepad reader thread stopped".into()));
        }
        Ok(*self.state.borrow())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("gamepad thread panicked");
            }
        }
    }
}

/// Replays a fixed list of stick states, one per read, holding the last.
pub struct ScriptedSource {
    steps: Vec<StickState>,
    next: usize,
}

impl ScriptedSource {
    pub fn new(steps: Vec<StickState>) -> Self {
        Self { steps, next: 0 }
    }

    /// Drive forward, turn left, then rest.
    pub fn demo() -> Self {
        let mut steps = vec![StickState { forward: 0.6, turn: 0.0 }; 60];
        steps.extend(vec![StickState { forward: 0.0, turn: 0.5 }; 30]);
        steps.push(StickState::default());
        Self::new(steps)
    }
}

impl GamepadSource for ScriptedSource {
    fn sticks(&mut self) -> Result<StickState, Error> {
        let state = self
            .steps
            .get(self.next)
            .or_else(|| self.steps.last())
            .copied()
            .unwrap_or_default();
        self.next = (self.next + 1).min(self.steps.len());
        Ok(state)
    }

    fn stop(&mut self) {}
}

fn apply_deadzone(value: f64, deadzone: f64) -> f64 {
    if value.abs() < deadzone { 0.0 } else { value }
}

/// Differential wheel command for the base. Turning overrides driving.
pub fn wheel_command(sticks: StickState, deadzone: f64) -> (f64, f64) {
    let forward = apply_deadzone(sticks.forward, deadzone).clamp(-1.0, 1.0);
    let turn = apply_deadzone(sticks.turn, deadzone).clamp(-1.0, 1.0);

    let mut wheels = (0.0, 0.0);
    if forward.abs() > ACTIVE_THRESHOLD {
        wheels = (-forward, forward);
    }
    if turn.abs() > ACTIVE_THRESHOLD {
        wheels = (-turn, -turn);
    }
    wheels
}

pub struct GamepadTara {
    config: GamepadTaraConfig,
    source: Option<Box<dyn GamepadSource>>,
    injected: Option<Box<dyn GamepadSource>>,
}

impl GamepadTara {
    pub fn new(config: GamepadTaraConfig) -> Self {
        Self { config, source: None, injected: None }
    }

    /// Uses `source` instead of a physical gamepad on the next `connect`.
    pub fn with_source(config: GamepadTaraConfig, source: Box<dyn GamepadSource>) -> Self {
        Self { config, source: None, injected: Some(source) }
    }
}

#[async_trait]
impl Teleoperator for GamepadTara {
    fn name(&self) -> String {
        "gamepadtara".to_string()
    }

    fn action_features(&self) -> Features {
        float_features(["left_wheel", "right_wheel"])
    }

    fn feedback_features(&self) -> Features {
        Features::new()
    }

    fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    fn is_calibrated(&self) -> bool {
        true
    }

    async fn connect(&mut self, _calibrate: bool) -> Result<(), Error> {
        if self.source.is_some() {
            return Err(Error::already_connected("gamepadtara"));
        }
        let source: Box<dyn GamepadSource> = if let Some(src) = self.injected.take() {
            src
        } else if self.config.mock {
            Box::new(ScriptedSource::demo())
        } else {
            match GilrsSource::spawn(self.config.gamepad_index).await {
                Ok(src) => Box::new(src),
                Err(e) => {
                    error!("Failed to connect to gamepad: {:?}", e);
                    return Err(e);
                }
            }
        };
        self.source = Some(source);
        Ok(())
    }

    async fn calibrate(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn get_action(&mut self) -> Result<Action, Error> {
        if self.source.is_none() {
            warn!("Gamepad not connected, returning zero action");
            return Ok(zero_action(&self.action_features()));
        }
        let deadzone = self.config.deadzone;
        let sticks = match self.source.as_mut() {
            Some(source) => source.sticks()?,
            None => StickState::default(),
        };
        let (left, right) = wheel_command(sticks, deadzone);

        let mut action = Action::new();
        action.insert("left_wheel".into(), left);
        action.insert("right_wheel".into(), right);
        Ok(action)
    }

    async fn send_feedback(&mut self, _feedback: &Action) -> Result<(), Error> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(mut source) = self.source.take() {
            source.stop();
            info!("Disconnected from gamepad");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sticks(forward: f64, turn: f64) -> StickState {
        StickState { forward, turn }
    }

    #[test]
    fn forward_and_backward() {
        assert_eq!(wheel_command(sticks(0.8, 0.0), 0.1), (-0.8, 0.8));
        assert_eq!(wheel_command(sticks(-0.5, 0.0), 0.1), (0.5, -0.5));
    }

    #[test]
    fn turning_overrides_driving() {
        assert_eq!(wheel_command(sticks(0.9, 0.4), 0.1), (-0.4, -0.4));
        assert_eq!(wheel_command(sticks(0.0, -0.7), 0.1), (0.7, 0.7));
    }

    #[test]
    fn deadzone_and_threshold_suppress_drift() {
        assert_eq!(wheel_command(sticks(0.05, -0.08), 0.1), (0.0, 0.0));
        // Past a small deadzone but under the activity threshold.
        assert_eq!(wheel_command(sticks(0.1, 0.0), 0.02), (0.0, 0.0));
        assert_eq!(wheel_command(sticks(0.3, 0.0), 0.5), (0.0, 0.0));
    }

    #[tokio::test]
    async fn disconnected_gamepad_yields_zero_action() {
        let mut pad = GamepadTara::new(GamepadTaraConfig::default());
        let action = pad.get_action().await.unwrap();
        assert_eq!(action["left_wheel"], 0.0);
        assert_eq!(action["right_wheel"], 0.0);
    }

    #[tokio::test]
    async fn scripted_source_drives_actions() {
        let script = ScriptedSource::new(vec![sticks(1.0, 0.0), sticks(0.0, 0.5)]);
        let mut pad = GamepadTara::with_source(GamepadTaraConfig::default(), Box::new(script));
        pad.connect(false).await.unwrap();

        let first = pad.get_action().await.unwrap();
        assert_eq!((first["left_wheel"], first["right_wheel"]), (-1.0, 1.0));
        let second = pad.get_action().await.unwrap();
        assert_eq!((second["left_wheel"], second["right_wheel"]), (-0.5, -0.5));
        // Holds the last state.
        let third = pad.get_action().await.unwrap();
        assert_eq!(third, second);

        assert!(matches!(pad.connect(false).await, Err(Error::DeviceAlreadyConnected(_))));
        pad.disconnect().await.unwrap();
        assert!(!pad.is_connected());
    }
}

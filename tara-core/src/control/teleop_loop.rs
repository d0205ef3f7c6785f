// tara-core/src/control/teleop_loop.rs

use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tara_common::config::MAX_FPS;
use tara_common::traits::{Robot, Teleoperator};
use crate::control::display::LiveTable;
use crate::Error;

#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub fps: u32,
    /// Run until cancelled when `None`.
    pub duration: Option<Duration>,
    pub display_data: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self { fps: 60, duration: None, display_data: false }
    }
}

impl LoopOptions {
    pub fn period(&self) -> Duration {
        loop_period(self.fps)
    }
}

/// Tick period for `fps`, with the rate held to 1..=MAX_FPS.
pub fn loop_period(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.clamp(1, MAX_FPS) as f64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub iterations: u64,
    pub elapsed: Duration,
}

/// Forwards teleoperator actions to the robot at `fps` until the duration
/// runs out or `cancel` fires. Missed ticks are skipped, not replayed.
pub async fn teleop_loop(
    teleop: &mut dyn Teleoperator,
    robot: &mut dyn Robot,
    opts: &LoopOptions,
    cancel: &CancellationToken,
) -> Result<LoopStats, Error> {
    let start = Instant::now();
    let mut ticker = interval(opts.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut table = LiveTable::default();
    let mut stats = LoopStats::default();

    info!("Teleoperating {} with {} at {} fps", robot.name(), teleop.name(), opts.fps);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("teleop loop cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }
        if opts.duration.is_some_and(|d| start.elapsed() >= d) {
            break;
        }

        let tick = Instant::now();
        let action = teleop.get_action().await?;
        let sent = robot.send_action(&action).await?;
        stats.iterations += 1;

        if opts.display_data {
            table.draw(&sent, tick.elapsed());
        }
    }

    stats.elapsed = start.elapsed();
    info!(
        "Teleoperation finished after {} iterations ({:.1}s)",
        stats.iterations,
        stats.elapsed.as_secs_f64()
    );
    Ok(stats)
}

//! tara-core/src/control/record.rs
//!
//! Episode recording: each episode teleoperates for `episode_time` while
//! writing (observation, sent action) frames, then a teleop-only reset
//! period lets the operator put the scene back. There is no reset period
//! after the last episode.

use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tara_common::traits::{Robot, Teleoperator};
use crate::control::display::LiveTable;
use crate::control::teleop_loop::{loop_period, teleop_loop, LoopOptions};
use crate::dataset::DatasetWriter;
use crate::Error;

#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub fps: u32,
    pub episode_time: Duration,
    pub reset_time: Duration,
    pub num_episodes: u32,
    pub single_task: String,
    pub display_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSummary {
    /// Indices of the episodes saved during this run.
    pub episodes: Vec<u64>,
    pub frames: u64,
    pub cancelled: bool,
}

/// Records one episode into the writer's buffer. Returns true when it
/// ran to its full length.
async fn record_episode(
    teleop: &mut dyn Teleoperator,
    robot: &mut dyn Robot,
    writer: &mut DatasetWriter,
    opts: &RecordOptions,
    cancel: &CancellationToken,
) -> Result<bool, Error> {
    let start = Instant::now();
    let mut ticker = interval(loop_period(opts.fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut table = LiveTable::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            _ = ticker.tick() => {}
        }
        if start.elapsed() >= opts.episode_time {
            return Ok(true);
        }

        let tick = Instant::now();
        let observation = robot.get_observation().await?;
        let action = teleop.get_action().await?;
        let sent = robot.send_action(&action).await?;
        if opts.display_data {
            table.draw(&sent, tick.elapsed());
        }
        writer.add_frame(&opts.single_task, observation, sent);
    }
}

/// Records `num_episodes` episodes. On cancellation the partial episode is
/// kept when it has frames.
pub async fn record_loop(
    teleop: &mut dyn Teleoperator,
    robot: &mut dyn Robot,
    writer: &mut DatasetWriter,
    opts: &RecordOptions,
    cancel: &CancellationToken,
) -> Result<RecordSummary, Error> {
    let mut summary = RecordSummary::default();

    for n in 0..opts.num_episodes {
        info!("Recording episode {}", writer.next_episode_index());
        let completed = record_episode(teleop, robot, writer, opts, cancel).await?;

        if writer.buffered_frames() > 0 {
            let record = writer.save_episode()?;
            summary.episodes.push(record.episode_index);
            summary.frames += record.length;
        } else {
            warn!("Episode ended without frames; nothing saved");
        }

        if !completed {
            summary.cancelled = true;
            info!("Recording stopped early");
            break;
        }

        let last = n + 1 == opts.num_episodes;
        if !last && !opts.reset_time.is_zero() {
            info!("Reset the environment");
            let reset = LoopOptions { fps: opts.fps, duration: Some(opts.reset_time), display_data: false };
            teleop_loop(teleop, robot, &reset, cancel).await?;
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
        }
    }

    info!(
        "Recorded {} episode(s), {} frames",
        summary.episodes.len(),
        summary.frames
    );
    Ok(summary)
}

// tara-server/src/commands.rs

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tara_common::config::{PairConfig, TeleoperateFile};
use tara_common::error::Error;
use tara_common::traits::{OperatorPrompt, Robot, Teleoperator};
use tara_core::control::{probe, record_loop, run_pairs, LoopOptions, Pair, ProbeOutcome, RecordOptions};
use tara_core::dataset::DatasetWriter;
use tara_core::prompt::{ScriptedPrompt, StdinPrompt};
use tara_core::remote::{run_client, RobotClient, RobotHost};
use tara_core::{make_robot_from_config, make_teleoperator_from_config};

use crate::args::{
    duration_from_secs, CalibrateArgs, ClientArgs, Command, HostArgs, ProbeArgs, RecordArgs, TeleoperateArgs,
};

/// How long a simulated operator takes to "press ENTER".
const MOCK_PROMPT_DELAY: Duration = Duration::from_secs(3);

pub async fn run(command: Command, cancel: CancellationToken) -> anyhow::Result<()> {
    match command {
        Command::Teleoperate(args) => teleoperate(args, cancel).await,
        Command::Record(args) => record(args, cancel).await,
        Command::Calibrate(args) => calibrate(args).await,
        Command::Probe(args) => probe_robot(args).await,
        Command::Host(args) => host(args, cancel).await,
        Command::Client(args) => client(args, cancel).await,
    }
}

fn prompt_for(mock: bool) -> Arc<dyn OperatorPrompt> {
    if mock {
        Arc::new(ScriptedPrompt::new(MOCK_PROMPT_DELAY))
    } else {
        Arc::new(StdinPrompt)
    }
}

/// Disconnects whatever is still connected; failures are only logged.
async fn disconnect_all(robot: &mut dyn Robot, teleop: Option<&mut dyn Teleoperator>) {
    if let Some(teleop) = teleop {
        if teleop.is_connected() {
            if let Err(e) = teleop.disconnect().await {
                warn!("Disconnecting {} failed: {:?}", teleop.name(), e);
            }
        }
    }
    if robot.is_connected() {
        if let Err(e) = robot.disconnect().await {
            warn!("Disconnecting {} failed: {:?}", robot.name(), e);
        }
    }
}

async fn teleoperate(args: TeleoperateArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let (configs, opts) = match &args.config {
        Some(path) => {
            let file = TeleoperateFile::load(path)
                .with_context(|| format!("loading teleoperation config {}", path.display()))?;
            let opts = LoopOptions {
                fps: file.fps,
                duration: duration_from_secs(file.teleop_time_s)?,
                display_data: file.display_data || args.display_data,
            };
            (file.pairs, opts)
        }
        None => {
            let pair = PairConfig { robot: args.robot.require()?, teleop: args.teleop.require()? };
            let opts = LoopOptions {
                fps: args.fps,
                duration: duration_from_secs(args.teleop_time_s)?,
                display_data: args.display_data,
            };
            (vec![pair], opts)
        }
    };
    let mut pairs = Vec::with_capacity(configs.len());
    for cfg in &configs {
        info!("Pairing {} with {}", cfg.teleop.type_name(), cfg.robot.type_name());
        pairs.push(Pair {
            teleop: make_teleoperator_from_config(&cfg.teleop, prompt_for(cfg.teleop.is_mock()))?,
            robot: make_robot_from_config(&cfg.robot, prompt_for(cfg.robot.is_mock()))?,
        });
    }

    let stats = run_pairs(pairs, opts, cancel).await?;
    for (index, s) in stats.iter().enumerate() {
        info!("Pair {}: {} iterations in {:.1}s", index, s.iterations, s.elapsed.as_secs_f64());
    }
    Ok(())
}

async fn record(args: RecordArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    if let Some(path) = &args.policy_path {
        return Err(Error::NotImplemented(format!("policy inference (checkpoint {})", path.display())).into());
    }
    let robot_cfg = args.robot.require()?;
    let teleop_cfg = args.teleop.require()?;
    let dataset = args.dataset.to_config()?;
    if dataset.push_to_hub {
        warn!("dataset.push_to_hub is set but uploading is not supported; the dataset stays local");
    }

    let mut robot = make_robot_from_config(&robot_cfg, prompt_for(robot_cfg.is_mock()))?;
    let mut teleop = make_teleoperator_from_config(&teleop_cfg, prompt_for(teleop_cfg.is_mock()))?;

    let dir = dataset.dataset_dir();
    let mut writer = if args.resume {
        DatasetWriter::resume(&dir)?
    } else {
        DatasetWriter::create(
            &dir,
            &dataset.repo_id,
            robot_cfg.type_name(),
            dataset.fps,
            robot.observation_features(),
            robot.action_features(),
        )?
    };
    if writer.fps() != dataset.fps {
        warn!("Dataset was recorded at {} fps; keeping that rate instead of {}", writer.fps(), dataset.fps);
    }

    let opts = RecordOptions {
        fps: writer.fps(),
        episode_time: duration_from_secs(Some(dataset.episode_time_s))?.unwrap_or_default(),
        reset_time: duration_from_secs(Some(dataset.reset_time_s))?.unwrap_or_default(),
        num_episodes: dataset.num_episodes,
        single_task: dataset.single_task.clone(),
        display_data: args.display_data,
    };

    let result = async {
        robot.connect(true).await?;
        teleop.connect(true).await?;
        record_loop(teleop.as_mut(), robot.as_mut(), &mut writer, &opts, &cancel).await
    }
    .await;
    disconnect_all(robot.as_mut(), Some(teleop.as_mut())).await;

    let summary = result?;
    info!(
        "Dataset {} at {}: {} episodes total",
        writer.info().repo_id,
        writer.dir().display(),
        writer.info().total_episodes
    );
    if summary.cancelled {
        info!("Recording was interrupted after {} episode(s)", summary.episodes.len());
    }
    Ok(())
}

/// Treats "not implemented" as a warning so placeholder devices still get
/// through the sequence.
fn tolerate_not_implemented(step: &str, result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(e) if e.is_not_implemented() => {
            warn!("{}: {}", step, e);
            Ok(())
        }
        other => other,
    }
}

async fn calibrate(args: CalibrateArgs) -> anyhow::Result<()> {
    let robot_cfg = args.robot.to_config()?;
    let teleop_cfg = args.teleop.to_config()?;
    match (robot_cfg, teleop_cfg) {
        (Some(cfg), None) => {
            let mut robot = make_robot_from_config(&cfg, prompt_for(cfg.is_mock()))?;
            let result = async {
                tolerate_not_implemented("connect", robot.connect(false).await)?;
                robot.calibrate().await
            }
            .await;
            if robot.is_connected() {
                tolerate_not_implemented("disconnect", robot.disconnect().await)?;
            }
            result?;
            info!("{} calibrated", cfg.type_name());
        }
        (None, Some(cfg)) => {
            let mut teleop = make_teleoperator_from_config(&cfg, prompt_for(cfg.is_mock()))?;
            let result = async {
                teleop.connect(false).await?;
                teleop.calibrate().await
            }
            .await;
            if teleop.is_connected() {
                teleop.disconnect().await?;
            }
            result?;
            info!("{} calibrated", cfg.type_name());
        }
        (Some(_), Some(_)) => bail!("calibrate takes either --robot.type or --teleop.type, not both"),
        (None, None) => bail!("calibrate needs --robot.type or --teleop.type"),
    }
    Ok(())
}

async fn probe_robot(args: ProbeArgs) -> anyhow::Result<()> {
    let cfg = args.robot.require()?;
    let mut robot = make_robot_from_config(&cfg, prompt_for(cfg.is_mock()))?;

    let report = match probe(robot.as_mut()).await {
        Ok(report) => report,
        Err(e) => {
            error!("Probe of {} aborted: {:?}", cfg.type_name(), e);
            disconnect_all(robot.as_mut(), None).await;
            return Err(e.into());
        }
    };
    for (step, outcome) in &report.steps {
        match outcome {
            ProbeOutcome::Ok => println!("{step:<16} ok"),
            ProbeOutcome::NotImplemented(what) => println!("{step:<16} not implemented: {what}"),
        }
    }
    Ok(())
}

async fn host(args: HostArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let cfg = args.robot.require()?;
    let ip: IpAddr = args
        .bind_ip
        .parse()
        .map_err(|e| anyhow!("invalid --host.bind_ip `{}`: {}", args.bind_ip, e))?;
    let mut robot = make_robot_from_config(&cfg, prompt_for(cfg.is_mock()))?;

    let result = async {
        robot.connect(true).await?;
        let mut host = RobotHost::bind(ip, args.to_config()).await?;
        host.run(robot.as_mut(), &cancel).await
    }
    .await;
    disconnect_all(robot.as_mut(), None).await;

    let steps = result?;
    info!("Host served {} loop iterations", steps);
    Ok(())
}

async fn client(args: ClientArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let cfg = args.teleop.require()?;
    let config = args.to_config();
    let opts = LoopOptions {
        fps: args.fps,
        duration: duration_from_secs(args.teleop_time_s)?,
        display_data: args.display_data,
    };
    let mut teleop = make_teleoperator_from_config(&cfg, prompt_for(cfg.is_mock()))?;

    let connect_timeout = Duration::from_secs(config.connect_timeout_s);
    let mut remote = tokio::time::timeout(connect_timeout, RobotClient::connect(config))
        .await
        .map_err(Error::from)??;

    let result = async {
        teleop.connect(true).await?;
        run_client(teleop.as_mut(), &mut remote, &opts, &cancel).await
    }
    .await;
    if teleop.is_connected() {
        if let Err(e) = teleop.disconnect().await {
            warn!("Disconnecting {} failed: {:?}", teleop.name(), e);
        }
    }

    let stats = result?;
    info!("Client sent {} actions in {:.1}s", stats.iterations, stats.elapsed.as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Cli;
    use clap::Parser;

    fn command(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    #[tokio::test]
    async fn policy_path_is_rejected() {
        let cmd = command(&[
            "tara",
            "record",
            "--robot.type=tarabase",
            "--robot.mock",
            "--teleop.type=gamepadtara",
            "--teleop.mock",
            "--dataset.repo_id=me/test",
            "--policy.path=outputs/checkpoints/last",
        ]);
        let err = run(cmd, CancellationToken::new()).await.unwrap_err();
        let inner = err.downcast_ref::<Error>().unwrap();
        assert!(inner.is_not_implemented());
    }

    #[tokio::test]
    async fn mock_teleoperate_runs_for_the_time_limit() {
        let cmd = command(&[
            "tara",
            "teleoperate",
            "--robot.type=tarabase",
            "--robot.mock",
            "--teleop.type=gamepadtara",
            "--teleop.mock",
            "--fps=20",
            "--teleop_time_s=0.2",
        ]);
        run(cmd, CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn mock_record_writes_dataset() {
        let root = tempfile::tempdir().unwrap();
        let root_flag = format!("--dataset.root={}", root.path().display());
        let cmd = command(&[
            "tara",
            "record",
            "--robot.type=tarabase",
            "--robot.mock",
            "--teleop.type=gamepadtara",
            "--teleop.mock",
            "--dataset.repo_id=me/base",
            "--dataset.single_task=drive",
            "--dataset.fps=20",
            "--dataset.num_episodes=1",
            "--dataset.episode_time_s=0.2",
            "--dataset.reset_time_s=0",
            &root_flag,
        ]);
        run(cmd, CancellationToken::new()).await.unwrap();
        assert!(root.path().join("me/base/meta/info.json").is_file());
        assert!(root.path().join("me/base/data/episode_000000.jsonl").is_file());
    }

    #[tokio::test]
    async fn calibrate_new_robot_writes_dummy_file() {
        let dir = tempfile::tempdir().unwrap();
        let dir_flag = format!("--robot.calibration_dir={}", dir.path().display());
        let cmd = command(&["tara", "calibrate", "--robot.type=new_robot", &dir_flag]);
        run(cmd, CancellationToken::new()).await.unwrap();
        assert!(dir.path().join("dummy_calibration.json").is_file());
    }

    #[tokio::test]
    async fn calibrate_needs_exactly_one_device() {
        let cmd = command(&["tara", "calibrate"]);
        assert!(run(cmd, CancellationToken::new()).await.is_err());
    }
}

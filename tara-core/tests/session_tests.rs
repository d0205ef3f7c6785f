// File: tara-core/tests/session_tests.rs
//
// Whole sessions on simulated hardware: recording, paired teleoperation and
// remote teleoperation.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use tara_common::config::{ClientConfig, GamepadTaraConfig, HostConfig, RobotConfig};
use tara_common::traits::{Robot, Teleoperator};
use tara_core::control::{record_loop, run_pairs, LoopOptions, Pair, RecordOptions};
use tara_core::dataset::{read_episode, DatasetWriter};
use tara_core::remote::{run_client, RobotClient, RobotHost};
use tara_core::robots::TaraBase;
use tara_core::teleoperators::gamepad::{GamepadTara, ScriptedSource, StickState};

fn base() -> TaraBase {
    match RobotConfig::from_value(json!({ "type": "tarabase", "mock": true })).unwrap() {
        RobotConfig::TaraBase(cfg) => TaraBase::new(cfg),
        other => panic!("unexpected config {other:?}"),
    }
}

fn gamepad(forward: f64) -> GamepadTara {
    let config = GamepadTaraConfig { mock: true, ..Default::default() };
    GamepadTara::with_source(config, Box::new(ScriptedSource::new(vec![StickState { forward, turn: 0.0 }])))
}

fn record_opts(episodes: u32) -> RecordOptions {
    RecordOptions {
        fps: 20,
        episode_time: Duration::from_millis(250),
        reset_time: Duration::from_millis(100),
        num_episodes: episodes,
        single_task: "drive forward".into(),
        display_data: false,
    }
}

#[tokio::test]
async fn record_and_resume_continue_numbering() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("tara").join("drive");

    let mut robot = base();
    let mut teleop = gamepad(1.0);
    robot.connect(true).await.unwrap();
    teleop.connect(true).await.unwrap();

    let mut writer = DatasetWriter::create(
        &dir,
        "tara/drive",
        "tarabase",
        20,
        robot.observation_features(),
        robot.action_features(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let summary = record_loop(&mut teleop, &mut robot, &mut writer, &record_opts(2), &cancel).await.unwrap();
    assert_eq!(summary.episodes, vec![0, 1]);
    assert!(!summary.cancelled);
    assert!(summary.frames >= 2);

    let frames = read_episode(&writer.episode_path(1)).unwrap();
    assert!(!frames.is_empty());
    assert_eq!(frames[0].action["left_wheel"], -1.0);
    assert_eq!(frames[0].action["right_wheel"], 1.0);
    assert_eq!(frames[0].task_index, 0);

    assert!(DatasetWriter::create(&dir, "tara/drive", "tarabase", 20, Default::default(), Default::default()).is_err());

    let mut resumed = DatasetWriter::resume(&dir).unwrap();
    assert_eq!(resumed.next_episode_index(), 2);
    let summary = record_loop(&mut teleop, &mut robot, &mut resumed, &record_opts(1), &cancel).await.unwrap();
    assert_eq!(summary.episodes, vec![2]);
    assert_eq!(resumed.info().total_episodes, 3);

    robot.disconnect().await.unwrap();
}

#[tokio::test]
async fn cancelled_recording_keeps_partial_episode() {
    let root = tempfile::tempdir().unwrap();
    let mut robot = base();
    let mut teleop = gamepad(0.0);
    robot.connect(true).await.unwrap();
    teleop.connect(true).await.unwrap();
    let mut writer =
        DatasetWriter::create(root.path(), "tara/idle", "tarabase", 20, Default::default(), Default::default())
            .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        trigger.cancel();
    });
    let mut opts = record_opts(3);
    opts.episode_time = Duration::from_secs(10);

    let summary = record_loop(&mut teleop, &mut robot, &mut writer, &opts, &cancel).await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.episodes, vec![0]);
}

#[tokio::test]
async fn pairs_run_side_by_side_and_disconnect() {
    let pairs = vec![
        Pair { teleop: Box::new(gamepad(1.0)), robot: Box::new(base()) },
        Pair { teleop: Box::new(gamepad(-1.0)), robot: Box::new(base()) },
    ];
    let opts = LoopOptions { fps: 20, duration: Some(Duration::from_millis(200)), display_data: false };
    let stats = run_pairs(pairs, opts, CancellationToken::new()).await.unwrap();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.iterations > 0));
}

#[tokio::test]
async fn remote_client_drives_hosted_base() {
    let mut host = RobotHost::bind(
        "127.0.0.1".parse().unwrap(),
        HostConfig { port_cmd: 0, port_observations: 0, max_loop_freq_hz: 50, ..Default::default() },
    )
    .await
    .unwrap();
    let mut client = RobotClient::connect(ClientConfig {
        remote_ip: "127.0.0.1".into(),
        port_cmd: host.command_addr().unwrap().port(),
        port_observations: host.observation_addr().unwrap().port(),
        polling_timeout_ms: 20,
        ..Default::default()
    })
    .await
    .unwrap();

    let mut robot = base();
    robot.connect(true).await.unwrap();
    let sim = robot.sim_handle().unwrap().clone();
    let cancel = CancellationToken::new();

    let host_cancel = cancel.clone();
    let host_task = tokio::spawn(async move {
        let steps = host.run(&mut robot, &host_cancel).await;
        (steps, robot)
    });

    let mut teleop = gamepad(1.0);
    teleop.connect(true).await.unwrap();
    let opts = LoopOptions { fps: 20, duration: Some(Duration::from_millis(400)), display_data: false };
    let stats = run_client(&mut teleop, &mut client, &opts, &cancel).await.unwrap();
    assert!(stats.iterations > 0);

    cancel.cancel();
    let (steps, mut robot) = host_task.await.unwrap();
    assert!(steps.unwrap() > 0);
    assert_eq!(sim.register(tara_core::drivers::wheel_driver::regs::RIGHT_TARGET_VELOCITY), 5);
    assert_eq!(client.last_observation()["current_right"], 5.0);
    robot.disconnect().await.unwrap();
}

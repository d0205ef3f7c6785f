// File: tara-core/tests/new_robot_tests.rs

use tara_common::config::NewRobotConfig;
use tara_common::models::Action;
use tara_common::traits::Robot;
use tara_core::control::{probe, ProbeOutcome};
use tara_core::robots::new_robot::{run_new_robot_calibration, NewRobot, DUMMY_CALIBRATION_FILE};
use tara_core::Error;

fn robot_in(dir: &std::path::Path) -> NewRobot {
    NewRobot::new(NewRobotConfig { id: Some("test".into()), mock: false, calibration_dir: dir.to_path_buf() })
}

#[tokio::test]
async fn operations_before_connect_report_not_connected() {
    let dir = tempfile::tempdir().unwrap();
    let mut robot = robot_in(dir.path());

    assert!(matches!(robot.get_observation().await, Err(Error::DeviceNotConnected(_))));
    assert!(matches!(robot.send_action(&Action::new()).await, Err(Error::DeviceNotConnected(_))));
    assert!(matches!(robot.disconnect().await, Err(Error::DeviceNotConnected(_))));
    assert!(matches!(robot.teleop_step().await, Err(Error::DeviceNotConnected(_))));
}

#[tokio::test]
async fn connect_calibrates_then_reports_missing_hardware() {
    let dir = tempfile::tempdir().unwrap();
    let cal_dir = dir.path().join("nested").join("calibration");
    let mut robot = robot_in(&cal_dir);
    assert!(!robot.is_calibrated());

    let err = robot.connect(true).await.unwrap_err();
    assert!(err.is_not_implemented());
    assert!(robot.is_connected());
    assert!(robot.is_calibrated());

    let saved = std::fs::read_to_string(cal_dir.join(DUMMY_CALIBRATION_FILE)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(value, serde_json::json!({ "calibrated": true }));

    assert!(matches!(robot.connect(true).await, Err(Error::DeviceAlreadyConnected(_))));
    assert!(robot.get_observation().await.unwrap_err().is_not_implemented());
    assert!(robot.teleop_step().await.unwrap_err().is_not_implemented());

    assert!(robot.disconnect().await.unwrap_err().is_not_implemented());
    assert!(!robot.is_connected());
}

#[test]
fn calibration_helper_overwrites_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(DUMMY_CALIBRATION_FILE), "stale").unwrap();
    let path = run_new_robot_calibration(dir.path()).unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), r#"{"calibrated":true}"#);
}

#[tokio::test]
async fn probe_walks_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut robot = robot_in(dir.path());

    let report = probe(&mut robot).await.unwrap();
    assert_eq!(report.steps.len(), 4);
    for step in ["connect", "get_observation", "send_action", "disconnect"] {
        assert!(matches!(report.outcome(step), Some(ProbeOutcome::NotImplemented(_))), "{step}");
    }
    assert!(!robot.is_connected());
}

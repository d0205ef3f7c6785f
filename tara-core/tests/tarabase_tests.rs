// File: tara-core/tests/tarabase_tests.rs

use serde_json::json;
use tara_common::config::RobotConfig;
use tara_common::models::Action;
use tara_common::traits::Robot;
use tara_core::drivers::wheel_driver::{control, regs};
use tara_core::robots::TaraBase;
use tara_core::Error;

fn mock_base(extra: serde_json::Value) -> TaraBase {
    let mut value = json!({ "type": "tarabase", "mock": true });
    if let (Some(obj), Some(more)) = (value.as_object_mut(), extra.as_object()) {
        obj.extend(more.clone());
    }
    match RobotConfig::from_value(value).unwrap() {
        RobotConfig::TaraBase(cfg) => TaraBase::new(cfg),
        other => panic!("unexpected config {other:?}"),
    }
}

fn action(pairs: &[(&str, f64)]) -> Action {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn wire(rpm: i16) -> u16 {
    rpm as u16
}

#[tokio::test]
async fn connect_puts_controller_in_velocity_mode() {
    let mut base = mock_base(json!({}));
    base.connect(true).await.unwrap();
    let sim = base.sim_handle().unwrap().clone();

    assert_eq!(sim.register(regs::OPERATING_MODE), 3);
    assert_eq!(sim.register(regs::LEFT_ACCEL_TIME), 500);
    assert!(matches!(base.connect(true).await, Err(Error::DeviceAlreadyConnected(_))));
}

#[tokio::test]
async fn wheel_schema_scales_by_max_rpm() {
    let mut base = mock_base(json!({ "max_wheel_rpm": 20.0 }));
    base.connect(true).await.unwrap();
    let sim = base.sim_handle().unwrap().clone();
    sim.clear_writes();

    let sent = base.send_action(&action(&[("left_wheel", -0.5), ("right_wheel", 2.0)])).await.unwrap();
    assert_eq!(sent["left_wheel"], -0.5);
    assert_eq!(sent["right_wheel"], 1.0);
    assert_eq!(
        sim.writes(),
        vec![
            (regs::CONTROL_WORD, control::ENABLE),
            (regs::LEFT_TARGET_VELOCITY, wire(-10)),
            (regs::RIGHT_TARGET_VELOCITY, wire(20)),
        ]
    );

    let obs = base.get_observation().await.unwrap();
    assert_eq!(obs["current_left"], -10.0);
    assert_eq!(obs["current_right"], 20.0);
    assert!(obs["current_angular_z"] > 0.0);
}

#[tokio::test]
async fn discrete_twist_uses_fixed_speeds() {
    let mut base = mock_base(json!({}));
    base.connect(true).await.unwrap();
    let sim = base.sim_handle().unwrap().clone();

    base.send_action(&action(&[("linear_x", 1.0)])).await.unwrap();
    assert_eq!(sim.register(regs::LEFT_TARGET_VELOCITY), wire(-5));
    assert_eq!(sim.register(regs::RIGHT_TARGET_VELOCITY), wire(5));

    base.send_action(&action(&[("linear_x", 1.0), ("linear_y", -1.0)])).await.unwrap();
    assert_eq!(sim.register(regs::LEFT_TARGET_VELOCITY), wire(3));
    assert_eq!(sim.register(regs::RIGHT_TARGET_VELOCITY), wire(3));

    let obs = base.get_observation().await.unwrap();
    assert!(obs["current_linear_x"].abs() < 1e-9);
}

#[tokio::test]
async fn proportional_twist_goes_through_kinematics() {
    let mut base = mock_base(json!({ "drive_mode": "proportional", "max_kinematic_rpm": 10.0 }));
    base.connect(true).await.unwrap();
    let sim = base.sim_handle().unwrap().clone();

    base.send_action(&action(&[("linear_x", 0.1)])).await.unwrap();
    let left = sim.register(regs::LEFT_TARGET_VELOCITY) as i16;
    let right = sim.register(regs::RIGHT_TARGET_VELOCITY) as i16;
    assert!(left < 0 && right > 0);
    assert_eq!(-left, right);
    assert!(right <= 10);
}

#[tokio::test]
async fn emergency_stop_then_clear_on_next_command() {
    let mut base = mock_base(json!({}));
    base.connect(true).await.unwrap();
    let sim = base.sim_handle().unwrap().clone();

    base.send_action(&action(&[("left_wheel", -1.0), ("right_wheel", 1.0)])).await.unwrap();
    base.emergency_stop().await.unwrap();
    assert_eq!(sim.register(regs::CONTROL_WORD), control::EMERGENCY_STOP);

    sim.clear_writes();
    base.send_action(&action(&[("left_wheel", 0.0), ("right_wheel", 0.0)])).await.unwrap();
    assert_eq!(sim.writes()[0], (regs::CONTROL_WORD, control::CLEAR_FAULT));
}

#[tokio::test]
async fn estop_disabled_falls_back_to_stop() {
    let mut base = mock_base(json!({ "emergency_stop_enabled": false }));
    base.connect(true).await.unwrap();
    base.emergency_stop().await.unwrap();
    assert_eq!(base.sim_handle().unwrap().register(regs::CONTROL_WORD), control::STOP);
}

#[tokio::test]
async fn controller_exception_surfaces_and_zeroes_command() {
    let mut base = mock_base(json!({}));
    base.connect(true).await.unwrap();
    let sim = base.sim_handle().unwrap().clone();
    sim.inject_exception(regs::RIGHT_TARGET_VELOCITY, 0x04);

    let err = base
        .send_action(&action(&[("left_wheel", -1.0), ("right_wheel", 1.0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ModbusException { slave: 1, code: 0x04, .. }));

    // velocity readback also fails; observation falls back to the zeroed command
    sim.inject_exception(regs::ACTUAL_VELOCITIES, 0x04);
    let obs = base.get_observation().await.unwrap();
    assert_eq!(obs["current_left"], 0.0);
    assert_eq!(obs["current_right"], 0.0);
}

#[tokio::test]
async fn disconnect_is_idempotent_and_stops_wheels() {
    let mut base = mock_base(json!({}));
    base.disconnect().await.unwrap();

    base.connect(true).await.unwrap();
    let sim = base.sim_handle().unwrap().clone();
    base.send_action(&action(&[("left_wheel", -1.0), ("right_wheel", 1.0)])).await.unwrap();
    base.disconnect().await.unwrap();

    assert!(!base.is_connected());
    assert_eq!(sim.register(regs::LEFT_TARGET_VELOCITY), 0);
    assert!(matches!(
        base.send_action(&Action::new()).await,
        Err(Error::DeviceNotConnected(_))
    ));
}

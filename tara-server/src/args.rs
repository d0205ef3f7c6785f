// tara-server/src/args.rs
//
// Command-line surface of the `tara` binary. Device flags use dotted names
// (`--robot.type`, `--teleop.port`, ...) and are folded into a JSON object
// that the tagged device configs deserialize from, so unknown combinations
// are rejected by the same validation the config files go through.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::{Map, Value};

use tara_common::config::{
    parse_cameras, ClientConfig, DatasetConfig, HostConfig, RobotConfig, TeleoperatorConfig, MAX_FPS,
};
use tara_common::error::Error;

#[derive(Parser, Debug)]
#[command(name = "tara")]
#[command(author, version, about = "Tara - teleoperate, record and calibrate Tara robots")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive a robot from a teleoperator (or several pairs from `--config`).
    Teleoperate(TeleoperateArgs),
    /// Teleoperate while recording episodes into a local dataset.
    Record(RecordArgs),
    /// Run the interactive calibration of one robot or teleoperator.
    Calibrate(CalibrateArgs),
    /// Walk a robot through connect, observe, act and disconnect.
    Probe(ProbeArgs),
    /// Serve a robot to a remote client over UDP.
    Host(HostArgs),
    /// Teleoperate a robot served by `tara host`.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RobotArgs {
    #[arg(id = "robot.type", long = "robot.type", value_name = "TYPE")]
    pub robot_type: Option<String>,
    #[arg(id = "robot.id", long = "robot.id")]
    pub id: Option<String>,
    #[arg(id = "robot.port", long = "robot.port")]
    pub port: Option<String>,
    #[arg(id = "robot.left_port", long = "robot.left_port")]
    pub left_port: Option<String>,
    #[arg(id = "robot.right_port", long = "robot.right_port")]
    pub right_port: Option<String>,
    /// Inline mapping, e.g. `{ front: {type: opencv, index_or_path: 0, width: 640, height: 480, fps: 30}}`
    #[arg(id = "robot.cameras", long = "robot.cameras")]
    pub cameras: Option<String>,
    #[arg(id = "robot.mock", long = "robot.mock", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub mock: Option<bool>,
    #[arg(id = "robot.calibration_dir", long = "robot.calibration_dir")]
    pub calibration_dir: Option<PathBuf>,
    #[arg(id = "robot.use_degrees", long = "robot.use_degrees", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub use_degrees: Option<bool>,
    #[arg(id = "robot.max_relative_target", long = "robot.max_relative_target")]
    pub max_relative_target: Option<f64>,
    #[arg(id = "robot.disable_torque_on_disconnect", long = "robot.disable_torque_on_disconnect", action = ArgAction::Set)]
    pub disable_torque_on_disconnect: Option<bool>,
    #[arg(id = "robot.slave_id", long = "robot.slave_id")]
    pub slave_id: Option<u8>,
    #[arg(id = "robot.baudrate", long = "robot.baudrate")]
    pub baudrate: Option<u32>,
    #[arg(id = "robot.max_wheel_rpm", long = "robot.max_wheel_rpm")]
    pub max_wheel_rpm: Option<f64>,
    #[arg(id = "robot.turn_wheel_rpm", long = "robot.turn_wheel_rpm")]
    pub turn_wheel_rpm: Option<f64>,
    #[arg(id = "robot.max_linear_speed", long = "robot.max_linear_speed")]
    pub max_linear_speed: Option<f64>,
    #[arg(id = "robot.max_angular_speed", long = "robot.max_angular_speed")]
    pub max_angular_speed: Option<f64>,
    /// `discrete` or `proportional`
    #[arg(id = "robot.drive_mode", long = "robot.drive_mode")]
    pub drive_mode: Option<String>,
    #[arg(id = "robot.emergency_stop_enabled", long = "robot.emergency_stop_enabled", action = ArgAction::Set)]
    pub emergency_stop_enabled: Option<bool>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TeleopArgs {
    #[arg(id = "teleop.type", long = "teleop.type", value_name = "TYPE")]
    pub teleop_type: Option<String>,
    #[arg(id = "teleop.id", long = "teleop.id")]
    pub id: Option<String>,
    #[arg(id = "teleop.port", long = "teleop.port")]
    pub port: Option<String>,
    #[arg(id = "teleop.left_port", long = "teleop.left_port")]
    pub left_port: Option<String>,
    #[arg(id = "teleop.right_port", long = "teleop.right_port")]
    pub right_port: Option<String>,
    #[arg(id = "teleop.mock", long = "teleop.mock", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub mock: Option<bool>,
    #[arg(id = "teleop.calibration_dir", long = "teleop.calibration_dir")]
    pub calibration_dir: Option<PathBuf>,
    #[arg(id = "teleop.use_degrees", long = "teleop.use_degrees", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub use_degrees: Option<bool>,
    #[arg(id = "teleop.deadzone", long = "teleop.deadzone")]
    pub deadzone: Option<f64>,
    #[arg(id = "teleop.gamepad_index", long = "teleop.gamepad_index")]
    pub gamepad_index: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    #[arg(id = "dataset.repo_id", long = "dataset.repo_id")]
    pub repo_id: Option<String>,
    #[arg(id = "dataset.single_task", long = "dataset.single_task")]
    pub single_task: Option<String>,
    #[arg(id = "dataset.root", long = "dataset.root")]
    pub root: Option<PathBuf>,
    #[arg(id = "dataset.fps", long = "dataset.fps", value_parser = fps_parser())]
    pub fps: Option<u32>,
    #[arg(id = "dataset.episode_time_s", long = "dataset.episode_time_s")]
    pub episode_time_s: Option<f64>,
    #[arg(id = "dataset.reset_time_s", long = "dataset.reset_time_s")]
    pub reset_time_s: Option<f64>,
    #[arg(id = "dataset.num_episodes", long = "dataset.num_episodes")]
    pub num_episodes: Option<u32>,
    #[arg(id = "dataset.push_to_hub", long = "dataset.push_to_hub", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub push_to_hub: Option<bool>,
}

#[derive(Args, Debug)]
pub struct TeleoperateArgs {
    #[command(flatten)]
    pub robot: RobotArgs,
    #[command(flatten)]
    pub teleop: TeleopArgs,
    /// TOML file describing one or more robot/teleoperator pairs.
    #[arg(long, conflicts_with_all = ["robot.type", "teleop.type"])]
    pub config: Option<PathBuf>,
    #[arg(long, default_value_t = 60, value_parser = fps_parser())]
    pub fps: u32,
    /// Stop after this many seconds; runs until Ctrl-C otherwise.
    #[arg(long = "teleop_time_s")]
    pub teleop_time_s: Option<f64>,
    #[arg(long = "display_data", default_value_t = false, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub display_data: bool,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[command(flatten)]
    pub robot: RobotArgs,
    #[command(flatten)]
    pub teleop: TeleopArgs,
    #[command(flatten)]
    pub dataset: DatasetArgs,
    /// Policy checkpoint directory.
    #[arg(id = "policy.path", long = "policy.path")]
    pub policy_path: Option<PathBuf>,
    #[arg(long = "display_data", default_value_t = false, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub display_data: bool,
    /// Append to an existing dataset instead of creating one.
    #[arg(long, default_value_t = false, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub resume: bool,
}

#[derive(Args, Debug)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub robot: RobotArgs,
    #[command(flatten)]
    pub teleop: TeleopArgs,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub robot: RobotArgs,
}

#[derive(Args, Debug)]
pub struct HostArgs {
    #[command(flatten)]
    pub robot: RobotArgs,
    #[arg(id = "host.bind_ip", long = "host.bind_ip", default_value = "0.0.0.0")]
    pub bind_ip: String,
    #[arg(id = "host.port_cmd", long = "host.port_cmd")]
    pub port_cmd: Option<u16>,
    #[arg(id = "host.port_observations", long = "host.port_observations")]
    pub port_observations: Option<u16>,
    #[arg(id = "host.watchdog_timeout_ms", long = "host.watchdog_timeout_ms")]
    pub watchdog_timeout_ms: Option<u64>,
    #[arg(id = "host.max_loop_freq_hz", long = "host.max_loop_freq_hz")]
    pub max_loop_freq_hz: Option<u32>,
    #[arg(id = "host.connection_time_s", long = "host.connection_time_s")]
    pub connection_time_s: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    #[command(flatten)]
    pub teleop: TeleopArgs,
    #[arg(id = "client.remote_ip", long = "client.remote_ip")]
    pub remote_ip: Option<String>,
    #[arg(id = "client.port_cmd", long = "client.port_cmd")]
    pub port_cmd: Option<u16>,
    #[arg(id = "client.port_observations", long = "client.port_observations")]
    pub port_observations: Option<u16>,
    #[arg(id = "client.polling_timeout_ms", long = "client.polling_timeout_ms")]
    pub polling_timeout_ms: Option<u64>,
    #[arg(long, default_value_t = 30, value_parser = fps_parser())]
    pub fps: u32,
    #[arg(long = "teleop_time_s")]
    pub teleop_time_s: Option<f64>,
    #[arg(long = "display_data", default_value_t = false, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub display_data: bool,
}

fn fps_parser() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(1..=MAX_FPS as i64)
}

fn put(map: &mut Map<String, Value>, key: &str, value: Option<impl Into<Value>>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.into());
    }
}

fn put_path(map: &mut Map<String, Value>, key: &str, value: &Option<PathBuf>) {
    put(map, key, value.as_ref().map(|p| p.display().to_string()));
}

impl RobotArgs {
    /// The robot described by the flags, or `None` without `--robot.type`.
    pub fn to_config(&self) -> Result<Option<RobotConfig>, Error> {
        let Some(kind) = &self.robot_type else { return Ok(None) };
        let mut map = Map::new();
        map.insert("type".into(), Value::from(kind.as_str()));
        put(&mut map, "id", self.id.clone());
        put(&mut map, "port", self.port.clone());
        put(&mut map, "left_port", self.left_port.clone());
        put(&mut map, "right_port", self.right_port.clone());
        put(&mut map, "mock", self.mock);
        put_path(&mut map, "calibration_dir", &self.calibration_dir);
        put(&mut map, "use_degrees", self.use_degrees);
        put(&mut map, "max_relative_target", self.max_relative_target);
        put(&mut map, "disable_torque_on_disconnect", self.disable_torque_on_disconnect);
        put(&mut map, "slave_id", self.slave_id);
        put(&mut map, "baudrate", self.baudrate);
        put(&mut map, "max_wheel_rpm", self.max_wheel_rpm);
        put(&mut map, "turn_wheel_rpm", self.turn_wheel_rpm);
        put(&mut map, "max_linear_speed", self.max_linear_speed);
        put(&mut map, "max_angular_speed", self.max_angular_speed);
        put(&mut map, "drive_mode", self.drive_mode.clone());
        put(&mut map, "emergency_stop_enabled", self.emergency_stop_enabled);
        if let Some(literal) = &self.cameras {
            map.insert("cameras".into(), serde_json::to_value(parse_cameras(literal)?)?);
        }
        RobotConfig::from_value(Value::Object(map)).map(Some)
    }

    pub fn require(&self) -> Result<RobotConfig, Error> {
        self.to_config()?
            .ok_or_else(|| Error::Config("--robot.type is required".into()))
    }
}

impl TeleopArgs {
    pub fn to_config(&self) -> Result<Option<TeleoperatorConfig>, Error> {
        let Some(kind) = &self.teleop_type else { return Ok(None) };
        let mut map = Map::new();
        map.insert("type".into(), Value::from(kind.as_str()));
        put(&mut map, "id", self.id.clone());
        put(&mut map, "port", self.port.clone());
        put(&mut map, "left_port", self.left_port.clone());
        put(&mut map, "right_port", self.right_port.clone());
        put(&mut map, "mock", self.mock);
        put_path(&mut map, "calibration_dir", &self.calibration_dir);
        put(&mut map, "use_degrees", self.use_degrees);
        put(&mut map, "deadzone", self.deadzone);
        put(&mut map, "gamepad_index", self.gamepad_index);
        TeleoperatorConfig::from_value(Value::Object(map)).map(Some)
    }

    pub fn require(&self) -> Result<TeleoperatorConfig, Error> {
        self.to_config()?
            .ok_or_else(|| Error::Config("--teleop.type is required".into()))
    }
}

impl DatasetArgs {
    pub fn to_config(&self) -> Result<DatasetConfig, Error> {
        let mut cfg = DatasetConfig::default();
        if let Some(v) = &self.repo_id {
            cfg.repo_id = v.clone();
        }
        if let Some(v) = &self.single_task {
            cfg.single_task = v.clone();
        }
        if self.root.is_some() {
            cfg.root = self.root.clone();
        }
        cfg.fps = self.fps.unwrap_or(cfg.fps);
        cfg.episode_time_s = self.episode_time_s.unwrap_or(cfg.episode_time_s);
        cfg.reset_time_s = self.reset_time_s.unwrap_or(cfg.reset_time_s);
        cfg.num_episodes = self.num_episodes.unwrap_or(cfg.num_episodes);
        cfg.push_to_hub = self.push_to_hub.unwrap_or(cfg.push_to_hub);
        cfg.validate()?;
        Ok(cfg)
    }
}

impl HostArgs {
    pub fn to_config(&self) -> HostConfig {
        let d = HostConfig::default();
        HostConfig {
            port_cmd: self.port_cmd.unwrap_or(d.port_cmd),
            port_observations: self.port_observations.unwrap_or(d.port_observations),
            watchdog_timeout_ms: self.watchdog_timeout_ms.unwrap_or(d.watchdog_timeout_ms),
            max_loop_freq_hz: self.max_loop_freq_hz.unwrap_or(d.max_loop_freq_hz),
            connection_time_s: self.connection_time_s.or(d.connection_time_s),
        }
    }
}

impl ClientArgs {
    pub fn to_config(&self) -> ClientConfig {
        let d = ClientConfig::default();
        ClientConfig {
            remote_ip: self.remote_ip.clone().unwrap_or(d.remote_ip),
            port_cmd: self.port_cmd.unwrap_or(d.port_cmd),
            port_observations: self.port_observations.unwrap_or(d.port_observations),
            polling_timeout_ms: self.polling_timeout_ms.unwrap_or(d.polling_timeout_ms),
            connect_timeout_s: d.connect_timeout_s,
        }
    }
}

/// `--teleop_time_s` as a duration; negative or non-finite values are refused.
pub fn duration_from_secs(secs: Option<f64>) -> Result<Option<Duration>, Error> {
    secs.map(|s| {
        Duration::try_from_secs_f64(s)
            .map_err(|_| Error::Config(format!("time limit must be a non-negative number of seconds, got {s}")))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tara_common::config::DriveMode;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn so101_teleoperate_flags() {
        let Command::Teleoperate(args) = parse(&[
            "tara",
            "teleoperate",
            "--robot.type=so101_follower",
            "--robot.port=/dev/tty.usbmodem58760431541",
            "--robot.id=my_awesome_follower_arm",
            "--teleop.type=so101_leader",
            "--teleop.port=/dev/tty.usbmodem58760431551",
            "--teleop.id=my_awesome_leader_arm",
            "--display_data=true",
        ]) else {
            panic!("expected teleoperate");
        };
        assert!(args.display_data);

        let robot = args.robot.require().unwrap();
        assert_eq!(robot.type_name(), "so101_follower");
        assert_eq!(robot.id(), Some("my_awesome_follower_arm"));
        let teleop = args.teleop.require().unwrap();
        assert_eq!(teleop.type_name(), "so101_leader");
    }

    #[test]
    fn record_flags_with_cameras_and_dataset() {
        let Command::Record(args) = parse(&[
            "tara",
            "record",
            "--robot.type=so101_follower",
            "--robot.port=/dev/ttyACM0",
            "--robot.cameras={ front: {type: opencv, index_or_path: 0, width: 1920, height: 1080, fps: 30}}",
            "--teleop.type=so101_leader",
            "--teleop.port=/dev/ttyACM1",
            "--dataset.repo_id=aliberts/record-test",
            "--dataset.num_episodes=2",
            "--dataset.single_task=Grab the black cube",
            "--dataset.push_to_hub=false",
            "--resume",
        ]) else {
            panic!("expected record");
        };
        assert!(args.resume);
        assert!(!args.display_data);

        let robot = args.robot.require().unwrap();
        let cameras = robot.cameras().unwrap();
        assert_eq!(cameras["front"].width, Some(1920));

        let dataset = args.dataset.to_config().unwrap();
        assert_eq!(dataset.num_episodes, 2);
        assert_eq!(dataset.single_task, "Grab the black cube");
        assert!(!dataset.push_to_hub);
        assert_eq!(dataset.fps, 30);
    }

    #[test]
    fn tarabase_tuning_flags() {
        let Command::Teleoperate(args) = parse(&[
            "tara",
            "teleoperate",
            "--robot.type=tarabase",
            "--robot.mock",
            "--robot.max_wheel_rpm=12",
            "--robot.drive_mode=proportional",
            "--teleop.type=gamepadtara",
            "--teleop.mock",
            "--teleop.deadzone=0.2",
            "--teleop_time_s=5",
        ]) else {
            panic!("expected teleoperate");
        };
        let RobotConfig::TaraBase(base) = args.robot.require().unwrap() else {
            panic!("expected tarabase");
        };
        assert!(base.mock);
        assert_eq!(base.max_wheel_rpm, 12.0);
        assert_eq!(base.drive_mode, DriveMode::Proportional);
        assert!(args.teleop.require().unwrap().is_mock());
        assert_eq!(duration_from_secs(args.teleop_time_s).unwrap(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn unknown_type_and_bad_values_are_rejected() {
        let robot = RobotArgs { robot_type: Some("hexapod".into()), ..Default::default() };
        assert!(robot.to_config().is_err());

        let base = RobotArgs {
            robot_type: Some("tarabase".into()),
            max_wheel_rpm: Some(-1.0),
            ..Default::default()
        };
        assert!(base.to_config().is_err());

        assert!(RobotArgs::default().to_config().unwrap().is_none());
        assert!(RobotArgs::default().require().is_err());
        assert!(duration_from_secs(Some(-2.0)).is_err());
    }

    #[test]
    fn fps_flags_are_bounded() {
        let teleoperate = |fps: &str| {
            let flag = format!("--fps={fps}");
            Cli::try_parse_from(["tara", "teleoperate", "--robot.type=tarabase", "--teleop.type=gamepadtara", flag.as_str()])
        };
        assert!(teleoperate("0").is_err());
        assert!(teleoperate("4294967295").is_err());
        assert!(teleoperate("1000").is_ok());

        assert!(Cli::try_parse_from(["tara", "client", "--teleop.type=gamepadtara", "--fps=100000"]).is_err());
        assert!(Cli::try_parse_from(["tara", "record", "--dataset.fps=0"]).is_err());
        assert!(Cli::try_parse_from(["tara", "record", "--dataset.fps=30"]).is_ok());
    }

    #[test]
    fn config_file_excludes_device_flags() {
        assert!(Cli::try_parse_from(["tara", "teleoperate", "--config=pairs.toml", "--robot.type=tarabase"]).is_err());
    }

    #[test]
    fn host_and_client_defaults() {
        let Command::Host(host) = parse(&["tara", "host", "--robot.type=so101_follower", "--robot.mock"]) else {
            panic!("expected host");
        };
        assert_eq!(host.to_config(), HostConfig::default());

        let Command::Client(client) = parse(&[
            "tara",
            "client",
            "--teleop.type=so101_leader",
            "--teleop.mock",
            "--client.remote_ip=192.168.1.20",
        ]) else {
            panic!("expected client");
        };
        let cfg = client.to_config();
        assert_eq!(cfg.remote_ip, "192.168.1.20");
        assert_eq!(cfg.port_cmd, 6001);
    }
}

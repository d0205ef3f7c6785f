//! tara-core/src/remote/host.rs
//!
//! Robot-side loop. Each step drains pending commands (latest wins), applies
//! it, trips the watchdog when commands stop arriving, and sends the current
//! observation back to the last client.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tara_common::config::HostConfig;
use tara_common::models::Action;
use tara_common::traits::Robot;

use crate::remote::protocol::{RemoteMessage, MAX_DATAGRAM};
use crate::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub command_applied: bool,
    pub watchdog_tripped: bool,
    pub observation_sent: bool,
}

pub struct RobotHost {
    config: HostConfig,
    cmd: UdpSocket,
    obs: UdpSocket,
    client: Option<SocketAddr>,
    last_command: Instant,
    watchdog_active: bool,
    buf: Vec<u8>,
}

impl RobotHost {
    pub async fn bind(ip: IpAddr, config: HostConfig) -> Result<Self, Error> {
        let cmd = UdpSocket::bind(SocketAddr::new(ip, config.port_cmd)).await?;
        let obs = UdpSocket::bind(SocketAddr::new(ip, config.port_observations)).await?;
        info!(
            "Robot host listening for commands on {} and sending observations from {}",
            cmd.local_addr()?,
            obs.local_addr()?
        );
        Ok(Self {
            config,
            cmd,
            obs,
            client: None,
            last_command: Instant::now(),
            watchdog_active: false,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub fn command_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.cmd.local_addr()?)
    }

    pub fn observation_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.obs.local_addr()?)
    }

    /// Latest valid action waiting on the command socket, if any.
    fn drain_commands(&mut self) -> Result<Option<Action>, Error> {
        let mut latest = None;
        loop {
            match self.cmd.try_recv_from(&mut self.buf) {
                Ok((len, from)) => match RemoteMessage::decode(&self.buf[..len]) {
                    Ok(RemoteMessage::Action { action }) => {
                        self.client = Some(from);
                        latest = Some(action);
                    }
                    Ok(other) => debug!("host ignoring {:?} from {}", other, from),
                    Err(e) => warn!("Undecodable command from {}: {:?}", from, e),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(latest)
    }

    pub async fn step(&mut self, robot: &mut dyn Robot) -> Result<StepOutcome, Error> {
        let mut outcome = StepOutcome::default();

        if let Some(action) = self.drain_commands()? {
            self.last_command = Instant::now();
            self.watchdog_active = false;
            match robot.send_action(&action).await {
                Ok(_) => outcome.command_applied = true,
                Err(e) => error!("Failed to apply remote command: {:?}", e),
            }
        }

        let watchdog = Duration::from_millis(self.config.watchdog_timeout_ms);
        if !self.watchdog_active && self.last_command.elapsed() > watchdog {
            warn!(
                "Command not received for more than {} milliseconds. Stopping the robot.",
                self.config.watchdog_timeout_ms
            );
            self.watchdog_active = true;
            outcome.watchdog_tripped = true;
            if let Err(e) = robot.emergency_stop().await {
                error!("Watchdog stop failed: {:?}", e);
            }
        }

        if let Some(client) = self.client {
            match robot.get_observation().await {
                Ok(observation) => {
                    let bytes = RemoteMessage::Observation { observation }.encode()?;
                    match self.obs.send_to(&bytes, client).await {
                        Ok(_) => outcome.observation_sent = true,
                        Err(e) => warn!("Could not send observation to {}: {:?}", client, e),
                    }
                }
                Err(e) => warn!("Could not read observation: {:?}", e),
            }
        }
        Ok(outcome)
    }

    /// Steps at `max_loop_freq_hz` until cancelled or `connection_time_s`
    /// elapses. Returns the number of steps run.
    pub async fn run(&mut self, robot: &mut dyn Robot, cancel: &CancellationToken) -> Result<u64, Error> {
        let period = Duration::from_secs_f64(1.0 / self.config.max_loop_freq_hz.max(1) as f64);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let limit = self.config.connection_time_s.map(Duration::from_secs);
        let start = Instant::now();
        let mut steps = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if limit.is_some_and(|l| start.elapsed() >= l) {
                info!("Host connection time elapsed");
                break;
            }
            self.step(robot).await?;
            steps += 1;
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::client::RobotClient;
    use tara_common::config::ClientConfig;
    use tara_common::models::Observation;
    use tara_common::traits::MockRobot;

    async fn loopback_pair(watchdog_ms: u64) -> (RobotHost, RobotClient) {
        let host = RobotHost::bind(
            "127.0.0.1".parse().unwrap(),
            HostConfig { port_cmd: 0, port_observations: 0, watchdog_timeout_ms: watchdog_ms, ..Default::default() },
        )
        .await
        .unwrap();
        let client = RobotClient::connect(ClientConfig {
            remote_ip: "127.0.0.1".into(),
            port_cmd: host.command_addr().unwrap().port(),
            port_observations: host.observation_addr().unwrap().port(),
            polling_timeout_ms: 200,
            ..Default::default()
        })
        .await
        .unwrap();
        (host, client)
    }

    fn action(v: f64) -> Action {
        Action::from([("shoulder_pan.pos".to_string(), v)])
    }

    #[tokio::test]
    async fn latest_command_wins_and_observation_returns() {
        let (mut host, mut client) = loopback_pair(5_000).await;
        let mut robot = MockRobot::new();
        robot
            .expect_send_action()
            .times(1)
            .withf(|a| a["shoulder_pan.pos"] == 3.0)
            .returning(|a| Ok(a.clone()));
        robot
            .expect_get_observation()
            .returning(|| Ok(Observation::from([("shoulder_pan.pos".to_string(), 2.5)])));

        client.send_action(&action(1.0)).await.unwrap();
        client.send_action(&action(3.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let outcome = host.step(&mut robot).await.unwrap();
        assert!(outcome.command_applied);
        assert!(outcome.observation_sent);
        assert!(!outcome.watchdog_tripped);

        let obs = client.poll_observation().await.unwrap();
        assert_eq!(obs["shoulder_pan.pos"], 2.5);
    }

    #[tokio::test]
    async fn watchdog_stops_once_and_rearms_on_next_command() {
        let (mut host, mut client) = loopback_pair(100).await;
        let mut robot = MockRobot::new();
        robot.expect_emergency_stop().times(2).returning(|| Ok(()));
        robot.expect_send_action().times(1).returning(|a| Ok(a.clone()));
        robot.expect_get_observation().returning(|| Ok(Observation::new()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(host.step(&mut robot).await.unwrap().watchdog_tripped);
        assert!(!host.step(&mut robot).await.unwrap().watchdog_tripped);

        client.send_action(&action(0.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let outcome = host.step(&mut robot).await.unwrap();
        assert!(outcome.command_applied && !outcome.watchdog_tripped);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(host.step(&mut robot).await.unwrap().watchdog_tripped);
    }

    #[tokio::test]
    async fn robot_errors_do_not_end_the_host() {
        let (mut host, mut client) = loopback_pair(5_000).await;
        let mut robot = MockRobot::new();
        robot
            .expect_send_action()
            .returning(|_| Err(Error::not_connected("so101_follower")));
        robot.expect_get_observation().returning(|| Ok(Observation::new()));

        client.send_action(&action(0.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let outcome = host.step(&mut robot).await.unwrap();
        assert!(!outcome.command_applied);
        assert!(outcome.observation_sent);
    }
}

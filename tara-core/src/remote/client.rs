//! tara-core/src/remote/client.rs
//!
//! Operator-side endpoint: pushes actions to the host and keeps the most
//! recent observation the host sent back.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tara_common::config::ClientConfig;
use tara_common::models::{Action, Observation};
use tara_common::traits::Teleoperator;

use crate::control::display::LiveTable;
use crate::control::teleop_loop::{LoopOptions, LoopStats};
use crate::remote::protocol::{RemoteMessage, MAX_DATAGRAM};
use crate::Error;

pub struct RobotClient {
    config: ClientConfig,
    socket: UdpSocket,
    host_cmd: SocketAddr,
    host_obs: SocketAddr,
    last_observation: Observation,
    buf: Vec<u8>,
}

impl RobotClient {
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        let host_ip: IpAddr = config.remote_ip.parse()?;
        let bind: SocketAddr = if host_ip.is_ipv4() { "0.0.0.0:0".parse()? } else { "[::]:0".parse()? };
        let socket = UdpSocket::bind(bind).await?;
        let host_cmd = SocketAddr::new(host_ip, config.port_cmd);
        let host_obs = SocketAddr::new(host_ip, config.port_observations);
        info!("Remote client on {} talking to host {}", socket.local_addr()?, host_ip);
        Ok(Self {
            config,
            socket,
            host_cmd,
            host_obs,
            last_observation: Observation::new(),
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub async fn send_action(&mut self, action: &Action) -> Result<(), Error> {
        let bytes = RemoteMessage::Action { action: action.clone() }.encode()?;
        self.socket.send_to(&bytes, self.host_cmd).await?;
        Ok(())
    }

    /// Waits up to `polling_timeout_ms` for an observation, then drains the
    /// rest without blocking. Returns the newest one seen, or the previous
    /// observation when nothing arrived.
    pub async fn poll_observation(&mut self) -> Result<&Observation, Error> {
        let wait = Duration::from_millis(self.config.polling_timeout_ms);
        if let Ok(received) = timeout(wait, self.socket.recv_from(&mut self.buf)).await {
            let (len, from) = received?;
            self.accept(len, from);
            loop {
                match self.socket.try_recv_from(&mut self.buf) {
                    Ok((len, from)) => self.accept(len, from),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(&self.last_observation)
    }

    pub fn last_observation(&self) -> &Observation {
        &self.last_observation
    }

    fn accept(&mut self, len: usize, from: SocketAddr) {
        if from != self.host_obs {
            debug!("client ignoring datagram from {}", from);
            return;
        }
        match RemoteMessage::decode(&self.buf[..len]) {
            Ok(RemoteMessage::Observation { observation }) => self.last_observation = observation,
            Ok(other) => debug!("client ignoring {:?}", other),
            Err(e) => warn!("Undecodable observation: {:?}", e),
        }
    }
}

/// Teleoperates a remote robot: local teleoperator actions go to the host,
/// observations come back.
pub async fn run_client(
    teleop: &mut dyn Teleoperator,
    client: &mut RobotClient,
    opts: &LoopOptions,
    cancel: &CancellationToken,
) -> Result<LoopStats, Error> {
    let start = Instant::now();
    let mut ticker = interval(opts.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut table = LiveTable::default();
    let mut stats = LoopStats::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if opts.duration.is_some_and(|d| start.elapsed() >= d) {
            break;
        }
        let tick = Instant::now();
        let action = teleop.get_action().await?;
        client.send_action(&action).await?;
        let observation = client.poll_observation().await?;
        if opts.display_data {
            table.draw(observation, tick.elapsed());
        }
        stats.iterations += 1;
    }
    stats.elapsed = start.elapsed();
    Ok(stats)
}

//! tara-core/src/feetech/bus.rs
//!
//! A named set of servos sharing one serial link. Values are raw register
//! contents except for `read_positions`/`write_goal_positions`, which go
//! through the motor's calibration and `NormMode`.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use tara_common::models::{CalibrationMap, MotorCalibration};

use crate::feetech::normalize::{normalize, unnormalize, NormMode};
use crate::feetech::protocol::{
    decode_sign_magnitude, encode, encode_sign_magnitude, instruction, read_packet, Packet, BROADCAST_ID,
};
use crate::feetech::table::{self, decode_le, encode_le, Register};
use crate::transport::BoxedLink;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motor {
    pub id: u8,
    pub model: &'static str,
    pub norm_mode: NormMode,
}

impl Motor {
    pub fn sts3215(id: u8, norm_mode: NormMode) -> Self {
        Self { id, model: table::STS3215, norm_mode }
    }
}

pub struct FeetechBus {
    port: String,
    motors: Vec<(String, Motor)>,
    calibration: CalibrationMap,
    link: Option<BoxedLink>,
    timeout: Duration,
}

impl FeetechBus {
    pub fn new(port: impl Into<String>, motors: Vec<(String, Motor)>, calibration: CalibrationMap) -> Self {
        Self {
            port: port.into(),
            motors,
            calibration,
            link: None,
            timeout: Duration::from_millis(200),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn motor_names(&self) -> impl Iterator<Item = &str> {
        self.motors.iter().map(|(name, _)| name.as_str())
    }

    pub fn motor(&self, name: &str) -> Result<&Motor, Error> {
        self.motors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
            .ok_or_else(|| Error::Config(format!("no motor named `{name}` on {}", self.port)))
    }

    pub fn calibration(&self) -> &CalibrationMap {
        &self.calibration
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// True when a calibration entry exists for every motor on the bus.
    pub fn is_calibrated(&self) -> bool {
        self.motors.iter().all(|(name, _)| self.calibration.contains_key(name))
    }

    /// Takes ownership of the link and pings every motor.
    pub async fn connect(&mut self, link: BoxedLink) -> Result<(), Error> {
        if self.link.is_some() {
            return Err(Error::already_connected(format!("servo bus {}", self.port)));
        }
        self.link = Some(link);

        let ids: Vec<(String, u8)> = self.motors.iter().map(|(n, m)| (n.clone(), m.id)).collect();
        for (name, id) in ids {
            if let Err(e) = self.ping(id).await {
                self.link = None;
                return Err(Error::Protocol(format!(
                    "motor `{name}` (id {id}) on {} did not answer: {e}",
                    self.port
                )));
            }
        }
        info!("Servo bus {} connected ({} motors)", self.port, self.motors.len());
        Ok(())
    }

    pub async fn disconnect(&mut self, disable_torque: bool) -> Result<(), Error> {
        if self.link.is_none() {
            return Err(Error::not_connected(format!("servo bus {}", self.port)));
        }
        if disable_torque {
            if let Err(e) = self.disable_torque().await {
                warn!("Could not disable torque on {}: {:?}", self.port, e);
            }
        }
        self.link = None;
        info!("Servo bus {} disconnected", self.port);
        Ok(())
    }

    pub async fn ping(&mut self, id: u8) -> Result<(), Error> {
        self.request(id, instruction::PING, &[]).await.map(|_| ())
    }

    pub async fn read(&mut self, register: Register, motor: &str) -> Result<i32, Error> {
        let id = self.motor(motor)?.id;
        let reply = self.request(id, instruction::READ, &[register.addr, register.len]).await?;
        if reply.params.len() != register.len as usize {
            return Err(Error::Protocol(format!(
                "{} from `{motor}`: expected {} bytes, got {}",
                register.name,
                register.len,
                reply.params.len()
            )));
        }
        Ok(decode_value(register, decode_le(&reply.params)))
    }

    pub async fn write(&mut self, register: Register, motor: &str, value: i32) -> Result<(), Error> {
        let id = self.motor(motor)?.id;
        let mut params = vec![register.addr];
        params.extend(encode_le(encode_value(register, value)?, register.len));
        self.request(id, instruction::WRITE, &params).await.map(|_| ())
    }

    /// Reads `register` from every motor in one round trip.
    pub async fn sync_read(&mut self, register: Register) -> Result<BTreeMap<String, i32>, Error> {
        let ids: Vec<(String, u8)> = self.motors.iter().map(|(n, m)| (n.clone(), m.id)).collect();

        let mut params = vec![register.addr, register.len];
        params.extend(ids.iter().map(|(_, id)| *id));
        let packet = encode(BROADCAST_ID, instruction::SYNC_READ, &params);

        let link = self.link_mut()?;
        link.write_all(&packet).await?;
        link.flush().await?;

        let mut values = BTreeMap::new();
        for (name, id) in ids {
            let reply = self.receive().await?;
            if reply.id != id {
                return Err(Error::Protocol(format!(
                    "sync read of {}: expected id {id}, got {}",
                    register.name, reply.id
                )));
            }
            check_status(&reply)?;
            values.insert(name, decode_value(register, decode_le(&reply.params)));
        }
        Ok(values)
    }

    /// Writes per-motor values in one broadcast; no replies are expected.
    pub async fn sync_write(&mut self, register: Register, values: &BTreeMap<String, i32>) -> Result<(), Error> {
        if values.is_empty() {
            return Ok(());
        }
        let mut params = vec![register.addr, register.len];
        for (name, value) in values {
            params.push(self.motor(name)?.id);
            params.extend(encode_le(encode_value(register, *value)?, register.len));
        }
        let packet = encode(BROADCAST_ID, instruction::SYNC_WRITE, &params);
        trace!("servo sync write {} on {}: {:?}", register.name, self.port, values);

        let link = self.link_mut()?;
        link.write_all(&packet).await?;
        link.flush().await?;
        Ok(())
    }

    /// Present positions, normalized per motor.
    pub async fn read_positions(&mut self) -> Result<BTreeMap<String, f64>, Error> {
        let raw = self.sync_read(table::PRESENT_POSITION).await?;
        raw.into_iter()
            .map(|(name, value)| {
                let (cal, mode) = self.calibration_of(&name)?;
                Ok((name, normalize(value, cal, mode)?))
            })
            .collect()
    }

    /// Goal positions given in normalized units.
    pub async fn write_goal_positions(&mut self, goals: &BTreeMap<String, f64>) -> Result<(), Error> {
        let mut raw = BTreeMap::new();
        for (name, value) in goals {
            let (cal, mode) = self.calibration_of(name)?;
            raw.insert(name.clone(), unnormalize(*value, cal, mode)?);
        }
        self.sync_write(table::GOAL_POSITION, &raw).await
    }

    pub async fn enable_torque(&mut self) -> Result<(), Error> {
        for name in self.names() {
            self.write(table::TORQUE_ENABLE, &name, 1).await?;
            self.write(table::LOCK, &name, 1).await?;
        }
        Ok(())
    }

    pub async fn disable_torque(&mut self) -> Result<(), Error> {
        for name in self.names() {
            self.write(table::TORQUE_ENABLE, &name, 0).await?;
            self.write(table::LOCK, &name, 0).await?;
        }
        Ok(())
    }

    /// Puts every motor in position mode.
    pub async fn set_position_mode(&mut self) -> Result<(), Error> {
        for name in self.names() {
            self.write(table::OPERATING_MODE, &name, table::operating_mode::POSITION).await?;
        }
        Ok(())
    }

    /// Sets homing offsets so the current pose reads as the middle of the
    /// encoder range. Returns the offsets written.
    pub async fn set_half_turn_homings(&mut self) -> Result<BTreeMap<String, i32>, Error> {
        let max_res = table::STS3215_RESOLUTION - 1;
        for name in self.names() {
            self.write(table::HOMING_OFFSET, &name, 0).await?;
            self.write(table::MIN_POSITION_LIMIT, &name, 0).await?;
            self.write(table::MAX_POSITION_LIMIT, &name, max_res).await?;
        }

        let present = self.sync_read(table::PRESENT_POSITION).await?;
        let half_turn = max_res / 2;
        let mut offsets = BTreeMap::new();
        for (name, pos) in present {
            let offset = pos - half_turn;
            self.write(table::HOMING_OFFSET, &name, offset).await?;
            offsets.insert(name, offset);
        }
        debug!("Homing offsets on {}: {:?}", self.port, offsets);
        Ok(offsets)
    }

    /// Samples present positions until `stop` resolves and returns the
    /// per-motor (min, max) seen.
    pub async fn record_ranges_of_motion<F>(
        &mut self,
        stop: F,
    ) -> Result<(BTreeMap<String, i32>, BTreeMap<String, i32>), Error>
    where
        F: Future<Output = ()>,
    {
        let start = self.sync_read(table::PRESENT_POSITION).await?;
        let mut mins = start.clone();
        let mut maxes = start;

        let mut ticker = interval(Duration::from_millis(20));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    let now = self.sync_read(table::PRESENT_POSITION).await?;
                    for (name, pos) in now {
                        if let Some(min) = mins.get_mut(&name) {
                            *min = (*min).min(pos);
                        }
                        if let Some(max) = maxes.get_mut(&name) {
                            *max = (*max).max(pos);
                        }
                    }
                }
            }
        }

        let stuck: Vec<&String> = mins
            .iter()
            .filter(|(name, min)| maxes.get(*name) == Some(*min))
            .map(|(name, _)| name)
            .collect();
        if !stuck.is_empty() {
            return Err(Error::Calibration(format!("some motors have the same min and max values: {:?}", stuck)));
        }
        Ok((mins, maxes))
    }

    /// Writes homing and limits to the motors and adopts `calibration`.
    pub async fn write_calibration(&mut self, calibration: &CalibrationMap) -> Result<(), Error> {
        for name in self.names() {
            let Some(cal) = calibration.get(&name) else { continue };
            self.write(table::HOMING_OFFSET, &name, cal.homing_offset).await?;
            self.write(table::MIN_POSITION_LIMIT, &name, cal.range_min).await?;
            self.write(table::MAX_POSITION_LIMIT, &name, cal.range_max).await?;
            self.calibration.insert(name, *cal);
        }
        Ok(())
    }

    /// Bus-wide defaults: no reply delay and maximum acceleration.
    pub async fn configure_motors(&mut self) -> Result<(), Error> {
        for name in self.names() {
            self.write(table::RETURN_DELAY_TIME, &name, 0).await?;
            self.write(table::ACCELERATION, &name, 254).await?;
        }
        Ok(())
    }

    fn names(&self) -> Vec<String> {
        self.motors.iter().map(|(n, _)| n.clone()).collect()
    }

    fn calibration_of(&self, name: &str) -> Result<(&MotorCalibration, NormMode), Error> {
        let mode = self.motor(name)?.norm_mode;
        let cal = self
            .calibration
            .get(name)
            .ok_or_else(|| Error::Calibration(format!("motor `{name}` on {} is not calibrated", self.port)))?;
        Ok((cal, mode))
    }

    fn link_mut(&mut self) -> Result<&mut BoxedLink, Error> {
        let port = &self.port;
        self.link
            .as_mut()
            .ok_or_else(|| Error::not_connected(format!("servo bus {port}")))
    }

    async fn receive(&mut self) -> Result<Packet, Error> {
        let wait = self.timeout;
        let link = self.link_mut()?;
        let packet = timeout(wait, read_packet(link)).await??;
        Ok(packet)
    }

    async fn request(&mut self, id: u8, code: u8, params: &[u8]) -> Result<Packet, Error> {
        let packet = encode(id, code, params);
        let link = self.link_mut()?;
        link.write_all(&packet).await?;
        link.flush().await?;

        let reply = self.receive().await?;
        if reply.id != id {
            return Err(Error::Protocol(format!("reply from id {} while talking to id {id}", reply.id)));
        }
        check_status(&reply)?;
        Ok(reply)
    }
}

fn check_status(reply: &Packet) -> Result<(), Error> {
    if reply.code != 0 {
        return Err(Error::Protocol(format!("servo {} reported error 0x{:02X}", reply.id, reply.code)));
    }
    Ok(())
}

fn encode_value(register: Register, value: i32) -> Result<u32, Error> {
    if register == table::HOMING_OFFSET {
        return encode_sign_magnitude(value, table::HOMING_OFFSET_SIGN_BIT);
    }
    let max = if register.len >= 4 { u32::MAX as i64 } else { (1i64 << (8 * register.len as i64)) - 1 };
    if value < 0 || value as i64 > max {
        return Err(Error::OutOfRange(format!("{value} does not fit in {}", register.name)));
    }
    Ok(value as u32)
}

fn decode_value(register: Register, raw: u32) -> i32 {
    if register == table::HOMING_OFFSET {
        decode_sign_magnitude(raw, table::HOMING_OFFSET_SIGN_BIT)
    } else {
        raw as i32
    }
}

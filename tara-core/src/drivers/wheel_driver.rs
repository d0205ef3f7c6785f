//! tara-core/src/drivers/wheel_driver.rs
//!
//! Dual-channel wheel motor controller on Modbus RTU. Channel 1 is the left
//! wheel, channel 2 the right wheel.

use tracing::{debug, info, warn};

use crate::modbus::ModbusClient;
use crate::transport::BoxedLink;
use crate::Error;

pub mod regs {
    pub const OPERATING_MODE: u16 = 0x200D;
    pub const CONTROL_WORD: u16 = 0x200E;
    pub const SYNC_MODE: u16 = 0x200F;
    pub const LEFT_ACCEL_TIME: u16 = 0x2080;
    pub const RIGHT_ACCEL_TIME: u16 = 0x2081;
    pub const LEFT_DECEL_TIME: u16 = 0x2082;
    pub const RIGHT_DECEL_TIME: u16 = 0x2083;
    pub const LEFT_TARGET_VELOCITY: u16 = 0x2088;
    pub const RIGHT_TARGET_VELOCITY: u16 = 0x2089;
    pub const LEFT_TARGET_POSITION_HI: u16 = 0x208A;
    pub const LEFT_TARGET_POSITION_LO: u16 = 0x208B;
    pub const RIGHT_TARGET_POSITION_HI: u16 = 0x208C;
    pub const RIGHT_TARGET_POSITION_LO: u16 = 0x208D;
    pub const LEFT_POSITION_SPEED: u16 = 0x208E;
    pub const RIGHT_POSITION_SPEED: u16 = 0x208F;
    /// Four registers: left hi, left lo, right hi, right lo.
    pub const ACTUAL_POSITIONS: u16 = 0x20A7;
    /// Two registers, signed, 0.1 rpm.
    pub const ACTUAL_VELOCITIES: u16 = 0x20AB;
    pub const RIGHT_ACTUAL_VELOCITY: u16 = 0x20AC;
}

pub mod control {
    pub const EMERGENCY_STOP: u16 = 0x05;
    pub const CLEAR_FAULT: u16 = 0x06;
    pub const STOP: u16 = 0x07;
    pub const ENABLE: u16 = 0x08;
    pub const START_SYNC: u16 = 0x10;
}

pub mod mode {
    pub const RELATIVE_POSITION: u16 = 1;
    pub const PROFILE_VELOCITY: u16 = 3;
}

pub const MAX_RPM: i16 = 3000;
pub const MAX_RAMP_MS: u16 = 32767;
pub const DEFAULT_RAMP_MS: u16 = 500;
pub const DEFAULT_MAX_POSITION_COUNTS: i32 = 20480;
pub const POSITION_MODE_SPEED_RPM: u16 = 120;

/// Measured wheel speeds in rpm.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelVelocities {
    pub left: f64,
    pub right: f64,
}

/// Encoder counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelPositions {
    pub left: i32,
    pub right: i32,
}

pub struct WheelDriver {
    client: ModbusClient<BoxedLink>,
    max_position_counts: i32,
}

fn join_i32(hi: u16, lo: u16) -> i32 {
    (((hi as u32) << 16) | lo as u32) as i32
}

fn split_i32(value: i32) -> (u16, u16) {
    let raw = value as u32;
    ((raw >> 16) as u16, (raw & 0xFFFF) as u16)
}

impl WheelDriver {
    /// Probes the controller and leaves it in profile-velocity mode.
    pub async fn connect(link: BoxedLink, slave_id: u8) -> Result<Self, Error> {
        let mut client = ModbusClient::new(link, slave_id);
        let word = client.read_register(regs::CONTROL_WORD).await?;
        debug!("wheel controller {} control word 0x{:04X}", slave_id, word);

        let mut driver = Self { client, max_position_counts: DEFAULT_MAX_POSITION_COUNTS };
        driver.init_velocity_mode().await?;
        info!("Wheel controller (slave {}) ready in velocity mode", slave_id);
        Ok(driver)
    }

    async fn init_velocity_mode(&mut self) -> Result<(), Error> {
        self.client.write_register(regs::OPERATING_MODE, mode::PROFILE_VELOCITY).await?;
        self.write_ramps(DEFAULT_RAMP_MS, DEFAULT_RAMP_MS).await
    }

    async fn write_ramps(&mut self, accel_ms: u16, decel_ms: u16) -> Result<(), Error> {
        self.client.write_register(regs::LEFT_ACCEL_TIME, accel_ms).await?;
        self.client.write_register(regs::RIGHT_ACCEL_TIME, accel_ms).await?;
        self.client.write_register(regs::LEFT_DECEL_TIME, decel_ms).await?;
        self.client.write_register(regs::RIGHT_DECEL_TIME, decel_ms).await
    }

    pub fn set_max_position_counts(&mut self, counts: i32) {
        self.max_position_counts = counts;
    }

    /// Enables the drive and writes both target speeds (wire values, rpm).
    pub async fn set_velocity(&mut self, left_rpm: i16, right_rpm: i16) -> Result<(), Error> {
        for rpm in [left_rpm, right_rpm] {
            if !(-MAX_RPM..=MAX_RPM).contains(&rpm) {
                return Err(Error::OutOfRange(format!(
                    "target velocity {rpm} rpm outside -{MAX_RPM}..={MAX_RPM}"
                )));
            }
        }
        debug!("wheel velocity left={} right={} rpm", left_rpm, right_rpm);

        self.client.write_register(regs::CONTROL_WORD, control::ENABLE).await?;
        self.client.write_register(regs::LEFT_TARGET_VELOCITY, left_rpm as u16).await?;
        self.client.write_register(regs::RIGHT_TARGET_VELOCITY, right_rpm as u16).await
    }

    pub async fn actual_velocity(&mut self) -> Result<WheelVelocities, Error> {
        let raw = self.client.read_holding_registers(regs::ACTUAL_VELOCITIES, 2).await?;
        Ok(WheelVelocities {
            left: raw[0] as i16 as f64 * 0.1,
            right: raw[1] as i16 as f64 * 0.1,
        })
    }

    pub async fn positions(&mut self) -> Result<WheelPositions, Error> {
        let raw = self.client.read_holding_registers(regs::ACTUAL_POSITIONS, 4).await?;
        Ok(WheelPositions {
            left: join_i32(raw[0], raw[1]),
            right: join_i32(raw[2], raw[3]),
        })
    }

    pub async fn stop_motors(&mut self) -> Result<(), Error> {
        self.client.write_register(regs::CONTROL_WORD, control::STOP).await
    }

    pub async fn enable_motors(&mut self) -> Result<(), Error> {
        self.client.write_register(regs::CONTROL_WORD, control::ENABLE).await
    }

    pub async fn emergency_stop(&mut self) -> Result<(), Error> {
        warn!("Wheel controller emergency stop");
        self.client.write_register(regs::CONTROL_WORD, control::EMERGENCY_STOP).await
    }

    pub async fn clear_fault(&mut self) -> Result<(), Error> {
        self.client.write_register(regs::CONTROL_WORD, control::CLEAR_FAULT).await
    }

    pub async fn set_acceleration_time(&mut self, left_ms: u16, right_ms: u16) -> Result<(), Error> {
        check_ramp(left_ms, right_ms)?;
        self.client.write_register(regs::LEFT_ACCEL_TIME, left_ms).await?;
        self.client.write_register(regs::RIGHT_ACCEL_TIME, right_ms).await
    }

    pub async fn set_deceleration_time(&mut self, left_ms: u16, right_ms: u16) -> Result<(), Error> {
        check_ramp(left_ms, right_ms)?;
        self.client.write_register(regs::LEFT_DECEL_TIME, left_ms).await?;
        self.client.write_register(regs::RIGHT_DECEL_TIME, right_ms).await
    }

    /// Relative move of each wheel by `percent` (-100..=100) of the
    /// configured travel, both channels started together.
    ///
    /// Leaves the controller in position mode; call `connect` again (or
    /// write the velocity init) before driving by speed.
    pub async fn move_to_percent(&mut self, left: f64, right: f64) -> Result<WheelPositions, Error> {
        for pct in [left, right] {
            if !(-100.0..=100.0).contains(&pct) {
                return Err(Error::OutOfRange(format!("target {pct}% outside -100..=100")));
            }
        }
        let target = WheelPositions {
            left: (left / 100.0 * self.max_position_counts as f64) as i32,
            right: (right / 100.0 * self.max_position_counts as f64) as i32,
        };

        self.client.write_register(regs::SYNC_MODE, 1).await?;
        self.client.write_register(regs::OPERATING_MODE, mode::RELATIVE_POSITION).await?;
        self.write_ramps(DEFAULT_RAMP_MS, DEFAULT_RAMP_MS).await?;
        self.client.write_register(regs::LEFT_POSITION_SPEED, POSITION_MODE_SPEED_RPM).await?;
        self.client.write_register(regs::RIGHT_POSITION_SPEED, POSITION_MODE_SPEED_RPM).await?;

        let (hi, lo) = split_i32(target.left);
        self.client.write_register(regs::LEFT_TARGET_POSITION_HI, hi).await?;
        self.client.write_register(regs::LEFT_TARGET_POSITION_LO, lo).await?;
        let (hi, lo) = split_i32(target.right);
        self.client.write_register(regs::RIGHT_TARGET_POSITION_HI, hi).await?;
        self.client.write_register(regs::RIGHT_TARGET_POSITION_LO, lo).await?;

        self.client.write_register(regs::CONTROL_WORD, control::ENABLE).await?;
        self.client.write_register(regs::CONTROL_WORD, control::START_SYNC).await?;
        info!("Wheel position move: left {} counts, right {} counts", target.left, target.right);
        Ok(target)
    }

    /// Best-effort stop, then releases the link.
    pub async fn disconnect(mut self) {
        if let Err(e) = self.stop_motors().await {
            warn!("Failed to stop wheels during disconnect: {:?}", e);
        }
        drop(self.client.into_inner());
    }
}

fn check_ramp(left_ms: u16, right_ms: u16) -> Result<(), Error> {
    if left_ms > MAX_RAMP_MS || right_ms > MAX_RAMP_MS {
        return Err(Error::OutOfRange(format!(
            "ramp time must be 0..={MAX_RAMP_MS} ms, got {left_ms}/{right_ms}"
        )));
    }
    Ok(())
}

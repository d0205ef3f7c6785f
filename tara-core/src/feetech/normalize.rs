// tara-core/src/feetech/normalize.rs

use serde::{Deserialize, Serialize};
use tara_common::models::MotorCalibration;

use crate::Error;

/// Max raw step for a 4096-step encoder.
const MAX_RES: f64 = 4095.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormMode {
    /// 0 at `range_min`, 100 at `range_max` (grippers).
    Range0To100,
    /// -100 at `range_min`, 100 at `range_max`.
    RangeM100To100,
    /// Degrees from the middle of the recorded range.
    Degrees,
}

fn span(cal: &MotorCalibration) -> Result<f64, Error> {
    if cal.range_max <= cal.range_min {
        return Err(Error::Calibration(format!(
            "motor {} has an empty range ({}..{})",
            cal.id, cal.range_min, cal.range_max
        )));
    }
    Ok((cal.range_max - cal.range_min) as f64)
}

pub fn normalize(raw: i32, cal: &MotorCalibration, mode: NormMode) -> Result<f64, Error> {
    let span = span(cal)?;
    let min = cal.range_min as f64;
    let bounded = raw.clamp(cal.range_min, cal.range_max) as f64;
    let inverted = cal.drive_mode != 0;

    let value = match mode {
        NormMode::RangeM100To100 => {
            let v = (bounded - min) / span * 200.0 - 100.0;
            if inverted { -v } else { v }
        }
        NormMode::Range0To100 => {
            let v = (bounded - min) / span * 100.0;
            if inverted { 100.0 - v } else { v }
        }
        NormMode::Degrees => {
            let mid = (cal.range_min + cal.range_max) as f64 / 2.0;
            let v = (raw as f64 - mid) * 360.0 / MAX_RES;
            if inverted { -v } else { v }
        }
    };
    Ok(value)
}

pub fn unnormalize(value: f64, cal: &MotorCalibration, mode: NormMode) -> Result<i32, Error> {
    if !value.is_finite() {
        return Err(Error::OutOfRange(format!("goal {value} for motor {} is not a number", cal.id)));
    }
    let span = span(cal)?;
    let min = cal.range_min as f64;
    let inverted = cal.drive_mode != 0;

    let raw = match mode {
        NormMode::RangeM100To100 => {
            let v = if inverted { -value } else { value };
            (v.clamp(-100.0, 100.0) + 100.0) / 200.0 * span + min
        }
        NormMode::Range0To100 => {
            let v = if inverted { 100.0 - value } else { value };
            v.clamp(0.0, 100.0) / 100.0 * span + min
        }
        NormMode::Degrees => {
            let v = if inverted { -value } else { value };
            let mid = (cal.range_min + cal.range_max) as f64 / 2.0;
            v * MAX_RES / 360.0 + mid
        }
    };
    Ok(raw.round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal() -> MotorCalibration {
        MotorCalibration { id: 1, drive_mode: 0, homing_offset: 0, range_min: 1000, range_max: 3000 }
    }

    #[test]
    fn symmetric_range_endpoints() {
        assert_eq!(normalize(1000, &cal(), NormMode::RangeM100To100).unwrap(), -100.0);
        assert_eq!(normalize(2000, &cal(), NormMode::RangeM100To100).unwrap(), 0.0);
        assert_eq!(normalize(5000, &cal(), NormMode::RangeM100To100).unwrap(), 100.0);
        assert_eq!(unnormalize(50.0, &cal(), NormMode::RangeM100To100).unwrap(), 2500);
    }

    #[test]
    fn gripper_range_and_inversion() {
        assert_eq!(normalize(1500, &cal(), NormMode::Range0To100).unwrap(), 25.0);
        let inverted = MotorCalibration { drive_mode: 1, ..cal() };
        assert_eq!(normalize(1500, &inverted, NormMode::Range0To100).unwrap(), 75.0);
    }

    #[test]
    fn degrees_are_centered_on_range() {
        assert_eq!(normalize(2000, &cal(), NormMode::Degrees).unwrap(), 0.0);
        let back = unnormalize(90.0, &cal(), NormMode::Degrees).unwrap();
        assert_eq!(back, 2000 + 1024);
    }

    #[test]
    fn non_finite_goals_are_refused() {
        for mode in [NormMode::RangeM100To100, NormMode::Range0To100, NormMode::Degrees] {
            assert!(matches!(unnormalize(f64::NAN, &cal(), mode), Err(Error::OutOfRange(_))));
            assert!(matches!(unnormalize(f64::INFINITY, &cal(), mode), Err(Error::OutOfRange(_))));
        }
    }

    #[test]
    fn empty_range_is_a_calibration_error() {
        let flat = MotorCalibration { range_max: 1000, ..cal() };
        assert!(matches!(normalize(1000, &flat, NormMode::Range0To100), Err(Error::Calibration(_))));
    }
}

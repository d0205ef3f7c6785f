// tara-core/src/drivers/kinematics.rs

use std::f64::consts::PI;

use crate::Error;

pub const WHEEL_RADIUS_M: f64 = 0.2;
pub const WHEEL_BASE_M: f64 = 0.157;

/// Wheel speeds in rpm, positive meaning forward travel for that wheel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelRpm {
    pub left: f64,
    pub right: f64,
}

impl WheelRpm {
    /// Wire values for the controller. The left motor is mounted mirrored,
    /// so forward travel is a negative left speed.
    pub fn to_wire(self) -> (i16, i16) {
        ((-self.left).round() as i16, self.right.round() as i16)
    }
}

/// Differential-drive inverse kinematics.
///
/// `angular_deg_s` is counter-clockwise positive. Fails with `OutOfRange`
/// when either wheel would exceed `max_rpm`.
pub fn twist_to_wheel_rpm(linear_m_s: f64, angular_deg_s: f64, max_rpm: f64) -> Result<WheelRpm, Error> {
    let w = angular_deg_s.to_radians();
    let v_left = linear_m_s - WHEEL_BASE_M / 2.0 * w;
    let v_right = linear_m_s + WHEEL_BASE_M / 2.0 * w;

    let to_rpm = |v: f64| v / (2.0 * PI * WHEEL_RADIUS_M) * 60.0;
    let rpm = WheelRpm { left: to_rpm(v_left), right: to_rpm(v_right) };

    if rpm.left.abs() > max_rpm || rpm.right.abs() > max_rpm {
        return Err(Error::OutOfRange(format!(
            "wheel speed too high (left {:.2} rpm, right {:.2} rpm, limit {max_rpm})",
            rpm.left, rpm.right
        )));
    }
    Ok(rpm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_gives_equal_wheels() {
        let rpm = twist_to_wheel_rpm(0.1, 0.0, 10.0).unwrap();
        // 0.1 / (2*pi*0.2) * 60 = 4.77
        assert!((rpm.left - 4.7746).abs() < 1e-3);
        assert_eq!(rpm.left, rpm.right);
        assert_eq!(rpm.to_wire(), (-5, 5));
    }

    #[test]
    fn rotation_spins_wheels_in_opposite_directions() {
        let rpm = twist_to_wheel_rpm(0.0, 90.0, 10.0).unwrap();
        assert!(rpm.left < 0.0 && rpm.right > 0.0);
        assert!((rpm.left + rpm.right).abs() < 1e-9);
    }

    #[test]
    fn excessive_speed_is_refused() {
        assert!(matches!(twist_to_wheel_rpm(1.0, 0.0, 10.0), Err(Error::OutOfRange(_))));
    }
}

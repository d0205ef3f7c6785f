// tara-core/src/feetech/table.rs

/// One entry of the STS3215 control table. Multi-byte values are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub name: &'static str,
    pub addr: u8,
    pub len: u8,
}

const fn reg(name: &'static str, addr: u8, len: u8) -> Register {
    Register { name, addr, len }
}

pub const ID: Register = reg("ID", 5, 1);
pub const RETURN_DELAY_TIME: Register = reg("Return_Delay_Time", 7, 1);
pub const MIN_POSITION_LIMIT: Register = reg("Min_Position_Limit", 9, 2);
pub const MAX_POSITION_LIMIT: Register = reg("Max_Position_Limit", 11, 2);
pub const P_COEFFICIENT: Register = reg("P_Coefficient", 21, 1);
pub const D_COEFFICIENT: Register = reg("D_Coefficient", 22, 1);
pub const I_COEFFICIENT: Register = reg("I_Coefficient", 23, 1);
pub const HOMING_OFFSET: Register = reg("Homing_Offset", 31, 2);
pub const OPERATING_MODE: Register = reg("Operating_Mode", 33, 1);
pub const TORQUE_ENABLE: Register = reg("Torque_Enable", 40, 1);
pub const ACCELERATION: Register = reg("Acceleration", 41, 1);
pub const GOAL_POSITION: Register = reg("Goal_Position", 42, 2);
pub const LOCK: Register = reg("Lock", 55, 1);
pub const PRESENT_POSITION: Register = reg("Present_Position", 56, 2);

/// Bit carrying the sign of `Homing_Offset`.
pub const HOMING_OFFSET_SIGN_BIT: u8 = 11;

pub const STS3215: &str = "sts3215";
pub const STS3215_RESOLUTION: i32 = 4096;

pub mod operating_mode {
    pub const POSITION: i32 = 0;
}

pub fn encode_le(value: u32, len: u8) -> Vec<u8> {
    value.to_le_bytes()[..len as usize].to_vec()
}

pub fn decode_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc | ((*b as u32) << (8 * i)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_two_bytes() {
        assert_eq!(encode_le(2047, 2), vec![0xFF, 0x07]);
        assert_eq!(decode_le(&[0xFF, 0x07]), 2047);
    }
}

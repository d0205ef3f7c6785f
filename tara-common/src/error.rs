// ================================================================
// File: tara-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is not connected")]
    DeviceNotConnected(String),

    #[error("{0} is already connected")]
    DeviceAlreadyConnected(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Modbus exception from slave {slave}: function 0x{function:02X}, code 0x{code:02X}")]
    ModbusException { slave: u8, function: u8, code: u8 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Gamepad error: {0}")]
    Gamepad(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}

impl Error {
    /// True for the "this operation exists but does nothing yet" condition.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotImplemented(_))
    }

    pub fn not_connected(device: impl Into<String>) -> Self {
        Error::DeviceNotConnected(device.into())
    }

    pub fn already_connected(device: impl Into<String>) -> Self {
        Error::DeviceAlreadyConnected(device.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_implemented_is_detected() {
        let err = Error::NotImplemented("connection logic".into());
        assert!(err.is_not_implemented());
        assert!(!Error::not_connected("tarabase").is_not_implemented());
    }

    #[test]
    fn messages_name_the_device() {
        assert_eq!(Error::not_connected("tarabase").to_string(), "tarabase is not connected");
        assert_eq!(
            Error::ModbusException { slave: 1, function: 0x06, code: 0x02 }.to_string(),
            "Modbus exception from slave 1: function 0x06, code 0x02"
        );
    }
}

// tara-core/src/remote/protocol.rs

use serde::{Deserialize, Serialize};

use tara_common::models::{Action, Observation};
use crate::Error;

/// Largest datagram either side sends or accepts.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// One UDP datagram, JSON encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteMessage {
    Action { action: Action },
    Observation { observation: Observation },
}

impl RemoteMessage {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(Error::Protocol(format!("message of {} bytes exceeds one datagram", bytes.len())));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_tagged_json() {
        let msg = RemoteMessage::Action { action: Action::from([("shoulder_pan.pos".to_string(), 12.5)]) };
        let text = String::from_utf8(msg.encode().unwrap()).unwrap();
        assert_eq!(text, r#"{"kind":"action","action":{"shoulder_pan.pos":12.5}}"#);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(RemoteMessage::decode(b"{\"kind\":\"reboot\"}").is_err());
    }
}

// tara-core/src/feetech/protocol.rs
//
// Packet layout, both directions:
//   0xFF 0xFF <id> <len> <instr|error> <params...> <checksum>
// where len = params + 2 and checksum = !(id + len + instr + sum(params)).

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Error;

pub const HEADER: [u8; 2] = [0xFF, 0xFF];
pub const BROADCAST_ID: u8 = 0xFE;

pub mod instruction {
    pub const PING: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const WRITE: u8 = 0x03;
    pub const SYNC_READ: u8 = 0x82;
    pub const SYNC_WRITE: u8 = 0x83;
}

/// A decoded packet. `code` is the instruction for requests and the error
/// byte for status replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u8,
    pub code: u8,
    pub params: Vec<u8>,
}

pub fn checksum(id: u8, len: u8, code: u8, params: &[u8]) -> u8 {
    let sum = params
        .iter()
        .fold(id.wrapping_add(len).wrapping_add(code), |acc, b| acc.wrapping_add(*b));
    !sum
}

pub fn encode(id: u8, code: u8, params: &[u8]) -> Vec<u8> {
    let len = (params.len() + 2) as u8;
    let mut out = Vec::with_capacity(params.len() + 6);
    out.extend_from_slice(&HEADER);
    out.push(id);
    out.push(len);
    out.push(code);
    out.extend_from_slice(params);
    out.push(checksum(id, len, code, params));
    out
}

/// Reads one packet, skipping any bytes before the header.
pub async fn read_packet<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Packet, Error> {
    let mut prev = 0u8;
    loop {
        let b = reader.read_u8().await?;
        if prev == 0xFF && b == 0xFF {
            break;
        }
        prev = b;
    }

    let mut id = reader.read_u8().await?;
    // A third 0xFF can precede the id on a noisy line.
    while id == 0xFF {
        id = reader.read_u8().await?;
    }
    let len = reader.read_u8().await?;
    if len < 2 {
        return Err(Error::Protocol(format!("servo packet length {len} is too short")));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let code = body[0];
    let chk = body[len as usize - 1];
    let params = body[1..len as usize - 1].to_vec();

    let expected = checksum(id, len, code, &params);
    if chk != expected {
        return Err(Error::Protocol(format!(
            "servo packet checksum mismatch from id {id}: got 0x{chk:02X}, expected 0x{expected:02X}"
        )));
    }
    Ok(Packet { id, code, params })
}

/// Sign-magnitude encoding with the sign at `sign_bit`.
pub fn encode_sign_magnitude(value: i32, sign_bit: u8) -> Result<u32, Error> {
    let limit = (1i64 << sign_bit) - 1;
    let magnitude = (value as i64).abs();
    if magnitude > limit {
        return Err(Error::OutOfRange(format!(
            "{value} does not fit in sign-magnitude with sign bit {sign_bit}"
        )));
    }
    let sign = if value < 0 { 1u32 << sign_bit } else { 0 };
    Ok(sign | magnitude as u32)
}

pub fn decode_sign_magnitude(raw: u32, sign_bit: u8) -> i32 {
    let magnitude = (raw & ((1u32 << sign_bit) - 1)) as i32;
    if raw & (1u32 << sign_bit) != 0 { -magnitude } else { magnitude }
}

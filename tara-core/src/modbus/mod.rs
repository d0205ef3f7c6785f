//! tara-core/src/modbus/mod.rs
//!
//! Minimal Modbus RTU master: read holding registers (0x03) and write single
//! register (0x06) over any async byte stream.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::transport::Link;
use crate::Error;

pub const FC_READ_HOLDING: u8 = 0x03;
pub const FC_WRITE_SINGLE: u8 = 0x06;
const EXCEPTION_FLAG: u8 = 0x80;
const MAX_READ_COUNT: u16 = 125;
/// Line silence that ends a stale-byte drain.
const DRAIN_QUIET: Duration = Duration::from_millis(20);

/// CRC-16/MODBUS (reflected poly 0xA001, init 0xFFFF).
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= b as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the CRC, low byte first.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);
}

/// True when the trailing two bytes are the CRC of everything before them.
pub fn check_crc(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    let crc = crc16(body);
    tail[0] == (crc & 0xFF) as u8 && tail[1] == (crc >> 8) as u8
}

pub fn read_request(slave: u8, addr: u16, count: u16) -> Vec<u8> {
    let mut frame = vec![slave, FC_READ_HOLDING];
    frame.extend_from_slice(&addr.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    append_crc(&mut frame);
    frame
}

pub fn write_request(slave: u8, addr: u16, value: u16) -> Vec<u8> {
    let mut frame = vec![slave, FC_WRITE_SINGLE];
    frame.extend_from_slice(&addr.to_be_bytes());
    frame.extend_from_slice(&value.to_be_bytes());
    append_crc(&mut frame);
    frame
}

pub struct ModbusClient<L: Link> {
    link: L,
    slave_id: u8,
    timeout: Duration,
    /// Set when the last exchange may have left bytes in the stream.
    desynced: bool,
}

impl<L: Link> ModbusClient<L> {
    pub fn new(link: L, slave_id: u8) -> Self {
        Self { link, slave_id, timeout: Duration::from_secs(1), desynced: false }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub async fn read_holding_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, Error> {
        if count == 0 || count > MAX_READ_COUNT {
            return Err(Error::OutOfRange(format!("register count {count} not in 1..={MAX_READ_COUNT}")));
        }
        let request = read_request(self.slave_id, addr, count);
        let response = self.transact(&request, FC_READ_HOLDING).await?;

        // slave, fc, byte count, data..., crc
        let byte_count = response[2] as usize;
        if byte_count != count as usize * 2 {
            return Err(Error::Protocol(format!(
                "expected {} data bytes, got {}",
                count as usize * 2,
                byte_count
            )));
        }
        let values = response[3..3 + byte_count]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(values)
    }

    pub async fn read_register(&mut self, addr: u16) -> Result<u16, Error> {
        let values = self.read_holding_registers(addr, 1).await?;
        values
            .first()
            .copied()
            .ok_or_else(|| Error::Protocol("empty register read".into()))
    }

    pub async fn write_register(&mut self, addr: u16, value: u16) -> Result<(), Error> {
        let request = write_request(self.slave_id, addr, value);
        let response = self.transact(&request, FC_WRITE_SINGLE).await?;
        if response[..6] != request[..6] {
            return Err(Error::Protocol(format!(
                "write echo mismatch at 0x{addr:04X}: sent {:02X?}, got {:02X?}",
                &request[..6],
                &response[..6]
            )));
        }
        Ok(())
    }

    /// One timed request/response. After a timeout or a malformed reply the
    /// stream is drained before the next request goes out.
    async fn transact(&mut self, request: &[u8], function: u8) -> Result<Vec<u8>, Error> {
        if self.desynced {
            self.drain().await;
        }
        let result = match timeout(self.timeout, self.exchange(request, function)).await {
            Ok(inner) => inner,
            Err(elapsed) => Err(Error::from(elapsed)),
        };
        self.desynced = match &result {
            Ok(_) | Err(Error::ModbusException { .. }) => false,
            Err(_) => true,
        };
        result
    }

    async fn drain(&mut self) {
        let mut scratch = [0u8; 64];
        let mut dropped = 0usize;
        while let Ok(Ok(n)) = timeout(DRAIN_QUIET, self.link.read(&mut scratch)).await {
            if n == 0 {
                break;
            }
            dropped += n;
        }
        if dropped > 0 {
            debug!("modbus dropped {} stale bytes from slave {}", dropped, self.slave_id);
        }
        self.desynced = false;
    }

    async fn exchange(&mut self, request: &[u8], function: u8) -> Result<Vec<u8>, Error> {
        trace!("modbus tx {:02X?}", request);
        self.link.write_all(request).await?;
        self.link.flush().await?;

        let response = self.read_response(function).await?;
        trace!("modbus rx {:02X?}", response);
        Ok(response)
    }

    async fn read_response(&mut self, function: u8) -> Result<Vec<u8>, Error> {
        let mut head = [0u8; 2];
        self.link.read_exact(&mut head).await?;

        if head[0] != self.slave_id {
            return Err(Error::Protocol(format!(
                "response from slave {} while talking to slave {}",
                head[0], self.slave_id
            )));
        }

        let mut frame = head.to_vec();
        if head[1] == function | EXCEPTION_FLAG {
            let mut rest = [0u8; 3];
            self.link.read_exact(&mut rest).await?;
            frame.extend_from_slice(&rest);
            if !check_crc(&frame) {
                return Err(Error::Protocol("CRC mismatch in exception response".into()));
            }
            return Err(Error::ModbusException { slave: head[0], function, code: rest[0] });
        }
        if head[1] != function {
            return Err(Error::Protocol(format!(
                "unexpected function code 0x{:02X} (wanted 0x{function:02X})",
                head[1]
            )));
        }

        let remaining = match function {
            FC_READ_HOLDING => {
                let mut len = [0u8; 1];
                self.link.read_exact(&mut len).await?;
                frame.push(len[0]);
                len[0] as usize + 2
            }
            _ => 6,
        };
        let mut rest = vec![0u8; remaining];
        self.link.read_exact(&mut rest).await?;
        frame.extend_from_slice(&rest);

        if !check_crc(&frame) {
            return Err(Error::Protocol(format!("CRC mismatch in response {:02X?}", frame)));
        }
        Ok(frame)
    }

    pub fn into_inner(self) -> L {
        self.link
    }
}

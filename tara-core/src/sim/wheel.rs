// tara-core/src/sim/wheel.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::{debug, trace};

use crate::drivers::wheel_driver::{control, regs};
use crate::modbus::{append_crc, check_crc, FC_READ_HOLDING, FC_WRITE_SINGLE};
use crate::transport::BoxedLink;

#[derive(Default)]
struct WheelSimState {
    registers: BTreeMap<u16, u16>,
    writes: Vec<(u16, u16)>,
    exceptions: HashMap<u16, u8>,
}

impl WheelSimState {
    fn enabled(&self) -> bool {
        matches!(
            self.registers.get(&regs::CONTROL_WORD).copied(),
            Some(control::ENABLE) | Some(control::START_SYNC)
        )
    }

    fn read(&self, addr: u16) -> u16 {
        match addr {
            regs::ACTUAL_VELOCITIES | regs::RIGHT_ACTUAL_VELOCITY => {
                if !self.enabled() {
                    return 0;
                }
                let target = if addr == regs::ACTUAL_VELOCITIES {
                    regs::LEFT_TARGET_VELOCITY
                } else {
                    regs::RIGHT_TARGET_VELOCITY
                };
                let rpm = self.registers.get(&target).copied().unwrap_or(0) as i16;
                // 0.1 rpm units
                (rpm as i32 * 10) as i16 as u16
            }
            _ => self.registers.get(&addr).copied().unwrap_or(0),
        }
    }
}

/// Inspection and fault injection for a running wheel controller sim.
#[derive(Clone)]
pub struct WheelSimHandle {
    state: Arc<Mutex<WheelSimState>>,
}

impl WheelSimHandle {
    pub fn register(&self, addr: u16) -> u16 {
        self.state.lock().map(|s| s.read(addr)).unwrap_or(0)
    }

    /// Every accepted single-register write, in order.
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.state.lock().map(|s| s.writes.clone()).unwrap_or_default()
    }

    pub fn clear_writes(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.writes.clear();
        }
    }

    /// Makes any access to `addr` answer with Modbus exception `code`.
    pub fn inject_exception(&self, addr: u16, code: u8) {
        if let Ok(mut s) = self.state.lock() {
            s.exceptions.insert(addr, code);
        }
    }

    pub fn clear_exceptions(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.exceptions.clear();
        }
    }

    pub fn set_register(&self, addr: u16, value: u16) {
        if let Ok(mut s) = self.state.lock() {
            s.registers.insert(addr, value);
        }
    }
}

/// Starts a simulated wheel controller answering as `slave_id`.
pub fn spawn_wheel_sim(slave_id: u8) -> (BoxedLink, WheelSimHandle) {
    let (host_end, device_end) = duplex(256);
    let handle = WheelSimHandle { state: Arc::new(Mutex::new(WheelSimState::default())) };
    let state = handle.state.clone();
    tokio::spawn(async move {
        if let Err(e) = serve(device_end, slave_id, state).await {
            debug!("wheel sim stopped: {:?}", e);
        }
    });
    (Box::new(host_end), handle)
}

async fn serve(mut io: DuplexStream, slave_id: u8, state: Arc<Mutex<WheelSimState>>) -> std::io::Result<()> {
    loop {
        // Both supported requests are 8 bytes on the wire.
        let mut req = [0u8; 8];
        io.read_exact(&mut req).await?;
        if !check_crc(&req) || req[0] != slave_id {
            trace!("wheel sim ignoring frame {:02X?}", req);
            continue;
        }
        let function = req[1];
        let addr = u16::from_be_bytes([req[2], req[3]]);
        let arg = u16::from_be_bytes([req[4], req[5]]);

        let reply = {
            let Ok(mut s) = state.lock() else { return Ok(()) };
            if let Some(code) = s.exceptions.get(&addr).copied() {
                vec![slave_id, function | 0x80, code]
            } else {
                match function {
                    FC_READ_HOLDING => {
                        let mut out = vec![slave_id, FC_READ_HOLDING, arg.saturating_mul(2) as u8];
                        for offset in 0..arg {
                            out.extend_from_slice(&s.read(addr.wrapping_add(offset)).to_be_bytes());
                        }
                        out
                    }
                    FC_WRITE_SINGLE => {
                        s.registers.insert(addr, arg);
                        s.writes.push((addr, arg));
                        req[..6].to_vec()
                    }
                    _ => vec![slave_id, function | 0x80, 0x01],
                }
            }
        };

        let mut reply = reply;
        append_crc(&mut reply);
        io.write_all(&reply).await?;
    }
}

// tara-core/src/sim/servo.rs
//
// A daisy chain of STS3215 servos. Free (torque off) servos drift along a
// slow sine so range-of-motion recording sees movement; with torque on they
// hold their goal.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tracing::{debug, trace};

use crate::feetech::protocol::{decode_sign_magnitude, encode, instruction, read_packet, Packet, BROADCAST_ID};
use crate::feetech::table::{self, decode_le, encode_le};
use crate::transport::BoxedLink;

const MEMORY_SIZE: usize = 70;
const CENTER: f64 = 2047.0;
const SWEEP_AMPLITUDE: f64 = 900.0;

struct SimServo {
    mem: [u8; MEMORY_SIZE],
    /// Shaft position in encoder steps, before homing is applied.
    held: Option<i32>,
    pinned: Option<i32>,
    phase: f64,
}

impl SimServo {
    fn new(id: u8) -> Self {
        let mut mem = [0u8; MEMORY_SIZE];
        mem[table::ID.addr as usize] = id;
        write_mem(&mut mem, table::MAX_POSITION_LIMIT.addr, &encode_le(4095, 2));
        mem[table::P_COEFFICIENT.addr as usize] = 32;
        Self { mem, held: None, pinned: None, phase: id as f64 * 0.7 }
    }

    fn value(&self, addr: u8, len: u8) -> u32 {
        decode_le(&self.mem[addr as usize..(addr + len) as usize])
    }

    fn torque_enabled(&self) -> bool {
        self.mem[table::TORQUE_ENABLE.addr as usize] != 0
    }

    fn homing(&self) -> i32 {
        let raw = self.value(table::HOMING_OFFSET.addr, table::HOMING_OFFSET.len);
        decode_sign_magnitude(raw, table::HOMING_OFFSET_SIGN_BIT)
    }

    fn physical(&self, t: f64) -> i32 {
        if let Some(p) = self.pinned {
            return p;
        }
        if self.torque_enabled() {
            if let Some(h) = self.held {
                return h;
            }
        }
        (CENTER + SWEEP_AMPLITUDE * (2.0 * t + self.phase).sin()).round() as i32
    }

    fn present(&self, t: f64) -> i32 {
        (self.physical(t) - self.homing()).rem_euclid(table::STS3215_RESOLUTION)
    }

    fn apply_write(&mut self, addr: u8, data: &[u8], t: f64) {
        let was_enabled = self.torque_enabled();
        let physical_before = self.physical(t);
        let end = (addr as usize + data.len()).min(MEMORY_SIZE);
        if (addr as usize) < end {
            self.mem[addr as usize..end].copy_from_slice(&data[..end - addr as usize]);
        }

        if !was_enabled && self.torque_enabled() {
            self.held = Some(physical_before);
        }
        let goal = table::GOAL_POSITION;
        if addr <= goal.addr && addr as usize + data.len() >= (goal.addr + goal.len) as usize {
            let goal_present = self.value(goal.addr, goal.len) as i32;
            self.held = Some(goal_present + self.homing());
        }
    }

    fn read(&mut self, addr: u8, len: u8, t: f64) -> Vec<u8> {
        let present = self.present(t) as u32;
        write_mem(&mut self.mem, table::PRESENT_POSITION.addr, &encode_le(present, 2));
        let start = (addr as usize).min(MEMORY_SIZE);
        let end = (addr as usize + len as usize).min(MEMORY_SIZE);
        self.mem[start..end].to_vec()
    }
}

fn write_mem(mem: &mut [u8; MEMORY_SIZE], addr: u8, bytes: &[u8]) {
    let start = addr as usize;
    mem[start..start + bytes.len()].copy_from_slice(bytes);
}

struct ServoChain {
    servos: BTreeMap<u8, SimServo>,
    started: Instant,
}

impl ServoChain {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Status replies for one request, in wire order.
    fn handle(&mut self, packet: &Packet) -> Vec<Vec<u8>> {
        let t = self.now();
        match (packet.id, packet.code) {
            (BROADCAST_ID, instruction::SYNC_READ) if packet.params.len() >= 2 => {
                let (addr, len) = (packet.params[0], packet.params[1]);
                packet.params[2..]
                    .iter()
                    .filter_map(|id| self.servos.get_mut(id).map(|s| encode(*id, 0, &s.read(addr, len, t))))
                    .collect()
            }
            (BROADCAST_ID, instruction::SYNC_WRITE) if packet.params.len() >= 2 => {
                let (addr, len) = (packet.params[0], packet.params[1] as usize);
                for chunk in packet.params[2..].chunks(len + 1) {
                    if chunk.len() != len + 1 {
                        break;
                    }
                    if let Some(servo) = self.servos.get_mut(&chunk[0]) {
                        servo.apply_write(addr, &chunk[1..], t);
                    }
                }
                Vec::new()
            }
            (id, code) => {
                let Some(servo) = self.servos.get_mut(&id) else { return Vec::new() };
                match code {
                    instruction::PING => vec![encode(id, 0, &[])],
                    instruction::READ if packet.params.len() == 2 => {
                        vec![encode(id, 0, &servo.read(packet.params[0], packet.params[1], t))]
                    }
                    instruction::WRITE if !packet.params.is_empty() => {
                        servo.apply_write(packet.params[0], &packet.params[1..], t);
                        vec![encode(id, 0, &[])]
                    }
                    _ => Vec::new(),
                }
            }
        }
    }
}

/// Test access to a running servo chain sim.
#[derive(Clone)]
pub struct ServoSimHandle {
    chain: Arc<Mutex<ServoChain>>,
}

impl ServoSimHandle {
    /// Fixes the shaft of servo `id` at `physical` steps.
    pub fn pin_position(&self, id: u8, physical: i32) {
        if let Ok(mut c) = self.chain.lock() {
            if let Some(s) = c.servos.get_mut(&id) {
                s.pinned = Some(physical);
            }
        }
    }

    pub fn unpin(&self, id: u8) {
        if let Ok(mut c) = self.chain.lock() {
            if let Some(s) = c.servos.get_mut(&id) {
                s.pinned = None;
            }
        }
    }

    pub fn torque_enabled(&self, id: u8) -> bool {
        self.chain
            .lock()
            .ok()
            .and_then(|c| c.servos.get(&id).map(|s| s.torque_enabled()))
            .unwrap_or(false)
    }

    /// Raw register contents, little-endian decoded.
    pub fn register(&self, id: u8, addr: u8, len: u8) -> Option<u32> {
        let c = self.chain.lock().ok()?;
        c.servos.get(&id).map(|s| s.value(addr, len))
    }

    pub fn present_position(&self, id: u8) -> Option<i32> {
        let c = self.chain.lock().ok()?;
        let t = c.now();
        c.servos.get(&id).map(|s| s.present(t))
    }
}

/// Starts a simulated servo chain with the given ids.
pub fn spawn_servo_sim(ids: &[u8]) -> (BoxedLink, ServoSimHandle) {
    let (host_end, device_end) = duplex(1024);
    let chain = ServoChain {
        servos: ids.iter().map(|id| (*id, SimServo::new(*id))).collect(),
        started: Instant::now(),
    };
    let handle = ServoSimHandle { chain: Arc::new(Mutex::new(chain)) };
    let chain = handle.chain.clone();
    tokio::spawn(async move {
        if let Err(e) = serve(device_end, chain).await {
            debug!("servo sim stopped: {:?}", e);
        }
    });
    (Box::new(host_end), handle)
}

async fn serve(mut io: DuplexStream, chain: Arc<Mutex<ServoChain>>) -> Result<(), crate::Error> {
    loop {
        let packet = read_packet(&mut io).await?;
        trace!("servo sim rx {:?}", packet);
        let replies = match chain.lock() {
            Ok(mut c) => c.handle(&packet),
            Err(_) => return Ok(()),
        };
        for reply in replies {
            io.write_all(&reply).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_position_applies_homing() {
        let mut servo = SimServo::new(1);
        servo.pinned = Some(3000);
        servo.apply_write(table::HOMING_OFFSET.addr, &encode_le(953, 2), 0.0);
        assert_eq!(servo.present(0.0), 2047);
    }

    #[test]
    fn torque_on_holds_goal() {
        let mut servo = SimServo::new(2);
        servo.apply_write(table::TORQUE_ENABLE.addr, &[1], 0.0);
        servo.apply_write(table::GOAL_POSITION.addr, &encode_le(1500, 2), 0.0);
        assert_eq!(servo.present(5.0), 1500);
        assert_eq!(servo.present(9.0), 1500);
    }
}

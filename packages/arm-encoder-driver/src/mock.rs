//! An in-memory encoder for tests.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    time::Duration,
};

use thiserror::Error;

use arm_encoder_protocol::{
    frame::READ_OPCODE, CanFrame, Encode, RegisterId, RegisterReply, StandardId, UnlockCommand,
    COMMAND_HEADER,
};

use crate::{BusMode, Connection};

#[derive(Debug, Error)]
pub enum MockError {
    #[error("link down")]
    LinkDown,
}

/// Register contents after a factory reset.
fn factory_defaults() -> BTreeMap<RegisterId, [u8; 6]> {
    use RegisterId as R;

    BTreeMap::from([
        (R::ApplySettings, [0x00; 6]),
        (R::ContentMode, [0x01, 0, 0, 0, 0, 0]),
        (R::ReturnRate, [0x06, 0, 0, 0, 0, 0]),
        (R::BaudRate, [0x04, 0, 0, 0, 0, 0]),
        (R::EncoderMode, [0x01, 0, 0, 0, 0, 0]),
        // 90 degrees
        (R::AngVal, [0x00, 0x20, 0, 0, 0, 0]),
        (R::Revolutions, [0xFE, 0xFF, 0, 0, 0, 0]),
        (R::AngularVel, [0x00, 0xE0, 0, 0, 0, 0]),
        // 25.34 °C
        (R::Temperature, [0xE6, 0x09, 0, 0, 0, 0]),
        (R::SpinDir, [0x00, 0, 0, 0, 0, 0]),
        (R::AngularVelSamplePeriod, [0xE8, 0x03, 0, 0, 0, 0]),
        (R::DeviceAddr, [0x50, 0x00, 0, 0, 0, 0]),
        (R::ReadRegister, [0x27, 0x00, 0x00, 0x00, 0, 0]),
        (R::VersionNumL, [0x12, 0x34, 0x56, 0x78, 0, 0]),
        (R::VersionNumH, [0x01, 0x00, 0x00, 0x00, 0, 0]),
    ])
}

/// Behaves like an encoder on a quiet bus.
///
/// Writes only land while unlocked, `save` persists the live registers and `restart`
/// reloads the persisted ones and relocks. Replies are queued on `send` and handed out
/// by `recv` after any queued noise.
#[derive(Debug)]
pub struct SimulatedEncoder {
    address: StandardId,
    live: BTreeMap<RegisterId, [u8; 6]>,
    saved: BTreeMap<RegisterId, [u8; 6]>,
    unlocked: bool,
    silent: BTreeSet<RegisterId>,
    noise: VecDeque<CanFrame>,
    pending: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
    pub bus_mode: BusMode,
    pub fail_sends: bool,
    pub fail_recvs: bool,
}

impl SimulatedEncoder {
    pub fn new() -> Self {
        Self {
            address: StandardId::default(),
            live: factory_defaults(),
            saved: factory_defaults(),
            unlocked: false,
            silent: BTreeSet::new(),
            noise: VecDeque::new(),
            pending: VecDeque::new(),
            sent: Vec::new(),
            bus_mode: BusMode::Normal,
            fail_sends: false,
            fail_recvs: false,
        }
    }

    /// Never answers reads of `register`.
    pub fn silence(&mut self, register: RegisterId) {
        self.silent.insert(register);
    }

    /// Overwrites the live value of `register`, bypassing the lock.
    pub fn set_raw(&mut self, register: RegisterId, value: [u8; 2]) {
        if let Some(bytes) = self.live.get_mut(&register) {
            bytes[..2].copy_from_slice(&value);
        }
    }

    pub fn raw(&self, register: RegisterId) -> [u8; 2] {
        let bytes = self.live.get(&register).copied().unwrap_or_default();
        [bytes[0], bytes[1]]
    }

    /// Queues a frame that `recv` returns before any reply.
    pub fn push_noise(&mut self, data: &[u8]) {
        self.noise.push_back(CanFrame::new(self.address, data).unwrap());
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn address(&self) -> StandardId {
        self.address
    }

    pub fn sent(&self) -> &[CanFrame] {
        &self.sent
    }

    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.sent.iter().map(|frame| frame.data().to_vec()).collect()
    }

    fn handle(&mut self, frame: CanFrame) {
        if frame.id() != self.address || frame.len() != 5 {
            return;
        }

        let data = frame.data();
        if data == UnlockCommand::BYTES {
            self.unlocked = true;
            return;
        }
        if data[..2] != COMMAND_HEADER {
            return;
        }

        if data[2] == READ_OPCODE {
            let Some(register) = RegisterId::from_address(data[3]) else {
                return;
            };
            if self.silent.contains(&register) {
                return;
            }
            if let Some(&[a, b, c, d, e, f]) = self.live.get(&register) {
                let reply = RegisterReply {
                    value: [a, b],
                    reserved: [c, d, e, f],
                };
                let mut bytes = [0u8; RegisterReply::LEN];
                reply.encode(&mut bytes);
                self.pending.push_back(CanFrame::from_array(self.address, bytes));
            }
            return;
        }

        let Some(register) = RegisterId::from_address(data[2]) else {
            return;
        };
        if !self.unlocked || !register.is_writable() {
            return;
        }

        if register == RegisterId::ApplySettings {
            match data[3] {
                0x00 => self.saved = self.live.clone(),
                0x01 => {
                    self.live = factory_defaults();
                    self.saved = factory_defaults();
                    self.restart();
                }
                0xFF => {
                    self.live = self.saved.clone();
                    self.restart();
                }
                _ => {}
            }
            return;
        }

        self.set_raw(register, [data[3], data[4]]);
    }

    fn restart(&mut self) {
        self.unlocked = false;
        let [lo, hi] = self.raw(RegisterId::DeviceAddr);
        self.address = StandardId::new(u16::from_le_bytes([lo, hi])).unwrap();
    }
}

impl Connection for SimulatedEncoder {
    type Error = MockError;

    async fn send(&mut self, frame: CanFrame) -> Result<(), Self::Error> {
        if self.fail_sends {
            return Err(MockError::LinkDown);
        }

        self.sent.push(frame);
        self.handle(frame);
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, Self::Error> {
        if self.fail_recvs {
            return Err(MockError::LinkDown);
        }

        if let Some(frame) = self.noise.pop_front().or_else(|| self.pending.pop_front()) {
            return Ok(Some(frame));
        }

        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn set_bus_mode(&mut self, mode: BusMode) -> Result<(), Self::Error> {
        self.bus_mode = mode;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn writes_need_the_unlock_frame() {
        let mut device = SimulatedEncoder::new();
        let write = CanFrame::new(device.address(), &[0xFF, 0xAA, 0x15, 0x01, 0x00]).unwrap();

        device.send(write).await.unwrap();
        assert_eq!(device.raw(RegisterId::SpinDir), [0x00, 0x00]);

        device
            .send(CanFrame::from_array(device.address(), UnlockCommand::BYTES))
            .await
            .unwrap();
        device.send(write).await.unwrap();
        assert_eq!(device.raw(RegisterId::SpinDir), [0x01, 0x00]);
    }
}

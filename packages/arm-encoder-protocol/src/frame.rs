//! CAN frames and the request/reply shapes carried inside them.
//!
//! | Frame         | Data bytes                    |
//! |---------------|-------------------------------|
//! | Read request  | `FF AA 27 <reg> 00`           |
//! | Unlock        | `FF AA 69 88 B5`              |
//! | Write request | `FF AA <reg> <lo> <hi>`       |
//! | Reply         | `55 5F <lo> <hi> .. .. .. ..` |
//!
//! Host frames are sent with the target's bus address as their standard identifier.
//! Replies are recognized by content alone; the device does not echo the register.

use core::fmt;
use thiserror::Error;

use crate::{
    COMMAND_HEADER, DEFAULT_DEVICE_ADDRESS, REPLY_HEADER, catalog,
    catalog::ValidationError,
    decode::{Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
    register::RegisterId,
    value::{ApplySettingsMode, RegisterValue},
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("{len} bytes do not fit in a CAN frame")]
    PayloadTooLong { len: usize },

    #[error("{raw:#x} is not an 11-bit identifier")]
    InvalidId { raw: u16 },
}

/// An 11-bit (non-extended) CAN identifier.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StandardId(u16);

impl StandardId {
    pub const MAX: u16 = 0x7FF;

    pub const fn new(raw: u16) -> Result<Self, FrameError> {
        if raw > Self::MAX {
            return Err(FrameError::InvalidId { raw });
        }
        Ok(Self(raw))
    }

    pub const fn as_raw(self) -> u16 {
        self.0
    }
}

impl Default for StandardId {
    fn default() -> Self {
        Self(DEFAULT_DEVICE_ADDRESS)
    }
}

impl fmt::Display for StandardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#05x}", self.0)
    }
}

/// A classic CAN data frame with a standard identifier.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct CanFrame {
    id: StandardId,
    len: u8,
    data: [u8; 8],
}

impl CanFrame {
    pub const MAX_LEN: usize = 8;

    pub fn new(id: StandardId, data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > Self::MAX_LEN {
            return Err(FrameError::PayloadTooLong { len: data.len() });
        }

        let mut frame = Self {
            id,
            len: data.len() as u8,
            data: [0; 8],
        };
        frame.data[..data.len()].copy_from_slice(data);
        Ok(frame)
    }

    /// Builds a frame from an array that is known to fit.
    pub fn from_array<const N: usize>(id: StandardId, data: [u8; N]) -> Self {
        const { assert!(N <= CanFrame::MAX_LEN) };

        let mut frame = Self {
            id,
            len: N as u8,
            data: [0; 8],
        };
        frame.data[..N].copy_from_slice(&data);
        frame
    }

    /// Builds a frame whose data is the encoding of `command`.
    pub fn from_command(id: StandardId, command: &impl Encode) -> Result<Self, FrameError> {
        let len = command.size();
        if len > Self::MAX_LEN {
            return Err(FrameError::PayloadTooLong { len });
        }

        let mut data = [0u8; 8];
        command.encode(&mut data[..len]);
        Self::new(id, &data[..len])
    }

    pub const fn id(&self) -> StandardId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanFrame({} {:02x?})", self.id, self.data())
    }
}

/// A device-bound command. All of them encode to five bytes.
pub trait HostCommand: Encode {
    fn to_frame(&self, id: StandardId) -> CanFrame {
        let mut data = [0u8; 5];
        self.encode(&mut data);
        CanFrame::from_array(id, data)
    }
}

impl HostCommand for ReadRequest {}
impl HostCommand for UnlockCommand {}
impl HostCommand for WriteRequest {}

/// Opcode of the read command, sent where a write would put the register address.
pub const READ_OPCODE: u8 = 0x27;

/// Asks the device to reply with the value of `register`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ReadRequest {
    pub register: RegisterId,
}

impl ReadRequest {
    pub const fn new(register: RegisterId) -> Self {
        Self { register }
    }
}

impl Encode for ReadRequest {
    fn size(&self) -> usize {
        5
    }

    fn encode(&self, data: &mut [u8]) {
        COMMAND_HEADER.encode(data);
        [READ_OPCODE, self.register.address(), 0x00].encode(&mut data[2..]);
    }
}

/// Puts the device into unlocked mode so that writes take effect.
///
/// Sending it is not acknowledged; only a later read can show whether a write landed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct UnlockCommand;

impl UnlockCommand {
    pub const BYTES: [u8; 5] = [0xFF, 0xAA, 0x69, 0x88, 0xB5];
}

impl Encode for UnlockCommand {
    fn size(&self) -> usize {
        Self::BYTES.len()
    }

    fn encode(&self, data: &mut [u8]) {
        Self::BYTES.encode(data);
    }
}

/// Writes two payload bytes to a register. The device does not acknowledge writes.
///
/// Only [`WriteRequest::new`] and [`WriteRequest::apply_settings`] build one, so every
/// payload has been through the catalog.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WriteRequest {
    register: RegisterId,
    payload: [u8; 2],
}

impl WriteRequest {
    /// Validates `value` through the catalog and builds the write.
    pub fn new(register: RegisterId, value: &RegisterValue) -> Result<Self, ValidationError> {
        Ok(Self {
            register,
            payload: catalog::encode(register, value)?,
        })
    }

    pub const fn apply_settings(mode: ApplySettingsMode) -> Self {
        Self {
            register: RegisterId::ApplySettings,
            payload: [mode.code(), 0x00],
        }
    }

    pub const fn register(&self) -> RegisterId {
        self.register
    }

    pub const fn payload(&self) -> [u8; 2] {
        self.payload
    }

    /// The action this request triggers, if it writes the apply-settings register.
    pub const fn apply_settings_mode(&self) -> Option<ApplySettingsMode> {
        match self.register {
            RegisterId::ApplySettings => ApplySettingsMode::from_code(self.payload[0]),
            _ => None,
        }
    }
}

impl Encode for WriteRequest {
    fn size(&self) -> usize {
        5
    }

    fn encode(&self, data: &mut [u8]) {
        COMMAND_HEADER.encode(data);
        data[2] = self.register.address();
        self.payload.encode(&mut data[3..]);
    }
}

/// The device's answer to a [`ReadRequest`].
///
/// # Encoding
///
/// | Field      | Size | Description |
/// |------------|------|-------------|
/// | `header`   | 2    | Must be [`REPLY_HEADER`]. |
/// | `value`    | 2    | Little-endian register value. |
/// | `reserved` | 4    | Unused by this protocol version. |
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RegisterReply {
    pub value: [u8; 2],
    pub reserved: [u8; 4],
}

impl RegisterReply {
    pub const HEADER: [u8; 2] = REPLY_HEADER;
    pub const LEN: usize = 8;

    /// Whether `data` has the exact shape of a reply.
    pub fn matches(data: &[u8]) -> bool {
        data.len() == Self::LEN && data[..2] == Self::HEADER
    }

    /// All value bytes following the header.
    pub fn payload(&self) -> [u8; 6] {
        let [a, b] = self.value;
        let [c, d, e, f] = self.reserved;
        [a, b, c, d, e, f]
    }

    /// Interprets this reply as the value of `register`.
    pub fn decode_value(&self, register: RegisterId) -> Result<RegisterValue, DecodeError> {
        catalog::decode(register, &self.payload())
    }
}

impl Decode for RegisterReply {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::LEN {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd));
        }
        if <[u8; 2]>::decode(data)? != Self::HEADER {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::InvalidHeader));
        }

        Ok(Self {
            value: Decode::decode(data)?,
            reserved: Decode::decode(data)?,
        })
    }
}

impl Encode for RegisterReply {
    fn size(&self) -> usize {
        Self::LEN
    }

    fn encode(&self, data: &mut [u8]) {
        Self::HEADER.encode(data);
        self.value.encode(&mut data[2..]);
        self.reserved.encode(&mut data[4..]);
    }
}

//! Register addresses and their storage kinds.

use core::fmt;

use crate::decode::{Decode, DecodeError, DecodeErrorKind};

/// An addressable register on the encoder.
///
/// The discriminant is the address that goes on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RegisterId {
    /// Save, factory reset or restart. Written, never meaningfully read.
    ApplySettings = 0x00,
    /// Which content the encoder publishes on its own.
    ContentMode = 0x02,
    /// How often the encoder publishes.
    ReturnRate = 0x03,
    /// Bus bit rate.
    BaudRate = 0x04,
    /// Single-turn or multi-turn counting.
    EncoderMode = 0x10,
    /// Current angle, `degrees = raw * 360 / 32768`.
    AngVal = 0x11,
    /// Signed revolution count.
    Revolutions = 0x12,
    /// Signed angular velocity accumulator.
    AngularVel = 0x13,
    /// Temperature in hundredths of a degree Celsius.
    Temperature = 0x14,
    /// Which rotation direction counts as positive.
    SpinDir = 0x15,
    /// Angular velocity sample period in units of 100 µs.
    AngularVelSamplePeriod = 0x17,
    /// 11-bit bus address of the encoder.
    DeviceAddr = 0x1A,
    /// The read command itself. Listed by the device manual as a register.
    ReadRegister = 0x27,
    /// Low word of the firmware version.
    VersionNumL = 0x2E,
    /// High word of the firmware version.
    VersionNumH = 0x2F,
}

/// How the value bytes of a register are interpreted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterKind {
    /// A discrete code looked up in a per-register table.
    EnumCoded,
    /// Unsigned little-endian 16-bit integer.
    Unsigned16LE,
    /// Signed little-endian 16-bit integer.
    Signed16LE,
    /// Four raw bytes passed through untouched.
    Opaque4Bytes,
}

impl RegisterId {
    /// Every register, in address order.
    pub const ALL: [RegisterId; 15] = [
        RegisterId::ApplySettings,
        RegisterId::ContentMode,
        RegisterId::ReturnRate,
        RegisterId::BaudRate,
        RegisterId::EncoderMode,
        RegisterId::AngVal,
        RegisterId::Revolutions,
        RegisterId::AngularVel,
        RegisterId::Temperature,
        RegisterId::SpinDir,
        RegisterId::AngularVelSamplePeriod,
        RegisterId::DeviceAddr,
        RegisterId::ReadRegister,
        RegisterId::VersionNumL,
        RegisterId::VersionNumH,
    ];

    /// The on-wire register address.
    pub const fn address(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            RegisterId::ApplySettings => "APPLY_SETTINGS",
            RegisterId::ContentMode => "CONTENT_MODE",
            RegisterId::ReturnRate => "RETURN_RATE",
            RegisterId::BaudRate => "BAUD_RATE",
            RegisterId::EncoderMode => "ENCODER_MODE",
            RegisterId::AngVal => "ANG_VAL",
            RegisterId::Revolutions => "REVOLUTIONS",
            RegisterId::AngularVel => "ANGULAR_VEL",
            RegisterId::Temperature => "TEMPERATURE",
            RegisterId::SpinDir => "SPIN_DIR",
            RegisterId::AngularVelSamplePeriod => "ANGULAR_VEL_SAMPLE_PERIOD",
            RegisterId::DeviceAddr => "DEVICE_ADDR",
            RegisterId::ReadRegister => "READ_REGISTER",
            RegisterId::VersionNumL => "VERSION_NUM_L",
            RegisterId::VersionNumH => "VERSION_NUM_H",
        }
    }

    /// Looks a register up by its on-wire address.
    pub fn from_address(address: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.address() == address)
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#04x})", self.name(), self.address())
    }
}

impl Decode for RegisterId {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        const ADDRESSES: [u8; 15] = [
            0x00, 0x02, 0x03, 0x04, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x17, 0x1A, 0x27, 0x2E,
            0x2F,
        ];

        let value = u8::decode(data)?;
        Self::from_address(value).ok_or_else(|| {
            DecodeError::new::<Self>(DecodeErrorKind::UnrecognizedByte {
                name: "RegisterId",
                value,
                expected: &ADDRESSES,
            })
        })
    }
}

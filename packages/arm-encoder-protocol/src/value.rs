//! Symbolic register values and the tables that map them to wire codes.

use alloc::string::{String, ToString};
use bitflags::bitflags;
use core::{fmt, str::FromStr};
use thiserror::Error;

use crate::{
    decode::{Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
};

/// A string did not name any value of a setting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{input:?} is not a valid {name}")]
pub struct UnknownSetting {
    pub name: &'static str,
    pub input: String,
}

impl UnknownSetting {
    fn new<T>(input: &str) -> Self {
        let name = core::any::type_name::<T>();
        Self {
            name: name.rsplit("::").next().unwrap_or(name),
            input: input.to_string(),
        }
    }
}

/// Declares an enum-coded register value together with its code table.
///
/// The table is the only mapping between codes, variants and labels: decoding,
/// encoding, parsing and display all go through it.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $code:literal => $label:literal,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant = $code,
            )*
        }

        impl $name {
            /// Every value, in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            /// Every code the device may answer with.
            pub const CODES: &'static [u8] = &[$($code),*];

            pub const fn code(self) -> u8 {
                self as u8
            }

            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)*
                    _ => None,
                }
            }

            pub const fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = UnknownSetting;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|value| value.label() == s)
                    .ok_or_else(|| UnknownSetting::new::<Self>(s))
            }
        }

        impl Decode for $name {
            fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
                // Only the low byte carries the code.
                let [code, _] = <[u8; 2]>::decode(data)?;
                Self::from_code(code).ok_or_else(|| {
                    DecodeError::new::<Self>(DecodeErrorKind::UnrecognizedByte {
                        name: stringify!($name),
                        value: code,
                        expected: Self::CODES,
                    })
                })
            }
        }

        impl Encode for $name {
            fn size(&self) -> usize {
                2
            }

            fn encode(&self, data: &mut [u8]) {
                [self.code(), 0x00].encode(data);
            }
        }
    };
}

coded_enum! {
    /// Rate at which the encoder publishes its content on its own.
    pub enum ReturnRate {
        Hz0_1 = 0x00 => "0.1",
        Hz0_2 = 0x01 => "0.2",
        Hz0_5 = 0x02 => "0.5",
        Hz1 = 0x03 => "1",
        Hz2 = 0x04 => "2",
        Hz5 = 0x05 => "5",
        Hz10 = 0x06 => "10",
        Hz20 = 0x07 => "20",
        Hz50 = 0x08 => "50",
        Hz100 = 0x09 => "100",
        Hz125 = 0x0A => "125",
        Hz200 = 0x0B => "200",
        Hz1000 = 0x0C => "1000",
        Hz2000 = 0x0D => "2000",
        /// Publish once, on request.
        SingleReturn = 0x0E => "single_return",
    }
}

impl ReturnRate {
    /// The publish rate in hertz, or `None` for [`ReturnRate::SingleReturn`].
    pub const fn hertz(self) -> Option<f32> {
        Some(match self {
            ReturnRate::Hz0_1 => 0.1,
            ReturnRate::Hz0_2 => 0.2,
            ReturnRate::Hz0_5 => 0.5,
            ReturnRate::Hz1 => 1.0,
            ReturnRate::Hz2 => 2.0,
            ReturnRate::Hz5 => 5.0,
            ReturnRate::Hz10 => 10.0,
            ReturnRate::Hz20 => 20.0,
            ReturnRate::Hz50 => 50.0,
            ReturnRate::Hz100 => 100.0,
            ReturnRate::Hz125 => 125.0,
            ReturnRate::Hz200 => 200.0,
            ReturnRate::Hz1000 => 1000.0,
            ReturnRate::Hz2000 => 2000.0,
            ReturnRate::SingleReturn => return None,
        })
    }
}

impl Default for ReturnRate {
    fn default() -> Self {
        ReturnRate::Hz10
    }
}

coded_enum! {
    /// Bus bit rate, in kbit/s.
    pub enum BaudRate {
        Kbps1000 = 0x00 => "1000",
        Kbps800 = 0x01 => "800",
        Kbps500 = 0x02 => "500",
        Kbps400 = 0x03 => "400",
        Kbps250 = 0x04 => "250",
        Kbps200 = 0x05 => "200",
        Kbps125 = 0x06 => "125",
        Kbps100 = 0x07 => "100",
        Kbps80 = 0x08 => "80",
        Kbps50 = 0x09 => "50",
        Kbps40 = 0x0A => "40",
        Kbps20 = 0x0B => "20",
        Kbps10 = 0x0C => "10",
        Kbps5 = 0x0D => "5",
        Kbps3 = 0x0E => "3",
    }
}

impl BaudRate {
    pub const fn kbps(self) -> u16 {
        match self {
            BaudRate::Kbps1000 => 1000,
            BaudRate::Kbps800 => 800,
            BaudRate::Kbps500 => 500,
            BaudRate::Kbps400 => 400,
            BaudRate::Kbps250 => 250,
            BaudRate::Kbps200 => 200,
            BaudRate::Kbps125 => 125,
            BaudRate::Kbps100 => 100,
            BaudRate::Kbps80 => 80,
            BaudRate::Kbps50 => 50,
            BaudRate::Kbps40 => 40,
            BaudRate::Kbps20 => 20,
            BaudRate::Kbps10 => 10,
            BaudRate::Kbps5 => 5,
            BaudRate::Kbps3 => 3,
        }
    }

    pub fn from_kbps(kbps: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|rate| rate.kbps() == kbps)
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        BaudRate::Kbps250
    }
}

coded_enum! {
    pub enum EncoderMode {
        SingleTurn = 0x00 => "single",
        MultiTurn = 0x01 => "multi",
    }
}

coded_enum! {
    /// Which rotation, viewed from the base, counts as positive.
    pub enum SpinDirection {
        Clockwise = 0x00 => "clockwise",
        Counterclockwise = 0x01 => "counterclockwise",
    }
}

bitflags! {
    /// What the encoder publishes on its own.
    ///
    /// Only the non-empty combinations are valid register values.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ContentMode: u8 {
        /// Angle, angular velocity and revolutions.
        const ANGLES = 0x01;
        const TEMPERATURE = 0x02;
        const BOTH = Self::ANGLES.bits() | Self::TEMPERATURE.bits();
    }
}

impl ContentMode {
    pub const CODES: &'static [u8] = &[0x01, 0x02, 0x03];

    pub const fn code(self) -> u8 {
        self.bits()
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01..=0x03 => Some(Self::from_bits_retain(code)),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        if self == Self::BOTH {
            "both"
        } else if self == Self::TEMPERATURE {
            "temperature"
        } else {
            "angles"
        }
    }
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ContentMode {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "angles" => Ok(Self::ANGLES),
            "temperature" => Ok(Self::TEMPERATURE),
            "both" => Ok(Self::BOTH),
            _ => Err(UnknownSetting::new::<Self>(s)),
        }
    }
}

impl Decode for ContentMode {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let [code, _] = <[u8; 2]>::decode(data)?;
        Self::from_code(code).ok_or_else(|| {
            DecodeError::new::<Self>(DecodeErrorKind::UnrecognizedByte {
                name: "ContentMode",
                value: code,
                expected: Self::CODES,
            })
        })
    }
}

impl Encode for ContentMode {
    fn size(&self) -> usize {
        2
    }

    fn encode(&self, data: &mut [u8]) {
        [self.code(), 0x00].encode(data);
    }
}

/// Action triggered by writing the apply-settings register.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ApplySettingsMode {
    /// Persist the current settings.
    Save = 0x00,
    FactoryReset = 0x01,
    /// Apply persisted settings and leave unlocked mode. Unsaved writes are lost.
    Restart = 0xFF,
}

impl ApplySettingsMode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Save),
            0x01 => Some(Self::FactoryReset),
            0xFF => Some(Self::Restart),
            _ => None,
        }
    }

    /// Whether the device drops out of unlocked mode after this action.
    pub const fn relocks(self) -> bool {
        !matches!(self, ApplySettingsMode::Save)
    }
}

impl fmt::Display for ApplySettingsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplySettingsMode::Save => "save",
            ApplySettingsMode::FactoryReset => "factory_reset",
            ApplySettingsMode::Restart => "restart",
        })
    }
}

impl FromStr for ApplySettingsMode {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "save" => Ok(ApplySettingsMode::Save),
            "factory_reset" | "factoryReset" => Ok(ApplySettingsMode::FactoryReset),
            "restart" => Ok(ApplySettingsMode::Restart),
            _ => Err(UnknownSetting::new::<Self>(s)),
        }
    }
}

impl Encode for ApplySettingsMode {
    fn size(&self) -> usize {
        2
    }

    fn encode(&self, data: &mut [u8]) {
        [self.code(), 0x00].encode(data);
    }
}

/// A decoded register value, or a value to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterValue {
    ContentMode(ContentMode),
    ReturnRate(ReturnRate),
    BaudRate(BaudRate),
    EncoderMode(EncoderMode),
    SpinDirection(SpinDirection),
    /// A 16-bit numeric register, widened so out-of-domain inputs are representable.
    Integer(i32),
    Opaque([u8; 4]),
    ApplySettings(ApplySettingsMode),
}

impl RegisterValue {
    pub const fn as_integer(&self) -> Option<i32> {
        match self {
            RegisterValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_opaque(&self) -> Option<[u8; 4]> {
        match self {
            RegisterValue::Opaque(bytes) => Some(*bytes),
            _ => None,
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::ContentMode(v) => v.fmt(f),
            RegisterValue::ReturnRate(v) => v.fmt(f),
            RegisterValue::BaudRate(v) => v.fmt(f),
            RegisterValue::EncoderMode(v) => v.fmt(f),
            RegisterValue::SpinDirection(v) => v.fmt(f),
            RegisterValue::Integer(v) => v.fmt(f),
            RegisterValue::Opaque(bytes) => write!(f, "{bytes:02x?}"),
            RegisterValue::ApplySettings(v) => v.fmt(f),
        }
    }
}

macro_rules! impl_register_value_conversions {
    ($($variant:ident($t:ty)),*) => {
        $(
            impl From<$t> for RegisterValue {
                fn from(value: $t) -> Self {
                    RegisterValue::$variant(value)
                }
            }

            impl TryFrom<RegisterValue> for $t {
                type Error = RegisterValue;

                fn try_from(value: RegisterValue) -> Result<Self, Self::Error> {
                    match value {
                        RegisterValue::$variant(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_register_value_conversions!(
    ContentMode(ContentMode),
    ReturnRate(ReturnRate),
    BaudRate(BaudRate),
    EncoderMode(EncoderMode),
    SpinDirection(SpinDirection),
    Opaque([u8; 4]),
    ApplySettings(ApplySettingsMode)
);

impl From<u16> for RegisterValue {
    fn from(value: u16) -> Self {
        RegisterValue::Integer(value.into())
    }
}

impl From<i16> for RegisterValue {
    fn from(value: i16) -> Self {
        RegisterValue::Integer(value.into())
    }
}

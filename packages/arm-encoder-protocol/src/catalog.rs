//! The register catalog: kind, domain and access for every register, and the
//! decode/encode rules built on top of them.
//!
//! Every byte that crosses the wire as a register value goes through [`decode`] or
//! [`encode`]. Values outside a register's domain are rejected here, before a frame
//! is ever built, and are never clamped.

use core::ops::RangeInclusive;
use thiserror::Error;

use crate::{
    decode::{Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
    register::{RegisterId, RegisterKind},
    value::{
        BaudRate, ContentMode, EncoderMode, RegisterValue, ReturnRate, SpinDirection,
        UnknownSetting,
    },
};

/// Whether the host may write a register.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Static description of one register.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RegisterEntry {
    pub id: RegisterId,
    pub kind: RegisterKind,
    pub access: Access,
    /// Allowed raw values of a numeric register.
    pub domain: Option<(i32, i32)>,
}

impl RegisterEntry {
    const fn new(
        id: RegisterId,
        kind: RegisterKind,
        access: Access,
        domain: Option<(i32, i32)>,
    ) -> Self {
        Self {
            id,
            kind,
            access,
            domain,
        }
    }

    pub const fn is_writable(&self) -> bool {
        matches!(self.access, Access::ReadWrite)
    }

    pub fn domain(&self) -> Option<RangeInclusive<i32>> {
        self.domain.map(|(min, max)| min..=max)
    }
}

const U16: Option<(i32, i32)> = Some((u16::MIN as i32, u16::MAX as i32));
const I16: Option<(i32, i32)> = Some((i16::MIN as i32, i16::MAX as i32));

/// Every register, in address order.
pub static CATALOG: [RegisterEntry; 15] = {
    use Access::*;
    use RegisterId as R;
    use RegisterKind::*;

    [
        RegisterEntry::new(R::ApplySettings, Opaque4Bytes, ReadWrite, None),
        RegisterEntry::new(R::ContentMode, EnumCoded, ReadWrite, None),
        RegisterEntry::new(R::ReturnRate, EnumCoded, ReadWrite, None),
        RegisterEntry::new(R::BaudRate, EnumCoded, ReadWrite, None),
        RegisterEntry::new(R::EncoderMode, EnumCoded, ReadWrite, None),
        RegisterEntry::new(R::AngVal, Unsigned16LE, ReadWrite, U16),
        RegisterEntry::new(R::Revolutions, Signed16LE, ReadWrite, I16),
        RegisterEntry::new(R::AngularVel, Signed16LE, ReadOnly, I16),
        RegisterEntry::new(R::Temperature, Signed16LE, ReadOnly, I16),
        RegisterEntry::new(R::SpinDir, EnumCoded, ReadWrite, None),
        RegisterEntry::new(R::AngularVelSamplePeriod, Unsigned16LE, ReadWrite, Some((1, 0xFFFF))),
        // 11-bit standard identifier
        RegisterEntry::new(R::DeviceAddr, Unsigned16LE, ReadWrite, Some((0, 0x7FF))),
        RegisterEntry::new(R::ReadRegister, Opaque4Bytes, ReadOnly, None),
        RegisterEntry::new(R::VersionNumL, Opaque4Bytes, ReadOnly, None),
        RegisterEntry::new(R::VersionNumH, Opaque4Bytes, ReadOnly, None),
    ]
};

/// Looks up the catalog entry of a register.
pub fn entry(register: RegisterId) -> &'static RegisterEntry {
    CATALOG
        .iter()
        .find(|entry| entry.id == register)
        .unwrap_or_else(|| unreachable!("{register} is missing from the catalog"))
}

impl RegisterId {
    pub fn kind(self) -> RegisterKind {
        entry(self).kind
    }

    pub fn is_writable(self) -> bool {
        entry(self).is_writable()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid value for {register}: {kind}")]
pub struct ValidationError {
    pub register: RegisterId,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub const fn new(register: RegisterId, kind: ValidationErrorKind) -> Self {
        Self { register, kind }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    #[error("{value} is outside of {min}..={max}")]
    OutOfRange { value: i32, min: i32, max: i32 },

    #[error("register is read-only")]
    ReadOnly,

    #[error("expected a {expected:?} value")]
    KindMismatch { expected: RegisterKind },

    #[error(transparent)]
    UnknownSetting(#[from] UnknownSetting),
}

/// Decodes the value bytes of a reply to a read of `register`.
///
/// `payload` starts at the first value byte, right after the reply header.
///
/// # Errors
///
/// Returns [`DecodeErrorKind::UnrecognizedByte`] when an enum-coded register answers
/// with a code missing from its table and [`DecodeErrorKind::OutOfRange`] when a
/// numeric register answers outside of its domain.
pub fn decode(register: RegisterId, mut payload: &[u8]) -> Result<RegisterValue, DecodeError> {
    let data = &mut payload;
    let entry = entry(register);

    Ok(match entry.kind {
        RegisterKind::EnumCoded => match register {
            RegisterId::ContentMode => ContentMode::decode(data)?.into(),
            RegisterId::ReturnRate => ReturnRate::decode(data)?.into(),
            RegisterId::BaudRate => BaudRate::decode(data)?.into(),
            RegisterId::EncoderMode => EncoderMode::decode(data)?.into(),
            RegisterId::SpinDir => SpinDirection::decode(data)?.into(),
            _ => unreachable!("{register} has no code table"),
        },
        RegisterKind::Unsigned16LE => {
            let value = i32::from(u16::decode(data)?);
            check_decoded_domain(entry, value)?
        }
        RegisterKind::Signed16LE => {
            let value = i32::from(i16::decode(data)?);
            check_decoded_domain(entry, value)?
        }
        RegisterKind::Opaque4Bytes => RegisterValue::Opaque(<[u8; 4]>::decode(data)?),
    })
}

fn check_decoded_domain(entry: &RegisterEntry, value: i32) -> Result<RegisterValue, DecodeError> {
    match entry.domain() {
        Some(domain) if !domain.contains(&value) => Err(DecodeError::new::<RegisterValue>(
            DecodeErrorKind::OutOfRange { value },
        )),
        _ => Ok(RegisterValue::Integer(value)),
    }
}

/// Validates `value` against `register` and produces the two payload bytes of a write.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the register is read-only, if the value has the
/// wrong shape for the register, or if a numeric value is outside of its domain.
pub fn encode(register: RegisterId, value: &RegisterValue) -> Result<[u8; 2], ValidationError> {
    let entry = entry(register);
    let invalid = |kind| ValidationError::new(register, kind);

    if !entry.is_writable() {
        return Err(invalid(ValidationErrorKind::ReadOnly));
    }

    let mut payload = [0u8; 2];
    match (register, value) {
        (RegisterId::ContentMode, RegisterValue::ContentMode(v)) => {
            if ContentMode::from_code(v.code()).is_none() {
                return Err(invalid(ValidationErrorKind::OutOfRange {
                    value: v.code().into(),
                    min: 1,
                    max: 3,
                }));
            }
            v.encode(&mut payload)
        }
        (RegisterId::ReturnRate, RegisterValue::ReturnRate(v)) => v.encode(&mut payload),
        (RegisterId::BaudRate, RegisterValue::BaudRate(v)) => v.encode(&mut payload),
        (RegisterId::EncoderMode, RegisterValue::EncoderMode(v)) => v.encode(&mut payload),
        (RegisterId::SpinDir, RegisterValue::SpinDirection(v)) => v.encode(&mut payload),
        (RegisterId::ApplySettings, RegisterValue::ApplySettings(v)) => v.encode(&mut payload),
        (_, RegisterValue::Integer(v)) if entry.domain.is_some() => {
            let (min, max) = entry.domain.unwrap_or_default();
            if !(min..=max).contains(v) {
                return Err(invalid(ValidationErrorKind::OutOfRange {
                    value: *v,
                    min,
                    max,
                }));
            }

            match entry.kind {
                RegisterKind::Signed16LE => (*v as i16).encode(&mut payload),
                _ => (*v as u16).encode(&mut payload),
            }
        }
        _ => {
            return Err(invalid(ValidationErrorKind::KindMismatch {
                expected: entry.kind,
            }));
        }
    }

    Ok(payload)
}

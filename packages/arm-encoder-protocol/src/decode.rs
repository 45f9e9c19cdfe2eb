use core::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    type_name: &'static str,
}

impl DecodeError {
    pub fn new<T>(kind: DecodeErrorKind) -> Self {
        Self {
            kind,
            type_name: core::any::type_name::<T>(),
        }
    }

    pub const fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// Whether the device answered, but with a code that has no meaning for the register.
    pub const fn is_unrecognized_byte(&self) -> bool {
        matches!(self.kind, DecodeErrorKind::UnrecognizedByte { .. })
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to decode {}: {}", self.type_name, self.kind)
    }
}

#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("Frame was too short.")]
    UnexpectedEnd,

    #[error("Frame did not have a valid header sequence.")]
    InvalidHeader,

    #[error(
        "Could not decode {name} with unrecognized byte. Found {value:#04x}, expected one of: {expected:02x?}."
    )]
    UnrecognizedByte {
        name: &'static str,
        value: u8,
        expected: &'static [u8],
    },

    #[error("Register value {value} is outside of the register's domain.")]
    OutOfRange { value: i32 },
}

/// A type that can be reconstructed (decoded) from a raw sequence of bytes.
///
/// The input slice is advanced by the number of bytes consumed.
pub trait Decode {
    /// Attempts to decode `Self` from the beginning of the provided byte slice.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the input is too short or holds a value
    /// that `Self` cannot represent.
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

macro_rules! impl_decode_for_primitive {
    ($($t:ty),*) => {
        $(
            impl Decode for $t {
                fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
                    const SIZE: usize = size_of::<$t>();
                    let Some((bytes, rest)) = data.split_first_chunk::<SIZE>() else {
                        return Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd));
                    };
                    *data = rest;
                    Ok(Self::from_le_bytes(*bytes))
                }
            }
        )*
    };
}

impl_decode_for_primitive!(u8, u16, i16);

impl<const N: usize> Decode for [u8; N] {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let Some((bytes, rest)) = data.split_first_chunk::<N>() else {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd));
        };
        *data = rest;
        Ok(*bytes)
    }
}

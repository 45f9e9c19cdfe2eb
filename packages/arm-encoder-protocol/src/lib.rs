//! Register map, value codecs and CAN framing for the arm rotary-encoder protocol.
//!
//! The encoder exposes a small set of numbered registers. The host reads one by sending a
//! [`ReadRequest`] and waiting for a [`RegisterReply`], and writes one with a
//! [`WriteRequest`], normally preceded by an [`UnlockCommand`]. Raw reply bytes are turned
//! into typed values by the [`catalog`], which is also the single place that validates
//! values before they are encoded.
//!
//! This crate performs no I/O. Transports and request/response sequencing live in
//! `arm-encoder-driver`.

#![no_std]

extern crate alloc;

pub mod catalog;
pub mod frame;
pub mod publish;
pub mod register;
pub mod units;
pub mod value;

mod decode;
mod encode;

pub use catalog::ValidationError;
pub use decode::{Decode, DecodeError, DecodeErrorKind};
pub use encode::Encode;
pub use frame::{
    CanFrame, FrameError, HostCommand, ReadRequest, RegisterReply, StandardId, UnlockCommand,
    WriteRequest,
};
pub use register::{RegisterId, RegisterKind};
pub use value::RegisterValue;

/// Starting byte sequence for all device-bound frames.
pub const COMMAND_HEADER: [u8; 2] = [0xFF, 0xAA];

/// Starting byte sequence of a reply to a [`ReadRequest`].
pub const REPLY_HEADER: [u8; 2] = [0x55, 0x5F];

/// Bus address the encoder ships with.
pub const DEFAULT_DEVICE_ADDRESS: u16 = 0x50;

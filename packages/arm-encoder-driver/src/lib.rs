//! Host-side client for the arm rotary encoder. Not affiliated with the encoder's manufacturer.
//!
//! The crate is built around the [`Connection`] trait, which is the only way frames reach
//! the bus. On top of it, an [`EncoderClient`] drives one register transaction at a time,
//! gates writes behind the unlock frame and can sweep every register into a
//! [`DeviceSnapshot`].

pub use arm_encoder_protocol as protocol;

use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::time::Instant;

use arm_encoder_protocol::{
    publish::PublishedReport, CanFrame, DecodeError, RegisterReply, ValidationError,
};

pub mod client;
pub mod config;
pub mod monitor;
pub mod slcan;
pub mod snapshot;
pub mod transaction;
pub mod unlock;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

pub use client::EncoderClient;
pub use config::LinkConfig;
pub use monitor::PublishMonitor;
pub use snapshot::DeviceSnapshot;
pub use transaction::{RequestTransaction, TransactionConfig};
pub use unlock::UnlockGate;

pub trait CheckHeader {
    fn has_valid_header(data: &[u8]) -> bool;
}

impl CheckHeader for RegisterReply {
    fn has_valid_header(data: &[u8]) -> bool {
        RegisterReply::matches(data)
    }
}

impl CheckHeader for PublishedReport {
    fn has_valid_header(data: &[u8]) -> bool {
        PublishedReport::matches(data)
    }
}

/// Whether the adapter takes part in the bus or only listens.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum BusMode {
    #[default]
    Normal,
    ListenOnly,
}

/// Represents an open link to the bus the encoder sits on.
#[allow(async_fn_in_trait)]
pub trait Connection {
    type Error: std::error::Error + 'static;

    /// Sends a frame.
    fn send(&mut self, frame: CanFrame) -> impl Future<Output = Result<(), Self::Error>>;

    /// Receives the next frame, or `None` if nothing arrived within `timeout`.
    fn recv(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<CanFrame>, Self::Error>>;

    /// Switches the adapter's bus mode.
    ///
    /// Adapters that cannot switch keep this default, which does nothing.
    fn set_bus_mode(&mut self, mode: BusMode) -> impl Future<Output = Result<(), Self::Error>> {
        let _ = mode;
        async { Ok(()) }
    }
}

/// The instant `timeout` from now.
///
/// Waits too long to represent end roughly thirty years out instead of overflowing.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

/// Failure of a single register operation.
///
/// A read that gets no answer is not an error; it resolves to `Ok(None)`.
#[derive(Error, Debug)]
pub enum RequestError<E: std::error::Error + 'static> {
    #[error("Transport error: {0}")]
    Transport(#[source] E),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Reply decoding error: {0}")]
    Decode(#[from] DecodeError),
}

impl<E: std::error::Error + 'static> RequestError<E> {
    /// Whether the device answered with a code that has no meaning for the register.
    pub fn is_unrecognized_byte(&self) -> bool {
        matches!(self, RequestError::Decode(e) if e.is_unrecognized_byte())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unbounded_deadlines_do_not_overflow() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::from_secs(2)), now + Duration::from_secs(2));
        assert!(deadline_after(Duration::MAX) > now + Duration::from_secs(86400 * 365));
    }
}

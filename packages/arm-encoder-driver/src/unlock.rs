//! Writes and the unlock frame that must precede them.
//!
//! The device ignores writes unless it is in unlocked mode. Neither the unlock frame nor
//! a write is acknowledged, so the only way to know whether a write landed is to read
//! the register back.

use log::{debug, trace};
use tokio_util::sync::CancellationToken;

use arm_encoder_protocol::{
    catalog::ValidationErrorKind, value::ApplySettingsMode, HostCommand, RegisterId, StandardId,
    UnlockCommand, ValidationError, WriteRequest,
};

use crate::{transaction::RequestTransaction, Connection, RequestError};

/// Tracks whether this host has sent the unlock frame since the device last relocked.
///
/// The flag is bookkeeping only. It does not reflect the device's actual state and is
/// never used to refuse a write.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct UnlockGate {
    unlocked: bool,
}

impl UnlockGate {
    pub const fn new() -> Self {
        Self { unlocked: false }
    }

    /// Whether the unlock frame was sent and no relocking action was written since.
    pub const fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Sends the unlock frame.
    pub async fn unlock<C: Connection>(
        &mut self,
        connection: &mut C,
        target: StandardId,
    ) -> Result<(), RequestError<C::Error>> {
        debug!("Unlocking device {target}.");
        let frame = UnlockCommand.to_frame(target);
        trace!("sent frame: {:?}", frame);
        connection
            .send(frame)
            .await
            .map_err(RequestError::Transport)?;
        self.unlocked = true;

        Ok(())
    }

    /// Sends `request`, preceded by the unlock frame when `unlock` is set.
    ///
    /// Passing `unlock = false` relies on an earlier unlock still being in effect.
    pub async fn write<C: Connection>(
        &mut self,
        connection: &mut C,
        target: StandardId,
        request: WriteRequest,
        unlock: bool,
        cancel: &CancellationToken,
    ) -> Result<(), RequestError<C::Error>> {
        if unlock {
            self.unlock(connection, target).await?;
        }

        RequestTransaction::write(target, request)
            .run(connection, cancel)
            .await?;

        if let Some(mode) = request.apply_settings_mode().filter(|mode| mode.relocks()) {
            debug!("Device {target} relocks after apply-settings {mode}.");
            self.unlocked = false;
        }

        Ok(())
    }

    /// Writes the apply-settings register.
    ///
    /// After [`ApplySettingsMode::Restart`] or [`ApplySettingsMode::FactoryReset`] the
    /// device is locked again and further writes need a fresh unlock.
    pub async fn apply_settings<C: Connection>(
        &mut self,
        connection: &mut C,
        target: StandardId,
        mode: ApplySettingsMode,
        unlock: bool,
        cancel: &CancellationToken,
    ) -> Result<(), RequestError<C::Error>> {
        debug!("Applying settings on device {target}: {mode}.");
        self.write(
            connection,
            target,
            WriteRequest::apply_settings(mode),
            unlock,
            cancel,
        )
        .await
    }
}

/// Parses an apply-settings mode name such as `"restart"`.
pub fn parse_apply_settings(mode: &str) -> Result<ApplySettingsMode, ValidationError> {
    mode.parse().map_err(|e| {
        ValidationError::new(
            RegisterId::ApplySettings,
            ValidationErrorKind::UnknownSetting(e),
        )
    })
}

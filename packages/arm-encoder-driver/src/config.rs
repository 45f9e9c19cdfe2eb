//! Link parameters of a session.

use arm_encoder_protocol::{frame::FrameError, value::BaudRate, StandardId, DEFAULT_DEVICE_ADDRESS};

use crate::transaction::TransactionConfig;

/// Where the adapter is and how to talk to the encoder behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkConfig {
    /// Serial port of the SLCAN adapter, e.g. `/dev/ttyACM0` or `COM5`.
    pub port: String,
    /// Bus bit rate. Must match the rate the encoder is configured for.
    pub bitrate: BaudRate,
    /// Bus identifier of the encoder.
    pub device_address: u16,
    pub transaction: TransactionConfig,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            bitrate: BaudRate::default(),
            device_address: DEFAULT_DEVICE_ADDRESS,
            transaction: TransactionConfig::default(),
        }
    }

    pub fn with_bitrate(mut self, bitrate: BaudRate) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_device_address(mut self, device_address: u16) -> Self {
        self.device_address = device_address;
        self
    }

    pub fn with_transaction(mut self, transaction: TransactionConfig) -> Self {
        self.transaction = transaction;
        self
    }

    /// The device address as a bus identifier.
    pub fn device_id(&self) -> Result<StandardId, FrameError> {
        StandardId::new(self.device_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_match_the_factory_settings() {
        let config = LinkConfig::new("/dev/ttyACM0");
        assert_eq!(config.bitrate, BaudRate::Kbps250);
        assert_eq!(config.device_id(), Ok(StandardId::default()));
        assert_eq!(config.transaction.timeout, Duration::from_secs(1));
        assert_eq!(config.transaction.retries, 0);
    }

    #[test]
    fn addresses_must_be_standard_ids() {
        let config = LinkConfig::new("COM5").with_device_address(0x800);
        assert_eq!(
            config.device_id(),
            Err(FrameError::InvalidId { raw: 0x800 })
        );
    }
}

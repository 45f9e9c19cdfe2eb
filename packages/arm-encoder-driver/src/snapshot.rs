//! A full register sweep.

use std::{collections::BTreeMap, fmt};

use log::{debug, warn};

use arm_encoder_protocol::{
    units,
    value::{BaudRate, ContentMode, EncoderMode, ReturnRate, SpinDirection},
    DecodeError, RegisterId, RegisterValue, ValidationError,
};

use crate::{client::EncoderClient, Connection, RequestError};

/// Order in which [`DeviceSnapshot::capture`] reads the registers.
pub const CAPTURE_ORDER: [RegisterId; 15] = [
    RegisterId::DeviceAddr,
    RegisterId::BaudRate,
    RegisterId::ReturnRate,
    RegisterId::EncoderMode,
    RegisterId::ContentMode,
    RegisterId::SpinDir,
    RegisterId::AngularVelSamplePeriod,
    RegisterId::AngVal,
    RegisterId::AngularVel,
    RegisterId::Revolutions,
    RegisterId::Temperature,
    RegisterId::ReadRegister,
    RegisterId::ApplySettings,
    RegisterId::VersionNumL,
    RegisterId::VersionNumH,
];

/// Why a register is missing from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The device did not answer within any attempt.
    NoResponse,
    /// The device answered with something that is not a value of the register.
    Decode(DecodeError),
    Validation(ValidationError),
    /// The link failed. Holds the transport's error message.
    Transport(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoResponse => f.write_str("no response"),
            FailureReason::Decode(e) => e.fmt(f),
            FailureReason::Validation(e) => e.fmt(f),
            FailureReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl<E: std::error::Error + 'static> From<RequestError<E>> for FailureReason {
    fn from(error: RequestError<E>) -> Self {
        match error {
            RequestError::Transport(e) => FailureReason::Transport(e.to_string()),
            RequestError::Validation(e) => FailureReason::Validation(e),
            RequestError::Decode(e) => FailureReason::Decode(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFailure {
    pub register: RegisterId,
    pub reason: FailureReason,
}

impl ReadFailure {
    /// Whether the device answered with a code that has no meaning for the register.
    pub fn is_unrecognized_byte(&self) -> bool {
        matches!(&self.reason, FailureReason::Decode(e) if e.is_unrecognized_byte())
    }
}

/// Every register value of one device at one point in time.
///
/// A snapshot is never updated; capture a new one instead. Values that could not be read
/// are absent and the reason is kept in [`failures`](Self::failures). Derived values are
/// only present when all of their inputs are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    values: BTreeMap<RegisterId, RegisterValue>,
    failures: Vec<ReadFailure>,
}

impl DeviceSnapshot {
    /// Reads every register in [`CAPTURE_ORDER`].
    ///
    /// A register that fails is recorded and the sweep carries on with the next one.
    pub async fn capture<C: Connection>(client: &mut EncoderClient<C>) -> Self {
        let mut snapshot = Self::default();

        for register in CAPTURE_ORDER {
            match client.read(register).await {
                Ok(Some(value)) => {
                    debug!("{register} = {value}");
                    snapshot.values.insert(register, value);
                }
                Ok(None) => {
                    warn!("{register} did not respond.");
                    snapshot.failures.push(ReadFailure {
                        register,
                        reason: FailureReason::NoResponse,
                    });
                }
                Err(e) => {
                    warn!("Failed to read {register}: {e}");
                    snapshot.failures.push(ReadFailure {
                        register,
                        reason: e.into(),
                    });
                }
            }
        }

        snapshot
    }

    pub fn get(&self, register: RegisterId) -> Option<RegisterValue> {
        self.values.get(&register).copied()
    }

    /// Every register in capture order, with its value if it was read.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, Option<RegisterValue>)> + '_ {
        CAPTURE_ORDER
            .into_iter()
            .map(|register| (register, self.get(register)))
    }

    pub fn failures(&self) -> &[ReadFailure] {
        &self.failures
    }

    /// Whether every register was read.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn typed<T: TryFrom<RegisterValue>>(&self, register: RegisterId) -> Option<T> {
        self.get(register).and_then(|value| T::try_from(value).ok())
    }

    fn integer<T: TryFrom<i32>>(&self, register: RegisterId) -> Option<T> {
        self.get(register)
            .and_then(|value| value.as_integer())
            .and_then(|value| T::try_from(value).ok())
    }

    fn opaque(&self, register: RegisterId) -> Option<[u8; 4]> {
        self.get(register).and_then(|value| value.as_opaque())
    }

    pub fn device_address(&self) -> Option<u16> {
        self.integer(RegisterId::DeviceAddr)
    }

    pub fn baud_rate(&self) -> Option<BaudRate> {
        self.typed(RegisterId::BaudRate)
    }

    pub fn return_rate(&self) -> Option<ReturnRate> {
        self.typed(RegisterId::ReturnRate)
    }

    pub fn encoder_mode(&self) -> Option<EncoderMode> {
        self.typed(RegisterId::EncoderMode)
    }

    pub fn content_mode(&self) -> Option<ContentMode> {
        self.typed(RegisterId::ContentMode)
    }

    pub fn spin_direction(&self) -> Option<SpinDirection> {
        self.typed(RegisterId::SpinDir)
    }

    pub fn sample_period(&self) -> Option<u16> {
        self.integer(RegisterId::AngularVelSamplePeriod)
    }

    pub fn angle(&self) -> Option<u16> {
        self.integer(RegisterId::AngVal)
    }

    pub fn angular_velocity(&self) -> Option<i16> {
        self.integer(RegisterId::AngularVel)
    }

    pub fn revolutions(&self) -> Option<i16> {
        self.integer(RegisterId::Revolutions)
    }

    pub fn temperature(&self) -> Option<i16> {
        self.integer(RegisterId::Temperature)
    }

    pub fn read_register_command(&self) -> Option<[u8; 4]> {
        self.opaque(RegisterId::ReadRegister)
    }

    pub fn apply_settings_echo(&self) -> Option<[u8; 4]> {
        self.opaque(RegisterId::ApplySettings)
    }

    pub fn version_low(&self) -> Option<[u8; 4]> {
        self.opaque(RegisterId::VersionNumL)
    }

    pub fn version_high(&self) -> Option<[u8; 4]> {
        self.opaque(RegisterId::VersionNumH)
    }

    pub fn angle_degrees(&self) -> Option<f64> {
        self.angle().map(units::angle_degrees)
    }

    /// Needs both the angular velocity and the sample period.
    pub fn angular_velocity_dps(&self) -> Option<f64> {
        units::angular_velocity_dps(self.angular_velocity()?, self.sample_period()?)
    }

    pub fn temperature_celsius(&self) -> Option<f64> {
        self.temperature().map(units::temperature_celsius)
    }
}

impl fmt::Display for DeviceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (register, value) in self.iter() {
            match value {
                Some(value) => writeln!(f, "{:<28}{value}", register.name())?,
                None => {
                    let reason = self
                        .failures
                        .iter()
                        .find(|failure| failure.register == register)
                        .map(|failure| failure.reason.to_string())
                        .unwrap_or_default();
                    writeln!(f, "{:<28}<{reason}>", register.name())?;
                }
            }
        }

        if let Some(degrees) = self.angle_degrees() {
            writeln!(f, "{:<28}{degrees:.3} °", "angle")?;
        }
        if let Some(dps) = self.angular_velocity_dps() {
            writeln!(f, "{:<28}{dps:.2} °/s", "angular velocity")?;
        }
        if let Some(celsius) = self.temperature_celsius() {
            writeln!(f, "{:<28}{celsius:.2} °C", "temperature")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SimulatedEncoder;

    #[tokio::test(start_paused = true)]
    async fn full_sweep_reads_in_order() {
        let mut client = EncoderClient::new(SimulatedEncoder::new());
        let snapshot = client.capture_all().await;

        assert!(snapshot.is_complete(), "{:?}", snapshot.failures());
        let reads: Vec<u8> = client
            .connection()
            .sent()
            .iter()
            .map(|frame| frame.data()[3])
            .collect();
        let expected: Vec<u8> = CAPTURE_ORDER.iter().map(|r| r.address()).collect();
        assert_eq!(reads, expected);

        assert_eq!(snapshot.device_address(), Some(0x50));
        assert_eq!(snapshot.baud_rate(), Some(BaudRate::Kbps250));
        assert_eq!(snapshot.spin_direction(), Some(SpinDirection::Clockwise));
        assert_eq!(snapshot.angle_degrees(), Some(90.0));
        assert_eq!(snapshot.angular_velocity_dps(), Some(-900.0));
        assert_eq!(snapshot.temperature_celsius(), Some(25.34));
        assert_eq!(snapshot.version_low(), Some([0x12, 0x34, 0x56, 0x78]));
        assert_eq!(snapshot.iter().count(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_register_only_removes_its_own_values() {
        let mut device = SimulatedEncoder::new();
        device.silence(RegisterId::Temperature);
        let mut client = EncoderClient::new(device);

        let snapshot = client.capture_all().await;

        assert_eq!(snapshot.temperature(), None);
        assert_eq!(snapshot.temperature_celsius(), None);
        assert_eq!(
            snapshot.failures(),
            &[ReadFailure {
                register: RegisterId::Temperature,
                reason: FailureReason::NoResponse,
            }]
        );

        assert_eq!(snapshot.angle(), Some(8192));
        assert_eq!(snapshot.revolutions(), Some(-2));
        assert!(snapshot.angular_velocity_dps().is_some());
        // Registers after the silent one were still read.
        assert!(snapshot.version_high().is_some());
        assert_eq!(client.connection().sent().len(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_sample_period_removes_the_velocity() {
        let mut device = SimulatedEncoder::new();
        device.silence(RegisterId::AngularVelSamplePeriod);
        let mut client = EncoderClient::new(device);

        let snapshot = client.capture_all().await;
        assert_eq!(snapshot.angular_velocity(), Some(-8192));
        assert_eq!(snapshot.angular_velocity_dps(), None);
        assert!(snapshot.to_string().contains("<no response>"));
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognized_codes_are_kept_apart_from_timeouts() {
        let mut device = SimulatedEncoder::new();
        device.set_raw(RegisterId::SpinDir, [0x05, 0x00]);
        let mut client = EncoderClient::new(device);

        let snapshot = client.capture_all().await;
        assert_eq!(snapshot.spin_direction(), None);
        assert_eq!(snapshot.failures().len(), 1);
        assert!(snapshot.failures()[0].is_unrecognized_byte());
        assert_eq!(snapshot.encoder_mode(), Some(EncoderMode::MultiTurn));
    }
}

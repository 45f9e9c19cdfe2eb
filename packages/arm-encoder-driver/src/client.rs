//! A session with one encoder.

use log::debug;
use tokio_util::sync::CancellationToken;

use arm_encoder_protocol::{
    catalog::ValidationErrorKind,
    units,
    value::{ApplySettingsMode, BaudRate, ContentMode, EncoderMode, ReturnRate, SpinDirection},
    RegisterId, RegisterValue, StandardId, ValidationError, WriteRequest,
};

use crate::{
    monitor::PublishMonitor,
    snapshot::DeviceSnapshot,
    transaction::{RequestTransaction, TransactionConfig},
    unlock::{parse_apply_settings, UnlockGate},
    Connection, RequestError,
};

/// Owns the connection to the bus for the length of a session and talks to one encoder
/// on it.
///
/// Replies carry no register or sender information, so only one request may be
/// outstanding at a time. Every operation borrows the client mutably for as long as its
/// request is in flight.
///
/// Reads resolve to `Ok(None)` when the device does not answer. Writes are never
/// acknowledged; read the register back to confirm one.
#[derive(Debug)]
pub struct EncoderClient<C: Connection> {
    connection: C,
    target: StandardId,
    config: TransactionConfig,
    gate: UnlockGate,
    cancel: CancellationToken,
}

impl<C: Connection> EncoderClient<C> {
    /// Talks to the encoder at the factory default address.
    pub fn new(connection: C) -> Self {
        Self::with_config(connection, StandardId::default(), TransactionConfig::default())
    }

    pub fn with_config(connection: C, target: StandardId, config: TransactionConfig) -> Self {
        Self {
            connection,
            target,
            config,
            gate: UnlockGate::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Bus identifier that requests are sent to.
    pub fn target(&self) -> StandardId {
        self.target
    }

    /// Retargets the session, e.g. after the device restarted with a new address.
    ///
    /// The unlock state is per device, so the gate starts out locked again.
    pub fn set_target(&mut self, target: StandardId) {
        debug!("Retargeting session from {} to {}.", self.target, target);
        self.target = target;
        self.gate = UnlockGate::new();
    }

    pub fn config(&self) -> TransactionConfig {
        self.config
    }

    pub fn set_config(&mut self, config: TransactionConfig) {
        self.config = config;
    }

    /// A handle that, once cancelled, resolves the pending and all further reads as
    /// unanswered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_cancellation_token(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    /// Whether this session sent the unlock frame since the device last relocked.
    pub fn is_unlocked(&self) -> bool {
        self.gate.is_unlocked()
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn into_inner(self) -> C {
        self.connection
    }

    /// Reads one register.
    pub async fn read(
        &mut self,
        register: RegisterId,
    ) -> Result<Option<RegisterValue>, RequestError<C::Error>> {
        let mut transaction = RequestTransaction::read(self.target, register, self.config);
        let resolution = transaction.run(&mut self.connection, &self.cancel).await?;
        Ok(resolution.into_value())
    }

    /// Writes one register, sending the unlock frame first when `unlock` is set.
    ///
    /// # Errors
    ///
    /// Values outside the register's domain, writes of read-only registers and values of
    /// the wrong kind fail with [`RequestError::Validation`] before anything is sent.
    pub async fn write(
        &mut self,
        register: RegisterId,
        value: impl Into<RegisterValue>,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        let request = WriteRequest::new(register, &value.into())?;
        self.gate
            .write(&mut self.connection, self.target, request, unlock, &self.cancel)
            .await
    }

    pub async fn unlock(&mut self) -> Result<(), RequestError<C::Error>> {
        self.gate.unlock(&mut self.connection, self.target).await
    }

    /// Saves, factory resets or restarts the device.
    ///
    /// Restarting discards unsaved writes and relocks the device.
    pub async fn apply_settings(
        &mut self,
        mode: ApplySettingsMode,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.gate
            .apply_settings(&mut self.connection, self.target, mode, unlock, &self.cancel)
            .await
    }

    /// Like [`apply_settings`](Self::apply_settings), taking the mode by name.
    pub async fn apply_settings_str(
        &mut self,
        mode: &str,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        let mode = parse_apply_settings(mode)?;
        self.apply_settings(mode, unlock).await
    }

    /// Reads every register. Registers that fail are recorded, not fatal.
    pub async fn capture_all(&mut self) -> DeviceSnapshot {
        DeviceSnapshot::capture(self).await
    }

    /// Listens for the reports the device publishes on its own.
    pub fn monitor(&mut self) -> PublishMonitor<'_, C> {
        PublishMonitor::new(&mut self.connection, self.cancel.clone())
    }

    async fn read_as<T: TryFrom<RegisterValue>>(
        &mut self,
        register: RegisterId,
    ) -> Result<Option<T>, RequestError<C::Error>> {
        Ok(self
            .read(register)
            .await?
            .and_then(|value| T::try_from(value).ok()))
    }

    async fn read_integer<T: TryFrom<i32>>(
        &mut self,
        register: RegisterId,
    ) -> Result<Option<T>, RequestError<C::Error>> {
        Ok(self
            .read(register)
            .await?
            .and_then(|value| value.as_integer())
            .and_then(|value| T::try_from(value).ok()))
    }

    async fn read_opaque(
        &mut self,
        register: RegisterId,
    ) -> Result<Option<[u8; 4]>, RequestError<C::Error>> {
        Ok(self
            .read(register)
            .await?
            .and_then(|value| value.as_opaque()))
    }

    pub async fn content_mode(&mut self) -> Result<Option<ContentMode>, RequestError<C::Error>> {
        self.read_as(RegisterId::ContentMode).await
    }

    pub async fn set_content_mode(
        &mut self,
        mode: ContentMode,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::ContentMode, mode, unlock).await
    }

    pub async fn return_rate(&mut self) -> Result<Option<ReturnRate>, RequestError<C::Error>> {
        self.read_as(RegisterId::ReturnRate).await
    }

    pub async fn set_return_rate(
        &mut self,
        rate: ReturnRate,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::ReturnRate, rate, unlock).await
    }

    pub async fn baud_rate(&mut self) -> Result<Option<BaudRate>, RequestError<C::Error>> {
        self.read_as(RegisterId::BaudRate).await
    }

    /// Changes the device's bus bit rate. Takes effect once saved and restarted.
    pub async fn set_baud_rate(
        &mut self,
        rate: BaudRate,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::BaudRate, rate, unlock).await
    }

    pub async fn encoder_mode(&mut self) -> Result<Option<EncoderMode>, RequestError<C::Error>> {
        self.read_as(RegisterId::EncoderMode).await
    }

    pub async fn set_encoder_mode(
        &mut self,
        mode: EncoderMode,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::EncoderMode, mode, unlock).await
    }

    pub async fn spin_direction(
        &mut self,
    ) -> Result<Option<SpinDirection>, RequestError<C::Error>> {
        self.read_as(RegisterId::SpinDir).await
    }

    pub async fn set_spin_direction(
        &mut self,
        direction: SpinDirection,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::SpinDir, direction, unlock).await
    }

    /// Raw angle register, 32768 counts per turn.
    pub async fn angle(&mut self) -> Result<Option<u16>, RequestError<C::Error>> {
        self.read_integer(RegisterId::AngVal).await
    }

    pub async fn set_angle(
        &mut self,
        raw: u16,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::AngVal, raw, unlock).await
    }

    pub async fn angle_degrees(&mut self) -> Result<Option<f64>, RequestError<C::Error>> {
        Ok(self.angle().await?.map(units::angle_degrees))
    }

    /// Sets the angle register to the count nearest to `degrees`.
    pub async fn set_angle_degrees(
        &mut self,
        degrees: f64,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        let raw = units::degrees_to_angle_register(degrees).ok_or_else(|| {
            ValidationError::new(
                RegisterId::AngVal,
                ValidationErrorKind::OutOfRange {
                    value: degrees as i32,
                    min: 0,
                    max: units::angle_degrees(u16::MAX) as i32,
                },
            )
        })?;
        self.set_angle(raw, unlock).await
    }

    pub async fn revolutions(&mut self) -> Result<Option<i16>, RequestError<C::Error>> {
        self.read_integer(RegisterId::Revolutions).await
    }

    pub async fn set_revolutions(
        &mut self,
        revolutions: i16,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::Revolutions, revolutions, unlock).await
    }

    /// Raw angular velocity register. See [`angular_velocity_dps`](Self::angular_velocity_dps).
    pub async fn angular_velocity(&mut self) -> Result<Option<i16>, RequestError<C::Error>> {
        self.read_integer(RegisterId::AngularVel).await
    }

    /// Angular velocity in degrees per second.
    ///
    /// Needs both the velocity and the sample period register; `None` if either is missing.
    pub async fn angular_velocity_dps(&mut self) -> Result<Option<f64>, RequestError<C::Error>> {
        let Some(velocity) = self.angular_velocity().await? else {
            return Ok(None);
        };
        let Some(period) = self.sample_period().await? else {
            return Ok(None);
        };

        Ok(units::angular_velocity_dps(velocity, period))
    }

    /// Raw temperature register, in hundredths of a degree Celsius.
    pub async fn temperature(&mut self) -> Result<Option<i16>, RequestError<C::Error>> {
        self.read_integer(RegisterId::Temperature).await
    }

    pub async fn temperature_celsius(&mut self) -> Result<Option<f64>, RequestError<C::Error>> {
        Ok(self.temperature().await?.map(units::temperature_celsius))
    }

    /// Angular velocity sample period, in 100 µs counts.
    pub async fn sample_period(&mut self) -> Result<Option<u16>, RequestError<C::Error>> {
        self.read_integer(RegisterId::AngularVelSamplePeriod).await
    }

    pub async fn set_sample_period(
        &mut self,
        period: u16,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::AngularVelSamplePeriod, period, unlock).await
    }

    /// The device address register.
    ///
    /// This is what the device will answer to after it restarts, not necessarily the
    /// current [`target`](Self::target).
    pub async fn device_address(&mut self) -> Result<Option<u16>, RequestError<C::Error>> {
        self.read_integer(RegisterId::DeviceAddr).await
    }

    /// Writes the device address register. The session keeps its target; call
    /// [`set_target`](Self::set_target) once the device uses the new address.
    pub async fn set_device_address(
        &mut self,
        address: u16,
        unlock: bool,
    ) -> Result<(), RequestError<C::Error>> {
        self.write(RegisterId::DeviceAddr, address, unlock).await
    }

    pub async fn read_register_command(
        &mut self,
    ) -> Result<Option<[u8; 4]>, RequestError<C::Error>> {
        self.read_opaque(RegisterId::ReadRegister).await
    }

    pub async fn apply_settings_echo(
        &mut self,
    ) -> Result<Option<[u8; 4]>, RequestError<C::Error>> {
        self.read_opaque(RegisterId::ApplySettings).await
    }

    /// The low and high version words, if both answered.
    pub async fn version(
        &mut self,
    ) -> Result<Option<([u8; 4], [u8; 4])>, RequestError<C::Error>> {
        let low = self.read_opaque(RegisterId::VersionNumL).await?;
        let high = self.read_opaque(RegisterId::VersionNumH).await?;
        Ok(low.zip(high))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::SimulatedEncoder;

    fn client() -> EncoderClient<SimulatedEncoder> {
        EncoderClient::new(SimulatedEncoder::new())
    }

    #[tokio::test(start_paused = true)]
    async fn locked_device_ignores_writes() {
        let mut client = client();

        client
            .set_spin_direction(SpinDirection::Counterclockwise, false)
            .await
            .unwrap();
        assert_eq!(
            client.spin_direction().await.unwrap(),
            Some(SpinDirection::Clockwise)
        );
        assert_eq!(client.connection().raw(RegisterId::SpinDir), [0x00, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn unlocked_write_is_read_back() {
        let mut client = client();

        client.unlock().await.unwrap();
        client
            .set_spin_direction(SpinDirection::Counterclockwise, false)
            .await
            .unwrap();

        assert!(client.is_unlocked());
        assert_eq!(
            client.spin_direction().await.unwrap(),
            Some(SpinDirection::Counterclockwise)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_discards_unsaved_writes_and_relocks() {
        let mut client = client();

        client
            .set_spin_direction(SpinDirection::Counterclockwise, true)
            .await
            .unwrap();
        client.apply_settings_str("restart", false).await.unwrap();

        assert!(!client.is_unlocked());
        assert_eq!(
            client.spin_direction().await.unwrap(),
            Some(SpinDirection::Clockwise)
        );

        // Still locked after the restart.
        client
            .set_spin_direction(SpinDirection::Counterclockwise, false)
            .await
            .unwrap();
        assert_eq!(
            client.spin_direction().await.unwrap(),
            Some(SpinDirection::Clockwise)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn saved_writes_survive_a_restart() {
        let mut client = client();

        client
            .set_return_rate(ReturnRate::Hz100, true)
            .await
            .unwrap();
        client
            .apply_settings(ApplySettingsMode::Save, false)
            .await
            .unwrap();
        client
            .apply_settings(ApplySettingsMode::Restart, false)
            .await
            .unwrap();

        assert_eq!(client.return_rate().await.unwrap(), Some(ReturnRate::Hz100));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_values_send_nothing() {
        let mut client = client();

        let err = client.set_device_address(2048, true).await.unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError {
                register: RegisterId::DeviceAddr,
                kind: ValidationErrorKind::OutOfRange { value: 2048, .. },
            })
        ));

        let err = client
            .write(RegisterId::Temperature, RegisterValue::Integer(100), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Validation(ValidationError {
                kind: ValidationErrorKind::ReadOnly,
                ..
            })
        ));

        assert!(client.set_sample_period(0, true).await.is_err());
        assert!(client.set_angle_degrees(-10.0, true).await.is_err());
        assert!(client.apply_settings_str("reboot", true).await.is_err());

        assert!(client.connection().sent().is_empty());
        assert!(!client.is_unlocked());
    }

    #[tokio::test(start_paused = true)]
    async fn engineering_units() {
        let mut client = client();

        assert_eq!(client.angle().await.unwrap(), Some(8192));
        assert_eq!(client.angle_degrees().await.unwrap(), Some(90.0));
        assert_eq!(client.revolutions().await.unwrap(), Some(-2));
        assert_eq!(client.angular_velocity_dps().await.unwrap(), Some(-900.0));
        assert_eq!(client.temperature_celsius().await.unwrap(), Some(25.34));
        assert_eq!(client.encoder_mode().await.unwrap(), Some(EncoderMode::MultiTurn));
        assert_eq!(client.content_mode().await.unwrap(), Some(ContentMode::ANGLES));
        assert_eq!(client.baud_rate().await.unwrap(), Some(BaudRate::Kbps250));
        assert_eq!(
            client.version().await.unwrap(),
            Some(([0x12, 0x34, 0x56, 0x78], [0x01, 0x00, 0x00, 0x00]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn angle_can_be_set_in_degrees() {
        let mut client = client();

        client.set_angle_degrees(180.0, true).await.unwrap();
        assert_eq!(client.angle().await.unwrap(), Some(16384));
    }

    #[tokio::test(start_paused = true)]
    async fn new_address_needs_an_explicit_retarget() {
        let mut client = client();

        client.set_device_address(0x51, true).await.unwrap();
        client
            .apply_settings(ApplySettingsMode::Save, false)
            .await
            .unwrap();
        client
            .apply_settings(ApplySettingsMode::Restart, false)
            .await
            .unwrap();

        // The device now answers on 0x51 only.
        assert_eq!(client.target().as_raw(), 0x50);
        assert_eq!(client.device_address().await.unwrap(), None);

        client.set_target(StandardId::new(0x51).unwrap());
        assert_eq!(client.device_address().await.unwrap(), Some(0x51));
        assert_eq!(client.connection().address().as_raw(), 0x51);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_session_reads_nothing() {
        let mut client = client();
        client.set_config(TransactionConfig {
            timeout: Duration::from_secs(10),
            retries: 3,
        });
        client.connection_mut().silence(RegisterId::Temperature);

        let cancel = client.cancellation_token();
        cancel.cancel();

        let start = tokio::time::Instant::now();
        assert_eq!(client.temperature().await.unwrap(), None);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

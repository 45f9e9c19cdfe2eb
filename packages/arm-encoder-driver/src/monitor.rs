//! Listening to the reports the encoder publishes on its own.

use std::time::Duration;

use log::{debug, trace};
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;

use arm_encoder_protocol::{
    publish::{AngleReport, PublishedReport},
    Decode,
};

use crate::{deadline_after, BusMode, CheckHeader, Connection, RequestError};

/// Waits for published reports on a borrowed connection.
///
/// Angle reports are only published when the content mode includes angles, and at the
/// configured return rate.
#[derive(Debug)]
pub struct PublishMonitor<'a, C: Connection> {
    connection: &'a mut C,
    cancel: CancellationToken,
    last_angle: Option<u16>,
}

impl<'a, C: Connection> PublishMonitor<'a, C> {
    pub fn new(connection: &'a mut C, cancel: CancellationToken) -> Self {
        Self {
            connection,
            cancel,
            last_angle: None,
        }
    }

    /// Stops the adapter from acknowledging frames, so the monitor only observes the bus.
    ///
    /// Adapters without a listen-only mode ignore this.
    pub async fn listen_only(&mut self) -> Result<(), C::Error> {
        debug!("Switching adapter to listen-only mode.");
        self.connection.set_bus_mode(BusMode::ListenOnly).await
    }

    /// Puts the adapter back into normal mode.
    pub async fn resume(&mut self) -> Result<(), C::Error> {
        self.connection.set_bus_mode(BusMode::Normal).await
    }

    /// Waits up to `timeout` for the next report, skipping every other frame.
    ///
    /// Returns `None` on timeout or cancellation.
    pub async fn next_report(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<PublishedReport>, RequestError<C::Error>> {
        let deadline = deadline_after(timeout);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let received = select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                received = self.connection.recv(remaining) => {
                    received.map_err(RequestError::Transport)?
                }
            };

            let Some(frame) = received else {
                continue;
            };
            trace!("received frame: {:?}", frame);

            if !PublishedReport::has_valid_header(frame.data()) {
                continue;
            }

            return Ok(Some(PublishedReport::decode(&mut frame.data())?));
        }
    }

    /// Waits up to `timeout` for the next angle report.
    pub async fn next_angle(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<AngleReport>, RequestError<C::Error>> {
        let deadline = deadline_after(timeout);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_report(remaining).await? {
                Some(PublishedReport::Angle(report)) => {
                    self.last_angle = Some(report.angle);
                    return Ok(Some(report));
                }
                Some(PublishedReport::Temperature(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Change of the raw angle register since the previous angle report.
    ///
    /// The first angle report seen by this monitor only sets the baseline; the wait then
    /// continues for a second one within the same `timeout`. Wrapping past zero counts
    /// as the short way round.
    pub async fn next_angle_delta(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<i16>, RequestError<C::Error>> {
        let deadline = deadline_after(timeout);

        loop {
            let previous = self.last_angle;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(report) = self.next_angle(remaining).await? else {
                return Ok(None);
            };

            if let Some(previous) = previous {
                return Ok(Some(report.angle.wrapping_sub(previous) as i16));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mock::SimulatedEncoder, EncoderClient};
    use arm_encoder_protocol::publish::TemperatureReport;

    #[tokio::test(start_paused = true)]
    async fn reports_are_picked_out_of_the_traffic() {
        let mut device = SimulatedEncoder::new();
        device.push_noise(&[0x55, 0x5F, 0x01, 0x00, 0, 0, 0, 0]);
        device.push_noise(&[0x55, 0x56, 0xE2, 0x09, 0, 0, 0, 0]);
        device.push_noise(&[0x55, 0x55, 0x3C, 0x00, 0x00, 0x00, 0xF2, 0xFF]);

        let mut client = EncoderClient::new(device);
        let mut monitor = client.monitor();

        assert_eq!(
            monitor.next_report(Duration::from_secs(1)).await.unwrap(),
            Some(PublishedReport::Temperature(TemperatureReport {
                temperature: 2530
            }))
        );
        let angle = monitor
            .next_angle(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(angle.revolutions, -14);

        let start = Instant::now();
        assert_eq!(monitor.next_report(Duration::from_secs(1)).await.unwrap(), None);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn deltas_wrap_around() {
        let mut device = SimulatedEncoder::new();
        device.push_noise(&[0x55, 0x55, 0xF0, 0xFF, 0, 0, 0, 0]);
        device.push_noise(&[0x55, 0x56, 0xE2, 0x09, 0, 0, 0, 0]);
        device.push_noise(&[0x55, 0x55, 0x10, 0x00, 0, 0, 0, 0]);
        device.push_noise(&[0x55, 0x55, 0x08, 0x00, 0, 0, 0, 0]);

        let mut client = EncoderClient::new(device);
        let mut monitor = client.monitor();

        let timeout = Duration::from_secs(1);
        assert_eq!(monitor.next_angle_delta(timeout).await.unwrap(), Some(0x20));
        assert_eq!(monitor.next_angle_delta(timeout).await.unwrap(), Some(-8));
        assert_eq!(monitor.next_angle_delta(timeout).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn listen_only_reaches_the_adapter() {
        let mut client = EncoderClient::new(SimulatedEncoder::new());

        client.monitor().listen_only().await.unwrap();
        assert_eq!(client.connection().bus_mode, BusMode::ListenOnly);

        client.monitor().resume().await.unwrap();
        assert_eq!(client.connection().bus_mode, BusMode::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_the_wait() {
        let mut client = EncoderClient::new(SimulatedEncoder::new());
        let cancel = client.cancellation_token();
        let mut monitor = client.monitor();

        let (report, _) = tokio::join!(monitor.next_report(Duration::from_secs(60)), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });
        assert_eq!(report.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_waits_take_the_next_report() {
        let mut device = SimulatedEncoder::new();
        device.push_noise(&[0x55, 0x55, 0x00, 0x20, 0, 0, 0, 0]);

        let mut client = EncoderClient::new(device);
        let mut monitor = client.monitor();

        let angle = monitor.next_angle(Duration::MAX).await.unwrap().unwrap();
        assert_eq!(angle.angle, 0x2000);
        assert_eq!(monitor.next_angle_delta(Duration::MAX).await.unwrap(), None);
    }
}

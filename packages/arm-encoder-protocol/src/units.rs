//! Conversions from raw register words to engineering units.

/// Angle register counts per full turn.
pub const COUNTS_PER_TURN: f64 = 32768.0;

/// Length of one sample-period register count, in seconds (100 µs).
pub const SAMPLE_PERIOD_UNIT_SECONDS: f64 = 100e-6;

/// Sample period register value the encoder ships with (100 ms).
pub const DEFAULT_SAMPLE_PERIOD: u16 = 1000;

/// `degrees = raw * 360 / 32768`
pub fn angle_degrees(raw: u16) -> f64 {
    f64::from(raw) * 360.0 / COUNTS_PER_TURN
}

/// Inverse of [`angle_degrees`], rounded to the nearest register count.
///
/// Returns `None` when the angle cannot be represented by the 16-bit register.
pub fn degrees_to_angle_register(degrees: f64) -> Option<u16> {
    let counts = degrees * COUNTS_PER_TURN / 360.0;
    if !(0.0..=f64::from(u16::MAX)).contains(&counts) {
        return None;
    }

    Some((counts + 0.5) as u16)
}

/// Sample period in seconds. A period register of zero is not a valid device state.
pub fn sample_period_seconds(raw: u16) -> Option<f64> {
    (raw != 0).then(|| f64::from(raw) * SAMPLE_PERIOD_UNIT_SECONDS)
}

/// `deg/s = raw * 360 / 32768 / sample_period_seconds`
pub fn angular_velocity_dps(raw: i16, sample_period: u16) -> Option<f64> {
    let period = sample_period_seconds(sample_period)?;
    Some(f64::from(raw) * 360.0 / COUNTS_PER_TURN / period)
}

/// `°C = raw / 100`
pub fn temperature_celsius(raw: i16) -> f64 {
    f64::from(raw) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_conversion_is_exact_and_invertible() {
        for raw in 0..=u16::MAX {
            let degrees = angle_degrees(raw);
            assert_eq!(degrees, f64::from(raw) * 360.0 / 32768.0);
            assert_eq!(degrees_to_angle_register(degrees), Some(raw));
        }

        assert_eq!(angle_degrees(8192), 90.0);
        // 30 degrees is not representable, the nearest count is used.
        assert_eq!(degrees_to_angle_register(30.0), Some(2731));
        assert_eq!(degrees_to_angle_register(-1.0), None);
        assert_eq!(degrees_to_angle_register(720.0), None);
    }

    #[test]
    fn angular_velocity_uses_the_sample_period() {
        // 100 ms default period: one count is 0.1098... deg/s
        assert_eq!(angular_velocity_dps(-8192, 1000), Some(-900.0));
        assert_eq!(angular_velocity_dps(8192, 10000), Some(90.0));
        assert_eq!(angular_velocity_dps(1, 0), None);
    }

    #[test]
    fn temperature() {
        assert_eq!(temperature_celsius(2534), 25.34);
        assert_eq!(temperature_celsius(-150), -1.5);
    }
}

//! Reports the encoder publishes on its own, according to its content mode and return rate.

use crate::{
    decode::{Decode, DecodeError, DecodeErrorKind},
    units,
    value::ContentMode,
};

/// `55 55 <angle> <velocity> <revolutions>`, all little-endian words.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AngleReport {
    pub angle: u16,
    pub angular_velocity: i16,
    pub revolutions: i16,
}

impl AngleReport {
    pub const HEADER: [u8; 2] = [0x55, 0x55];

    pub fn angle_degrees(&self) -> f64 {
        units::angle_degrees(self.angle)
    }

    /// Angular velocity for the given sample period register value.
    pub fn angular_velocity_dps(&self, sample_period: u16) -> Option<f64> {
        units::angular_velocity_dps(self.angular_velocity, sample_period)
    }
}

impl Decode for AngleReport {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        if <[u8; 2]>::decode(data)? != Self::HEADER {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::InvalidHeader));
        }

        Ok(Self {
            angle: u16::decode(data)?,
            angular_velocity: i16::decode(data)?,
            revolutions: i16::decode(data)?,
        })
    }
}

/// `55 56 <temperature> ..`
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemperatureReport {
    pub temperature: i16,
}

impl TemperatureReport {
    pub const HEADER: [u8; 2] = [0x55, 0x56];

    pub fn celsius(&self) -> f64 {
        units::temperature_celsius(self.temperature)
    }
}

impl Decode for TemperatureReport {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        if <[u8; 2]>::decode(data)? != Self::HEADER {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::InvalidHeader));
        }

        Ok(Self {
            temperature: i16::decode(data)?,
        })
    }
}

/// Any report the encoder publishes without being asked.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PublishedReport {
    Angle(AngleReport),
    Temperature(TemperatureReport),
}

impl PublishedReport {
    /// Published frames always carry eight bytes.
    pub const LEN: usize = 8;

    /// Whether `data` has the shape of a published report.
    pub fn matches(data: &[u8]) -> bool {
        data.len() == Self::LEN
            && (data[..2] == AngleReport::HEADER || data[..2] == TemperatureReport::HEADER)
    }

    /// The content-mode bit that enables this kind of report.
    pub fn content(&self) -> ContentMode {
        match self {
            PublishedReport::Angle(_) => ContentMode::ANGLES,
            PublishedReport::Temperature(_) => ContentMode::TEMPERATURE,
        }
    }
}

impl Decode for PublishedReport {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::LEN {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedEnd));
        }

        match data[..2] {
            [0x55, 0x55] => Ok(PublishedReport::Angle(AngleReport::decode(data)?)),
            [0x55, 0x56] => {
                let report = TemperatureReport::decode(data)?;
                // Trailing bytes are padding.
                *data = &data[4..];
                Ok(PublishedReport::Temperature(report))
            }
            _ => Err(DecodeError::new::<Self>(DecodeErrorKind::InvalidHeader)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_report() {
        let data = [0x55, 0x55, 0x3C, 0x00, 0x00, 0x00, 0xF2, 0xFF];
        assert!(PublishedReport::matches(&data));

        let report = PublishedReport::decode(&mut data.as_slice()).unwrap();
        let PublishedReport::Angle(angle) = report else {
            panic!("expected an angle report, got {report:?}");
        };
        assert_eq!(angle.angle, 0x3C);
        assert_eq!(angle.angular_velocity, 0);
        assert_eq!(angle.revolutions, -14);
        assert_eq!(angle.angle_degrees(), 60.0 * 360.0 / 32768.0);
        assert_eq!(report.content(), ContentMode::ANGLES);
    }

    #[test]
    fn temperature_report() {
        let mut data: &[u8] = &[0x55, 0x56, 0xE2, 0x09, 0, 0, 0, 0];
        let report = PublishedReport::decode(&mut data).unwrap();
        assert_eq!(
            report,
            PublishedReport::Temperature(TemperatureReport { temperature: 2530 })
        );
        assert!(data.is_empty());
    }

    #[test]
    fn replies_are_not_reports() {
        let reply = [0x55, 0x5F, 0x01, 0x00, 0, 0, 0, 0];
        assert!(!PublishedReport::matches(&reply));
        assert!(PublishedReport::decode(&mut reply.as_slice()).is_err());
        assert!(!PublishedReport::matches(&[0x55, 0x55, 0x00]));
    }
}

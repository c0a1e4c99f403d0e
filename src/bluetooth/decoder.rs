/// Decoding of SensorTag humidity notifications
use time::OffsetDateTime;

use crate::error::DecodeError;
use crate::models::{DecodedReading, RawReading};

// Humidity sensor notification layout
const PAYLOAD_LEN: usize = 4;
const HUMIDITY_STATUS_MASK: u16 = 0xFFFC; // two low bits carry status, not data
const CODE_SPAN: f64 = 65536.0;

impl RawReading {
    /// Split a notification payload into its two little-endian codes.
    ///
    /// The payload must be exactly four bytes; anything else is rejected
    /// rather than truncated or padded.
    pub fn parse(payload: &[u8]) -> Result<RawReading, DecodeError> {
        let bytes: [u8; PAYLOAD_LEN] =
            payload
                .try_into()
                .map_err(|_| DecodeError::MalformedPayload {
                    expected: PAYLOAD_LEN,
                    actual: payload.len(),
                })?;

        Ok(RawReading {
            temperature_code: u16::from_le_bytes([bytes[0], bytes[1]]),
            humidity_code: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn temperature_celsius(&self) -> f64 {
        -46.85 + 175.72 * (self.temperature_code as f64 / CODE_SPAN)
    }

    pub fn relative_humidity_percent(&self) -> f64 {
        let masked = self.humidity_code & HUMIDITY_STATUS_MASK;
        -6.0 + 125.0 * (masked as f64 / CODE_SPAN)
    }
}

/// Decode a raw notification payload into engineering units
///
/// # Arguments
/// * `payload` - Notification bytes: temperature code then humidity code, both u16 LE
/// * `observed_at` - Arrival time of the notification
pub fn decode(payload: &[u8], observed_at: OffsetDateTime) -> Result<DecodedReading, DecodeError> {
    let raw = RawReading::parse(payload)?;

    Ok(DecodedReading {
        temperature_celsius: raw.temperature_celsius(),
        relative_humidity_percent: raw.relative_humidity_percent(),
        observed_at,
    })
}

use time::OffsetDateTime;

/// One notification payload as it came off the link, stamped on arrival.
#[derive(Debug, Clone)]
pub struct Notification {
    pub payload: Vec<u8>,
    pub received_at: OffsetDateTime,
}

/// The two little-endian codes carried by a humidity notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReading {
    pub temperature_code: u16,
    pub humidity_code: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedReading {
    pub temperature_celsius: f64,
    pub relative_humidity_percent: f64,
    pub observed_at: OffsetDateTime,
}

/// Row handed to the store for a forwarded reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub time: OffsetDateTime,
    pub temp: String,
    pub rh: String,
}

impl From<&DecodedReading> for PersistedRecord {
    fn from(reading: &DecodedReading) -> Self {
        PersistedRecord {
            time: reading.observed_at,
            temp: format!("{:.1}", reading.temperature_celsius),
            rh: format!("{:.0}", reading.relative_humidity_percent),
        }
    }
}

/// Fields read once from the peripheral right after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralIdentity {
    pub system_id: Vec<u8>,
    pub model_number: String,
    pub device_name: Option<String>,
    pub manufacturer_name: String,
    pub firmware_revision: String,
    pub hardware_revision: String,
    pub software_revision: String,
    pub battery_level: u8,
}

impl PeripheralIdentity {
    /// System id as colon separated hex, most significant byte first.
    ///
    /// The characteristic is transmitted least significant byte first, so the
    /// wire order is reversed for display.
    pub fn system_id_hex(&self) -> String {
        self.system_id
            .iter()
            .rev()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Labelled display lines, in read order. An absent device name is skipped.
    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("System ID: {}", self.system_id_hex()),
            format!("Model Number: {}", self.model_number),
        ];
        if let Some(name) = &self.device_name {
            lines.push(format!("Device Name: {}", name));
        }
        lines.push(format!("Manufacturer Name: {}", self.manufacturer_name));
        lines.push(format!("Firmware Revision: {}", self.firmware_revision));
        lines.push(format!("Hardware Revision: {}", self.hardware_revision));
        lines.push(format!("Software Revision: {}", self.software_revision));
        lines.push(format!("Battery Level: {}%", self.battery_level));
        lines
    }
}

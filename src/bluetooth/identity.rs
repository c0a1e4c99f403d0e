/// One-shot identification reads performed right after connecting
use bluer::Uuid;
use log::debug;
use std::fmt;

use crate::bluetooth::transport::Peripheral;
use crate::bluetooth::uuids;
use crate::error::SessionError;
use crate::models::PeripheralIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityField {
    SystemId,
    ModelNumber,
    DeviceName,
    ManufacturerName,
    FirmwareRevision,
    HardwareRevision,
    SoftwareRevision,
    BatteryLevel,
}

/// Read order. Only the device name may be missing.
pub const IDENTITY_SEQUENCE: [IdentityField; 8] = [
    IdentityField::SystemId,
    IdentityField::ModelNumber,
    IdentityField::DeviceName,
    IdentityField::ManufacturerName,
    IdentityField::FirmwareRevision,
    IdentityField::HardwareRevision,
    IdentityField::SoftwareRevision,
    IdentityField::BatteryLevel,
];

impl IdentityField {
    pub fn uuid(self) -> Uuid {
        match self {
            IdentityField::SystemId => uuids::SYSTEM_ID,
            IdentityField::ModelNumber => uuids::MODEL_NUMBER,
            IdentityField::DeviceName => uuids::DEVICE_NAME,
            IdentityField::ManufacturerName => uuids::MANUFACTURER_NAME,
            IdentityField::FirmwareRevision => uuids::FIRMWARE_REVISION,
            IdentityField::HardwareRevision => uuids::HARDWARE_REVISION,
            IdentityField::SoftwareRevision => uuids::SOFTWARE_REVISION,
            IdentityField::BatteryLevel => uuids::BATTERY_LEVEL,
        }
    }

    pub fn is_optional(self) -> bool {
        self == IdentityField::DeviceName
    }

    fn label(self) -> &'static str {
        match self {
            IdentityField::SystemId => "System ID",
            IdentityField::ModelNumber => "Model Number",
            IdentityField::DeviceName => "Device Name",
            IdentityField::ManufacturerName => "Manufacturer Name",
            IdentityField::FirmwareRevision => "Firmware Revision",
            IdentityField::HardwareRevision => "Hardware Revision",
            IdentityField::SoftwareRevision => "Software Revision",
            IdentityField::BatteryLevel => "Battery Level",
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read every identification characteristic in `IDENTITY_SEQUENCE` order.
///
/// Stops at the first failed mandatory read. A failed device name read is
/// logged and leaves `device_name` empty.
pub async fn read_identity<P: Peripheral>(
    peripheral: &P,
) -> Result<PeripheralIdentity, SessionError> {
    let mut identity = PeripheralIdentity {
        system_id: Vec::new(),
        model_number: String::new(),
        device_name: None,
        manufacturer_name: String::new(),
        firmware_revision: String::new(),
        hardware_revision: String::new(),
        software_revision: String::new(),
        battery_level: 0,
    };

    for field in IDENTITY_SEQUENCE {
        let value = match peripheral.read(field.uuid()).await {
            Ok(value) => value,
            Err(e) if field.is_optional() => {
                debug!("Skipping optional {} read: {}", field, e);
                continue;
            }
            Err(e) => {
                return Err(SessionError::IdentityReadFailed {
                    field,
                    uuid: field.uuid(),
                    reason: e.to_string(),
                })
            }
        };

        match field {
            IdentityField::SystemId => identity.system_id = value,
            IdentityField::ModelNumber => identity.model_number = text(&value),
            IdentityField::DeviceName => identity.device_name = Some(text(&value)),
            IdentityField::ManufacturerName => identity.manufacturer_name = text(&value),
            IdentityField::FirmwareRevision => identity.firmware_revision = text(&value),
            IdentityField::HardwareRevision => identity.hardware_revision = text(&value),
            IdentityField::SoftwareRevision => identity.software_revision = text(&value),
            IdentityField::BatteryLevel => {
                identity.battery_level =
                    *value
                        .first()
                        .ok_or_else(|| SessionError::IdentityReadFailed {
                            field,
                            uuid: field.uuid(),
                            reason: "empty value".into(),
                        })?
            }
        }
    }

    Ok(identity)
}

// GATT strings are often NUL padded
fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePeripheral;

    #[tokio::test]
    async fn reads_all_fields_in_order() {
        let peripheral = FakePeripheral::sensortag();

        let identity = read_identity(&peripheral).await.unwrap();

        assert_eq!(identity.model_number, "CC2650 SensorTag");
        assert_eq!(identity.device_name.as_deref(), Some("CC2650 SensorTag"));
        assert_eq!(identity.manufacturer_name, "Texas Instruments");
        assert_eq!(identity.battery_level, 87);
        assert_eq!(identity.system_id_hex(), "b0:91:22:ff:fe:f7:e6:84");

        let expected: Vec<String> = IDENTITY_SEQUENCE
            .iter()
            .map(|field| format!("read {}", field.uuid()))
            .collect();
        assert_eq!(peripheral.calls(), expected);
    }

    #[tokio::test]
    async fn missing_device_name_is_tolerated() {
        let peripheral = FakePeripheral::sensortag().without(uuids::DEVICE_NAME);

        let identity = read_identity(&peripheral).await.unwrap();

        assert_eq!(identity.device_name, None);
        assert_eq!(identity.firmware_revision, "1.30 (May 23 2016)");
    }

    #[tokio::test]
    async fn mandatory_read_failure_stops_the_sequence() {
        let peripheral = FakePeripheral::sensortag().without(uuids::MANUFACTURER_NAME);

        let err = read_identity(&peripheral).await.unwrap_err();

        match err {
            SessionError::IdentityReadFailed { field, uuid, .. } => {
                assert_eq!(field, IdentityField::ManufacturerName);
                assert_eq!(uuid, uuids::MANUFACTURER_NAME);
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing after the manufacturer name was attempted
        assert_eq!(peripheral.calls().len(), 4);
    }

    #[tokio::test]
    async fn empty_battery_level_is_a_read_failure() {
        let peripheral = FakePeripheral::sensortag().with_value(uuids::BATTERY_LEVEL, vec![]);

        let err = read_identity(&peripheral).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::IdentityReadFailed {
                field: IdentityField::BatteryLevel,
                ..
            }
        ));
    }

    #[test]
    fn trailing_nul_padding_is_trimmed() {
        assert_eq!(text(b"N.A.\0\0"), "N.A.");
    }
}

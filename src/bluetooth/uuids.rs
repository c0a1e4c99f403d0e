/// GATT characteristic identifiers used by the SensorTag session
use bluer::Uuid;

// Bluetooth SIG 16-bit characteristics expanded onto the base UUID
pub const SYSTEM_ID: Uuid = sig_uuid(0x2A23);
pub const MODEL_NUMBER: Uuid = sig_uuid(0x2A24);
pub const DEVICE_NAME: Uuid = sig_uuid(0x2A00);
pub const MANUFACTURER_NAME: Uuid = sig_uuid(0x2A29);
pub const FIRMWARE_REVISION: Uuid = sig_uuid(0x2A26);
pub const HARDWARE_REVISION: Uuid = sig_uuid(0x2A27);
pub const SOFTWARE_REVISION: Uuid = sig_uuid(0x2A28);
pub const BATTERY_LEVEL: Uuid = sig_uuid(0x2A19);

// TI SensorTag humidity service (HDC1000)
pub const HUMIDITY_DATA: Uuid = Uuid::from_u128(0xf000aa21_0451_4000_b000_000000000000);
pub const HUMIDITY_CONFIG: Uuid = Uuid::from_u128(0xf000aa22_0451_4000_b000_000000000000);

/// Value written to the config characteristic to start measurements
pub const HUMIDITY_ENABLE: [u8; 1] = [0x01];

const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_1000_8000_0080_5f9b_34fb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_expand_onto_the_sig_base() {
        assert_eq!(
            BATTERY_LEVEL.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            SYSTEM_ID.to_string(),
            "00002a23-0000-1000-8000-00805f9b34fb"
        );
    }
}

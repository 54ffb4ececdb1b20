//! Key encoding utilities for `RocksDB`.

use retouch_core::{DeviceId, GenerationId};

/// Create a balance key from a device ID.
#[must_use]
pub fn balance_key(device_id: &DeviceId) -> Vec<u8> {
    device_id.as_bytes().to_vec()
}

/// Create a generation key from a generation ID.
#[must_use]
pub fn generation_key(generation_id: &GenerationId) -> Vec<u8> {
    generation_id.to_bytes().to_vec()
}

/// Create a processed-event key from a billing event ID.
#[must_use]
pub fn event_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_key_is_raw_device_bytes() {
        let device_id = DeviceId::parse("device-1").unwrap();
        assert_eq!(balance_key(&device_id), b"device-1".to_vec());
    }

    #[test]
    fn generation_key_length() {
        let key = generation_key(&GenerationId::generate());
        assert_eq!(key.len(), 16);
    }
}

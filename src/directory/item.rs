//! Directory records and their fixed binary encoding
//!
//! Each record is four big-endian `u32` fields in this order:
//!
//! ```text
//! [0..4]   key           (0 = empty slot)
//! [4..8]   segment size  (bytes backing the value segment)
//! [8..12]  data size     (bytes of live data)
//! [12..16] timestamp     (seconds since the Unix epoch)
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    config::RECORD_SIZE,
    error::{Result, SegdirError},
};

/// One directory slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentListItem {
    /// Key of the value segment, 0 when the slot is empty
    pub key: u32,
    /// Bytes currently backing the value segment
    pub segment_size: u32,
    /// Bytes of `segment_size` that hold live data
    pub data_size: u32,
    /// Last time the slot was touched
    pub timestamp: u32,
}

impl SegmentListItem {
    /// Create a record for an occupied slot
    pub fn new(key: u32, segment_size: u32, data_size: u32, timestamp: u32) -> Self {
        Self {
            key,
            segment_size,
            data_size,
            timestamp,
        }
    }

    /// Whether this slot is free
    pub fn is_empty(&self) -> bool {
        self.key == 0
    }

    /// Check the record invariants
    pub fn validate(&self) -> Result<()> {
        if self.data_size > self.segment_size {
            return Err(SegdirError::format(format!(
                "data size {} exceeds segment size {} for key {}",
                self.data_size, self.segment_size, self.key
            )));
        }

        if self.is_empty() && *self != Self::default() {
            return Err(SegdirError::format(format!(
                "empty slot carries non-zero fields: {:?}",
                self
            )));
        }

        Ok(())
    }

    /// Refresh the timestamp to the current time
    pub fn touch(&mut self) {
        self.timestamp = unix_timestamp();
    }
}

/// Encoder/decoder for the 16-byte record format
pub struct SegmentListItemCodec;

impl SegmentListItemCodec {
    /// Encoded size of one record
    pub const SIZE: usize = RECORD_SIZE;

    /// A fully zeroed record
    pub fn new_empty() -> SegmentListItem {
        SegmentListItem::default()
    }

    /// Encode a record into its wire form
    pub fn encode(item: &SegmentListItem) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&item.key.to_be_bytes());
        out[4..8].copy_from_slice(&item.segment_size.to_be_bytes());
        out[8..12].copy_from_slice(&item.data_size.to_be_bytes());
        out[12..16].copy_from_slice(&item.timestamp.to_be_bytes());
        out
    }

    /// Decode a record, rejecting wrong lengths and broken invariants
    pub fn decode(bytes: &[u8]) -> Result<SegmentListItem> {
        if bytes.len() != RECORD_SIZE {
            return Err(SegdirError::format(format!(
                "record must be {} bytes, got {}",
                RECORD_SIZE,
                bytes.len()
            )));
        }

        let field = |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let item = SegmentListItem::new(field(0), field(4), field(8), field(12));
        item.validate()?;
        Ok(item)
    }
}

/// Current time in whole seconds since the Unix epoch, truncated to 32 bits
pub(crate) fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout_is_big_endian() {
        let item = SegmentListItem::new(0x0102_0304, 10, 5, 0xAABB_CCDD);
        let bytes = SegmentListItemCodec::encode(&item);
        assert_eq!(
            bytes,
            [1, 2, 3, 4, 0, 0, 0, 10, 0, 0, 0, 5, 0xAA, 0xBB, 0xCC, 0xDD]
        );
    }

    #[test]
    fn test_round_trip() {
        let items = [
            SegmentListItemCodec::new_empty(),
            SegmentListItem::new(1, 1, 0, 0),
            SegmentListItem::new(u32::MAX, u32::MAX, u32::MAX, u32::MAX),
            SegmentListItem::new(1001, 4096, 17, 1_700_000_000),
        ];
        for item in items {
            let decoded = SegmentListItemCodec::decode(&SegmentListItemCodec::encode(&item)).unwrap();
            assert_eq!(decoded, item);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(matches!(
            SegmentListItemCodec::decode(&[0u8; 15]),
            Err(SegdirError::Format { .. })
        ));
        assert!(matches!(
            SegmentListItemCodec::decode(&[0u8; 17]),
            Err(SegdirError::Format { .. })
        ));
    }

    #[test]
    fn test_decode_detects_corrupt_records() {
        // empty key with a non-zero timestamp
        let mut bytes = [0u8; 16];
        bytes[15] = 1;
        assert!(SegmentListItemCodec::decode(&bytes).is_err());

        // used size larger than allocated size
        let bad = SegmentListItem::new(5, 2, 3, 0);
        assert!(SegmentListItemCodec::decode(&SegmentListItemCodec::encode(&bad)).is_err());
    }

    #[test]
    fn test_new_empty() {
        let item = SegmentListItemCodec::new_empty();
        assert!(item.is_empty());
        assert_eq!(SegmentListItemCodec::encode(&item), [0u8; 16]);
    }

    #[test]
    fn test_touch_updates_timestamp() {
        let mut item = SegmentListItem::new(3, 8, 0, 0);
        item.touch();
        assert!(item.timestamp > 0);
    }
}

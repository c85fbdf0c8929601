//! Record identifiers and key extraction.

use marten_common::page::INVALID_PAGE_NO;
use marten_common::{MartenError, Result};

/// Identifies a record stored in a heap relation.
///
/// Record ids are opaque to the index: they are stored, returned from
/// scans, and compared only for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    /// Page containing the record.
    pub page_no: u32,
    /// Slot number within the page.
    pub slot: u16,
}

impl RecordId {
    /// On-disk size of a record id.
    pub const SIZE: usize = 8;

    /// Sentinel record id marking empty index slots.
    pub const INVALID: RecordId = RecordId {
        page_no: INVALID_PAGE_NO,
        slot: 0,
    };

    /// Creates a new record id.
    pub fn new(page_no: u32, slot: u16) -> Self {
        Self { page_no, slot }
    }

    /// Returns true unless this is the sentinel record id.
    pub fn is_valid(&self) -> bool {
        self.page_no != INVALID_PAGE_NO
    }

    /// Serializes the record id.
    ///
    /// Layout (8 bytes): page_no: 4, slot: 2, reserved: 2.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_no.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot.to_le_bytes());
        buf
    }

    /// Deserializes a record id.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_no: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            slot: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_no, self.slot)
    }
}

/// Extracts a little-endian i32 key from record bytes at a byte offset.
pub fn extract_key(record: &[u8], attr_byte_offset: usize) -> Result<i32> {
    let end = attr_byte_offset
        .checked_add(4)
        .ok_or_else(|| MartenError::Internal("attribute offset overflow".to_string()))?;
    if record.len() < end {
        return Err(MartenError::TreeCorrupted(format!(
            "record of {} bytes too short for key at offset {}",
            record.len(),
            attr_byte_offset
        )));
    }
    let bytes = [
        record[attr_byte_offset],
        record[attr_byte_offset + 1],
        record[attr_byte_offset + 2],
        record[attr_byte_offset + 3],
    ];
    Ok(i32::from_le_bytes(bytes))
}

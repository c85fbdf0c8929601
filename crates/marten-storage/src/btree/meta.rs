//! Index meta record, persisted on the meta page.

use crate::btree::constants::RELATION_NAME_LEN;
use marten_common::types::AttrType;
use marten_common::{MartenError, Result};

/// Construction parameters and current root of an index.
///
/// Layout (40 bytes at offset 0 of the meta page):
/// - relation_name: 20 bytes (zero padded, truncated if longer)
/// - attr_byte_offset: 4 bytes
/// - attr_type: 1 byte
/// - reserved: 3 bytes
/// - root_page_no: 4 bytes
/// - height: 4 bytes
/// - leaf_slots: 2 bytes
/// - branch_slots: 2 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Name of the indexed relation, truncated to 20 bytes.
    pub relation_name: String,
    /// Byte offset of the indexed attribute within a record.
    pub attr_byte_offset: u32,
    /// Datatype of the indexed attribute.
    pub attr_type: AttrType,
    /// Current root page number.
    pub root_page_no: u32,
    /// Tree height; 1 means the root is a leaf.
    pub height: u32,
    /// Physical key/rid slots per leaf page.
    pub leaf_slots: u16,
    /// Physical separator slots per internal page.
    pub branch_slots: u16,
}

impl IndexMeta {
    /// Size of the meta record in bytes.
    pub const SIZE: usize = 40;

    /// Truncates a relation name to the persisted length.
    pub fn truncate_name(name: &str) -> String {
        let bytes = name.as_bytes();
        let len = bytes.len().min(RELATION_NAME_LEN);
        String::from_utf8_lossy(&bytes[..len]).into_owned()
    }

    /// Serializes the meta record.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let name = self.relation_name.as_bytes();
        let name_len = name.len().min(RELATION_NAME_LEN);
        buf[..name_len].copy_from_slice(&name[..name_len]);
        buf[20..24].copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        buf[24] = self.attr_type as u8;
        // bytes 25..28 reserved
        buf[28..32].copy_from_slice(&self.root_page_no.to_le_bytes());
        buf[32..36].copy_from_slice(&self.height.to_le_bytes());
        buf[36..38].copy_from_slice(&self.leaf_slots.to_le_bytes());
        buf[38..40].copy_from_slice(&self.branch_slots.to_le_bytes());
        buf
    }

    /// Deserializes the meta record from the start of a page image.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let name_end = buf[..RELATION_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RELATION_NAME_LEN);
        let relation_name = String::from_utf8_lossy(&buf[..name_end]).into_owned();

        let attr_type = AttrType::from_tag(buf[24]).ok_or_else(|| {
            MartenError::BadIndexInfo(format!("unknown attribute type tag {}", buf[24]))
        })?;

        Ok(Self {
            relation_name,
            attr_byte_offset: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
            attr_type,
            root_page_no: u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]),
            height: u32::from_le_bytes([buf[32], buf[33], buf[34], buf[35]]),
            leaf_slots: u16::from_le_bytes([buf[36], buf[37]]),
            branch_slots: u16::from_le_bytes([buf[38], buf[39]]),
        })
    }

    /// Writes the meta record into a page image.
    pub fn write_to(&self, page: &mut [u8]) {
        page[..Self::SIZE].copy_from_slice(&self.to_bytes());
    }

    /// Verifies this meta record matches the requested index parameters.
    pub fn check_matches(
        &self,
        relation_name: &str,
        attr_byte_offset: u32,
        attr_type: AttrType,
    ) -> Result<()> {
        if self.relation_name != Self::truncate_name(relation_name) {
            return Err(MartenError::BadIndexInfo(format!(
                "relation name mismatch: index built over '{}', requested '{}'",
                self.relation_name, relation_name
            )));
        }
        if self.attr_byte_offset != attr_byte_offset {
            return Err(MartenError::BadIndexInfo(format!(
                "attribute offset mismatch: index built at {}, requested {}",
                self.attr_byte_offset, attr_byte_offset
            )));
        }
        if self.attr_type != attr_type {
            return Err(MartenError::BadIndexInfo(format!(
                "attribute type mismatch: index built over {}, requested {}",
                self.attr_type, attr_type
            )));
        }
        Ok(())
    }
}

//! Attribute type tags for indexed columns.

use serde::{Deserialize, Serialize};

/// Identifier for the datatype of an indexed attribute.
///
/// The tag is persisted in the index meta page so that reopening an index
/// can verify it was built over the expected column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttrType {
    /// Signed 32-bit integer.
    Int32 = 0,
    /// 64-bit floating point.
    Float64 = 1,
    /// Variable-length character string.
    Varchar = 2,
}

impl AttrType {
    /// Returns the fixed byte size for this type, or None for
    /// variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            AttrType::Int32 => Some(4),
            AttrType::Float64 => Some(8),
            AttrType::Varchar => None,
        }
    }

    /// Returns true if this is the integer attribute type.
    pub fn is_integer(&self) -> bool {
        matches!(self, AttrType::Int32)
    }

    /// Decodes a persisted type tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AttrType::Int32),
            1 => Some(AttrType::Float64),
            2 => Some(AttrType::Varchar),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttrType::Int32 => "INT32",
            AttrType::Float64 => "FLOAT64",
            AttrType::Varchar => "VARCHAR",
        };
        write!(f, "{}", name)
    }
}

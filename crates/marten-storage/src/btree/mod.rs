//! Disk-resident B+ tree index over 32-bit integer keys.
//!
//! The index maps an i32 attribute, extracted from a fixed byte offset of
//! each record in a heap relation, to the record id of the row holding
//! it. One file per index, three page kinds:
//!
//! - a meta page holding construction parameters, the root page number,
//!   and the tree height (height 1 means the root is a leaf);
//! - internal nodes: sorted separator keys, one more child page number
//!   than keys, and a level counter (level 1 routes into leaves);
//! - leaf nodes: sorted (key, record id) slots plus a forward sibling
//!   pointer, forming a singly linked list across the leaf level.
//!
//! Unused tail slots are marked by sentinels (`i32::MAX` keys, page
//! number 0) rather than an occupancy count. Keys are unique; insertion
//! splits leaves and internal nodes bottom-up, growing the tree at the
//! root. Range scans descend once, then walk the sibling chain holding a
//! single pinned leaf at a time.

pub mod constants;
pub mod index;
pub mod meta;
pub mod node;
pub mod scan;

pub use index::{BTreeIndex, IndexConfig};
pub use meta::IndexMeta;
pub use scan::ScanOp;

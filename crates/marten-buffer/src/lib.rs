//! Buffer pool management for MartenDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count
//! - Clock eviction policy restricted to unpinned frames
//! - Pin counting so callers can hold page images in place
//! - Dirty page tracking with caller-driven write-back
//!
//! The pool performs no I/O of its own: loading hands in a page image,
//! and eviction or flushing hands dirty images back to the caller.

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage};
pub use replacer::ClockReplacer;

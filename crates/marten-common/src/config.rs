//! Configuration structures for MartenDB.

use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data files.
    pub data_dir: PathBuf,
    /// Page size in bytes.
    pub page_size: usize,
    /// Buffer pool size in number of frames.
    pub buffer_pool_frames: usize,
    /// Enable fsync for durability.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            page_size: PAGE_SIZE,
            buffer_pool_frames: 1024, // 16 MB with 16 KB pages
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.buffer_pool_frames * self.page_size
    }
}

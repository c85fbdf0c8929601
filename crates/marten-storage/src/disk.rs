//! Disk manager for page-level I/O over named files.

use marten_common::page::{PageId, INVALID_PAGE_NO, PAGE_SIZE};
use marten_common::{MartenError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Base directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

impl From<&marten_common::StorageConfig> for DiskManagerConfig {
    fn from(config: &marten_common::StorageConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
        }
    }
}

/// Manages reading and writing pages of named data files.
///
/// Files are opened by name; each open file is assigned a dense `u32` id
/// used in [`PageId`]. Page 0 of every file is reserved at creation and
/// never handed out by allocation, so `INVALID_PAGE_NO` (0) is a safe
/// sentinel in on-disk structures.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// Open file state.
    inner: Mutex<DiskInner>,
}

struct DiskInner {
    /// Open file handles keyed by file id.
    files: HashMap<u32, FileHandle>,
    /// File ids by file name.
    by_name: HashMap<String, u32>,
    /// Next file id to assign.
    next_file_id: u32,
}

/// Handle for an open data file.
struct FileHandle {
    /// The file handle.
    file: File,
    /// File name within the data directory.
    name: String,
    /// Number of pages in the file, including the reserved page 0.
    num_pages: u32,
}

impl DiskManager {
    /// Creates a new disk manager rooted at the configured directory.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            inner: Mutex::new(DiskInner {
                files: HashMap::new(),
                by_name: HashMap::new(),
                next_file_id: 0,
            }),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Returns true if a file with the given name exists.
    pub fn exists(&self, name: &str) -> bool {
        if self.inner.lock().by_name.contains_key(name) {
            return true;
        }
        self.config.data_dir.join(name).exists()
    }

    /// Opens an existing file, creating it first if missing.
    ///
    /// A fresh file is extended by one zeroed page so that page 0 stays
    /// reserved. Returns the file id.
    pub fn create(&self, name: &str) -> Result<u32> {
        self.open_impl(name, true)
    }

    /// Opens an existing file by name.
    ///
    /// Returns `FileNotFound` if no such file exists.
    pub fn open(&self, name: &str) -> Result<u32> {
        if !self.exists(name) {
            return Err(MartenError::FileNotFound(name.to_string()));
        }
        self.open_impl(name, false)
    }

    fn open_impl(&self, name: &str, create: bool) -> Result<u32> {
        let mut inner = self.inner.lock();

        if let Some(&file_id) = inner.by_name.get(name) {
            return Ok(file_id);
        }

        let path = self.config.data_dir.join(name);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MartenError::FileNotFound(name.to_string())
                } else {
                    MartenError::Io(e)
                }
            })?;

        let file_size = file.metadata()?.len();
        let mut num_pages = (file_size / PAGE_SIZE as u64) as u32;

        // Reserve page 0 in a fresh file
        if num_pages == 0 {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&[0u8; PAGE_SIZE])?;
            if self.config.fsync_enabled {
                file.sync_all()?;
            }
            num_pages = 1;
        }

        let file_id = inner.next_file_id;
        inner.next_file_id += 1;
        inner.by_name.insert(name.to_string(), file_id);
        inner.files.insert(
            file_id,
            FileHandle {
                file,
                name: name.to_string(),
                num_pages,
            },
        );

        Ok(file_id)
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(&page_id.file_id)
            .ok_or(MartenError::PageNotFound {
                file_id: page_id.file_id,
                page_no: page_id.page_no,
            })?;

        if page_id.page_no == INVALID_PAGE_NO || page_id.page_no >= handle.num_pages {
            return Err(MartenError::PageNotFound {
                file_id: page_id.file_id,
                page_no: page_id.page_no,
            });
        }

        let offset = (page_id.page_no as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        handle.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(&page_id.file_id)
            .ok_or(MartenError::PageNotFound {
                file_id: page_id.file_id,
                page_no: page_id.page_no,
            })?;

        if page_id.page_no == INVALID_PAGE_NO || page_id.page_no >= handle.num_pages {
            return Err(MartenError::PageNotFound {
                file_id: page_id.file_id,
                page_no: page_id.page_no,
            });
        }

        let offset = (page_id.page_no as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(data)?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        Ok(())
    }

    /// Allocates a new page at the end of the file.
    ///
    /// The page is zero-filled on disk. Never returns page 0.
    pub fn allocate_page(&self, file_id: u32) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let handle = inner.files.get_mut(&file_id).ok_or(MartenError::PageNotFound {
            file_id,
            page_no: INVALID_PAGE_NO,
        })?;

        let page_no = handle.num_pages;
        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        handle.num_pages = page_no + 1;

        Ok(PageId::new(file_id, page_no))
    }

    /// Returns the number of pages in a file, including reserved page 0.
    pub fn num_pages(&self, file_id: u32) -> Result<u32> {
        let inner = self.inner.lock();
        let handle = inner.files.get(&file_id).ok_or(MartenError::PageNotFound {
            file_id,
            page_no: INVALID_PAGE_NO,
        })?;
        Ok(handle.num_pages)
    }

    /// Syncs a file's pending writes to disk.
    pub fn flush_file(&self, file_id: u32) -> Result<()> {
        let inner = self.inner.lock();
        if let Some(handle) = inner.files.get(&file_id) {
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Closes a file, syncing it first.
    pub fn close_file(&self, file_id: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.files.remove(&file_id) {
            inner.by_name.remove(&handle.name);
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Deletes a file by name, closing it first if open.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if let Some(file_id) = inner.by_name.remove(name) {
                inner.files.remove(&file_id);
            }
        }
        let path = self.config.data_dir.join(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        for handle in inner.files.values() {
            let _ = handle.file.sync_all();
        }
    }
}

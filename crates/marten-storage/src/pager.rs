//! Pager: pin/unpin discipline over the disk manager and buffer pool.
//!
//! A [`Pager`] serves one file. It brings pages into the buffer pool on
//! demand, writes evicted dirty images back to disk, and hands out
//! [`PinnedPage`] handles that release their pin on drop, marking the
//! page dirty exactly when it was mutated through the handle.

use crate::disk::DiskManager;
use marten_buffer::{BufferFrame, BufferPool};
use marten_common::page::{PageId, PAGE_SIZE};
use marten_common::Result;
use std::cell::Cell;
use std::sync::Arc;

/// Page access for a single file under the pin/unpin discipline.
pub struct Pager {
    disk: Arc<DiskManager>,
    pool: Arc<BufferPool>,
    file_id: u32,
}

impl Pager {
    /// Creates a pager for an open file.
    pub fn new(disk: Arc<DiskManager>, pool: Arc<BufferPool>, file_id: u32) -> Self {
        Self {
            disk,
            pool,
            file_id,
        }
    }

    /// Returns the file id this pager serves.
    #[inline]
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    #[inline]
    fn page_id(&self, page_no: u32) -> PageId {
        PageId::new(self.file_id, page_no)
    }

    /// Ensures the page is resident and takes one pin on it.
    fn ensure_pinned(&self, page_no: u32) -> Result<&BufferFrame> {
        let page_id = self.page_id(page_no);

        if let Some(frame) = self.pool.fetch_page(page_id) {
            return Ok(frame);
        }

        let image = self.disk.read_page(page_id)?;
        let (frame, evicted) = self.pool.load_page(page_id, &image)?;
        if let Some(evicted) = evicted {
            self.disk.write_page(evicted.page_id, &evicted.data)?;
        }
        Ok(frame)
    }

    /// Pins a page and returns a handle that unpins on drop.
    pub fn pin(&self, page_no: u32) -> Result<PinnedPage<'_>> {
        let frame = self.ensure_pinned(page_no)?;
        Ok(PinnedPage {
            pager: self,
            page_no,
            frame,
            dirty: Cell::new(false),
        })
    }

    /// Allocates a fresh page and returns it pinned with a zeroed image.
    pub fn allocate(&self) -> Result<PinnedPage<'_>> {
        let page_id = self.disk.allocate_page(self.file_id)?;
        let (frame, evicted) = self.pool.new_page(page_id)?;
        if let Some(evicted) = evicted {
            self.disk.write_page(evicted.page_id, &evicted.data)?;
        }
        Ok(PinnedPage {
            pager: self,
            page_no: page_id.page_no,
            frame,
            dirty: Cell::new(false),
        })
    }

    /// Takes a detached pin on a page, kept across calls.
    ///
    /// Used by scans, which hold their current leaf pinned between
    /// `scan_next` calls. Must be matched by [`Pager::unpin_detached`].
    pub fn pin_detached(&self, page_no: u32) -> Result<()> {
        self.ensure_pinned(page_no)?;
        Ok(())
    }

    /// Releases a detached pin.
    pub fn unpin_detached(&self, page_no: u32, dirty: bool) {
        self.pool.unpin_page(self.page_id(page_no), dirty);
    }

    /// Writes this file's dirty pages through to disk and syncs.
    ///
    /// Returns the number of pages written.
    pub fn flush(&self) -> Result<usize> {
        let disk = &self.disk;
        let flushed = self
            .pool
            .flush_file(self.file_id, |page_id, data| disk.write_page(page_id, data))?;
        self.disk.flush_file(self.file_id)?;
        Ok(flushed)
    }
}

/// A pinned page handle.
///
/// The pin is released when the handle drops; the page is unpinned dirty
/// iff it was accessed through [`PinnedPage::data_mut`] (or explicitly
/// marked).
pub struct PinnedPage<'a> {
    pager: &'a Pager,
    page_no: u32,
    frame: &'a BufferFrame,
    dirty: Cell<bool>,
}

impl<'a> PinnedPage<'a> {
    /// Returns the page number within the file.
    #[inline]
    pub fn page_no(&self) -> u32 {
        self.page_no
    }

    /// Read access to the page image.
    #[inline]
    pub fn data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Write access to the page image; marks the page dirty.
    #[inline]
    pub fn data_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.dirty.set(true);
        self.frame.write_data()
    }
}

impl Drop for PinnedPage<'_> {
    fn drop(&mut self) {
        self.pager
            .pool
            .unpin_page(PageId::new(self.pager.file_id, self.page_no), self.dirty.get());
    }
}

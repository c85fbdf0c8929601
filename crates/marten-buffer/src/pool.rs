//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::ClockReplacer;
use marten_common::page::{PageId, PAGE_SIZE};
use marten_common::{MartenError, Result};
use parking_lot::Mutex;

/// A dirty page image that was evicted from the buffer pool.
/// The caller must write it to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedPage {
    pub page_id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

impl From<&marten_common::StorageConfig> for BufferPoolConfig {
    fn from(config: &marten_common::StorageConfig) -> Self {
        Self {
            num_frames: config.buffer_pool_frames,
        }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page to frame mapping (page table)
/// - Free frame list for newly resident pages
/// - Clock replacement for eviction of unpinned frames
/// - Pin counting so callers can hold page images in place
///
/// The pool performs no I/O: pages are loaded by handing in an image, and
/// dirty images surface back to the caller on eviction or flush.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page to frame mapping.
    page_table: PageTable,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Page replacement policy.
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is resident in the pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(page_id)
    }

    /// Fetches a resident page, pinning it.
    ///
    /// Returns None if the page is not in the pool; the caller then loads
    /// it from disk via [`BufferPool::load_page`].
    #[inline]
    pub fn fetch_page(&self, page_id: PageId) -> Option<&BufferFrame> {
        let frame_id = self.page_table.get(page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.pin();
        self.replacer.record_access(frame_id);
        Some(frame)
    }

    /// Allocates a frame for a new page, evicting if necessary.
    fn allocate_frame(&self) -> Result<(FrameId, Option<EvictedPage>)> {
        // Free list first
        {
            let mut free_list = self.free_list.lock();
            if let Some(frame_id) = free_list.pop() {
                return Ok((frame_id, None));
            }
        }

        // Evict: only frames with no pins are eligible
        let victim_id = self
            .replacer
            .evict(|fid| self.frames[fid.0 as usize].pin_count() == 0);

        if let Some(victim_id) = victim_id {
            let frame = &self.frames[victim_id.0 as usize];

            // Capture the evicted image if dirty
            let evicted = match (frame.is_dirty(), frame.page_id()) {
                (true, Some(page_id)) => {
                    let guard = frame.read_data();
                    let mut data = Box::new([0u8; PAGE_SIZE]);
                    data.copy_from_slice(&**guard);
                    drop(guard);
                    Some(EvictedPage { page_id, data })
                }
                _ => None,
            };

            if let Some(old_page_id) = frame.page_id() {
                self.page_table.remove(old_page_id);
            }

            return Ok((victim_id, evicted));
        }

        Err(MartenError::BufferPoolFull)
    }

    /// Makes a page resident with a zeroed image, pinning it.
    ///
    /// If the page is already resident, the existing frame is returned.
    /// Returns (frame, evicted) where `evicted` is a dirty image displaced
    /// to make room; the caller must write it to disk.
    pub fn new_page(&self, page_id: PageId) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.record_access(frame_id);
            return Ok((frame, None));
        }

        let (frame_id, evicted) = self.allocate_frame()?;

        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.pin();
        self.replacer.record_access(frame_id);

        self.page_table.insert(page_id, frame_id);

        Ok((frame, evicted))
    }

    /// Makes a page resident from a disk image, pinning it.
    ///
    /// Returns the frame and any evicted dirty image that must be written
    /// back by the caller.
    pub fn load_page(
        &self,
        page_id: PageId,
        data: &[u8],
    ) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        let (frame, evicted) = self.new_page(page_id)?;
        frame.copy_from(data);
        Ok((frame, evicted))
    }

    /// Unpins a page, marking it dirty if it was modified.
    ///
    /// A page whose pin count reaches zero becomes an eviction candidate.
    /// Returns false if the page is not resident.
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) -> bool {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if dirty {
                frame.set_dirty(true);
            }

            if frame.unpin() == 0 {
                self.replacer.add_candidate(frame_id);
            }
            return true;
        }
        false
    }

    /// Flushes one page through the provided sink if it is dirty.
    ///
    /// Returns true if the page was written.
    pub fn flush_page<F>(&self, page_id: PageId, mut sink: F) -> Result<bool>
    where
        F: FnMut(PageId, &[u8; PAGE_SIZE]) -> Result<()>,
    {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if frame.is_dirty() {
                let data = frame.read_data();
                sink(page_id, &**data)?;
                drop(data);
                frame.set_dirty(false);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Flushes all dirty pages of one file through the provided sink.
    ///
    /// Pages of other files are left untouched (and stay dirty).
    /// Returns the number of pages written.
    pub fn flush_file<F>(&self, file_id: u32, mut sink: F) -> Result<usize>
    where
        F: FnMut(PageId, &[u8; PAGE_SIZE]) -> Result<()>,
    {
        let mut dirty_pages = Vec::new();
        self.page_table.for_each(|page_id, frame_id| {
            if page_id.file_id == file_id {
                dirty_pages.push((page_id, frame_id));
            }
        });

        let mut flushed = 0;
        for (page_id, frame_id) in dirty_pages {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                sink(page_id, &**data)?;
                drop(data);
                frame.set_dirty(false);
                flushed += 1;
            }
        }

        Ok(flushed)
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;

        self.page_table.for_each(|_, frame_id| {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_frames += 1;
            }
            if frame.is_dirty() {
                dirty_frames += 1;
            }
        });

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames: self.page_table.len(),
            pinned_frames,
            dirty_frames,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames holding pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pool(num_frames: usize) -> BufferPool {
        BufferPool::new(BufferPoolConfig { num_frames })
    }

    #[test]
    fn test_buffer_pool_new() {
        let pool = create_test_pool(10);

        assert_eq!(pool.num_frames(), 10);
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.page_count(), 0);
    }

    #[test]
    fn test_config_from_storage_config() {
        let storage = marten_common::StorageConfig {
            buffer_pool_frames: 77,
            ..Default::default()
        };
        let config = BufferPoolConfig::from(&storage);
        assert_eq!(config.num_frames, 77);
    }

    #[test]
    fn test_buffer_pool_new_page() {
        let pool = create_test_pool(10);
        let page_id = PageId::new(0, 1);

        let (frame, evicted) = pool.new_page(page_id).unwrap();

        assert!(evicted.is_none());
        assert_eq!(frame.page_id(), Some(page_id));
        assert!(frame.is_pinned());
        assert_eq!(pool.free_count(), 9);
        assert!(pool.contains(page_id));
    }

    #[test]
    fn test_buffer_pool_fetch_existing() {
        let pool = create_test_pool(10);
        let page_id = PageId::new(0, 1);

        pool.new_page(page_id).unwrap();
        pool.unpin_page(page_id, false);

        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.page_id(), Some(page_id));
        assert!(frame.is_pinned());
    }

    #[test]
    fn test_buffer_pool_fetch_nonexistent() {
        let pool = create_test_pool(10);
        assert!(pool.fetch_page(PageId::new(0, 1)).is_none());
    }

    #[test]
    fn test_buffer_pool_unpin() {
        let pool = create_test_pool(10);
        let page_id = PageId::new(0, 1);

        let (frame, _) = pool.new_page(page_id).unwrap();
        assert!(frame.is_pinned());

        pool.unpin_page(page_id, false);
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_buffer_pool_dirty_tracking() {
        let pool = create_test_pool(10);
        let page_id = PageId::new(0, 1);

        pool.new_page(page_id).unwrap();
        pool.unpin_page(page_id, true);

        let frame = pool.fetch_page(page_id).unwrap();
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_buffer_pool_eviction_clean() {
        let pool = create_test_pool(3);

        for i in 1..=3 {
            let page_id = PageId::new(0, i);
            pool.new_page(page_id).unwrap();
            pool.unpin_page(page_id, false);
        }
        assert_eq!(pool.free_count(), 0);

        // One more page evicts a clean one: no image handed back
        let (_, evicted) = pool.new_page(PageId::new(0, 99)).unwrap();
        assert!(evicted.is_none());
        assert_eq!(pool.page_count(), 3);
        assert!(pool.contains(PageId::new(0, 99)));
    }

    #[test]
    fn test_buffer_pool_eviction_dirty() {
        let pool = create_test_pool(1);
        let page_id1 = PageId::new(0, 1);

        let (frame, _) = pool.new_page(page_id1).unwrap();
        frame.write_data()[0] = 0xAB;
        pool.unpin_page(page_id1, true);

        let (_, evicted) = pool.new_page(PageId::new(0, 2)).unwrap();

        let evicted = evicted.expect("dirty page must surface on eviction");
        assert_eq!(evicted.page_id, page_id1);
        assert_eq!(evicted.data[0], 0xAB);
    }

    #[test]
    fn test_buffer_pool_full_all_pinned() {
        let pool = create_test_pool(2);

        pool.new_page(PageId::new(0, 1)).unwrap();
        pool.new_page(PageId::new(0, 2)).unwrap();

        let result = pool.new_page(PageId::new(0, 3));
        assert!(matches!(result, Err(MartenError::BufferPoolFull)));
    }

    #[test]
    fn test_buffer_pool_pin_protects_from_eviction() {
        let pool = create_test_pool(2);

        pool.new_page(PageId::new(0, 1)).unwrap(); // stays pinned
        let page2 = PageId::new(0, 2);
        pool.new_page(page2).unwrap();
        pool.unpin_page(page2, false);

        // Only page 2 is evictable
        pool.new_page(PageId::new(0, 3)).unwrap();
        assert!(pool.contains(PageId::new(0, 1)));
        assert!(!pool.contains(page2));
    }

    #[test]
    fn test_buffer_pool_load_page() {
        let pool = create_test_pool(10);
        let page_id = PageId::new(0, 1);
        let data = [0xABu8; PAGE_SIZE];

        let (frame, _) = pool.load_page(page_id, &data).unwrap();

        let frame_data = frame.read_data();
        assert_eq!(frame_data[0], 0xAB);
        assert_eq!(frame_data[PAGE_SIZE - 1], 0xAB);
    }

    #[test]
    fn test_buffer_pool_flush_page() {
        let pool = create_test_pool(10);
        let page_id = PageId::new(0, 1);

        pool.new_page(page_id).unwrap();
        pool.unpin_page(page_id, true);

        let mut flushed_pages = vec![];
        let written = pool
            .flush_page(page_id, |pid, _data| {
                flushed_pages.push(pid);
                Ok(())
            })
            .unwrap();

        assert!(written);
        assert_eq!(flushed_pages, vec![page_id]);

        // Page is clean afterwards
        let frame = pool.fetch_page(page_id).unwrap();
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_buffer_pool_flush_file_filters() {
        let pool = create_test_pool(10);

        for i in 1..=3 {
            let page_id = PageId::new(0, i);
            pool.new_page(page_id).unwrap();
            pool.unpin_page(page_id, true);
        }
        let other = PageId::new(7, 1);
        pool.new_page(other).unwrap();
        pool.unpin_page(other, true);

        let mut count = 0;
        let flushed = pool
            .flush_file(0, |pid, _data| {
                assert_eq!(pid.file_id, 0);
                count += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(flushed, 3);
        assert_eq!(count, 3);

        // The other file's page is still dirty
        let frame = pool.fetch_page(other).unwrap();
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_buffer_pool_stats() {
        let pool = create_test_pool(10);

        for i in 1..=4 {
            let page_id = PageId::new(0, i);
            pool.new_page(page_id).unwrap();
            if i % 2 == 0 {
                pool.unpin_page(page_id, true);
            }
            // Odd pages remain pinned
        }

        let stats = pool.stats();
        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.free_frames, 6);
        assert_eq!(stats.used_frames, 4);
        assert_eq!(stats.pinned_frames, 2);
        assert_eq!(stats.dirty_frames, 2);
    }

    #[test]
    fn test_buffer_pool_duplicate_new_page() {
        let pool = create_test_pool(10);
        let page_id = PageId::new(0, 1);

        pool.new_page(page_id).unwrap();
        pool.unpin_page(page_id, false);

        let (frame, evicted) = pool.new_page(page_id).unwrap();

        assert!(evicted.is_none());
        assert_eq!(frame.page_id(), Some(page_id));
        assert_eq!(pool.page_count(), 1);
    }
}

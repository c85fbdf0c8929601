//! Buffer frame management.

use marten_common::page::{PageId, PAGE_SIZE};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Sentinel value indicating no page is loaded in the frame.
const NO_PAGE: u64 = u64::MAX;

/// Unique identifier for a frame in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// A frame in the buffer pool holding a single page image.
///
/// A pinned frame keeps its page image in place: the pool never evicts a
/// frame whose pin count is nonzero.
pub struct BufferFrame {
    /// Frame identifier.
    frame_id: FrameId,
    /// The page currently held (packed as u64, NO_PAGE = none).
    page_id: AtomicU64,
    /// Page image.
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
    /// Number of callers currently holding this page.
    pin_count: AtomicU32,
    /// Whether the page image has been modified since load.
    is_dirty: AtomicBool,
}

impl BufferFrame {
    /// Creates a new empty buffer frame.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU64::new(NO_PAGE),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page currently held by this frame.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        let packed = self.page_id.load(Ordering::Acquire);
        if packed == NO_PAGE {
            None
        } else {
            Some(PageId::from_u64(packed))
        }
    }

    /// Assigns the page held by this frame.
    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        let packed = page_id.map(|p| p.as_u64()).unwrap_or(NO_PAGE);
        self.page_id.store(packed, Ordering::Release);
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Takes one pin on this frame.
    #[inline]
    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one pin and returns the new pin count.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            // Underflow protection: restore to 0
            self.pin_count.store(0, Ordering::Release);
            return 0;
        }
        prev - 1
    }

    /// Returns true if this frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    /// Returns true if this frame holds modifications not yet on disk.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Sets or clears the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Reads the page image.
    #[inline]
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Writes to the page image.
    #[inline]
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Copies a page image into the frame.
    #[inline]
    pub fn copy_from(&self, src: &[u8]) {
        let mut data = self.data.write();
        let len = src.len().min(PAGE_SIZE);
        data[..len].copy_from_slice(&src[..len]);
    }

    /// Resets the frame to its empty state.
    #[inline]
    pub fn reset(&self) {
        self.page_id.store(NO_PAGE, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("frame_id", &self.frame_id)
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}

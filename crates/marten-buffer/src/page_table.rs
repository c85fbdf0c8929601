//! Page table mapping resident pages to buffer frames.

use crate::frame::FrameId;
use marten_common::page::PageId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Maps PageId to the FrameId currently holding the page.
///
/// The index core accesses the pool serially, so a plain locked map is
/// sufficient here; the table exists to keep residency lookups in one
/// place.
pub struct PageTable {
    map: RwLock<HashMap<PageId, FrameId>>,
}

impl PageTable {
    /// Creates a new page table sized for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Looks up a page and returns its frame if resident.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.map.read().get(&page_id).copied()
    }

    /// Inserts a page to frame mapping, replacing any previous one.
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        self.map.write().insert(page_id, frame_id);
    }

    /// Removes a page mapping. Returns the frame it occupied, if any.
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        self.map.write().remove(&page_id)
    }

    /// Returns true if the page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.map.read().contains_key(&page_id)
    }

    /// Returns the number of resident pages.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if no pages are resident.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Calls `f` for each resident (page, frame) pair.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(PageId, FrameId),
    {
        for (&page_id, &frame_id) in self.map.read().iter() {
            f(page_id, frame_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get() {
        let table = PageTable::new(16);
        let page_id = PageId::new(0, 42);

        table.insert(page_id, FrameId(7));
        assert_eq!(table.get(page_id), Some(FrameId(7)));
        assert!(table.contains(page_id));
    }

    #[test]
    fn test_remove() {
        let table = PageTable::new(16);
        let page_id = PageId::new(1, 42);

        table.insert(page_id, FrameId(7));
        assert_eq!(table.remove(page_id), Some(FrameId(7)));
        assert_eq!(table.get(page_id), None);
        assert_eq!(table.remove(page_id), None);
    }

    #[test]
    fn test_update_existing() {
        let table = PageTable::new(16);
        let page_id = PageId::new(0, 42);

        table.insert(page_id, FrameId(1));
        table.insert(page_id, FrameId(2));

        assert_eq!(table.get(page_id), Some(FrameId(2)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_len_and_for_each() {
        let table = PageTable::new(16);
        assert!(table.is_empty());

        table.insert(PageId::new(0, 1), FrameId(1));
        table.insert(PageId::new(0, 2), FrameId(2));
        table.insert(PageId::new(1, 1), FrameId(3));
        assert_eq!(table.len(), 3);

        let mut seen = 0;
        table.for_each(|_, _| seen += 1);
        assert_eq!(seen, 3);
    }
}

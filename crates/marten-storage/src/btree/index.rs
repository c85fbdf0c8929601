//! B+ tree index lifecycle and insertion.

use crate::btree::constants::{
    BRANCH_HEADER_SIZE, CHILD_SIZE, DEFAULT_BRANCH_SLOTS, DEFAULT_LEAF_SLOTS, KEY_SENTINEL,
    KEY_SIZE, LEAF_HEADER_SIZE, LEAF_SLOT_SIZE, META_PAGE_NO,
};
use crate::btree::meta::IndexMeta;
use crate::btree::node::{branch, leaf};
use crate::btree::scan::ScanState;
use crate::disk::DiskManager;
use crate::heap::Relation;
use crate::pager::Pager;
use crate::record::{extract_key, RecordId};
use marten_buffer::BufferPool;
use marten_common::page::{INVALID_PAGE_NO, PAGE_SIZE};
use marten_common::types::AttrType;
use marten_common::{MartenError, Result};
use std::sync::Arc;

/// Node capacities for a freshly built index.
///
/// The values are physical slot counts; a node keeps at most one less
/// live entry, the last slot being touched only while an overflowing
/// node is split. Leaves need at least 2 slots, internal nodes at least
/// 3 separator slots. Defaults fill a page. Reopening an existing index
/// uses the capacities persisted in its meta record.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Key/rid slots per leaf page.
    pub leaf_slots: usize,
    /// Separator slots per internal page (child slots are one more).
    pub branch_slots: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            leaf_slots: DEFAULT_LEAF_SLOTS,
            branch_slots: DEFAULT_BRANCH_SLOTS,
        }
    }
}

impl IndexConfig {
    fn validate(&self) -> Result<()> {
        let leaf_ok = (2..=u16::MAX as usize).contains(&self.leaf_slots)
            && LEAF_HEADER_SIZE + self.leaf_slots * LEAF_SLOT_SIZE <= PAGE_SIZE;
        if !leaf_ok {
            return Err(MartenError::InvalidParameter {
                name: "leaf_slots".to_string(),
                value: self.leaf_slots.to_string(),
            });
        }

        // Lifting the median of `s` separators leaves both halves with a
        // live separator only when s >= 3, so smaller nodes cannot split.
        let branch_ok = (3..=u16::MAX as usize).contains(&self.branch_slots)
            && BRANCH_HEADER_SIZE
                + self.branch_slots * KEY_SIZE
                + (self.branch_slots + 1) * CHILD_SIZE
                <= PAGE_SIZE;
        if !branch_ok {
            return Err(MartenError::InvalidParameter {
                name: "branch_slots".to_string(),
                value: self.branch_slots.to_string(),
            });
        }
        Ok(())
    }
}

/// Split information handed up the insertion recursion: the separator
/// key and the new right sibling holding the upper half.
struct SplitEntry {
    key: i32,
    page_no: u32,
}

/// Disk-resident B+ tree index over i32 keys.
///
/// One index owns one file for its lifetime. Mutation and scans must not
/// overlap; the index is accessed serially.
pub struct BTreeIndex {
    name: String,
    attr_byte_offset: u32,
    pub(crate) leaf_slots: usize,
    pub(crate) branch_slots: usize,
    pub(crate) pager: Pager,
    pool: Arc<BufferPool>,
    pub(crate) scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Opens the index for `relation_name` keyed on the i32 attribute at
    /// `attr_byte_offset`.
    ///
    /// The index file is named `"<relation>.<offset>"`. If it exists it
    /// is reused after verifying its meta record against the arguments;
    /// otherwise it is created and bulk-loaded by scanning the relation
    /// end to end.
    pub fn open(
        disk: Arc<DiskManager>,
        pool: Arc<BufferPool>,
        relation_name: &str,
        attr_byte_offset: u32,
        attr_type: AttrType,
        config: IndexConfig,
    ) -> Result<BTreeIndex> {
        if !attr_type.is_integer() {
            return Err(MartenError::UnsupportedType(attr_type.to_string()));
        }
        config.validate()?;

        let name = format!("{relation_name}.{attr_byte_offset}");

        if disk.exists(&name) {
            let file_id = disk.open(&name)?;
            let pager = Pager::new(Arc::clone(&disk), Arc::clone(&pool), file_id);

            let (leaf_slots, branch_slots) = {
                let meta_page = pager.pin(META_PAGE_NO)?;
                let data = meta_page.data();
                let meta = IndexMeta::from_bytes(&**data)?;
                meta.check_matches(relation_name, attr_byte_offset, attr_type)?;
                (meta.leaf_slots as usize, meta.branch_slots as usize)
            };

            log::debug!("reusing index file {name}");
            return Ok(BTreeIndex {
                name,
                attr_byte_offset,
                leaf_slots,
                branch_slots,
                pager,
                pool,
                scan: None,
            });
        }

        // Fresh index: open the source relation first, then create the
        // file with a meta page and an empty leaf root.
        let relation = Relation::open(Arc::clone(&disk), Arc::clone(&pool), relation_name)?;

        let file_id = disk.create(&name)?;
        let pager = Pager::new(Arc::clone(&disk), Arc::clone(&pool), file_id);
        {
            let meta_page = pager.allocate()?;
            if meta_page.page_no() != META_PAGE_NO {
                return Err(MartenError::TreeCorrupted(format!(
                    "meta page allocated at {} instead of {META_PAGE_NO}",
                    meta_page.page_no()
                )));
            }

            let root_page = pager.allocate()?;
            leaf::init(&mut **root_page.data_mut());

            let meta = IndexMeta {
                relation_name: IndexMeta::truncate_name(relation_name),
                attr_byte_offset,
                attr_type,
                root_page_no: root_page.page_no(),
                height: 1,
                leaf_slots: config.leaf_slots as u16,
                branch_slots: config.branch_slots as u16,
            };
            meta.write_to(&mut **meta_page.data_mut());
        }

        let mut index = BTreeIndex {
            name,
            attr_byte_offset,
            leaf_slots: config.leaf_slots,
            branch_slots: config.branch_slots,
            pager,
            pool,
            scan: None,
        };

        log::debug!("building index {} from relation {relation_name}", index.name);
        index.bulk_load(&relation)?;
        index.flush()?;
        Ok(index)
    }

    /// Returns the persistent index name (`"<relation>.<offset>"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current tree height (1 = the root is a leaf).
    pub fn height(&self) -> Result<u32> {
        let meta_page = self.pager.pin(META_PAGE_NO)?;
        let data = meta_page.data();
        Ok(IndexMeta::from_bytes(&**data)?.height)
    }

    /// Inserts every record of the relation, in scan order.
    fn bulk_load(&mut self, relation: &Relation) -> Result<()> {
        let mut scan = relation.scan();
        let mut loaded = 0u64;
        loop {
            match scan.scan_next() {
                Ok(rid) => {
                    let record = scan.record()?;
                    let key = extract_key(&record, self.attr_byte_offset as usize)?;
                    self.insert_entry(key, rid)?;
                    loaded += 1;
                }
                Err(MartenError::EndOfFile) => break,
                Err(e) => return Err(e),
            }
        }
        log::debug!("bulk load of {} complete: {loaded} entries", self.name);
        Ok(())
    }

    /// Inserts one (key, rid) entry.
    ///
    /// Descends from the root; child splits install separators in their
    /// parents on the way back up, and a root split grows the tree by
    /// one level.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        let meta_page = self.pager.pin(META_PAGE_NO)?;
        let (root_page_no, height) = {
            let data = meta_page.data();
            let meta = IndexMeta::from_bytes(&**data)?;
            (meta.root_page_no, meta.height)
        };

        let split = match self.insert_under_node(key, rid, root_page_no, height == 1)? {
            None => return Ok(()),
            Some(split) => split,
        };

        // Root split: fresh internal root one level taller
        let new_root = self.pager.allocate()?;
        {
            let mut data = new_root.data_mut();
            branch::init(&mut **data, height as u8);
            branch::set_child(&mut **data, self.branch_slots, 0, root_page_no);
            branch::set_key(&mut **data, 0, split.key);
            branch::set_child(&mut **data, self.branch_slots, 1, split.page_no);
            branch::set_key(&mut **data, 1, KEY_SENTINEL);
        }

        let mut data = meta_page.data_mut();
        let mut meta = IndexMeta::from_bytes(&**data)?;
        meta.root_page_no = new_root.page_no();
        meta.height = height + 1;
        meta.write_to(&mut **data);

        log::debug!(
            "{}: root split, new root {} at height {}",
            self.name,
            meta.root_page_no,
            meta.height
        );
        Ok(())
    }

    fn insert_under_node(
        &self,
        key: i32,
        rid: RecordId,
        page_no: u32,
        is_leaf: bool,
    ) -> Result<Option<SplitEntry>> {
        if is_leaf {
            self.insert_into_leaf(key, rid, page_no)
        } else {
            self.insert_into_branch(key, rid, page_no)
        }
    }

    fn insert_into_leaf(&self, key: i32, rid: RecordId, page_no: u32) -> Result<Option<SplitEntry>> {
        let page = self.pager.pin(page_no)?;
        let mut data = page.data_mut();

        let live = leaf::live_count(&**data, self.leaf_slots);
        let pos = leaf::insert_pos(&**data, live, key);
        leaf::insert_at(&mut **data, pos, live, key, rid);

        if live < self.leaf_slots - 1 {
            leaf::write_sentinel(&mut **data, live + 1);
            return Ok(None);
        }

        // The leaf was at capacity: every physical slot is briefly full.
        // Keep the lower half (odd totals favor the left) and move the
        // rest to a fresh right sibling.
        let total = live + 1;
        let moved = total / 2;
        let left_keep = total - moved;

        let new_page = self.pager.allocate()?;
        let mut new_data = new_page.data_mut();

        leaf::copy_slots(&mut **new_data, &**data, left_keep, moved);
        let separator = leaf::key_at(&**new_data, 0);

        // Splice the sibling into the leaf chain
        leaf::set_right_sibling(&mut **new_data, leaf::right_sibling(&**data));
        leaf::set_right_sibling(&mut **data, new_page.page_no());

        leaf::write_sentinel(&mut **data, left_keep);
        leaf::write_sentinel(&mut **new_data, moved);

        log::trace!(
            "leaf {page_no} split: {left_keep} kept, {moved} moved to {}",
            new_page.page_no()
        );
        Ok(Some(SplitEntry {
            key: separator,
            page_no: new_page.page_no(),
        }))
    }

    fn insert_into_branch(
        &self,
        key: i32,
        rid: RecordId,
        page_no: u32,
    ) -> Result<Option<SplitEntry>> {
        let page = self.pager.pin(page_no)?;

        let (pos, child_page, child_is_leaf) = {
            let data = page.data();
            let live_children = branch::live_children(&**data, self.branch_slots);
            if live_children < 2 {
                return Err(MartenError::TreeCorrupted(format!(
                    "internal node {page_no} has {live_children} children"
                )));
            }
            let pos = branch::descend_pos(&**data, live_children, key);
            let child = branch::child_at(&**data, self.branch_slots, pos);
            (pos, child, branch::level(&**data) == 1)
        };
        if child_page == INVALID_PAGE_NO {
            return Err(MartenError::TreeCorrupted(format!(
                "invalid child at slot {pos} of node {page_no}"
            )));
        }

        // The node stays pinned while the descent runs below it
        let child_split = match self.insert_under_node(key, rid, child_page, child_is_leaf)? {
            None => return Ok(None),
            Some(split) => split,
        };

        let mut data = page.data_mut();
        let live_children = branch::live_children(&**data, self.branch_slots);
        branch::insert_at(
            &mut **data,
            self.branch_slots,
            pos,
            live_children,
            child_split.key,
            child_split.page_no,
        );

        if live_children < self.branch_slots {
            // Live separators grew to `live_children`; rewrite the tail
            branch::set_key(&mut **data, live_children, KEY_SENTINEL);
            branch::set_child(
                &mut **data,
                self.branch_slots,
                live_children + 1,
                INVALID_PAGE_NO,
            );
            return Ok(None);
        }

        // The node now holds branch_slots separators and one child more.
        // Lift the median separator; it moves to the parent rather than
        // being copied right.
        let median = self.branch_slots / 2;
        let lifted = branch::key_at(&**data, median);
        let right_seps = self.branch_slots - 1 - median;
        let right_children = self.branch_slots - median;

        let new_page = self.pager.allocate()?;
        let mut new_data = new_page.data_mut();
        branch::init(&mut **new_data, branch::level(&**data));

        branch::copy_keys(&mut **new_data, &**data, median + 1, right_seps);
        branch::copy_children(
            &mut **new_data,
            &**data,
            self.branch_slots,
            median + 1,
            right_children,
        );

        branch::set_key(&mut **data, median, KEY_SENTINEL);
        branch::set_child(&mut **data, self.branch_slots, median + 1, INVALID_PAGE_NO);
        branch::set_key(&mut **new_data, right_seps, KEY_SENTINEL);
        branch::set_child(&mut **new_data, self.branch_slots, right_children, INVALID_PAGE_NO);

        log::trace!(
            "internal node {page_no} split at level {}: median {lifted} lifted to parent",
            branch::level(&**new_data)
        );
        Ok(Some(SplitEntry {
            key: lifted,
            page_no: new_page.page_no(),
        }))
    }

    /// Writes the index's dirty pages through to disk and syncs.
    pub fn flush(&self) -> Result<()> {
        self.pager.flush()?;
        Ok(())
    }

    /// Flushes and closes the index, abandoning any in-progress scan.
    pub fn close(mut self) -> Result<()> {
        if let Some(scan) = self.scan.take() {
            self.pager.unpin_detached(scan.page_no, false);
        }
        self.flush()?;
        debug_assert_eq!(
            self.pool.stats().pinned_frames,
            0,
            "pages still pinned at index close"
        );
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if let Some(scan) = self.scan.take() {
            self.pager.unpin_detached(scan.page_no, false);
        }
        let _ = self.pager.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManagerConfig;
    use marten_buffer::BufferPoolConfig;
    use tempfile::tempdir;

    fn setup() -> (Arc<DiskManager>, Arc<BufferPool>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames: 64 }));
        (disk, pool, dir)
    }

    fn small_config() -> IndexConfig {
        IndexConfig {
            leaf_slots: 4,
            branch_slots: 4,
        }
    }

    #[test]
    fn test_open_rejects_non_integer_attr() {
        let (disk, pool, _dir) = setup();

        let result = BTreeIndex::open(disk, pool, "orders", 0, AttrType::Float64, small_config());
        assert!(matches!(result, Err(MartenError::UnsupportedType(_))));
    }

    #[test]
    fn test_open_rejects_bad_config() {
        let (disk, pool, _dir) = setup();

        let result = BTreeIndex::open(
            Arc::clone(&disk),
            Arc::clone(&pool),
            "orders",
            0,
            AttrType::Int32,
            IndexConfig {
                leaf_slots: 1,
                branch_slots: 4,
            },
        );
        assert!(matches!(result, Err(MartenError::InvalidParameter { .. })));

        // Two separator slots cannot be split by lifting a median
        let result = BTreeIndex::open(
            Arc::clone(&disk),
            Arc::clone(&pool),
            "orders",
            0,
            AttrType::Int32,
            IndexConfig {
                leaf_slots: 4,
                branch_slots: 2,
            },
        );
        assert!(matches!(result, Err(MartenError::InvalidParameter { .. })));

        let result = BTreeIndex::open(
            disk,
            pool,
            "orders",
            0,
            AttrType::Int32,
            IndexConfig {
                leaf_slots: 4,
                branch_slots: PAGE_SIZE,
            },
        );
        assert!(matches!(result, Err(MartenError::InvalidParameter { .. })));
    }

    #[test]
    fn test_open_missing_relation() {
        let (disk, pool, _dir) = setup();

        let result = BTreeIndex::open(disk, pool, "missing", 0, AttrType::Int32, small_config());
        assert!(matches!(result, Err(MartenError::FileNotFound(_))));
    }

    #[test]
    fn test_open_empty_relation() {
        let (disk, pool, _dir) = setup();
        Relation::create(Arc::clone(&disk), Arc::clone(&pool), "orders").unwrap();

        let index = BTreeIndex::open(
            Arc::clone(&disk),
            pool,
            "orders",
            0,
            AttrType::Int32,
            small_config(),
        )
        .unwrap();

        assert_eq!(index.name(), "orders.0");
        assert_eq!(index.height().unwrap(), 1);
        assert!(disk.exists("orders.0"));
        index.close().unwrap();
    }

    #[test]
    fn test_reopen_verifies_meta() {
        let (disk, pool, _dir) = setup();
        Relation::create(Arc::clone(&disk), Arc::clone(&pool), "orders").unwrap();

        let index = BTreeIndex::open(
            Arc::clone(&disk),
            Arc::clone(&pool),
            "orders",
            0,
            AttrType::Int32,
            small_config(),
        )
        .unwrap();
        index.close().unwrap();

        // Same parameters: reuse works
        let index = BTreeIndex::open(
            Arc::clone(&disk),
            Arc::clone(&pool),
            "orders",
            0,
            AttrType::Int32,
            IndexConfig::default(),
        )
        .unwrap();
        // Persisted capacities win over the caller's config
        assert_eq!(index.leaf_slots, 4);
        assert_eq!(index.branch_slots, 4);
        index.close().unwrap();
    }

    #[test]
    fn test_insert_no_pages_left_pinned() {
        let (disk, pool, _dir) = setup();
        Relation::create(Arc::clone(&disk), Arc::clone(&pool), "orders").unwrap();

        let mut index = BTreeIndex::open(
            disk,
            Arc::clone(&pool),
            "orders",
            0,
            AttrType::Int32,
            small_config(),
        )
        .unwrap();

        for key in 0..50 {
            index.insert_entry(key, RecordId::new(1, key as u16)).unwrap();
            assert_eq!(pool.stats().pinned_frames, 0);
        }
        index.close().unwrap();
    }
}

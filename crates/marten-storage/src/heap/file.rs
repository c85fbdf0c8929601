//! Heap relation file and sequential scanner.

use crate::disk::DiskManager;
use crate::heap::page::HeapPage;
use crate::pager::Pager;
use crate::record::RecordId;
use bytes::Bytes;
use marten_buffer::BufferPool;
use marten_common::{MartenError, Result};
use std::sync::Arc;

/// A heap relation: an append-only file of variable-length records.
///
/// Records live in slotted pages starting at page 1 (page 0 is reserved
/// by the disk manager). The relation is the bulk-load source for index
/// construction.
pub struct Relation {
    name: String,
    pager: Pager,
    disk: Arc<DiskManager>,
}

impl Relation {
    /// Creates a relation file, or opens it if it already exists.
    pub fn create(disk: Arc<DiskManager>, pool: Arc<BufferPool>, name: &str) -> Result<Self> {
        let file_id = disk.create(name)?;
        log::debug!("relation {name} open as file {file_id}");
        Ok(Self {
            name: name.to_string(),
            pager: Pager::new(Arc::clone(&disk), pool, file_id),
            disk,
        })
    }

    /// Opens an existing relation file.
    pub fn open(disk: Arc<DiskManager>, pool: Arc<BufferPool>, name: &str) -> Result<Self> {
        let file_id = disk.open(name)?;
        Ok(Self {
            name: name.to_string(),
            pager: Pager::new(Arc::clone(&disk), pool, file_id),
            disk,
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of record pages.
    pub fn num_pages(&self) -> Result<u32> {
        // Page 0 is reserved and holds no records
        Ok(self.disk.num_pages(self.pager.file_id())?.saturating_sub(1))
    }

    /// Appends a record and returns its record id.
    pub fn append(&self, record: &[u8]) -> Result<RecordId> {
        let total_pages = self.disk.num_pages(self.pager.file_id())?;

        // Try the last record page first
        if total_pages > 1 {
            let last = total_pages - 1;
            let page = self.pager.pin(last)?;
            let fits =
                HeapPage::free_space(&**page.data()) >= record.len() + HeapPage::SLOT_SIZE;
            if fits {
                let slot = HeapPage::insert_record(&mut **page.data_mut(), record)?;
                return Ok(RecordId::new(last, slot));
            }
        }

        let page = self.pager.allocate()?;
        let slot = HeapPage::insert_record(&mut **page.data_mut(), record)?;
        Ok(RecordId::new(page.page_no(), slot))
    }

    /// Reads the record with the given id, if present.
    pub fn get(&self, rid: RecordId) -> Result<Option<Bytes>> {
        if !rid.is_valid() {
            return Ok(None);
        }
        let page = self.pager.pin(rid.page_no)?;
        let data = page.data();
        Ok(HeapPage::record(&**data, rid.slot).map(Bytes::copy_from_slice))
    }

    /// Starts a sequential scan over all records in storage order.
    pub fn scan(&self) -> RelationScan<'_> {
        RelationScan {
            relation: self,
            next_page: 1,
            next_slot: 0,
            current: None,
        }
    }

    /// Flushes the relation's dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.pager.flush()?;
        Ok(())
    }
}

/// Sequential scan over a heap relation.
///
/// `scan_next` yields record ids in storage order and signals exhaustion
/// with [`MartenError::EndOfFile`]; `record` returns the bytes of the
/// most recently yielded record.
pub struct RelationScan<'a> {
    relation: &'a Relation,
    next_page: u32,
    next_slot: u16,
    current: Option<(RecordId, Bytes)>,
}

impl RelationScan<'_> {
    /// Advances to the next record and returns its id.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let total_pages = self
            .relation
            .disk
            .num_pages(self.relation.pager.file_id())?;

        while self.next_page < total_pages {
            let page = self.relation.pager.pin(self.next_page)?;
            let data = page.data();

            if self.next_slot < HeapPage::num_slots(&**data) {
                let slot = self.next_slot;
                let rid = RecordId::new(self.next_page, slot);
                let bytes = HeapPage::record(&**data, slot)
                    .map(Bytes::copy_from_slice)
                    .ok_or_else(|| {
                        MartenError::Internal(format!("missing record at {rid}"))
                    })?;
                self.next_slot += 1;
                self.current = Some((rid, bytes));
                return Ok(rid);
            }

            self.next_page += 1;
            self.next_slot = 0;
        }

        self.current = None;
        Err(MartenError::EndOfFile)
    }

    /// Returns the bytes of the most recently returned record.
    pub fn record(&self) -> Result<Bytes> {
        self.current
            .as_ref()
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| MartenError::Internal("no current record in scan".to_string()))
    }
}

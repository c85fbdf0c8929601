//! Range-scan state machine.
//!
//! A scan seeks the first leaf entry satisfying the lower bound, then
//! walks forward along the leaf sibling chain until the upper bound is
//! crossed. Between `scan_next` calls the scan holds exactly one pinned
//! leaf page; the pin moves with the scan and is released by `end_scan`
//! (or when the index is dropped).

use crate::btree::constants::META_PAGE_NO;
use crate::btree::index::BTreeIndex;
use crate::btree::meta::IndexMeta;
use crate::btree::node::{branch, leaf};
use crate::record::RecordId;
use marten_common::page::INVALID_PAGE_NO;
use marten_common::{MartenError, Result};

/// Comparison operator bounding a range scan.
///
/// The lower bound takes `Gt`/`Gte`; the upper bound takes `Lt`/`Lte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ScanOp {
    /// Returns true if this operator may bound a scan from below.
    pub fn is_lower_bound(self) -> bool {
        matches!(self, ScanOp::Gt | ScanOp::Gte)
    }

    /// Returns true if this operator may bound a scan from above.
    pub fn is_upper_bound(self) -> bool {
        matches!(self, ScanOp::Lt | ScanOp::Lte)
    }
}

/// State of an active scan: the pinned leaf and the entry to return
/// next. `next_slot` of None means the scan is exhausted but not yet
/// reported as completed.
pub(crate) struct ScanState {
    pub(crate) page_no: u32,
    pub(crate) next_slot: Option<usize>,
    pub(crate) high: i32,
    pub(crate) high_op: ScanOp,
}

/// True if `key` lies within the upper bound.
fn admits_upper(key: i32, high: i32, high_op: ScanOp) -> bool {
    key < high || (key == high && high_op == ScanOp::Lte)
}

/// How a scan advances past the entry it is about to return.
enum Advance {
    Stay(Option<usize>),
    Move(u32),
}

impl BTreeIndex {
    /// Positions a scan on the first entry in `[low, high]` as refined
    /// by the operators.
    ///
    /// Fails with `BadOpcodes` for operators on the wrong side,
    /// `BadScanRange` when `low > high`, and `NoSuchKeyFound` when no
    /// entry satisfies both bounds. An already active scan is ended
    /// first. On any failure the scan is left idle with no page pinned.
    pub fn start_scan(&mut self, low: i32, low_op: ScanOp, high: i32, high_op: ScanOp) -> Result<()> {
        if !low_op.is_lower_bound() || !high_op.is_upper_bound() {
            return Err(MartenError::BadOpcodes);
        }
        if low > high {
            return Err(MartenError::BadScanRange { low, high });
        }
        if self.scan.is_some() {
            self.end_scan()?;
        }

        let (mut current, height) = {
            let meta_page = self.pager.pin(META_PAGE_NO)?;
            let data = meta_page.data();
            let meta = IndexMeta::from_bytes(&**data)?;
            (meta.root_page_no, meta.height)
        };

        // Descend toward the leaf that would hold the lower bound
        let mut is_leaf = height == 1;
        while !is_leaf {
            let page = self.pager.pin(current)?;
            let data = page.data();
            let level = branch::level(&**data);
            let child = branch::scan_child(&**data, self.branch_slots, low);
            drop(data);
            drop(page);

            if child == INVALID_PAGE_NO {
                return Err(MartenError::TreeCorrupted(format!(
                    "scan descent hit invalid child under node {current}"
                )));
            }
            current = child;
            is_leaf = level == 1;
        }

        let strict = low_op == ScanOp::Gt;
        let sibling = {
            let page = self.pager.pin(current)?;
            let data = page.data();
            match leaf::lower_bound(&**data, self.leaf_slots, low, strict) {
                Some(slot) => {
                    // All later keys are larger, so a candidate past the
                    // upper bound means nothing qualifies
                    if !admits_upper(leaf::key_at(&**data, slot), high, high_op) {
                        return Err(MartenError::NoSuchKeyFound);
                    }
                    drop(data);
                    drop(page);
                    self.pager.pin_detached(current)?;
                    self.scan = Some(ScanState {
                        page_no: current,
                        next_slot: Some(slot),
                        high,
                        high_op,
                    });
                    return Ok(());
                }
                None => leaf::right_sibling(&**data),
            }
        };

        // No entry here satisfies the lower bound; the first entry of the
        // right sibling is the only remaining candidate
        if sibling == INVALID_PAGE_NO {
            return Err(MartenError::NoSuchKeyFound);
        }

        {
            let page = self.pager.pin(sibling)?;
            let data = page.data();
            if !leaf::rid_at(&**data, 0).is_valid()
                || !admits_upper(leaf::key_at(&**data, 0), high, high_op)
            {
                return Err(MartenError::NoSuchKeyFound);
            }
        }

        self.pager.pin_detached(sibling)?;
        self.scan = Some(ScanState {
            page_no: sibling,
            next_slot: Some(0),
            high,
            high_op,
        });
        Ok(())
    }

    /// Returns the record id of the current entry and advances the scan.
    ///
    /// The entry that crosses the upper bound is never returned; the
    /// exhaustion signal itself is deferred: the call that returns the
    /// last qualifying rid succeeds, and the following call fails with
    /// `IndexScanCompleted`.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let (page_no, slot, high, high_op) = match &self.scan {
            None => return Err(MartenError::ScanNotInitialized),
            Some(state) => match state.next_slot {
                None => return Err(MartenError::IndexScanCompleted),
                Some(slot) => (state.page_no, slot, state.high, state.high_op),
            },
        };

        let (rid, advance) = {
            let page = self.pager.pin(page_no)?;
            let data = page.data();
            let rid = leaf::rid_at(&**data, slot);

            let next = slot + 1;
            let next_live = next < self.leaf_slots && leaf::rid_at(&**data, next).is_valid();
            let advance = if next_live {
                if admits_upper(leaf::key_at(&**data, next), high, high_op) {
                    Advance::Stay(Some(next))
                } else {
                    Advance::Stay(None)
                }
            } else {
                let sibling = leaf::right_sibling(&**data);
                if sibling == INVALID_PAGE_NO {
                    Advance::Stay(None)
                } else {
                    Advance::Move(sibling)
                }
            };
            (rid, advance)
        };

        match advance {
            Advance::Stay(next_slot) => {
                if let Some(state) = self.scan.as_mut() {
                    state.next_slot = next_slot;
                }
            }
            Advance::Move(sibling) => {
                let admitted = {
                    let page = self.pager.pin(sibling)?;
                    let data = page.data();
                    leaf::rid_at(&**data, 0).is_valid()
                        && admits_upper(leaf::key_at(&**data, 0), high, high_op)
                };
                if admitted {
                    // Walk the held pin forward along the sibling chain
                    self.pager.pin_detached(sibling)?;
                    self.pager.unpin_detached(page_no, false);
                    if let Some(state) = self.scan.as_mut() {
                        state.page_no = sibling;
                        state.next_slot = Some(0);
                    }
                } else if let Some(state) = self.scan.as_mut() {
                    state.next_slot = None;
                }
            }
        }

        Ok(rid)
    }

    /// Ends the active scan, releasing its pinned leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        let state = self
            .scan
            .take()
            .ok_or(MartenError::ScanNotInitialized)?;
        self.pager.unpin_detached(state.page_no, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_op_sides() {
        assert!(ScanOp::Gt.is_lower_bound());
        assert!(ScanOp::Gte.is_lower_bound());
        assert!(!ScanOp::Lt.is_lower_bound());
        assert!(!ScanOp::Lte.is_lower_bound());

        assert!(ScanOp::Lt.is_upper_bound());
        assert!(ScanOp::Lte.is_upper_bound());
        assert!(!ScanOp::Gt.is_upper_bound());
        assert!(!ScanOp::Gte.is_upper_bound());
    }

    #[test]
    fn test_admits_upper() {
        assert!(admits_upper(5, 10, ScanOp::Lt));
        assert!(!admits_upper(10, 10, ScanOp::Lt));
        assert!(admits_upper(10, 10, ScanOp::Lte));
        assert!(!admits_upper(11, 10, ScanOp::Lte));
    }
}

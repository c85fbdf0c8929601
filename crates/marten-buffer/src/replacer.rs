//! Clock page replacement for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clock replacement algorithm.
///
/// Candidate frames are tracked in an evictable set; reference bits give
/// recently accessed frames a second chance. Whether a candidate may
/// actually be evicted is decided by the caller through a predicate, so
/// pin counts stay authoritative in the pool.
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<AtomicBool>,
    /// Candidate set and clock hand.
    inner: Mutex<ClockInner>,
}

struct ClockInner {
    /// Frames eligible for eviction consideration.
    candidates: HashSet<FrameId>,
    /// Current clock hand position.
    hand: usize,
}

impl ClockReplacer {
    /// Creates a new clock replacer for the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        let reference_bits = (0..num_frames).map(|_| AtomicBool::new(false)).collect();

        Self {
            num_frames,
            reference_bits,
            inner: Mutex::new(ClockInner {
                candidates: HashSet::new(),
                hand: 0,
            }),
        }
    }

    /// Returns the total frame capacity.
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    /// Records that the given frame was accessed (sets its reference bit).
    #[inline]
    pub fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    /// Adds a frame to the candidate set.
    pub fn add_candidate(&self, frame_id: FrameId) {
        if (frame_id.0 as usize) < self.num_frames {
            self.inner.lock().candidates.insert(frame_id);
        }
    }

    /// Removes a frame from consideration entirely.
    pub fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.inner.lock().candidates.remove(&frame_id);
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }

    /// Selects a victim frame for eviction.
    ///
    /// Sweeps the clock over candidate frames, clearing reference bits;
    /// only frames for which `is_evictable` returns true can be chosen.
    /// Returns None if no candidate is evictable.
    pub fn evict<F>(&self, is_evictable: F) -> Option<FrameId>
    where
        F: Fn(FrameId) -> bool,
    {
        let mut inner = self.inner.lock();

        if inner.candidates.is_empty() {
            return None;
        }

        // Two full rotations: one may only clear reference bits.
        for _ in 0..(2 * self.num_frames) {
            let hand = inner.hand;
            let frame_id = FrameId(hand as u32);
            inner.hand = (hand + 1) % self.num_frames;

            if inner.candidates.contains(&frame_id) && is_evictable(frame_id) {
                if self.reference_bits[hand].load(Ordering::Relaxed) {
                    self.reference_bits[hand].store(false, Ordering::Relaxed);
                } else {
                    inner.candidates.remove(&frame_id);
                    return Some(frame_id);
                }
            }
        }

        // All remaining candidates kept their reference bits; take any
        // evictable one.
        let victim = inner
            .candidates
            .iter()
            .copied()
            .find(|&fid| is_evictable(fid));
        if let Some(victim) = victim {
            inner.candidates.remove(&victim);
        }
        victim
    }

    /// Returns the number of candidate frames.
    pub fn len(&self) -> usize {
        self.inner.lock().candidates.len()
    }

    /// Returns true if there are no candidate frames.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_replacer_new() {
        let replacer = ClockReplacer::new(10);
        assert_eq!(replacer.capacity(), 10);
        assert_eq!(replacer.len(), 0);
    }

    #[test]
    fn test_evict_empty() {
        let replacer = ClockReplacer::new(10);
        assert!(replacer.evict(|_| true).is_none());
    }

    #[test]
    fn test_evict_single() {
        let replacer = ClockReplacer::new(10);

        replacer.add_candidate(FrameId(5));
        assert_eq!(replacer.evict(|_| true), Some(FrameId(5)));
        assert_eq!(replacer.len(), 0);
    }

    #[test]
    fn test_evict_respects_predicate() {
        let replacer = ClockReplacer::new(4);

        replacer.add_candidate(FrameId(0));
        replacer.add_candidate(FrameId(1));

        // Only frame 1 is evictable (frame 0 pinned, say)
        let victim = replacer.evict(|fid| fid == FrameId(1));
        assert_eq!(victim, Some(FrameId(1)));

        // Frame 0 remains a candidate but still not evictable
        assert!(replacer.evict(|fid| fid == FrameId(1)).is_none());
        assert_eq!(replacer.len(), 1);
    }

    #[test]
    fn test_evict_second_chance() {
        let replacer = ClockReplacer::new(4);

        replacer.add_candidate(FrameId(0));
        replacer.add_candidate(FrameId(1));
        replacer.add_candidate(FrameId(2));

        // Frames 0 and 1 were recently accessed
        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));

        // Frame 2 is evicted first: no reference bit
        assert_eq!(replacer.evict(|_| true), Some(FrameId(2)));
    }

    #[test]
    fn test_evict_all_referenced() {
        let replacer = ClockReplacer::new(3);

        for i in 0..3 {
            replacer.add_candidate(FrameId(i));
            replacer.record_access(FrameId(i));
        }

        // Still evicts after clearing reference bits
        assert!(replacer.evict(|_| true).is_some());
        assert_eq!(replacer.len(), 2);
    }

    #[test]
    fn test_remove() {
        let replacer = ClockReplacer::new(10);

        replacer.add_candidate(FrameId(0));
        replacer.add_candidate(FrameId(1));
        replacer.remove(FrameId(0));

        assert_eq!(replacer.len(), 1);
        assert_eq!(replacer.evict(|_| true), Some(FrameId(1)));
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let replacer = ClockReplacer::new(5);

        replacer.add_candidate(FrameId(100));
        replacer.record_access(FrameId(100));
        replacer.remove(FrameId(100));

        assert!(replacer.is_empty());
    }
}

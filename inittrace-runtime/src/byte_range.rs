//! Byte range tracking for region initialization state.
//!
//! Tracks which byte ranges within a region have been declared initialized.
//! Used to check the annotation discipline of a pipeline run:
//! - No double-init (declaring already-initialized bytes again)
//! - Full coverage (every element of an output ends up initialized)
//! - No padding claims (bytes between elements stay uninitialized)

use smallvec::SmallVec;

/// Ranges tracked inline before spilling to the heap.
pub const INLINE_RANGES: usize = 16;

/// A half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    #[inline]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    #[inline]
    pub const fn len(&self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Tracks initialized byte ranges within a region.
///
/// Invariants:
/// - Ranges are sorted by start offset
/// - Ranges are non-overlapping and non-adjacent (merged when possible)
#[derive(Debug, Clone, Default)]
pub struct ByteRangeTracker {
    ranges: SmallVec<[Range; INLINE_RANGES]>,
}

/// Error from byte range operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ByteRangeError {
    /// Tried to initialize bytes that are already initialized.
    #[error("bytes [{start}..{end}) are already initialized")]
    AlreadyInitialized { start: u32, end: u32 },
    /// Invalid range (start >= end).
    #[error("invalid range [{start}..{end})")]
    InvalidRange { start: u32, end: u32 },
}

impl ByteRangeTracker {
    /// Create a new tracker with no initialized ranges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no bytes are initialized.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the number of disjoint initialized ranges.
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Total number of initialized bytes.
    pub fn initialized_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.len() as u64).sum()
    }

    /// Check if a byte range is fully uninitialized.
    pub fn is_uninit(&self, start: u32, end: u32) -> bool {
        if start >= end {
            return true; // Empty range is trivially uninit
        }
        !self.ranges.iter().any(|r| start < r.end && end > r.start)
    }

    /// Check if a byte range is fully initialized.
    pub fn is_init(&self, start: u32, end: u32) -> bool {
        if start >= end {
            return true; // Empty range is trivially init
        }
        self.ranges.iter().any(|r| r.start <= start && end <= r.end)
    }

    /// Mark a byte range as initialized.
    ///
    /// Returns error if any part of the range is already initialized.
    pub fn mark_init(&mut self, start: u32, end: u32) -> Result<(), ByteRangeError> {
        if start >= end {
            return Err(ByteRangeError::InvalidRange { start, end });
        }
        if !self.is_uninit(start, end) {
            return Err(ByteRangeError::AlreadyInitialized { start, end });
        }

        let mut merged = Range::new(start, end);
        // Absorb the neighbours we touch: at most one on each side.
        self.ranges.retain(|r| {
            if r.end == merged.start {
                merged.start = r.start;
                false
            } else if r.start == merged.end {
                merged.end = r.end;
                false
            } else {
                true
            }
        });

        let insert_idx = self
            .ranges
            .iter()
            .position(|r| r.start > merged.start)
            .unwrap_or(self.ranges.len());
        self.ranges.insert(insert_idx, merged);
        Ok(())
    }

    /// Get the initialized ranges as a slice.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tracker_is_empty() {
        let tracker = ByteRangeTracker::new();
        assert!(tracker.is_empty());
        assert_eq!(tracker.range_count(), 0);
    }

    #[test]
    fn mark_init_single_range() {
        let mut tracker = ByteRangeTracker::new();
        tracker.mark_init(0, 4).unwrap();

        assert!(!tracker.is_empty());
        assert_eq!(tracker.range_count(), 1);
        assert!(tracker.is_init(0, 4));
        assert!(tracker.is_init(1, 3)); // Subset is also init
        assert!(!tracker.is_init(0, 5)); // Superset is not
    }

    #[test]
    fn mark_init_disjoint_ranges() {
        let mut tracker = ByteRangeTracker::new();
        tracker.mark_init(0, 4).unwrap();
        tracker.mark_init(8, 12).unwrap();

        assert_eq!(tracker.range_count(), 2);
        assert!(tracker.is_init(0, 4));
        assert!(tracker.is_init(8, 12));
        assert!(!tracker.is_init(4, 8)); // Gap is not init
        assert!(tracker.is_uninit(4, 8));
        assert_eq!(tracker.initialized_bytes(), 8);
    }

    #[test]
    fn mark_init_adjacent_merges() {
        let mut tracker = ByteRangeTracker::new();
        tracker.mark_init(0, 4).unwrap();
        tracker.mark_init(4, 8).unwrap();

        assert_eq!(tracker.range_count(), 1);
        assert!(tracker.is_init(0, 8));
    }

    #[test]
    fn mark_init_adjacent_merges_reverse_order() {
        let mut tracker = ByteRangeTracker::new();
        tracker.mark_init(4, 8).unwrap();
        tracker.mark_init(0, 4).unwrap();

        assert_eq!(tracker.range_count(), 1);
        assert!(tracker.is_init(0, 8));
    }

    #[test]
    fn mark_init_bridges_gap() {
        let mut tracker = ByteRangeTracker::new();
        tracker.mark_init(0, 4).unwrap();
        tracker.mark_init(8, 12).unwrap();
        tracker.mark_init(4, 8).unwrap(); // Bridge the gap

        assert_eq!(tracker.range_count(), 1);
        assert_eq!(tracker.ranges(), &[Range::new(0, 12)]);
    }

    #[test]
    fn ranges_stay_sorted() {
        let mut tracker = ByteRangeTracker::new();
        tracker.mark_init(40, 44).unwrap();
        tracker.mark_init(0, 4).unwrap();
        tracker.mark_init(20, 24).unwrap();

        assert_eq!(
            tracker.ranges(),
            &[Range::new(0, 4), Range::new(20, 24), Range::new(40, 44)]
        );
    }

    #[test]
    fn spills_past_inline_capacity() {
        let mut tracker = ByteRangeTracker::new();
        for i in 0..(INLINE_RANGES as u32 * 2) {
            tracker.mark_init(i * 8, i * 8 + 4).unwrap();
        }
        assert_eq!(tracker.range_count(), INLINE_RANGES * 2);
    }

    #[test]
    fn mark_init_overlap_fails() {
        let mut tracker = ByteRangeTracker::new();
        tracker.mark_init(0, 8).unwrap();

        let err = tracker.mark_init(4, 12).unwrap_err();
        assert!(matches!(err, ByteRangeError::AlreadyInitialized { .. }));
    }

    #[test]
    fn mark_init_exact_overlap_fails() {
        let mut tracker = ByteRangeTracker::new();
        tracker.mark_init(0, 8).unwrap();

        let err = tracker.mark_init(0, 8).unwrap_err();
        assert!(matches!(err, ByteRangeError::AlreadyInitialized { .. }));
    }

    #[test]
    fn mark_init_empty_range_fails() {
        let mut tracker = ByteRangeTracker::new();
        assert_eq!(
            tracker.mark_init(4, 4),
            Err(ByteRangeError::InvalidRange { start: 4, end: 4 })
        );
    }
}

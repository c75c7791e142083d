//! Byte-level record of what a run claimed to initialize inside one view.

use bytemuck::Pod;
use inittrace_runtime::StridedView;
use inittrace_runtime::byte_range::{ByteRangeError, ByteRangeTracker};

use crate::verifier::Observed;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("notification at {addr:#x} (+{len}) lies outside the tracked region")]
    OutsideRegion { addr: usize, len: u64 },
    #[error(transparent)]
    Tracker(#[from] ByteRangeError),
    #[error("region of {bytes} bytes is too large to track")]
    RegionTooLarge { bytes: usize },
    #[error("element {index:?} was never marked initialized")]
    Uncovered { index: Vec<i32> },
    #[error("padding element {element} was marked initialized")]
    PaddingInitialized { element: usize },
}

/// Summary of a successful [`InitLedger::check_view`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coverage {
    pub elements: usize,
    pub initialized_bytes: u64,
    pub padding_elements: usize,
}

/// The tracker addresses bytes with u32 offsets.
fn region_len(bytes: usize) -> Result<u32, LedgerError> {
    u32::try_from(bytes).map_err(|_| LedgerError::RegionTooLarge { bytes })
}

/// Tracks initialized bytes of a view's storage, padding included.
///
/// Overlapping claims are rejected: a run must not announce the same byte
/// twice.
#[derive(Debug, Clone)]
pub struct InitLedger {
    base: usize,
    len: u32,
    tracker: ByteRangeTracker,
}

impl InitLedger {
    pub fn for_view<T: Pod>(view: &StridedView<'_, T>) -> Result<Self, LedgerError> {
        Ok(Self {
            base: view.base().addr(),
            len: region_len(view.capacity_bytes())?,
            tracker: ByteRangeTracker::new(),
        })
    }

    /// Record that `[ptr, ptr + len)` was initialized.
    pub fn mark(&mut self, ptr: *const u8, len: u64) -> Result<(), LedgerError> {
        let addr = ptr.addr();
        let outside = LedgerError::OutsideRegion { addr, len };
        let start = addr.checked_sub(self.base).ok_or(outside.clone())?;
        let end = u64::try_from(start)
            .ok()
            .and_then(|s| s.checked_add(len))
            .filter(|&e| e <= u64::from(self.len))
            .ok_or(outside)?;
        // Both bounds are within `self.len`, which fits in u32.
        self.tracker.mark_init(start as u32, end as u32)?;
        Ok(())
    }

    /// Record every observation, in order.
    pub fn record_all<'o>(
        &mut self,
        observed: impl IntoIterator<Item = &'o Observed>,
    ) -> Result<(), LedgerError> {
        for o in observed {
            self.mark(o.ptr, o.len)?;
        }
        Ok(())
    }

    /// Whether byte offsets `[start, end)` from the base are all initialized.
    pub fn is_init(&self, start: u32, end: u32) -> bool {
        self.tracker.is_init(start, end)
    }

    pub fn initialized_bytes(&self) -> u64 {
        self.tracker.initialized_bytes()
    }

    /// Every element of `view` must be fully initialized and every storage
    /// slot outside the view must be untouched.
    pub fn check_view<T: Pod>(&self, view: &StridedView<'_, T>) -> Result<Coverage, LedgerError> {
        let elem = view.elem_size();
        let mut addressed = vec![false; view.capacity()];
        let mut elements = 0;
        for idx in view.indices() {
            let offset = view.offset_of(&idx);
            addressed[offset] = true;
            let start = (offset * elem) as u32;
            if !self.tracker.is_init(start, start + elem as u32) {
                return Err(LedgerError::Uncovered {
                    index: idx.into_vec(),
                });
            }
            elements += 1;
        }

        let mut padding_elements = 0;
        for (element, _) in addressed.iter().enumerate().filter(|(_, hit)| !**hit) {
            let start = (element * elem) as u32;
            if !self.tracker.is_uninit(start, start + elem as u32) {
                return Err(LedgerError::PaddingInitialized { element });
            }
            padding_elements += 1;
        }

        Ok(Coverage {
            elements,
            initialized_bytes: self.tracker.initialized_bytes(),
            padding_elements,
        })
    }
}

//! Physical layouts of the `(x, y, c)` logical array.

use core::fmt;
use core::str::FromStr;

use inittrace_runtime::{Dim, StridedView, ViewError};
use inittrace_runtime::view::required_len;

use crate::config::ScenarioConfig;

/// Physical packing of the output array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    /// Channel-minor, pixel-major.
    Interleaved,
    /// Interleaved with padding after each row of pixels.
    SparseChunky,
    /// Channel-major, tightest packing.
    Planar,
    /// Planar with padding after each row.
    SparsePlanar,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 4] = [
        LayoutKind::Interleaved,
        LayoutKind::SparseChunky,
        LayoutKind::Planar,
        LayoutKind::SparsePlanar,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayoutKind::Interleaved => "interleaved",
            LayoutKind::SparseChunky => "sparse chunky",
            LayoutKind::Planar => "planar",
            LayoutKind::SparsePlanar => "sparse planar",
        }
    }

    /// Sparse layouts live in caller-provided storage that includes padding.
    pub fn is_sparse(self) -> bool {
        matches!(self, LayoutKind::SparseChunky | LayoutKind::SparsePlanar)
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown layout `{0}` (expected interleaved, sparse-chunky, planar or sparse-planar)")]
pub struct ParseLayoutError(String);

impl FromStr for LayoutKind {
    type Err = ParseLayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "interleaved" | "chunky" => Ok(LayoutKind::Interleaved),
            "sparse-chunky" => Ok(LayoutKind::SparseChunky),
            "planar" => Ok(LayoutKind::Planar),
            "sparse-planar" => Ok(LayoutKind::SparsePlanar),
            _ => Err(ParseLayoutError(s.to_owned())),
        }
    }
}

/// Builds views of one logical shape in each [`LayoutKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutFactory {
    width: i32,
    height: i32,
    channels: i32,
    pad: i32,
}

impl LayoutFactory {
    pub fn new(config: &ScenarioConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            channels: config.channels,
            pad: config.pad,
        }
    }

    /// Logical shape `[width, height, channels]`.
    pub fn extent(&self) -> [i32; 3] {
        [self.width, self.height, self.channels]
    }

    /// Dimensions `(x, y, c)` for `kind`.
    ///
    /// A negative extent or padding would make distinct elements share a
    /// slot, so both are rejected along with strides that overflow `i32`.
    pub fn dims(&self, kind: LayoutKind) -> Result<[Dim; 3], ViewError> {
        let (w, h, c, pad) = (self.width, self.height, self.channels, self.pad);
        for (dim, extent) in [w, h, c].into_iter().enumerate() {
            if extent < 0 {
                return Err(ViewError::NegativeExtent { dim, extent });
            }
        }
        if pad < 0 {
            return Err(ViewError::NegativePadding { pad });
        }

        let mul = |a: i32, b: i32| a.checked_mul(b).ok_or(ViewError::Overflow);
        let add = |a: i32, b: i32| a.checked_add(b).ok_or(ViewError::Overflow);
        Ok(match kind {
            LayoutKind::Planar => [
                Dim::new(0, w, 1),
                Dim::new(0, h, w),
                Dim::new(0, c, mul(w, h)?),
            ],
            LayoutKind::Interleaved => [
                Dim::new(0, w, c),
                Dim::new(0, h, mul(w, c)?),
                Dim::new(0, c, 1),
            ],
            LayoutKind::SparseChunky => [
                Dim::new(0, w, c),
                Dim::new(0, h, add(mul(w, c)?, pad)?),
                Dim::new(0, c, 1),
            ],
            LayoutKind::SparsePlanar => {
                let row = add(w, pad)?;
                [
                    Dim::new(0, w, 1),
                    Dim::new(0, h, row),
                    Dim::new(0, c, mul(row, h)?),
                ]
            }
        })
    }

    /// Storage length for `kind`, padding included.
    ///
    /// Dense layouts need exactly the logical element count; the sparse ones
    /// keep the trailing padding of their last row as well.
    pub fn allocation_len(&self, kind: LayoutKind) -> Result<usize, ViewError> {
        let dims = self.dims(kind)?;
        let required = required_len(&dims)?;
        // The outermost padded dimension repeats a whole padded block.
        let (block, repeats) = match kind {
            LayoutKind::Planar | LayoutKind::Interleaved => return Ok(required),
            LayoutKind::SparseChunky => (dims[1].stride, self.height),
            LayoutKind::SparsePlanar => (dims[2].stride, self.channels),
        };
        // Both factors were checked non-negative by `dims`.
        let padded = (block as usize)
            .checked_mul(repeats as usize)
            .ok_or(ViewError::Overflow)?;
        Ok(padded.max(required))
    }

    /// Zeroed storage for [`Self::build_in`].
    pub fn allocate(&self, kind: LayoutKind) -> Result<Vec<i32>, ViewError> {
        Ok(vec![0; self.allocation_len(kind)?])
    }

    /// A view owning freshly allocated, zeroed memory.
    pub fn build(&self, kind: LayoutKind) -> Result<StridedView<'static, i32>, ViewError> {
        StridedView::owned_with(self.allocate(kind)?, &self.dims(kind)?)
    }

    /// A view over caller-provided storage, left to the caller afterwards.
    pub fn build_in<'a>(
        &self,
        kind: LayoutKind,
        storage: &'a mut [i32],
    ) -> Result<StridedView<'a, i32>, ViewError> {
        StridedView::borrowed(storage, &self.dims(kind)?)
    }
}

//! Strided multi-dimensional views over flat memory.
//!
//! A [`StridedView`] describes an N-dimensional logical array with a
//! per-dimension minimum index, extent and stride (in elements). Planar,
//! interleaved and padded variants of the same logical array differ only in
//! their strides, so code that consumes a view never needs to know which
//! one it got.
//!
//! The address of index `(i0..ik)` is
//! `base + size_of::<T>() * Σ (i_d - min_d) * stride_d`.

use core::fmt;
use core::ops::{Deref, DerefMut};

use bytemuck::Pod;
use smallvec::SmallVec;

use crate::descriptor::{BufferDescriptor, HostBuffer, HostBufferMut, MAX_DIMS};

/// An index tuple into a view.
pub type Index = SmallVec<[i32; MAX_DIMS]>;

/// One dimension of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim {
    pub min: i32,
    pub extent: i32,
    /// Stride in elements.
    pub stride: i32,
}

impl Dim {
    #[inline]
    pub const fn new(min: i32, extent: i32, stride: i32) -> Self {
        Self {
            min,
            extent,
            stride,
        }
    }

    /// One past the largest valid index.
    #[inline]
    pub const fn end(&self) -> i32 {
        self.min + self.extent
    }

    #[inline]
    pub const fn contains(&self, i: i32) -> bool {
        i >= self.min && i < self.end()
    }
}

/// Error building a view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("rank {rank} exceeds the supported maximum of {max}")]
    TooManyDims { rank: usize, max: usize },
    #[error("dimension {dim} has negative extent {extent}")]
    NegativeExtent { dim: usize, extent: i32 },
    #[error("dimension {dim} has negative stride {stride}")]
    NegativeStride { dim: usize, stride: i32 },
    #[error("storage holds {len} elements but the view addresses {required}")]
    StorageTooSmall { len: usize, required: usize },
    #[error("row padding {pad} is negative")]
    NegativePadding { pad: i32 },
    #[error("view addresses more elements than fit in memory")]
    Overflow,
}

enum Storage<'a, T> {
    Owned(Vec<T>),
    Borrowed(&'a mut [T]),
}

impl<T> Deref for Storage<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }
}

impl<T> DerefMut for Storage<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
        }
    }
}

/// A strided view over owned or borrowed storage.
///
/// Owned storage is released when the view is dropped; borrowed storage is
/// left to the caller.
pub struct StridedView<'a, T> {
    storage: Storage<'a, T>,
    dims: SmallVec<[Dim; MAX_DIMS]>,
}

impl<T> fmt::Debug for StridedView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StridedView")
            .field("dims", &self.dims)
            .field("len", &self.storage.len())
            .field("owns_memory", &matches!(self.storage, Storage::Owned(_)))
            .finish()
    }
}

/// Number of elements a view over `dims` needs in its storage: one past the
/// largest addressed offset.
pub fn required_len(dims: &[Dim]) -> Result<usize, ViewError> {
    if dims.len() > MAX_DIMS {
        return Err(ViewError::TooManyDims {
            rank: dims.len(),
            max: MAX_DIMS,
        });
    }
    for (d, dim) in dims.iter().enumerate() {
        if dim.extent < 0 {
            return Err(ViewError::NegativeExtent {
                dim: d,
                extent: dim.extent,
            });
        }
        if dim.stride < 0 {
            return Err(ViewError::NegativeStride {
                dim: d,
                stride: dim.stride,
            });
        }
    }
    if dims.iter().any(|dim| dim.extent == 0) {
        return Ok(0);
    }

    let mut max_offset = 0usize;
    for dim in dims {
        let span = (dim.extent as usize - 1)
            .checked_mul(dim.stride as usize)
            .ok_or(ViewError::Overflow)?;
        max_offset = max_offset.checked_add(span).ok_or(ViewError::Overflow)?;
    }
    max_offset.checked_add(1).ok_or(ViewError::Overflow)
}

impl<T: Pod> StridedView<'static, T> {
    /// Allocate zeroed storage sized to fit the maximum addressed offset.
    pub fn owned(dims: &[Dim]) -> Result<Self, ViewError> {
        let len = required_len(dims)?;
        Ok(Self {
            storage: Storage::Owned(vec![T::zeroed(); len]),
            dims: dims.iter().copied().collect(),
        })
    }

    /// Take ownership of `storage`, which must cover every addressed offset.
    /// Slots past the last element stay part of the allocation.
    pub fn owned_with(storage: Vec<T>, dims: &[Dim]) -> Result<Self, ViewError> {
        let required = required_len(dims)?;
        if storage.len() < required {
            return Err(ViewError::StorageTooSmall {
                len: storage.len(),
                required,
            });
        }
        Ok(Self {
            storage: Storage::Owned(storage),
            dims: dims.iter().copied().collect(),
        })
    }

    /// Tightest packing with the first dimension innermost (planar).
    pub fn dense(extents: &[i32]) -> Result<Self, ViewError> {
        let mut dims: SmallVec<[Dim; MAX_DIMS]> = SmallVec::new();
        let mut stride = 1i32;
        for &extent in extents {
            dims.push(Dim::new(0, extent, stride));
            stride = stride.checked_mul(extent.max(1)).ok_or(ViewError::Overflow)?;
        }
        Self::owned(&dims)
    }

    /// Channel-minor, pixel-major packing over `(x, y, c)`.
    pub fn interleaved(width: i32, height: i32, channels: i32) -> Result<Self, ViewError> {
        let row = width.checked_mul(channels).ok_or(ViewError::Overflow)?;
        Self::owned(&[
            Dim::new(0, width, channels),
            Dim::new(0, height, row),
            Dim::new(0, channels, 1),
        ])
    }
}

impl<'a, T: Pod> StridedView<'a, T> {
    /// Wrap caller-provided storage. The storage must cover every addressed offset.
    pub fn borrowed(storage: &'a mut [T], dims: &[Dim]) -> Result<Self, ViewError> {
        let required = required_len(dims)?;
        if storage.len() < required {
            return Err(ViewError::StorageTooSmall {
                len: storage.len(),
                required,
            });
        }
        Ok(Self {
            storage: Storage::Borrowed(storage),
            dims: dims.iter().copied().collect(),
        })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    #[inline]
    pub fn dim(&self, d: usize) -> Dim {
        self.dims[d]
    }

    /// Bytes per element.
    #[inline]
    pub fn elem_size(&self) -> usize {
        core::mem::size_of::<T>()
    }

    /// Number of valid index tuples.
    pub fn element_count(&self) -> usize {
        self.dims.iter().map(|d| d.extent as usize).product()
    }

    /// Number of elements in the backing storage, padding included.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity() * self.elem_size()
    }

    #[inline]
    pub fn owns_memory(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    /// Address of the element at all-minimum indices.
    #[inline]
    pub fn base(&self) -> *const u8 {
        self.storage.as_ptr().cast::<u8>()
    }

    pub fn contains(&self, idx: &[i32]) -> bool {
        idx.len() == self.dims.len() && self.dims.iter().zip(idx).all(|(d, &i)| d.contains(i))
    }

    /// Element offset of `idx` from the base.
    ///
    /// `idx` must lie inside the view; this is only checked in debug builds.
    #[inline]
    pub fn offset_of(&self, idx: &[i32]) -> usize {
        debug_assert!(self.contains(idx), "index {idx:?} outside view");
        self.dims
            .iter()
            .zip(idx)
            .map(|(d, &i)| (i - d.min) as usize * d.stride as usize)
            .sum()
    }

    /// Byte address of `idx`. Same precondition as [`Self::offset_of`].
    #[inline]
    pub fn address_of(&self, idx: &[i32]) -> *const u8 {
        self.base()
            .wrapping_add(self.offset_of(idx) * self.elem_size())
    }

    #[inline]
    pub fn get(&self, idx: &[i32]) -> T {
        self.storage[self.offset_of(idx)]
    }

    #[inline]
    pub fn set(&mut self, idx: &[i32], value: T) {
        let offset = self.offset_of(idx);
        self.storage[offset] = value;
    }

    /// Every valid index tuple, each exactly once. The order is unspecified;
    /// calling this again starts a fresh enumeration.
    pub fn indices(&self) -> Indices {
        Indices::new(&self.dims)
    }

    /// Calls `visit` once per element, in the order of [`indices`](Self::indices).
    pub fn for_each_element(&self, mut visit: impl FnMut(&[i32])) {
        for idx in self.indices() {
            visit(&idx);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.storage[..])
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.storage[..])
    }

    pub fn descriptor(&self) -> BufferDescriptor {
        BufferDescriptor::with_dims(self.base().addr(), self.elem_size() as i32, &self.dims)
    }

    pub fn host_buffer(&self) -> HostBuffer<'_> {
        HostBuffer {
            desc: self.descriptor(),
            host: self.as_bytes(),
        }
    }

    pub fn host_buffer_mut(&mut self) -> HostBufferMut<'_> {
        let desc = self.descriptor();
        HostBufferMut {
            desc,
            host: Some(self.as_bytes_mut()),
        }
    }
}

/// Lazy enumeration of a view's index tuples, first dimension fastest.
#[derive(Debug, Clone)]
pub struct Indices {
    dims: SmallVec<[Dim; MAX_DIMS]>,
    next: Option<Index>,
}

impl Indices {
    fn new(dims: &[Dim]) -> Self {
        let next = if dims.iter().any(|d| d.extent <= 0) {
            None
        } else {
            Some(dims.iter().map(|d| d.min).collect())
        };
        Self {
            dims: dims.iter().copied().collect(),
            next,
        }
    }
}

impl Iterator for Indices {
    type Item = Index;

    fn next(&mut self) -> Option<Index> {
        let current = self.next.take()?;
        let mut succ = current.clone();
        for (d, dim) in self.dims.iter().enumerate() {
            succ[d] += 1;
            if succ[d] < dim.end() {
                self.next = Some(succ);
                return Some(current);
            }
            succ[d] = dim.min;
        }
        // Every dimension wrapped: `current` was the last tuple.
        Some(current)
    }
}

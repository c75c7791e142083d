//! The fixed-size buffer descriptor exchanged with pipeline stages.
//!
//! This is the only "wire format" in the system: stages read and write it
//! during bounds queries, and the pipeline marks it initialized as a whole,
//! so its size is what distinguishes metadata notifications from contents
//! notifications.

use facet::Facet;
use facet_core::Shape;

use crate::view::Dim;

/// Maximum rank a descriptor can describe.
pub const MAX_DIMS: usize = 4;

/// Per-buffer metadata: shape, strides, element size and dirty flags.
///
/// Unused trailing dimensions have extent 0.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct BufferDescriptor {
    /// Device handle; always 0, device memory is not modeled.
    pub device: u64,
    /// Address of the host allocation, 0 when absent (bounds query).
    pub host: usize,
    pub extent: [i32; MAX_DIMS],
    /// Strides in elements.
    pub stride: [i32; MAX_DIMS],
    pub min: [i32; MAX_DIMS],
    /// Element size in bytes.
    pub elem_size: i32,
    /// Set by whoever last wrote the host allocation.
    pub host_dirty: bool,
    pub device_dirty: bool,
}

/// Size in bytes of a [`BufferDescriptor`].
pub const DESCRIPTOR_SIZE: usize = core::mem::size_of::<BufferDescriptor>();

/// The reflected shape of [`BufferDescriptor`].
pub fn descriptor_shape() -> &'static Shape {
    BufferDescriptor::SHAPE
}

/// Size of a descriptor as recorded by its reflected layout.
#[inline]
pub fn descriptor_size() -> usize {
    descriptor_shape()
        .layout
        .sized_layout()
        .map(|layout| layout.size())
        .unwrap_or(DESCRIPTOR_SIZE)
}

impl BufferDescriptor {
    /// A bounds-query descriptor: no host memory, shape left for the callee.
    pub fn query(elem_size: i32) -> Self {
        Self {
            elem_size,
            ..Self::default()
        }
    }

    /// Describe `dims` living at `host`.
    pub fn with_dims(host: usize, elem_size: i32, dims: &[Dim]) -> Self {
        debug_assert!(dims.len() <= MAX_DIMS, "too many dimensions");
        let mut desc = Self {
            host,
            elem_size,
            ..Self::default()
        };
        for (d, dim) in dims.iter().take(MAX_DIMS).enumerate() {
            desc.min[d] = dim.min;
            desc.extent[d] = dim.extent;
            desc.stride[d] = dim.stride;
        }
        desc
    }

    /// True once real memory is bound.
    #[inline]
    pub fn has_host(&self) -> bool {
        self.host != 0
    }

    /// The first `rank` dimensions.
    pub fn dims(&self, rank: usize) -> impl Iterator<Item = Dim> + '_ {
        (0..rank.min(MAX_DIMS)).map(|d| Dim::new(self.min[d], self.extent[d], self.stride[d]))
    }

    /// Address of the descriptor itself, as handed to an initialization sink.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        core::ptr::from_ref(self).cast::<u8>()
    }
}

/// Read-only host memory together with its descriptor.
#[derive(Debug)]
pub struct HostBuffer<'a> {
    pub desc: BufferDescriptor,
    pub host: &'a [u8],
}

/// Writable host memory together with its descriptor.
///
/// `host` is `None` when the caller has not bound memory yet.
#[derive(Debug)]
pub struct HostBufferMut<'a> {
    pub desc: BufferDescriptor,
    pub host: Option<&'a mut [u8]>,
}

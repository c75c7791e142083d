//! All traits used to represent a pipeline runtime that inittrace can observe,
//! plus the strided buffer model both sides exchange.
//!
//! A generated pipeline plays two roles towards the harness:
//!
//! 1. it answers bounds queries ([`IBoundsQuery`]) so the caller can size
//!    buffers before real memory is bound, and
//! 2. it emits "this byte range is now initialized" notifications into an
//!    [`IInitSink`] while it runs ([`IPipeline`]).
//!
//! The two roles are separate traits so either side can be faked on its own.

// Important rule: the modules are public because the pipeline and the harness
// live in different crates, but everything a caller needs is re-exported here.
pub mod byte_range;
pub mod descriptor;
pub mod live;
pub mod record;
pub mod view;

pub use descriptor::{
    BufferDescriptor, DESCRIPTOR_SIZE, HostBuffer, HostBufferMut, MAX_DIMS, descriptor_shape,
    descriptor_size,
};
pub use view::{Dim, Index, Indices, StridedView, ViewError};

// ==================================================================
// Capabilities
// ==================================================================

/// Responds to the bounds-query protocol.
///
/// Called with a descriptor whose host pointer is absent; the implementor
/// fills in the shape fields (`min`, `extent`) it requires and returns `Ok`.
/// A descriptor that already carries a host pointer is left untouched.
pub trait IBoundsQuery {
    fn query_bounds(&mut self, query: &mut BufferDescriptor) -> Result<(), StageError>;
}

/// Receives initialization notifications in the exact order a pipeline emits them.
pub trait IInitSink {
    /// Returned to abort the running pipeline.
    type Error;

    /// `len` bytes starting at `ptr` have become fully initialized.
    fn memory_is_initialized(&mut self, ptr: *const u8, len: u64) -> Result<(), Self::Error>;
}

impl<S: IInitSink + ?Sized> IInitSink for &mut S {
    type Error = S::Error;

    #[inline]
    fn memory_is_initialized(&mut self, ptr: *const u8, len: u64) -> Result<(), Self::Error> {
        (**self).memory_is_initialized(ptr, len)
    }
}

/// Side channel for human-readable pipeline errors. Must never stop the process.
pub trait IErrorReporter {
    fn report(&mut self, message: &str);
}

impl<R: IErrorReporter + ?Sized> IErrorReporter for &mut R {
    #[inline]
    fn report(&mut self, message: &str) {
        (**self).report(message)
    }
}

/// An externally implemented pipeline stage: answers bounds queries for its
/// input and copies input to output once real memory is bound.
pub trait IExternStage: IBoundsQuery {
    fn copy(
        &mut self,
        input: &HostBuffer<'_>,
        output: &mut HostBufferMut<'_>,
    ) -> Result<(), StageError>;
}

/// A runnable pipeline writing `i32` results into a strided output view.
pub trait IPipeline {
    /// Number of descriptor-sized notifications the pipeline emits while
    /// running bounds inference. Depends on the pipeline topology.
    fn bounds_inference_notifications(&self) -> u32;

    /// Run the pipeline into `output`.
    ///
    /// Every notification goes to `sink`; a sink error aborts the run
    /// immediately and comes back as [`RealizeError::Aborted`].
    fn realize<S, R>(
        &mut self,
        output: &mut StridedView<'_, i32>,
        sink: &mut S,
        reporter: &mut R,
    ) -> Result<(), RealizeError<S::Error>>
    where
        S: IInitSink,
        R: IErrorReporter;
}

// ==================================================================
// Errors
// ==================================================================

/// Error from an extern stage or a bounds query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    /// The stage was asked to produce data but the output has no host memory.
    #[error("{stage} failure: output host buffer is absent")]
    MissingHost { stage: &'static str },
    /// Input and output disagree on element size.
    #[error("element size mismatch: input has {input}-byte elements, output {output}-byte")]
    ElemSizeMismatch { input: i32, output: i32 },
    /// Output is smaller than the input region being copied.
    #[error("output extent {output} in dimension {dim} is smaller than input extent {input}")]
    ShapeMismatch { dim: usize, input: i32, output: i32 },
    /// A computed byte offset falls outside the host buffer.
    #[error("byte offset {offset} is outside a {len}-byte host buffer")]
    OutOfRange { offset: usize, len: usize },
}

impl StageError {
    /// Nonzero status code reported for this error.
    pub fn status(&self) -> i32 {
        -1
    }
}

/// Error from [`IPipeline::realize`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealizeError<E> {
    /// The computation itself failed (bad output shape, extern stage refusal).
    #[error("pipeline failed with status {code}: {message}")]
    Failed { code: i32, message: String },
    /// The initialization sink rejected a notification.
    #[error("initialization sink aborted the pipeline: {0}")]
    Aborted(E),
}

impl<E> RealizeError<E> {
    /// Nonzero status code, as a C caller would have seen it.
    pub fn status(&self) -> i32 {
        match self {
            Self::Failed { code, .. } => *code,
            Self::Aborted(_) => -1,
        }
    }
}

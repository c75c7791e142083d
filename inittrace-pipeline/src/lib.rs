//! A reference pipeline for exercising initialization tracking.
//!
//! Two stages: an externally implemented pass-through copy ([`CopyStage`])
//! followed by an elementwise accumulation ([`AccumulatePipeline`]). While
//! running, the pipeline's runtime marks descriptors and buffer contents
//! initialized through an [`inittrace_runtime::IInitSink`].

mod annotate;
mod pipeline;
mod stage;

pub use annotate::{ByteRun, annotate_descriptor, annotate_view, contiguous_runs};
pub use pipeline::{AccumulatePipeline, BOUNDS_QUERY_ROUNDS};
pub use stage::CopyStage;

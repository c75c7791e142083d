use inittrace_runtime::{
    BufferDescriptor, IBoundsQuery, IErrorReporter, IExternStage, IInitSink, IPipeline,
    RealizeError, StageError, StridedView,
};
use tracing::{debug, trace};

use crate::annotate::{annotate_descriptor, annotate_view};
use crate::stage::CopyStage;

/// Bounds-query rounds against the extern stage: one for the pure definition
/// of the output, one for its accumulation update. Each round marks an input
/// and an output query descriptor initialized.
pub const BOUNDS_QUERY_ROUNDS: usize = 2;

const ELEM_SIZE: i32 = core::mem::size_of::<i32>() as i32;

/// The two-stage pipeline:
///
/// ```text
/// in(x, y, c)    = x + y + c
/// copy(x, y, c)  = extern copy of `in`
/// out(x, y, c)   = Σ_{i < taps} copy(i, y, c)
/// out(i, y, c)  += 1   for i < taps
/// out(x, i, c)  += 2   for i < taps
/// ```
#[derive(Debug, Clone)]
pub struct AccumulatePipeline<E = CopyStage> {
    stage: E,
    taps: i32,
    channels: i32,
}

impl AccumulatePipeline<CopyStage> {
    pub fn new() -> Self {
        Self::with_stage(CopyStage::default())
    }
}

impl Default for AccumulatePipeline<CopyStage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: IExternStage> AccumulatePipeline<E> {
    pub fn with_stage(stage: E) -> Self {
        Self {
            stage,
            taps: 4,
            channels: 3,
        }
    }

    /// The region every output must cover: the update stages write
    /// `x, y ∈ [0, taps)` across all channels.
    fn required_extent(&self) -> [i32; 3] {
        [self.taps, self.taps, self.channels]
    }

    fn check_output(&self, output: &StridedView<'_, i32>) -> Result<(), String> {
        if output.rank() != 3 {
            return Err(format!(
                "Output buffer output has rank {}, expected 3",
                output.rank()
            ));
        }
        for (d, required) in self.required_extent().into_iter().enumerate() {
            let dim = output.dim(d);
            if dim.min > 0 {
                return Err(format!(
                    "Output buffer output is accessed at 0, which is before the min ({}) in dimension {d}",
                    dim.min
                ));
            }
            if dim.min < 0 {
                return Err(format!(
                    "Output buffer output is accessed at {}, which is before the min (0) the pipeline can produce in dimension {d}",
                    dim.min
                ));
            }
            if dim.end() < required {
                return Err(format!(
                    "Output buffer output is accessed at {}, which is beyond the max ({}) in dimension {d}",
                    required - 1,
                    dim.end() - 1
                ));
            }
        }
        Ok(())
    }
}

fn fail<E>(reporter: &mut impl IErrorReporter, code: i32, message: String) -> RealizeError<E> {
    reporter.report(&message);
    RealizeError::Failed { code, message }
}

fn stage_failed<E>(reporter: &mut impl IErrorReporter, err: StageError) -> RealizeError<E> {
    fail(reporter, err.status(), err.to_string())
}

impl<E: IExternStage> IBoundsQuery for AccumulatePipeline<E> {
    fn query_bounds(&mut self, query: &mut BufferDescriptor) -> Result<(), StageError> {
        if query.has_host() {
            return Ok(());
        }
        for (d, extent) in self.required_extent().into_iter().enumerate() {
            query.extent[d] = extent;
            query.min[d] = 0;
        }
        query.elem_size = ELEM_SIZE;
        Ok(())
    }
}

impl<E: IExternStage> IPipeline for AccumulatePipeline<E> {
    fn bounds_inference_notifications(&self) -> u32 {
        2 * BOUNDS_QUERY_ROUNDS as u32
    }

    fn realize<S, R>(
        &mut self,
        output: &mut StridedView<'_, i32>,
        sink: &mut S,
        reporter: &mut R,
    ) -> Result<(), RealizeError<S::Error>>
    where
        S: IInitSink,
        R: IErrorReporter,
    {
        if let Err(message) = self.check_output(output) {
            return Err(fail(reporter, -1, message));
        }
        let intermediate_extent = [self.taps, output.dim(1).end(), output.dim(2).end()];

        debug!("running bounds inference");
        let mut input_query = BufferDescriptor::query(ELEM_SIZE);
        for round in 0..BOUNDS_QUERY_ROUNDS {
            let mut in_query = BufferDescriptor::query(ELEM_SIZE);
            let mut out_query = BufferDescriptor::query(ELEM_SIZE);
            out_query.extent[..3].copy_from_slice(&intermediate_extent);
            if let Err(err) = self.stage.query_bounds(&mut in_query) {
                return Err(stage_failed(reporter, err));
            }
            annotate_descriptor(&in_query, sink).map_err(RealizeError::Aborted)?;
            annotate_descriptor(&out_query, sink).map_err(RealizeError::Aborted)?;
            trace!(round, extent = ?&in_query.extent[..3], "bounds query answered");
            input_query = in_query;
        }

        for (d, &needed) in intermediate_extent.iter().enumerate() {
            let provided = input_query.min[d] + input_query.extent[d];
            if input_query.min[d] > 0 || provided < needed {
                return Err(fail(
                    reporter,
                    -1,
                    format!(
                        "Input buffer copy_stage.input is accessed at {}, which is beyond the max ({}) in dimension {d}",
                        needed - 1,
                        provided - 1
                    ),
                ));
            }
        }

        let mut producer = match StridedView::<i32>::dense(&input_query.extent[..3]) {
            Ok(view) => view,
            Err(err) => return Err(fail(reporter, -1, err.to_string())),
        };
        for idx in producer.indices() {
            producer.set(&idx, idx.iter().sum());
        }
        let mut intermediate = match StridedView::<i32>::dense(&intermediate_extent) {
            Ok(view) => view,
            Err(err) => return Err(fail(reporter, -1, err.to_string())),
        };

        let intermediate_desc = intermediate.descriptor();
        annotate_descriptor(&intermediate_desc, sink).map_err(RealizeError::Aborted)?;
        let output_desc = output.descriptor();
        annotate_descriptor(&output_desc, sink).map_err(RealizeError::Aborted)?;

        debug!("calling extern copy stage");
        let copied = {
            let src = producer.host_buffer();
            let mut dst = intermediate.host_buffer_mut();
            self.stage.copy(&src, &mut dst)
        };
        if let Err(err) = copied {
            return Err(stage_failed(reporter, err));
        }
        annotate_view(&intermediate, sink).map_err(RealizeError::Aborted)?;

        debug!("accumulating into output");
        let taps = self.taps;
        for idx in output.indices() {
            let (y, c) = (idx[1], idx[2]);
            let sum = (0..taps)
                .map(|i| intermediate.get(&[i, y, c]))
                .fold(0i32, i32::wrapping_add);
            output.set(&idx, sum);
        }
        let (xs, ys, cs) = (output.dim(0), output.dim(1), output.dim(2));
        for c in cs.min..cs.end() {
            for y in ys.min..ys.end() {
                for i in 0..taps {
                    let v = output.get(&[i, y, c]);
                    output.set(&[i, y, c], v.wrapping_add(1));
                }
            }
        }
        for c in cs.min..cs.end() {
            for x in xs.min..xs.end() {
                for i in 0..taps {
                    let v = output.get(&[x, i, c]);
                    output.set(&[x, i, c], v.wrapping_add(2));
                }
            }
        }

        let runs = annotate_view(output, sink).map_err(RealizeError::Aborted)?;
        debug!(runs, "output marked initialized");
        Ok(())
    }
}

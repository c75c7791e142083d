//! Marking buffers initialized.
//!
//! A descriptor is marked as one block. A buffer's contents are split into
//! maximal contiguous byte runs and marked run by run in increasing address
//! order, starting at the buffer's base, so padding between runs is never
//! claimed.

use bytemuck::Pod;
use inittrace_runtime::{BufferDescriptor, Dim, IInitSink, MAX_DIMS, StridedView};
use smallvec::SmallVec;
use tracing::trace;

/// A contiguous byte run relative to a buffer's base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRun {
    pub offset: usize,
    pub len: usize,
}

/// Split a strided layout into maximal contiguous byte runs, sorted by offset.
///
/// Dimensions are ordered by stride; the innermost ones are fused into a
/// single run as long as each stride equals the length covered so far.
/// Views with no elements produce no runs.
pub fn contiguous_runs(dims: &[Dim], elem_size: usize) -> Vec<ByteRun> {
    if dims.iter().any(|d| d.extent <= 0) || elem_size == 0 {
        return Vec::new();
    }

    // Extent-1 dimensions never move the address.
    let mut sorted: SmallVec<[Dim; MAX_DIMS]> =
        dims.iter().copied().filter(|d| d.extent > 1).collect();
    sorted.sort_by_key(|d| d.stride);

    let mut run_elems = 1usize;
    let mut outer = sorted.as_slice();
    while let Some((first, rest)) = outer.split_first() {
        if first.stride as usize != run_elems {
            break;
        }
        run_elems *= first.extent as usize;
        outer = rest;
    }

    let run_len = run_elems * elem_size;
    let mut runs = Vec::with_capacity(outer.iter().map(|d| d.extent as usize).product());
    let mut counter: SmallVec<[i32; MAX_DIMS]> = SmallVec::from_elem(0, outer.len());
    'next_run: loop {
        let offset: usize = outer
            .iter()
            .zip(&counter)
            .map(|(d, &i)| i as usize * d.stride as usize)
            .sum();
        runs.push(ByteRun {
            offset: offset * elem_size,
            len: run_len,
        });

        for (d, dim) in outer.iter().enumerate() {
            counter[d] += 1;
            if counter[d] < dim.extent {
                continue 'next_run;
            }
            counter[d] = 0;
        }
        break;
    }

    runs.sort_by_key(|r| r.offset);
    runs
}

/// Mark `desc` itself initialized.
pub fn annotate_descriptor<S: IInitSink>(
    desc: &BufferDescriptor,
    sink: &mut S,
) -> Result<(), S::Error> {
    let len = core::mem::size_of_val(desc) as u64;
    trace!(ptr = ?desc.as_ptr(), len, "descriptor initialized");
    sink.memory_is_initialized(desc.as_ptr(), len)
}

/// Mark the contents of `view` initialized, run by run. Returns the number
/// of runs emitted.
pub fn annotate_view<T: Pod, S: IInitSink>(
    view: &StridedView<'_, T>,
    sink: &mut S,
) -> Result<usize, S::Error> {
    let runs = contiguous_runs(view.dims(), view.elem_size());
    let base = view.base();
    for run in &runs {
        let ptr = base.wrapping_add(run.offset);
        trace!(?ptr, len = run.len, "contents initialized");
        sink.memory_is_initialized(ptr, run.len as u64)?;
    }
    Ok(runs.len())
}

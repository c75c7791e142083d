use inittrace_runtime::{
    BufferDescriptor, HostBuffer, HostBufferMut, IBoundsQuery, IExternStage, StageError,
};
use tracing::debug;

/// Extern stage that copies its input to its output, element by element.
///
/// During a bounds query it asks for an input of `extent` starting at the
/// origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyStage {
    pub extent: [i32; 3],
}

impl Default for CopyStage {
    fn default() -> Self {
        Self { extent: [4, 4, 3] }
    }
}

impl IBoundsQuery for CopyStage {
    fn query_bounds(&mut self, query: &mut BufferDescriptor) -> Result<(), StageError> {
        if query.has_host() {
            return Ok(());
        }
        for d in 0..3 {
            query.extent[d] = self.extent[d];
            query.min[d] = 0;
        }
        debug!(extent = ?self.extent, "copy stage answered bounds query");
        Ok(())
    }
}

impl IExternStage for CopyStage {
    fn copy(
        &mut self,
        input: &HostBuffer<'_>,
        output: &mut HostBufferMut<'_>,
    ) -> Result<(), StageError> {
        let Some(out_host) = output.host.as_deref_mut() else {
            return Err(StageError::MissingHost {
                stage: "copy_stage",
            });
        };
        let (inp, out) = (&input.desc, &output.desc);
        if inp.elem_size != out.elem_size {
            return Err(StageError::ElemSizeMismatch {
                input: inp.elem_size,
                output: out.elem_size,
            });
        }
        for d in 0..3 {
            if out.extent[d] < inp.extent[d] {
                return Err(StageError::ShapeMismatch {
                    dim: d,
                    input: inp.extent[d],
                    output: out.extent[d],
                });
            }
        }

        let elem = inp.elem_size.max(0) as usize;
        let offset = |desc: &BufferDescriptor, x: i32, y: i32, c: i32| {
            (x as i64 * desc.stride[0] as i64
                + y as i64 * desc.stride[1] as i64
                + c as i64 * desc.stride[2] as i64) as usize
                * elem
        };

        for c in 0..inp.extent[2] {
            for y in 0..inp.extent[1] {
                for x in 0..inp.extent[0] {
                    let src_off = offset(inp, x, y, c);
                    let dst_off = offset(out, x, y, c);
                    let src = input.host.get(src_off..src_off + elem).ok_or(
                        StageError::OutOfRange {
                            offset: src_off,
                            len: input.host.len(),
                        },
                    )?;
                    let dst_len = out_host.len();
                    let dst = out_host.get_mut(dst_off..dst_off + elem).ok_or(
                        StageError::OutOfRange {
                            offset: dst_off,
                            len: dst_len,
                        },
                    )?;
                    dst.copy_from_slice(src);
                }
            }
        }
        output.desc.host_dirty = true;
        Ok(())
    }
}

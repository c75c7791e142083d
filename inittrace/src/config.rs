use inittrace_runtime::descriptor_size;

use crate::verifier::ProtocolConfig;

/// Parameters of a scenario run.
///
/// `Default` gives the harness shape: a 4×4×3 array of `i32`, one element of
/// padding in the sparse layouts, a four-tap accumulation, and the
/// bounds-inference count taken from the pipeline under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub width: i32,
    pub height: i32,
    pub channels: i32,
    /// Padding elements inserted by the sparse layouts.
    pub pad: i32,
    /// Upstream samples summed per output element.
    pub taps: i32,
    /// Total added by the update stages to every output element.
    pub update_bias: i32,
    /// Descriptor-sized notifications expected during bounds inference.
    /// `None` uses the count the pipeline reports for its own topology.
    pub bounds_inference_count: Option<u32>,
    pub descriptor_size: u64,
    /// Output shape of the deliberately under-provisioned run.
    pub error_case_extent: [i32; 3],
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            width: 4,
            height: 4,
            channels: 3,
            pad: 1,
            taps: 4,
            update_bias: 3,
            bounds_inference_count: None,
            descriptor_size: descriptor_size() as u64,
            error_case_extent: [1, 1, 1],
        }
    }
}

impl ScenarioConfig {
    pub fn with_shape(mut self, width: i32, height: i32, channels: i32) -> Self {
        self.width = width;
        self.height = height;
        self.channels = channels;
        self
    }

    pub fn with_pad(mut self, pad: i32) -> Self {
        self.pad = pad;
        self
    }

    /// Override the pipeline's own bounds-inference count.
    pub fn with_bounds_inference_count(mut self, count: u32) -> Self {
        self.bounds_inference_count = Some(count);
        self
    }

    pub fn with_error_case_extent(mut self, extent: [i32; 3]) -> Self {
        self.error_case_extent = extent;
        self
    }

    /// Bytes per element; the pipeline produces `i32`.
    pub fn elem_size(&self) -> usize {
        core::mem::size_of::<i32>()
    }

    /// Size of the dense intermediate the extern stage produces. Negative
    /// extents count as empty; the product saturates.
    pub fn intermediate_bytes(&self) -> u64 {
        [self.width, self.height, self.channels]
            .into_iter()
            .map(|extent| u64::try_from(extent).unwrap_or(0))
            .fold(self.elem_size() as u64, u64::saturating_mul)
    }

    /// The protocol a pipeline reporting `topology_count` bounds-inference
    /// notifications must follow, unless this config overrides the count.
    pub fn protocol(&self, topology_count: u32) -> ProtocolConfig {
        ProtocolConfig {
            descriptor_size: self.descriptor_size,
            bounds_inference_count: self.bounds_inference_count.unwrap_or(topology_count),
            intermediate_bytes: self.intermediate_bytes(),
        }
    }

    /// The value every output element at `(_, y, c)` must hold:
    /// `update_bias + Σ_{i < taps} (i + y + c)`.
    pub fn expected_value(&self, y: i32, c: i32) -> i32 {
        (0..self.taps).fold(self.update_bias, |acc, i| {
            acc.wrapping_add(i).wrapping_add(y).wrapping_add(c)
        })
    }
}

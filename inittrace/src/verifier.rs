//! The annotation protocol verifier.
//!
//! A pipeline run must emit its notifications in this order:
//!
//! | Stage | Accepts | Advances |
//! |---|---|---|
//! | `ExpectBoundsInferenceBuffers` | descriptor-sized | after `bounds_inference_count` of them (skipped when that count is 0) |
//! | `ExpectIntermediateBufferMetadata` | descriptor-sized | at once |
//! | `ExpectOutputBufferMetadata` | descriptor-sized | at once |
//! | `ExpectIntermediateContents` | `intermediate_bytes` | at once |
//! | `ExpectOutputContents` | any length, first at the output base, then strictly increasing addresses | never |
//!
//! Any other notification is a [`ProtocolViolation`] and poisons the
//! verifier until the next [`AnnotationVerifier::reset`].

use core::fmt;
use core::fmt::Write as _;

use inittrace_runtime::IInitSink;
use tracing::{trace, warn};

/// Where the verifier is in the expected notification sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotateStage {
    ExpectBoundsInferenceBuffers,
    ExpectIntermediateBufferMetadata,
    ExpectOutputBufferMetadata,
    ExpectIntermediateContents,
    ExpectOutputContents,
}

impl AnnotateStage {
    /// Position in the sequence, starting at 0.
    pub const fn index(self) -> u8 {
        match self {
            AnnotateStage::ExpectBoundsInferenceBuffers => 0,
            AnnotateStage::ExpectIntermediateBufferMetadata => 1,
            AnnotateStage::ExpectOutputBufferMetadata => 2,
            AnnotateStage::ExpectIntermediateContents => 3,
            AnnotateStage::ExpectOutputContents => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AnnotateStage::ExpectBoundsInferenceBuffers => "bounds-inference buffers",
            AnnotateStage::ExpectIntermediateBufferMetadata => "intermediate buffer metadata",
            AnnotateStage::ExpectOutputBufferMetadata => "output buffer metadata",
            AnnotateStage::ExpectIntermediateContents => "intermediate contents",
            AnnotateStage::ExpectOutputContents => "output contents",
        }
    }
}

impl fmt::Display for AnnotateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The sizes and counts a run is checked against. The bounds-inference
/// count depends on the pipeline topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub descriptor_size: u64,
    pub bounds_inference_count: u32,
    pub intermediate_bytes: u64,
}

/// A notification that broke the expected sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("{stage}: expected {expected} bytes, saw {actual}")]
    WrongLength {
        stage: AnnotateStage,
        expected: u64,
        actual: u64,
    },
    #[error("{stage}: output contents were already observed at {previous:#x}")]
    OutputAlreadyObserved { stage: AnnotateStage, previous: usize },
    #[error("expected output contents at base {expected:#x} but saw {actual:#x}")]
    OutputBaseMismatch { expected: usize, actual: usize },
    #[error("expected monotonic increase but saw {previous:#x} -> {actual:#x}")]
    NonMonotonic { previous: usize, actual: usize },
    #[error("verifier is poisoned by an earlier violation")]
    Poisoned,
}

impl ProtocolViolation {
    /// The stage the offending notification arrived in, when known.
    pub fn stage(&self) -> Option<AnnotateStage> {
        match self {
            Self::WrongLength { stage, .. } | Self::OutputAlreadyObserved { stage, .. } => {
                Some(*stage)
            }
            Self::OutputBaseMismatch { .. } | Self::NonMonotonic { .. } => {
                Some(AnnotateStage::ExpectOutputContents)
            }
            Self::Poisoned => None,
        }
    }
}

/// An accepted notification and the stage that accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observed {
    pub stage: AnnotateStage,
    pub ptr: *const u8,
    pub len: u64,
}

/// State machine over the notification stream of one pipeline run.
#[derive(Debug)]
pub struct AnnotationVerifier {
    config: ProtocolConfig,
    stage: AnnotateStage,
    bounds_inference_count: u32,
    output_base: *const u8,
    output_previous: Option<*const u8>,
    history: Vec<Observed>,
    poisoned: bool,
}

impl AnnotationVerifier {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            stage: Self::initial_stage(&config),
            config,
            bounds_inference_count: 0,
            output_base: core::ptr::null(),
            output_previous: None,
            history: Vec::new(),
            poisoned: false,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// A pipeline without bounds queries starts at the intermediate metadata.
    fn initial_stage(config: &ProtocolConfig) -> AnnotateStage {
        if config.bounds_inference_count == 0 {
            AnnotateStage::ExpectIntermediateBufferMetadata
        } else {
            AnnotateStage::ExpectBoundsInferenceBuffers
        }
    }

    /// Start over for a run whose output begins at `output_base`.
    pub fn reset(&mut self, output_base: *const u8) {
        self.stage = Self::initial_stage(&self.config);
        self.bounds_inference_count = 0;
        self.output_base = output_base;
        self.output_previous = None;
        self.history.clear();
        self.poisoned = false;
    }

    /// True once a notification has been accepted in the output-contents stage.
    pub fn reached_output_contents(&self) -> bool {
        self.output_previous.is_some()
    }

    pub fn stage(&self) -> AnnotateStage {
        self.stage
    }

    pub fn bounds_inference_count(&self) -> u32 {
        self.bounds_inference_count
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Every accepted notification since the last reset, in arrival order.
    pub fn history(&self) -> &[Observed] {
        &self.history
    }

    /// Accepted output-contents notifications.
    pub fn output_annotations(&self) -> impl Iterator<Item = &Observed> + '_ {
        self.history
            .iter()
            .filter(|o| o.stage == AnnotateStage::ExpectOutputContents)
    }

    /// Consume one notification.
    pub fn observe(&mut self, ptr: *const u8, len: u64) -> Result<(), ProtocolViolation> {
        trace!(stage = self.stage.index(), ?ptr, len, "annotate");
        if self.poisoned {
            return Err(ProtocolViolation::Poisoned);
        }
        let stage = self.stage;
        if let Err(violation) = self.step(ptr, len) {
            warn!(%stage, %violation, "annotation protocol violated");
            self.poisoned = true;
            return Err(violation);
        }
        self.history.push(Observed { stage, ptr, len });
        Ok(())
    }

    fn step(&mut self, ptr: *const u8, len: u64) -> Result<(), ProtocolViolation> {
        match self.stage {
            AnnotateStage::ExpectBoundsInferenceBuffers => {
                self.expect_len(self.config.descriptor_size, len)?;
                self.bounds_inference_count += 1;
                if self.bounds_inference_count == self.config.bounds_inference_count {
                    self.stage = AnnotateStage::ExpectIntermediateBufferMetadata;
                }
            }
            AnnotateStage::ExpectIntermediateBufferMetadata => {
                self.expect_len(self.config.descriptor_size, len)?;
                self.stage = AnnotateStage::ExpectOutputBufferMetadata;
            }
            AnnotateStage::ExpectOutputBufferMetadata => {
                self.expect_len(self.config.descriptor_size, len)?;
                self.stage = AnnotateStage::ExpectIntermediateContents;
            }
            AnnotateStage::ExpectIntermediateContents => {
                self.expect_len(self.config.intermediate_bytes, len)?;
                self.stage = AnnotateStage::ExpectOutputContents;
            }
            AnnotateStage::ExpectOutputContents => {
                match self.output_previous {
                    None if ptr != self.output_base => {
                        return Err(ProtocolViolation::OutputBaseMismatch {
                            expected: self.output_base.addr(),
                            actual: ptr.addr(),
                        });
                    }
                    Some(previous) if ptr <= previous => {
                        return Err(ProtocolViolation::NonMonotonic {
                            previous: previous.addr(),
                            actual: ptr.addr(),
                        });
                    }
                    _ => {}
                }
                self.output_previous = Some(ptr);
            }
        }
        Ok(())
    }

    /// Checks shared by every stage before output contents: output contents
    /// must not have been seen yet and the length must match.
    fn expect_len(&self, expected: u64, actual: u64) -> Result<(), ProtocolViolation> {
        if let Some(previous) = self.output_previous {
            return Err(ProtocolViolation::OutputAlreadyObserved {
                stage: self.stage,
                previous: previous.addr(),
            });
        }
        if actual != expected {
            return Err(ProtocolViolation::WrongLength {
                stage: self.stage,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// One line per accepted notification: `stage:location:len`, where the
    /// location is the offset from the output base for output contents and
    /// `-` otherwise.
    pub fn render_trace(&self) -> String {
        let mut out = String::new();
        for o in &self.history {
            let _ = write!(&mut out, "{}:", o.stage.index());
            if o.stage == AnnotateStage::ExpectOutputContents {
                let _ = write!(
                    &mut out,
                    "base+{}",
                    o.ptr.addr().wrapping_sub(self.output_base.addr())
                );
            } else {
                out.push('-');
            }
            let _ = writeln!(&mut out, ":{}", o.len);
        }
        out
    }
}

impl IInitSink for AnnotationVerifier {
    type Error = ProtocolViolation;

    fn memory_is_initialized(&mut self, ptr: *const u8, len: u64) -> Result<(), ProtocolViolation> {
        self.observe(ptr, len)
    }
}

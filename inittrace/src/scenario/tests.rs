use super::*;
use crate::verifier::{AnnotateStage, ProtocolViolation};
use crate::ledger::LedgerError;
use inittrace_pipeline::{AccumulatePipeline, annotate_view};
use inittrace_runtime::record::{RecordingReporter, RecordingSink};
use inittrace_runtime::{DESCRIPTOR_SIZE, IInitSink, StageError, ViewError};
use insta::assert_snapshot;

fn driver() -> ScenarioDriver<AccumulatePipeline, RecordingReporter> {
    ScenarioDriver::with_reporter(
        AccumulatePipeline::new(),
        ScenarioConfig::default(),
        RecordingReporter::new(),
    )
}

#[test]
fn every_layout_passes() {
    let mut driver = driver();
    let reports = driver.run_all().unwrap();
    assert_eq!(reports.len(), 5);

    let runs: Vec<(Option<LayoutKind>, usize)> =
        reports.iter().map(|r| (r.layout, r.output_runs)).collect();
    assert_eq!(
        runs,
        [
            (Some(LayoutKind::Interleaved), 1),
            (Some(LayoutKind::SparseChunky), 4),
            (Some(LayoutKind::Planar), 1),
            (Some(LayoutKind::SparsePlanar), 12),
            (None, 0),
        ]
    );
    for report in &reports[..4] {
        assert_eq!(report.status, 0);
        // 3 + Σ_{i<4}(i + y + c) summed over 4×4×3
        assert_eq!(report.checksum, 912, "{report}");
        assert_eq!(report.notifications, 7 + report.output_runs);
    }
    // Only the error case reported anything.
    assert_eq!(driver.reporter().messages().len(), 1);
}

#[test]
fn sparse_padding_is_never_annotated() {
    let mut driver = driver();
    let chunky = driver.run(LayoutKind::SparseChunky).unwrap();
    let planar = driver.run(LayoutKind::SparsePlanar).unwrap();

    let chunky = chunky.coverage.unwrap();
    assert_eq!(chunky.elements, 48);
    assert_eq!(chunky.initialized_bytes, 192);
    assert_eq!(chunky.padding_elements, 4);
    assert_eq!(planar.coverage.unwrap().padding_elements, 12);
}

#[test]
fn interleaved_trace() {
    let mut driver = driver();
    driver.run(LayoutKind::Interleaved).unwrap();
    assert_eq!(driver.verifier().stage(), AnnotateStage::ExpectOutputContents);
    assert_snapshot!(driver.verifier().render_trace().trim_end(), @r"
    0:-:72
    0:-:72
    0:-:72
    0:-:72
    1:-:72
    2:-:72
    3:-:192
    4:base+0:192
    ");
}

#[test]
fn error_case_fails_without_notifications() {
    let mut driver = driver();
    let report = driver.run_error_case().unwrap();
    assert_ne!(report.status, 0);
    assert_eq!(report.notifications, 0);
    assert!(!driver.verifier().reached_output_contents());
    assert_eq!(
        driver.verifier().stage(),
        AnnotateStage::ExpectBoundsInferenceBuffers
    );

    let messages = driver.reporter().messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("beyond the max"), "{}", messages[0]);
}

#[test]
fn shape_smaller_than_bounds_is_rejected() {
    let mut driver = ScenarioDriver::new(
        AccumulatePipeline::new(),
        ScenarioConfig::default().with_shape(2, 2, 3),
    );
    let err = driver.run(LayoutKind::Planar).unwrap_err();
    assert_eq!(
        err,
        ScenarioError::ShapeTooSmall {
            required: [4, 4, 3],
            actual: [2, 2, 3],
        }
    );
    assert!(!err.is_protocol_violation());
}

#[test]
fn miscounted_bounds_inference_is_a_violation() {
    let mut driver = ScenarioDriver::new(
        AccumulatePipeline::new(),
        ScenarioConfig::default().with_bounds_inference_count(2),
    );
    let err = driver.run(LayoutKind::Interleaved).unwrap_err();
    assert!(err.is_protocol_violation());
    assert_eq!(
        err,
        ScenarioError::Protocol(ProtocolViolation::WrongLength {
            stage: AnnotateStage::ExpectIntermediateContents,
            expected: 192,
            actual: DESCRIPTOR_SIZE as u64,
        })
    );
    assert!(driver.verifier().is_poisoned());
}

#[test]
fn negative_padding_fails_before_running() {
    let mut driver = ScenarioDriver::with_reporter(
        AccumulatePipeline::new(),
        ScenarioConfig::default().with_pad(-3),
        RecordingReporter::new(),
    );
    let err = driver.run(LayoutKind::SparseChunky).unwrap_err();
    assert_eq!(err, ScenarioError::Layout(ViewError::NegativePadding { pad: -3 }));
    assert!(driver.verifier().history().is_empty());
}

#[test]
fn recorded_run_replays_into_verifier() {
    let config = ScenarioConfig::default();
    let factory = LayoutFactory::new(&config);
    let mut storage = factory.allocate(LayoutKind::SparsePlanar).unwrap();
    let mut view = factory.build_in(LayoutKind::SparsePlanar, &mut storage).unwrap();
    let mut sink = RecordingSink::new();
    let mut pipeline = AccumulatePipeline::new();
    pipeline
        .realize(&mut view, &mut sink, &mut RecordingReporter::new())
        .unwrap();

    let protocol = config.protocol(pipeline.bounds_inference_notifications());
    let mut verifier = AnnotationVerifier::new(protocol);
    verifier.reset(view.base());
    sink.replay(&mut verifier).unwrap();
    assert_eq!(verifier.output_annotations().count(), 12);

    // Replaying against the wrong base fails on the first output run.
    verifier.reset(view.base().wrapping_add(4));
    assert!(matches!(
        sink.replay(&mut verifier),
        Err(ProtocolViolation::OutputBaseMismatch { .. })
    ));
}

// Scripted pipelines standing in for a misbehaving runtime.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Faithful,
    OutputBeforeIntermediate,
    HalfOutput,
    WrongValues,
    FailAfterOutput,
    RefuseBounds,
}

struct Scripted {
    script: Script,
    config: ScenarioConfig,
    /// Bounds-query descriptors emitted before the intermediate ones.
    queries: u32,
}

impl Scripted {
    fn new(script: Script) -> Self {
        Self {
            script,
            config: ScenarioConfig::default(),
            queries: 4,
        }
    }

    fn with_queries(mut self, queries: u32) -> Self {
        self.queries = queries;
        self
    }

    fn descriptors<S: IInitSink>(
        output: &StridedView<'_, i32>,
        sink: &mut S,
        count: u32,
    ) -> Result<(), S::Error> {
        let desc = output.descriptor();
        for _ in 0..count {
            sink.memory_is_initialized(desc.as_ptr(), DESCRIPTOR_SIZE as u64)?;
        }
        Ok(())
    }
}

impl IBoundsQuery for Scripted {
    fn query_bounds(&mut self, query: &mut BufferDescriptor) -> Result<(), StageError> {
        if self.script == Script::RefuseBounds {
            return Err(StageError::MissingHost { stage: "scripted" });
        }
        query.extent[..3].copy_from_slice(&[4, 4, 3]);
        Ok(())
    }
}

impl IPipeline for Scripted {
    fn bounds_inference_notifications(&self) -> u32 {
        self.queries
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
        for idx in output.indices() {
            let value = match self.script {
                Script::WrongValues => 0,
                _ => self.config.expected_value(idx[1], idx[2]),
            };
            output.set(&idx, value);
        }

        Self::descriptors(output, sink, self.queries).map_err(RealizeError::Aborted)?;
        if self.script == Script::OutputBeforeIntermediate {
            annotate_view(output, sink).map_err(RealizeError::Aborted)?;
        }
        Self::descriptors(output, sink, 2).map_err(RealizeError::Aborted)?;
        let scratch = [0u8; 192];
        sink.memory_is_initialized(scratch.as_ptr(), 192)
            .map_err(RealizeError::Aborted)?;

        if self.script == Script::HalfOutput {
            let half = (output.capacity_bytes() / 2) as u64;
            sink.memory_is_initialized(output.base(), half)
                .map_err(RealizeError::Aborted)?;
        } else {
            annotate_view(output, sink).map_err(RealizeError::Aborted)?;
        }

        if self.script == Script::FailAfterOutput {
            let message = "failed after marking output".to_owned();
            reporter.report(&message);
            return Err(RealizeError::Failed { code: -1, message });
        }
        Ok(())
    }
}

fn scripted(script: Script) -> ScenarioDriver<Scripted, RecordingReporter> {
    ScenarioDriver::with_reporter(
        Scripted::new(script),
        ScenarioConfig::default(),
        RecordingReporter::new(),
    )
}

#[test]
fn scripted_faithful_pipeline_passes() {
    let reports = scripted(Script::Faithful)
        .run_selected(&LayoutKind::ALL, false)
        .unwrap();
    assert_eq!(reports.len(), 4);
}

#[test]
fn bounds_query_count_comes_from_the_pipeline() {
    for queries in [0, 2, 6] {
        let mut driver = ScenarioDriver::with_reporter(
            Scripted::new(Script::Faithful).with_queries(queries),
            ScenarioConfig::default(),
            RecordingReporter::new(),
        );
        let reports = driver.run_selected(&LayoutKind::ALL, false).unwrap();
        assert_eq!(reports.len(), 4, "{queries} queries");
        assert_eq!(driver.verifier().bounds_inference_count(), queries);
        assert_eq!(reports[0].notifications, queries as usize + 3 + 1);
    }
}

#[test]
fn configured_count_overrides_the_pipeline() {
    let mut driver = ScenarioDriver::with_reporter(
        Scripted::new(Script::Faithful).with_queries(2),
        ScenarioConfig::default().with_bounds_inference_count(4),
        RecordingReporter::new(),
    );
    let err = driver.run(LayoutKind::Interleaved).unwrap_err();
    assert_eq!(
        err,
        ScenarioError::Protocol(ProtocolViolation::WrongLength {
            stage: AnnotateStage::ExpectBoundsInferenceBuffers,
            expected: DESCRIPTOR_SIZE as u64,
            actual: 192,
        })
    );
}

#[test]
fn output_before_intermediate_is_a_violation() {
    let err = scripted(Script::OutputBeforeIntermediate)
        .run(LayoutKind::Planar)
        .unwrap_err();
    assert!(err.is_protocol_violation());
    assert!(matches!(
        err,
        ScenarioError::Protocol(ProtocolViolation::WrongLength {
            stage: AnnotateStage::ExpectIntermediateBufferMetadata,
            ..
        })
    ));
}

#[test]
fn partial_output_annotation_is_uncovered() {
    let err = scripted(Script::HalfOutput)
        .run(LayoutKind::Interleaved)
        .unwrap_err();
    assert!(err.is_protocol_violation());
    assert!(matches!(
        err,
        ScenarioError::Ledger(LedgerError::Uncovered { .. })
    ));
}

#[test]
fn half_of_sparse_allocation_is_rejected() {
    // 104 bytes of sparse chunky storage: rows 0 and 1, the padding between
    // them and the start of row 2.
    let err = scripted(Script::HalfOutput)
        .run(LayoutKind::SparseChunky)
        .unwrap_err();
    assert!(matches!(err, ScenarioError::Ledger(_)));
}

#[test]
fn wrong_values_are_not_a_protocol_violation() {
    let err = scripted(Script::WrongValues)
        .run(LayoutKind::SparsePlanar)
        .unwrap_err();
    assert!(!err.is_protocol_violation());
    assert!(matches!(
        err,
        ScenarioError::ValueMismatch {
            layout: LayoutKind::SparsePlanar,
            expected: 9,
            actual: 0,
            x: 0,
            y: 0,
            c: 0,
        }
    ));
}

#[test]
fn error_case_that_succeeds_is_reported() {
    let err = scripted(Script::Faithful).run_error_case().unwrap_err();
    assert_eq!(err, ScenarioError::UnexpectedSuccess);
}

#[test]
fn error_case_that_annotates_output_is_reported() {
    let mut driver = scripted(Script::FailAfterOutput);
    let err = driver.run_error_case().unwrap_err();
    assert_eq!(err, ScenarioError::UnexpectedAnnotations);
    assert_eq!(driver.reporter().messages().len(), 1);
}

#[test]
fn failure_on_a_layout_is_unexpected() {
    let err = scripted(Script::FailAfterOutput)
        .run(LayoutKind::Planar)
        .unwrap_err();
    assert!(matches!(
        err,
        ScenarioError::UnexpectedFailure {
            layout: LayoutKind::Planar,
            code: -1,
            ..
        }
    ));
}

#[test]
fn refused_bounds_query_stops_before_running() {
    let mut driver = scripted(Script::RefuseBounds);
    let err = driver.run(LayoutKind::Planar).unwrap_err();
    assert!(matches!(err, ScenarioError::BoundsQuery(_)));
    assert!(driver.verifier().history().is_empty());
}

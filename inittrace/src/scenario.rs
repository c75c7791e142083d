//! Runs the pipeline against every layout and judges each run.

use core::fmt;

use inittrace_runtime::live::TracingReporter;
use inittrace_runtime::{BufferDescriptor, IBoundsQuery, IErrorReporter, IPipeline, RealizeError, StridedView};
use tracing::{debug, info};

use crate::config::ScenarioConfig;
use crate::errors::ScenarioError;
use crate::layout::{LayoutFactory, LayoutKind};
use crate::ledger::{Coverage, InitLedger};
use crate::verifier::AnnotationVerifier;

#[cfg(test)]
mod tests;

/// Outcome of one passing scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// `None` for the error case.
    pub layout: Option<LayoutKind>,
    /// Pipeline status: 0 on success, the failure code for the error case.
    pub status: i32,
    /// Notifications the verifier accepted.
    pub notifications: usize,
    /// Of those, how many marked output contents.
    pub output_runs: usize,
    /// Sum of all verified output values.
    pub checksum: i64,
    pub coverage: Option<Coverage>,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layout {
            Some(kind) => write!(
                f,
                "{kind}: {} notifications, {} output runs, checksum {}",
                self.notifications, self.output_runs, self.checksum
            ),
            None => write!(
                f,
                "error case: status {}, {} notifications",
                self.status, self.notifications
            ),
        }
    }
}

/// Owns the verifier and the pipeline under test.
///
/// The pipeline is reached only through its two capabilities: it answers
/// bounds queries ([`IBoundsQuery`]) and runs against an output view while
/// notifying a sink ([`IPipeline`]).
pub struct ScenarioDriver<P, R = TracingReporter> {
    pipeline: P,
    reporter: R,
    config: ScenarioConfig,
    factory: LayoutFactory,
    verifier: AnnotationVerifier,
}

impl<P> ScenarioDriver<P, TracingReporter>
where
    P: IPipeline + IBoundsQuery,
{
    pub fn new(pipeline: P, config: ScenarioConfig) -> Self {
        Self::with_reporter(pipeline, config, TracingReporter::new())
    }
}

impl<P, R> ScenarioDriver<P, R>
where
    P: IPipeline + IBoundsQuery,
    R: IErrorReporter,
{
    pub fn with_reporter(pipeline: P, config: ScenarioConfig, reporter: R) -> Self {
        let protocol = config.protocol(pipeline.bounds_inference_notifications());
        Self {
            factory: LayoutFactory::new(&config),
            verifier: AnnotationVerifier::new(protocol),
            pipeline,
            reporter,
            config,
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// The verifier as left by the last run.
    pub fn verifier(&self) -> &AnnotationVerifier {
        &self.verifier
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Every layout, then the error case.
    pub fn run_all(&mut self) -> Result<Vec<ScenarioReport>, ScenarioError> {
        self.run_selected(&LayoutKind::ALL, true)
    }

    /// Stops at the first failing scenario.
    pub fn run_selected(
        &mut self,
        kinds: &[LayoutKind],
        error_case: bool,
    ) -> Result<Vec<ScenarioReport>, ScenarioError> {
        let mut reports = Vec::with_capacity(kinds.len() + 1);
        for &kind in kinds {
            reports.push(self.run(kind)?);
        }
        if error_case {
            reports.push(self.run_error_case()?);
        }
        Ok(reports)
    }

    pub fn run(&mut self, kind: LayoutKind) -> Result<ScenarioReport, ScenarioError> {
        info!("Testing {kind}...");
        self.check_bounds()?;

        if kind.is_sparse() {
            let mut storage = self.factory.allocate(kind)?;
            let mut view = self.factory.build_in(kind, &mut storage)?;
            self.execute(kind, &mut view)
        } else {
            let mut view = self.factory.build(kind)?;
            self.execute(kind, &mut view)
        }
    }

    /// Runs against an output too small for the pipeline. The pipeline must
    /// fail and must not have marked any output contents initialized.
    pub fn run_error_case(&mut self) -> Result<ScenarioReport, ScenarioError> {
        info!("Testing error case...");
        let mut view = StridedView::<i32>::dense(&self.config.error_case_extent)?;
        self.verifier.reset(view.base());

        match self
            .pipeline
            .realize(&mut view, &mut self.verifier, &mut self.reporter)
        {
            Ok(()) => Err(ScenarioError::UnexpectedSuccess),
            Err(RealizeError::Aborted(violation)) => Err(violation.into()),
            Err(RealizeError::Failed { code, .. }) => {
                if self.verifier.reached_output_contents() {
                    return Err(ScenarioError::UnexpectedAnnotations);
                }
                debug!(code, "pipeline failed as expected");
                Ok(ScenarioReport {
                    layout: None,
                    status: code,
                    notifications: self.verifier.history().len(),
                    output_runs: 0,
                    checksum: 0,
                    coverage: None,
                })
            }
        }
    }

    /// The configured logical shape must cover what the pipeline produces.
    fn check_bounds(&mut self) -> Result<(), ScenarioError> {
        let mut query = BufferDescriptor::query(self.config.elem_size() as i32);
        self.pipeline
            .query_bounds(&mut query)
            .map_err(ScenarioError::BoundsQuery)?;

        let actual = self.factory.extent();
        let required: [i32; 3] = core::array::from_fn(|d| query.min[d] + query.extent[d]);
        if actual.iter().zip(&required).any(|(a, r)| a < r) {
            return Err(ScenarioError::ShapeTooSmall { required, actual });
        }
        Ok(())
    }

    fn execute(
        &mut self,
        kind: LayoutKind,
        view: &mut StridedView<'_, i32>,
    ) -> Result<ScenarioReport, ScenarioError> {
        self.verifier.reset(view.base());

        match self
            .pipeline
            .realize(view, &mut self.verifier, &mut self.reporter)
        {
            Ok(()) => {}
            Err(RealizeError::Aborted(violation)) => return Err(violation.into()),
            Err(RealizeError::Failed { code, message }) => {
                return Err(ScenarioError::UnexpectedFailure {
                    layout: kind,
                    code,
                    message,
                });
            }
        }
        if !self.verifier.reached_output_contents() {
            return Err(ScenarioError::MissingAnnotations { layout: kind });
        }

        let mut ledger = InitLedger::for_view(view)?;
        ledger.record_all(self.verifier.output_annotations())?;
        let coverage = ledger.check_view(view)?;

        let mut checksum = 0i64;
        let mut mismatch = None;
        let config = &self.config;
        view.for_each_element(|idx| {
            if mismatch.is_some() {
                return;
            }
            let (x, y, c) = (idx[0], idx[1], idx[2]);
            let expected = config.expected_value(y, c);
            let actual = view.get(idx);
            if actual != expected {
                mismatch = Some(ScenarioError::ValueMismatch {
                    layout: kind,
                    x,
                    y,
                    c,
                    expected,
                    actual,
                });
            }
            checksum += i64::from(actual);
        });
        if let Some(err) = mismatch {
            return Err(err);
        }

        let report = ScenarioReport {
            layout: Some(kind),
            status: 0,
            notifications: self.verifier.history().len(),
            output_runs: self.verifier.output_annotations().count(),
            checksum,
            coverage: Some(coverage),
        };
        debug!(%report, "scenario passed");
        Ok(report)
    }
}

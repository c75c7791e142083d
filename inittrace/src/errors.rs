use inittrace_runtime::{StageError, ViewError};

use crate::layout::LayoutKind;
use crate::ledger::LedgerError;
use crate::verifier::ProtocolViolation;

/// Why a scenario did not pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    #[error("annotation protocol violated: {0}")]
    Protocol(ProtocolViolation),
    #[error("{layout}: pipeline failed with status {code}: {message}")]
    UnexpectedFailure {
        layout: LayoutKind,
        code: i32,
        message: String,
    },
    #[error("expected the undersized output to fail, but the pipeline succeeded")]
    UnexpectedSuccess,
    #[error("{layout}: pipeline never annotated its output contents")]
    MissingAnnotations { layout: LayoutKind },
    #[error("undersized output was annotated before the pipeline failed")]
    UnexpectedAnnotations,
    #[error("{layout}: out({x}, {y}, {c}) = {actual}, expected {expected}")]
    ValueMismatch {
        layout: LayoutKind,
        x: i32,
        y: i32,
        c: i32,
        expected: i32,
        actual: i32,
    },
    #[error("bounds query failed: {0}")]
    BoundsQuery(StageError),
    #[error("pipeline needs an output of at least {required:?}, configured shape is {actual:?}")]
    ShapeTooSmall { required: [i32; 3], actual: [i32; 3] },
    #[error(transparent)]
    Layout(#[from] ViewError),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

impl ScenarioError {
    /// True when the pipeline broke the annotation protocol, as opposed to
    /// producing wrong values or failing outright.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, ScenarioError::Protocol(_) | ScenarioError::Ledger(_))
    }
}

impl From<ProtocolViolation> for ScenarioError {
    fn from(violation: ProtocolViolation) -> Self {
        ScenarioError::Protocol(violation)
    }
}

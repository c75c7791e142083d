//! # inittrace
//!
//! Checks that a pipeline's initialization notifications describe, region by
//! region, exactly what it wrote, whatever the physical layout of its output.
//!
//! ## Pieces
//!
//! 1. **Layouts** - [`LayoutFactory`] builds planar, interleaved and padded
//!    views of the same logical array
//! 2. **Verifier** - [`AnnotationVerifier`] consumes the ordered notification
//!    stream and checks it against the expected stage sequence
//! 3. **Ledger** - [`InitLedger`] checks every output element was claimed and
//!    no padding was
//! 4. **Driver** - [`ScenarioDriver`] runs the pipeline once per layout and
//!    judges the result

#![cfg_attr(kani, feature(stmt_expr_attributes))]
#![cfg_attr(kani, feature(proc_macro_hygiene))]

// Important rule: we do not declare all modules as pub, we will be very intentional
// about what our public interface is.
mod config;
mod errors;
mod layout;
mod ledger;
mod scenario;
mod verifier;

#[cfg(kani)]
mod proofs;

pub use inittrace_runtime as runtime;

pub use config::ScenarioConfig;
pub use errors::ScenarioError;
pub use layout::{LayoutFactory, LayoutKind, ParseLayoutError};
pub use ledger::{Coverage, InitLedger, LedgerError};
pub use scenario::{ScenarioDriver, ScenarioReport};
pub use verifier::{AnnotateStage, AnnotationVerifier, Observed, ProtocolConfig, ProtocolViolation};

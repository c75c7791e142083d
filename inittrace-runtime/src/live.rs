//! Live implementations of the runtime's side channels: nothing is checked,
//! everything goes to `tracing`.

use core::convert::Infallible;

use tracing::{trace, warn};

use crate::{IErrorReporter, IInitSink};

/// Reports pipeline errors as `warn` events and carries on.
#[derive(Debug, Default)]
pub struct TracingReporter {
    reported: usize,
    last: Option<String>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages reported so far.
    pub fn reported(&self) -> usize {
        self.reported
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

impl IErrorReporter for TracingReporter {
    fn report(&mut self, message: &str) {
        warn!("Saw error: {message}");
        self.reported += 1;
        self.last = Some(message.to_owned());
    }
}

/// Accepts every notification, logging it at `trace` level.
#[derive(Debug, Default)]
pub struct TracingSink {
    seen: usize,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> usize {
        self.seen
    }
}

impl IInitSink for TracingSink {
    type Error = Infallible;

    fn memory_is_initialized(&mut self, ptr: *const u8, len: u64) -> Result<(), Infallible> {
        trace!(?ptr, len, "memory initialized");
        self.seen += 1;
        Ok(())
    }
}

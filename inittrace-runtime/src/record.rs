//! Recording implementations of the runtime's side channels, for tests and
//! for replaying a run after the fact.

use core::convert::Infallible;

use crate::{IErrorReporter, IInitSink};

/// One initialization notification, as emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub ptr: *const u8,
    pub len: u64,
}

/// Records every notification in order and accepts all of them.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notifications: Vec<Notification>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Feed the recorded notifications, in order, into another sink.
    pub fn replay<S: IInitSink>(&self, sink: &mut S) -> Result<(), S::Error> {
        for n in &self.notifications {
            sink.memory_is_initialized(n.ptr, n.len)?;
        }
        Ok(())
    }
}

impl IInitSink for RecordingSink {
    type Error = Infallible;

    fn memory_is_initialized(&mut self, ptr: *const u8, len: u64) -> Result<(), Infallible> {
        self.notifications.push(Notification { ptr, len });
        Ok(())
    }
}

/// Collects reported error messages.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: Vec<String>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl IErrorReporter for RecordingReporter {
    fn report(&mut self, message: &str) {
        self.messages.push(message.to_owned());
    }
}

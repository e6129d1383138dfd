//! Record status and error accumulation.
//!
//! # State Transitions
//! ```text
//! enabled → warning:  non-critical error
//! enabled → disabled: critical error
//! warning → disabled: critical error
//! disabled → *:       never (until the next generation)
//! ```

use serde::Serialize;

/// Health of a configuration record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Enabled,
    Disabled,
    Warning,
}

/// Errors and status carried by every record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordState {
    status: Status,
    errors: Vec<String>,
}

impl RecordState {
    pub fn status(&self) -> Status {
        self.status
    }

    /// Distinct error messages in insertion order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Record an error. Repeated messages are ignored, status only ever worsens.
    pub fn add_error(&mut self, message: impl Into<String>, critical: bool) {
        let message = message.into();
        if self.errors.contains(&message) {
            return;
        }
        self.errors.push(message);

        if critical {
            self.status = Status::Disabled;
        } else if self.status != Status::Disabled {
            self.status = Status::Warning;
        }
    }
}

/// Access to the [`RecordState`] of a router, service or middleware record.
pub trait StatusRecord {
    fn state(&self) -> &RecordState;

    fn state_mut(&mut self) -> &mut RecordState;

    fn status(&self) -> Status {
        self.state().status()
    }

    fn errors(&self) -> &[String] {
        self.state().errors()
    }

    fn add_error(&mut self, message: impl Into<String>, critical: bool) {
        self.state_mut().add_error(message, critical);
    }
}

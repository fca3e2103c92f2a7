//! Error, warning and breakpoint reports as the console shows them.

use std::fmt;

use crate::basic_io::{CursorHint, OutputSink};
use crate::basic_types::{BasicError, BasicWarning, LineNumber};

pub const DONE_MESSAGE: &str = "** DONE **";

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Error(BasicError),
    Warning(BasicWarning),
}

/// A condition together with the program line it was raised on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", self.message())]
pub struct ProgramException {
    pub condition: Condition,
    pub line: Option<LineNumber>,
}

impl ProgramException {
    pub fn error(error: BasicError, line: Option<LineNumber>) -> Self {
        ProgramException { condition: Condition::Error(error), line }
    }

    pub fn warning(warning: BasicWarning, line: Option<LineNumber>) -> Self {
        ProgramException { condition: Condition::Warning(warning), line }
    }

    pub fn is_breakpoint(&self) -> bool {
        matches!(&self.condition, Condition::Error(e) if e.is_breakpoint())
    }

    /// `DATA ERROR IN 100`, `BREAKPOINT AT 110`, or the bare message.
    pub fn message(&self) -> String {
        let text = match &self.condition {
            Condition::Error(e) => e.to_string(),
            Condition::Warning(w) => w.to_string(),
        };
        match self.line {
            Some(line) if self.is_breakpoint() => format!("{} AT {}", text, line),
            Some(line) => format!("{} IN {}", text, line),
            None => text,
        }
    }

    /// Prints the report on a fresh row. Reports without a line number are
    /// followed by a blank row.
    pub fn report(&self, sink: &mut dyn OutputSink) {
        sink.place_cursor(CursorHint::LineStart);
        match &self.condition {
            Condition::Warning(_) => {
                sink.append("* WARNING:");
                sink.place_cursor(CursorHint::NewLine);
                sink.append(&format!("  {}", self.message()));
            }
            Condition::Error(_) => sink.append(&format!("* {}", self.message())),
        }
        sink.place_cursor(CursorHint::NewLine);
        if self.line.is_none() {
            sink.place_cursor(CursorHint::NewLine);
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Condition::Error(e) => write!(f, "{}", e),
            Condition::Warning(w) => write!(f, "{}", w),
        }
    }
}

/// Printed when a run ends normally without any report along the way.
pub fn report_done(sink: &mut dyn OutputSink) {
    sink.place_cursor(CursorHint::LineStart);
    sink.append(DONE_MESSAGE);
    sink.place_cursor(CursorHint::NewLine);
    sink.place_cursor(CursorHint::NewLine);
}

//! What gets sent: free text, a structured value, or an error report.

use std::any::Any;
use std::error::Error as StdError;
use std::panic::Location;

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Maximum number of bytes of trace carried by a report.
pub const TRACE_LIMIT: usize = 1000;

/// Appended to a trace cut at [`TRACE_LIMIT`].
pub const TRACE_MARKER: &str = " ... ----- TRACE IS LIMITED TO 1000 CHARS -----";

/// Label used for the crate's own error type.
const OWN_ERROR_KIND: &str = "NotifyError";

/// Label for a type-erased error.
const DYN_ERROR_KIND: &str = "Error";

/// Payload of a single notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    /// Dumped as pretty-printed JSON before rendering.
    Structured(serde_json::Value),
    Report(ErrorReport),
}

impl Content {
    /// Turn `Structured` into `Text`; other variants pass through.
    pub fn normalize(self) -> Self {
        match self {
            Self::Structured(value) => {
                let dump = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                Self::Text(dump)
            }
            other => other,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

impl From<ErrorReport> for Content {
    fn from(report: ErrorReport) -> Self {
        Self::Report(report)
    }
}

/// Normalized description of a caught error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Concrete type name of the error.
    pub kind: String,
    pub file: String,
    pub line: u32,
    /// The error message.
    pub title: String,
    /// Trace lines, already capped at [`TRACE_LIMIT`].
    pub trace: Vec<String>,
}

impl ErrorReport {
    /// Build a report from explicit parts. `raw_trace` is truncated and split
    /// into lines.
    pub fn new(
        kind: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        title: impl Into<String>,
        raw_trace: &str,
    ) -> Self {
        Self {
            kind: kind.into(),
            file: file.into(),
            line,
            title: title.into(),
            trace: split_trace(raw_trace),
        }
    }

    /// Capture a report for `err` at the caller's source location.
    ///
    /// The trace lists the error's source chain, followed by a backtrace when
    /// `RUST_BACKTRACE` enables one.
    #[track_caller]
    pub fn capture<E>(err: &E) -> Self
    where
        E: StdError + 'static,
    {
        let kind = if (err as &dyn Any).is::<NotifyError>() {
            OWN_ERROR_KIND.to_string()
        } else {
            short_type_name(std::any::type_name::<E>())
        };
        Self::from_error(kind, err, Location::caller())
    }

    /// Like [`capture`](Self::capture) for type-erased errors such as
    /// `Box<dyn Error>` or `anyhow::Error`: pass `&*err`.
    ///
    /// The concrete type is not known here, so `kind` is `NotifyError` for
    /// the crate's own error and `Error` otherwise.
    #[track_caller]
    pub fn capture_dyn(err: &(dyn StdError + 'static)) -> Self {
        let kind = if err.is::<NotifyError>() {
            OWN_ERROR_KIND
        } else {
            DYN_ERROR_KIND
        };
        Self::from_error(kind.to_string(), err, Location::caller())
    }

    fn from_error(kind: String, err: &(dyn StdError + 'static), location: &Location<'_>) -> Self {
        let mut raw_trace = source_chain(err);
        let backtrace = std::backtrace::Backtrace::capture();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            raw_trace.push('\n');
            raw_trace.push_str(&backtrace.to_string());
        }

        Self::new(kind, location.file(), location.line(), err.to_string(), &raw_trace)
    }

    /// `" in {file} line: {line}"`, as shown under the error name.
    pub fn place(&self) -> String {
        format!(" in {} line: {}", self.file, self.line)
    }

    /// Trace lines joined back into one block.
    pub fn trace_text(&self) -> String {
        self.trace.join("\n")
    }
}

/// Number the error and each of its causes, one per line.
fn source_chain(err: &(dyn StdError + 'static)) -> String {
    let mut lines = Vec::new();
    let mut current = Some(err);
    while let Some(e) = current {
        lines.push(format!("#{} {}", lines.len(), e));
        current = e.source();
    }
    lines.join("\n")
}

/// `notify_relay::error::NotifyError` → `NotifyError`, keeping generics intact.
fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base);
    format!("{short}{}", &full[base.len()..])
}

/// Cut a trace at [`TRACE_LIMIT`] bytes, append the marker, split on newlines.
pub fn split_trace(raw: &str) -> Vec<String> {
    let trace = match crate::render::truncate(raw, TRACE_LIMIT) {
        Some(cut) => format!("{cut}{TRACE_MARKER}"),
        None => raw.to_string(),
    };
    trace.split('\n').map(str::to_string).collect()
}

//! Structured diagnostics collected during a reconciliation pass.
//!
//! Structural problems (bad JSON blobs, unknown enum values, rows without a
//! natural key) never abort a pass. They are recorded here with enough context
//! to locate the offending row, mirrored to `tracing`, and handed back to the
//! caller, which decides whether to print, fail, or surface them.
use serde::Serialize;
use std::fmt;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warn",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

/// One diagnostic tied to a table and (when known) a natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(
                f,
                "[{}] {}:{}: {}",
                self.severity, self.table, key, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.severity, self.table, self.message),
        }
    }
}

/// Ordered collection of diagnostics for a single pass.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, table: &str, key: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Warning, table, key, message.into());
    }

    pub fn info(&mut self, table: &str, key: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Info, table, key, message.into());
    }

    pub fn error(&mut self, table: &str, key: Option<&str>, message: impl Into<String>) {
        self.push(Severity::Error, table, key, message.into());
    }

    fn push(&mut self, severity: Severity, table: &str, key: Option<&str>, message: String) {
        match severity {
            Severity::Info => tracing::info!(table, key, "{message}"),
            Severity::Warning => tracing::warn!(table, key, "{message}"),
            Severity::Error => tracing::error!(table, key, "{message}"),
        }
        self.entries.push(Diagnostic {
            severity,
            table: table.to_string(),
            key: key.map(str::to_string),
            message,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|entry| entry.severity == Severity::Warning)
    }

    /// True when any entry for `table`/`key` mentions `needle`.
    #[cfg(test)]
    pub fn mentions(&self, table: &str, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.table == table && entry.message.contains(needle))
    }
}

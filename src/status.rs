//! Severities and accumulated status messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a status entry, ordered `Ok < Info < Warning < Error`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn is_ok(self) -> bool {
        self == Severity::Ok
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One message with its severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub severity: Severity,
    pub message: String,
}

impl StatusEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        StatusEntry {
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// An ordered list of entries whose severity is the maximum of its parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    entries: Vec<StatusEntry>,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, severity: Severity, message: impl Into<String>) {
        self.entries.push(StatusEntry::new(severity, message));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.add(Severity::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.add(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.add(Severity::Error, message);
    }

    /// Appends all entries of `other`.
    pub fn merge(&mut self, other: Status) {
        self.entries.extend(other.entries);
    }

    pub fn severity(&self) -> Severity {
        self.entries
            .iter()
            .map(|e| e.severity)
            .max()
            .unwrap_or_default()
    }

    pub fn is_ok(&self) -> bool {
        self.severity().is_ok()
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Ok);
    }

    #[test]
    fn test_empty_status_is_ok() {
        let status = Status::new();
        assert!(status.is_ok());
        assert!(status.is_empty());
    }

    #[test]
    fn test_status_severity_is_maximum() {
        let mut status = Status::new();
        status.info("resolved 3 units");
        status.warning("optional requirement unsatisfied");
        assert_eq!(status.severity(), Severity::Warning);

        let mut other = Status::new();
        other.error("mandatory requirement unsatisfied");
        status.merge(other);
        assert_eq!(status.severity(), Severity::Error);
        assert_eq!(status.entries().len(), 3);
    }

    #[test]
    fn test_entry_display() {
        let entry = StatusEntry::new(Severity::Warning, "drift");
        assert_eq!(entry.to_string(), "[WARNING] drift");
    }
}

//! Error types for Tessera Core
//!
//! Two families live here. [`Error`] covers structural and contract failures
//! that abort a query (an unsupported plan node, a selector missing from a
//! layout, a literal that cannot be coerced). [`Problems`] collects the
//! non-fatal issues recorded while a query runs; they travel with the results
//! and the caller decides whether to treat them as fatal.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using Tessera Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the tuple-processing core
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or inconsistent column layout
    #[error("Layout error: {0}")]
    Layout(String),

    /// A selector referenced by the plan is not part of the layout
    #[error("Selector '{0}' does not exist in the query")]
    NoSuchSelector(String),

    /// A column referenced by the plan is not part of the layout
    #[error("Column '{0}' does not exist in the query")]
    NoSuchColumn(String),

    /// Index outside of the tuple or column range
    #[error("Index {index} is out of range (size {size})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Size of the indexed collection
        size: usize,
    },

    /// Structurally invalid plan tree
    #[error("Plan error: {0}")]
    Plan(String),

    /// Plan feature recognized but not implemented
    #[error("Not implemented: {0}")]
    Unsupported(String),

    /// Value could not be converted to the requested type
    #[error("Cannot convert {value} to {type_name}")]
    TypeConversion {
        /// Rendered source value
        value: String,
        /// Target type name
        type_name: String,
    },

    /// Failures reported by the access layer
    #[error("Access error: {0}")]
    Access(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal consistency violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a layout error
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }

    /// Create a plan error
    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan(msg.into())
    }

    /// Create an unsupported-feature error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an access error
    pub fn access(msg: impl Into<String>) -> Self {
        Self::Access(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a type conversion error
    pub fn conversion(value: impl fmt::Display, type_name: impl Into<String>) -> Self {
        Self::TypeConversion {
            value: value.to_string(),
            type_name: type_name.into(),
        }
    }
}

/// Severity of an accumulated problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational note
    Info,
    /// Something was degraded but results are usable
    Warning,
    /// Results are probably incomplete or wrong
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single non-fatal issue recorded during compilation or execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// How bad it is
    pub severity: Severity,
    /// Human readable description
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Ordered collection of accumulated problems
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problems {
    problems: Vec<Problem>,
}

impl Problems {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem
    pub fn add(&mut self, severity: Severity, message: impl Into<String>) {
        self.problems.push(Problem {
            severity,
            message: message.into(),
        });
    }

    /// Record an error-level problem
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.add(Severity::Error, message);
    }

    /// Record a warning
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.add(Severity::Warning, message);
    }

    /// Record an informational note
    pub fn add_info(&mut self, message: impl Into<String>) {
        self.add(Severity::Info, message);
    }

    /// Whether any error-level problem was recorded
    pub fn has_errors(&self) -> bool {
        self.problems.iter().any(|p| p.severity == Severity::Error)
    }

    /// Whether any warning was recorded
    pub fn has_warnings(&self) -> bool {
        self.problems.iter().any(|p| p.severity == Severity::Warning)
    }

    /// Number of recorded problems
    pub fn len(&self) -> usize {
        self.problems.len()
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Iterate over the problems in recording order
    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter()
    }

    /// Append all problems from another container
    pub fn extend(&mut self, other: Problems) {
        self.problems.extend(other.problems);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = Error::plan("bad node");
        assert!(matches!(err, Error::Plan(_)));
        assert_eq!(err.to_string(), "Plan error: bad node");

        let err = Error::conversion("abc", "LONG");
        assert_eq!(err.to_string(), "Cannot convert abc to LONG");
    }

    #[test]
    fn test_problems_severity_queries() {
        let mut problems = Problems::new();
        assert!(problems.is_empty());
        problems.add_info("note");
        assert!(!problems.has_errors());
        assert!(!problems.has_warnings());

        problems.add_warning("careful");
        assert!(problems.has_warnings());
        problems.add_error("broken");
        assert!(problems.has_errors());
        assert_eq!(problems.len(), 3);

        let rendered: Vec<String> = problems.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered[2], "[ERROR] broken");
    }
}

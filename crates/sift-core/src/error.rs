//! Error taxonomy shared across sift crates.
//!
//! Three categories live here. `ValidationError` is raised at the two trust
//! boundaries (metadata entering a store, rows leaving a query) and is never
//! retried. `ConfigError` is raised at construction and is fatal.
//! `OperationError` covers higher-level logical failures such as using a
//! store after `dispose()`. Database and embedder errors are defined next to
//! their drivers in `sift-store` and `sift-embed`.

use std::fmt;

use thiserror::Error;

/// One failed check inside a [`ValidationError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Field path that failed (`$` for the whole record).
    pub path: String,
    /// Human-readable description of the failure.
    pub message: String,
    /// What the schema declared.
    pub expected: String,
    /// What the input actually carried.
    pub received: String,
}

impl ValidationIssue {
    /// Build an issue from any stringy parts.
    pub fn new(
        path: impl Into<String>,
        message: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            expected: expected.into(),
            received: received.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (expected {}, got {})",
            self.path, self.message, self.expected, self.received
        )
    }
}

/// Input failed a declared schema or a numeric/range precondition.
///
/// Carries every failed check, not just the first, so a caller can fix a
/// whole record in one pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("validation failed: {}", format_issues(.issues))]
pub struct ValidationError {
    /// All failed checks, in schema order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// A validation error with exactly one issue.
    #[must_use]
    pub fn single(issue: ValidationIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    /// A validation error from a collected issue list.
    ///
    /// The list must be non-empty; an empty list means validation passed and
    /// no error should be constructed.
    #[must_use]
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        debug_assert!(!issues.is_empty(), "ValidationError with no issues");
        Self { issues }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Missing required option or invalid value at construction. Fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The document key or a source key names a field the schema does not
    /// declare.
    #[error("{context} '{field}' is not declared in the metadata schema")]
    MissingField {
        field: String,
        context: &'static str,
    },

    /// A table, column, or field name failed the SQL identifier pattern.
    #[error("invalid SQL identifier '{identifier}' for {context}")]
    InvalidIdentifier {
        identifier: String,
        context: &'static str,
    },

    /// `type` clashes with the discriminator used by polymorphic metadata
    /// descriptors and cannot be a metadata field.
    #[error("metadata field name '{field}' is reserved")]
    ReservedField { field: String },

    /// Two logical fields (or a field and a fixed column) map to the same
    /// physical column.
    #[error("physical column '{column}' is mapped more than once")]
    DuplicateColumn { column: String },

    /// A source key's physical column has no static context value, leaving
    /// the write scope incomplete.
    #[error("source key column '{column}' has no static context value")]
    MissingScopeValue { column: String },

    /// A bulk delete was requested on a store with no source keys.
    #[error("source scope is empty; refusing an unscoped bulk delete")]
    EmptyScope,

    /// A numeric or structural option is out of range.
    #[error("invalid value for {option}: {reason}")]
    InvalidValue {
        option: &'static str,
        reason: String,
    },
}

/// Higher-level logical failure. Contextual, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    /// A lookup by document key matched nothing.
    #[error("document not found: {key}")]
    DocumentNotFound { key: String },

    /// The operation is not valid in the component's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn validation_error_display_lists_every_issue() {
        let err = ValidationError::from_issues(vec![
            ValidationIssue::new("path", "missing required field", "text", "null"),
            ValidationIssue::new("size", "not an integer", "integer", "string"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: path: missing required field (expected text, got null); \
             size: not an integer (expected integer, got string)"
        );
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::MissingField {
            field: "fileSha".to_string(),
            context: "document key",
        };
        assert_eq!(
            err.to_string(),
            "document key 'fileSha' is not declared in the metadata schema"
        );
    }
}

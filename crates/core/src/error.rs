//! # Error Taxonomy
//!
//! One error type for the whole core. Variants split into two families:
//! operation-level errors, returned to the caller, and per-file errors,
//! which the executor records on a `ChangeTarget` instead of propagating.

use thiserror::Error;

/// Result alias used across the core
pub type Result<T> = std::result::Result<T, RefileError>;

#[derive(Error, Debug)]
pub enum RefileError {
    // ------------------------------------------------------------------
    // Operation-level
    // ------------------------------------------------------------------
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("invalid replacement format: {0}")]
    InvalidTemplate(String),

    #[error("invalid rename pattern: {0}")]
    InvalidRenameTemplate(String),

    #[error("invalid directory '{path}': {reason}")]
    InvalidDirectory { path: String, reason: String },

    #[error("invalid file selection: {0}")]
    InvalidSelection(String),

    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {name}")]
    AlreadyExists { entity: &'static str, name: String },

    #[error("concurrent modification of {entity} {id}: expected version {expected}, found {found}")]
    Conflict {
        entity: &'static str,
        id: i64,
        expected: i64,
        found: i64,
    },

    #[error("pattern {0} is confirmed; reopen it before changing its definition")]
    PatternConfirmed(i64),

    #[error("pattern {0} has no passing test for its current definition")]
    PatternNotTested(i64),

    #[error("pattern {0} is not confirmed")]
    PatternNotConfirmed(i64),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),

    // ------------------------------------------------------------------
    // Per-file
    // ------------------------------------------------------------------
    #[error("capture group {0} was not captured")]
    MissingGroup(usize),

    #[error("field '{0}' is not produced by the pattern")]
    MissingField(String),

    #[error("cannot convert '{value}' to {target}")]
    TypeCoercion { value: String, target: &'static str },

    #[error("invalid target filename '{0}'")]
    InvalidFilename(String),

    #[error("source file is missing: {0}")]
    SourceMissing(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("destination already exists: {0}")]
    DestinationExists(String),

    #[error("copy timed out after {0}s")]
    Timeout(u64),

    #[error("copy failed: {0}")]
    CopyFailed(String),

    // ------------------------------------------------------------------
    // Pre-flight
    // ------------------------------------------------------------------
    #[error("unusable destination path '{path}': {reason}")]
    InvalidDestinationPath { path: String, reason: String },
}

impl RefileError {
    /// Stable machine-readable kind, used by the API and stored on targets
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRegex(_) => "invalid_regex",
            Self::InvalidTemplate(_) => "invalid_template",
            Self::InvalidRenameTemplate(_) => "invalid_rename_template",
            Self::InvalidDirectory { .. } => "invalid_directory",
            Self::InvalidSelection(_) => "invalid_selection",
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Conflict { .. } => "conflict",
            Self::PatternConfirmed(_) => "pattern_confirmed",
            Self::PatternNotTested(_) => "pattern_not_tested",
            Self::PatternNotConfirmed(_) => "pattern_not_confirmed",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
            Self::MissingGroup(_) => "missing_group",
            Self::MissingField(_) => "missing_field",
            Self::TypeCoercion { .. } => "type_coercion",
            Self::InvalidFilename(_) => "invalid_filename",
            Self::SourceMissing(_) => "source_missing",
            Self::PermissionDenied(_) => "permission_denied",
            Self::DestinationExists(_) => "destination_exists",
            Self::Timeout(_) => "timeout",
            Self::CopyFailed(_) => "copy_failed",
            Self::InvalidDestinationPath { .. } => "invalid_destination_path",
        }
    }

    /// True for errors that belong to a single file of a batch
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::MissingGroup(_)
                | Self::MissingField(_)
                | Self::TypeCoercion { .. }
                | Self::InvalidFilename(_)
                | Self::SourceMissing(_)
                | Self::PermissionDenied(_)
                | Self::DestinationExists(_)
                | Self::Timeout(_)
                | Self::CopyFailed(_)
        )
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn lock<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(format!("Lock error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_snake_case() {
        let err = RefileError::TypeCoercion {
            value: "abc".into(),
            target: "integer",
        };
        assert_eq!(err.kind(), "type_coercion");
        assert_eq!(err.to_string(), "cannot convert 'abc' to integer");
    }

    #[test]
    fn test_per_file_classification() {
        assert!(RefileError::DestinationExists("x".into()).is_per_file());
        assert!(RefileError::MissingGroup(2).is_per_file());
        assert!(!RefileError::InvalidRegex("(".into()).is_per_file());
        assert!(!RefileError::InvalidDestinationPath {
            path: "/x".into(),
            reason: "not a directory".into()
        }
        .is_per_file());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: RefileError = io.into();
        assert_eq!(err.kind(), "io");
    }
}

//! Error kinds for arbor operations.

use strum_macros::{Display, IntoStaticStr};

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// Users can match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, Display)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Feature or operation not yet implemented
    NotImplemented,

    // =========================================================================
    // Dispatch / backend errors
    // =========================================================================
    /// No registered backend, or more than one, claimed a path
    BackendAmbiguous,

    /// An explicitly named backend does not exist
    BackendUnknown,

    // =========================================================================
    // File / IO errors
    // =========================================================================
    /// The path, or a required companion file, does not exist
    DataFileMissing,

    /// File not found (generic, used by the `io::Error` conversion)
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Header / parse errors
    // =========================================================================
    /// A required header attribute, column, or marker is missing
    HeaderMalformed,

    /// A declared unit string could not be parsed
    UnitParse,

    // =========================================================================
    // Field system errors
    // =========================================================================
    /// A field with this name is already registered
    FieldAlreadyExists,

    /// The requested field is not registered
    FieldNotFound,

    /// A derived field depends on itself, directly or transitively
    FieldCircularDependency,

    /// A derived or alias field names a dependency that does not exist
    FieldDependencyNotFound,

    /// An analysis field was requested before ever being generated
    FieldAnalysisNotGenerated,

    /// Attempted to set a field that is not analysis/analysis_saved
    FieldUnsettable,

    // =========================================================================
    // Selection errors
    // =========================================================================
    /// The predicate result length disagrees with the chosen scope
    SelectionScopeMismatch,

    /// A `select` predicate string failed to parse
    SyntaxError,

    /// No tree-node selector is registered under this name
    SelectorNotFound,

    // =========================================================================
    // Writer errors
    // =========================================================================
    /// Any I/O during save that leaves the target in an unusable state
    WriteFailed,

    /// A shard record failed to encode or decode through its binary wire format
    SerializationFailed,

    /// The arbor has zero trees (non-fatal; callers may treat as an empty arbor)
    DatasetEmpty,

    // =========================================================================
    // Resource / validation errors
    // =========================================================================
    /// Timeout occurred
    Timeout,

    /// Resource exhausted
    ResourceExhausted,

    /// Invalid argument passed to a function
    InvalidArgument,

    /// Assertion failed
    AssertionFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::ResourceExhausted | ErrorKind::IoFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::HeaderMalformed.to_string(), "HeaderMalformed");
        assert_eq!(ErrorKind::FieldNotFound.to_string(), "FieldNotFound");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::IoFailed.is_retryable());
        assert!(!ErrorKind::FieldNotFound.is_retryable());
        assert!(!ErrorKind::WriteFailed.is_retryable());
    }
}

//! The main Error type for the arbor engine.

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// Unified error type for all arbor operations.
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error status
    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Get the source error (if any).
    pub fn source_ref(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_ref().map(|e| e.as_ref())
    }

    /// Set the error status.
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as temporary (retryable)
    pub fn temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Mark as permanent (not retryable)
    pub fn permanent(mut self) -> Self {
        self.status = ErrorStatus::Permanent;
        self
    }

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(Box::new(source));
        self
    }

    /// Mark as persistent after failed retries.
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::DataFileMissing,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::new(ErrorKind::Unexpected, msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::new(ErrorKind::Unexpected, msg)
    }
}

impl Error {
    /// Create an Unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create an Unsupported error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    /// Create a data-file-missing error.
    pub fn data_file_missing(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorKind::DataFileMissing,
            format!("data file '{}' is missing", path),
        )
        .with_context("path", path)
    }

    /// Create a backend-ambiguous error, listing the candidates that matched.
    pub fn backend_ambiguous(path: impl Into<String>, candidates: &[&str]) -> Self {
        let path = path.into();
        Self::new(
            ErrorKind::BackendAmbiguous,
            format!(
                "could not distinguish a backend for '{}'; candidates: {}",
                path,
                candidates.join(", ")
            ),
        )
        .with_context("path", path)
    }

    /// Create a backend-unknown error for an explicit `method` override.
    pub fn backend_unknown(method: impl Into<String>) -> Self {
        let method = method.into();
        Self::new(
            ErrorKind::BackendUnknown,
            format!("no backend registered under method '{}'", method),
        )
        .with_context("method", method)
    }

    /// Create a header-malformed error.
    pub fn header_malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HeaderMalformed, message)
    }

    /// Create a unit-parse error.
    pub fn unit_parse(unit: impl Into<String>) -> Self {
        let unit = unit.into();
        Self::new(
            ErrorKind::UnitParse,
            format!("could not parse unit expression '{}'", unit),
        )
        .with_context("unit", unit)
    }

    /// Create a field-already-exists error.
    pub fn field_already_exists(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorKind::FieldAlreadyExists,
            format!("field '{}' is already registered", name),
        )
        .with_context("field", name)
    }

    /// Create a field-not-found error.
    pub fn field_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::FieldNotFound, format!("field '{}' not found", name))
            .with_context("field", name)
    }

    /// Create a field-circular-dependency error.
    pub fn field_circular_dependency(cycle: impl Into<String>) -> Self {
        let cycle = cycle.into();
        Self::new(
            ErrorKind::FieldCircularDependency,
            format!("circular field dependency: {}", cycle),
        )
        .with_context("cycle", cycle)
    }

    /// Create a field-dependency-not-found error.
    pub fn field_dependency_not_found(field: impl Into<String>, dep: impl Into<String>) -> Self {
        let field = field.into();
        let dep = dep.into();
        Self::new(
            ErrorKind::FieldDependencyNotFound,
            format!("field '{}' depends on unknown field '{}'", field, dep),
        )
        .with_context("field", field)
        .with_context("dependency", dep)
    }

    /// Create a field-analysis-not-generated error.
    pub fn field_analysis_not_generated(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorKind::FieldAnalysisNotGenerated,
            format!("analysis field '{}' has not been generated yet", name),
        )
        .with_context("field", name)
    }

    /// Create a field-unsettable error.
    pub fn field_unsettable(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorKind::FieldUnsettable,
            format!("field '{}' is not an analysis field and cannot be set", name),
        )
        .with_context("field", name)
    }

    /// Create a selection-scope-mismatch error.
    pub fn selection_scope_mismatch(expected: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::SelectionScopeMismatch,
            format!(
                "predicate result length {} does not match scope length {}",
                got, expected
            ),
        )
    }

    /// Create a SyntaxError for a `select` predicate string.
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message)
    }

    /// Create a selector-not-found error.
    pub fn selector_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::SelectorNotFound, format!("no tree-node selector named '{}'", name))
            .with_context("selector", name)
    }

    /// Create a write-failed error.
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WriteFailed, message)
    }

    /// Create a serialization-failed error for a shard record encode/decode failure.
    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationFailed, message)
    }

    /// Create a dataset-empty error (non-fatal; callers may downgrade to an empty arbor).
    pub fn dataset_empty(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorKind::DatasetEmpty,
            format!("'{}' contains zero trees", path),
        )
        .with_context("path", path)
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Create an AssertionFailed error.
    pub fn assertion_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertionFailed, message)
    }

    /// Create a Timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a NotImplemented error.
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        let feature = feature.into();
        Self::new(
            ErrorKind::NotImplemented,
            format!("'{}' is not implemented", feature),
        )
        .with_context("feature", feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::HeaderMalformed, "missing Nhalos attribute");
        assert_eq!(err.kind(), ErrorKind::HeaderMalformed);
        assert_eq!(err.message(), "missing Nhalos attribute");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::FieldNotFound, "not found")
            .with_operation("field_resolver::resolve")
            .with_context("field", "mass")
            .with_context("scope", "tree");

        assert_eq!(err.operation(), "field_resolver::resolve");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("field", "mass".to_string()));
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::WriteFailed, "shard write failed")
            .with_operation("writer::save_data_file")
            .with_operation("writer::save_arbor");

        assert_eq!(err.operation(), "writer::save_arbor");
        assert_eq!(err.context().len(), 1);
        assert_eq!(
            err.context()[0],
            ("called", "writer::save_data_file".to_string())
        );
    }

    #[test]
    fn test_temporary_status() {
        let err = Error::new(ErrorKind::Timeout, "operation timed out");
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::HeaderMalformed, "bad header");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_persist() {
        let err = Error::new(ErrorKind::IoFailed, "device busy").temporary();
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display() {
        let err = Error::new(ErrorKind::HeaderMalformed, "missing marker")
            .with_operation("formats::text_tree::parse_header")
            .with_context("file", "tree_0_0_0.dat")
            .with_context("line", "1");

        let display = format!("{}", err);
        assert!(display.contains("HeaderMalformed"));
        assert!(display.contains("permanent"));
        assert!(display.contains("formats::text_tree::parse_header"));
        assert!(display.contains("file: tree_0_0_0.dat"));
    }

    #[test]
    fn test_convenience_constructors() {
        let err = Error::field_not_found("mass");
        assert_eq!(err.kind(), ErrorKind::FieldNotFound);
        assert!(err.message().contains("mass"));

        let err = Error::data_file_missing("trees/tree_0_0_0.dat");
        assert_eq!(err.kind(), ErrorKind::DataFileMissing);

        let err = Error::backend_ambiguous("foo.dat", &["ConsistentTrees", "Rockstar"]);
        assert_eq!(err.kind(), ErrorKind::BackendAmbiguous);
        assert!(err.message().contains("ConsistentTrees"));
    }

    #[test]
    fn test_set_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::new(ErrorKind::DataFileMissing, "locations.dat not found").set_source(io_err);

        assert!(err.source_ref().is_some());
    }
}

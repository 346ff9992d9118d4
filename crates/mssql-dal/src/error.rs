//! Error types for the data-access layer.

use std::time::Duration;

use thiserror::Error;

use crate::core::value::StorageType;

/// SQL Server error numbers the layer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SqlErrorCode {
    /// `DROP TABLE` failed because the object does not exist (or no permission).
    DropTableError = 3701,
    /// Network error while talking to the server.
    NetworkError = 17829,
    /// Link establishment failure.
    LinkEstablishmentError = 32054,
}

impl SqlErrorCode {
    /// Numeric error code as reported by the server.
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// What is wrong with an entity's declarative metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataErrorKind {
    #[error("missing table annotation")]
    MissingTableAnnotation,

    #[error("expected one table annotation, found {0}")]
    MultipleTableAnnotations(usize),

    #[error("no property is marked as primary key")]
    NoPrimaryKey,

    #[error("{0} primary key properties declared, at most two are supported")]
    TooManyPrimaryKeys(usize),

    #[error("primary key property '{0}' has no column annotation")]
    PrimaryKeyWithoutColumn(String),

    #[error("entity produced {actual} values for {expected} declared properties")]
    ValueCountMismatch { expected: usize, actual: usize },

    #[error("operation needs {expected} key value(s) but the entity declares {actual}")]
    KeyArity { expected: usize, actual: usize },
}

/// Main error type for data-access operations.
#[derive(Error, Debug)]
pub enum DalError {
    /// Missing or malformed declarative metadata on an entity type.
    #[error("Metadata error on {entity}: {kind}")]
    Metadata {
        entity: String,
        kind: MetadataErrorKind,
    },

    /// No SQL type could be derived for a declared column.
    #[error("Unsupported data type {data_type:?} for column '{column}'")]
    UnsupportedType {
        column: String,
        data_type: StorageType,
    },

    /// Dynamic rows reference columns outside the declared table definition.
    #[error("Received dynamic table rows have '{0}' unexpected columns")]
    UnexpectedColumns(usize),

    /// Untrusted input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The server reported an error.
    #[error("Database error {code}: {message}")]
    Engine { code: u32, message: String },

    /// Driver-level failure (I/O, protocol, TLS).
    #[error("Driver error: {0}")]
    Driver(tiberius::error::Error),

    /// An operation did not complete within its time budget.
    #[error("Timed out after {after:?} in {operation}")]
    Timeout { operation: String, after: Duration },

    /// A value could not be converted between Rust and SQL representations.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<tiberius::error::Error> for DalError {
    fn from(e: tiberius::error::Error) -> Self {
        match e {
            tiberius::error::Error::Server(token) => DalError::Engine {
                code: token.code(),
                message: token.message().to_string(),
            },
            other => DalError::Driver(other),
        }
    }
}

impl DalError {
    /// Create a Metadata error for the named entity.
    pub fn metadata(entity: impl Into<String>, kind: MetadataErrorKind) -> Self {
        DalError::Metadata {
            entity: entity.into(),
            kind,
        }
    }

    /// Create a Timeout error.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        DalError::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Server error number, when the server reported one.
    pub fn engine_code(&self) -> Option<u32> {
        match self {
            DalError::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the server reported the given error code.
    pub fn is_engine_code(&self, code: SqlErrorCode) -> bool {
        self.engine_code() == Some(code.code())
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for data-access operations.
pub type Result<T> = std::result::Result<T, DalError>;

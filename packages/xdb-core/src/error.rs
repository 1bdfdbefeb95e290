//! Storage error taxonomy.

use thiserror::Error;
use xdb_types::LayoutError;

use crate::driver::DriverError;

/// Category of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Row, table or database absent when presence is required
    NotFound,
    /// Table or database present when creation was requested
    AlreadyExists,
    /// Unique or identifier constraint violated on write
    DuplicateKey,
    /// Live layout disagrees with the expected layout
    SchemaMismatch,
    /// Dialect cannot perform the requested statement shape
    UnsupportedOperation,
    /// Malformed names, out of range values or precision specs
    InvalidArgument,
    /// I/O or authentication failure reaching the engine
    ConnectionFailure,
}

/// Storage operation errors.
///
/// Every public operation fails with one of these. Errors raised by the
/// database driver keep the original driver error as their source.
#[derive(Error, Debug)]
pub enum DbError {
    /// Required row, table or database is absent
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// Table or database to be created exists
    #[error("Already exists: {message}")]
    AlreadyExists {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// Write violated a unique or identifier constraint
    #[error("Duplicate key: {message}")]
    DuplicateKey {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// Live schema or stored value disagrees with the layout
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// Dialect or configuration cannot run the request
    #[error("Unsupported operation: {message}")]
    UnsupportedOperation {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// Name, value or size rejected before reaching the engine
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    /// Engine unreachable, or the connection failed mid-session
    #[error("Connection failure: {message}")]
    ConnectionFailure {
        message: String,
        #[source]
        source: Option<DriverError>,
    },
}

impl DbError {
    /// Creates an error of `kind` without a driver cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::build(kind, message.into(), None)
    }

    /// Creates an error of `kind` wrapping the driver error that caused it.
    pub fn from_driver(kind: ErrorKind, message: impl Into<String>, source: DriverError) -> Self {
        Self::build(kind, message.into(), Some(source))
    }

    fn build(kind: ErrorKind, message: String, source: Option<DriverError>) -> Self {
        match kind {
            ErrorKind::NotFound => DbError::NotFound { message, source },
            ErrorKind::AlreadyExists => DbError::AlreadyExists { message, source },
            ErrorKind::DuplicateKey => DbError::DuplicateKey { message, source },
            ErrorKind::SchemaMismatch => DbError::SchemaMismatch { message, source },
            ErrorKind::UnsupportedOperation => DbError::UnsupportedOperation { message, source },
            ErrorKind::InvalidArgument => DbError::InvalidArgument { message, source },
            ErrorKind::ConnectionFailure => DbError::ConnectionFailure { message, source },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaMismatch, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedOperation, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn connection_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailure, message)
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound { .. } => ErrorKind::NotFound,
            DbError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            DbError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            DbError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            DbError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            DbError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            DbError::ConnectionFailure { .. } => ErrorKind::ConnectionFailure,
        }
    }

    /// The driver error this error was classified from, if any.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            DbError::NotFound { source, .. }
            | DbError::AlreadyExists { source, .. }
            | DbError::DuplicateKey { source, .. }
            | DbError::SchemaMismatch { source, .. }
            | DbError::UnsupportedOperation { source, .. }
            | DbError::InvalidArgument { source, .. }
            | DbError::ConnectionFailure { source, .. } => source.as_ref(),
        }
    }
}

impl From<LayoutError> for DbError {
    fn from(e: LayoutError) -> Self {
        DbError::invalid_argument(e.to_string())
    }
}

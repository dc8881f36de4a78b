//! Error types for the store tree.

use thiserror::Error;

use crate::path::{Path, PathError};

/// Errors raised by the store tree, the dispatch engine and the scheduler.
///
/// All failures are local: they are returned to the immediate caller and
/// nothing is retried. A middleware that declines to proceed is not an
/// error; `dispatch` reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum Error {
    /// The store already has a different parent.
    #[error("store {child} is already owned; detach it before attaching under '{field}'")]
    AlreadyOwned { child: String, field: String },

    /// Attaching would make a store its own ancestor.
    #[error("attaching {child} under '{field}' would create a cycle")]
    CyclicAttach { child: String, field: String },

    /// A field was written outside of an action.
    #[error("illegal mutation of '{field}' on {store} outside of an action")]
    IllegalMutation { store: String, field: String },

    /// A synchronous handler tried to dispatch an asynchronous action.
    #[error("cannot dispatch asynchronous action '{action}' from a synchronous handler")]
    AsyncFromSyncForbidden { action: String },

    /// A payload value cannot be represented in the action value domain.
    #[error("payload is not serializable at {location}: {message}")]
    NonSerializablePayload { location: String, message: String },

    /// Work was scheduled while a protected synchronous action was running.
    #[error("cannot schedule work while synchronous action '{action}' is running")]
    SchedulingForbidden { action: String },

    /// The store type declares no such field.
    #[error("store type {store_type} has no field '{field}'")]
    UnknownField { store_type: String, field: String },

    /// The schema declares no such store type.
    #[error("unknown store type '{0}'")]
    UnknownStoreType(String),

    /// A value does not fit the field kind.
    #[error("type mismatch for '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Scalar coercion failed.
    #[error("cannot coerce value for '{field}' to {target}: {message}")]
    Coercion {
        field: String,
        target: String,
        message: String,
    },

    /// A label path does not resolve to a store below the root.
    #[error("no store at path '{path}'")]
    NoRoute { path: Path },

    /// Path or label parsing failed.
    #[error("{0}")]
    Path(#[from] PathError),

    /// A reserved action was dispatched with a malformed payload or name.
    #[error("invalid action '{action}': {message}")]
    InvalidAction { action: String, message: String },

    /// A store type or schema definition is invalid.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Conversion to or from an external representation failed.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Failure reported by an application handler.
    #[error("{message}")]
    Other { message: String },
}

/// Fieldless discriminant of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyOwned,
    CyclicAttach,
    IllegalMutation,
    AsyncFromSyncForbidden,
    NonSerializablePayload,
    SchedulingForbidden,
    UnknownField,
    UnknownStoreType,
    TypeMismatch,
    Coercion,
    NoRoute,
    Path,
    InvalidAction,
    Schema,
    Codec,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyOwned { .. } => ErrorKind::AlreadyOwned,
            Error::CyclicAttach { .. } => ErrorKind::CyclicAttach,
            Error::IllegalMutation { .. } => ErrorKind::IllegalMutation,
            Error::AsyncFromSyncForbidden { .. } => ErrorKind::AsyncFromSyncForbidden,
            Error::NonSerializablePayload { .. } => ErrorKind::NonSerializablePayload,
            Error::SchedulingForbidden { .. } => ErrorKind::SchedulingForbidden,
            Error::UnknownField { .. } => ErrorKind::UnknownField,
            Error::UnknownStoreType(_) => ErrorKind::UnknownStoreType,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::Coercion { .. } => ErrorKind::Coercion,
            Error::NoRoute { .. } => ErrorKind::NoRoute,
            Error::Path(_) => ErrorKind::Path,
            Error::InvalidAction { .. } => ErrorKind::InvalidAction,
            Error::Schema { .. } => ErrorKind::Schema,
            Error::Codec { .. } => ErrorKind::Codec,
            Error::Other { .. } => ErrorKind::Other,
        }
    }

    /// Create an application error with a message.
    pub fn other(message: impl Into<String>) -> Self {
        Error::Other {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema {
            message: message.into(),
        }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Error::Codec {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_action(action: &str, message: impl Into<String>) -> Self {
        Error::InvalidAction {
            action: action.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the store tree.
pub type Result<T> = std::result::Result<T, Error>;

use crate::{backend::BackendError, codec::SerializeError, schema::SchemaError};
use thiserror::Error as ThisError;

///
/// DbError
///
/// Public error surface for every store operation.
/// Each variant is distinguishable by the caller; none of them is retried
/// internally — retry policy belongs to the caller.
///

#[derive(Debug, ThisError)]
pub enum DbError {
    /// Bad schema registration. Raised synchronously, never retryable.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An operation referenced a model that was never registered.
    #[error("model '{0}' is not registered")]
    NotRegistered(String),

    /// A record had no usable value for its declared primary-key field.
    #[error("record of model '{model}' has no stringifiable value for primary key field '{field}'")]
    PrimaryKeyMissing { model: String, field: String },

    /// A value could not be canonically encoded, or stored data could not
    /// be decoded back.
    #[error(transparent)]
    Serialization(#[from] SerializeError),

    /// A stored pointer revisited a record that is still being resolved.
    /// Signals corrupt or adversarial data; surfaced, not retried.
    #[error("cyclic nested reference detected at '{key}' of model '{model}'")]
    CyclicReference { model: String, key: String },

    /// Transport or script-evaluation failure, propagated unmodified.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl DbError {
    /// Stable kind label, independent of message text.
    #[must_use]
    pub const fn kind(&self) -> DbErrorKind {
        match self {
            Self::Schema(_) => DbErrorKind::Schema,
            Self::NotRegistered(_) => DbErrorKind::NotRegistered,
            Self::PrimaryKeyMissing { .. } => DbErrorKind::PrimaryKeyMissing,
            Self::Serialization(_) => DbErrorKind::Serialization,
            Self::CyclicReference { .. } => DbErrorKind::CyclicReference,
            Self::Backend(_) => DbErrorKind::Backend,
        }
    }
}

///
/// DbErrorKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DbErrorKind {
    Schema,
    NotRegistered,
    PrimaryKeyMissing,
    Serialization,
    CyclicReference,
    Backend,
}

impl DbErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::NotRegistered => "not_registered",
            Self::PrimaryKeyMissing => "primary_key_missing",
            Self::Serialization => "serialization",
            Self::CyclicReference => "cyclic_reference",
            Self::Backend => "backend",
        }
    }
}

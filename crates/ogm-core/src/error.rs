//! Error types shared by every layer of the mapper.
//!
//! [`OgmError`] is the single error surfaced to callers. Backends convert their
//! own failures into it, so a unit of work can match on
//! [`OgmError::DuplicateKey`] or [`OgmError::StaleState`] and decide whether to
//! retry, regardless of which physical store raised them.

use thiserror::Error;

/// Boxed error coming out of a physical store.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by key construction, persisters, and dialects.
#[derive(Debug, Error)]
pub enum OgmError {
    /// An insert collided with an existing physical record for the same key.
    #[error("duplicate key: table '{table}', key {key}")]
    DuplicateKey { table: String, key: String },

    /// An optimistic-lock check failed; the record changed since it was read.
    #[error("stale state: entity '{entity}', id {id}")]
    StaleState { entity: String, id: String },

    /// The in-memory model and the physical store have diverged.
    ///
    /// Never caught or retried inside this workspace.
    #[error("inconsistent association state: {reason}")]
    InconsistentAssociationState { reason: String },

    /// The active backend lacks the requested capability.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    /// Mapping metadata is invalid or references unknown entities/roles.
    #[error("mapping error: {reason}")]
    Mapping { reason: String },

    /// An entity tuple that must exist was not found.
    #[error("entity tuple not found: table '{table}', key {key}")]
    EntityTupleNotFound { table: String, key: String },

    /// A physical store failed.
    #[error("backend error: {source}")]
    Backend {
        #[source]
        source: BackendError,
    },
}

impl OgmError {
    /// Wraps any store-level error as [`OgmError::Backend`].
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        OgmError::Backend {
            source: Box::new(error),
        }
    }

    /// Shorthand for [`OgmError::UnsupportedOperation`].
    pub fn unsupported(operation: impl Into<String>) -> Self {
        OgmError::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Shorthand for [`OgmError::Mapping`].
    pub fn mapping(reason: impl Into<String>) -> Self {
        OgmError::Mapping {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`OgmError::InconsistentAssociationState`].
    pub fn inconsistent(reason: impl Into<String>) -> Self {
        OgmError::InconsistentAssociationState {
            reason: reason.into(),
        }
    }

    /// True for the failures a unit of work may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OgmError::DuplicateKey { .. } | OgmError::StaleState { .. })
    }
}

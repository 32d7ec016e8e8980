//! Error types for the property-graph backend.

use ogm_core::OgmError;
use thiserror::Error;

/// Errors produced by graph executors and the native query parser.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node with the same labels and key already exists.
    #[error("uniqueness violation: label '{label}', key {key}")]
    UniqueConstraint { label: String, key: String },

    /// The statement needs more parameters than were bound.
    #[error("missing parameter {position} for statement '{statement}'")]
    MissingParameter { statement: String, position: usize },

    /// A named native-query parameter was not supplied.
    #[error("unbound native parameter '{name}'")]
    UnboundParameter { name: String },

    /// A bound parameter has the wrong type.
    #[error("invalid parameter for statement '{statement}': {reason}")]
    InvalidParameter { statement: String, reason: String },

    /// A write statement was sent through the read-only entry point.
    #[error("statement '{statement}' writes and cannot run as a read")]
    ReadOnly { statement: String },

    /// The executor returned a result of an unexpected shape.
    #[error("unexpected result: expected {expected}")]
    UnexpectedResult { expected: String },

    /// The next sequence value does not fit in an `i64`.
    #[error("sequence '{name}' exhausted")]
    SequenceExhausted { name: String },

    /// A native query could not be parsed.
    #[error("cypher parse error at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },
}

impl From<GraphError> for OgmError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UniqueConstraint { label, key } => {
                OgmError::DuplicateKey { table: label, key }
            }
            other => OgmError::backend(other),
        }
    }
}

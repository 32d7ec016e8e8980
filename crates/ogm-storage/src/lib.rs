//! Backend access layer for the object/grid mapper.
//!
//! # Architecture
//!
//! [`GridDialect`] is the contract every physical store implements: tuple and
//! association CRUD, id generation, native queries, and capability flags the
//! persisters consult (null support, duplicate-insert strategy, atomic
//! optimistic locking). Persisters above this crate never see a concrete
//! store.
//!
//! # Modules
//!
//! - [`dialect`]: the trait, its operation contexts and request types
//! - [`map`]: in-memory key-value backend
//! - [`document`]: SQLite JSON document backend
//! - [`schema`]: migrations for the document backend
//! - [`compensation`]: write-collecting wrapper with an error hook
//! - [`error`]: [`StorageError`]

pub mod compensation;
pub mod dialect;
pub mod document;
pub mod error;
pub mod map;
pub mod schema;

pub use compensation::{ErrorContext, ErrorHandler, GridOperation, InvocationCollectingDialect};
pub use dialect::{
    AssociationContext, BackendQuery, DuplicateInsertPreventionStrategy, GridDialect,
    IdSourceKey, NextValueRequest, SchemaDefinition, ToOneAssociation, TupleContext, TupleStream,
    matches_expected,
};
pub use document::{AssociationStorage, DocumentDialect};
pub use error::StorageError;
pub use map::MapDialect;

//! Core data model of the object/grid mapper.
//!
//! # Architecture
//!
//! Everything above the physical stores speaks in terms of this crate:
//! immutable keys identify records, journaled tuples and associations carry
//! pending changes, and mapping metadata describes how entities and
//! collections are laid out in columns.
//!
//! # Modules
//!
//! - [`key`]: entity, association and row keys plus their metadata
//! - [`tuple`]: journaled logical rows and the per unit-of-work [`TuplePointer`]
//! - [`association`]: journaled relationship sets
//! - [`model`]: entity/collection mappings and dehydrated object state
//! - [`value`]: column values
//! - [`error`]: the shared [`OgmError`] taxonomy

pub mod association;
pub mod error;
pub mod key;
pub mod model;
pub mod tuple;
pub mod value;

// Re-export commonly used types
pub use association::{
    Association, AssociationOperation, AssociationSnapshot, MapAssociationSnapshot,
};
pub use error::OgmError;
pub use key::{
    AssociatedEntityKeyMetadata, AssociationKey, AssociationKeyMetadata, AssociationKind,
    EntityKey, EntityKeyMetadata, RowKey, RowKeyBuilder,
};
pub use model::{
    CollectionEntry, CollectionMapping, Discriminator, ElementKind, EntityMapping, EntityState,
    OptimisticLockStyle, PropertyKind, PropertyMapping,
};
pub use tuple::{MapTupleSnapshot, SnapshotType, Tuple, TupleOperation, TuplePointer, TupleSnapshot};
pub use value::Value;

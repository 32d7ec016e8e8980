//! Persisters: entity and collection writes over any [`GridDialect`].
//!
//! # Architecture
//!
//! A [`Metamodel`] is built once from entity and collection mappings. It
//! derives key metadata, tuple contexts and association shapes, and resolves
//! which association navigates each bidirectional link backwards. A
//! [`Session`] is one unit of work: it borrows the dialect and the metamodel,
//! caches the tuples it has seen, and runs [`EntityPersister`] and
//! [`CollectionPersister`] operations. Every write keeps the far side of the
//! touched links consistent, so both navigation directions read the same
//! relationships.
//!
//! # Modules
//!
//! - [`metamodel`]: persister metadata and inverse resolution results
//! - [`bidirectional`]: matching rules for inverse sides
//! - [`association_persister`]: lazy association access and flushing
//! - [`entity_persister`]: entity insert, update, delete and reads
//! - [`collection_persister`]: collection rows and their far side
//! - [`session`]: the unit of work
//! - [`config`]: [`OgmConfig`] from JSON or environment variables
//! - [`provider`]: opens the configured store and builds the metamodel
//! - [`error`]: [`ConfigError`]
//!
//! [`GridDialect`]: ogm_storage::GridDialect

pub mod association_persister;
pub mod bidirectional;
pub mod collection_persister;
pub mod config;
pub mod entity_persister;
pub mod error;
mod inverse_updater;
pub mod metamodel;
pub mod provider;
pub mod session;

pub use association_persister::AssociationPersister;
pub use collection_persister::CollectionPersister;
pub use config::{DatastoreConfig, DuplicateInsertPrevention, OgmConfig};
pub use entity_persister::EntityPersister;
pub use error::ConfigError;
pub use metamodel::{
    AssociationShape, CollectionMetadata, EntityMetadata, InverseAssociation, Metamodel,
};
pub use provider::{bootstrap, open_datastore};
pub use session::Session;

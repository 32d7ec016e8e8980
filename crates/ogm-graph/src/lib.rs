//! Property-graph backend and Cypher query synthesis.
//!
//! # Architecture
//!
//! Every physical access is a [`CompiledQuery`]: Cypher text plus an
//! executable [`Statement`]. Templates are built once per entity type and
//! association role and cached; request-shaped templates (multi-get by key
//! count, embedded columns) are compiled lazily. [`GraphDialect`] maps the
//! tuple and association journals onto these templates and runs them through
//! a [`GraphExecutor`]. [`PropertyGraph`] is the in-process executor.
//!
//! # Modules
//!
//! - [`cypher`]: identifier escaping, labels and pattern fragments
//! - [`statement`]: compiled statements
//! - [`entity_queries`]: per entity type templates
//! - [`association_queries`]: per association role templates
//! - [`cache`]: bounded LRU cache for templates
//! - [`graph`]: the executor seam and the in-process graph
//! - [`native`]: parser for the native Cypher subset
//! - [`dialect`]: [`GraphDialect`]
//! - [`error`]: [`GraphError`]

pub mod association_queries;
pub mod cache;
pub mod cypher;
pub mod dialect;
pub mod entity_queries;
pub mod error;
pub mod graph;
pub mod native;
pub mod statement;

pub use association_queries::AssociationQueries;
pub use cache::BoundedCache;
pub use dialect::{GraphDialect, NodeSnapshot, DEFAULT_QUERY_CACHE_CAPACITY};
pub use entity_queries::EntityQueries;
pub use error::GraphError;
pub use graph::{
    EmbeddedView, EntityMatch, GraphExecutor, NodeRef, NodeView, PropertyGraph, QueryResult,
    RelationshipMatch,
};
pub use native::NativeQuery;
pub use statement::{CompiledQuery, Direction, NodePattern, Statement, Target};

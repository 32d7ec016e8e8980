//! The [`GridDialect`] trait: everything a physical store must provide.
//!
//! Persisters only ever talk to a `&mut dyn GridDialect`. Reads take `&self`,
//! writes take `&mut self`, mirroring the rest of the workspace. All calls are
//! blocking round-trips; there is no internal scheduling.
//!
//! A dialect receives journaled [`Tuple`]s and [`Association`]s and is free to
//! batch, coalesce, or translate the journal into its own physical writes.
//! After a successful flush it rebases the tuple/association onto the new
//! physical state.

use std::sync::Arc;

use indexmap::IndexMap;

use ogm_core::key::{
    AssociatedEntityKeyMetadata, AssociationKey, AssociationKeyMetadata, EntityKey,
    EntityKeyMetadata,
};
use ogm_core::{Association, OgmError, Tuple, Value};

/// How a store detects an insert colliding with an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateInsertPreventionStrategy {
    /// The persister reads the key first and raises `DuplicateKey` itself.
    LookUp,
    /// The store rejects the write; the dialect raises `DuplicateKey`.
    Native,
}

// ---------------------------------------------------------------------------
// Operation contexts
// ---------------------------------------------------------------------------

/// A to-one association seen from the owning entity's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToOneAssociation {
    /// Property name; graph-like stores type the physical link with it.
    pub role: String,
    /// FK columns and the target's key metadata.
    pub target: AssociatedEntityKeyMetadata,
}

/// Per entity type information handed to tuple operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleContext {
    selectable_columns: Vec<String>,
    to_one_associations: Vec<ToOneAssociation>,
}

impl TupleContext {
    pub fn new(
        selectable_columns: Vec<String>,
        to_one_associations: Vec<ToOneAssociation>,
    ) -> Self {
        TupleContext {
            selectable_columns,
            to_one_associations,
        }
    }

    pub fn selectable_columns(&self) -> &[String] {
        &self.selectable_columns
    }

    pub fn is_selectable(&self, column: &str) -> bool {
        self.selectable_columns.is_empty() || self.selectable_columns.iter().any(|c| c == column)
    }

    pub fn to_one_associations(&self) -> &[ToOneAssociation] {
        &self.to_one_associations
    }

    /// The to-one whose FK columns include `column`.
    pub fn to_one_for_column(&self, column: &str) -> Option<&ToOneAssociation> {
        self.to_one_associations
            .iter()
            .find(|a| a.target.is_association_key_column(column))
    }
}

/// Per association information handed to association operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationContext {
    role_on_main_side: String,
}

impl AssociationContext {
    pub fn new(role_on_main_side: impl Into<String>) -> Self {
        AssociationContext {
            role_on_main_side: role_on_main_side.into(),
        }
    }

    /// Role name both directions agree on for the physical link.
    pub fn role_on_main_side(&self) -> &str {
        &self.role_on_main_side
    }
}

// ---------------------------------------------------------------------------
// Id generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSourceKind {
    Sequence,
    Table,
}

/// Names one id source: a sequence, or one segment of a generator table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdSourceKey {
    kind: IdSourceKind,
    name: String,
}

impl IdSourceKey {
    pub fn sequence(name: impl Into<String>) -> Self {
        IdSourceKey {
            kind: IdSourceKind::Sequence,
            name: name.into(),
        }
    }

    pub fn table(table: &str, segment: &str) -> Self {
        IdSourceKey {
            kind: IdSourceKind::Table,
            name: format!("{}.{}", table, segment),
        }
    }

    pub fn kind(&self) -> IdSourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Request for the next value of an id source.
///
/// The first call for a source returns `initial_value`; each later call
/// returns the previous result plus `increment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextValueRequest {
    pub key: IdSourceKey,
    pub increment: i64,
    pub initial_value: i64,
}

impl NextValueRequest {
    pub fn new(key: IdSourceKey) -> Self {
        NextValueRequest {
            key,
            increment: 1,
            initial_value: 1,
        }
    }

    pub fn increment(mut self, increment: i64) -> Self {
        self.increment = increment;
        self
    }

    pub fn initial_value(mut self, initial_value: i64) -> Self {
        self.initial_value = initial_value;
        self
    }
}

// ---------------------------------------------------------------------------
// Native queries and schema notification
// ---------------------------------------------------------------------------

/// A query in the store's own language with named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendQuery {
    pub query: String,
    pub parameters: IndexMap<String, Value>,
    /// Entity type the results are read as, when the store needs to know.
    pub entity: Option<Arc<EntityKeyMetadata>>,
}

impl BackendQuery {
    pub fn new(query: impl Into<String>) -> Self {
        BackendQuery {
            query: query.into(),
            parameters: IndexMap::new(),
            entity: None,
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn returning(mut self, entity: Arc<EntityKeyMetadata>) -> Self {
        self.entity = Some(entity);
        self
    }
}

/// Results of a native query, one tuple per matched record.
pub type TupleStream = Box<dyn Iterator<Item = Tuple>>;

/// Everything the metamodel built, passed once after all persisters exist.
#[derive(Debug, Clone, Default)]
pub struct SchemaDefinition {
    pub entity_key_metadata: Vec<Arc<EntityKeyMetadata>>,
    pub association_key_metadata: Vec<Arc<AssociationKeyMetadata>>,
    pub id_source_keys: Vec<IdSourceKey>,
}

// ---------------------------------------------------------------------------
// The dialect contract
// ---------------------------------------------------------------------------

/// The storage contract every physical store implements.
pub trait GridDialect {
    // -------------------------------------------------------------------
    // Tuples
    // -------------------------------------------------------------------

    /// Reads one entity record, `None` when absent.
    fn get_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<Option<Tuple>, OgmError>;

    /// Reads several records. The result has one slot per input key, in
    /// input order; absent keys yield `None` rather than being skipped.
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>, OgmError> {
        keys.iter().map(|k| self.get_tuple(k, context)).collect()
    }

    /// Returns an empty tuple for a record that does not exist yet.
    fn create_tuple(&mut self, key: &EntityKey, context: &TupleContext) -> Result<Tuple, OgmError>;

    /// Flushes the tuple's journal and rebases it.
    fn insert_or_update_tuple(
        &mut self,
        key: &EntityKey,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<(), OgmError>;

    fn remove_tuple(&mut self, key: &EntityKey, context: &TupleContext) -> Result<(), OgmError>;

    // -------------------------------------------------------------------
    // Associations
    // -------------------------------------------------------------------

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, OgmError>;

    fn create_association(
        &mut self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Association, OgmError>;

    /// Flushes the association's journal and rebases it.
    fn insert_or_update_association(
        &mut self,
        key: &AssociationKey,
        association: &mut Association,
        context: &AssociationContext,
    ) -> Result<(), OgmError>;

    fn remove_association(
        &mut self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), OgmError>;

    /// Whether the association's rows live inside the owning entity's record.
    fn is_stored_in_entity_structure(&self, metadata: &AssociationKeyMetadata) -> bool;

    // -------------------------------------------------------------------
    // Ids and native queries
    // -------------------------------------------------------------------

    fn next_value(&mut self, request: &NextValueRequest) -> Result<i64, OgmError>;

    fn execute_backend_query(&self, query: &BackendQuery) -> Result<TupleStream, OgmError> {
        let _ = query;
        Err(OgmError::unsupported("native queries"))
    }

    /// Runs a native update and returns the number of affected records.
    fn execute_backend_update_query(&mut self, query: &BackendQuery) -> Result<u64, OgmError> {
        let _ = query;
        Err(OgmError::unsupported("native update queries"))
    }

    // -------------------------------------------------------------------
    // Capabilities
    // -------------------------------------------------------------------

    /// `false` means `PutNull` must become a column removal.
    fn supports_null_values(&self) -> bool {
        true
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        let _ = metadata;
        DuplicateInsertPreventionStrategy::LookUp
    }

    fn supports_atomic_optimistic_locking(&self) -> bool {
        false
    }

    /// Writes `tuple` only if the stored record still matches every column
    /// of `expected`. Returns `false` when the check failed.
    fn update_tuple_with_optimistic_lock(
        &mut self,
        key: &EntityKey,
        expected: &Tuple,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<bool, OgmError> {
        let _ = (key, expected, tuple, context);
        Err(OgmError::unsupported("atomic optimistic locking"))
    }

    /// Removes the record only if it still matches `expected`.
    fn remove_tuple_with_optimistic_lock(
        &mut self,
        key: &EntityKey,
        expected: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, OgmError> {
        let _ = (key, expected, context);
        Err(OgmError::unsupported("atomic optimistic locking"))
    }

    /// Called once after every persister exists.
    fn schema_created(&mut self, schema: &SchemaDefinition) -> Result<(), OgmError> {
        let _ = schema;
        Ok(())
    }
}

/// True when every column of `expected` equals the same column in `stored`.
pub fn matches_expected(stored: &Tuple, expected: &Tuple) -> bool {
    expected
        .column_names()
        .iter()
        .all(|column| stored.get_non_null(column) == expected.get_non_null(column))
}

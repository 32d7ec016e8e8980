//! The unit of work.
//!
//! A [`Session`] borrows the dialect and the metamodel, owns the tuple cache
//! of one unit of work, and exposes the persister operations by entity name
//! and collection role. It is meant to be dropped at the end of the unit of
//! work; nothing it caches is shared with other sessions.

use std::collections::HashMap;

use tracing::trace;

use ogm_core::{CollectionEntry, EntityKey, EntityState, OgmError, Tuple, TuplePointer, Value};
use ogm_storage::{BackendQuery, GridDialect, NextValueRequest, TupleContext, TupleStream};

use crate::collection_persister::CollectionPersister;
use crate::entity_persister::EntityPersister;
use crate::metamodel::Metamodel;

pub struct Session<'a> {
    pub(crate) dialect: &'a mut dyn GridDialect,
    pub(crate) metamodel: &'a Metamodel,
    tuples: HashMap<EntityKey, TuplePointer>,
}

impl<'a> Session<'a> {
    pub fn new(dialect: &'a mut dyn GridDialect, metamodel: &'a Metamodel) -> Self {
        Session {
            dialect,
            metamodel,
            tuples: HashMap::new(),
        }
    }

    pub fn metamodel(&self) -> &'a Metamodel {
        self.metamodel
    }

    pub fn dialect(&self) -> &dyn GridDialect {
        &*self.dialect
    }

    // -----------------------------------------------------------------------
    // Tuple cache
    // -----------------------------------------------------------------------

    /// Latest tuple of `key`: the cached one, else read from the store.
    pub(crate) fn tuple(
        &mut self,
        key: &EntityKey,
        context: &TupleContext,
    ) -> Result<Option<Tuple>, OgmError> {
        if let Some(tuple) = self.cached(key) {
            return Ok(Some(tuple));
        }
        let tuple = self.dialect.get_tuple(key, context)?;
        if let Some(tuple) = &tuple {
            self.remember(key.clone(), tuple.clone());
        }
        Ok(tuple)
    }

    pub(crate) fn cached(&self, key: &EntityKey) -> Option<Tuple> {
        self.tuples.get(key).and_then(TuplePointer::get).cloned()
    }

    pub(crate) fn remember(&mut self, key: EntityKey, tuple: Tuple) {
        self.tuples.entry(key).or_default().set(tuple);
    }

    pub(crate) fn forget(&mut self, key: &EntityKey) {
        if let Some(mut pointer) = self.tuples.remove(key) {
            pointer.take();
        }
    }

    /// Whether the session holds a tuple for `key`.
    pub fn is_cached(&self, key: &EntityKey) -> bool {
        self.tuples.get(key).is_some_and(|p| p.get().is_some())
    }

    /// Drops every cached tuple.
    pub fn clear(&mut self) {
        trace!(tuples = self.tuples.len(), "session cache cleared");
        self.tuples.clear();
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    pub fn insert(
        &mut self,
        entity: &str,
        id: &[Value],
        state: &EntityState,
    ) -> Result<(), OgmError> {
        EntityPersister::new(self.metamodel, entity)?.insert(self, id, state)
    }

    /// Writes the properties that differ between `old_state` and `new_state`.
    ///
    /// `old_state` is what the caller read; versioned entities compare it
    /// with the stored record and fail with `StaleState` on mismatch.
    pub fn update(
        &mut self,
        entity: &str,
        id: &[Value],
        old_state: &EntityState,
        new_state: &EntityState,
    ) -> Result<(), OgmError> {
        EntityPersister::new(self.metamodel, entity)?.update(self, id, old_state, new_state)
    }

    pub fn delete(
        &mut self,
        entity: &str,
        id: &[Value],
        state: &EntityState,
    ) -> Result<(), OgmError> {
        EntityPersister::new(self.metamodel, entity)?.delete(self, id, state)
    }

    pub fn find(&mut self, entity: &str, id: &[Value]) -> Result<Option<EntityState>, OgmError> {
        EntityPersister::new(self.metamodel, entity)?.load(self, id)
    }

    /// Batch read; one slot per id, in order.
    pub fn find_many(
        &mut self,
        entity: &str,
        ids: &[Vec<Value>],
    ) -> Result<Vec<Option<EntityState>>, OgmError> {
        EntityPersister::new(self.metamodel, entity)?.load_many(self, ids)
    }

    pub fn load_lazy_property(
        &mut self,
        entity: &str,
        id: &[Value],
        property: &str,
    ) -> Result<Value, OgmError> {
        EntityPersister::new(self.metamodel, entity)?.load_lazy_property(self, id, property)
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    /// Writes every entry of a collection that has no stored rows yet.
    pub fn recreate_collection(
        &mut self,
        role: &str,
        owner_id: &[Value],
        entries: &[CollectionEntry],
    ) -> Result<usize, OgmError> {
        CollectionPersister::new(self.metamodel, role)?.recreate(self, owner_id, entries)
    }

    pub fn insert_rows(
        &mut self,
        role: &str,
        owner_id: &[Value],
        entries: &[CollectionEntry],
    ) -> Result<usize, OgmError> {
        CollectionPersister::new(self.metamodel, role)?.insert_rows(self, owner_id, entries)
    }

    pub fn update_rows(
        &mut self,
        role: &str,
        owner_id: &[Value],
        entries: &[CollectionEntry],
    ) -> Result<usize, OgmError> {
        CollectionPersister::new(self.metamodel, role)?.update_rows(self, owner_id, entries)
    }

    pub fn delete_rows(
        &mut self,
        role: &str,
        owner_id: &[Value],
        entries: &[CollectionEntry],
    ) -> Result<usize, OgmError> {
        CollectionPersister::new(self.metamodel, role)?.delete_rows(self, owner_id, entries)
    }

    pub fn remove_collection(&mut self, role: &str, owner_id: &[Value]) -> Result<(), OgmError> {
        CollectionPersister::new(self.metamodel, role)?.remove(self, owner_id)
    }

    pub fn load_collection(
        &mut self,
        role: &str,
        owner_id: &[Value],
    ) -> Result<Vec<CollectionEntry>, OgmError> {
        CollectionPersister::new(self.metamodel, role)?.load(self, owner_id)
    }

    pub fn collection_size(&mut self, role: &str, owner_id: &[Value]) -> Result<usize, OgmError> {
        CollectionPersister::new(self.metamodel, role)?.size(self, owner_id)
    }

    // -----------------------------------------------------------------------
    // Ids and native queries
    // -----------------------------------------------------------------------

    pub fn next_value(&mut self, request: &NextValueRequest) -> Result<i64, OgmError> {
        self.dialect.next_value(request)
    }

    pub fn execute_query(&self, query: &BackendQuery) -> Result<TupleStream, OgmError> {
        self.dialect.execute_backend_query(query)
    }

    /// Runs a native update; cached tuples may be outdated afterwards, so
    /// the cache is dropped.
    pub fn execute_update(&mut self, query: &BackendQuery) -> Result<u64, OgmError> {
        let affected = self.dialect.execute_backend_update_query(query)?;
        self.clear();
        Ok(affected)
    }
}

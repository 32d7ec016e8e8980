//! Entity record writes and reads.
//!
//! Every write path goes through the same steps: locate the record, build or
//! adjust its tuple, check optimistic locking, flush through the dialect,
//! then keep inverse associations in step with the to-one columns that
//! changed.

use std::sync::Arc;

use tracing::{debug, trace};

use ogm_core::{
    EntityKey, EntityMapping, EntityState, OgmError, OptimisticLockStyle, PropertyMapping, Tuple,
    Value,
};
use ogm_storage::{matches_expected, DuplicateInsertPreventionStrategy, GridDialect};

use crate::collection_persister::CollectionPersister;
use crate::inverse_updater::{add_navigational_information, remove_navigational_information};
use crate::metamodel::{EntityMetadata, Metamodel};
use crate::session::Session;

#[derive(Debug, Clone, Copy)]
pub struct EntityPersister<'m> {
    metamodel: &'m Metamodel,
    metadata: &'m EntityMetadata,
}

impl<'m> EntityPersister<'m> {
    pub fn new(metamodel: &'m Metamodel, entity: &str) -> Result<Self, OgmError> {
        Ok(EntityPersister {
            metamodel,
            metadata: metamodel.entity(entity)?,
        })
    }

    pub fn metadata(&self) -> &'m EntityMetadata {
        self.metadata
    }

    pub fn key(&self, id: &[Value]) -> Result<EntityKey, OgmError> {
        EntityKey::new(Arc::clone(self.metadata.key_metadata()), id.iter().cloned())
    }

    fn mapping(&self) -> &'m EntityMapping {
        self.metadata.mapping()
    }

    fn duplicate_insert_prevention(
        &self,
        dialect: &dyn GridDialect,
    ) -> DuplicateInsertPreventionStrategy {
        self.metamodel
            .duplicate_insert_prevention()
            .unwrap_or_else(|| {
                dialect.duplicate_insert_prevention_strategy(self.metadata.key_metadata())
            })
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn insert(
        &self,
        session: &mut Session<'_>,
        id: &[Value],
        state: &EntityState,
    ) -> Result<(), OgmError> {
        let key = self.key(id)?;
        let context = self.metadata.tuple_context();

        let strategy = self.duplicate_insert_prevention(&*session.dialect);
        if strategy == DuplicateInsertPreventionStrategy::LookUp
            && session.dialect.get_tuple(&key, context)?.is_some()
        {
            return Err(OgmError::DuplicateKey {
                table: key.table().to_string(),
                key: key.to_string(),
            });
        }

        let mut tuple = session.dialect.create_tuple(&key, context)?;
        for (column, value) in key.columns() {
            tuple.put(column, value.clone());
        }
        if let Some((column, value)) = self.mapping().discriminator.column_value() {
            tuple.put(column, value.clone());
        }
        let supports_nulls = session.dialect.supports_null_values();
        for property in self.mapping().properties.iter().filter(|p| p.insertable) {
            for column in &property.columns {
                match state.get(column) {
                    Some(value) if !value.is_null() => tuple.put(column.clone(), value.clone()),
                    Some(_) if supports_nulls => tuple.put_null(column.clone()),
                    _ => {}
                }
            }
        }

        session.dialect.insert_or_update_tuple(&key, &mut tuple, context)?;
        add_navigational_information(session, self.metadata, &key, &tuple, None)?;
        debug!(entity = %self.metadata.name(), key = %key, "entity inserted");
        session.remember(key, tuple);
        Ok(())
    }

    /// Writes the properties whose columns differ between the two states.
    pub fn update(
        &self,
        session: &mut Session<'_>,
        id: &[Value],
        old_state: &EntityState,
        new_state: &EntityState,
    ) -> Result<(), OgmError> {
        let key = self.key(id)?;
        let context = self.metadata.tuple_context();
        // Always the stored record: a cached tuple cannot reveal concurrent writes.
        let Some(stored) = session.dialect.get_tuple(&key, context)? else {
            return Err(self.stale(&key));
        };

        let dirty: Vec<&PropertyMapping> = self
            .mapping()
            .properties
            .iter()
            .filter(|p| p.updatable && !p.is_collection() && !p.columns.is_empty())
            .filter(|p| old_state.values(&p.columns) != new_state.values(&p.columns))
            .collect();
        if dirty.is_empty() {
            trace!(entity = %self.metadata.name(), key = %key, "nothing to update");
            return Ok(());
        }

        let expected = self.expected_tuple(old_state);
        let previous = stored.clone();
        let mut tuple = stored;
        let supports_nulls = session.dialect.supports_null_values();
        for property in &dirty {
            for column in &property.columns {
                match new_state.get(column) {
                    Some(value) if !value.is_null() => tuple.put(column.clone(), value.clone()),
                    _ if supports_nulls => tuple.put_null(column.clone()),
                    _ => tuple.remove(column.clone()),
                }
            }
        }

        match &expected {
            Some(expected) if session.dialect.supports_atomic_optimistic_locking() => {
                if !session
                    .dialect
                    .update_tuple_with_optimistic_lock(&key, expected, &mut tuple, context)?
                {
                    return Err(self.stale(&key));
                }
            }
            Some(expected) => {
                if !matches_expected(&previous, expected) {
                    return Err(self.stale(&key));
                }
                session.dialect.insert_or_update_tuple(&key, &mut tuple, context)?;
            }
            None => session.dialect.insert_or_update_tuple(&key, &mut tuple, context)?,
        }

        let dirty_names: Vec<String> = dirty.iter().map(|p| p.name.clone()).collect();
        let only = Some(dirty_names.as_slice());
        remove_navigational_information(session, self.metadata, &key, &previous, only)?;
        add_navigational_information(session, self.metadata, &key, &tuple, only)?;
        debug!(
            entity = %self.metadata.name(),
            key = %key,
            properties = dirty_names.len(),
            "entity updated"
        );
        session.remember(key, tuple);
        Ok(())
    }

    /// Removes the record, its owned collections and its inverse rows.
    pub fn delete(
        &self,
        session: &mut Session<'_>,
        id: &[Value],
        state: &EntityState,
    ) -> Result<(), OgmError> {
        let key = self.key(id)?;
        let context = self.metadata.tuple_context();
        let Some(stored) = session.dialect.get_tuple(&key, context)? else {
            session.forget(&key);
            if self.mapping().is_versioned() {
                return Err(self.stale(&key));
            }
            trace!(entity = %self.metadata.name(), key = %key, "already deleted");
            return Ok(());
        };

        let expected = self.expected_tuple(state);
        if let Some(expected) = &expected {
            if !matches_expected(&stored, expected) {
                return Err(self.stale(&key));
            }
        }

        remove_navigational_information(session, self.metadata, &key, &stored, None)?;
        for role in self.mapping().properties.iter().filter_map(PropertyMapping::collection_role) {
            let collection = self.metamodel.collection(role)?;
            if !collection.is_inverse() {
                CollectionPersister::for_metadata(self.metamodel, collection).remove(session, id)?;
            }
        }

        match &expected {
            Some(expected) if session.dialect.supports_atomic_optimistic_locking() => {
                if !session.dialect.remove_tuple_with_optimistic_lock(&key, expected, context)? {
                    return Err(self.stale(&key));
                }
            }
            _ => session.dialect.remove_tuple(&key, context)?,
        }
        session.forget(&key);
        debug!(entity = %self.metadata.name(), key = %key, "entity deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn load(
        &self,
        session: &mut Session<'_>,
        id: &[Value],
    ) -> Result<Option<EntityState>, OgmError> {
        let key = self.key(id)?;
        let tuple = session.tuple(&key, self.metadata.tuple_context())?;
        Ok(tuple.and_then(|tuple| self.hydrate(&tuple)))
    }

    /// Batch read; cached records are not fetched again.
    pub fn load_many(
        &self,
        session: &mut Session<'_>,
        ids: &[Vec<Value>],
    ) -> Result<Vec<Option<EntityState>>, OgmError> {
        let keys = ids
            .iter()
            .map(|id| self.key(id))
            .collect::<Result<Vec<_>, _>>()?;
        let mut tuples: Vec<Option<Tuple>> = keys.iter().map(|key| session.cached(key)).collect();
        let missing: Vec<usize> = (0..keys.len()).filter(|&i| tuples[i].is_none()).collect();
        if !missing.is_empty() {
            let missing_keys: Vec<EntityKey> = missing.iter().map(|&i| keys[i].clone()).collect();
            let fetched = session
                .dialect
                .get_tuples(&missing_keys, self.metadata.tuple_context())?;
            for (i, tuple) in missing.into_iter().zip(fetched) {
                if let Some(tuple) = &tuple {
                    session.remember(keys[i].clone(), tuple.clone());
                }
                tuples[i] = tuple;
            }
        }
        Ok(tuples
            .into_iter()
            .map(|tuple| tuple.and_then(|tuple| self.hydrate(&tuple)))
            .collect())
    }

    pub fn load_lazy_property(
        &self,
        _session: &mut Session<'_>,
        _id: &[Value],
        property: &str,
    ) -> Result<Value, OgmError> {
        if !self.mapping().lazy_properties.iter().any(|p| p == property) {
            return Err(OgmError::mapping(format!(
                "property '{}.{}' is not lazy",
                self.metadata.name(),
                property
            )));
        }
        Err(OgmError::unsupported("lazy property loading"))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn hydrate(&self, tuple: &Tuple) -> Option<EntityState> {
        if let Some((column, value)) = self.mapping().discriminator.column_value() {
            if tuple.get(column).as_ref() != Some(value) {
                trace!(entity = %self.metadata.name(), "record belongs to another type");
                return None;
            }
        }
        let mut state = EntityState::new();
        for column in self.mapping().all_columns() {
            if let Some(value) = tuple.get(&column) {
                state.set(&column, value);
            }
        }
        Some(state)
    }

    /// Columns an optimistic-lock check compares, `None` without locking.
    fn expected_tuple(&self, state: &EntityState) -> Option<Tuple> {
        let mapping = self.mapping();
        let columns: Vec<&String> = match mapping.lock_style {
            OptimisticLockStyle::None => return None,
            OptimisticLockStyle::Version => mapping.version_property()?.columns.iter().collect(),
            OptimisticLockStyle::All => mapping
                .properties
                .iter()
                .filter(|p| !p.is_collection())
                .flat_map(|p| &p.columns)
                .collect(),
        };
        let mut expected = Tuple::new();
        for column in columns {
            expected.put(column.clone(), state.get(column).cloned().unwrap_or(Value::Null));
        }
        Some(expected)
    }

    fn stale(&self, key: &EntityKey) -> OgmError {
        OgmError::StaleState {
            entity: self.metadata.name().to_string(),
            id: key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogm_core::Discriminator;
    use ogm_storage::MapDialect;

    fn products(dialect: &mut MapDialect) -> Metamodel {
        Metamodel::build(
            vec![EntityMapping::new("Product", "Product", &["id"])
                .property(PropertyMapping::basic("name", &["name"]))
                .property(PropertyMapping::basic("version", &["version"]))
                .property(PropertyMapping::basic("created", &["created"]).updatable(false))
                .versioned("version")
                .lazy("name")],
            vec![],
            dialect,
        )
        .unwrap()
    }

    fn product(name: &str, version: i64) -> EntityState {
        EntityState::new()
            .with("name", name)
            .with("version", version)
            .with("created", "monday")
    }

    #[test]
    fn test_insert_then_find() {
        let mut dialect = MapDialect::new();
        let metamodel = products(&mut dialect);
        let mut session = Session::new(&mut dialect, &metamodel);
        let id = [Value::Int(1)];

        session.insert("Product", &id, &product("lamp", 0)).unwrap();
        let found = session.find("Product", &id).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::from("lamp")));
        assert_eq!(found.get("id"), Some(&Value::Int(1)));
        assert!(session.find("Product", &[Value::Int(2)]).unwrap().is_none());
    }

    #[test]
    fn test_stale_version_rejected() {
        let mut dialect = MapDialect::new();
        let metamodel = products(&mut dialect);
        let mut session = Session::new(&mut dialect, &metamodel);
        let id = [Value::Int(1)];

        session.insert("Product", &id, &product("lamp", 0)).unwrap();
        session
            .update("Product", &id, &product("lamp", 0), &product("desk lamp", 1))
            .unwrap();
        let err = session
            .update("Product", &id, &product("lamp", 0), &product("floor lamp", 1))
            .unwrap_err();
        assert!(matches!(err, OgmError::StaleState { ref entity, .. } if entity == "Product"));

        let err = session.delete("Product", &id, &product("lamp", 0)).unwrap_err();
        assert!(matches!(err, OgmError::StaleState { .. }));
        session.delete("Product", &id, &product("desk lamp", 1)).unwrap();
        let err = session.delete("Product", &id, &product("desk lamp", 1)).unwrap_err();
        assert!(matches!(err, OgmError::StaleState { .. }));
    }

    #[test]
    fn test_non_updatable_columns_keep_their_value() {
        let mut dialect = MapDialect::new();
        let metamodel = products(&mut dialect);
        let mut session = Session::new(&mut dialect, &metamodel);
        let id = [Value::Int(1)];

        session.insert("Product", &id, &product("lamp", 0)).unwrap();
        let changed = product("lamp", 1).with("created", "tuesday");
        session.update("Product", &id, &product("lamp", 0), &changed).unwrap();
        let found = session.find("Product", &id).unwrap().unwrap();
        assert_eq!(found.get("created"), Some(&Value::from("monday")));
        assert_eq!(found.get("version"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_duplicate_insert_looked_up() {
        let mut dialect = MapDialect::new();
        let metamodel = products(&mut dialect);
        let mut session = Session::new(&mut dialect, &metamodel);
        let id = [Value::Int(1)];

        session.insert("Product", &id, &product("lamp", 0)).unwrap();
        let err = session.insert("Product", &id, &product("lamp", 0)).unwrap_err();
        assert!(matches!(err, OgmError::DuplicateKey { ref table, .. } if table == "Product"));
    }

    #[test]
    fn test_discriminator_filters_sibling_types() {
        let mut dialect = MapDialect::new();
        let discriminated = |name: &str, value: &str| {
            EntityMapping::new(name, "Vehicle", &["id"])
                .property(PropertyMapping::basic("wheels", &["wheels"]))
                .discriminator(Discriminator::Column {
                    column: "type".into(),
                    value: Value::from(value),
                })
        };
        let metamodel = Metamodel::build(
            vec![discriminated("Car", "car"), discriminated("Bike", "bike")],
            vec![],
            &mut dialect,
        )
        .unwrap();
        let mut session = Session::new(&mut dialect, &metamodel);

        session
            .insert("Car", &[Value::Int(1)], &EntityState::new().with("wheels", 4))
            .unwrap();
        let car = session.find("Car", &[Value::Int(1)]).unwrap().unwrap();
        assert_eq!(car.get("type"), Some(&Value::from("car")));
        assert!(session.find("Bike", &[Value::Int(1)]).unwrap().is_none());
    }

    #[test]
    fn test_find_many_keeps_slots() {
        let mut dialect = MapDialect::new();
        let metamodel = products(&mut dialect);
        let mut session = Session::new(&mut dialect, &metamodel);
        session.insert("Product", &[Value::Int(1)], &product("lamp", 0)).unwrap();
        session.insert("Product", &[Value::Int(3)], &product("desk", 0)).unwrap();
        session.clear();

        let found = session
            .find_many("Product", &[vec![Value::Int(3)], vec![Value::Int(2)], vec![Value::Int(1)]])
            .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].as_ref().and_then(|s| s.get("name")), Some(&Value::from("desk")));
        assert!(found[1].is_none());
        assert_eq!(found[2].as_ref().and_then(|s| s.get("name")), Some(&Value::from("lamp")));
    }

    #[test]
    fn test_lazy_property_loading_unsupported() {
        let mut dialect = MapDialect::new();
        let metamodel = products(&mut dialect);
        let mut session = Session::new(&mut dialect, &metamodel);
        let id = [Value::Int(1)];
        let err = session.load_lazy_property("Product", &id, "name").unwrap_err();
        assert!(matches!(err, OgmError::UnsupportedOperation { .. }));
        let err = session.load_lazy_property("Product", &id, "version").unwrap_err();
        assert!(matches!(err, OgmError::Mapping { .. }));
    }
}

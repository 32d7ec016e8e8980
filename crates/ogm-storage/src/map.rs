//! In-memory implementation of [`GridDialect`].
//!
//! [`MapDialect`] keeps entity records, associations and sequences in
//! HashMaps. It stores explicit nulls, prevents duplicate inserts by look-up,
//! and offers atomic optimistic locking (compare and write happen under the
//! same `&mut self` borrow). Every association, inverse ones included, is
//! kept in its own structure.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{debug, trace};

use ogm_core::association::{apply_association_operations, RowValues};
use ogm_core::key::{AssociationKey, AssociationKeyMetadata, EntityKey, RowKey};
use ogm_core::tuple::apply_tuple_operations;
use ogm_core::{
    Association, MapAssociationSnapshot, MapTupleSnapshot, OgmError, SnapshotType, Tuple, Value,
};

use crate::dialect::{
    matches_expected, AssociationContext, GridDialect, IdSourceKey, NextValueRequest,
    TupleContext,
};
use crate::error::StorageError;

type Record = IndexMap<String, Value>;

/// In-memory key-value backend.
#[derive(Debug, Default)]
pub struct MapDialect {
    entities: HashMap<EntityKey, Record>,
    associations: HashMap<AssociationKey, IndexMap<RowKey, RowValues>>,
    sequences: HashMap<IdSourceKey, i64>,
}

impl MapDialect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entity records, all tables.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of stored non-empty associations, all tables.
    pub fn association_count(&self) -> usize {
        self.associations.len()
    }

    fn write_tuple(&mut self, key: &EntityKey, tuple: &mut Tuple) {
        let record = self.entities.entry(key.clone()).or_default();
        apply_tuple_operations(record, tuple.operations(), true);
        for (column, value) in key.columns() {
            record.entry(column.to_string()).or_insert_with(|| value.clone());
        }
        trace!(key = %key, columns = record.len(), "map: tuple written");
        tuple.rebase(Box::new(MapTupleSnapshot::new(record.clone())));
    }
}

impl GridDialect for MapDialect {
    fn get_tuple(
        &self,
        key: &EntityKey,
        _context: &TupleContext,
    ) -> Result<Option<Tuple>, OgmError> {
        Ok(self
            .entities
            .get(key)
            .map(|record| Tuple::from_values(record.clone(), SnapshotType::Update)))
    }

    fn create_tuple(
        &mut self,
        _key: &EntityKey,
        _context: &TupleContext,
    ) -> Result<Tuple, OgmError> {
        Ok(Tuple::new())
    }

    fn insert_or_update_tuple(
        &mut self,
        key: &EntityKey,
        tuple: &mut Tuple,
        _context: &TupleContext,
    ) -> Result<(), OgmError> {
        self.write_tuple(key, tuple);
        Ok(())
    }

    fn remove_tuple(&mut self, key: &EntityKey, _context: &TupleContext) -> Result<(), OgmError> {
        if self.entities.remove(key).is_some() {
            debug!(key = %key, "map: tuple removed");
        }
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<Option<Association>, OgmError> {
        Ok(self
            .associations
            .get(key)
            .map(|rows| Association::from_rows(rows.clone())))
    }

    fn create_association(
        &mut self,
        _key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<Association, OgmError> {
        Ok(Association::new())
    }

    fn insert_or_update_association(
        &mut self,
        key: &AssociationKey,
        association: &mut Association,
        _context: &AssociationContext,
    ) -> Result<(), OgmError> {
        let mut rows = self.associations.remove(key).unwrap_or_default();
        apply_association_operations(&mut rows, association.operations());
        trace!(key = %key, rows = rows.len(), "map: association written");
        association.rebase(Box::new(MapAssociationSnapshot::new(rows.clone())));
        if !rows.is_empty() {
            self.associations.insert(key.clone(), rows);
        }
        Ok(())
    }

    fn remove_association(
        &mut self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<(), OgmError> {
        if self.associations.remove(key).is_some() {
            debug!(key = %key, "map: association removed");
        }
        Ok(())
    }

    fn is_stored_in_entity_structure(&self, _metadata: &AssociationKeyMetadata) -> bool {
        false
    }

    fn next_value(&mut self, request: &NextValueRequest) -> Result<i64, OgmError> {
        let current = self
            .sequences
            .entry(request.key.clone())
            .or_insert(request.initial_value);
        let value = *current;
        // The value after the last one handed out is kept, so it must fit too.
        *current = value
            .checked_add(request.increment)
            .ok_or_else(|| StorageError::SequenceExhausted {
                name: request.key.name().to_string(),
            })?;
        Ok(value)
    }

    fn supports_atomic_optimistic_locking(&self) -> bool {
        true
    }

    fn update_tuple_with_optimistic_lock(
        &mut self,
        key: &EntityKey,
        expected: &Tuple,
        tuple: &mut Tuple,
        _context: &TupleContext,
    ) -> Result<bool, OgmError> {
        let current = match self.entities.get(key) {
            Some(record) => Tuple::from_values(record.clone(), SnapshotType::Update),
            None => return Ok(false),
        };
        if !matches_expected(&current, expected) {
            return Ok(false);
        }
        self.write_tuple(key, tuple);
        Ok(true)
    }

    fn remove_tuple_with_optimistic_lock(
        &mut self,
        key: &EntityKey,
        expected: &Tuple,
        _context: &TupleContext,
    ) -> Result<bool, OgmError> {
        let matches = match self.entities.get(key) {
            Some(record) => {
                let stored = Tuple::from_values(record.clone(), SnapshotType::Update);
                matches_expected(&stored, expected)
            }
            None => false,
        };
        if matches {
            self.entities.remove(key);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ogm_core::key::{AssociatedEntityKeyMetadata, EntityKeyMetadata, RowKeyBuilder};

    fn order_key(id: i64) -> EntityKey {
        let metadata = Arc::new(EntityKeyMetadata::new("Order", ["id"]));
        EntityKey::new(metadata, [Value::Int(id)]).unwrap()
    }

    fn items_key(order: i64) -> AssociationKey {
        let item = Arc::new(EntityKeyMetadata::new("Item", ["id"]));
        let metadata = AssociationKeyMetadata::builder("Order_Item")
            .column_names(["order_id"])
            .associated_entity_key_metadata(
                AssociatedEntityKeyMetadata::new(["items_id"], item).unwrap(),
            )
            .build()
            .unwrap();
        AssociationKey::new(Arc::new(metadata), [Value::Int(order)], order_key(order)).unwrap()
    }

    fn row(key: &AssociationKey, item: i64) -> (RowKey, Tuple) {
        let mut tuple = Tuple::new();
        tuple.put("order_id", key.column_values()[0].clone());
        tuple.put("items_id", Value::Int(item));
        let row_key = RowKeyBuilder::new(key.metadata().row_key_column_names())
            .values_from_tuple(&tuple)
            .build();
        (row_key, tuple)
    }

    #[test]
    fn test_put_then_remove_column_roundtrip() {
        let mut dialect = MapDialect::new();
        let context = TupleContext::default();
        let key = order_key(1);

        let mut tuple = dialect.create_tuple(&key, &context).unwrap();
        tuple.put("name", Value::from("first"));
        dialect.insert_or_update_tuple(&key, &mut tuple, &context).unwrap();
        let stored = dialect.get_tuple(&key, &context).unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(Value::from("first")));
        assert_eq!(stored.get("id"), Some(Value::Int(1)));

        let mut tuple = stored;
        tuple.remove("name");
        dialect.insert_or_update_tuple(&key, &mut tuple, &context).unwrap();
        let stored = dialect.get_tuple(&key, &context).unwrap().unwrap();
        assert_eq!(stored.get("name"), None);
    }

    #[test]
    fn test_put_null_is_stored() {
        let mut dialect = MapDialect::new();
        let context = TupleContext::default();
        let key = order_key(1);
        let mut tuple = Tuple::new();
        tuple.put_null("name");
        dialect.insert_or_update_tuple(&key, &mut tuple, &context).unwrap();
        let stored = dialect.get_tuple(&key, &context).unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(Value::Null));
    }

    #[test]
    fn test_get_tuples_keeps_positions() {
        let mut dialect = MapDialect::new();
        let context = TupleContext::default();
        let mut tuple = Tuple::new();
        dialect.insert_or_update_tuple(&order_key(1), &mut tuple, &context).unwrap();

        let result = dialect.get_tuples(&[order_key(1), order_key(2)], &context).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result[0].is_some());
        assert!(result[1].is_none());
    }

    #[test]
    fn test_clear_removes_all_rows() {
        let context = AssociationContext::new("items");
        for count in [0_i64, 1, 3] {
            let mut dialect = MapDialect::new();
            let key = items_key(1);
            let mut association = dialect.create_association(&key, &context).unwrap();
            for item in 0..count {
                let (row_key, tuple) = row(&key, item);
                association.put(row_key, tuple);
            }
            dialect.insert_or_update_association(&key, &mut association, &context).unwrap();

            let mut association = dialect
                .get_association(&key, &context)
                .unwrap()
                .unwrap_or_default();
            association.clear();
            dialect.insert_or_update_association(&key, &mut association, &context).unwrap();
            assert!(dialect.get_association(&key, &context).unwrap().is_none());
            assert_eq!(dialect.association_count(), 0);
        }
    }

    #[test]
    fn test_next_value_starts_at_initial() {
        let mut dialect = MapDialect::new();
        let request = NextValueRequest::new(IdSourceKey::sequence("seq"))
            .initial_value(10)
            .increment(5);
        assert_eq!(dialect.next_value(&request).unwrap(), 10);
        assert_eq!(dialect.next_value(&request).unwrap(), 15);
    }

    #[test]
    fn test_next_value_overflow_is_an_error() {
        let mut dialect = MapDialect::new();
        let request = NextValueRequest::new(IdSourceKey::sequence("seq"))
            .initial_value(i64::MAX - 1)
            .increment(1);
        assert_eq!(dialect.next_value(&request).unwrap(), i64::MAX - 1);
        assert!(matches!(dialect.next_value(&request), Err(OgmError::Backend { .. })));
    }

    #[test]
    fn test_atomic_lock_rejects_stale_version() {
        let mut dialect = MapDialect::new();
        let context = TupleContext::default();
        let key = order_key(1);
        let mut tuple = Tuple::new();
        tuple.put("version", Value::Int(1));
        dialect.insert_or_update_tuple(&key, &mut tuple, &context).unwrap();

        let mut expected = Tuple::new();
        expected.put("version", Value::Int(0));
        let mut update = dialect.get_tuple(&key, &context).unwrap().unwrap();
        update.put("version", Value::Int(2));
        assert!(!dialect
            .update_tuple_with_optimistic_lock(&key, &expected, &mut update, &context)
            .unwrap());

        let mut expected = Tuple::new();
        expected.put("version", Value::Int(1));
        assert!(dialect
            .update_tuple_with_optimistic_lock(&key, &expected, &mut update, &context)
            .unwrap());
        let stored = dialect.get_tuple(&key, &context).unwrap().unwrap();
        assert_eq!(stored.get("version"), Some(Value::Int(2)));
    }
}

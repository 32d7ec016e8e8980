//! Collection row writes and the bookkeeping on the far side of each row.
//!
//! A collection of one owner is one association; every entry becomes a row
//! whose key follows the collection's addressing (surrogate identifier, owner
//! key plus index, or owner key plus element). Inverse collections are
//! read-only here: their rows are written by whichever side owns the link.

use std::sync::Arc;

use tracing::{debug, trace};

use ogm_core::{
    AssociationKey, CollectionEntry, EntityKey, OgmError, RowKey, RowKeyBuilder, Tuple, Value,
};

use crate::association_persister::AssociationPersister;
use crate::metamodel::{AssociationShape, CollectionMetadata, Metamodel};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy)]
pub struct CollectionPersister<'m> {
    metamodel: &'m Metamodel,
    metadata: &'m CollectionMetadata,
}

impl<'m> CollectionPersister<'m> {
    pub fn new(metamodel: &'m Metamodel, role: &str) -> Result<Self, OgmError> {
        Ok(Self::for_metadata(metamodel, metamodel.collection(role)?))
    }

    pub fn for_metadata(metamodel: &'m Metamodel, metadata: &'m CollectionMetadata) -> Self {
        CollectionPersister { metamodel, metadata }
    }

    pub fn metadata(&self) -> &'m CollectionMetadata {
        self.metadata
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Writes all entries of a freshly created collection.
    pub fn recreate(
        &self,
        session: &mut Session<'_>,
        owner_id: &[Value],
        entries: &[CollectionEntry],
    ) -> Result<usize, OgmError> {
        let count = self.insert_rows(session, owner_id, entries)?;
        debug!(role = %self.metadata.role(), rows = count, "collection recreated");
        Ok(count)
    }

    pub fn insert_rows(
        &self,
        session: &mut Session<'_>,
        owner_id: &[Value],
        entries: &[CollectionEntry],
    ) -> Result<usize, OgmError> {
        if self.skips_writes() {
            return Ok(0);
        }
        let mut persister = self.association_persister(owner_id)?;
        for entry in entries {
            let row = self.row(owner_id, entry, &entry.element)?;
            let row_key = self.row_key(&row);
            persister.association(&mut *session.dialect)?.put(row_key, row.clone());
            self.update_inverse_side(session, &row, Action::Add)?;
        }
        persister.flush(&mut *session.dialect)?;
        trace!(role = %self.metadata.role(), rows = entries.len(), "collection rows inserted");
        Ok(entries.len())
    }

    /// Rewrites the rows of changed entries, located by their previous
    /// element when the entry carries one.
    pub fn update_rows(
        &self,
        session: &mut Session<'_>,
        owner_id: &[Value],
        entries: &[CollectionEntry],
    ) -> Result<usize, OgmError> {
        if self.skips_writes() {
            return Ok(0);
        }
        let mut persister = self.association_persister(owner_id)?;
        for entry in entries {
            let old_key = self.row_key(&self.row(owner_id, entry, entry.locating_element())?);
            let association = persister.association(&mut *session.dialect)?;
            let Some(old_row) = association.get(&old_key) else {
                return Err(OgmError::inconsistent(format!(
                    "updating a collection row that is not present: {} in '{}'",
                    old_key,
                    self.metadata.role()
                )));
            };
            let new_row = self.row(owner_id, entry, &entry.element)?;
            let new_key = self.row_key(&new_row);
            if new_key != old_key {
                association.remove(old_key);
            }
            association.put(new_key, new_row.clone());

            if entry.locating_element() != entry.element.as_slice() {
                self.update_inverse_side(session, &old_row, Action::Remove)?;
                self.update_inverse_side(session, &new_row, Action::Add)?;
            }
        }
        persister.flush(&mut *session.dialect)?;
        trace!(role = %self.metadata.role(), rows = entries.len(), "collection rows updated");
        Ok(entries.len())
    }

    pub fn delete_rows(
        &self,
        session: &mut Session<'_>,
        owner_id: &[Value],
        entries: &[CollectionEntry],
    ) -> Result<usize, OgmError> {
        if self.skips_writes() {
            return Ok(0);
        }
        let mut persister = self.association_persister(owner_id)?;
        for entry in entries {
            let row_key = self.row_key(&self.row(owner_id, entry, entry.locating_element())?);
            let association = persister.association(&mut *session.dialect)?;
            let Some(old_row) = association.get(&row_key) else {
                return Err(OgmError::inconsistent(format!(
                    "deleting a collection row that is not present: {} in '{}'",
                    row_key,
                    self.metadata.role()
                )));
            };
            association.remove(row_key);
            self.update_inverse_side(session, &old_row, Action::Remove)?;
        }
        persister.flush(&mut *session.dialect)?;
        trace!(role = %self.metadata.role(), rows = entries.len(), "collection rows deleted");
        Ok(entries.len())
    }

    /// Drops the whole collection of `owner_id`, unlinking every row from
    /// its far side first.
    pub fn remove(&self, session: &mut Session<'_>, owner_id: &[Value]) -> Result<(), OgmError> {
        if self.skips_writes() {
            return Ok(());
        }
        let mut persister = self.association_persister(owner_id)?;
        let rows: Vec<Tuple> = match persister.association_or_none(&*session.dialect)? {
            Some(association) => association
                .row_keys()
                .iter()
                .filter_map(|row_key| association.get(row_key))
                .collect(),
            None => return Ok(()),
        };
        if self.metadata.shape() != AssociationShape::Other {
            for row in &rows {
                self.update_inverse_side(session, row, Action::Remove)?;
            }
        }
        persister.association(&mut *session.dialect)?.clear();
        persister.flush(&mut *session.dialect)?;
        debug!(role = %self.metadata.role(), rows = rows.len(), "collection removed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Entries of the collection; indexed collections come back in index order.
    pub fn load(
        &self,
        session: &mut Session<'_>,
        owner_id: &[Value],
    ) -> Result<Vec<CollectionEntry>, OgmError> {
        let mut persister = self.association_persister(owner_id)?;
        let Some(association) = persister.association_or_none(&*session.dialect)? else {
            return Ok(Vec::new());
        };
        let mapping = self.metadata.mapping();
        let mut entries: Vec<CollectionEntry> = association
            .row_keys()
            .iter()
            .filter_map(|row_key| association.get(row_key))
            .map(|row| {
                let read = |columns: &[String]| -> Vec<Value> {
                    columns.iter().map(|c| row.get(c).unwrap_or(Value::Null)).collect()
                };
                let mut entry = CollectionEntry::new(read(&mapping.element_columns))
                    .with_index(read(&mapping.index_columns));
                let identifier = mapping.identifier_column.as_deref().and_then(|c| row.get(c));
                if let Some(identifier) = identifier {
                    entry = entry.with_identifier(identifier);
                }
                entry
            })
            .collect();
        if mapping.is_indexed() {
            entries.sort_by_key(|entry| entry.index.first().and_then(Value::as_i64));
        }
        Ok(entries)
    }

    pub fn size(&self, session: &mut Session<'_>, owner_id: &[Value]) -> Result<usize, OgmError> {
        let mut persister = self.association_persister(owner_id)?;
        Ok(persister
            .association_or_none(&*session.dialect)?
            .map_or(0, |association| association.size()))
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    fn skips_writes(&self) -> bool {
        if self.metadata.is_inverse() {
            trace!(role = %self.metadata.role(), "inverse collection, write skipped");
            return true;
        }
        false
    }

    fn association_persister(&self, owner_id: &[Value]) -> Result<AssociationPersister, OgmError> {
        let owner = EntityKey::new(
            Arc::clone(self.metadata.owner_key_metadata()),
            owner_id.iter().cloned(),
        )?;
        let key = AssociationKey::new(
            Arc::clone(self.metadata.key_metadata()),
            owner_id.iter().cloned(),
            owner,
        )?;
        Ok(AssociationPersister::new(key, self.metadata.association_context()))
    }

    /// Row tuple for `entry`, with `element` standing in for its element.
    fn row(
        &self,
        owner_id: &[Value],
        entry: &CollectionEntry,
        element: &[Value],
    ) -> Result<Tuple, OgmError> {
        let mapping = self.metadata.mapping();
        if element.len() != mapping.element_columns.len() {
            return Err(OgmError::mapping(format!(
                "collection '{}' expects {} element values, got {}",
                mapping.role,
                mapping.element_columns.len(),
                element.len()
            )));
        }
        if mapping.is_indexed() && entry.index.len() != mapping.index_columns.len() {
            return Err(OgmError::mapping(format!(
                "collection '{}' expects {} index values, got {}",
                mapping.role,
                mapping.index_columns.len(),
                entry.index.len()
            )));
        }

        let mut row = Tuple::new();
        if let Some(column) = &mapping.identifier_column {
            let identifier = entry.identifier.clone().ok_or_else(|| {
                OgmError::mapping(format!("collection '{}' entry has no identifier", mapping.role))
            })?;
            row.put(column.clone(), identifier);
        }
        let columns = mapping
            .key_columns
            .iter()
            .zip(owner_id)
            .chain(mapping.index_columns.iter().zip(&entry.index))
            .chain(mapping.element_columns.iter().zip(element));
        for (column, value) in columns {
            if !value.is_null() {
                row.put(column.clone(), value.clone());
            }
        }
        Ok(row)
    }

    fn row_key(&self, row: &Tuple) -> RowKey {
        RowKeyBuilder::new(self.metadata.key_metadata().row_key_column_names())
            .values_from_tuple(row)
            .build()
    }

    // -----------------------------------------------------------------------
    // Far side
    // -----------------------------------------------------------------------

    fn update_inverse_side(
        &self,
        session: &mut Session<'_>,
        row: &Tuple,
        action: Action,
    ) -> Result<(), OgmError> {
        match self.metadata.shape() {
            AssociationShape::EmbeddedFkToEntity => {
                self.update_element_record(session, row, action)
            }
            AssociationShape::AssociationTableToEntity => {
                self.update_inverse_collection(session, row, action)
            }
            AssociationShape::Other => Ok(()),
        }
    }

    /// The row's key and index columns live on the element's own record.
    fn update_element_record(
        &self,
        session: &mut Session<'_>,
        row: &Tuple,
        action: Action,
    ) -> Result<(), OgmError> {
        let mapping = self.metadata.mapping();
        let Some(element_key_metadata) = self.metadata.element_key_metadata() else {
            return Ok(());
        };
        let Some(target_name) = mapping.element_entity() else {
            return Ok(());
        };
        let target = self.metamodel.entity(target_name)?;
        let element: Vec<Value> = mapping
            .element_columns
            .iter()
            .map(|c| row.get(c).unwrap_or(Value::Null))
            .collect();
        let key = EntityKey::new(Arc::clone(element_key_metadata), element)?;
        let Some(mut tuple) = session.tuple(&key, target.tuple_context())? else {
            trace!(role = %mapping.role, element = %key, "element record absent, nothing to link");
            return Ok(());
        };

        let linked_columns = mapping.key_columns.iter().chain(&mapping.index_columns);
        match action {
            Action::Add => {
                for column in linked_columns {
                    if let Some(value) = row.get(column) {
                        tuple.put(column.clone(), value);
                    }
                }
            }
            Action::Remove => {
                let supports_nulls = session.dialect.supports_null_values();
                for column in linked_columns {
                    if supports_nulls {
                        tuple.put_null(column.clone());
                    } else {
                        tuple.remove(column.clone());
                    }
                }
            }
        }
        session
            .dialect
            .insert_or_update_tuple(&key, &mut tuple, target.tuple_context())?;
        session.remember(key, tuple);
        Ok(())
    }

    /// Mirrors the row into the inverse collection of a many-to-many.
    fn update_inverse_collection(
        &self,
        session: &mut Session<'_>,
        row: &Tuple,
        action: Action,
    ) -> Result<(), OgmError> {
        let Some(role) = self.metadata.inverse_collection() else {
            return Ok(());
        };
        let inverse = self.metamodel.collection(role)?;
        let key_values: Vec<Value> = inverse
            .mapping()
            .key_columns
            .iter()
            .map(|c| row.get(c).unwrap_or(Value::Null))
            .collect();
        if key_values.iter().all(Value::is_null) {
            return Ok(());
        }
        let host =
            EntityKey::new(Arc::clone(inverse.owner_key_metadata()), key_values.iter().cloned())?;
        let key = AssociationKey::new(Arc::clone(inverse.key_metadata()), key_values, host)?;
        let row_key = RowKeyBuilder::new(inverse.key_metadata().row_key_column_names())
            .values_from_tuple(row)
            .build();
        let mut persister = AssociationPersister::new(key, inverse.association_context());

        match action {
            Action::Add => {
                let mut inverse_row = Tuple::new();
                for (column, value) in row_key.columns() {
                    if !value.is_null() {
                        inverse_row.put(column, value.clone());
                    }
                }
                persister.association(&mut *session.dialect)?.put(row_key, inverse_row);
            }
            Action::Remove => match persister.association_or_none(&*session.dialect)? {
                Some(association) => association.remove(row_key),
                None => return Ok(()),
            },
        }
        persister.flush(&mut *session.dialect)
    }
}

//! Change-journaled relationship sets.
//!
//! An [`Association`] maps [`RowKey`]s to row tuples. Like [`Tuple`], writes
//! go to a journal of [`AssociationOperation`]s and the backend snapshot stays
//! untouched until flush. `Clear` means "every row the snapshot holds is
//! gone"; backends must turn it into a bulk delete of the physical rows even
//! if the snapshot looks empty in memory.

use std::any::Any;
use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::key::RowKey;
use crate::tuple::{SnapshotType, Tuple};
use crate::value::Value;

/// Column map of one association row.
pub type RowValues = IndexMap<String, Value>;

/// Read-only view of a physical relationship set, provided by a backend.
pub trait AssociationSnapshot: fmt::Debug {
    fn get(&self, row_key: &RowKey) -> Option<Tuple>;

    fn contains_key(&self, row_key: &RowKey) -> bool {
        self.get(row_key).is_some()
    }

    fn size(&self) -> usize;

    fn row_keys(&self) -> Vec<RowKey>;

    fn clone_box(&self) -> Box<dyn AssociationSnapshot>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn AssociationSnapshot> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Snapshot backed by an ordered row map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapAssociationSnapshot {
    rows: IndexMap<RowKey, RowValues>,
}

impl MapAssociationSnapshot {
    pub fn new(rows: IndexMap<RowKey, RowValues>) -> Self {
        MapAssociationSnapshot { rows }
    }

    pub fn rows(&self) -> &IndexMap<RowKey, RowValues> {
        &self.rows
    }
}

impl AssociationSnapshot for MapAssociationSnapshot {
    fn get(&self, row_key: &RowKey) -> Option<Tuple> {
        self.rows
            .get(row_key)
            .map(|values| Tuple::from_values(values.clone(), SnapshotType::Update))
    }

    fn contains_key(&self, row_key: &RowKey) -> bool {
        self.rows.contains_key(row_key)
    }

    fn size(&self) -> usize {
        self.rows.len()
    }

    fn row_keys(&self) -> Vec<RowKey> {
        self.rows.keys().cloned().collect()
    }

    fn clone_box(&self) -> Box<dyn AssociationSnapshot> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One journaled relationship change.
#[derive(Debug, Clone)]
pub enum AssociationOperation {
    Put { row_key: RowKey, tuple: Tuple },
    Remove { row_key: RowKey },
    Clear,
}

/// Applies `operations` in order onto materialized rows.
pub fn apply_association_operations(
    rows: &mut IndexMap<RowKey, RowValues>,
    operations: &[AssociationOperation],
) {
    for operation in operations {
        match operation {
            AssociationOperation::Put { row_key, tuple } => {
                rows.insert(row_key.clone(), tuple.to_values());
            }
            AssociationOperation::Remove { row_key } => {
                rows.shift_remove(row_key);
            }
            AssociationOperation::Clear => rows.clear(),
        }
    }
}

/// A logical relationship set: backend snapshot plus pending journal.
#[derive(Debug, Clone)]
pub struct Association {
    snapshot: Box<dyn AssociationSnapshot>,
    operations: Vec<AssociationOperation>,
}

impl Association {
    pub fn new() -> Self {
        Association::with_snapshot(Box::new(MapAssociationSnapshot::default()))
    }

    pub fn with_snapshot(snapshot: Box<dyn AssociationSnapshot>) -> Self {
        Association {
            snapshot,
            operations: Vec::new(),
        }
    }

    pub fn from_rows(rows: IndexMap<RowKey, RowValues>) -> Self {
        Association::with_snapshot(Box::new(MapAssociationSnapshot::new(rows)))
    }

    /// Current row for `row_key`, newest journal entry first.
    pub fn get(&self, row_key: &RowKey) -> Option<Tuple> {
        for operation in self.operations.iter().rev() {
            match operation {
                AssociationOperation::Put { row_key: k, tuple } if k == row_key => {
                    return Some(tuple.clone());
                }
                AssociationOperation::Remove { row_key: k } if k == row_key => return None,
                AssociationOperation::Clear => return None,
                _ => {}
            }
        }
        self.snapshot.get(row_key)
    }

    pub fn contains_key(&self, row_key: &RowKey) -> bool {
        self.get(row_key).is_some()
    }

    pub fn put(&mut self, row_key: RowKey, tuple: Tuple) {
        self.operations
            .push(AssociationOperation::Put { row_key, tuple });
    }

    pub fn remove(&mut self, row_key: RowKey) {
        self.operations.push(AssociationOperation::Remove { row_key });
    }

    pub fn clear(&mut self) {
        self.operations.push(AssociationOperation::Clear);
    }

    /// Row keys currently visible, snapshot order first.
    pub fn row_keys(&self) -> Vec<RowKey> {
        let mut keys: IndexSet<RowKey> = self.snapshot.row_keys().into_iter().collect();
        for operation in &self.operations {
            match operation {
                AssociationOperation::Put { row_key, .. } => {
                    keys.insert(row_key.clone());
                }
                AssociationOperation::Remove { row_key } => {
                    keys.shift_remove(row_key);
                }
                AssociationOperation::Clear => keys.clear(),
            }
        }
        keys.into_iter().collect()
    }

    pub fn size(&self) -> usize {
        if self.operations.is_empty() {
            return self.snapshot.size();
        }
        self.row_keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Snapshot rows with the journal applied.
    pub fn to_rows(&self) -> IndexMap<RowKey, RowValues> {
        let mut rows = IndexMap::new();
        for row_key in self.snapshot.row_keys() {
            if let Some(tuple) = self.snapshot.get(&row_key) {
                rows.insert(row_key, tuple.to_values());
            }
        }
        apply_association_operations(&mut rows, &self.operations);
        rows
    }

    pub fn operations(&self) -> &[AssociationOperation] {
        &self.operations
    }

    pub fn snapshot(&self) -> &dyn AssociationSnapshot {
        self.snapshot.as_ref()
    }

    pub fn snapshot_as<T: 'static>(&self) -> Option<&T> {
        self.snapshot.as_any().downcast_ref::<T>()
    }

    /// Replaces the snapshot after a flush and clears the journal.
    pub fn rebase(&mut self, snapshot: Box<dyn AssociationSnapshot>) {
        self.snapshot = snapshot;
        self.operations.clear();
    }
}

impl Default for Association {
    fn default() -> Self {
        Self::new()
    }
}

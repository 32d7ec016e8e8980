//! Change-journaled logical rows.
//!
//! A [`Tuple`] never mutates its snapshot. Writes append [`TupleOperation`]s
//! to the journal; reads see the newest journal entry for a column, falling
//! back to the snapshot. Backends consume the journal at flush time (with
//! [`apply_tuple_operations`] or a translation of their own) and then
//! [`Tuple::rebase`] onto the new physical state.

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;

use crate::value::Value;

/// Whether flushing this tuple must create a fresh physical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotType {
    Insert,
    Update,
}

/// Read-only view of a physical record, provided by a backend.
pub trait TupleSnapshot: fmt::Debug {
    fn get(&self, column: &str) -> Option<Value>;

    fn column_names(&self) -> Vec<String>;

    fn is_empty(&self) -> bool {
        self.column_names().is_empty()
    }

    fn clone_box(&self) -> Box<dyn TupleSnapshot>;

    /// Lets a backend recover its own snapshot type.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn TupleSnapshot> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Snapshot backed by an ordered column map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapTupleSnapshot {
    values: IndexMap<String, Value>,
}

impl MapTupleSnapshot {
    pub fn new(values: IndexMap<String, Value>) -> Self {
        MapTupleSnapshot { values }
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> IndexMap<String, Value> {
        self.values
    }
}

impl TupleSnapshot for MapTupleSnapshot {
    fn get(&self, column: &str) -> Option<Value> {
        self.values.get(column).cloned()
    }

    fn column_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn clone_box(&self) -> Box<dyn TupleSnapshot> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One journaled column write.
#[derive(Debug, Clone, PartialEq)]
pub enum TupleOperation {
    Put { column: String, value: Value },
    /// Explicit null; stores that cannot hold nulls treat it as `Remove`.
    PutNull { column: String },
    Remove { column: String },
}

impl TupleOperation {
    pub fn column(&self) -> &str {
        match self {
            TupleOperation::Put { column, .. }
            | TupleOperation::PutNull { column }
            | TupleOperation::Remove { column } => column,
        }
    }
}

/// Applies `operations` in order onto `values`.
///
/// With `supports_null_values == false`, `PutNull` (and a `Put` of
/// [`Value::Null`]) drops the column instead of storing a null.
pub fn apply_tuple_operations(
    values: &mut IndexMap<String, Value>,
    operations: &[TupleOperation],
    supports_null_values: bool,
) {
    for operation in operations {
        match operation {
            TupleOperation::Put { column, value } if value.is_null() && !supports_null_values => {
                values.shift_remove(column);
            }
            TupleOperation::Put { column, value } => {
                values.insert(column.clone(), value.clone());
            }
            TupleOperation::PutNull { column } if supports_null_values => {
                values.insert(column.clone(), Value::Null);
            }
            TupleOperation::PutNull { column } | TupleOperation::Remove { column } => {
                values.shift_remove(column);
            }
        }
    }
}

/// Keeps only the last operation per column, ordered by each column's first
/// appearance in the journal.
pub fn coalesce_operations(operations: &[TupleOperation]) -> Vec<TupleOperation> {
    let mut last: IndexMap<&str, &TupleOperation> = IndexMap::new();
    for operation in operations {
        last.insert(operation.column(), operation);
    }
    last.into_values().cloned().collect()
}

/// A logical row: backend snapshot plus pending journal.
#[derive(Debug, Clone)]
pub struct Tuple {
    snapshot: Box<dyn TupleSnapshot>,
    operations: Vec<TupleOperation>,
    snapshot_type: SnapshotType,
}

impl Tuple {
    /// An empty tuple that will create a new record on flush.
    pub fn new() -> Self {
        Tuple::with_snapshot(Box::new(MapTupleSnapshot::default()), SnapshotType::Insert)
    }

    pub fn with_snapshot(snapshot: Box<dyn TupleSnapshot>, snapshot_type: SnapshotType) -> Self {
        Tuple {
            snapshot,
            operations: Vec::new(),
            snapshot_type,
        }
    }

    /// A tuple over an already materialized column map.
    pub fn from_values(values: IndexMap<String, Value>, snapshot_type: SnapshotType) -> Self {
        Tuple::with_snapshot(Box::new(MapTupleSnapshot::new(values)), snapshot_type)
    }

    /// Current value of `column`: newest journal entry, else the snapshot.
    ///
    /// A journaled `PutNull` reads as `Some(Value::Null)`, a `Remove` as `None`.
    pub fn get(&self, column: &str) -> Option<Value> {
        for operation in self.operations.iter().rev() {
            if operation.column() != column {
                continue;
            }
            return match operation {
                TupleOperation::Put { value, .. } => Some(value.clone()),
                TupleOperation::PutNull { .. } => Some(Value::Null),
                TupleOperation::Remove { .. } => None,
            };
        }
        self.snapshot.get(column)
    }

    /// Like [`Tuple::get`] but folds explicit nulls into `None`.
    pub fn get_non_null(&self, column: &str) -> Option<Value> {
        self.get(column).filter(|v| !v.is_null())
    }

    /// Journals a write; a [`Value::Null`] is journaled as `PutNull`.
    pub fn put(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        if value.is_null() {
            self.operations.push(TupleOperation::PutNull { column });
        } else {
            self.operations.push(TupleOperation::Put { column, value });
        }
    }

    pub fn put_null(&mut self, column: impl Into<String>) {
        self.operations.push(TupleOperation::PutNull {
            column: column.into(),
        });
    }

    pub fn remove(&mut self, column: impl Into<String>) {
        self.operations.push(TupleOperation::Remove {
            column: column.into(),
        });
    }

    pub fn operations(&self) -> &[TupleOperation] {
        &self.operations
    }

    pub fn has_pending_operations(&self) -> bool {
        !self.operations.is_empty()
    }

    pub fn snapshot(&self) -> &dyn TupleSnapshot {
        self.snapshot.as_ref()
    }

    /// Downcasts the snapshot to a backend's concrete type.
    pub fn snapshot_as<T: 'static>(&self) -> Option<&T> {
        self.snapshot.as_any().downcast_ref::<T>()
    }

    pub fn snapshot_type(&self) -> SnapshotType {
        self.snapshot_type
    }

    pub fn set_snapshot_type(&mut self, snapshot_type: SnapshotType) {
        self.snapshot_type = snapshot_type;
    }

    /// Snapshot values with the journal applied, keeping explicit nulls.
    pub fn to_values(&self) -> IndexMap<String, Value> {
        let mut values: IndexMap<String, Value> = IndexMap::new();
        for column in self.snapshot.column_names() {
            if let Some(value) = self.snapshot.get(&column) {
                values.insert(column, value);
            }
        }
        apply_tuple_operations(&mut values, &self.operations, true);
        values
    }

    pub fn column_names(&self) -> Vec<String> {
        if self.operations.is_empty() {
            return self.snapshot.column_names();
        }
        self.to_values().into_keys().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.column_names().is_empty()
    }

    /// Replaces the snapshot after a flush; the journal is cleared and later
    /// flushes update the now existing record.
    pub fn rebase(&mut self, snapshot: Box<dyn TupleSnapshot>) {
        self.snapshot = snapshot;
        self.operations.clear();
        self.snapshot_type = SnapshotType::Update;
    }
}

impl Default for Tuple {
    fn default() -> Self {
        Self::new()
    }
}

/// Per unit-of-work cache cell holding the latest tuple of one entity.
#[derive(Debug, Clone, Default)]
pub struct TuplePointer {
    tuple: Option<Tuple>,
}

impl TuplePointer {
    pub fn new(tuple: Tuple) -> Self {
        TuplePointer { tuple: Some(tuple) }
    }

    pub fn get(&self) -> Option<&Tuple> {
        self.tuple.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut Tuple> {
        self.tuple.as_mut()
    }

    pub fn set(&mut self, tuple: Tuple) {
        self.tuple = Some(tuple);
    }

    pub fn take(&mut self) -> Option<Tuple> {
        self.tuple.take()
    }
}

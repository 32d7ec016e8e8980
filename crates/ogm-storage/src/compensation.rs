//! Compensation hook: observe physical writes without changing their outcome.
//!
//! [`InvocationCollectingDialect`] wraps any dialect and records each write
//! that succeeded during the current unit of work. When a write fails, the
//! registered [`ErrorHandler`] sees the failed operation together with every
//! operation applied before it, so it can audit or compensate. The error is
//! then returned unchanged.

use tracing::warn;

use ogm_core::key::{AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata};
use ogm_core::{Association, OgmError, Tuple};

use crate::dialect::{
    AssociationContext, BackendQuery, DuplicateInsertPreventionStrategy, GridDialect,
    NextValueRequest, SchemaDefinition, TupleContext, TupleStream,
};

/// A physical write issued through a dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridOperation {
    InsertOrUpdateTuple { key: EntityKey },
    UpdateTupleWithOptimisticLock { key: EntityKey },
    RemoveTuple { key: EntityKey },
    RemoveTupleWithOptimisticLock { key: EntityKey },
    InsertOrUpdateAssociation { key: AssociationKey },
    RemoveAssociation { key: AssociationKey },
    ExecuteBackendUpdateQuery { query: String },
}

/// What an [`ErrorHandler`] is told about a failed write.
#[derive(Debug)]
pub struct ErrorContext<'a> {
    pub failed_operation: &'a GridOperation,
    pub applied_operations: &'a [GridOperation],
    pub error: &'a OgmError,
}

/// Receives failed writes; cannot alter the error.
pub trait ErrorHandler {
    fn on_error(&mut self, context: ErrorContext<'_>);
}

impl<F> ErrorHandler for F
where
    F: FnMut(ErrorContext<'_>),
{
    fn on_error(&mut self, context: ErrorContext<'_>) {
        self(context)
    }
}

/// Dialect wrapper collecting applied writes.
pub struct InvocationCollectingDialect<D> {
    inner: D,
    applied: Vec<GridOperation>,
    handler: Option<Box<dyn ErrorHandler>>,
}

impl<D: GridDialect> InvocationCollectingDialect<D> {
    pub fn new(inner: D) -> Self {
        InvocationCollectingDialect {
            inner,
            applied: Vec::new(),
            handler: None,
        }
    }

    pub fn with_handler(inner: D, handler: impl ErrorHandler + 'static) -> Self {
        InvocationCollectingDialect {
            inner,
            applied: Vec::new(),
            handler: Some(Box::new(handler)),
        }
    }

    pub fn applied_operations(&self) -> &[GridOperation] {
        &self.applied
    }

    /// Drains the log, typically at the end of a unit of work.
    pub fn take_applied_operations(&mut self) -> Vec<GridOperation> {
        std::mem::take(&mut self.applied)
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    fn track<T>(
        &mut self,
        operation: GridOperation,
        write: impl FnOnce(&mut D) -> Result<T, OgmError>,
    ) -> Result<T, OgmError> {
        match write(&mut self.inner) {
            Ok(result) => {
                self.applied.push(operation);
                Ok(result)
            }
            Err(error) => {
                warn!(
                    operation = ?operation,
                    applied = self.applied.len(),
                    error = %error,
                    "grid operation failed"
                );
                if let Some(handler) = self.handler.as_mut() {
                    handler.on_error(ErrorContext {
                        failed_operation: &operation,
                        applied_operations: &self.applied,
                        error: &error,
                    });
                }
                Err(error)
            }
        }
    }
}

impl<D: GridDialect> GridDialect for InvocationCollectingDialect<D> {
    fn get_tuple(
        &self,
        key: &EntityKey,
        context: &TupleContext,
    ) -> Result<Option<Tuple>, OgmError> {
        self.inner.get_tuple(key, context)
    }

    fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>, OgmError> {
        self.inner.get_tuples(keys, context)
    }

    fn create_tuple(&mut self, key: &EntityKey, context: &TupleContext) -> Result<Tuple, OgmError> {
        self.inner.create_tuple(key, context)
    }

    fn insert_or_update_tuple(
        &mut self,
        key: &EntityKey,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<(), OgmError> {
        self.track(GridOperation::InsertOrUpdateTuple { key: key.clone() }, |d| {
            d.insert_or_update_tuple(key, tuple, context)
        })
    }

    fn remove_tuple(&mut self, key: &EntityKey, context: &TupleContext) -> Result<(), OgmError> {
        self.track(GridOperation::RemoveTuple { key: key.clone() }, |d| {
            d.remove_tuple(key, context)
        })
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, OgmError> {
        self.inner.get_association(key, context)
    }

    fn create_association(
        &mut self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Association, OgmError> {
        self.inner.create_association(key, context)
    }

    fn insert_or_update_association(
        &mut self,
        key: &AssociationKey,
        association: &mut Association,
        context: &AssociationContext,
    ) -> Result<(), OgmError> {
        self.track(
            GridOperation::InsertOrUpdateAssociation { key: key.clone() },
            |d| d.insert_or_update_association(key, association, context),
        )
    }

    fn remove_association(
        &mut self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), OgmError> {
        self.track(GridOperation::RemoveAssociation { key: key.clone() }, |d| {
            d.remove_association(key, context)
        })
    }

    fn is_stored_in_entity_structure(&self, metadata: &AssociationKeyMetadata) -> bool {
        self.inner.is_stored_in_entity_structure(metadata)
    }

    fn next_value(&mut self, request: &NextValueRequest) -> Result<i64, OgmError> {
        self.inner.next_value(request)
    }

    fn execute_backend_query(&self, query: &BackendQuery) -> Result<TupleStream, OgmError> {
        self.inner.execute_backend_query(query)
    }

    fn execute_backend_update_query(&mut self, query: &BackendQuery) -> Result<u64, OgmError> {
        self.track(
            GridOperation::ExecuteBackendUpdateQuery {
                query: query.query.clone(),
            },
            |d| d.execute_backend_update_query(query),
        )
    }

    fn supports_null_values(&self) -> bool {
        self.inner.supports_null_values()
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        self.inner.duplicate_insert_prevention_strategy(metadata)
    }

    fn supports_atomic_optimistic_locking(&self) -> bool {
        self.inner.supports_atomic_optimistic_locking()
    }

    fn update_tuple_with_optimistic_lock(
        &mut self,
        key: &EntityKey,
        expected: &Tuple,
        tuple: &mut Tuple,
        context: &TupleContext,
    ) -> Result<bool, OgmError> {
        self.track(
            GridOperation::UpdateTupleWithOptimisticLock { key: key.clone() },
            |d| d.update_tuple_with_optimistic_lock(key, expected, tuple, context),
        )
    }

    fn remove_tuple_with_optimistic_lock(
        &mut self,
        key: &EntityKey,
        expected: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, OgmError> {
        self.track(
            GridOperation::RemoveTupleWithOptimisticLock { key: key.clone() },
            |d| d.remove_tuple_with_optimistic_lock(key, expected, context),
        )
    }

    fn schema_created(&mut self, schema: &SchemaDefinition) -> Result<(), OgmError> {
        self.inner.schema_created(schema)
    }
}

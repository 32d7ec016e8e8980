//! [`GridDialect`] over a property graph.
//!
//! Entities become `ENTITY` nodes labelled with their table. Dotted columns
//! become chains of `EMBEDDED` nodes, to-one foreign keys become typed
//! relationships, and association rows become relationships typed with the
//! role on the main side. Inverse sides are read by walking relationships
//! backwards and are never written: the main side's write already created
//! the link. The graph cannot hold nulls, so a null column is removed.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use ogm_core::key::{
    AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, RowKeyBuilder,
};
use ogm_core::tuple::coalesce_operations;
use ogm_core::{
    Association, AssociationOperation, MapAssociationSnapshot, OgmError, SnapshotType, Tuple,
    TupleOperation, TupleSnapshot, Value,
};
use ogm_storage::{
    AssociationContext, BackendQuery, DuplicateInsertPreventionStrategy, GridDialect,
    NextValueRequest, SchemaDefinition, ToOneAssociation, TupleContext, TupleStream,
};

use crate::association_queries::AssociationQueries;
use crate::entity_queries::{next_sequence_value, EntityQueries};
use crate::error::GraphError;
use crate::graph::{EntityMatch, GraphExecutor, NodeRef, PropertyGraph};
use crate::statement::CompiledQuery;

/// Default bound of each multi-get template cache.
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 1000;

/// Tuple snapshot over a node's properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSnapshot {
    node: Option<NodeRef>,
    values: IndexMap<String, Value>,
}

impl NodeSnapshot {
    pub fn new(node: Option<NodeRef>, values: IndexMap<String, Value>) -> Self {
        NodeSnapshot { node, values }
    }

    /// The node this snapshot was read from; `None` right after an insert.
    pub fn node(&self) -> Option<NodeRef> {
        self.node
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }
}

impl TupleSnapshot for NodeSnapshot {
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

/// Graph backend; `E` runs the compiled statements.
pub struct GraphDialect<E = PropertyGraph> {
    executor: E,
    cache_capacity: usize,
    entity_queries: RefCell<HashMap<EntityKeyMetadata, Rc<EntityQueries>>>,
    association_queries: RefCell<HashMap<(AssociationKeyMetadata, String), Rc<AssociationQueries>>>,
    next_sequence_value: CompiledQuery,
}

impl GraphDialect<PropertyGraph> {
    /// A dialect over a fresh in-process graph.
    pub fn in_memory() -> Self {
        GraphDialect::new(PropertyGraph::new())
    }
}

impl<E: GraphExecutor> GraphDialect<E> {
    pub fn new(executor: E) -> Self {
        Self::with_cache_capacity(executor, DEFAULT_QUERY_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(executor: E, cache_capacity: usize) -> Self {
        GraphDialect {
            executor,
            cache_capacity,
            entity_queries: RefCell::new(HashMap::new()),
            association_queries: RefCell::new(HashMap::new()),
            next_sequence_value: next_sequence_value(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    fn entity_queries(&self, metadata: &EntityKeyMetadata) -> Rc<EntityQueries> {
        let mut cache = self.entity_queries.borrow_mut();
        let queries = cache
            .entry(metadata.clone())
            .or_insert_with(|| Rc::new(EntityQueries::new(metadata, self.cache_capacity)));
        Rc::clone(queries)
    }

    fn association_queries(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Rc<AssociationQueries> {
        let mut cache = self.association_queries.borrow_mut();
        let cache_key = (key.metadata().as_ref().clone(), context.role_on_main_side().to_string());
        let queries = cache.entry(cache_key).or_insert_with(|| {
            Rc::new(AssociationQueries::new(
                key.metadata(),
                key.entity_key().metadata(),
                context.role_on_main_side(),
            ))
        });
        Rc::clone(queries)
    }

    fn assemble_tuple(
        &self,
        key: &EntityKey,
        queries: &EntityQueries,
        found: EntityMatch,
        context: &TupleContext,
    ) -> Result<Tuple, OgmError> {
        let mut values = found.node.properties;
        for embedded in found.embedded {
            let prefix = embedded.path.join(".");
            for (property, value) in embedded.properties {
                let column = format!("{}.{}", prefix, property);
                if context.is_selectable(&column) {
                    values.insert(column, value);
                }
            }
        }
        for association in context.to_one_associations() {
            let to_one =
                queries.to_one(&association.role, association.target.entity_key_metadata());
            let target = self
                .executor
                .query(&to_one.find_target, key.column_values())?
                .into_node()?;
            if let Some(target) = target {
                let entity_columns = association.target.entity_key_metadata().column_names();
                for (column, entity_column) in association
                    .target
                    .association_key_columns()
                    .iter()
                    .zip(entity_columns)
                {
                    if let Some(value) = target.properties.get(entity_column) {
                        values.insert(column.clone(), value.clone());
                    }
                }
            }
        }
        Ok(Tuple::with_snapshot(
            Box::new(NodeSnapshot::new(Some(found.node.id), values)),
            SnapshotType::Update,
        ))
    }

    fn write_to_one(
        &mut self,
        key: &EntityKey,
        queries: &EntityQueries,
        association: &ToOneAssociation,
        tuple: &Tuple,
    ) -> Result<(), OgmError> {
        let to_one = queries.to_one(&association.role, association.target.entity_key_metadata());
        let target_key: Option<Vec<Value>> = association
            .target
            .association_key_columns()
            .iter()
            .map(|c| tuple.get_non_null(c))
            .collect();
        let mut params = key.column_values().to_vec();
        match target_key {
            Some(target_key) => {
                params.extend(target_key);
                let linked = self.executor.execute(&to_one.replace, &params)?.into_count()?;
                if linked == 0 {
                    warn!(
                        key = %key,
                        role = %association.role,
                        "graph: to-one target not found, link skipped"
                    );
                }
            }
            None => {
                self.executor.execute(&to_one.remove, &params)?;
            }
        }
        Ok(())
    }
}

impl<E: GraphExecutor> GridDialect for GraphDialect<E> {
    fn get_tuple(
        &self,
        key: &EntityKey,
        context: &TupleContext,
    ) -> Result<Option<Tuple>, OgmError> {
        let queries = self.entity_queries(key.metadata());
        let found = self
            .executor
            .query(queries.find_entity(), key.column_values())?
            .into_entity()?;
        match found {
            Some(found) => Ok(Some(self.assemble_tuple(key, &queries, found, context)?)),
            None => Ok(None),
        }
    }

    fn get_tuples(
        &self,
        keys: &[EntityKey],
        context: &TupleContext,
    ) -> Result<Vec<Option<Tuple>>, OgmError> {
        let Some(first) = keys.first() else {
            return Ok(Vec::new());
        };
        let metadata = first.metadata();
        if keys.iter().any(|k| k.metadata() != metadata) {
            return keys.iter().map(|k| self.get_tuple(k, context)).collect();
        }

        let queries = self.entity_queries(metadata);
        let params: Vec<Value> = keys
            .iter()
            .flat_map(|k| k.column_values().iter().cloned())
            .collect();
        let found = self
            .executor
            .query(&queries.find_entities(keys.len()), &params)?
            .into_entities()?;

        keys.iter()
            .map(|key| {
                let matched = found
                    .iter()
                    .find(|m| key.columns().all(|(c, v)| m.node.properties.get(c) == Some(v)));
                match matched {
                    Some(m) => self.assemble_tuple(key, &queries, m.clone(), context).map(Some),
                    None => Ok(None),
                }
            })
            .collect()
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
        context: &TupleContext,
    ) -> Result<(), OgmError> {
        let queries = self.entity_queries(key.metadata());
        let owner_key = key.column_values();
        if tuple.snapshot_type() == SnapshotType::Insert {
            self.executor.execute(queries.create_entity(), owner_key)?;
        }

        let operations = coalesce_operations(tuple.operations());
        let mut set_columns = Vec::new();
        let mut set_values = Vec::new();
        let mut removed = Vec::new();
        let mut to_one: Vec<&ToOneAssociation> = Vec::new();

        for operation in &operations {
            let column = operation.column();
            if key.metadata().is_key_column(column) {
                continue;
            }
            if let Some(association) = context.to_one_for_column(column) {
                if !to_one.iter().any(|a| a.role == association.role) {
                    to_one.push(association);
                }
                continue;
            }
            let value = match operation {
                TupleOperation::Put { value, .. } if !value.is_null() => Some(value.clone()),
                _ => None,
            };
            let embedded = match value {
                Some(_) => queries.update_embedded(column),
                None => queries.remove_embedded(column),
            };
            if let Some(query) = embedded {
                let mut params = owner_key.to_vec();
                params.extend(value);
                self.executor.execute(&query, &params)?;
                continue;
            }
            match value {
                Some(value) => {
                    set_columns.push(column.to_string());
                    set_values.push(value);
                }
                None => removed.push(column.to_string()),
            }
        }

        if !set_columns.is_empty() {
            let mut params = owner_key.to_vec();
            params.extend(set_values);
            self.executor.execute(&queries.set_properties(&set_columns), &params)?;
        }
        if !removed.is_empty() {
            self.executor.execute(&queries.remove_properties(&removed), owner_key)?;
        }
        for association in to_one {
            self.write_to_one(key, &queries, association, tuple)?;
        }
        trace!(key = %key, operations = operations.len(), "graph: tuple written");

        let node = tuple.snapshot_as::<NodeSnapshot>().and_then(NodeSnapshot::node);
        let mut values = tuple.to_values();
        values.retain(|_, v| !v.is_null());
        for (column, value) in key.columns() {
            values.entry(column.to_string()).or_insert_with(|| value.clone());
        }
        tuple.rebase(Box::new(NodeSnapshot::new(node, values)));
        Ok(())
    }

    fn remove_tuple(&mut self, key: &EntityKey, _context: &TupleContext) -> Result<(), OgmError> {
        let queries = self.entity_queries(key.metadata());
        let removed = self
            .executor
            .execute(queries.remove_entity(), key.column_values())?
            .into_count()?;
        debug!(key = %key, nodes = removed, "graph: tuple removed");
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, OgmError> {
        let queries = self.association_queries(key, context);
        let found = self
            .executor
            .query(queries.find_rows(), key.entity_key().column_values())?
            .into_relationships()?;
        let Some(found) = found else {
            return Ok(None);
        };
        let row_columns = key.metadata().row_key_column_names();
        let mut rows = IndexMap::new();
        for relationship in &found {
            let values = queries.row_values(key, relationship);
            let mut builder = RowKeyBuilder::new(row_columns);
            for (column, value) in &values {
                builder = builder.value(column, value.clone());
            }
            rows.insert(builder.build(), values);
        }
        Ok(Some(Association::from_rows(rows)))
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
        context: &AssociationContext,
    ) -> Result<(), OgmError> {
        if !key.metadata().is_inverse() {
            let queries = self.association_queries(key, context);
            let owner_key = key.entity_key().column_values();
            for operation in association.operations() {
                match operation {
                    AssociationOperation::Clear => {
                        self.executor.execute(queries.remove_all(), owner_key)?;
                    }
                    AssociationOperation::Remove { row_key } => {
                        let mut params = owner_key.to_vec();
                        params.extend(queries.row_parameters(row_key));
                        self.executor.execute(queries.remove_row(), &params)?;
                    }
                    AssociationOperation::Put { row_key, tuple } => {
                        let mut params = owner_key.to_vec();
                        params.extend(queries.row_parameters(row_key));
                        self.executor.execute(queries.remove_row(), &params)?;

                        let (create, row_params) = queries.create_row(&tuple.to_values());
                        let mut params = owner_key.to_vec();
                        params.extend(row_params);
                        self.executor.execute(&create, &params)?;
                    }
                }
            }
            trace!(
                key = %key,
                operations = association.operations().len(),
                "graph: association written"
            );
        }
        let rows = association.to_rows();
        association.rebase(Box::new(MapAssociationSnapshot::new(rows)));
        Ok(())
    }

    fn remove_association(
        &mut self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), OgmError> {
        if key.metadata().is_inverse() {
            return Ok(());
        }
        let queries = self.association_queries(key, context);
        let removed = self
            .executor
            .execute(queries.remove_all(), key.entity_key().column_values())?
            .into_count()?;
        debug!(key = %key, relationships = removed, "graph: association removed");
        Ok(())
    }

    fn is_stored_in_entity_structure(&self, _metadata: &AssociationKeyMetadata) -> bool {
        false
    }

    fn next_value(&mut self, request: &NextValueRequest) -> Result<i64, OgmError> {
        let params = [
            Value::Text(request.key.name().to_string()),
            Value::Int(request.initial_value),
            Value::Int(request.increment),
        ];
        let value = self
            .executor
            .execute(&self.next_sequence_value, &params)?
            .into_value()?;
        value.as_i64().ok_or_else(|| {
            GraphError::UnexpectedResult {
                expected: format!("integer value for sequence '{}'", request.key.name()),
            }
            .into()
        })
    }

    fn execute_backend_query(&self, query: &BackendQuery) -> Result<TupleStream, OgmError> {
        let found = self.executor.query_native(&query.query, &query.parameters)?;
        let tuples: Vec<Tuple> = found
            .into_iter()
            .map(|m| {
                let mut values = m.node.properties;
                for embedded in m.embedded {
                    let prefix = embedded.path.join(".");
                    for (property, value) in embedded.properties {
                        values.insert(format!("{}.{}", prefix, property), value);
                    }
                }
                Tuple::with_snapshot(
                    Box::new(NodeSnapshot::new(Some(m.node.id), values)),
                    SnapshotType::Update,
                )
            })
            .collect();
        Ok(Box::new(tuples.into_iter()))
    }

    fn execute_backend_update_query(&mut self, query: &BackendQuery) -> Result<u64, OgmError> {
        Ok(self.executor.execute_native(&query.query, &query.parameters)?)
    }

    fn supports_null_values(&self) -> bool {
        false
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        _metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        DuplicateInsertPreventionStrategy::Native
    }

    fn schema_created(&mut self, schema: &SchemaDefinition) -> Result<(), OgmError> {
        for metadata in &schema.entity_key_metadata {
            self.entity_queries(metadata);
        }
        debug!(
            entities = schema.entity_key_metadata.len(),
            associations = schema.association_key_metadata.len(),
            "graph: entity templates compiled"
        );
        Ok(())
    }
}

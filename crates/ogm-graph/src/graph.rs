//! In-process property graph and the [`GraphExecutor`] seam.
//!
//! [`PropertyGraph`] stores labelled nodes and typed relationships, both
//! carrying property maps, on a petgraph `StableGraph` so that indices stay
//! valid across removals. It runs [`CompiledQuery`] plans and the native
//! Cypher subset from [`crate::native`]. A remote Cypher server would be a
//! second [`GraphExecutor`] sending [`CompiledQuery::text`] instead.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::Directed;
use tracing::trace;

use ogm_core::Value;

use crate::cypher::{EMBEDDED, ENTITY, SEQUENCE, SEQUENCE_NAME, SEQUENCE_VALUE};
use crate::error::GraphError;
use crate::native::{NativeAction, NativeQuery};
use crate::statement::{CompiledQuery, Direction, NodePattern, Statement, Target};

/// Runs compiled statements and native queries against a graph store.
pub trait GraphExecutor {
    /// Runs a read statement.
    fn query(&self, query: &CompiledQuery, params: &[Value]) -> Result<QueryResult, GraphError>;

    /// Runs any statement.
    fn execute(
        &mut self,
        query: &CompiledQuery,
        params: &[Value],
    ) -> Result<QueryResult, GraphError>;

    /// Runs a native `RETURN` query.
    fn query_native(
        &self,
        query: &str,
        params: &IndexMap<String, Value>,
    ) -> Result<Vec<EntityMatch>, GraphError>;

    /// Runs a native `SET` or `DELETE` query; returns the number of nodes touched.
    fn execute_native(
        &mut self,
        query: &str,
        params: &IndexMap<String, Value>,
    ) -> Result<u64, GraphError>;
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Stable identity of a node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct NodeView {
    pub id: NodeRef,
    pub labels: Vec<String>,
    pub properties: IndexMap<String, Value>,
}

/// An embedded node with the relationship types leading to it from the owner.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedView {
    pub path: Vec<String>,
    pub properties: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMatch {
    pub node: NodeView,
    pub embedded: Vec<EmbeddedView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipMatch {
    pub properties: IndexMap<String, Value>,
    pub target: NodeView,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Count(u64),
    Entity(Option<EntityMatch>),
    Entities(Vec<EntityMatch>),
    Node(Option<NodeView>),
    /// `None` when the owner node does not exist.
    Relationships(Option<Vec<RelationshipMatch>>),
    Value(Value),
}

fn unexpected(expected: &str) -> GraphError {
    GraphError::UnexpectedResult {
        expected: expected.to_string(),
    }
}

impl QueryResult {
    pub fn into_entity(self) -> Result<Option<EntityMatch>, GraphError> {
        match self {
            QueryResult::Entity(found) => Ok(found),
            _ => Err(unexpected("entity")),
        }
    }

    pub fn into_entities(self) -> Result<Vec<EntityMatch>, GraphError> {
        match self {
            QueryResult::Entities(found) => Ok(found),
            _ => Err(unexpected("entities")),
        }
    }

    pub fn into_node(self) -> Result<Option<NodeView>, GraphError> {
        match self {
            QueryResult::Node(found) => Ok(found),
            _ => Err(unexpected("node")),
        }
    }

    pub fn into_relationships(self) -> Result<Option<Vec<RelationshipMatch>>, GraphError> {
        match self {
            QueryResult::Relationships(found) => Ok(found),
            _ => Err(unexpected("relationships")),
        }
    }

    pub fn into_count(self) -> Result<u64, GraphError> {
        match self {
            QueryResult::Count(count) => Ok(count),
            _ => Err(unexpected("count")),
        }
    }

    pub fn into_value(self) -> Result<Value, GraphError> {
        match self {
            QueryResult::Value(value) => Ok(value),
            _ => Err(unexpected("value")),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub labels: Vec<String>,
    pub properties: IndexMap<String, Value>,
}

impl NodeData {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    fn matches(&self, properties: &[String], values: &[Value]) -> bool {
        properties
            .iter()
            .zip(values)
            .all(|(p, v)| self.properties.get(p) == Some(v))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelData {
    pub rel_type: String,
    pub properties: IndexMap<String, Value>,
}

/// Positional parameter cursor for one statement.
struct Params<'a> {
    statement: &'static str,
    values: &'a [Value],
    pos: usize,
}

impl<'a> Params<'a> {
    fn new(statement: &'static str, values: &'a [Value]) -> Self {
        Params {
            statement,
            values,
            pos: 0,
        }
    }

    fn take(&mut self, count: usize) -> Result<&'a [Value], GraphError> {
        let end = self.pos + count;
        if end > self.values.len() {
            return Err(GraphError::MissingParameter {
                statement: self.statement.to_string(),
                position: self.values.len(),
            });
        }
        let slice = &self.values[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn one(&mut self) -> Result<&'a Value, GraphError> {
        Ok(&self.take(1)?[0])
    }

    fn int(&mut self) -> Result<i64, GraphError> {
        let value = self.one()?;
        value.as_i64().ok_or_else(|| GraphError::InvalidParameter {
            statement: self.statement.to_string(),
            reason: format!("expected integer, got {}", value.type_name()),
        })
    }

    fn rest(&mut self) -> &'a [Value] {
        let slice = &self.values[self.pos..];
        self.pos = self.values.len();
        slice
    }
}

fn non_null_properties(names: &[String], values: &[Value]) -> IndexMap<String, Value> {
    names
        .iter()
        .zip(values)
        .filter(|(_, v)| !v.is_null())
        .map(|(n, v)| (n.clone(), v.clone()))
        .collect()
}

/// In-memory labelled property graph.
#[derive(Debug, Clone, Default)]
pub struct PropertyGraph {
    graph: StableGraph<NodeData, RelData, Directed, u32>,
    /// Label to nodes carrying it, ordered by creation.
    labels: HashMap<String, BTreeSet<NodeIndex<u32>>>,
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of nodes carrying `label`.
    pub fn label_count(&self, label: &str) -> usize {
        self.labels.get(label).map_or(0, |nodes| nodes.len())
    }

    /// Every node carrying `label`, in creation order.
    pub fn nodes_with_label(&self, label: &str) -> Vec<NodeView> {
        self.with_label(label).map(|n| self.view(n)).collect()
    }

    fn add_node(
        &mut self,
        labels: Vec<String>,
        properties: IndexMap<String, Value>,
    ) -> NodeIndex<u32> {
        let index = self.graph.add_node(NodeData {
            labels: labels.clone(),
            properties,
        });
        for label in labels {
            self.labels.entry(label).or_default().insert(index);
        }
        index
    }

    fn delete_node(&mut self, index: NodeIndex<u32>) -> bool {
        match self.graph.remove_node(index) {
            Some(data) => {
                for label in &data.labels {
                    if let Some(nodes) = self.labels.get_mut(label) {
                        nodes.remove(&index);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Deletes `index` and every embedded node reachable from it.
    fn delete_with_embedded(&mut self, index: NodeIndex<u32>) -> u64 {
        let mut doomed = self.embedded_descendants(index);
        doomed.push(index);
        doomed.into_iter().filter(|&n| self.delete_node(n)).count() as u64
    }

    fn embedded_descendants(&self, index: NodeIndex<u32>) -> Vec<NodeIndex<u32>> {
        let mut seen = HashSet::new();
        let mut stack = vec![index];
        let mut found = Vec::new();
        while let Some(current) = stack.pop() {
            for edge in self.graph.edges_directed(current, petgraph::Direction::Outgoing) {
                let next = edge.target();
                if self.graph[next].has_label(EMBEDDED) && seen.insert(next) {
                    found.push(next);
                    stack.push(next);
                }
            }
        }
        found
    }

    fn with_label<'a>(&'a self, label: &str) -> impl Iterator<Item = NodeIndex<u32>> + 'a {
        self.labels
            .get(label)
            .into_iter()
            .flat_map(|nodes| nodes.iter().copied())
    }

    fn find_entity(&self, pattern: &NodePattern, key: &[Value]) -> Option<NodeIndex<u32>> {
        self.with_label(&pattern.label).find(|&n| {
            let node = &self.graph[n];
            node.has_label(ENTITY) && node.matches(&pattern.key_columns, key)
        })
    }

    fn view(&self, index: NodeIndex<u32>) -> NodeView {
        let node = &self.graph[index];
        NodeView {
            id: NodeRef(index.index() as u32),
            labels: node.labels.clone(),
            properties: node.properties.clone(),
        }
    }

    fn entity_match(&self, index: NodeIndex<u32>) -> EntityMatch {
        let mut embedded = Vec::new();
        let mut stack: Vec<(NodeIndex<u32>, Vec<String>)> = vec![(index, Vec::new())];
        let mut seen = HashSet::new();
        while let Some((current, path)) = stack.pop() {
            for edge in self.graph.edges_directed(current, petgraph::Direction::Outgoing) {
                let next = edge.target();
                let node = &self.graph[next];
                if !node.has_label(EMBEDDED) || !seen.insert(next) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(edge.weight().rel_type.clone());
                embedded.push(EmbeddedView {
                    path: next_path.clone(),
                    properties: node.properties.clone(),
                });
                stack.push((next, next_path));
            }
        }
        EntityMatch {
            node: self.view(index),
            embedded,
        }
    }

    /// Relationships of `rel_type` at `index`, with the node at the other end.
    fn relationships(
        &self,
        index: NodeIndex<u32>,
        direction: Direction,
        rel_type: &str,
    ) -> Vec<(EdgeIndex<u32>, NodeIndex<u32>)> {
        let (petgraph_direction, outgoing) = match direction {
            Direction::Outgoing => (petgraph::Direction::Outgoing, true),
            Direction::Incoming => (petgraph::Direction::Incoming, false),
        };
        self.graph
            .edges_directed(index, petgraph_direction)
            .filter(|e| e.weight().rel_type == rel_type)
            .map(|e| (e.id(), if outgoing { e.target() } else { e.source() }))
            .collect()
    }

    fn is_target(&self, index: NodeIndex<u32>, target: &Target) -> bool {
        let node = &self.graph[index];
        match target {
            Target::Entity(pattern) => node.has_label(ENTITY) && node.has_label(&pattern.label),
            Target::Embedded { label } => node.has_label(EMBEDDED) && node.has_label(label),
        }
    }

    /// Follows `path` from `owner` through embedded nodes.
    fn embedded_chain(
        &self,
        owner: NodeIndex<u32>,
        path: &[String],
    ) -> Option<Vec<NodeIndex<u32>>> {
        let mut chain = Vec::with_capacity(path.len());
        let mut current = owner;
        for segment in path {
            current = self
                .relationships(current, Direction::Outgoing, segment)
                .into_iter()
                .map(|(_, n)| n)
                .find(|&n| self.graph[n].has_label(EMBEDDED))?;
            chain.push(current);
        }
        Some(chain)
    }

    fn read(
        &self,
        statement: &Statement,
        params: &mut Params<'_>,
    ) -> Result<QueryResult, GraphError> {
        match statement {
            Statement::FindEntity { owner } => {
                let key = params.take(owner.arity())?;
                Ok(QueryResult::Entity(
                    self.find_entity(owner, key).map(|n| self.entity_match(n)),
                ))
            }
            Statement::FindEntities {
                label,
                key_columns,
                key_count,
            } => {
                let pattern = NodePattern::new(label.clone(), key_columns.clone());
                let keys: Vec<&[Value]> = match key_count {
                    Some(count) => (0..*count)
                        .map(|_| params.take(pattern.arity()))
                        .collect::<Result<_, _>>()?,
                    None => params.rest().chunks(1).collect(),
                };
                let mut found = Vec::new();
                let mut seen = HashSet::new();
                for key in keys {
                    if let Some(n) = self.find_entity(&pattern, key) {
                        if seen.insert(n) {
                            found.push(self.entity_match(n));
                        }
                    }
                }
                Ok(QueryResult::Entities(found))
            }
            Statement::FindAssociatedEntity { owner, role } => {
                let key = params.take(owner.arity())?;
                let target = self.find_entity(owner, key).and_then(|n| {
                    self.relationships(n, Direction::Outgoing, role)
                        .into_iter()
                        .map(|(_, t)| t)
                        .find(|&t| self.graph[t].has_label(ENTITY))
                });
                Ok(QueryResult::Node(target.map(|t| self.view(t))))
            }
            Statement::FindRelationships {
                owner,
                role,
                direction,
                target,
            } => {
                let key = params.take(owner.arity())?;
                let Some(owner_node) = self.find_entity(owner, key) else {
                    return Ok(QueryResult::Relationships(None));
                };
                let rows = self
                    .relationships(owner_node, *direction, role)
                    .into_iter()
                    .filter(|&(_, t)| self.is_target(t, target))
                    .map(|(e, t)| RelationshipMatch {
                        properties: self.graph[e].properties.clone(),
                        target: self.view(t),
                    })
                    .collect();
                Ok(QueryResult::Relationships(Some(rows)))
            }
            other => Err(GraphError::ReadOnly {
                statement: other.name().to_string(),
            }),
        }
    }

    fn write(
        &mut self,
        statement: &Statement,
        params: &mut Params<'_>,
    ) -> Result<QueryResult, GraphError> {
        match statement {
            Statement::CreateEntity { owner } => {
                let key = params.take(owner.arity())?;
                if self.find_entity(owner, key).is_some() {
                    return Err(GraphError::UniqueConstraint {
                        label: owner.label.clone(),
                        key: ogm_core::value::display_values(key),
                    });
                }
                self.add_node(
                    vec![ENTITY.to_string(), owner.label.clone()],
                    non_null_properties(&owner.key_columns, key),
                );
                Ok(QueryResult::Count(1))
            }
            Statement::RemoveEntity { owner } => {
                let key = params.take(owner.arity())?;
                let removed = match self.find_entity(owner, key) {
                    Some(n) => self.delete_with_embedded(n),
                    None => 0,
                };
                Ok(QueryResult::Count(removed))
            }
            Statement::SetProperties { owner, properties } => {
                let key = params.take(owner.arity())?;
                let values = params.take(properties.len())?;
                let Some(n) = self.find_entity(owner, key) else {
                    return Ok(QueryResult::Count(0));
                };
                let node = &mut self.graph[n];
                for (name, value) in properties.iter().zip(values) {
                    if value.is_null() {
                        node.properties.shift_remove(name);
                    } else {
                        node.properties.insert(name.clone(), value.clone());
                    }
                }
                Ok(QueryResult::Count(1))
            }
            Statement::RemoveProperties { owner, properties } => {
                let key = params.take(owner.arity())?;
                let Some(n) = self.find_entity(owner, key) else {
                    return Ok(QueryResult::Count(0));
                };
                let node = &mut self.graph[n];
                for name in properties {
                    node.properties.shift_remove(name);
                }
                Ok(QueryResult::Count(1))
            }
            Statement::MergeEmbeddedProperty {
                owner,
                path,
                property,
            } => {
                let key = params.take(owner.arity())?;
                let value = params.one()?.clone();
                let Some(mut current) = self.find_entity(owner, key) else {
                    return Ok(QueryResult::Count(0));
                };
                for segment in path {
                    let existing = self
                        .relationships(current, Direction::Outgoing, segment)
                        .into_iter()
                        .map(|(_, n)| n)
                        .find(|&n| self.graph[n].has_label(EMBEDDED));
                    current = match existing {
                        Some(n) => n,
                        None => {
                            let created =
                                self.add_node(vec![EMBEDDED.to_string()], IndexMap::new());
                            self.graph.add_edge(
                                current,
                                created,
                                RelData {
                                    rel_type: segment.clone(),
                                    properties: IndexMap::new(),
                                },
                            );
                            created
                        }
                    };
                }
                self.graph[current].properties.insert(property.clone(), value);
                Ok(QueryResult::Count(1))
            }
            Statement::RemoveEmbeddedProperty {
                owner,
                path,
                property,
            } => {
                let key = params.take(owner.arity())?;
                let chain = self
                    .find_entity(owner, key)
                    .and_then(|n| self.embedded_chain(n, path));
                let Some(chain) = chain else {
                    return Ok(QueryResult::Count(0));
                };
                let Some(&leaf) = chain.last() else {
                    return Ok(QueryResult::Count(0));
                };
                self.graph[leaf].properties.shift_remove(property);

                let mut deleted = 0;
                for &node in chain.iter().rev() {
                    let childless = self
                        .graph
                        .edges_directed(node, petgraph::Direction::Outgoing)
                        .next()
                        .is_none();
                    if !childless || !self.graph[node].properties.is_empty() {
                        break;
                    }
                    self.delete_node(node);
                    deleted += 1;
                }
                Ok(QueryResult::Count(deleted))
            }
            Statement::ReplaceToOne {
                owner,
                role,
                target,
            } => {
                let key = params.take(owner.arity())?;
                let target_key = params.take(target.arity())?;
                let (Some(from), Some(to)) =
                    (self.find_entity(owner, key), self.find_entity(target, target_key))
                else {
                    return Ok(QueryResult::Count(0));
                };
                for (edge, _) in self.relationships(from, Direction::Outgoing, role) {
                    self.graph.remove_edge(edge);
                }
                self.graph.add_edge(
                    from,
                    to,
                    RelData {
                        rel_type: role.clone(),
                        properties: IndexMap::new(),
                    },
                );
                Ok(QueryResult::Count(1))
            }
            Statement::RemoveToOne { owner, role } => {
                let key = params.take(owner.arity())?;
                let Some(from) = self.find_entity(owner, key) else {
                    return Ok(QueryResult::Count(0));
                };
                let edges = self.relationships(from, Direction::Outgoing, role);
                let removed = edges.len() as u64;
                for (edge, _) in edges {
                    self.graph.remove_edge(edge);
                }
                Ok(QueryResult::Count(removed))
            }
            Statement::CreateRelationship {
                owner,
                role,
                target,
                node_properties,
                relationship_properties,
            } => {
                let key = params.take(owner.arity())?;
                let from = self.find_entity(owner, key);
                let to = match target {
                    Target::Entity(pattern) => {
                        let target_key = params.take(pattern.arity())?;
                        self.find_entity(pattern, target_key)
                    }
                    Target::Embedded { label } => {
                        let values = params.take(node_properties.len())?;
                        match from {
                            Some(_) => Some(self.add_node(
                                vec![EMBEDDED.to_string(), label.clone()],
                                non_null_properties(node_properties, values),
                            )),
                            None => None,
                        }
                    }
                };
                let rel_values = params.take(relationship_properties.len())?;
                let (Some(from), Some(to)) = (from, to) else {
                    return Ok(QueryResult::Count(0));
                };
                self.graph.add_edge(
                    from,
                    to,
                    RelData {
                        rel_type: role.clone(),
                        properties: non_null_properties(relationship_properties, rel_values),
                    },
                );
                Ok(QueryResult::Count(1))
            }
            Statement::RemoveRelationships {
                owner,
                role,
                direction,
                target,
                relationship_properties,
                target_properties,
            } => {
                let key = params.take(owner.arity())?;
                let rel_values = params.take(relationship_properties.len())?;
                let target_values = params.take(target_properties.len())?;
                let Some(from) = self.find_entity(owner, key) else {
                    return Ok(QueryResult::Count(0));
                };
                let matching: Vec<(EdgeIndex<u32>, NodeIndex<u32>)> = self
                    .relationships(from, *direction, role)
                    .into_iter()
                    .filter(|&(e, t)| {
                        let rel = &self.graph[e];
                        self.is_target(t, target)
                            && relationship_properties
                                .iter()
                                .zip(rel_values)
                                .all(|(p, v)| rel.properties.get(p) == Some(v))
                            && self.graph[t].matches(target_properties, target_values)
                    })
                    .collect();
                let removed = matching.len() as u64;
                for (edge, node) in matching {
                    self.graph.remove_edge(edge);
                    if matches!(target, Target::Embedded { .. }) {
                        self.delete_with_embedded(node);
                    }
                }
                Ok(QueryResult::Count(removed))
            }
            Statement::NextSequenceValue => {
                let name = params.one()?.clone();
                let initial = params.int()?;
                let increment = params.int()?;
                let existing = self
                    .with_label(SEQUENCE)
                    .find(|&n| self.graph[n].properties.get(SEQUENCE_NAME) == Some(&name));
                let value = match existing {
                    Some(n) => {
                        let current =
                            self.graph[n].properties.get(SEQUENCE_VALUE).and_then(Value::as_i64);
                        let next = match current {
                            Some(current) => current.checked_add(increment).ok_or_else(|| {
                                GraphError::SequenceExhausted {
                                    name: name.to_string(),
                                }
                            })?,
                            None => initial,
                        };
                        self.graph[n]
                            .properties
                            .insert(SEQUENCE_VALUE.to_string(), Value::Int(next));
                        next
                    }
                    None => {
                        let mut properties = IndexMap::new();
                        properties.insert(SEQUENCE_NAME.to_string(), name);
                        properties.insert(SEQUENCE_VALUE.to_string(), Value::Int(initial));
                        self.add_node(vec![SEQUENCE.to_string()], properties);
                        initial
                    }
                };
                Ok(QueryResult::Value(Value::Int(value)))
            }
            read => self.read(read, params),
        }
    }

    fn native_matches(
        &self,
        query: &NativeQuery,
        params: &IndexMap<String, Value>,
    ) -> Result<Vec<NodeIndex<u32>>, GraphError> {
        let conditions = query.bind_conditions(params)?;
        let candidates: Vec<NodeIndex<u32>> = match query.labels.first() {
            Some(label) => self.with_label(label).collect(),
            None => self.graph.node_indices().collect(),
        };
        Ok(candidates
            .into_iter()
            .filter(|&n| {
                let node = &self.graph[n];
                query.labels.iter().all(|l| node.has_label(l))
                    && conditions
                        .iter()
                        .all(|(p, v)| node.properties.get(p) == Some(v))
            })
            .collect())
    }
}

impl GraphExecutor for PropertyGraph {
    fn query(&self, query: &CompiledQuery, params: &[Value]) -> Result<QueryResult, GraphError> {
        trace!(statement = query.statement.name(), "graph: query");
        self.read(&query.statement, &mut Params::new(query.statement.name(), params))
    }

    fn execute(
        &mut self,
        query: &CompiledQuery,
        params: &[Value],
    ) -> Result<QueryResult, GraphError> {
        trace!(statement = query.statement.name(), "graph: execute");
        self.write(&query.statement, &mut Params::new(query.statement.name(), params))
    }

    fn query_native(
        &self,
        query: &str,
        params: &IndexMap<String, Value>,
    ) -> Result<Vec<EntityMatch>, GraphError> {
        let parsed = NativeQuery::parse(query)?;
        if !parsed.is_read() {
            return Err(GraphError::ReadOnly {
                statement: query.to_string(),
            });
        }
        Ok(self
            .native_matches(&parsed, params)?
            .into_iter()
            .map(|n| self.entity_match(n))
            .collect())
    }

    fn execute_native(
        &mut self,
        query: &str,
        params: &IndexMap<String, Value>,
    ) -> Result<u64, GraphError> {
        let parsed = NativeQuery::parse(query)?;
        let nodes = self.native_matches(&parsed, params)?;
        match &parsed.action {
            NativeAction::Return => Err(GraphError::UnexpectedResult {
                expected: "SET or DELETE".to_string(),
            }),
            NativeAction::Set(assignments) => {
                let values: Vec<(String, Value)> = assignments
                    .iter()
                    .map(|(p, e)| Ok((p.clone(), e.resolve(params)?)))
                    .collect::<Result<_, GraphError>>()?;
                for &n in &nodes {
                    let node = &mut self.graph[n];
                    for (name, value) in &values {
                        if value.is_null() {
                            node.properties.shift_remove(name);
                        } else {
                            node.properties.insert(name.clone(), value.clone());
                        }
                    }
                }
                Ok(nodes.len() as u64)
            }
            NativeAction::Delete => {
                Ok(nodes.into_iter().filter(|&n| self.delete_node(n)).count() as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> NodePattern {
        NodePattern::new("Order", vec!["id".to_string()])
    }

    fn run(graph: &mut PropertyGraph, statement: Statement, params: &[Value]) -> QueryResult {
        graph
            .execute(&CompiledQuery::new(String::new(), statement), params)
            .unwrap()
    }

    fn create_order(graph: &mut PropertyGraph, id: i64) {
        run(graph, Statement::CreateEntity { owner: order() }, &[Value::Int(id)]);
    }

    fn merge(graph: &mut PropertyGraph, path: &[&str], property: &str, value: &str) {
        run(
            graph,
            Statement::MergeEmbeddedProperty {
                owner: order(),
                path: path.iter().map(|s| s.to_string()).collect(),
                property: property.to_string(),
            },
            &[Value::Int(1), Value::from(value)],
        );
    }

    fn remove(graph: &mut PropertyGraph, path: &[&str], property: &str) -> u64 {
        run(
            graph,
            Statement::RemoveEmbeddedProperty {
                owner: order(),
                path: path.iter().map(|s| s.to_string()).collect(),
                property: property.to_string(),
            },
            &[Value::Int(1)],
        )
        .into_count()
        .unwrap()
    }

    #[test]
    fn test_create_entity_rejects_duplicate_key() {
        let mut graph = PropertyGraph::new();
        create_order(&mut graph, 1);
        let err = graph
            .execute(
                &CompiledQuery::new("", Statement::CreateEntity { owner: order() }),
                &[Value::Int(1)],
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::UniqueConstraint { ref label, .. } if label == "Order"));
        assert_eq!(graph.label_count("Order"), 1);
    }

    #[test]
    fn test_embedded_chain_cleanup_stops_at_non_empty_ancestor() {
        let mut graph = PropertyGraph::new();
        create_order(&mut graph, 1);
        merge(&mut graph, &["a", "b"], "c", "deep");
        merge(&mut graph, &["a"], "d", "shallow");
        assert_eq!(graph.label_count(EMBEDDED), 2);

        // b becomes empty and childless; a still holds d.
        assert_eq!(remove(&mut graph, &["a", "b"], "c"), 1);
        assert_eq!(graph.label_count(EMBEDDED), 1);

        assert_eq!(remove(&mut graph, &["a"], "d"), 1);
        assert_eq!(graph.label_count(EMBEDDED), 0);
        assert_eq!(graph.relationship_count(), 0);
    }

    #[test]
    fn test_embedded_cleanup_keeps_node_with_children() {
        let mut graph = PropertyGraph::new();
        create_order(&mut graph, 1);
        merge(&mut graph, &["a"], "d", "x");
        merge(&mut graph, &["a", "b"], "c", "y");

        assert_eq!(remove(&mut graph, &["a"], "d"), 0);
        assert_eq!(graph.label_count(EMBEDDED), 2);
        assert_eq!(remove(&mut graph, &["a", "b"], "c"), 2);
        assert_eq!(graph.label_count(EMBEDDED), 0);
    }

    #[test]
    fn test_find_entity_collects_embedded_paths() {
        let mut graph = PropertyGraph::new();
        create_order(&mut graph, 1);
        merge(&mut graph, &["address"], "city", "Oslo");
        merge(&mut graph, &["address", "geo"], "lat", "59.9");

        let find = CompiledQuery::new("", Statement::FindEntity { owner: order() });
        let found = graph
            .query(&find, &[Value::Int(1)])
            .unwrap()
            .into_entity()
            .unwrap()
            .unwrap();
        let mut paths: Vec<String> = found.embedded.iter().map(|e| e.path.join(".")).collect();
        paths.sort();
        assert_eq!(paths, vec!["address", "address.geo"]);
    }

    #[test]
    fn test_remove_entity_deletes_embedded_descendants() {
        let mut graph = PropertyGraph::new();
        create_order(&mut graph, 1);
        merge(&mut graph, &["a", "b"], "c", "x");
        let removed = run(&mut graph, Statement::RemoveEntity { owner: order() }, &[Value::Int(1)]);
        assert_eq!(removed, QueryResult::Count(3));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_query_rejects_write_statement() {
        let graph = PropertyGraph::new();
        let create = CompiledQuery::new("", Statement::CreateEntity { owner: order() });
        let err = graph
            .query(&create, &[Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, GraphError::ReadOnly { .. }));
    }

    #[test]
    fn test_missing_parameter() {
        let mut graph = PropertyGraph::new();
        let err = graph
            .execute(&CompiledQuery::new("", Statement::CreateEntity { owner: order() }), &[])
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingParameter { position: 0, .. }));
    }

    #[test]
    fn test_sequence_starts_at_initial_value() {
        let mut graph = PropertyGraph::new();
        let params = [Value::from("order_seq"), Value::Int(100), Value::Int(10)];
        let first = run(&mut graph, Statement::NextSequenceValue, &params);
        let second = run(&mut graph, Statement::NextSequenceValue, &params);
        assert_eq!(first, QueryResult::Value(Value::Int(100)));
        assert_eq!(second, QueryResult::Value(Value::Int(110)));
        assert_eq!(graph.label_count(SEQUENCE), 1);
    }

    #[test]
    fn test_sequence_overflow_is_an_error() {
        let mut graph = PropertyGraph::new();
        let params = [Value::from("order_seq"), Value::Int(i64::MAX - 1), Value::Int(1)];
        let query = CompiledQuery::new(String::new(), Statement::NextSequenceValue);
        let next = |graph: &mut PropertyGraph| graph.execute(&query, &params);
        assert_eq!(next(&mut graph).unwrap(), QueryResult::Value(Value::Int(i64::MAX - 1)));
        assert_eq!(next(&mut graph).unwrap(), QueryResult::Value(Value::Int(i64::MAX)));
        let err = graph.execute(&query, &params).unwrap_err();
        assert!(matches!(err, GraphError::SequenceExhausted { .. }));
    }

    #[test]
    fn test_native_set_and_delete() {
        let mut graph = PropertyGraph::new();
        create_order(&mut graph, 1);
        create_order(&mut graph, 2);
        let mut params = IndexMap::new();
        params.insert("id".to_string(), Value::Int(2));

        let touched = graph
            .execute_native("MATCH (o:Order) WHERE o.id = {id} SET o.status = 'paid'", &params)
            .unwrap();
        assert_eq!(touched, 1);
        let paid = graph
            .query_native("MATCH (o:ENTITY:Order {status: 'paid'}) RETURN o", &IndexMap::new())
            .unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].node.properties.get("id"), Some(&Value::Int(2)));

        assert_eq!(graph.execute_native("MATCH (o:Order) DETACH DELETE o", &params).unwrap(), 2);
        assert_eq!(graph.node_count(), 0);
    }
}

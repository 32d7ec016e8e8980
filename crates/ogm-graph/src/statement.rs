//! Compiled statements: Cypher text paired with an executable plan.
//!
//! Every template the dialect issues is a [`CompiledQuery`]. The text is what
//! a Cypher server would receive; the [`Statement`] is the same operation in
//! a form [`crate::graph::PropertyGraph`] runs directly. Parameters are bound
//! positionally, owner key values first.

use std::fmt;

/// An entity node located by label and key properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePattern {
    pub label: String,
    pub key_columns: Vec<String>,
}

impl NodePattern {
    pub fn new(label: impl Into<String>, key_columns: Vec<String>) -> Self {
        NodePattern {
            label: label.into(),
            key_columns,
        }
    }

    pub fn arity(&self) -> usize {
        self.key_columns.len()
    }
}

/// Direction of a relationship as seen from the owner node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// What sits at the far end of an association relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Another entity node.
    Entity(NodePattern),
    /// An embedded element node labelled with the collection table.
    Embedded { label: String },
}

/// The executable form of a template.
///
/// Comments give the parameter layout after the owner key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Owner node plus every embedded node reachable from it.
    FindEntity { owner: NodePattern },
    /// `key_count` keys of `key_columns.len()` values each; `None` means a
    /// single-column membership test over all parameters.
    FindEntities {
        label: String,
        key_columns: Vec<String>,
        key_count: Option<usize>,
    },
    CreateEntity { owner: NodePattern },
    /// Deletes the node, its relationships and its embedded descendants.
    RemoveEntity { owner: NodePattern },
    /// One value per property.
    SetProperties { owner: NodePattern, properties: Vec<String> },
    RemoveProperties { owner: NodePattern, properties: Vec<String> },
    /// One value; creates missing nodes along `path`.
    MergeEmbeddedProperty {
        owner: NodePattern,
        path: Vec<String>,
        property: String,
    },
    /// Removes the property, then deletes emptied childless nodes upwards.
    RemoveEmbeddedProperty {
        owner: NodePattern,
        path: Vec<String>,
        property: String,
    },
    /// Target key values; replaces any existing `role` relationship.
    ReplaceToOne {
        owner: NodePattern,
        role: String,
        target: NodePattern,
    },
    RemoveToOne { owner: NodePattern, role: String },
    FindAssociatedEntity { owner: NodePattern, role: String },
    FindRelationships {
        owner: NodePattern,
        role: String,
        direction: Direction,
        target: Target,
    },
    /// Target key values (entity) or `node_properties` values (embedded),
    /// then `relationship_properties` values.
    CreateRelationship {
        owner: NodePattern,
        role: String,
        target: Target,
        node_properties: Vec<String>,
        relationship_properties: Vec<String>,
    },
    /// `relationship_properties` values, then `target_properties` values.
    /// Both lists empty removes every `role` relationship.
    RemoveRelationships {
        owner: NodePattern,
        role: String,
        direction: Direction,
        target: Target,
        relationship_properties: Vec<String>,
        target_properties: Vec<String>,
    },
    /// Parameters: sequence name, initial value, increment. No owner.
    NextSequenceValue,
}

impl Statement {
    /// True for statements that only read.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Statement::FindEntity { .. }
                | Statement::FindEntities { .. }
                | Statement::FindAssociatedEntity { .. }
                | Statement::FindRelationships { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statement::FindEntity { .. } => "find_entity",
            Statement::FindEntities { .. } => "find_entities",
            Statement::CreateEntity { .. } => "create_entity",
            Statement::RemoveEntity { .. } => "remove_entity",
            Statement::SetProperties { .. } => "set_properties",
            Statement::RemoveProperties { .. } => "remove_properties",
            Statement::MergeEmbeddedProperty { .. } => "merge_embedded_property",
            Statement::RemoveEmbeddedProperty { .. } => "remove_embedded_property",
            Statement::ReplaceToOne { .. } => "replace_to_one",
            Statement::RemoveToOne { .. } => "remove_to_one",
            Statement::FindAssociatedEntity { .. } => "find_associated_entity",
            Statement::FindRelationships { .. } => "find_relationships",
            Statement::CreateRelationship { .. } => "create_relationship",
            Statement::RemoveRelationships { .. } => "remove_relationships",
            Statement::NextSequenceValue => "next_sequence_value",
        }
    }
}

/// A template ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub text: String,
    pub statement: Statement,
}

impl CompiledQuery {
    pub fn new(text: impl Into<String>, statement: Statement) -> Self {
        CompiledQuery {
            text: text.into(),
            statement,
        }
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

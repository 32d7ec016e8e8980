//! Cypher templates for one association role.
//!
//! Each row of an association is a relationship typed with the role name on
//! the main side. Index and identifier columns live on the relationship; the
//! element lives on the target node, which is either another entity or an
//! embedded element node labelled with the collection table.

use std::rc::Rc;

use ogm_core::association::RowValues;
use ogm_core::key::{
    AssociatedEntityKeyMetadata, AssociationKey, AssociationKeyMetadata, AssociationKind,
    EntityKeyMetadata, RowKey,
};
use ogm_core::Value;

use crate::cypher::{self, EMBEDDED, ENTITY};
use crate::graph::RelationshipMatch;
use crate::statement::{CompiledQuery, Direction, NodePattern, Statement, Target};

const OWNER: &str = "owner";
const TARGET: &str = "target";

/// Owner, role and far side of the relationships; enough to write Cypher.
#[derive(Debug, Clone)]
struct Shape {
    owner: NodePattern,
    role: String,
    direction: Direction,
    target: Target,
    /// Index columns and the surrogate identifier, stored on the relationship.
    relationship_columns: Vec<String>,
}

impl Shape {
    fn owner_node(&self) -> String {
        cypher::entity_node(OWNER, &self.owner.label, &self.owner.key_columns, 0)
    }

    fn target_node(&self, properties: &[String], first_param: usize) -> String {
        match &self.target {
            Target::Entity(pattern) => {
                cypher::node(TARGET, &[ENTITY, pattern.label.as_str()], properties, first_param)
            }
            Target::Embedded { label } => {
                cypher::node(TARGET, &[EMBEDDED, label.as_str()], properties, first_param)
            }
        }
    }

    fn incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }

    fn find_rows(&self) -> CompiledQuery {
        let rel = cypher::relationship("r", &self.role, &[], 0, self.incoming());
        CompiledQuery::new(
            format!(
                "MATCH {}{}{}\nRETURN r, {TARGET}",
                self.owner_node(),
                rel,
                self.target_node(&[], 0)
            ),
            Statement::FindRelationships {
                owner: self.owner.clone(),
                role: self.role.clone(),
                direction: self.direction,
                target: self.target.clone(),
            },
        )
    }

    fn remove(
        &self,
        relationship_properties: &[String],
        target_properties: &[String],
    ) -> CompiledQuery {
        let first = self.owner.arity();
        let rel =
            cypher::relationship("r", &self.role, relationship_properties, first, self.incoming());
        let target = self.target_node(target_properties, first + relationship_properties.len());
        let tail = match self.target {
            Target::Entity(_) => "DELETE r".to_string(),
            Target::Embedded { .. } => {
                format!("OPTIONAL MATCH ({TARGET})-[*]->(e:{EMBEDDED})\nDETACH DELETE {TARGET}, e")
            }
        };
        CompiledQuery::new(
            format!("MATCH {}{}{}\n{}", self.owner_node(), rel, target, tail),
            Statement::RemoveRelationships {
                owner: self.owner.clone(),
                role: self.role.clone(),
                direction: self.direction,
                target: self.target.clone(),
                relationship_properties: relationship_properties.to_vec(),
                target_properties: target_properties.to_vec(),
            },
        )
    }

    fn create_entity_row(&self, pattern: &NodePattern) -> CompiledQuery {
        let first = self.owner.arity();
        let target = self.target_node(&pattern.key_columns, first);
        let rel = cypher::relationship(
            "r",
            &self.role,
            &self.relationship_columns,
            first + pattern.arity(),
            false,
        );
        CompiledQuery::new(
            format!("MATCH {}, {}\nCREATE ({OWNER}){}({TARGET})", self.owner_node(), target, rel),
            Statement::CreateRelationship {
                owner: self.owner.clone(),
                role: self.role.clone(),
                target: self.target.clone(),
                node_properties: Vec::new(),
                relationship_properties: self.relationship_columns.clone(),
            },
        )
    }

    fn create_embedded_row(&self, node_properties: &[String]) -> CompiledQuery {
        let first = self.owner.arity();
        let rel = cypher::relationship(
            "r",
            &self.role,
            &self.relationship_columns,
            first + node_properties.len(),
            false,
        );
        CompiledQuery::new(
            format!(
                "MATCH {}\nCREATE ({OWNER}){}{}",
                self.owner_node(),
                rel,
                self.target_node(node_properties, first)
            ),
            Statement::CreateRelationship {
                owner: self.owner.clone(),
                role: self.role.clone(),
                target: self.target.clone(),
                node_properties: node_properties.to_vec(),
                relationship_properties: self.relationship_columns.clone(),
            },
        )
    }
}

#[derive(Debug)]
pub struct AssociationQueries {
    shape: Shape,
    associated: Option<AssociatedEntityKeyMetadata>,
    key_columns: Vec<String>,
    /// Row-key columns matched on the relationship.
    row_relationship_columns: Vec<String>,
    /// Row-key columns matched on the target, with the node property each maps to.
    row_target_columns: Vec<(String, String)>,
    find_rows: CompiledQuery,
    remove_all: CompiledQuery,
    remove_row: CompiledQuery,
    create_entity_row: Option<Rc<CompiledQuery>>,
}

impl AssociationQueries {
    pub fn new(metadata: &AssociationKeyMetadata, owner: &EntityKeyMetadata, role: &str) -> Self {
        let associated = match metadata.kind() {
            AssociationKind::Association => metadata.associated_entity_key_metadata().cloned(),
            AssociationKind::EmbeddedCollection => None,
        };
        let target = match &associated {
            Some(a) => Target::Entity(NodePattern::new(
                a.entity_key_metadata().table(),
                a.entity_key_metadata().column_names().to_vec(),
            )),
            None => Target::Embedded {
                label: metadata.table().to_string(),
            },
        };

        let mut relationship_columns: Vec<String> = metadata.row_key_index_column_names().to_vec();
        if let Some(identifier) = metadata.identifier_column() {
            if !relationship_columns.iter().any(|c| c == identifier) {
                relationship_columns.push(identifier.to_string());
            }
        }

        let mut row_relationship_columns = Vec::new();
        let mut row_target_columns = Vec::new();
        for column in metadata.row_key_column_names() {
            if metadata.is_key_column(column) {
                continue;
            }
            if relationship_columns.contains(column) {
                row_relationship_columns.push(column.clone());
                continue;
            }
            match &associated {
                Some(a) => match a.corresponding_entity_key_column(column) {
                    Some(entity_column) => {
                        row_target_columns.push((column.clone(), entity_column.to_string()))
                    }
                    None => row_relationship_columns.push(column.clone()),
                },
                None => row_target_columns.push((column.clone(), column.clone())),
            }
        }

        let shape = Shape {
            owner: NodePattern::new(owner.table(), owner.column_names().to_vec()),
            role: role.to_string(),
            direction: if metadata.is_inverse() {
                Direction::Incoming
            } else {
                Direction::Outgoing
            },
            target,
            relationship_columns,
        };
        let target_properties: Vec<String> =
            row_target_columns.iter().map(|(_, p)| p.clone()).collect();
        let create_entity_row = match &shape.target {
            Target::Entity(pattern) => Some(Rc::new(shape.create_entity_row(pattern))),
            Target::Embedded { .. } => None,
        };

        AssociationQueries {
            find_rows: shape.find_rows(),
            remove_all: shape.remove(&[], &[]),
            remove_row: shape.remove(&row_relationship_columns, &target_properties),
            create_entity_row,
            shape,
            associated,
            key_columns: metadata.column_names().to_vec(),
            row_relationship_columns,
            row_target_columns,
        }
    }

    pub fn owner(&self) -> &NodePattern {
        &self.shape.owner
    }

    pub fn role(&self) -> &str {
        &self.shape.role
    }

    pub fn direction(&self) -> Direction {
        self.shape.direction
    }

    pub fn target(&self) -> &Target {
        &self.shape.target
    }

    pub fn find_rows(&self) -> &CompiledQuery {
        &self.find_rows
    }

    pub fn remove_all(&self) -> &CompiledQuery {
        &self.remove_all
    }

    pub fn remove_row(&self) -> &CompiledQuery {
        &self.remove_row
    }

    /// Parameters of [`Self::remove_row`] after the owner key.
    pub fn row_parameters(&self, row_key: &RowKey) -> Vec<Value> {
        let value = |column: &str| row_key.column_value(column).cloned().unwrap_or(Value::Null);
        self.row_relationship_columns
            .iter()
            .map(|c| value(c))
            .chain(self.row_target_columns.iter().map(|(c, _)| value(c)))
            .collect()
    }

    /// Template and parameters (after the owner key) creating `row`.
    pub fn create_row(&self, row: &RowValues) -> (Rc<CompiledQuery>, Vec<Value>) {
        let value = |column: &str| row.get(column).cloned().unwrap_or(Value::Null);
        let relationship_values = self.shape.relationship_columns.iter().map(|c| value(c));
        match (&self.create_entity_row, &self.associated) {
            (Some(query), Some(associated)) => {
                let params = associated
                    .association_key_columns()
                    .iter()
                    .map(|c| value(c))
                    .chain(relationship_values)
                    .collect();
                (Rc::clone(query), params)
            }
            _ => {
                let node_properties: Vec<String> = row
                    .iter()
                    .filter(|(c, v)| {
                        !v.is_null()
                            && !self.key_columns.contains(*c)
                            && !self.shape.relationship_columns.contains(*c)
                    })
                    .map(|(c, _)| c.clone())
                    .collect();
                let params = node_properties
                    .iter()
                    .map(|c| value(c))
                    .chain(relationship_values)
                    .collect();
                (Rc::new(self.shape.create_embedded_row(&node_properties)), params)
            }
        }
    }

    /// Rebuilds an association row from a matched relationship.
    pub fn row_values(&self, key: &AssociationKey, found: &RelationshipMatch) -> RowValues {
        let mut values = RowValues::new();
        for (column, value) in key.column_names().iter().zip(key.column_values()) {
            values.insert(column.clone(), value.clone());
        }
        for (name, value) in &found.properties {
            values.insert(name.clone(), value.clone());
        }
        match &self.associated {
            Some(associated) => {
                let entity_columns = associated.entity_key_metadata().column_names();
                let columns = associated.association_key_columns().iter().zip(entity_columns);
                for (column, entity_column) in columns {
                    if let Some(value) = found.target.properties.get(entity_column) {
                        values.insert(column.clone(), value.clone());
                    }
                }
            }
            None => {
                for (name, value) in &found.target.properties {
                    values.insert(name.clone(), value.clone());
                }
            }
        }
        values
    }
}

//! Cypher templates for one entity type.
//!
//! Static templates (find, create, remove) are compiled when the type is
//! first seen. Templates that depend on the shape of a request (multi-get
//! by key count, embedded columns, to-one roles) are compiled on first use
//! and cached; multi-get templates live in a bounded cache because the key
//! count is unbounded.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ogm_core::key::EntityKeyMetadata;

use crate::cache::BoundedCache;
use crate::cypher::{
    self, escape_identifier, param, EMBEDDED, SEQUENCE, SEQUENCE_NAME, SEQUENCE_VALUE,
};
use crate::statement::{CompiledQuery, NodePattern, Statement};

const OWNER: &str = "owner";

/// Splits a dotted column into its embedded path and the leaf property.
pub fn split_embedded_column(column: &str) -> Option<(Vec<String>, String)> {
    let mut parts: Vec<String> = column.split('.').map(str::to_string).collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    let property = parts.pop()?;
    Some((parts, property))
}

#[derive(Debug)]
pub struct EntityQueries {
    owner: NodePattern,
    find_entity: CompiledQuery,
    create_entity: CompiledQuery,
    remove_entity: CompiledQuery,
    find_entities: RefCell<BoundedCache<usize, Rc<CompiledQuery>>>,
    embedded_updates: RefCell<HashMap<String, Rc<CompiledQuery>>>,
    embedded_removes: RefCell<HashMap<String, Rc<CompiledQuery>>>,
    to_one: RefCell<HashMap<String, Rc<ToOneQueries>>>,
}

/// Templates for one to-one role.
#[derive(Debug)]
pub struct ToOneQueries {
    pub replace: CompiledQuery,
    pub remove: CompiledQuery,
    pub find_target: CompiledQuery,
}

impl EntityQueries {
    pub fn new(metadata: &EntityKeyMetadata, cache_capacity: usize) -> Self {
        let owner = NodePattern::new(metadata.table(), metadata.column_names().to_vec());
        let owner_node = cypher::entity_node(OWNER, &owner.label, &owner.key_columns, 0);

        let find_entity = CompiledQuery::new(
            format!(
                "MATCH {owner_node}\n\
                 OPTIONAL MATCH ({OWNER})-[r*]->(e:{EMBEDDED})\n\
                 RETURN {OWNER}, r, e"
            ),
            Statement::FindEntity { owner: owner.clone() },
        );
        let create_entity = CompiledQuery::new(
            format!("CREATE {owner_node} RETURN {OWNER}"),
            Statement::CreateEntity { owner: owner.clone() },
        );
        let remove_entity = CompiledQuery::new(
            format!(
                "MATCH {owner_node}\n\
                 OPTIONAL MATCH ({OWNER})-[*]->(e:{EMBEDDED})\n\
                 DETACH DELETE {OWNER}, e"
            ),
            Statement::RemoveEntity { owner: owner.clone() },
        );

        EntityQueries {
            owner,
            find_entity,
            create_entity,
            remove_entity,
            find_entities: RefCell::new(BoundedCache::new(cache_capacity)),
            embedded_updates: RefCell::new(HashMap::new()),
            embedded_removes: RefCell::new(HashMap::new()),
            to_one: RefCell::new(HashMap::new()),
        }
    }

    pub fn owner(&self) -> &NodePattern {
        &self.owner
    }

    fn owner_node(&self) -> String {
        cypher::entity_node(OWNER, &self.owner.label, &self.owner.key_columns, 0)
    }

    pub fn find_entity(&self) -> &CompiledQuery {
        &self.find_entity
    }

    pub fn create_entity(&self) -> &CompiledQuery {
        &self.create_entity
    }

    pub fn remove_entity(&self) -> &CompiledQuery {
        &self.remove_entity
    }

    /// Multi-get template for `key_count` keys.
    ///
    /// Single-column keys share one membership template whatever the count.
    pub fn find_entities(&self, key_count: usize) -> Rc<CompiledQuery> {
        let single = self.owner.arity() == 1;
        let cache_key = if single { 0 } else { key_count };
        self.find_entities
            .borrow_mut()
            .get_or_insert_with(cache_key, || {
                Rc::new(self.compile_find_entities(key_count, single))
            })
    }

    fn compile_find_entities(&self, key_count: usize, single: bool) -> CompiledQuery {
        let node = cypher::node(OWNER, &[cypher::ENTITY, self.owner.label.as_str()], &[], 0);
        if single {
            let column = cypher::property(OWNER, &self.owner.key_columns[0]);
            return CompiledQuery::new(
                format!("MATCH {node} WHERE {column} IN {} RETURN {OWNER}", param(0)),
                Statement::FindEntities {
                    label: self.owner.label.clone(),
                    key_columns: self.owner.key_columns.clone(),
                    key_count: None,
                },
            );
        }
        let arity = self.owner.arity();
        let disjuncts: Vec<String> = (0..key_count)
            .map(|k| {
                let terms: Vec<String> = self
                    .owner
                    .key_columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        format!("{} = {}", cypher::property(OWNER, c), param(k * arity + i))
                    })
                    .collect();
                format!("({})", terms.join(" AND "))
            })
            .collect();
        CompiledQuery::new(
            format!("MATCH {node} WHERE {} RETURN {OWNER}", disjuncts.join(" OR ")),
            Statement::FindEntities {
                label: self.owner.label.clone(),
                key_columns: self.owner.key_columns.clone(),
                key_count: Some(key_count),
            },
        )
    }

    /// Sets `properties`, whose values follow the key parameters.
    pub fn set_properties(&self, properties: &[String]) -> CompiledQuery {
        let first = self.owner.arity();
        let assignments: Vec<String> = properties
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} = {}", cypher::property(OWNER, p), param(first + i)))
            .collect();
        CompiledQuery::new(
            format!("MATCH {} SET {}", self.owner_node(), assignments.join(", ")),
            Statement::SetProperties {
                owner: self.owner.clone(),
                properties: properties.to_vec(),
            },
        )
    }

    pub fn remove_properties(&self, properties: &[String]) -> CompiledQuery {
        let removed: Vec<String> = properties.iter().map(|p| cypher::property(OWNER, p)).collect();
        CompiledQuery::new(
            format!("MATCH {} REMOVE {}", self.owner_node(), removed.join(", ")),
            Statement::RemoveProperties {
                owner: self.owner.clone(),
                properties: properties.to_vec(),
            },
        )
    }

    /// Template writing the dotted `column`; `None` for a plain column.
    pub fn update_embedded(&self, column: &str) -> Option<Rc<CompiledQuery>> {
        if let Some(query) = self.embedded_updates.borrow().get(column) {
            return Some(Rc::clone(query));
        }
        let (path, property) = split_embedded_column(column)?;
        let mut text = format!("MATCH {}", self.owner_node());
        for (i, segment) in path.iter().enumerate() {
            let parent = if i == 0 { OWNER.to_string() } else { format!("e{}", i - 1) };
            text.push_str(&format!(
                "\nMERGE ({parent})-[:{}]->(e{i}:{EMBEDDED})",
                escape_identifier(segment)
            ));
        }
        text.push_str(&format!(
            "\nSET {} = {}",
            cypher::property(&format!("e{}", path.len() - 1), &property),
            param(self.owner.arity())
        ));
        let query = Rc::new(CompiledQuery::new(
            text,
            Statement::MergeEmbeddedProperty {
                owner: self.owner.clone(),
                path,
                property,
            },
        ));
        self.embedded_updates
            .borrow_mut()
            .insert(column.to_string(), Rc::clone(&query));
        Some(query)
    }

    /// Template removing the dotted `column` and pruning emptied nodes.
    pub fn remove_embedded(&self, column: &str) -> Option<Rc<CompiledQuery>> {
        if let Some(query) = self.embedded_removes.borrow().get(column) {
            return Some(Rc::clone(query));
        }
        let (path, property) = split_embedded_column(column)?;
        let mut text = format!("MATCH {}", self.owner_node());
        for (i, segment) in path.iter().enumerate() {
            text.push_str(&format!("-[:{}]->(e{i}:{EMBEDDED})", escape_identifier(segment)));
        }
        let leaf = path.len() - 1;
        text.push_str(&format!("\nREMOVE {}", cypher::property(&format!("e{leaf}"), &property)));
        for i in (0..path.len()).rev() {
            let scope: Vec<String> = std::iter::once(OWNER.to_string())
                .chain((0..=i).map(|j| format!("e{j}")))
                .collect();
            let parent = if i == 0 { OWNER.to_string() } else { format!("e{}", i - 1) };
            text.push_str(&format!(
                "\nWITH {}\n\
                 OPTIONAL MATCH ({parent})-[r{i}:{}]->(e{i})\n\
                 WHERE size(keys(e{i})) = 0 AND NOT (e{i})-->()\n\
                 DELETE r{i}, e{i}",
                scope.join(", "),
                escape_identifier(&path[i])
            ));
        }
        let query = Rc::new(CompiledQuery::new(
            text,
            Statement::RemoveEmbeddedProperty {
                owner: self.owner.clone(),
                path,
                property,
            },
        ));
        self.embedded_removes
            .borrow_mut()
            .insert(column.to_string(), Rc::clone(&query));
        Some(query)
    }

    /// Templates for the to-one `role` pointing at `target`.
    pub fn to_one(&self, role: &str, target: &EntityKeyMetadata) -> Rc<ToOneQueries> {
        if let Some(queries) = self.to_one.borrow().get(role) {
            return Rc::clone(queries);
        }
        let target = NodePattern::new(target.table(), target.column_names().to_vec());
        let owner_node = self.owner_node();
        let target_node =
            cypher::entity_node("target", &target.label, &target.key_columns, self.owner.arity());
        let rel = escape_identifier(role);

        let queries = Rc::new(ToOneQueries {
            replace: CompiledQuery::new(
                format!(
                    "MATCH {owner_node}, {target_node}\n\
                     OPTIONAL MATCH ({OWNER})-[r:{rel}]->(:{})\n\
                     DELETE r\n\
                     MERGE ({OWNER})-[:{rel}]->(target)",
                    cypher::ENTITY
                ),
                Statement::ReplaceToOne {
                    owner: self.owner.clone(),
                    role: role.to_string(),
                    target,
                },
            ),
            remove: CompiledQuery::new(
                format!("MATCH {owner_node}-[r:{rel}]->(:{})\nDELETE r", cypher::ENTITY),
                Statement::RemoveToOne {
                    owner: self.owner.clone(),
                    role: role.to_string(),
                },
            ),
            find_target: CompiledQuery::new(
                format!("MATCH {owner_node}-[:{rel}]->(target:{})\nRETURN target", cypher::ENTITY),
                Statement::FindAssociatedEntity {
                    owner: self.owner.clone(),
                    role: role.to_string(),
                },
            ),
        });
        self.to_one
            .borrow_mut()
            .insert(role.to_string(), Rc::clone(&queries));
        queries
    }
}

/// Sequence increment: name, initial value, increment.
pub fn next_sequence_value() -> CompiledQuery {
    CompiledQuery::new(
        format!(
            "MERGE (s:{SEQUENCE} {{{SEQUENCE_NAME}: {}}})\n\
             ON CREATE SET s.{SEQUENCE_VALUE} = {}\n\
             ON MATCH SET s.{SEQUENCE_VALUE} = s.{SEQUENCE_VALUE} + {}\n\
             RETURN s.{SEQUENCE_VALUE}",
            param(0),
            param(1),
            param(2)
        ),
        Statement::NextSequenceValue,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> EntityQueries {
        EntityQueries::new(&EntityKeyMetadata::new("Order", ["id"]), 16)
    }

    fn line() -> EntityQueries {
        EntityQueries::new(&EntityKeyMetadata::new("Line", ["order_id", "pos"]), 16)
    }

    #[test]
    fn test_static_templates() {
        let queries = order();
        insta::assert_snapshot!(queries.find_entity().text, @r"
        MATCH (owner:ENTITY:Order {id: {0}})
        OPTIONAL MATCH (owner)-[r*]->(e:EMBEDDED)
        RETURN owner, r, e
        ");
        insta::assert_snapshot!(
            queries.create_entity().text,
            @"CREATE (owner:ENTITY:Order {id: {0}}) RETURN owner"
        );
        insta::assert_snapshot!(queries.remove_entity().text, @r"
        MATCH (owner:ENTITY:Order {id: {0}})
        OPTIONAL MATCH (owner)-[*]->(e:EMBEDDED)
        DETACH DELETE owner, e
        ");
    }

    #[test]
    fn test_multi_get_single_column_uses_membership() {
        let queries = order();
        let three = queries.find_entities(3);
        let five = queries.find_entities(5);
        assert!(Rc::ptr_eq(&three, &five));
        insta::assert_snapshot!(
            three.text,
            @"MATCH (owner:ENTITY:Order) WHERE owner.id IN {0} RETURN owner"
        );
    }

    #[test]
    fn test_multi_get_composite_key() {
        let queries = line();
        let query = queries.find_entities(2);
        insta::assert_snapshot!(
            query.text,
            @"MATCH (owner:ENTITY:Line) WHERE (owner.order_id = {0} AND owner.pos = {1}) OR (owner.order_id = {2} AND owner.pos = {3}) RETURN owner"
        );
        assert!(Rc::ptr_eq(&query, &queries.find_entities(2)));
        assert!(!Rc::ptr_eq(&query, &queries.find_entities(3)));
    }

    #[test]
    fn test_property_updates() {
        let queries = order();
        let props = vec!["name".to_string(), "total".to_string()];
        insta::assert_snapshot!(
            queries.set_properties(&props).text,
            @"MATCH (owner:ENTITY:Order {id: {0}}) SET owner.name = {1}, owner.total = {2}"
        );
        insta::assert_snapshot!(
            queries.remove_properties(&props).text,
            @"MATCH (owner:ENTITY:Order {id: {0}}) REMOVE owner.name, owner.total"
        );
    }

    #[test]
    fn test_embedded_templates() {
        let queries = order();
        assert!(queries.update_embedded("name").is_none());

        let update = queries.update_embedded("address.geo.lat").unwrap();
        insta::assert_snapshot!(update.text, @r"
        MATCH (owner:ENTITY:Order {id: {0}})
        MERGE (owner)-[:address]->(e0:EMBEDDED)
        MERGE (e0)-[:geo]->(e1:EMBEDDED)
        SET e1.lat = {1}
        ");

        let remove = queries.remove_embedded("address.geo.lat").unwrap();
        insta::assert_snapshot!(remove.text, @r"
        MATCH (owner:ENTITY:Order {id: {0}})-[:address]->(e0:EMBEDDED)-[:geo]->(e1:EMBEDDED)
        REMOVE e1.lat
        WITH owner, e0, e1
        OPTIONAL MATCH (e0)-[r1:geo]->(e1)
        WHERE size(keys(e1)) = 0 AND NOT (e1)-->()
        DELETE r1, e1
        WITH owner, e0
        OPTIONAL MATCH (owner)-[r0:address]->(e0)
        WHERE size(keys(e0)) = 0 AND NOT (e0)-->()
        DELETE r0, e0
        ");
        assert!(Rc::ptr_eq(&remove, &queries.remove_embedded("address.geo.lat").unwrap()));
    }

    #[test]
    fn test_to_one_templates() {
        let queries = line();
        let to_one = queries.to_one("order", &EntityKeyMetadata::new("Order", ["id"]));
        insta::assert_snapshot!(to_one.replace.text, @r"
        MATCH (owner:ENTITY:Line {order_id: {0}, pos: {1}}), (target:ENTITY:Order {id: {2}})
        OPTIONAL MATCH (owner)-[r:order]->(:ENTITY)
        DELETE r
        MERGE (owner)-[:order]->(target)
        ");
        insta::assert_snapshot!(to_one.remove.text, @r"
        MATCH (owner:ENTITY:Line {order_id: {0}, pos: {1}})-[r:order]->(:ENTITY)
        DELETE r
        ");
    }

    #[test]
    fn test_sequence_template() {
        insta::assert_snapshot!(next_sequence_value().text, @r"
        MERGE (s:SEQUENCE {sequence_name: {0}})
        ON CREATE SET s.current_value = {1}
        ON MATCH SET s.current_value = s.current_value + {2}
        RETURN s.current_value
        ");
    }

    #[test]
    fn test_split_embedded_column() {
        assert_eq!(
            split_embedded_column("a.b.c"),
            Some((vec!["a".to_string(), "b".to_string()], "c".to_string()))
        );
        assert_eq!(split_embedded_column("plain"), None);
        assert_eq!(split_embedded_column("a..c"), None);
    }
}

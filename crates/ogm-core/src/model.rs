//! Mapping metadata and object state at the host-ORM boundary.
//!
//! The host ORM owns reflection and type conversion. What crosses into this
//! workspace is already column-shaped: [`EntityMapping`] and
//! [`CollectionMapping`] describe tables and columns, [`EntityState`] holds
//! dehydrated column values, [`CollectionEntry`] one collection element.
//! All mapping types deserialize from JSON so mappings can live in files.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

fn default_true() -> bool {
    true
}

fn to_strings(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// How a property is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// Plain column(s) on the entity record.
    Basic,
    /// Dot-path columns of a value-typed sub-object (`address.city`).
    Embedded,
    /// Reference to one entity of type `target`.
    ///
    /// `mapped_by` is set on the non-owning side of a one-to-one; such a
    /// property has no columns of its own.
    ToOne {
        target: String,
        #[serde(default)]
        mapped_by: Option<String>,
    },
    /// Collection property; its storage is described by the
    /// [`CollectionMapping`] with this role.
    Collection { role: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMapping {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(flatten)]
    pub kind: PropertyKind,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_true")]
    pub insertable: bool,
    #[serde(default = "default_true")]
    pub updatable: bool,
}

impl PropertyMapping {
    fn with_kind(name: &str, columns: &[&str], kind: PropertyKind) -> Self {
        PropertyMapping {
            name: name.to_string(),
            columns: to_strings(columns),
            kind,
            unique: false,
            insertable: true,
            updatable: true,
        }
    }

    pub fn basic(name: &str, columns: &[&str]) -> Self {
        Self::with_kind(name, columns, PropertyKind::Basic)
    }

    pub fn embedded(name: &str, columns: &[&str]) -> Self {
        Self::with_kind(name, columns, PropertyKind::Embedded)
    }

    pub fn to_one(name: &str, columns: &[&str], target: &str) -> Self {
        Self::with_kind(
            name,
            columns,
            PropertyKind::ToOne {
                target: target.to_string(),
                mapped_by: None,
            },
        )
    }

    /// Non-owning side of a one-to-one, mapped by `mapped_by` on `target`.
    pub fn one_to_one_inverse(name: &str, target: &str, mapped_by: &str) -> Self {
        Self::with_kind(
            name,
            &[],
            PropertyKind::ToOne {
                target: target.to_string(),
                mapped_by: Some(mapped_by.to_string()),
            },
        )
    }

    pub fn collection(name: &str, role: &str) -> Self {
        Self::with_kind(
            name,
            &[],
            PropertyKind::Collection {
                role: role.to_string(),
            },
        )
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn insertable(mut self, insertable: bool) -> Self {
        self.insertable = insertable;
        self
    }

    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    pub fn is_association(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::ToOne { .. } | PropertyKind::Collection { .. }
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, PropertyKind::Collection { .. })
    }

    /// Target entity of a to-one.
    pub fn to_one_target(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::ToOne { target, .. } => Some(target.as_str()),
            _ => None,
        }
    }

    pub fn collection_role(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Collection { role } => Some(role.as_str()),
            _ => None,
        }
    }

    /// Over-approximation of "may own the physical side of a bidirectional
    /// association": any to-one, or any unique property.
    pub fn might_be_main_side_of_bidirectional(&self) -> bool {
        matches!(self.kind, PropertyKind::ToOne { .. }) || self.unique
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimisticLockStyle {
    #[default]
    None,
    /// Compare the version property.
    Version,
    /// Compare every non-collection property.
    All,
}

/// How rows of one entity type are told apart from sibling types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Discriminator {
    /// Shared table; a column carries the type value.
    Column { column: String, value: Value },
    /// One table per concrete type; the table itself discriminates.
    TablePerClass,
    #[default]
    NotNeeded,
}

impl Discriminator {
    /// Column and value to write on insert, if any.
    pub fn column_value(&self) -> Option<(&str, &Value)> {
        match self {
            Discriminator::Column { column, value } => Some((column.as_str(), value)),
            Discriminator::TablePerClass | Discriminator::NotNeeded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub name: String,
    pub table: String,
    pub id_columns: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
    /// Name of the version property, when versioned.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub lock_style: OptimisticLockStyle,
    #[serde(default)]
    pub discriminator: Discriminator,
    /// Properties the host ORM loads lazily.
    #[serde(default)]
    pub lazy_properties: Vec<String>,
}

impl EntityMapping {
    pub fn new(name: &str, table: &str, id_columns: &[&str]) -> Self {
        EntityMapping {
            name: name.to_string(),
            table: table.to_string(),
            id_columns: to_strings(id_columns),
            properties: Vec::new(),
            version: None,
            lock_style: OptimisticLockStyle::None,
            discriminator: Discriminator::NotNeeded,
            lazy_properties: Vec::new(),
        }
    }

    pub fn property(mut self, property: PropertyMapping) -> Self {
        self.properties.push(property);
        self
    }

    /// Marks `property` (already added) as the version, locking on it.
    pub fn versioned(mut self, property: &str) -> Self {
        self.version = Some(property.to_string());
        self.lock_style = OptimisticLockStyle::Version;
        self
    }

    pub fn lock_style(mut self, style: OptimisticLockStyle) -> Self {
        self.lock_style = style;
        self
    }

    pub fn discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = discriminator;
        self
    }

    pub fn lazy(mut self, property: &str) -> Self {
        self.lazy_properties.push(property.to_string());
        self
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyMapping> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn version_property(&self) -> Option<&PropertyMapping> {
        self.version.as_deref().and_then(|v| self.find_property(v))
    }

    pub fn is_versioned(&self) -> bool {
        self.lock_style != OptimisticLockStyle::None
    }

    /// Every column the entity record may hold, ids first.
    pub fn all_columns(&self) -> Vec<String> {
        let mut columns = self.id_columns.clone();
        for property in &self.properties {
            for column in &property.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        if let Some((column, _)) = self.discriminator.column_value() {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
        columns
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// What a collection holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementKind {
    Entity { target: String },
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMapping {
    /// Fully qualified role, `Owner.property`.
    pub role: String,
    pub owner: String,
    pub table: String,
    /// Columns referencing the owner's identifier.
    pub key_columns: Vec<String>,
    pub element_columns: Vec<String>,
    #[serde(default)]
    pub index_columns: Vec<String>,
    /// Surrogate row id (id-bag style).
    #[serde(default)]
    pub identifier_column: Option<String>,
    pub element: ElementKind,
    #[serde(default)]
    pub one_to_many: bool,
    #[serde(default)]
    pub inverse: bool,
}

impl CollectionMapping {
    fn with_element(
        role: &str,
        owner: &str,
        table: &str,
        key_columns: &[&str],
        element_columns: &[&str],
        element: ElementKind,
    ) -> Self {
        CollectionMapping {
            role: role.to_string(),
            owner: owner.to_string(),
            table: table.to_string(),
            key_columns: to_strings(key_columns),
            element_columns: to_strings(element_columns),
            index_columns: Vec::new(),
            identifier_column: None,
            element,
            one_to_many: false,
            inverse: false,
        }
    }

    /// Entity collection stored in its own association table.
    pub fn many_to_many(
        role: &str,
        owner: &str,
        table: &str,
        key_columns: &[&str],
        element_columns: &[&str],
        target: &str,
    ) -> Self {
        Self::with_element(
            role,
            owner,
            table,
            key_columns,
            element_columns,
            ElementKind::Entity {
                target: target.to_string(),
            },
        )
    }

    /// Entity collection whose key columns live on the target's own table.
    /// `element_columns` are the target's identifier columns.
    pub fn one_to_many(
        role: &str,
        owner: &str,
        table: &str,
        key_columns: &[&str],
        element_columns: &[&str],
        target: &str,
    ) -> Self {
        let mut mapping =
            Self::many_to_many(role, owner, table, key_columns, element_columns, target);
        mapping.one_to_many = true;
        mapping
    }

    /// Collection of value-typed elements.
    pub fn elements(
        role: &str,
        owner: &str,
        table: &str,
        key_columns: &[&str],
        element_columns: &[&str],
    ) -> Self {
        Self::with_element(role, owner, table, key_columns, element_columns, ElementKind::Value)
    }

    pub fn indexed(mut self, index_columns: &[&str]) -> Self {
        self.index_columns = to_strings(index_columns);
        self
    }

    pub fn identifier(mut self, column: &str) -> Self {
        self.identifier_column = Some(column.to_string());
        self
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    /// Property part of the role: `Order.items` gives `items`.
    pub fn property_name(&self) -> &str {
        self.role.rsplit('.').next().unwrap_or(&self.role)
    }

    pub fn element_entity(&self) -> Option<&str> {
        match &self.element {
            ElementKind::Entity { target } => Some(target.as_str()),
            ElementKind::Value => None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        !self.index_columns.is_empty()
    }

    pub fn is_many_to_many(&self) -> bool {
        self.element_entity().is_some() && !self.one_to_many
    }
}

// ---------------------------------------------------------------------------
// Object state
// ---------------------------------------------------------------------------

/// Dehydrated state of one entity instance, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    columns: IndexMap<String, Value>,
}

impl EntityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: IndexMap<String, Value>) -> Self {
        EntityState { columns }
    }

    /// Builder-style setter.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.columns.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Values for `columns` in order; missing columns read as null.
    pub fn values(&self, columns: &[String]) -> Vec<Value> {
        columns
            .iter()
            .map(|c| self.columns.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn columns(&self) -> &IndexMap<String, Value> {
        &self.columns
    }
}

/// One element of a collection as the host ORM sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    pub identifier: Option<Value>,
    pub index: Vec<Value>,
    /// Element column values (target key for entity collections).
    pub element: Vec<Value>,
    /// Element value before the current change, when it changed.
    pub snapshot_element: Option<Vec<Value>>,
}

impl CollectionEntry {
    pub fn new(element: Vec<Value>) -> Self {
        CollectionEntry {
            identifier: None,
            index: Vec::new(),
            element,
            snapshot_element: None,
        }
    }

    pub fn with_index(mut self, index: Vec<Value>) -> Self {
        self.index = index;
        self
    }

    pub fn with_identifier(mut self, identifier: Value) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_snapshot_element(mut self, previous: Vec<Value>) -> Self {
        self.snapshot_element = Some(previous);
        self
    }

    /// Element used to locate the existing row: the snapshot when present.
    pub fn locating_element(&self) -> &[Value] {
        self.snapshot_element.as_deref().unwrap_or(&self.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_might_be_main_side_over_approximates() {
        let to_one = PropertyMapping::to_one("order", &["order_id"], "Order");
        let unique = PropertyMapping::basic("code", &["code"]).unique();
        let plain = PropertyMapping::basic("name", &["name"]);
        let collection = PropertyMapping::collection("items", "Order.items");
        assert!(to_one.might_be_main_side_of_bidirectional());
        assert!(unique.might_be_main_side_of_bidirectional());
        assert!(!plain.might_be_main_side_of_bidirectional());
        assert!(!collection.might_be_main_side_of_bidirectional());
    }

    #[test]
    fn test_collection_property_name_and_shape() {
        let items = CollectionMapping::many_to_many(
            "Order.items",
            "Order",
            "Order_Item",
            &["order_id"],
            &["items_id"],
            "Item",
        );
        assert_eq!(items.property_name(), "items");
        assert!(items.is_many_to_many());

        let lines = CollectionMapping::one_to_many(
            "Order.lines",
            "Order",
            "Line",
            &["order_id"],
            &["id"],
            "Line",
        )
        .inverse();
        assert!(!lines.is_many_to_many());
        assert!(lines.inverse);

        let notes = CollectionMapping::elements(
            "Order.notes",
            "Order",
            "Order_notes",
            &["order_id"],
            &["note"],
        );
        assert_eq!(notes.element_entity(), None);
    }

    #[test]
    fn test_all_columns_includes_discriminator() {
        let mapping = EntityMapping::new("Car", "Vehicle", &["id"])
            .property(PropertyMapping::basic("wheels", &["wheels"]))
            .discriminator(Discriminator::Column {
                column: "dtype".into(),
                value: Value::from("car"),
            });
        assert_eq!(mapping.all_columns(), vec!["id", "wheels", "dtype"]);
    }

    #[test]
    fn test_entity_mapping_from_json() {
        let json = r#"{
            "name": "Line",
            "table": "Line",
            "id_columns": ["id"],
            "properties": [
                {"name": "order", "columns": ["order_id"], "kind": "to_one", "target": "Order"},
                {"name": "qty", "columns": ["qty"], "kind": "basic"}
            ]
        }"#;
        let mapping: EntityMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.properties[0].to_one_target(), Some("Order"));
        assert!(mapping.properties[1].updatable);
        assert_eq!(mapping.lock_style, OptimisticLockStyle::None);
        assert_eq!(mapping.discriminator, Discriminator::NotNeeded);
    }

    #[test]
    fn test_entity_state_missing_columns_are_null() {
        let state = EntityState::new().with("id", 1).with("name", "x");
        let columns = vec!["id".to_string(), "other".to_string()];
        assert_eq!(state.values(&columns), vec![Value::Int(1), Value::Null]);
    }

    #[test]
    fn test_locating_element_prefers_snapshot() {
        let entry =
            CollectionEntry::new(vec![Value::Int(6)]).with_snapshot_element(vec![Value::Int(5)]);
        assert_eq!(entry.locating_element(), &[Value::Int(5)]);
    }
}

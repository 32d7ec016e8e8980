//! Key model: immutable identifiers for entity rows and association rows.
//!
//! Metadata descriptors ([`EntityKeyMetadata`], [`AssociationKeyMetadata`])
//! are built once per persister and shared behind `Arc`; keys pair a
//! descriptor with the column values of one instance.
//!
//! # Row-key shapes
//!
//! A row key identifies one relationship instance inside an association.
//! [`row_key_column_names`] decides its columns:
//! - surrogate identifier present: the identifier column alone;
//! - index columns present (ordered list, map): owner key columns + index columns;
//! - otherwise: owner key columns + element (target) columns.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::OgmError;
use crate::tuple::Tuple;
use crate::value::{display_values, Value};

/// Column values of a key. Most keys have one or two columns.
pub type KeyValues = SmallVec<[Value; 2]>;

fn to_strings<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Vec<String> {
    columns.into_iter().map(Into::into).collect()
}

// ---------------------------------------------------------------------------
// Entity keys
// ---------------------------------------------------------------------------

/// Table name plus ordered identifier column names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKeyMetadata {
    table: String,
    column_names: Vec<String>,
}

impl EntityKeyMetadata {
    pub fn new<S: Into<String>>(
        table: impl Into<String>,
        column_names: impl IntoIterator<Item = S>,
    ) -> Self {
        EntityKeyMetadata {
            table: table.into(),
            column_names: to_strings(column_names),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

/// Identifies one entity row: metadata plus parallel identifier values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    metadata: Arc<EntityKeyMetadata>,
    column_values: KeyValues,
}

impl EntityKey {
    /// Creates a key, checking that one value is given per key column.
    pub fn new(
        metadata: Arc<EntityKeyMetadata>,
        column_values: impl IntoIterator<Item = Value>,
    ) -> Result<Self, OgmError> {
        let column_values: KeyValues = column_values.into_iter().collect();
        if column_values.len() != metadata.column_names.len() {
            return Err(OgmError::mapping(format!(
                "entity key for '{}' expects {} values, got {}",
                metadata.table,
                metadata.column_names.len(),
                column_values.len()
            )));
        }
        Ok(EntityKey {
            metadata,
            column_values,
        })
    }

    pub fn metadata(&self) -> &Arc<EntityKeyMetadata> {
        &self.metadata
    }

    pub fn table(&self) -> &str {
        &self.metadata.table
    }

    pub fn column_names(&self) -> &[String] {
        &self.metadata.column_names
    }

    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.metadata
            .column_names
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }

    /// Iterates `(column, value)` pairs in key order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.metadata
            .column_names
            .iter()
            .map(String::as_str)
            .zip(self.column_values.iter())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.metadata.table, display_values(&self.column_values))
    }
}

// ---------------------------------------------------------------------------
// Association key metadata
// ---------------------------------------------------------------------------

/// What the far side of an association is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Link to another standalone entity.
    Association,
    /// Link to value-typed sub-objects with no identity of their own.
    EmbeddedCollection,
}

/// Target side of an association: which association columns hold the
/// target entity's key, and that entity's key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociatedEntityKeyMetadata {
    association_key_columns: Vec<String>,
    entity_key_metadata: Arc<EntityKeyMetadata>,
}

impl AssociatedEntityKeyMetadata {
    /// `association_key_columns[i]` holds the value of the target's i-th key column.
    pub fn new<S: Into<String>>(
        association_key_columns: impl IntoIterator<Item = S>,
        entity_key_metadata: Arc<EntityKeyMetadata>,
    ) -> Result<Self, OgmError> {
        let association_key_columns = to_strings(association_key_columns);
        if association_key_columns.len() != entity_key_metadata.column_names.len() {
            return Err(OgmError::mapping(format!(
                "association columns {:?} do not line up with key columns {:?} of '{}'",
                association_key_columns, entity_key_metadata.column_names, entity_key_metadata.table
            )));
        }
        Ok(AssociatedEntityKeyMetadata {
            association_key_columns,
            entity_key_metadata,
        })
    }

    pub fn association_key_columns(&self) -> &[String] {
        &self.association_key_columns
    }

    pub fn entity_key_metadata(&self) -> &Arc<EntityKeyMetadata> {
        &self.entity_key_metadata
    }

    pub fn is_association_key_column(&self, column: &str) -> bool {
        self.association_key_columns.iter().any(|c| c == column)
    }

    /// The target key column that `association_column` stores.
    pub fn corresponding_entity_key_column(&self, association_column: &str) -> Option<&str> {
        self.association_key_columns
            .iter()
            .position(|c| c == association_column)
            .map(|i| self.entity_key_metadata.column_names[i].as_str())
    }
}

/// Derives row-key column names from the collection's column layout.
///
/// Result is deduplicated and keeps first-seen order.
pub fn row_key_column_names(
    key_columns: &[String],
    index_columns: &[String],
    element_columns: &[String],
    identifier_column: Option<&str>,
) -> Vec<String> {
    if let Some(id) = identifier_column {
        return vec![id.to_string()];
    }
    let tail = if index_columns.is_empty() {
        element_columns
    } else {
        index_columns
    };
    let mut names: Vec<String> = Vec::with_capacity(key_columns.len() + tail.len());
    for column in key_columns.iter().chain(tail) {
        if !names.contains(column) {
            names.push(column.clone());
        }
    }
    names
}

/// Describes one association (collection role or inverse navigation) of an
/// owning table.
///
/// Identity is the table plus key columns; two descriptors for the same
/// physical relationship compare equal even if built by different persisters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationKeyMetadata {
    table: String,
    column_names: Vec<String>,
    row_key_column_names: Vec<String>,
    row_key_index_column_names: Vec<String>,
    identifier_column: Option<String>,
    associated_entity_key_metadata: Option<AssociatedEntityKeyMetadata>,
    inverse: bool,
    collection_role: Option<String>,
    kind: AssociationKind,
    one_to_one: bool,
}

impl AssociationKeyMetadata {
    pub fn builder(table: impl Into<String>) -> AssociationKeyMetadataBuilder {
        AssociationKeyMetadataBuilder::new(table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The FK-equivalent columns pointing at the owner.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn row_key_column_names(&self) -> &[String] {
        &self.row_key_column_names
    }

    pub fn row_key_index_column_names(&self) -> &[String] {
        &self.row_key_index_column_names
    }

    /// Surrogate row identifier, when the collection has one.
    pub fn identifier_column(&self) -> Option<&str> {
        self.identifier_column.as_deref()
    }

    pub fn associated_entity_key_metadata(&self) -> Option<&AssociatedEntityKeyMetadata> {
        self.associated_entity_key_metadata.as_ref()
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    pub fn collection_role(&self) -> Option<&str> {
        self.collection_role.as_deref()
    }

    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    pub fn is_one_to_one(&self) -> bool {
        self.one_to_one
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    pub fn is_index_column(&self, column: &str) -> bool {
        self.row_key_index_column_names.iter().any(|c| c == column)
    }

    /// Filters out the key columns, keeping order.
    pub fn columns_without_key_columns<'a>(
        &self,
        columns: impl IntoIterator<Item = &'a String>,
    ) -> Vec<String> {
        columns
            .into_iter()
            .filter(|c| !self.is_key_column(c))
            .cloned()
            .collect()
    }

    /// The one row-key column that is not a key column, if exactly one exists.
    pub fn single_row_key_column_not_contained_in_association_key(&self) -> Option<&str> {
        let mut outside = self
            .row_key_column_names
            .iter()
            .filter(|c| !self.is_key_column(c));
        match (outside.next(), outside.next()) {
            (Some(only), None) => Some(only.as_str()),
            _ => None,
        }
    }
}

impl PartialEq for AssociationKeyMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column_names == other.column_names
    }
}

impl Eq for AssociationKeyMetadata {}

impl Hash for AssociationKeyMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.column_names.hash(state);
    }
}

/// Builder for [`AssociationKeyMetadata`].
///
/// When no explicit row-key columns are given they are derived with
/// [`row_key_column_names`] from key, index, element (or associated entity)
/// and identifier columns.
#[derive(Debug, Clone)]
pub struct AssociationKeyMetadataBuilder {
    table: String,
    column_names: Vec<String>,
    row_key_column_names: Option<Vec<String>>,
    row_key_index_column_names: Vec<String>,
    element_column_names: Vec<String>,
    identifier_column: Option<String>,
    associated_entity_key_metadata: Option<AssociatedEntityKeyMetadata>,
    inverse: bool,
    collection_role: Option<String>,
    kind: AssociationKind,
    one_to_one: bool,
}

impl AssociationKeyMetadataBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        AssociationKeyMetadataBuilder {
            table: table.into(),
            column_names: Vec::new(),
            row_key_column_names: None,
            row_key_index_column_names: Vec::new(),
            element_column_names: Vec::new(),
            identifier_column: None,
            associated_entity_key_metadata: None,
            inverse: false,
            collection_role: None,
            kind: AssociationKind::Association,
            one_to_one: false,
        }
    }

    pub fn column_names<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.column_names = to_strings(columns);
        self
    }

    pub fn row_key_column_names<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.row_key_column_names = Some(to_strings(columns));
        self
    }

    pub fn row_key_index_column_names<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.row_key_index_column_names = to_strings(columns);
        self
    }

    /// Element columns; only used to derive the row key.
    pub fn element_column_names<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.element_column_names = to_strings(columns);
        self
    }

    pub fn identifier_column(mut self, column: impl Into<String>) -> Self {
        self.identifier_column = Some(column.into());
        self
    }

    pub fn associated_entity_key_metadata(mut self, metadata: AssociatedEntityKeyMetadata) -> Self {
        self.associated_entity_key_metadata = Some(metadata);
        self
    }

    pub fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    pub fn collection_role(mut self, role: impl Into<String>) -> Self {
        self.collection_role = Some(role.into());
        self
    }

    pub fn kind(mut self, kind: AssociationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn one_to_one(mut self, one_to_one: bool) -> Self {
        self.one_to_one = one_to_one;
        self
    }

    pub fn build(self) -> Result<AssociationKeyMetadata, OgmError> {
        if self.table.is_empty() {
            return Err(OgmError::mapping("association table name is empty"));
        }
        if self.column_names.is_empty() {
            return Err(OgmError::mapping(format!(
                "association on '{}' has no key columns",
                self.table
            )));
        }

        let row_key_column_names = match self.row_key_column_names {
            Some(explicit) => explicit,
            None => {
                let element_columns = if self.element_column_names.is_empty() {
                    self.associated_entity_key_metadata
                        .as_ref()
                        .map(|a| a.association_key_columns.clone())
                        .unwrap_or_default()
                } else {
                    self.element_column_names
                };
                row_key_column_names(
                    &self.column_names,
                    &self.row_key_index_column_names,
                    &element_columns,
                    self.identifier_column.as_deref(),
                )
            }
        };

        if row_key_column_names.is_empty() {
            return Err(OgmError::mapping(format!(
                "association on '{}' has no row key columns",
                self.table
            )));
        }
        if self.identifier_column.is_none() {
            if let Some(missing) = self
                .row_key_index_column_names
                .iter()
                .find(|c| !row_key_column_names.contains(c))
            {
                return Err(OgmError::mapping(format!(
                    "index column '{}' of '{}' is not part of the row key",
                    missing, self.table
                )));
            }
        }

        Ok(AssociationKeyMetadata {
            table: self.table,
            column_names: self.column_names,
            row_key_column_names,
            row_key_index_column_names: self.row_key_index_column_names,
            identifier_column: self.identifier_column,
            associated_entity_key_metadata: self.associated_entity_key_metadata,
            inverse: self.inverse,
            collection_role: self.collection_role,
            kind: self.kind,
            one_to_one: self.one_to_one,
        })
    }
}

// ---------------------------------------------------------------------------
// Association keys and row keys
// ---------------------------------------------------------------------------

/// Identifies one association instance: metadata plus the key column values,
/// together with the key of the entity owning this side.
///
/// Equality ignores the owner key; the key columns already pin the owner.
#[derive(Debug, Clone)]
pub struct AssociationKey {
    metadata: Arc<AssociationKeyMetadata>,
    column_values: KeyValues,
    entity_key: EntityKey,
}

impl AssociationKey {
    pub fn new(
        metadata: Arc<AssociationKeyMetadata>,
        column_values: impl IntoIterator<Item = Value>,
        entity_key: EntityKey,
    ) -> Result<Self, OgmError> {
        let column_values: KeyValues = column_values.into_iter().collect();
        if column_values.len() != metadata.column_names.len() {
            return Err(OgmError::mapping(format!(
                "association key for '{}' expects {} values, got {}",
                metadata.table,
                metadata.column_names.len(),
                column_values.len()
            )));
        }
        Ok(AssociationKey {
            metadata,
            column_values,
            entity_key,
        })
    }

    pub fn metadata(&self) -> &Arc<AssociationKeyMetadata> {
        &self.metadata
    }

    pub fn table(&self) -> &str {
        &self.metadata.table
    }

    pub fn column_names(&self) -> &[String] {
        &self.metadata.column_names
    }

    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.metadata
            .column_names
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }

    /// Key of the entity on whose side this association is navigated.
    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }
}

impl PartialEq for AssociationKey {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata && self.column_values == other.column_values
    }
}

impl Eq for AssociationKey {}

impl Hash for AssociationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.metadata.hash(state);
        self.column_values.hash(state);
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}){}",
            self.metadata.table,
            self.metadata.column_names.join(", "),
            display_values(&self.column_values)
        )
    }
}

/// Identifies one row (edge, collection entry) inside an association.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    column_names: Vec<String>,
    column_values: KeyValues,
}

impl RowKey {
    pub fn new<S: Into<String>>(
        column_names: impl IntoIterator<Item = S>,
        column_values: impl IntoIterator<Item = Value>,
    ) -> Result<Self, OgmError> {
        let column_names = to_strings(column_names);
        let column_values: KeyValues = column_values.into_iter().collect();
        if column_names.len() != column_values.len() {
            return Err(OgmError::mapping(format!(
                "row key columns {:?} do not match {} values",
                column_names,
                column_values.len()
            )));
        }
        Ok(RowKey {
            column_names,
            column_values,
        })
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.column_names
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }

    pub fn contains(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.column_values.iter())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .columns()
            .map(|(c, v)| format!("{}={}", c, v))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Collects values for a fixed set of row-key columns.
///
/// Values for columns outside the row key are ignored; columns that never
/// receive a value become [`Value::Null`].
#[derive(Debug, Clone)]
pub struct RowKeyBuilder {
    column_names: Vec<String>,
    values: IndexMap<String, Value>,
}

impl RowKeyBuilder {
    pub fn new(column_names: &[String]) -> Self {
        RowKeyBuilder {
            column_names: column_names.to_vec(),
            values: IndexMap::new(),
        }
    }

    pub fn value(mut self, column: &str, value: Value) -> Self {
        if self.column_names.iter().any(|c| c == column) {
            self.values.insert(column.to_string(), value);
        }
        self
    }

    /// Takes `columns[i] = values[i]` pairwise.
    pub fn values(mut self, columns: &[String], values: &[Value]) -> Self {
        for (column, value) in columns.iter().zip(values) {
            self = self.value(column, value.clone());
        }
        self
    }

    /// Reads every row-key column present in `tuple`.
    pub fn values_from_tuple(mut self, tuple: &Tuple) -> Self {
        for column in self.column_names.clone() {
            if let Some(value) = tuple.get(&column) {
                self.values.insert(column, value);
            }
        }
        self
    }

    pub fn build(mut self) -> RowKey {
        let column_values: KeyValues = self
            .column_names
            .iter()
            .map(|c| self.values.swap_remove(c).unwrap_or(Value::Null))
            .collect();
        RowKey {
            column_names: self.column_names,
            column_values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    fn item_metadata() -> Arc<EntityKeyMetadata> {
        Arc::new(EntityKeyMetadata::new("Item", ["id"]))
    }

    #[test]
    fn test_entity_key_structural_equality() {
        let a = EntityKey::new(item_metadata(), [Value::Int(5)]).unwrap();
        let b = EntityKey::new(item_metadata(), [Value::Int(5)]).unwrap();
        let c = EntityKey::new(item_metadata(), [Value::Int(6)]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "Item[5]");
        assert_eq!(a.column_value("id"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_entity_key_rejects_wrong_arity() {
        let err = EntityKey::new(item_metadata(), [Value::Int(1), Value::Int(2)]).unwrap_err();
        assert!(matches!(err, OgmError::Mapping { .. }));
    }

    #[test]
    fn test_row_key_shape_with_index_uses_owner_and_index() {
        let names = row_key_column_names(
            &strings(&["order_id"]),
            &strings(&["position"]),
            &strings(&["items_id"]),
            None,
        );
        assert_eq!(names, strings(&["order_id", "position"]));
    }

    #[test]
    fn test_row_key_shape_without_index_uses_owner_and_element() {
        let names = row_key_column_names(
            &strings(&["order_id"]),
            &[],
            &strings(&["items_id"]),
            None,
        );
        assert_eq!(names, strings(&["order_id", "items_id"]));
    }

    #[test]
    fn test_row_key_shape_with_surrogate_identifier() {
        let names = row_key_column_names(
            &strings(&["order_id"]),
            &strings(&["position"]),
            &strings(&["items_id"]),
            Some("row_id"),
        );
        assert_eq!(names, strings(&["row_id"]));
    }

    #[test]
    fn test_builder_derives_row_key_from_associated_entity() {
        let associated = AssociatedEntityKeyMetadata::new(["items_id"], item_metadata()).unwrap();
        let metadata = AssociationKeyMetadata::builder("Order_Item")
            .column_names(["order_id"])
            .associated_entity_key_metadata(associated)
            .collection_role("items")
            .build()
            .unwrap();
        assert_eq!(metadata.row_key_column_names(), strings(&["order_id", "items_id"]));
        assert_eq!(
            metadata.single_row_key_column_not_contained_in_association_key(),
            Some("items_id")
        );
        assert_eq!(
            metadata
                .associated_entity_key_metadata()
                .unwrap()
                .corresponding_entity_key_column("items_id"),
            Some("id")
        );
    }

    #[test]
    fn test_builder_derives_row_key_from_index() {
        let metadata = AssociationKeyMetadata::builder("Order_notes")
            .column_names(["order_id"])
            .row_key_index_column_names(["position"])
            .element_column_names(["note"])
            .kind(AssociationKind::EmbeddedCollection)
            .build()
            .unwrap();
        assert_eq!(metadata.row_key_column_names(), strings(&["order_id", "position"]));
        assert!(metadata.is_index_column("position"));
        assert_eq!(
            metadata.columns_without_key_columns(&strings(&["order_id", "position", "note"])),
            strings(&["position", "note"])
        );
    }

    #[test]
    fn test_builder_rejects_index_outside_row_key() {
        let err = AssociationKeyMetadata::builder("Order_notes")
            .column_names(["order_id"])
            .row_key_column_names(["order_id", "note"])
            .row_key_index_column_names(["position"])
            .build()
            .unwrap_err();
        assert!(matches!(err, OgmError::Mapping { .. }));
    }

    #[test]
    fn test_association_metadata_identity_is_table_and_key_columns() {
        let a = AssociationKeyMetadata::builder("Order_Item")
            .column_names(["order_id"])
            .row_key_column_names(["order_id", "items_id"])
            .build()
            .unwrap();
        let b = AssociationKeyMetadata::builder("Order_Item")
            .column_names(["order_id"])
            .row_key_column_names(["order_id", "position"])
            .inverse(true)
            .build()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_association_metadata_json() {
        let metadata = AssociationKeyMetadata::builder("Order_Item")
            .column_names(["order_id"])
            .associated_entity_key_metadata(
                AssociatedEntityKeyMetadata::new(["items_id"], item_metadata()).unwrap(),
            )
            .collection_role("Order.items")
            .build()
            .unwrap();
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["kind"], "association");
        let back: AssociationKeyMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, metadata);
        assert_eq!(back.row_key_column_names(), metadata.row_key_column_names());
        assert_eq!(back.collection_role(), Some("Order.items"));
        assert_eq!(
            back.associated_entity_key_metadata().map(|a| a.entity_key_metadata().table()),
            Some("Item")
        );
    }

    #[test]
    fn test_row_key_builder_fills_missing_with_null() {
        let names = strings(&["order_id", "items_id"]);
        let row_key = RowKeyBuilder::new(&names)
            .value("order_id", Value::Int(1))
            .value("unrelated", Value::Int(9))
            .build();
        assert_eq!(row_key.column_values(), &[Value::Int(1), Value::Null]);
        assert!(!row_key.contains("unrelated"));
    }

    #[test]
    fn test_row_key_builder_reads_tuple() {
        let mut tuple = Tuple::new();
        tuple.put("order_id", Value::Int(1));
        tuple.put("items_id", Value::Int(5));
        tuple.put("extra", Value::Int(0));
        let row_key = RowKeyBuilder::new(&strings(&["order_id", "items_id"]))
            .values_from_tuple(&tuple)
            .build();
        assert_eq!(
            row_key,
            RowKey::new(["order_id", "items_id"], [Value::Int(1), Value::Int(5)]).unwrap()
        );
        assert_eq!(row_key.to_string(), "{order_id=1, items_id=5}");
    }
}

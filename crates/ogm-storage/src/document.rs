//! SQLite-backed document store implementing [`GridDialect`].
//!
//! Each entity is one JSON document keyed by table and key values.
//! Associations are stored either inside the owning entity's document
//! ([`AssociationStorage::InEntity`]) or as separate association documents
//! ([`AssociationStorage::AssociationDocument`]).
//!
//! Duplicate inserts are detected natively through the primary-key
//! constraint. Native queries are SQL over the `entities` table and must
//! select a `doc` column.

use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as Json};
use tracing::{debug, trace};

use ogm_core::association::{apply_association_operations, RowValues};
use ogm_core::key::{AssociationKey, AssociationKeyMetadata, EntityKey, RowKey, RowKeyBuilder};
use ogm_core::tuple::coalesce_operations;
use ogm_core::{
    Association, MapAssociationSnapshot, MapTupleSnapshot, OgmError, SnapshotType, Tuple,
    TupleOperation, Value,
};

use crate::dialect::{
    AssociationContext, BackendQuery, DuplicateInsertPreventionStrategy, GridDialect,
    NextValueRequest, TupleContext, TupleStream,
};
use crate::error::StorageError;
use crate::schema;

/// Reserved document field holding embedded associations.
pub const ASSOCIATIONS_FIELD: &str = "_associations";

/// Where association rows are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationStorage {
    /// Inside the owning entity's document.
    InEntity,
    /// One document per association key.
    #[default]
    AssociationDocument,
}

// ---------------------------------------------------------------------------
// Value <-> JSON
// ---------------------------------------------------------------------------

/// Encodes a column value for a document.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => json!(i),
        Value::Float(x) if x.is_finite() => json!(x),
        // JSON numbers cannot hold NaN or infinities.
        Value::Float(x) => json!({ "$float": x.to_string() }),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(b) => json!({ "$bytes": b }),
    }
}

/// Decodes a document field into a column value.
pub fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Object(map) if map.len() == 1 && map.contains_key("$bytes") => {
            let bytes = map["$bytes"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|b| b.as_u64().map(|b| b as u8))
                        .collect()
                })
                .unwrap_or_default();
            Value::Bytes(bytes)
        }
        Json::Object(map) if map.len() == 1 && map.contains_key("$float") => {
            match map["$float"].as_str() {
                Some("inf") => Value::Float(f64::INFINITY),
                Some("-inf") => Value::Float(f64::NEG_INFINITY),
                Some("NaN") => Value::Float(f64::NAN),
                _ => Value::Text(Json::Object(map.clone()).to_string()),
            }
        }
        other => Value::Text(other.to_string()),
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Int(i) => Sql::Integer(*i),
        Value::Float(x) => Sql::Real(*x),
        Value::Text(s) => Sql::Text(s.clone()),
        Value::Bytes(b) => Sql::Blob(b.clone()),
    }
}

fn entity_key_text(key: &EntityKey) -> String {
    let values: Vec<Json> = key.column_values().iter().map(value_to_json).collect();
    Json::Array(values).to_string()
}

fn association_key_text(key: &AssociationKey) -> String {
    let values: Vec<Json> = key.column_values().iter().map(value_to_json).collect();
    json!({ "columns": key.column_names(), "values": values }).to_string()
}

/// Field name of an embedded association: its identity, table plus columns.
fn association_field(metadata: &AssociationKeyMetadata) -> String {
    format!("{}({})", metadata.table(), metadata.column_names().join(","))
}

fn document_columns(doc: &JsonMap<String, Json>) -> IndexMap<String, Value> {
    doc.iter()
        .filter(|(field, _)| field.as_str() != ASSOCIATIONS_FIELD)
        .map(|(field, value)| (field.clone(), json_to_value(value)))
        .collect()
}

fn rows_to_json(rows: &IndexMap<RowKey, RowValues>) -> Json {
    let encoded: Vec<Json> = rows
        .values()
        .map(|row| {
            let object: JsonMap<String, Json> = row
                .iter()
                .map(|(column, value)| (column.clone(), value_to_json(value)))
                .collect();
            Json::Object(object)
        })
        .collect();
    Json::Array(encoded)
}

fn rows_from_json(
    metadata: &AssociationKeyMetadata,
    json: &Json,
) -> Result<IndexMap<RowKey, RowValues>, StorageError> {
    let items = json.as_array().ok_or_else(|| StorageError::CorruptDocument {
        table: metadata.table().to_string(),
        reason: "association rows are not an array".into(),
    })?;
    let mut rows = IndexMap::new();
    for item in items {
        let object = item.as_object().ok_or_else(|| StorageError::CorruptDocument {
            table: metadata.table().to_string(),
            reason: "association row is not an object".into(),
        })?;
        let values: RowValues = object
            .iter()
            .map(|(column, value)| (column.clone(), json_to_value(value)))
            .collect();
        let row_key = values
            .iter()
            .fold(RowKeyBuilder::new(metadata.row_key_column_names()), |builder, (c, v)| {
                builder.value(c, v.clone())
            })
            .build();
        rows.insert(row_key, values);
    }
    Ok(rows)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ---------------------------------------------------------------------------
// DocumentDialect
// ---------------------------------------------------------------------------

/// Document backend over a SQLite database.
pub struct DocumentDialect {
    conn: Connection,
    association_storage: AssociationStorage,
}

impl DocumentDialect {
    /// Opens (or creates) a file-based document store at `path`.
    pub fn new(path: &str, association_storage: AssociationStorage) -> Result<Self, StorageError> {
        let conn = schema::open_database(path)?;
        Ok(DocumentDialect {
            conn,
            association_storage,
        })
    }

    /// Creates an in-memory document store (useful for tests).
    pub fn in_memory(association_storage: AssociationStorage) -> Result<Self, StorageError> {
        let conn = schema::open_in_memory()?;
        Ok(DocumentDialect {
            conn,
            association_storage,
        })
    }

    pub fn association_storage(&self) -> AssociationStorage {
        self.association_storage
    }

    fn load_document(
        &self,
        key: &EntityKey,
    ) -> Result<Option<JsonMap<String, Json>>, StorageError> {
        let text: Option<String> = self
            .conn
            .query_row(
                "SELECT doc FROM entities WHERE table_name = ?1 AND entity_key = ?2",
                params![key.table(), entity_key_text(key)],
                |row| row.get(0),
            )
            .optional()?;
        match text {
            None => Ok(None),
            Some(text) => match serde_json::from_str::<Json>(&text)? {
                Json::Object(doc) => Ok(Some(doc)),
                _ => Err(StorageError::CorruptDocument {
                    table: key.table().to_string(),
                    reason: "entity document is not an object".into(),
                }),
            },
        }
    }

    fn insert_document(
        &self,
        key: &EntityKey,
        doc: &JsonMap<String, Json>,
    ) -> Result<(), OgmError> {
        let text = serde_json::to_string(doc).map_err(StorageError::from)?;
        let result = self.conn.execute(
            "INSERT INTO entities (table_name, entity_key, doc) VALUES (?1, ?2, ?3)",
            params![key.table(), entity_key_text(key), text],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(OgmError::DuplicateKey {
                table: key.table().to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::from(e).into()),
        }
    }

    fn upsert_document(
        &self,
        key: &EntityKey,
        doc: &JsonMap<String, Json>,
    ) -> Result<(), StorageError> {
        let text = serde_json::to_string(doc)?;
        self.conn.execute(
            "INSERT INTO entities (table_name, entity_key, doc) VALUES (?1, ?2, ?3)
             ON CONFLICT (table_name, entity_key) DO UPDATE SET doc = excluded.doc",
            params![key.table(), entity_key_text(key), text],
        )?;
        Ok(())
    }

    fn load_rows(
        &self,
        key: &AssociationKey,
    ) -> Result<Option<IndexMap<RowKey, RowValues>>, StorageError> {
        match self.association_storage {
            AssociationStorage::InEntity => {
                let doc = match self.load_document(key.entity_key())? {
                    Some(doc) => doc,
                    None => return Ok(None),
                };
                let field = association_field(key.metadata());
                match doc.get(ASSOCIATIONS_FIELD).and_then(|a| a.get(&field)) {
                    Some(rows) => Ok(Some(rows_from_json(key.metadata(), rows)?)),
                    None => Ok(None),
                }
            }
            AssociationStorage::AssociationDocument => {
                let text: Option<String> = self
                    .conn
                    .query_row(
                        "SELECT rows FROM associations
                         WHERE table_name = ?1 AND association_key = ?2",
                        params![key.table(), association_key_text(key)],
                        |row| row.get(0),
                    )
                    .optional()?;
                match text {
                    Some(text) => {
                        let json: Json = serde_json::from_str(&text)?;
                        Ok(Some(rows_from_json(key.metadata(), &json)?))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    fn store_rows(
        &self,
        key: &AssociationKey,
        rows: &IndexMap<RowKey, RowValues>,
    ) -> Result<(), OgmError> {
        match self.association_storage {
            AssociationStorage::InEntity => {
                let owner = key.entity_key();
                let mut doc = self
                    .load_document(owner)?
                    .ok_or_else(|| OgmError::EntityTupleNotFound {
                        table: owner.table().to_string(),
                        key: owner.to_string(),
                    })?;
                let field = association_field(key.metadata());
                let embedded = doc
                    .entry(ASSOCIATIONS_FIELD.to_string())
                    .or_insert_with(|| Json::Object(JsonMap::new()));
                if let Json::Object(embedded) = embedded {
                    if rows.is_empty() {
                        embedded.remove(&field);
                    } else {
                        embedded.insert(field, rows_to_json(rows));
                    }
                }
                self.upsert_document(owner, &doc)?;
            }
            AssociationStorage::AssociationDocument => {
                if rows.is_empty() {
                    self.delete_association_document(key)?;
                } else {
                    let text = rows_to_json(rows).to_string();
                    self.conn
                        .execute(
                            "INSERT INTO associations (table_name, association_key, rows)
                             VALUES (?1, ?2, ?3)
                             ON CONFLICT (table_name, association_key)
                             DO UPDATE SET rows = excluded.rows",
                            params![key.table(), association_key_text(key), text],
                        )
                        .map_err(StorageError::from)?;
                }
            }
        }
        Ok(())
    }

    fn delete_association_document(&self, key: &AssociationKey) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM associations WHERE table_name = ?1 AND association_key = ?2",
            params![key.table(), association_key_text(key)],
        )?;
        Ok(())
    }

    fn bind_parameters(query: &BackendQuery) -> Vec<(String, rusqlite::types::Value)> {
        query
            .parameters
            .iter()
            .map(|(name, value)| (format!(":{}", name), to_sql_value(value)))
            .collect()
    }
}

impl GridDialect for DocumentDialect {
    fn get_tuple(
        &self,
        key: &EntityKey,
        _context: &TupleContext,
    ) -> Result<Option<Tuple>, OgmError> {
        let doc = self.load_document(key)?;
        Ok(doc.map(|doc| Tuple::from_values(document_columns(&doc), SnapshotType::Update)))
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
        _context: &TupleContext,
    ) -> Result<(), OgmError> {
        let inserting = tuple.snapshot_type() == SnapshotType::Insert;
        let mut doc = if inserting {
            JsonMap::new()
        } else {
            self.load_document(key)?.unwrap_or_default()
        };

        for operation in coalesce_operations(tuple.operations()) {
            match operation {
                TupleOperation::Put { column, value } => {
                    doc.insert(column, value_to_json(&value));
                }
                TupleOperation::PutNull { column } => {
                    doc.insert(column, Json::Null);
                }
                TupleOperation::Remove { column } => {
                    doc.remove(&column);
                }
            }
        }
        for (column, value) in key.columns() {
            doc.entry(column.to_string())
                .or_insert_with(|| value_to_json(value));
        }

        if inserting {
            self.insert_document(key, &doc)?;
            debug!(key = %key, "document: inserted");
        } else {
            self.upsert_document(key, &doc)?;
            trace!(key = %key, "document: updated");
        }
        tuple.rebase(Box::new(MapTupleSnapshot::new(document_columns(&doc))));
        Ok(())
    }

    fn remove_tuple(&mut self, key: &EntityKey, _context: &TupleContext) -> Result<(), OgmError> {
        self.conn
            .execute(
                "DELETE FROM entities WHERE table_name = ?1 AND entity_key = ?2",
                params![key.table(), entity_key_text(key)],
            )
            .map_err(StorageError::from)?;
        debug!(key = %key, "document: removed");
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<Option<Association>, OgmError> {
        Ok(self.load_rows(key)?.map(Association::from_rows))
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
        _context: &AssociationContext,
    ) -> Result<(), OgmError> {
        let mut rows = self.load_rows(key)?.unwrap_or_default();
        apply_association_operations(&mut rows, association.operations());
        self.store_rows(key, &rows)?;
        trace!(key = %key, rows = rows.len(), "document: association written");
        association.rebase(Box::new(MapAssociationSnapshot::new(rows)));
        Ok(())
    }

    fn remove_association(
        &mut self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<(), OgmError> {
        match self.association_storage {
            AssociationStorage::InEntity => {
                if self.load_document(key.entity_key())?.is_some() {
                    self.store_rows(key, &IndexMap::new())?;
                }
            }
            AssociationStorage::AssociationDocument => self.delete_association_document(key)?,
        }
        Ok(())
    }

    fn is_stored_in_entity_structure(&self, _metadata: &AssociationKeyMetadata) -> bool {
        self.association_storage == AssociationStorage::InEntity
    }

    fn next_value(&mut self, request: &NextValueRequest) -> Result<i64, OgmError> {
        let value: i64 = self
            .conn
            .query_row(
                "INSERT INTO sequences (name, next_value) VALUES (?1, ?2 + ?3)
                 ON CONFLICT (name) DO UPDATE SET next_value = sequences.next_value + ?3
                 RETURNING next_value - ?3",
                params![request.key.name(), request.initial_value, request.increment],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        Ok(value)
    }

    fn execute_backend_query(&self, query: &BackendQuery) -> Result<TupleStream, OgmError> {
        let bound = Self::bind_parameters(query);
        let params: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();

        let mut stmt = self.conn.prepare(&query.query).map_err(StorageError::from)?;
        let texts = stmt
            .query_map(params.as_slice(), |row| row.get::<_, String>("doc"))
            .map_err(StorageError::from)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(StorageError::from)?;

        let mut tuples = Vec::with_capacity(texts.len());
        for text in texts {
            match serde_json::from_str::<Json>(&text).map_err(StorageError::from)? {
                Json::Object(doc) => {
                    tuples.push(Tuple::from_values(document_columns(&doc), SnapshotType::Update))
                }
                _ => {
                    return Err(StorageError::CorruptDocument {
                        table: "entities".into(),
                        reason: "query returned a non-object document".into(),
                    }
                    .into())
                }
            }
        }
        debug!(query = %query.query, results = tuples.len(), "document: native query");
        Ok(Box::new(tuples.into_iter()))
    }

    fn execute_backend_update_query(&mut self, query: &BackendQuery) -> Result<u64, OgmError> {
        let bound = Self::bind_parameters(query);
        let params: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        let affected = self
            .conn
            .execute(&query.query, params.as_slice())
            .map_err(StorageError::from)?;
        Ok(affected as u64)
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        _metadata: &ogm_core::EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        DuplicateInsertPreventionStrategy::Native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ogm_core::key::{AssociatedEntityKeyMetadata, EntityKeyMetadata};

    use crate::dialect::IdSourceKey;

    fn documents() -> DocumentDialect {
        DocumentDialect::in_memory(AssociationStorage::AssociationDocument).unwrap()
    }

    fn order_key(id: i64) -> EntityKey {
        EntityKey::new(Arc::new(EntityKeyMetadata::new("Order", ["id"])), [Value::Int(id)]).unwrap()
    }

    fn items_key(order: i64) -> AssociationKey {
        let item = Arc::new(EntityKeyMetadata::new("Item", ["id"]));
        let metadata = AssociationKeyMetadata::builder("Order_Item")
            .column_names(["order_id"])
            .associated_entity_key_metadata(
                AssociatedEntityKeyMetadata::new(["items_id"], item).unwrap(),
            )
            .build()
            .unwrap();
        AssociationKey::new(Arc::new(metadata), [Value::Int(order)], order_key(order)).unwrap()
    }

    fn insert_order(dialect: &mut DocumentDialect, id: i64) {
        let context = TupleContext::default();
        let mut tuple = dialect.create_tuple(&order_key(id), &context).unwrap();
        tuple.put("name", Value::from(format!("order-{}", id)));
        dialect.insert_or_update_tuple(&order_key(id), &mut tuple, &context).unwrap();
    }

    fn add_item(dialect: &mut DocumentDialect, order: i64, item: i64) {
        let context = AssociationContext::new("items");
        let key = items_key(order);
        let mut association = match dialect.get_association(&key, &context).unwrap() {
            Some(a) => a,
            None => dialect.create_association(&key, &context).unwrap(),
        };
        let mut row = Tuple::new();
        row.put("order_id", Value::Int(order));
        row.put("items_id", Value::Int(item));
        let row_key = RowKeyBuilder::new(key.metadata().row_key_column_names())
            .values_from_tuple(&row)
            .build();
        association.put(row_key, row);
        dialect.insert_or_update_association(&key, &mut association, &context).unwrap();
    }

    #[test]
    fn test_json_value_conversion() {
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Int(-4),
            Value::Float(2.5),
            Value::from("x"),
            Value::Bytes(vec![1, 2, 255]),
        ] {
            assert_eq!(json_to_value(&value_to_json(&value)), value);
        }
    }

    #[test]
    fn test_non_finite_floats_survive_documents() {
        let mut dialect = documents();
        insert_order(&mut dialect, 1);
        let context = TupleContext::default();
        let mut tuple = dialect.get_tuple(&order_key(1), &context).unwrap().unwrap();
        tuple.put("nan", Value::Float(f64::NAN));
        tuple.put("up", Value::Float(f64::INFINITY));
        tuple.put("down", Value::Float(f64::NEG_INFINITY));
        dialect.insert_or_update_tuple(&order_key(1), &mut tuple, &context).unwrap();

        let stored = dialect.get_tuple(&order_key(1), &context).unwrap().unwrap();
        assert!(matches!(stored.get("nan"), Some(Value::Float(x)) if x.is_nan()));
        assert_eq!(stored.get("up"), Some(Value::Float(f64::INFINITY)));
        assert_eq!(stored.get("down"), Some(Value::Float(f64::NEG_INFINITY)));
    }

    #[test]
    fn test_duplicate_insert_detected_natively() {
        let mut dialect = documents();
        insert_order(&mut dialect, 1);
        let context = TupleContext::default();
        let mut again = dialect.create_tuple(&order_key(1), &context).unwrap();
        let err = dialect
            .insert_or_update_tuple(&order_key(1), &mut again, &context)
            .unwrap_err();
        assert!(matches!(err, OgmError::DuplicateKey { .. }));
    }

    #[test]
    fn test_update_and_remove_column() {
        let mut dialect = documents();
        insert_order(&mut dialect, 1);
        let context = TupleContext::default();
        let mut tuple = dialect.get_tuple(&order_key(1), &context).unwrap().unwrap();
        assert_eq!(tuple.get("name"), Some(Value::from("order-1")));
        tuple.remove("name");
        tuple.put("total", Value::Int(30));
        dialect.insert_or_update_tuple(&order_key(1), &mut tuple, &context).unwrap();

        let stored = dialect.get_tuple(&order_key(1), &context).unwrap().unwrap();
        assert_eq!(stored.get("name"), None);
        assert_eq!(stored.get("total"), Some(Value::Int(30)));
        assert_eq!(stored.get("id"), Some(Value::Int(1)));
    }

    #[test]
    fn test_association_in_entity_document() {
        let mut dialect = DocumentDialect::in_memory(AssociationStorage::InEntity).unwrap();
        insert_order(&mut dialect, 1);
        add_item(&mut dialect, 1, 5);
        add_item(&mut dialect, 1, 6);

        let context = AssociationContext::new("items");
        assert!(dialect.is_stored_in_entity_structure(items_key(1).metadata()));
        let association = dialect.get_association(&items_key(1), &context).unwrap().unwrap();
        assert_eq!(association.size(), 2);

        // Entity columns are unaffected by the embedded association.
        let tuple = dialect.get_tuple(&order_key(1), &TupleContext::default()).unwrap().unwrap();
        assert!(tuple.get(ASSOCIATIONS_FIELD).is_none());
        assert_eq!(tuple.get("name"), Some(Value::from("order-1")));

        dialect.remove_association(&items_key(1), &context).unwrap();
        assert!(dialect.get_association(&items_key(1), &context).unwrap().is_none());
    }

    #[test]
    fn test_association_in_entity_requires_owner() {
        let mut dialect = DocumentDialect::in_memory(AssociationStorage::InEntity).unwrap();
        let context = AssociationContext::new("items");
        let key = items_key(9);
        let mut association = dialect.create_association(&key, &context).unwrap();
        association.clear();
        let err = dialect
            .insert_or_update_association(&key, &mut association, &context)
            .unwrap_err();
        assert!(matches!(err, OgmError::EntityTupleNotFound { .. }));
    }

    #[test]
    fn test_association_document_clear() {
        let mut dialect = documents();
        add_item(&mut dialect, 1, 5);
        let context = AssociationContext::new("items");
        let mut association = dialect.get_association(&items_key(1), &context).unwrap().unwrap();
        association.clear();
        dialect
            .insert_or_update_association(&items_key(1), &mut association, &context)
            .unwrap();
        assert!(dialect.get_association(&items_key(1), &context).unwrap().is_none());
    }

    #[test]
    fn test_native_query_and_update() {
        let mut dialect = documents();
        insert_order(&mut dialect, 1);
        insert_order(&mut dialect, 2);

        let query = BackendQuery::new(
            "SELECT doc FROM entities
             WHERE table_name = :table AND json_extract(doc, '$.name') = :name",
        )
        .param("table", "Order")
        .param("name", "order-2");
        let results: Vec<Tuple> = dialect.execute_backend_query(&query).unwrap().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("id"), Some(Value::Int(2)));

        let update = BackendQuery::new("DELETE FROM entities WHERE table_name = :table")
            .param("table", "Order");
        assert_eq!(dialect.execute_backend_update_query(&update).unwrap(), 2);
    }

    #[test]
    fn test_sequences() {
        let mut dialect = documents();
        let request = NextValueRequest::new(IdSourceKey::sequence("order_seq"))
            .initial_value(100)
            .increment(10);
        assert_eq!(dialect.next_value(&request).unwrap(), 100);
        assert_eq!(dialect.next_value(&request).unwrap(), 110);
        assert_eq!(dialect.next_value(&request).unwrap(), 120);
    }
}

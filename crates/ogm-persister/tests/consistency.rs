//! Both navigation directions stay consistent on every backend.

use std::sync::Arc;

use proptest::prelude::*;

use ogm_core::key::{AssociationKey, EntityKey, EntityKeyMetadata};
use ogm_core::{
    CollectionEntry, CollectionMapping, EntityMapping, EntityState, OgmError, PropertyMapping,
    Value,
};
use ogm_graph::GraphDialect;
use ogm_persister::{AssociationPersister, Metamodel, Session};
use ogm_storage::{AssociationStorage, DocumentDialect, GridDialect, MapDialect, TupleContext};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn backends() -> Vec<(&'static str, Box<dyn GridDialect>)> {
    vec![
        ("map", Box::new(MapDialect::new())),
        ("graph", Box::new(GraphDialect::in_memory())),
        (
            "document",
            Box::new(DocumentDialect::in_memory(AssociationStorage::AssociationDocument).unwrap()),
        ),
        (
            "document/in-entity",
            Box::new(DocumentDialect::in_memory(AssociationStorage::InEntity).unwrap()),
        ),
    ]
}

/// Rows the store holds for the association of `role` owned by `owner`.
fn stored_rows(session: &Session<'_>, role: &str, owner: i64) -> usize {
    let collection = session.metamodel().collection(role).unwrap();
    let owner_key =
        EntityKey::new(Arc::clone(collection.owner_key_metadata()), [Value::Int(owner)]).unwrap();
    let key =
        AssociationKey::new(Arc::clone(collection.key_metadata()), [Value::Int(owner)], owner_key)
            .unwrap();
    session
        .dialect()
        .get_association(&key, &collection.association_context())
        .unwrap()
        .map_or(0, |association| association.size())
}

fn ids(entries: &[CollectionEntry]) -> Vec<Value> {
    entries.iter().flat_map(|e| e.element.clone()).collect()
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

/// `Item.order` owns the link; `Order.items` navigates it backwards.
fn order_items() -> (Vec<EntityMapping>, Vec<CollectionMapping>) {
    (
        vec![
            EntityMapping::new("Order", "Order", &["id"])
                .property(PropertyMapping::basic("number", &["number"]))
                .property(PropertyMapping::collection("items", "Order.items")),
            EntityMapping::new("Item", "Item", &["id"])
                .property(PropertyMapping::basic("name", &["name"]))
                .property(PropertyMapping::to_one("order", &["order_id"], "Order")),
        ],
        vec![
            CollectionMapping::one_to_many(
                "Order.items",
                "Order",
                "Item",
                &["order_id"],
                &["id"],
                "Item",
            )
            .inverse(),
        ],
    )
}

/// Many-to-many through `Order_Item`; `Item.orders` is the inverse side.
fn order_item_table() -> (Vec<EntityMapping>, Vec<CollectionMapping>) {
    (
        vec![
            EntityMapping::new("Order", "Order", &["id"])
                .property(PropertyMapping::collection("items", "Order.items")),
            EntityMapping::new("Item", "Item", &["id"])
                .property(PropertyMapping::basic("name", &["name"]))
                .property(PropertyMapping::collection("orders", "Item.orders")),
        ],
        vec![
            CollectionMapping::many_to_many(
                "Order.items",
                "Order",
                "Order_Item",
                &["order_id"],
                &["item_id"],
                "Item",
            ),
            CollectionMapping::many_to_many(
                "Item.orders",
                "Item",
                "Order_Item",
                &["item_id"],
                &["order_id"],
                "Order",
            )
            .inverse(),
        ],
    )
}

fn item(name: &str, order: i64) -> EntityState {
    EntityState::new().with("name", name).with("order_id", order)
}

fn element(id: i64) -> CollectionEntry {
    CollectionEntry::new(vec![Value::Int(id)])
}

// ---------------------------------------------------------------------------
// Navigational information
// ---------------------------------------------------------------------------

#[test]
fn test_inserting_owner_adds_inverse_row_and_delete_removes_it() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let (entities, collections) = order_items();
        let metamodel = Metamodel::build(entities, collections, dialect.as_mut()).unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        session
            .insert("Order", &[Value::Int(1)], &EntityState::new().with("number", "A-1"))
            .unwrap();
        session.insert("Item", &[Value::Int(5)], &item("lamp", 1)).unwrap();

        let items = session.load_collection("Order.items", &[Value::Int(1)]).unwrap();
        assert_eq!(ids(&items), vec![Value::Int(5)], "{name}");
        assert_eq!(stored_rows(&session, "Order.items", 1), 1, "{name}");

        session.delete("Item", &[Value::Int(5)], &item("lamp", 1)).unwrap();
        let items = session.load_collection("Order.items", &[Value::Int(1)]).unwrap();
        assert!(items.is_empty(), "{name}");
        assert_eq!(stored_rows(&session, "Order.items", 1), 0, "{name}");
    }
}

#[test]
fn test_changing_foreign_key_moves_the_inverse_row() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let (entities, collections) = order_items();
        let metamodel = Metamodel::build(entities, collections, dialect.as_mut()).unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        for order in [1, 2] {
            session.insert("Order", &[Value::Int(order)], &EntityState::new()).unwrap();
        }
        session.insert("Item", &[Value::Int(5)], &item("lamp", 1)).unwrap();
        session
            .update("Item", &[Value::Int(5)], &item("lamp", 1), &item("lamp", 2))
            .unwrap();

        let items = session.load_collection("Order.items", &[Value::Int(1)]).unwrap();
        assert!(items.is_empty(), "{name}");
        assert_eq!(
            ids(&session.load_collection("Order.items", &[Value::Int(2)]).unwrap()),
            vec![Value::Int(5)],
            "{name}"
        );
        let found = session.find("Item", &[Value::Int(5)]).unwrap().unwrap();
        assert_eq!(found.get("order_id"), Some(&Value::Int(2)), "{name}");
    }
}

#[test]
fn test_unrelated_update_leaves_inverse_rows_alone() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let (entities, collections) = order_items();
        let metamodel = Metamodel::build(entities, collections, dialect.as_mut()).unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        session.insert("Order", &[Value::Int(1)], &EntityState::new()).unwrap();
        session.insert("Item", &[Value::Int(5)], &item("lamp", 1)).unwrap();
        session
            .update("Item", &[Value::Int(5)], &item("lamp", 1), &item("desk lamp", 1))
            .unwrap();
        assert_eq!(stored_rows(&session, "Order.items", 1), 1, "{name}");
    }
}

#[test]
fn test_missing_inverse_owner_is_reported() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let (entities, collections) = order_items();
        let metamodel = Metamodel::build(entities, collections, dialect.as_mut()).unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        let err = session.insert("Item", &[Value::Int(5)], &item("lamp", 9)).unwrap_err();
        assert!(
            matches!(err, OgmError::EntityTupleNotFound { ref table, .. } if table == "Order"),
            "{name}: {err}"
        );
    }
}

#[test]
fn test_inverse_one_to_one_row() {
    init_tracing();
    let stores: Vec<(&str, Box<dyn GridDialect>)> = backends()
        .into_iter()
        .filter(|(name, _)| *name != "graph")
        .collect();
    for (name, mut dialect) in stores {
        let metamodel = Metamodel::build(
            vec![
                EntityMapping::new("Husband", "Husband", &["id"])
                    .property(PropertyMapping::to_one("wife", &["wife_id"], "Wife")),
                EntityMapping::new("Wife", "Wife", &["id"])
                    .property(PropertyMapping::one_to_one_inverse("husband", "Husband", "wife")),
            ],
            vec![],
            dialect.as_mut(),
        )
        .unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);
        let husband = EntityState::new().with("wife_id", 1);

        session.insert("Wife", &[Value::Int(1)], &EntityState::new()).unwrap();
        session.insert("Husband", &[Value::Int(7)], &husband).unwrap();

        let metadata = metamodel.entity("Husband").unwrap().inverse_one_to_one("wife").unwrap();
        let wife = EntityKey::new(
            Arc::clone(metamodel.entity("Wife").unwrap().key_metadata()),
            [Value::Int(1)],
        )
        .unwrap();
        let key = AssociationKey::new(Arc::clone(metadata), [Value::Int(1)], wife).unwrap();
        let context = ogm_storage::AssociationContext::new("wife");
        let mut persister = AssociationPersister::new(key.clone(), context.clone());
        let association = persister.association_or_none(session.dialect()).unwrap().unwrap();
        assert_eq!(association.size(), 1, "{name}");
        let row = association.get(&association.row_keys()[0]).unwrap();
        assert_eq!(row.get("id"), Some(Value::Int(7)), "{name}");

        session.delete("Husband", &[Value::Int(7)], &husband).unwrap();
        let mut persister = AssociationPersister::new(key, context);
        let remaining = persister
            .association_or_none(session.dialect())
            .unwrap()
            .map_or(0, |association| association.size());
        assert_eq!(remaining, 0, "{name}");
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[test]
fn test_recreate_then_delete_owner_leaves_no_rows() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let (entities, collections) = order_item_table();
        let metamodel = Metamodel::build(entities, collections, dialect.as_mut()).unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        session.insert("Order", &[Value::Int(1)], &EntityState::new()).unwrap();
        session
            .insert("Item", &[Value::Int(5)], &EntityState::new().with("name", "lamp"))
            .unwrap();
        session.recreate_collection("Order.items", &[Value::Int(1)], &[element(5)]).unwrap();

        assert_eq!(stored_rows(&session, "Order.items", 1), 1, "{name}");
        assert_eq!(
            ids(&session.load_collection("Item.orders", &[Value::Int(5)]).unwrap()),
            vec![Value::Int(1)],
            "{name}"
        );

        session.delete("Order", &[Value::Int(1)], &EntityState::new()).unwrap();
        assert_eq!(stored_rows(&session, "Order.items", 1), 0, "{name}");
        assert_eq!(stored_rows(&session, "Item.orders", 5), 0, "{name}");
    }
}

#[test]
fn test_changed_element_relinks_inverse_collection() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let (entities, collections) = order_item_table();
        let metamodel = Metamodel::build(entities, collections, dialect.as_mut()).unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        session.insert("Order", &[Value::Int(1)], &EntityState::new()).unwrap();
        for id in [5, 6] {
            session.insert("Item", &[Value::Int(id)], &EntityState::new()).unwrap();
        }
        session.insert_rows("Order.items", &[Value::Int(1)], &[element(5)]).unwrap();
        session
            .update_rows(
                "Order.items",
                &[Value::Int(1)],
                &[element(6).with_snapshot_element(vec![Value::Int(5)])],
            )
            .unwrap();

        assert_eq!(
            ids(&session.load_collection("Order.items", &[Value::Int(1)]).unwrap()),
            vec![Value::Int(6)],
            "{name}"
        );
        assert_eq!(stored_rows(&session, "Item.orders", 5), 0, "{name}");
        assert_eq!(
            ids(&session.load_collection("Item.orders", &[Value::Int(6)]).unwrap()),
            vec![Value::Int(1)],
            "{name}"
        );

        session.delete_rows("Order.items", &[Value::Int(1)], &[element(6)]).unwrap();
        assert_eq!(session.collection_size("Order.items", &[Value::Int(1)]).unwrap(), 0, "{name}");
        assert_eq!(stored_rows(&session, "Item.orders", 6), 0, "{name}");
    }
}

#[test]
fn test_inverse_collection_writes_are_skipped() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let (entities, collections) = order_item_table();
        let metamodel = Metamodel::build(entities, collections, dialect.as_mut()).unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        session.insert("Item", &[Value::Int(5)], &EntityState::new()).unwrap();
        let written = session.insert_rows("Item.orders", &[Value::Int(5)], &[element(1)]).unwrap();
        assert_eq!(written, 0, "{name}");
        assert_eq!(stored_rows(&session, "Item.orders", 5), 0, "{name}");
    }
}

#[test]
fn test_one_to_many_rows_live_on_the_element_record() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let metamodel = Metamodel::build(
            vec![
                EntityMapping::new("Order", "Order", &["id"])
                    .property(PropertyMapping::collection("lines", "Order.lines")),
                EntityMapping::new("Line", "Line", &["id"])
                    .property(PropertyMapping::basic("text", &["text"]))
                    .property(
                        PropertyMapping::basic("order_ref", &["order_id"])
                            .insertable(false)
                            .updatable(false),
                    ),
            ],
            vec![CollectionMapping::one_to_many(
                "Order.lines",
                "Order",
                "Line",
                &["order_id"],
                &["id"],
                "Line",
            )],
            dialect.as_mut(),
        )
        .unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        session.insert("Order", &[Value::Int(1)], &EntityState::new()).unwrap();
        session
            .insert("Line", &[Value::Int(3)], &EntityState::new().with("text", "first"))
            .unwrap();
        session.insert_rows("Order.lines", &[Value::Int(1)], &[element(3)]).unwrap();
        let line = session.find("Line", &[Value::Int(3)]).unwrap().unwrap();
        assert_eq!(line.get("order_id"), Some(&Value::Int(1)), "{name}");

        session.delete_rows("Order.lines", &[Value::Int(1)], &[element(3)]).unwrap();
        let line = session.find("Line", &[Value::Int(3)]).unwrap().unwrap();
        assert!(line.get("order_id").map_or(true, Value::is_null), "{name}");
        assert_eq!(line.get("text"), Some(&Value::from("first")), "{name}");
    }
}

#[test]
fn test_clear_leaves_no_rows() {
    init_tracing();
    for rows in [0usize, 1, 4] {
        for (name, mut dialect) in backends() {
            let metamodel = Metamodel::build(
                vec![EntityMapping::new("Order", "Order", &["id"])
                    .property(PropertyMapping::collection("tags", "Order.tags"))],
                vec![CollectionMapping::elements(
                    "Order.tags",
                    "Order",
                    "Order_tags",
                    &["order_id"],
                    &["tag"],
                )
                .indexed(&["position"])],
                dialect.as_mut(),
            )
            .unwrap();
            let mut session = Session::new(dialect.as_mut(), &metamodel);
            session.insert("Order", &[Value::Int(1)], &EntityState::new()).unwrap();
            let entries: Vec<CollectionEntry> = (0..rows as i64)
                .map(|i| {
                    CollectionEntry::new(vec![Value::from(format!("tag-{i}"))])
                        .with_index(vec![Value::Int(i)])
                })
                .collect();
            session.insert_rows("Order.tags", &[Value::Int(1)], &entries).unwrap();
            assert_eq!(stored_rows(&session, "Order.tags", 1), rows, "{name}");

            let collection = metamodel.collection("Order.tags").unwrap();
            let owner =
                EntityKey::new(Arc::clone(collection.owner_key_metadata()), [Value::Int(1)])
                    .unwrap();
            let key =
                AssociationKey::new(Arc::clone(collection.key_metadata()), [Value::Int(1)], owner)
                    .unwrap();
            drop(session);

            let mut persister = AssociationPersister::new(key, collection.association_context());
            persister.association(dialect.as_mut()).unwrap().clear();
            persister.flush(dialect.as_mut()).unwrap();

            let session = Session::new(dialect.as_mut(), &metamodel);
            assert_eq!(stored_rows(&session, "Order.tags", 1), 0, "{name}: {rows} rows");
        }
    }
}

// ---------------------------------------------------------------------------
// Reads, locking and duplicates
// ---------------------------------------------------------------------------

#[test]
fn test_multi_get_keeps_absent_slots() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let (entities, collections) = order_items();
        let metamodel = Metamodel::build(entities, collections, dialect.as_mut()).unwrap();
        let mut session = Session::new(dialect.as_mut(), &metamodel);

        session
            .insert("Order", &[Value::Int(1)], &EntityState::new().with("number", "A-1"))
            .unwrap();
        session.clear();
        let found = session
            .find_many("Order", &[vec![Value::Int(1)], vec![Value::Int(2)]])
            .unwrap();
        assert_eq!(found.len(), 2, "{name}");
        let number = found[0].as_ref().and_then(|s| s.get("number"));
        assert_eq!(number, Some(&Value::from("A-1")), "{name}");
        assert!(found[1].is_none(), "{name}");
    }
}

fn versioned_products(dialect: &mut dyn GridDialect) -> Metamodel {
    Metamodel::build(
        vec![EntityMapping::new("Product", "Product", &["id"])
            .property(PropertyMapping::basic("name", &["name"]))
            .property(PropertyMapping::basic("version", &["version"]))
            .versioned("version")],
        vec![],
        dialect,
    )
    .unwrap()
}

fn product(name: &str, version: i64) -> EntityState {
    EntityState::new().with("name", name).with("version", version)
}

#[test]
fn test_stale_state_on_every_backend() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let metamodel = versioned_products(dialect.as_mut());
        let mut session = Session::new(dialect.as_mut(), &metamodel);
        let id = [Value::Int(1)];

        session.insert("Product", &id, &product("lamp", 0)).unwrap();
        session
            .update("Product", &id, &product("lamp", 0), &product("desk lamp", 1))
            .unwrap();
        let err = session
            .update("Product", &id, &product("lamp", 0), &product("floor lamp", 1))
            .unwrap_err();
        assert!(matches!(err, OgmError::StaleState { .. }), "{name}: {err}");

        let stored = session.find("Product", &id).unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("desk lamp")), "{name}");
    }
}

#[test]
fn test_stale_update_from_another_unit_of_work() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let atomic = dialect.supports_atomic_optimistic_locking();
        assert_eq!(atomic, name == "map", "{name}");
        let metamodel = versioned_products(dialect.as_mut());
        let id = [Value::Int(3)];

        let read = {
            let mut session = Session::new(dialect.as_mut(), &metamodel);
            session.insert("Product", &id, &product("chair", 0)).unwrap();
            session.find("Product", &id).unwrap().unwrap()
        };
        {
            let mut session = Session::new(dialect.as_mut(), &metamodel);
            session
                .update("Product", &id, &read, &product("armchair", 1))
                .unwrap();
        }

        let mut session = Session::new(dialect.as_mut(), &metamodel);
        let err = session
            .update("Product", &id, &read, &product("stool", 1))
            .unwrap_err();
        assert!(matches!(err, OgmError::StaleState { .. }), "{name}: {err}");
        let err = session.delete("Product", &id, &read).unwrap_err();
        assert!(matches!(err, OgmError::StaleState { .. }), "{name}: {err}");

        let stored = session.find("Product", &id).unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("armchair")), "{name}");
        assert_eq!(stored.get("version"), Some(&Value::Int(1)), "{name}");
    }
}

#[test]
fn test_duplicate_key_on_every_backend() {
    init_tracing();
    for (name, mut dialect) in backends() {
        let metamodel = versioned_products(dialect.as_mut());
        let mut session = Session::new(dialect.as_mut(), &metamodel);
        let id = [Value::Int(1)];

        session.insert("Product", &id, &product("lamp", 0)).unwrap();
        let err = session.insert("Product", &id, &product("lamp", 0)).unwrap_err();
        assert!(matches!(err, OgmError::DuplicateKey { .. }), "{name}: {err}");
    }
}

// ---------------------------------------------------------------------------
// Journal round-trips
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_put_and_remove_round_trip(text in "[a-z ]{1,16}", count in any::<i64>()) {
        for (name, mut dialect) in backends() {
            let metadata = Arc::new(EntityKeyMetadata::new("Note", ["id"]));
            let key = EntityKey::new(metadata, [Value::Int(1)]).unwrap();
            let context = TupleContext::default();

            let mut tuple = dialect.create_tuple(&key, &context).unwrap();
            tuple.put("text", Value::Text(text.clone()));
            tuple.put("count", Value::Int(count));
            dialect.insert_or_update_tuple(&key, &mut tuple, &context).unwrap();

            let mut stored = dialect.get_tuple(&key, &context).unwrap().unwrap();
            prop_assert_eq!(stored.get("text"), Some(Value::Text(text.clone())), "{}", name);
            prop_assert_eq!(stored.get("count"), Some(Value::Int(count)), "{}", name);

            stored.remove("text");
            dialect.insert_or_update_tuple(&key, &mut stored, &context).unwrap();
            let stored = dialect.get_tuple(&key, &context).unwrap().unwrap();
            prop_assert_eq!(stored.get("text"), None, "{}", name);
            prop_assert_eq!(stored.get("count"), Some(Value::Int(count)), "{}", name);
        }
    }
}

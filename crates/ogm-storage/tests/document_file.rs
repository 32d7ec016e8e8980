//! File-backed document store tests: data survives reopening the database.

use std::sync::Arc;

use ogm_core::key::{EntityKey, EntityKeyMetadata};
use ogm_core::Value;
use ogm_storage::{
    AssociationStorage, DocumentDialect, GridDialect, IdSourceKey, NextValueRequest, TupleContext,
};

fn order_key(id: i64) -> EntityKey {
    EntityKey::new(Arc::new(EntityKeyMetadata::new("Order", ["id"])), [Value::Int(id)]).unwrap()
}

#[test]
fn test_documents_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.db");
    let path = path.to_str().unwrap();
    let context = TupleContext::default();

    {
        let mut dialect =
            DocumentDialect::new(path, AssociationStorage::AssociationDocument).unwrap();
        let mut tuple = dialect.create_tuple(&order_key(1), &context).unwrap();
        tuple.put("name", Value::from("persisted"));
        dialect.insert_or_update_tuple(&order_key(1), &mut tuple, &context).unwrap();
        let request = NextValueRequest::new(IdSourceKey::sequence("order_seq"));
        assert_eq!(dialect.next_value(&request).unwrap(), 1);
    }

    let mut dialect = DocumentDialect::new(path, AssociationStorage::AssociationDocument).unwrap();
    let tuple = dialect.get_tuple(&order_key(1), &context).unwrap().unwrap();
    assert_eq!(tuple.get("name"), Some(Value::from("persisted")));
    let request = NextValueRequest::new(IdSourceKey::sequence("order_seq"));
    assert_eq!(dialect.next_value(&request).unwrap(), 2);
}

//! Opens the configured store and builds the metamodel against it.

use tracing::info;

use ogm_core::{CollectionMapping, EntityMapping, OgmError};
use ogm_graph::{GraphDialect, PropertyGraph};
use ogm_storage::{DocumentDialect, GridDialect, MapDialect};

use crate::config::{DatastoreConfig, OgmConfig};
use crate::metamodel::Metamodel;

/// Instantiates the dialect named by `config`.
pub fn open_datastore(config: &OgmConfig) -> Result<Box<dyn GridDialect>, OgmError> {
    let dialect: Box<dyn GridDialect> = match &config.datastore {
        DatastoreConfig::Map => Box::new(MapDialect::new()),
        DatastoreConfig::Graph => Box::new(GraphDialect::with_cache_capacity(
            PropertyGraph::new(),
            config.query_cache_capacity,
        )),
        DatastoreConfig::Document {
            path: Some(path),
            association_storage,
        } => Box::new(DocumentDialect::new(path, *association_storage)?),
        DatastoreConfig::Document {
            path: None,
            association_storage,
        } => Box::new(DocumentDialect::in_memory(*association_storage)?),
    };
    info!(datastore = ?config.datastore, "datastore opened");
    Ok(dialect)
}

/// Opens the store and builds the metamodel, applying the configured
/// duplicate-insert override.
pub fn bootstrap(
    config: &OgmConfig,
    entities: Vec<EntityMapping>,
    collections: Vec<CollectionMapping>,
) -> Result<(Box<dyn GridDialect>, Metamodel), OgmError> {
    let mut dialect = open_datastore(config)?;
    let metamodel = Metamodel::build(entities, collections, dialect.as_mut())?
        .with_duplicate_insert_prevention(config.duplicate_insert_prevention_strategy());
    Ok((dialect, metamodel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogm_core::{EntityState, PropertyMapping, Value};
    use ogm_storage::AssociationStorage;

    use crate::Session;

    fn mappings() -> Vec<EntityMapping> {
        vec![EntityMapping::new("Order", "Order", &["id"])
            .property(PropertyMapping::basic("number", &["number"]))]
    }

    #[test]
    fn test_every_datastore_round_trips_an_entity() {
        let dir = tempfile::tempdir().unwrap();
        let configs = [
            OgmConfig::default(),
            OgmConfig {
                datastore: DatastoreConfig::Graph,
                ..OgmConfig::default()
            },
            OgmConfig {
                datastore: DatastoreConfig::Document {
                    path: None,
                    association_storage: AssociationStorage::InEntity,
                },
                ..OgmConfig::default()
            },
            OgmConfig {
                datastore: DatastoreConfig::Document {
                    path: Some(dir.path().join("ogm.db").display().to_string()),
                    association_storage: AssociationStorage::AssociationDocument,
                },
                ..OgmConfig::default()
            },
        ];
        for config in configs {
            let (mut dialect, metamodel) = bootstrap(&config, mappings(), vec![]).unwrap();
            let mut session = Session::new(dialect.as_mut(), &metamodel);
            let id = [Value::Int(7)];
            session
                .insert("Order", &id, &EntityState::new().with("number", "A-7"))
                .unwrap();
            session.clear();
            let found = session.find("Order", &id).unwrap().unwrap();
            assert_eq!(found.get("number"), Some(&Value::from("A-7")), "{:?}", config.datastore);
        }
    }

    #[test]
    fn test_duplicate_insert_override_applied() {
        let config = OgmConfig {
            duplicate_insert_prevention: Some(crate::config::DuplicateInsertPrevention::Native),
            ..OgmConfig::default()
        };
        let (_, metamodel) = bootstrap(&config, mappings(), vec![]).unwrap();
        assert_eq!(
            metamodel.duplicate_insert_prevention(),
            Some(ogm_storage::DuplicateInsertPreventionStrategy::Native)
        );
    }
}

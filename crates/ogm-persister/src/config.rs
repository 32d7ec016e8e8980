//! Mapper configuration.
//!
//! An [`OgmConfig`] picks the physical store and tunes the few knobs the
//! persisters and backends expose. It is read from JSON or from environment
//! variables:
//! - `OGM_DATASTORE`: `map`, `graph` or `document` (default: `map`)
//! - `OGM_DOCUMENT_PATH`: SQLite file for the document store (default: in memory)
//! - `OGM_ASSOCIATION_STORAGE`: `in_entity` or `association_document`
//! - `OGM_DUPLICATE_INSERT`: `look_up` or `native`, overrides the store's choice
//! - `OGM_QUERY_CACHE_CAPACITY`: graph template cache bound (default: 1000)

use std::path::Path;

use serde::{Deserialize, Serialize};

use ogm_graph::DEFAULT_QUERY_CACHE_CAPACITY;
use ogm_storage::{AssociationStorage, DuplicateInsertPreventionStrategy};

use crate::error::ConfigError;

/// Which physical store backs the mapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatastoreConfig {
    #[default]
    Map,
    Graph,
    Document {
        /// Database file; `None` keeps the store in memory.
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        association_storage: AssociationStorage,
    },
}

/// Serializable mirror of [`DuplicateInsertPreventionStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateInsertPrevention {
    LookUp,
    Native,
}

impl From<DuplicateInsertPrevention> for DuplicateInsertPreventionStrategy {
    fn from(value: DuplicateInsertPrevention) -> Self {
        match value {
            DuplicateInsertPrevention::LookUp => DuplicateInsertPreventionStrategy::LookUp,
            DuplicateInsertPrevention::Native => DuplicateInsertPreventionStrategy::Native,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgmConfig {
    #[serde(default)]
    pub datastore: DatastoreConfig,
    #[serde(default)]
    pub duplicate_insert_prevention: Option<DuplicateInsertPrevention>,
    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: usize,
}

fn default_query_cache_capacity() -> usize {
    DEFAULT_QUERY_CACHE_CAPACITY
}

impl Default for OgmConfig {
    fn default() -> Self {
        OgmConfig {
            datastore: DatastoreConfig::default(),
            duplicate_insert_prevention: None,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
        }
    }
}

impl OgmConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Builds a configuration from the `OGM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`OgmConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let association_storage = match lookup("OGM_ASSOCIATION_STORAGE") {
            Some(value) => parse_variable("OGM_ASSOCIATION_STORAGE", &value)?,
            None => AssociationStorage::default(),
        };
        let datastore = match lookup("OGM_DATASTORE").as_deref() {
            None | Some("map") => DatastoreConfig::Map,
            Some("graph") => DatastoreConfig::Graph,
            Some("document") => DatastoreConfig::Document {
                path: lookup("OGM_DOCUMENT_PATH"),
                association_storage,
            },
            Some(other) => {
                return Err(ConfigError::InvalidVariable {
                    variable: "OGM_DATASTORE".into(),
                    value: other.into(),
                    reason: "expected map, graph or document".into(),
                })
            }
        };
        let duplicate_insert_prevention = lookup("OGM_DUPLICATE_INSERT")
            .map(|value| parse_variable("OGM_DUPLICATE_INSERT", &value))
            .transpose()?;
        let query_cache_capacity = match lookup("OGM_QUERY_CACHE_CAPACITY") {
            Some(value) => value.parse::<usize>().map_err(|e| {
                ConfigError::InvalidVariable {
                    variable: "OGM_QUERY_CACHE_CAPACITY".into(),
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?,
            None => DEFAULT_QUERY_CACHE_CAPACITY,
        };
        Ok(OgmConfig {
            datastore,
            duplicate_insert_prevention,
            query_cache_capacity,
        })
    }

    pub fn duplicate_insert_prevention_strategy(
        &self,
    ) -> Option<DuplicateInsertPreventionStrategy> {
        self.duplicate_insert_prevention.map(Into::into)
    }
}

/// Parses a snake_case enum value the same way the JSON form does.
fn parse_variable<T: serde::de::DeserializeOwned>(
    variable: &str,
    value: &str,
) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| {
        ConfigError::InvalidVariable {
            variable: variable.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}

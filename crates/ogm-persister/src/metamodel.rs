//! Persister metadata built once per mapping set.
//!
//! [`Metamodel::build`] validates the mappings, derives key metadata, tuple
//! contexts and association shapes, then resolves bidirectional inverses in a
//! second pass (every persister must exist before an inverse can be found)
//! and hands the resulting schema to the dialect.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use ogm_core::key::{
    AssociatedEntityKeyMetadata, AssociationKeyMetadata, AssociationKind, EntityKeyMetadata,
};
use ogm_core::{
    CollectionMapping, EntityMapping, OgmError, OptimisticLockStyle, PropertyKind, PropertyMapping,
};
use ogm_storage::{
    AssociationContext, DuplicateInsertPreventionStrategy, GridDialect, SchemaDefinition,
    ToOneAssociation, TupleContext,
};

use crate::bidirectional::{InverseSide, MappingIndex};

/// How a collection's rows relate to the records at its far end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationShape {
    /// One-to-many whose foreign key lives on the element's own record.
    EmbeddedFkToEntity,
    /// Entity collection stored as a relationship of its own.
    AssociationTableToEntity,
    /// Value-typed elements; no inverse bookkeeping.
    Other,
}

/// An inverse association an entity property maintains.
#[derive(Debug, Clone)]
pub struct InverseAssociation {
    /// Property on the main side.
    pub property: String,
    /// Foreign key columns of that property.
    pub columns: Vec<String>,
    /// Entity hosting the inverse association.
    pub target: String,
    pub metadata: Arc<AssociationKeyMetadata>,
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct EntityMetadata {
    mapping: EntityMapping,
    key_metadata: Arc<EntityKeyMetadata>,
    tuple_context: TupleContext,
    inverse_one_to_one: HashMap<String, Arc<AssociationKeyMetadata>>,
    inverse_associations: Vec<InverseAssociation>,
}

impl EntityMetadata {
    pub fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }

    pub fn name(&self) -> &str {
        &self.mapping.name
    }

    pub fn key_metadata(&self) -> &Arc<EntityKeyMetadata> {
        &self.key_metadata
    }

    pub fn tuple_context(&self) -> &TupleContext {
        &self.tuple_context
    }

    /// Metadata of the one-to-one that `property` inverts on its target.
    pub fn inverse_one_to_one(&self, property: &str) -> Option<&Arc<AssociationKeyMetadata>> {
        self.inverse_one_to_one.get(property)
    }

    /// Inverse associations resolved for the properties that might own one.
    pub fn inverse_associations(&self) -> &[InverseAssociation] {
        &self.inverse_associations
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CollectionMetadata {
    mapping: CollectionMapping,
    shape: AssociationShape,
    key_metadata: Arc<AssociationKeyMetadata>,
    owner_key_metadata: Arc<EntityKeyMetadata>,
    element_key_metadata: Option<Arc<EntityKeyMetadata>>,
    main_side_property: String,
    inverse_collection: Option<String>,
}

impl CollectionMetadata {
    pub fn mapping(&self) -> &CollectionMapping {
        &self.mapping
    }

    pub fn role(&self) -> &str {
        &self.mapping.role
    }

    pub fn shape(&self) -> AssociationShape {
        self.shape
    }

    pub fn key_metadata(&self) -> &Arc<AssociationKeyMetadata> {
        &self.key_metadata
    }

    pub fn owner_key_metadata(&self) -> &Arc<EntityKeyMetadata> {
        &self.owner_key_metadata
    }

    pub fn element_key_metadata(&self) -> Option<&Arc<EntityKeyMetadata>> {
        self.element_key_metadata.as_ref()
    }

    pub fn is_inverse(&self) -> bool {
        self.mapping.inverse
    }

    /// Property naming the physical link on the main side.
    pub fn main_side_property(&self) -> &str {
        &self.main_side_property
    }

    /// Role of the inverse collection of a many-to-many main side.
    pub fn inverse_collection(&self) -> Option<&str> {
        self.inverse_collection.as_deref()
    }

    pub fn association_context(&self) -> AssociationContext {
        AssociationContext::new(self.main_side_property.clone())
    }

    /// Rows are addressed by owner key plus index columns.
    ///
    /// One-to-many rows stay addressed by element: the index is just another
    /// column of the element's record.
    pub fn addressed_by_index(&self) -> bool {
        self.mapping.identifier_column.is_none()
            && self.mapping.is_indexed()
            && !self.mapping.one_to_many
    }
}

// ---------------------------------------------------------------------------
// Metamodel
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Metamodel {
    entities: IndexMap<String, EntityMetadata>,
    collections: IndexMap<String, CollectionMetadata>,
    duplicate_insert_prevention: Option<DuplicateInsertPreventionStrategy>,
}

impl Metamodel {
    /// Builds metadata for every mapping and announces the schema to `dialect`.
    pub fn build(
        entities: Vec<EntityMapping>,
        collections: Vec<CollectionMapping>,
        dialect: &mut dyn GridDialect,
    ) -> Result<Self, OgmError> {
        let mut entity_mappings: IndexMap<String, EntityMapping> = IndexMap::new();
        for entity in entities {
            if entity_mappings.contains_key(&entity.name) {
                return Err(OgmError::mapping(format!("entity '{}' is mapped twice", entity.name)));
            }
            entity_mappings.insert(entity.name.clone(), entity);
        }
        let mut collection_mappings: IndexMap<String, CollectionMapping> = IndexMap::new();
        for collection in collections {
            if collection_mappings.contains_key(&collection.role) {
                return Err(OgmError::mapping(format!(
                    "collection '{}' is mapped twice",
                    collection.role
                )));
            }
            collection_mappings.insert(collection.role.clone(), collection);
        }
        validate(&entity_mappings, &collection_mappings)?;

        let key_metadata: HashMap<String, Arc<EntityKeyMetadata>> = entity_mappings
            .values()
            .map(|e| {
                (
                    e.name.clone(),
                    Arc::new(EntityKeyMetadata::new(e.table.clone(), e.id_columns.iter().cloned())),
                )
            })
            .collect();

        let mut collections = IndexMap::new();
        for mapping in collection_mappings.values() {
            let metadata = build_collection(mapping, &key_metadata)?;
            collections.insert(mapping.role.clone(), metadata);
        }

        let mut entities = IndexMap::new();
        for mapping in entity_mappings.values() {
            let metadata = build_entity(mapping, &entity_mappings, &key_metadata)?;
            entities.insert(mapping.name.clone(), metadata);
        }

        let mut metamodel = Metamodel {
            entities,
            collections,
            duplicate_insert_prevention: None,
        };
        metamodel.post_instantiate(&entity_mappings, &collection_mappings)?;

        for entity in metamodel.entities.values() {
            if entity.mapping.is_versioned() && !dialect.supports_atomic_optimistic_locking() {
                warn!(
                    entity = %entity.mapping.name,
                    "optimistic locking is emulated: \
                     the version check and the write are separate calls"
                );
            }
        }
        dialect.schema_created(&metamodel.schema_definition())?;
        debug!(
            entities = metamodel.entities.len(),
            collections = metamodel.collections.len(),
            "metamodel built"
        );
        Ok(metamodel)
    }

    /// Overrides the store's declared duplicate-insert strategy.
    pub fn with_duplicate_insert_prevention(
        mut self,
        strategy: Option<DuplicateInsertPreventionStrategy>,
    ) -> Self {
        self.duplicate_insert_prevention = strategy;
        self
    }

    pub fn duplicate_insert_prevention(&self) -> Option<DuplicateInsertPreventionStrategy> {
        self.duplicate_insert_prevention
    }

    pub fn entity(&self, name: &str) -> Result<&EntityMetadata, OgmError> {
        self.entities
            .get(name)
            .ok_or_else(|| OgmError::mapping(format!("unknown entity '{}'", name)))
    }

    pub fn collection(&self, role: &str) -> Result<&CollectionMetadata, OgmError> {
        self.collections
            .get(role)
            .ok_or_else(|| OgmError::mapping(format!("unknown collection '{}'", role)))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.values()
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionMetadata> {
        self.collections.values()
    }

    pub fn schema_definition(&self) -> SchemaDefinition {
        let mut association_key_metadata: Vec<Arc<AssociationKeyMetadata>> = self
            .collections
            .values()
            .map(|c| Arc::clone(&c.key_metadata))
            .collect();
        for entity in self.entities.values() {
            association_key_metadata.extend(entity.inverse_one_to_one.values().cloned());
        }
        SchemaDefinition {
            entity_key_metadata: self
                .entities
                .values()
                .map(|e| Arc::clone(&e.key_metadata))
                .collect(),
            association_key_metadata,
            id_source_keys: Vec::new(),
        }
    }

    /// Second pass: resolve and cache inverse sides and main-side names.
    fn post_instantiate(
        &mut self,
        entity_mappings: &IndexMap<String, EntityMapping>,
        collection_mappings: &IndexMap<String, CollectionMapping>,
    ) -> Result<(), OgmError> {
        let index = MappingIndex::new(entity_mappings, collection_mappings);

        for collection in self.collections.values_mut() {
            collection.main_side_property = index.main_side_property_name(&collection.mapping)?;
            collection.inverse_collection = index
                .inverse_collection(&collection.mapping)
                .map(|inverse| inverse.role.clone());
        }

        for owner in entity_mappings.values() {
            let mut inverses = Vec::new();
            for property in &owner.properties {
                if !property.might_be_main_side_of_bidirectional() || property.columns.is_empty() {
                    continue;
                }
                let Some(target) = property.to_one_target() else {
                    continue;
                };
                let metadata = match index.inverse_of_property(owner, property) {
                    Some(InverseSide::OneToOne { .. }) => self
                        .entities
                        .get(&owner.name)
                        .and_then(|e| e.inverse_one_to_one.get(&property.name))
                        .cloned(),
                    Some(InverseSide::Collection(collection)) => self
                        .collections
                        .get(&collection.role)
                        .map(|c| Arc::clone(&c.key_metadata)),
                    None => None,
                };
                if let Some(metadata) = metadata {
                    debug!(
                        entity = %owner.name,
                        property = %property.name,
                        inverse = %metadata.table(),
                        "inverse association resolved"
                    );
                    inverses.push(InverseAssociation {
                        property: property.name.clone(),
                        columns: property.columns.clone(),
                        target: target.to_string(),
                        metadata,
                    });
                }
            }
            if let Some(entity) = self.entities.get_mut(&owner.name) {
                entity.inverse_associations = inverses;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

fn validate(
    entities: &IndexMap<String, EntityMapping>,
    collections: &IndexMap<String, CollectionMapping>,
) -> Result<(), OgmError> {
    for entity in entities.values() {
        if entity.id_columns.is_empty() {
            return Err(OgmError::mapping(format!(
                "entity '{}' has no identifier columns",
                entity.name
            )));
        }
        if entity.lock_style == OptimisticLockStyle::Version
            && entity.version_property().is_none()
        {
            return Err(OgmError::mapping(format!(
                "entity '{}' locks on a version but maps no version property",
                entity.name
            )));
        }
        for property in &entity.properties {
            validate_property(entity, property, entities, collections)?;
        }
    }
    for collection in collections.values() {
        let owner = entities.get(&collection.owner).ok_or_else(|| {
            OgmError::mapping(format!(
                "collection '{}' is owned by unknown entity '{}'",
                collection.role, collection.owner
            ))
        })?;
        if collection.key_columns.len() != owner.id_columns.len() {
            return Err(OgmError::mapping(format!(
                "key columns {:?} of '{}' do not line up with identifier {:?} of '{}'",
                collection.key_columns, collection.role, owner.id_columns, owner.name
            )));
        }
        if let Some(element) = collection.element_entity() {
            if !entities.contains_key(element) {
                return Err(OgmError::mapping(format!(
                    "collection '{}' holds unknown entity '{}'",
                    collection.role, element
                )));
            }
        }
        if collection.one_to_many && collection.identifier_column.is_some() {
            return Err(OgmError::mapping(format!(
                "one-to-many collection '{}' cannot have a surrogate identifier",
                collection.role
            )));
        }
    }
    Ok(())
}

fn validate_property(
    entity: &EntityMapping,
    property: &PropertyMapping,
    entities: &IndexMap<String, EntityMapping>,
    collections: &IndexMap<String, CollectionMapping>,
) -> Result<(), OgmError> {
    match &property.kind {
        PropertyKind::ToOne { target, mapped_by } => {
            let target_mapping = entities.get(target).ok_or_else(|| {
                OgmError::mapping(format!(
                    "property '{}.{}' references unknown entity '{}'",
                    entity.name, property.name, target
                ))
            })?;
            match mapped_by {
                Some(by) => {
                    let owning = target_mapping.find_property(by);
                    let back = owning.and_then(PropertyMapping::to_one_target);
                    if back != Some(entity.name.as_str()) {
                        return Err(OgmError::mapping(format!(
                            "'{}.{}' is mapped by '{}.{}', which is not a to-one back to '{}'",
                            entity.name, property.name, target, by, entity.name
                        )));
                    }
                }
                None if property.columns.len() != target_mapping.id_columns.len() => {
                    return Err(OgmError::mapping(format!(
                        "columns {:?} of '{}.{}' do not line up with identifier {:?} of '{}'",
                        property.columns,
                        entity.name,
                        property.name,
                        target_mapping.id_columns,
                        target
                    )));
                }
                None => {}
            }
        }
        PropertyKind::Collection { role } => match collections.get(role) {
            Some(collection) if collection.owner == entity.name => {}
            Some(collection) => {
                return Err(OgmError::mapping(format!(
                    "collection '{}' is owned by '{}', not '{}'",
                    role, collection.owner, entity.name
                )))
            }
            None => {
                return Err(OgmError::mapping(format!(
                    "property '{}.{}' references unknown collection '{}'",
                    entity.name, property.name, role
                )))
            }
        },
        PropertyKind::Basic | PropertyKind::Embedded => {
            if property.columns.is_empty() {
                return Err(OgmError::mapping(format!(
                    "property '{}.{}' maps no columns",
                    entity.name, property.name
                )));
            }
        }
    }
    Ok(())
}

fn build_entity(
    mapping: &EntityMapping,
    entities: &IndexMap<String, EntityMapping>,
    key_metadata: &HashMap<String, Arc<EntityKeyMetadata>>,
) -> Result<EntityMetadata, OgmError> {
    let own_key = lookup_key(key_metadata, &mapping.name)?;
    let mut to_ones = Vec::new();
    let mut inverse_one_to_one = HashMap::new();

    for property in &mapping.properties {
        let PropertyKind::ToOne { target, mapped_by: None } = &property.kind else {
            continue;
        };
        let target_key = lookup_key(key_metadata, target)?;
        to_ones.push(ToOneAssociation {
            role: property.name.clone(),
            target: AssociatedEntityKeyMetadata::new(property.columns.iter().cloned(), target_key)?,
        });

        // A one-to-one mapped by this property gets navigation metadata of
        // its own: rows keyed by the FK, pointing back at this entity.
        let inverted_by = entities.get(target).and_then(|t| {
            t.properties.iter().find(|p| {
                matches!(&p.kind, PropertyKind::ToOne { target: back, mapped_by: Some(by) }
                    if *back == mapping.name && *by == property.name)
            })
        });
        if let Some(inverse_property) = inverted_by {
            let metadata = AssociationKeyMetadata::builder(mapping.table.clone())
                .column_names(property.columns.iter().cloned())
                .element_column_names(mapping.id_columns.iter().cloned())
                .associated_entity_key_metadata(AssociatedEntityKeyMetadata::new(
                    mapping.id_columns.iter().cloned(),
                    Arc::clone(&own_key),
                )?)
                .inverse(true)
                .collection_role(format!("{}.{}", target, inverse_property.name))
                .kind(AssociationKind::Association)
                .one_to_one(true)
                .build()?;
            inverse_one_to_one.insert(property.name.clone(), Arc::new(metadata));
        }
    }

    Ok(EntityMetadata {
        mapping: mapping.clone(),
        key_metadata: own_key,
        tuple_context: TupleContext::new(mapping.all_columns(), to_ones),
        inverse_one_to_one,
        inverse_associations: Vec::new(),
    })
}

fn build_collection(
    mapping: &CollectionMapping,
    key_metadata: &HashMap<String, Arc<EntityKeyMetadata>>,
) -> Result<CollectionMetadata, OgmError> {
    let owner_key_metadata = lookup_key(key_metadata, &mapping.owner)?;
    let element_key_metadata = mapping
        .element_entity()
        .map(|target| lookup_key(key_metadata, target))
        .transpose()?;

    let shape = match (&element_key_metadata, mapping.one_to_many) {
        (Some(_), true) => AssociationShape::EmbeddedFkToEntity,
        (Some(_), false) => AssociationShape::AssociationTableToEntity,
        (None, _) => AssociationShape::Other,
    };

    let mut builder = AssociationKeyMetadata::builder(mapping.table.clone())
        .column_names(mapping.key_columns.iter().cloned())
        .element_column_names(mapping.element_columns.iter().cloned())
        .inverse(mapping.inverse)
        .collection_role(mapping.role.clone())
        .kind(if element_key_metadata.is_some() {
            AssociationKind::Association
        } else {
            AssociationKind::EmbeddedCollection
        });
    if !mapping.one_to_many {
        builder = builder.row_key_index_column_names(mapping.index_columns.iter().cloned());
    }
    if let Some(identifier) = &mapping.identifier_column {
        builder = builder.identifier_column(identifier.clone());
    }
    if let Some(target) = &element_key_metadata {
        builder = builder.associated_entity_key_metadata(AssociatedEntityKeyMetadata::new(
            mapping.element_columns.iter().cloned(),
            Arc::clone(target),
        )?);
    }

    Ok(CollectionMetadata {
        mapping: mapping.clone(),
        shape,
        key_metadata: Arc::new(builder.build()?),
        owner_key_metadata,
        element_key_metadata,
        main_side_property: mapping.property_name().to_string(),
        inverse_collection: None,
    })
}

fn lookup_key(
    key_metadata: &HashMap<String, Arc<EntityKeyMetadata>>,
    entity: &str,
) -> Result<Arc<EntityKeyMetadata>, OgmError> {
    key_metadata
        .get(entity)
        .cloned()
        .ok_or_else(|| OgmError::mapping(format!("unknown entity '{}'", entity)))
}

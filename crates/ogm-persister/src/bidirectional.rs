//! Inverse-side resolution for bidirectional associations.
//!
//! Works purely on mapping metadata, so it can only run once every entity and
//! collection mapping is known. [`crate::Metamodel::build`] calls it after
//! building all persister metadata and caches the answers.
//!
//! Matching rules:
//! - a to-one is inverted by an explicit one-to-one `mapped_by` on the target
//!   (checked first, since a one-to-one looks like a many-to-one structurally),
//!   else by the first target collection stored in the owner's table whose key
//!   columns are the to-one's columns and whose element columns are the
//!   owner's identifier columns;
//! - a many-to-many is inverted by the first collection of the element entity
//!   stored in the same table whose element columns are the main side's key
//!   columns.

use indexmap::IndexMap;

use ogm_core::{CollectionMapping, EntityMapping, OgmError, PropertyKind, PropertyMapping};

/// What inverts a to-one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseSide<'a> {
    /// `property` on the target is a one-to-one mapped by the to-one.
    OneToOne { property: &'a PropertyMapping },
    /// A collection of the target navigates the same rows backwards.
    Collection(&'a CollectionMapping),
}

/// Read-only view over every mapping of a metamodel.
#[derive(Debug, Clone, Copy)]
pub struct MappingIndex<'a> {
    entities: &'a IndexMap<String, EntityMapping>,
    collections: &'a IndexMap<String, CollectionMapping>,
}

impl<'a> MappingIndex<'a> {
    pub fn new(
        entities: &'a IndexMap<String, EntityMapping>,
        collections: &'a IndexMap<String, CollectionMapping>,
    ) -> Self {
        MappingIndex {
            entities,
            collections,
        }
    }

    fn collections_of(
        &self,
        entity: &'a EntityMapping,
    ) -> impl Iterator<Item = (&'a PropertyMapping, &'a CollectionMapping)> + 'a {
        let collections = self.collections;
        entity.properties.iter().filter_map(move |property| {
            property
                .collection_role()
                .and_then(|role| collections.get(role))
                .map(|collection| (property, collection))
        })
    }

    /// Inverse of `property` declared on `owner`, `None` when unidirectional.
    pub fn inverse_of_property(
        &self,
        owner: &EntityMapping,
        property: &PropertyMapping,
    ) -> Option<InverseSide<'a>> {
        match &property.kind {
            PropertyKind::ToOne {
                target,
                mapped_by: None,
            } => {
                let target = self.entities.get(target)?;
                if let Some(one_to_one) = target.properties.iter().find(|candidate| {
                    matches!(
                        &candidate.kind,
                        PropertyKind::ToOne { target: back, mapped_by: Some(by) }
                            if *back == owner.name && *by == property.name
                    )
                }) {
                    return Some(InverseSide::OneToOne {
                        property: one_to_one,
                    });
                }
                self.collections_of(target)
                    .map(|(_, collection)| collection)
                    .find(|collection| {
                        collection.table == owner.table
                            && collection.key_columns == property.columns
                            && collection.element_columns == owner.id_columns
                    })
                    .map(InverseSide::Collection)
            }
            PropertyKind::Collection { role } => {
                let main = self.collections.get(role)?;
                self.inverse_collection(main).map(InverseSide::Collection)
            }
            _ => None,
        }
    }

    /// Inverse collection of a many-to-many main side.
    pub fn inverse_collection(&self, main: &CollectionMapping) -> Option<&'a CollectionMapping> {
        if main.inverse || !main.is_many_to_many() {
            return None;
        }
        let element = self.entities.get(main.element_entity()?)?;
        self.collections_of(element)
            .map(|(_, candidate)| candidate)
            .find(|candidate| {
                candidate.role != main.role
                    && candidate.table == main.table
                    && candidate.element_columns == main.key_columns
            })
    }

    /// Property name used to type the physical link of `collection`, so
    /// that both navigation directions agree on one name.
    pub fn main_side_property_name(
        &self,
        collection: &CollectionMapping,
    ) -> Result<String, OgmError> {
        if !collection.inverse {
            return Ok(collection.property_name().to_string());
        }
        let main_side = collection
            .element_entity()
            .and_then(|name| self.entities.get(name))
            .ok_or_else(|| {
                OgmError::mapping(format!(
                    "inverse collection '{}' does not hold entities",
                    collection.role
                ))
            })?;
        for property in &main_side.properties {
            match &property.kind {
                PropertyKind::ToOne { mapped_by: None, .. }
                    if property.columns == collection.key_columns =>
                {
                    return Ok(property.name.clone());
                }
                PropertyKind::Collection { role } => {
                    if let Some(candidate) = self.collections.get(role) {
                        if candidate.table == collection.table
                            && candidate.key_columns == collection.element_columns
                        {
                            return Ok(property.name.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        Err(OgmError::mapping(format!(
            "cannot determine the main side of collection '{}'",
            collection.role
        )))
    }
}

//! Keeps inverse associations in step with to-one foreign keys.
//!
//! When an entity record carrying a to-one is written or removed, the
//! association on the referenced entity that navigates the same link
//! backwards gains or loses the matching row. Only properties resolved as
//! possible main sides during [`crate::Metamodel::build`] are visited.

use std::sync::Arc;

use tracing::trace;

use ogm_core::{AssociationKey, EntityKey, OgmError, RowKey, RowKeyBuilder, Tuple, Value};
use ogm_storage::AssociationContext;

use crate::association_persister::AssociationPersister;
use crate::metamodel::{EntityMetadata, InverseAssociation};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Add,
    Remove,
}

/// Adds the row pointing back at `key` to every inverse association `tuple`
/// references. `only` restricts the visit to the named properties.
pub(crate) fn add_navigational_information(
    session: &mut Session<'_>,
    entity: &EntityMetadata,
    key: &EntityKey,
    tuple: &Tuple,
    only: Option<&[String]>,
) -> Result<(), OgmError> {
    update(session, entity, key, tuple, only, Direction::Add)
}

/// Removes the rows added by [`add_navigational_information`].
pub(crate) fn remove_navigational_information(
    session: &mut Session<'_>,
    entity: &EntityMetadata,
    key: &EntityKey,
    tuple: &Tuple,
    only: Option<&[String]>,
) -> Result<(), OgmError> {
    update(session, entity, key, tuple, only, Direction::Remove)
}

fn update(
    session: &mut Session<'_>,
    entity: &EntityMetadata,
    key: &EntityKey,
    tuple: &Tuple,
    only: Option<&[String]>,
    direction: Direction,
) -> Result<(), OgmError> {
    for inverse in entity.inverse_associations() {
        if only.is_some_and(|names| !names.contains(&inverse.property)) {
            continue;
        }
        let fk: Vec<Value> = inverse
            .columns
            .iter()
            .map(|c| tuple.get(c).unwrap_or(Value::Null))
            .collect();
        if fk.iter().all(Value::is_null) {
            continue;
        }
        match direction {
            Direction::Add => add_row(session, inverse, key, fk)?,
            Direction::Remove => remove_row(session, inverse, key, fk)?,
        }
    }
    Ok(())
}

fn add_row(
    session: &mut Session<'_>,
    inverse: &InverseAssociation,
    key: &EntityKey,
    fk: Vec<Value>,
) -> Result<(), OgmError> {
    let metamodel = session.metamodel;
    let target = metamodel.entity(&inverse.target)?;
    let host = EntityKey::new(Arc::clone(target.key_metadata()), fk.iter().cloned())?;
    if session.tuple(&host, target.tuple_context())?.is_none() {
        return Err(OgmError::EntityTupleNotFound {
            table: host.table().to_string(),
            key: host.to_string(),
        });
    }

    let (association_key, row_key, row) = navigation_row(inverse, key, host, &fk)?;
    let context = AssociationContext::new(inverse.property.clone());
    let mut persister = AssociationPersister::new(association_key, context);
    persister.association(&mut *session.dialect)?.put(row_key, row);
    persister.flush(&mut *session.dialect)?;
    trace!(property = %inverse.property, owner = %key, "inverse row added");
    Ok(())
}

fn remove_row(
    session: &mut Session<'_>,
    inverse: &InverseAssociation,
    key: &EntityKey,
    fk: Vec<Value>,
) -> Result<(), OgmError> {
    let metamodel = session.metamodel;
    let target = metamodel.entity(&inverse.target)?;
    let host = EntityKey::new(Arc::clone(target.key_metadata()), fk.iter().cloned())?;
    let (association_key, row_key, _) = navigation_row(inverse, key, host, &fk)?;
    let context = AssociationContext::new(inverse.property.clone());
    let mut persister = AssociationPersister::new(association_key, context);
    match persister.association_or_none(&*session.dialect)? {
        Some(association) if !association.is_empty() => association.remove(row_key),
        _ => {
            trace!(property = %inverse.property, owner = %key, "no inverse association to update");
            return Ok(());
        }
    }
    persister.flush(&mut *session.dialect)?;
    trace!(property = %inverse.property, owner = %key, "inverse row removed");
    Ok(())
}

/// Association key, row key and row values linking `host` back to `key`.
fn navigation_row(
    inverse: &InverseAssociation,
    key: &EntityKey,
    host: EntityKey,
    fk: &[Value],
) -> Result<(AssociationKey, RowKey, Tuple), OgmError> {
    let metadata = &inverse.metadata;
    // Element columns of the inverse row name the owner's identifier.
    let element_columns = metadata
        .associated_entity_key_metadata()
        .map(|a| a.association_key_columns())
        .unwrap_or(key.column_names());

    let association_key = AssociationKey::new(Arc::clone(metadata), fk.iter().cloned(), host)?;
    let row_key = RowKeyBuilder::new(metadata.row_key_column_names())
        .values(metadata.column_names(), fk)
        .values(element_columns, key.column_values())
        .build();
    let mut row = Tuple::new();
    for (column, value) in row_key.columns() {
        row.put(column, value.clone());
    }
    Ok((association_key, row_key, row))
}

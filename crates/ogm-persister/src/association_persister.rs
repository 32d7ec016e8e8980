//! Loads one association lazily and flushes its journal.

use tracing::trace;

use ogm_core::{Association, AssociationKey, OgmError};
use ogm_storage::{AssociationContext, GridDialect, TupleContext};

/// Unit-of-work handle on a single association instance.
///
/// The stored association is read on first access. Changes are journaled on
/// the [`Association`] and reach the store only on [`AssociationPersister::flush`].
#[derive(Debug)]
pub struct AssociationPersister {
    key: AssociationKey,
    context: AssociationContext,
    association: Option<Association>,
    loaded: bool,
}

impl AssociationPersister {
    pub fn new(key: AssociationKey, context: AssociationContext) -> Self {
        AssociationPersister {
            key,
            context,
            association: None,
            loaded: false,
        }
    }

    pub fn key(&self) -> &AssociationKey {
        &self.key
    }

    pub fn context(&self) -> &AssociationContext {
        &self.context
    }

    /// The stored association, `None` when the store has none.
    pub fn association_or_none(
        &mut self,
        dialect: &dyn GridDialect,
    ) -> Result<Option<&mut Association>, OgmError> {
        if !self.loaded {
            self.association = dialect.get_association(&self.key, &self.context)?;
            self.loaded = true;
        }
        Ok(self.association.as_mut())
    }

    /// The stored association, created empty when absent.
    pub fn association(
        &mut self,
        dialect: &mut dyn GridDialect,
    ) -> Result<&mut Association, OgmError> {
        if !self.loaded {
            self.association = dialect.get_association(&self.key, &self.context)?;
            self.loaded = true;
        }
        let association = match self.association.take() {
            Some(association) => association,
            None => dialect.create_association(&self.key, &self.context)?,
        };
        Ok(self.association.insert(association))
    }

    /// Writes pending changes; an association left without rows is removed.
    pub fn flush(&mut self, dialect: &mut dyn GridDialect) -> Result<(), OgmError> {
        let Some(association) = self.association.as_mut() else {
            return Ok(());
        };
        if association.operations().is_empty() {
            return Ok(());
        }

        if dialect.is_stored_in_entity_structure(self.key.metadata()) {
            let host = self.key.entity_key();
            if dialect.get_tuple(host, &TupleContext::default())?.is_none() {
                if association.is_empty() {
                    trace!(key = %self.key, "hosting record gone, nothing to remove");
                    *association = Association::new();
                    return Ok(());
                }
                return Err(OgmError::EntityTupleNotFound {
                    table: host.table().to_string(),
                    key: host.to_string(),
                });
            }
        }

        if association.is_empty() {
            dialect.remove_association(&self.key, &self.context)?;
            *association = Association::new();
            trace!(key = %self.key, "association removed");
        } else {
            dialect.insert_or_update_association(&self.key, association, &self.context)?;
            trace!(key = %self.key, rows = association.size(), "association flushed");
        }
        Ok(())
    }
}

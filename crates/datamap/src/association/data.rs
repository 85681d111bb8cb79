//! Single-entity association data.

use datamap_core::{Association, Error, Record, Result};
use datamap_query::Query;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Populate, populate_object};
use crate::entity::{Entity, EntityRef};
use crate::mapper::Mapper;
use crate::orm::Orm;

/// Lazy cache cell for a belongs-to or has-one association.
///
/// Starts unloaded; the first read while loading is required triggers a
/// blocking fetch through the target mapper. Manually populated data
/// suppresses loading entirely (`load_required` drops to false). Once
/// loaded, reads never re-query until [`clear_cached`](Self::clear_cached).
pub struct AssociationData {
    association: Association,
    owner: Weak<RefCell<Entity>>,
    loaded: bool,
    load_required: bool,
    dirty: bool,
    object: Option<EntityRef>,
    query: Option<Query>,
}

impl AssociationData {
    pub(crate) fn new(association: Association, owner: Weak<RefCell<Entity>>) -> Self {
        AssociationData {
            association,
            owner,
            loaded: false,
            load_required: true,
            dirty: false,
            object: None,
            query: None,
        }
    }

    /// The association descriptor this cell serves.
    #[must_use]
    pub fn association(&self) -> &Association {
        &self.association
    }

    fn owner(&self) -> Result<EntityRef> {
        self.owner
            .upgrade()
            .ok_or_else(|| Error::OwnerGone(self.association.name().to_string()))
    }

    fn target_mapper(&self, orm: &Orm) -> Result<Rc<Mapper>> {
        orm.mapper(self.association.target())
    }

    /// The association-scoped query, memoized; a fresh clone per call.
    ///
    /// `None` when the owner has no key value yet — nothing to load.
    pub fn query(&mut self, orm: &Orm) -> Result<Option<Query>> {
        if self.query.is_none() {
            let owner = self.owner()?;
            self.query = self.target_mapper(orm)?.build_association_query(
                orm,
                &self.association,
                &owner,
            )?;
        }
        Ok(self.query.clone())
    }

    /// Fetch the associated object now, marking the cell loaded.
    pub fn load(&mut self, orm: &Orm) -> Result<()> {
        self.loaded = true;
        let owner = self.owner()?;
        self.object = self
            .target_mapper(orm)?
            .lazy_load_one(orm, &self.association, &owner)?;
        Ok(())
    }

    fn ensure_loaded(&mut self, orm: &Orm) -> Result<()> {
        if !self.loaded && self.load_required {
            self.load(orm)?;
        }
        Ok(())
    }

    /// The associated object, lazy-loading on first access.
    pub fn object(&mut self, orm: &Orm) -> Result<Option<EntityRef>> {
        self.ensure_loaded(orm)?;
        Ok(self.object.clone())
    }

    /// The held object without triggering a load.
    #[must_use]
    pub fn loaded_object(&self) -> Option<EntityRef> {
        self.object.clone()
    }

    /// Store an object directly, bypassing any query.
    pub fn set_object(&mut self, entity: EntityRef) {
        self.object = Some(entity);
        self.loaded = true;
        self.load_required = false;
    }

    /// Construct a new target entity from raw fields: hydrate through the
    /// target mapper, mark it dirty, stamp the foreign key and hold it.
    pub fn build(&mut self, orm: &Orm, record: Record) -> Result<EntityRef> {
        let owner = self.owner()?;
        let object = self.target_mapper(orm)?.to_entity(orm, &record, true)?;
        object.borrow_mut().set_dirty(true);
        populate_object(orm, &self.association, &object, &owner)?;

        self.object = Some(object.clone());
        self.load_required = false;
        self.dirty = true;
        Ok(object)
    }

    /// Build from raw fields and immediately persist through the target
    /// mapper.
    pub fn create(&mut self, orm: &Orm, record: Record) -> Result<bool> {
        let object = self.build(orm, record)?;
        self.target_mapper(orm)?.create(orm, &object)
    }

    /// Accept population data: a raw record (built) or an already-typed
    /// entity of the target type (stored, cell marked dirty). Anything else
    /// is a hard error.
    pub fn populate(&mut self, orm: &Orm, data: Populate) -> Result<()> {
        match data {
            Populate::Record(record) => {
                self.build(orm, record)?;
                Ok(())
            }
            Populate::Entity(entity) => {
                let actual = entity.borrow().entity_name().to_string();
                if actual != self.association.target() {
                    return Err(Error::EntityTypeMismatch {
                        association: self.association.name().to_string(),
                        expected: self.association.target().to_string(),
                        actual,
                    });
                }
                self.set_object(entity);
                self.dirty = true;
                Ok(())
            }
            _ => Err(Error::InvalidPopulateData {
                association: self.association.name().to_string(),
                reason: "expected a record or a single entity".to_string(),
            }),
        }
    }

    /// Whether this cell or its held entity has unsaved state.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.object.as_ref().is_some_and(|o| o.borrow().is_dirty())
    }

    /// Set or clear the cell's own dirty flag.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Delete the held entity through the target mapper, if one is held.
    pub fn delete(&mut self, orm: &Orm) -> Result<bool> {
        match self.loaded_object() {
            Some(object) => self.target_mapper(orm)?.delete(orm, &object),
            None => Ok(false),
        }
    }

    /// Forget the cached object and query; the next read re-fetches.
    pub fn clear_cached(&mut self) {
        self.loaded = false;
        self.load_required = true;
        self.object = None;
        self.query = None;
    }
}

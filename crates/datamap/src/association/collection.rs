//! Collection association data.

use datamap_core::{Association, AssociationKind, Error, Record, Result, Value};
use datamap_query::{Filter, Order, Query};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Populate, populate_object};
use crate::entity::{Entity, EntityRef};
use crate::mapper::Mapper;
use crate::orm::Orm;

/// Lazy cache cell for a has-many or many-to-many association.
///
/// Indexed access and size queries trigger a load first; loading an
/// already-loaded collection is a hard error — call
/// [`clear_cached`](Self::clear_cached) to re-fetch, so accidental
/// double-fetches surface instead of masking bugs.
pub struct AssociationCollection {
    association: Association,
    owner: Weak<RefCell<Entity>>,
    loaded: bool,
    load_required: bool,
    dirty: bool,
    objects: Vec<EntityRef>,
    query: Option<Query>,
}

impl AssociationCollection {
    pub(crate) fn new(association: Association, owner: Weak<RefCell<Entity>>) -> Self {
        AssociationCollection {
            association,
            owner,
            loaded: false,
            load_required: true,
            dirty: false,
            objects: Vec::new(),
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

    /// The collection's query, memoized; a fresh clone per call. Derived
    /// collections carry an amended copy instead.
    ///
    /// `None` when the owner has no key value yet.
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

    /// Fetch the associated objects now.
    ///
    /// Fails with [`Error::AlreadyLoaded`] when called on a loaded
    /// collection.
    pub fn load(&mut self, orm: &Orm) -> Result<()> {
        if self.loaded {
            return Err(Error::AlreadyLoaded(self.association.name().to_string()));
        }
        self.loaded = true;

        let mapper = self.target_mapper(orm)?;
        self.objects = match self.query.clone() {
            // An amended (derived-view) query takes precedence.
            Some(query) => mapper.fetch_all(orm, &query)?,
            None => {
                let owner = self.owner()?;
                mapper.lazy_load_many(orm, &self.association, &owner)?
            }
        };
        Ok(())
    }

    fn ensure_loaded(&mut self, orm: &Orm) -> Result<()> {
        if !self.loaded && self.load_required {
            self.load(orm)?;
        }
        Ok(())
    }

    /// The associated objects, lazy-loading on first access.
    pub fn objects(&mut self, orm: &Orm) -> Result<Vec<EntityRef>> {
        self.ensure_loaded(orm)?;
        Ok(self.objects.clone())
    }

    /// The held objects without triggering a load.
    #[must_use]
    pub fn loaded_objects(&self) -> &[EntityRef] {
        &self.objects
    }

    /// Replace the held objects directly, bypassing any query.
    pub fn set_objects(&mut self, objects: Vec<EntityRef>) {
        self.objects = objects;
        self.loaded = true;
        self.load_required = false;
    }

    /// Primary key values of the held objects.
    ///
    /// Requires the target mapper to declare a single-column primary key.
    pub fn object_ids(&mut self, orm: &Orm) -> Result<Vec<Value>> {
        let mapper = self.target_mapper(orm)?;
        let pk = mapper.adapter().primary_key().to_vec();
        if pk.is_empty() {
            return Err(Error::MissingPrimaryKey(
                self.association.target().to_string(),
            ));
        }
        if pk.len() > 1 {
            return Err(Error::adapter(
                "object ids require a single-column primary key",
            ));
        }

        self.ensure_loaded(orm)?;
        Ok(self
            .objects
            .iter()
            .filter_map(|o| o.borrow().key_values(&pk))
            .map(|mut values| values.remove(0))
            .collect())
    }

    /// Construct a new target entity from raw fields, stamp its foreign
    /// key and append it to the held set.
    pub fn build(&mut self, orm: &Orm, record: Record) -> Result<EntityRef> {
        let owner = self.owner()?;
        let object = self.target_mapper(orm)?.to_entity(orm, &record, true)?;
        object.borrow_mut().set_dirty(true);
        populate_object(orm, &self.association, &object, &owner)?;

        self.ensure_loaded(orm)?;
        self.objects.push(object.clone());
        self.dirty = true;
        Ok(object)
    }

    /// Build from raw fields and immediately persist through the target
    /// mapper.
    pub fn create(&mut self, orm: &Orm, record: Record) -> Result<bool> {
        let object = self.build(orm, record)?;
        self.target_mapper(orm)?.create(orm, &object)
    }

    /// Accept population data: raw records (built one by one), typed
    /// entities of the target type (replacing the held set), or — for
    /// many-to-many only — raw identifiers to associate by id. Anything
    /// else is a hard error.
    pub fn populate(&mut self, orm: &Orm, data: Populate) -> Result<()> {
        match data {
            Populate::Records(records) => {
                for record in records {
                    self.build(orm, record)?;
                }
                self.dirty = true;
                Ok(())
            }
            Populate::Entities(entities) => {
                for entity in &entities {
                    let actual = entity.borrow().entity_name().to_string();
                    if actual != self.association.target() {
                        return Err(Error::EntityTypeMismatch {
                            association: self.association.name().to_string(),
                            expected: self.association.target().to_string(),
                            actual,
                        });
                    }
                }
                self.set_objects(entities);
                self.dirty = true;
                Ok(())
            }
            Populate::Ids(ids) => {
                if self.association.kind() != AssociationKind::HasAndBelongsToMany {
                    return Err(Error::InvalidPopulateData {
                        association: self.association.name().to_string(),
                        reason: "raw identifiers are only valid for many-to-many".to_string(),
                    });
                }
                let mapper = self.target_mapper(orm)?;
                let def = orm.entity_def(self.association.target())?;
                let pk = mapper.adapter().primary_key().to_vec();
                let [pk] = pk.as_slice() else {
                    return Err(Error::MissingPrimaryKey(
                        self.association.target().to_string(),
                    ));
                };

                // Associate-by-id: key-only stubs, clean so no child save is
                // attempted; the lookup sync links them.
                let mut objects = Vec::with_capacity(ids.len());
                for id in ids {
                    let stub = Entity::new(def.clone());
                    stub.borrow_mut().set_stored(pk, id);
                    objects.push(stub);
                }
                self.set_objects(objects);
                self.dirty = true;
                Ok(())
            }
            _ => Err(Error::InvalidPopulateData {
                association: self.association.name().to_string(),
                reason: "expected records, entities or identifiers".to_string(),
            }),
        }
    }

    /// Whether this cell or any held entity has unsaved state.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.objects.iter().any(|o| o.borrow().is_dirty())
    }

    /// Set or clear the cell's own dirty flag.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Forget the cached objects; the next access re-fetches. An amended
    /// query (derived view) is kept.
    pub fn clear_cached(&mut self) {
        self.loaded = false;
        self.load_required = true;
        self.objects.clear();
    }

    // ------------------------------------------------------------------
    // Derived views (copy-on-filter)
    // ------------------------------------------------------------------

    fn derived(
        &mut self,
        orm: &Orm,
        amend: impl FnOnce(Query) -> Query,
    ) -> Result<AssociationCollection> {
        let query = self.query(orm)?.map(amend);
        Ok(AssociationCollection {
            association: self.association.clone(),
            owner: self.owner.clone(),
            loaded: false,
            load_required: true,
            dirty: false,
            objects: Vec::new(),
            query,
        })
    }

    /// A new collection over the same association limited to `n` objects.
    /// This collection's loaded state is untouched.
    pub fn limit(&mut self, orm: &Orm, n: u64) -> Result<AssociationCollection> {
        self.derived(orm, |q| q.limit(n))
    }

    /// A new collection over the same association with an extra ordering.
    pub fn order_by(&mut self, orm: &Orm, order: Order) -> Result<AssociationCollection> {
        self.derived(orm, |q| q.order(order))
    }

    /// A new collection over the same association with an extra filter.
    pub fn filter(&mut self, orm: &Orm, filter: Filter) -> Result<AssociationCollection> {
        self.derived(orm, |q| q.filter(filter))
    }

    // ------------------------------------------------------------------
    // Indexed access
    // ------------------------------------------------------------------

    /// Number of held objects, loading first if required.
    pub fn len(&mut self, orm: &Orm) -> Result<usize> {
        self.ensure_loaded(orm)?;
        Ok(self.objects.len())
    }

    /// Whether the collection is empty, loading first if required.
    pub fn is_empty(&mut self, orm: &Orm) -> Result<bool> {
        Ok(self.len(orm)? == 0)
    }

    /// The object at `index`, loading first if required.
    pub fn get(&mut self, orm: &Orm, index: usize) -> Result<Option<EntityRef>> {
        self.ensure_loaded(orm)?;
        Ok(self.objects.get(index).cloned())
    }

    /// Whether an object exists at `index`, loading first if required.
    pub fn exists(&mut self, orm: &Orm, index: usize) -> Result<bool> {
        self.ensure_loaded(orm)?;
        Ok(index < self.objects.len())
    }

    /// Replace the object at `index` (or append when `index` equals the
    /// current length).
    pub fn set_at(&mut self, orm: &Orm, index: usize, entity: EntityRef) -> Result<()> {
        self.ensure_loaded(orm)?;
        match index.cmp(&self.objects.len()) {
            std::cmp::Ordering::Less => self.objects[index] = entity,
            std::cmp::Ordering::Equal => self.objects.push(entity),
            std::cmp::Ordering::Greater => {
                return Err(Error::InvalidPopulateData {
                    association: self.association.name().to_string(),
                    reason: format!("index {index} out of bounds"),
                });
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Append an object to the held set.
    pub fn push(&mut self, orm: &Orm, entity: EntityRef) -> Result<()> {
        self.ensure_loaded(orm)?;
        self.objects.push(entity);
        self.dirty = true;
        Ok(())
    }

    /// Remove and return the object at `index`, loading first if required.
    pub fn remove(&mut self, orm: &Orm, index: usize) -> Result<Option<EntityRef>> {
        self.ensure_loaded(orm)?;
        if index < self.objects.len() {
            self.dirty = true;
            Ok(Some(self.objects.remove(index)))
        } else {
            Ok(None)
        }
    }
}

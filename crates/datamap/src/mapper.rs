//! Data mappers.
//!
//! A [`Mapper`] is the per-entity-type service converting between raw
//! records and entities and orchestrating create/update/save/delete with
//! plugin hooks, identity-map integration and cascading saves. The mapper
//! is adapter-agnostic: everything backend-specific goes through its
//! [`Adapter`].
//!
//! Everything here is synchronous and blocking, and nothing is atomic
//! across entities: a cascade that fails midway leaves earlier writes
//! committed. That is the contract, not an accident — the storage surface
//! has no transaction boundary.

use datamap_core::{Association, AssociationKind, EntityDef, Error, Key, Record, Result, Value};
use datamap_query::{Filter, Query};
use std::cell::RefCell;
use std::rc::Rc;

use crate::adapter::{Adapter, AssociationContext, derive_table_name, default_primary_key};
use crate::association;
use crate::entity::{self, Entity, EntityRef};
use crate::orm::Orm;
use crate::plugin::MapperPlugin;

/// Mapper-level options: storage naming, key handling and polymorphism.
#[derive(Debug, Clone)]
pub struct MapperOptions {
    /// Explicit table/collection name; derived from the entity name when
    /// unset.
    pub table_name: Option<String>,
    /// Explicit primary key column(s); `<entityName>ID` when unset. An
    /// explicit empty list declares a keyless mapping.
    pub primary_key: Option<Vec<String>>,
    /// Whether the backend should generate keys for new rows.
    pub auto_increment: bool,
    /// Field whose text value selects the concrete entity type on
    /// hydration (polymorphic rows).
    pub discriminator: Option<String>,
}

impl Default for MapperOptions {
    fn default() -> Self {
        MapperOptions {
            table_name: None,
            primary_key: None,
            auto_increment: true,
            discriminator: None,
        }
    }
}

impl MapperOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit table/collection name.
    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Set a single-column primary key.
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(vec![column.into()]);
        self
    }

    /// Set a compound primary key.
    #[must_use]
    pub fn compound_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Declare that this entity type has no primary key.
    #[must_use]
    pub fn no_primary_key(mut self) -> Self {
        self.primary_key = Some(Vec::new());
        self
    }

    /// Enable or disable generated keys.
    #[must_use]
    pub fn auto_increment(mut self, enabled: bool) -> Self {
        self.auto_increment = enabled;
        self
    }

    /// Set the polymorphic discriminator field.
    #[must_use]
    pub fn discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminator = Some(field.into());
        self
    }

    /// The effective table/collection name for `entity_name`.
    #[must_use]
    pub fn resolve_table_name(&self, entity_name: &str) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| derive_table_name(entity_name))
    }

    /// The effective primary key column(s) for `entity_name`.
    #[must_use]
    pub fn resolve_primary_key(&self, entity_name: &str) -> Vec<String> {
        self.primary_key
            .clone()
            .unwrap_or_else(|| vec![default_primary_key(entity_name)])
    }
}

enum PreHook {
    Save,
    Create,
    Update,
}

enum PostHook {
    Save,
    Create,
    Update,
}

/// Per-entity-type conversion and CRUD orchestration service.
pub struct Mapper {
    def: Rc<EntityDef>,
    adapter: Box<dyn Adapter>,
    plugins: RefCell<Vec<Rc<dyn MapperPlugin>>>,
    discriminator: Option<String>,
}

impl Mapper {
    /// Create a mapper for `def` backed by `adapter`.
    #[must_use]
    pub fn new(def: Rc<EntityDef>, adapter: Box<dyn Adapter>) -> Self {
        Mapper {
            def,
            adapter,
            plugins: RefCell::new(Vec::new()),
            discriminator: None,
        }
    }

    /// Enable polymorphic hydration through a discriminator field.
    #[must_use]
    pub fn with_discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminator = Some(field.into());
        self
    }

    /// The entity type name this mapper serves.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.def.name()
    }

    /// The entity definition.
    #[must_use]
    pub fn def(&self) -> &Rc<EntityDef> {
        &self.def
    }

    /// The storage adapter.
    #[must_use]
    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    /// Attach an instance-scoped plugin; its `init` hook runs immediately.
    pub fn register_plugin(&self, plugin: Rc<dyn MapperPlugin>) {
        plugin.init(self);
        self.plugins.borrow_mut().push(plugin);
    }

    fn all_plugins(&self, orm: &Orm) -> Vec<Rc<dyn MapperPlugin>> {
        let mut plugins = orm.global_plugins();
        plugins.extend(self.plugins.borrow().iter().cloned());
        plugins
    }

    fn run_pre(&self, orm: &Orm, entity: &EntityRef, hooks: &[PreHook]) -> bool {
        for hook in hooks {
            for plugin in self.all_plugins(orm) {
                let accepted = match hook {
                    PreHook::Save => plugin.pre_save(entity, self),
                    PreHook::Create => plugin.pre_create(entity, self),
                    PreHook::Update => plugin.pre_update(entity, self),
                };
                if !accepted {
                    return false;
                }
            }
        }
        true
    }

    fn run_post(&self, orm: &Orm, entity: &EntityRef, hooks: &[PostHook]) {
        for hook in hooks {
            for plugin in self.all_plugins(orm) {
                match hook {
                    PostHook::Save => plugin.post_save(entity, self),
                    PostHook::Create => plugin.post_create(entity, self),
                    PostHook::Update => plugin.post_update(entity, self),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------

    /// Convert a raw record into a hydrated entity.
    ///
    /// Resolves the concrete entity type (the mapper's own, or through the
    /// discriminator field), applies each declared field's type coercion,
    /// mass-assigns with `guard` semantics and resets the dirty flag.
    pub fn to_entity(&self, orm: &Orm, record: &Record, guard: bool) -> Result<EntityRef> {
        let def = self.resolve_def(orm, record)?;
        let coerced = self.coerce_record(orm, &def, record)?;
        let entity = Entity::new(def);
        entity::populate(&entity, orm, &coerced, guard)?;
        entity.borrow_mut().set_dirty(false);
        Ok(entity)
    }

    fn resolve_def(&self, orm: &Orm, record: &Record) -> Result<Rc<EntityDef>> {
        let Some(discriminator) = &self.discriminator else {
            return Ok(self.def.clone());
        };
        match record.get(discriminator) {
            Some(Value::Text(type_name)) => {
                orm.entity_def(type_name).map_err(|_| Error::EntityResolution {
                    mapper: self.entity_name().to_string(),
                    reason: format!(
                        "no entity definition registered for discriminator value '{type_name}'"
                    ),
                })
            }
            Some(other) => Err(Error::EntityResolution {
                mapper: self.entity_name().to_string(),
                reason: format!(
                    "discriminator field '{discriminator}' must be text, got {other}"
                ),
            }),
            None => Ok(self.def.clone()),
        }
    }

    fn coerce_record(&self, orm: &Orm, def: &Rc<EntityDef>, record: &Record) -> Result<Record> {
        let registry = orm.field_types();
        let mut coerced = Record::new();
        for (name, value) in record {
            match def.field(name) {
                Some(field) => coerced.set(
                    name,
                    field.field_type.hydrate(name, value.clone(), &registry)?,
                ),
                // Association payloads and undeclared columns pass through;
                // populate routes or skips them.
                None => coerced.set(name, value.clone()),
            }
        }
        Ok(coerced)
    }

    /// Convert an entity into a raw record for storage.
    ///
    /// Only set fields are emitted; `fields` restricts the output to a
    /// subset of declared fields.
    pub fn to_record(
        &self,
        orm: &Orm,
        entity: &EntityRef,
        fields: Option<&[&str]>,
    ) -> Result<Record> {
        let registry = orm.field_types();
        let entity = entity.borrow();
        let def = entity.def().clone();
        let mut record = Record::new();

        match fields {
            None => {
                for field in def.fields() {
                    if let Some(value) = entity.get(&field.name) {
                        record.set(
                            field.name.clone(),
                            field
                                .field_type
                                .dehydrate(&field.name, value.clone(), &registry)?,
                        );
                    }
                }
            }
            Some(subset) => {
                for name in subset {
                    let field = def.field(name).ok_or_else(|| Error::UnknownField {
                        entity: def.name().to_string(),
                        field: (*name).to_string(),
                    })?;
                    if let Some(value) = entity.get(name) {
                        record.set(
                            field.name.clone(),
                            field
                                .field_type
                                .dehydrate(&field.name, value.clone(), &registry)?,
                        );
                    }
                }
            }
        }

        Ok(record)
    }

    /// Convert an adapter result row into an entity, going through the
    /// identity map: a row whose key is already cached returns the cached
    /// instance instead of re-instantiating.
    pub fn hydrate(&self, orm: &Orm, record: &Record) -> Result<EntityRef> {
        let Some(key) = self.record_key(orm, record)? else {
            return self.to_entity(orm, record, false);
        };
        if let Some(cached) = orm.identity().get(self.entity_name(), &key) {
            tracing::trace!(entity = self.entity_name(), "identity map hit");
            return Ok(cached);
        }
        let entity = self.to_entity(orm, record, false)?;
        orm.identity().store(self.entity_name(), key, entity.clone());
        Ok(entity)
    }

    fn record_key(&self, orm: &Orm, record: &Record) -> Result<Option<Key>> {
        let pk = self.adapter.primary_key();
        if pk.is_empty() {
            return Ok(None);
        }
        let registry = orm.field_types();
        let mut parts = Vec::with_capacity(pk.len());
        for column in pk {
            match record.get(column) {
                Some(value) if !value.is_null() => {
                    let value = match self.def.field(column) {
                        Some(field) => {
                            field.field_type.hydrate(column, value.clone(), &registry)?
                        }
                        None => value.clone(),
                    };
                    parts.push(value);
                }
                _ => return Ok(None),
            }
        }
        Ok(Key::composite(parts).ok())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Look up an entity by primary key.
    ///
    /// Checks the identity map first; a miss goes to the adapter, hydrates
    /// and caches. `None` means no such row — absence is not an error.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = self.entity_name()))]
    pub fn find(&self, orm: &Orm, id: impl Into<Value>) -> Result<Option<EntityRef>> {
        let id = self.coerce_id(orm, id.into())?;

        if let Ok(key) = Key::new(id.clone()) {
            if let Some(cached) = orm.identity().get(self.entity_name(), &key) {
                tracing::debug!("find served from identity map");
                return Ok(Some(cached));
            }
        }

        match self.adapter.find(&id)? {
            Some(record) => Ok(Some(self.hydrate(orm, &record)?)),
            None => Ok(None),
        }
    }

    fn coerce_id(&self, orm: &Orm, id: Value) -> Result<Value> {
        match self.adapter.primary_key().first().and_then(|c| self.def.field(c)) {
            Some(field) => field
                .field_type
                .hydrate(&field.name, id, &orm.field_types()),
            None => Ok(id),
        }
    }

    /// Execute a query and hydrate the first result, if any.
    pub fn fetch_one(&self, orm: &Orm, query: &Query) -> Result<Option<EntityRef>> {
        match self.adapter.fetch_one(query)? {
            Some(record) => Ok(Some(self.hydrate(orm, &record)?)),
            None => Ok(None),
        }
    }

    /// Execute a query and hydrate every result; empty on no matches.
    pub fn fetch_all(&self, orm: &Orm, query: &Query) -> Result<Vec<EntityRef>> {
        self.adapter
            .fetch_all(query)?
            .iter()
            .map(|record| self.hydrate(orm, record))
            .collect()
    }

    /// A base query over this mapper's table, with plugin query hooks
    /// applied.
    pub fn query(&self, orm: &Orm) -> Query {
        let mut query = self.adapter.query();
        for plugin in self.all_plugins(orm) {
            plugin.query(&mut query, self);
        }
        query
    }

    /// Number of rows matching `query`.
    pub fn count(&self, query: &Query) -> Result<u64> {
        self.adapter.count(query)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Whether the entity has not been stored yet (no primary key value).
    #[must_use]
    pub fn is_new(&self, entity: &EntityRef) -> bool {
        let pk = self.adapter.primary_key();
        pk.is_empty() || entity.borrow().key_values(pk).is_none()
    }

    /// Insert a new entity, with hooks and cascading saves.
    ///
    /// A `pre_save`/`pre_create` hook returning `false` aborts and reports
    /// `Ok(false)`. A generated primary key is written back onto the
    /// entity.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = self.entity_name()))]
    pub fn create(&self, orm: &Orm, entity: &EntityRef) -> Result<bool> {
        if !self.run_pre(orm, entity, &[PreHook::Save, PreHook::Create]) {
            tracing::debug!("create rejected by plugin hook");
            return Ok(false);
        }

        let record = self.to_record(orm, entity, None)?;
        let generated = self.adapter.insert(record)?;
        if let Some(id) = generated {
            if let [pk] = self.adapter.primary_key() {
                tracing::debug!(key = %id, "generated primary key");
                entity.borrow_mut().set_stored(pk, id);
            }
        }

        self.save_associated(orm, entity)?;
        entity.borrow_mut().set_dirty(false);
        self.run_post(orm, entity, &[PostHook::Create, PostHook::Save]);
        Ok(true)
    }

    /// Update a stored entity, with hooks and cascading saves.
    ///
    /// `fields` restricts which declared fields are sent to storage.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = self.entity_name()))]
    pub fn update(&self, orm: &Orm, entity: &EntityRef, fields: Option<&[&str]>) -> Result<bool> {
        if !self.run_pre(orm, entity, &[PreHook::Save, PreHook::Update]) {
            tracing::debug!("update rejected by plugin hook");
            return Ok(false);
        }

        let identity = self.identity_filters(entity)?;
        let record = self.to_record(orm, entity, fields)?;
        if !self.adapter.update(record, &identity)? {
            return Ok(false);
        }

        self.save_associated(orm, entity)?;
        entity.borrow_mut().set_dirty(false);
        self.run_post(orm, entity, &[PostHook::Save, PostHook::Update]);
        Ok(true)
    }

    /// Create or update based on whether the entity already has a primary
    /// key value.
    pub fn save(&self, orm: &Orm, entity: &EntityRef) -> Result<bool> {
        if self.is_new(entity) {
            self.create(orm, entity)
        } else {
            self.update(orm, entity, None)
        }
    }

    /// Delete a stored entity.
    ///
    /// Delete hooks are advisory and cannot abort; the adapter delete runs
    /// regardless of them.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = self.entity_name()))]
    pub fn delete(&self, orm: &Orm, entity: &EntityRef) -> Result<bool> {
        for plugin in self.all_plugins(orm) {
            plugin.pre_delete(entity, self);
        }

        let identity = self.identity_filters(entity)?;
        let deleted = self.adapter.delete(&identity)?;

        for plugin in self.all_plugins(orm) {
            plugin.post_delete(entity, self);
        }
        Ok(deleted)
    }

    fn identity_filters(&self, entity: &EntityRef) -> Result<Vec<Filter>> {
        let pk = self.adapter.primary_key();
        if pk.is_empty() {
            return Err(Error::MissingPrimaryKey(self.entity_name().to_string()));
        }
        let values = entity.borrow().key_values(pk).ok_or_else(|| {
            Error::adapter(format!(
                "cannot address '{}' rows without a primary key value",
                self.entity_name()
            ))
        })?;
        Ok(pk
            .iter()
            .zip(values)
            .map(|(column, value)| Filter::eq(column, value))
            .collect())
    }

    // ------------------------------------------------------------------
    // Associations
    // ------------------------------------------------------------------

    /// Build the association-scoped query for `association` against the
    /// live `owner`. Called on the *target* entity's mapper.
    ///
    /// `None` means a required key value on the owner is unset — nothing to
    /// load, not an error.
    pub fn build_association_query(
        &self,
        orm: &Orm,
        association: &Association,
        owner: &EntityRef,
    ) -> Result<Option<Query>> {
        let ctx = association_context(orm, association)?;
        let base = self.query(orm);
        let owner = owner.borrow();
        self.adapter
            .populate_query_for_association(base, association, &owner, &ctx)
    }

    /// Lazy-load entry point for single-entity associations.
    pub fn lazy_load_one(
        &self,
        orm: &Orm,
        association: &Association,
        owner: &EntityRef,
    ) -> Result<Option<EntityRef>> {
        tracing::debug!(
            association = association.name(),
            target = self.entity_name(),
            "lazy loading association object"
        );
        match self.build_association_query(orm, association, owner)? {
            Some(query) => self.fetch_one(orm, &query),
            None => Ok(None),
        }
    }

    /// Lazy-load entry point for collection associations.
    pub fn lazy_load_many(
        &self,
        orm: &Orm,
        association: &Association,
        owner: &EntityRef,
    ) -> Result<Vec<EntityRef>> {
        tracing::debug!(
            association = association.name(),
            target = self.entity_name(),
            "lazy loading association collection"
        );
        match self.build_association_query(orm, association, owner)? {
            Some(query) => self.fetch_all(orm, &query),
            None => Ok(Vec::new()),
        }
    }

    /// Save nested association data after the owning entity's own write.
    ///
    /// Every dirty slot must belong to an association with nested
    /// assignment enabled; a dirty slot without it is a fatal configuration
    /// error raised before anything nested is written.
    fn save_associated(&self, orm: &Orm, entity: &EntityRef) -> Result<()> {
        let associations: Vec<Association> = entity.borrow().def().associations().to_vec();

        for association in &associations {
            match association.kind() {
                AssociationKind::BelongsTo | AssociationKind::HasOne => {
                    self.save_associated_single(orm, entity, association)?;
                }
                AssociationKind::HasMany => {
                    self.save_associated_many(orm, entity, association)?;
                }
                AssociationKind::HasAndBelongsToMany => {
                    self.save_associated_lookup(orm, entity, association)?;
                }
            }
        }
        Ok(())
    }

    fn save_associated_single(
        &self,
        orm: &Orm,
        entity: &EntityRef,
        association: &Association,
    ) -> Result<()> {
        let Some(slot) = entity.borrow().single_slot(association.name()) else {
            return Ok(());
        };
        let (dirty, object) = {
            let data = slot.borrow();
            (data.is_dirty(), data.loaded_object())
        };
        if !dirty {
            return Ok(());
        }
        if !association.allows_nested_assignment() {
            return Err(Error::NestedAssignmentNotAllowed(
                association.name().to_string(),
            ));
        }

        if let Some(object) = object {
            if object.borrow().is_dirty() {
                association::populate_object(orm, association, &object, entity)?;
                orm.mapper(association.target())?.save(orm, &object)?;
                if association.kind() == AssociationKind::BelongsTo {
                    // The owner-side foreign key can only be stamped once the
                    // child has a primary key, which a fresh child gains
                    // during its save.
                    association::populate_object(orm, association, &object, entity)?;
                }
            }
        }
        slot.borrow_mut().set_dirty(false);
        Ok(())
    }

    fn save_associated_many(
        &self,
        orm: &Orm,
        entity: &EntityRef,
        association: &Association,
    ) -> Result<()> {
        let Some(slot) = entity.borrow().collection_slot(association.name()) else {
            return Ok(());
        };
        let (dirty, objects) = {
            let collection = slot.borrow();
            (collection.is_dirty(), collection.loaded_objects().to_vec())
        };
        if !dirty {
            return Ok(());
        }
        if !association.allows_nested_assignment() {
            return Err(Error::NestedAssignmentNotAllowed(
                association.name().to_string(),
            ));
        }

        let target = orm.mapper(association.target())?;
        for object in &objects {
            if object.borrow().is_dirty() {
                association::populate_object(orm, association, object, entity)?;
                target.save(orm, object)?;
            }
        }

        // Sweep rows removed from the in-memory set, keyed by the entities
        // just processed.
        let target_pk = target.adapter().primary_key().to_vec();
        if target_pk.len() == 1 {
            let kept: Vec<Value> = objects
                .iter()
                .filter_map(|o| o.borrow().key_values(&target_pk))
                .map(|mut values| values.remove(0))
                .collect();
            if !kept.is_empty() {
                let ctx = association_context(orm, association)?;
                let owner = entity.borrow();
                target
                    .adapter()
                    .delete_absent_children(&owner, &kept, association, &ctx)?;
            }
        }

        slot.borrow_mut().set_dirty(false);
        Ok(())
    }

    fn save_associated_lookup(
        &self,
        orm: &Orm,
        entity: &EntityRef,
        association: &Association,
    ) -> Result<()> {
        let Some(slot) = entity.borrow().collection_slot(association.name()) else {
            return Ok(());
        };
        let (dirty, objects) = {
            let collection = slot.borrow();
            (collection.is_dirty(), collection.loaded_objects().to_vec())
        };
        if !dirty {
            return Ok(());
        }
        if !association.allows_nested_assignment() {
            return Err(Error::NestedAssignmentNotAllowed(
                association.name().to_string(),
            ));
        }

        let target = orm.mapper(association.target())?;
        for object in &objects {
            if object.borrow().is_dirty() {
                association::populate_object(orm, association, object, entity)?;
                target.save(orm, object)?;
            }
        }

        let target_pk = target.adapter().primary_key().to_vec();
        let keys: Vec<Value> = objects
            .iter()
            .filter_map(|o| o.borrow().key_values(&target_pk))
            .filter(|values| values.len() == 1)
            .map(|mut values| values.remove(0))
            .collect();

        let ctx = association_context(orm, association)?;
        {
            let owner = entity.borrow();
            self.adapter
                .sync_lookup_entries(&owner, &keys, association, &ctx)?;
        }

        slot.borrow_mut().set_dirty(false);
        Ok(())
    }
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("entity", &self.def.name())
            .field("table", &self.adapter.table_name())
            .finish_non_exhaustive()
    }
}

/// Resolve both ends of an association into table/key facts for the
/// adapter.
pub(crate) fn association_context(
    orm: &Orm,
    association: &Association,
) -> Result<AssociationContext> {
    let owner_mapper = orm.mapper(association.owner())?;
    let target_mapper = orm.mapper(association.target())?;
    Ok(AssociationContext {
        owner_table: owner_mapper.adapter().table_name().to_string(),
        owner_primary_key: owner_mapper.adapter().primary_key().to_vec(),
        target_table: target_mapper.adapter().table_name().to_string(),
        target_primary_key: target_mapper.adapter().primary_key().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_resolution_defaults() {
        let options = MapperOptions::default();
        assert_eq!(options.resolve_table_name("User"), "users");
        assert_eq!(options.resolve_primary_key("User"), vec!["userID"]);
        assert!(options.auto_increment);
    }

    #[test]
    fn test_options_overrides() {
        let options = MapperOptions::new()
            .table_name("people")
            .primary_key("id")
            .auto_increment(false);
        assert_eq!(options.resolve_table_name("User"), "people");
        assert_eq!(options.resolve_primary_key("User"), vec!["id"]);
        assert!(!options.auto_increment);
    }

    #[test]
    fn test_keyless_options() {
        let options = MapperOptions::new().no_primary_key();
        assert!(options.resolve_primary_key("User").is_empty());
    }
}

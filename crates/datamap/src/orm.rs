//! The ORM context.
//!
//! [`Orm`] replaces the usual static mapper registry and global plugin list
//! with an explicit, constructed object passed by reference to every
//! operation. There is no hidden global state: per-request or per-test
//! isolation is a fresh `Orm`.
//!
//! The context is deliberately single-threaded (`Rc`/`RefCell`, no locks):
//! one `Orm` belongs to one logical thread, matching the synchronous
//! blocking call model of the whole engine. Concurrent use requires one
//! `Orm` per thread.

use datamap_core::{EntityDef, Error, FieldCodec, FieldTypeRegistry, Result};
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::identity::IdentityMap;
use crate::mapper::Mapper;
use crate::plugin::MapperPlugin;

/// Registry of entity definitions and mappers, identity map and global
/// plugin list, bundled into one explicitly passed context.
#[derive(Default)]
pub struct Orm {
    defs: RefCell<HashMap<String, Rc<EntityDef>>>,
    mappers: RefCell<HashMap<String, Rc<Mapper>>>,
    identity: IdentityMap,
    field_types: RefCell<FieldTypeRegistry>,
    global_plugins: RefCell<Vec<Rc<dyn MapperPlugin>>>,
}

impl Orm {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity definition.
    ///
    /// Registering a second definition under the same name is a
    /// configuration error.
    pub fn register_def(&self, def: EntityDef) -> Result<Rc<EntityDef>> {
        let def = Rc::new(def);
        self.insert_def(def.clone())?;
        Ok(def)
    }

    fn insert_def(&self, def: Rc<EntityDef>) -> Result<()> {
        let mut defs = self.defs.borrow_mut();
        if defs.contains_key(def.name()) {
            return Err(Error::DuplicateMapper(def.name().to_string()));
        }
        defs.insert(def.name().to_string(), def);
        Ok(())
    }

    /// Look up an entity definition by type name.
    pub fn entity_def(&self, name: &str) -> Result<Rc<EntityDef>> {
        self.defs
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntityDef(name.to_string()))
    }

    /// Register a mapper, keyed by its entity type name.
    ///
    /// The mapper's entity definition is registered alongside it when not
    /// already present. Registering a second mapper for the same entity
    /// type is a configuration error.
    pub fn register_mapper(&self, mapper: Mapper) -> Result<Rc<Mapper>> {
        let name = mapper.entity_name().to_string();
        {
            let mappers = self.mappers.borrow();
            if mappers.contains_key(&name) {
                return Err(Error::DuplicateMapper(name));
            }
        }
        if !self.defs.borrow().contains_key(&name) {
            self.insert_def(mapper.def().clone())?;
        }

        let mapper = Rc::new(mapper);
        self.mappers.borrow_mut().insert(name, mapper.clone());
        Ok(mapper)
    }

    /// The mapper for an entity type name.
    ///
    /// An unregistered mapper is a configuration error — absence of wiring,
    /// not absence of data.
    pub fn mapper(&self, entity_name: &str) -> Result<Rc<Mapper>> {
        self.mappers
            .borrow()
            .get(entity_name)
            .cloned()
            .ok_or_else(|| Error::UnregisteredMapper(entity_name.to_string()))
    }

    /// Whether a mapper is registered for this entity type.
    #[must_use]
    pub fn has_mapper(&self, entity_name: &str) -> bool {
        self.mappers.borrow().contains_key(entity_name)
    }

    /// The identity map.
    #[must_use]
    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    /// Register a custom field type codec under `name`.
    pub fn register_field_type(&self, name: &'static str, codec: Box<dyn FieldCodec>) -> Result<()> {
        self.field_types.borrow_mut().register(name, codec)
    }

    /// The custom field type registry.
    #[must_use]
    pub fn field_types(&self) -> Ref<'_, FieldTypeRegistry> {
        self.field_types.borrow()
    }

    /// Register a plugin applied to every mapper.
    pub fn register_global_plugin(&self, plugin: Rc<dyn MapperPlugin>) {
        self.global_plugins.borrow_mut().push(plugin);
    }

    /// Snapshot of the global plugin list.
    #[must_use]
    pub fn global_plugins(&self) -> Vec<Rc<dyn MapperPlugin>> {
        self.global_plugins.borrow().clone()
    }
}

impl std::fmt::Debug for Orm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm")
            .field("defs", &self.defs.borrow().keys().collect::<Vec<_>>())
            .field("mappers", &self.mappers.borrow().keys().collect::<Vec<_>>())
            .field("cached_entities", &self.identity.len())
            .finish()
    }
}

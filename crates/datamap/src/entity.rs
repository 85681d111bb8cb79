//! Runtime entity instances.
//!
//! An [`Entity`] is a property bag over a declared [`EntityDef`]: a map of
//! field name to typed [`Value`], a dirty flag, and lazily created
//! association slots. Entities are handled as [`EntityRef`]
//! (`Rc<RefCell<Entity>>`) so the identity map can guarantee one shared
//! instance per (type, primary key) and association data can hold a
//! non-owning back-reference to its owner.
//!
//! Field access is explicit (`get`/`set`); association access is explicit
//! too ([`single`]/[`collection`]) rather than going through property
//! interception.

use datamap_core::{
    AssociationKind, EntityDef, Error, Key, Record, Result, Value,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::association::data::AssociationData;
use crate::association::collection::AssociationCollection;
use crate::association::Populate;
use crate::orm::Orm;

/// Shared handle to an entity instance.
pub type EntityRef = Rc<RefCell<Entity>>;

/// An in-memory domain object: typed field values plus association slots.
pub struct Entity {
    def: Rc<EntityDef>,
    values: BTreeMap<String, Value>,
    dirty: bool,
    singles: BTreeMap<String, Rc<RefCell<AssociationData>>>,
    collections: BTreeMap<String, Rc<RefCell<AssociationCollection>>>,
}

impl Entity {
    /// Create an empty, clean entity of the given type.
    pub fn new(def: Rc<EntityDef>) -> EntityRef {
        Rc::new(RefCell::new(Entity {
            def,
            values: BTreeMap::new(),
            dirty: false,
            singles: BTreeMap::new(),
            collections: BTreeMap::new(),
        }))
    }

    /// The entity's schema.
    #[must_use]
    pub fn def(&self) -> &Rc<EntityDef> {
        &self.def
    }

    /// The entity type name.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.def.name()
    }

    /// Read a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Read a field value, treating an unset field as `Null`.
    #[must_use]
    pub fn get_or_null(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Write a field value, flipping the dirty flag.
    ///
    /// Writing an undeclared field is a configuration error.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        if !self.def.has_field(field) {
            return Err(Error::UnknownField {
                entity: self.def.name().to_string(),
                field: field.to_string(),
            });
        }
        self.values.insert(field.to_string(), value.into());
        self.dirty = true;
        Ok(())
    }

    /// Write a field value without touching the dirty flag.
    ///
    /// Used when reflecting storage state back onto the entity (hydration,
    /// generated primary keys): the value is *from* storage, so it does not
    /// make the entity diverge from it.
    pub(crate) fn set_stored(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }

    /// Whether in-memory state has diverged from last-known storage state.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Set or clear the dirty flag.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Values of the given key columns, or `None` when any is unset/null.
    #[must_use]
    pub fn key_values(&self, columns: &[String]) -> Option<Vec<Value>> {
        if columns.is_empty() {
            return None;
        }
        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            match self.values.get(column.as_str()) {
                Some(v) if !v.is_null() => values.push(v.clone()),
                _ => return None,
            }
        }
        Some(values)
    }

    /// Identity key over the given key columns, if all are set.
    #[must_use]
    pub fn identity_key(&self, columns: &[String]) -> Option<Key> {
        let values = self.key_values(columns)?;
        Key::composite(values).ok()
    }

    pub(crate) fn single_slot(&self, name: &str) -> Option<Rc<RefCell<AssociationData>>> {
        self.singles.get(name).cloned()
    }

    pub(crate) fn collection_slot(&self, name: &str) -> Option<Rc<RefCell<AssociationCollection>>> {
        self.collections.get(name).cloned()
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.def.name())
            .field("values", &self.values)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Access the single-entity association slot `name` on `owner`, creating it
/// on first access.
///
/// Fails when the association is undeclared or resolves to a collection.
pub fn single(owner: &EntityRef, name: &str) -> Result<Rc<RefCell<AssociationData>>> {
    if let Some(slot) = owner.borrow().single_slot(name) {
        return Ok(slot);
    }

    let association = {
        let entity = owner.borrow();
        let association = entity.def.association(name).cloned().ok_or_else(|| {
            Error::UnknownAssociation {
                entity: entity.def.name().to_string(),
                association: name.to_string(),
            }
        })?;
        if association.kind().is_collection() {
            return Err(Error::AssociationKindMismatch {
                association: name.to_string(),
                expected: "a single-entity association",
                actual: "a collection",
            });
        }
        association
    };

    let slot = Rc::new(RefCell::new(AssociationData::new(
        association,
        Rc::downgrade(owner),
    )));
    owner
        .borrow_mut()
        .singles
        .insert(name.to_string(), slot.clone());
    Ok(slot)
}

/// Access the collection association slot `name` on `owner`, creating it on
/// first access.
///
/// Fails when the association is undeclared or resolves to a single entity.
pub fn collection(owner: &EntityRef, name: &str) -> Result<Rc<RefCell<AssociationCollection>>> {
    if let Some(slot) = owner.borrow().collection_slot(name) {
        return Ok(slot);
    }

    let association = {
        let entity = owner.borrow();
        let association = entity.def.association(name).cloned().ok_or_else(|| {
            Error::UnknownAssociation {
                entity: entity.def.name().to_string(),
                association: name.to_string(),
            }
        })?;
        if !association.kind().is_collection() {
            return Err(Error::AssociationKindMismatch {
                association: name.to_string(),
                expected: "a collection association",
                actual: "a single entity",
            });
        }
        association
    };

    let slot = Rc::new(RefCell::new(AssociationCollection::new(
        association,
        Rc::downgrade(owner),
    )));
    owner
        .borrow_mut()
        .collections
        .insert(name.to_string(), slot.clone());
    Ok(slot)
}

/// Mass-assign a record onto `owner`.
///
/// Plain fields are written through [`Entity::set`]. Keys naming a declared
/// association route into the association slot; with `guard` set, an
/// association that does not allow nested assignment is rejected before any
/// value is written to it. Undeclared keys are an error under `guard`
/// (mass-assignment of an unknown field is a programming mistake) and are
/// skipped otherwise, since storage rows may carry columns the schema does
/// not declare.
pub fn populate(owner: &EntityRef, orm: &Orm, record: &Record, guard: bool) -> Result<()> {
    // Plain fields first, in one borrow.
    {
        let mut entity = owner.borrow_mut();
        for (name, value) in record {
            if entity.def.has_field(name) {
                let name = name.to_string();
                entity.values.insert(name, value.clone());
                entity.dirty = true;
            }
        }
    }

    // Then associations, with the owner borrow released so slot population
    // can read back through it.
    for (name, value) in record {
        let association = {
            let entity = owner.borrow();
            match entity.def.association(name) {
                Some(a) => a.clone(),
                None => {
                    if !entity.def.has_field(name) {
                        if guard {
                            return Err(Error::UnknownField {
                                entity: entity.def.name().to_string(),
                                field: name.to_string(),
                            });
                        }
                        tracing::trace!(field = name, "skipping undeclared storage column");
                    }
                    continue;
                }
            }
        };

        if guard && !association.allows_nested_assignment() {
            return Err(Error::GuardedField(name.to_string()));
        }
        if value.is_null() {
            continue;
        }

        let data = populate_payload(&association, name, value)?;
        if association.kind().is_collection() {
            collection(owner, name)?.borrow_mut().populate(orm, data)?;
        } else {
            single(owner, name)?.borrow_mut().populate(orm, data)?;
        }
    }

    Ok(())
}

/// Interpret a mass-assigned JSON value as association population data.
fn populate_payload(
    association: &datamap_core::Association,
    name: &str,
    value: &Value,
) -> Result<Populate> {
    let invalid = |reason: &str| Error::InvalidPopulateData {
        association: name.to_string(),
        reason: reason.to_string(),
    };

    let Value::Json(json) = value else {
        return Err(invalid("expected structured data"));
    };

    if association.kind().is_collection() {
        let serde_json::Value::Array(items) = json else {
            return Err(invalid("expected an array"));
        };
        if items.iter().all(serde_json::Value::is_object) {
            let records = items.iter().map(json_to_record).collect();
            Ok(Populate::Records(records))
        } else if items.iter().all(|i| !i.is_object() && !i.is_array()) {
            if association.kind() == AssociationKind::HasAndBelongsToMany {
                Ok(Populate::Ids(items.iter().map(json_to_value).collect()))
            } else {
                Err(invalid("raw identifiers are only valid for many-to-many"))
            }
        } else {
            Err(invalid("expected an array of objects or of identifiers"))
        }
    } else {
        match json {
            serde_json::Value::Object(_) => Ok(Populate::Record(json_to_record(json))),
            _ => Err(invalid("expected an object")),
        }
    }
}

/// Convert one level of a JSON object into a [`Record`]; nested structures
/// stay as `Value::Json` (the `serialized` field type or nested association
/// data picks them up).
#[must_use]
pub fn json_to_record(json: &serde_json::Value) -> Record {
    let mut record = Record::new();
    if let serde_json::Value::Object(map) = json {
        for (k, v) in map {
            record.set(k.clone(), json_to_value(v));
        }
    }
    record
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN)), Value::Int),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        nested => Value::Json(nested.clone()),
    }
}

//! Entity state snapshots.
//!
//! A [`EntitySnapshot`] is an explicit transfer object capturing an entity's
//! field values, dirty flag and any loaded association data as a tagged
//! tree — including unsaved nested entities, which plain storage records
//! cannot carry. Snapshots replace language-level serialization hooks:
//! taking one never triggers lazy loads, and restoring one rebuilds the
//! entity and its association slots through the registered definitions.

use datamap_core::{Error, Record, Result};
use serde::{Deserialize, Serialize};

use crate::entity::{self, Entity, EntityRef};
use crate::orm::Orm;

/// Captured state of one entity and its loaded association data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity type name, used to resolve the definition on restore.
    pub entity_type: String,
    /// Field values.
    pub fields: Record,
    /// Whether the entity had unsaved changes.
    pub dirty: bool,
    /// Loaded association data, one entry per populated slot.
    pub associations: Vec<AssociationSnapshot>,
}

/// Captured state of one association slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationSnapshot {
    /// Association shortname.
    pub name: String,
    /// Whether the slot itself was flagged dirty.
    pub dirty: bool,
    /// Held entities: at most one for single-entity associations.
    pub objects: Vec<EntitySnapshot>,
}

/// Capture `entity` and its loaded association data recursively.
///
/// Unloaded slots are skipped — taking a snapshot never queries storage.
#[must_use]
pub fn take(entity: &EntityRef) -> EntitySnapshot {
    let entity = entity.borrow();
    let mut fields = Record::new();
    for field in entity.def().fields() {
        if let Some(value) = entity.get(&field.name) {
            fields.set(field.name.clone(), value.clone());
        }
    }

    let mut associations = Vec::new();
    for association in entity.def().associations() {
        if association.kind().is_collection() {
            if let Some(slot) = entity.collection_slot(association.name()) {
                let slot = slot.borrow();
                let objects: Vec<EntitySnapshot> =
                    slot.loaded_objects().iter().map(take).collect();
                if !objects.is_empty() || slot.is_dirty() {
                    associations.push(AssociationSnapshot {
                        name: association.name().to_string(),
                        dirty: slot.is_dirty(),
                        objects,
                    });
                }
            }
        } else if let Some(slot) = entity.single_slot(association.name()) {
            let slot = slot.borrow();
            let objects: Vec<EntitySnapshot> =
                slot.loaded_object().iter().map(take).collect();
            if !objects.is_empty() || slot.is_dirty() {
                associations.push(AssociationSnapshot {
                    name: association.name().to_string(),
                    dirty: slot.is_dirty(),
                    objects,
                });
            }
        }
    }

    EntitySnapshot {
        entity_type: entity.entity_name().to_string(),
        fields,
        dirty: entity.is_dirty(),
        associations,
    }
}

/// Rebuild an entity (and its captured association data) from a snapshot.
///
/// Entity types are resolved through the context's definition registry;
/// an unregistered type is a configuration error.
pub fn restore(orm: &Orm, snapshot: &EntitySnapshot) -> Result<EntityRef> {
    let def = orm.entity_def(&snapshot.entity_type)?;
    let restored = Entity::new(def.clone());

    {
        let mut target = restored.borrow_mut();
        for (name, value) in &snapshot.fields {
            target.set_stored(name, value.clone());
        }
        target.set_dirty(snapshot.dirty);
    }

    for association in &snapshot.associations {
        let descriptor = def.association(&association.name).ok_or_else(|| {
            Error::UnknownAssociation {
                entity: snapshot.entity_type.clone(),
                association: association.name.clone(),
            }
        })?;

        if descriptor.kind().is_collection() {
            let mut objects = Vec::with_capacity(association.objects.len());
            for nested in &association.objects {
                objects.push(restore(orm, nested)?);
            }
            let slot = entity::collection(&restored, &association.name)?;
            let mut slot = slot.borrow_mut();
            slot.set_objects(objects);
            slot.set_dirty(association.dirty);
        } else {
            let slot = entity::single(&restored, &association.name)?;
            let mut slot = slot.borrow_mut();
            if let Some(nested) = association.objects.first() {
                slot.set_object(restore(orm, nested)?);
            }
            slot.set_dirty(association.dirty);
        }
    }

    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TableAdapter;
    use crate::adapter::table::TableStore;
    use crate::mapper::{Mapper, MapperOptions};
    use datamap_core::{AssociationOptions, EntityDef, FieldType, Value};
    use std::rc::Rc;

    fn orm() -> Orm {
        let orm = Orm::new();
        let store = Rc::new(TableStore::new());

        let user = EntityDef::new("User")
            .field("userID", FieldType::Integer)
            .field("name", FieldType::Text)
            .has_many(
                "addresses",
                "Address",
                AssociationOptions::new()
                    .foreign_key("userID")
                    .allow_nested_assignment(true),
            )
            .build()
            .unwrap();
        let address = EntityDef::new("Address")
            .field("addressID", FieldType::Integer)
            .field("userID", FieldType::Integer)
            .field("city", FieldType::Text)
            .build()
            .unwrap();

        for def in [user, address] {
            let name = def.name().to_string();
            let def = orm.register_def(def).unwrap();
            let options = MapperOptions::default();
            let adapter = TableAdapter::new(store.clone(), &name, &options);
            orm.register_mapper(Mapper::new(def, Box::new(adapter))).unwrap();
        }
        orm
    }

    #[test]
    fn test_snapshot_captures_unsaved_nested_state() {
        let orm = orm();
        let user = Entity::new(orm.entity_def("User").unwrap());
        user.borrow_mut().set("name", "Alice").unwrap();

        let addresses = entity::collection(&user, "addresses").unwrap();
        addresses
            .borrow_mut()
            .populate(
                &orm,
                crate::association::Populate::Records(vec![
                    Record::new().with("city", "London"),
                ]),
            )
            .unwrap();

        let snapshot = take(&user);
        assert_eq!(snapshot.entity_type, "User");
        assert!(snapshot.dirty);
        assert_eq!(snapshot.associations.len(), 1);
        assert_eq!(snapshot.associations[0].objects.len(), 1);
        assert!(snapshot.associations[0].dirty);

        // The tagged tree survives a serde round trip.
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: EntitySnapshot = serde_json::from_str(&json).unwrap();

        let restored = restore(&orm, &decoded).unwrap();
        assert_eq!(
            restored.borrow().get("name"),
            Some(&Value::Text("Alice".to_string()))
        );
        assert!(restored.borrow().is_dirty());

        let restored_addresses = entity::collection(&restored, "addresses").unwrap();
        let held = restored_addresses.borrow().loaded_objects().to_vec();
        assert_eq!(held.len(), 1);
        assert_eq!(
            held[0].borrow().get("city"),
            Some(&Value::Text("London".to_string()))
        );
        assert!(held[0].borrow().is_dirty());
    }

    #[test]
    fn test_snapshot_skips_unloaded_slots() {
        let orm = orm();
        let user = Entity::new(orm.entity_def("User").unwrap());
        user.borrow_mut().set("name", "Alice").unwrap();

        // The slot exists but was never loaded or populated.
        entity::collection(&user, "addresses").unwrap();

        let snapshot = take(&user);
        assert!(snapshot.associations.is_empty());
    }

    #[test]
    fn test_restore_unknown_type_is_a_config_error() {
        let orm = orm();
        let snapshot = EntitySnapshot {
            entity_type: "Ghost".to_string(),
            fields: Record::new(),
            dirty: false,
            associations: Vec::new(),
        };
        assert!(matches!(
            restore(&orm, &snapshot).unwrap_err(),
            Error::UnknownEntityDef(_)
        ));
    }
}

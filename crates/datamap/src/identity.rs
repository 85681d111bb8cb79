//! Identity map.
//!
//! Keyed store of `(entity type name, primary key) -> EntityRef` ensuring at
//! most one in-memory instance per stored row. Entries are added on first
//! load by primary key and only removed by [`IdentityMap::clear`] — there is
//! no eviction or TTL; clearing exists mainly for test isolation.
//!
//! No locking: one `Orm` (and therefore one identity map) belongs to one
//! logical thread.

use datamap_core::Key;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::entity::EntityRef;

/// Cache of loaded entity instances keyed by type name and primary key.
#[derive(Default)]
pub struct IdentityMap {
    objects: RefCell<HashMap<(String, Key), EntityRef>>,
}

impl IdentityMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` under `(type_name, key)`, overwriting any prior
    /// entry for that key.
    pub fn store(&self, type_name: &str, key: Key, entity: EntityRef) {
        self.objects
            .borrow_mut()
            .insert((type_name.to_string(), key), entity);
    }

    /// The cached instance for `(type_name, key)`, if any.
    #[must_use]
    pub fn get(&self, type_name: &str, key: &Key) -> Option<EntityRef> {
        self.objects
            .borrow()
            .get(&(type_name.to_string(), key.clone()))
            .cloned()
    }

    /// Whether an instance is cached under `(type_name, key)`.
    #[must_use]
    pub fn is_cached(&self, type_name: &str, key: &Key) -> bool {
        self.objects
            .borrow()
            .contains_key(&(type_name.to_string(), key.clone()))
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.objects.borrow_mut().clear();
    }

    /// Number of cached instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use datamap_core::{EntityDef, FieldType, Value};
    use std::rc::Rc;

    fn entity() -> EntityRef {
        let def = Rc::new(
            EntityDef::new("User")
                .field("userID", FieldType::Integer)
                .build()
                .unwrap(),
        );
        Entity::new(def)
    }

    fn key(id: i64) -> Key {
        Key::new(Value::Int(id)).unwrap()
    }

    #[test]
    fn test_store_and_get_same_instance() {
        let map = IdentityMap::new();
        let user = entity();
        map.store("User", key(1), user.clone());

        let cached = map.get("User", &key(1)).unwrap();
        assert!(Rc::ptr_eq(&user, &cached));
        assert!(map.is_cached("User", &key(1)));
    }

    #[test]
    fn test_miss_on_other_type_or_key() {
        let map = IdentityMap::new();
        map.store("User", key(1), entity());

        assert!(map.get("Address", &key(1)).is_none());
        assert!(map.get("User", &key(2)).is_none());
    }

    #[test]
    fn test_store_overwrites() {
        let map = IdentityMap::new();
        let first = entity();
        let second = entity();
        map.store("User", key(1), first);
        map.store("User", key(1), second.clone());

        let cached = map.get("User", &key(1)).unwrap();
        assert!(Rc::ptr_eq(&second, &cached));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_clear() {
        let map = IdentityMap::new();
        map.store("User", key(1), entity());
        map.clear();
        assert!(map.is_empty());
        assert!(!map.is_cached("User", &key(1)));
    }
}

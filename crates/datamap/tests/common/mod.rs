#![allow(dead_code)]

//! Shared fixtures for the integration suites: a small User / Address /
//! Profile / Organisation / Group schema wired onto the in-memory
//! relational backend.

use datamap::prelude::*;
use std::rc::Rc;

pub struct Fixture {
    pub orm: Orm,
    pub store: Rc<TableStore>,
}

pub fn relational() -> Fixture {
    let orm = Orm::new();
    let store = Rc::new(TableStore::new());

    let organisation = EntityDef::new("Organisation")
        .field("organisationID", FieldType::Integer)
        .field("name", FieldType::Text)
        .build()
        .unwrap();

    let user = EntityDef::new("User")
        .field("userID", FieldType::Integer)
        .field("organisationID", FieldType::Integer)
        .field("name", FieldType::Text)
        .field("email", FieldType::Text)
        .belongs_to(
            "organisation",
            "Organisation",
            AssociationOptions::new()
                .foreign_key("organisationID")
                .allow_nested_assignment(true),
        )
        .has_one("profile", "Profile", AssociationOptions::new())
        .has_many(
            "addresses",
            "Address",
            AssociationOptions::new()
                .foreign_key("userID")
                .allow_nested_assignment(true),
        )
        .has_and_belongs_to_many(
            "groups",
            "Group",
            AssociationOptions::new().allow_nested_assignment(true),
        )
        .build()
        .unwrap();

    let profile = EntityDef::new("Profile")
        .field("profileID", FieldType::Integer)
        .field("userID", FieldType::Integer)
        .field("bio", FieldType::Text)
        .build()
        .unwrap();

    let address = EntityDef::new("Address")
        .field("addressID", FieldType::Integer)
        .field("userID", FieldType::Integer)
        .field("city", FieldType::Text)
        .build()
        .unwrap();

    let group = EntityDef::new("Group")
        .field("groupID", FieldType::Integer)
        .field("title", FieldType::Text)
        .build()
        .unwrap();

    for def in [organisation, user, profile, address, group] {
        let name = def.name().to_string();
        let def = orm.register_def(def).unwrap();
        let options = MapperOptions::default();
        let adapter = TableAdapter::new(store.clone(), &name, &options);
        orm.register_mapper(Mapper::new(def, Box::new(adapter))).unwrap();
    }

    Fixture { orm, store }
}

/// Insert a user row directly into storage, bypassing the mapper.
pub fn seed_user(fixture: &Fixture, id: i64, name: &str) {
    fixture.store.insert(
        "users",
        Record::new().with("userID", id).with("name", name),
    );
}

/// Insert an address row directly into storage, bypassing the mapper.
pub fn seed_address(fixture: &Fixture, id: i64, user_id: i64, city: &str) {
    fixture.store.insert(
        "addresses",
        Record::new()
            .with("addressID", id)
            .with("userID", user_id)
            .with("city", city),
    );
}

/// A fresh, unsaved user entity.
pub fn new_user(fixture: &Fixture, name: &str) -> EntityRef {
    let def = fixture.orm.entity_def("User").unwrap();
    let user = Entity::new(def);
    user.borrow_mut().set("name", name).unwrap();
    user
}

/// A user entity with a primary key, as if loaded.
pub fn user_with_id(fixture: &Fixture, id: i64) -> EntityRef {
    let def = fixture.orm.entity_def("User").unwrap();
    let user = Entity::new(def);
    user.borrow_mut().set("userID", id).unwrap();
    user.borrow_mut().set_dirty(false);
    user
}

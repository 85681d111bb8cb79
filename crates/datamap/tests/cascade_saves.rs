//! Cascading saves, nested-assignment permission and plugin hooks.

mod common;

use common::{new_user, relational, seed_address, seed_user};
use datamap::prelude::*;
use datamap::{collection, populate, single};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn creating_a_parent_cascades_into_a_dirty_has_many_collection() {
    let fixture = relational();
    let user = new_user(&fixture, "Alice");

    let addresses = collection(&user, "addresses").unwrap();
    addresses
        .borrow_mut()
        .populate(
            &fixture.orm,
            Populate::Records(vec![
                Record::new().with("city", "London"),
                Record::new().with("city", "Paris"),
            ]),
        )
        .unwrap();

    let users = fixture.orm.mapper("User").unwrap();
    assert!(users.create(&fixture.orm, &user).unwrap());

    // The parent got its generated key, the children got the foreign key
    // and their own generated keys.
    assert_eq!(user.borrow().get("userID"), Some(&Value::Int(1)));
    let rows = fixture.store.rows("addresses");
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.get("userID"), Some(&Value::Int(1)));
        assert!(row.get("addressID").is_some());
    }

    // A successful save leaves parent and children clean.
    assert!(!user.borrow().is_dirty());
    assert!(!addresses.borrow().is_dirty());
}

#[test]
fn dirty_association_without_permission_fails_and_writes_nothing_nested() {
    let fixture = relational();
    let user = new_user(&fixture, "Alice");

    // "profile" does not allow nested assignment.
    let profile = single(&user, "profile").unwrap();
    profile
        .borrow_mut()
        .populate(
            &fixture.orm,
            Populate::Record(Record::new().with("bio", "hello")),
        )
        .unwrap();
    assert!(profile.borrow().is_dirty());

    let users = fixture.orm.mapper("User").unwrap();
    let err = users.create(&fixture.orm, &user).unwrap_err();
    assert!(matches!(err, Error::NestedAssignmentNotAllowed(_)));

    // Nothing was written to the nested entity's table. The parent row was
    // already inserted when the cascade aborted: cascades are not atomic.
    assert!(fixture.store.rows("profiles").is_empty());
    assert_eq!(fixture.store.rows("users").len(), 1);
}

#[test]
fn mass_assignment_guards_non_nestable_associations() {
    let fixture = relational();
    let user = new_user(&fixture, "Alice");

    let record = Record::new().with(
        "profile",
        Value::Json(serde_json::json!({"bio": "hello"})),
    );
    let err = populate(&user, &fixture.orm, &record, true).unwrap_err();
    assert!(matches!(err, Error::GuardedField(_)));
}

#[test]
fn mass_assignment_populates_nestable_collections_and_marks_them_dirty() {
    let fixture = relational();
    let user = new_user(&fixture, "Alice");

    let record = Record::new().with(
        "addresses",
        Value::Json(serde_json::json!([
            {"city": "London"},
            {"city": "Paris"}
        ])),
    );
    populate(&user, &fixture.orm, &record, true).unwrap();

    let addresses = collection(&user, "addresses").unwrap();
    assert!(addresses.borrow().is_dirty());
    assert_eq!(addresses.borrow().loaded_objects().len(), 2);
}

#[test]
fn saving_after_removal_sweeps_absent_children() {
    let fixture = relational();
    seed_user(&fixture, 1, "Alice");
    seed_address(&fixture, 1, 1, "London");
    seed_address(&fixture, 2, 1, "Paris");
    let users = fixture.orm.mapper("User").unwrap();
    let user = users.find(&fixture.orm, 1i64).unwrap().unwrap();

    let addresses = collection(&user, "addresses").unwrap();
    let removed = addresses.borrow_mut().remove(&fixture.orm, 0).unwrap().unwrap();
    assert_eq!(removed.borrow().get("addressID"), Some(&Value::Int(1)));

    assert!(users.save(&fixture.orm, &user).unwrap());

    let rows = fixture.store.rows("addresses");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("addressID"), Some(&Value::Int(2)));
}

#[test]
fn habtm_save_syncs_lookup_rows_idempotently() {
    let fixture = relational();
    let orm = &fixture.orm;

    // Two stored groups.
    let groups_mapper = orm.mapper("Group").unwrap();
    let group_def = orm.entity_def("Group").unwrap();
    let g1 = Entity::new(group_def.clone());
    g1.borrow_mut().set("title", "admins").unwrap();
    let g2 = Entity::new(group_def);
    g2.borrow_mut().set("title", "editors").unwrap();
    assert!(groups_mapper.create(orm, &g1).unwrap());
    assert!(groups_mapper.create(orm, &g2).unwrap());

    let users = orm.mapper("User").unwrap();
    let user = new_user(&fixture, "Alice");
    assert!(users.create(orm, &user).unwrap());

    // Associate by id.
    let groups = collection(&user, "groups").unwrap();
    groups
        .borrow_mut()
        .populate(orm, Populate::Ids(vec![Value::Int(1), Value::Int(2)]))
        .unwrap();
    assert!(users.save(orm, &user).unwrap());

    let links = fixture.store.rows("groupsUsers");
    assert_eq!(links.len(), 2);

    // Saving again does not duplicate the pairs.
    groups.borrow_mut().set_dirty(true);
    assert!(users.save(orm, &user).unwrap());
    assert_eq!(fixture.store.rows("groupsUsers").len(), 2);

    // Shrinking the held set removes the stale pair.
    groups
        .borrow_mut()
        .populate(orm, Populate::Ids(vec![Value::Int(2)]))
        .unwrap();
    assert!(users.save(orm, &user).unwrap());
    let links = fixture.store.rows("groupsUsers");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].get("groupID"), Some(&Value::Int(2)));
}

#[test]
fn belongs_to_cascade_saves_the_target_and_stamps_the_owner_key() {
    let fixture = relational();
    let user = new_user(&fixture, "Alice");

    let organisation = single(&user, "organisation").unwrap();
    organisation
        .borrow_mut()
        .populate(
            &fixture.orm,
            Populate::Record(Record::new().with("name", "Acme")),
        )
        .unwrap();

    let users = fixture.orm.mapper("User").unwrap();
    assert!(users.create(&fixture.orm, &user).unwrap());

    let orgs = fixture.store.rows("organisations");
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].get("organisationID"), Some(&Value::Int(1)));
    assert_eq!(
        user.borrow().get("organisationID"),
        Some(&Value::Int(1))
    );
}

#[test]
fn collection_create_persists_immediately() {
    let fixture = relational();
    seed_user(&fixture, 1, "Alice");
    let users = fixture.orm.mapper("User").unwrap();
    let user = users.find(&fixture.orm, 1i64).unwrap().unwrap();

    let addresses = collection(&user, "addresses").unwrap();
    assert!(addresses
        .borrow_mut()
        .create(&fixture.orm, Record::new().with("city", "Berlin"))
        .unwrap());

    let rows = fixture.store.rows("addresses");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("userID"), Some(&Value::Int(1)));
    assert_eq!(rows[0].get("city"), Some(&Value::Text("Berlin".to_string())));
}

struct Rejector;

impl MapperPlugin for Rejector {
    fn pre_create(&self, _entity: &EntityRef, _mapper: &Mapper) -> bool {
        false
    }
}

#[test]
fn a_rejecting_pre_create_hook_aborts_without_an_error() {
    let fixture = relational();
    let users = fixture.orm.mapper("User").unwrap();
    users.register_plugin(Rc::new(Rejector));

    let user = new_user(&fixture, "Alice");
    let created = users.create(&fixture.orm, &user).unwrap();

    assert!(!created);
    assert!(fixture.store.rows("users").is_empty());
}

#[derive(Default)]
struct DeleteWitness {
    calls: RefCell<Vec<&'static str>>,
}

impl MapperPlugin for DeleteWitness {
    fn pre_delete(&self, _entity: &EntityRef, _mapper: &Mapper) {
        self.calls.borrow_mut().push("pre");
    }

    fn post_delete(&self, _entity: &EntityRef, _mapper: &Mapper) {
        self.calls.borrow_mut().push("post");
    }
}

#[test]
fn delete_hooks_run_but_cannot_abort() {
    let fixture = relational();
    seed_user(&fixture, 1, "Alice");
    let users = fixture.orm.mapper("User").unwrap();
    let witness = Rc::new(DeleteWitness::default());
    users.register_plugin(witness.clone());

    let user = users.find(&fixture.orm, 1i64).unwrap().unwrap();
    assert!(users.delete(&fixture.orm, &user).unwrap());

    assert_eq!(*witness.calls.borrow(), vec!["pre", "post"]);
    assert!(fixture.store.rows("users").is_empty());
}

struct Auditor {
    saves: RefCell<u32>,
}

impl MapperPlugin for Auditor {
    fn post_save(&self, _entity: &EntityRef, _mapper: &Mapper) {
        *self.saves.borrow_mut() += 1;
    }
}

#[test]
fn global_plugins_apply_to_every_mapper() {
    let fixture = relational();
    let auditor = Rc::new(Auditor {
        saves: RefCell::new(0),
    });
    fixture.orm.register_global_plugin(auditor.clone());

    let users = fixture.orm.mapper("User").unwrap();
    let user = new_user(&fixture, "Alice");
    users.create(&fixture.orm, &user).unwrap();

    let groups_mapper = fixture.orm.mapper("Group").unwrap();
    let group = Entity::new(fixture.orm.entity_def("Group").unwrap());
    group.borrow_mut().set("title", "admins").unwrap();
    groups_mapper.create(&fixture.orm, &group).unwrap();

    assert_eq!(*auditor.saves.borrow(), 2);
}

#[test]
fn update_sends_only_the_requested_field_subset() {
    let fixture = relational();
    fixture.store.insert(
        "users",
        Record::new()
            .with("userID", 1i64)
            .with("name", "Alice")
            .with("email", "alice@example.com"),
    );
    let users = fixture.orm.mapper("User").unwrap();
    let user = users.find(&fixture.orm, 1i64).unwrap().unwrap();

    user.borrow_mut().set("name", "Alicia").unwrap();
    user.borrow_mut().set("email", "changed@example.com").unwrap();
    assert!(users
        .update(&fixture.orm, &user, Some(&["name"]))
        .unwrap());

    let rows = fixture.store.rows("users");
    assert_eq!(rows[0].get("name"), Some(&Value::Text("Alicia".to_string())));
    // The email column was not part of the subset and kept its stored value.
    assert_eq!(
        rows[0].get("email"),
        Some(&Value::Text("alice@example.com".to_string()))
    );
}

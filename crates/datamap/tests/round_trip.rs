//! Field-type round-tripping, dirty propagation and polymorphic hydration.

mod common;

use chrono::{NaiveDate, NaiveDateTime};
use datamap::prelude::*;
use datamap::{FieldCodec, collection, populate};
use std::rc::Rc;

fn typed_fixture() -> (Orm, Rc<EntityDef>) {
    let orm = Orm::new();
    let store = Rc::new(TableStore::new());

    let def = EntityDef::new("Event")
        .field("eventID", FieldType::Integer)
        .field("title", FieldType::Text)
        .field("public", FieldType::Boolean)
        .field("attendees", FieldType::Integer)
        .field("rating", FieldType::Float)
        .field("day", FieldType::Date)
        .field("startsAt", FieldType::DateTime)
        .field("payload", FieldType::Serialized)
        .field("code", FieldType::Custom("upper"))
        .build()
        .unwrap();
    let def = orm.register_def(def).unwrap();

    orm.register_field_type(
        "upper",
        Box::new((
            |value: Value| -> datamap::Result<Value> {
                match value {
                    Value::Text(s) => Ok(Value::Text(s.to_uppercase())),
                    other => Ok(other),
                }
            },
            |value: Value| -> datamap::Result<Value> {
                match value {
                    Value::Text(s) => Ok(Value::Text(s.to_lowercase())),
                    other => Ok(other),
                }
            },
        )),
    )
    .unwrap();

    let options = MapperOptions::default();
    let adapter = TableAdapter::new(store, "Event", &options);
    orm.register_mapper(Mapper::new(def.clone(), Box::new(adapter)))
        .unwrap();
    (orm, def)
}

fn raw_event() -> Record {
    Record::new()
        .with("eventID", 7i64)
        .with("title", "Launch")
        .with("public", 1i64)
        .with("attendees", "250")
        .with("rating", 4.5f64)
        .with("day", "2024-03-05")
        .with("startsAt", "2024-03-05 18:30:00")
        .with("payload", r#"{"venue":"hall","floors":[1,2]}"#)
        .with("code", "xyz")
}

#[test]
fn hydration_applies_every_declared_coercion() {
    let (orm, _) = typed_fixture();
    let mapper = orm.mapper("Event").unwrap();

    let event = mapper.to_entity(&orm, &raw_event(), false).unwrap();
    let event = event.borrow();

    assert_eq!(event.get("public"), Some(&Value::Bool(true)));
    assert_eq!(event.get("attendees"), Some(&Value::Int(250)));
    assert_eq!(
        event.get("day"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()))
    );
    assert_eq!(
        event.get("startsAt"),
        Some(&Value::DateTime(
            NaiveDateTime::parse_from_str("2024-03-05 18:30:00", "%Y-%m-%d %H:%M:%S").unwrap()
        ))
    );
    assert_eq!(
        event.get("payload"),
        Some(&Value::Json(
            serde_json::json!({"venue": "hall", "floors": [1, 2]})
        ))
    );
    assert_eq!(event.get("code"), Some(&Value::Text("XYZ".to_string())));
}

#[test]
fn entity_round_trips_through_storage_fields() {
    let (orm, _) = typed_fixture();
    let mapper = orm.mapper("Event").unwrap();

    let event = mapper.to_entity(&orm, &raw_event(), false).unwrap();
    let record = mapper.to_record(&orm, &event, None).unwrap();
    let again = mapper.to_entity(&orm, &record, false).unwrap();

    let event = event.borrow();
    let again = again.borrow();
    for field in event.def().fields() {
        assert_eq!(
            event.get(&field.name),
            again.get(&field.name),
            "field '{}' did not round-trip",
            field.name
        );
    }
}

#[test]
fn dehydration_produces_only_scalars() {
    let (orm, _) = typed_fixture();
    let mapper = orm.mapper("Event").unwrap();

    let event = mapper.to_entity(&orm, &raw_event(), false).unwrap();
    let record = mapper.to_record(&orm, &event, None).unwrap();

    for (name, value) in &record {
        assert!(value.is_scalar(), "field '{name}' dehydrated to {value:?}");
    }
    assert_eq!(record.get("day"), Some(&Value::Text("2024-03-05".to_string())));
    assert_eq!(record.get("code"), Some(&Value::Text("xyz".to_string())));
}

struct BrokenCodec;

impl FieldCodec for BrokenCodec {
    fn from_storage(&self, value: Value) -> datamap::Result<Value> {
        Ok(value)
    }

    fn to_storage(&self, _value: Value) -> datamap::Result<Value> {
        Ok(Value::Json(serde_json::json!({"not": "scalar"})))
    }
}

#[test]
fn non_scalar_codec_output_is_a_fatal_error() {
    let orm = Orm::new();
    let store = Rc::new(TableStore::new());
    orm.register_field_type("broken", Box::new(BrokenCodec)).unwrap();

    let def = EntityDef::new("Thing")
        .field("thingID", FieldType::Integer)
        .field("blob", FieldType::Custom("broken"))
        .build()
        .unwrap();
    let def = orm.register_def(def).unwrap();
    let options = MapperOptions::default();
    orm.register_mapper(Mapper::new(
        def.clone(),
        Box::new(TableAdapter::new(store, "Thing", &options)),
    ))
    .unwrap();

    let thing = Entity::new(def);
    thing.borrow_mut().set("blob", "anything").unwrap();

    let mapper = orm.mapper("Thing").unwrap();
    let err = mapper.to_record(&orm, &thing, None).unwrap_err();
    assert!(matches!(err, Error::NonScalarStorageValue(_)));
}

#[test]
fn hydrated_entities_are_clean_and_mutation_dirties_them() {
    let (orm, _) = typed_fixture();
    let mapper = orm.mapper("Event").unwrap();

    let event = mapper.to_entity(&orm, &raw_event(), false).unwrap();
    assert!(!event.borrow().is_dirty());

    event.borrow_mut().set("title", "Relaunch").unwrap();
    assert!(event.borrow().is_dirty());
}

#[test]
fn nested_mass_assignment_dirties_the_wrapper_not_the_owner_fields() {
    let fixture = common::relational();
    let user = Entity::new(fixture.orm.entity_def("User").unwrap());

    let record = Record::new().with(
        "addresses",
        Value::Json(serde_json::json!([{"city": "London"}])),
    );
    populate(&user, &fixture.orm, &record, true).unwrap();
    user.borrow_mut().set_dirty(false);

    let addresses = collection(&user, "addresses").unwrap();
    assert!(addresses.borrow().is_dirty());
    assert!(!user.borrow().is_dirty());
}

#[test]
fn duplicate_field_type_registration_is_rejected() {
    let orm = Orm::new();
    let codec = || {
        Box::new((
            |v: Value| -> datamap::Result<Value> { Ok(v) },
            |v: Value| -> datamap::Result<Value> { Ok(v) },
        )) as Box<dyn FieldCodec>
    };
    orm.register_field_type("money", codec()).unwrap();
    let err = orm.register_field_type("money", codec()).unwrap_err();
    assert!(matches!(err, Error::DuplicateFieldType(_)));
}

#[test]
fn discriminator_selects_the_concrete_entity_type() {
    let orm = Orm::new();
    let store = Rc::new(TableStore::new());

    let person = EntityDef::new("Person")
        .field("personID", FieldType::Integer)
        .field("class", FieldType::Text)
        .field("name", FieldType::Text)
        .build()
        .unwrap();
    let admin = EntityDef::new("Admin")
        .field("personID", FieldType::Integer)
        .field("class", FieldType::Text)
        .field("name", FieldType::Text)
        .build()
        .unwrap();

    let person = orm.register_def(person).unwrap();
    orm.register_def(admin).unwrap();

    let options = MapperOptions::new().table_name("people").primary_key("personID");
    let mapper = Mapper::new(
        person,
        Box::new(TableAdapter::new(store, "Person", &options)),
    )
    .with_discriminator("class");
    let mapper = orm.register_mapper(mapper).unwrap();

    let row = Record::new()
        .with("personID", 1i64)
        .with("class", "Admin")
        .with("name", "Root");
    let entity = mapper.to_entity(&orm, &row, false).unwrap();
    assert_eq!(entity.borrow().entity_name(), "Admin");

    // Rows without a discriminator value hydrate as the mapper's own type.
    let row = Record::new().with("personID", 2i64).with("name", "Plain");
    let entity = mapper.to_entity(&orm, &row, false).unwrap();
    assert_eq!(entity.borrow().entity_name(), "Person");

    // An unregistered discriminator value cannot be resolved.
    let row = Record::new()
        .with("personID", 3i64)
        .with("class", "Ghost");
    let err = mapper.to_entity(&orm, &row, false).unwrap_err();
    assert!(matches!(err, Error::EntityResolution { .. }));
}

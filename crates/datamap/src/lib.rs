//! Data mappers with lazy associations, identity mapping and pluggable
//! storage backends.
//!
//! `datamap` is the facade crate: it wires the schema and conversion types
//! from `datamap-core` and the neutral query AST from `datamap-query` into
//! the full mapper/association engine.
//!
//! # Architecture
//!
//! - [`Orm`] — the explicit context: entity definitions, mappers, identity
//!   map, global plugins, custom field types. No global state; one `Orm`
//!   per logical thread.
//! - [`Mapper`] — per-entity-type service converting records ⇄ entities and
//!   orchestrating CRUD with plugin hooks and cascading saves.
//! - [`AssociationData`] / [`AssociationCollection`] — lazy cache cells
//!   behind every declared association.
//! - [`IdentityMap`] — one in-memory instance per (type, primary key).
//! - [`adapter::Adapter`] — the pluggable storage contract, with in-process
//!   relational ([`adapter::TableAdapter`]) and document
//!   ([`adapter::DocumentAdapter`]) backends.
//!
//! # Example
//!
//! ```
//! use datamap::prelude::*;
//! use std::rc::Rc;
//!
//! let orm = Orm::new();
//! let store = Rc::new(TableStore::new());
//!
//! let user_def = EntityDef::new("User")
//!     .field("userID", FieldType::Integer)
//!     .field("name", FieldType::Text)
//!     .has_many(
//!         "addresses",
//!         "Address",
//!         AssociationOptions::new()
//!             .foreign_key("userID")
//!             .allow_nested_assignment(true),
//!     )
//!     .build()
//!     .unwrap();
//! let address_def = EntityDef::new("Address")
//!     .field("addressID", FieldType::Integer)
//!     .field("userID", FieldType::Integer)
//!     .field("city", FieldType::Text)
//!     .build()
//!     .unwrap();
//!
//! let user_def = orm.register_def(user_def).unwrap();
//! let address_def = orm.register_def(address_def).unwrap();
//!
//! let options = MapperOptions::default();
//! orm.register_mapper(Mapper::new(
//!     user_def.clone(),
//!     Box::new(TableAdapter::new(store.clone(), "User", &options)),
//! ))
//! .unwrap();
//! orm.register_mapper(Mapper::new(
//!     address_def,
//!     Box::new(TableAdapter::new(store.clone(), "Address", &options)),
//! ))
//! .unwrap();
//!
//! let users = orm.mapper("User").unwrap();
//! let user = Entity::new(user_def);
//! user.borrow_mut().set("name", "Alice").unwrap();
//! assert!(users.create(&orm, &user).unwrap());
//! assert_eq!(user.borrow().get("userID"), Some(&Value::Int(1)));
//! ```

pub mod adapter;
pub mod association;
pub mod entity;
pub mod identity;
pub mod mapper;
pub mod orm;
pub mod plugin;
pub mod snapshot;

pub use datamap_core::{
    Association, AssociationKind, AssociationOptions, EntityDef, EntityDefBuilder, Error,
    FieldCodec, FieldDef, FieldType, FieldTypeRegistry, Key, Record, Result, Value,
    default_lookup_table,
};
pub use datamap_query::{Cmp, ColumnRef, Direction, Filter, Join, Order, Query};

pub use adapter::{
    Adapter, AssociationContext, DocumentAdapter, DocumentStore, TableAdapter, TableStore,
};
pub use association::{AssociationCollection, AssociationData, Populate};
pub use entity::{Entity, EntityRef, collection, populate, single};
pub use identity::IdentityMap;
pub use mapper::{Mapper, MapperOptions};
pub use orm::Orm;
pub use plugin::MapperPlugin;
pub use snapshot::{AssociationSnapshot, EntitySnapshot};

/// Common imports for applications using datamap.
pub mod prelude {
    pub use crate::adapter::{
        Adapter, DocumentAdapter, DocumentStore, TableAdapter, TableStore,
    };
    pub use crate::association::{AssociationCollection, AssociationData, Populate};
    pub use crate::entity::{Entity, EntityRef, collection, populate, single};
    pub use crate::identity::IdentityMap;
    pub use crate::mapper::{Mapper, MapperOptions};
    pub use crate::orm::Orm;
    pub use crate::plugin::MapperPlugin;
    pub use datamap_core::{
        AssociationKind, AssociationOptions, EntityDef, Error, FieldType, Record, Result, Value,
    };
    pub use datamap_query::{Filter, Order, Query};
}

//! Core types for datamap.
//!
//! `datamap-core` is the foundation layer for the datamap ecosystem. It defines
//! the data model shared by mappers, associations and storage adapters.
//!
//! # Role In The Architecture
//!
//! - **Data model**: [`Value`] and [`Record`] represent raw storage data as it
//!   crosses the adapter boundary.
//! - **Schema layer**: [`EntityDef`], [`FieldDef`] and [`Association`] describe
//!   entity types, their typed fields and their declared relationships.
//! - **Field types**: [`FieldType`], [`FieldCodec`] and [`FieldTypeRegistry`]
//!   convert between raw storage values and typed in-memory values.
//!
//! # Who Uses This Crate
//!
//! - `datamap-query` consumes [`Value`] when building filter expressions.
//! - `datamap` (the facade) builds entities, mappers and adapters on top of the
//!   schema and conversion types defined here.
//!
//! Most applications should depend on the `datamap` facade; reach for
//! `datamap-core` directly when implementing a storage adapter.

pub mod association;
pub mod error;
pub mod field;
pub mod model;
pub mod record;
pub mod value;

pub use association::{Association, AssociationKind, AssociationOptions, default_lookup_table};
pub use error::{Error, Result};
pub use field::{FieldCodec, FieldDef, FieldType, FieldTypeRegistry};
pub use model::{EntityDef, EntityDefBuilder};
pub use record::Record;
pub use value::{Key, Value};

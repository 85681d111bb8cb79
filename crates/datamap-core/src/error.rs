//! Error taxonomy for datamap.
//!
//! Three classes of failure exist, and the distinction is load-bearing:
//!
//! - **Configuration errors** are raised at declaration/registration time —
//!   a missing entity definition, a duplicate association, an unregistered
//!   mapper. They signal a wiring mistake and are never caught internally.
//! - **Data-shape errors** signal a programming error at runtime — the wrong
//!   kind of data handed to `populate`, a custom field type producing a
//!   non-scalar storage value, loading a collection twice.
//! - **Cascade-permission errors** fire when a dirty nested association is
//!   saved without `allow_nested_assignment`; nested writes are an explicit
//!   opt-in contract.
//!
//! Absence is *not* an error: `find` with no match, `fetch_one` with no rows
//! and an association query whose key values are unset all surface as
//! `Option`/empty collections, never as an `Error`.

use thiserror::Error;

/// Convenience alias used across all datamap crates.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the mapper/association engine.
#[derive(Debug, Error)]
pub enum Error {
    // -- configuration -------------------------------------------------------
    /// No entity definition registered under this name.
    #[error("no entity definition registered for '{0}'")]
    UnknownEntityDef(String),

    /// No mapper registered for this entity type.
    #[error("no mapper registered for entity type '{0}'")]
    UnregisteredMapper(String),

    /// A mapper is already registered for this entity type.
    #[error("a mapper for entity type '{0}' is already registered")]
    DuplicateMapper(String),

    /// A field with this name was declared twice on one entity definition.
    #[error("field '{field}' is declared more than once on entity '{entity}'")]
    DuplicateField {
        /// Entity definition name.
        entity: String,
        /// Offending field name.
        field: String,
    },

    /// An association with this name was declared twice on one definition.
    #[error("association '{association}' already exists on entity '{entity}'")]
    DuplicateAssociation {
        /// Entity definition name.
        entity: String,
        /// Offending association name.
        association: String,
    },

    /// A custom field type with this name is already registered.
    #[error("field type '{0}' is already registered")]
    DuplicateFieldType(String),

    /// No custom field type registered under this name.
    #[error("no field type registered for '{0}'")]
    UnknownFieldType(String),

    /// The named association does not exist on the entity.
    #[error("entity '{entity}' has no association named '{association}'")]
    UnknownAssociation {
        /// Entity definition name.
        entity: String,
        /// Requested association name.
        association: String,
    },

    /// A single-entity accessor was used on a collection association or
    /// vice versa.
    #[error("association '{association}' is {actual}, not {expected}")]
    AssociationKindMismatch {
        /// Association name.
        association: String,
        /// What the caller asked for.
        expected: &'static str,
        /// What the association actually is.
        actual: &'static str,
    },

    /// The named field does not exist on the entity.
    #[error("entity '{entity}' has no field named '{field}'")]
    UnknownField {
        /// Entity definition name.
        entity: String,
        /// Requested field name.
        field: String,
    },

    /// An operation required a declared primary key and none exists.
    #[error("entity type '{0}' has no primary key declared")]
    MissingPrimaryKey(String),

    /// The concrete entity type for a record could not be resolved.
    #[error("unable to resolve entity type for mapper '{mapper}': {reason}")]
    EntityResolution {
        /// Mapper entity type name.
        mapper: String,
        /// Human-readable cause.
        reason: String,
    },

    // -- cascade permission --------------------------------------------------
    /// A dirty nested association was saved without nested assignment enabled.
    #[error(
        "association '{0}' contains data that requires saving \
         but nested assignment is not allowed"
    )]
    NestedAssignmentNotAllowed(String),

    // -- data shape ----------------------------------------------------------
    /// A guarded field was mass-assigned.
    #[error("unable to mass-assign guarded field '{0}'")]
    GuardedField(String),

    /// A custom field type produced a non-scalar storage value.
    #[error("field type for '{0}' must produce a scalar storage value")]
    NonScalarStorageValue(String),

    /// The data handed to an association `populate` had the wrong shape.
    #[error("invalid data for association '{association}': {reason}")]
    InvalidPopulateData {
        /// Association name.
        association: String,
        /// What was wrong with the data.
        reason: String,
    },

    /// A value could not be coerced to the declared field type.
    #[error("cannot convert value for field '{field}' to {expected}: {value}")]
    FieldCoercion {
        /// Field name.
        field: String,
        /// Target type description.
        expected: &'static str,
        /// Rendering of the offending value.
        value: String,
    },

    /// An entity of the wrong type was handed to an association.
    #[error("association '{association}' expects entities of type '{expected}', got '{actual}'")]
    EntityTypeMismatch {
        /// Association name.
        association: String,
        /// Expected entity type name.
        expected: String,
        /// Actual entity type name.
        actual: String,
    },

    /// A collection was loaded while already loaded.
    #[error("attempted to load collection data for '{0}' multiple times")]
    AlreadyLoaded(String),

    /// A value unusable as an identity-map key (non-scalar).
    #[error("value is not usable as an identity key: {0}")]
    InvalidKey(String),

    /// The owning entity behind an association slot has been dropped.
    #[error("owning entity for association '{0}' is no longer alive")]
    OwnerGone(String),

    // -- storage -------------------------------------------------------------
    /// An adapter-level failure.
    #[error("storage adapter error: {0}")]
    Adapter(String),
}

impl Error {
    /// Shorthand for an adapter-level failure.
    pub fn adapter(message: impl Into<String>) -> Self {
        Error::Adapter(message.into())
    }
}

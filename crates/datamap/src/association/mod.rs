//! Association runtime: lazy-loading data cells.
//!
//! The descriptors ([`Association`], [`AssociationKind`],
//! [`AssociationOptions`]) live in `datamap-core`; this module holds the
//! runtime halves owned by entity instances: [`AssociationData`] for
//! belongs-to/has-one and [`AssociationCollection`] for
//! has-many/many-to-many. Both are cache cells that resolve their contents
//! through the target mapper on first access and keep them until explicitly
//! invalidated.

pub mod collection;
pub mod data;

pub use collection::AssociationCollection;
pub use data::AssociationData;
pub use datamap_core::{Association, AssociationKind, AssociationOptions};

use datamap_core::{Record, Result, Value};

use crate::entity::EntityRef;
use crate::mapper::association_context;
use crate::orm::Orm;

/// Data accepted by association `populate`.
///
/// Anything not listed for the association's kind is a hard error: handing
/// the wrong shape to an association is a programming mistake, not a
/// recoverable condition.
pub enum Populate {
    /// A raw field map, hydrated through the target mapper.
    Record(Record),
    /// An already-typed entity of the target type.
    Entity(EntityRef),
    /// Raw field maps for a collection, hydrated and appended one by one.
    Records(Vec<Record>),
    /// Already-typed entities of the target type, replacing the held set.
    Entities(Vec<EntityRef>),
    /// Raw identifiers, "associate by id" (many-to-many only).
    Ids(Vec<Value>),
}

/// Stamp the foreign key appropriate for `association` onto the entities
/// involved, through the target mapper's adapter.
pub fn populate_object(
    orm: &Orm,
    association: &Association,
    child: &EntityRef,
    owner: &EntityRef,
) -> Result<()> {
    let target = orm.mapper(association.target())?;
    let ctx = association_context(orm, association)?;
    target
        .adapter()
        .populate_object_for_association(child, association, owner, &ctx)
}

//! Mapper plugins.
//!
//! Plugins are cross-cutting extensions (logging, auditing, validation
//! glue) hooked into the mapper's CRUD lifecycle. They exist at two scopes:
//! global plugins registered on the [`Orm`](crate::Orm) apply to every
//! mapper, instance plugins apply to one mapper only.

use datamap_query::Query;

use crate::entity::EntityRef;
use crate::mapper::Mapper;

/// Lifecycle hooks around mapper operations.
///
/// All methods default to no-ops. The `pre_create`/`pre_update`/`pre_save`
/// hooks return `bool`: returning `false` aborts the whole operation, which
/// then reports `Ok(false)` to the caller rather than an error.
///
/// `pre_delete`/`post_delete` are advisory only and cannot abort a delete;
/// the asymmetry with create/update is inherited deliberately from the
/// system this design preserves.
#[allow(unused_variables)]
pub trait MapperPlugin {
    /// Called when the plugin is attached to a mapper.
    fn init(&self, mapper: &Mapper) {}

    /// Before an insert. Return `false` to abort.
    fn pre_create(&self, entity: &EntityRef, mapper: &Mapper) -> bool {
        true
    }

    /// After a successful insert and cascade.
    fn post_create(&self, entity: &EntityRef, mapper: &Mapper) {}

    /// Before an update. Return `false` to abort.
    fn pre_update(&self, entity: &EntityRef, mapper: &Mapper) -> bool {
        true
    }

    /// After a successful update and cascade.
    fn post_update(&self, entity: &EntityRef, mapper: &Mapper) {}

    /// Before any create or update. Return `false` to abort.
    fn pre_save(&self, entity: &EntityRef, mapper: &Mapper) -> bool {
        true
    }

    /// After any successful create or update.
    fn post_save(&self, entity: &EntityRef, mapper: &Mapper) {}

    /// Before a delete. Advisory only; cannot abort.
    fn pre_delete(&self, entity: &EntityRef, mapper: &Mapper) {}

    /// After a delete. Advisory only.
    fn post_delete(&self, entity: &EntityRef, mapper: &Mapper) {}

    /// Called for every base query the mapper builds.
    fn query(&self, query: &mut Query, mapper: &Mapper) {}
}

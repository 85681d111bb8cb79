//! Storage adapter contract.
//!
//! A [`Adapter`] is the backend half of a mapper: a uniform CRUD-plus-query
//! surface over one table or collection. The mapper is adapter-agnostic;
//! consistent association semantics across relational and document backends
//! come from the shared, backend-neutral query population in this module,
//! which adapters get as default trait methods and may override.
//!
//! Two in-process backends live alongside the contract: [`TableAdapter`]
//! (relational flavor) and [`DocumentAdapter`] (document flavor). Network
//! drivers are external collaborators implementing the same trait.

pub mod document;
mod eval;
pub mod table;

pub use document::{DocumentAdapter, DocumentStore};
pub use table::{TableAdapter, TableStore};

use datamap_core::{Association, AssociationKind, Error, Record, Result, Value};
use datamap_query::{Filter, Join, Order, Query};

use crate::entity::{Entity, EntityRef};

/// Table/key facts about both ends of an association, resolved by the
/// mapper from the two mappers involved and handed to the adapter.
#[derive(Debug, Clone)]
pub struct AssociationContext {
    /// Table/collection of the owning entity.
    pub owner_table: String,
    /// Primary key column(s) of the owning entity.
    pub owner_primary_key: Vec<String>,
    /// Table/collection of the target entity.
    pub target_table: String,
    /// Primary key column(s) of the target entity.
    pub target_primary_key: Vec<String>,
}

/// Uniform storage contract implemented per backend.
///
/// One adapter instance serves one mapper and knows its table/collection
/// name and primary key. All operations are synchronous and blocking; the
/// contract has no transactional surface, so multi-entity cascades are
/// not atomic.
pub trait Adapter {
    /// The backing table/collection name.
    fn table_name(&self) -> &str;

    /// Primary key column(s); empty when the mapper declares none.
    fn primary_key(&self) -> &[String];

    /// Whether `insert` can produce a generated primary key for new rows.
    ///
    /// Queried polymorphically instead of inspecting the concrete adapter
    /// type.
    fn supports_generated_keys(&self) -> bool;

    /// A base query over the whole table/collection.
    fn query(&self) -> Query {
        Query::from(self.table_name())
    }

    /// Look up a single row by primary key. `None` when absent.
    fn find(&self, id: &Value) -> Result<Option<Record>> {
        match self.primary_key() {
            [pk] => {
                let query = self
                    .query()
                    .filter_eq(&format!("{}.{}", self.table_name(), pk), id.clone());
                self.fetch_one(&query)
            }
            [] => Err(Error::MissingPrimaryKey(self.table_name().to_string())),
            _ => Err(Error::adapter(
                "find by single id is not defined for a compound primary key",
            )),
        }
    }

    /// Execute a query and return the first row, if any.
    fn fetch_one(&self, query: &Query) -> Result<Option<Record>>;

    /// Execute a query and return all matching rows; empty when none match.
    fn fetch_all(&self, query: &Query) -> Result<Vec<Record>>;

    /// Insert a row. Returns the generated primary key when the backend
    /// produced one.
    fn insert(&self, record: Record) -> Result<Option<Value>>;

    /// Update the rows matching `identity` with the given fields.
    fn update(&self, record: Record, identity: &[Filter]) -> Result<bool>;

    /// Delete the rows matching `identity`.
    fn delete(&self, identity: &[Filter]) -> Result<bool>;

    /// Number of rows matching `query` (limit/offset ignored).
    fn count(&self, query: &Query) -> Result<u64>;

    /// Add the association's join/filter conditions to a base query.
    ///
    /// Returns `None` when a required key value on the owning entity is
    /// unset — "no query possible", which callers treat as nothing to load,
    /// never as an error.
    fn populate_query_for_association(
        &self,
        query: Query,
        association: &Association,
        owner: &Entity,
        ctx: &AssociationContext,
    ) -> Result<Option<Query>> {
        Ok(populate_association_query(query, association, owner, ctx))
    }

    /// Stamp the foreign key appropriate for the association kind.
    ///
    /// For has-one/has-many the owner's key is copied onto the child; for
    /// belongs-to the child's key is copied onto the owner; many-to-many
    /// stamps nothing (membership lives in the lookup table).
    fn populate_object_for_association(
        &self,
        child: &EntityRef,
        association: &Association,
        owner: &EntityRef,
        ctx: &AssociationContext,
    ) -> Result<()> {
        populate_association_object(child, association, owner, ctx)
    }

    /// Remove has-many children of `owner` whose primary key is not in
    /// `kept`, reflecting removals from the in-memory collection.
    ///
    /// Backends without referential cleanup semantics may keep the default
    /// no-op.
    fn delete_absent_children(
        &self,
        owner: &Entity,
        kept: &[Value],
        association: &Association,
        ctx: &AssociationContext,
    ) -> Result<u64> {
        let _ = (owner, kept, association, ctx);
        Ok(0)
    }

    /// Bring the many-to-many lookup table in line with the held set:
    /// insert missing `(owner key, target key)` pairs idempotently and
    /// remove pairs no longer present.
    fn sync_lookup_entries(
        &self,
        owner: &Entity,
        target_keys: &[Value],
        association: &Association,
        ctx: &AssociationContext,
    ) -> Result<()> {
        let _ = (owner, target_keys, association, ctx);
        Ok(())
    }
}

/// Key columns read from the owning entity for an association.
///
/// Explicit `primary_key` option first, then the context default.
fn owner_key_columns(association: &Association, default: &[String]) -> Vec<String> {
    let opts = association.options();
    if opts.primary_key.is_empty() {
        default.to_vec()
    } else {
        opts.primary_key.clone()
    }
}

/// Foreign key columns for an association, defaulting to the key columns.
fn foreign_key_columns(association: &Association, keys: &[String]) -> Vec<String> {
    let opts = association.options();
    if opts.foreign_key.is_empty() {
        keys.to_vec()
    } else {
        opts.foreign_key.clone()
    }
}

/// Backend-neutral association query population (the per-kind algorithm).
///
/// Returns `None` when required owner key values are missing.
#[must_use]
pub fn populate_association_query(
    query: Query,
    association: &Association,
    owner: &Entity,
    ctx: &AssociationContext,
) -> Option<Query> {
    let opts = association.options();
    let mut query = match association.kind() {
        AssociationKind::BelongsTo => {
            // The foreign key lives on the owner and points at the target's
            // primary key.
            let keys = owner_key_columns(association, &ctx.target_primary_key);
            let fks = foreign_key_columns(association, &keys);
            if keys.is_empty() || keys.len() != fks.len() {
                return None;
            }
            let values = owner.key_values(&fks)?;
            let mut query = query;
            for (key, value) in keys.iter().zip(values) {
                query = query.filter_eq(&format!("{}.{}", ctx.target_table, key), value);
            }
            query
        }
        AssociationKind::HasOne | AssociationKind::HasMany => {
            // The foreign key lives on the target and points back at the
            // owner's key.
            let keys = owner_key_columns(association, &ctx.owner_primary_key);
            let fks = foreign_key_columns(association, &keys);
            if keys.is_empty() || keys.len() != fks.len() {
                return None;
            }
            let values = owner.key_values(&keys)?;
            let mut query = query;
            for (fk, value) in fks.iter().zip(values) {
                query = query.filter_eq(&format!("{}.{}", ctx.target_table, fk), value);
            }
            query
        }
        AssociationKind::HasAndBelongsToMany => {
            let lookup = association.lookup_table(&ctx.owner_table, &ctx.target_table);
            let fk = opts
                .foreign_key
                .first()
                .cloned()
                .or_else(|| ctx.owner_primary_key.first().cloned())?;
            let assoc_fk = opts
                .association_foreign_key
                .clone()
                .or_else(|| ctx.target_primary_key.first().cloned())?;
            let target_pk = ctx.target_primary_key.first()?.clone();
            let value = owner.key_values(std::slice::from_ref(&fk))?.remove(0);

            query
                .join(Join {
                    lookup_table: lookup.clone(),
                    lookup_column: assoc_fk,
                    source_column: target_pk,
                })
                .filter_eq(&format!("{lookup}.{fk}"), value)
        }
    };

    if let Some((column, value)) = &opts.where_filter {
        query = query.filter_eq(column, value.clone());
    }
    if let Some((column, descending)) = &opts.order {
        query = query.order(if *descending {
            Order::desc(column)
        } else {
            Order::asc(column)
        });
    }

    Some(query)
}

/// Backend-neutral foreign-key stamping (the per-kind algorithm).
pub fn populate_association_object(
    child: &EntityRef,
    association: &Association,
    owner: &EntityRef,
    ctx: &AssociationContext,
) -> Result<()> {
    match association.kind() {
        AssociationKind::BelongsTo => {
            let keys = owner_key_columns(association, &ctx.target_primary_key);
            let fks = foreign_key_columns(association, &keys);
            let values = child.borrow().key_values(&keys);
            if let Some(values) = values {
                let mut owner = owner.borrow_mut();
                for (fk, value) in fks.iter().zip(values) {
                    owner.set(fk, value)?;
                }
            }
        }
        AssociationKind::HasOne | AssociationKind::HasMany => {
            let keys = owner_key_columns(association, &ctx.owner_primary_key);
            let fks = foreign_key_columns(association, &keys);
            let values = owner.borrow().key_values(&keys);
            if let Some(values) = values {
                let mut child = child.borrow_mut();
                for (fk, value) in fks.iter().zip(values) {
                    child.set(fk, value)?;
                }
            }
        }
        AssociationKind::HasAndBelongsToMany => {}
    }

    Ok(())
}

/// Derive a table/collection name from an entity type name: lowercase the
/// first letter, then pluralize.
#[must_use]
pub fn derive_table_name(entity_name: &str) -> String {
    pluralize(&lower_first(entity_name))
}

/// Default primary key column for an entity type name, e.g. `User` →
/// `userID`.
#[must_use]
pub fn default_primary_key(entity_name: &str) -> String {
    format!("{}ID", lower_first(entity_name))
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn is_consonant(c: char) -> bool {
    !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

fn pluralize(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let last = chars.last().copied();
    let second_last = chars.len().checked_sub(2).and_then(|i| chars.get(i)).copied();
    let second_last_consonant = second_last.is_some_and(is_consonant);

    match last {
        Some('y') if second_last_consonant => {
            let stem: String = chars[..chars.len() - 1].iter().collect();
            format!("{stem}ies")
        }
        Some('y') => format!("{name}s"),
        Some('x') => format!("{name}es"),
        Some('o') if second_last_consonant => format!("{name}es"),
        Some('o') => format!("{name}s"),
        Some('s') if matches!(second_last, Some('s' | 'z' | 'h')) => format!("{name}es"),
        Some('s') => name.to_string(),
        Some(_) => format!("{name}s"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_table_name() {
        assert_eq!(derive_table_name("User"), "users");
        assert_eq!(derive_table_name("Address"), "addresses");
        assert_eq!(derive_table_name("Company"), "companies");
        assert_eq!(derive_table_name("Box"), "boxes");
        assert_eq!(derive_table_name("Hero"), "heroes");
        assert_eq!(derive_table_name("Day"), "days");
    }

    #[test]
    fn test_default_primary_key() {
        assert_eq!(default_primary_key("User"), "userID");
        assert_eq!(default_primary_key("Address"), "addressID");
    }
}

//! In-memory relational backend.
//!
//! [`TableStore`] holds named tables of records with auto-increment
//! counters and a query log (the log is what lets tests assert lazy-load
//! idempotence). [`TableAdapter`] exposes one table of a shared store
//! through the [`Adapter`] contract, including the relational-only cascade
//! helpers: absent-child deletion for has-many and lookup-table
//! synchronization for many-to-many.

use datamap_core::{Association, Error, Record, Result, Value};
use datamap_query::{Filter, Query};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::eval::{run_query, values_equal};
use super::{Adapter, AssociationContext, populate_association_query};
use crate::entity::Entity;
use crate::mapper::MapperOptions;

/// Shared in-memory table storage.
#[derive(Default)]
pub struct TableStore {
    tables: RefCell<HashMap<String, Vec<Record>>>,
    counters: RefCell<HashMap<String, i64>>,
    query_log: RefCell<Vec<String>>,
}

fn plain(row: &Record, column: &str) -> Value {
    row.get(column).cloned().unwrap_or(Value::Null)
}

impl TableStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next auto-increment value for `table`.
    pub fn next_id(&self, table: &str) -> i64 {
        let mut counters = self.counters.borrow_mut();
        let counter = counters.entry(table.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Append a row to `table`.
    pub fn insert(&self, table: &str, record: Record) {
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    /// Snapshot of all rows in `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .borrow()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Run a query, recording it in the query log.
    #[must_use]
    pub fn select(&self, query: &Query) -> Vec<Record> {
        self.query_log.borrow_mut().push(query.describe());
        self.select_unlogged(query, true)
    }

    fn select_unlogged(&self, query: &Query, apply_limit: bool) -> Vec<Record> {
        let tables = self.tables.borrow();
        let rows = tables.get(query.source()).map_or(&[][..], Vec::as_slice);
        let lookup_rows = query
            .join_clause()
            .and_then(|j| tables.get(&j.lookup_table))
            .map_or(&[][..], Vec::as_slice);
        run_query(rows, lookup_rows, query, &plain, apply_limit)
    }

    /// Number of rows matching `query`, ignoring limit/offset.
    #[must_use]
    pub fn count(&self, query: &Query) -> u64 {
        self.query_log.borrow_mut().push(query.describe());
        self.select_unlogged(query, false).len() as u64
    }

    /// Merge `changes` into every row matching all `filters`. Returns the
    /// number of rows touched.
    pub fn update_where(&self, table: &str, filters: &[Filter], changes: &Record) -> usize {
        let matching = self.matching_indices(table, filters);
        let mut tables = self.tables.borrow_mut();
        let Some(rows) = tables.get_mut(table) else {
            return 0;
        };
        for &index in &matching {
            for (name, value) in changes {
                rows[index].set(name, value.clone());
            }
        }
        matching.len()
    }

    /// Remove every row matching all `filters`. Returns the number removed.
    pub fn delete_where(&self, table: &str, filters: &[Filter]) -> usize {
        let matching = self.matching_indices(table, filters);
        let mut tables = self.tables.borrow_mut();
        let Some(rows) = tables.get_mut(table) else {
            return 0;
        };
        for &index in matching.iter().rev() {
            rows.remove(index);
        }
        matching.len()
    }

    fn matching_indices(&self, table: &str, filters: &[Filter]) -> Vec<usize> {
        let mut query = Query::from(table);
        for filter in filters {
            query = query.filter(filter.clone());
        }
        let matching = self.select_unlogged(&query, false);
        let tables = self.tables.borrow();
        let Some(rows) = tables.get(table) else {
            return Vec::new();
        };
        rows.iter()
            .enumerate()
            .filter(|(_, row)| matching.contains(row))
            .map(|(i, _)| i)
            .collect()
    }

    /// Queries run so far, most recent last.
    #[must_use]
    pub fn query_log(&self) -> Vec<String> {
        self.query_log.borrow().clone()
    }

    /// Number of queries run so far.
    #[must_use]
    pub fn queries_run(&self) -> usize {
        self.query_log.borrow().len()
    }

    /// Forget the query log.
    pub fn clear_log(&self) {
        self.query_log.borrow_mut().clear();
    }
}

/// Relational-style adapter over one table of a [`TableStore`].
pub struct TableAdapter {
    store: Rc<TableStore>,
    table: String,
    primary_key: Vec<String>,
    auto_increment: bool,
}

impl TableAdapter {
    /// Build an adapter for `entity_name`, deriving table and key names from
    /// the entity name where the options don't override them.
    #[must_use]
    pub fn new(store: Rc<TableStore>, entity_name: &str, options: &MapperOptions) -> Self {
        TableAdapter {
            store,
            table: options.resolve_table_name(entity_name),
            primary_key: options.resolve_primary_key(entity_name),
            auto_increment: options.auto_increment,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Rc<TableStore> {
        &self.store
    }
}

impl Adapter for TableAdapter {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    fn supports_generated_keys(&self) -> bool {
        self.auto_increment && self.primary_key.len() == 1
    }

    fn fetch_one(&self, query: &Query) -> Result<Option<Record>> {
        let limited = query.clone().limit(1);
        Ok(self.store.select(&limited).into_iter().next())
    }

    fn fetch_all(&self, query: &Query) -> Result<Vec<Record>> {
        Ok(self.store.select(query))
    }

    fn insert(&self, mut record: Record) -> Result<Option<Value>> {
        let generated = if self.supports_generated_keys() {
            let pk = &self.primary_key[0];
            let missing = record.get(pk).is_none_or(Value::is_null);
            if missing {
                let id = Value::Int(self.store.next_id(&self.table));
                record.set(pk.clone(), id.clone());
                Some(id)
            } else {
                None
            }
        } else {
            None
        };

        self.store.insert(&self.table, record);
        Ok(generated)
    }

    fn update(&self, record: Record, identity: &[Filter]) -> Result<bool> {
        Ok(self.store.update_where(&self.table, identity, &record) > 0)
    }

    fn delete(&self, identity: &[Filter]) -> Result<bool> {
        Ok(self.store.delete_where(&self.table, identity) > 0)
    }

    fn count(&self, query: &Query) -> Result<u64> {
        Ok(self.store.count(query))
    }

    fn delete_absent_children(
        &self,
        owner: &Entity,
        kept: &[Value],
        association: &Association,
        ctx: &AssociationContext,
    ) -> Result<u64> {
        let Some(query) = populate_association_query(self.query(), association, owner, ctx)
        else {
            return Ok(0);
        };
        let [pk] = ctx.target_primary_key.as_slice() else {
            return Ok(0);
        };

        let stale = query.filter(Filter::not_in(
            &format!("{}.{}", ctx.target_table, pk),
            kept.to_vec(),
        ));
        let mut removed = 0;
        for row in self.store.select(&stale) {
            let Some(key) = row.get(pk).cloned() else {
                continue;
            };
            removed += self
                .store
                .delete_where(&self.table, &[Filter::eq(pk, key)]) as u64;
        }
        Ok(removed)
    }

    fn sync_lookup_entries(
        &self,
        owner: &Entity,
        target_keys: &[Value],
        association: &Association,
        ctx: &AssociationContext,
    ) -> Result<()> {
        let opts = association.options();
        let lookup = association.lookup_table(&ctx.owner_table, &ctx.target_table);
        let fk = opts
            .foreign_key
            .first()
            .cloned()
            .or_else(|| ctx.owner_primary_key.first().cloned())
            .ok_or_else(|| Error::MissingPrimaryKey(ctx.owner_table.clone()))?;
        let assoc_fk = opts
            .association_foreign_key
            .clone()
            .or_else(|| ctx.target_primary_key.first().cloned())
            .ok_or_else(|| Error::MissingPrimaryKey(ctx.target_table.clone()))?;

        let Some(owner_key) = owner.key_values(std::slice::from_ref(&fk)) else {
            // Unsaved owner; nothing to link yet.
            return Ok(());
        };
        let owner_key = owner_key.into_iter().next().unwrap_or(Value::Null);

        // Insert missing pairs, keyed by (owner key, target key).
        let existing = self.store.rows(&lookup);
        for target_key in target_keys {
            let present = existing.iter().any(|row| {
                values_equal(&plain(row, &fk), &owner_key)
                    && values_equal(&plain(row, &assoc_fk), target_key)
            });
            if !present {
                let link = Record::new()
                    .with(fk.clone(), owner_key.clone())
                    .with(assoc_fk.clone(), target_key.clone());
                self.store.insert(&lookup, link);
            }
        }

        // Remove pairs for this owner that are no longer held.
        self.store.delete_where(
            &lookup,
            &[
                Filter::eq(&fk, owner_key),
                Filter::not_in(&assoc_fk, target_keys.to_vec()),
            ],
        );

        Ok(())
    }
}

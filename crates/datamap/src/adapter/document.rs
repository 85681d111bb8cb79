//! In-memory document backend.
//!
//! [`DocumentStore`] holds schema-free collections of documents keyed by a
//! `_id` field. [`DocumentAdapter`] maps one entity type onto a collection:
//! an optional id field on the entity is relocated to `_id` on the way into
//! storage and back on the way out, so the mapper never sees `_id` unless it
//! declares it. Generated ids are 24-hex-digit strings.
//!
//! Association semantics match the relational adapter — including the
//! lookup-collection join for many-to-many — because both interpret the same
//! neutral query AST.

use datamap_core::{Association, Error, Record, Result, Value};
use datamap_query::{Filter, Query};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::eval::{run_query, values_equal};
use super::{Adapter, AssociationContext};
use crate::entity::Entity;
use crate::mapper::MapperOptions;

/// The document key field.
pub const ID_FIELD: &str = "_id";

/// Shared in-memory document storage.
#[derive(Default)]
pub struct DocumentStore {
    collections: RefCell<HashMap<String, Vec<Record>>>,
    id_counter: RefCell<u64>,
    query_log: RefCell<Vec<String>>,
}

impl DocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new document id (24 hex digits, monotonic).
    pub fn generate_id(&self) -> String {
        let mut counter = self.id_counter.borrow_mut();
        *counter += 1;
        format!("{:024x}", *counter)
    }

    /// Append a document to `collection`.
    pub fn insert(&self, collection: &str, document: Record) {
        self.collections
            .borrow_mut()
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Snapshot of all documents in `collection`.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Record> {
        self.collections
            .borrow()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn select(&self, query: &Query, value_of: &super::eval::ValueOf<'_>, apply_limit: bool) -> Vec<Record> {
        self.query_log.borrow_mut().push(query.describe());
        let collections = self.collections.borrow();
        let docs = collections.get(query.source()).map_or(&[][..], Vec::as_slice);
        let lookup = query
            .join_clause()
            .and_then(|j| collections.get(&j.lookup_table))
            .map_or(&[][..], Vec::as_slice);
        run_query(docs, lookup, query, value_of, apply_limit)
    }

    /// Number of queries run so far.
    #[must_use]
    pub fn queries_run(&self) -> usize {
        self.query_log.borrow().len()
    }

    fn retain_where<F: Fn(&Record) -> bool>(&self, collection: &str, keep: F) -> usize {
        let mut collections = self.collections.borrow_mut();
        let Some(docs) = collections.get_mut(collection) else {
            return 0;
        };
        let before = docs.len();
        docs.retain(|d| keep(d));
        before - docs.len()
    }

    fn update_matching<F: Fn(&Record) -> bool>(
        &self,
        collection: &str,
        matches: F,
        changes: &Record,
    ) -> usize {
        let mut collections = self.collections.borrow_mut();
        let Some(docs) = collections.get_mut(collection) else {
            return 0;
        };
        let mut touched = 0;
        for doc in docs.iter_mut() {
            if matches(doc) {
                for (name, value) in changes {
                    doc.set(name, value.clone());
                }
                touched += 1;
            }
        }
        touched
    }
}

/// Document-style adapter over one collection of a [`DocumentStore`].
pub struct DocumentAdapter {
    store: Rc<DocumentStore>,
    collection: String,
    /// Entity field relocated to `_id`, when the entity declares its own id.
    id_field: Option<String>,
    primary_key: Vec<String>,
}

impl DocumentAdapter {
    /// Build an adapter for `entity_name` over a shared store.
    ///
    /// The mapper's primary key (explicit or derived from the entity name)
    /// becomes the id field mapped onto `_id`.
    #[must_use]
    pub fn new(store: Rc<DocumentStore>, entity_name: &str, options: &MapperOptions) -> Self {
        let primary_key = options.resolve_primary_key(entity_name);
        let id_field = match primary_key.as_slice() {
            [single] if single != ID_FIELD => Some(single.clone()),
            _ => None,
        };
        DocumentAdapter {
            store,
            collection: options.resolve_table_name(entity_name),
            id_field,
            primary_key,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Rc<DocumentStore> {
        &self.store
    }

    /// Move the mapped id field to `_id` for storage.
    fn to_document(&self, mut record: Record) -> Record {
        if let Some(id_field) = &self.id_field {
            if !record.contains(ID_FIELD) {
                if let Some(id) = record.remove(id_field) {
                    let mut document = Record::new().with(ID_FIELD, id);
                    for (name, value) in &record {
                        document.set(name, value.clone());
                    }
                    return document;
                }
            }
        }
        record
    }

    /// Move `_id` back to the mapped id field for hydration.
    fn from_document(&self, mut document: Record) -> Record {
        if let Some(id_field) = &self.id_field {
            if document.get(id_field).is_none_or(Value::is_null) {
                if let Some(id) = document.remove(ID_FIELD) {
                    document.set(id_field.clone(), id);
                }
            }
        }
        document
    }

    /// Column resolution: a filter on the mapped id field reads `_id`.
    fn value_of(&self) -> impl Fn(&Record, &str) -> Value + '_ {
        move |doc: &Record, column: &str| {
            let column = match &self.id_field {
                Some(id_field) if column == id_field => ID_FIELD,
                _ => column,
            };
            doc.get(column).cloned().unwrap_or(Value::Null)
        }
    }

    fn doc_matches(&self, doc: &Record, filters: &[Filter]) -> bool {
        let value_of = self.value_of();
        filters
            .iter()
            .all(|f| super::eval::filter_accepts(f, &value_of(doc, &f.column.column)))
    }
}

impl Adapter for DocumentAdapter {
    fn table_name(&self) -> &str {
        &self.collection
    }

    fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    fn supports_generated_keys(&self) -> bool {
        true
    }

    fn fetch_one(&self, query: &Query) -> Result<Option<Record>> {
        let limited = query.clone().limit(1);
        Ok(self
            .store
            .select(&limited, &self.value_of(), true)
            .into_iter()
            .next()
            .map(|d| self.from_document(d)))
    }

    fn fetch_all(&self, query: &Query) -> Result<Vec<Record>> {
        Ok(self
            .store
            .select(query, &self.value_of(), true)
            .into_iter()
            .map(|d| self.from_document(d))
            .collect())
    }

    fn insert(&self, record: Record) -> Result<Option<Value>> {
        let mut document = self.to_document(record);
        let generated = if document.get(ID_FIELD).is_none_or(Value::is_null) {
            let id = Value::Text(self.store.generate_id());
            document.set(ID_FIELD, id.clone());
            Some(id)
        } else {
            None
        };
        self.store.insert(&self.collection, document);
        Ok(generated)
    }

    fn update(&self, record: Record, identity: &[Filter]) -> Result<bool> {
        let changes = self.to_document(record);
        let touched =
            self.store
                .update_matching(&self.collection, |d| self.doc_matches(d, identity), &changes);
        Ok(touched > 0)
    }

    fn delete(&self, identity: &[Filter]) -> Result<bool> {
        let removed = self
            .store
            .retain_where(&self.collection, |d| !self.doc_matches(d, identity));
        Ok(removed > 0)
    }

    fn count(&self, query: &Query) -> Result<u64> {
        Ok(self.store.select(query, &self.value_of(), false).len() as u64)
    }

    // delete_absent_children keeps the no-op default: removal semantics for
    // has-many rows are a relational concern.

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
            return Ok(());
        };
        let owner_key = owner_key.into_iter().next().unwrap_or(Value::Null);

        let existing = self.store.documents(&lookup);
        for target_key in target_keys {
            let present = existing.iter().any(|doc| {
                values_equal(&doc.get(&fk).cloned().unwrap_or(Value::Null), &owner_key)
                    && values_equal(
                        &doc.get(&assoc_fk).cloned().unwrap_or(Value::Null),
                        target_key,
                    )
            });
            if !present {
                let link = Record::new()
                    .with(fk.clone(), owner_key.clone())
                    .with(assoc_fk.clone(), target_key.clone());
                self.store.insert(&lookup, link);
            }
        }

        self.store.retain_where(&lookup, |doc| {
            let owner_side = doc.get(&fk).cloned().unwrap_or(Value::Null);
            if !values_equal(&owner_side, &owner_key) {
                return true;
            }
            let target_side = doc.get(&assoc_fk).cloned().unwrap_or(Value::Null);
            target_keys.iter().any(|k| values_equal(&target_side, k))
        });

        Ok(())
    }
}

//! Association descriptors.
//!
//! An [`Association`] describes one declared relationship between two entity
//! types: its kind, the target entity type, the foreign key involved and an
//! option bag. Descriptors are declared on an [`EntityDef`](crate::EntityDef)
//! and are immutable once built; all query building and foreign-key stamping
//! happens in the mapper/adapter layer against these descriptions.

use crate::value::Value;

/// The kind of a declared relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// The foreign key lives on the owning entity and points at the target's
    /// primary key.
    BelongsTo,
    /// A single target row carries a foreign key pointing back at the owner.
    HasOne,
    /// Many target rows carry a foreign key pointing back at the owner.
    HasMany,
    /// Many-to-many through a lookup table of (owner key, target key) pairs.
    HasAndBelongsToMany,
}

impl AssociationKind {
    /// Whether this kind resolves to a collection of entities.
    #[must_use]
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            AssociationKind::HasMany | AssociationKind::HasAndBelongsToMany
        )
    }
}

/// Options accepted when declaring an association.
///
/// All fields are optional; adapters fall back to primary-key-derived
/// defaults when a key name is not given.
#[derive(Debug, Clone, Default)]
pub struct AssociationOptions {
    /// Foreign key column(s). Compound keys are ANDed in declaration order.
    pub foreign_key: Vec<String>,
    /// Override for the key column(s) read from the owning entity.
    pub primary_key: Vec<String>,
    /// Lookup table name for many-to-many associations. Defaults to the two
    /// table names sorted lexicographically and concatenated.
    pub lookup_table: Option<String>,
    /// Lookup-table column pointing at the target entity (many-to-many).
    pub association_foreign_key: Option<String>,
    /// Extra equality filter appended after the primary condition.
    pub where_filter: Option<(String, Value)>,
    /// Ordering applied to association queries: column and descending flag.
    pub order: Option<(String, bool)>,
    /// Whether nested mass-assignment and cascaded saves are permitted.
    pub allow_nested_assignment: bool,
}

impl AssociationOptions {
    /// Empty option bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single foreign key column.
    #[must_use]
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = vec![column.into()];
        self
    }

    /// Set a compound foreign key.
    #[must_use]
    pub fn compound_foreign_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Override the key column read from the owning entity.
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = vec![column.into()];
        self
    }

    /// Set an explicit lookup table name (many-to-many only).
    #[must_use]
    pub fn lookup_table(mut self, table: impl Into<String>) -> Self {
        self.lookup_table = Some(table.into());
        self
    }

    /// Set the lookup-table column pointing at the target entity.
    #[must_use]
    pub fn association_foreign_key(mut self, column: impl Into<String>) -> Self {
        self.association_foreign_key = Some(column.into());
        self
    }

    /// Append an equality filter to every association query.
    #[must_use]
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_filter = Some((column.into(), value.into()));
        self
    }

    /// Order association queries by `column`, ascending.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order = Some((column.into(), false));
        self
    }

    /// Order association queries by `column`, descending.
    #[must_use]
    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some((column.into(), true));
        self
    }

    /// Permit nested mass-assignment and cascaded saves.
    #[must_use]
    pub fn allow_nested_assignment(mut self, allow: bool) -> Self {
        self.allow_nested_assignment = allow;
        self
    }
}

/// A declared relationship between two entity types.
///
/// Immutable once built. The owning entity type name is stamped by the
/// [`EntityDefBuilder`](crate::EntityDefBuilder) when the definition is
/// assembled.
#[derive(Debug, Clone)]
pub struct Association {
    kind: AssociationKind,
    name: String,
    target: String,
    owner: String,
    options: AssociationOptions,
}

impl Association {
    /// Build a descriptor. Usually called through the entity-def builder.
    pub fn new(
        kind: AssociationKind,
        name: impl Into<String>,
        target: impl Into<String>,
        owner: impl Into<String>,
        options: AssociationOptions,
    ) -> Self {
        Association {
            kind,
            name: name.into(),
            target: target.into(),
            owner: owner.into(),
            options,
        }
    }

    /// The relationship kind.
    #[must_use]
    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// The shortname this association was declared with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The target entity type name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The owning entity type name.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The option bag.
    #[must_use]
    pub fn options(&self) -> &AssociationOptions {
        &self.options
    }

    /// Whether nested mass-assignment and cascaded saves are permitted.
    #[must_use]
    pub fn allows_nested_assignment(&self) -> bool {
        self.options.allow_nested_assignment
    }

    /// The lookup table for a many-to-many association, applying the default
    /// naming scheme when no override is set.
    #[must_use]
    pub fn lookup_table(&self, owner_table: &str, target_table: &str) -> String {
        self.options
            .lookup_table
            .clone()
            .unwrap_or_else(|| default_lookup_table(owner_table, target_table))
    }
}

/// Default lookup-table name for a many-to-many association: the two table
/// names sorted lexicographically, the second capitalized, concatenated
/// (`addresses` + `users` → `addressesUsers`).
#[must_use]
pub fn default_lookup_table(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut chars = second.chars();
    let capitalized = match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    format!("{first}{capitalized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_collection_predicate() {
        assert!(!AssociationKind::BelongsTo.is_collection());
        assert!(!AssociationKind::HasOne.is_collection());
        assert!(AssociationKind::HasMany.is_collection());
        assert!(AssociationKind::HasAndBelongsToMany.is_collection());
    }

    #[test]
    fn test_default_lookup_table_sorts_and_capitalizes() {
        assert_eq!(default_lookup_table("users", "addresses"), "addressesUsers");
        assert_eq!(default_lookup_table("addresses", "users"), "addressesUsers");
        assert_eq!(default_lookup_table("heroes", "powers"), "heroesPowers");
    }

    #[test]
    fn test_lookup_table_override_wins() {
        let assoc = Association::new(
            AssociationKind::HasAndBelongsToMany,
            "addresses",
            "Address",
            "User",
            AssociationOptions::new().lookup_table("userAddressLinks"),
        );
        assert_eq!(assoc.lookup_table("users", "addresses"), "userAddressLinks");
    }

    #[test]
    fn test_options_builder() {
        let options = AssociationOptions::new()
            .foreign_key("userID")
            .order_by_desc("createdAt")
            .where_eq("active", true)
            .allow_nested_assignment(true);
        assert_eq!(options.foreign_key, vec!["userID".to_string()]);
        assert_eq!(options.order, Some(("createdAt".to_string(), true)));
        assert_eq!(
            options.where_filter,
            Some(("active".to_string(), Value::Bool(true)))
        );
        assert!(options.allow_nested_assignment);
    }
}

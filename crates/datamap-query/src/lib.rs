//! Backend-neutral query representation for datamap.
//!
//! A [`Query`] is a declarative description of a result-set selection:
//! a source table/collection, ANDed filter terms, an optional lookup-table
//! join, ordering and limit/offset. Mappers and associations build queries;
//! each storage adapter interprets them against its own backend. Keeping the
//! representation neutral is what gives relational and document backends the
//! same association semantics.
//!
//! Builders are chainable and `Query` is `Clone`, so an association can hand
//! out a fresh copy of its memoized query to every caller without one
//! caller's filters leaking into the next.

pub mod clause;

pub use clause::{Cmp, ColumnRef, Direction, Filter, Join, Order};

use std::fmt;

/// A declarative selection over one table/collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    source: String,
    filters: Vec<Filter>,
    join: Option<Join>,
    orders: Vec<Order>,
    limit: Option<u64>,
    offset: u64,
}

impl Query {
    /// A query over all rows of `source`.
    pub fn from(source: impl Into<String>) -> Self {
        Query {
            source: source.into(),
            ..Query::default()
        }
    }

    /// The source table/collection name.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Append a filter term (terms are ANDed).
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Append an equality filter.
    #[must_use]
    pub fn filter_eq(self, column: &str, value: impl Into<datamap_core::Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    /// Set the lookup-table join. At most one join per query; association
    /// queries never need more.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    /// Append an ordering term.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// Limit the result set to `n` rows.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Limit the result set to `n` rows starting at `offset`.
    #[must_use]
    pub fn limit_offset(mut self, n: u64, offset: u64) -> Self {
        self.limit = Some(n);
        self.offset = offset;
        self
    }

    /// The filter terms.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The lookup-table join, if any.
    #[must_use]
    pub fn join_clause(&self) -> Option<&Join> {
        self.join.as_ref()
    }

    /// The ordering terms.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// The row limit, if any.
    #[must_use]
    pub fn limit_clause(&self) -> Option<u64> {
        self.limit
    }

    /// The row offset.
    #[must_use]
    pub fn offset_clause(&self) -> u64 {
        self.offset
    }

    /// Canonical rendering of the selection, used in logs and tests.
    ///
    /// The shape is SQL-like (`source [join] WHERE a = 1 AND b = 2 ORDER BY c
    /// ASC LIMIT n OFFSET m`) but purely descriptive; adapters do not parse
    /// it.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = self.source.clone();
        if let Some(join) = &self.join {
            out.push(' ');
            out.push_str(&join.to_string());
        }
        if !self.filters.is_empty() {
            let terms: Vec<String> = self.filters.iter().map(ToString::to_string).collect();
            out.push_str(" WHERE ");
            out.push_str(&terms.join(" AND "));
        }
        if !self.orders.is_empty() {
            let terms: Vec<String> = self.orders.iter().map(ToString::to_string).collect();
            out.push_str(" ORDER BY ");
            out.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.limit {
            out.push_str(&format!(" LIMIT {limit}"));
            if self.offset > 0 {
                out.push_str(&format!(" OFFSET {}", self.offset));
            }
        }
        out
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamap_core::Value;

    #[test]
    fn test_builder_chain() {
        let query = Query::from("addresses")
            .filter_eq("addresses.userID", 1i64)
            .order(Order::asc("city"))
            .limit(10);

        assert_eq!(query.source(), "addresses");
        assert_eq!(query.filters().len(), 1);
        assert_eq!(query.limit_clause(), Some(10));
        assert_eq!(
            query.describe(),
            "addresses WHERE addresses.userID = 1 ORDER BY city ASC LIMIT 10"
        );
    }

    #[test]
    fn test_clone_isolates_callers() {
        let base = Query::from("addresses").filter_eq("userID", 1i64);
        let narrowed = base.clone().filter_eq("city", "London");

        assert_eq!(base.filters().len(), 1);
        assert_eq!(narrowed.filters().len(), 2);
    }

    #[test]
    fn test_join_rendering() {
        let query = Query::from("addresses")
            .join(Join {
                lookup_table: "addressesUsers".to_string(),
                lookup_column: "addressID".to_string(),
                source_column: "addressID".to_string(),
            })
            .filter(Filter::eq("addressesUsers.userID", Value::Int(1)));

        assert_eq!(
            query.describe(),
            "addresses JOIN addressesUsers ON addressesUsers.addressID = addressID \
             WHERE addressesUsers.userID = 1"
        );
    }

    #[test]
    fn test_limit_offset() {
        let query = Query::from("users").limit_offset(5, 10);
        assert_eq!(query.describe(), "users LIMIT 5 OFFSET 10");
    }
}

//! Shared query interpretation for the in-process backends.
//!
//! Both stores evaluate the same neutral [`Query`] AST; only column value
//! resolution differs (the document store relocates its `_id` key), so the
//! row selection logic lives here and takes a resolver closure.

use datamap_core::{Record, Value};
use datamap_query::{Cmp, Filter, Query};
use std::cmp::Ordering;

/// Resolve a column of a source row to a value. `Null` for absent columns.
pub(crate) type ValueOf<'a> = dyn Fn(&Record, &str) -> Value + 'a;

/// Total-enough ordering over comparable values; `None` when the variants
/// are not comparable (which makes any comparison filter fail).
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Whether two values are equal under store semantics.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

pub(crate) fn filter_accepts(filter: &Filter, actual: &Value) -> bool {
    match filter.cmp {
        Cmp::In => filter.values.iter().any(|v| values_equal(actual, v)),
        Cmp::NotIn => !filter.values.iter().any(|v| values_equal(actual, v)),
        cmp => {
            let Some(ordering) = compare(actual, filter.value()) else {
                return false;
            };
            match cmp {
                Cmp::Eq => ordering == Ordering::Equal,
                Cmp::Ne => ordering != Ordering::Equal,
                Cmp::Lt => ordering == Ordering::Less,
                Cmp::Le => ordering != Ordering::Greater,
                Cmp::Gt => ordering == Ordering::Greater,
                Cmp::Ge => ordering != Ordering::Less,
                Cmp::In | Cmp::NotIn => unreachable!(),
            }
        }
    }
}

/// Run `query` over `rows`, with `lookup_rows` backing the query's join (if
/// any). Ordering and limit/offset are applied; `apply_limit` is switched
/// off for counting.
pub(crate) fn run_query(
    rows: &[Record],
    lookup_rows: &[Record],
    query: &Query,
    value_of: &ValueOf<'_>,
    apply_limit: bool,
) -> Vec<Record> {
    let join = query.join_clause();
    let source = query.source();

    let mut selected: Vec<Record> = rows
        .iter()
        .filter(|row| {
            for filter in query.filters() {
                let lookup_side = join.is_some_and(|j| {
                    filter.column.table.as_deref() == Some(j.lookup_table.as_str())
                });
                if lookup_side {
                    continue;
                }
                if !filter.column.refers_to(source) {
                    return false;
                }
                if !filter_accepts(filter, &column_value(row, &filter.column.column, value_of)) {
                    return false;
                }
            }

            if let Some(join) = join {
                let source_value = column_value(row, &join.source_column, value_of);
                let matched = lookup_rows.iter().any(|lookup| {
                    let lookup_value = lookup
                        .get(&join.lookup_column)
                        .cloned()
                        .unwrap_or(Value::Null);
                    if !values_equal(&lookup_value, &source_value) {
                        return false;
                    }
                    query
                        .filters()
                        .iter()
                        .filter(|f| {
                            f.column.table.as_deref() == Some(join.lookup_table.as_str())
                        })
                        .all(|f| {
                            let actual =
                                lookup.get(&f.column.column).cloned().unwrap_or(Value::Null);
                            filter_accepts(f, &actual)
                        })
                });
                if !matched {
                    return false;
                }
            }

            true
        })
        .cloned()
        .collect();

    if !query.orders().is_empty() {
        selected.sort_by(|a, b| {
            for order in query.orders() {
                let va = column_value(a, &order.column.column, value_of);
                let vb = column_value(b, &order.column.column, value_of);
                let ordering = compare(&va, &vb).unwrap_or(Ordering::Equal);
                let ordering = match order.direction {
                    datamap_query::Direction::Asc => ordering,
                    datamap_query::Direction::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    if apply_limit {
        let offset = usize::try_from(query.offset_clause()).unwrap_or(usize::MAX);
        let mut selected: Vec<Record> = selected.into_iter().skip(offset).collect();
        if let Some(limit) = query.limit_clause() {
            selected.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        selected
    } else {
        selected
    }
}

fn column_value(row: &Record, column: &str, value_of: &ValueOf<'_>) -> Value {
    value_of(row, column)
}

//! Filter, join and ordering clauses.

use datamap_core::Value;
use std::fmt;

/// Comparison operator for a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Member of a value set.
    In,
    /// Not a member of a value set.
    NotIn,
}

impl Cmp {
    /// Canonical operator rendering.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "!=",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
            Cmp::In => "IN",
            Cmp::NotIn => "NOT IN",
        }
    }
}

/// A column reference, optionally qualified with a table/collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Qualifying table or collection name, if any.
    pub table: Option<String>,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// Parse a `table.column` or bare `column` reference.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once('.') {
            Some((table, column)) => ColumnRef {
                table: Some(table.to_string()),
                column: column.to_string(),
            },
            None => ColumnRef {
                table: None,
                column: spec.to_string(),
            },
        }
    }

    /// A qualified reference.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    /// Whether this reference points into `table` (unqualified references
    /// match any table).
    #[must_use]
    pub fn refers_to(&self, table: &str) -> bool {
        self.table.as_deref().is_none_or(|t| t == table)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// One comparison term. Terms on a query are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// The column being tested.
    pub column: ColumnRef,
    /// Comparison operator.
    pub cmp: Cmp,
    /// Comparison operand(s); multiple values only for `In`/`NotIn`.
    pub values: Vec<Value>,
}

impl Filter {
    /// Build a single-operand filter.
    pub fn new(column: &str, cmp: Cmp, value: impl Into<Value>) -> Self {
        Filter {
            column: ColumnRef::parse(column),
            cmp,
            values: vec![value.into()],
        }
    }

    /// Equality shorthand.
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::new(column, Cmp::Eq, value)
    }

    /// Set-membership filter.
    pub fn in_set(column: &str, values: Vec<Value>) -> Self {
        Filter {
            column: ColumnRef::parse(column),
            cmp: Cmp::In,
            values,
        }
    }

    /// Set-exclusion filter.
    pub fn not_in(column: &str, values: Vec<Value>) -> Self {
        Filter {
            column: ColumnRef::parse(column),
            cmp: Cmp::NotIn,
            values,
        }
    }

    /// The single operand of a comparison filter.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.values[0]
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cmp {
            Cmp::In | Cmp::NotIn => {
                let rendered: Vec<String> = self.values.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "{} {} ({})",
                    self.column,
                    self.cmp.symbol(),
                    rendered.join(", ")
                )
            }
            _ => write!(f, "{} {} {}", self.column, self.cmp.symbol(), self.value()),
        }
    }
}

/// An inner join against a lookup table, used by many-to-many associations.
///
/// Semantics: keep rows of the query source for which a row exists in
/// `lookup_table` with `lookup_table.lookup_column = source.source_column`.
/// Filters qualified with the lookup-table name apply to the lookup row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// The lookup table/collection name.
    pub lookup_table: String,
    /// Column in the lookup table matched against the source column.
    pub lookup_column: String,
    /// Column of the query source matched by the lookup column.
    pub source_column: String,
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JOIN {0} ON {0}.{1} = {2}",
            self.lookup_table, self.lookup_column, self.source_column
        )
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column to sort by.
    pub column: ColumnRef,
    /// Sort direction.
    pub direction: Direction,
}

impl Order {
    /// Ascending order by `column`.
    pub fn asc(column: &str) -> Self {
        Order {
            column: ColumnRef::parse(column),
            direction: Direction::Asc,
        }
    }

    /// Descending order by `column`.
    pub fn desc(column: &str) -> Self {
        Order {
            column: ColumnRef::parse(column),
            direction: Direction::Desc,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{} ASC", self.column),
            Direction::Desc => write!(f, "{} DESC", self.column),
        }
    }
}

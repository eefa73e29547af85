//! # Assemble PostgREST filters into query parameters
//!
//! PostgREST encodes row filters into URL query strings. The simplest
//! filter is a pair like `age=gte.25`, which means "the column `age`
//! must be greater than or equal to 25". The operator is a prefix of
//! the value, and the column is the key.
//!
//! Since a query string key can only sensibly appear once, a second
//! filter on the same column cannot be written as another `age=...`
//! pair. Instead the filters are gathered into a single `and`
//! parameter, which holds a parenthesised, comma separated list of
//! `column.operator.value` fragments:
//! `and=(age.gte.25,age.lte.35)`.
//!
//! The rules applied by [`Filters::push`] are:
//! - The first filter on a column is written standalone, unless an
//!   `and` group already exists, in which case it joins the group.
//! - When a column that has a standalone filter is filtered again,
//!   its standalone filter is removed, and both filters are appended
//!   to the group, followed by any standalone filters recorded after
//!   the first one. This keeps every filter on a column adjacent, and
//!   means that no column is ever filtered both standalone and inside
//!   the group.
//! - Filters on a column that is already inside the group are
//!   appended to the end of the group.
//!
//! Logical operators supplied as raw filter lists, with
//! [`Filters::set_or`] and [`Filters::set_and`], don't take part in
//! this merging: they set the `or` or `<table>.or` parameter outright.
//!
//! Example:
//! ```rust
//! use postgrest_query::filtering::Filters;
//!
//! let mut filters = Filters::new();
//! filters.push("status", "eq.active");
//! filters.push("age", "gte.25");
//! filters.push("age", "lte.35");
//! assert_eq!(
//!     filters.pairs(),
//!     vec![
//!         ("status".to_string(), "eq.active".to_string()),
//!         ("and".to_string(), "(age.gte.25,age.lte.35)".to_string()),
//!     ]
//! );
//! ```
//!
//! Filters are kept as a small expression tree of [`FilterExpr`]
//! values, and only rendered into strings when the request is built.

pub mod ops;

use thiserror::Error;

use crate::params::scoped_key;

/// Errors produced while building filters.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The operator is not one PostgREST understands.
    #[error("invalid filter operator '{0}'")]
    UnknownOperator(String),
    /// The full text search type is not `plain`, `phrase` or `websearch`.
    #[error("invalid text search type '{0}'")]
    UnknownTextSearchType(String),
    /// An inclusive range ends before it starts.
    #[error("invalid range: {to} is before {from}")]
    InvalidRange { from: usize, to: usize },
    /// A header name or value that cannot be sent.
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
}

/// A node in a filter expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterExpr {
    /// A condition on a single column, where `condition` is the
    /// operator and value, e.g. `gte.25`.
    Condition { column: String, condition: String },
    /// A caller supplied, already formatted list of filters.
    Raw(String),
    /// All of the children must hold.
    And(Vec<FilterExpr>),
    /// At least one of the children must hold.
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn condition(column: &str, condition: impl Into<String>) -> Self {
        FilterExpr::Condition {
            column: column.to_string(),
            condition: condition.into(),
        }
    }

    /// The column this expression filters, if it is a single condition.
    pub fn column(&self) -> Option<&str> {
        match self {
            FilterExpr::Condition { column, .. } => Some(column),
            _ => None,
        }
    }

    /// Render this expression as one fragment of a logical group.
    pub fn fragment(&self) -> String {
        match self {
            FilterExpr::Condition { column, condition } => format!("{}.{}", column, condition),
            FilterExpr::Raw(raw) => raw.clone(),
            FilterExpr::And(children) => format!("and{}", group_value(children)),
            FilterExpr::Or(children) => format!("or{}", group_value(children)),
        }
    }

    /// Render this expression as the value of a query parameter.
    pub fn value(&self) -> String {
        match self {
            FilterExpr::Condition { condition, .. } => condition.clone(),
            FilterExpr::Raw(raw) => format!("({})", raw),
            FilterExpr::And(children) | FilterExpr::Or(children) => group_value(children),
        }
    }
}

fn group_value(children: &[FilterExpr]) -> String {
    let fragments: Vec<String> = children.iter().map(FilterExpr::fragment).collect();
    format!("({})", fragments.join(","))
}

/// The filters attached to one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filters {
    standalone: Vec<FilterExpr>,
    group: Option<Vec<FilterExpr>>,
    logical: Vec<(String, FilterExpr)>,
}

impl Filters {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.standalone.is_empty() && self.group.is_none() && self.logical.is_empty()
    }

    /// Add the condition `condition` (an operator and value, such as
    /// `gte.25`) on `column`, merging with existing filters.
    pub fn push(&mut self, column: &str, condition: impl Into<String>) {
        let new = FilterExpr::condition(column, condition);

        if let Some(pos) = self
            .standalone
            .iter()
            .position(|e| e.column() == Some(column))
        {
            let first = self.standalone.remove(pos);
            let later: Vec<FilterExpr> = self.standalone.drain(pos..).collect();
            let group = self.group.get_or_insert_with(Vec::new);
            group.push(first);
            group.push(new);
            group.extend(later);
        } else if let Some(group) = self.group.as_mut() {
            group.push(new);
        } else {
            self.standalone.push(new);
        }
    }

    /// Set `or` (or `<table>.or`) to the raw filter list `filters`,
    /// replacing any previous value.
    pub fn set_or(&mut self, filters: &str, referenced_table: Option<&str>) {
        self.set_logical(
            scoped_key(referenced_table, "or"),
            FilterExpr::Or(vec![FilterExpr::Raw(filters.to_string())]),
        );
    }

    /// Add the raw filter list `filters` to `and` (or set
    /// `<table>.and`).
    ///
    /// The unqualified `and` parameter is shared with the merged
    /// column filters, so there the list is appended to the group
    /// rather than replacing it.
    pub fn set_and(&mut self, filters: &str, referenced_table: Option<&str>) {
        match referenced_table {
            Some(table) if !table.is_empty() => self.set_logical(
                scoped_key(referenced_table, "and"),
                FilterExpr::And(vec![FilterExpr::Raw(filters.to_string())]),
            ),
            _ => self
                .group
                .get_or_insert_with(Vec::new)
                .push(FilterExpr::Raw(filters.to_string())),
        }
    }

    fn set_logical(&mut self, key: String, expr: FilterExpr) {
        if let Some(entry) = self.logical.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = expr;
        } else {
            self.logical.push((key, expr));
        }
    }

    /// The standalone condition on `column`, if there is one.
    #[cfg(test)]
    fn standalone(&self, column: &str) -> Option<&str> {
        self.standalone.iter().find_map(|e| match e {
            FilterExpr::Condition {
                column: c,
                condition,
            } if c == column => Some(condition.as_str()),
            _ => None,
        })
    }

    /// The rendered `and` group, if there is one.
    pub fn group(&self) -> Option<String> {
        self.group.as_deref().map(group_value)
    }

    /// Render every filter as a query parameter, in a stable order:
    /// standalone filters in the order they were added, then the
    /// `and` group, then the logical parameters.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for expr in &self.standalone {
            if let FilterExpr::Condition { column, condition } = expr {
                pairs.push((column.clone(), condition.clone()));
            }
        }
        if let Some(group) = self.group() {
            pairs.push(("and".to_string(), group));
        }
        for (key, expr) in &self.logical {
            pairs.push((key.clone(), expr.value()));
        }
        pairs
    }
}

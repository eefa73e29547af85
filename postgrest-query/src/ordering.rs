//! # Ordering and pagination
//!
//! PostgREST orders results with an `order` parameter holding a
//! comma separated list of `column.direction.nulls` terms in priority
//! order, so `order=age.desc.nullslast,name.asc.nullsfirst` sorts by
//! descending age, and for ties by name. Embedded resources are
//! ordered with `<table>.order`.
//!
//! Pagination is done with `limit` and `offset`, again with
//! `<table>.` qualified forms for embedded resources.
//!
//! Example:
//!
//! ```rust
//! use postgrest_query::ordering::{order, range, OrderOptions};
//! use postgrest_query::params::QueryParams;
//!
//! let mut params = QueryParams::new();
//! order(&mut params, "age", &OrderOptions::default());
//! order(&mut params, "name", &OrderOptions::ascending().nulls_first());
//! range(&mut params, 10, 19, None).unwrap();
//!
//! assert_eq!(params.get("order"), Some("age.desc.nullslast,name.asc.nullsfirst"));
//! assert_eq!(params.get("offset"), Some("10"));
//! assert_eq!(params.get("limit"), Some("10"));
//! ```

use crate::filtering::FilterError;
use crate::params::{scoped_key, QueryParams};

/// How to order by one column. The default is descending, with
/// nulls last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderOptions {
    pub ascending: bool,
    pub nulls_first: bool,
    pub referenced_table: Option<String>,
}

impl OrderOptions {
    pub fn ascending() -> Self {
        Self {
            ascending: true,
            ..Default::default()
        }
    }

    pub fn descending() -> Self {
        Default::default()
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls_first = true;
        self
    }

    pub fn referenced_table(mut self, table: impl Into<String>) -> Self {
        self.referenced_table = Some(table.into());
        self
    }

    fn term(&self, column: &str) -> String {
        format!(
            "{}.{}.{}",
            column,
            if self.ascending { "asc" } else { "desc" },
            if self.nulls_first {
                "nullsfirst"
            } else {
                "nullslast"
            }
        )
    }
}

/// Append an ordering by `column` after any existing ordering.
pub fn order(params: &mut QueryParams, column: &str, opts: &OrderOptions) {
    let key = scoped_key(opts.referenced_table.as_deref(), "order");
    let term = opts.term(column);
    let value = match params.get(&key) {
        Some(existing) if !existing.is_empty() => format!("{},{}", existing, term),
        _ => term,
    };
    params.set(key, value);
}

/// Limit the number of rows, replacing any previous limit.
pub fn limit(params: &mut QueryParams, count: usize, referenced_table: Option<&str>) {
    params.set(scoped_key(referenced_table, "limit"), count.to_string());
}

/// Restrict the rows to the inclusive range `from..=to`.
///
/// A range that ends before it starts is rejected, and leaves the
/// parameters unchanged.
pub fn range(
    params: &mut QueryParams,
    from: usize,
    to: usize,
    referenced_table: Option<&str>,
) -> Result<(), FilterError> {
    if to < from {
        return Err(FilterError::InvalidRange { from, to });
    }
    params.set(scoped_key(referenced_table, "offset"), from.to_string());
    params.set(
        scoped_key(referenced_table, "limit"),
        (to - from + 1).to_string(),
    );
    Ok(())
}

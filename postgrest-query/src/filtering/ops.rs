//! Encoding of filter values, by operator family.
//!
//! Family           | Operators                                   | Encoding
//! -----------------|---------------------------------------------|----------------------------
//! scalar           | `eq`, `neq`, `gt`, `gte`, `lt`, `lte`, `like`, `ilike`, `is` | `op.value`
//! list             | `in`                                        | `in.(a,b,"c,d")`
//! pattern list     | `like(all)`, `like(any)`, ...               | `like(any).{a,b}`
//! containment      | `cs`, `cd`, `ov`                            | see [`Containment`]
//! range            | `sl`, `sr`, `nxl`, `nxr`, `adj`             | `op.[1,10)`
//! text search      | `fts`, `plfts`, `phfts`, `wfts`             | `plfts(english).query`

use std::sync::OnceLock;

use regex::Regex;

use crate::operators::{FilterOp, FilterValue};

fn reserved() -> &'static Regex {
    static RESERVED: OnceLock<Regex> = OnceLock::new();
    RESERVED.get_or_init(|| Regex::new("[,()]").expect("static pattern is valid"))
}

/// `op.value`
pub fn condition(op: &FilterOp, value: &str) -> String {
    format!("{}.{}", op, value)
}

/// The parenthesised list used by `in`. Items containing a comma or
/// a parenthesis are double quoted.
pub fn in_list<I, V>(values: I) -> String
where
    I: IntoIterator<Item = V>,
    V: FilterValue,
{
    let items: Vec<String> = values
        .into_iter()
        .map(|v| {
            let v = v.filter_value();
            if reserved().is_match(&v) {
                format!("\"{}\"", v)
            } else {
                v
            }
        })
        .collect();
    format!("({})", items.join(","))
}

/// The braced list used by `like(all)` and friends.
pub fn pattern_list<I, V>(patterns: I) -> String
where
    I: IntoIterator<Item = V>,
    V: FilterValue,
{
    let items: Vec<String> = patterns.into_iter().map(|v| v.filter_value()).collect();
    format!("{{{}}}", items.join(","))
}

/// The right hand side of a containment (`cs`, `cd`) or overlap
/// (`ov`) filter.
///
/// The encoding is chosen by the kind of value given:
/// - a string is a literal, passed through as is (e.g. a range
///   `[1,5)`);
/// - a list becomes an array literal, `{"a","b"}`;
/// - a JSON value is JSON encoded, for `jsonb` columns.
#[derive(Clone, Debug, PartialEq)]
pub enum Containment {
    Literal(String),
    Array(Vec<String>),
    Json(serde_json::Value),
}

impl Containment {
    pub fn render(&self) -> String {
        match self {
            Containment::Literal(s) => s.clone(),
            Containment::Array(items) => {
                let quoted: Vec<String> = items
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()).to_string())
                    .collect();
                format!("{{{}}}", quoted.join(","))
            }
            Containment::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for Containment {
    fn from(s: &str) -> Self {
        Containment::Literal(s.to_string())
    }
}

impl From<String> for Containment {
    fn from(s: String) -> Self {
        Containment::Literal(s)
    }
}

impl<V: FilterValue> From<Vec<V>> for Containment {
    fn from(items: Vec<V>) -> Self {
        Containment::Array(items.iter().map(FilterValue::filter_value).collect())
    }
}

impl<V: FilterValue> From<&[V]> for Containment {
    fn from(items: &[V]) -> Self {
        Containment::Array(items.iter().map(FilterValue::filter_value).collect())
    }
}

impl<V: FilterValue, const N: usize> From<[V; N]> for Containment {
    fn from(items: [V; N]) -> Self {
        Containment::Array(items.iter().map(FilterValue::filter_value).collect())
    }
}

impl From<serde_json::Value> for Containment {
    fn from(value: serde_json::Value) -> Self {
        Containment::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::Operator;

    #[test]
    fn in_list_quotes_reserved() {
        assert_eq!(in_list(["1", "2", "3"]), "(1,2,3)");
        assert_eq!(in_list(["a,b", "c(d)", "e"]), "(\"a,b\",\"c(d)\",e)");
        assert_eq!(in_list(vec![1i32, 2]), "(1,2)");
    }

    #[test]
    fn pattern_lists() {
        assert_eq!(pattern_list(["%a%", "b%"]), "{%a%,b%}");
    }

    #[test]
    fn containment_by_input_kind() {
        assert_eq!(Containment::from("[1,5)").render(), "[1,5)");
        assert_eq!(
            Containment::from(vec!["golang", "postgres"]).render(),
            "{\"golang\",\"postgres\"}"
        );
        assert_eq!(
            Containment::from(serde_json::json!({"name": "x"})).render(),
            "{\"name\":\"x\"}"
        );
    }

    #[test]
    fn conditions() {
        let op = FilterOp::new(Operator::Gte);
        assert_eq!(condition(&op, "25"), "gte.25");
        assert_eq!(condition(&op.negate(), "25"), "not.gte.25");
    }
}

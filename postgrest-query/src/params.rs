//! The query parameters of a request.
//!
//! Apart from the filters, every PostgREST query parameter has a
//! fixed, unique key: `select`, `order`, `limit`, `offset`,
//! `on_conflict`, `columns`, and their `<table>.` qualified forms.
//! [`QueryParams`] keeps those in the order they were first set, and
//! owns the [`Filters`] that are rendered after them.

use url::Url;

use crate::filtering::Filters;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: Vec<(String, String)>,
    filters: Filters,
}

impl QueryParams {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key` to `value`, keeping the position of an existing
    /// value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.params.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.params.push((key, value));
        }
    }

    #[cfg(test)]
    fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.params.iter().position(|(k, _)| k == key)?;
        Some(self.params.remove(pos).1)
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut Filters {
        &mut self.filters
    }

    /// Every parameter, filters last.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self.params.clone();
        pairs.extend(self.filters.pairs());
        pairs
    }

    /// Replace the query string of `url` with these parameters.
    pub fn apply_to(&self, url: &mut Url) {
        let pairs = self.pairs();
        if pairs.is_empty() {
            url.set_query(None);
            return;
        }

        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
        query.finish();
    }

    /// Decode a query string back into its pairs.
    pub fn parse(query: &str) -> Vec<(String, String)> {
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }
}

/// `key`, or `<table>.key` when filtering or ordering an embedded
/// resource.
pub(crate) fn scoped_key(referenced_table: Option<&str>, key: &str) -> String {
    match referenced_table {
        Some(table) if !table.is_empty() => format!("{}.{}", table, key),
        _ => key.to_string(),
    }
}

/// Remove whitespace from a column list, except inside double
/// quoted identifiers. An empty list selects every column.
pub fn clean_select(columns: &str) -> String {
    let mut quoted = false;
    let cleaned: String = columns
        .chars()
        .filter(|c| {
            if *c == '"' {
                quoted = !quoted;
            }
            quoted || !c.is_whitespace()
        })
        .collect();

    if cleaned.is_empty() {
        "*".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_whitespace() {
        assert_eq!(clean_select(""), "*");
        assert_eq!(clean_select("   "), "*");
        assert_eq!(clean_select("id, name,\n email"), "id,name,email");
        assert_eq!(
            clean_select("id, \"full name\", users ( * )"),
            "id,\"full name\",users(*)"
        );
    }

    #[test]
    fn set_keeps_position() {
        let mut q = QueryParams::new();
        q.set("select", "*");
        q.set("limit", "10");
        q.set("select", "id");
        assert_eq!(
            q.pairs(),
            vec![
                ("select".to_string(), "id".to_string()),
                ("limit".to_string(), "10".to_string())
            ]
        );
        assert_eq!(q.remove("select").as_deref(), Some("id"));
        assert_eq!(q.get("select"), None);
    }

    #[test]
    fn url_round_trip() {
        let mut q = QueryParams::new();
        q.set("select", "id,\"full name\"");
        q.filters_mut().push("age", "gte.25");
        q.filters_mut().push("age", "lte.35");
        q.filters_mut().push("name", "in.(\"a,b\",c)");
        q.filters_mut().set_or("tags.cs.{a b},id.eq.1", None);

        let mut url = Url::parse("http://localhost:3000/users").unwrap();
        q.apply_to(&mut url);

        let parsed = QueryParams::parse(url.query().unwrap());
        assert_eq!(parsed, q.pairs());
    }

    #[test]
    fn empty_query_is_removed() {
        let mut url = Url::parse("http://localhost:3000/users?stale=1").unwrap();
        QueryParams::new().apply_to(&mut url);
        assert_eq!(url.query(), None);
    }
}

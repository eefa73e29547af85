//! # The fluent request builders
//!
//! A request starts at [`Client::from`], which names the resource and
//! returns a [`QueryBuilder`]. Choosing the verb (`select`, `insert`,
//! `upsert`, `update` or `delete`) turns it into a [`FilterBuilder`],
//! which accepts filters and transforms in any order before being
//! executed:
//!
//! ```no_run
//! use postgrest_query::{Client, OrderOptions};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! # fn main() -> Result<(), postgrest_query::Error> {
//! let client = Client::new("http://localhost:3000")?;
//! let response = client
//!     .from("users")
//!     .select("id, name")
//!     .gte("age", 25)
//!     .lte("age", 35)
//!     .order("name", OrderOptions::ascending())
//!     .limit(10, None)
//!     .execute::<Vec<User>>()?;
//! # Ok(())
//! # }
//! ```
//!
//! Each builder owns the [`RequestSpec`] it is building, and is
//! consumed by every call, so a half built request can't be shared
//! or sent twice. Invalid arguments don't break the chain: the first
//! one is remembered and reported by `execute`, without sending
//! anything.

use std::str::FromStr;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::client::Client;
use crate::error::Error;
use crate::filtering::ops::{self, Containment};
use crate::operators::{FilterOp, FilterValue, Operator, Quantifier, TextSearchType};
use crate::ordering::{self, OrderOptions};
use crate::params::clean_select;
use crate::prefer::{self, Count, Preferences, Resolution, Returning};
use crate::request::{Method, RequestSpec, ResultShape, CSV, GEOJSON, JSON, OBJECT_JSON, PREFER};
use crate::response::ResponseEnvelope;
use crate::transport::AbortSignal;

#[derive(Clone, Debug, Default)]
pub struct SelectOptions {
    /// Send `HEAD` rather than `GET`, so only the count comes back.
    pub head: bool,
    pub count: Option<Count>,
}

#[derive(Clone, Debug)]
pub struct InsertOptions {
    pub count: Option<Count>,
    pub returning: Returning,
    /// When false, columns missing from some of the inserted rows get
    /// their default value rather than null.
    pub default_to_null: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            count: None,
            returning: Returning::default(),
            default_to_null: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UpsertOptions {
    /// The unique columns that decide whether a row conflicts.
    pub on_conflict: Option<String>,
    pub ignore_duplicates: bool,
    pub count: Option<Count>,
    pub returning: Returning,
    pub default_to_null: bool,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            on_conflict: None,
            ignore_duplicates: false,
            count: None,
            returning: Returning::default(),
            default_to_null: true,
        }
    }
}

/// Options for `update` and `delete`.
#[derive(Clone, Debug, Default)]
pub struct MutationOptions {
    pub count: Option<Count>,
    pub returning: Returning,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExplainFormat {
    #[default]
    Text,
    Json,
}

/// Which `EXPLAIN` options to ask for.
#[derive(Clone, Debug, Default)]
pub struct ExplainOptions {
    pub analyze: bool,
    pub verbose: bool,
    pub settings: bool,
    pub buffers: bool,
    pub wal: bool,
    pub format: ExplainFormat,
}

impl ExplainOptions {
    fn options(&self) -> String {
        [
            (self.analyze, "analyze"),
            (self.verbose, "verbose"),
            (self.settings, "settings"),
            (self.buffers, "buffers"),
            (self.wal, "wal"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join("|")
    }
}

/// The union of the keys of an array of objects, quoted, in the order
/// they are first seen.
fn columns_of(value: &Value) -> Option<String> {
    let rows = value.as_array()?;
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.as_object()?.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    let quoted: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
    Some(quoted.join(","))
}

/// Chooses what to do with a resource.
#[must_use]
pub struct QueryBuilder {
    client: Client,
    spec: RequestSpec,
}

impl QueryBuilder {
    pub(crate) fn new(client: Client, spec: RequestSpec) -> Self {
        Self { client, spec }
    }

    fn into_filter(self) -> FilterBuilder {
        FilterBuilder {
            client: self.client,
            spec: self.spec,
        }
    }

    fn prefer(&mut self, preferences: &Preferences) {
        if let Some(value) = preferences.header_value() {
            self.spec.set_header(PREFER, &value);
        }
    }

    fn write_body<V: Serialize + ?Sized>(&mut self, values: &V, with_columns: bool) {
        let value = match serde_json::to_value(values) {
            Ok(value) => value,
            Err(e) => return self.spec.defer(Error::Encode(e)),
        };
        if with_columns {
            if let Some(columns) = columns_of(&value) {
                self.spec.params.set("columns", columns);
            }
        }
        match serde_json::to_vec(&value) {
            Ok(body) => self.spec.body = Some(body),
            Err(e) => self.spec.defer(Error::Encode(e)),
        }
    }

    /// Read the columns `columns`, e.g. `"id, name, posts(title)"`.
    pub fn select(self, columns: &str) -> FilterBuilder {
        self.select_with(columns, SelectOptions::default())
    }

    pub fn select_with(mut self, columns: &str, options: SelectOptions) -> FilterBuilder {
        self.spec.method = if options.head {
            Method::Head
        } else {
            Method::Get
        };
        self.spec.params.set("select", clean_select(columns));
        if let Some(count) = options.count {
            self.prefer(Preferences::new().count(count));
        }
        self.into_filter()
    }

    /// Insert one row, or an array of rows.
    pub fn insert<V: Serialize + ?Sized>(self, values: &V) -> FilterBuilder {
        self.insert_with(values, InsertOptions::default())
    }

    pub fn insert_with<V: Serialize + ?Sized>(
        mut self,
        values: &V,
        options: InsertOptions,
    ) -> FilterBuilder {
        self.spec.method = Method::Post;
        let mut preferences = Preferences::new();
        preferences.returning(options.returning);
        if let Some(count) = options.count {
            preferences.count(count);
        }
        if !options.default_to_null {
            preferences.missing_default();
        }
        self.prefer(&preferences);
        self.write_body(values, true);
        self.into_filter()
    }

    /// Insert rows, updating those that conflict with existing rows.
    pub fn upsert<V: Serialize + ?Sized>(self, values: &V) -> FilterBuilder {
        self.upsert_with(values, UpsertOptions::default())
    }

    pub fn upsert_with<V: Serialize + ?Sized>(
        mut self,
        values: &V,
        options: UpsertOptions,
    ) -> FilterBuilder {
        self.spec.method = Method::Post;
        if let Some(on_conflict) = &options.on_conflict {
            self.spec.params.set("on_conflict", on_conflict.as_str());
        }
        let mut preferences = Preferences::new();
        preferences
            .resolution(if options.ignore_duplicates {
                Resolution::IgnoreDuplicates
            } else {
                Resolution::MergeDuplicates
            })
            .returning(options.returning);
        if let Some(count) = options.count {
            preferences.count(count);
        }
        if !options.default_to_null {
            preferences.missing_default();
        }
        self.prefer(&preferences);
        self.write_body(values, true);
        self.into_filter()
    }

    /// Update the rows matched by the filters that follow.
    pub fn update<V: Serialize + ?Sized>(self, values: &V) -> FilterBuilder {
        self.update_with(values, MutationOptions::default())
    }

    pub fn update_with<V: Serialize + ?Sized>(
        mut self,
        values: &V,
        options: MutationOptions,
    ) -> FilterBuilder {
        self.spec.method = Method::Patch;
        let mut preferences = Preferences::new();
        preferences.returning(options.returning);
        if let Some(count) = options.count {
            preferences.count(count);
        }
        self.prefer(&preferences);
        self.write_body(values, false);
        self.into_filter()
    }

    /// Delete the rows matched by the filters that follow.
    pub fn delete(self) -> FilterBuilder {
        self.delete_with(MutationOptions::default())
    }

    pub fn delete_with(mut self, options: MutationOptions) -> FilterBuilder {
        self.spec.method = Method::Delete;
        let mut preferences = Preferences::new();
        preferences.returning(options.returning);
        if let Some(count) = options.count {
            preferences.count(count);
        }
        self.prefer(&preferences);
        self.into_filter()
    }
}

/// Filters, transforms and executes a request.
#[must_use]
pub struct FilterBuilder {
    client: Client,
    spec: RequestSpec,
}

impl FilterBuilder {
    pub(crate) fn new(client: Client, spec: RequestSpec) -> Self {
        Self { client, spec }
    }

    /// The request as built so far.
    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    /// The columns to return from a mutation, or to read.
    ///
    /// On a mutation that has not said what to return, this also asks
    /// for the affected rows back.
    pub fn select(mut self, columns: &str) -> Self {
        self.spec.params.set("select", clean_select(columns));
        if !self.spec.method.is_read() && !self.spec.prefers("return") {
            let mut preferences = Preferences::new();
            preferences.returning(Returning::Representation);
            self.spec.append_header(PREFER, &preferences.to_string());
        }
        self
    }

    fn apply(mut self, column: &str, op: FilterOp, value: &str) -> Self {
        self.spec
            .params
            .filters_mut()
            .push(column, ops::condition(&op, value));
        self
    }

    fn parse_op(&mut self, operator: &str) -> Option<FilterOp> {
        match FilterOp::from_str(operator) {
            Ok(op) => Some(op),
            Err(e) => {
                self.spec.defer(e);
                None
            }
        }
    }

    /// Filter with an operator given by name, e.g. `"gte"`,
    /// `"not.in"` or `"like(any)"`, and an already encoded value.
    pub fn filter(mut self, column: &str, operator: &str, value: &str) -> Self {
        match self.parse_op(operator) {
            Some(op) => self.apply(column, op, value),
            None => self,
        }
    }

    /// The negation of [`FilterBuilder::filter`].
    pub fn not(mut self, column: &str, operator: &str, value: &str) -> Self {
        match self.parse_op(operator) {
            Some(op) => self.apply(column, op.negate(), value),
            None => self,
        }
    }

    fn scalar<V: FilterValue>(self, column: &str, operator: Operator, value: V) -> Self {
        self.apply(column, operator.into(), &value.filter_value())
    }

    pub fn eq<V: FilterValue>(self, column: &str, value: V) -> Self {
        self.scalar(column, Operator::Eq, value)
    }

    pub fn neq<V: FilterValue>(self, column: &str, value: V) -> Self {
        self.scalar(column, Operator::Neq, value)
    }

    pub fn gt<V: FilterValue>(self, column: &str, value: V) -> Self {
        self.scalar(column, Operator::Gt, value)
    }

    pub fn gte<V: FilterValue>(self, column: &str, value: V) -> Self {
        self.scalar(column, Operator::Gte, value)
    }

    pub fn lt<V: FilterValue>(self, column: &str, value: V) -> Self {
        self.scalar(column, Operator::Lt, value)
    }

    pub fn lte<V: FilterValue>(self, column: &str, value: V) -> Self {
        self.scalar(column, Operator::Lte, value)
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.scalar(column, Operator::Like, pattern)
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.scalar(column, Operator::Ilike, pattern)
    }

    /// Test against `null`, `true`, `false` or `unknown`.
    pub fn is<V: FilterValue>(self, column: &str, value: V) -> Self {
        self.scalar(column, Operator::Is, value)
    }

    pub fn in_<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: FilterValue,
    {
        self.apply(column, Operator::In.into(), &ops::in_list(values))
    }

    fn patterns<I, V>(
        self,
        column: &str,
        operator: Operator,
        quantifier: Quantifier,
        patterns: I,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: FilterValue,
    {
        let mut op = FilterOp::new(operator);
        op.quantifier = Some(quantifier);
        self.apply(column, op, &ops::pattern_list(patterns))
    }

    pub fn like_all_of<I, V>(self, column: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: FilterValue,
    {
        self.patterns(column, Operator::Like, Quantifier::All, patterns)
    }

    pub fn like_any_of<I, V>(self, column: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: FilterValue,
    {
        self.patterns(column, Operator::Like, Quantifier::Any, patterns)
    }

    pub fn ilike_all_of<I, V>(self, column: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: FilterValue,
    {
        self.patterns(column, Operator::Ilike, Quantifier::All, patterns)
    }

    pub fn ilike_any_of<I, V>(self, column: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: FilterValue,
    {
        self.patterns(column, Operator::Ilike, Quantifier::Any, patterns)
    }

    /// The column contains every element of `value`. See
    /// [`Containment`] for how the value is encoded.
    pub fn contains(self, column: &str, value: impl Into<Containment>) -> Self {
        let value = value.into().render();
        self.apply(column, Operator::Cs.into(), &value)
    }

    /// Every element of the column is contained in `value`.
    pub fn contained_by(self, column: &str, value: impl Into<Containment>) -> Self {
        let value = value.into().render();
        self.apply(column, Operator::Cd.into(), &value)
    }

    pub fn overlaps(self, column: &str, value: impl Into<Containment>) -> Self {
        let value = value.into().render();
        self.apply(column, Operator::Ov.into(), &value)
    }

    fn object<V: Serialize + ?Sized>(
        mut self,
        column: &str,
        operator: Operator,
        value: &V,
    ) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                let value = Containment::Json(value).render();
                self.apply(column, operator.into(), &value)
            }
            Err(e) => {
                self.spec.defer(Error::Encode(e));
                self
            }
        }
    }

    /// The `jsonb` column contains the JSON encoding of `value`.
    pub fn contains_object<V: Serialize + ?Sized>(self, column: &str, value: &V) -> Self {
        self.object(column, Operator::Cs, value)
    }

    pub fn contained_by_object<V: Serialize + ?Sized>(self, column: &str, value: &V) -> Self {
        self.object(column, Operator::Cd, value)
    }

    /// The range column is strictly left of `range`.
    pub fn range_lt(self, column: &str, range: &str) -> Self {
        self.apply(column, Operator::Sl.into(), range)
    }

    /// The range column is strictly right of `range`.
    pub fn range_gt(self, column: &str, range: &str) -> Self {
        self.apply(column, Operator::Sr.into(), range)
    }

    pub fn range_gte(self, column: &str, range: &str) -> Self {
        self.apply(column, Operator::Nxl.into(), range)
    }

    pub fn range_lte(self, column: &str, range: &str) -> Self {
        self.apply(column, Operator::Nxr.into(), range)
    }

    pub fn range_adjacent(self, column: &str, range: &str) -> Self {
        self.apply(column, Operator::Adj.into(), range)
    }

    /// Full text search. `search_type` is `plain`, `phrase` or
    /// `websearch`, or empty for a `to_tsquery` search; `config` is
    /// the text search configuration to use.
    pub fn text_search(
        mut self,
        column: &str,
        query: &str,
        search_type: &str,
        config: Option<&str>,
    ) -> Self {
        let operator = if search_type.is_empty() {
            Operator::Fts
        } else {
            match TextSearchType::from_str(search_type) {
                Ok(t) => t.operator(),
                Err(e) => {
                    self.spec.defer(e);
                    return self;
                }
            }
        };
        let mut op = FilterOp::new(operator);
        op.config = config.filter(|c| !c.is_empty()).map(str::to_string);
        self.apply(column, op, query)
    }

    /// An `eq` filter for every pair in `query`, in order.
    pub fn match_<I, K, V>(self, query: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: FilterValue,
    {
        query
            .into_iter()
            .fold(self, |builder, (column, value)| builder.eq(column.as_ref(), value))
    }

    /// Set `or` to a raw filter list, e.g. `"id.eq.1,name.eq.bob"`.
    pub fn or(mut self, filters: &str, referenced_table: Option<&str>) -> Self {
        self.spec.params.filters_mut().set_or(filters, referenced_table);
        self
    }

    /// Require a raw filter list, e.g. `"age.gte.25,age.lte.35"`.
    pub fn and(mut self, filters: &str, referenced_table: Option<&str>) -> Self {
        self.spec
            .params
            .filters_mut()
            .set_and(filters, referenced_table);
        self
    }

    pub fn order(mut self, column: &str, options: OrderOptions) -> Self {
        ordering::order(&mut self.spec.params, column, &options);
        self
    }

    pub fn limit(mut self, count: usize, referenced_table: Option<&str>) -> Self {
        ordering::limit(&mut self.spec.params, count, referenced_table);
        self
    }

    /// Only the rows `from` to `to` inclusive, counting from zero.
    pub fn range(mut self, from: usize, to: usize, referenced_table: Option<&str>) -> Self {
        if let Err(e) = ordering::range(&mut self.spec.params, from, to, referenced_table) {
            self.spec.defer(e);
        }
        self
    }

    fn shape(mut self, shape: ResultShape, accept: &str) -> Self {
        self.spec.shape = shape;
        self.spec.set_header("accept", accept);
        self
    }

    /// Ask for exactly one row, as an object. Anything else is an
    /// error.
    pub fn single(self) -> Self {
        self.shape(ResultShape::Single, OBJECT_JSON)
    }

    /// Ask for at most one row.
    pub fn maybe_single(self) -> Self {
        let accept = if self.spec.method == Method::Get {
            JSON
        } else {
            OBJECT_JSON
        };
        self.shape(ResultShape::MaybeSingle, accept)
    }

    pub fn csv(self) -> Self {
        self.shape(ResultShape::CsvText, CSV)
    }

    pub fn geojson(self) -> Self {
        self.shape(ResultShape::GeoJson, GEOJSON)
    }

    /// Ask for the query plan instead of the rows.
    pub fn explain(self, options: ExplainOptions) -> Self {
        let target = self.spec.accept().unwrap_or(JSON).to_string();
        let (shape, format) = match options.format {
            ExplainFormat::Text => (ResultShape::PlanText, "text"),
            ExplainFormat::Json => (ResultShape::Array, "json"),
        };
        let accept = format!(
            "application/vnd.pgrst.plan+{}; for=\"{}\"; options={};",
            format,
            target,
            options.options()
        );
        self.shape(shape, &accept)
    }

    /// Roll the transaction back after the request, so nothing it
    /// does is kept.
    pub fn rollback(mut self) -> Self {
        self.spec.append_header(PREFER, prefer::ROLLBACK);
        self
    }

    /// Fail, changing nothing, if more than `count` rows would be
    /// affected.
    pub fn max_affected(mut self, count: usize) -> Self {
        for value in prefer::max_affected(count) {
            self.spec.append_header(PREFER, &value);
        }
        self
    }

    /// Return server errors as `Err`, rather than in the envelope.
    pub fn throw_on_error(mut self) -> Self {
        self.spec.throw_on_error = true;
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.spec.signal = Some(signal);
        self
    }

    pub fn set_header(mut self, name: &str, value: &str) -> Self {
        self.spec.set_header(name, value);
        self
    }

    /// Send the request, and decode the response data as `T`.
    pub fn execute<T: DeserializeOwned>(self) -> Result<ResponseEnvelope<T>, Error> {
        self.client.dispatch(self.spec)
    }

    /// Send the request, and return only the data and the count.
    ///
    /// An error reported by the server is returned as
    /// [`Error::Server`]. When there is no data, `U` is decoded from
    /// `null`, or failing that from an empty array. So with
    /// [`FilterBuilder::maybe_single`], `U` should be an [`Option`]:
    /// no rows is `None`, and a non-optional target fails to decode.
    pub fn execute_to<U: DeserializeOwned>(self) -> Result<(U, Option<i64>), Error> {
        let envelope = self.execute::<U>()?;
        if let Some(error) = envelope.error {
            return Err(Error::Server(error));
        }
        let data = match envelope.data {
            Some(data) => data,
            None => {
                debug!("No data in {} response", envelope.status);
                serde_json::from_value(Value::Null)
                    .or_else(|_| serde_json::from_value(Value::Array(Vec::new())))
                    .map_err(Error::Decode)?
            }
        };
        Ok((data, envelope.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientOptions, RpcOptions};
    use crate::filtering::FilterError;
    use crate::transport::{HttpRequest, RawResponse, Transport, TransportError};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// Records requests, and answers each with a canned response.
    #[derive(Default)]
    struct Canned {
        sent: Mutex<Vec<HttpRequest>>,
        response: Mutex<RawResponse>,
    }

    impl Transport for Canned {
        fn send(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
            self.sent.lock().unwrap().push(request);
            Ok(self.response.lock().unwrap().clone())
        }
    }

    fn canned_client(response: RawResponse) -> (Client, Arc<Canned>) {
        let canned = Arc::new(Canned {
            response: Mutex::new(response),
            ..Default::default()
        });
        let client = Client::with_transport(
            "http://localhost:3000",
            ClientOptions::default(),
            canned.clone(),
        )
        .unwrap();
        (client, canned)
    }

    fn pairs(builder: &FilterBuilder) -> Vec<(String, String)> {
        builder.spec().params.pairs()
    }

    fn p(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn select_and_filters() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .from("users")
            .select("id, name")
            .eq("status", "active")
            .gte("age", 25)
            .lte("age", 35);
        assert_eq!(
            pairs(&b),
            vec![
                p("select", "id,name"),
                p("status", "eq.active"),
                p("and", "(age.gte.25,age.lte.35)")
            ]
        );
        assert_eq!(b.spec().method, Method::Get);
        assert!(b.spec().header(PREFER).is_none());
    }

    #[test]
    fn in_then_eq_merges() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .from("users")
            .select("*")
            .in_("id", ["1", "2", "3"])
            .eq("id", "4");
        assert_eq!(
            pairs(&b),
            vec![p("select", "*"), p("and", "(id.in.(1,2,3),id.eq.4)")]
        );
    }

    #[test]
    fn unknown_operator_is_deferred() {
        let (client, canned) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .from("users")
            .select("*")
            .filter("id", "invalid", "1");
        assert_eq!(pairs(&b), vec![p("select", "*")]);
        let result = b.execute::<Value>();
        assert!(matches!(
            result,
            Err(Error::Validation(FilterError::UnknownOperator(_)))
        ));
        assert!(canned.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn operator_families() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .from("t")
            .select("*")
            .not("status", "eq", "banned")
            .is("deleted_at", None::<i32>)
            .like_any_of("name", ["a%", "%b"])
            .contains("tags", vec!["golang", "postgres"])
            .contained_by_object("meta", &json!({"a": 1}))
            .overlaps("span", "[1,5)")
            .range_adjacent("during", "[2000-01-01,2000-01-02)")
            .text_search("body", "fat & cat", "plain", Some("english"))
            .text_search("title", "rat", "", None);
        assert_eq!(
            pairs(&b),
            vec![
                p("select", "*"),
                p("status", "not.eq.banned"),
                p("deleted_at", "is.null"),
                p("name", "like(any).{a%,%b}"),
                p("tags", "cs.{\"golang\",\"postgres\"}"),
                p("meta", "cd.{\"a\":1}"),
                p("span", "ov.[1,5)"),
                p("during", "adj.[2000-01-01,2000-01-02)"),
                p("body", "plfts(english).fat & cat"),
                p("title", "fts.rat"),
            ]
        );
    }

    #[test]
    fn bad_text_search_type() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .from("t")
            .select("*")
            .text_search("body", "cat", "fuzzy", None);
        assert_eq!(pairs(&b), vec![p("select", "*")]);
        assert!(matches!(
            b.spec().deferred(),
            Some(Error::Validation(FilterError::UnknownTextSearchType(_)))
        ));
    }

    #[test]
    fn match_in_order() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let mut query = BTreeMap::new();
        query.insert("a", "1");
        query.insert("b", "2");
        let b = client.from("t").select("*").match_(query);
        assert_eq!(
            pairs(&b),
            vec![p("select", "*"), p("a", "eq.1"), p("b", "eq.2")]
        );
    }

    #[test]
    fn inverted_range_is_deferred() {
        let (client, canned) = canned_client(RawResponse::new(200, "[]"));
        let result = client
            .from("t")
            .select("*")
            .range(5, 1, None)
            .execute::<Value>();
        assert!(matches!(
            result,
            Err(Error::Validation(FilterError::InvalidRange { from: 5, to: 1 }))
        ));
        assert!(canned.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn insert_preferences_and_columns() {
        let (client, _) = canned_client(RawResponse::new(201, ""));
        let rows = json!([{"id": 1, "name": "a"}, {"id": 2, "email": "b@x"}]);
        let b = client.from("users").insert_with(
            &rows,
            InsertOptions {
                count: Some(Count::Exact),
                returning: Returning::Minimal,
                default_to_null: false,
            },
        );
        assert_eq!(b.spec().method, Method::Post);
        assert_eq!(
            b.spec().header(PREFER),
            Some("return=minimal,count=exact,missing=default")
        );
        assert_eq!(
            b.spec().params.get("columns"),
            Some("\"id\",\"name\",\"email\"")
        );
        let body: Value = serde_json::from_slice(b.spec().body.as_ref().unwrap()).unwrap();
        assert_eq!(body, rows);
    }

    #[test]
    fn upsert_preferences() {
        let (client, _) = canned_client(RawResponse::new(201, ""));
        let b = client.from("users").upsert_with(
            &json!({"id": 1}),
            UpsertOptions {
                on_conflict: Some("id".to_string()),
                ignore_duplicates: true,
                ..Default::default()
            },
        );
        assert_eq!(
            b.spec().header(PREFER),
            Some("resolution=ignore-duplicates,return=representation")
        );
        assert_eq!(b.spec().params.get("on_conflict"), Some("id"));
        assert_eq!(b.spec().params.get("columns"), None);

        let b = client.from("users").upsert(&json!([{"id": 1}]));
        assert_eq!(
            b.spec().header(PREFER),
            Some("resolution=merge-duplicates,return=representation")
        );
    }

    #[test]
    fn update_and_delete() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .from("users")
            .update(&json!({"name": "x"}))
            .eq("id", 1i32);
        assert_eq!(b.spec().method, Method::Patch);
        assert_eq!(b.spec().header(PREFER), Some("return=representation"));

        let b = client
            .from("users")
            .delete_with(MutationOptions {
                count: Some(Count::Planned),
                returning: Returning::Minimal,
            })
            .eq("id", 1i32)
            .rollback()
            .max_affected(1);
        assert_eq!(b.spec().method, Method::Delete);
        assert_eq!(
            b.spec().header_values(PREFER),
            vec![
                "return=minimal,count=planned",
                "tx=rollback",
                "handling=strict",
                "max-affected=1"
            ]
        );
    }

    #[test]
    fn select_count_and_head() {
        let (client, _) = canned_client(RawResponse::new(200, ""));
        let b = client.from("users").select_with(
            "",
            SelectOptions {
                head: true,
                count: Count::parse("exact"),
            },
        );
        assert_eq!(b.spec().method, Method::Head);
        assert_eq!(b.spec().params.get("select"), Some("*"));
        assert_eq!(b.spec().header(PREFER), Some("count=exact"));

        let b = client.from("users").select_with(
            "*",
            SelectOptions {
                head: false,
                count: Count::parse("lots"),
            },
        );
        assert!(b.spec().header(PREFER).is_none());
    }

    #[test]
    fn last_transform_wins() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client.from("users").select("*").single().csv();
        assert_eq!(b.spec().shape, ResultShape::CsvText);
        assert_eq!(b.spec().accept(), Some(CSV));

        let b = client.from("users").select("*").csv().maybe_single();
        assert_eq!(b.spec().shape, ResultShape::MaybeSingle);
        assert_eq!(b.spec().accept(), Some(JSON));

        let b = client
            .from("users")
            .insert(&json!({"id": 1}))
            .maybe_single();
        assert_eq!(b.spec().accept(), Some(OBJECT_JSON));

        let b = client.from("users").select("*").geojson();
        assert_eq!(b.spec().shape, ResultShape::GeoJson);
        assert_eq!(b.spec().accept(), Some(GEOJSON));
    }

    #[test]
    fn explain_header() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client.from("users").select("*").explain(ExplainOptions {
            analyze: true,
            verbose: true,
            ..Default::default()
        });
        assert_eq!(b.spec().shape, ResultShape::PlanText);
        assert_eq!(
            b.spec().accept(),
            Some("application/vnd.pgrst.plan+text; for=\"application/json\"; options=analyze|verbose;")
        );

        let b = client
            .from("users")
            .select("*")
            .single()
            .explain(ExplainOptions {
                format: ExplainFormat::Json,
                ..Default::default()
            });
        assert_eq!(b.spec().shape, ResultShape::Array);
        assert_eq!(
            b.spec().accept(),
            Some("application/vnd.pgrst.plan+json; for=\"application/vnd.pgrst.object+json\"; options=;")
        );
    }

    #[test]
    fn execute_sends_request() {
        let (client, canned) = canned_client(RawResponse::new(200, r#"[{"id":1}]"#));
        let envelope = client
            .from("users")
            .select("id")
            .eq("id", 1i32)
            .execute::<Value>()
            .unwrap();
        assert_eq!(envelope.data, Some(json!([{"id": 1}])));

        let sent = canned.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::Get);
        assert_eq!(
            sent[0].url.as_str(),
            "http://localhost:3000/users?select=id&id=eq.1"
        );
        assert_eq!(sent[0].headers.get("accept-profile").unwrap(), "public");
    }

    #[test]
    fn execute_to_targets() {
        #[derive(serde::Deserialize)]
        struct Row {
            id: i64,
        }

        let (client, _) = canned_client(RawResponse::new(200, r#"[{"id":1},{"id":2}]"#));
        let (rows, count): (Vec<Row>, _) = client.from("t").select("*").execute_to().unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(count, None);

        let (client, _) = canned_client(RawResponse::new(201, ""));
        let (rows, _): (Vec<Row>, _) = client
            .from("t")
            .insert(&json!({"id": 3}))
            .execute_to()
            .unwrap();
        assert!(rows.is_empty());

        let (client, _) = canned_client(RawResponse::new(
            409,
            r#"{"message":"duplicate key","code":"23505"}"#,
        ));
        let result = client
            .from("t")
            .insert(&json!({"id": 3}))
            .execute_to::<Value>();
        assert_eq!(
            result.unwrap_err().server_error().map(|e| e.code.as_str()),
            Some("23505")
        );
    }

    #[test]
    fn mutation_select() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .from("users")
            .delete_with(MutationOptions {
                count: Some(Count::Exact),
                returning: Returning::Minimal,
            })
            .select("id");
        assert_eq!(b.spec().header("prefer"), Some("return=minimal,count=exact"));
        assert_eq!(pairs(&b), vec![p("select", "id")]);

        let b = client
            .rpc("create_user", &json!({"name": "x"}), RpcOptions::default())
            .select("name , id");
        assert_eq!(b.spec().header("prefer"), Some("return=representation"));
        assert_eq!(b.spec().params.get("select"), Some("name,id"));
    }

    #[test]
    fn mutation_select_keeps_other_preferences() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .rpc("reset", &json!({}), RpcOptions::default())
            .rollback()
            .max_affected(1)
            .select("id");
        assert_eq!(
            b.spec().header_values("prefer"),
            vec![
                "tx=rollback",
                "handling=strict",
                "max-affected=1",
                "return=representation"
            ]
        );
    }

    #[test]
    fn count_only_when_asked_for() {
        let mut response = RawResponse::new(200, r#"[{"id":1},{"id":2}]"#);
        response.headers.insert(
            http::header::CONTENT_RANGE,
            http::HeaderValue::from_static("0-1/2"),
        );

        let (client, _) = canned_client(response.clone());
        let env = client.from("users").select("*").execute::<Value>().unwrap();
        assert_eq!(env.count, None);

        let (client, _) = canned_client(response);
        let env = client
            .from("users")
            .select_with(
                "*",
                SelectOptions {
                    count: Some(Count::Exact),
                    ..Default::default()
                },
            )
            .execute::<Value>()
            .unwrap();
        assert_eq!(env.count, Some(2));
    }

    #[test]
    fn maybe_single_execute_to_needs_option() {
        #[derive(Debug, serde::Deserialize)]
        struct Row {
            #[allow(dead_code)]
            id: i64,
        }

        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let (row, _): (Option<Row>, _) = client
            .from("t")
            .select("*")
            .maybe_single()
            .execute_to()
            .unwrap();
        assert!(row.is_none());

        let result = client
            .from("t")
            .select("*")
            .maybe_single()
            .execute_to::<Row>();
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn negated_filters_merge() {
        let (client, _) = canned_client(RawResponse::new(200, "[]"));
        let b = client
            .from("users")
            .select("*")
            .not("age", "eq", "30")
            .gte("age", 25);
        assert_eq!(
            pairs(&b),
            vec![p("select", "*"), p("and", "(age.not.eq.30,age.gte.25)")]
        );
    }
}

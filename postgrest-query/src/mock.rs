//! # An emulated PostgREST endpoint
//!
//! [`Endpoint`] is a [`wiremock`] responder that serves a fixed set of
//! rows the way PostgREST would serve a table. It understands enough
//! of the dialect to test a client against:
//!
//! - `select` with plain column names;
//! - `order`, `limit` and `offset`;
//! - filters with `eq`, `neq`, `gt`, `gte`, `lt`, `lte`, `like`,
//!   `ilike`, `is` and `in`, optionally negated with `not.`, both
//!   standalone and inside `and` and `or` groups;
//! - `Prefer: count=exact`, reported with `Content-Range`, and
//!   `Prefer: return=minimal`;
//! - `Accept` of a single object, or of CSV;
//! - `HEAD`, and `POST`, `PATCH` and `DELETE`, which report the rows
//!   they would have affected without changing the source.
//!
//! Anything else is answered with a PostgREST style `400` error.
//!
//! Example:
//! ```rust,ignore
//! use postgrest_query::mock::Endpoint;
//! use serde::Serialize;
//!
//! #[derive(Clone, Serialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! let server = wiremock::MockServer::start().await;
//! let users = vec![User { id: 1, name: "alice".to_string() }];
//!
//! wiremock::Mock::given(wiremock::matchers::path("/users"))
//!     .respond_with(Endpoint::new(users))
//!     .mount(&server)
//!     .await;
//! ```

use std::cmp::Ordering;
use std::num::ParseIntError;
use std::ops::Deref;
use std::str::FromStr;

use log::{debug, trace};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;
use wiremock::{Request, Respond, ResponseTemplate};

use crate::filtering::FilterError;
use crate::operators::{FilterOp, Operator};
use crate::request::{CSV, JSON, OBJECT_JSON};

#[derive(Debug, Error)]
pub enum MockError {
    #[error("unknown query parameter `{0}`")]
    UnknownQueryParameter(String),
    #[error("expected integer value in query")]
    BadIntegerInQuery(#[from] ParseIntError),
    #[error("failed to parse filter `{0}`")]
    BadFilter(String),
    #[error(transparent)]
    BadOperator(#[from] FilterError),
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),
    #[error("failed to parse select `{0}`")]
    BadSelect(String),
    #[error("failed to parse order `{0}`")]
    BadOrder(String),
    #[error("empty or invalid json")]
    BadBody(#[from] serde_json::Error),
    #[error("unexpected body `{0}`")]
    UnexpectedBody(String),
    #[error("unsupported method `{0}`")]
    UnsupportedMethod(String),
}

impl MockError {
    fn code(&self) -> &'static str {
        match self {
            MockError::BadBody(_) | MockError::UnexpectedBody(_) => "PGRST102",
            _ => "PGRST100",
        }
    }
}

fn error_response(
    status: u16,
    code: &str,
    message: &str,
    details: Option<String>,
) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "code": code,
        "details": details,
        "hint": null,
        "message": message,
    }))
}

/// Split on the commas that are not inside parentheses, braces or
/// double quotes.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' | '{' if !quoted => depth += 1,
            ')' | '}' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn compare(field: &Value, value: &str) -> Option<Ordering> {
    match field {
        Value::Number(n) => {
            let value: f64 = value.parse().ok()?;
            n.as_f64()?.partial_cmp(&value)
        }
        Value::String(s) => Some(s.as_str().cmp(value)),
        Value::Bool(b) => {
            let value: bool = value.parse().ok()?;
            Some(b.cmp(&value))
        }
        _ => None,
    }
}

fn like_pattern(pattern: &str, insensitive: bool) -> Option<Regex> {
    let mut re = String::from(if insensitive { "(?i)^" } else { "^" });
    for c in pattern.chars() {
        match c {
            '%' | '*' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[derive(Debug)]
enum Test {
    Compare(fn(Ordering) -> bool, String),
    Like(Regex),
    Is(String),
    In(Vec<String>),
}

impl Test {
    fn new(op: &FilterOp, value: &str) -> Result<Self, MockError> {
        let unsupported = || MockError::UnsupportedOperator(op.to_string());
        if op.quantifier.is_some() || op.config.is_some() {
            return Err(unsupported());
        }
        let value = value.to_string();
        Ok(match op.operator {
            Operator::Eq => Test::Compare(|o| o == Ordering::Equal, value),
            Operator::Neq => Test::Compare(|o| o != Ordering::Equal, value),
            Operator::Gt => Test::Compare(|o| o == Ordering::Greater, value),
            Operator::Gte => Test::Compare(|o| o != Ordering::Less, value),
            Operator::Lt => Test::Compare(|o| o == Ordering::Less, value),
            Operator::Lte => Test::Compare(|o| o != Ordering::Greater, value),
            Operator::Like | Operator::Ilike => Test::Like(
                like_pattern(&value, op.operator == Operator::Ilike)
                    .ok_or_else(|| MockError::BadFilter(value.clone()))?,
            ),
            Operator::Is => Test::Is(value),
            Operator::In => {
                let inner = value
                    .strip_prefix('(')
                    .and_then(|v| v.strip_suffix(')'))
                    .ok_or_else(|| MockError::BadFilter(value.clone()))?;
                Test::In(
                    split_top_level(inner)
                        .into_iter()
                        .map(|v| unquote(v).to_string())
                        .collect(),
                )
            }
            _ => return Err(unsupported()),
        })
    }

    fn matches(&self, field: &Value) -> bool {
        match self {
            Test::Compare(accept, value) => compare(field, value).map(*accept).unwrap_or(false),
            Test::Like(re) => match field {
                Value::String(s) => re.is_match(s),
                Value::Number(n) => re.is_match(&n.to_string()),
                _ => false,
            },
            Test::Is(value) => match value.as_str() {
                "null" | "unknown" => field.is_null(),
                "true" => *field == Value::Bool(true),
                "false" => *field == Value::Bool(false),
                _ => false,
            },
            Test::In(values) => values
                .iter()
                .any(|v| compare(field, v) == Some(Ordering::Equal)),
        }
    }
}

#[derive(Debug)]
enum Expr {
    Condition {
        column: String,
        negated: bool,
        test: Test,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// A column filter, given as the key and value of a query pair.
    fn condition(column: &str, condition: &str) -> Result<Self, MockError> {
        let bad = || MockError::BadFilter(format!("{}={}", column, condition));
        let (name, mut value) = condition.split_once('.').ok_or_else(bad)?;
        let mut op_name = name.to_string();
        if name == "not" {
            let (name, rest) = value.split_once('.').ok_or_else(bad)?;
            op_name = format!("not.{}", name);
            value = rest;
        }
        let op = FilterOp::from_str(&op_name)?;
        Ok(Expr::Condition {
            column: column.to_string(),
            negated: op.negated,
            test: Test::new(&op, value)?,
        })
    }

    /// The parenthesised list of an `and` or `or` parameter.
    fn group(value: &str) -> Result<Vec<Expr>, MockError> {
        let inner = value
            .strip_prefix('(')
            .and_then(|v| v.strip_suffix(')'))
            .ok_or_else(|| MockError::BadFilter(value.to_string()))?;
        split_top_level(inner)
            .into_iter()
            .map(Expr::fragment)
            .collect()
    }

    fn fragment(fragment: &str) -> Result<Self, MockError> {
        let (negated, rest) = match fragment.strip_prefix("not.") {
            Some(rest) => (true, rest),
            None => (false, fragment),
        };
        let group = |name: &str| rest.strip_prefix(name).filter(|list| list.starts_with('('));
        let expr = if let Some(list) = group("and") {
            Expr::And(Expr::group(list)?)
        } else if let Some(list) = group("or") {
            Expr::Or(Expr::group(list)?)
        } else if negated {
            return Err(MockError::BadFilter(fragment.to_string()));
        } else {
            let (column, condition) = fragment
                .split_once('.')
                .ok_or_else(|| MockError::BadFilter(fragment.to_string()))?;
            Expr::condition(column, condition)?
        };
        Ok(if negated {
            Expr::Not(Box::new(expr))
        } else {
            expr
        })
    }

    fn matches(&self, row: &Value) -> bool {
        match self {
            Expr::Condition {
                column,
                negated,
                test,
            } => *negated != test.matches(row.get(column).unwrap_or(&Value::Null)),
            Expr::And(exprs) => exprs.iter().all(|e| e.matches(row)),
            Expr::Or(exprs) => exprs.iter().any(|e| e.matches(row)),
            Expr::Not(expr) => !expr.matches(row),
        }
    }
}

#[derive(Debug)]
struct OrderTerm {
    column: String,
    descending: bool,
    nulls_first: bool,
}

impl OrderTerm {
    fn parse(term: &str) -> Result<Self, MockError> {
        let bad = || MockError::BadOrder(term.to_string());
        let mut parts = term.split('.');
        let column = parts.next().filter(|c| !c.is_empty()).ok_or_else(bad)?;
        let mut descending = false;
        let mut nulls_first = None;
        for part in parts {
            match part {
                "asc" => descending = false,
                "desc" => descending = true,
                "nullsfirst" => nulls_first = Some(true),
                "nullslast" => nulls_first = Some(false),
                _ => return Err(bad()),
            }
        }
        Ok(Self {
            column: column.to_string(),
            descending,
            // PostgreSQL puts nulls first in descending order.
            nulls_first: nulls_first.unwrap_or(descending),
        })
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let a = a.get(&self.column).unwrap_or(&Value::Null);
        let b = b.get(&self.column).unwrap_or(&Value::Null);
        let nulls = if self.nulls_first {
            Ordering::Less
        } else {
            Ordering::Greater
        };
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => nulls,
            (false, true) => nulls.reverse(),
            (false, false) => {
                let order = match (a, b) {
                    (Value::Number(x), Value::Number(y)) => x
                        .as_f64()
                        .partial_cmp(&y.as_f64())
                        .unwrap_or(Ordering::Equal),
                    (Value::String(x), Value::String(y)) => x.cmp(y),
                    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                    _ => Ordering::Equal,
                };
                if self.descending {
                    order.reverse()
                } else {
                    order
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Query {
    select: Option<Vec<String>>,
    order: Vec<OrderTerm>,
    limit: Option<usize>,
    offset: usize,
    filters: Vec<Expr>,
}

impl Query {
    fn parse(url: &Url) -> Result<Self, MockError> {
        let mut query = Query::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "select" => query.select = Self::parse_select(&value)?,
                "order" => {
                    for term in value.split(',') {
                        query.order.push(OrderTerm::parse(term)?);
                    }
                }
                "limit" => query.limit = Some(usize::from_str(&value)?),
                "offset" => query.offset = usize::from_str(&value)?,
                "and" => query.filters.push(Expr::And(Expr::group(&value)?)),
                "or" => query.filters.push(Expr::Or(Expr::group(&value)?)),
                "columns" | "on_conflict" => {}
                column if !column.contains('.') => {
                    query.filters.push(Expr::condition(column, &value)?)
                }
                other => return Err(MockError::UnknownQueryParameter(other.to_string())),
            }
        }
        Ok(query)
    }

    fn parse_select(value: &str) -> Result<Option<Vec<String>>, MockError> {
        let mut columns = Vec::new();
        for column in split_top_level(value) {
            match column {
                "*" => return Ok(None),
                c if c.is_empty() || c.contains(&['(', ':', '.'][..]) => {
                    return Err(MockError::BadSelect(value.to_string()))
                }
                c => columns.push(unquote(c).to_string()),
            }
        }
        Ok(Some(columns))
    }

    fn matching(&self, rows: Vec<Value>) -> Vec<Value> {
        rows.into_iter()
            .filter(|row| self.filters.iter().all(|f| f.matches(row)))
            .collect()
    }

    fn page(&self, mut rows: Vec<Value>) -> Vec<Value> {
        rows.sort_by(|a, b| {
            self.order
                .iter()
                .map(|term| term.compare(a, b))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        rows.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }

    fn project(&self, row: Value) -> Value {
        match (&self.select, row) {
            (Some(columns), Value::Object(mut fields)) => {
                let mut projected = serde_json::Map::new();
                for column in columns {
                    let value = fields.remove(column).unwrap_or(Value::Null);
                    projected.insert(column.clone(), value);
                }
                Value::Object(projected)
            }
            (_, row) => row,
        }
    }

    fn columns(&self, rows: &[Value]) -> Vec<String> {
        match &self.select {
            Some(columns) => columns.clone(),
            None => rows
                .first()
                .and_then(Value::as_object)
                .map(|fields| fields.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) if s.contains(&[',', '"', '\n'][..]) => {
            format!("\"{}\"", s.replace('"', "\"\""))
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn to_csv(columns: &[String], rows: &[Value]) -> String {
    let mut lines = vec![columns.join(",")];
    for row in rows {
        let cells: Vec<String> = columns.iter().map(|c| csv_cell(row.get(c))).collect();
        lines.push(cells.join(","));
    }
    lines.join("\n")
}

/// What the request asked for in its headers.
struct Preferences {
    count: bool,
    minimal: bool,
    accept: String,
}

impl Preferences {
    fn new(request: &Request) -> Self {
        let prefer: Vec<String> = request
            .headers
            .get_all("prefer")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|p| p.trim().to_string())
            .collect();
        Self {
            count: prefer.iter().any(|p| p == "count=exact"),
            minimal: prefer.iter().any(|p| p == "return=minimal"),
            accept: request
                .headers
                .get("accept")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(JSON)
                .to_string(),
        }
    }
}

pub trait RowSource
where
    Self::Rows: Deref,
    for<'a> &'a <Self::Rows as Deref>::Target: IntoIterator<Item = &'a Self::Item>,
{
    type Item;
    type Rows;
    fn get(&self) -> Self::Rows;
}

impl<T: Clone> RowSource for Vec<T> {
    type Item = T;
    type Rows = Self;
    fn get(&self) -> Self::Rows {
        self.clone()
    }
}

impl<T> RowSource for std::sync::Arc<Vec<T>> {
    type Item = T;
    type Rows = Self;
    fn get(&self) -> Self::Rows {
        self.clone()
    }
}

pub struct Endpoint<T> {
    row_source: T,
}

impl<T, R> Endpoint<T>
where
    T: Send + Sync + RowSource<Item = R>,
    R: Serialize + 'static,
    <T as RowSource>::Rows: Deref,
    for<'a> &'a <<T as RowSource>::Rows as Deref>::Target: IntoIterator<Item = &'a R>,
{
    pub fn new(row_source: T) -> Self {
        Self { row_source }
    }

    fn rows(&self) -> Result<Vec<Value>, MockError> {
        let data: <T as RowSource>::Rows = self.row_source.get();
        let rows = (&*data)
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn body(request: &Request) -> Result<Value, MockError> {
        Ok(serde_json::from_slice(&request.body)?)
    }

    /// Render `rows` in the format the request accepts.
    fn render(
        status: u16,
        rows: Vec<Value>,
        query: &Query,
        prefs: &Preferences,
        head: bool,
    ) -> ResponseTemplate {
        if prefs.accept.starts_with(OBJECT_JSON) {
            if rows.len() != 1 {
                return error_response(
                    406,
                    "PGRST116",
                    "JSON object requested, multiple (or no) rows returned",
                    Some(format!("The result contains {} rows", rows.len())),
                );
            }
            let template = ResponseTemplate::new(status);
            return if head {
                template
            } else {
                template.set_body_json(&rows[0])
            };
        }

        let template = ResponseTemplate::new(status);
        if head {
            template
        } else if prefs.accept.starts_with(CSV) {
            template.set_body_raw(to_csv(&query.columns(&rows), &rows), CSV)
        } else {
            template.set_body_json(Value::Array(rows))
        }
    }

    fn read(
        &self,
        request: &Request,
        query: &Query,
        prefs: &Preferences,
    ) -> Result<ResponseTemplate, MockError> {
        let matched = query.matching(self.rows()?);
        let total = matched.len();
        let rows: Vec<Value> = query
            .page(matched)
            .into_iter()
            .map(|row| query.project(row))
            .collect();

        let range = if rows.is_empty() {
            "*".to_string()
        } else {
            format!("{}-{}", query.offset, query.offset + rows.len() - 1)
        };
        let total = if prefs.count {
            total.to_string()
        } else {
            "*".to_string()
        };
        let head = request.method == http::Method::HEAD;
        Ok(Self::render(200, rows, query, prefs, head)
            .insert_header("Content-Range", format!("{}/{}", range, total).as_str()))
    }

    fn mutated(
        status: u16,
        rows: Vec<Value>,
        query: &Query,
        prefs: &Preferences,
    ) -> ResponseTemplate {
        let total = if prefs.count {
            rows.len().to_string()
        } else {
            "*".to_string()
        };
        let rows: Vec<Value> = rows.into_iter().map(|row| query.project(row)).collect();
        let template = if prefs.minimal {
            ResponseTemplate::new(if status == 201 { 201 } else { 204 })
        } else {
            Self::render(status, rows, query, prefs, false)
        };
        template.insert_header("Content-Range", format!("*/{}", total).as_str())
    }

    fn handle(&self, request: &Request) -> Result<ResponseTemplate, MockError> {
        let query = Query::parse(&request.url)?;
        let prefs = Preferences::new(request);

        let method = &request.method;
        if *method == http::Method::GET || *method == http::Method::HEAD {
            self.read(request, &query, &prefs)
        } else if *method == http::Method::POST {
            let rows = match Self::body(request)? {
                Value::Array(rows) => rows,
                row @ Value::Object(_) => vec![row],
                other => return Err(MockError::UnexpectedBody(other.to_string())),
            };
            Ok(Self::mutated(201, rows, &query, &prefs))
        } else if *method == http::Method::PATCH {
            let patch = match Self::body(request)? {
                Value::Object(patch) => patch,
                other => return Err(MockError::UnexpectedBody(other.to_string())),
            };
            let rows = query
                .matching(self.rows()?)
                .into_iter()
                .map(|mut row| {
                    if let Value::Object(fields) = &mut row {
                        for (key, value) in &patch {
                            fields.insert(key.clone(), value.clone());
                        }
                    }
                    row
                })
                .collect();
            Ok(Self::mutated(200, rows, &query, &prefs))
        } else if *method == http::Method::DELETE {
            let rows = query.matching(self.rows()?);
            Ok(Self::mutated(200, rows, &query, &prefs))
        } else {
            Err(MockError::UnsupportedMethod(method.to_string()))
        }
    }
}

impl<T, R> Respond for Endpoint<T>
where
    T: Send + Sync + RowSource<Item = R>,
    R: Serialize + 'static,
    <T as RowSource>::Rows: Deref,
    for<'a> &'a <<T as RowSource>::Rows as Deref>::Target: IntoIterator<Item = &'a R>,
{
    fn respond(&self, request: &Request) -> ResponseTemplate {
        trace!("Request URL: {}", request.url);
        match self.handle(request) {
            Ok(template) => template,
            Err(e) => {
                debug!("Failed to respond to {}: {}", request.url, e);
                error_response(400, e.code(), &e.to_string(), None)
            }
        }
    }
}

//! The PostgREST filter operators, and the rendering of values used
//! on their right hand side.
//!
//! Each operator is written in the query string as a prefix of the
//! value, so `age=gte.25` filters on `age >= 25`. The operator can be
//! negated with a `not.` prefix, and some operators take a modifier:
//!
//! Operator           | Short name            | Meaning
//! -------------------|-----------------------|--------------------------------
//! [`Operator::Eq`]   | `eq`                  | equals
//! [`Operator::Neq`]  | `neq`                 | not equal
//! [`Operator::Gt`]   | `gt`                  | greater than
//! [`Operator::Gte`]  | `gte`                 | greater than or equal
//! [`Operator::Lt`]   | `lt`                  | less than
//! [`Operator::Lte`]  | `lte`                 | less than or equal
//! [`Operator::Like`] | `like`, `like(all)`, `like(any)`   | pattern match
//! [`Operator::Ilike`]| `ilike`, `ilike(all)`, `ilike(any)` | case insensitive pattern match
//! [`Operator::Is`]   | `is`                  | `null`, `true`, `false`, `unknown`
//! [`Operator::In`]   | `in`                  | one of a list
//! [`Operator::Cs`]   | `cs`                  | contains
//! [`Operator::Cd`]   | `cd`                  | contained by
//! [`Operator::Ov`]   | `ov`                  | overlaps
//! [`Operator::Sl`]   | `sl`                  | strictly left of
//! [`Operator::Sr`]   | `sr`                  | strictly right of
//! [`Operator::Nxl`]  | `nxl`                 | does not extend to the left of
//! [`Operator::Nxr`]  | `nxr`                 | does not extend to the right of
//! [`Operator::Adj`]  | `adj`                 | adjacent to
//! [`Operator::Fts`]  | `fts`, `fts(config)`  | full text search, and its `pl`, `ph` and `w` variants

use std::fmt::{self, Display};
use std::str::FromStr;

use strum::{AsRefStr, EnumString};

use crate::filtering::FilterError;

/// One of the fixed set of PostgREST operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    In,
    Cs,
    Cd,
    Sl,
    Sr,
    Nxl,
    Nxr,
    Adj,
    Ov,
    Fts,
    Plfts,
    Phfts,
    Wfts,
}

impl Operator {
    /// Whether this is one of the full text search operators, which
    /// accept a `(config)` suffix.
    pub fn is_text_search(&self) -> bool {
        matches!(
            self,
            Operator::Fts | Operator::Plfts | Operator::Phfts | Operator::Wfts
        )
    }

    /// Whether this is a pattern operator, which accepts an `(all)`
    /// or `(any)` suffix.
    pub fn is_pattern(&self) -> bool {
        matches!(self, Operator::Like | Operator::Ilike)
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// How a multi-pattern match combines its patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Quantifier {
    All,
    Any,
}

/// The variant of full text search to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextSearchType {
    /// `plfts`, `plainto_tsquery`
    Plain,
    /// `phfts`, `phraseto_tsquery`
    Phrase,
    /// `wfts`, `websearch_to_tsquery`
    Websearch,
}

impl TextSearchType {
    pub fn operator(&self) -> Operator {
        match self {
            TextSearchType::Plain => Operator::Plfts,
            TextSearchType::Phrase => Operator::Phfts,
            TextSearchType::Websearch => Operator::Wfts,
        }
    }
}

impl FromStr for TextSearchType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(TextSearchType::Plain),
            "phrase" => Ok(TextSearchType::Phrase),
            "websearch" => Ok(TextSearchType::Websearch),
            _ => Err(FilterError::UnknownTextSearchType(s.to_string())),
        }
    }
}

/// A fully specified operator, as written before the value in a
/// filter: `gte`, `not.in`, `like(any)`, `plfts(english)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterOp {
    pub negated: bool,
    pub operator: Operator,
    pub quantifier: Option<Quantifier>,
    pub config: Option<String>,
}

impl FilterOp {
    pub fn new(operator: Operator) -> Self {
        Self {
            negated: false,
            operator,
            quantifier: None,
            config: None,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

impl From<Operator> for FilterOp {
    fn from(operator: Operator) -> Self {
        FilterOp::new(operator)
    }
}

impl FromStr for FilterOp {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || FilterError::UnknownOperator(s.to_string());

        let (negated, rest) = match s.strip_prefix("not.") {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (name, modifier) = match rest.find('(') {
            Some(open) => {
                let inner = rest[open + 1..].strip_suffix(')').ok_or_else(unknown)?;
                if inner.is_empty() {
                    return Err(unknown());
                }
                (&rest[..open], Some(inner))
            }
            None => (rest, None),
        };

        let operator = Operator::from_str(name).map_err(|_| unknown())?;
        let mut op = FilterOp::new(operator);
        op.negated = negated;

        match modifier {
            None => {}
            Some(m) if operator.is_pattern() => {
                op.quantifier = Some(Quantifier::from_str(m).map_err(|_| unknown())?);
            }
            Some(m) if operator.is_text_search() => {
                op.config = Some(m.to_string());
            }
            Some(_) => return Err(unknown()),
        }

        Ok(op)
    }
}

impl Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("not.")?;
        }
        write!(f, "{}", self.operator)?;
        if let Some(q) = self.quantifier {
            write!(f, "({})", q.as_ref())?;
        }
        if let Some(config) = &self.config {
            write!(f, "({})", config)?;
        }
        Ok(())
    }
}

/// A value that can appear on the right hand side of a filter.
///
/// PostgREST values are untyped text in the query string, so this
/// is just a rendering to [`String`]. Anything that is [`Scalar`]
/// is rendered with its [`Display`] implementation; dates and times
/// are rendered in ISO 8601 form, and [`None`] is rendered as
/// `null`.
pub trait FilterValue {
    fn filter_value(&self) -> String;
}

/// A value whose [`Display`] output is its filter representation.
pub trait Scalar: Display {}

impl Scalar for i8 {}
impl Scalar for u8 {}
impl Scalar for i16 {}
impl Scalar for u16 {}
impl Scalar for i32 {}
impl Scalar for u32 {}
impl Scalar for i64 {}
impl Scalar for u64 {}
impl Scalar for isize {}
impl Scalar for usize {}
impl Scalar for f32 {}
impl Scalar for f64 {}
impl Scalar for bool {}
impl Scalar for char {}
impl Scalar for String {}
impl Scalar for &str {}
impl Scalar for &String {}

impl<T> FilterValue for T
where
    T: Scalar,
{
    fn filter_value(&self) -> String {
        self.to_string()
    }
}

impl<T> FilterValue for Option<T>
where
    T: FilterValue,
{
    fn filter_value(&self) -> String {
        match self {
            Some(v) => v.filter_value(),
            None => "null".to_string(),
        }
    }
}

impl<Tz> FilterValue for chrono::DateTime<Tz>
where
    Tz: chrono::TimeZone,
    Tz::Offset: Display,
{
    fn filter_value(&self) -> String {
        self.to_rfc3339()
    }
}

impl FilterValue for chrono::NaiveDate {
    fn filter_value(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

impl FilterValue for chrono::NaiveDateTime {
    fn filter_value(&self) -> String {
        self.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }
}

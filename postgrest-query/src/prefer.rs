//! Composition of the `Prefer` request header.
//!
//! Each preference is an independent `name=value` token. Tokens set
//! by the verb of a request (`select`, `insert`, ...) are joined with
//! commas into one header value, in the order they were requested.
//! Transaction level preferences are sent as further `Prefer` values
//! alongside it.

use std::fmt;

use strum::{AsRefStr, EnumString};

/// How the server should count the rows a request touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Count {
    Exact,
    Planned,
    Estimated,
}

impl Count {
    /// Read a count mode, ignoring anything other than `exact`,
    /// `planned` and `estimated`.
    pub fn parse(s: &str) -> Option<Count> {
        s.parse().ok()
    }
}

/// What a mutation should return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Returning {
    Minimal,
    #[default]
    Representation,
}

/// How an upsert resolves rows that conflict with existing ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Resolution {
    #[default]
    MergeDuplicates,
    IgnoreDuplicates,
}

/// Preference value that rolls back the transaction after the request.
pub const ROLLBACK: &str = "tx=rollback";

/// Preference values that make the server fail any request affecting
/// more than `count` rows.
pub fn max_affected(count: usize) -> [String; 2] {
    [
        "handling=strict".to_string(),
        format!("max-affected={}", count),
    ]
}

/// The preferences implied by the verb of a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Preferences {
    tokens: Vec<String>,
}

impl Preferences {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn push(&mut self, name: &str, value: &str) {
        self.tokens.push(format!("{}={}", name, value));
    }

    pub fn count(&mut self, count: Count) -> &mut Self {
        self.push("count", count.as_ref());
        self
    }

    pub fn returning(&mut self, returning: Returning) -> &mut Self {
        self.push("return", returning.as_ref());
        self
    }

    pub fn resolution(&mut self, resolution: Resolution) -> &mut Self {
        self.push("resolution", resolution.as_ref());
        self
    }

    /// Fill columns missing from an inserted payload with their
    /// default values rather than null.
    pub fn missing_default(&mut self) -> &mut Self {
        self.push("missing", "default");
        self
    }

    /// The header value, or `None` when no preference was expressed.
    pub fn header_value(&self) -> Option<String> {
        if self.tokens.is_empty() {
            None
        } else {
            Some(self.tokens.join(","))
        }
    }
}

impl fmt::Display for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_modes() {
        assert_eq!(Count::parse("exact"), Some(Count::Exact));
        assert_eq!(Count::parse("planned"), Some(Count::Planned));
        assert_eq!(Count::parse("estimated"), Some(Count::Estimated));
        assert_eq!(Count::parse("approximate"), None);
        assert_eq!(Count::parse(""), None);
    }

    #[test]
    fn tokens_in_call_order() {
        let mut p = Preferences::new();
        assert_eq!(p.header_value(), None);
        p.resolution(Resolution::IgnoreDuplicates)
            .returning(Returning::default())
            .count(Count::Exact);
        assert_eq!(
            p.header_value().as_deref(),
            Some("resolution=ignore-duplicates,return=representation,count=exact")
        );
    }

    #[test]
    fn merge_duplicates_and_minimal() {
        let mut p = Preferences::new();
        p.resolution(Resolution::default())
            .returning(Returning::Minimal)
            .missing_default();
        assert_eq!(
            p.to_string(),
            "resolution=merge-duplicates,return=minimal,missing=default"
        );
    }

    #[test]
    fn strict_handling() {
        assert_eq!(max_affected(10), ["handling=strict", "max-affected=10"]);
    }
}

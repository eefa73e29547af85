//! The specification of a single request, as it is built up.
//!
//! A [`RequestSpec`] is created when a resource is selected, mutated by
//! each call in a builder chain, and consumed by [`RequestSpec::prepare`]
//! when the request is sent. Errors found while building (an unknown
//! operator, a body that can't be encoded, ...) don't interrupt the
//! chain: the first one is kept on the spec, and returned instead of
//! sending anything.

use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use log::{debug, trace};
use strum::AsRefStr;
use url::Url;

use crate::error::Error;
use crate::filtering::FilterError;
use crate::params::QueryParams;
use crate::transport::{AbortSignal, HttpRequest};

pub const JSON: &str = "application/json";
pub const OBJECT_JSON: &str = "application/vnd.pgrst.object+json";
pub const CSV: &str = "text/csv";
pub const GEOJSON: &str = "application/geo+json";

pub(crate) const ACCEPT_PROFILE: &str = "accept-profile";
pub(crate) const CONTENT_PROFILE: &str = "content-profile";
pub(crate) const PREFER: &str = "prefer";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Patch,
    Delete,
}

impl Method {
    /// Whether this is a read, which selects the schema with
    /// `Accept-Profile` rather than `Content-Profile`.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }

    pub fn as_http(&self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Head => http::Method::HEAD,
            Method::Post => http::Method::POST,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
        }
    }
}

/// The form the caller wants the response data in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultShape {
    /// JSON, decoded as is.
    #[default]
    Array,
    /// Exactly one row, as an object.
    Single,
    /// At most one row.
    MaybeSingle,
    CsvText,
    PlanText,
    GeoJson,
}

#[derive(Debug)]
pub struct RequestSpec {
    pub method: Method,
    /// Path segments below the base URL, e.g. `["rpc", "add"]`.
    pub path: Vec<String>,
    pub schema: String,
    pub headers: HeaderMap,
    pub params: QueryParams,
    /// The serialized body, for `POST` and `PATCH`.
    pub body: Option<Vec<u8>>,
    pub shape: ResultShape,
    pub throw_on_error: bool,
    pub signal: Option<AbortSignal>,
    deferred: Option<Error>,
}

impl RequestSpec {
    pub fn new(path: Vec<String>, schema: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method: Method::default(),
            path,
            schema: schema.into(),
            headers,
            params: QueryParams::new(),
            body: None,
            shape: ResultShape::default(),
            throw_on_error: false,
            signal: None,
            deferred: None,
        }
    }

    /// Record an error to be reported when the request is executed.
    /// Only the first error is kept.
    pub fn defer(&mut self, error: impl Into<Error>) {
        let error = error.into();
        debug!("Deferring request error: {}", error);
        if self.deferred.is_none() {
            self.deferred = Some(error);
        }
    }

    pub fn deferred(&self) -> Option<&Error> {
        self.deferred.as_ref()
    }

    fn header_parts(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), FilterError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FilterError::InvalidHeader(name.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| FilterError::InvalidHeader(name.to_string()))?;
        Ok((name, value))
    }

    /// Set `name` to `value`, replacing all existing values.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match Self::header_parts(name, value) {
            Ok((name, value)) => {
                self.headers.insert(name, value);
            }
            Err(e) => self.defer(e),
        }
    }

    /// Add `value` to the values of `name`.
    pub fn append_header(&mut self, name: &str, value: &str) {
        match Self::header_parts(name, value) {
            Ok((name, value)) => {
                self.headers.append(name, value);
            }
            Err(e) => self.defer(e),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Whether any `Prefer` value holds a token starting `name=`.
    pub fn prefers(&self, name: &str) -> bool {
        self.header_values(PREFER)
            .iter()
            .flat_map(|v| v.split(','))
            .any(|token| {
                token
                    .trim()
                    .strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('='))
            })
    }

    pub fn accept(&self) -> Option<&str> {
        self.header(ACCEPT.as_str())
    }

    /// The URL of the request, below `base`.
    pub fn url(&self, base: &Url) -> Result<Url, Error> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration(format!("'{}' cannot be a base URL", base)))?
            .pop_if_empty()
            .extend(&self.path);
        self.params.apply_to(&mut url);
        Ok(url)
    }

    /// Turn the spec into a request for the transport.
    ///
    /// Fails without sending anything if an error was recorded while
    /// building, or if the abort signal has already fired.
    pub fn prepare(mut self, base: &Url) -> Result<HttpRequest, Error> {
        if let Some(error) = self.deferred.take() {
            return Err(error);
        }

        let timeout = match &self.signal {
            Some(signal) => signal.check()?,
            None => None,
        };

        let url = self.url(base)?;

        if !self.schema.is_empty() {
            let profile = if self.method.is_read() {
                ACCEPT_PROFILE
            } else {
                CONTENT_PROFILE
            };
            let schema = self.schema.clone();
            self.set_header(profile, &schema);
        }
        if !self.method.is_read() {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        }
        if let Some(error) = self.deferred.take() {
            return Err(error);
        }

        trace!("{} {}", self.method.as_ref(), url);

        Ok(HttpRequest {
            method: self.method,
            url,
            headers: self.headers,
            body: self.body,
            timeout,
        })
    }
}

//! # Interpreting PostgREST responses
//!
//! A response is reduced to a [`ResponseEnvelope`]: the status, the
//! decoded data, the row count from `Content-Range` and any error the
//! server reported. How the body is decoded depends on the
//! [`ResultShape`] that was requested:
//!
//! - for [`ResultShape::Array`] and [`ResultShape::GeoJson`] the body
//!   is decoded directly into the target type;
//! - for [`ResultShape::Single`] it is a single object, which is
//!   wrapped into a one element array if the target type is a
//!   sequence;
//! - for [`ResultShape::MaybeSingle`] an array of zero or one rows
//!   is unwrapped, and more than one row is an error;
//! - for [`ResultShape::CsvText`] and [`ResultShape::PlanText`] the
//!   body is text, which is only kept if the target type can be
//!   decoded from a string.
//!
//! Some error responses are not errors from the caller's point of
//! view. A `404` with an empty body is reported as `204 No Content`,
//! and a "0 rows" error is an empty success when at most one row was
//! asked for.

use std::fmt;
use std::sync::OnceLock;

use http::header::CONTENT_RANGE;
use http::HeaderMap;
use log::debug;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::request::{Method, ResultShape};
use crate::transport::RawResponse;

/// An error as reported by PostgREST.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub details: String,
    pub hint: String,
    pub code: String,
}

impl ErrorInfo {
    pub fn new(
        message: impl Into<String>,
        details: impl Into<String>,
        hint: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            details: details.into(),
            hint: hint.into(),
            code: code.into(),
        }
    }

    /// Read an error body. Anything other than a JSON object is
    /// rejected; fields that are missing or not strings are left
    /// empty.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        let object = value.as_object()?;
        let field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Self {
            message: field("message"),
            details: field("details"),
            hint: field("hint"),
            code: field("code"),
        })
    }

    /// Whether the server is complaining that no rows matched.
    fn is_no_rows(&self) -> bool {
        static NO_ROWS: OnceLock<Regex> = OnceLock::new();
        NO_ROWS
            .get_or_init(|| Regex::new(r"(^|[^0-9])0 rows").expect("static pattern is valid"))
            .is_match(&self.details)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// The interpreted result of a request.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseEnvelope<T> {
    pub status: u16,
    pub status_text: String,
    /// The decoded rows; `None` on error, for empty bodies, and for
    /// text that the target type can't hold.
    pub data: Option<T>,
    /// The total row count, when one was requested and reported.
    pub count: Option<i64>,
    pub error: Option<ErrorInfo>,
}

/// A decoded response body, before conversion to the target type.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// JSON to decode as is.
    Many(Value),
    /// A single row.
    One(Value),
    Text(String),
    Empty,
}

impl Payload {
    pub fn decode<T: DeserializeOwned>(self) -> Result<Option<T>, Error> {
        match self {
            Payload::Many(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(Error::Decode),
            Payload::One(value) => match serde_json::from_value(value.clone()) {
                Ok(data) => Ok(Some(data)),
                // The target may be a sequence of rows.
                Err(e) => serde_json::from_value(Value::Array(vec![value]))
                    .map(Some)
                    .map_err(|_| Error::Decode(e)),
            },
            Payload::Text(text) => Ok(serde_json::from_value(Value::String(text)).ok()),
            Payload::Empty => Ok(None),
        }
    }
}

/// The total from a `Content-Range` header, e.g. `0-24/3573`.
pub fn content_range_count(headers: &HeaderMap) -> Option<i64> {
    let range = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = range.split_once('/')?;
    if total == "*" {
        return None;
    }
    match total.trim().parse() {
        Ok(count) => Some(count),
        Err(_) => {
            debug!("Ignoring malformed Content-Range: {}", range);
            None
        }
    }
}

fn multiple_rows(count: usize) -> ErrorInfo {
    ErrorInfo::new(
        "JSON object requested, multiple (or no) rows returned",
        format!(
            "Results contain {} rows, application/vnd.pgrst.object+json requires 1 row",
            count
        ),
        "",
        "PGRST116",
    )
}

/// Interprets raw responses for one request.
#[derive(Clone, Copy, Debug)]
pub struct Interpreter {
    pub method: Method,
    pub shape: ResultShape,
    pub throw_on_error: bool,
    /// Whether the request asked for a count. Without one, any
    /// `Content-Range` total is ignored.
    pub counted: bool,
}

impl Interpreter {
    pub fn interpret<T: DeserializeOwned>(
        &self,
        response: RawResponse,
    ) -> Result<ResponseEnvelope<T>, Error> {
        let count = if self.counted {
            content_range_count(&response.headers)
        } else {
            None
        };
        let mut envelope = ResponseEnvelope {
            status: response.status,
            status_text: response.status_text,
            data: None,
            count,
            error: None,
        };

        if envelope.status >= 400 {
            let error = self.server_error(&mut envelope, &response.body);
            envelope.error = error;
            return self.finish(envelope);
        }

        if self.method == Method::Head {
            return Ok(envelope);
        }

        match self.payload(&response.body)? {
            Ok(payload) => envelope.data = payload.decode()?,
            Err(error) => {
                envelope.status = 406;
                envelope.status_text = "Not Acceptable".to_string();
                envelope.error = Some(error);
            }
        }
        self.finish(envelope)
    }

    fn server_error<T>(
        &self,
        envelope: &mut ResponseEnvelope<T>,
        body: &[u8],
    ) -> Option<ErrorInfo> {
        let error = match ErrorInfo::from_body(body) {
            Some(error) => error,
            None if envelope.status == 404 && body.is_empty() => {
                debug!("Treating empty 404 response as 204 No Content");
                envelope.status = 204;
                envelope.status_text = "No Content".to_string();
                return None;
            }
            None => ErrorInfo {
                message: String::from_utf8_lossy(body).into_owned(),
                ..Default::default()
            },
        };

        if self.shape == ResultShape::MaybeSingle && error.is_no_rows() {
            debug!("No rows for optional single row request: {}", error.details);
            envelope.status = 200;
            envelope.status_text = "OK".to_string();
            return None;
        }
        Some(error)
    }

    fn finish<T>(&self, mut envelope: ResponseEnvelope<T>) -> Result<ResponseEnvelope<T>, Error> {
        if self.shape == ResultShape::Single || self.throw_on_error {
            if let Some(error) = envelope.error.take() {
                return Err(Error::Server(error));
            }
        }
        Ok(envelope)
    }

    /// Read a successful body according to the requested shape. A
    /// body that breaks the shape's contract is returned as a server
    /// style error.
    fn payload(&self, body: &[u8]) -> Result<Result<Payload, ErrorInfo>, Error> {
        match self.shape {
            ResultShape::CsvText | ResultShape::PlanText => {
                return Ok(Ok(Payload::Text(String::from_utf8_lossy(body).into_owned())))
            }
            _ => {}
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Ok(Payload::Empty));
        }
        let value: Value = serde_json::from_slice(body).map_err(Error::Decode)?;

        Ok(match self.shape {
            ResultShape::Single => Ok(Payload::One(value)),
            ResultShape::MaybeSingle => match value {
                Value::Array(mut rows) => match rows.len() {
                    0 => Ok(Payload::Empty),
                    1 => Ok(Payload::One(rows.remove(0))),
                    n => Err(multiple_rows(n)),
                },
                other => Ok(Payload::One(other)),
            },
            _ => Ok(Payload::Many(value)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    fn interpreter(shape: ResultShape) -> Interpreter {
        Interpreter {
            method: Method::Get,
            shape,
            throw_on_error: false,
            counted: true,
        }
    }

    fn with_range(mut response: RawResponse, range: &str) -> RawResponse {
        response
            .headers
            .insert(CONTENT_RANGE, HeaderValue::from_str(range).unwrap());
        response
    }

    #[test_log::test]
    fn counts_from_content_range() {
        let count = |range: Option<&str>| {
            let mut headers = HeaderMap::new();
            if let Some(range) = range {
                headers.insert(CONTENT_RANGE, HeaderValue::from_str(range).unwrap());
            }
            content_range_count(&headers)
        };
        assert_eq!(count(Some("0-1/1")), Some(1));
        assert_eq!(count(Some("*/2")), Some(2));
        assert_eq!(count(Some("*/*")), None);
        assert_eq!(count(Some("0-24/*")), None);
        assert_eq!(count(Some("0-24/lots")), None);
        assert_eq!(count(Some("0-24")), None);
        assert_eq!(count(None), None);
    }

    #[test]
    fn array_with_count() {
        let response = with_range(
            RawResponse::new(200, r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#),
            "0-1/2",
        );
        let env: ResponseEnvelope<Vec<User>> =
            interpreter(ResultShape::Array).interpret(response).unwrap();
        assert_eq!(env.status, 200);
        assert_eq!(env.data.unwrap().len(), 2);
        assert_eq!(env.count, Some(2));
        assert_eq!(env.error, None);
    }

    #[test]
    fn no_count_unless_requested() {
        let mut i = interpreter(ResultShape::Array);
        i.counted = false;
        let response = with_range(
            RawResponse::new(200, r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#),
            "0-1/2",
        );
        let env: ResponseEnvelope<Vec<User>> = i.interpret(response).unwrap();
        assert_eq!(env.data.unwrap().len(), 2);
        assert_eq!(env.count, None);
    }

    #[test]
    fn undecodable_success_is_an_error() {
        let response = RawResponse::new(200, r#"{"id":"x"}"#);
        let result = interpreter(ResultShape::Array).interpret::<Vec<User>>(response);
        assert!(matches!(result, Err(Error::Decode(_))));

        let response = RawResponse::new(200, "not json");
        let result = interpreter(ResultShape::Array).interpret::<Value>(response);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn single_object_into_sequence() {
        let body = r#"{"id":1,"name":"a"}"#;
        let env: ResponseEnvelope<Vec<User>> = interpreter(ResultShape::Single)
            .interpret(RawResponse::new(200, body))
            .unwrap();
        assert_eq!(
            env.data,
            Some(vec![User {
                id: 1,
                name: "a".to_string()
            }])
        );

        let env: ResponseEnvelope<User> = interpreter(ResultShape::Single)
            .interpret(RawResponse::new(200, body))
            .unwrap();
        assert_eq!(env.data.unwrap().id, 1);
    }

    #[test]
    fn single_error_is_always_returned() {
        let body = r#"{"message":"JSON object requested, multiple (or no) rows returned","details":"The result contains 2 rows","hint":null,"code":"PGRST116"}"#;
        let result =
            interpreter(ResultShape::Single).interpret::<Value>(RawResponse::new(406, body));
        match result {
            Err(Error::Server(info)) => {
                assert_eq!(info.code, "PGRST116");
                assert_eq!(info.hint, "");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn maybe_single_rows() {
        let i = interpreter(ResultShape::MaybeSingle);

        let env: ResponseEnvelope<User> = i.interpret(RawResponse::new(200, "[]")).unwrap();
        assert_eq!((env.status, env.data, env.error), (200, None, None));

        let env: ResponseEnvelope<User> = i
            .interpret(RawResponse::new(200, r#"[{"id":7,"name":"x"}]"#))
            .unwrap();
        assert_eq!(env.data.unwrap().id, 7);

        let env: ResponseEnvelope<User> = i
            .interpret(RawResponse::new(
                200,
                r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#,
            ))
            .unwrap();
        assert_eq!(env.status, 406);
        assert_eq!(env.status_text, "Not Acceptable");
        assert_eq!(env.data, None);
        let error = env.error.unwrap();
        assert_eq!(error.code, "PGRST116");
        assert_eq!(
            error.details,
            "Results contain 2 rows, application/vnd.pgrst.object+json requires 1 row"
        );
    }

    #[test_log::test]
    fn maybe_single_zero_rows_error_is_success() {
        let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
        let env: ResponseEnvelope<User> = interpreter(ResultShape::MaybeSingle)
            .interpret(RawResponse::new(406, body))
            .unwrap();
        assert_eq!(env.status, 200);
        assert_eq!(env.status_text, "OK");
        assert_eq!(env.error, None);
        assert_eq!(env.data, None);

        let body = r#"{"code":"PGRST116","details":"The result contains 10 rows"}"#;
        let env: ResponseEnvelope<User> = interpreter(ResultShape::MaybeSingle)
            .interpret(RawResponse::new(406, body))
            .unwrap();
        assert_eq!(env.status, 406);
        assert!(env.error.is_some());
    }

    #[test_log::test]
    fn empty_404_is_no_content() {
        let env: ResponseEnvelope<Value> = interpreter(ResultShape::Array)
            .interpret(RawResponse::new(404, ""))
            .unwrap();
        assert_eq!(env.status, 204);
        assert_eq!(env.status_text, "No Content");
        assert_eq!(env.error, None);
    }

    #[test]
    fn unstructured_error_keeps_body() {
        let env: ResponseEnvelope<Value> = interpreter(ResultShape::Array)
            .interpret(with_range(RawResponse::new(502, "Bad gateway"), "*/3"))
            .unwrap();
        assert_eq!(env.status, 502);
        assert_eq!(env.count, Some(3));
        let error = env.error.unwrap();
        assert_eq!(error.message, "Bad gateway");
        assert_eq!(error.code, "");
    }

    #[test]
    fn throw_on_error() {
        let mut i = interpreter(ResultShape::Array);
        i.throw_on_error = true;
        let body = r#"{"message":"permission denied for table users","code":"42501"}"#;
        let result = i.interpret::<Value>(RawResponse::new(401, body));
        match result {
            Err(e) => {
                assert_eq!(e.server_error().unwrap().code, "42501");
                assert!(e.to_string().contains("permission denied"));
            }
            Ok(env) => panic!("unexpected {:?}", env),
        }
    }

    #[test]
    fn text_only_for_string_targets() {
        let body = "id,name\n1,a\n";
        let env: ResponseEnvelope<String> = interpreter(ResultShape::CsvText)
            .interpret(RawResponse::new(200, body))
            .unwrap();
        assert_eq!(env.data.as_deref(), Some(body));

        let env: ResponseEnvelope<Vec<User>> = interpreter(ResultShape::PlanText)
            .interpret(RawResponse::new(200, "Seq Scan on users"))
            .unwrap();
        assert_eq!(env.data, None);
        assert_eq!(env.error, None);
    }

    #[test]
    fn head_and_empty_bodies() {
        let mut i = interpreter(ResultShape::Array);
        i.method = Method::Head;
        let env: ResponseEnvelope<Vec<User>> = i
            .interpret(with_range(RawResponse::new(200, "garbage"), "0-9/10"))
            .unwrap();
        assert_eq!(env.data, None);
        assert_eq!(env.count, Some(10));

        let env: ResponseEnvelope<Vec<User>> = interpreter(ResultShape::Array)
            .interpret(RawResponse::new(201, ""))
            .unwrap();
        assert_eq!(env.status, 201);
        assert_eq!(env.data, None);
    }
}

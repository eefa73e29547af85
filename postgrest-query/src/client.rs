//! The client: shared configuration, and the entry points for
//! building requests.
//!
//! A [`Client`] is cheap to clone, and clones share their
//! configuration. The default headers and the schema can be changed
//! at any time, from any thread; each request takes a snapshot of
//! them when it is started with [`Client::from`] or [`Client::rpc`].

use std::sync::{Arc, PoisonError, RwLock};

use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::builder::{FilterBuilder, QueryBuilder};
use crate::error::Error;
use crate::filtering::FilterError;
use crate::prefer::{Count, Preferences};
use crate::request::{Method, RequestSpec, JSON, PREFER};
use crate::response::{ErrorInfo, Interpreter, ResponseEnvelope};
use crate::transport::Transport;

/// Identifies this library to the server.
pub const CLIENT_INFO: &str = concat!("postgrest-rs/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub schema: String,
    /// Headers sent with every request, after the defaults.
    pub headers: Vec<(String, String)>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            headers: Vec::new(),
        }
    }
}

impl ClientOptions {
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What to do when calling a database function.
#[derive(Clone, Debug, Default)]
pub struct RpcOptions {
    /// Send `HEAD`, with the arguments in the query string.
    pub head: bool,
    /// Send `GET`, with the arguments in the query string. Only
    /// possible for functions that don't modify the database.
    pub get: bool,
    pub count: Option<Count>,
}

fn header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let invalid = || Error::Validation(FilterError::InvalidHeader(name.to_string()));
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((header_name, header_value))
}

fn default_headers(options: &ClientOptions) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(JSON));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    headers.insert(
        HeaderName::from_static("x-client-info"),
        HeaderValue::from_static(CLIENT_INFO),
    );
    for (name, value) in &options.headers {
        let (name, value) = header(name, value)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// A function argument as a query parameter value.
fn rpc_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(rpc_param).collect();
            format!("{{{}}}", items.join(","))
        }
        other => other.to_string(),
    }
}

struct ClientInner {
    base_url: Url,
    schema: RwLock<String>,
    headers: RwLock<HeaderMap>,
    transport: Arc<dyn Transport>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url.as_str())
            .field("schema", &self.current_schema())
            .finish()
    }
}

impl Client {
    /// A client for the PostgREST server at `base_url`, using the
    /// default transport.
    #[cfg(feature = "reqwest")]
    pub fn new(base_url: &str) -> Result<Self, Error> {
        Self::with_options(base_url, ClientOptions::default())
    }

    #[cfg(feature = "reqwest")]
    pub fn with_options(base_url: &str, options: ClientOptions) -> Result<Self, Error> {
        let transport = crate::transport::ReqwestTransport::new()?;
        Self::with_transport(base_url, options, transport)
    }

    /// A client configured from the environment: `POSTGREST_URL` is
    /// the base URL, and the optional `POSTGREST_SCHEMA` and
    /// `POSTGREST_API_KEY` set the schema and the `apikey` header.
    #[cfg(feature = "reqwest")]
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("POSTGREST_URL")
            .map_err(|_| Error::Configuration("POSTGREST_URL is not set".to_string()))?;
        let mut options = ClientOptions::default();
        if let Ok(schema) = std::env::var("POSTGREST_SCHEMA") {
            options.schema = schema;
        }
        if let Ok(key) = std::env::var("POSTGREST_API_KEY") {
            options.headers.push(("apikey".to_string(), key));
        }
        Self::with_options(&base_url, options)
    }

    pub fn with_transport(
        base_url: &str,
        options: ClientOptions,
        transport: impl Transport + 'static,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Configuration(format!("invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "'{}' cannot be a base URL",
                base_url
            )));
        }
        let headers = default_headers(&options)?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                schema: RwLock::new(options.schema),
                headers: RwLock::new(headers),
                transport: Arc::new(transport),
            }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn current_schema(&self) -> String {
        self.inner
            .schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A snapshot of the default headers.
    pub fn headers(&self) -> HeaderMap {
        self.inner
            .headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set a default header, replacing any previous value.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = header(name, value)?;
        self.inner
            .headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
        Ok(())
    }

    pub fn set_api_key(&self, api_key: &str) -> Result<(), Error> {
        self.set_header("apikey", api_key)
    }

    /// Authenticate subsequent requests with a bearer token.
    pub fn set_auth_token(&self, token: &str) -> Result<(), Error> {
        self.set_header(AUTHORIZATION.as_str(), &format!("Bearer {}", token))
    }

    /// Use `schema` for subsequent requests from this client and its
    /// clones.
    pub fn change_schema(&self, schema: &str) {
        *self
            .inner
            .schema
            .write()
            .unwrap_or_else(PoisonError::into_inner) = schema.to_string();
    }

    /// A separate client for `schema`, with the same transport and a
    /// copy of the current headers.
    pub fn schema(&self, schema: &str) -> Client {
        Self {
            inner: Arc::new(ClientInner {
                base_url: self.inner.base_url.clone(),
                schema: RwLock::new(schema.to_string()),
                headers: RwLock::new(self.headers()),
                transport: self.inner.transport.clone(),
            }),
        }
    }

    fn spec(&self, path: Vec<String>) -> RequestSpec {
        RequestSpec::new(path, self.current_schema(), self.headers())
    }

    /// Start a request on the table or view `table`.
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(self.clone(), self.spec(vec![table.to_string()]))
    }

    /// Call the database function `function` with the named
    /// arguments `args`, which should serialize to an object.
    pub fn rpc<A: Serialize + ?Sized>(
        &self,
        function: &str,
        args: &A,
        options: RpcOptions,
    ) -> FilterBuilder {
        let mut spec = self.spec(vec!["rpc".to_string(), function.to_string()]);

        match serde_json::to_value(args) {
            Ok(value) if options.head || options.get => {
                spec.method = if options.head {
                    Method::Head
                } else {
                    Method::Get
                };
                if let Value::Object(named) = value {
                    for (name, value) in &named {
                        spec.params.set(name.as_str(), rpc_param(value));
                    }
                }
            }
            Ok(value) => {
                spec.method = Method::Post;
                match serde_json::to_vec(&value) {
                    Ok(body) => spec.body = Some(body),
                    Err(e) => spec.defer(Error::Encode(e)),
                }
            }
            Err(e) => spec.defer(Error::Encode(e)),
        }

        if let Some(count) = options.count {
            spec.set_header(PREFER, &Preferences::new().count(count).to_string());
        }

        FilterBuilder::new(self.clone(), spec)
    }

    /// Check that the server answers a `GET` on the base URL with
    /// `200 OK`.
    pub fn ping(&self) -> Result<(), Error> {
        let response = self.dispatch::<Value>(self.spec(Vec::new()))?;
        if let Some(error) = response.error {
            return Err(Error::Server(error));
        }
        if response.status != 200 {
            return Err(Error::Server(ErrorInfo::new(
                format!("ping failed: {} {}", response.status, response.status_text),
                "",
                "",
                "",
            )));
        }
        Ok(())
    }

    /// Send a request and interpret the response.
    pub(crate) fn dispatch<T: DeserializeOwned>(
        &self,
        spec: RequestSpec,
    ) -> Result<ResponseEnvelope<T>, Error> {
        let interpreter = Interpreter {
            method: spec.method,
            shape: spec.shape,
            throw_on_error: spec.throw_on_error,
            counted: spec.prefers("count"),
        };
        let request = spec.prepare(&self.inner.base_url)?;
        let response = self.inner.transport.send(request)?;
        debug!("Response status {} {}", response.status, response.status_text);
        interpreter.interpret(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpRequest, RawResponse, TransportError};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<HttpRequest>>,
        status: u16,
    }

    impl Transport for Recorder {
        fn send(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
            self.sent.lock().unwrap().push(request);
            Ok(RawResponse::new(self.status, "[]"))
        }
    }

    fn recording_client(status: u16) -> (Client, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            status,
            ..Default::default()
        });
        let client = Client::with_transport(
            "http://localhost:3000/rest/v1",
            ClientOptions::default().header("x-tenant", "acme"),
            recorder.clone(),
        )
        .unwrap();
        (client, recorder)
    }

    #[test]
    fn bad_base_urls() {
        let (_, recorder) = recording_client(200);
        assert!(matches!(
            Client::with_transport("not a url", ClientOptions::default(), recorder.clone()),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Client::with_transport("mailto:x@example.com", ClientOptions::default(), recorder),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn default_headers() {
        let (client, _) = recording_client(200);
        let headers = client.headers();
        assert_eq!(headers.get("accept").unwrap(), "application/json");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("x-tenant").unwrap(), "acme");
        assert!(headers
            .get("x-client-info")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("postgrest-rs/"));
        assert_eq!(client.current_schema(), "public");
    }

    #[test]
    fn credentials() {
        let (client, _) = recording_client(200);
        client.set_api_key("secret").unwrap();
        client.set_auth_token("token").unwrap();
        let headers = client.clone().headers();
        assert_eq!(headers.get("apikey").unwrap(), "secret");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
        assert!(matches!(
            client.set_api_key("bad\nkey"),
            Err(Error::Validation(FilterError::InvalidHeader(_)))
        ));
    }

    #[test]
    fn schemas() {
        let (client, recorder) = recording_client(200);
        let other = client.schema("audit");
        client.change_schema("private");
        assert_eq!(client.current_schema(), "private");
        assert_eq!(other.current_schema(), "audit");

        other.from("log").select("*").execute::<Value>().unwrap();
        client
            .from("users")
            .insert(&json!({"id": 1}))
            .execute::<Value>()
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].headers.get("accept-profile").unwrap(), "audit");
        assert_eq!(sent[1].headers.get("content-profile").unwrap(), "private");
    }

    #[test]
    fn rpc_post_and_get() {
        let (client, recorder) = recording_client(200);
        client
            .rpc(
                "add",
                &json!({"a": 1, "b": 2}),
                RpcOptions {
                    count: Some(Count::Exact),
                    ..Default::default()
                },
            )
            .execute::<Value>()
            .unwrap();
        client
            .rpc(
                "search",
                &json!({"tags": ["a", "b"], "q": "x"}),
                RpcOptions {
                    get: true,
                    ..Default::default()
                },
            )
            .execute::<Value>()
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].method, Method::Post);
        assert_eq!(sent[0].url.as_str(), "http://localhost:3000/rest/v1/rpc/add");
        assert_eq!(sent[0].headers.get("prefer").unwrap(), "count=exact");
        let body: Value = serde_json::from_slice(sent[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"a": 1, "b": 2}));

        assert_eq!(sent[1].method, Method::Get);
        assert_eq!(
            sent[1].url.query_pairs().into_owned().collect::<Vec<_>>(),
            vec![
                ("q".to_string(), "x".to_string()),
                ("tags".to_string(), "{a,b}".to_string())
            ]
        );
        assert!(sent[1].body.is_none());
    }

    #[test]
    fn ping() {
        let (client, recorder) = recording_client(200);
        client.ping().unwrap();
        assert_eq!(
            recorder.sent.lock().unwrap()[0].url.as_str(),
            "http://localhost:3000/rest/v1"
        );

        let (client, _) = recording_client(503);
        assert!(matches!(client.ping(), Err(Error::Server(_))));
    }
}

//! # postgrest-query
//!
//! Build PostgREST requests, and make sense of the responses.
//!
//! PostgREST exposes the tables, views and functions of a PostgreSQL
//! database over HTTP. Everything about a query (which rows, which
//! columns, in what order, how many, how to count them) is written
//! into the URL's query string and a handful of headers. This crate
//! assembles those from a chain of method calls, sends the request
//! through a pluggable [`Transport`](transport::Transport), and
//! interprets the status, headers and body that come back as a
//! [`ResponseEnvelope`].
//!
//! ```no_run
//! use postgrest_query::{Client, Count, OrderOptions, SelectOptions};
//! use serde_json::Value;
//!
//! # fn main() -> Result<(), postgrest_query::Error> {
//! let client = Client::new("http://localhost:3000")?;
//! let response = client
//!     .from("films")
//!     .select_with(
//!         "title, year",
//!         SelectOptions {
//!             count: Some(Count::Exact),
//!             ..Default::default()
//!         },
//!     )
//!     .ilike("title", "%star%")
//!     .gte("year", 1977)
//!     .order("year", OrderOptions::ascending())
//!     .range(0, 9, None)
//!     .execute::<Vec<Value>>()?;
//!
//! println!("{} matching films", response.count.unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! The parts are usable on their own: [`filtering`] and [`ordering`]
//! work on a bare [`QueryParams`](params::QueryParams), and
//! [`response`] can interpret a response fetched any other way.
//!
//! With the `wiremock` feature, [`mock`] provides an emulated
//! PostgREST endpoint to test against.

pub mod builder;
pub mod client;
pub mod error;
pub mod filtering;
#[cfg(feature = "wiremock")]
pub mod mock;
pub mod operators;
pub mod ordering;
pub mod params;
pub mod prefer;
pub mod request;
pub mod response;
pub mod transport;

pub use crate::builder::{
    ExplainFormat, ExplainOptions, FilterBuilder, InsertOptions, MutationOptions, QueryBuilder,
    SelectOptions, UpsertOptions,
};
pub use crate::client::{Client, ClientOptions, RpcOptions};
pub use crate::error::Error;
pub use crate::operators::{FilterValue, Scalar};
pub use crate::ordering::OrderOptions;
pub use crate::prefer::{Count, Resolution, Returning};
pub use crate::response::{ErrorInfo, ResponseEnvelope};
pub use crate::transport::{AbortSignal, Transport};
#[cfg(feature = "reqwest")]
pub use crate::transport::ReqwestTransport;

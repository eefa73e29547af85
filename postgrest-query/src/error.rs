use thiserror::Error;

use crate::filtering::FilterError;
use crate::response::ErrorInfo;
use crate::transport::TransportError;

/// Everything that can go wrong between building a request and
/// reading its result.
#[derive(Debug, Error)]
pub enum Error {
    /// The client cannot be used, for example because its base URL is
    /// malformed.
    #[error("invalid client configuration: {0}")]
    Configuration(String),
    /// The request was built with invalid arguments. Nothing was sent.
    #[error("invalid request: {0}")]
    Validation(#[from] FilterError),
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// The server rejected the request.
    #[error("server error: {0}")]
    Server(#[from] ErrorInfo),
    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl Error {
    /// The server's error, if this is one.
    pub fn server_error(&self) -> Option<&ErrorInfo> {
        match self {
            Error::Server(info) => Some(info),
            _ => None,
        }
    }
}

//! The HTTP transport used to send requests.
//!
//! The query building and response handling in this crate don't
//! depend on any particular HTTP client: a [`Transport`] is anything
//! that can send an [`HttpRequest`] and return the status, headers
//! and body of the response. [`ReqwestTransport`], enabled by the
//! `reqwest` feature, is the default.
//!
//! Requests can be cancelled, or given a deadline, with an
//! [`AbortSignal`]. A signal that has already fired when a request is
//! dispatched stops it from being sent at all; otherwise the time left
//! before the deadline is passed to the transport as a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::HeaderMap;
use thiserror::Error;
use url::Url;

use crate::request::Method;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request cancelled")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A fully assembled request, ready to send.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// The longest the transport may take over the request.
    pub timeout: Option<Duration>,
}

/// A response as received, before any interpretation.
#[derive(Clone, Debug, Default)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: http::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Something that can send requests.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        (**self).send(request)
    }
}

/// A cancellation token, with an optional deadline.
///
/// Clones share the same cancellation state, so a signal can be
/// handed to a request and aborted from elsewhere.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            aborted: Default::default(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if the signal has fired, otherwise return the time left
    /// before the deadline, if there is one.
    pub fn check(&self) -> Result<Option<Duration>, TransportError> {
        if self.is_aborted() {
            return Err(TransportError::Cancelled);
        }
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(TransportError::DeadlineExceeded)
                } else {
                    Ok(Some(deadline - now))
                }
            }
        }
    }
}

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use super::*;

    /// A [`Transport`] over a blocking [`reqwest`] client.
    ///
    /// The blocking client runs its own runtime, so it must not be
    /// used from within an async context.
    #[derive(Clone, Debug)]
    pub struct ReqwestTransport {
        client: reqwest::blocking::Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Result<Self, TransportError> {
            let client = reqwest::blocking::Client::builder()
                .build()
                .map_err(|e| TransportError::Other(e.into()))?;
            Ok(Self { client })
        }

        pub fn from_client(client: reqwest::blocking::Client) -> Self {
            Self { client }
        }
    }

    impl Transport for ReqwestTransport {
        fn send(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
            let mut builder = self
                .client
                .request(request.method.as_http(), request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().map_err(|e| {
                if e.is_timeout() {
                    TransportError::DeadlineExceeded
                } else {
                    TransportError::Other(e.into())
                }
            })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .map_err(|e| TransportError::Other(e.into()))?;

            Ok(RawResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                headers,
                body: body.to_vec(),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_signal_passes() {
        let signal = AbortSignal::new();
        assert!(matches!(signal.check(), Ok(None)));
    }

    #[test]
    fn aborted_signal_is_shared_by_clones() {
        let signal = AbortSignal::new();
        let other = signal.clone();
        other.abort();
        assert!(signal.is_aborted());
        assert!(matches!(signal.check(), Err(TransportError::Cancelled)));
    }

    #[test]
    fn deadlines() {
        let past = AbortSignal::with_deadline(Instant::now());
        assert!(matches!(past.check(), Err(TransportError::DeadlineExceeded)));

        let future = AbortSignal::with_timeout(Duration::from_secs(60));
        let left = future.check().unwrap().unwrap();
        assert!(left <= Duration::from_secs(60));
        assert!(left > Duration::from_secs(30));
    }

    #[test]
    fn canned_status_text() {
        assert_eq!(RawResponse::new(406, "").status_text, "Not Acceptable");
        assert_eq!(RawResponse::new(599, "").status_text, "");
    }
}

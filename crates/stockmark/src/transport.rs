//! Request/response transport for the stock endpoint.
//!
//! The stock client only needs "send a GET, get a status and a body". Timeouts
//! and retries live in [`crate::StockClient`]; transports report what happened
//! on a single attempt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reasons a request produced no response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportFailure {
    /// Request failed for an unspecified reason
    Failed,
    /// Connection was refused
    ConnectionRefused,
    /// Connection was reset
    ConnectionReset,
    /// DNS name could not be resolved
    NameNotResolved,
    /// The transport itself gave up waiting
    TimedOut,
}

impl TransportFailure {
    /// Browser-style error code
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Failed => "net::ERR_FAILED",
            Self::ConnectionRefused => "net::ERR_CONNECTION_REFUSED",
            Self::ConnectionReset => "net::ERR_CONNECTION_RESET",
            Self::NameNotResolved => "net::ERR_NAME_NOT_RESOLVED",
            Self::TimedOut => "net::ERR_TIMED_OUT",
        }
    }
}

/// Outbound GET request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Absolute URL
    pub url: String,
    /// Bearer token for the `Authorization` header
    pub bearer: Option<String>,
}

/// Response to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A 200 response with a JSON body
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            status: 200,
            body: value.to_string().into_bytes(),
        }
    }

    /// An error response
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "errorMessage": message })
                .to_string()
                .into_bytes(),
        }
    }

    /// Whether the status is 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// A single-attempt request primitive
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a GET request
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure>;
}

/// What a [`MockTransport`] does for one request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond after `delay`
    Respond {
        /// Response to return
        response: HttpResponse,
        /// Artificial latency
        delay: Duration,
    },
    /// Fail after `delay`
    Fail {
        /// Failure to report
        failure: TransportFailure,
        /// Artificial latency
        delay: Duration,
    },
}

impl MockReply {
    /// Immediate response
    #[must_use]
    pub const fn respond(response: HttpResponse) -> Self {
        Self::Respond {
            response,
            delay: Duration::ZERO,
        }
    }

    /// Immediate failure
    #[must_use]
    pub const fn fail(failure: TransportFailure) -> Self {
        Self::Fail {
            failure,
            delay: Duration::ZERO,
        }
    }

    /// Add latency before the reply
    #[must_use]
    pub fn after(self, latency: Duration) -> Self {
        match self {
            Self::Respond { response, .. } => Self::Respond {
                response,
                delay: latency,
            },
            Self::Fail { failure, .. } => Self::Fail {
                failure,
                delay: latency,
            },
        }
    }
}

/// A request seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    /// The request
    pub request: HttpRequest,
    /// When it arrived, on the tokio clock
    pub at: tokio::time::Instant,
}

#[derive(Debug, Default)]
struct MockState {
    scripted: VecDeque<MockReply>,
    fallback: Option<MockReply>,
    captured: Vec<CapturedRequest>,
}

/// Scripted transport for tests and offline runs.
///
/// Replies are consumed in order; once the script is exhausted the fallback
/// reply (if any) is used, otherwise requests fail with
/// [`TransportFailure::Failed`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create an empty mock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply
    #[must_use]
    pub fn then(self, reply: MockReply) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.scripted.push_back(reply);
        }
        self
    }

    /// Reply used once the script is exhausted
    #[must_use]
    pub fn otherwise(self, reply: MockReply) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fallback = Some(reply);
        }
        self
    }

    /// Every request received so far
    #[must_use]
    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.state
            .lock()
            .map(|s| s.captured.clone())
            .unwrap_or_default()
    }

    /// Number of requests received so far
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.lock().map(|s| s.captured.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let reply = {
            let Ok(mut state) = self.state.lock() else {
                return Err(TransportFailure::Failed);
            };
            state.captured.push(CapturedRequest {
                request,
                at: tokio::time::Instant::now(),
            });
            state
                .scripted
                .pop_front()
                .or_else(|| state.fallback.clone())
        };

        match reply {
            Some(MockReply::Respond { response, delay }) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(MockReply::Fail { failure, delay }) => {
                tokio::time::sleep(delay).await;
                Err(failure)
            }
            None => Err(TransportFailure::Failed),
        }
    }
}

/// Transport backed by `reqwest`
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    /// Create a transport with a default client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport around a configured client
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let mut builder = self
            .client
            .get(&request.url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportFailure::TimedOut
            } else if e.is_connect() {
                TransportFailure::ConnectionRefused
            } else {
                TransportFailure::Failed
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|_| TransportFailure::ConnectionReset)?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

//! Error vocabulary for the transport core.
//!
//! # Taxonomy
//! - `TransportError`: the engine failed (connect, I/O, timeout). Never retried here.
//! - `WebSocketHandshakeError`: the server answered the upgrade with a plain HTTP
//!   response. Carries that response for inspection.
//! - `BodyError`: terminal state of a streamed body, shared by every `done()` waiter.
//! - `ClientError`: everything a caller of the public API can see.
//!
//! Non-success HTTP statuses are not errors at this layer; they come back as
//! ordinary responses.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::http::response::HttpResponse;

/// Boxed error used for caller-supplied callbacks and token sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures raised by the underlying transport engine.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not complete the exchange.
    #[error("HTTP request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// Reading the response body failed midway.
    #[error("failed to read response body: {0}")]
    Body(#[source] BoxError),

    /// The WebSocket engine failed outside of the HTTP upgrade itself.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Plain I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response headers (or no upgrade) within the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be turned into something the engine accepts.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub(crate) fn body(err: impl Into<BoxError>) -> Self {
        TransportError::Body(err.into())
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Request(_) => "request",
            TransportError::Body(_) => "body",
            TransportError::WebSocket(_) => "websocket",
            TransportError::Io(_) => "io",
            TransportError::Timeout(_) => "timeout",
            TransportError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// The server rejected a WebSocket upgrade with an HTTP response.
#[derive(Debug, Error)]
#[error("WebSocket handshake rejected with status {}", .response.code())]
pub struct WebSocketHandshakeError {
    response: HttpResponse<Bytes>,
    #[source]
    cause: TransportError,
}

impl WebSocketHandshakeError {
    pub(crate) fn new(response: HttpResponse<Bytes>, cause: TransportError) -> Self {
        Self { response, cause }
    }

    /// The rejected upgrade response (status, headers, body).
    pub fn response(&self) -> &HttpResponse<Bytes> {
        &self.response
    }

    /// The engine-level error the rejection was reported with.
    pub fn cause(&self) -> &TransportError {
        &self.cause
    }

    pub fn into_response(self) -> HttpResponse<Bytes> {
        self.response
    }
}

/// Terminal failure of a streamed body.
#[derive(Debug, Clone, Error)]
pub enum BodyError {
    /// `cancel()` was called, or every handle to the body was dropped.
    #[error("body consumption was cancelled")]
    Cancelled,

    /// The consumer callback returned an error.
    #[error("body consumer failed: {0}")]
    Consumer(Arc<dyn std::error::Error + Send + Sync>),

    /// The upstream stream failed.
    #[error("body stream failed: {0}")]
    Upstream(Arc<TransportError>),
}

/// Errors surfaced by [`HttpClient`](crate::HttpClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handshake(#[from] WebSocketHandshakeError),

    /// A builder was finished with missing or malformed parts.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The response body could not be decoded into the requested type.
    #[error("failed to decode response body: {0}")]
    Decode(#[source] BoxError),

    /// The client handle was closed.
    #[error("client is closed")]
    Closed,

    #[error("invalid client configuration: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<http::Error> for ClientError {
    fn from(err: http::Error) -> Self {
        ClientError::InvalidRequest(err.to_string())
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

//! Transport engine seam.
//!
//! # Data Flow
//! ```text
//! HttpRequest snapshot
//!     → Transport::send (engine does TCP/TLS/HTTP framing)
//!     → TransportResponse { status, headers, ByteStream }
//!
//! WebSocketConnect (ws/wss URI, headers, subprotocol, timeout)
//!     → Transport::connect_websocket
//!     → WebSocketOutcome::{Connected, Rejected, Failed}
//! ```
//!
//! # Design Decisions
//! - The engine is a trait object so clients derived from one another can
//!   share it and tests can swap in a scripted engine
//! - A rejected upgrade is its own outcome variant, carrying the HTTP
//!   response, rather than an error the caller has to downcast
//! - Futures are boxed and `'static`; the engine clones whatever it needs

pub mod engine;
pub mod tls;

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::Sink;
use http::{HeaderMap, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::http::error::TransportError;
use crate::http::request::HttpRequest;

pub use self::engine::HyperTransport;

/// Raw response body as delivered by the engine.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Outgoing half of an established WebSocket.
pub type MessageSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;

/// Incoming half of an established WebSocket.
pub type MessageStream = BoxStream<'static, Result<Message, tungstenite::Error>>;

/// The engine that actually moves bytes.
pub trait Transport: Send + Sync + 'static {
    /// Issue `request`. `timeout` bounds the wait for response headers.
    fn send(
        &self,
        request: &HttpRequest,
        timeout: Option<Duration>,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;

    /// Open a WebSocket. The URI already carries the `ws`/`wss` scheme.
    fn connect_websocket(&self, connect: WebSocketConnect) -> BoxFuture<'static, WebSocketOutcome>;
}

/// Response head plus an unread body.
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Everything the engine needs to open a WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnect {
    pub uri: Url,
    pub headers: HeaderMap,
    pub subprotocol: Option<String>,
    pub connect_timeout: Option<Duration>,
}

/// Result of a connect attempt.
pub enum WebSocketOutcome {
    /// Upgrade succeeded.
    Connected(WebSocketConnection),
    /// The server answered the upgrade with a plain HTTP response.
    Rejected(HandshakeRejection),
    /// Anything else: DNS, refused connection, timeout, protocol violation.
    Failed(TransportError),
}

impl WebSocketOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebSocketOutcome::Connected(_) => "connected",
            WebSocketOutcome::Rejected(_) => "rejected",
            WebSocketOutcome::Failed(_) => "failed",
        }
    }
}

/// A live WebSocket, split into halves.
pub struct WebSocketConnection {
    pub sink: MessageSink,
    pub stream: MessageStream,
    /// Subprotocol the server selected, if any.
    pub protocol: Option<String>,
}

/// The HTTP response a server sent instead of switching protocols.
#[derive(Debug)]
pub struct HandshakeRejection {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cause: TransportError,
}

//! WebSocket request builder.

use std::fmt;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;

use crate::http::client::HttpClient;
use crate::http::error::{ClientError, ClientResult};
use crate::http::request::{BasicBuilder, HttpRequest};
use crate::websocket::socket::{WebSocket, WebSocketListener};
use crate::websocket::upgrade;

/// Builds a WebSocket connection through the owning client's interceptors.
///
/// The URI keeps whatever scheme the caller gave it (usually `https`); it is
/// rewritten to `ws`/`wss` only when connecting.
#[derive(Clone)]
pub struct WebSocketBuilder {
    client: HttpClient,
    uri: Option<Url>,
    headers: HeaderMap,
    subprotocol: Option<String>,
    timeout: Option<Duration>,
    error: Option<String>,
}

impl WebSocketBuilder {
    pub(crate) fn new(client: HttpClient) -> Self {
        Self {
            client,
            uri: None,
            headers: HeaderMap::new(),
            subprotocol: None,
            timeout: None,
            error: None,
        }
    }

    pub fn uri(mut self, uri: Url) -> Self {
        self.uri = Some(uri);
        self
    }

    pub fn url(mut self, uri: &str) -> Self {
        match Url::parse(uri) {
            Ok(parsed) => self.uri = Some(parsed),
            Err(e) => self.record_error(format!("invalid URI '{}': {}", uri, e)),
        }
        self
    }

    /// Append a header value. Invalid names or values fail at connect time.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: fmt::Display,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: fmt::Display,
    {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            (Err(e), _) => self.record_error(format!("invalid header name: {}", e)),
            (_, Err(e)) => self.record_error(format!("invalid header value: {}", e)),
        }
        self
    }

    /// Request a subprotocol, e.g. `v4.channel.k8s.io`.
    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    /// Connect timeout. Defaults to the client read timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn get_subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    pub fn get_connect_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The upgrade as a plain GET, in the form interceptors see it.
    pub fn as_request(&self) -> ClientResult<HttpRequest> {
        if let Some(e) = &self.error {
            return Err(ClientError::InvalidRequest(e.clone()));
        }
        let uri = self
            .uri
            .clone()
            .ok_or_else(|| ClientError::InvalidRequest("WebSocket request has no URI".to_string()))?;
        let mut builder = HttpRequest::builder().uri(uri).method(Method::GET);
        for (name, value) in self.headers.iter() {
            builder.append_header(name.clone(), value.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    /// Run the interceptors and connect. `listener` receives every event of
    /// the resulting socket.
    pub async fn build_async<L>(&self, listener: L) -> ClientResult<WebSocket>
    where
        L: WebSocketListener,
    {
        upgrade::connect(self, listener).await
    }

    pub(crate) fn client(&self) -> &HttpClient {
        &self.client
    }

    fn record_error(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }
}

impl BasicBuilder for WebSocketBuilder {
    fn set_uri(&mut self, uri: Url) {
        self.uri = Some(uri);
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn remove_header(&mut self, name: &HeaderName) {
        self.headers.remove(name);
    }

    fn has_header(&self, name: &HeaderName) -> bool {
        self.headers.contains_key(name)
    }
}

impl fmt::Debug for WebSocketBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketBuilder")
            .field("uri", &self.uri.as_ref().map(Url::as_str))
            .field("headers", &self.headers)
            .field("subprotocol", &self.subprotocol)
            .field("timeout", &self.timeout)
            .finish()
    }
}

//! Request model.
//!
//! # Responsibilities
//! - Immutable request snapshots handed to the transport
//! - Copy-on-write builders (`HttpRequest::new_builder`)
//! - The `BasicBuilder` view shared by HTTP and WebSocket builders, which is
//!   what interceptors mutate
//!
//! # Design Decisions
//! - Headers are an `http::HeaderMap`: case-insensitive, multi-valued, values
//!   kept in insertion order per key
//! - Building never mutates the builder, so a builder can be snapshotted
//!   repeatedly while interceptors keep working on it
//! - Stream bodies are suppliers so a retried request can be sent again

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method};
use serde::Serialize;
use url::Url;

use crate::http::error::{ClientError, ClientResult};
use crate::transport::ByteStream;

/// Produces a fresh body stream for every send of the request.
pub type StreamSupplier = Arc<dyn Fn() -> ByteStream + Send + Sync>;

/// Request payload.
#[derive(Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Stream(StreamSupplier),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// An immutable HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: Url,
    headers: HeaderMap,
    body: RequestBody,
    timeout: Option<Duration>,
}

impl HttpRequest {
    /// Start a request from scratch. Prefer
    /// [`HttpClient::new_http_request_builder`](crate::HttpClient::new_http_request_builder),
    /// which seeds the client's read timeout.
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// A builder holding a deep copy of this request.
    pub fn new_builder(&self) -> HttpRequestBuilder {
        HttpRequestBuilder {
            method: self.method.clone(),
            uri: Some(self.uri.clone()),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: self.timeout,
            error: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// All values for `name`, in insertion order. Values that are not valid
    /// visible ASCII are skipped.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Mutation surface shared by request and WebSocket builders.
///
/// Interceptors only ever see this view, so the same interceptor applies to
/// plain requests and to WebSocket upgrades.
pub trait BasicBuilder: Send {
    fn set_uri(&mut self, uri: Url);

    /// Add a value, keeping existing values for the same name.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Replace every existing value for the name.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    fn remove_header(&mut self, name: &HeaderName);

    fn has_header(&self, name: &HeaderName) -> bool;
}

/// Mutable, chainable request builder.
#[derive(Debug, Clone)]
pub struct HttpRequestBuilder {
    method: Method,
    uri: Option<Url>,
    headers: HeaderMap,
    body: RequestBody,
    timeout: Option<Duration>,
    error: Option<String>,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: None,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
            error: None,
        }
    }
}

impl HttpRequestBuilder {
    pub fn uri(mut self, uri: Url) -> Self {
        self.uri = Some(uri);
        self
    }

    /// Parse and set the target URI.
    pub fn url(mut self, uri: &str) -> Self {
        match Url::parse(uri) {
            Ok(parsed) => self.uri = Some(parsed),
            Err(e) => self.record_error(format!("invalid URI '{}': {}", uri, e)),
        }
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append a header value. Invalid names or values fail at `build()`.
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

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn post(self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.with_payload(Method::POST, content_type, body.into())
    }

    pub fn put(self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.with_payload(Method::PUT, content_type, body.into())
    }

    pub fn patch(self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.with_payload(Method::PATCH, content_type, body.into())
    }

    pub fn delete(mut self) -> Self {
        self.method = Method::DELETE;
        self
    }

    /// Serialize `value` as a JSON body, keeping the current method.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.body = RequestBody::Bytes(bytes.into());
            }
            Err(e) => self.record_error(format!("failed to serialize JSON body: {}", e)),
        }
        self
    }

    /// Snapshot the builder. The builder stays usable.
    pub fn build(&self) -> ClientResult<HttpRequest> {
        if let Some(e) = &self.error {
            return Err(ClientError::InvalidRequest(e.clone()));
        }
        let uri = self
            .uri
            .clone()
            .ok_or_else(|| ClientError::InvalidRequest("request has no URI".to_string()))?;
        Ok(HttpRequest {
            method: self.method.clone(),
            uri,
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: self.timeout,
        })
    }

    fn with_payload(mut self, method: Method, content_type: &str, body: Bytes) -> Self {
        self.method = method;
        match HeaderValue::from_str(content_type) {
            Ok(v) => self.set_header(CONTENT_TYPE, v),
            Err(e) => self.record_error(format!("invalid content type: {}", e)),
        }
        self.body = RequestBody::Bytes(body);
        self
    }

    fn record_error(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }
}

impl BasicBuilder for HttpRequestBuilder {
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

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::AUTHORIZATION;

    fn base() -> HttpRequest {
        HttpRequest::builder()
            .url("https://cluster.local/api/v1/pods")
            .header("Accept", "application/json")
            .build()
            .unwrap()
    }

    #[test]
    fn new_builder_does_not_leak_into_snapshot() {
        let original = base();
        let mut builder = original.new_builder();
        builder.set_header(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        builder.append_header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("text/plain"),
        );

        let mutated = builder.build().unwrap();
        assert!(original.headers().get(AUTHORIZATION).is_none());
        assert_eq!(original.header_values("accept"), vec!["application/json"]);
        assert_eq!(
            mutated.header_values("ACCEPT"),
            vec!["application/json", "text/plain"]
        );
    }

    #[test]
    fn set_header_replaces_all_values() {
        let mut builder = base().new_builder();
        builder.append_header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("text/plain"),
        );
        builder.set_header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("*/*"),
        );
        assert_eq!(builder.build().unwrap().header_values("Accept"), vec!["*/*"]);
    }

    #[test]
    fn build_requires_uri() {
        let err = HttpRequest::builder().build().unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn invalid_header_fails_at_build() {
        let err = HttpRequest::builder()
            .url("http://localhost")
            .header("bad header", "x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("invalid header name"));
    }

    #[test]
    fn payload_helpers_set_method_and_content_type() {
        let req = HttpRequest::builder()
            .url("http://localhost/apis")
            .patch("application/merge-patch+json", r#"{"spec":{}}"#)
            .build()
            .unwrap();
        assert_eq!(req.method(), Method::PATCH);
        assert_eq!(
            req.header_values("content-type"),
            vec!["application/merge-patch+json"]
        );
        assert!(matches!(req.body(), RequestBody::Bytes(b) if b.len() == 11));

        let req = HttpRequest::builder()
            .url("http://localhost/apis")
            .method(Method::POST)
            .json(&serde_json::json!({"kind": "Pod"}))
            .build()
            .unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.header_values("content-type"), vec!["application/json"]);
    }

    #[test]
    fn builder_can_snapshot_repeatedly() {
        let mut builder = base().new_builder();
        let first = builder.build().unwrap();
        builder.set_header(AUTHORIZATION, HeaderValue::from_static("Bearer 1"));
        let second = builder.build().unwrap();
        assert!(first.headers().get(AUTHORIZATION).is_none());
        assert_eq!(second.header_values("authorization"), vec!["Bearer 1"]);
    }
}

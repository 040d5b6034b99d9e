//! Response model.
//!
//! # Responsibilities
//! - `ResponseHead`: status, headers, originating request and the link to the
//!   previous attempt
//! - `HttpResponse<T>`: a head plus a materialized body
//! - `FromBody`: how a raw transport body becomes the body type a caller asked for
//!
//! # Design Decisions
//! - The previous-response chain holds heads only. A retried attempt's body is
//!   dropped when the attempt is replaced, which releases its connection.
//! - The chain is built by moving the replaced head behind an `Arc`, so it can
//!   only ever point at older attempts (no cycles)
//! - Success means 2xx

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::body::decode::Utf8Decoder;
use crate::http::error::{ClientError, TransportError};
use crate::http::request::HttpRequest;
use crate::transport::ByteStream;

/// True for 2xx codes.
pub fn is_successful(code: u16) -> bool {
    (200..300).contains(&code)
}

/// Everything about a response except its body.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
    request: HttpRequest,
    previous: Option<Arc<ResponseHead>>,
    rejection_body: Option<Bytes>,
}

impl ResponseHead {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, request: HttpRequest) -> Self {
        Self {
            status,
            headers,
            request,
            previous: None,
            rejection_body: None,
        }
    }

    pub(crate) fn with_previous(mut self, previous: ResponseHead) -> Self {
        self.previous = Some(Arc::new(previous));
        self
    }

    pub(crate) fn with_rejection_body(mut self, body: Bytes) -> Self {
        self.rejection_body = Some(body);
        self
    }

    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_successful(&self) -> bool {
        is_successful(self.code())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// All values for `name`, in the order the server sent them.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// The request this response answers.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// The attempt this response replaced, if it was produced by a retry.
    pub fn previous_response(&self) -> Option<&ResponseHead> {
        self.previous.as_deref()
    }

    /// Body of a rejected WebSocket upgrade, e.g. a Kubernetes `Status`.
    /// Plain HTTP responses stream their body separately and leave this
    /// empty.
    pub fn rejection_body(&self) -> Option<&Bytes> {
        self.rejection_body.as_ref()
    }

    /// Number of attempts in the chain ending at this response.
    pub fn attempts(&self) -> u32 {
        let mut count = 1;
        let mut current = self.previous_response();
        while let Some(head) = current {
            count += 1;
            current = head.previous_response();
        }
        count
    }
}

/// A response with a materialized body.
pub struct HttpResponse<T> {
    head: ResponseHead,
    body: T,
}

impl<T> HttpResponse<T> {
    pub(crate) fn new(head: ResponseHead, body: T) -> Self {
        Self { head, body }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn code(&self) -> u16 {
        self.head.code()
    }

    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    pub fn is_successful(&self) -> bool {
        self.head.is_successful()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.head.header_values(name)
    }

    pub fn request(&self) -> &HttpRequest {
        self.head.request()
    }

    pub fn previous_response(&self) -> Option<&ResponseHead> {
        self.head.previous_response()
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn into_body(self) -> T {
        self.body
    }

    pub fn into_parts(self) -> (ResponseHead, T) {
        (self.head, self.body)
    }
}

impl<T: fmt::Debug> fmt::Debug for HttpResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.head.status)
            .field("headers", &self.head.headers)
            .field("uri", &self.head.request.uri().as_str())
            .field("body", &self.body)
            .finish()
    }
}

/// Body types `HttpClient::send` can produce.
pub trait FromBody: Sized + Send + 'static {
    fn from_body(body: ByteStream) -> BoxFuture<'static, Result<Self, ClientError>>;
}

/// Discards the body without reading it.
impl FromBody for () {
    fn from_body(_body: ByteStream) -> BoxFuture<'static, Result<Self, ClientError>> {
        Box::pin(async { Ok(()) })
    }
}

impl FromBody for Bytes {
    fn from_body(body: ByteStream) -> BoxFuture<'static, Result<Self, ClientError>> {
        Box::pin(async move { Ok(collect(body).await?) })
    }
}

/// UTF-8, invalid sequences replaced.
impl FromBody for String {
    fn from_body(body: ByteStream) -> BoxFuture<'static, Result<Self, ClientError>> {
        Box::pin(async move {
            let bytes = collect(body).await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
    }
}

/// The raw stream, unread.
impl FromBody for ByteStream {
    fn from_body(body: ByteStream) -> BoxFuture<'static, Result<Self, ClientError>> {
        Box::pin(async move { Ok(body) })
    }
}

/// A body decoded to UTF-8 text chunk by chunk. Multi-byte sequences split
/// across chunks are stitched back together.
pub struct TextStream(BoxStream<'static, Result<String, TransportError>>);

impl TextStream {
    fn new(body: ByteStream) -> Self {
        let stream = futures_util::stream::unfold(
            (body, Utf8Decoder::default(), false),
            |(mut body, mut decoder, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    match body.next().await {
                        Some(Ok(chunk)) => {
                            let text = decoder.decode(&chunk);
                            if !text.is_empty() {
                                return Some((Ok(text), (body, decoder, false)));
                            }
                        }
                        Some(Err(e)) => return Some((Err(e), (body, decoder, true))),
                        None => {
                            let rest = decoder.finish();
                            if rest.is_empty() {
                                return None;
                            }
                            return Some((Ok(rest), (body, decoder, true)));
                        }
                    }
                }
            },
        );
        TextStream(stream.boxed())
    }

    pub fn into_inner(self) -> BoxStream<'static, Result<String, TransportError>> {
        self.0
    }
}

impl futures_util::Stream for TextStream {
    type Item = Result<String, TransportError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.0.poll_next_unpin(cx)
    }
}

impl FromBody for TextStream {
    fn from_body(body: ByteStream) -> BoxFuture<'static, Result<Self, ClientError>> {
        Box::pin(async move { Ok(TextStream::new(body)) })
    }
}

/// A JSON body deserialized into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned + Send + 'static> FromBody for Json<T> {
    fn from_body(body: ByteStream) -> BoxFuture<'static, Result<Self, ClientError>> {
        Box::pin(async move {
            let bytes = collect(body).await?;
            serde_json::from_slice(&bytes)
                .map(Json)
                .map_err(|e| ClientError::Decode(Box::new(e)))
        })
    }
}

async fn collect(mut body: ByteStream) -> Result<Bytes, TransportError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

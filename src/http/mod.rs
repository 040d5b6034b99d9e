//! HTTP request/response subsystem.
//!
//! # Data Flow
//! ```text
//! HttpRequestBuilder (request.rs)
//!     → HttpClient::send / consume_* (client.rs)
//!     → pipeline.rs (before hooks, transport, after-failure passes)
//!     → response.rs (ResponseHead chain + FromBody materialization)
//!     → caller gets HttpResponse<T> or a ClientError (error.rs)
//! ```

pub mod client;
pub mod error;
pub(crate) mod pipeline;
pub mod request;
pub mod response;

pub use client::{HttpClient, HttpClientBuilder, HttpClientFactory, HyperClientFactory};
pub use error::{BodyError, BoxError, ClientError, ClientResult, TransportError, WebSocketHandshakeError};
pub use request::{BasicBuilder, HttpRequest, HttpRequestBuilder, RequestBody, StreamSupplier};
pub use response::{is_successful, FromBody, HttpResponse, Json, ResponseHead, TextStream};

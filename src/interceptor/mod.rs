//! Interceptor subsystem.
//!
//! # Data Flow
//! ```text
//! HttpClient::send / WebSocketBuilder::build_async
//!     → before() for each interceptor, in registration order
//!     → transport
//!     → after_failure() for each interceptor, in the same order, while the
//!       current response is not 2xx; `true` resends the builder
//! ```
//!
//! # Design Decisions
//! - Interceptors see a `BasicBuilder`, so one implementation covers plain
//!   requests and WebSocket upgrades
//! - The registry is an ordered list keyed by name. Re-registering a name
//!   swaps the interceptor in place and keeps its position
//! - A client holds the registry behind an `Arc`; derived clients copy it

pub mod headers;
pub mod request_id;
pub mod token;

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::request::{BasicBuilder, HttpRequest};
use crate::http::response::ResponseHead;

pub use headers::DefaultHeadersInterceptor;
pub use request_id::RequestIdInterceptor;
pub use token::{TokenRefreshInterceptor, TokenSource};

/// A hook into every request a client sends.
///
/// Both methods have no-op defaults.
pub trait Interceptor: Send + Sync {
    /// Mutate the outgoing request. `request` is the snapshot taken after the
    /// previous interceptor ran.
    fn before(&self, builder: &mut dyn BasicBuilder, request: &HttpRequest) {
        let _ = (builder, request);
    }

    /// Called with a non-2xx response, or with the response that refused a
    /// WebSocket upgrade (its body is in `ResponseHead::rejection_body`).
    /// Resolve to `true` to resend whatever `builder` holds once this
    /// returns.
    fn after_failure<'a>(
        &'a self,
        builder: &'a mut dyn BasicBuilder,
        response: &'a ResponseHead,
    ) -> BoxFuture<'a, bool> {
        let _ = (builder, response);
        Box::pin(async { false })
    }
}

/// Ordered, named interceptor registry.
#[derive(Clone, Default)]
pub struct Interceptors {
    entries: Vec<(String, Arc<dyn Interceptor>)>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `interceptor` under `name`. An existing entry with the same
    /// name is replaced in place.
    pub fn add_or_replace(&mut self, name: impl Into<String>, interceptor: Arc<dyn Interceptor>) {
        let name = name.into();
        match self.entries.iter().position(|(existing, _)| *existing == name) {
            Some(index) => {
                tracing::debug!(interceptor = %name, position = index, "Replacing interceptor");
                self.entries[index].1 = interceptor;
            }
            None => self.entries.push((name, interceptor)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Interceptor>)> {
        self.entries.iter().map(|(name, i)| (name.as_str(), i))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

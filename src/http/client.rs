//! The public client handle and its builder.
//!
//! # Responsibilities
//! - Own the engine, the interceptor registry and the default timeouts
//! - Materialize bodies (`send::<T>`) or stream them under backpressure
//!   (`consume_lines`, `consume_bytes`)
//! - Hand out request and WebSocket builders seeded with client defaults
//! - Derive clients that share the engine but not timeouts or interceptors
//!
//! # Design Decisions
//! - Cloning an `HttpClient` clones the handle; `close()` on any clone closes
//!   it. `new_builder().build()` makes an independent handle
//! - Whether closing a handle tears the engine down is up to the
//!   `HttpClientFactory`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::body::publisher::{lines, publish};
use crate::body::subscriber::{AsyncBody, AsyncBodySubscriber};
use crate::config::schema::ClientConfig;
use crate::config::validation::validate_config;
use crate::config::ConfigError;
use crate::http::error::{BoxError, ClientError, ClientResult};
use crate::http::pipeline::{Attempt, Pipeline};
use crate::http::request::{HttpRequest, HttpRequestBuilder};
use crate::http::response::{FromBody, HttpResponse};
use crate::interceptor::{DefaultHeadersInterceptor, Interceptor, Interceptors, RequestIdInterceptor};
use crate::observability::metrics;
use crate::resilience::retries::{RetryInterceptor, RETRY_INTERCEPTOR};
use crate::transport::{tls, HyperTransport, Transport};
use crate::websocket::WebSocketBuilder;

/// Creates engines and decides what closing a client means for them.
pub trait HttpClientFactory: Send + Sync {
    fn create_transport(&self, config: &ClientConfig) -> ClientResult<Arc<dyn Transport>>;

    /// Called once when `client` is closed.
    fn close_http_client(&self, client: &HttpClient) {
        let _ = client;
    }
}

/// Builds a [`HyperTransport`] from the configured timeouts and TLS roots.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperClientFactory;

impl HttpClientFactory for HyperClientFactory {
    fn create_transport(&self, config: &ClientConfig) -> ClientResult<Arc<dyn Transport>> {
        let tls = tls::client_config(&config.tls)?;
        Ok(Arc::new(HyperTransport::new(
            config.timeouts.connect(),
            config.timeouts.pool_idle(),
            tls,
        )))
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    factory: Arc<dyn HttpClientFactory>,
    interceptors: Interceptors,
    config: ClientConfig,
    closed: AtomicBool,
}

/// Async HTTP client with an interceptor pipeline.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Send `request` and read the body as `T`.
    pub async fn send<T: FromBody>(&self, request: &HttpRequest) -> ClientResult<HttpResponse<T>> {
        let Attempt { head, body, .. } = self.execute(request).await?;
        let body = T::from_body(body).await?;
        Ok(HttpResponse::new(head, body))
    }

    /// Send `request` and feed the body to `consumer` line by line. The
    /// consumer gets one line, then the next only after `AsyncBody::consume`.
    pub async fn consume_lines<F>(
        &self,
        request: &HttpRequest,
        consumer: F,
    ) -> ClientResult<HttpResponse<AsyncBody>>
    where
        F: Fn(String, &AsyncBody) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let Attempt { head, body, .. } = self.execute(request).await?;
        let (subscriber, handle) = AsyncBodySubscriber::new(consumer);
        publish(lines(body), subscriber);
        Ok(HttpResponse::new(head, handle))
    }

    /// Like [`consume_lines`](Self::consume_lines), one raw chunk at a time.
    pub async fn consume_bytes<F>(
        &self,
        request: &HttpRequest,
        consumer: F,
    ) -> ClientResult<HttpResponse<AsyncBody>>
    where
        F: Fn(Bytes, &AsyncBody) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let Attempt { head, body, .. } = self.execute(request).await?;
        let (subscriber, handle) = AsyncBodySubscriber::new(consumer);
        publish(body, subscriber);
        Ok(HttpResponse::new(head, handle))
    }

    /// A request builder with the client read timeout already set.
    pub fn new_http_request_builder(&self) -> HttpRequestBuilder {
        let builder = HttpRequest::builder();
        match self.read_timeout() {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    pub fn new_websocket_builder(&self) -> WebSocketBuilder {
        WebSocketBuilder::new(self.clone())
    }

    /// A builder for a new client sharing this client's engine. Timeouts and
    /// interceptors start as copies and can be changed independently; the
    /// engine's connect timeout stays as it is.
    pub fn new_builder(&self) -> HttpClientBuilder {
        HttpClientBuilder {
            transport: Some(self.inner.transport.clone()),
            factory: self.inner.factory.clone(),
            interceptors: self.inner.interceptors.clone(),
            config: self.inner.config.clone(),
        }
    }

    /// Close this handle. Later sends fail with `ClientError::Closed`.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("Closing HTTP client");
        self.inner.factory.close_http_client(self);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.inner.config.timeouts.read()
    }

    pub fn interceptors(&self) -> &Interceptors {
        &self.inner.interceptors
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    pub(crate) fn ensure_open(&self) -> ClientResult<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    async fn execute(&self, request: &HttpRequest) -> ClientResult<Attempt> {
        self.ensure_open()?;
        let pipeline = Pipeline {
            transport: self.transport(),
            interceptors: &self.inner.interceptors,
            read_timeout: self.read_timeout(),
        };
        pipeline.execute(request).await
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("interceptors", &self.inner.interceptors)
            .field("read_timeout", &self.read_timeout())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Configures and builds an [`HttpClient`].
pub struct HttpClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    factory: Arc<dyn HttpClientFactory>,
    interceptors: Interceptors,
    config: ClientConfig,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientBuilder {
    /// Default timeouts, no interceptors, hyper engine.
    pub fn new() -> Self {
        Self {
            transport: None,
            factory: Arc::new(HyperClientFactory),
            interceptors: Interceptors::new(),
            config: ClientConfig::default(),
        }
    }

    /// Timeouts from `config`, plus the interceptors it asks for:
    /// `headers`, then `request-id`, then `retry`.
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        metrics::set_enabled(config.observability.metrics_enabled);

        let mut builder = Self::new();
        builder
            .interceptors
            .add_or_replace("headers", Arc::new(DefaultHeadersInterceptor::from_config(&config.headers)?));
        if config.observability.request_ids {
            builder
                .interceptors
                .add_or_replace("request-id", Arc::new(RequestIdInterceptor::new()));
        }
        if config.retry.enabled {
            builder
                .interceptors
                .add_or_replace(RETRY_INTERCEPTOR, Arc::new(RetryInterceptor::new(&config.retry)));
        }
        builder.config = config;
        Ok(builder)
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.read_ms = millis(timeout);
        self
    }

    /// Only applies when this builder creates the engine.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.connect_ms = millis(timeout);
        self
    }

    pub fn add_or_replace_interceptor<I>(mut self, name: impl Into<String>, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptors.add_or_replace(name, Arc::new(interceptor));
        self
    }

    pub fn factory(mut self, factory: Arc<dyn HttpClientFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use an existing engine instead of asking the factory for one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> ClientResult<HttpClient> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => self.factory.create_transport(&self.config)?,
        };
        tracing::debug!(
            interceptors = ?self.interceptors.names(),
            read_timeout_ms = self.config.timeouts.read_ms,
            "Built HTTP client"
        );
        Ok(HttpClient {
            inner: Arc::new(ClientInner {
                transport,
                factory: self.factory,
                interceptors: self.interceptors,
                config: self.config,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

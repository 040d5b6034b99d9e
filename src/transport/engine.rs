//! Default engine: hyper-util's pooled client for plain requests and
//! tokio-tungstenite for upgrades.
//!
//! Both sides share one rustls config, so `https` requests and `wss`
//! upgrades trust the same roots.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{StreamExt, TryStreamExt};
use http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Error as WsError};
use tokio_tungstenite::Connector;

use crate::http::error::TransportError;
use crate::http::request::{HttpRequest, RequestBody};
use crate::resilience::timeouts::with_timeout;
use crate::transport::{
    HandshakeRejection, Transport, TransportResponse, WebSocketConnect, WebSocketConnection,
    WebSocketOutcome,
};

/// Engine backed by `hyper_util::client::legacy::Client`.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    tls: Arc<rustls::ClientConfig>,
}

impl HyperTransport {
    pub fn new(
        connect_timeout: Option<Duration>,
        pool_idle: Duration,
        tls: Arc<rustls::ClientConfig>,
    ) -> Self {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(connect_timeout);
        http.set_nodelay(true);
        http.enforce_http(false);

        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls.as_ref().clone())
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(pool_idle)
            .build(connector);

        Self { client, tls }
    }

    fn to_hyper(request: &HttpRequest) -> Result<http::Request<Body>, TransportError> {
        let uri: http::Uri = request
            .uri()
            .as_str()
            .parse()
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", request.uri(), e)))?;

        let body = match request.body() {
            RequestBody::Empty => Body::empty(),
            RequestBody::Bytes(bytes) => Body::from(bytes.clone()),
            RequestBody::Stream(supplier) => Body::from_stream(supplier()),
        };

        let mut out = http::Request::new(body);
        *out.method_mut() = request.method().clone();
        *out.uri_mut() = uri;
        *out.headers_mut() = request.headers().clone();
        Ok(out)
    }
}

impl Transport for HyperTransport {
    fn send(
        &self,
        request: &HttpRequest,
        timeout: Option<Duration>,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let client = self.client.clone();
        let converted = Self::to_hyper(request);

        Box::pin(async move {
            let request = converted?;
            let response: http::Response<hyper::body::Incoming> = with_timeout(timeout, async {
                client.request(request).await.map_err(TransportError::from)
            })
            .await?;

            let (parts, incoming) = response.into_parts();
            let body = Body::new(incoming)
                .into_data_stream()
                .map_err(TransportError::body)
                .boxed();

            Ok(TransportResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }

    fn connect_websocket(&self, connect: WebSocketConnect) -> BoxFuture<'static, WebSocketOutcome> {
        let connector = Connector::Rustls(self.tls.clone());
        Box::pin(async move {
            let mut request = match connect.uri.as_str().into_client_request() {
                Ok(request) => request,
                Err(e) => return WebSocketOutcome::Failed(e.into()),
            };
            for (name, value) in connect.headers.iter() {
                request.headers_mut().append(name.clone(), value.clone());
            }
            if let Some(protocol) = &connect.subprotocol {
                match HeaderValue::from_str(protocol) {
                    Ok(value) => {
                        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                    }
                    Err(e) => {
                        return WebSocketOutcome::Failed(TransportError::InvalidRequest(format!(
                            "invalid subprotocol '{}': {}",
                            protocol, e
                        )))
                    }
                }
            }

            let attempt = with_timeout(connect.connect_timeout, async {
                Ok(tokio_tungstenite::connect_async_tls_with_config(request, None, true, Some(connector)).await)
            });
            let result = match attempt.await {
                Ok(result) => result,
                Err(timed_out) => return WebSocketOutcome::Failed(timed_out),
            };

            match result {
                Ok((stream, response)) => {
                    let protocol = response
                        .headers()
                        .get(SEC_WEBSOCKET_PROTOCOL)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    let (sink, stream) = stream.split();
                    WebSocketOutcome::Connected(WebSocketConnection {
                        sink: Box::pin(sink),
                        stream: stream.boxed(),
                        protocol,
                    })
                }
                Err(err) => classify_failure(err),
            }
        })
    }
}

/// A non-101 HTTP answer is a rejection; everything else is a failure.
fn classify_failure(err: tungstenite::Error) -> WebSocketOutcome {
    let rejected = match &err {
        WsError::Http(response) => Some((
            response.status(),
            response.headers().clone(),
            response
                .body()
                .as_deref()
                .map(Bytes::copy_from_slice)
                .unwrap_or_default(),
        )),
        _ => None,
    };

    match rejected {
        Some((status, headers, body)) => WebSocketOutcome::Rejected(HandshakeRejection {
            status,
            headers,
            body,
            cause: TransportError::WebSocket(err),
        }),
        None => WebSocketOutcome::Failed(TransportError::WebSocket(err)),
    }
}

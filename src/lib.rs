//! HTTP and WebSocket transport core for a Kubernetes client.

pub mod body;
pub mod config;
pub mod http;
pub mod interceptor;
pub mod observability;
pub mod resilience;
pub mod transport;
pub mod websocket;

pub use body::AsyncBody;
pub use config::{load_config, ClientConfig};
pub use http::{
    BasicBuilder, ClientError, ClientResult, HttpClient, HttpClientBuilder, HttpClientFactory,
    HttpRequest, HttpRequestBuilder, HttpResponse, ResponseHead, TransportError,
    WebSocketHandshakeError,
};
pub use interceptor::{Interceptor, Interceptors};
pub use transport::Transport;
pub use websocket::{WebSocket, WebSocketBuilder, WebSocketListener};

//! End-to-end WebSocket tests against an axum backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use kube_transport::http::BoxError;
use kube_transport::interceptor::{TokenRefreshInterceptor, TokenSource};
use kube_transport::{ClientError, HttpClient, WebSocket, WebSocketListener};

mod common;

#[derive(Debug, PartialEq)]
enum Event {
    Text(String),
    Binary(usize),
    Close(u16, String),
}

/// Forwards every event to the test and keeps reading.
struct Collector {
    events: mpsc::UnboundedSender<Event>,
}

impl WebSocketListener for Collector {
    fn on_message(&self, socket: &WebSocket, text: String) {
        let _ = self.events.send(Event::Text(text));
        socket.request();
    }

    fn on_binary(&self, socket: &WebSocket, data: Bytes) {
        let _ = self.events.send(Event::Binary(data.len()));
        socket.request();
    }

    fn on_close(&self, _socket: &WebSocket, code: u16, reason: String) {
        let _ = self.events.send(Event::Close(code, reason));
    }
}

fn collector() -> (Collector, mpsc::UnboundedReceiver<Event>) {
    let (events, rx) = mpsc::unbounded_channel();
    (Collector { events }, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("listener dropped")
}

/// Hands out the good token and counts refreshes.
struct CountingSource {
    refreshes: Arc<AtomicU32>,
}

impl TokenSource for CountingSource {
    fn token(&self) -> BoxFuture<'_, Result<String, BoxError>> {
        Box::pin(async move {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok("good".to_string())
        })
    }
}

#[tokio::test]
async fn test_echo_round_trip() {
    let addr = common::start_websocket_backend().await;
    let client = HttpClient::builder().build().unwrap();
    let (listener, mut events) = collector();

    let socket = client
        .new_websocket_builder()
        .url(&format!("http://{}/echo", addr))
        .subprotocol(common::PROTOCOL)
        .build_async(listener)
        .await
        .unwrap();
    assert_eq!(socket.protocol(), Some(common::PROTOCOL));

    assert!(socket.send_text("hello"));
    assert_eq!(next(&mut events).await, Event::Text("hello".into()));

    assert!(socket.send(Bytes::from_static(b"\x01stdout")));
    assert_eq!(next(&mut events).await, Event::Binary(7));

    assert!(socket.send_text("quit"));
    assert_eq!(next(&mut events).await, Event::Close(1000, "done".into()));
}

#[tokio::test]
async fn test_rejected_upgrade_exposes_response() {
    let addr = common::start_websocket_backend().await;
    let client = HttpClient::builder().build().unwrap();
    let (listener, _events) = collector();

    let err = client
        .new_websocket_builder()
        .url(&format!("http://{}/guarded", addr))
        .build_async(listener)
        .await
        .unwrap_err();

    let handshake = match err {
        ClientError::Handshake(handshake) => handshake,
        other => panic!("expected handshake error, got {:?}", other),
    };
    assert_eq!(handshake.response().code(), 401);
    assert_eq!(
        handshake.response().headers().get("www-authenticate").unwrap(),
        "Bearer realm=\"kubernetes\""
    );
    assert_eq!(handshake.response().body().as_ref(), b"token expired");
    assert_eq!(handshake.response().request().uri().scheme(), "http");
}

#[tokio::test]
async fn test_token_refresh_reconnects_upgrade() {
    let addr = common::start_websocket_backend().await;
    let refreshes = Arc::new(AtomicU32::new(0));
    let auth = TokenRefreshInterceptor::new(Arc::new(CountingSource {
        refreshes: refreshes.clone(),
    }))
    .with_token("stale");
    let client = HttpClient::builder()
        .add_or_replace_interceptor("auth", auth)
        .build()
        .unwrap();
    let (listener, mut events) = collector();

    let socket = client
        .new_websocket_builder()
        .url(&format!("http://{}/guarded", addr))
        .build_async(listener)
        .await
        .unwrap();
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    assert!(socket.send_text("after refresh"));
    assert_eq!(next(&mut events).await, Event::Text("after refresh".into()));
}

#[tokio::test]
async fn test_wss_upgrade_starts_tls_handshake() {
    let (addr, first_bytes) = common::start_first_bytes_backend().await;

    let client = HttpClient::builder().build().unwrap();
    let (listener, _events) = collector();
    let err = client
        .new_websocket_builder()
        .url(&format!("https://127.0.0.1:{}/api/v1/namespaces/default/pods/web/exec", addr.port()))
        .connect_timeout(Duration::from_secs(5))
        .build_async(listener)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "{:?}", err);

    let hello = tokio::time::timeout(Duration::from_secs(5), first_bytes)
        .await
        .unwrap()
        .unwrap();
    assert!(common::is_client_hello(&hello), "{:02x?}", hello);
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let client = HttpClient::builder().build().unwrap();
    let (listener, _events) = collector();
    let err = client
        .new_websocket_builder()
        .url(&format!("http://{}/echo", addr))
        .connect_timeout(Duration::from_secs(2))
        .build_async(listener)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "{:?}", err);
}

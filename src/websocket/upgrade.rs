//! WebSocket upgrade coordinator.
//!
//! # Responsibilities
//! - Run the client's interceptors over a private copy of the builder
//! - Rewrite `http`/`https` to `ws`/`wss` for the engine call only
//! - Offer rejected upgrades to `after_failure`, reconnecting on request
//! - Turn the final rejection into a `WebSocketHandshakeError`
//!
//! # Design Decisions
//! - Interceptors see the URI as the caller wrote it, so the same
//!   interceptor works for plain requests and upgrades
//! - A connect that fails below HTTP (refused, timed out) is returned as is,
//!   without consulting interceptors

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::http::error::{ClientError, ClientResult, TransportError, WebSocketHandshakeError};
use crate::http::response::{HttpResponse, ResponseHead};
use crate::observability::metrics;
use crate::resilience::timeouts::effective_timeout;
use crate::transport::{WebSocketConnect, WebSocketConnection, WebSocketOutcome};
use crate::websocket::builder::WebSocketBuilder;
use crate::websocket::socket::{WebSocket, WebSocketListener};

struct Rejected {
    head: ResponseHead,
    body: Bytes,
    cause: TransportError,
}

pub(crate) async fn connect<L>(builder: &WebSocketBuilder, listener: L) -> ClientResult<WebSocket>
where
    L: WebSocketListener,
{
    let client = builder.client();
    client.ensure_open()?;

    let mut copy = builder.clone();
    for (_, interceptor) in client.interceptors().iter() {
        let snapshot = copy.as_request()?;
        interceptor.before(&mut copy, &snapshot);
    }

    let mut rejected = match attempt(&copy, client.read_timeout(), None).await? {
        Ok(connection) => return Ok(WebSocket::open(connection, Arc::new(listener))),
        Err(rejected) => rejected,
    };

    for (name, interceptor) in client.interceptors().iter() {
        if !interceptor.after_failure(&mut copy, &rejected.head).await {
            continue;
        }
        tracing::debug!(
            interceptor = name,
            status = rejected.head.code(),
            "Interceptor requested WebSocket reconnect"
        );
        match attempt(&copy, client.read_timeout(), Some(rejected.head)).await? {
            Ok(connection) => return Ok(WebSocket::open(connection, Arc::new(listener))),
            Err(next) => rejected = next,
        }
    }

    tracing::warn!(
        uri = %rejected.head.request().uri(),
        status = rejected.head.code(),
        attempts = rejected.head.attempts(),
        "WebSocket upgrade rejected"
    );
    let Rejected { head, body, cause } = rejected;
    Err(WebSocketHandshakeError::new(HttpResponse::new(head, body), cause).into())
}

/// One connect. The outer error is a failure below HTTP; the inner one an
/// HTTP response that was not a protocol switch.
async fn attempt(
    builder: &WebSocketBuilder,
    read_timeout: Option<Duration>,
    previous: Option<ResponseHead>,
) -> ClientResult<Result<WebSocketConnection, Rejected>> {
    let request = builder.as_request()?;
    let connect_timeout = effective_timeout(builder.get_connect_timeout(), read_timeout);
    let connect = WebSocketConnect {
        uri: websocket_uri(request.uri())?,
        headers: request.headers().clone(),
        subprotocol: builder.get_subprotocol().map(str::to_owned),
        connect_timeout,
    };
    tracing::debug!(
        uri = %connect.uri,
        subprotocol = ?connect.subprotocol,
        timeout = ?connect_timeout,
        "Connecting WebSocket"
    );

    let outcome = builder.client().transport().connect_websocket(connect).await;
    metrics::record_websocket_connect(outcome.label());
    match outcome {
        WebSocketOutcome::Connected(connection) => Ok(Ok(connection)),
        WebSocketOutcome::Rejected(rejection) => {
            let mut head = ResponseHead::new(rejection.status, rejection.headers, request)
                .with_rejection_body(rejection.body.clone());
            if let Some(previous) = previous {
                head = head.with_previous(previous);
            }
            Ok(Err(Rejected {
                head,
                body: rejection.body,
                cause: rejection.cause,
            }))
        }
        WebSocketOutcome::Failed(e) => {
            metrics::record_transport_error(e.kind());
            tracing::warn!(uri = %request.uri(), error = %e, "WebSocket connect failed");
            Err(ClientError::Transport(e))
        }
    }
}

/// The URI handed to the engine: `http` becomes `ws`, `https` becomes `wss`.
pub(crate) fn websocket_uri(uri: &Url) -> ClientResult<Url> {
    let scheme = match uri.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(uri.clone()),
        other => {
            return Err(ClientError::InvalidRequest(format!(
                "unsupported WebSocket scheme '{}'",
                other
            )))
        }
    };
    let mut rewritten = uri.clone();
    rewritten
        .set_scheme(scheme)
        .map_err(|_| ClientError::InvalidRequest(format!("cannot rewrite scheme of '{}'", uri)))?;
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures_util::future::BoxFuture;
    use http::header::{HeaderName, HeaderValue, AUTHORIZATION};

    use crate::http::client::HttpClient;
    use crate::http::request::{BasicBuilder, HttpRequest};
    use crate::interceptor::Interceptor;
    use crate::transport::mock::{MockTransport, MockUpgrade};

    struct Silent;

    impl WebSocketListener for Silent {}

    /// Adds a bearer token once the server says 401.
    struct Reauth {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Reauth {
        fn before(&self, _builder: &mut dyn BasicBuilder, request: &HttpRequest) {
            self.seen.lock().unwrap().push(request.uri().scheme().to_string());
        }

        fn after_failure<'a>(
            &'a self,
            builder: &'a mut dyn BasicBuilder,
            response: &'a ResponseHead,
        ) -> BoxFuture<'a, bool> {
            Box::pin(async move {
                if response.code() != 401 {
                    return false;
                }
                builder.set_header(AUTHORIZATION, HeaderValue::from_static("Bearer fresh"));
                true
            })
        }
    }

    fn client(transport: &Arc<MockTransport>, seen: Option<&Arc<Mutex<Vec<String>>>>) -> HttpClient {
        let mut builder = HttpClient::builder()
            .transport(transport.clone())
            .read_timeout(Duration::from_secs(7));
        if let Some(seen) = seen {
            builder = builder.add_or_replace_interceptor("auth", Reauth { seen: seen.clone() });
        }
        builder.build().unwrap()
    }

    #[test]
    fn scheme_is_rewritten() {
        let rewrite = |s: &str| websocket_uri(&Url::parse(s).unwrap()).unwrap().to_string();
        assert_eq!(rewrite("http://localhost:8080/a?b=c"), "ws://localhost:8080/a?b=c");
        assert_eq!(rewrite("https://cluster.local/exec"), "wss://cluster.local/exec");
        assert_eq!(rewrite("wss://cluster.local/exec"), "wss://cluster.local/exec");
        assert!(websocket_uri(&Url::parse("ftp://host/").unwrap()).is_err());
    }

    #[tokio::test]
    async fn interceptors_see_original_scheme_and_engine_gets_ws() {
        let transport = Arc::new(MockTransport::default());
        transport.upgrade(MockUpgrade::Accept {
            protocol: Some("v4.channel.k8s.io".into()),
            inbound: Vec::new(),
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let socket = client(&transport, Some(&seen))
            .new_websocket_builder()
            .url("https://cluster.local/api/v1/namespaces/default/pods/web/attach")
            .subprotocol("v4.channel.k8s.io")
            .build_async(Silent)
            .await
            .unwrap();

        assert_eq!(socket.protocol(), Some("v4.channel.k8s.io"));
        assert_eq!(*seen.lock().unwrap(), vec!["https"]);
        let connects = transport.connects();
        assert_eq!(connects.len(), 1);
        assert_eq!(connects[0].uri.scheme(), "wss");
        assert_eq!(connects[0].subprotocol.as_deref(), Some("v4.channel.k8s.io"));
        assert_eq!(connects[0].connect_timeout, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn rejection_without_interceptors_is_handshake_error() {
        let transport = Arc::new(MockTransport::default());
        transport.upgrade(MockUpgrade::Reject {
            status: 403,
            headers: vec![("content-type", "application/json"), ("audit-id", "7f3c")],
            body: "forbidden",
        });
        let err = client(&transport, None)
            .new_websocket_builder()
            .url("http://localhost/ws")
            .build_async(Silent)
            .await
            .unwrap_err();

        match err {
            ClientError::Handshake(handshake) => {
                assert_eq!(handshake.response().code(), 403);
                assert_eq!(handshake.response().headers().len(), 2);
                assert_eq!(handshake.response().headers()["content-type"], "application/json");
                assert_eq!(handshake.response().headers()["audit-id"], "7f3c");
                assert_eq!(handshake.response().body().as_ref(), b"forbidden");
                assert_eq!(handshake.response().request().uri().scheme(), "http");
            }
            other => panic!("expected handshake error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unauthorized_upgrade_reconnects_with_fresh_credentials() {
        let transport = Arc::new(MockTransport::default());
        transport
            .upgrade(MockUpgrade::Reject {
                status: 401,
                headers: Vec::new(),
                body: "",
            })
            .upgrade(MockUpgrade::Accept {
                protocol: None,
                inbound: Vec::new(),
            });
        let seen = Arc::new(Mutex::new(Vec::new()));
        client(&transport, Some(&seen))
            .new_websocket_builder()
            .url("http://localhost/ws")
            .header("x-trace", "1")
            .build_async(Silent)
            .await
            .unwrap();

        let connects = transport.connects();
        assert_eq!(connects.len(), 2);
        assert!(connects[0].headers.get(AUTHORIZATION).is_none());
        assert_eq!(connects[1].headers.get(AUTHORIZATION).unwrap(), "Bearer fresh");
        assert_eq!(
            connects[1].headers.get(HeaderName::from_static("x-trace")).unwrap(),
            "1"
        );
    }

    #[tokio::test]
    async fn second_rejection_links_previous() {
        let transport = Arc::new(MockTransport::default());
        transport
            .upgrade(MockUpgrade::Reject {
                status: 401,
                headers: Vec::new(),
                body: "",
            })
            .upgrade(MockUpgrade::Reject {
                status: 401,
                headers: Vec::new(),
                body: "still no",
            });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let err = client(&transport, Some(&seen))
            .new_websocket_builder()
            .url("http://localhost/ws")
            .build_async(Silent)
            .await
            .unwrap_err();

        let handshake = match err {
            ClientError::Handshake(handshake) => handshake,
            other => panic!("expected handshake error, got {:?}", other),
        };
        assert_eq!(handshake.response().head().attempts(), 2);
        assert_eq!(handshake.response().body().as_ref(), b"still no");
        assert_eq!(transport.connects().len(), 2);
    }

    /// Records what a rejected upgrade looked like and gives up.
    struct Inspect {
        seen: Arc<Mutex<Option<(u16, Bytes)>>>,
    }

    impl Interceptor for Inspect {
        fn after_failure<'a>(
            &'a self,
            _builder: &'a mut dyn BasicBuilder,
            response: &'a ResponseHead,
        ) -> BoxFuture<'a, bool> {
            let body = response.rejection_body().cloned().unwrap_or_default();
            *self.seen.lock().unwrap() = Some((response.code(), body));
            Box::pin(async { false })
        }
    }

    #[tokio::test]
    async fn interceptor_sees_rejection_body() {
        let transport = Arc::new(MockTransport::default());
        transport.upgrade(MockUpgrade::Reject {
            status: 403,
            headers: vec![("content-type", "application/json")],
            body: r#"{"kind":"Status","reason":"Forbidden"}"#,
        });
        let seen = Arc::new(Mutex::new(None));
        let client = HttpClient::builder()
            .transport(transport.clone())
            .add_or_replace_interceptor("inspect", Inspect { seen: seen.clone() })
            .build()
            .unwrap();
        let err = client
            .new_websocket_builder()
            .url("http://localhost/ws")
            .build_async(Silent)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Handshake(_)));
        let (code, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(code, 403);
        assert_eq!(body.as_ref(), br#"{"kind":"Status","reason":"Forbidden"}"#);
        assert_eq!(transport.connects().len(), 1);
    }

    #[tokio::test]
    async fn connect_failure_bypasses_interceptors() {
        let transport = Arc::new(MockTransport::default());
        transport.upgrade(MockUpgrade::Fail);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let err = client(&transport, Some(&seen))
            .new_websocket_builder()
            .url("http://localhost/ws")
            .connect_timeout(Duration::from_secs(1))
            .build_async(Silent)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Transport(TransportError::Io(_))));
        assert_eq!(transport.connects().len(), 1);
        assert_eq!(transport.connects()[0].connect_timeout, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn closed_client_refuses_upgrade() {
        let transport = Arc::new(MockTransport::default());
        let client = client(&transport, None);
        let builder = client.new_websocket_builder().url("http://localhost/ws");
        client.close();
        let err = builder.build_async(Silent).await.unwrap_err();
        assert!(matches!(err, ClientError::Closed));
        assert!(transport.connects().is_empty());
    }
}

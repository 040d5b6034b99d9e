//! Live WebSocket handle and the tasks that pump it.
//!
//! # Responsibilities
//! - Writer task: drain the outbound queue into the engine sink
//! - Reader task: deliver inbound frames to the listener, one per unit of
//!   demand
//! - Track bytes queued but not yet written
//!
//! # Design Decisions
//! - The reader starts with one unit of demand; listeners call
//!   `WebSocket::request` for each further frame
//! - Control frames (ping/pong) do not consume demand
//! - Sends never block; they fail once a close has been queued or the writer
//!   is gone
//! - Both tasks exit when the last handle is dropped or `cancel` is called

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::body::demand::{Demand, Subscription};
use crate::http::error::TransportError;
use crate::transport::{MessageSink, MessageStream, WebSocketConnection};

/// Close code sent by `send_close` callers for a normal shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Reported to `on_close` when the stream ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

static SOCKET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a socket, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    pub fn new() -> Self {
        Self(SOCKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// Receives socket events. Handlers run on the reader task, one at a time.
pub trait WebSocketListener: Send + Sync + 'static {
    fn on_open(&self, socket: &WebSocket) {
        let _ = socket;
    }

    fn on_message(&self, socket: &WebSocket, text: String) {
        let _ = text;
        socket.request();
    }

    fn on_binary(&self, socket: &WebSocket, data: Bytes) {
        let _ = data;
        socket.request();
    }

    fn on_close(&self, socket: &WebSocket, code: u16, reason: String) {
        let _ = (socket, code, reason);
    }

    fn on_error(&self, socket: &WebSocket, error: &TransportError) {
        let _ = (socket, error);
    }
}

struct SocketInner {
    id: SocketId,
    outbound: mpsc::UnboundedSender<Message>,
    queued: Arc<AtomicU64>,
    closing: AtomicBool,
    demand: Arc<Demand>,
    abort: Arc<Notify>,
    protocol: Option<String>,
}

impl Drop for SocketInner {
    // last handle gone: stop the reader; the writer drains its queue and exits
    fn drop(&mut self) {
        self.demand.cancel();
    }
}

/// Handle to an open WebSocket. Cheap to clone.
///
/// The reader and writer tasks only hold the socket weakly. Dropping every
/// handle stops both and releases the connection and the listener.
#[derive(Clone)]
pub struct WebSocket {
    inner: Arc<SocketInner>,
}

impl WebSocket {
    /// Start the writer and reader tasks for `connection`.
    pub(crate) fn open(connection: WebSocketConnection, listener: Arc<dyn WebSocketListener>) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicU64::new(0));
        let demand = Arc::new(Demand::new());
        let abort = Arc::new(Notify::new());
        let socket = WebSocket {
            inner: Arc::new(SocketInner {
                id: SocketId::new(),
                outbound,
                queued: queued.clone(),
                closing: AtomicBool::new(false),
                demand: demand.clone(),
                abort: abort.clone(),
                protocol: connection.protocol,
            }),
        };
        tracing::debug!(
            socket_id = %socket.id(),
            protocol = ?socket.protocol(),
            "WebSocket opened"
        );

        let (writer_done, writer_watch) = watch::channel(());
        let writer = Writer {
            id: socket.id(),
            queued,
            abort,
            _done: writer_done,
        };
        tokio::spawn(writer.run(connection.sink, rx));
        listener.on_open(&socket);
        demand.request(1);
        tokio::spawn(read_loop(
            Arc::downgrade(&socket.inner),
            demand,
            connection.stream,
            listener,
            writer_watch,
        ));
        socket
    }

    pub fn id(&self) -> SocketId {
        self.inner.id
    }

    /// Queue a binary frame. Returns false if the socket is closing or gone.
    pub fn send(&self, data: Bytes) -> bool {
        self.enqueue(Message::binary(data))
    }

    /// Queue a text frame. Returns false if the socket is closing or gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.enqueue(Message::text(text.into()))
    }

    /// Queue a close frame. Only the first call sends anything.
    pub fn send_close(&self, code: u16, reason: &str) -> bool {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.push(Message::Close(Some(frame)))
    }

    /// Deliver one more inbound frame to the listener.
    pub fn request(&self) {
        self.inner.demand.request(1);
    }

    /// Bytes queued for sending but not yet written.
    pub fn queue_size(&self) -> u64 {
        self.inner.queued.load(Ordering::Acquire)
    }

    /// Drop the connection without a close handshake. No further listener
    /// callbacks are made and later sends fail.
    pub fn cancel(&self) {
        self.inner.closing.store(true, Ordering::Release);
        self.inner.demand.cancel();
        self.inner.abort.notify_one();
        tracing::debug!(socket_id = %self.id(), "WebSocket cancelled");
    }

    /// Subprotocol chosen by the server.
    pub fn protocol(&self) -> Option<&str> {
        self.inner.protocol.as_deref()
    }

    fn enqueue(&self, message: Message) -> bool {
        if self.inner.closing.load(Ordering::Acquire) {
            return false;
        }
        self.push(message)
    }

    fn push(&self, message: Message) -> bool {
        let len = message.len() as u64;
        self.inner.queued.fetch_add(len, Ordering::AcqRel);
        if self.inner.outbound.send(message).is_err() {
            self.inner.queued.fetch_sub(len, Ordering::AcqRel);
            return false;
        }
        true
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("id", &self.inner.id)
            .field("protocol", &self.inner.protocol)
            .field("queued", &self.queue_size())
            .finish()
    }
}

struct Writer {
    id: SocketId,
    queued: Arc<AtomicU64>,
    abort: Arc<Notify>,
    // dropped on exit, which the reader watches for
    _done: watch::Sender<()>,
}

impl Writer {
    async fn run(self, mut sink: MessageSink, mut rx: mpsc::UnboundedReceiver<Message>) {
        let mut aborted = false;
        loop {
            let message = tokio::select! {
                biased;
                _ = self.abort.notified() => {
                    aborted = true;
                    break;
                }
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let len = message.len() as u64;
            let is_close = matches!(message, Message::Close(_));
            let result = sink.send(message).await;
            self.queued.fetch_sub(len, Ordering::AcqRel);
            if let Err(e) = result {
                tracing::debug!(socket_id = %self.id, error = %e, "WebSocket write failed");
                break;
            }
            if is_close {
                break;
            }
        }

        rx.close();
        while let Ok(message) = rx.try_recv() {
            self.queued.fetch_sub(message.len() as u64, Ordering::AcqRel);
        }
        if !aborted {
            let _ = sink.close().await;
        }
        tracing::trace!(socket_id = %self.id, aborted, "WebSocket writer finished");
    }
}

/// Delivers inbound frames while there is demand. Once the writer is done
/// (close sent, write failed or socket dropped) the reader only spends credit
/// it already holds, so an idle listener does not pin the connection.
async fn read_loop(
    handle: Weak<SocketInner>,
    demand: Arc<Demand>,
    mut stream: MessageStream,
    listener: Arc<dyn WebSocketListener>,
    mut writer_done: watch::Receiver<()>,
) {
    let mut writer_open = true;
    loop {
        let granted = if writer_open {
            tokio::select! {
                granted = demand.acquire() => granted,
                _ = writer_done.changed() => {
                    writer_open = false;
                    demand.try_acquire()
                }
            }
        } else {
            demand.try_acquire()
        };
        if !granted {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = demand.cancelled() => break,
            next = stream.next() => next,
        };
        let socket = match handle.upgrade() {
            Some(inner) => WebSocket { inner },
            None => break,
        };
        match next {
            Some(Ok(Message::Text(text))) => {
                let text: &str = &text;
                listener.on_message(&socket, text.to_owned());
            }
            Some(Ok(Message::Binary(data))) => listener.on_binary(&socket, Bytes::from(data)),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(frame) => {
                        let reason: &str = &frame.reason;
                        (u16::from(frame.code), reason.to_owned())
                    }
                    None => (NORMAL_CLOSURE, String::new()),
                };
                tracing::debug!(socket_id = %socket.id(), code, reason = %reason, "WebSocket closed by peer");
                listener.on_close(&socket, code, reason);
                break;
            }
            Some(Ok(_)) => {
                // control frame, hand the credit back
                demand.request(1);
            }
            Some(Err(e)) => {
                let error = TransportError::WebSocket(e);
                tracing::debug!(socket_id = %socket.id(), error = %error, "WebSocket read failed");
                listener.on_error(&socket, &error);
                break;
            }
            None => {
                listener.on_close(&socket, ABNORMAL_CLOSURE, String::new());
                break;
            }
        }
    }
    demand.cancel();
}

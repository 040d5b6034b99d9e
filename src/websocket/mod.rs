//! WebSocket support.
//!
//! # Data Flow
//! ```text
//! HttpClient::new_websocket_builder()
//!     → WebSocketBuilder (uri, headers, subprotocol, connect timeout)
//!     → build_async(listener)
//!         → interceptors: before() on a copy of the builder
//!         → engine connect with ws/wss URI
//!         → rejected? after_failure() per interceptor, reconnect on true
//!     → WebSocket handle
//!         → writer task: send / send_text / send_close
//!         → reader task: listener callbacks, one frame per request()
//! ```
//!
//! # Design Decisions
//! - Upgrades reuse the request interceptors through `BasicBuilder`
//! - Inbound frames are backpressured with the same credit type as
//!   streamed response bodies
//! - A final rejection is an error that still carries the HTTP response

pub mod builder;
pub mod socket;
mod upgrade;

pub use builder::WebSocketBuilder;
pub use socket::{SocketId, WebSocket, WebSocketListener, ABNORMAL_CLOSURE, NORMAL_CLOSURE};

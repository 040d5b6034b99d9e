//! Streamed response bodies under explicit backpressure.
//!
//! # Data Flow
//! ```text
//! Transport ByteStream
//!     → publisher.rs (optional line splitting, spawned pump)
//!     → demand.rs (one unit of credit per item)
//!     → subscriber.rs (consumer callback, done/cancel bookkeeping)
//!     → AsyncBody handle held by the caller
//! ```
//!
//! # Design Decisions
//! - One item of demand on subscribe, one more per `AsyncBody::consume`
//! - `done()` resolves exactly once: complete, failed or cancelled
//! - Dropping every `AsyncBody` handle cancels the stream

pub mod decode;
pub mod demand;
pub mod publisher;
pub mod subscriber;

pub use demand::{Demand, Subscription};
pub use subscriber::{AsyncBody, AsyncBodySubscriber};

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Non-2xx response
//!     → retries.rs (RetryInterceptor: retryable status? idempotent method?
//!       attempts left? budget left?)
//!     → backoff.rs (delay, or the server's Retry-After)
//!     → builder resent by the pipeline
//!
//! Every transport call:
//!     → timeouts.rs (deadline: per-request override, else client read timeout)
//! ```
//!
//! # Design Decisions
//! - Retrying is interceptor policy; the pipeline itself never loops
//! - Retries only for idempotent requests (GET, HEAD, OPTIONS, TRACE)
//! - A retry budget keeps a struggling API server from being hammered
//! - Transport errors are never retried at this layer

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{RetryBudget, RetryInterceptor};

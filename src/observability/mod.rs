//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline, WebSocket coordinator, retry interceptor produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via the `metrics` facade)
//!
//! Consumers:
//!     → whatever subscriber / recorder the application installs
//! ```
//!
//! # Design Decisions
//! - Library code only emits; installing a subscriber or exporter is the
//!   binary's job (`logging::init`)
//! - `X-Request-ID` (see `interceptor::request_id`) is logged on every attempt
//! - Metrics are cheap (atomic increments) and can be switched off

pub mod logging;
pub mod metrics;

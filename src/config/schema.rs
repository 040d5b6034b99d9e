//! Client settings as read from TOML.
//!
//! Every section is optional; missing keys fall back to the `Default` impls.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for an `HttpClient`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Connect/read timeouts and pooling.
    pub timeouts: TimeoutConfig,

    /// Headers stamped on every request.
    pub headers: HeaderConfig,

    /// Roots trusted for `https` and `wss`.
    pub tls: TlsConfig,

    pub retry: RetryConfig,

    pub observability: ObservabilityConfig,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout in milliseconds. 0 disables it.
    pub connect_ms: u64,

    /// Time to wait for response headers (or a WebSocket upgrade) in
    /// milliseconds. 0 disables it.
    pub read_ms: u64,

    /// How long an idle pooled connection is kept, in seconds.
    pub pool_idle_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Option<Duration> {
        (self.connect_ms > 0).then(|| Duration::from_millis(self.connect_ms))
    }

    pub fn read(&self) -> Option<Duration> {
        (self.read_ms > 0).then(|| Duration::from_millis(self.read_ms))
    }

    pub fn pool_idle(&self) -> Duration {
        Duration::from_secs(self.pool_idle_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            read_ms: 30_000,
            pool_idle_secs: 90,
        }
    }
}

/// Default request headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// `User-Agent` value. Empty disables it.
    pub user_agent: String,

    /// Extra headers added when the request does not already carry them.
    pub default: BTreeMap<String, String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("kube-transport/", env!("CARGO_PKG_VERSION")).to_string(),
            default: BTreeMap::new(),
        }
    }
}

/// Trust settings for `https`/`wss` connections.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM bundle trusted on top of the bundled web roots, usually the
    /// cluster CA.
    pub ca_file: Option<PathBuf>,
}

/// When and how often idempotent requests are resent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,

    /// Maximum number of attempts, counting the first one.
    pub max_attempts: u32,

    /// First backoff step; doubles per attempt.
    pub base_delay_ms: u64,

    /// Cap on a single backoff, `Retry-After` included.
    pub max_delay_ms: u64,

    /// Share of traffic allowed to be retries, 0.0..=1.0.
    pub budget_ratio: f64,

    /// Retries always allowed regardless of the ratio.
    pub min_retries: u64,

    /// Status codes worth retrying.
    pub statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            budget_ratio: 0.1,
            min_retries: 10,
            statuses: vec![429, 502, 503, 504],
        }
    }
}

/// Logging, metrics and request tagging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    /// Record request/retry/WebSocket metrics.
    pub metrics_enabled: bool,

    /// Stamp `X-Request-ID` on outgoing requests.
    pub request_ids: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            request_ids: true,
        }
    }
}

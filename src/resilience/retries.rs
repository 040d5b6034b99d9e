//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed response is worth resending
//! - Wait out the backoff (or the server's `Retry-After`) before voting yes
//! - Enforce a retry budget across the client's lifetime
//!
//! # Design Decisions
//! - Never retry POST/PUT/DELETE/PATCH (non-idempotent)
//! - Attempts are counted from the response chain, so the interceptor keeps
//!   no per-request state
//! - The pipeline gives each interceptor one vote per send; `max_attempts`
//!   above 2 only matters when other interceptors also resend

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use http::{Method, StatusCode};

use crate::config::schema::RetryConfig;
use crate::http::request::{BasicBuilder, HttpRequest};
use crate::http::response::ResponseHead;
use crate::interceptor::Interceptor;
use crate::observability::metrics;
use crate::resilience::backoff::{calculate_backoff, retry_after};

/// Name the retry interceptor is registered under by `HttpClientBuilder::from_config`.
pub const RETRY_INTERCEPTOR: &str = "retry";

/// Whether a request with `method` that ended in `status` may be resent.
pub fn is_retryable(method: &Method, status: StatusCode, statuses: &[u16]) -> bool {
    let idempotent = matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    );
    idempotent && statuses.contains(&status.as_u16())
}

/// Caps retries to a fraction of total requests.
///
/// Allows `max(min_retries, ratio * requests)` retries in total.
#[derive(Debug)]
pub struct RetryBudget {
    ratio: f64,
    min_retries: u64,
    requests: AtomicU64,
    retries: AtomicU64,
}

impl RetryBudget {
    pub fn new(ratio: f64, min_retries: u64) -> Self {
        Self {
            ratio: ratio.max(0.0),
            min_retries,
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn allowance(&self) -> u64 {
        let proportional = (self.requests.load(Ordering::Relaxed) as f64 * self.ratio) as u64;
        proportional.max(self.min_retries)
    }

    /// Reserve one retry. Returns false when the budget is spent.
    pub fn can_retry(&self) -> bool {
        let allowance = self.allowance();
        self.retries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |spent| {
                (spent < allowance).then_some(spent + 1)
            })
            .is_ok()
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}

/// Resends retryable failures after a backoff.
pub struct RetryInterceptor {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    statuses: Vec<u16>,
    budget: Arc<RetryBudget>,
}

impl RetryInterceptor {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            statuses: config.statuses.clone(),
            budget: Arc::new(RetryBudget::new(config.budget_ratio, config.min_retries)),
        }
    }

    pub fn budget(&self) -> Arc<RetryBudget> {
        self.budget.clone()
    }

    fn delay(&self, response: &ResponseHead) -> Duration {
        let max = Duration::from_millis(self.max_delay_ms);
        retry_after(response.headers(), max).unwrap_or_else(|| {
            calculate_backoff(response.attempts(), self.base_delay_ms, self.max_delay_ms)
        })
    }
}

impl Interceptor for RetryInterceptor {
    fn before(&self, _builder: &mut dyn BasicBuilder, _request: &HttpRequest) {
        self.budget.record_request();
    }

    fn after_failure<'a>(
        &'a self,
        _builder: &'a mut dyn BasicBuilder,
        response: &'a ResponseHead,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let request = response.request();
            if !is_retryable(request.method(), response.status(), &self.statuses) {
                return false;
            }
            let attempts = response.attempts();
            if attempts >= self.max_attempts {
                tracing::debug!(uri = %request.uri(), attempt = attempts, "Retry attempts exhausted");
                return false;
            }
            if !self.budget.can_retry() {
                tracing::warn!(uri = %request.uri(), status = response.code(), "Retry budget exhausted");
                return false;
            }

            let delay = self.delay(response);
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                status = response.code(),
                attempt = attempts,
                delay = ?delay,
                "Retrying request"
            );
            metrics::record_retry(RETRY_INTERCEPTOR);
            tokio::time::sleep(delay).await;
            true
        })
    }
}

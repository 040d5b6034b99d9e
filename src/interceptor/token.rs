//! Bearer token refresh.
//!
//! # Responsibilities
//! - Apply the cached bearer token to every request
//! - On `401 Unauthorized`, fetch a fresh token and ask for a resend
//!
//! # Design Decisions
//! - Where tokens come from (kubeconfig exec plugins, OIDC, service account
//!   files) is the `TokenSource`'s business
//! - A failed refresh surfaces the original 401 instead of an error

use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::BoxFuture;
use http::header::{HeaderValue, AUTHORIZATION};
use http::StatusCode;

use crate::http::error::BoxError;
use crate::http::request::{BasicBuilder, HttpRequest};
use crate::http::response::ResponseHead;
use crate::interceptor::Interceptor;

/// Supplies bearer tokens on demand.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> BoxFuture<'_, Result<String, BoxError>>;
}

pub struct TokenRefreshInterceptor {
    source: Arc<dyn TokenSource>,
    current: RwLock<Option<String>>,
}

impl TokenRefreshInterceptor {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
        }
    }

    /// Seed the cache so the first request is already authenticated.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
        self
    }

    fn bearer(token: &str) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl Interceptor for TokenRefreshInterceptor {
    fn before(&self, builder: &mut dyn BasicBuilder, _request: &HttpRequest) {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = current.as_deref().and_then(Self::bearer) {
            builder.set_header(AUTHORIZATION, value);
        }
    }

    fn after_failure<'a>(
        &'a self,
        builder: &'a mut dyn BasicBuilder,
        response: &'a ResponseHead,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if response.status() != StatusCode::UNAUTHORIZED {
                return false;
            }
            let token = match self.source.token().await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(error = %e, uri = %response.request().uri(), "Token refresh failed");
                    return false;
                }
            };
            let Some(value) = Self::bearer(&token) else {
                tracing::warn!("Refreshed token is not a valid header value");
                return false;
            };
            tracing::debug!(uri = %response.request().uri(), "Refreshed bearer token after 401");
            builder.set_header(AUTHORIZATION, value);
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
            true
        })
    }
}

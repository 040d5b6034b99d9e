//! Default header injection.
//!
//! # Responsibilities
//! - Stamp `User-Agent` on every request and upgrade
//! - Add configured default headers (e.g. `Accept`, impersonation headers)
//!
//! # Design Decisions
//! - Never overwrite a header the caller already set
//! - Invalid configured headers are rejected at construction, not per request

use http::header::{HeaderName, HeaderValue, USER_AGENT};

use crate::config::schema::HeaderConfig;
use crate::config::ConfigError;
use crate::http::request::{BasicBuilder, HttpRequest};
use crate::interceptor::Interceptor;

#[derive(Debug, Clone, Default)]
pub struct DefaultHeadersInterceptor {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl DefaultHeadersInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn from_config(config: &HeaderConfig) -> Result<Self, ConfigError> {
        let mut interceptor = Self::new();
        if !config.user_agent.is_empty() {
            let value = HeaderValue::from_str(&config.user_agent).map_err(|e| {
                ConfigError::invalid("headers.user_agent", e.to_string())
            })?;
            interceptor = interceptor.with_header(USER_AGENT, value);
        }
        for (name, value) in &config.default {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConfigError::invalid(format!("headers.default.{}", name), e.to_string()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| ConfigError::invalid(format!("headers.default.{}", name), e.to_string()))?;
            interceptor = interceptor.with_header(header_name, header_value);
        }
        Ok(interceptor)
    }
}

impl Interceptor for DefaultHeadersInterceptor {
    fn before(&self, builder: &mut dyn BasicBuilder, _request: &HttpRequest) {
        for (name, value) in &self.headers {
            if !builder.has_header(name) {
                builder.set_header(name.clone(), value.clone());
            }
        }
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts > 0, delays ordered, ratios sane)
//! - Check that configured headers and log levels are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use http::header::{HeaderName, HeaderValue};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::ClientConfig;

/// One semantic problem with a config value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.base_delay_ms",
            format!("must not exceed retry.max_delay_ms ({})", retry.max_delay_ms),
        ));
    }
    if !retry.budget_ratio.is_finite() || retry.budget_ratio < 0.0 {
        errors.push(ValidationError::new("retry.budget_ratio", "must be a non-negative number"));
    }
    for status in &retry.statuses {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::new(
                "retry.statuses",
                format!("{} is not an HTTP status code", status),
            ));
        }
    }

    if HeaderValue::from_str(&config.headers.user_agent).is_err() {
        errors.push(ValidationError::new("headers.user_agent", "not a valid header value"));
    }
    for (name, value) in &config.headers.default {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("headers.default.{}", name),
                "not a valid header name",
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                format!("headers.default.{}", name),
                "not a valid header value",
            ));
        }
    }

    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not a valid filter", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

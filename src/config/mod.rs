//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → HttpClientBuilder::from_config (timeouts, engine, interceptors)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a client is built from one snapshot
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ClientConfig, HeaderConfig, ObservabilityConfig, RetryConfig, TimeoutConfig, TlsConfig};
pub use validation::ValidationError;

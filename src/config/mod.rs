//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (ALGORITHM, LISTEN_ADDR, BACKENDS)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once by the lifecycle controller at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; backend membership never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    Algorithm, BackendConfig, ListenerConfig, ObservabilityConfig, PoolConfig, ProxyConfig,
    SinkConfig, SinkFormat, SinkKind, TelemetryConfig, TimeoutConfig,
};
pub use loader::{apply_env_overrides, load_config, ConfigError};
pub use validation::{validate_config, ValidationError};

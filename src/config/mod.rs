//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → environment overrides: PORT, URL, WWWPATH, CUSTOM_PAGE_PATH_404,
//!       CUSTOM_PAGE_PATH_401, DBPATH, JWTTOKEN, LOG_LEVEL
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::{
    AuthConfig, CorsConfig, DocumentConfig, LimitsConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, PersistenceConfig, RateLimitConfig, ServerConfig, TemplateConfig,
    TimeoutConfig, UserAccount,
};

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the web server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, public URL).
    pub listener: ListenerConfig,

    /// Connection timeouts.
    pub timeouts: TimeoutConfig,

    /// Request size limits enforced by the parser.
    pub limits: LimitsConfig,

    /// Document root and error pages.
    pub documents: DocumentConfig,

    /// Template engine settings.
    pub templates: TemplateConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Cross-origin resource sharing headers.
    pub cors: CorsConfig,

    /// Token authority settings.
    pub auth: AuthConfig,

    /// Persistence collaborator settings.
    pub persistence: PersistenceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// Port component of the bind address, if it parses.
    pub fn port(&self) -> Option<u16> {
        self.listener
            .bind_address
            .parse::<SocketAddr>()
            .ok()
            .map(|addr| addr.port())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:15000").
    pub bind_address: String,

    /// Externally visible base URL, used by `getPathFor`.
    pub public_url: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:15000".to_string(),
            public_url: "http://localhost:15000/".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Keep-alive window: how long a connection may sit without a new request line.
    pub idle_secs: u64,

    /// Deadline for reading headers and body once a request line arrived.
    pub request_secs: u64,

    /// Deadline for writing one complete response.
    pub write_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            idle_secs: 10,
            request_secs: 30,
            write_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

/// Parser limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest accepted request line or header line, in bytes.
    pub max_line_bytes: usize,

    /// Maximum number of header fields.
    pub max_headers: usize,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 8 * 1024,
            max_headers: 100,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Document root and error page configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Directory holding static files and templates.
    pub root: PathBuf,

    /// Template rendered for 404 responses, relative to the root.
    pub not_found_page: Option<String>,

    /// Template rendered for 401 responses on HTML routes, relative to the root.
    pub unauthorized_page: Option<String>,

    /// Watch the root and invalidate cached templates on change.
    pub watch: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("www"),
            not_found_page: None,
            unauthorized_page: None,
            watch: true,
        }
    }
}

/// Template engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Cache file-backed templates until invalidated.
    pub cache_enabled: bool,

    /// Maximum nesting of command expansions.
    pub max_depth: usize,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            max_depth: 32,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per client per window.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_ms: 60_000,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origin: String,
    pub allowed_methods: String,
    pub allowed_headers: String,
    pub allow_credentials: bool,
    /// Preflight cache lifetime.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origin: "*".to_string(),
            allowed_methods: "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
            allowed_headers: "Content-Type, Authorization".to_string(),
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }
}

/// Token authority configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret mixed into stored credential digests. Generated when empty.
    pub secret: String,

    /// Access token lifetime.
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime.
    pub refresh_token_ttl_secs: u64,

    /// Accounts seeded into the in-memory credential store.
    pub users: Vec<UserAccount>,
}

/// A seeded login.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserAccount {
    pub username: String,
    pub user_id: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 30 * 24 * 60 * 60,
            users: Vec::new(),
        }
    }
}

/// Persistence collaborator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Path of the database file handed to the persistence backend.
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db.db"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

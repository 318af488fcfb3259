//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, depth bounded)
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }
    match url::Url::parse(&config.listener.public_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => errors.push(ValidationError::new(
            "listener.public_url",
            format!("'{}' is not an absolute http(s) URL", config.listener.public_url),
        )),
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.idle_secs", timeouts.idle_secs),
        ("timeouts.request_secs", timeouts.request_secs),
        ("timeouts.write_secs", timeouts.write_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    let limits = &config.limits;
    for (field, value) in [
        ("limits.max_line_bytes", limits.max_line_bytes),
        ("limits.max_headers", limits.max_headers),
        ("limits.max_body_bytes", limits.max_body_bytes),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    if !(1..=256).contains(&config.templates.max_depth) {
        errors.push(ValidationError::new(
            "templates.max_depth",
            "must be between 1 and 256",
        ));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be > 0"));
        }
        if config.rate_limit.window_ms == 0 {
            errors.push(ValidationError::new("rate_limit.window_ms", "must be > 0"));
        }
    }

    if config.auth.access_token_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.access_token_ttl_secs", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.idle_secs = 0;
        config.templates.max_depth = 0;
        config.listener.public_url = "ftp://example.com".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "listener.public_url",
                "timeouts.idle_secs",
                "templates.max_depth"
            ]
        );
    }

    #[test]
    fn test_disabled_rate_limit_skips_checks() {
        let mut config = ServerConfig::default();
        config.rate_limit.enabled = false;
        config.rate_limit.window_ms = 0;
        assert!(validate_config(&config).is_ok());
    }
}

//! Configuration loading from disk and the process environment.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use rand::RngCore;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ServerConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build the effective configuration: defaults, then the optional file,
/// then environment variables.
pub fn load(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;
    ensure_secret(&mut config);

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

impl ServerConfig {
    /// Defaults, overlaid by `path` when given, overlaid by the environment.
    pub fn from_env_and_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        load(path)
    }
}

/// Apply the recognised environment overrides using `lookup` as the source.
pub fn apply_env<F>(config: &mut ServerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("PORT") {
        let port: u16 = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: "PORT",
            value: value.clone(),
        })?;
        config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
            Ok(mut addr) => {
                addr.set_port(port);
                addr.to_string()
            }
            Err(_) => format!("0.0.0.0:{port}"),
        };
    }
    if let Some(value) = lookup("URL") {
        config.listener.public_url = value;
    }
    if let Some(value) = lookup("WWWPATH") {
        config.documents.root = PathBuf::from(value);
    }
    if let Some(value) = lookup("CUSTOM_PAGE_PATH_404") {
        config.documents.not_found_page = Some(value);
    }
    if let Some(value) = lookup("CUSTOM_PAGE_PATH_401") {
        config.documents.unauthorized_page = Some(value);
    }
    if let Some(value) = lookup("DBPATH") {
        config.persistence.database_path = PathBuf::from(value);
    }
    if let Some(value) = lookup("JWTTOKEN") {
        config.auth.secret = value;
    }
    if let Some(value) = lookup("LOG_LEVEL") {
        config.observability.log_level = value;
    }
    Ok(())
}

/// Fill in a random auth secret when none was configured.
pub fn ensure_secret(config: &mut ServerConfig) {
    if !config.auth.secret.is_empty() {
        return;
    }
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    config.auth.secret = bytes.iter().map(|b| format!("{b:02x}")).collect();
    tracing::warn!("No auth secret configured; generated an ephemeral one (sessions will not survive restarts)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        apply_env(
            &mut config,
            env(&[
                ("PORT", "8081"),
                ("URL", "https://example.com/"),
                ("WWWPATH", "/srv/www"),
                ("CUSTOM_PAGE_PATH_404", "errors/404.html"),
                ("DBPATH", "/var/lib/app.db"),
                ("JWTTOKEN", "s3cret"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8081");
        assert_eq!(config.listener.public_url, "https://example.com/");
        assert_eq!(config.documents.root, PathBuf::from("/srv/www"));
        assert_eq!(config.documents.not_found_page.as_deref(), Some("errors/404.html"));
        assert_eq!(config.persistence.database_path, PathBuf::from("/var/lib/app.db"));
        assert_eq!(config.auth.secret, "s3cret");
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut config = ServerConfig::default();
        let err = apply_env(&mut config, env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "PORT", .. }));
    }

    #[test]
    fn test_generated_secret() {
        let mut config = ServerConfig::default();
        ensure_secret(&mut config);
        assert_eq!(config.auth.secret.len(), 64);

        let before = config.auth.secret.clone();
        ensure_secret(&mut config);
        assert_eq!(config.auth.secret, before);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[listener]\nbind_address = \"127.0.0.1:9000\"\n\n[templates]\nmax_depth = 8"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.port(), Some(9000));
        assert_eq!(config.templates.max_depth, 8);
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\nidle_secs = 0").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}

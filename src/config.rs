//! Configuration system for SecureGo.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `SECUREGO_SERVER_HOST` - Server bind address
//! - `SECUREGO_SERVER_PORT` - Server port
//! - `SECUREGO_DATABASE_TYPE` - Store backend (`sqlite` or `postgres`)
//! - `SECUREGO_DATABASE_URL` - Store connection URL (routed by scheme)
//! - `SECUREGO_CONNECT_TIMEOUT_SECS` - Startup connect timeout
//! - `SECUREGO_LICENSE_KEY_LENGTH` - Length of randomly generated license keys
//! - `SECUREGO_SINGLE_ACCOUNT_PER_LICENSE` - Allow at most one account per license
//! - `SECUREGO_CREDENTIAL_SCHEME` - `plaintext` or `sha256`
//! - `SECUREGO_LOGGING_ENABLED` - Enable the tracing subscriber
//! - `SECUREGO_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{SecureGoError, SecureGoResult};

/// Global configuration singleton, used by the server binary only.
static CONFIG: OnceLock<SecureGoConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecureGoConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub license: LicenseConfig,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 42069,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Store type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Connect + ping timeout applied once at startup
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://securego.db".to_string(),
            postgres_url: "postgres://localhost/securego".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// License issuing policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Length of randomly generated license keys
    pub key_length: usize,
    /// When true, a license may be attached to at most one account
    pub single_account_per_license: bool,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_length: 10,
            single_account_per_license: false,
        }
    }
}

/// Credential storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// "plaintext" or "sha256"
    pub scheme: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            scheme: "plaintext".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> SecureGoError {
    SecureGoError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl SecureGoConfig {
    /// Load configuration from file and environment.
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> SecureGoResult<Self> {
        let builder = Config::builder()
            .set_default("server.host", "127.0.0.1")
            .map_err(config_err)?
            .set_default("server.port", 42069)
            .map_err(config_err)?
            .set_default("database.db_type", "sqlite")
            .map_err(config_err)?
            .set_default("database.sqlite_url", "sqlite://securego.db")
            .map_err(config_err)?
            .set_default("database.postgres_url", "postgres://localhost/securego")
            .map_err(config_err)?
            .set_default("database.connect_timeout_secs", 10)
            .map_err(config_err)?
            .set_default("license.key_length", 10)
            .map_err(config_err)?
            .set_default("license.single_account_per_license", false)
            .map_err(config_err)?
            .set_default("credentials.scheme", "plaintext")
            .map_err(config_err)?
            .set_default("logging.enabled", true)
            .map_err(config_err)?
            .set_default("logging.level", "info")
            .map_err(config_err)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("SECUREGO_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option("server.port", env_parsed::<i64>("SECUREGO_SERVER_PORT"))
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("SECUREGO_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.sqlite_url",
                env::var("SECUREGO_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.postgres_url",
                env::var("SECUREGO_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.connect_timeout_secs",
                env_parsed::<i64>("SECUREGO_CONNECT_TIMEOUT_SECS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.key_length",
                env_parsed::<i64>("SECUREGO_LICENSE_KEY_LENGTH"),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.single_account_per_license",
                env_parsed::<bool>("SECUREGO_SINGLE_ACCOUNT_PER_LICENSE"),
            )
            .map_err(config_err)?
            .set_override_option(
                "credentials.scheme",
                env::var("SECUREGO_CREDENTIAL_SCHEME").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("SECUREGO_LOGGING_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("SECUREGO_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| SecureGoError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| SecureGoError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SecureGoResult<()> {
        if self.server.port == 0 {
            return Err(SecureGoError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(SecureGoError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.license.key_length == 0 {
            return Err(SecureGoError::ConfigError(
                "license.key_length must be greater than 0".to_string(),
            ));
        }

        match self.credentials.scheme.as_str() {
            "plaintext" | "sha256" => {}
            other => {
                return Err(SecureGoError::ConfigError(format!(
                    "credentials.scheme must be 'plaintext' or 'sha256', got '{other}'"
                )));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(SecureGoError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> SecureGoResult<&'static SecureGoConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = SecureGoConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is valid.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| SecureGoError::ConfigError("configuration was not initialised".to_string()))
}

//! Runtime settings: built-in defaults, then `config/default.toml`, then
//! `config/{RUN_ENV}.toml`, then `APP__*` environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const DEFAULT_RUN_ENV: &str = "development";
const DEFAULT_DATABASE_URL: &str = "sqlite://labstock.db?mode=rwc";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// How the audit row of a synthesized movement is written relative to the
/// item change that caused it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementAuditMode {
    /// Item change and movement row commit together or not at all
    #[default]
    Atomic,
    /// Item change commits first; a failed movement write is logged and dropped
    BestEffort,
}

/// Every setting the services and the CLI read. Missing keys take the
/// values of [`AppConfig::default`].
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Profile name, normally the RUN_ENV the configuration was loaded for
    pub environment: String,

    /// Default level for the `labstock` target; RUST_LOG overrides it
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,

    /// Create missing tables when the CLI starts
    pub auto_create_schema: bool,

    #[validate(range(min = 1, max = 1000))]
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_connect_timeout_secs: u64,
    pub db_idle_timeout_secs: u64,
    pub db_acquire_timeout_secs: u64,

    /// Page size used when a listing request does not name one
    #[validate(range(min = 1, max = 1000))]
    pub api_default_page_size: u32,

    /// Upper bound every listing page size is clamped to
    #[validate(range(min = 1, max = 1000))]
    pub api_max_page_size: u32,

    /// Look-ahead window for the expiring-items listing
    #[validate(range(min = 1, max = 3650))]
    pub expiring_default_days: u32,

    pub movement_audit_mode: MovementAuditMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            environment: DEFAULT_RUN_ENV.to_string(),
            log_level: "info".to_string(),
            log_json: false,
            auto_create_schema: true,
            db_max_connections: 10,
            db_min_connections: 1,
            db_connect_timeout_secs: 30,
            db_idle_timeout_secs: 600,
            db_acquire_timeout_secs: 8,
            api_default_page_size: 20,
            api_max_page_size: 100,
            expiring_default_days: 30,
            movement_audit_mode: MovementAuditMode::Atomic,
        }
    }
}

impl AppConfig {
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            ..Self::default()
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == DEFAULT_RUN_ENV
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Rules spanning more than one field.
    fn check_cross_field(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.api_default_page_size > self.api_max_page_size {
            errors.add(
                "api_default_page_size",
                invalid("page_size_order", "must not exceed api_max_page_size"),
            );
        }
        if self.db_min_connections > self.db_max_connections {
            errors.add(
                "db_min_connections",
                invalid("pool_size_order", "must not exceed db_max_connections"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("cannot read configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(invalid("log_level", "expected trace, debug, info, warn or error"))
    }
}

/// Installs the global subscriber. `RUST_LOG`, when set, replaces the
/// `labstock={level}` default filter. Calling it twice is harmless.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let directive = env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| format!("labstock={},sea_orm=warn", level));

    let builder = fmt().with_env_filter(EnvFilter::new(directive));
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Loads the configuration for the profile named by `RUN_ENV` (or `APP_ENV`)
/// from `./config`.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_RUN_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same layering as [`load_config`] with an explicit directory and profile.
/// Both files are optional.
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    if !dir.is_dir() {
        info!(dir = %dir.display(), "no config directory, using defaults and environment");
    }

    let layered = Config::builder()
        .set_default("environment", run_env)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let cfg: AppConfig = layered.try_deserialize()?;
    if let Err(errors) = cfg.validate().and_then(|_| cfg.check_cross_field()) {
        error!(%errors, "configuration rejected");
        return Err(errors.into());
    }

    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn missing_directory_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_from(&dir.path().join("absent"), "development").unwrap();

        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.api_default_page_size, 20);
        assert_eq!(cfg.api_max_page_size, 100);
        assert_eq!(cfg.expiring_default_days, 30);
        assert_eq!(cfg.movement_audit_mode, MovementAuditMode::Atomic);
        assert!(cfg.is_development());
    }

    #[test]
    fn profile_file_overrides_default_file() {
        let dir = config_dir(&[
            (
                "default.toml",
                "database_url = \"sqlite::memory:\"\napi_max_page_size = 50\n",
            ),
            (
                "staging.toml",
                "api_max_page_size = 75\nmovement_audit_mode = \"best_effort\"\n",
            ),
        ]);

        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.api_max_page_size, 75);
        assert_eq!(cfg.environment, "staging");
        assert_eq!(cfg.movement_audit_mode, MovementAuditMode::BestEffort);
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let dir = config_dir(&[("default.toml", "log_level = \"chatty\"\n")]);
        let result = load_config_from(dir.path(), "development");
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }

    #[test]
    fn default_page_size_above_max_is_rejected() {
        let dir = config_dir(&[(
            "default.toml",
            "api_default_page_size = 200\napi_max_page_size = 100\n",
        )]);
        let result = load_config_from(dir.path(), "development");
        match result {
            Err(AppConfigError::Validation(errors)) => {
                assert!(errors.errors().contains_key("api_default_page_size"));
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = config_dir(&[("default.toml", "redis_url = \"redis://localhost\"\n")]);
        assert!(load_config_from(dir.path(), "development").is_err());
    }
}

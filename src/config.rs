/// Configuration loading.
///
/// Mirrors `original_source/internal/config/config.go`: YAML on disk,
/// defaults filled in where the file omits a field, `DB_DSN` resolved from
/// the environment and required.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_algorithm() -> String {
    "round_robin".to_string()
}

fn default_health_interval() -> String {
    "3s".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub capacity: i64,
    pub rate_per_sec: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    pub backends: Vec<BackendConfig>,

    pub default_rate_limit: RateLimitConfig,

    #[serde(default = "default_health_interval")]
    pub health_interval: String,

    /// Populated from the `DB_DSN` environment variable, never from YAML.
    #[serde(skip, default)]
    pub db_dsn: String,
}

impl Config {
    /// Load from a YAML file on disk, then resolve `DB_DSN` from the
    /// environment. Configuration errors are fatal at startup, so this
    /// fails fast if the DSN is missing.
    pub fn load(path: &std::path::Path) -> Result<Config, AppError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("reading {}: {e}", path.display())))?;
        let mut cfg: Config = serde_yaml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("parsing {}: {e}", path.display())))?;

        cfg.db_dsn = std::env::var("DB_DSN").unwrap_or_default();
        if cfg.db_dsn.is_empty() {
            return Err(AppError::Config(
                "DB_DSN isn't defined in the environment".to_string(),
            ));
        }
        Ok(cfg)
    }

    pub fn health_interval(&self) -> Result<Duration, AppError> {
        humantime::parse_duration(&self.health_interval)
            .map_err(|e| AppError::Config(format!("invalid health_interval: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_in_defaults_when_omitted() {
        let yaml = r#"
backends:
  - name: a
    url: http://127.0.0.1:9001
default_rate_limit:
  capacity: 10
  rate_per_sec: 1
"#;
        let mut cfg: Config = serde_yaml::from_str(yaml).unwrap();
        cfg.db_dsn = "postgres://x".to_string();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.algorithm, "round_robin");
        assert_eq!(cfg.health_interval, "3s");
        assert_eq!(cfg.health_interval().unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn respects_explicit_values() {
        let yaml = r#"
listen_addr: "127.0.0.1:9000"
algorithm: least_conn
backends: []
default_rate_limit:
  capacity: 5
  rate_per_sec: 2
health_interval: 500ms
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.algorithm, "least_conn");
        assert_eq!(cfg.health_interval().unwrap(), Duration::from_millis(500));
    }
}

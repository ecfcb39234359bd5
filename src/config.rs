use crate::monitoring::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection and alerting settings
    pub monitor: MonitorConfig,

    /// Operational settings
    pub operational: OperationalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Milliseconds between collections
    pub collect_interval_ms: u64,

    /// Bounds that raise alerts when crossed
    pub thresholds: AlertThresholdConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholdConfig {
    pub database: DatabaseThresholds,
    pub cache: CacheThresholds,
    pub api: ApiThresholds,
    pub system: SystemThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseThresholds {
    /// Average query time above which a query shape counts as slow
    pub slow_query_time_ms: f64,

    pub error_rate_percent: f64,

    pub connection_usage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheThresholds {
    pub min_hit_rate_percent: f64,

    /// Reserved, not evaluated
    pub max_error_rate_percent: f64,
}

/// Reserved: carried for configuration compatibility, no rule reads these
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiThresholds {
    pub max_response_time_ms: f64,

    pub max_error_rate_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemThresholds {
    pub max_memory_usage_mb: f64,

    pub max_cpu_usage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationalConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            collect_interval_ms: 30_000,
            thresholds: AlertThresholdConfig::default(),
        }
    }
}

impl Default for DatabaseThresholds {
    fn default() -> Self {
        Self {
            slow_query_time_ms: 1000.0,
            error_rate_percent: 5.0,
            connection_usage_percent: 80.0,
        }
    }
}

impl Default for CacheThresholds {
    fn default() -> Self {
        Self {
            min_hit_rate_percent: 70.0,
            max_error_rate_percent: 2.0,
        }
    }
}

impl Default for ApiThresholds {
    fn default() -> Self {
        Self {
            max_response_time_ms: 2000.0,
            max_error_rate_percent: 1.0,
        }
    }
}

impl Default for SystemThresholds {
    fn default() -> Self {
        Self {
            max_memory_usage_mb: 512.0,
            max_cpu_usage_percent: 80.0,
        }
    }
}

impl Default for OperationalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl Config {
    /// Load configuration from environment variables, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load a TOML config file; fields it omits keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Overlay any `PERFMON_*` / logging environment variables onto this config
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let monitor = &mut self.monitor;
        let thresholds = &mut monitor.thresholds;

        override_from_env("PERFMON_COLLECT_INTERVAL_MS", &mut monitor.collect_interval_ms)?;
        override_from_env(
            "PERFMON_SLOW_QUERY_TIME_MS",
            &mut thresholds.database.slow_query_time_ms,
        )?;
        override_from_env(
            "PERFMON_DB_ERROR_RATE_PERCENT",
            &mut thresholds.database.error_rate_percent,
        )?;
        override_from_env(
            "PERFMON_CONNECTION_USAGE_PERCENT",
            &mut thresholds.database.connection_usage_percent,
        )?;
        override_from_env(
            "PERFMON_CACHE_MIN_HIT_RATE_PERCENT",
            &mut thresholds.cache.min_hit_rate_percent,
        )?;
        override_from_env(
            "PERFMON_CACHE_MAX_ERROR_RATE_PERCENT",
            &mut thresholds.cache.max_error_rate_percent,
        )?;
        override_from_env(
            "PERFMON_API_MAX_RESPONSE_TIME_MS",
            &mut thresholds.api.max_response_time_ms,
        )?;
        override_from_env(
            "PERFMON_API_MAX_ERROR_RATE_PERCENT",
            &mut thresholds.api.max_error_rate_percent,
        )?;
        override_from_env(
            "PERFMON_MAX_MEMORY_USAGE_MB",
            &mut thresholds.system.max_memory_usage_mb,
        )?;
        override_from_env(
            "PERFMON_MAX_CPU_USAGE_PERCENT",
            &mut thresholds.system.max_cpu_usage_percent,
        )?;

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.operational.log_level = level;
        }
        override_from_env("LOG_JSON", &mut self.operational.log_json)?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()?;

        if !LOG_LEVELS.contains(&self.operational.log_level.to_ascii_lowercase().as_str()) {
            return Err(MonitorError::Configuration(format!(
                "Invalid log level: {}. Must be one of {}",
                self.operational.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.collect_interval_ms == 0 {
            return Err(MonitorError::Configuration(
                "Collection interval must be greater than 0".to_string(),
            ));
        }

        let t = &self.thresholds;
        let bounds = [
            ("database.slow_query_time_ms", t.database.slow_query_time_ms, false),
            ("database.error_rate_percent", t.database.error_rate_percent, true),
            // Pool usage is reported unclamped, so its bound may sit above 100
            (
                "database.connection_usage_percent",
                t.database.connection_usage_percent,
                false,
            ),
            ("cache.min_hit_rate_percent", t.cache.min_hit_rate_percent, true),
            ("cache.max_error_rate_percent", t.cache.max_error_rate_percent, true),
            ("api.max_response_time_ms", t.api.max_response_time_ms, false),
            ("api.max_error_rate_percent", t.api.max_error_rate_percent, true),
            ("system.max_memory_usage_mb", t.system.max_memory_usage_mb, false),
            ("system.max_cpu_usage_percent", t.system.max_cpu_usage_percent, false),
        ];

        for (name, value, is_percent) in bounds {
            if !value.is_finite() || value < 0.0 {
                return Err(MonitorError::Configuration(format!(
                    "Threshold {name} must be a non-negative number, got {value}"
                )));
            }
            if is_percent && value > 100.0 {
                return Err(MonitorError::Configuration(format!(
                    "Threshold {name} is a percentage and must not exceed 100, got {value}"
                )));
            }
        }

        Ok(())
    }
}

fn override_from_env<T>(key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = env::var(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| MonitorError::Configuration(format!("Invalid {key}: {e}")))?;
    }
    Ok(())
}

/// Write an annotated `.env` template carrying the default profile
pub fn create_sample_env_file(path: impl AsRef<Path>) -> Result<()> {
    let env_content = r#"# Performance Monitor Configuration

# Collection
PERFMON_COLLECT_INTERVAL_MS=30000

# Database thresholds
PERFMON_SLOW_QUERY_TIME_MS=1000
PERFMON_DB_ERROR_RATE_PERCENT=5
PERFMON_CONNECTION_USAGE_PERCENT=80

# Cache thresholds
PERFMON_CACHE_MIN_HIT_RATE_PERCENT=70
PERFMON_CACHE_MAX_ERROR_RATE_PERCENT=2

# API thresholds (reserved)
PERFMON_API_MAX_RESPONSE_TIME_MS=2000
PERFMON_API_MAX_ERROR_RATE_PERCENT=1

# System thresholds
PERFMON_MAX_MEMORY_USAGE_MB=512
PERFMON_MAX_CPU_USAGE_PERCENT=80

# Logging
LOG_LEVEL=info
LOG_JSON=false
"#;

    std::fs::write(path, env_content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.monitor.collect_interval_ms, 30_000);
        assert_eq!(config.monitor.thresholds.database.slow_query_time_ms, 1000.0);
        assert_eq!(config.monitor.thresholds.database.error_rate_percent, 5.0);
        assert_eq!(config.monitor.thresholds.cache.min_hit_rate_percent, 70.0);
        assert_eq!(config.monitor.thresholds.system.max_memory_usage_mb, 512.0);
        assert_eq!(config.operational.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.monitor.collect_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.thresholds.cache.min_hit_rate_percent = 120.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.thresholds.system.max_cpu_usage_percent = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.thresholds.database.connection_usage_percent = 110.0;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.operational.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        env::set_var("PERFMON_COLLECT_INTERVAL_MS", "5000");
        env::set_var("PERFMON_DB_ERROR_RATE_PERCENT", "2.5");
        env::set_var("LOG_JSON", "true");

        let mut config = Config::default();
        let result = config.apply_env_overrides();

        env::remove_var("PERFMON_COLLECT_INTERVAL_MS");
        env::remove_var("PERFMON_DB_ERROR_RATE_PERCENT");
        env::remove_var("LOG_JSON");

        result.unwrap();
        assert_eq!(config.monitor.collect_interval_ms, 5000);
        assert_eq!(config.monitor.thresholds.database.error_rate_percent, 2.5);
        assert!(config.operational.log_json);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_names_the_variable() {
        env::set_var("PERFMON_MAX_MEMORY_USAGE_MB", "lots");
        let mut config = Config::default();
        let result = config.apply_env_overrides();
        env::remove_var("PERFMON_MAX_MEMORY_USAGE_MB");

        let err = result.unwrap_err().to_string();
        assert!(err.contains("PERFMON_MAX_MEMORY_USAGE_MB"));
    }

    #[test]
    fn test_from_file_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perfmon.toml");
        std::fs::write(
            &path,
            r#"
[monitor]
collect_interval_ms = 1000

[monitor.thresholds.database]
error_rate_percent = 3.0
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.monitor.collect_interval_ms, 1000);
        assert_eq!(config.monitor.thresholds.database.error_rate_percent, 3.0);
        assert_eq!(config.monitor.thresholds.database.slow_query_time_ms, 1000.0);
        assert_eq!(config.operational.log_level, "info");
    }

    #[test]
    fn test_sample_env_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.example");
        create_sample_env_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("PERFMON_COLLECT_INTERVAL_MS=30000"));
        assert!(content.contains("PERFMON_MAX_CPU_USAGE_PERCENT=80"));
    }
}

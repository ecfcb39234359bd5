pub mod aggregator;
pub mod alerts;
pub mod api;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod sources;
pub mod system;
pub mod thresholds;

pub use aggregator::*;
pub use alerts::*;
pub use api::*;
pub use engine::*;
pub use error::{MonitorError, Result};
pub use exporter::*;
pub use sources::*;
pub use system::*;
pub use thresholds::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Point-in-time snapshot of everything the engine tracks.
///
/// The engine owns exactly one of these and replaces it wholesale on every
/// successful collection. Callers only ever receive clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub database: DatabaseMetrics,
    pub cache: CacheMetrics,
    pub api: ApiMetrics,
    pub system: SystemMetrics,
    pub timestamp: DateTime<Utc>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            database: DatabaseMetrics::default(),
            cache: CacheMetrics::default(),
            api: ApiMetrics::default(),
            system: SystemMetrics::default(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetrics {
    pub query_count: u64,
    /// Milliseconds, weighted by per-query call count
    pub average_query_time: f64,
    pub slow_queries: u64,
    /// Percent of executed queries that failed
    pub error_rate: f64,
    /// Percent of the pool in use. Not clamped: inconsistent pool accounting
    /// upstream can push this above 100.
    pub connection_pool_usage: f64,
}

/// Cache effectiveness as reported by the cache layer, passed through as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub eviction_rate: f64,
    pub memory_usage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMetrics {
    pub request_count: u64,
    /// Exponential moving average in milliseconds
    pub average_response_time: f64,
    /// Percent, always within [0, 100]
    pub error_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    /// Resident memory of this process in MB
    pub memory_usage: f64,
    pub cpu_usage: f64,
    /// Seconds since the engine was constructed
    pub uptime: f64,
    pub active_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Database,
    Cache,
    Api,
    System,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Database => "database",
            AlertCategory::Cache => "cache",
            AlertCategory::Api => "api",
            AlertCategory::System => "system",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(MonitorError::Configuration(format!(
                "Unknown alert severity: {other}"
            ))),
        }
    }
}

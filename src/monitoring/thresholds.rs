use super::{AlertCategory, AlertRequest, AlertSeverity, PerformanceMetrics};
use crate::config::AlertThresholdConfig;

/// Compares a fresh snapshot against the configured bounds.
///
/// No hysteresis: every evaluation that finds a bound crossed yields a new
/// alert, even if the previous one already reported it. The `api` bounds and
/// the cache error bound are configuration-only and are not checked here.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    thresholds: AlertThresholdConfig,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: AlertThresholdConfig) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, metrics: &PerformanceMetrics) -> Vec<AlertRequest> {
        let t = &self.thresholds;
        let db = &metrics.database;
        let mut alerts = Vec::new();

        if db.average_query_time > t.database.slow_query_time_ms {
            alerts.push(AlertRequest {
                severity: AlertSeverity::Warning,
                category: AlertCategory::Database,
                message: format!(
                    "Slow average query time: {:.1}ms (threshold: {:.1}ms)",
                    db.average_query_time, t.database.slow_query_time_ms
                ),
                metric: "averageQueryTime",
                value: db.average_query_time,
                threshold: t.database.slow_query_time_ms,
            });
        }

        if db.error_rate > t.database.error_rate_percent {
            alerts.push(AlertRequest {
                severity: AlertSeverity::Critical,
                category: AlertCategory::Database,
                message: format!(
                    "High database error rate: {:.2}% (threshold: {:.2}%)",
                    db.error_rate, t.database.error_rate_percent
                ),
                metric: "errorRate",
                value: db.error_rate,
                threshold: t.database.error_rate_percent,
            });
        }

        if db.connection_pool_usage > t.database.connection_usage_percent {
            alerts.push(AlertRequest {
                severity: AlertSeverity::Warning,
                category: AlertCategory::Database,
                message: format!(
                    "Connection pool usage: {:.1}% (threshold: {:.1}%)",
                    db.connection_pool_usage, t.database.connection_usage_percent
                ),
                metric: "connectionPoolUsage",
                value: db.connection_pool_usage,
                threshold: t.database.connection_usage_percent,
            });
        }

        // A hit rate of exactly 0 means the cache has not reported yet
        let hit_rate = metrics.cache.hit_rate;
        if hit_rate > 0.0 && hit_rate < t.cache.min_hit_rate_percent {
            alerts.push(AlertRequest {
                severity: AlertSeverity::Warning,
                category: AlertCategory::Cache,
                message: format!(
                    "Low cache hit rate: {:.1}% (minimum: {:.1}%)",
                    hit_rate, t.cache.min_hit_rate_percent
                ),
                metric: "hitRate",
                value: hit_rate,
                threshold: t.cache.min_hit_rate_percent,
            });
        }

        let system = &metrics.system;
        if system.memory_usage > t.system.max_memory_usage_mb {
            alerts.push(AlertRequest {
                severity: AlertSeverity::Critical,
                category: AlertCategory::System,
                message: format!(
                    "High memory usage: {:.1}MB (threshold: {:.1}MB)",
                    system.memory_usage, t.system.max_memory_usage_mb
                ),
                metric: "memoryUsage",
                value: system.memory_usage,
                threshold: t.system.max_memory_usage_mb,
            });
        }

        if system.cpu_usage > t.system.max_cpu_usage_percent {
            alerts.push(AlertRequest {
                severity: AlertSeverity::Warning,
                category: AlertCategory::System,
                message: format!(
                    "High CPU usage: {:.1}% (threshold: {:.1}%)",
                    system.cpu_usage, t.system.max_cpu_usage_percent
                ),
                metric: "cpuUsage",
                value: system.cpu_usage,
                threshold: t.system.max_cpu_usage_percent,
            });
        }

        alerts
    }
}

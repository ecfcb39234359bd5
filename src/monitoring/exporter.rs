use super::{MonitorError, PerformanceMetrics, Result};
use prometheus::core::Collector;
use prometheus::{Counter, Gauge, IntCounter, Opts, Registry, TextEncoder};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

/// Exported metric names in output order
pub const EXPORTED_METRICS: [&str; 12] = [
    "database_query_count",
    "database_average_query_time",
    "database_slow_queries",
    "database_error_rate",
    "database_connection_pool_usage",
    "cache_hit_rate",
    "cache_miss_rate",
    "api_average_response_time",
    "api_error_rate",
    "system_memory_usage",
    "system_cpu_usage",
    "system_uptime_seconds",
];

/// Renders snapshots in the Prometheus text exposition format.
///
/// Collectors only hold values while a render is in progress, so they are
/// never exposed for gathering. A registry would also emit families
/// alphabetically; rendering collects each metric in [`EXPORTED_METRICS`]
/// order instead.
pub struct MetricsExporter {
    render_lock: Mutex<()>,

    database_query_count: IntCounter,
    database_average_query_time: Gauge,
    database_slow_queries: IntCounter,
    database_error_rate: Gauge,
    database_connection_pool_usage: Gauge,
    cache_hit_rate: Gauge,
    cache_miss_rate: Gauge,
    api_average_response_time: Gauge,
    api_error_rate: Gauge,
    system_memory_usage: Gauge,
    system_cpu_usage: Gauge,
    system_uptime_seconds: Counter,
}

impl MetricsExporter {
    pub fn new() -> Result<Self> {
        // Only used to reject duplicate metric names up front
        let registry = Registry::new();

        let database_query_count = IntCounter::with_opts(Opts::new(
            "database_query_count",
            "Total number of database queries",
        ))?;
        registry.register(Box::new(database_query_count.clone()))?;

        let database_average_query_time = Gauge::with_opts(Opts::new(
            "database_average_query_time",
            "Average database query time in milliseconds",
        ))?;
        registry.register(Box::new(database_average_query_time.clone()))?;

        let database_slow_queries = IntCounter::with_opts(Opts::new(
            "database_slow_queries",
            "Number of executions of slow query shapes",
        ))?;
        registry.register(Box::new(database_slow_queries.clone()))?;

        let database_error_rate = Gauge::with_opts(Opts::new(
            "database_error_rate",
            "Database query error rate percentage",
        ))?;
        registry.register(Box::new(database_error_rate.clone()))?;

        let database_connection_pool_usage = Gauge::with_opts(Opts::new(
            "database_connection_pool_usage",
            "Database connection pool usage percentage",
        ))?;
        registry.register(Box::new(database_connection_pool_usage.clone()))?;

        let cache_hit_rate = Gauge::with_opts(Opts::new(
            "cache_hit_rate",
            "Cache hit rate percentage",
        ))?;
        registry.register(Box::new(cache_hit_rate.clone()))?;

        let cache_miss_rate = Gauge::with_opts(Opts::new(
            "cache_miss_rate",
            "Cache miss rate percentage",
        ))?;
        registry.register(Box::new(cache_miss_rate.clone()))?;

        let api_average_response_time = Gauge::with_opts(Opts::new(
            "api_average_response_time",
            "Moving average API response time in milliseconds",
        ))?;
        registry.register(Box::new(api_average_response_time.clone()))?;

        let api_error_rate = Gauge::with_opts(Opts::new(
            "api_error_rate",
            "API error rate percentage",
        ))?;
        registry.register(Box::new(api_error_rate.clone()))?;

        let system_memory_usage = Gauge::with_opts(Opts::new(
            "system_memory_usage",
            "Process memory usage in megabytes",
        ))?;
        registry.register(Box::new(system_memory_usage.clone()))?;

        let system_cpu_usage = Gauge::with_opts(Opts::new(
            "system_cpu_usage",
            "Process CPU usage percentage",
        ))?;
        registry.register(Box::new(system_cpu_usage.clone()))?;

        let system_uptime_seconds = Counter::with_opts(Opts::new(
            "system_uptime_seconds",
            "Monitor uptime in seconds",
        ))?;
        registry.register(Box::new(system_uptime_seconds.clone()))?;

        info!("Initialized metrics exporter");

        Ok(Self {
            render_lock: Mutex::new(()),
            database_query_count,
            database_average_query_time,
            database_slow_queries,
            database_error_rate,
            database_connection_pool_usage,
            cache_hit_rate,
            cache_miss_rate,
            api_average_response_time,
            api_error_rate,
            system_memory_usage,
            system_cpu_usage,
            system_uptime_seconds,
        })
    }

    /// Render `metrics` as trimmed exposition text
    pub fn render(&self, metrics: &PerformanceMetrics) -> Result<String> {
        let _guard = self.render_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load(metrics);

        let collectors: [&dyn Collector; 12] = [
            &self.database_query_count,
            &self.database_average_query_time,
            &self.database_slow_queries,
            &self.database_error_rate,
            &self.database_connection_pool_usage,
            &self.cache_hit_rate,
            &self.cache_miss_rate,
            &self.api_average_response_time,
            &self.api_error_rate,
            &self.system_memory_usage,
            &self.system_cpu_usage,
            &self.system_uptime_seconds,
        ];
        let families: Vec<_> = collectors.iter().flat_map(|c| c.collect()).collect();

        let text = TextEncoder::new()
            .encode_to_string(&families)
            .map_err(|e| {
                error!("Failed to encode metrics: {}", e);
                MonitorError::Metrics(e)
            })?;

        Ok(text.trim().to_string())
    }

    fn load(&self, metrics: &PerformanceMetrics) {
        let db = &metrics.database;
        set_int_counter(&self.database_query_count, db.query_count);
        self.database_average_query_time.set(db.average_query_time);
        set_int_counter(&self.database_slow_queries, db.slow_queries);
        self.database_error_rate.set(db.error_rate);
        self.database_connection_pool_usage.set(db.connection_pool_usage);

        self.cache_hit_rate.set(metrics.cache.hit_rate);
        self.cache_miss_rate.set(metrics.cache.miss_rate);

        self.api_average_response_time
            .set(metrics.api.average_response_time);
        self.api_error_rate.set(metrics.api.error_rate);

        self.system_memory_usage.set(metrics.system.memory_usage);
        self.system_cpu_usage.set(metrics.system.cpu_usage);
        self.system_uptime_seconds.reset();
        self.system_uptime_seconds.inc_by(metrics.system.uptime.max(0.0));
    }
}

// Counters here mirror totals owned upstream, so they are overwritten rather
// than incremented
fn set_int_counter(counter: &IntCounter, value: u64) {
    counter.reset();
    counter.inc_by(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metrics() -> PerformanceMetrics {
        let mut metrics = PerformanceMetrics::default();
        metrics.database.query_count = 15;
        metrics.database.slow_queries = 10;
        metrics.database.error_rate = 6.5;
        metrics.cache.hit_rate = 88.0;
        metrics.api.average_response_time = 100.0;
        metrics.system.uptime = 42.0;
        metrics
    }

    fn value_of(text: &str, name: &str) -> f64 {
        text.lines()
            .find_map(|line| {
                line.strip_prefix(name)
                    .and_then(|rest| rest.strip_prefix(' '))
                    .map(|value| value.trim().parse::<f64>().unwrap())
            })
            .unwrap()
    }

    #[test]
    fn test_export_lists_metrics_in_fixed_order() {
        let exporter = MetricsExporter::new().unwrap();
        let text = exporter.render(&sample_metrics()).unwrap();

        let value_lines: Vec<&str> = text
            .lines()
            .filter(|line| !line.starts_with('#'))
            .map(|line| line.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(value_lines, EXPORTED_METRICS.to_vec());

        for name in EXPORTED_METRICS {
            assert_eq!(text.matches(&format!("# HELP {name} ")).count(), 1);
            assert_eq!(text.matches(&format!("# TYPE {name} ")).count(), 1);
        }
    }

    #[test]
    fn test_export_types_and_values() {
        let exporter = MetricsExporter::new().unwrap();
        let text = exporter.render(&sample_metrics()).unwrap();

        assert!(text.contains("# TYPE database_query_count counter"));
        assert!(text.contains("# TYPE database_slow_queries counter"));
        assert!(text.contains("# TYPE system_uptime_seconds counter"));
        assert!(text.contains("# TYPE cache_hit_rate gauge"));

        assert_eq!(value_of(&text, "database_query_count"), 15.0);
        assert_eq!(value_of(&text, "database_error_rate"), 6.5);
        assert_eq!(value_of(&text, "api_average_response_time"), 100.0);
        assert_eq!(value_of(&text, "system_uptime_seconds"), 42.0);
    }

    #[test]
    fn test_export_is_trimmed_and_reflects_latest_snapshot() {
        let exporter = MetricsExporter::new().unwrap();
        exporter.render(&sample_metrics()).unwrap();

        let mut smaller = sample_metrics();
        smaller.database.query_count = 3;
        let text = exporter.render(&smaller).unwrap();

        assert_eq!(value_of(&text, "database_query_count"), 3.0);
        assert!(text.starts_with("# HELP database_query_count"));
        assert_eq!(text, text.trim());
    }
}

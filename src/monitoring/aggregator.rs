use super::{
    ApiMetrics, CacheMetrics, CacheStatsSource, DatabaseMetrics, DatabaseStatsSource,
    PerformanceMetrics, PoolMetrics, QueryStats, Result, SystemMetrics, SystemSampler,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Everything one collection gathers. API stats are fed by request handlers
/// between collections, so they are merged in only when the snapshot is swapped.
#[derive(Debug, Clone)]
pub struct Collection {
    pub database: DatabaseMetrics,
    pub cache: CacheMetrics,
    pub system: SystemMetrics,
    pub timestamp: DateTime<Utc>,
}

impl Collection {
    pub fn into_snapshot(self, api: ApiMetrics) -> PerformanceMetrics {
        PerformanceMetrics {
            database: self.database,
            cache: self.cache,
            api,
            system: self.system,
            timestamp: self.timestamp,
        }
    }
}

/// Pulls counters from every collaborator and reduces them to one collection
pub struct Aggregator {
    database: Arc<dyn DatabaseStatsSource>,
    cache: Arc<dyn CacheStatsSource>,
    sampler: SystemSampler,
    slow_query_time_ms: f64,
}

impl Aggregator {
    pub fn new(
        database: Arc<dyn DatabaseStatsSource>,
        cache: Arc<dyn CacheStatsSource>,
        slow_query_time_ms: f64,
    ) -> Self {
        Self {
            database,
            cache,
            sampler: SystemSampler::new(),
            slow_query_time_ms,
        }
    }

    /// Run one collection. Blocks the calling task for at least the CPU
    /// sampling window.
    pub async fn collect(&self) -> Result<Collection> {
        let query_stats = self.database.query_stats().await?;
        let pool = self.database.pool_metrics().await?;

        let mut database = aggregate_query_stats(&query_stats, self.slow_query_time_ms);
        database.connection_pool_usage = pool_usage_percent(&pool);

        let cache = self.cache.cache_metrics().await?;

        let memory_usage = self.sampler.memory_usage_mb();
        let cpu_usage = self.sampler.cpu_usage_percent().await;
        let system = SystemMetrics {
            memory_usage,
            cpu_usage,
            uptime: self.sampler.uptime_seconds(),
            active_connections: pool.active_connections,
        };

        debug!(
            "Collected {} queries across {} shapes, pool {:.1}%, cpu {:.1}%, mem {:.1}MB",
            database.query_count,
            query_stats.len(),
            database.connection_pool_usage,
            system.cpu_usage,
            system.memory_usage
        );

        Ok(Collection {
            database,
            cache,
            system,
            timestamp: Utc::now(),
        })
    }
}

/// Reduce per-query statistics to overall database metrics.
///
/// `slow_queries` counts executions of query shapes whose *average* time
/// exceeds the bound, not individual slow calls. Pool usage is left at 0.
pub fn aggregate_query_stats(
    stats: &HashMap<String, QueryStats>,
    slow_query_time_ms: f64,
) -> DatabaseMetrics {
    let mut total_queries: u64 = 0;
    let mut total_time = 0.0;
    let mut total_errors: u64 = 0;
    let mut slow_queries: u64 = 0;

    for query in stats.values() {
        total_queries += query.count;
        total_time += query.average_time * query.count as f64;
        total_errors += query.error_count;

        if query.average_time > slow_query_time_ms {
            slow_queries += query.count;
        }
    }

    let (average_query_time, error_rate) = if total_queries > 0 {
        (
            total_time / total_queries as f64,
            100.0 * total_errors as f64 / total_queries as f64,
        )
    } else {
        (0.0, 0.0)
    };

    DatabaseMetrics {
        query_count: total_queries,
        average_query_time,
        slow_queries,
        error_rate,
        connection_pool_usage: 0.0,
    }
}

/// Percent of the pool in use. An empty pool reads as 0 rather than NaN.
pub fn pool_usage_percent(pool: &PoolMetrics) -> f64 {
    if pool.total_connections == 0 {
        return 0.0;
    }
    100.0 * pool.active_connections as f64 / pool.total_connections as f64
}

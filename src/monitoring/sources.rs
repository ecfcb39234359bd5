//! Read-only seams onto the layers the engine reports on.
//!
//! The engine never executes queries or owns the cache; it only asks these
//! collaborators for their current counters once per collection.

use super::{CacheMetrics, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Running statistics for one query shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub count: u64,
    /// Milliseconds
    pub average_time: f64,
    pub error_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
    pub active_connections: u32,
    pub total_connections: u32,
}

#[async_trait]
pub trait DatabaseStatsSource: Send + Sync {
    async fn pool_metrics(&self) -> Result<PoolMetrics>;

    async fn query_stats(&self) -> Result<HashMap<String, QueryStats>>;
}

#[async_trait]
pub trait CacheStatsSource: Send + Sync {
    async fn cache_metrics(&self) -> Result<CacheMetrics>;
}

/// Database collaborator backed by process memory.
///
/// Hosts without their own stats layer can feed this from their query path.
#[derive(Debug, Default)]
pub struct InMemoryDatabaseStats {
    pool: RwLock<PoolMetrics>,
    queries: RwLock<HashMap<String, QueryStats>>,
}

impl InMemoryDatabaseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pool(&self, active_connections: u32, total_connections: u32) {
        let mut pool = self.pool.write().unwrap_or_else(PoisonError::into_inner);
        pool.active_connections = active_connections;
        pool.total_connections = total_connections;
    }

    pub fn set_query_stats(&self, query_id: impl Into<String>, stats: QueryStats) {
        self.queries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query_id.into(), stats);
    }

    /// Fold a single execution into the running stats for `query_id`
    pub fn record_query(&self, query_id: &str, duration_ms: f64, success: bool) {
        let mut queries = self.queries.write().unwrap_or_else(PoisonError::into_inner);
        let stats = queries.entry(query_id.to_string()).or_default();

        let total_time = stats.average_time * stats.count as f64 + duration_ms;
        stats.count += 1;
        stats.average_time = total_time / stats.count as f64;
        if !success {
            stats.error_count += 1;
        }
    }
}

#[async_trait]
impl DatabaseStatsSource for InMemoryDatabaseStats {
    async fn pool_metrics(&self) -> Result<PoolMetrics> {
        Ok(self
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn query_stats(&self) -> Result<HashMap<String, QueryStats>> {
        Ok(self
            .queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCacheStats {
    metrics: RwLock<CacheMetrics>,
}

impl InMemoryCacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, metrics: CacheMetrics) {
        *self.metrics.write().unwrap_or_else(PoisonError::into_inner) = metrics;
    }
}

#[async_trait]
impl CacheStatsSource for InMemoryCacheStats {
    async fn cache_metrics(&self) -> Result<CacheMetrics> {
        Ok(self
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_record_query_keeps_running_average() {
        let stats = InMemoryDatabaseStats::new();
        stats.record_query("select_user", 100.0, true);
        stats.record_query("select_user", 300.0, false);
        stats.record_query("insert_user", 50.0, true);

        let snapshot = tokio_test::block_on(stats.query_stats()).unwrap();
        let select = &snapshot["select_user"];
        assert_eq!(select.count, 2);
        assert_eq!(select.error_count, 1);
        assert_relative_eq!(select.average_time, 200.0);
        assert_eq!(snapshot["insert_user"].count, 1);
    }

    #[test]
    fn test_pool_and_cache_are_returned_as_set() {
        let db = InMemoryDatabaseStats::new();
        db.set_pool(8, 10);
        let pool = tokio_test::block_on(db.pool_metrics()).unwrap();
        assert_eq!(pool.active_connections, 8);
        assert_eq!(pool.total_connections, 10);

        let cache = InMemoryCacheStats::new();
        cache.set(CacheMetrics {
            hit_rate: 92.5,
            miss_rate: 7.5,
            eviction_rate: 1.0,
            memory_usage: 64.0,
        });
        let metrics = tokio_test::block_on(cache.cache_metrics()).unwrap();
        assert_relative_eq!(metrics.hit_rate, 92.5);
    }
}

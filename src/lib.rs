pub mod config;
pub mod monitoring;

pub use config::{AlertThresholdConfig, Config, MonitorConfig};

// Re-export monitoring types
pub use monitoring::{
    AlertCategory, AlertSeverity, CacheMetrics, CacheStatsSource, DatabaseStatsSource,
    InMemoryCacheStats, InMemoryDatabaseStats, MonitorError, PerformanceAlert,
    PerformanceMetrics, PerformanceMonitor, PoolMetrics, QueryStats,
};

//! Performance monitoring engine.
//!
//! A single background task drives collection: every interval it pulls all
//! collaborators into a fresh [`PerformanceMetrics`] snapshot, checks the
//! snapshot against the configured thresholds and records any alerts. Request
//! handlers feed API statistics independently through
//! [`PerformanceMonitor::record_api_request`]. Everything else is a pull-based
//! read of the latest snapshot or alert history.
//!
//! Each collection samples CPU over [`CPU_SAMPLE_WINDOW`](super::CPU_SAMPLE_WINDOW),
//! so it takes at least that long. Readers are never blocked by it: the
//! snapshot lock is only held to swap in the finished result.

use super::{
    Aggregator, AlertSeverity, AlertStore, CacheStatsSource, DatabaseStatsSource,
    MetricsExporter, PerformanceAlert, PerformanceMetrics, Result, ThresholdEvaluator,
    DEFAULT_ALERT_LIMIT,
};
use crate::config::MonitorConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Handle to a running performance monitor. Clones share the same engine.
#[derive(Clone)]
pub struct PerformanceMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    aggregator: Aggregator,
    evaluator: ThresholdEvaluator,
    alerts: AlertStore,
    exporter: MetricsExporter,
    metrics: RwLock<PerformanceMetrics>,
    /// Serializes collections so two never race on the snapshot
    collect_lock: Mutex<()>,
    task: Mutex<Option<CollectorTask>>,
    running: AtomicBool,
    collections: AtomicU64,
}

struct CollectorTask {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .field("collections", &self.collection_count())
            .field("alerts", &self.inner.alerts)
            .finish()
    }
}

impl PerformanceMonitor {
    pub fn new(
        config: MonitorConfig,
        database: Arc<dyn DatabaseStatsSource>,
        cache: Arc<dyn CacheStatsSource>,
    ) -> Result<Self> {
        config.validate()?;

        let aggregator = Aggregator::new(
            database,
            cache,
            config.thresholds.database.slow_query_time_ms,
        );
        let evaluator = ThresholdEvaluator::new(config.thresholds.clone());

        Ok(Self {
            inner: Arc::new(MonitorInner {
                config,
                aggregator,
                evaluator,
                alerts: AlertStore::new(),
                exporter: MetricsExporter::new()?,
                metrics: RwLock::new(PerformanceMetrics::default()),
                collect_lock: Mutex::new(()),
                task: Mutex::new(None),
                running: AtomicBool::new(false),
                collections: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Collect once immediately, then keep collecting every configured
    /// interval. Does nothing if already started.
    pub async fn start(&self) {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            debug!("Performance monitor already running, ignoring start");
            return;
        }

        let period = Duration::from_millis(self.inner.config.collect_interval_ms);
        info!("Starting performance monitor");
        info!("  Collection interval: {}ms", period.as_millis());

        self.inner.clone().run_collection().await;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        inner.run_collection().await;
                    }
                }
            }

            debug!("Performance monitor collection loop exited");
        });

        *task = Some(CollectorTask {
            shutdown_tx,
            handle,
        });
        self.inner.running.store(true, Ordering::SeqCst);
    }

    /// Stop collecting. Once this returns no further collection will start.
    /// Safe to call repeatedly or before [`start`](Self::start).
    pub async fn stop(&self) {
        let Some(task) = self.inner.task.lock().await.take() else {
            return;
        };

        let _ = task.shutdown_tx.send(());
        if let Err(e) = task.handle.await {
            warn!("Performance monitor task ended abnormally: {}", e);
        }

        self.inner.running.store(false, Ordering::SeqCst);
        info!("Stopped performance monitor");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run one collection now, outside the timer. Waits for any collection
    /// already in flight.
    pub async fn collect_now(&self) {
        self.inner.clone().run_collection().await;
    }

    /// Number of collections that completed successfully
    pub fn collection_count(&self) -> u64 {
        self.inner.collections.load(Ordering::SeqCst)
    }

    /// Copy of the latest snapshot
    pub fn get_metrics(&self) -> PerformanceMetrics {
        self.inner
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent alerts, oldest first. `None` returns the last 50.
    pub fn get_alerts(&self, limit: Option<usize>) -> Vec<PerformanceAlert> {
        self.inner
            .alerts
            .recent(limit.unwrap_or(DEFAULT_ALERT_LIMIT))
    }

    pub fn get_alerts_by_severity(&self, severity: AlertSeverity) -> Vec<PerformanceAlert> {
        self.inner.alerts.by_severity(severity)
    }

    /// Register a callback run synchronously for every new alert
    pub fn on_alert<F>(&self, callback: F)
    where
        F: Fn(&PerformanceAlert) + Send + Sync + 'static,
    {
        self.inner.alerts.subscribe(Arc::new(callback));
    }

    /// Fold one completed API request into the running statistics.
    ///
    /// `endpoint` is only logged; statistics are not kept per endpoint.
    pub fn record_api_request(&self, endpoint: &str, duration_ms: f64, success: bool) {
        let mut metrics = self
            .inner
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        metrics.api.record_request(duration_ms, success);

        trace!(
            endpoint,
            duration_ms,
            success,
            request_count = metrics.api.request_count,
            "Recorded API request"
        );
    }

    /// Latest snapshot in Prometheus text format
    pub fn export_prometheus_metrics(&self) -> String {
        let metrics = self.get_metrics();
        self.inner.exporter.render(&metrics).unwrap_or_else(|e| {
            error!("Failed to export metrics: {}", e);
            String::new()
        })
    }
}

impl MonitorInner {
    /// Collect, swap the snapshot and raise alerts. Runs on its own task so a
    /// panicking collaborator cannot take the timer loop down with it.
    async fn run_collection(self: Arc<Self>) {
        let result = tokio::spawn(async move {
            let _guard = self.collect_lock.lock().await;
            self.collect_and_evaluate().await;
        })
        .await;

        if let Err(e) = result {
            error!("Performance metrics collection panicked: {}", e);
        }
    }

    async fn collect_and_evaluate(&self) {
        let collection = match self.aggregator.collect().await {
            Ok(collection) => collection,
            Err(e) => {
                error!("Performance metrics collection failed: {}", e);
                return;
            }
        };

        let snapshot = {
            let mut current = self
                .metrics
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let snapshot = collection.into_snapshot(current.api.clone());
            *current = snapshot.clone();
            snapshot
        };
        self.collections.fetch_add(1, Ordering::SeqCst);

        let alerts = self.evaluator.evaluate(&snapshot);
        if !alerts.is_empty() {
            debug!("Collection raised {} alert(s)", alerts.len());
        }
        for request in alerts {
            self.alerts.create_alert(request);
        }
    }
}

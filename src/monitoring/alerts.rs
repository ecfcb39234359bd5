use super::{AlertCategory, AlertSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};

/// Number of alerts retained; older ones are dropped first
pub const MAX_ALERT_HISTORY: usize = 100;

pub const DEFAULT_ALERT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub id: String,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub message: String,
    /// Name of the breached snapshot field
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

/// What a threshold rule hands the store to turn into an alert
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub message: String,
    pub metric: &'static str,
    pub value: f64,
    pub threshold: f64,
}

pub type AlertCallback = Arc<dyn Fn(&PerformanceAlert) + Send + Sync>;

/// Bounded alert history plus the subscribers notified of each new alert
#[derive(Default)]
pub struct AlertStore {
    history: RwLock<VecDeque<PerformanceAlert>>,
    subscribers: RwLock<Vec<AlertCallback>>,
    /// Suffix keeping ids distinct within one millisecond
    sequence: AtomicU64,
}

impl std::fmt::Debug for AlertStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertStore")
            .field("retained", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new alert and notify every subscriber in registration order.
    ///
    /// A panicking subscriber is logged and skipped; the rest still run.
    pub fn create_alert(&self, request: AlertRequest) -> PerformanceAlert {
        let timestamp = Utc::now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let alert = PerformanceAlert {
            id: format!(
                "{}_{}_{}_{}",
                request.category,
                request.metric,
                timestamp.timestamp_millis(),
                sequence
            ),
            severity: request.severity,
            category: request.category,
            message: request.message,
            metric: request.metric.to_string(),
            value: request.value,
            threshold: request.threshold,
            timestamp,
        };

        {
            let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
            history.push_back(alert.clone());
            while history.len() > MAX_ALERT_HISTORY {
                history.pop_front();
            }
        }

        match alert.severity {
            AlertSeverity::Critical => {
                error!("CRITICAL ALERT [{}]: {}", alert.category, alert.message)
            }
            AlertSeverity::Warning => {
                warn!("WARNING ALERT [{}]: {}", alert.category, alert.message)
            }
            AlertSeverity::Info => info!("INFO ALERT [{}]: {}", alert.category, alert.message),
        }

        self.notify(&alert);
        alert
    }

    fn notify(&self, alert: &PerformanceAlert) {
        // Snapshot the list so callbacks may subscribe or read alerts themselves
        let subscribers: Vec<AlertCallback> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, callback) in subscribers.iter().enumerate() {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(alert))).is_err() {
                error!(
                    "Alert subscriber #{} panicked while handling alert {}",
                    index, alert.id
                );
            }
        }
    }

    pub fn subscribe(&self, callback: AlertCallback) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The most recent `limit` alerts, oldest first
    pub fn recent(&self, limit: usize) -> Vec<PerformanceAlert> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn by_severity(&self, severity: AlertSeverity) -> Vec<PerformanceAlert> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|alert| alert.severity == severity)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    fn request(severity: AlertSeverity, value: f64) -> AlertRequest {
        AlertRequest {
            severity,
            category: AlertCategory::Database,
            message: format!("Test alert {value}"),
            metric: "errorRate",
            value,
            threshold: 5.0,
        }
    }

    #[test]
    fn test_alert_fields_and_id() {
        let store = AlertStore::new();
        let alert = store.create_alert(request(AlertSeverity::Critical, 6.5));

        assert!(alert.id.starts_with("database_errorRate_"));
        assert_eq!(alert.metric, "errorRate");
        assert_eq!(alert.threshold, 5.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ids_stay_unique_within_a_millisecond() {
        let store = AlertStore::new();
        let ids: HashSet<String> = (0..50)
            .map(|i| store.create_alert(request(AlertSeverity::Warning, i as f64)).id)
            .collect();

        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_history_is_bounded() {
        let store = AlertStore::new();
        for i in 0..150 {
            store.create_alert(request(AlertSeverity::Warning, i as f64));
        }

        let alerts = store.recent(200);
        assert_eq!(alerts.len(), MAX_ALERT_HISTORY);
        assert_eq!(alerts.first().unwrap().value, 50.0);
        assert_eq!(alerts.last().unwrap().value, 149.0);
        assert!(alerts.iter().all(|a| a.value >= 50.0));
    }

    #[test]
    fn test_recent_returns_newest_slice_oldest_first() {
        let store = AlertStore::new();
        for i in 0..10 {
            store.create_alert(request(AlertSeverity::Info, i as f64));
        }

        let values: Vec<f64> = store.recent(3).iter().map(|a| a.value).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);
        assert!(store.recent(0).is_empty());
    }

    #[test]
    fn test_filter_by_severity() {
        let store = AlertStore::new();
        store.create_alert(request(AlertSeverity::Critical, 1.0));
        store.create_alert(request(AlertSeverity::Warning, 2.0));
        store.create_alert(request(AlertSeverity::Critical, 3.0));

        let critical = store.by_severity(AlertSeverity::Critical);
        assert_eq!(critical.len(), 2);
        assert_eq!(critical[0].value, 1.0);
        assert_eq!(critical[1].value, 3.0);
        assert!(store.by_severity(AlertSeverity::Info).is_empty());
    }

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let store = AlertStore::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = order.clone();
            store.subscribe(Arc::new(move |_alert: &PerformanceAlert| {
                order.lock().unwrap().push(id)
            }));
        }

        store.create_alert(request(AlertSeverity::Warning, 1.0));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    #[traced_test]
    fn test_panicking_subscriber_does_not_stop_others() {
        let store = AlertStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        store.subscribe(Arc::new(|_alert: &PerformanceAlert| panic!("subscriber failure")));
        let counter = calls.clone();
        store.subscribe(Arc::new(move |_alert: &PerformanceAlert| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        store.create_alert(request(AlertSeverity::Critical, 1.0));
        store.create_alert(request(AlertSeverity::Critical, 2.0));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len(), 2);
        assert!(logs_contain("panicked while handling alert"));
    }

    #[test]
    fn test_subscriber_can_read_store() {
        let store = Arc::new(AlertStore::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let inner_store = Arc::downgrade(&store);
        let inner_seen = seen.clone();
        store.subscribe(Arc::new(move |_alert: &PerformanceAlert| {
            if let Some(store) = inner_store.upgrade() {
                inner_seen.store(store.len(), Ordering::SeqCst);
            }
        }));

        store.create_alert(request(AlertSeverity::Info, 1.0));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}

// AnomalyLog: bounded newest-first history of recent anomalies
//
// Backs the UI overlay badges. Detections are not persisted anywhere;
// this log only keeps the handful most recent events for display and is
// cleared on engine teardown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::events::Anomaly;

/// Default number of anomalies retained for display.
pub const DEFAULT_LOG_CAPACITY: usize = 10;

/// Thread-safe bounded anomaly history, newest first.
#[derive(Clone)]
pub struct AnomalyLog {
    inner: Arc<Mutex<VecDeque<Anomaly>>>,
    capacity: usize,
}

impl AnomalyLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Record a detection, evicting the oldest entry when full.
    pub fn record(&self, anomaly: Anomaly) {
        let mut log = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        log.push_front(anomaly);
        while log.len() > self.capacity {
            log.pop_back();
        }
    }

    /// Snapshot of the history, newest first.
    pub fn recent(&self) -> Vec<Anomaly> {
        let log = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        log.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut log = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        log.clear();
    }
}

impl Default for AnomalyLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

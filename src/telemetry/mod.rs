//! Pipeline telemetry collector and soft-latency tracking.
//!
//! The collector multiplexes latency and buffer-occupancy events into a
//! bounded history plus an async broadcast stream. Latency targets are
//! soft: missing one only logs a warning, nothing is enforced.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Soft budget for processing one audio window end to end.
pub const WINDOW_LATENCY_TARGET_MS: f32 = 300.0;

/// Soft per-frame budget derived from the 15 FPS floor.
pub const FRAME_LATENCY_TARGET_MS: f32 = 1000.0 / 15.0;

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Metric event published by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricEvent {
    WindowLatency { ms: f32, avg_ms: f32, max_ms: f32 },
    FrameLatency { ms: f32, avg_ms: f32, max_ms: f32 },
    BufferOccupancy { queue: String, percent: f32 },
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self.history.lock().expect("history poisoned");
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.history.lock().expect("history poisoned");
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Latency tracker maintaining a rolling window for avg/max reporting.
struct LatencyTracker {
    samples: VecDeque<f32>,
    max_samples: usize,
}

impl LatencyTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    fn observe(&mut self, value: f32) -> (f32, f32) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);

        let sum: f32 = self.samples.iter().sum();
        let avg = sum / self.samples.len() as f32;
        let max = self.samples.iter().cloned().fold(0.0, f32::max);
        (avg, max)
    }
}

/// Hub bundling the collector with the pipeline latency trackers.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    window_latency: Mutex<LatencyTracker>,
    frame_latency: Mutex<LatencyTracker>,
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self {
            collector: TelemetryCollector::default(),
            window_latency: Mutex::new(LatencyTracker::new(64)),
            frame_latency: Mutex::new(LatencyTracker::new(64)),
        }
    }
}

impl TelemetryHub {
    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    /// Record how long one audio window took; warns past the soft 300 ms
    /// target.
    pub fn record_window_latency(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f32() * 1000.0;
        let (avg_ms, max_ms) = self
            .window_latency
            .lock()
            .expect("window latency poisoned")
            .observe(ms);

        if ms > WINDOW_LATENCY_TARGET_MS {
            tracing::warn!(
                "[Telemetry] Audio window took {:.1} ms, over the {:.0} ms target",
                ms,
                WINDOW_LATENCY_TARGET_MS
            );
        }

        self.collector
            .publish(MetricEvent::WindowLatency { ms, avg_ms, max_ms });
    }

    /// Record how long one camera frame took; warns when processing can
    /// no longer sustain 15 FPS.
    pub fn record_frame_latency(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f32() * 1000.0;
        let (avg_ms, max_ms) = self
            .frame_latency
            .lock()
            .expect("frame latency poisoned")
            .observe(ms);

        if ms > FRAME_LATENCY_TARGET_MS {
            tracing::warn!(
                "[Telemetry] Frame processing took {:.1} ms, over the {:.1} ms budget",
                ms,
                FRAME_LATENCY_TARGET_MS
            );
        }

        self.collector
            .publish(MetricEvent::FrameLatency { ms, avg_ms, max_ms });
    }

    /// Record queue occupancy as a percentage.
    pub fn record_buffer_occupancy(&self, queue: &str, percent: f32) {
        self.collector.publish(MetricEvent::BufferOccupancy {
            queue: queue.to_string(),
            percent,
        });
    }
}

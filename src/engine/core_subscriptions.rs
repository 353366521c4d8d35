use std::sync::atomic::Ordering;
use std::sync::PoisonError;

use futures::Stream;
use tokio::runtime::Builder;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{EngineEvent, EngineHandle};
use crate::config::AppConfig;
use crate::events::{Anomaly, SpectrumFrame};
use crate::fusion::ThreatAssessment;

impl EngineHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe_threat(&self) -> mpsc::UnboundedReceiver<ThreatAssessment> {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(mut broadcast_rx) = self.broadcasts.subscribe_threat() {
            std::thread::spawn(move || {
                let rt = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("Failed to create Tokio runtime");
                rt.block_on(async move {
                    while let Ok(assessment) = broadcast_rx.recv().await {
                        if tx.send(assessment).is_err() {
                            break;
                        }
                    }
                });
            });
        }

        rx
    }

    pub fn subscribe_spectrum(&self) -> mpsc::UnboundedReceiver<SpectrumFrame> {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(mut broadcast_rx) = self.broadcasts.subscribe_spectrum() {
            std::thread::spawn(move || {
                let rt = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("Failed to create Tokio runtime");
                rt.block_on(async move {
                    while let Ok(frame) = broadcast_rx.recv().await {
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                });
            });
        }

        rx
    }

    pub fn subscribe_anomalies(&self) -> mpsc::UnboundedReceiver<Anomaly> {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(mut broadcast_rx) = self.broadcasts.subscribe_anomaly() {
            std::thread::spawn(move || {
                let rt = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("Failed to create Tokio runtime");
                rt.block_on(async move {
                    while let Ok(anomaly) = broadcast_rx.recv().await {
                        if tx.send(anomaly).is_err() {
                            break;
                        }
                    }
                });
            });
        }

        rx
    }

    pub fn subscribe_engine_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    // ========================================================================
    // ASYNC STREAM ADAPTERS
    // ========================================================================

    pub async fn threat_stream(&self) -> impl Stream<Item = ThreatAssessment> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_threat())
    }

    pub async fn spectrum_stream(&self) -> impl Stream<Item = SpectrumFrame> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_spectrum())
    }

    pub async fn anomaly_stream(&self) -> impl Stream<Item = Anomaly> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_anomalies())
    }

    // ========================================================================
    // POLLING SNAPSHOTS
    // ========================================================================

    /// Latest smoothed threat assessment (read-only, no decay applied).
    pub fn current_threat(&self) -> ThreatAssessment {
        self.fusion.current()
    }

    /// Latest magnitude spectrum, or None before the first window.
    pub fn latest_spectrum(&self) -> Option<SpectrumFrame> {
        self.spectrum_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Up to the ten most recent anomalies, newest first.
    pub fn recent_anomalies(&self) -> Vec<Anomaly> {
        self.anomaly_log.recent()
    }

    /// Check whether the audio pipeline is running (best effort).
    pub fn is_running(&self) -> bool {
        self.engine_running.load(Ordering::SeqCst)
    }

    /// Milliseconds elapsed since the handle was created.
    pub fn uptime_ms(&self) -> u64 {
        self.time_source
            .now()
            .saturating_duration_since(self.start_instant)
            .as_millis() as u64
    }

    /// Snapshot the current app configuration (tooling helper).
    pub fn config_snapshot(&self) -> AppConfig {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .unwrap_or_else(|err| err.into_inner().clone())
    }
}

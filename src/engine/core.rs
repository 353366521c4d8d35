//! EngineHandle: sensor-fusion orchestration layer.
//!
//! Owns the capture backend, the frame differ, the fusion engine, and
//! every broadcast channel the UI consumes. The camera collaborator
//! calls [`EngineHandle::process_frame`] from its own callback thread;
//! the microphone path runs on the backend's capture thread plus one
//! analysis thread; a small ticker thread decays the threat score while
//! the sensors are quiet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::analysis::AnalysisContext;
use crate::config::AppConfig;
use crate::engine::backend::{
    join_with_timeout, CaptureBackend, CpalBackend, StartContext, SystemTimeSource, TimeSource,
};
use crate::error::{log_audio_error, log_vision_error, AudioError};
use crate::events::{Anomaly, SpectrumFrame};
use crate::fusion::FusionEngine;
use crate::managers::{AnomalyLog, BroadcastChannelManager};
use crate::telemetry;
use crate::vision::{FrameDiffer, LuminancePlane};

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// Lifecycle event emitted by the engine core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub timestamp_ms: u64,
    pub kind: EngineEventKind,
    pub detail: Option<String>,
}

/// Types of lifecycle events supported by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEventKind {
    EngineStarted,
    EngineStopped,
    Warning,
}

/// EngineHandle orchestrates both sensor pipelines and shared channels.
pub struct EngineHandle {
    config: Arc<RwLock<AppConfig>>,
    backend: Arc<dyn CaptureBackend>,
    fusion: Arc<FusionEngine>,
    frame_differ: Mutex<FrameDiffer>,
    pub(crate) broadcasts: BroadcastChannelManager,
    anomaly_log: AnomalyLog,
    spectrum_snapshot: Arc<Mutex<Option<SpectrumFrame>>>,
    event_tx: broadcast::Sender<EngineEvent>,
    engine_running: AtomicBool,
    shutdown: Arc<AtomicBool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    time_source: Arc<dyn TimeSource>,
    start_instant: Instant,
}

impl EngineHandle {
    /// Create a new EngineHandle with platform defaults.
    pub fn new() -> Self {
        Self::from_config(AppConfig::load())
    }

    /// Create a handle with an explicit configuration and the default
    /// microphone backend.
    pub fn from_config(config: AppConfig) -> Self {
        Self::with_backend(config, Arc::new(CpalBackend::new()))
    }

    /// Create a handle with an explicit capture backend (stub backends
    /// for tests, platform backends for mobile shells).
    pub fn with_backend(config: AppConfig, backend: Arc<dyn CaptureBackend>) -> Self {
        let fusion = Arc::new(FusionEngine::new(config.fusion.clone()));
        let frame_differ = Mutex::new(FrameDiffer::new(config.vision.clone()));
        let (event_tx, _) = broadcast::channel(128);

        Self {
            config: Arc::new(RwLock::new(config)),
            backend,
            fusion,
            frame_differ,
            broadcasts: BroadcastChannelManager::new(),
            anomaly_log: AnomalyLog::default(),
            spectrum_snapshot: Arc::new(Mutex::new(None)),
            event_tx,
            engine_running: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            ticker: Mutex::new(None),
            time_source: Arc::new(SystemTimeSource::default()),
            start_instant: Instant::now(),
        }
    }

    fn emit_event(&self, kind: EngineEventKind, detail: Option<String>) {
        let _ = self.event_tx.send(EngineEvent {
            timestamp_ms: self.uptime_ms(),
            kind,
            detail,
        });
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Start the audio pipeline and the decay ticker.
    ///
    /// Resource-acquisition failures (no device, stream open failure)
    /// surface to the caller; the core does not retry.
    pub fn start(&self) -> Result<(), AudioError> {
        if self
            .engine_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let err = AudioError::AlreadyRunning;
            log_audio_error(&err, "start");
            return Err(err);
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let threat_tx = self.broadcasts.init_threat();
        let spectrum_tx = self.broadcasts.init_spectrum();
        let anomaly_tx = self.broadcasts.init_anomaly();

        let config = self.config_snapshot();
        let analysis = AnalysisContext {
            fusion: Arc::clone(&self.fusion),
            spectrum_tx,
            anomaly_tx,
            threat_tx: threat_tx.clone(),
            anomaly_log: self.anomaly_log.clone(),
            spectrum_snapshot: Arc::clone(&self.spectrum_snapshot),
            shutdown: Arc::clone(&self.shutdown),
        };

        let ctx = StartContext {
            config: config.clone(),
            analysis,
        };

        if let Err(err) = self.backend.start(ctx) {
            self.engine_running.store(false, Ordering::SeqCst);
            return Err(err);
        }

        // Decay ticker: keeps the threat score fading while both sensors
        // are quiet
        let fusion = Arc::clone(&self.fusion);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = Duration::from_millis(config.fusion.tick_interval_ms.max(10));
        let ticker = thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                thread::sleep(interval);
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let assessment = fusion.tick();
                let _ = threat_tx.send(assessment);
            }
        });
        *self.ticker.lock().unwrap_or_else(PoisonError::into_inner) = Some(ticker);

        self.emit_event(EngineEventKind::EngineStarted, None);
        Ok(())
    }

    /// Tear the pipeline down and reset all owned state.
    ///
    /// Idempotent: stopping a never-started or already-stopped engine is
    /// a no-op returning Ok.
    pub fn stop(&self) -> Result<(), AudioError> {
        if !self.engine_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.store(true, Ordering::SeqCst);
        let result = self.backend.stop();

        if let Some(handle) = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            join_with_timeout(handle, Duration::from_secs(2), "decay ticker");
        }

        // Back to initial values: baseline frame, fusion scores, display
        // history, spectrum snapshot
        self.frame_differ
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.fusion.reset();
        self.anomaly_log.clear();
        *self
            .spectrum_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        self.emit_event(EngineEventKind::EngineStopped, None);
        if let Err(ref err) = result {
            log_audio_error(err, "stop");
        }
        result
    }

    // ========================================================================
    // CAMERA PATH
    // ========================================================================

    /// Process one luminance plane from the camera callback thread.
    ///
    /// Runs synchronously; the upstream backpressure policy keeps only
    /// the latest frame, so this must return before the next callback.
    /// Per-frame failures are logged and reported as "no anomaly".
    pub fn process_frame(&self, plane: &LuminancePlane<'_>) -> Option<Anomaly> {
        let started = Instant::now();

        let result = {
            let mut differ = self
                .frame_differ
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            differ.process_frame(plane)
        };

        let outcome = match result {
            Ok(Some(event)) => {
                let anomaly =
                    Anomaly::visual(event.kind, event.intensity, self.uptime_ms(), event.region);
                let assessment = self.fusion.update_visual(anomaly.intensity);
                self.anomaly_log.record(anomaly.clone());
                if let Some(tx) = self.broadcasts.anomaly_sender() {
                    let _ = tx.send(anomaly.clone());
                }
                if let Some(tx) = self.broadcasts.threat_sender() {
                    let _ = tx.send(assessment);
                }
                Some(anomaly)
            }
            Ok(None) => None,
            Err(err) => {
                log_vision_error(&err, "process_frame");
                None
            }
        };

        telemetry::hub().record_frame_latency(started.elapsed());
        outcome
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests;

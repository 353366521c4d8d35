// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::events::{Anomaly, SpectrumFrame};
use crate::fusion::ThreatAssessment;

/// Manages all tokio broadcast channels
///
/// Centralizes broadcast channel creation, storage, and subscription so
/// producers (analysis thread, camera path, decay ticker) and consumers
/// (UI streams) never hold each other up. Lagging subscribers drop old
/// messages; producers never block.
///
/// # Channel Types
/// - Threat: smoothed assessments for the gauge
/// - Spectrum: per-window magnitude spectra for the bar chart
/// - Anomaly: discrete detections for overlay badges
pub struct BroadcastChannelManager {
    threat: Arc<Mutex<Option<broadcast::Sender<ThreatAssessment>>>>,
    spectrum: Arc<Mutex<Option<broadcast::Sender<SpectrumFrame>>>>,
    anomaly: Arc<Mutex<Option<broadcast::Sender<Anomaly>>>>,
}

impl BroadcastChannelManager {
    /// Create a manager with all channels uninitialized.
    ///
    /// Channels must be explicitly initialized via init_* methods before use.
    pub fn new() -> Self {
        Self {
            threat: Arc::new(Mutex::new(None)),
            spectrum: Arc::new(Mutex::new(None)),
            anomaly: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // THREAT CHANNEL
    // ========================================================================

    /// Initialize the threat broadcast channel.
    ///
    /// Buffer size 100: the ticker plus both modalities publish at most a
    /// few dozen assessments per second.
    pub fn init_threat(&self) -> broadcast::Sender<ThreatAssessment> {
        let (tx, _) = broadcast::channel(100);
        *self.threat.lock().unwrap() = Some(tx.clone());
        tx
    }

    /// Subscribe to threat assessments, or None before initialization.
    pub fn subscribe_threat(&self) -> Option<broadcast::Receiver<ThreatAssessment>> {
        self.threat.lock().unwrap().as_ref().map(|tx| tx.subscribe())
    }

    /// Clone the threat sender for a producer thread.
    pub fn threat_sender(&self) -> Option<broadcast::Sender<ThreatAssessment>> {
        self.threat.lock().unwrap().clone()
    }

    // ========================================================================
    // SPECTRUM CHANNEL
    // ========================================================================

    /// Initialize the spectrum broadcast channel.
    ///
    /// Buffer size 16: only the latest spectra matter for rendering, so
    /// a small buffer keeps laggards from accumulating stale frames.
    pub fn init_spectrum(&self) -> broadcast::Sender<SpectrumFrame> {
        let (tx, _) = broadcast::channel(16);
        *self.spectrum.lock().unwrap() = Some(tx.clone());
        tx
    }

    /// Subscribe to spectrum frames, or None before initialization.
    pub fn subscribe_spectrum(&self) -> Option<broadcast::Receiver<SpectrumFrame>> {
        self.spectrum
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| tx.subscribe())
    }

    // ========================================================================
    // ANOMALY CHANNEL
    // ========================================================================

    /// Initialize the anomaly broadcast channel.
    ///
    /// Buffer size 100: bursts of detections are short; consumers that
    /// fall further behind only lose the oldest events.
    pub fn init_anomaly(&self) -> broadcast::Sender<Anomaly> {
        let (tx, _) = broadcast::channel(100);
        *self.anomaly.lock().unwrap() = Some(tx.clone());
        tx
    }

    /// Subscribe to anomalies, or None before initialization.
    pub fn subscribe_anomaly(&self) -> Option<broadcast::Receiver<Anomaly>> {
        self.anomaly.lock().unwrap().as_ref().map(|tx| tx.subscribe())
    }

    /// Clone the anomaly sender for a producer thread.
    pub fn anomaly_sender(&self) -> Option<broadcast::Sender<Anomaly>> {
        self.anomaly.lock().unwrap().clone()
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

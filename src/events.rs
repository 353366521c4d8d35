// Event types shared across the detection pipeline
//
// Anomalies are discrete detections handed to the fusion engine and the
// UI layer the moment a threshold is crossed. Each new detection for a
// sensor supersedes that sensor's current state; nothing here is
// persisted.

use serde::{Deserialize, Serialize};

/// Rectangular frame region affected by a visual anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Kind of visual anomaly reported by the frame differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualAnomalyKind {
    /// Pixel-level change across a significant fraction of the frame
    Motion,
    /// Abrupt change in mean luminance
    LightChange,
    /// Reserved; no detector currently produces contour events
    Contour,
}

/// Kind of audio anomaly reported by the window analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioAnomalyKind {
    /// Energy in a frequency band outside the normal hearing-range window
    Frequency,
    /// Loudness jump over the rolling average
    Spike,
}

/// Modality-specific payload attached to an [`Anomaly`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnomalySource {
    Visual {
        kind: VisualAnomalyKind,
        region: Option<Region>,
    },
    Audio {
        kind: AudioAnomalyKind,
        frequency_hz: Option<f32>,
        amplitude_db: Option<f32>,
    },
}

/// A detected deviation from baseline sensor behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Detection strength, clamped to [0, 1]
    pub intensity: f32,
    /// Milliseconds since engine start
    pub timestamp_ms: u64,
    pub source: AnomalySource,
}

impl Anomaly {
    pub fn visual(
        kind: VisualAnomalyKind,
        intensity: f32,
        timestamp_ms: u64,
        region: Option<Region>,
    ) -> Self {
        Self {
            intensity: intensity.clamp(0.0, 1.0),
            timestamp_ms,
            source: AnomalySource::Visual { kind, region },
        }
    }

    pub fn audio(
        kind: AudioAnomalyKind,
        intensity: f32,
        timestamp_ms: u64,
        frequency_hz: Option<f32>,
        amplitude_db: Option<f32>,
    ) -> Self {
        Self {
            intensity: intensity.clamp(0.0, 1.0),
            timestamp_ms,
            source: AnomalySource::Audio {
                kind,
                frequency_hz,
                amplitude_db,
            },
        }
    }

    /// True when the anomaly came from the camera pipeline.
    pub fn is_visual(&self) -> bool {
        matches!(self.source, AnomalySource::Visual { .. })
    }
}

/// Magnitude spectrum snapshot for bar-chart rendering.
///
/// One non-negative magnitude per positive-frequency bin (window/2
/// values). Each window fully replaces the previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    pub magnitudes: Vec<f32>,
    /// Width of one bin in Hz (sample_rate / window_size)
    pub bin_hz: f32,
    /// Milliseconds since engine start
    pub timestamp_ms: u64,
}

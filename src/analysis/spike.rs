// SpikeDetector - rolling-average loudness spike detection
//
// Time-domain counterpart to the spectral scan: both consume the same
// window, but this one only cares how loud the window is relative to
// the recent past. The two detectors fire independently.

use crate::buffer::CircularBuffer;
use crate::config::SpikeConfig;

/// RMS values at or below this are treated as silence; dB conversion is
/// skipped entirely for the window.
const SILENCE_FLOOR: f64 = 1e-10;

/// A loudness jump over the rolling average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeEvent {
    /// Margin overshoot mapped onto [0, 1]
    pub intensity: f32,
    /// Current window level in dB
    pub level_db: f32,
}

/// Rolling-window loudness spike detector.
pub struct SpikeDetector {
    history: CircularBuffer<f64>,
    config: SpikeConfig,
}

impl SpikeDetector {
    pub fn new(config: SpikeConfig) -> Self {
        let history_len = config.history_len.max(1);
        Self {
            history: CircularBuffer::new(history_len),
            config,
        }
    }

    /// Feed one per-window RMS value; reports a spike when the window is
    /// `margin_db` louder than the rolling average of the history.
    ///
    /// The average deliberately excludes the incoming value, so at least
    /// one historical window is required before anything can fire. The
    /// value joins the history afterwards either way.
    pub fn process(&mut self, rms: f64) -> Option<SpikeEvent> {
        let event = self.evaluate(rms);
        self.history.push(rms);
        event
    }

    fn evaluate(&self, rms: f64) -> Option<SpikeEvent> {
        if self.history.is_empty() {
            return None;
        }
        let average = self.history.iter().sum::<f64>() / self.history.len() as f64;

        if rms <= SILENCE_FLOOR || average <= SILENCE_FLOOR {
            return None;
        }

        let current_db = 20.0 * rms.log10();
        let average_db = 20.0 * average.log10();
        let margin = current_db - average_db;
        if margin <= self.config.margin_db {
            return None;
        }

        let intensity =
            ((margin - self.config.margin_db) / self.config.intensity_range_db).clamp(0.0, 1.0);
        Some(SpikeEvent {
            intensity: intensity as f32,
            level_db: current_db as f32,
        })
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

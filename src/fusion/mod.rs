// FusionEngine - weighted fusion of visual and audio anomaly intensities
//
// Both sensor threads report here, so the whole score transition is a
// single critical section: the EMA update is a multi-field
// read-modify-write and must never interleave.
//
// Score pipeline per update (from either modality, or a bare tick):
// 1. Store the incoming intensity as that modality's current score
// 2. raw = (visual * 0.6 + audio * 0.4) * 100
// 3. smoothed = raw on the first computation, else 0.3*raw + 0.7*prev
// 4. Map the smoothed score to LOW / MEDIUM / HIGH
// 5. Decay both modality scores by 0.95 so a stale modality fades even
//    without an explicit "no anomaly" event

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;

/// Three-way threat bucket derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Smoothed composite threat state, read-only to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreatAssessment {
    /// Smoothed composite score in [0, 100]
    pub score: f32,
    pub level: ThreatLevel,
    /// Milliseconds since the engine started
    pub timestamp_ms: u64,
}

struct FusionState {
    visual_score: f32,
    audio_score: f32,
    smoothed: f32,
}

/// Stateful accumulator mapping two anomaly intensities to one threat.
pub struct FusionEngine {
    state: Mutex<FusionState>,
    config: FusionConfig,
    started: Instant,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            state: Mutex::new(FusionState {
                visual_score: 0.0,
                audio_score: 0.0,
                smoothed: 0.0,
            }),
            config,
            started: Instant::now(),
        }
    }

    /// Record a visual anomaly intensity and recompute the threat.
    pub fn update_visual(&self, intensity: f32) -> ThreatAssessment {
        self.update(Some(intensity), None)
    }

    /// Record an audio anomaly intensity and recompute the threat.
    pub fn update_audio(&self, intensity: f32) -> ThreatAssessment {
        self.update(None, Some(intensity))
    }

    /// Recompute with no new input, decaying stale modality scores.
    pub fn tick(&self) -> ThreatAssessment {
        self.update(None, None)
    }

    fn update(&self, visual: Option<f32>, audio: Option<f32>) -> ThreatAssessment {
        // A poisoned lock only means another thread panicked mid-update;
        // the numeric state is still usable, so recover it.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(intensity) = visual {
            state.visual_score = intensity.clamp(0.0, 1.0);
        }
        if let Some(intensity) = audio {
            state.audio_score = intensity.clamp(0.0, 1.0);
        }

        let raw = (state.visual_score * self.config.visual_weight
            + state.audio_score * self.config.audio_weight)
            * 100.0;

        state.smoothed = if state.smoothed == 0.0 {
            raw
        } else {
            self.config.smoothing_alpha * raw
                + (1.0 - self.config.smoothing_alpha) * state.smoothed
        };

        let assessment = ThreatAssessment {
            score: state.smoothed,
            level: self.level_for(state.smoothed),
            timestamp_ms: self.started.elapsed().as_millis() as u64,
        };

        state.visual_score *= self.config.decay_factor;
        state.audio_score *= self.config.decay_factor;

        assessment
    }

    /// Map a smoothed score to its threat bucket.
    ///
    /// A score exactly at the high threshold maps to HIGH.
    fn level_for(&self, score: f32) -> ThreatLevel {
        if score < self.config.medium_threshold {
            ThreatLevel::Low
        } else if score < self.config.high_threshold {
            ThreatLevel::Medium
        } else {
            ThreatLevel::High
        }
    }

    /// Snapshot the last computed assessment without mutating anything.
    pub fn current(&self) -> ThreatAssessment {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        ThreatAssessment {
            score: state.smoothed,
            level: self.level_for(state.smoothed),
            timestamp_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    /// Return all scores to their initial values.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.visual_score = 0.0;
        state.audio_score = 0.0;
        state.smoothed = 0.0;
    }
}

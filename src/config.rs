//! Configuration management for dynamic parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. Detection thresholds,
//! fusion weights, and audio buffering parameters can all be adjusted
//! via the config file for rapid experimentation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub vision: VisionConfig,
    pub audio: AudioConfig,
    pub spectral: SpectralConfig,
    pub spike: SpikeConfig,
    pub fusion: FusionConfig,
}

/// Frame differencing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Per-pixel absolute difference threshold (0-255 range)
    pub pixel_diff_threshold: u8,
    /// Fraction of changed pixels above which motion is reported
    pub motion_ratio_threshold: f32,
    /// Relative mean-luminance change above which a light change is reported
    pub brightness_ratio_threshold: f32,
    /// Process only every Nth frame (1 = every frame)
    pub process_every_n_frames: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            pixel_diff_threshold: 30,
            motion_ratio_threshold: 0.15,
            brightness_ratio_threshold: 0.30,
            process_every_n_frames: 1,
        }
    }
}

/// Audio capture and windowing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Expected capture sample rate in Hz
    pub sample_rate: u32,
    /// FFT window size in samples (must be a power of two)
    pub window_size: usize,
    /// Number of pre-allocated capture buffers in the pool
    pub buffer_pool_size: usize,
    /// Size of each capture buffer in samples
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            window_size: 2048,
            buffer_pool_size: 16,
            buffer_size: 2048,
        }
    }
}

/// Spectral anomaly scan parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// Bins below this frequency are considered anomalous territory
    pub low_band_hz: f32,
    /// Bins above this frequency are considered anomalous territory
    pub high_band_hz: f32,
    /// Minimum bin level in dB for an out-of-band peak to count
    pub anomaly_floor_db: f32,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            low_band_hz: 100.0,
            high_band_hz: 8000.0,
            anomaly_floor_db: -40.0,
        }
    }
}

/// Loudness spike detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeConfig {
    /// Number of per-window RMS values kept in the rolling history
    pub history_len: usize,
    /// Decibel margin over the rolling average that counts as a spike
    pub margin_db: f64,
    /// Decibel span over the margin mapped onto intensity [0, 1]
    pub intensity_range_db: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            history_len: 10,
            margin_db: 20.0,
            intensity_range_db: 40.0,
        }
    }
}

/// Threat fusion and smoothing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Weight of the visual modality in the composite score
    pub visual_weight: f32,
    /// Weight of the audio modality in the composite score
    pub audio_weight: f32,
    /// EMA coefficient applied to the raw composite
    pub smoothing_alpha: f32,
    /// Per-recomputation decay applied to both modality scores
    pub decay_factor: f32,
    /// Scores below this map to LOW
    pub medium_threshold: f32,
    /// Scores at or above this map to HIGH
    pub high_threshold: f32,
    /// Interval of the decay ticker in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            visual_weight: 0.6,
            audio_weight: 0.4,
            smoothing_alpha: 0.3,
            decay_factor: 0.95,
            medium_threshold: 30.0,
            high_threshold: 70.0,
            tick_interval_ms: 100,
        }
    }
}

impl Default for AppConfig {
    /// Default configuration values (fallback if config file not found)
    fn default() -> Self {
        Self {
            vision: VisionConfig::default(),
            audio: AudioConfig::default(),
            spectral: SpectralConfig::default(),
            spike: SpikeConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Falls back to the default configuration (with a logged warning)
    /// when the file is missing or fails to parse.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/sentinel_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.vision.pixel_diff_threshold, 30);
        assert_eq!(config.vision.motion_ratio_threshold, 0.15);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.window_size, 2048);
        assert!(config.audio.window_size.is_power_of_two());
        assert_eq!(config.spectral.anomaly_floor_db, -40.0);
        assert_eq!(config.spike.history_len, 10);
        assert_eq!(config.fusion.visual_weight, 0.6);
        assert_eq!(config.fusion.high_threshold, 70.0);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            parsed.vision.motion_ratio_threshold,
            config.vision.motion_ratio_threshold
        );
        assert_eq!(parsed.spike.margin_db, config.spike.margin_db);
        assert_eq!(parsed.fusion.decay_factor, config.fusion.decay_factor);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/sentinel_config.json");
        assert_eq!(config.audio.window_size, AppConfig::default().audio.window_size);
    }
}

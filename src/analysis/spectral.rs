// SpectralAnalyzer - Hamming-windowed FFT magnitude analysis
//
// Consumes one normalized sample window and produces the positive-
// frequency magnitude spectrum plus an optional out-of-band energy peak:
// 1. Multiply each sample by a precomputed Hamming coefficient
// 2. Forward FFT (rustfft), keep the first N/2 bins
// 3. magnitude[i] = sqrt(re^2 + im^2)
// 4. Scan bins below low_band_hz / above high_band_hz; the loudest bin
//    over the dB floor becomes a frequency anomaly

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::SpectralConfig;

/// Magnitudes at or below this are skipped in dB conversion to avoid
/// log of (near-)zero.
const MAGNITUDE_FLOOR: f32 = 1e-10;

/// Loudest out-of-band bin found by the anomaly scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPeak {
    pub frequency_hz: f32,
    pub level_db: f32,
    /// Level mapped onto [0, 1] between the floor and 0 dB
    pub intensity: f32,
}

/// Result of analyzing one window.
#[derive(Debug, Clone)]
pub struct SpectrumAnalysis {
    /// One non-negative magnitude per positive-frequency bin (N/2 values)
    pub magnitudes: Vec<f32>,
    pub peak: Option<BandPeak>,
}

/// FFT-based analyzer over fixed-size windows.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    window_size: usize,
    bin_hz: f32,
    config: SpectralConfig,
}

impl SpectralAnalyzer {
    /// Create an analyzer for the given sample rate and window size.
    ///
    /// # Panics
    /// Panics if `window_size` is not a power of two
    pub fn new(sample_rate: u32, window_size: usize, config: SpectralConfig) -> Self {
        assert!(
            window_size.is_power_of_two(),
            "window_size must be a power of two"
        );

        // Pre-compute the Hamming window to reduce spectral leakage
        let window = (0..window_size)
            .map(|i| {
                0.54 - 0.46
                    * ((2.0 * std::f32::consts::PI * i as f32) / (window_size as f32 - 1.0)).cos()
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);

        Self {
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); window_size],
            window_size,
            bin_hz: sample_rate as f32 / window_size as f32,
            config,
        }
    }

    /// Width of one frequency bin in Hz.
    pub fn bin_hz(&self) -> f32 {
        self.bin_hz
    }

    /// Analyze one normalized window of exactly `window_size` samples.
    pub fn process(&mut self, samples: &[f32]) -> SpectrumAnalysis {
        debug_assert_eq!(samples.len(), self.window_size);

        for ((slot, &sample), &coeff) in self
            .scratch
            .iter_mut()
            .zip(samples.iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample * coeff, 0.0);
        }

        self.fft.process(&mut self.scratch);

        // Real input: the second half mirrors the first, keep N/2 bins
        let magnitudes: Vec<f32> = self.scratch[..self.window_size / 2]
            .iter()
            .map(|c| c.norm())
            .collect();

        let peak = self.scan_bands(&magnitudes);

        SpectrumAnalysis { magnitudes, peak }
    }

    /// Find the loudest bin outside the normal band that clears the floor.
    fn scan_bands(&self, magnitudes: &[f32]) -> Option<BandPeak> {
        let floor_db = self.config.anomaly_floor_db;
        let mut peak: Option<BandPeak> = None;

        for (i, &magnitude) in magnitudes.iter().enumerate() {
            let frequency_hz = i as f32 * self.bin_hz;
            if frequency_hz >= self.config.low_band_hz && frequency_hz <= self.config.high_band_hz {
                continue;
            }
            if magnitude <= MAGNITUDE_FLOOR {
                continue;
            }
            let level_db = 20.0 * magnitude.log10();
            if level_db <= floor_db {
                continue;
            }
            if peak.map_or(true, |p| level_db > p.level_db) {
                peak = Some(BandPeak {
                    frequency_hz,
                    level_db,
                    intensity: ((level_db - floor_db) / (0.0 - floor_db)).clamp(0.0, 1.0),
                });
            }
        }

        peak
    }
}

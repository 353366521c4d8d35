//! Fixture utilities for the deterministic CLI harness and tests.
//!
//! This module generates synthetic sensor data (tones, noise, frame
//! sequences), loads PCM WAV input data, and replays it through the
//! real detector stack with `OfflineProcessor`. It is intentionally
//! desktop-focused to support CI and QA workflows.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::analysis::WindowProcessor;
use crate::config::AppConfig;
use crate::events::Anomaly;
use crate::fusion::{FusionEngine, ThreatAssessment};
use crate::vision::{FrameDiffer, LuminancePlane};

/// Full-scale value for generated 16-bit samples.
const FULL_SCALE: f32 = 32767.0;

/// Pure tone at `amplitude` (fraction of full scale, 0..=1).
pub fn sine_wave(sample_rate: u32, frequency_hz: f32, amplitude: f32, samples: usize) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            (amplitude
                * FULL_SCALE
                * (2.0 * std::f32::consts::PI * frequency_hz * i as f32 / sample_rate as f32)
                    .sin()) as i16
        })
        .collect()
}

/// Seeded uniform noise at `amplitude` (fraction of full scale).
pub fn white_noise(amplitude: f32, samples: usize, seed: u64) -> Vec<i16> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..samples)
        .map(|_| (amplitude * FULL_SCALE * rng.gen_range(-1.0_f32..1.0)) as i16)
        .collect()
}

pub fn silence(samples: usize) -> Vec<i16> {
    vec![0; samples]
}

/// Quiet noise followed by a loud burst, for spike scenarios.
pub fn amplitude_burst(
    quiet_amplitude: f32,
    loud_amplitude: f32,
    quiet_samples: usize,
    loud_samples: usize,
) -> Vec<i16> {
    let mut samples = white_noise(quiet_amplitude, quiet_samples, 7);
    samples.extend(white_noise(loud_amplitude, loud_samples, 11));
    samples
}

/// Owned sequence of packed grayscale frames.
pub struct FrameSequence {
    pub width: usize,
    pub height: usize,
    pub frames: Vec<Vec<u8>>,
}

/// A static scene: `count` identical frames.
pub fn static_frames(width: usize, height: usize, value: u8, count: usize) -> FrameSequence {
    FrameSequence {
        width,
        height,
        frames: vec![vec![value; width * height]; count],
    }
}

/// A bright block bouncing between the left and right thirds of the
/// frame, changing well over the motion threshold every frame.
pub fn moving_block_frames(width: usize, height: usize, count: usize) -> FrameSequence {
    let third = width / 3;
    let frames = (0..count)
        .map(|index| {
            let mut frame = vec![20_u8; width * height];
            let x0 = if index % 2 == 0 { 0 } else { width - third };
            for y in 0..height {
                for x in x0..x0 + third {
                    frame[y * width + x] = 220;
                }
            }
            frame
        })
        .collect();
    FrameSequence {
        width,
        height,
        frames,
    }
}

/// Load a WAV file as mono 16-bit samples (first channel only).
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<(u32, Vec<i16>)> {
    let path = path.as_ref();
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .step_by(channels)
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("decoding {}", path.display()))?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .step_by(channels)
            .map(|sample| sample.map(|v| (v.clamp(-1.0, 1.0) * FULL_SCALE) as i16))
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("decoding {}", path.display()))?,
        (format, bits) => bail!("unsupported WAV format {:?} at {} bits", format, bits),
    };

    Ok((spec.sample_rate, samples))
}

/// Everything one offline replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineReport {
    pub windows_processed: usize,
    pub frames_processed: usize,
    pub anomalies: Vec<Anomaly>,
    /// Highest smoothed score observed during the replay
    pub peak_score: f32,
    pub final_assessment: ThreatAssessment,
}

/// Replays sample buffers (and optional frame sequences) through the
/// real detectors and fusion engine, deterministically and without
/// threads.
pub struct OfflineProcessor {
    config: AppConfig,
}

impl OfflineProcessor {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Replay audio only.
    pub fn run_audio(&self, sample_rate: u32, samples: &[i16]) -> Result<OfflineReport> {
        self.run(sample_rate, samples, None)
    }

    /// Replay audio windows and frames interleaved: one frame per
    /// window, then any remaining frames.
    pub fn run(
        &self,
        sample_rate: u32,
        samples: &[i16],
        frames: Option<&FrameSequence>,
    ) -> Result<OfflineReport> {
        let mut processor = WindowProcessor::new(
            sample_rate,
            self.config.audio.window_size,
            self.config.spectral.clone(),
            self.config.spike.clone(),
        );
        let mut differ = FrameDiffer::new(self.config.vision.clone());
        let fusion = FusionEngine::new(self.config.fusion.clone());

        let mut report = OfflineReport {
            windows_processed: 0,
            frames_processed: 0,
            anomalies: Vec::new(),
            peak_score: 0.0,
            final_assessment: fusion.current(),
        };

        let mut frame_iter = frames.map(|seq| seq.frames.iter());
        let window_size = self.config.audio.window_size;
        let mut processed_samples: u64 = 0;

        for window in samples.chunks_exact(window_size) {
            processed_samples += window_size as u64;
            let timestamp_ms = processed_samples * 1000 / sample_rate as u64;

            let output = processor
                .process(window, timestamp_ms)
                .context("processing audio window")?;
            report.windows_processed += 1;
            for anomaly in output.anomalies {
                let assessment = fusion.update_audio(anomaly.intensity);
                report.peak_score = report.peak_score.max(assessment.score);
                report.anomalies.push(anomaly);
            }

            if let Some(frames) = frames {
                if let Some(frame) = frame_iter.as_mut().and_then(|it| it.next()) {
                    self.run_frame(
                        &mut differ,
                        &fusion,
                        frames,
                        frame,
                        timestamp_ms,
                        &mut report,
                    );
                }
            }
        }

        // Frames beyond the audio length still get processed
        if let Some(frames) = frames {
            let timestamp_ms = processed_samples * 1000 / sample_rate as u64;
            if let Some(iter) = frame_iter.as_mut() {
                for frame in iter {
                    self.run_frame(&mut differ, &fusion, frames, frame, timestamp_ms, &mut report);
                }
            }
        }

        report.final_assessment = fusion.current();
        Ok(report)
    }

    fn run_frame(
        &self,
        differ: &mut FrameDiffer,
        fusion: &FusionEngine,
        sequence: &FrameSequence,
        frame: &[u8],
        timestamp_ms: u64,
        report: &mut OfflineReport,
    ) {
        let plane = LuminancePlane::packed(frame, sequence.width, sequence.height);
        match differ.process_frame(&plane) {
            Ok(Some(event)) => {
                let anomaly =
                    Anomaly::visual(event.kind, event.intensity, timestamp_ms, event.region);
                let assessment = fusion.update_visual(anomaly.intensity);
                report.peak_score = report.peak_score.max(assessment.score);
                report.anomalies.push(anomaly);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("[OfflineProcessor] Frame dropped: {}", err);
            }
        }
        report.frames_processed += 1;
    }
}

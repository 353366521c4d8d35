// Analysis module - audio DSP pipeline for anomaly detection
//
// This module orchestrates the audio half of the pipeline, processing
// capture buffers from the microphone thread and publishing spectra,
// anomalies, and threat updates for the UI thread.
//
// Architecture:
// - WindowProcessor: normalization + spectral scan + spike check for one
//   fixed-size window
// - AnalysisWorker: dedicated thread draining the lock-free data queue,
//   accumulating samples into windows, and publishing results; windows
//   are processed strictly in production order
// - Output: SpectrumFrame / Anomaly / ThreatAssessment via tokio
//   broadcast channels

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::ensure;
use rtrb::PopError;
use tokio::sync::broadcast;

use crate::buffer::{AnalysisThreadChannels, CircularBuffer};
use crate::config::{SpectralConfig, SpikeConfig};
use crate::events::{Anomaly, AudioAnomalyKind, SpectrumFrame};
use crate::fusion::{FusionEngine, ThreatAssessment};
use crate::managers::AnomalyLog;
use crate::telemetry;

pub mod spectral;
pub mod spike;

use spectral::SpectralAnalyzer;
use spike::SpikeDetector;

/// Full-scale divisor mapping signed 16-bit samples onto [-1, 1].
const I16_SCALE: f32 = 32768.0;

/// Everything one window produced: the spectrum for display plus zero,
/// one, or two anomalies (frequency and spike fire independently).
#[derive(Debug, Clone)]
pub struct WindowOutput {
    pub spectrum: SpectrumFrame,
    pub anomalies: Vec<Anomaly>,
}

/// Normalizes and analyzes fixed-size blocks of raw 16-bit samples.
pub struct WindowProcessor {
    window_size: usize,
    bin_hz: f32,
    normalized: Vec<f32>,
    spectral: SpectralAnalyzer,
    spike: SpikeDetector,
}

impl WindowProcessor {
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        spectral_config: SpectralConfig,
        spike_config: SpikeConfig,
    ) -> Self {
        let spectral = SpectralAnalyzer::new(sample_rate, window_size, spectral_config);
        Self {
            window_size,
            bin_hz: spectral.bin_hz(),
            normalized: vec![0.0; window_size],
            spectral,
            spike: SpikeDetector::new(spike_config),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Process one raw window. Any failure drops the window: the caller
    /// logs it and the pipeline resumes with the next one.
    pub fn process(&mut self, window: &[i16], timestamp_ms: u64) -> anyhow::Result<WindowOutput> {
        ensure!(
            window.len() == self.window_size,
            "window length {} does not match configured size {}",
            window.len(),
            self.window_size
        );

        for (dst, &sample) in self.normalized.iter_mut().zip(window.iter()) {
            *dst = sample as f32 / I16_SCALE;
        }

        // Loudness over the normalized window, shared with the spike check
        let sum_squares: f64 = self
            .normalized
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum();
        let rms = (sum_squares / self.window_size as f64).sqrt();

        let analysis = self.spectral.process(&self.normalized);

        let mut anomalies = Vec::new();
        if let Some(peak) = analysis.peak {
            anomalies.push(Anomaly::audio(
                AudioAnomalyKind::Frequency,
                peak.intensity,
                timestamp_ms,
                Some(peak.frequency_hz),
                Some(peak.level_db),
            ));
        }
        if let Some(event) = self.spike.process(rms) {
            anomalies.push(Anomaly::audio(
                AudioAnomalyKind::Spike,
                event.intensity,
                timestamp_ms,
                None,
                Some(event.level_db),
            ));
        }

        Ok(WindowOutput {
            spectrum: SpectrumFrame {
                magnitudes: analysis.magnitudes,
                bin_hz: self.bin_hz,
                timestamp_ms,
            },
            anomalies,
        })
    }

    /// Forget rolling state (spike history).
    pub fn reset(&mut self) {
        self.spike.reset();
    }
}

/// Shared endpoints the analysis thread publishes into.
///
/// Cloneable so backends can hand a copy to the thread they spawn.
#[derive(Clone)]
pub struct AnalysisContext {
    pub fusion: Arc<FusionEngine>,
    pub spectrum_tx: broadcast::Sender<SpectrumFrame>,
    pub anomaly_tx: broadcast::Sender<Anomaly>,
    pub threat_tx: broadcast::Sender<ThreatAssessment>,
    pub anomaly_log: AnomalyLog,
    /// Latest spectrum for the polling getter; fully replaced per window
    pub spectrum_snapshot: Arc<Mutex<Option<SpectrumFrame>>>,
    pub shutdown: Arc<AtomicBool>,
}

struct AnalysisWorker {
    channels: AnalysisThreadChannels,
    ctx: AnalysisContext,
    sample_rate: u32,
    accumulator: CircularBuffer<i16>,
    window_scratch: Vec<i16>,
    processor: WindowProcessor,
    processed_samples: u64,
}

impl AnalysisWorker {
    fn new(
        channels: AnalysisThreadChannels,
        sample_rate: u32,
        window_size: usize,
        spectral_config: SpectralConfig,
        spike_config: SpikeConfig,
        ctx: AnalysisContext,
    ) -> Self {
        Self {
            channels,
            ctx,
            sample_rate,
            // Headroom for a few capture buffers; if the worker falls
            // behind, the oldest samples are overwritten (keep-latest)
            accumulator: CircularBuffer::new(window_size * 4),
            window_scratch: vec![0; window_size],
            processor: WindowProcessor::new(sample_rate, window_size, spectral_config, spike_config),
            processed_samples: 0,
        }
    }

    fn run(mut self) {
        tracing::info!("[AnalysisThread] Starting analysis loop");

        loop {
            let buffer = match self.channels.data_consumer.pop() {
                Ok(buffer) => buffer,
                Err(PopError::Empty) => {
                    // Check the shutdown flag only once the queue drained
                    if self.ctx.shutdown.load(Ordering::SeqCst) {
                        tracing::info!(
                            "[AnalysisThread] Shutdown flag set and queue empty, exiting"
                        );
                        break;
                    }
                    thread::sleep(std::time::Duration::from_millis(1));
                    continue;
                }
            };

            self.accumulator.extend_from_slice(&buffer);
            let occupancy =
                self.accumulator.len() as f32 / self.accumulator.capacity() as f32 * 100.0;
            telemetry::hub().record_buffer_occupancy("window_accumulator", occupancy);

            // Return the buffer to the pool immediately
            if self.channels.pool_producer.push(buffer).is_err() {
                tracing::warn!("[AnalysisThread] Pool queue full, dropping buffer");
            }

            let window_size = self.processor.window_size();
            while self.accumulator.len() >= window_size {
                let started = Instant::now();

                self.accumulator.peek_into(&mut self.window_scratch);
                self.accumulator.consume(window_size);
                self.processed_samples += window_size as u64;
                let timestamp_ms = self.processed_samples * 1000 / self.sample_rate as u64;

                match self.processor.process(&self.window_scratch, timestamp_ms) {
                    Ok(output) => self.publish(output),
                    Err(err) => {
                        tracing::warn!("[AnalysisThread] Window dropped: {err:#}");
                    }
                }

                telemetry::hub().record_window_latency(started.elapsed());
            }
        }
    }

    fn publish(&self, output: WindowOutput) {
        {
            let mut snapshot = self
                .ctx
                .spectrum_snapshot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *snapshot = Some(output.spectrum.clone());
        }
        let _ = self.ctx.spectrum_tx.send(output.spectrum);

        for anomaly in output.anomalies {
            let assessment = self.ctx.fusion.update_audio(anomaly.intensity);
            self.ctx.anomaly_log.record(anomaly.clone());
            let _ = self.ctx.anomaly_tx.send(anomaly);
            let _ = self.ctx.threat_tx.send(assessment);
        }
    }
}

/// Spawn the dedicated analysis thread.
///
/// The thread exits once the shutdown flag is set and the data queue
/// has drained.
pub fn spawn_analysis_thread(
    channels: AnalysisThreadChannels,
    sample_rate: u32,
    window_size: usize,
    spectral_config: SpectralConfig,
    spike_config: SpikeConfig,
    ctx: AnalysisContext,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let worker = AnalysisWorker::new(
            channels,
            sample_rate,
            window_size,
            spectral_config,
            spike_config,
            ctx,
        );
        worker.run();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;
    use crate::events::AnomalySource;

    const SAMPLE_RATE: u32 = 44100;
    const WINDOW: usize = 2048;

    fn processor() -> WindowProcessor {
        WindowProcessor::new(
            SAMPLE_RATE,
            WINDOW,
            SpectralConfig::default(),
            SpikeConfig::default(),
        )
    }

    fn sine_i16(frequency_hz: f32, amplitude: f32) -> Vec<i16> {
        (0..WINDOW)
            .map(|i| {
                (amplitude
                    * (2.0 * std::f32::consts::PI * frequency_hz * i as f32 / SAMPLE_RATE as f32)
                        .sin()) as i16
            })
            .collect()
    }

    #[test]
    fn test_low_tone_yields_frequency_anomaly() {
        let mut processor = processor();
        let output = processor.process(&sine_i16(50.0, 16000.0), 46).unwrap();

        assert_eq!(output.spectrum.magnitudes.len(), WINDOW / 2);
        assert_eq!(output.spectrum.timestamp_ms, 46);
        assert_eq!(output.anomalies.len(), 1);
        match &output.anomalies[0].source {
            AnomalySource::Audio {
                kind, frequency_hz, ..
            } => {
                assert_eq!(*kind, AudioAnomalyKind::Frequency);
                let reported = frequency_hz.expect("frequency attached");
                assert!((reported - 50.0).abs() <= output.spectrum.bin_hz);
            }
            _ => panic!("expected audio anomaly"),
        }
    }

    #[test]
    fn test_silence_yields_spectrum_only() {
        let mut processor = processor();
        let output = processor.process(&vec![0_i16; WINDOW], 0).unwrap();
        assert!(output.anomalies.is_empty());
        assert_eq!(output.spectrum.magnitudes.len(), WINDOW / 2);
    }

    #[test]
    fn test_loudness_jump_yields_spike_anomaly() {
        let mut processor = processor();
        // Bin-centered mid-band tone: inaudible to the frequency scan,
        // so only the spike detector reacts to the jump
        let bin_hz = SAMPLE_RATE as f32 / WINDOW as f32;
        let quiet = sine_i16(46.0 * bin_hz, 100.0);
        let loud = sine_i16(46.0 * bin_hz, 20000.0);

        for _ in 0..5 {
            let output = processor.process(&quiet, 0).unwrap();
            assert!(output.anomalies.is_empty());
        }
        let output = processor.process(&loud, 0).unwrap();
        assert_eq!(output.anomalies.len(), 1);
        match &output.anomalies[0].source {
            AnomalySource::Audio {
                kind,
                frequency_hz,
                amplitude_db,
            } => {
                assert_eq!(*kind, AudioAnomalyKind::Spike);
                assert_eq!(*frequency_hz, None);
                assert!(amplitude_db.is_some());
            }
            _ => panic!("expected audio anomaly"),
        }
        assert!(output.anomalies[0].intensity > 0.0);
    }

    #[test]
    fn test_both_detectors_can_fire_on_one_window() {
        let mut processor = processor();
        // Quiet history, then a loud low-frequency tone: out-of-band
        // energy and a loudness jump at once
        let quiet = sine_i16(990.0, 100.0);
        for _ in 0..5 {
            processor.process(&quiet, 0).unwrap();
        }
        let output = processor.process(&sine_i16(50.0, 20000.0), 0).unwrap();
        assert_eq!(output.anomalies.len(), 2);
    }

    #[test]
    fn test_wrong_window_length_is_an_error() {
        let mut processor = processor();
        let err = processor.process(&vec![0_i16; WINDOW - 1], 0);
        assert!(err.is_err());
    }

    #[test]
    fn test_window_size_comes_from_config() {
        let audio = AudioConfig::default();
        let processor = WindowProcessor::new(
            audio.sample_rate,
            audio.window_size,
            SpectralConfig::default(),
            SpikeConfig::default(),
        );
        assert_eq!(processor.window_size(), 2048);
    }
}

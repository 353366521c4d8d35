//! CPAL-based microphone backend for desktop platforms.
//!
//! The cpal stream is not `Send`, so the stream is built and owned by a
//! dedicated capture thread: its only job is to move samples from the
//! device callback into pool buffers and push them onto the lock-free
//! data queue. Window analysis runs on the separate analysis thread.

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::analysis::spawn_analysis_thread;
use crate::buffer::{BufferPool, CaptureThreadChannels};
use crate::error::{log_audio_error, AudioError};

use super::{join_with_timeout, CaptureBackend, StartContext};

/// How long start() waits for the capture thread to open the device.
const STREAM_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long stop() waits for each worker thread to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct RunningCapture {
    capture: JoinHandle<()>,
    analysis: JoinHandle<()>,
}

/// Desktop microphone backend using the default cpal input device.
pub struct CpalBackend {
    running: Mutex<Option<RunningCapture>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(None),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for CpalBackend {
    fn start(&self, ctx: StartContext) -> Result<(), AudioError> {
        let mut guard = self.running.lock().map_err(|_| AudioError::LockPoisoned {
            component: "cpal_backend".to_string(),
        })?;
        if guard.is_some() {
            let err = AudioError::AlreadyRunning;
            log_audio_error(&err, "start_capture");
            return Err(err);
        }

        let audio = ctx.config.audio.clone();
        let channels = BufferPool::new(audio.buffer_pool_size, audio.buffer_size);
        let (capture_half, analysis_half) = channels.split_for_threads();

        let shutdown = ctx.shutdown();
        let capture_shutdown = ctx.shutdown();

        // The capture thread reports the actual device sample rate back
        // once the stream opens, or the open error if it cannot.
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32, AudioError>>(1);

        let capture = thread::spawn(move || {
            let (stream, sample_rate) = match build_input_stream(capture_half) {
                Ok(parts) => parts,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::HardwareError {
                    details: format!("Input start failed: {}", err),
                }));
                return;
            }

            let _ = ready_tx.send(Ok(sample_rate));
            tracing::info!("[CaptureThread] Input stream running at {} Hz", sample_rate);

            // The stream lives on this thread; park until teardown
            while !capture_shutdown.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(10));
            }

            drop(stream);
            tracing::info!("[CaptureThread] Input stream released");
        });

        let sample_rate = match ready_rx.recv_timeout(STREAM_OPEN_TIMEOUT) {
            Ok(Ok(rate)) => rate,
            Ok(Err(err)) => {
                log_audio_error(&err, "start_capture");
                shutdown.store(true, Ordering::SeqCst);
                join_with_timeout(capture, JOIN_TIMEOUT, "capture thread");
                return Err(err);
            }
            Err(_) => {
                let err = AudioError::StreamOpenFailed {
                    reason: "Timed out waiting for capture thread".to_string(),
                };
                log_audio_error(&err, "start_capture");
                shutdown.store(true, Ordering::SeqCst);
                join_with_timeout(capture, JOIN_TIMEOUT, "capture thread");
                return Err(err);
            }
        };

        if sample_rate != audio.sample_rate {
            tracing::warn!(
                "[CpalBackend] Device runs at {} Hz, configured for {} Hz; using device rate",
                sample_rate,
                audio.sample_rate
            );
        }

        let analysis = spawn_analysis_thread(
            analysis_half,
            sample_rate,
            audio.window_size,
            ctx.config.spectral.clone(),
            ctx.config.spike.clone(),
            ctx.analysis,
        );

        *guard = Some(RunningCapture { capture, analysis });
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        let mut guard = self.running.lock().map_err(|_| AudioError::LockPoisoned {
            component: "cpal_backend".to_string(),
        })?;

        // Idempotent: stopping a stopped backend is a no-op
        let Some(running) = guard.take() else {
            return Ok(());
        };

        // The engine set the shutdown flag before calling; both threads
        // observe it and exit
        join_with_timeout(running.capture, JOIN_TIMEOUT, "capture thread");
        join_with_timeout(running.analysis, JOIN_TIMEOUT, "analysis thread");
        Ok(())
    }
}

/// Open the default input device and wire its callback to the pool.
///
/// Returns the live stream plus the device sample rate.
fn build_input_stream(
    mut channels: CaptureThreadChannels,
) -> Result<(cpal::Stream, u32), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default input device found".to_string(),
        })?;

    let config = device
        .default_input_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default input config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = config.clone().into();
    let sample_rate = stream_config.sample_rate.0;
    let channels_count = stream_config.channels as usize;

    let err_fn = |err| tracing::error!("[CaptureThread] Input stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                forward_samples(&mut channels, data.iter().step_by(channels_count).copied());
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward_samples(
                    &mut channels,
                    data.iter()
                        .step_by(channels_count)
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                );
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::StreamOpenFailed {
                reason: format!("Unsupported input sample format {:?}", other),
            })
        }
    }
    .map_err(|e| AudioError::StreamOpenFailed {
        reason: format!("{:?}", e),
    })?;

    Ok((stream, sample_rate))
}

/// Move one callback's worth of mono samples into a pool buffer.
///
/// Runs on the real-time audio callback: no allocation, no locks. When
/// the pool is exhausted the callback drops the data rather than block.
fn forward_samples(
    channels: &mut CaptureThreadChannels,
    samples: impl Iterator<Item = i16>,
) {
    if let Ok(mut buffer) = channels.pool_consumer.pop() {
        buffer.clear();
        buffer.extend(samples);
        let _ = channels.data_producer.push(buffer);
    }
}

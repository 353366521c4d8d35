//! Deterministic stub backend for tests and CLI tooling.
//!
//! Feeds a pre-recorded sample buffer through the same lock-free pool
//! and analysis thread the real microphone path uses, so the full audio
//! pipeline can run without hardware.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::analysis::spawn_analysis_thread;
use crate::buffer::BufferPool;
use crate::error::AudioError;

use super::{join_with_timeout, CaptureBackend, StartContext, TimeSource};

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct RunningStub {
    feeder: JoinHandle<()>,
    analysis: JoinHandle<()>,
}

/// Capture backend that replays canned samples instead of a microphone.
pub struct StubBackend {
    sample_rate: u32,
    samples: Arc<Vec<i16>>,
    /// Keep replaying the sample buffer until stopped
    looped: bool,
    running: Mutex<Option<RunningStub>>,
}

impl StubBackend {
    /// Replay `samples` once, then go quiet until stopped.
    pub fn with_samples(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            samples: Arc::new(samples),
            looped: false,
            running: Mutex::new(None),
        }
    }

    /// Replay `samples` in a loop until stopped.
    pub fn looping(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            samples: Arc::new(samples),
            looped: true,
            running: Mutex::new(None),
        }
    }

    /// Silent backend: starts the pipeline but feeds nothing.
    pub fn silent(sample_rate: u32) -> Self {
        Self::with_samples(sample_rate, Vec::new())
    }
}

impl CaptureBackend for StubBackend {
    fn start(&self, ctx: StartContext) -> Result<(), AudioError> {
        let mut guard = self.running.lock().map_err(|_| AudioError::LockPoisoned {
            component: "stub_backend".to_string(),
        })?;
        if guard.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        let audio = ctx.config.audio.clone();
        let channels = BufferPool::new(audio.buffer_pool_size, audio.buffer_size);
        let (mut capture_half, analysis_half) = channels.split_for_threads();

        let shutdown = ctx.shutdown();
        let samples = Arc::clone(&self.samples);
        let chunk_size = audio.buffer_size;
        let looped = self.looped;

        let feeder = thread::spawn(move || {
            let mut offset = 0;
            while !shutdown.load(Ordering::SeqCst) {
                if offset >= samples.len() {
                    if looped && !samples.is_empty() {
                        offset = 0;
                    } else {
                        // Drained: stay alive so the pipeline keeps its
                        // shape until teardown
                        thread::sleep(Duration::from_millis(5));
                        continue;
                    }
                }

                match capture_half.pool_consumer.pop() {
                    Ok(mut buffer) => {
                        let end = (offset + chunk_size).min(samples.len());
                        buffer.clear();
                        buffer.extend_from_slice(&samples[offset..end]);
                        offset = end;
                        let _ = capture_half.data_producer.push(buffer);
                    }
                    Err(_) => {
                        // Pool exhausted; wait for the analysis thread to
                        // recycle a buffer
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            }
        });

        let analysis = spawn_analysis_thread(
            analysis_half,
            self.sample_rate,
            audio.window_size,
            ctx.config.spectral.clone(),
            ctx.config.spike.clone(),
            ctx.analysis,
        );

        *guard = Some(RunningStub { feeder, analysis });
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        let mut guard = self.running.lock().map_err(|_| AudioError::LockPoisoned {
            component: "stub_backend".to_string(),
        })?;

        let Some(running) = guard.take() else {
            return Ok(());
        };

        join_with_timeout(running.feeder, JOIN_TIMEOUT, "stub feeder thread");
        join_with_timeout(running.analysis, JOIN_TIMEOUT, "analysis thread");
        Ok(())
    }
}

/// Deterministic time source for offline runs.
///
/// Each call to `now()` advances by a fixed 10 ms to guarantee
/// monotonic timestamps even when nothing real is producing time.
pub struct StubTimeSource {
    start: Instant,
    offset_ms: std::sync::atomic::AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let ms = self.offset_ms.fetch_add(10, Ordering::SeqCst);
        self.start + Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_time_source_is_monotonic() {
        let source = StubTimeSource::new();
        let a = source.now();
        let b = source.now();
        let c = source.now();
        assert!(b > a);
        assert_eq!(c.duration_since(a), Duration::from_millis(20));
    }

    #[test]
    fn test_stop_without_start_is_a_noop() {
        let backend = StubBackend::silent(44100);
        assert!(backend.stop().is_ok());
    }
}

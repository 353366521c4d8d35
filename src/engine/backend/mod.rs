//! Capture backend abstractions for the engine core.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::analysis::AnalysisContext;
use crate::config::AppConfig;
use crate::error::AudioError;

/// Context provided to capture backends when starting the engine.
///
/// This bundles the configuration snapshot and the shared channels the
/// backend needs to wire the audio pipeline without coupling it to
/// higher-level code.
pub struct StartContext {
    pub config: AppConfig,
    pub analysis: AnalysisContext,
}

impl StartContext {
    /// The teardown flag shared by every thread the backend spawns.
    pub fn shutdown(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.analysis.shutdown)
    }
}

/// Trait implemented by platform-specific microphone backends.
///
/// Each backend owns the capture side of the lock-free buffer pool and
/// the analysis thread it spawns. `stop` must be safe to call when the
/// backend never started (no-op) and must release hardware handles.
pub trait CaptureBackend: Send + Sync {
    fn start(&self, ctx: StartContext) -> Result<(), AudioError>;
    fn stop(&self) -> Result<(), AudioError>;
}

/// Trait representing a monotonic time source used for event timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Join a worker thread with a bounded wait.
///
/// Teardown must not hang on a stuck thread: poll `is_finished` up to
/// the timeout, then either join (finished) or detach with a warning.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(
                "[Backend] {} did not stop within {:?}, detaching",
                name,
                timeout
            );
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        tracing::warn!("[Backend] {} panicked during shutdown", name);
    }
}

mod cpal;
pub use cpal::CpalBackend;

mod stub;
pub use stub::{StubBackend, StubTimeSource};

use std::sync::Arc;

use super::EngineHandle;
use crate::config::AppConfig;
use crate::engine::backend::StubBackend;
use crate::error::AudioError;
use crate::events::VisualAnomalyKind;
use crate::fusion::ThreatLevel;
use crate::vision::LuminancePlane;

fn silent_engine() -> EngineHandle {
    let config = AppConfig::default();
    let backend = Arc::new(StubBackend::silent(config.audio.sample_rate));
    EngineHandle::with_backend(config, backend)
}

#[test]
fn test_stop_before_start_is_a_noop() {
    let engine = silent_engine();
    assert!(engine.stop().is_ok());
    assert!(!engine.is_running());
}

#[test]
fn test_start_stop_lifecycle() {
    let engine = silent_engine();
    assert!(engine.start().is_ok());
    assert!(engine.is_running());

    assert!(engine.stop().is_ok());
    assert!(!engine.is_running());

    // Stop again: still a no-op
    assert!(engine.stop().is_ok());
}

#[test]
fn test_double_start_is_rejected() {
    let engine = silent_engine();
    engine.start().expect("first start");
    match engine.start() {
        Err(AudioError::AlreadyRunning) => {}
        other => panic!("Expected AlreadyRunning, got {:?}", other),
    }
    engine.stop().expect("stop");
}

#[test]
fn test_restart_after_stop() {
    let engine = silent_engine();
    engine.start().expect("first start");
    engine.stop().expect("stop");
    engine.start().expect("second start");
    engine.stop().expect("second stop");
}

#[test]
fn test_process_frame_reports_motion_and_updates_threat() {
    let engine = silent_engine();

    let dark = vec![10_u8; 64];
    let bright = vec![60_u8; 64];

    assert!(engine
        .process_frame(&LuminancePlane::packed(&dark, 8, 8))
        .is_none());
    let anomaly = engine
        .process_frame(&LuminancePlane::packed(&bright, 8, 8))
        .expect("full-frame change must fire");

    assert!(anomaly.is_visual());
    match &anomaly.source {
        crate::events::AnomalySource::Visual { kind, region } => {
            assert_eq!(*kind, VisualAnomalyKind::Motion);
            assert_eq!(*region, None);
        }
        _ => panic!("expected visual anomaly"),
    }
    assert_eq!(anomaly.intensity, 1.0);

    // One full-intensity visual anomaly: raw composite 60
    let threat = engine.current_threat();
    assert!((threat.score - 60.0).abs() < 1e-3);
    assert_eq!(threat.level, ThreatLevel::Medium);

    let recent = engine.recent_anomalies();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0], anomaly);
}

#[test]
fn test_bad_frame_is_swallowed() {
    let engine = silent_engine();
    let short = vec![0_u8; 3];
    // Declared 8x8 but only 3 bytes: logged and treated as no anomaly
    assert!(engine
        .process_frame(&LuminancePlane::packed(&short, 8, 8))
        .is_none());
}

#[test]
fn test_stop_resets_state() {
    let engine = silent_engine();
    engine.start().expect("start");

    let dark = vec![10_u8; 64];
    let bright = vec![60_u8; 64];
    engine.process_frame(&LuminancePlane::packed(&dark, 8, 8));
    engine.process_frame(&LuminancePlane::packed(&bright, 8, 8));
    assert!(!engine.recent_anomalies().is_empty());

    engine.stop().expect("stop");

    assert!(engine.recent_anomalies().is_empty());
    assert_eq!(engine.current_threat().score, 0.0);
    assert!(engine.latest_spectrum().is_none());

    // Baseline frame was dropped too: the next frame is a first frame
    assert!(engine
        .process_frame(&LuminancePlane::packed(&bright, 8, 8))
        .is_none());
}

#[test]
fn test_latest_spectrum_empty_before_audio() {
    let engine = silent_engine();
    assert!(engine.latest_spectrum().is_none());
}

#[test]
fn test_engine_events() {
    let engine = silent_engine();
    let mut rx = engine.subscribe_engine_events();

    engine.start().expect("start");
    engine.stop().expect("stop");

    let first = rx.try_recv().expect("start event");
    assert!(matches!(first.kind, super::EngineEventKind::EngineStarted));
    let second = rx.try_recv().expect("stop event");
    assert!(matches!(second.kind, super::EngineEventKind::EngineStopped));
}

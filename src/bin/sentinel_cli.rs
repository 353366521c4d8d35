use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use sentinel_core::config::AppConfig;
use sentinel_core::fixtures::{self, FrameSequence, OfflineProcessor, OfflineReport};
use sentinel_core::{telemetry, EngineHandle};

#[derive(Parser, Debug)]
#[command(
    name = "sentinel_cli",
    about = "Deterministic sensor-fusion harness for Sentinel Core"
)]
struct Cli {
    /// Override path to a JSON config file (defaults to built-in values)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a WAV file through the audio detection chain
    Analyze {
        #[arg(long)]
        wav: PathBuf,
        /// Write the JSON report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a named synthetic scenario through both modalities
    Synth {
        #[arg(long, value_enum, default_value_t = Scenario::Hum)]
        scenario: Scenario,
        #[arg(long, default_value_t = 3)]
        seconds: u32,
    },
    /// Run the live engine against the default microphone
    Live {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// Near-silence: nothing should fire
    Quiet,
    /// Sub-100 Hz mains-style hum
    Hum,
    /// Quiet noise floor broken by a loud burst
    Spike,
    /// Moving subject plus loud bursts
    Intruder,
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quiet => write!(f, "quiet"),
            Self::Hum => write!(f, "hum"),
            Self::Spike => write!(f, "spike"),
            Self::Intruder => write!(f, "intruder"),
        }
    }
}

fn main() -> ExitCode {
    sentinel_core::init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Analyze { wav, output } => run_analyze(config, &wav, output),
        Commands::Synth { scenario, seconds } => run_synth(config, scenario, seconds),
        Commands::Live { seconds } => run_live(config, seconds),
    }
}

fn run_analyze(config: AppConfig, wav: &PathBuf, output: Option<PathBuf>) -> Result<ExitCode> {
    let (sample_rate, samples) =
        fixtures::load_wav(wav).with_context(|| format!("loading {}", wav.display()))?;

    let processor = OfflineProcessor::new(config);
    let report = processor
        .run_audio(sample_rate, &samples)
        .with_context(|| format!("processing {}", wav.display()))?;

    emit_report(
        &wav.display().to_string(),
        sample_rate,
        &report,
        output,
    )?;
    Ok(ExitCode::from(0))
}

fn run_synth(config: AppConfig, scenario: Scenario, seconds: u32) -> Result<ExitCode> {
    let sample_rate = config.audio.sample_rate;
    let total = (sample_rate as usize) * seconds.max(1) as usize;

    let (samples, frames) = build_scenario(scenario, sample_rate, total);
    let processor = OfflineProcessor::new(config);
    let report = processor.run(sample_rate, &samples, frames.as_ref())?;

    emit_report(&format!("{:?}", scenario), sample_rate, &report, None)?;
    Ok(ExitCode::from(0))
}

fn build_scenario(
    scenario: Scenario,
    sample_rate: u32,
    total_samples: usize,
) -> (Vec<i16>, Option<FrameSequence>) {
    match scenario {
        Scenario::Quiet => (fixtures::white_noise(0.00005, total_samples, 3), None),
        Scenario::Hum => (
            fixtures::sine_wave(sample_rate, 60.0, 0.4, total_samples),
            None,
        ),
        Scenario::Spike => (
            fixtures::amplitude_burst(0.002, 0.8, total_samples * 3 / 4, total_samples / 4),
            None,
        ),
        Scenario::Intruder => {
            let samples =
                fixtures::amplitude_burst(0.002, 0.6, total_samples / 2, total_samples / 2);
            let frames = fixtures::moving_block_frames(64, 48, 12);
            (samples, Some(frames))
        }
    }
}

fn run_live(config: AppConfig, seconds: u64) -> Result<ExitCode> {
    let engine = EngineHandle::from_config(config);
    engine.start().context("starting capture engine")?;
    println!("Listening for {seconds} s; Ctrl-C to abort.");

    let mut threat_rx = engine.subscribe_threat();
    let mut anomaly_rx = engine.subscribe_anomalies();
    let deadline = Instant::now() + Duration::from_secs(seconds);

    while Instant::now() < deadline {
        while let Ok(anomaly) = anomaly_rx.try_recv() {
            println!("{}", serde_json::to_string(&anomaly)?);
        }
        match threat_rx.try_recv() {
            Ok(assessment) => {
                println!(
                    "threat {:>6.2} [{}] t={} ms",
                    assessment.score, assessment.level, assessment.timestamp_ms
                );
            }
            Err(_) => std::thread::sleep(Duration::from_millis(50)),
        }
    }

    engine.stop().context("stopping capture engine")?;
    Ok(ExitCode::from(0))
}

fn emit_report(
    source: &str,
    sample_rate: u32,
    report: &OfflineReport,
    output_path: Option<PathBuf>,
) -> Result<()> {
    let payload = ReportPayload {
        source,
        sample_rate,
        report,
        telemetry: telemetry::hub().collector().snapshot(),
    };
    let json = serde_json::to_string_pretty(&payload)?;

    if let Some(path) = output_path {
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    Ok(())
}

#[derive(Serialize)]
struct ReportPayload<'a> {
    source: &'a str,
    sample_rate: u32,
    report: &'a OfflineReport,
    telemetry: telemetry::TelemetrySnapshot,
}

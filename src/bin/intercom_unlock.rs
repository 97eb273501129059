use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use intercom_unlock::actuator::ServoAngle;
use intercom_unlock::analysis::FrequencyAnalyzer;
use intercom_unlock::app::{build_actuator, App};
use intercom_unlock::audio::{frame_duration, FrameSource, WavSource};
use intercom_unlock::clock::ManualClock;
use intercom_unlock::config::AppConfig;
use intercom_unlock::detection::{DetectionState, DetectionStateMachine, Tick};
use intercom_unlock::error::AudioError;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "intercom-unlock",
    about = "Intercom chime detector with one-time door unlock links"
)]
struct Cli {
    /// Configuration file (JSON). Missing file means defaults.
    #[arg(long, short, global = true, default_value = "intercom.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run detection and the HTTP server until Ctrl-C
    Serve,
    /// Replay a recording through the detector and report as JSON lines
    Analyze {
        #[arg(long)]
        wav: PathBuf,
        /// Wall-clock time of the first frame (HH:MM), for quiet windows
        #[arg(long, default_value = "12:00")]
        start: String,
        /// Also print the per-tone energies of every frame
        #[arg(long)]
        frames: bool,
    },
    /// Move the configured actuator once, for calibration
    Servo {
        #[arg(long)]
        angle: i32,
    },
    /// Print configuration as JSON
    Config {
        /// Print built-in defaults instead of the loaded file
        #[arg(long)]
        print_default: bool,
    },
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("intercom_unlock=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => run_serve(&cli.config),
        Commands::Analyze { wav, start, frames } => {
            run_analyze(&load_config(&cli.config)?, &wav, &start, frames)
        }
        Commands::Servo { angle } => run_servo(&load_config(&cli.config)?, angle),
        Commands::Config { print_default } => {
            let config = if print_default {
                AppConfig::default()
            } else {
                load_config(&cli.config)?
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    config.apply_env_overrides();
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn run_serve(path: &Path) -> Result<ExitCode> {
    let config = load_config(path)?;
    let app = App::new(config).context("building application")?;
    app.run()?;
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum AnalyzeLine {
    Frame {
        index: u64,
        time_ms: u64,
        state: DetectionState,
        energies: Vec<f32>,
    },
    Transition {
        index: u64,
        time_ms: u64,
        from: DetectionState,
        to: DetectionState,
    },
    Confirmed {
        index: u64,
        time_ms: u64,
        wall: String,
        sustained_ms: u64,
        peak_energy: f32,
    },
    Summary {
        frames: u64,
        skipped: u64,
        confirmations: u64,
        sample_rate: u32,
        frame_len: usize,
    },
}

fn emit(line: &AnalyzeLine) -> Result<()> {
    println!("{}", serde_json::to_string(line)?);
    Ok(())
}

fn run_analyze(config: &AppConfig, wav: &Path, start: &str, frames: bool) -> Result<ExitCode> {
    let start = NaiveTime::parse_from_str(start, "%H:%M")
        .with_context(|| format!("parsing --start '{}' as HH:MM", start))?;

    let source = WavSource::open(wav, config.audio.frame_len)
        .with_context(|| format!("opening {}", wav.display()))?;

    // Keep the configured frame duration whatever the recording's rate is
    let frame_secs = config.audio.frame_len as f64 / config.audio.sample_rate as f64;
    let frame_len = ((source.sample_rate() as f64 * frame_secs).round() as usize).max(2);
    let mut source = source.with_frame_len(frame_len);

    let analyzer = FrequencyAnalyzer::new(
        source.sample_rate(),
        frame_len,
        config.detection.tones.clone(),
    )
    .context("building analyzer for this recording")?;
    let step = frame_duration(frame_len, source.sample_rate());
    let mut machine = DetectionStateMachine::new(config.detection.clone(), step);

    let clock = ManualClock::new(chrono::Local::now().date_naive().and_time(start));
    let (mut index, mut skipped, mut confirmations) = (0u64, 0u64, 0u64);

    loop {
        let report = match source.next_frame() {
            Ok(frame) => match analyzer.analyze(&frame) {
                Ok(report) => Some(report),
                Err(err) => {
                    tracing::warn!("[Analyze] Frame {} skipped: {}", index, err);
                    skipped += 1;
                    None
                }
            },
            Err(AudioError::EndOfStream) => break,
            Err(err) => return Err(err).context("reading frame"),
        };

        let time_ms = clock.elapsed().as_millis() as u64;
        let before = machine.state();
        let event = machine.advance(report.as_ref(), Tick::from_clock(&clock));
        let after = machine.state();

        if frames {
            emit(&AnalyzeLine::Frame {
                index,
                time_ms,
                state: after,
                energies: report.as_ref().map(|r| r.energies().collect()).unwrap_or_default(),
            })?;
        }
        if let Some(event) = event {
            confirmations += 1;
            emit(&AnalyzeLine::Confirmed {
                index,
                time_ms,
                wall: event.wall.format("%H:%M:%S%.3f").to_string(),
                sustained_ms: event.sustained.as_millis() as u64,
                peak_energy: event.peak_energy,
            })?;
        } else if before != after {
            emit(&AnalyzeLine::Transition {
                index,
                time_ms,
                from: before,
                to: after,
            })?;
        }

        clock.advance(step);
        index += 1;
    }

    emit(&AnalyzeLine::Summary {
        frames: index,
        skipped,
        confirmations,
        sample_rate: source.sample_rate(),
        frame_len,
    })?;
    Ok(ExitCode::from(0))
}

fn run_servo(config: &AppConfig, angle: i32) -> Result<ExitCode> {
    let angle = ServoAngle::new(angle).context("validating --angle")?;
    let actuator = build_actuator(&config.unlock.actuator);
    actuator
        .move_to(angle)
        .with_context(|| format!("moving servo to {}", angle))?;
    tracing::info!("[Servo] Moved to {}", angle);
    Ok(ExitCode::from(0))
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use playrec::{
    list_devices, AudioFile, Config, CpalHost, DeviceChoice, PlaybackBackend, Player, Recorder,
    Session, SessionConfig, SpectrogramExporter, StopSignal,
};
use playrec::audio::AudioHost;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "playrec", version, about = "Play a file, record it back, render its spectrogram")]
struct Cli {
    /// Configuration file (TOML); missing files fall back to defaults
    #[arg(long, default_value = "config/playrec.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List playback and recording devices
    Devices,

    /// Play an audio file
    Play {
        file: PathBuf,
        /// Output device name (system default when omitted)
        #[arg(long)]
        device: Option<String>,
    },

    /// Record from an input device into a WAV file
    Record {
        #[arg(long, default_value_t = 5.0)]
        duration: f64,
        #[arg(long)]
        prefix: Option<String>,
        /// Input device name (system default when omitted)
        #[arg(long)]
        device: Option<String>,
    },

    /// Render the mel spectrogram of an audio file as PNG
    Spectrogram {
        file: PathBuf,
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Play a file on one device while recording from another
    Session {
        file: PathBuf,
        #[arg(long)]
        playback_device: String,
        #[arg(long)]
        recording_device: String,
    },
}

fn device_choice(name: Option<String>) -> DeviceChoice {
    match name {
        Some(name) => DeviceChoice::Named(name),
        None => DeviceChoice::SystemDefault,
    }
}

/// Trigger `stop` on Ctrl-C
fn stop_on_ctrl_c(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            stop.trigger();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cfg = Config::load(&cli.config)?;
    info!("playrec v{}", env!("CARGO_PKG_VERSION"));
    info!("Output directory: {}", cfg.output.dir.display());

    let host = CpalHost::new(
        cfg.playback.queue_depth,
        Duration::from_millis(cfg.playback.drain_timeout_ms),
    );

    match cli.command {
        Command::Devices => {
            let catalog = list_devices(&host);
            println!("Playback devices:");
            for name in catalog.playback_names() {
                println!("  {}", name);
            }
            println!("Recording devices:");
            for name in catalog.recording_names() {
                println!("  {}", name);
            }
        }

        Command::Play { file, device } => {
            let audio = AudioFile::open(&file)?;
            info!(
                "{}: {:.2}s, {}Hz, {} ch",
                file.display(),
                audio.duration_seconds,
                audio.sample_rate,
                audio.channels
            );

            let mut backend: Box<dyn PlaybackBackend> =
                host.playback_backend(&device_choice(device))?;
            let stop = StopSignal::new();
            stop_on_ctrl_c(stop.clone());

            let report = Player::new(cfg.playback_config())
                .play(&file, backend.as_mut(), &stop)
                .await?;
            info!(
                "Played {} of {} frames",
                report.frames_played, report.total_frames
            );
        }

        Command::Record {
            duration,
            prefix,
            device,
        } => {
            let capture = cfg.capture_config();
            let mut backend = host.capture_backend(&device_choice(device), capture.spec)?;
            let stop = StopSignal::new();
            stop_on_ctrl_c(stop.clone());

            let prefix = prefix.unwrap_or_else(|| cfg.output.recording_prefix.clone());
            let recording = Recorder::new(capture)?
                .record(&prefix, duration, backend.as_mut(), &stop)
                .await?;
            println!("{}", serde_json::to_string_pretty(&recording)?);
        }

        Command::Spectrogram { file, prefix } => {
            let exporter = SpectrogramExporter::new(cfg.spectrogram.clone(), &cfg.output.dir)?;
            let prefix = prefix.unwrap_or_else(|| cfg.output.spectrogram_prefix.clone());
            let path = exporter.export(&file, &prefix)?;
            println!("{}", path.display());
        }

        Command::Session {
            file,
            playback_device,
            recording_device,
        } => {
            let session = Arc::new(Session::new(
                SessionConfig::from_config(&cfg),
                Arc::new(host),
            ));
            session
                .import(&file)
                .await
                .with_context(|| format!("Failed to import {}", file.display()))?;
            session
                .select_playback_device(DeviceChoice::Named(playback_device))
                .await?;
            session
                .select_recording_device(DeviceChoice::Named(recording_device))
                .await?;
            session.start().await?;

            let interrupter = Arc::clone(&session);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, stopping");
                    if let Err(e) = interrupter.interrupt().await {
                        warn!("Failed to stop session: {}", e);
                    }
                }
            });

            let report = session.wait().await?;

            for error in &report.errors {
                warn!("{}", error);
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

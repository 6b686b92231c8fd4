use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::{CaptureConfig, PlaybackConfig, StreamSpec};
use crate::spectrogram::SpectrogramConfig;

/// Prefix for environment overrides, e.g. `PLAYREC__OUTPUT__DIR=/tmp/rec`
const ENV_PREFIX: &str = "PLAYREC";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub capture: CaptureSettings,
    pub playback: PlaybackSettings,
    pub spectrogram: SpectrogramConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving recordings and spectrogram images
    pub dir: PathBuf,
    pub recording_prefix: String,
    pub spectrogram_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("recordings"),
            recording_prefix: "MyRecording".to_string(),
            spectrogram_prefix: "MySpectrogram".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_size: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let spec = StreamSpec::capture_default();
        Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            chunk_size: spec.chunk_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Frames per chunk handed to the output device
    pub chunk_frames: usize,
    /// Chunks that may be queued ahead of the device
    pub queue_depth: usize,
    /// How long to wait for queued audio to finish playing
    pub drain_timeout_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        let defaults = PlaybackConfig::default();
        Self {
            chunk_frames: defaults.chunk_frames,
            queue_depth: defaults.queue_depth,
            drain_timeout_ms: defaults.drain_timeout_ms,
        }
    }
}

impl Config {
    /// Load configuration: built-in defaults, then the optional file at `path`
    /// (any extension the `config` crate understands), then `PLAYREC__*`
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            output_dir: self.output.dir.clone(),
            spec: StreamSpec {
                sample_rate: self.capture.sample_rate,
                channels: self.capture.channels,
                chunk_size: self.capture.chunk_size,
                ..StreamSpec::capture_default()
            },
        }
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            chunk_frames: self.playback.chunk_frames,
            queue_depth: self.playback.queue_depth,
            drain_timeout_ms: self.playback.drain_timeout_ms,
        }
    }
}

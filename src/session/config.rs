use std::path::PathBuf;

use crate::audio::{CaptureConfig, PlaybackConfig, StreamSpec};
use crate::config::Config;
use crate::spectrogram::SpectrogramConfig;

/// Configuration for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier, used in logs
    pub session_id: String,

    /// Directory receiving the recording and the spectrogram
    pub output_dir: PathBuf,

    /// Fixed capture format (44.1kHz mono 16-bit, 1024-sample chunks)
    pub capture_spec: StreamSpec,

    pub playback: PlaybackConfig,

    pub spectrogram: SpectrogramConfig,

    /// Filename prefix for recordings
    pub recording_prefix: String,

    /// Filename prefix for spectrogram images
    pub spectrogram_prefix: String,
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        let capture = cfg.capture_config();
        Self {
            output_dir: capture.output_dir,
            capture_spec: capture.spec,
            playback: cfg.playback_config(),
            spectrogram: cfg.spectrogram.clone(),
            recording_prefix: cfg.output.recording_prefix.clone(),
            spectrogram_prefix: cfg.output.spectrogram_prefix.clone(),
            ..Self::default()
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            output_dir: self.output_dir.clone(),
            spec: self.capture_spec,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            output_dir: PathBuf::from("recordings"),
            capture_spec: StreamSpec::capture_default(),
            playback: PlaybackConfig::default(),
            spectrogram: SpectrogramConfig::default(),
            recording_prefix: "MyRecording".to_string(),
            spectrogram_prefix: "MySpectrogram".to_string(),
        }
    }
}

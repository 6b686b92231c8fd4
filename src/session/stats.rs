use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use super::state::SessionState;
use crate::audio::Recording;

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// Imported playback source, if any
    pub imported_file: Option<PathBuf>,

    /// Duration of the imported file in seconds
    pub expected_duration_secs: Option<f64>,

    pub playback_device: String,

    pub recording_device: String,

    /// When the current (or last) run started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub elapsed_secs: f64,
}

/// Outcome of one run, returned by `wait` and `stop`
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,

    pub state: SessionState,

    /// Target capture duration in seconds
    pub duration_secs: f64,

    pub recording: Option<Recording>,

    pub spectrogram: Option<PathBuf>,

    /// Frames the output device accepted
    pub frames_played: Option<usize>,

    /// Stop was requested before the run finished on its own
    pub stopped_early: bool,

    /// Engine failures, as user-visible messages
    pub errors: Vec<String>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.state == SessionState::Complete
    }
}

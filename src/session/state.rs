use serde::Serialize;

/// Session lifecycle
///
/// ```text
/// Idle --import--> Armed --start--> Running --capture+export done--> Complete
///                    ^                  |                               |
///                    |                  +--capture failed--> Failed     |
///                    +----------------- start again <-------------------+
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No file imported
    #[default]
    Idle,
    /// File imported, waiting for start
    Armed,
    /// Playback and capture launched
    Running,
    /// Recording written and spectrogram exported
    Complete,
    /// Capture or export failed
    Failed { reason: String },
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// States from which a new run may be started (given its preconditions)
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Armed | Self::Complete | Self::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed { .. } => "failed",
        }
    }
}

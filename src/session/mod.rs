//! Session control
//!
//! This module provides the `Session` abstraction that manages:
//! - The imported playback source and its duration
//! - Playback and recording device selection
//! - Concurrent playback and capture tasks with cooperative stop
//! - Spectrogram export once capture finishes
//! - Session state and statistics

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::{Session, NOT_RUNNING_MESSAGE, START_REJECTED_MESSAGE};
pub use state::SessionState;
pub use stats::{SessionReport, SessionStats};

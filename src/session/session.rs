use super::config::SessionConfig;
use super::state::SessionState;
use super::stats::{SessionReport, SessionStats};
use crate::audio::{
    calculate_duration, AudioHost, DeviceChoice, PlaybackReport, Player, Recorder, Recording,
    StopSignal,
};
use crate::error::{AudioError, AudioResult};
use crate::spectrogram::SpectrogramExporter;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// User-visible message when `start` is missing its inputs
pub const START_REJECTED_MESSAGE: &str =
    "Please select both playback and recording devices and import an audio file.";

/// User-visible message when `stop` finds nothing to stop
pub const NOT_RUNNING_MESSAGE: &str = "Recording is not in progress";

/// Imported playback source
#[derive(Debug, Clone)]
struct ImportedFile {
    path: PathBuf,
    duration_secs: f64,
}

/// What the capture task hands back
struct CaptureOutcome {
    recording: AudioResult<Recording>,
    spectrogram: Option<AudioResult<PathBuf>>,
}

/// Handles of a launched run
struct RunHandles {
    stop: StopSignal,
    duration_secs: f64,
    playback: JoinHandle<AudioResult<PlaybackReport>>,
    capture: JoinHandle<CaptureOutcome>,
}

/// Everything guarded by the session lock
#[derive(Default)]
struct Inner {
    state: SessionState,
    imported: Option<ImportedFile>,
    playback_device: DeviceChoice,
    recording_device: DeviceChoice,
    started_at: Option<DateTime<Utc>>,
    /// Stop signal of the latest run
    stop: Option<StopSignal>,
}

/// A play-and-record session
///
/// Plays the imported file on one device while recording the same duration
/// from another, then renders a spectrogram of the recording.
pub struct Session {
    /// Session configuration
    config: SessionConfig,

    /// Device and backend source
    host: Arc<dyn AudioHost>,

    /// State, inputs and device selection
    inner: Arc<Mutex<Inner>>,

    /// Handles for the playback and capture tasks of the current run
    run: Mutex<Option<RunHandles>>,
}

impl Session {
    pub fn new(config: SessionConfig, host: Arc<dyn AudioHost>) -> Self {
        info!("Creating session: {}", config.session_id);

        Self {
            config,
            host,
            inner: Arc::new(Mutex::new(Inner::default())),
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    /// Import the file to play; its duration bounds the recording
    pub async fn import(&self, path: impl AsRef<Path>) -> AudioResult<f64> {
        let path = path.as_ref();
        let mut inner = self.inner.lock().await;
        if inner.state.is_running() {
            return Err(AudioError::InvalidState(
                "Cannot import a file while recording".to_string(),
            ));
        }

        let duration_secs = calculate_duration(path)?;
        inner.imported = Some(ImportedFile {
            path: path.to_path_buf(),
            duration_secs,
        });
        inner.state = SessionState::Armed;

        info!("Imported audio file: {}", path.display());
        Ok(duration_secs)
    }

    pub async fn select_playback_device(&self, device: DeviceChoice) -> AudioResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_running() {
            return Err(AudioError::InvalidState(
                "Cannot change devices while recording".to_string(),
            ));
        }
        info!("Playback device: {}", device);
        inner.playback_device = device;
        Ok(())
    }

    pub async fn select_recording_device(&self, device: DeviceChoice) -> AudioResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_running() {
            return Err(AudioError::InvalidState(
                "Cannot change devices while recording".to_string(),
            ));
        }
        info!("Recording device: {}", device);
        inner.recording_device = device;
        Ok(())
    }

    /// Launch playback and capture
    ///
    /// Rejected without side effects unless a file is imported and both
    /// devices are selected. The file's duration is measured again, so the
    /// recording matches the file as it is now. Returns once both tasks are
    /// spawned.
    pub async fn start(&self) -> AudioResult<()> {
        let mut run = self.run.lock().await;
        let mut inner = self.inner.lock().await;

        // A finished run nobody waited on is discarded
        if let Some(handles) = run.as_ref() {
            if handles.playback.is_finished() && handles.capture.is_finished() {
                info!("Discarding uncollected run results");
                *run = None;
            }
        }

        if inner.state.is_running() || run.is_some() {
            warn!("Recording already started");
            return Err(AudioError::InvalidState(
                "Recording is already in progress".to_string(),
            ));
        }

        let ready = inner.state.can_start()
            && inner.playback_device.is_selected()
            && inner.recording_device.is_selected();
        let mut imported = match &inner.imported {
            Some(imported) if ready => imported.clone(),
            _ => {
                warn!("{}", START_REJECTED_MESSAGE);
                return Err(AudioError::InvalidState(START_REJECTED_MESSAGE.to_string()));
            }
        };

        // The file may have changed since import
        let path = imported.path.clone();
        let duration_secs = tokio::task::spawn_blocking(move || calculate_duration(&path))
            .await
            .map_err(|e| AudioError::io(&imported.path, std::io::Error::other(e)))??;
        if duration_secs != imported.duration_secs {
            info!(
                "Duration of {} changed since import: {:.2}s -> {:.2}s",
                imported.path.display(),
                imported.duration_secs,
                duration_secs
            );
            imported.duration_secs = duration_secs;
        }
        inner.imported = Some(imported.clone());

        // Everything fallible happens before any task is spawned
        let recorder = Recorder::new(self.config.capture_config())?;
        let exporter =
            SpectrogramExporter::new(self.config.spectrogram.clone(), &self.config.output_dir)?;
        let mut capture_backend = self
            .host
            .capture_backend(&inner.recording_device, self.config.capture_spec)?;
        let mut playback_backend = self.host.playback_backend(&inner.playback_device)?;

        info!(
            "Starting session {}: {:.2}s of {}",
            self.config.session_id,
            imported.duration_secs,
            imported.path.display()
        );

        let stop = StopSignal::new();

        let playback = {
            let player = Player::new(self.config.playback.clone());
            let stop = stop.clone();
            let path = imported.path.clone();
            tokio::spawn(async move {
                let result = player.play(&path, playback_backend.as_mut(), &stop).await;
                if let Err(e) = &result {
                    error!("Playback failed: {}", e);
                }
                result
            })
        };

        let capture = {
            let stop = stop.clone();
            let inner = Arc::clone(&self.inner);
            let duration_secs = imported.duration_secs;
            let recording_prefix = self.config.recording_prefix.clone();
            let spectrogram_prefix = self.config.spectrogram_prefix.clone();
            tokio::spawn(async move {
                let outcome = record_and_export(
                    &recorder,
                    &exporter,
                    capture_backend.as_mut(),
                    &recording_prefix,
                    &spectrogram_prefix,
                    duration_secs,
                    &stop,
                )
                .await;

                let mut inner = inner.lock().await;
                inner.state = match outcome.failure() {
                    None => SessionState::Complete,
                    Some(reason) => SessionState::Failed { reason },
                };
                info!("Session state: {}", inner.state.label());

                outcome
            })
        };

        inner.state = SessionState::Running;
        inner.started_at = Some(Utc::now());
        inner.stop = Some(stop.clone());
        *run = Some(RunHandles {
            stop,
            duration_secs: imported.duration_secs,
            playback,
            capture,
        });

        info!("Recording started");
        Ok(())
    }

    /// Request cooperative cancellation of the current run without waiting.
    /// A concurrent `wait` returns once both engines have wound down.
    pub async fn interrupt(&self) -> AudioResult<()> {
        let inner = self.inner.lock().await;
        match &inner.stop {
            Some(stop) if inner.state.is_running() => {
                info!("Stopping session: {}", self.config.session_id);
                stop.trigger();
                Ok(())
            }
            _ => {
                warn!("{}", NOT_RUNNING_MESSAGE);
                Err(AudioError::InvalidState(NOT_RUNNING_MESSAGE.to_string()))
            }
        }
    }

    /// Request cooperative cancellation of the current run and wait for both
    /// engines to wind down. The partial recording is kept and exported.
    pub async fn stop(&self) -> AudioResult<SessionReport> {
        let handles = self.run.lock().await.take();
        let Some(handles) = handles else {
            warn!("{}", NOT_RUNNING_MESSAGE);
            return Err(AudioError::InvalidState(NOT_RUNNING_MESSAGE.to_string()));
        };

        info!("Stopping session: {}", self.config.session_id);
        handles.stop.trigger();

        Ok(self.join(handles).await)
    }

    /// Wait for the current run to finish on its own
    pub async fn wait(&self) -> AudioResult<SessionReport> {
        let handles = self.run.lock().await.take();
        let Some(handles) = handles else {
            return Err(AudioError::InvalidState(NOT_RUNNING_MESSAGE.to_string()));
        };

        Ok(self.join(handles).await)
    }

    async fn join(&self, handles: RunHandles) -> SessionReport {
        let RunHandles {
            stop,
            duration_secs,
            playback,
            capture,
        } = handles;

        let mut errors = Vec::new();

        let frames_played = match playback.await {
            Ok(Ok(report)) => Some(report.frames_played),
            Ok(Err(e)) => {
                errors.push(format!("Playback: {}", e));
                None
            }
            Err(e) => {
                error!("Playback task panicked: {}", e);
                errors.push(format!("Playback task panicked: {}", e));
                None
            }
        };

        let (recording, spectrogram) = match capture.await {
            Ok(outcome) => {
                let recording = match outcome.recording {
                    Ok(recording) => Some(recording),
                    Err(e) => {
                        errors.push(format!("Capture: {}", e));
                        None
                    }
                };
                let spectrogram = match outcome.spectrogram {
                    Some(Ok(path)) => Some(path),
                    Some(Err(e)) => {
                        errors.push(format!("Spectrogram: {}", e));
                        None
                    }
                    None => None,
                };
                (recording, spectrogram)
            }
            Err(e) => {
                error!("Capture task panicked: {}", e);
                errors.push(format!("Capture task panicked: {}", e));
                let mut inner = self.inner.lock().await;
                inner.state = SessionState::Failed {
                    reason: format!("Capture task panicked: {}", e),
                };
                (None, None)
            }
        };

        let state = self.state().await;
        info!(
            "Session {} finished: {} ({} errors)",
            self.config.session_id,
            state.label(),
            errors.len()
        );

        SessionReport {
            session_id: self.config.session_id.clone(),
            state,
            duration_secs,
            recording,
            spectrogram,
            frames_played,
            stopped_early: stop.is_triggered(),
            errors,
        }
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let inner = self.inner.lock().await;
        let elapsed_secs = inner
            .started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: inner.state.clone(),
            imported_file: inner.imported.as_ref().map(|f| f.path.clone()),
            expected_duration_secs: inner.imported.as_ref().map(|f| f.duration_secs),
            playback_device: inner.playback_device.to_string(),
            recording_device: inner.recording_device.to_string(),
            started_at: inner.started_at,
            elapsed_secs,
        }
    }
}

impl CaptureOutcome {
    fn failure(&self) -> Option<String> {
        match (&self.recording, &self.spectrogram) {
            (Err(e), _) => Some(e.to_string()),
            (Ok(_), Some(Err(e))) => Some(e.to_string()),
            _ => None,
        }
    }
}

/// Capture, then export the spectrogram of whatever was captured
async fn record_and_export(
    recorder: &Recorder,
    exporter: &SpectrogramExporter,
    backend: &mut dyn crate::audio::CaptureBackend,
    recording_prefix: &str,
    spectrogram_prefix: &str,
    duration_secs: f64,
    stop: &StopSignal,
) -> CaptureOutcome {
    let recording = recorder
        .record(recording_prefix, duration_secs, backend, stop)
        .await;

    let spectrogram = match &recording {
        Ok(recording) if recording.sample_count > 0 => {
            let exporter = exporter.clone();
            let path = recording.path.clone();
            let prefix = spectrogram_prefix.to_string();
            let exported = tokio::task::spawn_blocking(move || exporter.export(&path, &prefix))
                .await
                .unwrap_or_else(|e| {
                    Err(AudioError::io(
                        &recording.path,
                        std::io::Error::other(format!("Spectrogram task failed: {}", e)),
                    ))
                });
            Some(exported)
        }
        Ok(_) => {
            info!("Nothing captured, skipping spectrogram");
            None
        }
        Err(e) => {
            error!("Capture failed: {}", e);
            None
        }
    };

    if let Some(Ok(path)) = &spectrogram {
        info!("Recording and spectrogram generation complete: {}", path.display());
    }

    CaptureOutcome {
        recording,
        spectrogram,
    }
}

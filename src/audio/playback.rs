use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, BitDepth, PlaybackBackend, StreamSpec};
use super::file::AudioFile;
use super::stop::StopSignal;
use crate::error::{AudioError, AudioResult};

/// Playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Frames per chunk handed to the device
    pub chunk_frames: usize,
    /// Chunks queued ahead of the device
    pub queue_depth: usize,
    /// Upper bound on waiting for queued audio after the last chunk
    pub drain_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            queue_depth: 8,
            drain_timeout_ms: 5000,
        }
    }
}

/// What a playback run delivered
#[derive(Debug, Clone)]
pub struct PlaybackReport {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames accepted by the device
    pub frames_played: usize,
    pub total_frames: usize,
    /// Stopped before the end of the file
    pub interrupted: bool,
}

/// Playback engine
pub struct Player {
    config: PlaybackConfig,
}

impl Player {
    pub fn new(config: PlaybackConfig) -> Self {
        Self { config }
    }

    /// Decode `path` and stream it to `backend` chunk by chunk
    ///
    /// Each chunk is awaited until the device side accepts it. The stop signal
    /// is checked between chunks; stopping discards anything still queued.
    /// The backend is closed before returning, on success and on error.
    pub async fn play(
        &self,
        path: impl AsRef<Path>,
        backend: &mut dyn PlaybackBackend,
        stop: &StopSignal,
    ) -> AudioResult<PlaybackReport> {
        let path = path.as_ref();
        let file = AudioFile::open(path)?;

        let chunk_frames = self.config.chunk_frames.max(1);
        let spec = StreamSpec {
            sample_rate: file.sample_rate,
            channels: file.channels,
            bit_depth: BitDepth::Pcm16,
            chunk_size: chunk_frames,
        };

        info!(
            "Playing {} on {} ({}Hz, {} ch, {}-bit source)",
            path.display(),
            backend.name(),
            spec.sample_rate,
            spec.channels,
            file.source_bits
        );

        let tx = backend.open(spec).await?;

        let mut frames_played = 0usize;
        let mut interrupted = false;
        let mut failure = None;

        for (index, chunk) in file.samples.chunks(spec.samples_per_chunk()).enumerate() {
            if stop.is_triggered() {
                interrupted = true;
                break;
            }

            let frame = AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                timestamp_ms: (frames_played as u64 * 1000) / spec.sample_rate as u64,
            };

            let sent = tokio::select! {
                sent = tx.send(frame) => sent,
                _ = stop.triggered() => {
                    interrupted = true;
                    break;
                }
            };

            if sent.is_err() {
                failure = Some(AudioError::device(format!(
                    "Output stream closed after {} chunks",
                    index
                )));
                break;
            }

            frames_played += chunk.len() / spec.channels as usize;
            debug!("Queued chunk {} ({} frames total)", index, frames_played);
        }

        drop(tx);

        let closed = if interrupted || failure.is_some() {
            backend.stop().await
        } else {
            backend.drain().await
        };
        if let Err(e) = closed {
            warn!("Failed to close output backend {}: {}", backend.name(), e);
        }

        if let Some(e) = failure {
            return Err(e);
        }

        if interrupted {
            info!("Playback stopped after {} frames", frames_played);
        } else {
            info!("Playback finished");
        }

        Ok(PlaybackReport {
            path: path.to_path_buf(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            frames_played,
            total_frames: file.frame_count(),
            interrupted,
        })
    }
}

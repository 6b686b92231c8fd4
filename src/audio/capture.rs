use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, CaptureBackend, StreamSpec};
use super::stop::StopSignal;
use crate::error::{AudioError, AudioResult};

/// Format of the timestamp embedded in output filenames
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Largest sample payload a WAV data chunk can describe
pub const MAX_WAV_DATA_BYTES: u64 = u32::MAX as u64;

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Output directory for recordings
    pub output_dir: PathBuf,
    /// Fixed capture stream format
    pub spec: StreamSpec,
}

impl CaptureConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            spec: StreamSpec::capture_default(),
        }
    }
}

/// Number of whole chunks needed to cover `duration_secs`
///
/// `ceil(sample_rate / chunk_size * duration)`. A tolerance of 1e-9 chunks
/// absorbs float error when the duration is an exact multiple of a chunk.
/// Durations whose audio would not fit a single WAV data chunk are rejected.
pub fn chunk_count(spec: &StreamSpec, duration_secs: f64) -> AudioResult<usize> {
    if !duration_secs.is_finite() || duration_secs < 0.0 {
        return Err(AudioError::InvalidState(format!(
            "Recording duration must be a non-negative number of seconds, got {}",
            duration_secs
        )));
    }
    if spec.chunk_size == 0 || spec.sample_rate == 0 {
        return Err(AudioError::InvalidState(format!(
            "Capture needs a non-zero chunk size and sample rate, got {} @ {}Hz",
            spec.chunk_size, spec.sample_rate
        )));
    }

    let chunks = (spec.sample_rate as f64 / spec.chunk_size as f64 * duration_secs - 1e-9)
        .ceil()
        .max(0.0);
    let bytes = chunks * spec.samples_per_chunk() as f64 * (spec.bit_depth.bits() / 8) as f64;
    if bytes > MAX_WAV_DATA_BYTES as f64 {
        return Err(AudioError::InvalidState(format!(
            "Recording duration of {} seconds exceeds the WAV size limit",
            duration_secs
        )));
    }

    Ok(chunks as usize)
}

/// `<dir>/<prefix>_<YYYYMMDD_HHMMSS>.<ext>`
///
/// Two calls with the same prefix within the same second yield the same path.
pub fn timestamped_path(dir: &Path, prefix: &str, at: DateTime<Local>, ext: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", prefix, at.format(TIMESTAMP_FORMAT), ext))
}

/// Result of one capture run
#[derive(Debug, Clone, Serialize)]
pub struct Recording {
    /// Path to the WAV file
    pub path: PathBuf,
    /// When the input stream was opened
    pub started_at: DateTime<Local>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub chunk_size: usize,
    /// Chunks the requested duration called for
    pub chunks_requested: usize,
    /// Chunks actually written
    pub chunks_captured: usize,
    /// Samples written (all channels)
    pub sample_count: usize,
    /// Capture stopped before `chunks_requested` was reached
    pub truncated: bool,
    /// Input buffers the backend discarded because the reader fell behind
    pub dropped_buffers: usize,
}

impl Recording {
    pub fn duration_seconds(&self) -> f64 {
        self.sample_count as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Sidecar metadata path: same stem, `.json`
    pub fn metadata_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }
}

/// Re-chunks frames of arbitrary length into fixed-size chunks
#[derive(Debug)]
pub struct ChunkAssembler {
    chunk_len: usize,
    pending: Vec<i16>,
    chunks: Vec<Vec<i16>>,
    limit: usize,
}

impl ChunkAssembler {
    /// Collects at most `limit` chunks of `chunk_len` samples each
    pub fn new(chunk_len: usize, limit: usize) -> Self {
        Self {
            chunk_len,
            pending: Vec::with_capacity(chunk_len),
            chunks: Vec::new(),
            limit,
        }
    }

    /// Append samples; anything beyond the limit is discarded
    pub fn push(&mut self, mut samples: &[i16]) {
        while !samples.is_empty() && !self.is_full() {
            let take = (self.chunk_len - self.pending.len()).min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.chunk_len {
                let chunk = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_len));
                self.chunks.push(chunk);
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.chunks.len() >= self.limit
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Whole chunks in arrival order; a partial trailing chunk is dropped
    pub fn into_chunks(self) -> Vec<Vec<i16>> {
        self.chunks
    }
}

/// Capture engine
///
/// Reads a fixed number of chunks from a capture backend and writes them as a
/// single WAV file once capture ends.
pub struct Recorder {
    config: CaptureConfig,
}

impl Recorder {
    pub fn new(config: CaptureConfig) -> AudioResult<Self> {
        // Create output directory if it doesn't exist
        fs::create_dir_all(&config.output_dir)
            .map_err(|e| AudioError::io(&config.output_dir, e))?;

        info!(
            "Recorder initialized: {} ({}Hz, {} ch, {}-sample chunks)",
            config.output_dir.display(),
            config.spec.sample_rate,
            config.spec.channels,
            config.spec.chunk_size
        );

        Ok(Self { config })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Record `duration_secs` worth of whole chunks from `backend`
    ///
    /// The stop signal is checked between reads. On stop, the chunks captured
    /// so far are written and the recording is marked truncated. The backend
    /// is stopped before returning, on success and on error.
    pub async fn record(
        &self,
        prefix: &str,
        duration_secs: f64,
        backend: &mut dyn CaptureBackend,
        stop: &StopSignal,
    ) -> AudioResult<Recording> {
        let spec = self.config.spec;
        let chunks_requested = chunk_count(&spec, duration_secs)?;

        info!(
            "Recording {:.2}s from {} ({} chunks of {} samples)",
            duration_secs,
            backend.name(),
            chunks_requested,
            spec.chunk_size
        );

        let started_at = Local::now();
        let mut audio_rx = backend.start().await?;

        let captured = self
            .read_chunks(&mut audio_rx, chunks_requested, stop)
            .await;

        drop(audio_rx);
        if let Err(e) = backend.stop().await {
            warn!("Failed to stop capture backend {}: {}", backend.name(), e);
        }
        let dropped_buffers = backend.dropped_buffers();
        if dropped_buffers > 0 {
            warn!(
                "{} dropped {} input buffers; the recording has gaps",
                backend.name(),
                dropped_buffers
            );
        }

        let chunks = captured?;
        let truncated = chunks.len() < chunks_requested;
        if truncated {
            info!(
                "Capture stopped early: {} of {} chunks",
                chunks.len(),
                chunks_requested
            );
        }

        let path = timestamped_path(&self.config.output_dir, prefix, Local::now(), "wav");
        let sample_count = self.write_wav(&path, &chunks)?;

        let recording = Recording {
            path,
            started_at,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bit_depth.bits(),
            chunk_size: spec.chunk_size,
            chunks_requested,
            chunks_captured: chunks.len(),
            sample_count,
            truncated,
            dropped_buffers,
        };

        self.write_metadata(&recording)?;
        info!("Recording saved as {}", recording.path.display());

        Ok(recording)
    }

    async fn read_chunks(
        &self,
        audio_rx: &mut tokio::sync::mpsc::Receiver<AudioFrame>,
        chunks_requested: usize,
        stop: &StopSignal,
    ) -> AudioResult<Vec<Vec<i16>>> {
        let spec = self.config.spec;
        let mut assembler = ChunkAssembler::new(spec.samples_per_chunk(), chunks_requested);

        while !assembler.is_full() {
            if stop.is_triggered() {
                break;
            }

            let frame = tokio::select! {
                frame = audio_rx.recv() => frame,
                _ = stop.triggered() => break,
            };

            let Some(frame) = frame else {
                return Err(AudioError::device(format!(
                    "Input stream ended after {} of {} chunks",
                    assembler.chunk_count(),
                    chunks_requested
                )));
            };

            if frame.sample_rate != spec.sample_rate || frame.channels != spec.channels {
                return Err(AudioError::device(format!(
                    "Input delivered {}Hz/{}ch, expected {}Hz/{}ch",
                    frame.sample_rate, frame.channels, spec.sample_rate, spec.channels
                )));
            }

            let before = assembler.chunk_count();
            assembler.push(&frame.samples);
            if assembler.chunk_count() != before {
                debug!(
                    "Captured chunk {}/{} at {}ms",
                    assembler.chunk_count(),
                    chunks_requested,
                    frame.timestamp_ms
                );
            }
        }

        Ok(assembler.into_chunks())
    }

    fn write_wav(&self, path: &Path, chunks: &[Vec<i16>]) -> AudioResult<usize> {
        let mut writer = WavFile::create(path, self.config.spec.wav_spec())?;
        for chunk in chunks {
            writer.write(chunk)?;
        }
        writer.finish()
    }

    fn write_metadata(&self, recording: &Recording) -> AudioResult<()> {
        let path = recording.metadata_path();
        let json = serde_json::to_vec_pretty(recording)
            .map_err(|e| AudioError::io(&path, std::io::Error::other(e)))?;
        fs::write(&path, json).map_err(|e| AudioError::io(&path, e))
    }
}

/// WAV writer that is finalized on drop if `finish` was never reached
struct WavFile {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    sample_count: usize,
}

impl WavFile {
    fn create(path: &Path, spec: hound::WavSpec) -> AudioResult<Self> {
        let writer =
            hound::WavWriter::create(path, spec).map_err(|e| AudioError::from_wav_write(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            sample_count: 0,
        })
    }

    fn write(&mut self, samples: &[i16]) -> AudioResult<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| AudioError::from_wav_write(&self.path, e))?;
            }
            self.sample_count += samples.len();
        }
        Ok(())
    }

    fn finish(mut self) -> AudioResult<usize> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| AudioError::from_wav_write(&self.path, e))?;
        }
        Ok(self.sample_count)
    }
}

impl Drop for WavFile {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

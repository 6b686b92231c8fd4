use tokio::sync::mpsc;

use super::device::AudioDevice;
use crate::error::AudioResult;

/// Sample width of every PCM stream we open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitDepth {
    /// Signed 16-bit little-endian PCM
    #[default]
    Pcm16,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Pcm16 => 16,
        }
    }
}

/// Stream configuration shared by capture and playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Sample width
    pub bit_depth: BitDepth,
    /// Samples per channel transferred per chunk
    pub chunk_size: usize,
}

impl StreamSpec {
    /// Fixed capture configuration: 44.1kHz mono 16-bit, 1024-sample chunks
    pub fn capture_default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            bit_depth: BitDepth::Pcm16,
            chunk_size: 1024,
        }
    }

    /// Interleaved samples in one chunk
    pub fn samples_per_chunk(&self) -> usize {
        self.chunk_size * self.channels as usize
    }

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bit_depth.bits(),
            sample_format: hound::SampleFormat::Int,
        }
    }
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self::capture_default()
    }
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the stream started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Which device an engine should open
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceChoice {
    /// Nothing picked yet (the "Select ... Device" placeholder)
    #[default]
    Unselected,
    /// The host's default device
    SystemDefault,
    /// A device from the catalog, by name
    Named(String),
}

impl DeviceChoice {
    pub fn is_selected(&self) -> bool {
        !matches!(self, DeviceChoice::Unselected)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            DeviceChoice::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceChoice::Unselected => write!(f, "<unselected>"),
            DeviceChoice::SystemDefault => write!(f, "<default>"),
            DeviceChoice::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Input stream producing audio frames
///
/// Implementations own the device handle from `start` until `stop` (or drop).
/// Frames are delivered in arrival order; their size is whatever the device
/// hands over, the capture engine re-chunks them.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Open the input device and start streaming
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> AudioResult<mpsc::Receiver<AudioFrame>>;

    /// Stop streaming and release the device
    async fn stop(&mut self) -> AudioResult<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Input buffers discarded since the last `start` because the receiver was full
    fn dropped_buffers(&self) -> usize {
        0
    }

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Output stream consuming audio frames
///
/// The sender returned by `open` is bounded: `send().await` returns once the
/// device side has accepted the frame.
#[async_trait::async_trait]
pub trait PlaybackBackend: Send + Sync {
    /// Open the output device for the given format
    async fn open(&mut self, spec: StreamSpec) -> AudioResult<mpsc::Sender<AudioFrame>>;

    /// Wait until every queued frame has been played, then release the device.
    /// The caller must drop its sender first.
    async fn drain(&mut self) -> AudioResult<()>;

    /// Release the device immediately, discarding queued audio
    async fn stop(&mut self) -> AudioResult<()>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Source of devices and backends
///
/// `CpalHost` talks to the system audio API; tests substitute in-memory hosts.
pub trait AudioHost: Send + Sync {
    /// Every endpoint the host exposes
    fn devices(&self) -> AudioResult<Vec<AudioDevice>>;

    /// Create an input backend for `device` producing frames in `spec`
    fn capture_backend(
        &self,
        device: &DeviceChoice,
        spec: StreamSpec,
    ) -> AudioResult<Box<dyn CaptureBackend>>;

    /// Create an output backend for `device`
    fn playback_backend(&self, device: &DeviceChoice) -> AudioResult<Box<dyn PlaybackBackend>>;
}

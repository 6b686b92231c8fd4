// System audio backends built on cpal
//
// cpal streams are not Send on every platform, so each backend parks its
// stream on a dedicated thread. The thread owns the device handle from open
// to close and drops it when told to stop or when the backend is dropped.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig, SupportedStreamConfigRange};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{
    AudioFrame, AudioHost, CaptureBackend, DeviceChoice, PlaybackBackend, StreamSpec,
};
use super::device::AudioDevice;
use crate::error::{AudioError, AudioResult};

/// Frames buffered between the input callback and the capture engine
const CAPTURE_QUEUE_DEPTH: usize = 256;

/// Host backed by the platform's default cpal host
pub struct CpalHost {
    playback_queue_depth: usize,
    drain_timeout: Duration,
}

impl CpalHost {
    pub fn new(playback_queue_depth: usize, drain_timeout: Duration) -> Self {
        Self {
            playback_queue_depth: playback_queue_depth.max(1),
            drain_timeout,
        }
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new(8, Duration::from_secs(5))
    }
}

impl AudioHost for CpalHost {
    fn devices(&self) -> AudioResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let devices = host
            .devices()
            .map_err(|e| AudioError::device(format!("Device API unavailable: {}", e)))?;

        Ok(devices
            .filter_map(|device| {
                let name = device.name().ok()?;
                let max_input = device
                    .supported_input_configs()
                    .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                    .unwrap_or(0);
                let max_output = device
                    .supported_output_configs()
                    .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                    .unwrap_or(0);
                Some(AudioDevice::from_channel_counts(name, max_input, max_output))
            })
            .collect())
    }

    fn capture_backend(
        &self,
        device: &DeviceChoice,
        spec: StreamSpec,
    ) -> AudioResult<Box<dyn CaptureBackend>> {
        Ok(Box::new(CpalCapture::new(device.clone(), spec)))
    }

    fn playback_backend(&self, device: &DeviceChoice) -> AudioResult<Box<dyn PlaybackBackend>> {
        Ok(Box::new(CpalPlayback::new(
            device.clone(),
            self.playback_queue_depth,
            self.drain_timeout,
        )))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

fn find_device(host: &cpal::Host, choice: &DeviceChoice, direction: Direction) -> AudioResult<cpal::Device> {
    let found = match (choice, direction) {
        (DeviceChoice::Unselected, _) => {
            return Err(AudioError::InvalidState("No audio device selected".to_string()))
        }
        (DeviceChoice::SystemDefault, Direction::Input) => host.default_input_device(),
        (DeviceChoice::SystemDefault, Direction::Output) => host.default_output_device(),
        (DeviceChoice::Named(name), Direction::Input) => host
            .input_devices()
            .map_err(|e| AudioError::device(format!("Device API unavailable: {}", e)))?
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false)),
        (DeviceChoice::Named(name), Direction::Output) => host
            .output_devices()
            .map_err(|e| AudioError::device(format!("Device API unavailable: {}", e)))?
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false)),
    };

    found.ok_or_else(|| AudioError::device(format!("Audio device not found: {}", choice)))
}

/// Pick a supported range that covers `sample_rate`, preferring `channels`
/// exactly, then the fewest channels above it, then any.
fn pick_config(
    ranges: Vec<SupportedStreamConfigRange>,
    sample_rate: u32,
    channels: u16,
) -> Option<SupportedStreamConfigRange> {
    let rate = cpal::SampleRate(sample_rate);
    let mut candidates: Vec<_> = ranges
        .into_iter()
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter(|r| {
            matches!(
                r.sample_format(),
                SampleFormat::I16 | SampleFormat::U16 | SampleFormat::F32
            )
        })
        .collect();

    candidates.sort_by_key(|r| {
        let c = r.channels();
        if c == channels {
            (0, c)
        } else if c > channels {
            (1, c)
        } else {
            (2, u16::MAX - c)
        }
    });
    candidates.into_iter().next()
}

/// Thread parking a cpal stream until told to stop
struct StreamWorker {
    stop_tx: std_mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl StreamWorker {
    /// Run `build` on a new thread; the stream it returns is played and held
    /// until `shutdown`. Resolves once the stream is playing or failed to open.
    async fn spawn<F>(name: String, build: F) -> AudioResult<Self>
    where
        F: FnOnce() -> AudioResult<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel::<AudioResult<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let stream = match build().and_then(|stream| {
                    stream
                        .play()
                        .map_err(|e| AudioError::device(format!("Failed to start stream: {}", e)))?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(()));
                // Blocks until shutdown or until the worker handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::device(format!("Failed to spawn stream thread: {}", e)))?;

        let mut worker = Self {
            stop_tx,
            handle: Some(handle),
        };

        match ready_rx.await {
            Ok(Ok(())) => Ok(worker),
            Ok(Err(e)) => {
                worker.join().await;
                Err(e)
            }
            Err(_) => {
                worker.join().await;
                Err(AudioError::device("Stream thread exited before opening the device"))
            }
        }
    }

    async fn shutdown(mut self) {
        let _ = self.stop_tx.send(());
        self.join().await;
    }

    async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("Audio stream thread panicked"),
                Err(e) => error!("Failed to join audio stream thread: {}", e),
            }
        }
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        // Wakes the thread; it drops the stream and exits on its own
        let _ = self.stop_tx.send(());
    }
}

/// Microphone input via cpal, delivered as mono 16-bit frames
pub struct CpalCapture {
    device: DeviceChoice,
    spec: StreamSpec,
    worker: Option<StreamWorker>,
    dropped: Arc<AtomicUsize>,
}

impl CpalCapture {
    pub fn new(device: DeviceChoice, spec: StreamSpec) -> Self {
        Self {
            device,
            spec,
            worker: None,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Hands input buffers from the device callback to the capture engine
///
/// The callback must not block, so a full queue drops the buffer and counts it.
struct InputSink {
    tx: mpsc::Sender<AudioFrame>,
    dropped: Arc<AtomicUsize>,
}

impl InputSink {
    fn deliver(&self, frame: AudioFrame) {
        if let Err(mpsc::error::TrySendError::Full(frame)) = self.tx.try_send(frame) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Capture queue full, dropped input buffer at {}ms ({} so far)",
                frame.timestamp_ms, total
            );
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CpalCapture {
    async fn start(&mut self) -> AudioResult<mpsc::Receiver<AudioFrame>> {
        if self.worker.is_some() {
            return Err(AudioError::InvalidState("Already capturing".to_string()));
        }

        let (tx, rx) = mpsc::channel(CAPTURE_QUEUE_DEPTH);
        self.dropped.store(0, Ordering::Relaxed);
        let sink = InputSink {
            tx,
            dropped: Arc::clone(&self.dropped),
        };
        let choice = self.device.clone();
        let spec = self.spec;

        info!("Opening input device {} at {}Hz", choice, spec.sample_rate);

        let worker = StreamWorker::spawn("playrec-capture".to_string(), move || {
            let host = cpal::default_host();
            let device = find_device(&host, &choice, Direction::Input)?;
            let ranges: Vec<_> = device
                .supported_input_configs()
                .map_err(|e| AudioError::device(format!("Failed to query input configs: {}", e)))?
                .collect();
            let range = pick_config(ranges, spec.sample_rate, spec.channels).ok_or_else(|| {
                AudioError::device(format!(
                    "Input device {} does not support {}Hz",
                    choice, spec.sample_rate
                ))
            })?;

            let supported = range.with_sample_rate(cpal::SampleRate(spec.sample_rate));
            let format = supported.sample_format();
            let config: StreamConfig = supported.into();

            match format {
                SampleFormat::I16 => build_input::<i16>(&device, &config, spec, sink),
                SampleFormat::U16 => build_input::<u16>(&device, &config, spec, sink),
                SampleFormat::F32 => build_input::<f32>(&device, &config, spec, sink),
                other => Err(AudioError::device(format!("Unsupported sample format: {:?}", other))),
            }
        })
        .await?;

        self.worker = Some(worker);
        info!("Input stream started");

        Ok(rx)
    }

    async fn stop(&mut self) -> AudioResult<()> {
        if let Some(worker) = self.worker.take() {
            info!("Stopping input stream");
            worker.shutdown().await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn dropped_buffers(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        "cpal input"
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    spec: StreamSpec,
    sink: InputSink,
) -> AudioResult<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let device_channels = config.channels as usize;
    let out_channels = spec.channels as usize;
    let mut frames_emitted: u64 = 0;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples = remix::<T>(data, device_channels, out_channels);
                let timestamp_ms = frames_emitted * 1000 / spec.sample_rate as u64;
                frames_emitted += (samples.len() / out_channels) as u64;

                let frame = AudioFrame {
                    samples,
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                    timestamp_ms,
                };
                sink.deliver(frame);
            },
            |err| error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::device(format!("Failed to open input stream: {}", e)))
}

/// Convert a device buffer to 16-bit with `out_channels` channels.
/// Down-mixing averages all device channels; up-mixing repeats them.
fn remix<T>(data: &[T], device_channels: usize, out_channels: usize) -> Vec<i16>
where
    T: Sample,
    i16: FromSample<T>,
{
    let mut out = Vec::with_capacity(data.len() / device_channels * out_channels);
    for frame in data.chunks_exact(device_channels) {
        if out_channels == 1 {
            let sum: i32 = frame.iter().map(|&s| i16::from_sample(s) as i32).sum();
            out.push((sum / device_channels as i32) as i16);
        } else {
            for ch in 0..out_channels {
                out.push(i16::from_sample(frame[ch % device_channels]));
            }
        }
    }
    out
}

/// Speaker output via cpal
pub struct CpalPlayback {
    device: DeviceChoice,
    queue_depth: usize,
    drain_timeout: Duration,
    worker: Option<StreamWorker>,
    drained_rx: Option<oneshot::Receiver<()>>,
}

impl CpalPlayback {
    pub fn new(device: DeviceChoice, queue_depth: usize, drain_timeout: Duration) -> Self {
        Self {
            device,
            queue_depth,
            drain_timeout,
            worker: None,
            drained_rx: None,
        }
    }
}

#[async_trait::async_trait]
impl PlaybackBackend for CpalPlayback {
    async fn open(&mut self, spec: StreamSpec) -> AudioResult<mpsc::Sender<AudioFrame>> {
        if self.worker.is_some() {
            return Err(AudioError::InvalidState("Output already open".to_string()));
        }

        let (tx, rx) = mpsc::channel(self.queue_depth);
        let (drained_tx, drained_rx) = oneshot::channel();
        let choice = self.device.clone();

        info!(
            "Opening output device {} ({}Hz, {} channels)",
            choice, spec.sample_rate, spec.channels
        );

        let worker = StreamWorker::spawn("playrec-playback".to_string(), move || {
            let host = cpal::default_host();
            let device = find_device(&host, &choice, Direction::Output)?;
            let ranges: Vec<_> = device
                .supported_output_configs()
                .map_err(|e| AudioError::device(format!("Failed to query output configs: {}", e)))?
                .filter(|r| r.channels() == spec.channels)
                .collect();
            let range = pick_config(ranges, spec.sample_rate, spec.channels).ok_or_else(|| {
                AudioError::device(format!(
                    "Output device {} does not support {} channels at {}Hz",
                    choice, spec.channels, spec.sample_rate
                ))
            })?;

            let supported = range.with_sample_rate(cpal::SampleRate(spec.sample_rate));
            let format = supported.sample_format();
            let config: StreamConfig = supported.into();
            let feed = OutputFeed::new(rx, drained_tx);

            match format {
                SampleFormat::I16 => build_output::<i16>(&device, &config, feed),
                SampleFormat::U16 => build_output::<u16>(&device, &config, feed),
                SampleFormat::F32 => build_output::<f32>(&device, &config, feed),
                other => Err(AudioError::device(format!("Unsupported sample format: {:?}", other))),
            }
        })
        .await?;

        self.worker = Some(worker);
        self.drained_rx = Some(drained_rx);

        Ok(tx)
    }

    async fn drain(&mut self) -> AudioResult<()> {
        if let Some(drained_rx) = self.drained_rx.take() {
            if tokio::time::timeout(self.drain_timeout, drained_rx).await.is_err() {
                warn!(
                    "Output did not drain within {:?}, closing anyway",
                    self.drain_timeout
                );
            }
        }
        self.stop().await
    }

    async fn stop(&mut self) -> AudioResult<()> {
        self.drained_rx = None;
        if let Some(worker) = self.worker.take() {
            info!("Closing output stream");
            worker.shutdown().await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "cpal output"
    }
}

/// Pulls queued frames into the output callback
struct OutputFeed {
    rx: mpsc::Receiver<AudioFrame>,
    pending: VecDeque<i16>,
    drained_tx: Option<oneshot::Sender<()>>,
}

impl OutputFeed {
    fn new(rx: mpsc::Receiver<AudioFrame>, drained_tx: oneshot::Sender<()>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
            drained_tx: Some(drained_tx),
        }
    }

    /// Next sample, or None when nothing is queued right now
    fn next_sample(&mut self) -> Option<i16> {
        loop {
            if let Some(sample) = self.pending.pop_front() {
                return Some(sample);
            }
            match self.rx.try_recv() {
                Ok(frame) => self.pending.extend(frame.samples),
                Err(mpsc::error::TryRecvError::Empty) => return None,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if let Some(tx) = self.drained_tx.take() {
                        let _ = tx.send(());
                    }
                    return None;
                }
            }
        }
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut feed: OutputFeed,
) -> AudioResult<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    *out = match feed.next_sample() {
                        Some(sample) => T::from_sample(sample),
                        None => T::EQUILIBRIUM,
                    };
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::device(format!("Failed to open output stream: {}", e)))
}

// In-memory audio host for integration tests
//
// Capture backends synthesize a sine tone, playback backends count what they
// are fed. Nothing here touches real audio hardware.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use playrec::audio::{
    AudioDevice, AudioFrame, AudioHost, CaptureBackend, DeviceChoice, PlaybackBackend, StreamSpec,
};
use playrec::{AudioError, AudioResult};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Write a 440Hz sine WAV of `secs` seconds
pub fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, secs: f64) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let frames = (sample_rate as f64 * secs).round() as usize;
    for i in 0..frames {
        let sample = sine_sample(i, sample_rate);
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

fn sine_sample(index: usize, sample_rate: u32) -> i16 {
    let t = index as f32 / sample_rate as f32;
    ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5 * i16::MAX as f32) as i16
}

/// How a synthetic input stream behaves
#[derive(Debug, Clone, Copy)]
pub struct CaptureScript {
    /// Samples per delivered frame (deliberately not a multiple of the chunk size)
    pub frame_len: usize,
    /// Delay between frames
    pub pace: Duration,
    /// Close the stream after this many samples
    pub end_after: Option<usize>,
    /// Buffers the backend claims to have dropped on overflow
    pub dropped_buffers: usize,
}

impl Default for CaptureScript {
    fn default() -> Self {
        Self {
            frame_len: 700,
            pace: Duration::ZERO,
            end_after: None,
            dropped_buffers: 0,
        }
    }
}

/// Input backend generating a sine tone
pub struct SyntheticCapture {
    spec: StreamSpec,
    script: CaptureScript,
    producer: Option<JoinHandle<()>>,
    capturing: Arc<AtomicBool>,
}

impl SyntheticCapture {
    pub fn new(spec: StreamSpec, script: CaptureScript) -> Self {
        Self {
            spec,
            script,
            producer: None,
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl CaptureBackend for SyntheticCapture {
    async fn start(&mut self) -> AudioResult<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(64);
        let spec = self.spec;
        let script = self.script;
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        self.producer = Some(tokio::spawn(async move {
            let mut produced = 0usize;
            loop {
                let len = match script.end_after {
                    Some(limit) if produced >= limit => break,
                    Some(limit) => script.frame_len.min(limit - produced),
                    None => script.frame_len,
                };
                let samples = (produced..produced + len)
                    .map(|i| sine_sample(i, spec.sample_rate))
                    .collect();
                let frame = AudioFrame {
                    samples,
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                    timestamp_ms: produced as u64 * 1000 / spec.sample_rate as u64,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                produced += len;
                if !script.pace.is_zero() {
                    tokio::time::sleep(script.pace).await;
                }
            }
            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> AudioResult<()> {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn dropped_buffers(&self) -> usize {
        self.script.dropped_buffers
    }

    fn name(&self) -> &str {
        "synthetic-capture"
    }
}

/// Output backend that counts the samples it receives
pub struct CountingPlayback {
    pace: Duration,
    received: Arc<AtomicUsize>,
    consumer: Option<JoinHandle<()>>,
}

impl CountingPlayback {
    pub fn new(pace: Duration, received: Arc<AtomicUsize>) -> Self {
        Self {
            pace,
            received,
            consumer: None,
        }
    }
}

#[async_trait]
impl PlaybackBackend for CountingPlayback {
    async fn open(&mut self, _spec: StreamSpec) -> AudioResult<mpsc::Sender<AudioFrame>> {
        let (tx, mut rx) = mpsc::channel::<AudioFrame>(4);
        let pace = self.pace;
        let received = Arc::clone(&self.received);

        self.consumer = Some(tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                received.fetch_add(frame.samples.len(), Ordering::SeqCst);
                if !pace.is_zero() {
                    tokio::time::sleep(pace).await;
                }
            }
        }));

        Ok(tx)
    }

    async fn drain(&mut self) -> AudioResult<()> {
        if let Some(consumer) = self.consumer.take() {
            consumer
                .await
                .map_err(|e| AudioError::device(format!("consumer failed: {}", e)))?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "counting-playback"
    }
}

/// Host handing out synthetic backends and recording how many it created
#[derive(Default)]
pub struct FakeHost {
    pub devices: Vec<AudioDevice>,
    pub devices_unavailable: bool,
    pub capture_script: CaptureScript,
    pub playback_pace: Duration,
    pub captures_created: AtomicUsize,
    pub playbacks_created: AtomicUsize,
    pub samples_played: Arc<AtomicUsize>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            devices: vec![
                AudioDevice::from_channel_counts("Speakers", 0, 2),
                AudioDevice::from_channel_counts("Microphone", 1, 0),
                AudioDevice::from_channel_counts("Headset", 1, 2),
            ],
            ..Self::default()
        }
    }

    pub fn with_capture(mut self, script: CaptureScript) -> Self {
        self.capture_script = script;
        self
    }

    pub fn with_playback_pace(mut self, pace: Duration) -> Self {
        self.playback_pace = pace;
        self
    }

    pub fn backends_created(&self) -> usize {
        self.captures_created.load(Ordering::SeqCst) + self.playbacks_created.load(Ordering::SeqCst)
    }
}

impl AudioHost for FakeHost {
    fn devices(&self) -> AudioResult<Vec<AudioDevice>> {
        if self.devices_unavailable {
            return Err(AudioError::device("no audio subsystem"));
        }
        Ok(self.devices.clone())
    }

    fn capture_backend(
        &self,
        device: &DeviceChoice,
        spec: StreamSpec,
    ) -> AudioResult<Box<dyn CaptureBackend>> {
        if !device.is_selected() {
            return Err(AudioError::InvalidState("no recording device".to_string()));
        }
        self.captures_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticCapture::new(spec, self.capture_script)))
    }

    fn playback_backend(&self, device: &DeviceChoice) -> AudioResult<Box<dyn PlaybackBackend>> {
        if !device.is_selected() {
            return Err(AudioError::InvalidState("no playback device".to_string()));
        }
        self.playbacks_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingPlayback::new(
            self.playback_pace,
            Arc::clone(&self.samples_played),
        )))
    }
}

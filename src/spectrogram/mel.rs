// Mel power spectrogram
//
// Centered STFT (zero padded by n_fft/2 on both sides) with a periodic Hann
// window, power = |X|^2, projected onto a Slaney-style mel filterbank with
// area normalization.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Values below this are treated as silence when converting to decibels
pub const AMIN: f32 = 1e-10;

/// Row-major `[mel][frame]` matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub n_mels: usize,
    pub n_frames: usize,
    pub data: Vec<f32>,
}

impl Spectrogram {
    pub fn get(&self, mel: usize, frame: usize) -> f32 {
        self.data[mel * self.n_frames + frame]
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Power to decibels relative to the peak, floored at `peak - top_db`
    pub fn power_to_db(&self, top_db: Option<f32>) -> Spectrogram {
        let reference = self.max().max(AMIN);
        let ref_db = 10.0 * reference.log10();

        let mut data: Vec<f32> = self
            .data
            .iter()
            .map(|&p| 10.0 * p.max(AMIN).log10() - ref_db)
            .collect();

        if let Some(top_db) = top_db {
            let floor = data.iter().copied().fold(f32::NEG_INFINITY, f32::max) - top_db;
            for v in &mut data {
                *v = v.max(floor);
            }
        }

        Spectrogram {
            n_mels: self.n_mels,
            n_frames: self.n_frames,
            data,
        }
    }
}

pub struct MelSpectrogram {
    n_fft: usize,
    hop_length: usize,
    n_mels: usize,
    window: Vec<f32>,
    filters: Vec<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl MelSpectrogram {
    pub fn new(sample_rate: u32, n_fft: usize, hop_length: usize, n_mels: usize) -> Self {
        let n_fft = n_fft.max(2);
        let window = (0..n_fft)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / n_fft as f32).cos())
            .collect();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);

        Self {
            n_fft,
            hop_length: hop_length.max(1),
            n_mels,
            window,
            filters: mel_filterbank(sample_rate, n_fft, n_mels),
            fft,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of STFT frames produced for `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    pub fn compute(&self, samples: &[f32]) -> Spectrogram {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let n_frames = self.frame_count(samples.len());
        let n_bins = self.n_bins();
        let mut data = vec![0.0f32; self.n_mels * n_frames];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let mut power = vec![0.0f32; n_bins];

        for frame in 0..n_frames {
            let start = frame * self.hop_length;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = padded.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * self.window[i], 0.0);
            }

            self.fft.process(&mut buffer);

            for (bin, p) in power.iter_mut().enumerate() {
                *p = buffer[bin].norm_sqr();
            }

            for (mel, filter) in self.filters.iter().enumerate() {
                data[mel * n_frames + frame] =
                    filter.iter().zip(&power).map(|(w, p)| w * p).sum();
            }
        }

        Spectrogram {
            n_mels: self.n_mels,
            n_frames,
            data,
        }
    }
}

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1kHz, logarithmic above
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz < MIN_LOG_HZ {
        hz / F_SP
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel < MIN_LOG_MEL {
        mel * F_SP
    } else {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    }
}

/// Triangular filters spanning 0..sample_rate/2, each normalized to unit area
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f64 / 2.0;

    let mel_max = hz_to_mel(fmax);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let enorm = 2.0 / (hi - lo);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - lo) / (center - lo);
                    let upper = (hi - f) / (hi - center);
                    (lower.min(upper).max(0.0) * enorm) as f32
                })
                .collect()
        })
        .collect()
}

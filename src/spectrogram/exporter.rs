use chrono::Local;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::mel::MelSpectrogram;
use super::render::{render_heatmap, Axes};
use crate::audio::{timestamped_path, AudioFile};
use crate::error::{AudioError, AudioResult};

/// Spectrogram parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Rate the recording is resampled to before analysis
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    /// Dynamic range below the peak that is kept (dB)
    pub top_db: f32,
    /// Image size in pixels
    pub width: u32,
    pub height: u32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            top_db: 80.0,
            width: 1000,
            height: 400,
        }
    }
}

/// Renders recordings to `<prefix>_<timestamp>.png` in a fixed directory
#[derive(Debug, Clone)]
pub struct SpectrogramExporter {
    config: SpectrogramConfig,
    output_dir: PathBuf,
}

impl SpectrogramExporter {
    pub fn new(config: SpectrogramConfig, output_dir: impl Into<PathBuf>) -> AudioResult<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| AudioError::io(&output_dir, e))?;

        Ok(Self { config, output_dir })
    }

    pub fn config(&self) -> &SpectrogramConfig {
        &self.config
    }

    /// Load `path`, compute its mel spectrogram and rasterize it
    pub fn render(&self, path: impl AsRef<Path>) -> AudioResult<image::RgbImage> {
        let path = path.as_ref();
        let cfg = &self.config;

        let samples = AudioFile::load_mono(path, cfg.sample_rate)?;
        if samples.is_empty() {
            return Err(AudioError::UnsupportedFormat(format!(
                "{}: no audio samples",
                path.display()
            )));
        }

        let mel = MelSpectrogram::new(cfg.sample_rate, cfg.n_fft, cfg.hop_length, cfg.n_mels);
        let power = mel.compute(&samples);
        let db = power.power_to_db(Some(cfg.top_db));

        info!(
            "Computed {}x{} mel spectrogram for {}",
            db.n_mels,
            db.n_frames,
            path.display()
        );

        let axes = Axes {
            duration_secs: samples.len() as f64 / cfg.sample_rate as f64,
            fmax_hz: cfg.sample_rate as f64 / 2.0,
        };
        Ok(render_heatmap(&db, -cfg.top_db, 0.0, &axes, cfg.width, cfg.height))
    }

    /// Render `path` and save it as a PNG; returns the image path
    ///
    /// CPU bound; call from a blocking context.
    pub fn export(&self, path: impl AsRef<Path>, prefix: &str) -> AudioResult<PathBuf> {
        let img = self.render(path)?;

        let out = timestamped_path(&self.output_dir, prefix, Local::now(), "png");
        img.save_with_format(&out, image::ImageFormat::Png)
            .map_err(|e| match e {
                image::ImageError::IoError(io) => AudioError::io(&out, io),
                other => AudioError::io(&out, std::io::Error::other(other)),
            })?;

        info!("Spectrogram saved as {}", out.display());
        Ok(out)
    }
}

/// Convenience wrapper with default parameters
pub fn export_spectrogram(
    path: impl AsRef<Path>,
    prefix: &str,
    output_dir: impl Into<PathBuf>,
) -> AudioResult<PathBuf> {
    SpectrogramExporter::new(SpectrogramConfig::default(), output_dir)?.export(path, prefix)
}

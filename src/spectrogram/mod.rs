//! Mel spectrogram rendering
//!
//! - `mel`: STFT, mel filterbank and dB scaling
//! - `render`: heatmap, labelled axes and colorbar rasterization
//! - `exporter`: load a recording, render it, save a PNG

mod exporter;
pub mod mel;
pub mod render;

pub use exporter::{export_spectrogram, SpectrogramConfig, SpectrogramExporter};
pub use mel::{MelSpectrogram, Spectrogram};
pub use render::Axes;

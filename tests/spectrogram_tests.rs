// Integration tests for spectrogram export

mod common;

use anyhow::Result;
use playrec::spectrogram::{export_spectrogram, SpectrogramConfig, SpectrogramExporter};
use playrec::AudioError;
use std::fs;
use tempfile::TempDir;

fn small_config() -> SpectrogramConfig {
    SpectrogramConfig {
        width: 320,
        height: 160,
        ..SpectrogramConfig::default()
    }
}

#[test]
fn test_export_writes_png_with_prefix() -> Result<()> {
    let dir = TempDir::new()?;
    let wav = dir.path().join("tone.wav");
    common::write_sine_wav(&wav, 44100, 1, 1.0)?;

    let out_dir = dir.path().join("images");
    let exporter = SpectrogramExporter::new(small_config(), &out_dir)?;
    let png = exporter.export(&wav, "MySpectrogram")?;

    assert!(png.starts_with(&out_dir));
    let name = png.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    assert!(name.starts_with("MySpectrogram_"));
    assert!(name.ends_with(".png"));

    let bytes = fs::read(&png)?;
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

    let img = image::open(&png)?.to_rgb8();
    assert_eq!(img.width(), 320);
    assert_eq!(img.height(), 160);

    Ok(())
}

#[test]
fn test_same_input_renders_identically_under_two_prefixes() -> Result<()> {
    let dir = TempDir::new()?;
    let wav = dir.path().join("tone.wav");
    common::write_sine_wav(&wav, 44100, 1, 0.5)?;

    let exporter = SpectrogramExporter::new(small_config(), dir.path())?;
    let first = exporter.export(&wav, "first")?;
    let second = exporter.export(&wav, "second")?;

    assert_ne!(first, second);
    let first = image::open(&first)?.to_rgb8();
    let second = image::open(&second)?.to_rgb8();
    assert_eq!(first.as_raw(), second.as_raw());

    Ok(())
}

#[test]
fn test_other_sample_rates_are_resampled() -> Result<()> {
    let dir = TempDir::new()?;
    let wav = dir.path().join("stereo-48k.wav");
    common::write_sine_wav(&wav, 48000, 2, 0.5)?;

    let png = export_spectrogram(&wav, "resampled", dir.path())?;
    assert!(png.exists());

    Ok(())
}

#[test]
fn test_missing_recording_is_io_error() -> Result<()> {
    let dir = TempDir::new()?;
    let exporter = SpectrogramExporter::new(small_config(), dir.path())?;

    let result = exporter.export(dir.path().join("absent.wav"), "MySpectrogram");
    assert!(matches!(result, Err(AudioError::Io { .. })));

    Ok(())
}

#[test]
fn test_empty_recording_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let wav = dir.path().join("empty.wav");
    common::write_sine_wav(&wav, 44100, 1, 0.0)?;

    let exporter = SpectrogramExporter::new(small_config(), dir.path())?;
    assert!(matches!(
        exporter.export(&wav, "empty"),
        Err(AudioError::UnsupportedFormat(_))
    ));

    Ok(())
}

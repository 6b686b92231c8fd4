// Integration tests for audio file decoding
//
// These tests verify that we can read WAV files, measure their duration, and
// surface decoding failures as typed errors.

mod common;

use anyhow::Result;
use approx::assert_relative_eq;
use playrec::audio::{calculate_duration, AudioFile};
use playrec::AudioError;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tone.wav");
    common::write_sine_wav(&path, 44100, 1, 0.5)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.source_bits, 16);
    assert_eq!(audio.samples.len(), 22050);
    assert_relative_eq!(audio.duration_seconds, 0.5, epsilon = 1e-9);
    assert_eq!(audio.path, path);

    Ok(())
}

#[test]
fn test_duration_is_exact_for_wav() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("three-seconds.wav");
    common::write_sine_wav(&path, 44100, 1, 3.0)?;

    let duration = calculate_duration(&path)?;
    assert_relative_eq!(duration, 3.0, epsilon = 1e-9);

    Ok(())
}

#[test]
fn test_duration_counts_frames_not_samples_for_stereo() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    common::write_sine_wav(&path, 48000, 2, 1.5)?;

    assert_relative_eq!(calculate_duration(&path)?, 1.5, epsilon = 1e-9);

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.frame_count(), 72000);
    assert_eq!(
        audio.samples.len() % audio.channels as usize,
        0,
        "Total samples should be divisible by channel count"
    );

    Ok(())
}

#[test]
fn test_mono_mixdown_averages_channels() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    common::write_sine_wav(&path, 8000, 2, 0.25)?;

    let audio = AudioFile::open(&path)?;
    let mono = audio.to_mono_f32();
    assert_eq!(mono.len(), audio.frame_count());

    // Both channels carry the same tone, so the mix equals either channel
    for (i, &sample) in mono.iter().enumerate().take(200) {
        let left = audio.samples[i * 2] as f32 / 32768.0;
        assert_relative_eq!(sample, left, epsilon = 1e-4);
    }

    Ok(())
}

#[test]
fn test_load_mono_resamples_to_target_rate() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("low-rate.wav");
    common::write_sine_wav(&path, 22050, 1, 1.0)?;

    let samples = AudioFile::load_mono(&path, 44100)?;
    assert_eq!(samples.len(), 44100);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent_is_io_error() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");

    let result = calculate_duration(&path);
    assert!(
        matches!(result, Err(AudioError::Io { .. })),
        "Missing file should be an I/O error, got {:?}",
        result
    );
    assert!(matches!(AudioFile::open(&path), Err(AudioError::Io { .. })));
}

#[test]
fn test_garbage_wav_is_unsupported_format() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("not-audio.wav");
    fs::write(&path, b"this is not a RIFF file at all")?;

    let result = calculate_duration(&path);
    assert!(
        matches!(result, Err(AudioError::UnsupportedFormat(_))),
        "Garbage should be rejected as unsupported, got {:?}",
        result
    );

    Ok(())
}

#[test]
fn test_garbage_with_unknown_extension_is_unsupported_format() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("mystery.xyz");
    fs::write(&path, vec![0x5a_u8; 4096])?;

    assert!(matches!(
        AudioFile::open(&path),
        Err(AudioError::UnsupportedFormat(_))
    ));

    Ok(())
}

fn write_wav<S: hound::Sample + Copy>(
    path: &std::path::Path,
    bits: u16,
    format: hound::SampleFormat,
    rate: u32,
    samples: &[S],
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: bits,
        sample_format: format,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_8bit_wav_is_scaled_up_to_16bit() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("eight.wav");
    write_wav(&path, 8, hound::SampleFormat::Int, 8000, &[0i8, 1, -1, 127, -128])?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.source_bits, 8);
    assert_eq!(audio.samples, vec![0, 256, -256, 32512, -32768]);
    assert_relative_eq!(audio.duration_seconds, 5.0 / 8000.0, epsilon = 1e-12);

    Ok(())
}

#[test]
fn test_24bit_wav_keeps_the_top_16_bits() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("twentyfour.wav");
    write_wav(
        &path,
        24,
        hound::SampleFormat::Int,
        48000,
        &[0i32, 256, -256, 8_388_607, -8_388_608, 0x12_34_56],
    )?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.source_bits, 24);
    assert_eq!(audio.samples, vec![0, 1, -1, 32767, -32768, 0x1234]);
    assert_relative_eq!(calculate_duration(&path)?, 6.0 / 48000.0, epsilon = 1e-12);

    Ok(())
}

#[test]
fn test_32bit_int_wav_keeps_the_top_16_bits() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("thirtytwo.wav");
    write_wav(
        &path,
        32,
        hound::SampleFormat::Int,
        44100,
        &[0i32, 65536, -65536, i32::MAX, i32::MIN],
    )?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.source_bits, 32);
    assert_eq!(audio.samples, vec![0, 1, -1, 32767, -32768]);

    Ok(())
}

#[test]
fn test_float_wav_is_clamped_and_scaled() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("float.wav");
    write_wav(
        &path,
        32,
        hound::SampleFormat::Float,
        44100,
        &[0.0f32, 0.5, -0.5, 1.0, -1.0, 1.5, -3.0],
    )?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(
        audio.samples,
        vec![0, 16383, -16383, 32767, -32767, 32767, -32767]
    );
    assert_relative_eq!(audio.duration_seconds, 7.0 / 44100.0, epsilon = 1e-12);

    Ok(())
}

#[test]
fn test_unknown_extension_is_decoded_by_content() -> Result<()> {
    let dir = TempDir::new()?;
    let wav = dir.path().join("tone.wav");
    common::write_sine_wav(&wav, 22050, 2, 0.5)?;

    // Same RIFF bytes, but the extension no longer routes to the WAV reader
    let renamed = dir.path().join("tone.audio");
    fs::copy(&wav, &renamed)?;

    let expected = AudioFile::open(&wav)?;
    let decoded = AudioFile::open(&renamed)?;

    assert_eq!(decoded.sample_rate, 22050);
    assert_eq!(decoded.channels, 2);
    assert_eq!(decoded.source_bits, 16);
    assert_eq!(decoded.frame_count(), 11025);
    assert_eq!(decoded.samples, expected.samples);
    assert_relative_eq!(decoded.duration_seconds, 0.5, epsilon = 1e-9);

    // Duration comes from the container's frame count
    assert_relative_eq!(calculate_duration(&renamed)?, 0.5, epsilon = 1e-9);

    Ok(())
}

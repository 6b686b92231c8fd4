use hound::{SampleFormat, WavReader};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use super::resample::resample_mono;
use crate::error::{AudioError, AudioResult};

/// A fully decoded audio file, normalized to interleaved 16-bit PCM
pub struct AudioFile {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Bits per sample in the source container (informational)
    pub source_bits: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Decode `path`. WAV goes through hound, everything else through symphonia.
    pub fn open(path: impl AsRef<Path>) -> AudioResult<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let file = if is_wav(path) {
            Self::open_wav(path)?
        } else {
            Self::open_compressed(path)?
        };

        if file.channels == 0 || file.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{}: {} channels at {}Hz",
                path.display(),
                file.channels,
                file.sample_rate
            )));
        }

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            file.duration_seconds,
            file.sample_rate,
            file.channels,
            file.samples.len()
        );

        Ok(file)
    }

    fn open_wav(path: &Path) -> AudioResult<Self> {
        let reader = WavReader::open(path).map_err(|e| AudioError::from_wav_read(path, e))?;
        let spec = reader.spec();
        let frames = reader.duration();

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, bits) if bits <= 16 => {
                let shift = 16 - bits;
                reader
                    .into_samples::<i16>()
                    .map(|s| s.map(|v| v << shift))
                    .collect::<Result<_, _>>()
            }
            (SampleFormat::Int, bits) if bits <= 32 => {
                let shift = bits - 16;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<Result<_, _>>()
            }
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .map(|s| s.map(f32_to_i16))
                .collect::<Result<_, _>>(),
            (format, bits) => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "{}: {:?} samples with {} bits",
                    path.display(),
                    format,
                    bits
                )))
            }
        }
        .map_err(|e| AudioError::from_wav_read(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            duration_seconds: frames as f64 / spec.sample_rate as f64,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            source_bits: spec.bits_per_sample,
            samples,
        })
    }

    fn open_compressed(path: &Path) -> AudioResult<Self> {
        let mut source = ProbedSource::open(path)?;
        let mut decoder = symphonia::default::get_codecs()
            .make(&source.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::from_decode(path, e))?;

        let mut samples: Vec<i16> = Vec::new();
        let mut sample_rate = source.codec_params.sample_rate.unwrap_or(0);
        let mut channels = source
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);

        loop {
            let packet = match source.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(AudioError::from_decode(path, e)),
            };

            if packet.track_id() != source.track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;

                    let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet in {}: {}", path.display(), e);
                }
                Err(e) => return Err(AudioError::from_decode(path, e)),
            }
        }

        let frames = if channels == 0 {
            0
        } else {
            samples.len() / channels as usize
        };
        let duration_seconds = if sample_rate == 0 {
            0.0
        } else {
            frames as f64 / sample_rate as f64
        };

        Ok(Self {
            path: path.to_path_buf(),
            duration_seconds,
            sample_rate,
            channels,
            source_bits: source.codec_params.bits_per_sample.unwrap_or(16) as u16,
            samples,
        })
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Average channels into a mono signal in [-1.0, 1.0]
    pub fn to_mono_f32(&self) -> Vec<f32> {
        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
                sum / channels as f32
            })
            .collect()
    }

    /// Mono signal at `target_rate`
    pub fn load_mono(path: impl AsRef<Path>, target_rate: u32) -> AudioResult<Vec<f32>> {
        let file = Self::open(path)?;
        let mono = file.to_mono_f32();
        resample_mono(&mono, file.sample_rate, target_rate)
    }
}

/// Duration of `path` in seconds: frame count divided by sample rate
///
/// Exact for WAV. For compressed formats the container's frame count is used
/// when present, otherwise the file is decoded in full.
pub fn calculate_duration(path: impl AsRef<Path>) -> AudioResult<f64> {
    let path = path.as_ref();

    let duration = if is_wav(path) {
        let reader = WavReader::open(path).map_err(|e| AudioError::from_wav_read(path, e))?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{}: zero sample rate",
                path.display()
            )));
        }
        reader.duration() as f64 / spec.sample_rate as f64
    } else {
        let source = ProbedSource::open(path)?;
        match (source.codec_params.n_frames, source.codec_params.sample_rate) {
            (Some(frames), Some(rate)) if rate > 0 => frames as f64 / rate as f64,
            _ => {
                debug!("No frame count in container header, decoding {}", path.display());
                AudioFile::open(path)?.duration_seconds
            }
        }
    };

    info!("Duration of {}: {} seconds", path.display(), duration);
    Ok(duration)
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("wave"))
        .unwrap_or(false)
}

/// Container opened and probed, positioned at the first audio track
struct ProbedSource {
    format: Box<dyn FormatReader>,
    track_id: u32,
    codec_params: symphonia::core::codecs::CodecParameters,
}

impl ProbedSource {
    fn open(path: &Path) -> AudioResult<Self> {
        let file = File::open(path).map_err(|e| AudioError::io(path, e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::from_decode(path, e))?;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                AudioError::UnsupportedFormat(format!("{}: no audio track", path.display()))
            })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        Ok(Self {
            format,
            track_id,
            codec_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn test_wav_extension_detection() {
        assert!(is_wav(Path::new("a/b/take.WAV")));
        assert!(!is_wav(Path::new("take.mp3")));
        assert!(!is_wav(Path::new("noext")));
    }
}

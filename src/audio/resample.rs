// Sample rate conversion for analysis input
//
// Mono f32 signals are fed through rubato's FFT resampler in fixed input
// chunks. The final chunk is zero padded and the resampler delay is trimmed,
// so the output is aligned with the input and `len * to / from` long.

use rubato::audioadapter::Adapter;
use rubato::{Fft, FixedSync, Resampler};
use tracing::debug;

use crate::error::{AudioError, AudioResult};

const CHUNK_FRAMES: usize = 1024;

// Adapter over planar channel buffers
struct PlanarBuffer<'a> {
    data: &'a [Vec<f32>],
    channels: usize,
    frames: usize,
}

impl<'a> Adapter<'a, f32> for PlanarBuffer<'a> {
    fn channels(&self) -> usize {
        self.channels
    }
    fn frames(&self) -> usize {
        self.frames
    }
    fn read_sample(&self, channel: usize, frame: usize) -> Option<f32> {
        self.data.get(channel).and_then(|ch| ch.get(frame)).copied()
    }
    unsafe fn read_sample_unchecked(&self, channel: usize, frame: usize) -> f32 {
        *self.data.get_unchecked(channel).get_unchecked(frame)
    }
}

/// Resample a mono signal from `from_rate` to `to_rate`
pub fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> AudioResult<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::UnsupportedFormat(format!(
            "cannot resample {} Hz to {} Hz",
            from_rate, to_rate
        )));
    }

    let mut resampler = Fft::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        1,
        1,
        FixedSync::Input,
    )
    .map_err(|e| {
        AudioError::UnsupportedFormat(format!(
            "cannot resample {} Hz to {} Hz: {}",
            from_rate, to_rate, e
        ))
    })?;

    let expected = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + CHUNK_FRAMES * 2);
    let mut planar = vec![vec![0.0f32; CHUNK_FRAMES]];
    let mut pos = 0;

    while output.len() < expected + delay {
        let end = (pos + CHUNK_FRAMES).min(samples.len());
        let taken = end.saturating_sub(pos);
        let chunk = &mut planar[0];
        if taken > 0 {
            chunk[..taken].copy_from_slice(&samples[pos..end]);
        }
        chunk[taken..].fill(0.0);
        pos += CHUNK_FRAMES;

        let input = PlanarBuffer {
            data: &planar,
            channels: 1,
            frames: CHUNK_FRAMES,
        };
        let out = resampler
            .process(&input, 0, None)
            .map_err(|e| AudioError::UnsupportedFormat(format!("resampling failed: {}", e)))?;
        if out.frames() == 0 {
            break;
        }
        output.extend((0..out.frames()).filter_map(|i| out.read_sample(0, i)));
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    debug!(
        "Resampled {} samples at {} Hz to {} samples at {} Hz",
        samples.len(),
        from_rate,
        output.len(),
        to_rate
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_same_rate_is_identity() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_mono(&input, 44100, 44100).unwrap(), input);
    }

    #[test]
    fn test_output_length_follows_rate_ratio() {
        let up = resample_mono(&vec![0.0; 22050], 22050, 44100).unwrap();
        assert_eq!(up.len(), 44100);

        let down = resample_mono(&vec![0.0; 48000], 48000, 44100).unwrap();
        assert_eq!(down.len(), 44100);

        // Shorter than one chunk
        let short = resample_mono(&vec![0.0; 100], 16000, 44100).unwrap();
        assert_eq!(short.len(), 276);
    }

    #[test]
    fn test_sine_level_survives_resampling() {
        let input = sine(440.0, 48000, 48000);
        let out = resample_mono(&input, 48000, 44100).unwrap();

        // Skip the edges where the filter rings in and out
        let middle = &out[4410..out.len() - 4410];
        approx::assert_relative_eq!(rms(middle), rms(&input), max_relative = 0.02);
    }

    #[test]
    fn test_output_is_aligned_with_input() {
        // Silence followed by a tone; the onset should land at the same time
        let mut input = vec![0.0f32; 24000];
        input.extend(sine(440.0, 48000, 24000));
        let out = resample_mono(&input, 48000, 44100).unwrap();

        let onset = out.iter().position(|s| s.abs() > 0.1).unwrap();
        let expected = 22050;
        assert!(
            onset.abs_diff(expected) < 100,
            "onset at {}, expected near {}",
            onset,
            expected
        );
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(matches!(
            resample_mono(&[0.1], 0, 44100),
            Err(AudioError::UnsupportedFormat(_))
        ));
    }
}

//! Formant shifting
//!
//! Moves the spectral envelope by a ratio while keeping the harmonics where
//! they are. Each STFT frame is split into a cepstral envelope and the
//! residual fine structure; the envelope is resampled along the frequency
//! axis and re-applied, phases untouched.

use crate::dsp::effect::{check_param, map_channels, Bound};
use crate::dsp::spectral::Stft;
use crate::engine::AudioBuffer;
use crate::error::Result;
use rustfft::num_complex::Complex;
use tracing::warn;

const FFT_SIZE: usize = 1024;
const HOP: usize = FFT_SIZE / 4;
const CEPSTRAL_ORDER: usize = 40;

/// Spectral envelope warp by `ratio` in [0.5, 2.0]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantShifter {
    ratio: f32,
}

impl FormantShifter {
    pub fn new(ratio: f32) -> Result<Self> {
        check_param("formant_shift", "ratio", ratio, Bound::Closed(0.5, 2.0))?;
        Ok(Self { ratio })
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Shift every channel; a numerical failure returns the input unchanged
    pub fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        if (self.ratio - 1.0).abs() < 1e-6 || input.is_empty() {
            return input.clone();
        }
        let output = map_channels(input, |samples| self.shift_channel(samples));
        if !output.is_finite() {
            warn!(ratio = self.ratio, "formant shift produced non-finite samples, passing through");
            return input.clone();
        }
        output
    }

    fn shift_channel(&self, samples: &[f32]) -> Vec<f32> {
        let stft = Stft::new(FFT_SIZE, HOP);
        let bins = stft.num_bins();
        let frames: Vec<_> = stft
            .analyze(samples)
            .into_iter()
            .map(|frame| {
                let mags: Vec<f32> = frame.iter().map(|c| c.norm()).collect();
                let envelope = stft.cepstral_envelope(&mags, CEPSTRAL_ORDER);
                let half: Vec<Complex<f32>> = (0..bins)
                    .map(|k| {
                        let source = k as f32 / self.ratio;
                        let warped = interpolate(&envelope[..bins], source);
                        frame[k] * (warped / envelope[k].max(1e-10))
                    })
                    .collect();
                stft.mirror(&half)
            })
            .collect();
        stft.synthesize(&frames, samples.len())
    }
}

/// Linear interpolation at a fractional bin, holding the last value past the end
fn interpolate(curve: &[f32], pos: f32) -> f32 {
    let last = curve.len() - 1;
    if pos >= last as f32 {
        return curve[last];
    }
    let i = pos.floor() as usize;
    let frac = pos - i as f32;
    curve[i] * (1.0 - frac) + curve[i + 1] * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.49 ; "below range")]
    #[test_case(2.01 ; "above range")]
    #[test_case(f32::NAN ; "nan")]
    fn test_rejects_ratio(ratio: f32) {
        let err = FormantShifter::new(ratio).unwrap_err();
        assert_eq!(err.error_code(), "EFFECT_PARAMETER");
    }

    #[test]
    fn test_unity_is_identity() {
        let input = AudioBuffer::from_mono((0..500).map(|i| (i as f32 * 0.1).sin()).collect(), 16000);
        let shifter = FormantShifter::new(1.0).unwrap();
        assert_eq!(shifter.process(&input), input);
    }

    #[test]
    fn test_preserves_length() {
        let input = AudioBuffer::from_mono((0..3000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect(), 16000);
        let shifted = FormantShifter::new(1.5).unwrap().process(&input);
        assert_eq!(shifted.len(), input.len());
        assert!(shifted.is_finite());
    }

    #[test]
    fn test_interpolate_holds_end() {
        let curve = [1.0, 3.0, 5.0];
        assert_eq!(interpolate(&curve, 0.5), 2.0);
        assert_eq!(interpolate(&curve, 7.0), 5.0);
    }
}

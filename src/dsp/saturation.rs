//! Saturation Effect
//!
//! Normalized tanh waveshaping followed by a one-pole tone filter on the
//! wet path. The shaper is monotonic for every drive setting and maps
//! full scale to full scale, so drive changes color rather than level.

use crate::dsp::effect::{check_param, map_channels, Bound, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

// ============================================================================
// Constants
// ============================================================================

/// Pre-gain at drive = 1.0
const MAX_DRIVE_GAIN: f32 = 10.0;

/// Tone filter cutoff at tone = 0.0 (dark)
const TONE_MIN_HZ: f32 = 800.0;

/// Cutoff multiplier across the tone range (800 Hz to 20 kHz)
const TONE_SPAN: f32 = 25.0;

// ============================================================================
// Waveshaping Functions
// ============================================================================

/// Normalized tanh: `tanh(g x) / tanh(g)` with `g = 1 + 9 * drive`
#[inline]
pub fn waveshape(x: f32, drive: f32) -> f32 {
    let gain = 1.0 + drive * (MAX_DRIVE_GAIN - 1.0);
    (x * gain).tanh() / gain.tanh()
}

/// Saturation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturationParams {
    /// Drive amount: [0, 1]
    pub drive: f32,
    /// Tone: 0 (dark) to 1 (bright)
    pub tone: f32,
    /// Wet/dry balance: [0, 1]
    pub mix: f32,
}

impl Default for SaturationParams {
    fn default() -> Self {
        Self {
            drive: 0.3,
            tone: 0.6,
            mix: 0.5,
        }
    }
}

impl SaturationParams {
    pub fn validate(&self) -> Result<()> {
        check_param("saturation", "drive", self.drive, Bound::Closed(0.0, 1.0))?;
        check_param("saturation", "tone", self.tone, Bound::Closed(0.0, 1.0))?;
        check_param("saturation", "mix", self.mix, Bound::Closed(0.0, 1.0))
    }

    /// Tone filter cutoff in Hz
    pub fn tone_cutoff_hz(&self) -> f32 {
        TONE_MIN_HZ * TONE_SPAN.powf(self.tone)
    }
}

/// Waveshaping saturator
#[derive(Debug, Clone)]
pub struct Saturation {
    params: SaturationParams,
}

impl Saturation {
    pub fn new(params: SaturationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    fn process_channel(&self, input: &[f32], sample_rate: u32) -> Vec<f32> {
        let p = &self.params;
        let coeff = (-2.0 * PI * p.tone_cutoff_hz() / sample_rate as f32).exp();
        let mut lp = 0.0_f32;
        input
            .iter()
            .map(|&x| {
                let shaped = waveshape(x, p.drive);
                lp = shaped * (1.0 - coeff) + lp * coeff;
                x * (1.0 - p.mix) + lp * p.mix
            })
            .collect()
    }
}

impl Effect for Saturation {
    fn effect_type(&self) -> &'static str {
        "saturation"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        map_channels(input, |ch| self.process_channel(ch, input.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_sine_buffer(freq: f32, sample_rate: u32, len: usize, amp: f32) -> AudioBuffer {
        let samples = (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * amp)
            .collect();
        AudioBuffer::from_mono(samples, sample_rate)
    }

    /// Energy of the residual after removing the best-fit scaled input
    fn harmonic_residual(input: &AudioBuffer, output: &AudioBuffer) -> f64 {
        let x = input.channel(0);
        let y = output.channel(0);
        let xy: f64 = x.iter().zip(y).map(|(&a, &b)| a as f64 * b as f64).sum();
        let xx: f64 = x.iter().map(|&a| (a as f64).powi(2)).sum();
        let k = xy / xx;
        x.iter().zip(y).map(|(&a, &b)| (b as f64 - k * a as f64).powi(2)).sum()
    }

    #[test]
    fn test_waveshape_monotonic_and_bounded() {
        for &drive in &[0.0, 0.5, 1.0] {
            let mut prev = waveshape(-1.0, drive);
            for i in -99..=100 {
                let y = waveshape(i as f32 / 100.0, drive);
                assert!(y >= prev, "drive {drive}");
                prev = y;
            }
            assert!((waveshape(1.0, drive) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_more_drive_more_harmonics() {
        let input = create_sine_buffer(200.0, 16000, 8000, 0.8);
        let bright = |drive| SaturationParams { drive, tone: 1.0, mix: 1.0 };
        let low = Saturation::new(bright(0.1)).unwrap().process(&input);
        let high = Saturation::new(bright(0.9)).unwrap().process(&input);
        assert!(harmonic_residual(&input, &high) > harmonic_residual(&input, &low));
    }

    #[test]
    fn test_zero_mix_is_dry() {
        let sat = Saturation::new(SaturationParams { mix: 0.0, ..Default::default() }).unwrap();
        let input = create_sine_buffer(200.0, 16000, 800, 0.5);
        assert_eq!(sat.process(&input), input);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(Saturation::new(SaturationParams { drive: 1.1, ..Default::default() }).is_err());
        assert!(Saturation::new(SaturationParams { tone: -0.1, ..Default::default() }).is_err());
    }
}

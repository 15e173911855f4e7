//! Spectral freeze
//!
//! Captures the magnitude spectrum of one STFT frame at `freeze_point`,
//! resynthesizes it as a sustained texture with phases advancing at each
//! bin's center frequency, and cross-fades it in from the freeze point.

use super::effect::{check_param, map_channels, Bound, Effect};
use super::spectral::Stft;
use crate::engine::AudioBuffer;
use crate::error::Result;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

const FREEZE_FFT_SIZE: usize = 2048;

/// Spectral freeze parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralFreezeParams {
    /// Capture position as a fraction of the buffer: [0, 1]
    pub freeze_point: f32,
    /// Final weight of the frozen signal: [0, 1]
    pub blend: f32,
    /// Ramp from 0 to `blend` after the freeze point, in seconds: [0, 60]
    pub fade_duration_secs: f32,
}

impl Default for SpectralFreezeParams {
    fn default() -> Self {
        Self {
            freeze_point: 0.5,
            blend: 0.5,
            fade_duration_secs: 2.0,
        }
    }
}

impl SpectralFreezeParams {
    pub fn validate(&self) -> Result<()> {
        check_param("spectral_freeze", "freeze_point", self.freeze_point, Bound::Closed(0.0, 1.0))?;
        check_param("spectral_freeze", "blend", self.blend, Bound::Closed(0.0, 1.0))?;
        check_param(
            "spectral_freeze",
            "fade_duration_secs",
            self.fade_duration_secs,
            Bound::Closed(0.0, 60.0),
        )
    }
}

/// Spectral freeze effect
#[derive(Debug, Clone)]
pub struct SpectralFreeze {
    params: SpectralFreezeParams,
}

impl SpectralFreeze {
    pub fn new(params: SpectralFreezeParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Sustained resynthesis of the frame nearest `freeze_point`, `input.len()` samples long
    fn frozen_signal(&self, stft: &Stft, input: &[f32]) -> Vec<f32> {
        let frames = stft.analyze(input);
        let idx = ((self.params.freeze_point * input.len() as f32) as usize / stft.hop())
            .min(frames.len().saturating_sub(1));
        let bins = stft.num_bins();
        let magnitudes: Vec<f32> = frames[idx][..bins].iter().map(|c| c.norm()).collect();
        let advance: Vec<f32> = (0..bins)
            .map(|k| 2.0 * PI * k as f32 * stft.hop() as f32 / stft.fft_size() as f32)
            .collect();

        let mut phase: Vec<f32> = frames[idx][..bins].iter().map(|c| c.arg()).collect();
        let out_frames: Vec<_> = (0..frames.len())
            .map(|_| {
                let half: Vec<Complex<f32>> = magnitudes
                    .iter()
                    .zip(&phase)
                    .map(|(&m, &p)| Complex::from_polar(m, p))
                    .collect();
                for (p, a) in phase.iter_mut().zip(&advance) {
                    *p += a;
                }
                stft.mirror(&half)
            })
            .collect();
        stft.synthesize(&out_frames, input.len())
    }

    fn process_channel(&self, input: &[f32], sample_rate: u32) -> Vec<f32> {
        let p = &self.params;
        if p.blend == 0.0 || input.is_empty() {
            return input.to_vec();
        }
        let stft = Stft::new(FREEZE_FFT_SIZE, FREEZE_FFT_SIZE / 4);
        let frozen = self.frozen_signal(&stft, input);

        let start = (p.freeze_point * input.len() as f32) as usize;
        let fade_len = (p.fade_duration_secs * sample_rate as f32) as usize;
        input
            .iter()
            .zip(&frozen)
            .enumerate()
            .map(|(i, (&x, &f))| {
                let ramp = if i < start {
                    0.0
                } else if fade_len == 0 {
                    1.0
                } else {
                    ((i - start) as f32 / fade_len as f32).min(1.0)
                };
                let w = p.blend * ramp;
                x * (1.0 - w) + f * w
            })
            .collect()
    }
}

impl Effect for SpectralFreeze {
    fn effect_type(&self) -> &'static str {
        "spectral_freeze"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        map_channels(input, |ch| self.process_channel(ch, input.sample_rate))
    }
}

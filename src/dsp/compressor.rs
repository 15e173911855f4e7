//! Compressor effect
//!
//! Feed-forward compressor with linked-channel peak detection, a soft-knee
//! gain computer and one-pole attack/release smoothing of the gain.

use super::effect::{check_param, Bound, Effect};
use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorParams {
    /// Threshold level in dB: [-80, 0]
    pub threshold_db: f32,
    /// Compression ratio: [1, 100]
    pub ratio: f32,
    /// Attack time in milliseconds: (0, 1000]
    pub attack_ms: f32,
    /// Release time in milliseconds: (0, 5000]
    pub release_ms: f32,
    /// Knee width in dB (0 = hard knee): [0, 24]
    pub knee_db: f32,
    /// Makeup gain in dB: [0, 24]
    pub makeup_gain_db: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 3.0,
            attack_ms: 15.0,
            release_ms: 250.0,
            knee_db: 6.0,
            makeup_gain_db: 0.0,
        }
    }
}

impl CompressorParams {
    /// Validate parameters against their ranges
    pub fn validate(&self) -> Result<()> {
        check_param("compressor", "threshold_db", self.threshold_db, Bound::Closed(-80.0, 0.0))?;
        check_param("compressor", "ratio", self.ratio, Bound::Closed(1.0, 100.0))?;
        check_param("compressor", "attack_ms", self.attack_ms, Bound::AboveTo(0.0, 1000.0))?;
        check_param("compressor", "release_ms", self.release_ms, Bound::AboveTo(0.0, 5000.0))?;
        check_param("compressor", "knee_db", self.knee_db, Bound::Closed(0.0, 24.0))?;
        check_param("compressor", "makeup_gain_db", self.makeup_gain_db, Bound::Closed(0.0, 24.0))
    }
}

/// Compressor dynamics processor
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
}

impl Compressor {
    pub fn new(params: CompressorParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &CompressorParams {
        &self.params
    }

    /// Compute gain reduction for a given input level in dB
    /// Returns the gain change in dB (zero or negative)
    pub fn compute_gain_reduction_db(&self, input_db: f32) -> f32 {
        let threshold = self.params.threshold_db;
        let ratio = self.params.ratio;
        let knee = self.params.knee_db;

        if knee > 0.0 {
            let knee_start = threshold - knee / 2.0;
            let knee_end = threshold + knee / 2.0;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold + (input_db - threshold) / ratio) - input_db
            } else {
                // Quadratic interpolation for smooth knee
                let over = input_db - knee_start;
                (1.0 / ratio - 1.0) * over * over / (2.0 * knee)
            }
        } else if input_db <= threshold {
            0.0
        } else {
            (threshold + (input_db - threshold) / ratio) - input_db
        }
    }
}

/// One-pole smoothing coefficient for a time constant
#[inline]
pub(crate) fn time_to_coeff(time_ms: f32, sample_rate: u32) -> f32 {
    let samples = time_ms / 1000.0 * sample_rate as f32;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

impl Effect for Compressor {
    fn effect_type(&self) -> &'static str {
        "compressor"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let attack = time_to_coeff(self.params.attack_ms, input.sample_rate);
        let release = time_to_coeff(self.params.release_ms, input.sample_rate);
        let makeup = db_to_linear(self.params.makeup_gain_db);
        let mut gain = 1.0_f32;
        let mut output = input.clone();

        for frame in 0..input.len() {
            let level = input
                .samples
                .iter()
                .map(|ch| ch[frame].abs())
                .fold(0.0_f32, f32::max);
            let target = db_to_linear(self.compute_gain_reduction_db(linear_to_db(level)));

            let coeff = if target < gain { attack } else { release };
            gain = coeff * gain + (1.0 - coeff) * target;

            for ch in output.samples.iter_mut() {
                ch[frame] *= gain * makeup;
            }
        }
        output
    }
}

//! Limiter Effect
//!
//! Brickwall limiter. A fast envelope pulls the gain down ahead of the
//! ceiling and a final hard clip guarantees no sample exceeds it.

use crate::dsp::compressor::time_to_coeff;
use crate::dsp::effect::{check_param, Bound, Effect};
use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Very fast attack time for brickwall limiting (0.1ms)
const ATTACK_MS: f32 = 0.1;

/// Limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterParams {
    /// Ceiling in dBFS: [-60, 0]
    pub threshold_db: f32,
    /// Release time in milliseconds: (0, 5000]
    pub release_ms: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: -1.0,
            release_ms: 100.0,
        }
    }
}

impl LimiterParams {
    pub fn validate(&self) -> Result<()> {
        check_param("limiter", "threshold_db", self.threshold_db, Bound::Closed(-60.0, 0.0))?;
        check_param("limiter", "release_ms", self.release_ms, Bound::AboveTo(0.0, 5000.0))
    }

    /// Ceiling as linear amplitude
    pub fn ceiling_linear(&self) -> f32 {
        db_to_linear(self.threshold_db)
    }
}

/// Brickwall limiter effect
#[derive(Debug, Clone)]
pub struct Limiter {
    params: LimiterParams,
}

impl Limiter {
    pub fn new(params: LimiterParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn ceiling_linear(&self) -> f32 {
        self.params.ceiling_linear()
    }
}

impl Effect for Limiter {
    fn effect_type(&self) -> &'static str {
        "limiter"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let ceiling_db = self.params.threshold_db;
        let ceiling = self.ceiling_linear();
        let attack = time_to_coeff(ATTACK_MS, input.sample_rate);
        let release = time_to_coeff(self.params.release_ms, input.sample_rate);
        let mut envelope = 0.0_f32;
        let mut output = input.clone();

        for i in 0..input.len() {
            let peak = input
                .samples
                .iter()
                .map(|ch| ch[i].abs())
                .fold(0.0_f32, f32::max);

            let target = if peak > ceiling {
                (linear_to_db(peak) - ceiling_db).max(0.0)
            } else {
                0.0
            };

            let coeff = if target > envelope { attack } else { release };
            envelope = coeff * envelope + (1.0 - coeff) * target;
            let gain = db_to_linear(-envelope);

            for ch in output.samples.iter_mut() {
                let s = ch[i] * gain;
                // Final hard clip so the ceiling is never exceeded
                ch[i] = if s.abs() > ceiling { s.signum() * ceiling } else { s };
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_sine_buffer(amp: f32, len: usize) -> AudioBuffer {
        let samples = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin() * amp)
            .collect();
        AudioBuffer::from_mono(samples, 16000)
    }

    #[test]
    fn test_never_exceeds_ceiling() {
        for &threshold_db in &[-0.0, -1.0, -6.0, -24.0] {
            let limiter = Limiter::new(LimiterParams { threshold_db, release_ms: 50.0 }).unwrap();
            let output = limiter.process(&create_sine_buffer(4.0, 4000));
            assert!(output.peak() <= db_to_linear(threshold_db) + 1e-6);
        }
    }

    #[test]
    fn test_quiet_signal_passes() {
        let limiter = Limiter::new(LimiterParams::default()).unwrap();
        let input = create_sine_buffer(0.1, 2000);
        assert_eq!(limiter.process(&input), input);
    }

    #[test]
    fn test_rejects_positive_threshold() {
        assert!(Limiter::new(LimiterParams { threshold_db: 0.5, release_ms: 10.0 }).is_err());
        assert!(Limiter::new(LimiterParams { threshold_db: -1.0, release_ms: 0.0 }).is_err());
    }
}

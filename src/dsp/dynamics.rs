//! Master dynamics: compressor then limiter, each independently enabled.

use super::compressor::{Compressor, CompressorParams};
use super::effect::Effect;
use super::limiter::{Limiter, LimiterParams};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Full-scale ceiling used when the limiter is disabled
pub const FULL_SCALE: f32 = 1.0;

/// Master bus dynamics parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterDynamicsParams {
    pub compressor: Option<CompressorParams>,
    pub limiter: Option<LimiterParams>,
}

impl Default for MasterDynamicsParams {
    fn default() -> Self {
        Self {
            compressor: Some(CompressorParams::default()),
            limiter: Some(LimiterParams::default()),
        }
    }
}

/// Validated master dynamics stage
#[derive(Debug, Clone)]
pub struct MasterDynamics {
    compressor: Option<Compressor>,
    limiter: Option<Limiter>,
}

impl MasterDynamics {
    pub fn new(params: &MasterDynamicsParams) -> Result<Self> {
        Ok(Self {
            compressor: params.compressor.map(Compressor::new).transpose()?,
            limiter: params.limiter.map(Limiter::new).transpose()?,
        })
    }

    /// Highest absolute sample value the stage can emit
    pub fn ceiling(&self) -> f32 {
        self.limiter
            .as_ref()
            .map(|l| l.ceiling_linear())
            .unwrap_or(FULL_SCALE)
    }
}

impl Effect for MasterDynamics {
    fn effect_type(&self) -> &'static str {
        "master_dynamics"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let compressed = match &self.compressor {
            Some(c) => c.process(input),
            None => input.clone(),
        };
        match &self.limiter {
            Some(l) => l.process(&compressed),
            None => compressed.clamped(FULL_SCALE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud(len: usize) -> AudioBuffer {
        AudioBuffer::from_mono(
            (0..len).map(|i| if i % 2 == 0 { 3.0 } else { -3.0 }).collect(),
            8000,
        )
    }

    #[test]
    fn test_limiter_ceiling_respected() {
        let dynamics = MasterDynamics::new(&MasterDynamicsParams {
            compressor: Some(CompressorParams::default()),
            limiter: Some(LimiterParams { threshold_db: -3.0, release_ms: 50.0 }),
        })
        .unwrap();
        let output = dynamics.process(&loud(1000));
        assert!(output.peak() <= dynamics.ceiling() + 1e-6);
    }

    #[test]
    fn test_disabled_limiter_clamps_full_scale() {
        let dynamics = MasterDynamics::new(&MasterDynamicsParams { compressor: None, limiter: None }).unwrap();
        let output = dynamics.process(&loud(100));
        assert_eq!(output.peak(), FULL_SCALE);
    }

    #[test]
    fn test_invalid_compressor_rejected() {
        let params = MasterDynamicsParams {
            compressor: Some(CompressorParams { ratio: 0.0, ..Default::default() }),
            limiter: None,
        };
        assert!(MasterDynamics::new(&params).is_err());
    }
}

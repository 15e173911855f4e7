//! Effect Chain management
//!
//! A layer's effects are described by [`LayerEffectParams`], one optional
//! parameter block per effect. Building an [`EffectChain`] validates every
//! block up front; processing then runs the enabled effects in a fixed order:
//! 1. Resonant filter
//! 2. Bandpass filter
//! 3. Saturation
//! 4. Chorus
//! 5. Glitch
//! 6. Spectral freeze
//! 7. Delay
//! 8. Reverb (always last among time-based)

use super::chorus::{Chorus, ChorusParams};
use super::delay::{Delay, DelayParams};
use super::effect::Effect;
use super::filter::{BandpassFilter, BandpassFilterParams, ResonantFilter, ResonantFilterParams};
use super::freeze::{SpectralFreeze, SpectralFreezeParams};
use super::glitch::{Glitch, GlitchParams};
use super::reverb::{Reverb, ReverbParams};
use super::saturation::{Saturation, SaturationParams};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Optional parameter block per effect; `None` disables that effect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerEffectParams {
    pub resonant_filter: Option<ResonantFilterParams>,
    pub bandpass_filter: Option<BandpassFilterParams>,
    pub saturation: Option<SaturationParams>,
    pub chorus: Option<ChorusParams>,
    pub glitch: Option<GlitchParams>,
    pub spectral_freeze: Option<SpectralFreezeParams>,
    pub delay: Option<DelayParams>,
    pub reverb: Option<ReverbParams>,
}

impl LayerEffectParams {
    /// Validate every enabled block
    pub fn validate(&self) -> Result<()> {
        EffectChain::from_params(self).map(|_| ())
    }

    /// True when no effect is enabled
    pub fn is_empty(&self) -> bool {
        *self == LayerEffectParams::default()
    }
}

/// A constructed, validated effect
#[derive(Debug, Clone)]
pub enum ChainEffect {
    ResonantFilter(ResonantFilter),
    BandpassFilter(BandpassFilter),
    Saturation(Saturation),
    Chorus(Chorus),
    Glitch(Glitch),
    SpectralFreeze(SpectralFreeze),
    Delay(Delay),
    Reverb(Reverb),
}

impl ChainEffect {
    fn as_effect(&self) -> &dyn Effect {
        match self {
            ChainEffect::ResonantFilter(e) => e,
            ChainEffect::BandpassFilter(e) => e,
            ChainEffect::Saturation(e) => e,
            ChainEffect::Chorus(e) => e,
            ChainEffect::Glitch(e) => e,
            ChainEffect::SpectralFreeze(e) => e,
            ChainEffect::Delay(e) => e,
            ChainEffect::Reverb(e) => e,
        }
    }
}

impl Effect for ChainEffect {
    fn effect_type(&self) -> &'static str {
        self.as_effect().effect_type()
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        self.as_effect().process(input)
    }
}

/// Ordered chain of validated effects for one layer
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
    effects: Vec<ChainEffect>,
}

impl EffectChain {
    /// Build the chain, rejecting any out-of-range parameter
    pub fn from_params(params: &LayerEffectParams) -> Result<Self> {
        let mut effects = Vec::new();
        if let Some(p) = params.resonant_filter {
            effects.push(ChainEffect::ResonantFilter(ResonantFilter::new(p)?));
        }
        if let Some(p) = params.bandpass_filter {
            effects.push(ChainEffect::BandpassFilter(BandpassFilter::new(p)?));
        }
        if let Some(p) = params.saturation {
            effects.push(ChainEffect::Saturation(Saturation::new(p)?));
        }
        if let Some(p) = params.chorus {
            effects.push(ChainEffect::Chorus(Chorus::new(p)?));
        }
        if let Some(p) = params.glitch {
            effects.push(ChainEffect::Glitch(Glitch::new(p)?));
        }
        if let Some(p) = params.spectral_freeze {
            effects.push(ChainEffect::SpectralFreeze(SpectralFreeze::new(p)?));
        }
        if let Some(p) = params.delay {
            effects.push(ChainEffect::Delay(Delay::new(p)?));
        }
        if let Some(p) = params.reverb {
            effects.push(ChainEffect::Reverb(Reverb::new(p)?));
        }
        Ok(Self { effects })
    }

    /// Number of effects in the chain
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Check if chain is empty
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Effect type identifiers in processing order
    pub fn effect_types(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.effect_type()).collect()
    }

    /// Run every effect in order, failing on the first non-finite output
    pub fn process(&self, input: &AudioBuffer, layer: &str) -> Result<AudioBuffer> {
        let mut current = input.clone();
        for effect in &self.effects {
            debug!(layer, effect = effect.effect_type(), "applying effect");
            current = effect.process(&current);
            current.ensure_finite(effect.effect_type(), Some(layer))?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::glitch::GlitchKind;
    use crate::error::PsalmodyError;
    use pretty_assertions::assert_eq;

    fn create_test_buffer(len: usize) -> AudioBuffer {
        let samples = (0..len).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();
        AudioBuffer::from_mono(samples, 8000)
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = EffectChain::from_params(&LayerEffectParams::default()).unwrap();
        assert!(chain.is_empty());
        let input = create_test_buffer(100);
        assert_eq!(chain.process(&input, "vocals").unwrap(), input);
    }

    #[test]
    fn test_fixed_order() {
        let params = LayerEffectParams {
            reverb: Some(ReverbParams::default()),
            saturation: Some(SaturationParams::default()),
            resonant_filter: Some(ResonantFilterParams::default()),
            delay: Some(DelayParams::default()),
            ..Default::default()
        };
        let chain = EffectChain::from_params(&params).unwrap();
        assert_eq!(
            chain.effect_types(),
            vec!["resonant_filter", "saturation", "delay", "reverb"]
        );
    }

    #[test]
    fn test_invalid_block_rejected_at_construction() {
        let params = LayerEffectParams {
            delay: Some(DelayParams { feedback: 1.0, ..Default::default() }),
            ..Default::default()
        };
        let err = EffectChain::from_params(&params).unwrap_err();
        assert!(matches!(err, PsalmodyError::EffectParameter { effect: "delay", .. }));
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_glitch_in_chain_changes_length() {
        let params = LayerEffectParams {
            glitch: Some(GlitchParams {
                kind: GlitchKind::Repeat { repeat_count: 2 },
                intensity: 1.0,
                chunk_size_ms: 10.0,
                seed: 1,
            }),
            ..Default::default()
        };
        let chain = EffectChain::from_params(&params).unwrap();
        let output = chain.process(&create_test_buffer(800), "percussion").unwrap();
        assert_eq!(output.len(), 1600);
    }

    #[test]
    fn test_serde_round_trip_of_sparse_params() {
        let json = r#"{"reverb":{"decay_time_secs":8.0},"chorus":null}"#;
        let params: LayerEffectParams = serde_json::from_str(json).unwrap();
        let reverb = params.reverb.unwrap();
        assert_eq!(reverb.decay_time_secs, 8.0);
        assert_eq!(reverb.mix, ReverbParams::default().mix);
        assert!(params.chorus.is_none());
    }
}

//! Vocal layering
//!
//! Layer 0 is the lead voice. Every further layer gets a pitch and timing
//! offset drawn from its own seeded stream, so any subset of layers can be
//! rendered in any order (or in parallel) with identical results.

use crate::dsp::effect::ms_to_samples;
use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use crate::rng::{create_rng, derive_layer_seed};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounds for randomized layer variation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerVariation {
    pub num_layers: u32,
    pub max_pitch_offset_semitones: f32,
    pub max_timing_offset_ms: f32,
    pub seed: u64,
}

impl Default for LayerVariation {
    fn default() -> Self {
        Self {
            num_layers: 3,
            max_pitch_offset_semitones: 0.3,
            max_timing_offset_ms: 35.0,
            seed: 0,
        }
    }
}

impl LayerVariation {
    pub fn validate(&self) -> Result<()> {
        if !(1..=16).contains(&self.num_layers) {
            return Err(PsalmodyError::config("vocal.layers.num_layers", self.num_layers, "1 to 16"));
        }
        let p = self.max_pitch_offset_semitones;
        if !(p.is_finite() && (0.0..=12.0).contains(&p)) {
            return Err(PsalmodyError::config("vocal.layers.max_pitch_offset_semitones", p, "0 to 12"));
        }
        let t = self.max_timing_offset_ms;
        if !(t.is_finite() && (0.0..=500.0).contains(&t)) {
            return Err(PsalmodyError::config("vocal.layers.max_timing_offset_ms", t, "0 to 500"));
        }
        Ok(())
    }

    /// Offsets for one layer; identical for identical `(seed, layer_index)`
    pub fn layer_spec(&self, layer_index: u32) -> VocalLayerSpec {
        if layer_index == 0 {
            return VocalLayerSpec { layer_index, pitch_offset_semitones: 0.0, timing_offset_ms: 0.0 };
        }
        let mut rng = create_rng(derive_layer_seed(self.seed, layer_index));
        let pitch = if self.max_pitch_offset_semitones > 0.0 {
            rng.gen_range(-self.max_pitch_offset_semitones..=self.max_pitch_offset_semitones)
        } else {
            0.0
        };
        let timing = if self.max_timing_offset_ms > 0.0 {
            rng.gen_range(0.0..=self.max_timing_offset_ms)
        } else {
            0.0
        };
        VocalLayerSpec { layer_index, pitch_offset_semitones: pitch, timing_offset_ms: timing }
    }

    pub fn layer_specs(&self) -> Vec<VocalLayerSpec> {
        (0..self.num_layers).map(|i| self.layer_spec(i)).collect()
    }
}

/// Variation applied to one vocal layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VocalLayerSpec {
    pub layer_index: u32,
    pub pitch_offset_semitones: f32,
    pub timing_offset_ms: f32,
}

/// Sum layers at their start delays and scale by `1 / n`
pub fn mix_layers(layers: &[(VocalLayerSpec, AudioBuffer)], sample_rate: u32) -> AudioBuffer {
    if layers.is_empty() {
        return AudioBuffer::from_mono(Vec::new(), sample_rate);
    }
    let delays: Vec<usize> = layers
        .iter()
        .map(|(spec, _)| ms_to_samples(spec.timing_offset_ms, sample_rate))
        .collect();
    let total = layers
        .iter()
        .zip(&delays)
        .map(|((_, buf), delay)| delay + buf.len())
        .max()
        .unwrap_or(0);

    let scale = 1.0 / layers.len() as f32;
    let mut out = vec![0.0_f32; total];
    for ((_, buf), &delay) in layers.iter().zip(&delays) {
        let mono = buf.to_mono();
        for (o, s) in out[delay..].iter_mut().zip(mono.channel(0)) {
            *o += s * scale;
        }
    }
    AudioBuffer::from_mono(out, sample_rate)
}

//! Ambient Generators
//!
//! Pads, drones and percussion that sit under the chant. Every generator is
//! stateless: the same parameters, length and sample rate always produce the
//! same mono buffer.

pub mod drone;
pub mod mode;
pub mod pad;
pub mod percussion;

pub use drone::DroneGenerator;
pub use mode::LiturgicalMode;
pub use pad::PadGenerator;
pub use percussion::PercussionGenerator;

use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Shared parameters for every ambient generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientParams {
    pub mode: LiturgicalMode,
    pub tempo_bpm: f32,
    /// Octave of the final (3 puts mode I's final on D3)
    pub base_octave: u8,
    /// Length of each pad chord in beats
    pub chord_beats: u32,
    /// Probability of a strike on beats other than bar starts
    pub percussion_density: f32,
    /// Fixed render length; `None` follows the vocal length plus tail
    pub duration_secs: Option<f32>,
    pub seed: u64,
}

impl Default for AmbientParams {
    fn default() -> Self {
        Self {
            mode: LiturgicalMode::Dorian,
            tempo_bpm: 60.0,
            base_octave: 3,
            chord_beats: 8,
            percussion_density: 0.25,
            duration_secs: None,
            seed: 0,
        }
    }
}

impl AmbientParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.tempo_bpm.is_finite() && (20.0..=240.0).contains(&self.tempo_bpm)) {
            return Err(PsalmodyError::config("ambient.tempo_bpm", self.tempo_bpm, "20 to 240"));
        }
        if !(1..=6).contains(&self.base_octave) {
            return Err(PsalmodyError::config("ambient.base_octave", self.base_octave, "1 to 6"));
        }
        if !(1..=64).contains(&self.chord_beats) {
            return Err(PsalmodyError::config("ambient.chord_beats", self.chord_beats, "1 to 64"));
        }
        let d = self.percussion_density;
        if !(d.is_finite() && (0.0..=1.0).contains(&d)) {
            return Err(PsalmodyError::config("ambient.percussion_density", d, "0 to 1"));
        }
        if let Some(secs) = self.duration_secs {
            if !(secs.is_finite() && secs > 0.0 && secs <= 3600.0) {
                return Err(PsalmodyError::config("ambient.duration_secs", secs, "(0, 3600]"));
            }
        }
        Ok(())
    }

    /// Samples per beat at `sample_rate`
    pub fn beat_samples(&self, sample_rate: u32) -> usize {
        ((60.0 / self.tempo_bpm as f64) * sample_rate as f64).round().max(1.0) as usize
    }
}

/// A stateless mono layer synthesizer
pub trait AmbientGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render exactly `num_samples` mono samples
    fn generate(&self, params: &AmbientParams, num_samples: usize, sample_rate: u32) -> AudioBuffer;
}

pub(crate) fn midi_to_hz(note: f64) -> f64 {
    440.0 * 2.0_f64.powf((note - 69.0) / 12.0)
}

/// Raised-cosine fade gain at `i` for a region of `len` samples with `fade` samples per side
pub(crate) fn edge_gain(i: usize, len: usize, fade: usize) -> f64 {
    if fade == 0 {
        return 1.0;
    }
    let from_edge = i.min(len.saturating_sub(1 + i));
    if from_edge >= fade {
        1.0
    } else {
        0.5 - 0.5 * (PI * from_edge as f64 / fade as f64).cos()
    }
}

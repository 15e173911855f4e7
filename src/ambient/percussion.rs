//! Sparse frame drum and bell
//!
//! Every bar start gets a low drum strike and a bell tuned two octaves above
//! the final. Other beats get a lighter strike with probability
//! `percussion_density`. Drums are modal membranes excited by a short noise
//! burst; bells use inharmonic partials.

use super::{midi_to_hz, AmbientGenerator, AmbientParams};
use crate::engine::AudioBuffer;
use crate::rng::component_rng;
use rand::Rng;
use rand_pcg::Pcg32;
use std::f64::consts::PI;

pub const BEATS_PER_BAR: usize = 4;

/// Circular membrane mode ratios
const MEMBRANE_MODES: [(f64, f64); 5] = [(1.0, 1.0), (1.593, 0.5), (2.135, 0.3), (2.295, 0.25), (2.653, 0.15)];
const BELL_PARTIALS: [(f64, f64); 4] = [(1.0, 1.0), (2.76, 0.5), (5.40, 0.25), (8.93, 0.12)];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strike {
    pub sample: usize,
    pub accent: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PercussionGenerator;

impl PercussionGenerator {
    /// Strike positions for a buffer of `num_samples`
    pub fn pattern(&self, params: &AmbientParams, num_samples: usize, sample_rate: u32) -> Vec<Strike> {
        let beat = params.beat_samples(sample_rate);
        let mut rng = component_rng(params.seed, "percussion");
        (0..num_samples.div_ceil(beat))
            .filter_map(|b| {
                let accent = b % BEATS_PER_BAR == 0;
                let roll: f32 = rng.gen();
                (accent || roll < params.percussion_density).then_some(Strike { sample: b * beat, accent })
            })
            .collect()
    }
}

fn add_drum(out: &mut [f64], start: usize, freq: f64, gain: f64, sr: f64, rng: &mut Pcg32) {
    let len = ((sr * 1.2) as usize).min(out.len().saturating_sub(start));
    let burst = (sr * 0.005) as usize;
    for (i, o) in out[start..start + len].iter_mut().enumerate() {
        let t = i as f64 / sr;
        let body: f64 = MEMBRANE_MODES
            .iter()
            .enumerate()
            .map(|(m, &(ratio, amp))| {
                let decay = 4.0 * (1.0 + m as f64 * 0.6);
                amp * (-decay * t).exp() * (2.0 * PI * freq * ratio * t).sin()
            })
            .sum();
        let noise = if i < burst {
            rng.gen_range(-1.0..1.0) * (1.0 - i as f64 / burst as f64) * 0.5
        } else {
            0.0
        };
        *o += (body + noise) * gain;
    }
}

fn add_bell(out: &mut [f64], start: usize, freq: f64, gain: f64, sr: f64) {
    let len = ((sr * 3.0) as usize).min(out.len().saturating_sub(start));
    for (i, o) in out[start..start + len].iter_mut().enumerate() {
        let t = i as f64 / sr;
        let tone: f64 = BELL_PARTIALS
            .iter()
            .enumerate()
            .filter(|(_, partial)| freq * partial.0 < sr / 2.0)
            .map(|(p, &(ratio, amp))| {
                let decay = 1.2 * (1.0 + p as f64);
                amp * (-decay * t).exp() * (2.0 * PI * freq * ratio * t).sin()
            })
            .sum();
        *o += tone * gain;
    }
}

impl AmbientGenerator for PercussionGenerator {
    fn name(&self) -> &'static str {
        "percussion"
    }

    fn generate(&self, params: &AmbientParams, num_samples: usize, sample_rate: u32) -> AudioBuffer {
        let sr = sample_rate as f64;
        let mut out = vec![0.0_f64; num_samples];
        let mut rng = component_rng(params.seed, "percussion/noise");
        let bell_freq = midi_to_hz(params.mode.final_midi(params.base_octave) as f64 + 24.0);

        for strike in self.pattern(params, num_samples, sample_rate) {
            if strike.accent {
                add_drum(&mut out, strike.sample, 70.0, 0.6, sr, &mut rng);
                add_bell(&mut out, strike.sample, bell_freq, 0.15, sr);
            } else {
                add_drum(&mut out, strike.sample, 110.0, 0.35, sr, &mut rng);
            }
        }
        AudioBuffer::from_mono(out.into_iter().map(|s| s as f32).collect(), sample_rate)
    }
}

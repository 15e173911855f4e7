//! Modal chord pad
//!
//! A seeded progression of diatonic triads in the current mode, starting and
//! ending on the final. Each chord tone is three slightly detuned additive
//! voices; neighbouring chords overlap with raised-cosine crossfades.

use super::{edge_gain, midi_to_hz, AmbientGenerator, AmbientParams};
use crate::engine::AudioBuffer;
use crate::rng::component_rng;
use rand::Rng;
use std::f64::consts::PI;

/// Scale degrees a chord may be built on (0 = final)
const CHORD_ROOTS: [usize; 6] = [0, 2, 3, 4, 5, 6];
const DETUNE_CENTS: [f64; 3] = [0.0, 6.0, -6.0];
const HARMONICS: [(f64, f64); 3] = [(1.0, 1.0), (2.0, 0.35), (3.0, 0.12)];
const VOICE_GAIN: f64 = 0.08;

#[derive(Debug, Clone, Copy, Default)]
pub struct PadGenerator;

impl PadGenerator {
    /// Chord root degrees for `count` chords
    pub fn progression(&self, params: &AmbientParams, count: usize) -> Vec<usize> {
        let mut rng = component_rng(params.seed, "pad");
        (0..count)
            .map(|i| {
                if i == 0 || i + 1 == count {
                    0
                } else {
                    CHORD_ROOTS[rng.gen_range(0..CHORD_ROOTS.len())]
                }
            })
            .collect()
    }
}

impl AmbientGenerator for PadGenerator {
    fn name(&self) -> &'static str {
        "pad"
    }

    fn generate(&self, params: &AmbientParams, num_samples: usize, sample_rate: u32) -> AudioBuffer {
        let mut out = vec![0.0_f64; num_samples];
        let chord_len = params.beat_samples(sample_rate) * params.chord_beats as usize;
        if num_samples == 0 || chord_len == 0 {
            return AudioBuffer::from_mono(vec![0.0; num_samples], sample_rate);
        }

        let count = num_samples.div_ceil(chord_len);
        let fade = (chord_len / 4).min(sample_rate as usize / 2);
        let sr = sample_rate as f64;

        for (chord_idx, root) in self.progression(params, count).into_iter().enumerate() {
            let start = (chord_idx * chord_len).saturating_sub(fade / 2);
            let end = ((chord_idx + 1) * chord_len + fade / 2).min(num_samples);
            let len = end - start;
            let notes = [root, root + 2, root + 4].map(|d| params.mode.degree_midi(params.base_octave, d) as f64);

            for note in notes {
                for cents in DETUNE_CENTS {
                    let freq = midi_to_hz(note + cents / 100.0);
                    for (ratio, amp) in HARMONICS {
                        let f = freq * ratio;
                        if f >= sr / 2.0 {
                            continue;
                        }
                        let step = 2.0 * PI * f / sr;
                        for (i, o) in out[start..end].iter_mut().enumerate() {
                            let t = (start + i) as f64;
                            *o += (step * t).sin() * amp * VOICE_GAIN * edge_gain(i, len, fade);
                        }
                    }
                }
            }
        }

        AudioBuffer::from_mono(out.into_iter().map(|s| s as f32).collect(), sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short() -> AmbientParams {
        AmbientParams { tempo_bpm: 240.0, chord_beats: 2, seed: 5, ..Default::default() }
    }

    #[test]
    fn test_exact_length_and_finite() {
        let pad = PadGenerator.generate(&short(), 12000, 8000);
        assert_eq!(pad.len(), 12000);
        assert!(pad.is_finite());
        assert!(pad.peak() > 0.0);
    }

    #[test]
    fn test_progression_starts_and_ends_on_final() {
        let progression = PadGenerator.progression(&short(), 6);
        assert_eq!(progression[0], 0);
        assert_eq!(progression[5], 0);
        assert!(progression.iter().all(|d| CHORD_ROOTS.contains(d)));
    }

    #[test]
    fn test_deterministic() {
        let a = PadGenerator.generate(&short(), 4000, 8000);
        let b = PadGenerator.generate(&short(), 4000, 8000);
        assert_eq!(a, b);
    }
}

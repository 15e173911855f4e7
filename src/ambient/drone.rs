//! Modal drone: the final, its reciting tone and a sub-octave under a slow swell.

use super::{edge_gain, midi_to_hz, AmbientGenerator, AmbientParams};
use crate::engine::AudioBuffer;
use crate::rng::component_rng;
use rand::Rng;
use std::f64::consts::PI;

const LFO_HZ: f64 = 0.07;
const LFO_DEPTH: f64 = 0.25;

#[derive(Debug, Clone, Copy, Default)]
pub struct DroneGenerator;

impl DroneGenerator {
    /// (frequency Hz, amplitude) of each drone voice
    pub fn voices(&self, params: &AmbientParams) -> [(f64, f64); 3] {
        let final_note = params.mode.final_midi(params.base_octave) as f64;
        let tenor = final_note + params.mode.tenor_offset() as f64;
        [
            (midi_to_hz(final_note - 12.0), 0.45),
            (midi_to_hz(final_note), 0.35),
            (midi_to_hz(tenor), 0.2),
        ]
    }
}

impl AmbientGenerator for DroneGenerator {
    fn name(&self) -> &'static str {
        "drone"
    }

    fn generate(&self, params: &AmbientParams, num_samples: usize, sample_rate: u32) -> AudioBuffer {
        let sr = sample_rate as f64;
        let mut rng = component_rng(params.seed, "drone");
        let lfo_phase = rng.gen_range(0.0..2.0 * PI);
        let voice_phases: Vec<f64> = (0..3).map(|_| rng.gen_range(0.0..2.0 * PI)).collect();
        let voices = self.voices(params);
        let fade = (num_samples / 4).min(sample_rate as usize);

        let samples = (0..num_samples)
            .map(|i| {
                let t = i as f64 / sr;
                let swell = 1.0 - LFO_DEPTH * 0.5 * (1.0 + (2.0 * PI * LFO_HZ * t + lfo_phase).sin());
                let tone: f64 = voices
                    .iter()
                    .zip(&voice_phases)
                    .map(|(&(freq, amp), &phase)| {
                        let x = 2.0 * PI * freq * t + phase;
                        amp * (x.sin() + 0.2 * (2.0 * x).sin())
                    })
                    .sum();
                (tone * swell * edge_gain(i, num_samples, fade) * 0.6) as f32
            })
            .collect();
        AudioBuffer::from_mono(samples, sample_rate)
    }
}

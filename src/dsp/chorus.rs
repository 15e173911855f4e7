//! Chorus effect with LFO-modulated delay voices.
//!
//! Each voice reads the shared delay line at its own LFO phase, so more
//! voices means more detuned copies layered over the dry signal.

use super::effect::{check_count, check_param, map_channels, ms_to_samples, Bound, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Chorus parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChorusParams {
    /// LFO rate in Hz: (0, 20]
    pub rate_hz: f32,
    /// Modulation depth relative to the base delay: [0, 1]
    pub depth: f32,
    /// Base delay in milliseconds: (0, 50]
    pub delay_ms: f32,
    /// Feedback of the voice sum into the line: [0, 1)
    pub feedback: f32,
    /// Wet/dry balance: [0, 1]
    pub mix: f32,
    /// Number of modulated voices: [1, 8]
    pub voices: u32,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            rate_hz: 0.6,
            depth: 0.4,
            delay_ms: 18.0,
            feedback: 0.1,
            mix: 0.4,
            voices: 3,
        }
    }
}

impl ChorusParams {
    pub fn validate(&self) -> Result<()> {
        check_param("chorus", "rate_hz", self.rate_hz, Bound::AboveTo(0.0, 20.0))?;
        check_param("chorus", "depth", self.depth, Bound::Closed(0.0, 1.0))?;
        check_param("chorus", "delay_ms", self.delay_ms, Bound::AboveTo(0.0, 50.0))?;
        check_param("chorus", "feedback", self.feedback, Bound::FromBelow(0.0, 1.0))?;
        check_param("chorus", "mix", self.mix, Bound::Closed(0.0, 1.0))?;
        check_count("chorus", "voices", self.voices, 1, 8)
    }
}

/// Delay line with interpolated read for modulation.
struct ModulatedDelayLine {
    buffer: Vec<f64>,
    write_pos: usize,
}

impl ModulatedDelayLine {
    fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(2)],
            write_pos: 0,
        }
    }

    fn write(&mut self, sample: f64) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    fn read_interpolated(&self, delay_samples: f64) -> f64 {
        let len = self.buffer.len();
        let delay_clamped = delay_samples.clamp(0.0, len as f64 - 2.0);
        let delay_int = delay_clamped.floor() as usize;
        let delay_frac = delay_clamped - delay_int as f64;

        let read_pos1 = (self.write_pos + len - delay_int - 1) % len;
        let read_pos2 = (self.write_pos + len - delay_int - 2) % len;

        self.buffer[read_pos1] * (1.0 - delay_frac) + self.buffer[read_pos2] * delay_frac
    }
}

/// Multi-voice chorus
#[derive(Debug, Clone)]
pub struct Chorus {
    params: ChorusParams,
}

impl Chorus {
    pub fn new(params: ChorusParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    fn process_channel(&self, input: &[f32], sample_rate: u32, channel_phase: f64) -> Vec<f32> {
        let p = &self.params;
        let sr = sample_rate as f64;
        let base = ms_to_samples(p.delay_ms, sample_rate).max(1) as f64;
        let swing = base * p.depth as f64;
        let mut line = ModulatedDelayLine::new((base + swing).ceil() as usize + 4);

        let voices = p.voices as usize;
        let voice_gain = 1.0 / (voices as f64).sqrt();
        let dry = 1.0 - p.mix as f64;
        let wet = p.mix as f64;
        let feedback = p.feedback as f64;
        let mut last_wet = 0.0;

        input
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                line.write(x as f64 + feedback * last_wet);
                let t = i as f64 / sr;
                let sum: f64 = (0..voices)
                    .map(|v| {
                        let phase = TWO_PI * v as f64 / voices as f64 + channel_phase;
                        let lfo = (TWO_PI * p.rate_hz as f64 * t + phase).sin();
                        line.read_interpolated(base + swing * (0.5 + 0.5 * lfo))
                    })
                    .sum();
                last_wet = sum / voices as f64;
                (x as f64 * dry + sum * voice_gain * wet) as f32
            })
            .collect()
    }
}

impl Effect for Chorus {
    fn effect_type(&self) -> &'static str {
        "chorus"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        if input.channels() <= 1 {
            return map_channels(input, |ch| self.process_channel(ch, input.sample_rate, 0.0));
        }
        AudioBuffer {
            samples: input
                .samples
                .iter()
                .enumerate()
                .map(|(idx, ch)| self.process_channel(ch, input.sample_rate, 0.5 * idx as f64))
                .collect(),
            sample_rate: input.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize, sample_rate: u32) -> AudioBuffer {
        let mut samples = vec![0.0; len];
        samples[0] = 1.0;
        AudioBuffer::from_mono(samples, sample_rate)
    }

    fn nonzero_taps(buffer: &AudioBuffer) -> usize {
        buffer.channel(0)[1..].iter().filter(|s| s.abs() > 1e-6).count()
    }

    #[test]
    fn test_parameter_validation() {
        assert!(Chorus::new(ChorusParams::default()).is_ok());
        assert!(Chorus::new(ChorusParams { voices: 0, ..Default::default() }).is_err());
        assert!(Chorus::new(ChorusParams { voices: 9, ..Default::default() }).is_err());
        assert!(Chorus::new(ChorusParams { feedback: 1.0, ..Default::default() }).is_err());
        assert!(Chorus::new(ChorusParams { rate_hz: 0.0, ..Default::default() }).is_err());
    }

    #[test]
    fn test_more_voices_thicken() {
        let input = impulse(4000, 16000);
        let base = ChorusParams { depth: 1.0, feedback: 0.0, mix: 1.0, ..Default::default() };
        let one = Chorus::new(ChorusParams { voices: 1, ..base }).unwrap();
        let four = Chorus::new(ChorusParams { voices: 4, ..base }).unwrap();
        assert!(nonzero_taps(&four.process(&input)) > nonzero_taps(&one.process(&input)));
    }

    #[test]
    fn test_preserves_length_and_finite() {
        let chorus = Chorus::new(ChorusParams { feedback: 0.9, ..Default::default() }).unwrap();
        let input = AudioBuffer::from_stereo(vec![0.3; 5000], vec![0.2; 5000], 16000);
        let output = chorus.process(&input);
        assert_eq!(output.len(), 5000);
        assert!(output.is_finite());
    }
}

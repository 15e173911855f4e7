//! Reverb effect implementation
//!
//! Implements the Freeverb topology:
//! - 8 parallel low-pass feedback comb filters
//! - 4 series allpass filters for diffusion
//! - Pre-delay line
//!
//! Comb feedback is derived from the requested decay time (RT60) rather than
//! an abstract room size, so `decay_time_secs` reads directly as tail length.

use super::effect::{check_param, ms_to_samples, Bound, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Reference sample rate for Freeverb delays
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz (8 filters)
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz (4 filters)
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Stereo spread offset in samples (for channels after the first)
const STEREO_SPREAD: usize = 23;

/// Input attenuation into the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Output scale for the wet signal
const WET_SCALE: f32 = 3.0;

/// Scale factor for damping parameter
const DAMP_SCALE: f32 = 0.4;

/// Largest allpass gain (diffusion = 1)
const MAX_ALLPASS_GAIN: f32 = 0.7;

/// Comb feedback ceiling for stability
const MAX_FEEDBACK: f32 = 0.98;

// ============================================================================
// Parameter Structs
// ============================================================================

/// Reverb effect parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParams {
    /// Time for the tail to decay by 60 dB: (0, 30] seconds
    pub decay_time_secs: f32,
    /// Pre-delay in milliseconds: [0, 500]
    pub pre_delay_ms: f32,
    /// Allpass diffusion: 0 (discrete echoes) to 1 (dense wash)
    pub diffusion: f32,
    /// Damping: 0 (bright) to 1 (dark)
    pub damping: f32,
    /// Wet/dry balance: 0 (dry) to 1 (wet)
    pub mix: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            decay_time_secs: 4.0,
            pre_delay_ms: 20.0,
            diffusion: 0.7,
            damping: 0.4,
            mix: 0.35,
        }
    }
}

impl ReverbParams {
    /// Validate all parameters are within range
    pub fn validate(&self) -> Result<()> {
        check_param("reverb", "decay_time_secs", self.decay_time_secs, Bound::AboveTo(0.0, 30.0))?;
        check_param("reverb", "pre_delay_ms", self.pre_delay_ms, Bound::Closed(0.0, 500.0))?;
        check_param("reverb", "diffusion", self.diffusion, Bound::Closed(0.0, 1.0))?;
        check_param("reverb", "damping", self.damping, Bound::Closed(0.0, 1.0))?;
        check_param("reverb", "mix", self.mix, Bound::Closed(0.0, 1.0))
    }
}

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass comb filter
///
/// y[n] = x[n - d] with the delayed sample fed back through a one-pole low-pass
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
    feedback: f32,
    damp1: f32,
    damp2: f32,
}

impl CombFilter {
    fn new(delay: usize, feedback: f32, damping: f32) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            filter_state: 0.0,
            feedback,
            damp1: 1.0 - damping * DAMP_SCALE,
            damp2: damping * DAMP_SCALE,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * self.damp1 + self.filter_state * self.damp2;
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

/// Schroeder allpass used for diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
    gain: f32,
}

impl AllpassFilter {
    fn new(delay: usize, gain: f32) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            gain,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = delayed - self.gain * input;
        self.buffer[self.pos] = input + self.gain * output;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

// ============================================================================
// Main Reverb Effect
// ============================================================================

/// Freeverb-style reverb; output has the same length as the input
#[derive(Debug, Clone)]
pub struct Reverb {
    params: ReverbParams,
}

impl Reverb {
    /// Create a reverb, rejecting out-of-range parameters
    pub fn new(params: ReverbParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ReverbParams {
        &self.params
    }

    /// Feedback that gives a 60 dB decay after `decay_time_secs` for a comb of `delay` samples
    fn comb_feedback(&self, delay: usize, sample_rate: u32) -> f32 {
        let delay_secs = delay as f32 / sample_rate as f32;
        10.0_f32
            .powf(-3.0 * delay_secs / self.params.decay_time_secs)
            .min(MAX_FEEDBACK)
    }

    fn process_channel(&self, input: &[f32], sample_rate: u32, spread: usize) -> Vec<f32> {
        let scale = sample_rate as f64 / REFERENCE_SAMPLE_RATE;
        let scaled = |d: usize| (((d + spread) as f64 * scale) as usize).max(1);

        let mut combs: Vec<CombFilter> = COMB_DELAYS
            .iter()
            .map(|&d| {
                let delay = scaled(d);
                CombFilter::new(delay, self.comb_feedback(delay, sample_rate), self.params.damping)
            })
            .collect();
        let allpass_gain = self.params.diffusion * MAX_ALLPASS_GAIN;
        let mut allpasses: Vec<AllpassFilter> = ALLPASS_DELAYS
            .iter()
            .map(|&d| AllpassFilter::new(scaled(d), allpass_gain))
            .collect();

        let pre_delay = ms_to_samples(self.params.pre_delay_ms, sample_rate);
        let dry_gain = 1.0 - self.params.mix;
        let wet_gain = self.params.mix * WET_SCALE;

        input
            .iter()
            .enumerate()
            .map(|(i, &dry)| {
                let delayed = if i >= pre_delay { input[i - pre_delay] } else { 0.0 };
                let feed = delayed * FIXED_GAIN;
                let mut wet: f32 = combs.iter_mut().map(|c| c.process(feed)).sum();
                for allpass in allpasses.iter_mut() {
                    wet = allpass.process(wet);
                }
                dry * dry_gain + wet * wet_gain
            })
            .collect()
    }
}

impl Effect for Reverb {
    fn effect_type(&self) -> &'static str {
        "reverb"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let sample_rate = input.sample_rate;
        AudioBuffer {
            samples: input
                .samples
                .iter()
                .enumerate()
                .map(|(idx, ch)| self.process_channel(ch, sample_rate, idx * STEREO_SPREAD))
                .collect(),
            sample_rate,
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

    fn tail_energy(buffer: &AudioBuffer, from: usize) -> f64 {
        buffer.channel(0)[from..].iter().map(|&s| (s as f64).powi(2)).sum()
    }

    #[test]
    fn test_parameter_validation() {
        assert!(Reverb::new(ReverbParams::default()).is_ok());
        let bad = ReverbParams { decay_time_secs: 0.0, ..Default::default() };
        assert!(Reverb::new(bad).is_err());
        let bad = ReverbParams { damping: 1.5, ..Default::default() };
        assert!(Reverb::new(bad).is_err());
        let bad = ReverbParams { pre_delay_ms: -1.0, ..Default::default() };
        assert!(Reverb::new(bad).is_err());
    }

    #[test]
    fn test_dry_only_is_identity() {
        let reverb = Reverb::new(ReverbParams { mix: 0.0, ..Default::default() }).unwrap();
        let input = impulse(1000, 16000);
        assert_eq!(reverb.process(&input), input);
    }

    #[test]
    fn test_longer_decay_longer_tail() {
        let input = impulse(32000, 16000);
        let short = Reverb::new(ReverbParams { decay_time_secs: 0.5, mix: 1.0, ..Default::default() }).unwrap();
        let long = Reverb::new(ReverbParams { decay_time_secs: 5.0, mix: 1.0, ..Default::default() }).unwrap();
        assert!(tail_energy(&long.process(&input), 16000) > tail_energy(&short.process(&input), 16000));
    }

    #[test]
    fn test_output_length_and_finite() {
        let reverb = Reverb::new(ReverbParams { decay_time_secs: 30.0, mix: 1.0, ..Default::default() }).unwrap();
        let input = AudioBuffer::from_stereo(vec![0.5; 4000], vec![-0.5; 4000], 16000);
        let output = reverb.process(&input);
        assert_eq!(output.len(), 4000);
        assert_eq!(output.channels(), 2);
        assert!(output.is_finite());
    }

    #[test]
    fn test_damping_darkens_tail() {
        // High damping removes sample-to-sample variation in the tail
        let input = impulse(16000, 16000);
        let bright = Reverb::new(ReverbParams { damping: 0.0, mix: 1.0, ..Default::default() }).unwrap();
        let dark = Reverb::new(ReverbParams { damping: 1.0, mix: 1.0, ..Default::default() }).unwrap();
        let roughness = |b: &AudioBuffer| -> f64 {
            let ch = b.channel(0);
            let diff: f64 = ch[4000..].windows(2).map(|w| ((w[1] - w[0]) as f64).powi(2)).sum();
            diff / tail_energy(b, 4000).max(1e-12)
        };
        assert!(roughness(&dark.process(&input)) < roughness(&bright.process(&input)));
    }
}

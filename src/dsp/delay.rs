//! Delay Effect
//!
//! Feedback echo over a circular buffer. Feedback is strictly below 1.0 so
//! the echo train always decays.

use crate::dsp::effect::{check_param, map_channels, ms_to_samples, Bound, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Delay parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayParams {
    /// Echo spacing in milliseconds: (0, 5000]
    pub delay_time_ms: f32,
    /// Echo feedback: [0, 1)
    pub feedback: f32,
    /// Wet/dry balance: [0, 1]
    pub mix: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_time_ms: 375.0,
            feedback: 0.35,
            mix: 0.25,
        }
    }
}

impl DelayParams {
    pub fn validate(&self) -> Result<()> {
        check_param("delay", "delay_time_ms", self.delay_time_ms, Bound::AboveTo(0.0, 5000.0))?;
        check_param("delay", "feedback", self.feedback, Bound::FromBelow(0.0, 1.0))?;
        check_param("delay", "mix", self.mix, Bound::Closed(0.0, 1.0))
    }
}

/// Feedback delay line
#[derive(Debug, Clone)]
pub struct Delay {
    params: DelayParams,
}

impl Delay {
    pub fn new(params: DelayParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    fn process_channel(&self, input: &[f32], delay_samples: usize) -> Vec<f32> {
        let mut buffer = vec![0.0_f32; delay_samples];
        let mut pos = 0;
        let dry_gain = 1.0 - self.params.mix;

        input
            .iter()
            .map(|&x| {
                let delayed = buffer[pos];
                buffer[pos] = x + delayed * self.params.feedback;
                pos = (pos + 1) % delay_samples;
                x * dry_gain + delayed * self.params.mix
            })
            .collect()
    }
}

impl Effect for Delay {
    fn effect_type(&self) -> &'static str {
        "delay"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let delay_samples = ms_to_samples(self.params.delay_time_ms, input.sample_rate).max(1);
        map_channels(input, |ch| self.process_channel(ch, delay_samples))
    }
}

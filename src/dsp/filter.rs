//! Resonant low-pass and band-pass filters
//!
//! Both use RBJ cookbook biquads in direct form I with f64 state. The
//! band-pass cascades `order` identical sections for a steeper skirt.

use super::effect::{check_count, check_param, map_channels, Bound, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

// ============================================================================
// Biquad Primitives
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    fn from_raw(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Clamp frequency below Nyquist and return (cos w0, alpha)
    fn prewarp(sample_rate: u32, frequency: f64, q: f64) -> (f64, f64) {
        let nyquist = sample_rate as f64 / 2.0;
        let freq = frequency.clamp(1.0, nyquist * 0.99);
        let w0 = 2.0 * PI * freq / sample_rate as f64;
        (w0.cos(), w0.sin() / (2.0 * q))
    }

    /// Low-pass with resonance peak of height ~Q at the cutoff
    pub(crate) fn low_pass(sample_rate: u32, cutoff: f64, q: f64) -> Self {
        let (cos_w0, alpha) = Self::prewarp(sample_rate, cutoff, q);
        Self::from_raw(
            (1.0 - cos_w0) / 2.0,
            1.0 - cos_w0,
            (1.0 - cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Constant 0 dB peak gain band-pass
    pub(crate) fn band_pass(sample_rate: u32, center: f64, q: f64) -> Self {
        let (cos_w0, alpha) = Self::prewarp(sample_rate, center, q);
        Self::from_raw(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    /// Run a whole channel through a fresh filter state
    pub(crate) fn run(&self, input: &[f32]) -> Vec<f32> {
        let mut state = BiquadState::default();
        input
            .iter()
            .map(|&x| state.process(x as f64, self) as f32)
            .collect()
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
        let output =
            c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

// ============================================================================
// Resonant Filter
// ============================================================================

/// Resonant low-pass parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonantFilterParams {
    /// Cutoff in Hz: (0, 40000]; clamped below Nyquist at process time
    pub cutoff_hz: f32,
    /// Resonance: (0, 40]
    pub q: f32,
}

impl Default for ResonantFilterParams {
    fn default() -> Self {
        Self {
            cutoff_hz: 2000.0,
            q: 2.0,
        }
    }
}

impl ResonantFilterParams {
    pub fn validate(&self) -> Result<()> {
        check_param("resonant_filter", "cutoff_hz", self.cutoff_hz, Bound::AboveTo(0.0, 40000.0))?;
        check_param("resonant_filter", "q", self.q, Bound::AboveTo(0.0, 40.0))
    }
}

/// Biquad low-pass with a resonance peak
#[derive(Debug, Clone)]
pub struct ResonantFilter {
    params: ResonantFilterParams,
}

impl ResonantFilter {
    pub fn new(params: ResonantFilterParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ResonantFilterParams {
        &self.params
    }
}

impl Effect for ResonantFilter {
    fn effect_type(&self) -> &'static str {
        "resonant_filter"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let coeffs = BiquadCoeffs::low_pass(
            input.sample_rate,
            self.params.cutoff_hz as f64,
            self.params.q as f64,
        );
        map_channels(input, |ch| coeffs.run(ch))
    }
}

// ============================================================================
// Bandpass Filter
// ============================================================================

/// Band-pass parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandpassFilterParams {
    /// Center frequency in Hz: (0, 40000]
    pub center_hz: f32,
    /// Bandwidth control: (0, 40]
    pub q: f32,
    /// Number of cascaded sections: [1, 8]
    pub order: u32,
}

impl Default for BandpassFilterParams {
    fn default() -> Self {
        Self {
            center_hz: 800.0,
            q: 1.0,
            order: 2,
        }
    }
}

impl BandpassFilterParams {
    pub fn validate(&self) -> Result<()> {
        check_param("bandpass_filter", "center_hz", self.center_hz, Bound::AboveTo(0.0, 40000.0))?;
        check_param("bandpass_filter", "q", self.q, Bound::AboveTo(0.0, 40.0))?;
        check_count("bandpass_filter", "order", self.order, 1, 8)
    }
}

/// Cascade of `order` band-pass biquads
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    params: BandpassFilterParams,
}

impl BandpassFilter {
    pub fn new(params: BandpassFilterParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl Effect for BandpassFilter {
    fn effect_type(&self) -> &'static str {
        "bandpass_filter"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let coeffs = BiquadCoeffs::band_pass(
            input.sample_rate,
            self.params.center_hz as f64,
            self.params.q as f64,
        );
        map_channels(input, |ch| {
            (0..self.params.order).fold(ch.to_vec(), |signal, _| coeffs.run(&signal))
        })
    }
}

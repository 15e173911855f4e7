//! Effect trait definition
//!
//! Every effect validates its parameters once, when it is constructed, and
//! from then on is a pure function `AudioBuffer -> AudioBuffer`. Filter and
//! delay-line state lives on the stack of a single `process` call, so the
//! same effect value can be shared across threads and reused across layers.

use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use std::fmt;

/// Base trait for all DSP effects
pub trait Effect: Send + Sync + fmt::Debug {
    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Transform `input` into a new buffer; `input` is left untouched
    fn process(&self, input: &AudioBuffer) -> AudioBuffer;
}

// ============================================================================
// Parameter Validation
// ============================================================================

/// Accepted interval for a numeric parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// `[min, max]`
    Closed(f32, f32),
    /// `(min, max]`
    AboveTo(f32, f32),
    /// `[min, max)`
    FromBelow(f32, f32),
    /// `(min, max)`
    Open(f32, f32),
    /// `[min, +inf)`
    AtLeast(f32),
}

impl Bound {
    /// Whether `value` lies inside the interval; NaN and infinities never do
    pub fn contains(&self, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        match *self {
            Bound::Closed(lo, hi) => value >= lo && value <= hi,
            Bound::AboveTo(lo, hi) => value > lo && value <= hi,
            Bound::FromBelow(lo, hi) => value >= lo && value < hi,
            Bound::Open(lo, hi) => value > lo && value < hi,
            Bound::AtLeast(lo) => value >= lo,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Bound::Closed(lo, hi) => write!(f, "[{}, {}]", lo, hi),
            Bound::AboveTo(lo, hi) => write!(f, "({}, {}]", lo, hi),
            Bound::FromBelow(lo, hi) => write!(f, "[{}, {})", lo, hi),
            Bound::Open(lo, hi) => write!(f, "({}, {})", lo, hi),
            Bound::AtLeast(lo) => write!(f, ">= {}", lo),
        }
    }
}

/// Reject `value` with an `EffectParameter` error unless it lies in `bound`
pub fn check_param(
    effect: &'static str,
    param: &'static str,
    value: f32,
    bound: Bound,
) -> Result<()> {
    if bound.contains(value) {
        Ok(())
    } else {
        Err(PsalmodyError::EffectParameter {
            effect,
            param,
            value: value.to_string(),
            expected: bound.to_string(),
        })
    }
}

/// Integer variant of [`check_param`] for counts (voices, order, repeats)
pub fn check_count(
    effect: &'static str,
    param: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PsalmodyError::EffectParameter {
            effect,
            param,
            value: value.to_string(),
            expected: format!("[{}, {}]", min, max),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert milliseconds to a sample count at `sample_rate`
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: u32) -> usize {
    ((ms as f64 / 1000.0) * sample_rate as f64).round().max(0.0) as usize
}

/// Apply `f` to each channel independently, preserving the sample rate
pub fn map_channels(input: &AudioBuffer, f: impl Fn(&[f32]) -> Vec<f32>) -> AudioBuffer {
    AudioBuffer {
        samples: input.samples.iter().map(|ch| f(ch)).collect(),
        sample_rate: input.sample_rate,
    }
}

//! Layer mixing
//!
//! Per-layer mix settings, constant-power panning and the render result
//! type. The [`SacredMachineryEngine`] does the actual mixdown.

pub mod engine;

pub use engine::SacredMachineryEngine;

use crate::dsp::{LayerEffectParams, MasterDynamics, MasterDynamicsParams};
use crate::dsp::{ChorusParams, DelayParams, ResonantFilterParams, ReverbParams};
use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_4, SQRT_2};
use std::fmt;

/// The four mix layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemKind {
    Vocals,
    Pads,
    Drones,
    Percussion,
}

impl StemKind {
    pub const ALL: [StemKind; 4] = [StemKind::Vocals, StemKind::Pads, StemKind::Drones, StemKind::Percussion];

    pub fn as_str(&self) -> &'static str {
        match self {
            StemKind::Vocals => "vocals",
            StemKind::Pads => "pads",
            StemKind::Drones => "drones",
            StemKind::Percussion => "percussion",
        }
    }
}

impl fmt::Display for StemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gain, pan and enable flag for one layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerMix {
    /// Linear gain applied after peak normalization
    pub gain: f32,
    /// -1.0 (left) to 1.0 (right); out-of-range values are clamped
    pub pan: f32,
    pub enabled: bool,
}

impl Default for LayerMix {
    fn default() -> Self {
        Self { gain: 1.0, pan: 0.0, enabled: true }
    }
}

impl LayerMix {
    pub fn new(gain: f32, pan: f32) -> Self {
        Self { gain, pan, enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false, ..Default::default() }
    }
}

/// Mix settings for a render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub sample_rate: u32,
    pub vocals: LayerMix,
    pub pads: LayerMix,
    pub drones: LayerMix,
    pub percussion: LayerMix,
    /// Peak every layer is normalized to before gain
    pub layer_peak: f32,
    /// Silence added after the vocal so effect tails ring out
    pub tail_secs: f32,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            vocals: LayerMix::new(1.0, 0.0),
            pads: LayerMix::new(0.55, -0.3),
            drones: LayerMix::new(0.45, 0.2),
            percussion: LayerMix::new(0.35, 0.1),
            layer_peak: 0.5,
            tail_secs: 2.0,
        }
    }
}

impl MixConfig {
    pub fn layer(&self, kind: StemKind) -> &LayerMix {
        match kind {
            StemKind::Vocals => &self.vocals,
            StemKind::Pads => &self.pads,
            StemKind::Drones => &self.drones,
            StemKind::Percussion => &self.percussion,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(PsalmodyError::config("mix.sample_rate", self.sample_rate, "8000 to 192000 Hz"));
        }
        for kind in StemKind::ALL {
            let layer = self.layer(kind);
            if !(layer.gain.is_finite() && (0.0..=4.0).contains(&layer.gain)) {
                return Err(PsalmodyError::config(format!("mix.{}.gain", kind), layer.gain, "0 to 4"));
            }
            if !layer.pan.is_finite() {
                return Err(PsalmodyError::config(format!("mix.{}.pan", kind), layer.pan, "a finite number"));
            }
        }
        if !(self.layer_peak.is_finite() && self.layer_peak > 0.0 && self.layer_peak <= 1.0) {
            return Err(PsalmodyError::config("mix.layer_peak", self.layer_peak, "(0, 1]"));
        }
        if !(self.tail_secs.is_finite() && (0.0..=30.0).contains(&self.tail_secs)) {
            return Err(PsalmodyError::config("mix.tail_secs", self.tail_secs, "0 to 30"));
        }
        Ok(())
    }
}

/// Effect blocks per layer plus the master bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub vocals: LayerEffectParams,
    pub pads: LayerEffectParams,
    pub drones: LayerEffectParams,
    pub percussion: LayerEffectParams,
    pub master: MasterDynamicsParams,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            vocals: LayerEffectParams {
                reverb: Some(ReverbParams { decay_time_secs: 5.0, mix: 0.4, ..Default::default() }),
                ..Default::default()
            },
            pads: LayerEffectParams {
                chorus: Some(ChorusParams::default()),
                reverb: Some(ReverbParams { decay_time_secs: 6.0, mix: 0.5, ..Default::default() }),
                ..Default::default()
            },
            drones: LayerEffectParams {
                resonant_filter: Some(ResonantFilterParams { cutoff_hz: 1200.0, q: 1.2 }),
                ..Default::default()
            },
            percussion: LayerEffectParams {
                delay: Some(DelayParams { delay_time_ms: 500.0, feedback: 0.3, mix: 0.2 }),
                reverb: Some(ReverbParams::default()),
                ..Default::default()
            },
            master: MasterDynamicsParams::default(),
        }
    }
}

impl EffectSettings {
    pub fn layer(&self, kind: StemKind) -> &LayerEffectParams {
        match kind {
            StemKind::Vocals => &self.vocals,
            StemKind::Pads => &self.pads,
            StemKind::Drones => &self.drones,
            StemKind::Percussion => &self.percussion,
        }
    }

    /// Construct every effect once so bad parameters surface before rendering
    pub fn validate(&self) -> Result<()> {
        for kind in StemKind::ALL {
            self.layer(kind).validate()?;
        }
        MasterDynamics::new(&self.master)?;
        Ok(())
    }
}

/// Master mix plus one stem per layer, all the same rate and length
#[derive(Debug, Clone, PartialEq)]
pub struct PsalmRenderResult {
    pub master: AudioBuffer,
    pub stems: BTreeMap<StemKind, AudioBuffer>,
}

impl PsalmRenderResult {
    pub fn stem(&self, kind: StemKind) -> Option<&AudioBuffer> {
        self.stems.get(&kind)
    }

    pub fn sample_rate(&self) -> u32 {
        self.master.sample_rate
    }

    pub fn len(&self) -> usize {
        self.master.len()
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.master.duration_secs()
    }
}

// ============================================================================
// Panning
// ============================================================================

/// Constant-power (left, right) gains for `pan`, clamped to [-1, 1]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (theta.cos(), theta.sin())
}

/// Place a layer in the stereo field
///
/// Mono input is spread with the constant-power law. Stereo input keeps its
/// channels and is balanced with the same law scaled so pan 0 is unity.
pub fn pan_buffer(input: &AudioBuffer, pan: f32) -> AudioBuffer {
    let (left_gain, right_gain) = pan_gains(pan);
    match input.num_channels() {
        2 => AudioBuffer::from_stereo(
            input.channel(0).iter().map(|s| s * left_gain * SQRT_2).collect(),
            input.channel(1).iter().map(|s| s * right_gain * SQRT_2).collect(),
            input.sample_rate,
        ),
        _ => {
            let mono = input.to_mono();
            let samples = mono.channel(0);
            AudioBuffer::from_stereo(
                samples.iter().map(|s| s * left_gain).collect(),
                samples.iter().map(|s| s * right_gain).collect(),
                input.sample_rate,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    #[test]
    fn test_pan_gains_constant_power() {
        for pan in [-1.0, -0.5, 0.0, 0.3, 1.0] {
            let (l, r) = pan_gains(pan);
            assert_relative_eq!(l * l + r * r, 1.0, epsilon = 1e-6);
        }
        let (l, r) = pan_gains(0.0);
        assert_relative_eq!(l, r, epsilon = 1e-6);
    }

    #[test]
    fn test_pan_clamped() {
        assert_eq!(pan_gains(-5.0), pan_gains(-1.0));
        assert_eq!(pan_gains(3.0), pan_gains(1.0));
    }

    #[test]
    fn test_pan_buffer_hard_left() {
        let input = AudioBuffer::from_mono(vec![0.5; 100], 8000);
        let panned = pan_buffer(&input, -1.0);
        assert_eq!(panned.num_channels(), 2);
        assert!(panned.channel_energy(0) > 0.0);
        assert!(panned.channel_energy(1) < 1e-9);
    }

    #[test]
    fn test_stereo_balance_unity_at_center() {
        let input = AudioBuffer::from_stereo(vec![0.2; 10], vec![0.4; 10], 8000);
        let panned = pan_buffer(&input, 0.0);
        assert_relative_eq!(panned.channel(0)[0], 0.2, epsilon = 1e-6);
        assert_relative_eq!(panned.channel(1)[0], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_default_settings_valid() {
        MixConfig::default().validate().unwrap();
        EffectSettings::default().validate().unwrap();
    }

    #[test_case(MixConfig { layer_peak: 0.0, ..Default::default() } ; "zero peak")]
    #[test_case(MixConfig { tail_secs: -1.0, ..Default::default() } ; "negative tail")]
    #[test_case(MixConfig { sample_rate: 100, ..Default::default() } ; "low rate")]
    #[test_case(MixConfig { pads: LayerMix::new(9.0, 0.0), ..Default::default() } ; "gain")]
    #[test_case(MixConfig { drones: LayerMix::new(1.0, f32::NAN), ..Default::default() } ; "nan pan")]
    fn test_invalid_mix(config: MixConfig) {
        assert_eq!(config.validate().unwrap_err().error_code(), "CONFIG_VALIDATION");
    }

    #[test]
    fn test_stem_kind_serde() {
        assert_eq!(serde_json::to_string(&StemKind::Percussion).unwrap(), "\"percussion\"");
        assert_eq!(StemKind::Drones.to_string(), "drones");
    }
}

//! Glitch effect
//!
//! The input is cut into fixed-size chunks; a seeded Bernoulli(intensity)
//! draw per chunk decides whether the chunk is rewritten by the configured
//! [`GlitchKind`]. Gate decisions are shared by all channels.

use super::effect::{check_count, check_param, ms_to_samples, Bound, Effect};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::rng::create_rng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Per-chunk transform applied when the gate fires
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GlitchKind {
    /// Tile the chunk `repeat_count` times (the output grows)
    Repeat { repeat_count: u32 },
    /// Repeat the chunk's leading `1/repeat_count` slice to fill the chunk
    Stutter { repeat_count: u32 },
    /// Decelerate playback from normal speed down to `speed` across the chunk
    TapeStop { speed: f32 },
    /// Quantize to `depth_bits` and hold each sample for `rate_factor` samples
    Bitcrush { depth_bits: u32, rate_factor: f32 },
}

impl GlitchKind {
    fn validate(&self) -> Result<()> {
        match *self {
            GlitchKind::Repeat { repeat_count } | GlitchKind::Stutter { repeat_count } => {
                check_count("glitch", "repeat_count", repeat_count, 2, 64)
            }
            GlitchKind::TapeStop { speed } => {
                check_param("glitch", "speed", speed, Bound::Open(0.0, 1.0))
            }
            GlitchKind::Bitcrush {
                depth_bits,
                rate_factor,
            } => {
                check_count("glitch", "depth_bits", depth_bits, 1, 16)?;
                check_param("glitch", "rate_factor", rate_factor, Bound::AtLeast(1.0))
            }
        }
    }

    fn apply(&self, chunk: &[f32]) -> Vec<f32> {
        match *self {
            GlitchKind::Repeat { repeat_count } => chunk.repeat(repeat_count as usize),
            GlitchKind::Stutter { repeat_count } => stutter(chunk, repeat_count as usize),
            GlitchKind::TapeStop { speed } => tape_stop(chunk, speed),
            GlitchKind::Bitcrush {
                depth_bits,
                rate_factor,
            } => bitcrush(chunk, depth_bits, rate_factor),
        }
    }
}

impl Default for GlitchKind {
    fn default() -> Self {
        GlitchKind::Stutter { repeat_count: 4 }
    }
}

fn stutter(chunk: &[f32], repeat_count: usize) -> Vec<f32> {
    let slice_len = (chunk.len() / repeat_count).max(1);
    let slice = &chunk[..slice_len.min(chunk.len())];
    slice.iter().copied().cycle().take(chunk.len()).collect()
}

fn tape_stop(chunk: &[f32], speed: f32) -> Vec<f32> {
    let len = chunk.len();
    if len == 0 {
        return Vec::new();
    }
    let last = len - 1;
    let mut pos = 0.0_f64;
    (0..len)
        .map(|i| {
            let progress = i as f32 / len as f32;
            let rate = 1.0 - (1.0 - speed) * progress;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            let sample = chunk[idx] * (1.0 - frac) + chunk[next] * frac;
            pos += rate as f64;
            sample * rate
        })
        .collect()
}

fn bitcrush(chunk: &[f32], depth_bits: u32, rate_factor: f32) -> Vec<f32> {
    let levels = 2.0_f32.powi(depth_bits as i32 - 1);
    let mut held = 0.0_f32;
    let mut slot = usize::MAX;
    chunk
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let current = (i as f32 / rate_factor) as usize;
            if current != slot {
                slot = current;
                held = (x * levels).round() / levels;
            }
            held
        })
        .collect()
}

/// Glitch parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlitchParams {
    pub kind: GlitchKind,
    /// Probability that a chunk is glitched: [0, 1]
    pub intensity: f32,
    /// Chunk length in milliseconds: (0, 2000]
    pub chunk_size_ms: f32,
    /// Seed for the gate stream
    pub seed: u64,
}

impl Default for GlitchParams {
    fn default() -> Self {
        Self {
            kind: GlitchKind::default(),
            intensity: 0.2,
            chunk_size_ms: 120.0,
            seed: 0,
        }
    }
}

impl GlitchParams {
    pub fn validate(&self) -> Result<()> {
        check_param("glitch", "intensity", self.intensity, Bound::Closed(0.0, 1.0))?;
        check_param("glitch", "chunk_size_ms", self.chunk_size_ms, Bound::AboveTo(0.0, 2000.0))?;
        self.kind.validate()
    }
}

/// Chunked glitch processor
#[derive(Debug, Clone)]
pub struct Glitch {
    params: GlitchParams,
}

impl Glitch {
    pub fn new(params: GlitchParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Gate decision per chunk, drawn from the seeded stream
    fn gates(&self, num_chunks: usize) -> Vec<bool> {
        let mut rng = create_rng(self.params.seed);
        (0..num_chunks)
            .map(|_| rng.gen::<f32>() < self.params.intensity)
            .collect()
    }
}

impl Effect for Glitch {
    fn effect_type(&self) -> &'static str {
        "glitch"
    }

    fn process(&self, input: &AudioBuffer) -> AudioBuffer {
        let chunk_len = ms_to_samples(self.params.chunk_size_ms, input.sample_rate).max(1);
        let gates = self.gates(input.len().div_ceil(chunk_len));

        AudioBuffer {
            samples: input
                .samples
                .iter()
                .map(|ch| {
                    ch.chunks(chunk_len)
                        .zip(&gates)
                        .flat_map(|(chunk, &gate)| {
                            if gate {
                                self.params.kind.apply(chunk)
                            } else {
                                chunk.to_vec()
                            }
                        })
                        .collect()
                })
                .collect(),
            sample_rate: input.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ramp(len: usize) -> AudioBuffer {
        AudioBuffer::from_mono((0..len).map(|i| i as f32 / len as f32).collect(), 1000)
    }

    fn always(kind: GlitchKind) -> Glitch {
        Glitch::new(GlitchParams {
            kind,
            intensity: 1.0,
            chunk_size_ms: 100.0,
            seed: 9,
        })
        .unwrap()
    }

    #[test_case(GlitchKind::Repeat { repeat_count: 1 } ; "repeat below two")]
    #[test_case(GlitchKind::Stutter { repeat_count: 65 } ; "stutter above max")]
    #[test_case(GlitchKind::TapeStop { speed: 1.0 } ; "tape stop full speed")]
    #[test_case(GlitchKind::TapeStop { speed: 0.0 } ; "tape stop zero speed")]
    #[test_case(GlitchKind::Bitcrush { depth_bits: 0, rate_factor: 1.0 } ; "bitcrush zero bits")]
    #[test_case(GlitchKind::Bitcrush { depth_bits: 17, rate_factor: 1.0 } ; "bitcrush too many bits")]
    #[test_case(GlitchKind::Bitcrush { depth_bits: 8, rate_factor: 0.5 } ; "bitcrush rate below one")]
    fn test_rejects_invalid_kind(kind: GlitchKind) {
        assert!(Glitch::new(GlitchParams { kind, ..Default::default() }).is_err());
    }

    #[test]
    fn test_repeat_count_grows_output() {
        let input = ramp(1000);
        let two = always(GlitchKind::Repeat { repeat_count: 2 }).process(&input);
        let three = always(GlitchKind::Repeat { repeat_count: 3 }).process(&input);
        assert_eq!(two.len(), 2000);
        assert_eq!(three.len(), 3000);
    }

    #[test]
    fn test_stutter_keeps_length() {
        let input = ramp(1000);
        let output = always(GlitchKind::Stutter { repeat_count: 4 }).process(&input);
        assert_eq!(output.len(), 1000);
        // First chunk (100 samples) repeats its first 25 samples
        assert_eq!(output.channel(0)[25], input.channel(0)[0]);
        assert_eq!(output.channel(0)[99], input.channel(0)[24]);
    }

    #[test]
    fn test_zero_intensity_is_identity() {
        let glitch = Glitch::new(GlitchParams {
            kind: GlitchKind::Repeat { repeat_count: 8 },
            intensity: 0.0,
            ..Default::default()
        })
        .unwrap();
        let input = ramp(1000);
        assert_eq!(glitch.process(&input), input);
    }

    #[test]
    fn test_gates_are_seeded() {
        let params = GlitchParams { intensity: 0.5, seed: 77, ..Default::default() };
        let a = Glitch::new(params).unwrap().gates(64);
        let b = Glitch::new(params).unwrap().gates(64);
        assert_eq!(a, b);
        assert!(a.iter().any(|&g| g) && a.iter().any(|&g| !g));
    }

    #[test]
    fn test_tape_stop_slows_down() {
        let input = ramp(1000);
        let output = always(GlitchKind::TapeStop { speed: 0.2 }).process(&input);
        assert_eq!(output.len(), 1000);
        // The end of each chunk reads material from well before the chunk end
        let ch = output.channel(0);
        assert!(ch[99] < input.channel(0)[99] * 0.5);
    }

    #[test]
    fn test_bitcrush_quantizes() {
        let input = ramp(1000);
        let output = always(GlitchKind::Bitcrush { depth_bits: 2, rate_factor: 1.0 }).process(&input);
        for &s in output.channel(0) {
            let scaled = s * 2.0;
            assert!((scaled - scaled.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_kind_serde_tag() {
        let json = r#"{"type":"tape_stop","speed":0.3}"#;
        let kind: GlitchKind = serde_json::from_str(json).unwrap();
        assert_eq!(kind, GlitchKind::TapeStop { speed: 0.3 });
    }
}

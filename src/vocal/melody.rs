//! Melody events and the melodic contour stage
//!
//! Each text segment with a matching melody event is pitch-shifted so that
//! its median fundamental lands on the event's pitch. Segments past the end
//! of the melody keep their synthesized pitch and extra events are ignored.

use crate::dsp::spectral::pitch_shift;
use crate::engine::buffer::slice_rms;
use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use crate::vocal::align::SegmentOffsets;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Largest contour correction applied to one segment, in semitones
pub const MAX_CONTOUR_SHIFT: f32 = 24.0;

/// One note of the target melody
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MelodyEvent {
    pub pitch_hz: f32,
    pub duration_sec: f32,
}

impl MelodyEvent {
    pub fn new(pitch_hz: f32, duration_sec: f32) -> Result<Self> {
        let event = Self { pitch_hz, duration_sec };
        event.validate()?;
        Ok(event)
    }

    /// Event for a MIDI note number (A4 = 69 = 440 Hz)
    pub fn from_midi(note: u8, duration_sec: f32) -> Result<Self> {
        Self::new(midi_to_hz(note as f32), duration_sec)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pitch_hz.is_finite() && self.pitch_hz > 0.0) {
            return Err(PsalmodyError::config("melody.pitch_hz", self.pitch_hz, "> 0"));
        }
        if !(self.duration_sec.is_finite() && self.duration_sec > 0.0) {
            return Err(PsalmodyError::config("melody.duration_sec", self.duration_sec, "> 0"));
        }
        Ok(())
    }

    /// Parse `"hz:sec,hz:sec,..."`
    pub fn parse_list(text: &str) -> Result<Vec<MelodyEvent>> {
        text.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let (pitch, duration) = item
                    .split_once(':')
                    .ok_or_else(|| PsalmodyError::config("melody", item, "hz:sec"))?;
                let pitch_hz = pitch
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| PsalmodyError::config("melody.pitch_hz", pitch, "a number"))?;
                let duration_sec = duration
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| PsalmodyError::config("melody.duration_sec", duration, "a number"))?;
                MelodyEvent::new(pitch_hz, duration_sec)
            })
            .collect()
    }
}

pub fn midi_to_hz(note: f32) -> f32 {
    440.0 * 2.0_f32.powf((note - 69.0) / 12.0)
}

/// Semitone distance from `from_hz` up to `to_hz`
pub fn semitones_between(from_hz: f32, to_hz: f32) -> f32 {
    12.0 * (to_hz / from_hz).log2()
}

// ============================================================================
// Pitch Estimation
// ============================================================================

const YIN_THRESHOLD: f32 = 0.15;
const VOICED_RMS: f32 = 1e-3;

/// Median fundamental of the voiced frames of `samples`, or `None` if unvoiced
///
/// Per-frame estimates use the cumulative mean normalized difference
/// function with parabolic refinement.
pub fn estimate_pitch(samples: &[f32], sample_rate: u32, min_hz: f32, max_hz: f32) -> Option<f32> {
    let sr = sample_rate as f32;
    let min_lag = (sr / max_hz).floor().max(2.0) as usize;
    let max_lag = (sr / min_hz).ceil() as usize;
    let window = max_lag;
    let hop = ((sr * 0.02) as usize).max(1);
    if samples.len() < window + max_lag + 1 {
        return None;
    }

    let mut estimates = Vec::new();
    let mut start = 0;
    while start + window + max_lag < samples.len() {
        let frame = &samples[start..start + window + max_lag + 1];
        if slice_rms(&frame[..window]) >= VOICED_RMS {
            if let Some(lag) = yin_lag(frame, window, min_lag, max_lag) {
                estimates.push(sr / lag);
            }
        }
        start += hop;
    }

    if estimates.is_empty() {
        return None;
    }
    estimates.sort_by(|a, b| a.total_cmp(b));
    Some(estimates[estimates.len() / 2])
}

fn yin_lag(frame: &[f32], window: usize, min_lag: usize, max_lag: usize) -> Option<f32> {
    let mut diff = vec![0.0_f32; max_lag + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        *d = (0..window)
            .map(|j| {
                let delta = frame[j] - frame[j + tau];
                delta * delta
            })
            .sum();
    }

    let mut cmnd = vec![1.0_f32; max_lag + 1];
    let mut running = 0.0_f32;
    for tau in 1..=max_lag {
        running += diff[tau];
        cmnd[tau] = if running > 0.0 { diff[tau] * tau as f32 / running } else { 1.0 };
    }

    let mut tau = min_lag;
    while tau < max_lag {
        if cmnd[tau] < YIN_THRESHOLD {
            while tau + 1 < max_lag && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            return Some(refine(&cmnd, tau));
        }
        tau += 1;
    }
    None
}

fn refine(curve: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= curve.len() {
        return tau as f32;
    }
    let (a, b, c) = (curve[tau - 1], curve[tau], curve[tau + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-12 {
        tau as f32
    } else {
        tau as f32 + 0.5 * (a - c) / denom
    }
}

// ============================================================================
// Melodic Contour
// ============================================================================

/// Pitch-shifts each segment toward its melody event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelodicContourApplier {
    pub min_pitch_hz: f32,
    pub max_pitch_hz: f32,
    pub fft_size: usize,
}

impl Default for MelodicContourApplier {
    fn default() -> Self {
        Self {
            min_pitch_hz: 60.0,
            max_pitch_hz: 1000.0,
            fft_size: 1024,
        }
    }
}

impl MelodicContourApplier {
    /// Return a copy of `audio` with segment regions retuned to `melody`
    ///
    /// `pitch_offset_semitones` transposes every target (used by vocal layers).
    /// Region lengths are preserved so `offsets` stay valid.
    pub fn apply(
        &self,
        audio: &AudioBuffer,
        offsets: &SegmentOffsets,
        melody: &[MelodyEvent],
        pitch_offset_semitones: f32,
    ) -> AudioBuffer {
        if melody.len() > offsets.len() {
            debug!(
                events = melody.len(),
                segments = offsets.len(),
                "ignoring melody events beyond the last segment"
            );
        }

        let transpose = 2.0_f32.powf(pitch_offset_semitones / 12.0);
        let mut samples = audio.to_mono().samples.into_iter().next().unwrap_or_default();
        for (index, (region, event)) in offsets.ranges().iter().zip(melody).enumerate() {
            let Some(segment) = samples.get(region.clone()) else {
                continue;
            };
            let Some(current) = estimate_pitch(segment, audio.sample_rate, self.min_pitch_hz, self.max_pitch_hz) else {
                warn!(segment = index, "no pitch detected, leaving segment at synthesized pitch");
                continue;
            };
            let target = event.pitch_hz * transpose;
            let shift = semitones_between(current, target).clamp(-MAX_CONTOUR_SHIFT, MAX_CONTOUR_SHIFT);
            debug!(segment = index, current, target, shift, "contour shift");
            let shifted = pitch_shift(segment, shift, self.fft_size);
            samples[region.clone()].copy_from_slice(&shifted);
        }
        AudioBuffer::from_mono(samples, audio.sample_rate)
    }
}

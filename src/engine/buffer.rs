//! Audio Buffer Management
//!
//! Provides the core audio buffer type and level utilities for Psalmody.
//! Stages never mutate a buffer after handing it on: every transform returns
//! a fresh `AudioBuffer`.

use crate::error::{PsalmodyError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default sample rate for rendered output (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_samples();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let rms = (buffer.energy() / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty buffers.
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    linear_to_db(buffer.peak())
}

/// RMS of a slice in linear amplitude
pub fn slice_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    #[default]
    Mono,
    /// Two channels (stereo: left, right)
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Core audio buffer type for all audio processing in Psalmody
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate Vec<f32>.
///
/// # Example
/// ```
/// use psalmody::engine::buffer::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(48000, ChannelLayout::Stereo, 48000);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 48000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the specified number of samples and layout
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        let num_channels = layout.num_channels();
        Self {
            samples: vec![vec![0.0_f32; num_samples]; num_channels],
            sample_rate,
        }
    }

    /// Wrap a single channel of samples
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: vec![samples],
            sample_rate,
        }
    }

    /// Wrap a left/right pair; the shorter channel is padded with silence
    pub fn from_stereo(mut left: Vec<f32>, mut right: Vec<f32>, sample_rate: u32) -> Self {
        let len = left.len().max(right.len());
        left.resize(len, 0.0);
        right.resize(len, 0.0);
        Self {
            samples: vec![left, right],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(PsalmodyError::processing(
                "buffer",
                format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
            ));
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }
        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Alias for channels()
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alias for len()
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.len()
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Average all channels down to one
    pub fn to_mono(&self) -> AudioBuffer {
        match self.channels() {
            0 => AudioBuffer::from_mono(Vec::new(), self.sample_rate),
            1 => self.clone(),
            n => {
                let scale = 1.0 / n as f32;
                let mono = (0..self.len())
                    .map(|i| self.samples.iter().map(|ch| ch[i]).sum::<f32>() * scale)
                    .collect();
                AudioBuffer::from_mono(mono, self.sample_rate)
            }
        }
    }

    /// Copy with every channel padded with silence or truncated to `len` samples
    pub fn fitted(&self, len: usize) -> AudioBuffer {
        let samples = self
            .samples
            .iter()
            .map(|ch| {
                let mut out = ch.clone();
                out.resize(len, 0.0);
                out
            })
            .collect();
        AudioBuffer {
            samples,
            sample_rate: self.sample_rate,
        }
    }

    /// Copy scaled by a linear gain
    pub fn with_gain(&self, gain: f32) -> AudioBuffer {
        self.map_samples(|s| s * gain)
    }

    /// Copy with `f` applied to every sample
    pub fn map_samples(&self, f: impl Fn(f32) -> f32) -> AudioBuffer {
        AudioBuffer {
            samples: self
                .samples
                .iter()
                .map(|ch| ch.iter().map(|&s| f(s)).collect())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Absolute peak in linear amplitude
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Copy scaled so its absolute peak equals `target`; silence stays silent
    pub fn normalized_to_peak(&self, target: f32) -> AudioBuffer {
        let peak = self.peak();
        if peak <= f32::EPSILON {
            return self.clone();
        }
        self.with_gain(target / peak)
    }

    /// Sum of squared samples across all channels
    pub fn energy(&self) -> f64 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum()
    }

    /// Sum of squared samples of one channel (0.0 if absent)
    pub fn channel_energy(&self, index: usize) -> f64 {
        self.samples
            .get(index)
            .map(|ch| ch.iter().map(|&s| (s as f64) * (s as f64)).sum())
            .unwrap_or(0.0)
    }

    /// Concatenate mono parts in order; all parts must share `sample_rate`
    pub fn concat_mono(parts: &[AudioBuffer], sample_rate: u32) -> AudioBuffer {
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let mut out = Vec::with_capacity(total);
        for part in parts {
            if let Some(ch) = part.samples.first() {
                out.extend_from_slice(ch);
            }
        }
        AudioBuffer::from_mono(out, sample_rate)
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Fail with an `AudioProcessing` error naming `stage` when any sample is non-finite
    pub fn ensure_finite(&self, stage: &str, layer: Option<&str>) -> Result<()> {
        if self.is_finite() {
            return Ok(());
        }
        Err(PsalmodyError::AudioProcessing {
            stage: stage.to_string(),
            layer: layer.map(str::to_string),
            reason: "non-finite samples (NaN or Inf) detected".to_string(),
        })
    }

    /// Copy with all samples clamped to [-limit, limit]
    pub fn clamped(&self, limit: f32) -> AudioBuffer {
        self.map_samples(|s| s.clamp(-limit, limit))
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Mono, DEFAULT_SAMPLE_RATE)
    }
}

// ============================================================================
// Tests
// ============================================================================

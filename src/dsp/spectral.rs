//! Short-time Fourier analysis/resynthesis
//!
//! Shared by the formant shifter, the phase vocoder and the spectral freeze.
//! Frames are centered (the signal is padded by half a window on each side)
//! and resynthesis divides by the accumulated squared window, so analysis
//! followed by synthesis at the same hop reproduces the input.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// One analysed frame: the full complex spectrum (`fft_size` bins)
pub type Spectrum = Vec<Complex<f32>>;

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}

/// Wrap a phase value into [-pi, pi]
#[inline]
pub fn wrap_phase(phase: f32) -> f32 {
    let two_pi = 2.0 * PI;
    phase - two_pi * ((phase + PI) / two_pi).floor()
}

/// STFT engine with planned forward/inverse transforms
pub struct Stft {
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("fft_size", &self.fft_size)
            .field("hop", &self.hop)
            .finish()
    }
}

impl Stft {
    /// `fft_size` is rounded up to a power of two (minimum 64); `hop` is clamped to [1, fft_size]
    pub fn new(fft_size: usize, hop: usize) -> Self {
        let fft_size = fft_size.max(64).next_power_of_two();
        let hop = hop.clamp(1, fft_size);
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft_size,
            hop,
            window: hann_window(fft_size),
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Number of non-redundant bins (DC through Nyquist)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Analyse `signal` into centered frames spaced `hop` apart
    pub fn analyze(&self, signal: &[f32]) -> Vec<Spectrum> {
        let half = self.fft_size / 2;
        let num_frames = signal.len().div_ceil(self.hop) + 1;
        let mut frames = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let center = frame_idx * self.hop;
            let mut buf: Spectrum = (0..self.fft_size)
                .map(|j| {
                    let pos = (center + j) as isize - half as isize;
                    let sample = if pos >= 0 {
                        signal.get(pos as usize).copied().unwrap_or(0.0)
                    } else {
                        0.0
                    };
                    Complex::new(sample * self.window[j], 0.0)
                })
                .collect();
            self.forward.process(&mut buf);
            frames.push(buf);
        }
        frames
    }

    /// Overlap-add `frames` (centered, `hop` apart) into exactly `out_len` samples
    pub fn synthesize(&self, frames: &[Spectrum], out_len: usize) -> Vec<f32> {
        let half = self.fft_size / 2;
        let scale = 1.0 / self.fft_size as f32;
        let padded_len = frames.len() * self.hop + self.fft_size;
        let mut acc = vec![0.0_f32; padded_len];
        let mut weight = vec![0.0_f32; padded_len];

        for (frame_idx, frame) in frames.iter().enumerate() {
            let mut buf = frame.clone();
            self.inverse.process(&mut buf);
            let start = frame_idx * self.hop;
            for j in 0..self.fft_size {
                let w = self.window[j];
                acc[start + j] += buf[j].re * scale * w;
                weight[start + j] += w * w;
            }
        }

        let max_weight = weight.iter().cloned().fold(0.0_f32, f32::max);
        let floor = (max_weight * 0.1).max(1e-6);
        (0..out_len)
            .map(|i| {
                let idx = i + half;
                match (acc.get(idx), weight.get(idx)) {
                    (Some(&a), Some(&w)) => a / w.max(floor),
                    _ => 0.0,
                }
            })
            .collect()
    }

    /// Cepstral spectral envelope of one frame's magnitudes (full `fft_size` bins)
    ///
    /// Keeps the lowest `order` quefrency coefficients; the result is a smooth
    /// positive curve the same length as `magnitudes`.
    pub fn cepstral_envelope(&self, magnitudes: &[f32], order: usize) -> Vec<f32> {
        let n = self.fft_size;
        let order = order.clamp(1, n / 2);
        let mut cep: Spectrum = magnitudes
            .iter()
            .map(|&m| Complex::new(m.max(1e-10).ln(), 0.0))
            .collect();
        self.inverse.process(&mut cep);
        let scale = 1.0 / n as f32;

        let mut liftered: Spectrum = vec![Complex::new(0.0, 0.0); n];
        liftered[0] = cep[0] * scale;
        for q in 1..order {
            liftered[q] = cep[q] * scale;
            liftered[n - q] = cep[n - q] * scale;
        }
        self.forward.process(&mut liftered);
        liftered.iter().map(|c| c.re.exp()).collect()
    }

    /// Rebuild the upper half of a spectrum from bins `0..=n/2` so the inverse is real
    pub fn mirror(&self, half_spectrum: &[Complex<f32>]) -> Spectrum {
        let n = self.fft_size;
        let mut full = vec![Complex::new(0.0, 0.0); n];
        for (k, &value) in half_spectrum.iter().take(n / 2 + 1).enumerate() {
            full[k] = value;
        }
        full[0].im = 0.0;
        full[n / 2].im = 0.0;
        for k in 1..n / 2 {
            full[n - k] = full[k].conj();
        }
        full
    }
}

// ============================================================================
// Phase Vocoder
// ============================================================================

/// Change the duration of `samples` by `ratio` without changing pitch
///
/// The output has exactly `round(len * ratio)` samples. Magnitudes are
/// interpolated between analysis frames and phases are advanced by each
/// bin's measured instantaneous frequency so partials stay continuous.
pub fn time_stretch(samples: &[f32], ratio: f64, fft_size: usize) -> Vec<f32> {
    let target = (samples.len() as f64 * ratio).round().max(0.0) as usize;
    if samples.is_empty() || target == 0 {
        return vec![0.0; target];
    }
    if (ratio - 1.0).abs() < 1e-9 {
        return samples.to_vec();
    }

    let stft = Stft::new(fft_size, fft_size / 4);
    let frames = stft.analyze(samples);
    let bins = stft.num_bins();
    let hop = stft.hop() as f32;
    let n = stft.fft_size() as f32;
    let expected: Vec<f32> = (0..bins).map(|k| 2.0 * PI * k as f32 * hop / n).collect();

    let mut phase: Vec<f32> = frames[0][..bins].iter().map(|c| c.arg()).collect();
    let step = 1.0 / ratio;
    let out_frames_needed = target / stft.hop() + 2;
    let mut out_frames = Vec::with_capacity(out_frames_needed);
    let last = frames.len() - 1;

    let mut t = 0.0_f64;
    while out_frames.len() < out_frames_needed {
        let i = (t.floor() as usize).min(last);
        let j = (i + 1).min(last);
        let frac = (t - i as f64).clamp(0.0, 1.0) as f32;

        let half: Vec<Complex<f32>> = (0..bins)
            .map(|k| {
                let mag = (1.0 - frac) * frames[i][k].norm() + frac * frames[j][k].norm();
                Complex::from_polar(mag, phase[k])
            })
            .collect();
        out_frames.push(stft.mirror(&half));

        for k in 0..bins {
            let delta = wrap_phase(frames[j][k].arg() - frames[i][k].arg() - expected[k]);
            phase[k] = wrap_phase(phase[k] + expected[k] + delta);
        }
        t += step;
    }

    stft.synthesize(&out_frames, target)
}

/// Linearly resample `samples` to exactly `out_len` samples
pub fn resample_linear(samples: &[f32], out_len: usize) -> Vec<f32> {
    if out_len == 0 || samples.is_empty() {
        return vec![0.0; out_len];
    }
    if samples.len() == out_len {
        return samples.to_vec();
    }
    let step = samples.len() as f64 / out_len as f64;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}

/// Shift pitch by `semitones` keeping the length exact
///
/// Stretches by the pitch ratio `p` and resamples back by `1/p`.
pub fn pitch_shift(samples: &[f32], semitones: f32, fft_size: usize) -> Vec<f32> {
    if semitones.abs() < 1e-6 || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = 2.0_f64.powf(semitones as f64 / 12.0);
    let stretched = time_stretch(samples, ratio, fft_size);
    resample_linear(&stretched, samples.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin() * 0.5)
            .collect()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
            .count()
    }

    #[test]
    fn test_analyze_synthesize_identity() {
        let signal = sine(440.0, 16000.0, 4000);
        let stft = Stft::new(512, 128);
        let frames = stft.analyze(&signal);
        let rebuilt = stft.synthesize(&frames, signal.len());
        assert_eq!(rebuilt.len(), signal.len());
        for (a, b) in signal.iter().zip(&rebuilt).skip(256).take(3000) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_time_stretch_exact_length() {
        let signal = sine(300.0, 16000.0, 3000);
        assert_eq!(time_stretch(&signal, 1.5, 512).len(), 4500);
        assert_eq!(time_stretch(&signal, 0.5, 512).len(), 1500);
        assert_eq!(time_stretch(&[], 2.0, 512).len(), 0);
    }

    #[test]
    fn test_time_stretch_preserves_pitch() {
        let sr = 16000.0;
        let signal = sine(400.0, sr, 8000);
        let stretched = time_stretch(&signal, 2.0, 1024);
        // Frequency = crossings / duration; should stay ~400 Hz
        let freq_in = zero_crossings(&signal) as f32 / (signal.len() as f32 / sr);
        let freq_out = zero_crossings(&stretched) as f32 / (stretched.len() as f32 / sr);
        assert!((freq_in - freq_out).abs() / freq_in < 0.05, "{freq_in} vs {freq_out}");
    }

    #[test]
    fn test_pitch_shift_octave_up() {
        let sr = 16000.0;
        let signal = sine(200.0, sr, 8000);
        let shifted = pitch_shift(&signal, 12.0, 1024);
        assert_eq!(shifted.len(), signal.len());
        let ratio = zero_crossings(&shifted) as f32 / zero_crossings(&signal) as f32;
        assert!((ratio - 2.0).abs() < 0.1, "ratio {ratio}");
    }

    #[test]
    fn test_resample_linear_length() {
        let out = resample_linear(&[0.0, 1.0, 2.0, 3.0], 8);
        assert_eq!(out.len(), 8);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cepstral_envelope_is_smooth_and_positive() {
        let stft = Stft::new(256, 64);
        let signal = sine(1000.0, 16000.0, 256);
        let frames = stft.analyze(&signal);
        let mags: Vec<f32> = frames[1].iter().map(|c| c.norm()).collect();
        let env = stft.cepstral_envelope(&mags, 20);
        assert_eq!(env.len(), 256);
        assert!(env.iter().all(|v| v.is_finite() && *v > 0.0));
    }
}

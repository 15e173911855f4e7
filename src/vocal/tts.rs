//! Text-to-speech adapters
//!
//! [`TtsAdapter`] is the seam to any speech engine. [`FormantSpeechSynth`]
//! is the built-in, fully deterministic engine: each letter becomes a short
//! phoneme rendered by a glottal pulse train (or seeded noise for unvoiced
//! consonants) through a bank of parallel formant resonators.

use crate::dsp::filter::BiquadCoeffs;
use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use crate::rng::{create_rng, derive_component_seed};
use crate::vocal::segmenter::TextSegment;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Renders raw mono speech for one text segment
pub trait TtsAdapter: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Sample rate of every buffer this adapter returns
    fn sample_rate(&self) -> u32;

    /// Render `segment`; failures are reported as `VocalSynthesis` errors
    fn synthesize(&self, segment: &TextSegment) -> Result<AudioBuffer>;
}

// ============================================================================
// Formant Speech Synth
// ============================================================================

/// Built-in speech engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormantSpeechConfig {
    pub sample_rate: u32,
    /// Glottal pulse frequency in Hz
    pub pitch_hz: f32,
    pub vowel_ms: f32,
    pub consonant_ms: f32,
    /// Silence split before and after each word
    pub word_gap_ms: f32,
    /// Peak amplitude of each rendered word
    pub amplitude: f32,
    pub seed: u64,
}

impl Default for FormantSpeechConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            pitch_hz: 140.0,
            vowel_ms: 150.0,
            consonant_ms: 55.0,
            word_gap_ms: 40.0,
            amplitude: 0.6,
            seed: 0x5053_414c,
        }
    }
}

impl FormantSpeechConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(PsalmodyError::config("speech.sample_rate", self.sample_rate, "8000 to 192000 Hz"));
        }
        let ranges = [
            ("speech.pitch_hz", self.pitch_hz, 50.0, 800.0),
            ("speech.vowel_ms", self.vowel_ms, 20.0, 2000.0),
            ("speech.consonant_ms", self.consonant_ms, 5.0, 1000.0),
            ("speech.word_gap_ms", self.word_gap_ms, 0.0, 2000.0),
            ("speech.amplitude", self.amplitude, 0.01, 1.0),
        ];
        for (field, value, min, max) in ranges {
            if !(value.is_finite() && value >= min && value <= max) {
                return Err(PsalmodyError::config(field, value, format!("{} to {}", min, max)));
            }
        }
        Ok(())
    }
}

/// (frequency Hz, amplitude, Q) per resonator
type FormantSet = [(f32, f32, f32); 4];

const VOWEL_A: FormantSet = [(800.0, 1.0, 5.0), (1200.0, 0.7, 6.0), (2800.0, 0.5, 7.0), (3500.0, 0.3, 8.0)];
const VOWEL_E: FormantSet = [(530.0, 1.0, 5.0), (1840.0, 0.7, 6.0), (2480.0, 0.5, 7.0), (3500.0, 0.3, 8.0)];
const VOWEL_I: FormantSet = [(280.0, 1.0, 5.0), (2250.0, 0.7, 6.0), (2890.0, 0.5, 7.0), (3500.0, 0.3, 8.0)];
const VOWEL_O: FormantSet = [(500.0, 1.0, 5.0), (1000.0, 0.7, 6.0), (2800.0, 0.5, 7.0), (3500.0, 0.3, 8.0)];
const VOWEL_U: FormantSet = [(310.0, 1.0, 5.0), (870.0, 0.7, 6.0), (2250.0, 0.5, 7.0), (3500.0, 0.3, 8.0)];
const NASAL: FormantSet = [(250.0, 1.0, 4.0), (1100.0, 0.25, 5.0), (2500.0, 0.15, 6.0), (3300.0, 0.1, 7.0)];
const LIQUID: FormantSet = [(360.0, 1.0, 4.0), (1300.0, 0.4, 5.0), (2700.0, 0.3, 6.0), (3500.0, 0.1, 7.0)];
const FRICATIVE: FormantSet = [(2500.0, 0.6, 2.0), (4200.0, 1.0, 2.0), (6000.0, 0.6, 2.0), (7500.0, 0.3, 2.0)];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phoneme {
    Vowel(FormantSet),
    Voiced(FormantSet),
    Unvoiced(FormantSet),
}

fn base_letter(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ā' | 'ă' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'ē' | 'ę' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'ī' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'ō' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'ū' => 'u',
        'ý' | 'ÿ' => 'y',
        'æ' | 'œ' => 'e',
        other => other,
    }
}

fn phoneme_for(c: char) -> Option<Phoneme> {
    let c = base_letter(c.to_lowercase().next().unwrap_or(c));
    match c {
        'a' => Some(Phoneme::Vowel(VOWEL_A)),
        'e' => Some(Phoneme::Vowel(VOWEL_E)),
        'i' | 'y' | 'j' => Some(Phoneme::Vowel(VOWEL_I)),
        'o' => Some(Phoneme::Vowel(VOWEL_O)),
        'u' | 'v' | 'w' => Some(Phoneme::Vowel(VOWEL_U)),
        'm' | 'n' => Some(Phoneme::Voiced(NASAL)),
        'l' | 'r' => Some(Phoneme::Voiced(LIQUID)),
        c if c.is_alphabetic() => Some(Phoneme::Unvoiced(FRICATIVE)),
        _ => None,
    }
}

/// Deterministic formant speech renderer
#[derive(Debug, Clone)]
pub struct FormantSpeechSynth {
    config: FormantSpeechConfig,
}

impl FormantSpeechSynth {
    pub fn new(config: FormantSpeechConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FormantSpeechConfig {
        &self.config
    }

    fn ms(&self, ms: f32) -> usize {
        (ms / 1000.0 * self.config.sample_rate as f32).round() as usize
    }

    /// Source excitation plus resonator bank for one phoneme
    fn render_phoneme(&self, phoneme: Phoneme, len: usize, glottal_phase: &mut f32, seed: u64) -> Vec<f32> {
        let sr = self.config.sample_rate;
        let (formants, voiced, gain) = match phoneme {
            Phoneme::Vowel(f) => (f, true, 1.0),
            Phoneme::Voiced(f) => (f, true, 0.5),
            Phoneme::Unvoiced(f) => (f, false, 0.25),
        };

        let source: Vec<f32> = if voiced {
            let step = self.config.pitch_hz / sr as f32;
            (0..len)
                .map(|_| {
                    let s = 1.0 - 2.0 * *glottal_phase;
                    *glottal_phase = (*glottal_phase + step).fract();
                    s
                })
                .collect()
        } else {
            let mut rng = create_rng(seed);
            (0..len).map(|_| rng.gen_range(-1.0_f32..1.0)).collect()
        };

        let mut out = vec![0.0_f32; len];
        for &(freq, amp, q) in formants.iter() {
            let coeffs = BiquadCoeffs::band_pass(sr, freq as f64, q as f64);
            for (o, s) in out.iter_mut().zip(coeffs.run(&source)) {
                *o += s * amp * gain;
            }
        }

        // Short raised-cosine edges between phonemes
        let edge = self.ms(6.0).min(len / 2);
        for i in 0..edge {
            let w = 0.5 - 0.5 * (PI * i as f32 / edge as f32).cos();
            out[i] *= w;
            out[len - 1 - i] *= w;
        }
        out
    }

    fn render_word(&self, segment: &TextSegment) -> Vec<f32> {
        let mut glottal_phase = 0.0_f32;
        let mut body = Vec::new();
        for (i, c) in segment.text.chars().enumerate() {
            let Some(phoneme) = phoneme_for(c) else {
                continue;
            };
            let len = match phoneme {
                Phoneme::Vowel(_) => self.ms(self.config.vowel_ms),
                _ => self.ms(self.config.consonant_ms),
            };
            let seed = derive_component_seed(self.config.seed, &format!("{}:{}", segment.text, i));
            body.extend(self.render_phoneme(phoneme, len, &mut glottal_phase, seed));
        }

        let peak = body.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        if peak > 0.0 {
            let scale = self.config.amplitude / peak;
            body.iter_mut().for_each(|s| *s *= scale);
        }

        let gap = self.ms(self.config.word_gap_ms) / 2;
        let mut word = vec![0.0_f32; gap];
        word.extend(body);
        word.extend(std::iter::repeat(0.0).take(gap));
        word
    }
}

impl TtsAdapter for FormantSpeechSynth {
    fn name(&self) -> &str {
        "formant"
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn synthesize(&self, segment: &TextSegment) -> Result<AudioBuffer> {
        let samples = self.render_word(segment);
        if samples.iter().all(|s| *s == 0.0) {
            return Err(PsalmodyError::VocalSynthesis {
                segment_index: segment.index,
                word: segment.text.clone(),
                reason: "no pronounceable letters".to_string(),
            });
        }
        Ok(AudioBuffer::from_mono(samples, self.config.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, index: usize) -> TextSegment {
        TextSegment {
            index,
            text: text.to_string(),
            span: 0..text.chars().count(),
        }
    }

    fn synth() -> FormantSpeechSynth {
        FormantSpeechSynth::new(FormantSpeechConfig::default()).unwrap()
    }

    #[test]
    fn test_deterministic_output() {
        let a = synth().synthesize(&segment("misereatur", 1)).unwrap();
        let b = synth().synthesize(&segment("misereatur", 1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duration_follows_letters() {
        let tts = synth();
        let cfg = tts.config().clone();
        let word = tts.synthesize(&segment("Deus", 0)).unwrap();
        // D, s consonants; e, u vowels; plus the word gap
        let expected_ms = 2.0 * cfg.consonant_ms + 2.0 * cfg.vowel_ms + cfg.word_gap_ms;
        let expected = (expected_ms / 1000.0 * cfg.sample_rate as f32) as usize;
        assert!((word.len() as i64 - expected as i64).abs() <= 4);
        assert_eq!(word.sample_rate, 24000);
    }

    #[test]
    fn test_peak_matches_amplitude() {
        let word = synth().synthesize(&segment("Gloria", 0)).unwrap();
        assert!((word.peak() - 0.6).abs() < 1e-4);
        assert!(word.is_finite());
    }

    #[test]
    fn test_accented_vowels() {
        let word = synth().synthesize(&segment("Glória", 0)).unwrap();
        let plain = synth().synthesize(&segment("Gloria", 0)).unwrap();
        assert_eq!(word.len(), plain.len());
    }

    #[test]
    fn test_unpronounceable_fails_with_index() {
        let err = synth().synthesize(&segment("123", 4)).unwrap_err();
        assert_eq!(err.segment_index(), Some(4));
        assert_eq!(err.error_code(), "VOCAL_SYNTHESIS");
    }

    #[test]
    fn test_invalid_config() {
        let config = FormantSpeechConfig { pitch_hz: 10.0, ..Default::default() };
        assert!(FormantSpeechSynth::new(config).is_err());
    }
}

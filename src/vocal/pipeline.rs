//! Vocal Synthesis Pipeline
//!
//! ```text
//! text -> segments -> TTS (per word) -> raw speech + offsets
//!      -> formant shift (optional)
//!      -> per layer: contour + duration alignment, or whole-layer pitch offset
//!      -> layer mix
//! ```
//!
//! Adapter calls are bounded by `adapter_timeout_ms`. TTS failure, including
//! a timeout, aborts the pipeline. Formant and alignment problems degrade
//! to pass-through.

use crate::dsp::spectral::pitch_shift;
use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use crate::vocal::align::{EnergyAligner, ForcedAligner, SegmentOffsets};
use crate::vocal::deadline::call_with_timeout;
use crate::vocal::duration::DurationAligner;
use crate::vocal::formant::FormantShifter;
use crate::vocal::layering::{mix_layers, LayerVariation, VocalLayerSpec};
use crate::vocal::melody::{MelodicContourApplier, MelodyEvent};
use crate::vocal::segmenter::{TextSegment, TextSegmenter};
use crate::vocal::tts::TtsAdapter;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Vocal stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocalConfig {
    /// Spectral envelope ratio; `None` skips the formant stage
    pub formant_shift_ratio: Option<f32>,
    pub layers: LayerVariation,
    pub stretch_fft_size: usize,
    pub adapter_timeout_ms: u64,
    pub contour: MelodicContourApplier,
    pub aligner: EnergyAligner,
}

impl Default for VocalConfig {
    fn default() -> Self {
        Self {
            formant_shift_ratio: None,
            layers: LayerVariation::default(),
            stretch_fft_size: 2048,
            adapter_timeout_ms: 30_000,
            contour: MelodicContourApplier::default(),
            aligner: EnergyAligner::default(),
        }
    }
}

impl VocalConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(ratio) = self.formant_shift_ratio {
            FormantShifter::new(ratio)?;
        }
        self.layers.validate()?;
        if !(256..=16384).contains(&self.stretch_fft_size) || !self.stretch_fft_size.is_power_of_two() {
            return Err(PsalmodyError::config(
                "vocal.stretch_fft_size",
                self.stretch_fft_size,
                "a power of two from 256 to 16384",
            ));
        }
        if self.adapter_timeout_ms == 0 {
            return Err(PsalmodyError::config("vocal.adapter_timeout_ms", 0, "> 0"));
        }
        let c = &self.contour;
        if !(c.min_pitch_hz > 0.0 && c.max_pitch_hz > c.min_pitch_hz && c.max_pitch_hz.is_finite()) {
            return Err(PsalmodyError::config(
                "vocal.contour",
                format!("{}..{}", c.min_pitch_hz, c.max_pitch_hz),
                "0 < min_pitch_hz < max_pitch_hz",
            ));
        }
        Ok(())
    }
}

/// Concatenated TTS output with the approximate region of every word
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpeech {
    pub audio: AudioBuffer,
    pub offsets: SegmentOffsets,
}

/// Text (+ optional melody) to one mono vocal buffer
pub struct VocalSynthesisPipeline {
    tts: Arc<dyn TtsAdapter>,
    aligner: Arc<dyn ForcedAligner>,
    segmenter: TextSegmenter,
    formant: Option<FormantShifter>,
    duration: DurationAligner,
    config: VocalConfig,
}

impl std::fmt::Debug for VocalSynthesisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VocalSynthesisPipeline")
            .field("tts", &self.tts.name())
            .field("aligner", &self.aligner.name())
            .field("config", &self.config)
            .finish()
    }
}

impl VocalSynthesisPipeline {
    pub fn new(
        tts: Arc<dyn TtsAdapter>,
        aligner: Arc<dyn ForcedAligner>,
        config: VocalConfig,
    ) -> Result<Self> {
        config.validate()?;
        let formant = config.formant_shift_ratio.map(FormantShifter::new).transpose()?;
        Ok(Self {
            tts,
            aligner,
            segmenter: TextSegmenter::new(),
            formant,
            duration: DurationAligner::new(config.stretch_fft_size)
                .with_timeout(Duration::from_millis(config.adapter_timeout_ms)),
            config,
        })
    }

    /// Pipeline using the built-in energy aligner from `config`
    pub fn with_energy_aligner(tts: Arc<dyn TtsAdapter>, config: VocalConfig) -> Result<Self> {
        let aligner = Arc::new(config.aligner.clone());
        Self::new(tts, aligner, config)
    }

    pub fn config(&self) -> &VocalConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.tts.sample_rate()
    }

    /// Full pipeline: segment, speak, shape and layer
    pub fn synthesize(&self, text: &str, melody: Option<&[MelodyEvent]>) -> Result<AudioBuffer> {
        let segments = self.segment(text)?;
        let raw = self.speak(&segments)?;
        self.layer(&segments, &raw, melody)
    }

    /// Split `text` into words; an empty result is a configuration error
    pub fn segment(&self, text: &str) -> Result<Vec<TextSegment>> {
        let segments = self.segmenter.segment(text);
        if segments.is_empty() {
            return Err(PsalmodyError::config("text", format!("{:?}", text), "at least one word"));
        }
        debug!(words = segments.len(), "segmented text");
        Ok(segments)
    }

    /// Run the TTS adapter over every segment and concatenate in order
    pub fn speak(&self, segments: &[TextSegment]) -> Result<RawSpeech> {
        let sample_rate = self.tts.sample_rate();
        let timeout = Duration::from_millis(self.config.adapter_timeout_ms);
        let mut parts = Vec::with_capacity(segments.len());

        for segment in segments {
            let fail = |reason: String| PsalmodyError::VocalSynthesis {
                segment_index: segment.index,
                word: segment.text.clone(),
                reason,
            };
            let tts = Arc::clone(&self.tts);
            let word = segment.clone();
            let audio = call_with_timeout(self.tts.name(), timeout, move || tts.synthesize(&word))
                .map_err(|e| fail(e.to_string()))?
                .map_err(|e| match e {
                    PsalmodyError::VocalSynthesis { .. } => e,
                    other => fail(other.to_string()),
                })?;
            if audio.sample_rate != sample_rate {
                return Err(fail(format!(
                    "adapter returned {} Hz audio, expected {} Hz",
                    audio.sample_rate, sample_rate
                )));
            }
            if !audio.is_finite() {
                return Err(fail("adapter returned non-finite samples".to_string()));
            }
            debug!(segment = segment.index, word = %segment.text, samples = audio.len(), "synthesized word");
            parts.push(audio.to_mono());
        }

        let lengths: Vec<usize> = parts.iter().map(|p| p.len()).collect();
        let audio = AudioBuffer::concat_mono(&parts, sample_rate);
        info!(
            tts = self.tts.name(),
            words = segments.len(),
            duration_secs = audio.duration_secs(),
            "speech synthesized"
        );
        Ok(RawSpeech { audio, offsets: SegmentOffsets::from_lengths(&lengths) })
    }

    /// Shape and layer raw speech into the final vocal buffer
    pub fn layer(
        &self,
        segments: &[TextSegment],
        raw: &RawSpeech,
        melody: Option<&[MelodyEvent]>,
    ) -> Result<AudioBuffer> {
        let shaped = match &self.formant {
            Some(shifter) => shifter.process(&raw.audio),
            None => raw.audio.clone(),
        };

        let specs = self.config.layers.layer_specs();
        let layers: Vec<(VocalLayerSpec, AudioBuffer)> = specs
            .into_par_iter()
            .map(|spec| {
                let buffer = self.render_layer(segments, &shaped, &raw.offsets, melody, &spec);
                (spec, buffer)
            })
            .collect();

        let vocal = mix_layers(&layers, shaped.sample_rate);
        vocal.ensure_finite("vocal_layering", Some("vocals"))?;
        info!(layers = layers.len(), duration_secs = vocal.duration_secs(), "vocal layers mixed");
        Ok(vocal)
    }

    fn render_layer(
        &self,
        segments: &[TextSegment],
        audio: &AudioBuffer,
        offsets: &SegmentOffsets,
        melody: Option<&[MelodyEvent]>,
        spec: &VocalLayerSpec,
    ) -> AudioBuffer {
        debug!(
            layer = spec.layer_index,
            pitch = spec.pitch_offset_semitones,
            timing_ms = spec.timing_offset_ms,
            "rendering vocal layer"
        );
        match melody {
            Some(events) if !events.is_empty() => {
                let tuned = self.config.contour.apply(audio, offsets, events, spec.pitch_offset_semitones);
                self.duration.align(&tuned, segments, offsets, Some(events), &self.aligner)
            }
            _ => {
                if spec.pitch_offset_semitones == 0.0 {
                    return audio.clone();
                }
                let mono = audio.to_mono();
                let shifted = pitch_shift(mono.channel(0), spec.pitch_offset_semitones, self.config.stretch_fft_size);
                let out = AudioBuffer::from_mono(shifted, audio.sample_rate);
                if out.is_finite() {
                    out
                } else {
                    warn!(layer = spec.layer_index, "layer pitch offset failed, using lead pitch");
                    audio.clone()
                }
            }
        }
    }
}

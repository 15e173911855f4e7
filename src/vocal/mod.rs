//! Vocal Synthesis
//!
//! Text segmentation, speech synthesis adapters, and the pitch, formant and
//! duration stages that turn raw speech into layered chant.

pub mod align;
pub mod bridge;
pub mod deadline;
pub mod duration;
pub mod formant;
pub mod layering;
pub mod melody;
pub mod pipeline;
pub mod segmenter;
pub mod tts;

pub use align::{AlignedSpan, AlignmentResult, EnergyAligner, ForcedAligner, SegmentOffsets};
pub use bridge::{BridgeSettings, HttpAligner, HttpTtsAdapter};
pub use duration::DurationAligner;
pub use formant::FormantShifter;
pub use layering::{mix_layers, LayerVariation, VocalLayerSpec};
pub use melody::{estimate_pitch, MelodicContourApplier, MelodyEvent};
pub use pipeline::{RawSpeech, VocalConfig, VocalSynthesisPipeline};
pub use segmenter::{TextSegment, TextSegmenter};
pub use tts::{FormantSpeechConfig, FormantSpeechSynth, TtsAdapter};

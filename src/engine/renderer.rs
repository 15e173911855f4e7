//! Psalm Renderer
//!
//! Drives one render from text to finished mix:
//!
//! ```text
//! segment -> speak -> layer vocals + generate ambient -> mix -> finalize
//! ```
//!
//! Every stage advances the [`RenderTracker`]. A fatal error moves the render
//! to `Failed`; a cancellation seen between stages moves it to `Cancelled`.

use crate::config::RenderConfig;
use crate::engine::state::{RenderState, RenderTracker};
use crate::error::{PsalmodyError, Result};
use crate::mixer::{PsalmRenderResult, SacredMachineryEngine};
use crate::vocal::{
    ForcedAligner, FormantSpeechSynth, MelodyEvent, TtsAdapter, VocalSynthesisPipeline,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span};
use uuid::Uuid;

/// Shared flag a caller sets to stop a render at the next stage boundary
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A finished render with its lifecycle record
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub render_id: Uuid,
    pub result: PsalmRenderResult,
    pub history: Vec<RenderState>,
}

impl RenderOutcome {
    pub fn state(&self) -> RenderState {
        self.history.last().copied().unwrap_or_default()
    }
}

/// End-to-end renderer built from one validated [`RenderConfig`]
#[derive(Debug)]
pub struct PsalmRenderer {
    config: RenderConfig,
    vocal: VocalSynthesisPipeline,
    engine: SacredMachineryEngine,
}

impl PsalmRenderer {
    /// Renderer using the built-in speech synth and energy aligner
    pub fn new(config: RenderConfig) -> Result<Self> {
        config.validate()?;
        let tts = Arc::new(FormantSpeechSynth::new(config.speech.clone())?);
        let aligner = Arc::new(config.vocal.aligner.clone());
        Self::with_adapters(config, tts, aligner)
    }

    /// Renderer with caller-supplied speech and alignment services
    pub fn with_adapters(
        config: RenderConfig,
        tts: Arc<dyn TtsAdapter>,
        aligner: Arc<dyn ForcedAligner>,
    ) -> Result<Self> {
        config.validate()?;
        let vocal = VocalSynthesisPipeline::new(tts, aligner, config.vocal.clone())?;
        let engine = SacredMachineryEngine::new(config.mix.clone(), &config.effects)?;
        Ok(Self { config, vocal, engine })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn render(&self, text: &str, melody: Option<&[MelodyEvent]>) -> Result<RenderOutcome> {
        self.render_with_cancel(text, melody, &CancellationToken::new())
    }

    pub fn render_with_cancel(
        &self,
        text: &str,
        melody: Option<&[MelodyEvent]>,
        cancel: &CancellationToken,
    ) -> Result<RenderOutcome> {
        let mut tracker = RenderTracker::new();
        let render_id = Uuid::new_v4();
        let result = self.render_tracked(text, melody, cancel, &mut tracker, render_id)?;
        Ok(RenderOutcome { render_id, result, history: tracker.history().to_vec() })
    }

    /// Render while recording every transition in `tracker`
    ///
    /// On error the tracker is left in `Failed` or `Cancelled`.
    pub fn render_tracked(
        &self,
        text: &str,
        melody: Option<&[MelodyEvent]>,
        cancel: &CancellationToken,
        tracker: &mut RenderTracker,
        render_id: Uuid,
    ) -> Result<PsalmRenderResult> {
        let span = info_span!("render", render_id = %render_id);
        let _enter = span.enter();
        let started = Instant::now();

        let outcome = self.run_stages(text, melody, cancel, tracker);
        match &outcome {
            Ok(result) => info!(
                duration_secs = result.duration_secs(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "render finalized"
            ),
            Err(err) => tracker.fail(err),
        }
        outcome
    }

    fn run_stages(
        &self,
        text: &str,
        melody: Option<&[MelodyEvent]>,
        cancel: &CancellationToken,
        tracker: &mut RenderTracker,
    ) -> Result<PsalmRenderResult> {
        checkpoint(cancel, tracker)?;
        if let Some(events) = melody {
            for event in events {
                event.validate()?;
            }
        }
        let segments = self.vocal.segment(text)?;
        tracker.advance()?;

        checkpoint(cancel, tracker)?;
        let raw = self.vocal.speak(&segments)?;
        tracker.advance()?;

        checkpoint(cancel, tracker)?;
        let vocal = self.vocal.layer(&segments, &raw, melody)?;
        let layers = self.engine.prepare_layers(&vocal, &self.config.ambient)?;
        tracker.advance()?;

        checkpoint(cancel, tracker)?;
        let result = self.engine.mix_layers(layers)?;
        tracker.advance()?;

        checkpoint(cancel, tracker)?;
        tracker.advance()?;
        Ok(result)
    }
}

fn checkpoint(cancel: &CancellationToken, tracker: &mut RenderTracker) -> Result<()> {
    if cancel.is_cancelled() {
        let state = tracker.state().to_string();
        tracker.cancel();
        return Err(PsalmodyError::Cancelled { state });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AudioBuffer;
    use crate::mixer::{LayerMix, MixConfig};
    use crate::vocal::{LayerVariation, TextSegment};
    use pretty_assertions::assert_eq;

    fn fast_config() -> RenderConfig {
        let mut config = RenderConfig::default();
        config.speech.sample_rate = 8000;
        config.vocal.layers = LayerVariation { num_layers: 2, ..Default::default() };
        config.vocal.stretch_fft_size = 512;
        config.mix = MixConfig { sample_rate: 8000, tail_secs: 0.5, ..Default::default() };
        config
    }

    #[derive(Debug)]
    struct BrokenTts;

    impl TtsAdapter for BrokenTts {
        fn name(&self) -> &str {
            "broken"
        }

        fn sample_rate(&self) -> u32 {
            8000
        }

        fn synthesize(&self, segment: &TextSegment) -> Result<AudioBuffer> {
            if segment.index == 1 {
                return Err(PsalmodyError::processing("tts", "voice crashed"));
            }
            Ok(AudioBuffer::from_mono(vec![0.1; 800], 8000))
        }
    }

    #[test]
    fn test_render_walks_every_state() {
        let renderer = PsalmRenderer::new(fast_config()).unwrap();
        let outcome = renderer.render("Laudate Dominum", None).unwrap();
        assert_eq!(
            outcome.history,
            vec![
                RenderState::Init,
                RenderState::TextSegmented,
                RenderState::VocalSynthesized,
                RenderState::Layered,
                RenderState::Mixed,
                RenderState::Finalized,
            ]
        );
        assert_eq!(outcome.state(), RenderState::Finalized);
        assert_eq!(outcome.result.sample_rate(), 8000);
    }

    #[test]
    fn test_render_matches_engine_mixdown() {
        let renderer = PsalmRenderer::new(fast_config().with_seed(3)).unwrap();
        let outcome = renderer.render("Laudate Dominum", None).unwrap();

        let vocal = renderer.vocal.synthesize("Laudate Dominum", None).unwrap();
        let direct = renderer.engine.render(&vocal, &renderer.config.ambient).unwrap();
        assert_eq!(outcome.result, direct);
    }

    #[test]
    fn test_cancelled_before_start() {
        let renderer = PsalmRenderer::new(fast_config()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut tracker = RenderTracker::new();
        let err = renderer
            .render_tracked("Laudate", None, &cancel, &mut tracker, Uuid::nil())
            .unwrap_err();
        assert_eq!(err.error_code(), "CANCELLED");
        assert_eq!(tracker.state(), RenderState::Cancelled);
    }

    #[test]
    fn test_tts_failure_marks_render_failed() {
        let config = fast_config();
        let aligner = Arc::new(config.vocal.aligner.clone());
        let renderer = PsalmRenderer::with_adapters(config, Arc::new(BrokenTts), aligner).unwrap();
        let mut tracker = RenderTracker::new();
        let err = renderer
            .render_tracked("Deus misereatur nostri", None, &CancellationToken::new(), &mut tracker, Uuid::nil())
            .unwrap_err();
        assert_eq!(err.error_code(), "VOCAL_SYNTHESIS");
        assert_eq!(err.segment_index(), Some(1));
        assert_eq!(tracker.state(), RenderState::Failed);
        assert_eq!(tracker.history()[1], RenderState::TextSegmented);
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let mut config = fast_config();
        config.mix.vocals = LayerMix::new(-1.0, 0.0);
        assert_eq!(PsalmRenderer::new(config).unwrap_err().error_code(), "CONFIG_VALIDATION");
    }

    #[test]
    fn test_empty_text_fails_at_segmentation() {
        let renderer = PsalmRenderer::new(fast_config()).unwrap();
        let mut tracker = RenderTracker::new();
        let result =
            renderer.render_tracked("...", None, &CancellationToken::new(), &mut tracker, Uuid::nil());
        assert!(result.is_err());
        assert_eq!(tracker.history(), &[RenderState::Init, RenderState::Failed]);
    }
}

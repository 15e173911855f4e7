//! Duration alignment
//!
//! Fits each word to its note length. The aligner locates the words; every
//! word that is both aligned and has a melody event is time-stretched to
//! exactly the note's sample count. Everything else keeps its approximate
//! region. Alignment errors, including an aligner that overruns its
//! timeout, never abort the render.

use crate::dsp::spectral::time_stretch;
use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use crate::vocal::align::{AlignmentResult, ForcedAligner, SegmentOffsets};
use crate::vocal::deadline::call_with_timeout;
use crate::vocal::melody::MelodyEvent;
use crate::vocal::segmenter::TextSegment;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Phase-vocoder stretch of aligned words to melody durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationAligner {
    fft_size: usize,
    timeout: Duration,
}

impl Default for DurationAligner {
    fn default() -> Self {
        Self::new(2048)
    }
}

/// How one segment is rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
enum Unit {
    Stretched { range: Range<usize>, target: usize },
    Kept(Range<usize>),
}

impl DurationAligner {
    pub fn new(fft_size: usize) -> Self {
        Self { fft_size, timeout: Duration::from_secs(30) }
    }

    /// Bound on a single aligner call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Rebuild `audio` with stretched words, in order and without gaps
    ///
    /// Without a melody the buffer is returned unchanged.
    pub fn align(
        &self,
        audio: &AudioBuffer,
        segments: &[TextSegment],
        offsets: &SegmentOffsets,
        melody: Option<&[MelodyEvent]>,
        aligner: &Arc<dyn ForcedAligner>,
    ) -> AudioBuffer {
        let melody = match melody {
            Some(m) if !m.is_empty() => m,
            _ => return audio.clone(),
        };

        let alignment = match self.locate(segments, audio, offsets, aligner) {
            Ok(result) => result,
            Err(e) => {
                warn!(aligner = aligner.name(), "alignment failed, keeping synthesized timing: {}", e);
                AlignmentResult::default()
            }
        };
        if !alignment.is_complete(segments.len()) {
            for segment in segments.iter().filter(|s| alignment.get(s.index).is_none()) {
                warn!(segment = segment.index, word = %segment.text, "segment not aligned, left unstretched");
            }
        }

        let mono = audio.to_mono();
        let samples = mono.channel(0);
        let units = self.plan(&alignment, offsets, melody, audio.sample_rate, samples.len());

        let mut out = Vec::with_capacity(samples.len());
        for (index, unit) in units.into_iter().enumerate() {
            match unit {
                Unit::Stretched { range, target } => {
                    let source = &samples[range];
                    let ratio = if source.is_empty() { 1.0 } else { target as f64 / source.len() as f64 };
                    debug!(segment = index, ratio, target, "stretching segment");
                    let mut stretched = time_stretch(source, ratio, self.fft_size);
                    stretched.resize(target, 0.0);
                    out.extend(stretched);
                }
                Unit::Kept(range) => out.extend_from_slice(&samples[range]),
            }
        }
        AudioBuffer::from_mono(out, audio.sample_rate)
    }

    fn locate(
        &self,
        segments: &[TextSegment],
        audio: &AudioBuffer,
        offsets: &SegmentOffsets,
        aligner: &Arc<dyn ForcedAligner>,
    ) -> Result<AlignmentResult> {
        let worker = Arc::clone(aligner);
        let (segments, audio, offsets) = (segments.to_vec(), audio.clone(), offsets.clone());
        call_with_timeout(aligner.name(), self.timeout, move || worker.align(&segments, &audio, &offsets))
            .map_err(|e| PsalmodyError::AlignmentFailure { segment_index: None, reason: e.to_string() })?
    }

    fn plan(
        &self,
        alignment: &AlignmentResult,
        offsets: &SegmentOffsets,
        melody: &[MelodyEvent],
        sample_rate: u32,
        len: usize,
    ) -> Vec<Unit> {
        let stretched: Vec<Option<(Range<usize>, usize)>> = (0..offsets.len())
            .map(|i| {
                let span = alignment.get(i)?;
                let event = melody.get(i)?;
                let target = (event.duration_sec as f64 * sample_rate as f64).round() as usize;
                Some((span.sample_range(sample_rate, len), target))
            })
            .collect();

        (0..offsets.len())
            .map(|i| {
                if let Some((range, target)) = stretched[i].clone() {
                    return Unit::Stretched { range, target };
                }
                let region = offsets.range(i).unwrap_or(0..0);
                let floor = stretched[..i]
                    .iter()
                    .rev()
                    .flatten()
                    .next()
                    .map_or(0, |(r, _)| r.end);
                let ceiling = stretched[i + 1..]
                    .iter()
                    .flatten()
                    .next()
                    .map_or(len, |(r, _)| r.start);
                let start = region.start.max(floor).min(len);
                let end = region.end.min(ceiling).max(start).min(len);
                Unit::Kept(start..end)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocal::align::AlignedSpan;

    struct FixedAligner(Vec<AlignedSpan>);

    impl ForcedAligner for FixedAligner {
        fn name(&self) -> &str {
            "fixed"
        }

        fn align(&self, _: &[TextSegment], _: &AudioBuffer, _: &SegmentOffsets) -> Result<AlignmentResult> {
            Ok(AlignmentResult::new(self.0.clone()))
        }
    }

    struct FailingAligner;

    impl ForcedAligner for FailingAligner {
        fn name(&self) -> &str {
            "failing"
        }

        fn align(&self, _: &[TextSegment], _: &AudioBuffer, _: &SegmentOffsets) -> Result<AlignmentResult> {
            Err(PsalmodyError::AlignmentFailure {
                segment_index: None,
                reason: "service unavailable".to_string(),
            })
        }
    }

    struct StalledAligner;

    impl ForcedAligner for StalledAligner {
        fn name(&self) -> &str {
            "stalled"
        }

        fn align(&self, _: &[TextSegment], _: &AudioBuffer, _: &SegmentOffsets) -> Result<AlignmentResult> {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(AlignmentResult::default())
        }
    }

    fn shared(aligner: impl ForcedAligner + 'static) -> Arc<dyn ForcedAligner> {
        Arc::new(aligner)
    }

    fn segments(n: usize) -> Vec<TextSegment> {
        (0..n)
            .map(|index| TextSegment { index, text: format!("w{index}"), span: index..index + 1 })
            .collect()
    }

    fn tone(len: usize) -> AudioBuffer {
        AudioBuffer::from_mono((0..len).map(|i| (i as f32 * 0.07).sin() * 0.4).collect(), 1000)
    }

    fn span(segment_index: usize, start_secs: f64, end_secs: f64) -> AlignedSpan {
        AlignedSpan { segment_index, start_secs, end_secs }
    }

    #[test]
    fn test_no_melody_is_identity() {
        let audio = tone(3000);
        let offsets = SegmentOffsets::from_lengths(&[1000, 1000, 1000]);
        let out = DurationAligner::default().align(&audio, &segments(3), &offsets, None, &shared(FailingAligner));
        assert_eq!(out, audio);
    }

    #[test]
    fn test_all_aligned_hits_targets() {
        let audio = tone(3000);
        let offsets = SegmentOffsets::from_lengths(&[1000, 1000, 1000]);
        let aligner = FixedAligner(vec![span(0, 0.1, 0.9), span(1, 1.1, 1.9), span(2, 2.1, 2.9)]);
        let melody = [
            MelodyEvent::new(200.0, 0.5).unwrap(),
            MelodyEvent::new(200.0, 0.3).unwrap(),
            MelodyEvent::new(200.0, 0.4).unwrap(),
        ];
        let out = DurationAligner::new(256).align(&audio, &segments(3), &offsets, Some(&melody), &shared(aligner));
        assert_eq!(out.len(), 1200);
    }

    #[test]
    fn test_partial_alignment_keeps_unaligned_region() {
        let audio = tone(3000);
        let offsets = SegmentOffsets::from_lengths(&[1000, 1000, 1000]);
        let aligner = FixedAligner(vec![span(0, 0.1, 0.9), span(2, 2.1, 2.9)]);
        let melody = [
            MelodyEvent::new(200.0, 0.5).unwrap(),
            MelodyEvent::new(200.0, 0.3).unwrap(),
            MelodyEvent::new(200.0, 0.4).unwrap(),
        ];
        let out = DurationAligner::new(256).align(&audio, &segments(3), &offsets, Some(&melody), &shared(aligner));
        assert_eq!(out.len(), 500 + 1000 + 400);
        assert_eq!(&out.channel(0)[500..1500], &audio.channel(0)[1000..2000]);
    }

    #[test]
    fn test_alignment_failure_degrades() {
        let audio = tone(3000);
        let offsets = SegmentOffsets::from_lengths(&[1000, 1000, 1000]);
        let melody = [MelodyEvent::new(200.0, 0.5).unwrap()];
        let out =
            DurationAligner::default().align(&audio, &segments(3), &offsets, Some(&melody), &shared(FailingAligner));
        assert_eq!(out, audio);
    }

    #[test]
    fn test_short_melody_leaves_tail_segments() {
        let audio = tone(2000);
        let offsets = SegmentOffsets::from_lengths(&[1000, 1000]);
        let aligner = FixedAligner(vec![span(0, 0.0, 1.0), span(1, 1.0, 2.0)]);
        let melody = [MelodyEvent::new(200.0, 0.25).unwrap()];
        let out = DurationAligner::new(256).align(&audio, &segments(2), &offsets, Some(&melody), &shared(aligner));
        assert_eq!(out.len(), 250 + 1000);
    }

    #[test]
    fn test_stalled_aligner_times_out_to_pass_through() {
        let audio = tone(3000);
        let offsets = SegmentOffsets::from_lengths(&[1000, 1000, 1000]);
        let melody = [MelodyEvent::new(200.0, 0.5).unwrap()];
        let aligner = DurationAligner::new(256).with_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let out = aligner.align(&audio, &segments(3), &offsets, Some(&melody), &shared(StalledAligner));
        assert!(started.elapsed() < Duration::from_millis(1000), "waited {:?}", started.elapsed());
        assert_eq!(out, audio);
    }
}

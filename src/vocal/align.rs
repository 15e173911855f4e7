//! Forced alignment
//!
//! An aligner locates each word of the transcript inside the concatenated TTS
//! audio. Results may be partial: segments the aligner could not place are
//! simply absent, and the duration stage leaves them unstretched.

use crate::engine::buffer::{linear_to_db, slice_rms};
use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use crate::vocal::segmenter::TextSegment;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, warn};

/// Time span of one aligned segment, in seconds from the start of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedSpan {
    pub segment_index: usize,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl AlignedSpan {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Sample range of the span at `sample_rate`, clipped to `len`
    pub fn sample_range(&self, sample_rate: u32, len: usize) -> Range<usize> {
        let sr = sample_rate as f64;
        let start = ((self.start_secs * sr).round().max(0.0) as usize).min(len);
        let end = ((self.end_secs * sr).round().max(0.0) as usize).clamp(start, len);
        start..end
    }

    fn is_valid(&self) -> bool {
        self.start_secs.is_finite()
            && self.end_secs.is_finite()
            && self.start_secs >= 0.0
            && self.end_secs > self.start_secs
    }
}

/// Ordered, non-overlapping spans; possibly covering only some segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    spans: Vec<AlignedSpan>,
}

impl AlignmentResult {
    /// Build a result, dropping spans that are empty, non-finite, out of
    /// order, or overlap an earlier span
    pub fn new(spans: Vec<AlignedSpan>) -> Self {
        let mut kept: Vec<AlignedSpan> = Vec::with_capacity(spans.len());
        for span in spans {
            let ordered = kept.last().map_or(true, |prev| {
                span.segment_index > prev.segment_index && span.start_secs >= prev.end_secs
            });
            if span.is_valid() && ordered {
                kept.push(span);
            } else {
                warn!(
                    segment = span.segment_index,
                    start = span.start_secs,
                    end = span.end_secs,
                    "dropping invalid alignment span"
                );
            }
        }
        Self { spans: kept }
    }

    pub fn spans(&self) -> &[AlignedSpan] {
        &self.spans
    }

    pub fn get(&self, segment_index: usize) -> Option<&AlignedSpan> {
        self.spans
            .binary_search_by_key(&segment_index, |s| s.segment_index)
            .ok()
            .map(|i| &self.spans[i])
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Whether every one of `num_segments` segments is aligned
    pub fn is_complete(&self, num_segments: usize) -> bool {
        self.spans.len() == num_segments
    }
}

/// Approximate sample region of each segment in the concatenated TTS buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOffsets {
    ranges: Vec<Range<usize>>,
}

impl SegmentOffsets {
    /// Contiguous regions from per-segment lengths
    pub fn from_lengths(lengths: &[usize]) -> Self {
        let mut start = 0;
        let ranges = lengths
            .iter()
            .map(|&len| {
                let range = start..start + len;
                start += len;
                range
            })
            .collect();
        Self { ranges }
    }

    pub fn range(&self, segment_index: usize) -> Option<Range<usize>> {
        self.ranges.get(segment_index).cloned()
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total samples covered
    pub fn total_len(&self) -> usize {
        self.ranges.last().map_or(0, |r| r.end)
    }
}

/// Locates segments in synthesized audio
pub trait ForcedAligner: Send + Sync {
    fn name(&self) -> &str;

    /// Align `segments` against `audio`; `offsets` gives each segment's
    /// approximate region. An `Err` means the whole alignment failed.
    fn align(
        &self,
        segments: &[TextSegment],
        audio: &AudioBuffer,
        offsets: &SegmentOffsets,
    ) -> Result<AlignmentResult>;
}

// ============================================================================
// Energy Aligner
// ============================================================================

/// Trims each approximate region to its voiced part by frame energy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyAligner {
    pub frame_ms: f32,
    /// Frames quieter than the region's loudest frame by more than this are silence
    pub relative_floor_db: f32,
    /// Frames below this level are always silence
    pub absolute_floor_db: f32,
}

impl Default for EnergyAligner {
    fn default() -> Self {
        Self {
            frame_ms: 10.0,
            relative_floor_db: 30.0,
            absolute_floor_db: -50.0,
        }
    }
}

impl EnergyAligner {
    fn align_region(&self, samples: &[f32], region: Range<usize>, frame: usize) -> Option<Range<usize>> {
        let region_samples = samples.get(region.clone())?;
        let levels: Vec<f32> = region_samples
            .chunks(frame)
            .map(|chunk| linear_to_db(slice_rms(chunk)))
            .collect();
        let peak_db = levels.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        if peak_db <= self.absolute_floor_db {
            return None;
        }
        let threshold = (peak_db - self.relative_floor_db).max(self.absolute_floor_db);
        let first = levels.iter().position(|&db| db >= threshold)?;
        let last = levels.iter().rposition(|&db| db >= threshold)?;
        let start = region.start + first * frame;
        let end = (region.start + (last + 1) * frame).min(region.end);
        (end > start).then_some(start..end)
    }
}

impl ForcedAligner for EnergyAligner {
    fn name(&self) -> &str {
        "energy"
    }

    fn align(
        &self,
        segments: &[TextSegment],
        audio: &AudioBuffer,
        offsets: &SegmentOffsets,
    ) -> Result<AlignmentResult> {
        if audio.is_empty() {
            return Err(PsalmodyError::AlignmentFailure {
                segment_index: None,
                reason: "empty audio".to_string(),
            });
        }
        if offsets.len() != segments.len() {
            return Err(PsalmodyError::AlignmentFailure {
                segment_index: None,
                reason: format!(
                    "{} segments but {} offset regions",
                    segments.len(),
                    offsets.len()
                ),
            });
        }

        let mono = audio.to_mono();
        let samples = mono.channel(0);
        let sr = audio.sample_rate as f64;
        let frame = ((self.frame_ms as f64 / 1000.0 * sr).round() as usize).max(1);

        let mut spans = Vec::with_capacity(segments.len());
        for segment in segments {
            let Some(region) = offsets.range(segment.index) else {
                continue;
            };
            match self.align_region(samples, region, frame) {
                Some(found) => spans.push(AlignedSpan {
                    segment_index: segment.index,
                    start_secs: found.start as f64 / sr,
                    end_secs: found.end as f64 / sr,
                }),
                None => warn!(segment = segment.index, word = %segment.text, "no voiced audio found"),
            }
        }

        if spans.is_empty() {
            return Err(PsalmodyError::AlignmentFailure {
                segment_index: None,
                reason: "no segment could be aligned".to_string(),
            });
        }
        debug!(aligned = spans.len(), total = segments.len(), "energy alignment");
        Ok(AlignmentResult::new(spans))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn seg(index: usize, text: &str) -> TextSegment {
        TextSegment { index, text: text.to_string(), span: 0..text.len() }
    }

    fn span(segment_index: usize, start_secs: f64, end_secs: f64) -> AlignedSpan {
        AlignedSpan { segment_index, start_secs, end_secs }
    }

    #[test]
    fn test_result_drops_overlapping_and_invalid() {
        let result = AlignmentResult::new(vec![
            span(0, 0.0, 0.5),
            span(1, 0.4, 0.9),
            span(2, 1.0, 1.0),
            span(3, 1.0, f64::NAN),
            span(4, 1.1, 1.5),
        ]);
        let kept: Vec<usize> = result.spans().iter().map(|s| s.segment_index).collect();
        assert_eq!(kept, vec![0, 4]);
        assert!(result.get(4).is_some());
        assert!(result.get(1).is_none());
        assert!(!result.is_complete(5));
    }

    #[test]
    fn test_offsets_from_lengths() {
        let offsets = SegmentOffsets::from_lengths(&[10, 5, 7]);
        assert_eq!(offsets.range(1), Some(10..15));
        assert_eq!(offsets.total_len(), 22);
        assert_eq!(offsets.range(3), None);
    }

    #[test]
    fn test_energy_aligner_trims_silence() {
        let sr = 1000;
        // segment 0: 100 silent, 200 tone, 100 silent; segment 1: all silent
        let mut samples = vec![0.0_f32; 100];
        samples.extend((0..200).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }));
        samples.extend(vec![0.0; 100]);
        samples.extend(vec![0.0; 300]);
        let audio = AudioBuffer::from_mono(samples, sr);
        let offsets = SegmentOffsets::from_lengths(&[400, 300]);

        let result = EnergyAligner::default()
            .align(&[seg(0, "Deus"), seg(1, "et")], &audio, &offsets)
            .unwrap();
        assert_eq!(result.len(), 1);
        let s = result.get(0).unwrap();
        assert_relative_eq!(s.start_secs, 0.1, epsilon = 1e-9);
        assert_relative_eq!(s.end_secs, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_energy_aligner_all_silent_fails() {
        let audio = AudioBuffer::from_mono(vec![0.0; 500], 1000);
        let offsets = SegmentOffsets::from_lengths(&[500]);
        let err = EnergyAligner::default()
            .align(&[seg(0, "Amen")], &audio, &offsets)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_sample_range_clipped() {
        let s = span(0, 0.5, 2.0);
        assert_eq!(s.sample_range(100, 120), 50..120);
    }
}

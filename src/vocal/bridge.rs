//! HTTP bridge adapters
//!
//! Connect the pipeline to an external speech service (`POST {url}/synthesize`)
//! and an external forced-alignment service (`POST {url}/align`). Requests are
//! blocking and bounded by the configured timeout. Without the `bridge`
//! feature both adapters are inert and every call returns an error.

use crate::engine::AudioBuffer;
use crate::error::{PsalmodyError, Result};
use crate::vocal::align::{AlignedSpan, AlignmentResult, ForcedAligner, SegmentOffsets};
use crate::vocal::segmenter::TextSegment;
use crate::vocal::tts::TtsAdapter;
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_TTS_URL: &str = "http://localhost:8010";
const DEFAULT_ALIGN_URL: &str = "http://localhost:8011";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Service endpoints and timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub tts_url: String,
    pub align_url: String,
    pub timeout_ms: u64,
}

impl BridgeSettings {
    /// Read `PSALMODY_TTS_URL`, `PSALMODY_ALIGN_URL` and `PSALMODY_BRIDGE_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let tts_url = env::var("PSALMODY_TTS_URL").unwrap_or_else(|_| DEFAULT_TTS_URL.into());
        let align_url = env::var("PSALMODY_ALIGN_URL").unwrap_or_else(|_| DEFAULT_ALIGN_URL.into());
        let timeout_ms = env::var("PSALMODY_BRIDGE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self { tts_url, align_url, timeout_ms }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            tts_url: DEFAULT_TTS_URL.into(),
            align_url: DEFAULT_ALIGN_URL.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[cfg_attr(not(feature = "bridge"), allow(dead_code))]
#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    index: usize,
    text: &'a str,
    sample_rate: u32,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    sample_rate: u32,
    samples: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct AlignRequest<'a> {
    segments: Vec<AlignSegment<'a>>,
    sample_rate: u32,
    samples: &'a [f32],
}

#[derive(Debug, Serialize)]
struct AlignSegment<'a> {
    index: usize,
    text: &'a str,
    start_sample: usize,
    end_sample: usize,
}

#[derive(Debug, Deserialize)]
struct AlignResponse {
    spans: Vec<AlignedSpan>,
}

// ============================================================================
// TTS
// ============================================================================

/// TTS adapter backed by a speech service
#[derive(Debug, Clone)]
pub struct HttpTtsAdapter {
    url: String,
    sample_rate: u32,
    timeout_ms: u64,
}

impl HttpTtsAdapter {
    pub fn new(settings: &BridgeSettings, sample_rate: u32) -> Self {
        Self {
            url: settings.tts_url.trim_end_matches('/').to_string(),
            sample_rate,
            timeout_ms: settings.timeout_ms,
        }
    }

    #[cfg(feature = "bridge")]
    fn request(&self, segment: &TextSegment) -> std::result::Result<SynthesizeResponse, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        let body = SynthesizeRequest {
            index: segment.index,
            text: &segment.text,
            sample_rate: self.sample_rate,
        };
        let response = client
            .post(format!("{}/synthesize", self.url))
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    format!("timed out after {} ms", self.timeout_ms)
                } else {
                    format!("cannot reach {}: {}", self.url, e)
                }
            })?;
        if !response.status().is_success() {
            return Err(format!("service returned {}", response.status()));
        }
        response
            .json::<SynthesizeResponse>()
            .map_err(|e| format!("invalid response: {}", e))
    }

    #[cfg(not(feature = "bridge"))]
    fn request(&self, _segment: &TextSegment) -> std::result::Result<SynthesizeResponse, String> {
        let _ = (&self.url, self.timeout_ms);
        Err("HTTP bridge support not compiled. Build with --features bridge".to_string())
    }
}

impl TtsAdapter for HttpTtsAdapter {
    fn name(&self) -> &str {
        "http"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&self, segment: &TextSegment) -> Result<AudioBuffer> {
        let fail = |reason: String| PsalmodyError::VocalSynthesis {
            segment_index: segment.index,
            word: segment.text.clone(),
            reason,
        };
        let response = self.request(segment).map_err(fail)?;
        if response.sample_rate != self.sample_rate {
            return Err(fail(format!(
                "service returned {} Hz audio, expected {} Hz",
                response.sample_rate, self.sample_rate
            )));
        }
        Ok(AudioBuffer::from_mono(response.samples, response.sample_rate))
    }
}

// ============================================================================
// Alignment
// ============================================================================

/// Forced aligner backed by an alignment service
#[derive(Debug, Clone)]
pub struct HttpAligner {
    url: String,
    timeout_ms: u64,
}

impl HttpAligner {
    pub fn new(settings: &BridgeSettings) -> Self {
        Self {
            url: settings.align_url.trim_end_matches('/').to_string(),
            timeout_ms: settings.timeout_ms,
        }
    }

    #[cfg(feature = "bridge")]
    fn request(&self, body: &AlignRequest<'_>) -> std::result::Result<AlignResponse, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        let response = client
            .post(format!("{}/align", self.url))
            .json(body)
            .send()
            .map_err(|e| format!("cannot reach {}: {}", self.url, e))?;
        if !response.status().is_success() {
            return Err(format!("service returned {}", response.status()));
        }
        response
            .json::<AlignResponse>()
            .map_err(|e| format!("invalid response: {}", e))
    }

    #[cfg(not(feature = "bridge"))]
    fn request(&self, _body: &AlignRequest<'_>) -> std::result::Result<AlignResponse, String> {
        let _ = (&self.url, self.timeout_ms);
        Err("HTTP bridge support not compiled. Build with --features bridge".to_string())
    }
}

impl ForcedAligner for HttpAligner {
    fn name(&self) -> &str {
        "http"
    }

    fn align(
        &self,
        segments: &[TextSegment],
        audio: &AudioBuffer,
        offsets: &SegmentOffsets,
    ) -> Result<AlignmentResult> {
        let mono = audio.to_mono();
        let body = AlignRequest {
            segments: segments
                .iter()
                .map(|s| {
                    let region = offsets.range(s.index).unwrap_or(0..0);
                    AlignSegment {
                        index: s.index,
                        text: &s.text,
                        start_sample: region.start,
                        end_sample: region.end,
                    }
                })
                .collect(),
            sample_rate: audio.sample_rate,
            samples: mono.channel(0),
        };
        let response = self.request(&body).map_err(|reason| PsalmodyError::AlignmentFailure {
            segment_index: None,
            reason,
        })?;
        Ok(AlignmentResult::new(response.spans))
    }
}

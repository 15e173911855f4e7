//! Error handling for Psalmody
//!
//! Every fatal error carries the offending segment or layer so the caller can
//! report exactly where a render broke. `AlignmentFailure` is the only
//! recoverable kind: the pipeline downgrades it to a pass-through.

use thiserror::Error;

/// Result type alias for Psalmody operations
pub type Result<T> = std::result::Result<T, PsalmodyError>;

/// Main error type for Psalmody operations
#[derive(Error, Debug)]
pub enum PsalmodyError {
    // Configuration Errors
    #[error("Invalid configuration: {field} = {value} (expected {expected})")]
    ConfigValidation {
        field: String,
        value: String,
        expected: String,
    },

    // Vocal Errors
    #[error("Vocal synthesis failed for segment {segment_index} ('{word}'): {reason}")]
    VocalSynthesis {
        segment_index: usize,
        word: String,
        reason: String,
    },

    #[error("Alignment failed: {reason}")]
    AlignmentFailure {
        segment_index: Option<usize>,
        reason: String,
    },

    // Effect Errors
    #[error("Invalid {effect} parameter: {param} = {value} (expected {expected})")]
    EffectParameter {
        effect: &'static str,
        param: &'static str,
        value: String,
        expected: String,
    },

    // Processing Errors
    #[error("Audio processing error in {stage}: {reason}")]
    AudioProcessing {
        stage: String,
        layer: Option<String>,
        reason: String,
    },

    // Render Lifecycle Errors
    #[error("Render cancelled while {state}")]
    Cancelled { state: String },

    #[error("Invalid render state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // I/O Errors
    #[error("WAV error for {path}: {source}")]
    Wav {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PsalmodyError {
    /// Shorthand for a configuration error
    pub fn config(field: impl Into<String>, value: impl ToString, expected: impl Into<String>) -> Self {
        PsalmodyError::ConfigValidation {
            field: field.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Shorthand for a processing error outside any particular layer
    pub fn processing(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        PsalmodyError::AudioProcessing {
            stage: stage.into(),
            layer: None,
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            PsalmodyError::ConfigValidation { .. } => "CONFIG_VALIDATION",
            PsalmodyError::VocalSynthesis { .. } => "VOCAL_SYNTHESIS",
            PsalmodyError::AlignmentFailure { .. } => "ALIGNMENT_FAILURE",
            PsalmodyError::EffectParameter { .. } => "EFFECT_PARAMETER",
            PsalmodyError::AudioProcessing { .. } => "AUDIO_PROCESSING",
            PsalmodyError::Cancelled { .. } => "CANCELLED",
            PsalmodyError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PsalmodyError::Wav { .. } => "WAV_ERROR",
            PsalmodyError::Io(_) => "IO_ERROR",
            PsalmodyError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable (the affected unit degrades to pass-through)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PsalmodyError::AlignmentFailure { .. })
    }

    /// Check if this error aborts a render
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Index of the text segment that caused the error, when known
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            PsalmodyError::VocalSynthesis { segment_index, .. } => Some(*segment_index),
            PsalmodyError::AlignmentFailure { segment_index, .. } => *segment_index,
            _ => None,
        }
    }

    /// Name of the mix layer that caused the error, when known
    pub fn layer(&self) -> Option<&str> {
        match self {
            PsalmodyError::AudioProcessing { layer, .. } => layer.as_deref(),
            _ => None,
        }
    }

    /// Returns a suggested recovery action for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            PsalmodyError::ConfigValidation { .. } => "Fix the configuration value and render again",
            PsalmodyError::VocalSynthesis { .. } => {
                "Check the TTS service and the offending word, then retry the render"
            }
            PsalmodyError::AlignmentFailure { .. } => {
                "No action needed: the segment keeps its synthesized timing"
            }
            PsalmodyError::EffectParameter { .. } => "Adjust the parameter to be within valid range",
            PsalmodyError::AudioProcessing { .. } => {
                "The effect settings may be too extreme; try reducing drive or feedback"
            }
            PsalmodyError::Cancelled { .. } => "Start a new render",
            PsalmodyError::Wav { .. } | PsalmodyError::Io(_) => {
                "Check the output directory exists and is writable"
            }
            _ => "Check the error details and try again",
        }
    }
}

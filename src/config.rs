//! Render configuration
//!
//! One JSON document groups every tunable of a render. Missing fields fall
//! back to their defaults, so `{}` is a complete configuration. Values are
//! checked once by [`RenderConfig::validate`] before any audio work starts.

use crate::ambient::AmbientParams;
use crate::error::{PsalmodyError, Result};
use crate::mixer::{EffectSettings, MixConfig};
use crate::vocal::{FormantSpeechConfig, VocalConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything a render needs besides the text and melody
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Built-in speech engine
    pub speech: FormantSpeechConfig,
    pub vocal: VocalConfig,
    pub ambient: AmbientParams,
    pub mix: MixConfig,
    pub effects: EffectSettings,
}

impl RenderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load and parse a JSON config file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PsalmodyError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every range, constructing the effects so bad parameters surface now
    pub fn validate(&self) -> Result<()> {
        self.speech.validate()?;
        self.vocal.validate()?;
        self.ambient.validate()?;
        self.mix.validate()?;
        self.effects.validate()?;
        Ok(())
    }

    /// Apply a seed to every randomized component
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.speech.seed = seed;
        self.vocal.layers.seed = seed;
        self.ambient.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::DelayParams;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        RenderConfig::default().validate().unwrap();
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(RenderConfig::from_json_str("{}").unwrap(), RenderConfig::default());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = RenderConfig::default().with_seed(42);
        let json = config.to_json_pretty().unwrap();
        assert_eq!(RenderConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_override() {
        let config = RenderConfig::from_json_str(
            r#"{"ambient": {"mode": "phrygian", "tempo_bpm": 50}, "mix": {"pads": {"enabled": false}}}"#,
        )
        .unwrap();
        assert_eq!(config.ambient.tempo_bpm, 50.0);
        assert!(!config.mix.pads.enabled);
        assert_eq!(config.mix.pads.gain, 1.0);
        assert_eq!(config.mix.drones, MixConfig::default().drones);
    }

    #[test]
    fn test_bad_effect_parameter_rejected() {
        let mut config = RenderConfig::default();
        config.effects.percussion.delay = Some(DelayParams { delay_time_ms: 300.0, feedback: 1.0, mix: 0.5 });
        assert_eq!(config.validate().unwrap_err().error_code(), "EFFECT_PARAMETER");
    }

    #[test]
    fn test_malformed_json() {
        let err = RenderConfig::from_json_str("{ not json").unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"vocal": {"adapter_timeout_ms": 500}}"#).unwrap();
        let config = RenderConfig::from_json_file(&path).unwrap();
        assert_eq!(config.vocal.adapter_timeout_ms, 500);
        assert!(RenderConfig::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}

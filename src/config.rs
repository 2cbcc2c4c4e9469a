use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SpeechError;
use crate::voice::validate_language_tag;

/// Placeholder in [`SubstituteConfig::template`] replaced by the request text.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Timing and fallback settings shared by the speech components.
///
/// All fields have defaults, so a config file only needs the keys it
/// changes:
///
/// ```json
/// { "retry_backoff_ms": 250, "substitute": null }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// How long to wait for an empty voice catalog to populate.
    pub voices_timeout_ms: u64,
    /// Fixed wait between playback retries.
    pub retry_backoff_ms: u64,
    /// Upper bound for one playback attempt, including the warm-up utterance.
    pub attempt_timeout_ms: u64,
    /// Pause between clearing the engine queue and submitting an utterance.
    pub settle_delay_ms: u64,
    /// Upper bound for a recognition session. `None` waits for the host.
    pub recognition_timeout_ms: Option<u64>,
    /// Catalogs smaller than this are reported as impoverished.
    pub low_voice_threshold: usize,
    /// Last-resort utterance when no requested or fallback voice can play.
    pub substitute: Option<SubstituteConfig>,
    /// Per-UI-language speech settings.
    pub presets: BTreeMap<String, LanguagePreset>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voices_timeout_ms: 3000,
            retry_backoff_ms: 500,
            attempt_timeout_ms: 15_000,
            settle_delay_ms: 100,
            recognition_timeout_ms: None,
            low_voice_threshold: 10,
            substitute: Some(SubstituteConfig::default()),
            presets: default_presets(),
        }
    }
}

impl SpeechConfig {
    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SpeechError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        log::info!("Loaded speech config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, SpeechError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SpeechError> {
        if self.attempt_timeout_ms == 0 {
            return Err(SpeechError::Config(
                "attempt_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(substitute) = &self.substitute {
            validate_language_tag(&substitute.language_tag)?;
        }
        for (key, preset) in &self.presets {
            validate_language_tag(&preset.code).map_err(|_| {
                SpeechError::Config(format!("preset '{key}': bad code {:?}", preset.code))
            })?;
        }
        Ok(())
    }

    pub fn voices_timeout(&self) -> Duration {
        Duration::from_millis(self.voices_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn recognition_timeout(&self) -> Option<Duration> {
        self.recognition_timeout_ms.map(Duration::from_millis)
    }

    pub fn preset(&self, key: &str) -> Option<&LanguagePreset> {
        self.presets.get(&key.to_ascii_lowercase())
    }
}

/// The utterance spoken when nothing in the requested language can play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstituteConfig {
    pub language_tag: String,
    /// Text template; `{text}` is replaced by the original text.
    pub template: String,
}

impl Default for SubstituteConfig {
    fn default() -> Self {
        Self {
            language_tag: "en-US".to_string(),
            template: format!("Arabic text: {TEXT_PLACEHOLDER}"),
        }
    }
}

impl SubstituteConfig {
    pub fn render(&self, text: &str) -> String {
        self.template.replace(TEXT_PLACEHOLDER, text)
    }
}

/// Speech settings for one UI language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguagePreset {
    /// Language tag handed to the engine.
    pub code: String,
    /// Name shown in the language picker.
    pub name: String,
    pub rate: f32,
    pub pitch: f32,
}

fn preset(code: &str, name: &str, rate: f32, pitch: f32) -> LanguagePreset {
    LanguagePreset {
        code: code.to_string(),
        name: name.to_string(),
        rate,
        pitch,
    }
}

/// Built-in presets. Tamazight has no synthetic voices on common hosts and
/// is spoken with the Moroccan Arabic voice at a slightly raised pitch.
pub fn default_presets() -> BTreeMap<String, LanguagePreset> {
    BTreeMap::from([
        ("ja".to_string(), preset("ja-JP", "日本語", 1.0, 1.0)),
        ("ar".to_string(), preset("ar-SA", "العربية", 0.8, 1.0)),
        ("ar-ma".to_string(), preset("ar-MA", "العربية المغربية", 0.8, 1.0)),
        ("fr".to_string(), preset("fr-FR", "Français", 1.0, 1.0)),
        ("en".to_string(), preset("en-US", "English", 1.0, 1.0)),
        ("ber".to_string(), preset("ar-MA", "Tamazight", 0.8, 1.1)),
    ])
}

use derive_builder::{Builder, UninitializedFieldError};

use crate::config::LanguagePreset;
use crate::error::SpeechError;
use crate::voice::validate_language_tag;

/// Fallback tags used by the Arabic entry points, most specific first.
pub const ARABIC_FALLBACK_TAGS: &[&str] = &["ar-EG", "ar-MA", "ar"];

/// Parameters for one `speak` call.
///
/// Built with [`SpeechRequestBuilder`]; the builder validates the language
/// tag and the rate / pitch / volume ranges.
///
/// ```rust
/// use speech_orchestrator::SpeechRequestBuilder;
///
/// let request = SpeechRequestBuilder::default()
///     .language_tag("ar-SA")
///     .rate(0.8f32)
///     .fallback_tags(["ar-EG", "ar-MA", "ar"])
///     .build()?;
/// assert_eq!(request.max_retries, 3);
/// # Ok::<(), speech_orchestrator::SpeechError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(
    setter(into),
    build_fn(validate = "Self::validate", error = "SpeechError")
)]
pub struct SpeechRequest {
    pub language_tag: String,
    /// Speaking rate multiplier. Range: 0.1–10.0, default 1.0.
    #[builder(default = "1.0")]
    pub rate: f32,
    /// Pitch. Range: 0.0–2.0, default 1.0.
    #[builder(default = "1.0")]
    pub pitch: f32,
    /// Volume. Range: 0.0–1.0, default 1.0.
    #[builder(default = "1.0")]
    pub volume: f32,
    /// Playback attempts with the selected voice before giving up on it.
    /// Zero is treated as one.
    #[builder(default = "3")]
    pub max_retries: u32,
    /// Tags tried in order when the requested language cannot play.
    #[builder(default)]
    pub fallback_language_tags: Vec<String>,
    #[builder(default = "true")]
    pub fallback_enabled: bool,
}

impl From<UninitializedFieldError> for SpeechError {
    fn from(e: UninitializedFieldError) -> Self {
        SpeechError::Config(format!("speech request is missing `{}`", e.field_name()))
    }
}

impl SpeechRequestBuilder {
    /// Set the fallback tags from any iterator of string-likes.
    pub fn fallback_tags<I, S>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_language_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    fn validate(&self) -> Result<(), SpeechError> {
        if let Some(tag) = &self.language_tag {
            validate_language_tag(tag)?;
        }
        if let Some(tags) = &self.fallback_language_tags {
            for tag in tags {
                validate_language_tag(tag)?;
            }
        }
        check_range("rate", self.rate, 0.1, 10.0)?;
        check_range("pitch", self.pitch, 0.0, 2.0)?;
        check_range("volume", self.volume, 0.0, 1.0)?;
        Ok(())
    }
}

fn check_range(field: &str, value: Option<f32>, min: f32, max: f32) -> Result<(), SpeechError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(SpeechError::Config(format!(
            "{field} {v} is outside {min}..={max}"
        ))),
        _ => Ok(()),
    }
}

impl SpeechRequest {
    /// Request with default settings for `language_tag`.
    pub fn new(language_tag: &str) -> Result<Self, SpeechError> {
        SpeechRequestBuilder::default()
            .language_tag(language_tag)
            .build()
    }

    /// Request using a UI-language preset's tag, rate and pitch.
    pub fn from_preset(preset: &LanguagePreset) -> Result<Self, SpeechError> {
        SpeechRequestBuilder::default()
            .language_tag(preset.code.as_str())
            .rate(preset.rate)
            .pitch(preset.pitch)
            .build()
    }

    /// Modern Standard Arabic at a slower rate, falling back through the
    /// regional variants.
    pub fn arabic() -> Self {
        Self::arabic_variant("ar-SA")
    }

    /// Moroccan Arabic (Darija), same fallback chain as [`SpeechRequest::arabic`].
    pub fn moroccan_arabic() -> Self {
        Self::arabic_variant("ar-MA")
    }

    fn arabic_variant(tag: &str) -> Self {
        Self {
            language_tag: tag.to_string(),
            rate: 0.8,
            pitch: 1.0,
            volume: 1.0,
            max_retries: 3,
            fallback_language_tags: ARABIC_FALLBACK_TAGS.iter().map(|t| t.to_string()).collect(),
            fallback_enabled: true,
        }
    }

    /// Number of playback attempts allowed for the selected voice.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

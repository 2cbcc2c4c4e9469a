/// Error reported by a host speech or recognition engine.
///
/// `code` follows the Web Speech error vocabulary (`"synthesis-failed"`,
/// `"interrupted"`, `"not-allowed"`, `"no-speech"`, ...). Engines that have
/// no such vocabulary pick the closest code and put detail in `message`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}{}", detail_suffix(.message))]
pub struct PlatformError {
    pub code: String,
    pub message: Option<String>,
}

fn detail_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl PlatformError {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: None,
        }
    }

    pub fn with_message(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
        }
    }

    /// Code used when an attempt outlives its time bound.
    pub fn timeout() -> Self {
        Self::new("timeout")
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SpeechError {
    #[error("Speech synthesis is not available on this host")]
    CapabilityUnavailable,
    #[error("No voice installed for language '{language_tag}' and fallback is disabled")]
    NoMatchingVoice { language_tag: String },
    #[error("Speech playback failed: {code}")]
    PlaybackFailed { code: String },
    #[error("Speech recognition is not available on this host")]
    RecognitionUnavailable,
    #[error("Speech recognition failed: {code}")]
    RecognitionFailed { code: String },
    #[error("Invalid language tag: {0:?}")]
    InvalidLanguageTag(String),
    #[error("Speech request was cancelled")]
    Cancelled,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of [`SpeechError`] for callers that map failures
/// to localized messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CapabilityUnavailable,
    NoMatchingVoice,
    PlaybackFailed,
    RecognitionUnavailable,
    RecognitionFailed,
    InvalidRequest,
    Cancelled,
    Storage,
}

impl SpeechError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpeechError::CapabilityUnavailable => ErrorKind::CapabilityUnavailable,
            SpeechError::RecognitionUnavailable => ErrorKind::RecognitionUnavailable,
            SpeechError::NoMatchingVoice { .. } => ErrorKind::NoMatchingVoice,
            SpeechError::PlaybackFailed { .. } => ErrorKind::PlaybackFailed,
            SpeechError::RecognitionFailed { .. } => ErrorKind::RecognitionFailed,
            SpeechError::InvalidLanguageTag(_) | SpeechError::Config(_) => {
                ErrorKind::InvalidRequest
            }
            SpeechError::Cancelled => ErrorKind::Cancelled,
            SpeechError::Io(_) | SpeechError::Json(_) => ErrorKind::Storage,
        }
    }

    /// Short message suitable for showing to the person who triggered the
    /// request. Retrying is always a manual action.
    pub fn user_message(&self) -> String {
        match self {
            SpeechError::CapabilityUnavailable => {
                "Your browser or system does not support speech output.".to_string()
            }
            SpeechError::NoMatchingVoice { language_tag } => format!(
                "No voice is installed for {language_tag}. Add one in your system speech settings."
            ),
            SpeechError::PlaybackFailed { code } => {
                format!("Could not play the audio ({code}). Please try again.")
            }
            SpeechError::RecognitionUnavailable => {
                "Your browser or system does not support speech recognition.".to_string()
            }
            SpeechError::RecognitionFailed { code } => {
                format!("Could not recognize speech ({code}). Please try again.")
            }
            SpeechError::Cancelled => "Playback was stopped.".to_string(),
            SpeechError::InvalidLanguageTag(_)
            | SpeechError::Config(_)
            | SpeechError::Io(_)
            | SpeechError::Json(_) => "Speech settings are invalid.".to_string(),
        }
    }

    /// The underlying host error code, when there is one.
    pub fn platform_code(&self) -> Option<&str> {
        match self {
            SpeechError::PlaybackFailed { code } | SpeechError::RecognitionFailed { code } => {
                Some(code)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_error_display_includes_message() {
        assert_eq!(PlatformError::new("interrupted").to_string(), "interrupted");
        assert_eq!(
            PlatformError::with_message("synthesis-failed", "device busy").to_string(),
            "synthesis-failed: device busy"
        );
    }

    #[test]
    fn capability_errors_split_by_kind() {
        assert_eq!(
            SpeechError::CapabilityUnavailable.kind(),
            ErrorKind::CapabilityUnavailable
        );
        assert_eq!(
            SpeechError::RecognitionUnavailable.kind(),
            ErrorKind::RecognitionUnavailable
        );
    }

    #[test]
    fn user_message_carries_platform_code() {
        let err = SpeechError::PlaybackFailed {
            code: "audio-busy".to_string(),
        };
        assert!(err.user_message().contains("audio-busy"));
        assert_eq!(err.platform_code(), Some("audio-busy"));
        assert_eq!(SpeechError::Cancelled.platform_code(), None);
    }
}

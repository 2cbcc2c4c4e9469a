use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SpeechConfig;
use crate::error::SpeechError;
use crate::voice::validate_language_tag;
use crate::RecognitionEngine;

/// Settings for one recognition session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionRequest {
    pub language_tag: String,
    #[serde(default)]
    pub continuous: bool,
    #[serde(default)]
    pub interim_results_allowed: bool,
}

impl RecognitionRequest {
    pub fn new(language_tag: impl Into<String>) -> Self {
        Self {
            language_tag: language_tag.into(),
            continuous: false,
            interim_results_allowed: false,
        }
    }

    /// Alternatives requested from the host. Only the best transcript is used.
    pub fn max_alternatives(&self) -> u32 {
        1
    }
}

/// Events a host recognizer emits during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A transcript that may still change.
    Interim(String),
    /// A settled transcript.
    Final(String),
    /// Host error code (`"no-speech"`, `"audio-capture"`, `"not-allowed"`, ...).
    Error(String),
    /// The session ended.
    End,
}

/// Aborts the host session when dropped, unless the host already ended it.
struct SessionGuard<'a> {
    engine: &'a dyn RecognitionEngine,
    open: bool,
}

impl SessionGuard<'_> {
    fn closed_by_host(&mut self) {
        self.open = false;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            log::debug!("Aborting recognition session");
            self.engine.abort();
        }
    }
}

/// One-shot speech-to-text.
///
/// There is no retry: recognition is interactive and a failure goes straight
/// back to the person speaking.
pub struct SpeechRecognizer {
    engine: Arc<dyn RecognitionEngine>,
    session_timeout: Option<Duration>,
}

impl SpeechRecognizer {
    pub fn new(engine: Arc<dyn RecognitionEngine>, config: &SpeechConfig) -> Self {
        Self {
            engine,
            session_timeout: config.recognition_timeout(),
        }
    }

    /// Run a session and return the first final transcript.
    ///
    /// The session is aborted as soon as the call settles or its future is
    /// dropped, so a `continuous` session does not outlive the call.
    pub async fn recognize(&self, request: &RecognitionRequest) -> Result<String, SpeechError> {
        self.recognize_with_interim(request, |_| {}).await
    }

    /// [`recognize`](Self::recognize), forwarding interim transcripts to
    /// `on_interim` when the request allows them.
    pub async fn recognize_with_interim<F>(
        &self,
        request: &RecognitionRequest,
        mut on_interim: F,
    ) -> Result<String, SpeechError>
    where
        F: FnMut(&str) + Send,
    {
        if !self.engine.is_available() {
            log::error!("Speech recognition is not available on this host");
            return Err(SpeechError::RecognitionUnavailable);
        }
        validate_language_tag(&request.language_tag)?;

        log::info!(
            "Starting recognition in {} (continuous: {}, interim: {})",
            request.language_tag,
            request.continuous,
            request.interim_results_allowed
        );
        let mut events = self.engine.start(request).await.map_err(|e| {
            log::error!("Recognition failed to start: {e}");
            SpeechError::RecognitionFailed { code: e.code }
        })?;

        let mut guard = SessionGuard {
            engine: self.engine.as_ref(),
            open: true,
        };
        let session = async {
            while let Some(event) = events.recv().await {
                match event {
                    RecognitionEvent::Interim(text) => {
                        log::debug!("Interim transcript: {text}");
                        if request.interim_results_allowed {
                            on_interim(&text);
                        }
                    }
                    RecognitionEvent::Final(text) => return Ok(text),
                    RecognitionEvent::Error(code) => {
                        return Err(SpeechError::RecognitionFailed { code })
                    }
                    RecognitionEvent::End => break,
                }
            }
            guard.closed_by_host();
            Err(SpeechError::RecognitionFailed {
                code: "no-speech".to_string(),
            })
        };

        let result = match self.session_timeout {
            Some(limit) => match tokio::time::timeout(limit, session).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!("Recognition timed out after {limit:?}");
                    Err(SpeechError::RecognitionFailed {
                        code: "timeout".to_string(),
                    })
                }
            },
            None => session.await,
        };

        drop(guard);

        match &result {
            Ok(text) => log::info!("Recognized: {text}"),
            Err(e) => log::warn!("{e}"),
        }
        result
    }
}

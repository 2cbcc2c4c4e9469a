//! # speech-orchestrator
//!
//! Voice discovery, warm-up, retry and fallback orchestration on top of a
//! host text-to-speech engine, plus one-shot speech recognition.
//!
//! Host voice catalogs differ wildly between operating systems and browsers:
//! Arabic voices in particular may be missing, mislabeled, or only appear a
//! few seconds after start-up. This crate hides that behind a single
//! [`SpeechOrchestrator::speak`] call that picks the best voice, retries
//! transient engine errors, and falls back through alternate languages and a
//! substitute utterance before giving up.
//!
//! ## Features
//!
//! - **Voice analysis**: catalog inspection with host-specific recommendations
//! - **Retry with fallback**: bounded retries per voice, ordered fallback tags
//! - **Explicit cancellation**: per-request [`CancellationToken`]
//! - **Recognition**: first-final-transcript speech-to-text sessions
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! speech-orchestrator = { version = "2026.10", features = ["espeak"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use speech_orchestrator::engines::espeak::EspeakEngine;
//! use speech_orchestrator::{SpeechConfig, SpeechOrchestrator, SpeechRequest};
//!
//! let engine = Arc::new(EspeakEngine::new().await);
//! let orchestrator = SpeechOrchestrator::new(engine, SpeechConfig::default());
//!
//! let outcome = orchestrator.speak("مرحبا", &SpeechRequest::arabic()).await?;
//! println!("spoken with {:?}", outcome.voice);
//! # Ok::<(), speech_orchestrator::SpeechError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod engines;
pub mod error;
pub mod orchestrator;
pub mod preferences;
pub mod recognizer;
pub mod request;
pub mod text;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use catalog::{HostInfo, VoiceAnalysisReport, VoiceCatalogInspector, VoiceProbe};
pub use config::{LanguagePreset, SpeechConfig, SubstituteConfig};
pub use context::{InitState, SpeechContextInitializer};
pub use error::{ErrorKind, PlatformError, SpeechError};
pub use orchestrator::{SpeechOrchestrator, SpeechOutcome, SpeechRoute, SpeechState};
pub use recognizer::{RecognitionEvent, RecognitionRequest, SpeechRecognizer};
pub use request::{SpeechRequest, SpeechRequestBuilder};
pub use tokio_util::sync::CancellationToken;
pub use voice::{Utterance, VoiceDescriptor};

/// Host text-to-speech capability.
///
/// The engine is a single sequential resource: one utterance plays at a time
/// and queued utterances play in submission order. Callers clear the queue
/// with [`SpeechEngine::cancel`] before submitting a new utterance.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Whether the host exposes speech synthesis at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Identity of the host engine, used in diagnostics.
    fn host_info(&self) -> HostInfo;

    /// Current voice catalog. May be empty until the host finishes loading.
    fn voices(&self) -> Vec<VoiceDescriptor>;

    /// Resolves on the next voice-catalog change notification.
    ///
    /// Hosts that never notify may leave this pending forever; callers bound
    /// the wait themselves.
    async fn voices_changed(&self) {
        std::future::pending::<()>().await
    }

    /// Submit an utterance and wait until the host reports completion or an
    /// error.
    async fn speak(&self, utterance: Utterance) -> Result<(), PlatformError>;

    /// Stop the current utterance and drop everything queued behind it.
    fn cancel(&self);
}

/// Host speech-recognition capability.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Whether the host exposes speech recognition at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Start a session. Events arrive on the returned channel; the session is
    /// over when the channel closes or an `End` event is sent.
    async fn start(
        &self,
        request: &RecognitionRequest,
    ) -> Result<mpsc::Receiver<RecognitionEvent>, PlatformError>;

    /// Abort the running session, if any.
    fn abort(&self);
}

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::catalog::VoiceCatalogInspector;
use crate::config::SpeechConfig;
use crate::context::SpeechContextInitializer;
use crate::error::{PlatformError, SpeechError};
use crate::request::SpeechRequest;
use crate::text::prepare_arabic;
use crate::voice::{select_voice, validate_language_tag, Utterance, VoiceDescriptor};
use crate::SpeechEngine;

/// States of one `speak` call.
///
/// `Idle` is initial; `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeechState {
    Idle,
    Initializing,
    Analyzing,
    Selecting,
    Speaking,
    RetryWait,
    Fallback,
    Succeeded,
    Failed,
}

impl SpeechState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SpeechState::Succeeded | SpeechState::Failed)
    }

    pub fn can_transition_to(self, next: SpeechState) -> bool {
        use SpeechState::*;
        match self {
            Idle => matches!(next, Initializing | Succeeded | Failed),
            Initializing => matches!(next, Analyzing | Failed),
            Analyzing => matches!(next, Selecting | Failed),
            Selecting => matches!(next, Speaking | Fallback | Failed),
            Speaking => matches!(next, Succeeded | RetryWait | Fallback | Failed),
            RetryWait => matches!(next, Speaking | Failed),
            Fallback => matches!(next, Speaking | Failed),
            Succeeded | Failed => false,
        }
    }
}

/// Which path produced audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechRoute {
    /// Empty text; nothing was submitted.
    Skipped,
    /// A voice for the requested language played.
    Direct,
    /// A voice for this fallback tag played.
    FallbackLanguage(String),
    /// The configured substitute utterance played.
    Substitute,
}

/// Successful result of [`SpeechOrchestrator::speak`].
#[derive(Debug, Clone)]
pub struct SpeechOutcome {
    pub route: SpeechRoute,
    /// Voice that played, if the host was given one explicitly.
    pub voice: Option<VoiceDescriptor>,
    /// Utterances submitted for this request, warm-up excluded.
    pub attempts: u32,
    /// Every state visited, `Idle` first.
    pub states: Vec<SpeechState>,
}

enum AttemptError {
    Cancelled,
    Platform(PlatformError),
}

/// Bookkeeping for one `speak` call.
struct Run<'a> {
    states: Vec<SpeechState>,
    attempts: u32,
    last_error: Option<PlatformError>,
    cancel: &'a CancellationToken,
}

impl<'a> Run<'a> {
    fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            states: vec![SpeechState::Idle],
            attempts: 0,
            last_error: None,
            cancel,
        }
    }

    fn current(&self) -> SpeechState {
        self.states.last().copied().unwrap_or(SpeechState::Idle)
    }

    fn enter(&mut self, next: SpeechState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal speech transition {current:?} -> {next:?}"
        );
        log::debug!("speech state {current:?} -> {next:?}");
        self.states.push(next);
    }

    fn succeed(mut self, route: SpeechRoute, voice: Option<VoiceDescriptor>) -> SpeechOutcome {
        self.enter(SpeechState::Succeeded);
        SpeechOutcome {
            route,
            voice,
            attempts: self.attempts,
            states: self.states,
        }
    }

    fn fail(&mut self, error: SpeechError) -> SpeechError {
        if !self.current().is_terminal() {
            self.enter(SpeechState::Failed);
        }
        match &error {
            SpeechError::Cancelled => log::info!("Speech request cancelled"),
            e => log::error!("Speech request failed: {e}"),
        }
        error
    }
}

/// Speaks text through the host engine with voice selection, bounded
/// retries, and fallback.
///
/// The engine is a shared sequential resource. Every attempt clears the
/// engine queue first, so a `speak` call interrupts whatever else is
/// playing. Callers serialize their own requests; concurrent `speak` calls
/// may garble each other.
pub struct SpeechOrchestrator {
    engine: Arc<dyn SpeechEngine>,
    inspector: VoiceCatalogInspector,
    initializer: SpeechContextInitializer,
    config: SpeechConfig,
}

impl SpeechOrchestrator {
    pub fn new(engine: Arc<dyn SpeechEngine>, config: SpeechConfig) -> Self {
        Self {
            inspector: VoiceCatalogInspector::new(Arc::clone(&engine), &config),
            initializer: SpeechContextInitializer::new(Arc::clone(&engine), &config),
            engine,
            config,
        }
    }

    pub fn inspector(&self) -> &VoiceCatalogInspector {
        &self.inspector
    }

    pub fn initializer(&self) -> &SpeechContextInitializer {
        &self.initializer
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Stop playback and clear the engine queue.
    pub fn stop(&self) {
        if self.engine.is_available() {
            self.engine.cancel();
        }
    }

    /// Speak `text` as described by `request`.
    pub async fn speak(
        &self,
        text: &str,
        request: &SpeechRequest,
    ) -> Result<SpeechOutcome, SpeechError> {
        self.speak_with_cancel(text, request, &CancellationToken::new()).await
    }

    /// [`speak`](Self::speak) with an external cancellation token.
    ///
    /// Cancelling the token clears the engine queue and resolves the call
    /// with [`SpeechError::Cancelled`] at the next suspension point.
    pub async fn speak_with_cancel(
        &self,
        text: &str,
        request: &SpeechRequest,
        cancel: &CancellationToken,
    ) -> Result<SpeechOutcome, SpeechError> {
        let mut run = Run::new(cancel);

        if text.trim().is_empty() {
            log::debug!("Empty text, nothing to speak");
            return Ok(run.succeed(SpeechRoute::Skipped, None));
        }
        if let Err(e) = validate_language_tag(&request.language_tag) {
            return Err(run.fail(e));
        }
        if !self.engine.is_available() {
            return Err(run.fail(SpeechError::CapabilityUnavailable));
        }

        log::info!(
            "Speaking {} chars in {} (max {} attempts, fallback {})",
            text.chars().count(),
            request.language_tag,
            request.attempts(),
            if request.fallback_enabled { "on" } else { "off" }
        );

        run.enter(SpeechState::Initializing);
        let initialized = match self.cancellable(cancel, self.initializer.initialize()).await {
            Ok(ok) => ok,
            Err(e) => return Err(run.fail(e)),
        };
        if !initialized {
            log::warn!("Speech context not initialized, continuing in degraded mode");
        }

        run.enter(SpeechState::Analyzing);
        let voices = match self.cancellable(cancel, self.inspector.voices()).await {
            Ok(voices) => voices,
            Err(e) => return Err(run.fail(e)),
        };
        let report = self.inspector.report_for(&voices, &request.language_tag);
        log::debug!(
            "{} of {} voices match {}",
            report.matching_voices.len(),
            report.total_voice_count,
            request.language_tag
        );

        run.enter(SpeechState::Selecting);
        let Some(voice) = select_voice(&report.matching_voices, &request.language_tag).cloned()
        else {
            if !request.fallback_enabled {
                return Err(run.fail(SpeechError::NoMatchingVoice {
                    language_tag: request.language_tag.clone(),
                }));
            }
            log::warn!(
                "No voice for {}, using fallback path",
                request.language_tag
            );
            run.enter(SpeechState::Fallback);
            return self.fallback(text, request, &voices, None, run).await;
        };
        log::info!("Selected voice: {} ({})", voice.name, voice.language_tag);

        let utterance = utterance_for(text, request, Some(voice.clone()), &request.language_tag);
        match self.speak_with_retries(utterance, request.attempts(), &mut run).await {
            Ok(()) => Ok(run.succeed(SpeechRoute::Direct, Some(voice))),
            Err(AttemptError::Cancelled) => Err(run.fail(SpeechError::Cancelled)),
            Err(AttemptError::Platform(e)) if request.fallback_enabled => {
                log::warn!(
                    "Voice {} failed {} times ({e}), using fallback path",
                    voice.name,
                    request.attempts()
                );
                run.enter(SpeechState::Fallback);
                self.fallback(text, request, &voices, Some(&voice), run).await
            }
            Err(AttemptError::Platform(e)) => {
                Err(run.fail(SpeechError::PlaybackFailed { code: e.code }))
            }
        }
    }

    /// Speak a UI-language preset (`"ja"`, `"ar"`, `"ar-ma"`, `"ber"`, ...).
    pub async fn speak_preset(&self, text: &str, key: &str) -> Result<SpeechOutcome, SpeechError> {
        let preset = self
            .config
            .preset(key)
            .ok_or_else(|| SpeechError::Config(format!("unknown language preset '{key}'")))?;
        let request = SpeechRequest::from_preset(preset)?;
        self.speak(text, &request).await
    }

    /// Speak Modern Standard Arabic. Non-Arabic characters are stripped
    /// first unless nothing Arabic remains.
    pub async fn speak_arabic(&self, text: &str) -> Result<SpeechOutcome, SpeechError> {
        self.speak(&prepare_arabic(text), &SpeechRequest::arabic()).await
    }

    /// Speak Moroccan Arabic with the same cleanup as
    /// [`speak_arabic`](Self::speak_arabic).
    pub async fn speak_moroccan_arabic(&self, text: &str) -> Result<SpeechOutcome, SpeechError> {
        self.speak(&prepare_arabic(text), &SpeechRequest::moroccan_arabic()).await
    }

    /// Fallback tags in order, then the substitute utterance.
    ///
    /// One attempt per fallback tag. A tag whose best voice is `exhausted`
    /// (the voice that already used up its retries) is skipped.
    async fn fallback(
        &self,
        text: &str,
        request: &SpeechRequest,
        voices: &[VoiceDescriptor],
        exhausted: Option<&VoiceDescriptor>,
        mut run: Run<'_>,
    ) -> Result<SpeechOutcome, SpeechError> {
        for tag in &request.fallback_language_tags {
            let Some(voice) = select_voice(voices, tag) else {
                log::debug!("Fallback {tag}: no voice");
                continue;
            };
            if exhausted == Some(voice) {
                log::debug!("Fallback {tag}: {} already failed, skipping", voice.name);
                continue;
            }

            log::info!("Fallback {tag}: trying {} ({})", voice.name, voice.language_tag);
            let utterance = utterance_for(text, request, Some(voice.clone()), tag);
            run.enter(SpeechState::Speaking);
            match self.attempt(utterance, &mut run).await {
                Ok(()) => {
                    let route = SpeechRoute::FallbackLanguage(tag.clone());
                    return Ok(run.succeed(route, Some(voice.clone())));
                }
                Err(AttemptError::Cancelled) => return Err(run.fail(SpeechError::Cancelled)),
                Err(AttemptError::Platform(e)) => {
                    log::warn!("Fallback {tag} failed: {e}");
                    run.enter(SpeechState::Fallback);
                }
            }
        }

        if let Some(substitute) = &self.config.substitute {
            let voice = select_voice(voices, &substitute.language_tag).cloned();
            log::info!(
                "Speaking substitute utterance in {} with {}",
                substitute.language_tag,
                voice.as_ref().map_or("the host default voice", |v| v.name.as_str())
            );
            let utterance = utterance_for(
                &substitute.render(text),
                request,
                voice.clone(),
                &substitute.language_tag,
            );
            run.enter(SpeechState::Speaking);
            match self.attempt(utterance, &mut run).await {
                Ok(()) => return Ok(run.succeed(SpeechRoute::Substitute, voice)),
                Err(AttemptError::Cancelled) => return Err(run.fail(SpeechError::Cancelled)),
                Err(AttemptError::Platform(e)) => log::warn!("Substitute utterance failed: {e}"),
            }
        }

        let error = match run.last_error.take() {
            Some(e) => SpeechError::PlaybackFailed { code: e.code },
            None => SpeechError::NoMatchingVoice {
                language_tag: request.language_tag.clone(),
            },
        };
        Err(run.fail(error))
    }

    /// Up to `attempts` sequential attempts with a fixed backoff between them.
    async fn speak_with_retries(
        &self,
        utterance: Utterance,
        attempts: u32,
        run: &mut Run<'_>,
    ) -> Result<(), AttemptError> {
        let mut last = PlatformError::new("synthesis-failed");
        for n in 1..=attempts {
            if n > 1 {
                run.enter(SpeechState::RetryWait);
                let backoff = self.config.retry_backoff();
                if self.cancellable(run.cancel, tokio::time::sleep(backoff)).await.is_err() {
                    return Err(AttemptError::Cancelled);
                }
            }

            run.enter(SpeechState::Speaking);
            log::debug!("Playback attempt {n}/{attempts}");
            match self.attempt(utterance.clone(), run).await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Platform(e)) => {
                    log::warn!("Playback attempt {n}/{attempts} failed: {e}");
                    last = e;
                }
                Err(AttemptError::Cancelled) => return Err(AttemptError::Cancelled),
            }
        }
        Err(AttemptError::Platform(last))
    }

    /// One playback attempt: clear the queue, settle, speak with a timeout.
    async fn attempt(&self, utterance: Utterance, run: &mut Run<'_>) -> Result<(), AttemptError> {
        run.attempts += 1;
        self.engine.cancel();

        let settle = self.config.settle_delay();
        if !settle.is_zero()
            && self.cancellable(run.cancel, tokio::time::sleep(settle)).await.is_err()
        {
            return Err(AttemptError::Cancelled);
        }

        let timeout = self.config.attempt_timeout();
        let result = tokio::select! {
            biased;
            _ = run.cancel.cancelled() => {
                self.engine.cancel();
                return Err(AttemptError::Cancelled);
            }
            result = tokio::time::timeout(timeout, self.engine.speak(utterance)) => result,
        };

        let error = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => {
                log::warn!("Engine did not finish the utterance within {timeout:?}");
                self.engine.cancel();
                PlatformError::timeout()
            }
        };
        run.last_error = Some(error.clone());
        Err(AttemptError::Platform(error))
    }

    /// Race `fut` against `cancel`. Cancellation clears the engine queue.
    async fn cancellable<F: Future>(
        &self,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<F::Output, SpeechError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.engine.cancel();
                Err(SpeechError::Cancelled)
            }
            output = fut => Ok(output),
        }
    }
}

fn utterance_for(
    text: &str,
    request: &SpeechRequest,
    voice: Option<VoiceDescriptor>,
    language_tag: &str,
) -> Utterance {
    let mut utterance = Utterance::new(text, language_tag);
    utterance.rate = request.rate;
    utterance.pitch = request.pitch;
    utterance.volume = request.volume;
    match voice {
        Some(voice) => utterance.with_voice(voice),
        None => utterance,
    }
}

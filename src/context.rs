use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::SpeechConfig;
use crate::voice::Utterance;
use crate::SpeechEngine;

/// Volume of the warm-up utterance. Zero is ignored by some hosts.
const WARM_UP_VOLUME: f32 = 0.01;

/// Highest rate hosts accept, so the warm-up finishes as fast as possible.
const WARM_UP_RATE: f32 = 10.0;

/// Lifecycle of the speech context warm-up.
///
/// `Unset` at construction, `Pending` while the warm-up utterance is in
/// flight, `Succeeded` forever after the first success. A failed or
/// abandoned warm-up leaves it `Unset` so the next call tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Unset,
    Pending,
    Succeeded,
}

/// Warms up the host engine with a near-silent utterance.
///
/// Some hosts refuse to produce audio until one utterance has completed in
/// the current session. [`initialize`](Self::initialize) is safe to call
/// from every `speak`: after the first success it returns the cached result
/// without touching the engine.
pub struct SpeechContextInitializer {
    engine: Arc<dyn SpeechEngine>,
    attempt_timeout: Duration,
    /// Holds only settled states; `Pending` is the lock being held.
    state: Mutex<InitState>,
}

impl SpeechContextInitializer {
    pub fn new(engine: Arc<dyn SpeechEngine>, config: &SpeechConfig) -> Self {
        Self {
            engine,
            attempt_timeout: config.attempt_timeout(),
            state: Mutex::new(InitState::Unset),
        }
    }

    /// Run the warm-up once. Returns `true` on success, `false` on any
    /// failure; never errors.
    ///
    /// Concurrent callers wait for the in-flight warm-up instead of issuing
    /// their own.
    pub async fn initialize(&self) -> bool {
        let mut state = self.state.lock().await;
        if *state == InitState::Succeeded {
            return true;
        }

        if !self.engine.is_available() {
            log::error!("Speech synthesis is not available; skipping warm-up");
            return false;
        }

        log::debug!("Warming up speech context");

        let mut utterance = Utterance::new("", "");
        utterance.volume = WARM_UP_VOLUME;
        utterance.rate = WARM_UP_RATE;

        let warm_up = tokio::time::timeout(self.attempt_timeout, self.engine.speak(utterance));
        let ok = match warm_up.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::warn!("Speech context warm-up failed: {e}");
                false
            }
            Err(_) => {
                log::warn!("Speech context warm-up timed out after {:?}", self.attempt_timeout);
                self.engine.cancel();
                false
            }
        };

        *state = if ok {
            log::info!("Speech context initialized");
            InitState::Succeeded
        } else {
            InitState::Unset
        };
        ok
    }

    /// Current lifecycle state. Reports `Pending` while a warm-up is running.
    /// Dropping an `initialize` future mid-warm-up releases the lock, so the
    /// state falls back to the last settled value.
    pub fn state(&self) -> InitState {
        match self.state.try_lock() {
            Ok(state) => *state,
            Err(_) => InitState::Pending,
        }
    }

    /// Forget a cached success, as a full reload would.
    pub async fn reset(&self) {
        *self.state.lock().await = InitState::Unset;
    }
}

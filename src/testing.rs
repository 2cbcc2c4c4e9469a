//! Scriptable host engines for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use crate::catalog::HostInfo;
use crate::error::PlatformError;
use crate::recognizer::{RecognitionEvent, RecognitionRequest};
use crate::voice::{Utterance, VoiceDescriptor};
use crate::{RecognitionEngine, SpeechEngine};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Cancel,
    Speak(Utterance),
}

#[derive(Default)]
struct FakeState {
    voices: Vec<VoiceDescriptor>,
    /// Results for upcoming `speak` calls, consumed front to back.
    scripted: VecDeque<Result<(), PlatformError>>,
    /// Voices that fail every time they are used.
    failing_voices: HashMap<String, PlatformError>,
    /// Error for every utterance without a per-voice rule.
    fail_all: Option<PlatformError>,
    hang: bool,
    speak_delay: Duration,
    calls: Vec<EngineCall>,
}

/// In-memory [`SpeechEngine`] with controllable catalog, timing and errors.
pub struct FakeEngine {
    available: bool,
    host: HostInfo,
    state: Mutex<FakeState>,
    voices_notify: Notify,
}

impl FakeEngine {
    pub fn with_voices(voices: Vec<VoiceDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            host: HostInfo::new("Chrome", "120", "Linux x86_64"),
            state: Mutex::new(FakeState {
                voices,
                ..Default::default()
            }),
            voices_notify: Notify::new(),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            available: false,
            host: HostInfo::unknown(),
            state: Mutex::new(FakeState::default()),
            voices_notify: Notify::new(),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Replace the catalog after `delay` and fire a change notification.
    pub fn populate_after(self: &Arc<Self>, delay: Duration, voices: Vec<VoiceDescriptor>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.state().voices = voices;
            engine.voices_notify.notify_waiters();
        });
    }

    /// Queue results for the next `speak` calls.
    pub fn script(&self, results: impl IntoIterator<Item = Result<(), PlatformError>>) {
        self.state().scripted.extend(results);
    }

    pub fn fail_voice(&self, name: &str, error: PlatformError) {
        self.state().failing_voices.insert(name.to_string(), error);
    }

    pub fn fail_all(&self, error: PlatformError) {
        self.state().fail_all = Some(error);
    }

    /// Never report completion for any utterance.
    pub fn hang(&self) {
        self.state().hang = true;
    }

    pub fn set_speak_delay(&self, delay: Duration) {
        self.state().speak_delay = delay;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Speak(u) => Some(u),
                EngineCall::Cancel => None,
            })
            .collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Cancel))
            .count()
    }
}

#[async_trait]
impl SpeechEngine for FakeEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    fn host_info(&self) -> HostInfo {
        self.host.clone()
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        self.state().voices.clone()
    }

    async fn voices_changed(&self) {
        self.voices_notify.notified().await
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), PlatformError> {
        let (hang, delay, result) = {
            let mut state = self.state();
            let voice_rule = utterance
                .voice
                .as_ref()
                .and_then(|v| state.failing_voices.get(&v.name).cloned());
            let result = match voice_rule {
                Some(err) => Err(err),
                None => match state.scripted.pop_front() {
                    Some(result) => result,
                    None => state.fail_all.clone().map_or(Ok(()), Err),
                },
            };
            state.calls.push(EngineCall::Speak(utterance));
            (state.hang, state.speak_delay, result)
        };

        if hang {
            std::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn cancel(&self) {
        self.state().calls.push(EngineCall::Cancel);
    }
}

/// In-memory [`RecognitionEngine`] that replays a fixed event script.
pub struct FakeRecognizer {
    available: bool,
    start_error: Option<PlatformError>,
    events: Vec<RecognitionEvent>,
    /// Keep the channel open after the script so the session never ends.
    hold_open: bool,
    held: Mutex<Option<mpsc::Sender<RecognitionEvent>>>,
    aborted: Mutex<usize>,
    started_with: Mutex<Vec<RecognitionRequest>>,
}

impl FakeRecognizer {
    pub fn with_events(events: Vec<RecognitionEvent>) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            start_error: None,
            events,
            hold_open: false,
            held: Mutex::new(None),
            aborted: Mutex::new(0),
            started_with: Mutex::new(Vec::new()),
        })
    }

    pub fn holding_open(events: Vec<RecognitionEvent>) -> Arc<Self> {
        let mut recognizer = Self::with_events(events);
        if let Some(r) = Arc::get_mut(&mut recognizer) {
            r.hold_open = true;
        }
        recognizer
    }

    pub fn failing_to_start(error: PlatformError) -> Arc<Self> {
        let mut recognizer = Self::with_events(Vec::new());
        if let Some(r) = Arc::get_mut(&mut recognizer) {
            r.start_error = Some(error);
        }
        recognizer
    }

    pub fn unavailable() -> Arc<Self> {
        let mut recognizer = Self::with_events(Vec::new());
        if let Some(r) = Arc::get_mut(&mut recognizer) {
            r.available = false;
        }
        recognizer
    }

    pub fn abort_count(&self) -> usize {
        *self.aborted.lock().unwrap()
    }

    pub fn starts(&self) -> Vec<RecognitionRequest> {
        self.started_with.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecognitionEngine for FakeRecognizer {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn start(
        &self,
        request: &RecognitionRequest,
    ) -> Result<mpsc::Receiver<RecognitionEvent>, PlatformError> {
        self.started_with.lock().unwrap().push(request.clone());
        if let Some(err) = &self.start_error {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::channel(self.events.len().max(1));
        for event in &self.events {
            let _ = tx.try_send(event.clone());
        }
        if self.hold_open {
            *self.held.lock().unwrap() = Some(tx);
        }
        Ok(rx)
    }

    fn abort(&self) {
        *self.aborted.lock().unwrap() += 1;
    }
}

use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Notify;

use crate::catalog::HostInfo;
use crate::error::PlatformError;
use crate::voice::{Utterance, VoiceDescriptor};
use crate::SpeechEngine;

/// espeak-ng's default speaking rate in words per minute.
const DEFAULT_WPM: f32 = 175.0;
const MIN_WPM: f32 = 80.0;
const MAX_WPM: f32 = 450.0;

/// Location of the espeak-ng binary and its data directory.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    /// `None` runs `espeak-ng` from PATH.
    pub bin_path: Option<PathBuf>,
    /// `None` uses the data directory compiled into the binary.
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn bin(&self) -> &OsStr {
        self.bin_path
            .as_deref()
            .map(Path::as_os_str)
            .unwrap_or_else(|| OsStr::new("espeak-ng"))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(self.bin());
        if let Some(data) = &self.data_path {
            cmd.arg(format!("--path={}", data.display()));
        }
        cmd
    }

    /// Run a one-off query (`--version`, `--voices`) and return its stdout.
    async fn query(&self, arg: &str) -> Option<String> {
        let output = match self.command().arg(arg).kill_on_drop(true).output().await {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Could not run espeak-ng {arg}: {e}");
                return None;
            }
        };
        if !output.status.success() {
            log::warn!(
                "espeak-ng {arg} exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn load_voices(&self) -> Vec<VoiceDescriptor> {
        let voices = self
            .query("--voices")
            .await
            .map(|out| parse_voice_list(&out))
            .unwrap_or_default();
        log::info!("Loaded {} espeak-ng voices", voices.len());
        voices
    }
}

/// Voice list shared with the background reload task.
#[derive(Default)]
struct VoiceCache {
    voices: Mutex<Vec<VoiceDescriptor>>,
    loading: AtomicBool,
    changed: Notify,
}

impl VoiceCache {
    fn get(&self) -> Vec<VoiceDescriptor> {
        self.voices.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Keep `voices` if non-empty. Returns whether anything was stored.
    fn store(&self, voices: Vec<VoiceDescriptor>) -> bool {
        if voices.is_empty() {
            return false;
        }
        *self.voices.lock().unwrap_or_else(|e| e.into_inner()) = voices;
        true
    }
}

/// OS-level speech through the espeak-ng command-line synthesizer.
///
/// Each utterance runs one `espeak-ng` child process that plays straight to
/// the default audio device. [`cancel`](SpeechEngine::cancel) kills the
/// running child. The binary is probed and the voice list read once at
/// construction; an empty list is reloaded in the background on the next
/// [`voices`](SpeechEngine::voices) call and announced through
/// [`voices_changed`](SpeechEngine::voices_changed).
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use speech_orchestrator::engines::espeak::EspeakEngine;
/// use speech_orchestrator::{SpeechConfig, SpeechOrchestrator};
///
/// # async fn run() {
/// let engine = EspeakEngine::new().await;
/// let orchestrator = SpeechOrchestrator::new(Arc::new(engine), SpeechConfig::default());
/// # }
/// ```
pub struct EspeakEngine {
    espeak: EspeakConfig,
    version: Option<String>,
    cache: Arc<VoiceCache>,
    cancelled: Notify,
}

impl EspeakEngine {
    /// Probe `espeak-ng` on PATH.
    pub async fn new() -> Self {
        Self::with_config(EspeakConfig::default()).await
    }

    /// Probe an explicit binary and data path, for bundled installations.
    pub async fn with_config(espeak: EspeakConfig) -> Self {
        let version = espeak
            .query("--version")
            .await
            .map(|out| parse_version(&out));
        let engine = Self::from_parts(espeak, version);
        if engine.version.is_some() {
            engine.cache.store(engine.espeak.load_voices().await);
        }
        engine
    }

    fn from_parts(espeak: EspeakConfig, version: Option<String>) -> Self {
        Self {
            espeak,
            version,
            cache: Arc::new(VoiceCache::default()),
            cancelled: Notify::new(),
        }
    }

    /// Reload the voice list on the current runtime unless a reload is
    /// already running.
    fn reload_voices(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self.cache.loading.swap(true, Ordering::AcqRel) {
            return;
        }
        let espeak = self.espeak.clone();
        let cache = Arc::clone(&self.cache);
        runtime.spawn(async move {
            let stored = cache.store(espeak.load_voices().await);
            cache.loading.store(false, Ordering::Release);
            if stored {
                cache.changed.notify_waiters();
            }
        });
    }
}

/// Platform label in the style hosts report (`navigator.platform`).
fn platform_label(os: &str) -> &str {
    match os {
        "linux" => "Linux",
        "macos" => "MacIntel",
        "windows" => "Win32",
        other => other,
    }
}

#[async_trait]
impl SpeechEngine for EspeakEngine {
    fn is_available(&self) -> bool {
        self.version.is_some()
    }

    fn host_info(&self) -> HostInfo {
        HostInfo::new(
            "espeak-ng",
            self.version.as_deref().unwrap_or("Unknown"),
            platform_label(std::env::consts::OS),
        )
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        let voices = self.cache.get();
        if voices.is_empty() && self.is_available() {
            self.reload_voices();
        }
        voices
    }

    async fn voices_changed(&self) {
        self.cache.changed.notified().await
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), PlatformError> {
        // Nothing to play; espeak-ng needs no warm-up.
        if utterance.text.trim().is_empty() {
            return Ok(());
        }

        // Registered before spawning so a cancel issued mid-utterance is seen.
        let cancelled = self.cancelled.notified();

        let mut cmd = self.espeak.command();
        cmd.args(speak_args(&utterance))
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlatformError::with_message("synthesis-unavailable", "espeak-ng not found")
            } else {
                PlatformError::with_message("synthesis-failed", e.to_string())
            }
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = newline_terminated(&utterance.text);
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| PlatformError::with_message("synthesis-failed", e.to_string()))?;
        }

        let mut stderr = child.stderr.take();
        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| PlatformError::with_message("synthesis-failed", e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    let mut detail = String::new();
                    if let Some(stderr) = stderr.as_mut() {
                        let _ = stderr.read_to_string(&mut detail).await;
                    }
                    let message =
                        format!("espeak-ng exited with {:?}: {}", status.code(), detail.trim());
                    Err(PlatformError::with_message("synthesis-failed", message))
                }
            }
            _ = cancelled => {
                let _ = child.kill().await;
                Err(PlatformError::new("interrupted"))
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}

/// Command-line arguments for voice, rate, pitch and amplitude.
fn speak_args(utterance: &Utterance) -> Vec<String> {
    let mut args = Vec::new();

    let voice = utterance
        .voice
        .as_ref()
        .map(|v| v.language_tag.as_str())
        .unwrap_or(utterance.language_tag.as_str());
    if !voice.is_empty() {
        args.push("-v".to_string());
        args.push(voice.replace('_', "-").to_ascii_lowercase());
    }

    let wpm = (utterance.rate * DEFAULT_WPM).clamp(MIN_WPM, MAX_WPM);
    let pitch = (utterance.pitch * 50.0).clamp(0.0, 99.0);
    let amplitude = (utterance.volume * 100.0).clamp(0.0, 200.0);
    args.extend([
        "-s".to_string(),
        format!("{}", wpm.round() as u32),
        "-p".to_string(),
        format!("{}", pitch.round() as u32),
        "-a".to_string(),
        format!("{}", amplitude.round() as u32),
    ]);
    args
}

fn newline_terminated(text: &str) -> Cow<'_, str> {
    if text.ends_with('\n') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{text}\n"))
    }
}

/// Extract the version from `espeak-ng --version`
/// (`"eSpeak NG text-to-speech: 1.51  Data at: ..."`).
fn parse_version(output: &str) -> String {
    output
        .split("text-to-speech:")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("Unknown")
        .to_string()
}

/// Parse the `espeak-ng --voices` table.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  5  ar              --/M      Arabic             sem/ar
/// ```
fn parse_voice_list(output: &str) -> Vec<VoiceDescriptor> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let _age_gender = columns.next()?;
            let name = columns.next()?;
            Some(VoiceDescriptor {
                name: name.replace('_', " "),
                language_tag: language.to_string(),
                is_default: language == "en",
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VoiceAnalysisReport;

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  ar              --/M      Arabic             sem/ar
 2  en              --/M      English_(Great_Britain) gmw/en         (en 2)
 5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
";

    #[test]
    fn parses_voice_table() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[1], VoiceDescriptor::new("Arabic", "ar"));
        assert_eq!(voices[2].name, "English (Great Britain)");
        assert!(voices[2].is_default);
        assert_eq!(voices[3].language_tag, "en-us");
    }

    #[test]
    fn parses_version_line() {
        assert_eq!(
            parse_version("eSpeak NG text-to-speech: 1.51  Data at: /usr/share/espeak-ng-data\n"),
            "1.51"
        );
        assert_eq!(parse_version("garbage"), "Unknown");
    }

    #[test]
    fn maps_prosody_to_espeak_ranges() {
        let mut utterance =
            Utterance::new("مرحبا", "ar-SA").with_voice(VoiceDescriptor::new("Arabic", "ar"));
        utterance.rate = 0.8;
        utterance.pitch = 1.1;
        utterance.volume = 1.0;
        assert_eq!(
            speak_args(&utterance),
            ["-v", "ar", "-s", "140", "-p", "55", "-a", "100"]
        );
    }

    #[test]
    fn warm_up_rate_is_clamped() {
        let mut utterance = Utterance::new("x", "en_US");
        utterance.rate = 10.0;
        utterance.volume = 0.01;
        let args = speak_args(&utterance);
        assert_eq!(&args[..4], ["-v", "en-us", "-s", "450"]);
        assert_eq!(args.last().map(String::as_str), Some("1"));
    }

    #[test]
    fn empty_language_lets_espeak_choose() {
        let args = speak_args(&Utterance::new("x", ""));
        assert_eq!(args[0], "-s");
    }

    #[test]
    fn stdin_payload_is_newline_terminated() {
        assert_eq!(newline_terminated("Fes"), "Fes\n");
        assert_eq!(newline_terminated("Fes\n"), "Fes\n");
    }

    #[test]
    fn host_platform_uses_report_labels() {
        assert_eq!(platform_label("linux"), "Linux");
        assert_eq!(platform_label("macos"), "MacIntel");
        assert_eq!(platform_label("windows"), "Win32");
        assert_eq!(platform_label("freebsd"), "freebsd");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn report_on_linux_host_suggests_installing_voices() {
        let engine = EspeakEngine::from_parts(EspeakConfig::default(), Some("1.51".to_string()));
        let report = VoiceAnalysisReport::from_voices(&[], "ar-SA", engine.host_info(), 10);
        assert_eq!(report.host_info.platform_name, "Linux");
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.starts_with("Linux:") && r.contains("espeak-ng")));
    }

    #[test]
    fn empty_voice_list_is_not_cached() {
        let cache = VoiceCache::default();
        assert!(!cache.store(Vec::new()));
        assert!(cache.store(vec![VoiceDescriptor::new("Arabic", "ar")]));
        assert!(!cache.store(Vec::new()));
        assert_eq!(cache.get().len(), 1);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let engine = EspeakEngine::with_config(EspeakConfig {
            bin_path: Some(PathBuf::from("/nonexistent/espeak-ng")),
            data_path: None,
        })
        .await;
        assert!(!engine.is_available());
        assert!(engine.voices().is_empty());
        assert_eq!(engine.host_info().engine_version, "Unknown");
    }

    #[tokio::test]
    async fn speaks_when_espeak_is_installed() {
        // Skip when espeak-ng is unavailable in the execution environment.
        let engine = EspeakEngine::new().await;
        if !engine.is_available() {
            return;
        }
        let mut utterance = Utterance::new("ok", "en");
        utterance.volume = 0.0;
        utterance.rate = 4.0;
        // No audio device is fine: only spawn failures are fatal here.
        if let Err(e) = engine.speak(utterance).await {
            assert_ne!(e.code, "synthesis-unavailable");
        }
    }
}

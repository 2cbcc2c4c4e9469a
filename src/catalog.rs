use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::timeout_at;

use crate::config::SpeechConfig;
use crate::error::PlatformError;
use crate::voice::{classify, family_name, primary_subtag, Utterance, VoiceDescriptor};
use crate::SpeechEngine;

/// Identity of the host speech engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    /// `"Chrome"`, `"Edge"`, `"Firefox"`, `"Safari"`, `"espeak-ng"`, ...
    pub engine_name: String,
    pub engine_version: String,
    /// Operating system label (`"Win32"`, `"MacIntel"`, `"Linux x86_64"`).
    pub platform_name: String,
}

const UNKNOWN: &str = "Unknown";

impl HostInfo {
    pub fn new(
        engine_name: impl Into<String>,
        engine_version: impl Into<String>,
        platform_name: impl Into<String>,
    ) -> Self {
        Self {
            engine_name: engine_name.into(),
            engine_version: engine_version.into(),
            platform_name: platform_name.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN)
    }

    /// Identify a browser from its user-agent string.
    ///
    /// Edge advertises `Chrome/` too, so `Edg/` is checked first; Safari's
    /// version lives in `Version/`.
    pub fn from_user_agent(user_agent: &str, platform: &str) -> Self {
        let (name, marker) = if user_agent.contains("Edg/") {
            ("Edge", "Edg/")
        } else if user_agent.contains("Chrome/") {
            ("Chrome", "Chrome/")
        } else if user_agent.contains("Firefox/") {
            ("Firefox", "Firefox/")
        } else if user_agent.contains("Safari/") {
            ("Safari", "Version/")
        } else {
            return Self::new(UNKNOWN, UNKNOWN, platform);
        };

        let version = major_version_after(user_agent, marker).unwrap_or(UNKNOWN);
        Self::new(name, version, platform)
    }

    fn is_chromium(&self) -> bool {
        matches!(self.engine_name.as_str(), "Chrome" | "Edge")
    }
}

fn major_version_after<'a>(user_agent: &'a str, marker: &str) -> Option<&'a str> {
    let start = user_agent.find(marker)? + marker.len();
    let rest = &user_agent[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

/// Snapshot of the host voice catalog relative to one requested language.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceAnalysisReport {
    pub requested_language_tag: String,
    pub total_voice_count: usize,
    /// Voices in the requested language family, in enumeration order.
    pub matching_voices: Vec<VoiceDescriptor>,
    pub supported_language_tags: BTreeSet<String>,
    pub host_info: HostInfo,
    pub has_requested_language_support: bool,
    pub recommendations: Vec<String>,
}

impl VoiceAnalysisReport {
    /// Build a report from an already fetched catalog.
    pub fn from_voices(
        voices: &[VoiceDescriptor],
        language_tag: &str,
        host_info: HostInfo,
        low_voice_threshold: usize,
    ) -> Self {
        let matching_voices: Vec<VoiceDescriptor> = voices
            .iter()
            .filter(|v| classify(v, language_tag).is_some())
            .cloned()
            .collect();
        let supported_language_tags = voices.iter().map(|v| v.language_tag.clone()).collect();
        let recommendations = recommendations(
            &host_info,
            language_tag,
            voices.len(),
            matching_voices.len(),
            low_voice_threshold,
        );

        Self {
            requested_language_tag: language_tag.to_string(),
            total_voice_count: voices.len(),
            has_requested_language_support: !matching_voices.is_empty(),
            matching_voices,
            supported_language_tags,
            host_info,
            recommendations,
        }
    }

    /// Multi-line, human-readable diagnosis.
    pub fn summary(&self) -> String {
        let family = family_name(&primary_subtag(&self.requested_language_tag));
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Engine: {} {}",
            self.host_info.engine_name, self.host_info.engine_version
        );
        let _ = writeln!(out, "Platform: {}", self.host_info.platform_name);
        let _ = writeln!(out, "Total voices: {}", self.total_voice_count);
        let _ = writeln!(out, "{family} voices: {}", self.matching_voices.len());
        for (i, voice) in self.matching_voices.iter().enumerate() {
            let _ = writeln!(out, "  {}. {} ({})", i + 1, voice.name, voice.language_tag);
        }
        for recommendation in &self.recommendations {
            let _ = writeln!(out, "- {recommendation}");
        }
        out
    }
}

fn recommendations(
    host: &HostInfo,
    language_tag: &str,
    total: usize,
    matching: usize,
    low_voice_threshold: usize,
) -> Vec<String> {
    let family = family_name(&primary_subtag(language_tag));
    let mut out = Vec::new();

    if host.is_chromium() {
        out.push("Chromium-based browsers have the most complete speech synthesis.".to_string());
    } else if host.engine_name == "Firefox" {
        out.push("Firefox has limited voice support; Chrome or Edge is recommended.".to_string());
    } else if host.engine_name == "Safari" {
        out.push("Safari voices come from the macOS system speech settings.".to_string());
    }

    if matching == 0 {
        out.push(format!("No {family} voice was found."));
        let platform = host.platform_name.to_ascii_lowercase();
        // "darwin" contains "win", so macOS is checked first.
        if platform.contains("mac") || platform.contains("darwin") {
            out.push(format!(
                "macOS: System Settings > Accessibility > Spoken Content > System Voice > \
                 Manage Voices, then add {family}."
            ));
        } else if platform.contains("win") {
            out.push(format!(
                "Windows: Settings > Time & Language > Speech > Add voices, then add {family}."
            ));
        } else if platform.contains("linux") {
            out.push(format!(
                "Linux: install espeak-ng (or a speech-dispatcher voice) that includes {family}."
            ));
        }
    } else {
        out.push(format!("{matching} {family} voice(s) available."));
    }

    if total < low_voice_threshold {
        out.push(format!(
            "Only {total} voice(s) installed; add system voices for better coverage."
        ));
    }

    out
}

/// Result of speaking a sample with one voice.
#[derive(Debug, Clone)]
pub struct VoiceProbe {
    pub voice: VoiceDescriptor,
    pub result: Result<(), PlatformError>,
    pub elapsed: Duration,
}

/// Reads and classifies the host voice catalog.
pub struct VoiceCatalogInspector {
    engine: Arc<dyn SpeechEngine>,
    voices_timeout: Duration,
    attempt_timeout: Duration,
    low_voice_threshold: usize,
}

impl VoiceCatalogInspector {
    pub fn new(engine: Arc<dyn SpeechEngine>, config: &SpeechConfig) -> Self {
        Self {
            engine,
            voices_timeout: config.voices_timeout(),
            attempt_timeout: config.attempt_timeout(),
            low_voice_threshold: config.low_voice_threshold,
        }
    }

    /// Current catalog, waiting up to the configured timeout for an empty
    /// catalog to populate.
    ///
    /// Every change notification triggers a re-query; the wait ends at the
    /// first non-empty catalog or at the deadline, whichever comes first.
    pub async fn voices(&self) -> Vec<VoiceDescriptor> {
        if !self.engine.is_available() {
            return Vec::new();
        }

        let voices = self.engine.voices();
        if !voices.is_empty() {
            return voices;
        }

        log::debug!(
            "Voice catalog empty, waiting up to {:?} for it to load",
            self.voices_timeout
        );
        let deadline = tokio::time::Instant::now() + self.voices_timeout;
        loop {
            if timeout_at(deadline, self.engine.voices_changed()).await.is_err() {
                log::warn!("Timed out waiting for the voice catalog to load");
                return self.engine.voices();
            }
            let voices = self.engine.voices();
            if !voices.is_empty() {
                log::info!("Voice catalog loaded: {} voices", voices.len());
                return voices;
            }
        }
    }

    /// Analyze the catalog for `language_tag`. Never fails: a missing engine
    /// or empty catalog is reported, not raised.
    pub async fn analyze(&self, language_tag: &str) -> VoiceAnalysisReport {
        let voices = self.voices().await;
        self.report_for(&voices, language_tag)
    }

    /// Report over a catalog the caller already fetched with
    /// [`voices`](Self::voices).
    pub fn report_for(
        &self,
        voices: &[VoiceDescriptor],
        language_tag: &str,
    ) -> VoiceAnalysisReport {
        let host_info = if self.engine.is_available() {
            self.engine.host_info()
        } else {
            HostInfo::unknown()
        };
        VoiceAnalysisReport::from_voices(voices, language_tag, host_info, self.low_voice_threshold)
    }

    /// [`analyze`](Self::analyze) and log the summary.
    pub async fn diagnose(&self, language_tag: &str) -> VoiceAnalysisReport {
        let report = self.analyze(language_tag).await;
        for line in report.summary().lines() {
            log::info!("{line}");
        }
        report
    }

    /// Speak `text` once with every voice matching `language_tag`.
    ///
    /// Probes run one after another; each clears the engine queue first and
    /// is bounded by the attempt timeout.
    pub async fn probe_voices(&self, text: &str, language_tag: &str) -> Vec<VoiceProbe> {
        let report = self.analyze(language_tag).await;
        let mut probes = Vec::with_capacity(report.matching_voices.len());

        for voice in report.matching_voices {
            let utterance = Utterance::new(text, language_tag).with_voice(voice.clone());
            self.engine.cancel();

            let started = Instant::now();
            let attempt = tokio::time::timeout(self.attempt_timeout, self.engine.speak(utterance));
            let result = match attempt.await {
                Ok(result) => result,
                Err(_) => {
                    self.engine.cancel();
                    Err(PlatformError::timeout())
                }
            };
            let elapsed = started.elapsed();

            match &result {
                Ok(()) => log::info!(
                    "Probe ok: {} ({}) in {elapsed:?}",
                    voice.name,
                    voice.language_tag
                ),
                Err(e) => log::warn!("Probe failed: {} ({}): {e}", voice.name, voice.language_tag),
            }
            probes.push(VoiceProbe {
                voice,
                result,
                elapsed,
            });
        }

        probes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const SAFARI_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_1) AppleWebKit/605.1.15 \
        (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    fn config() -> SpeechConfig {
        SpeechConfig::default()
    }

    #[test]
    fn parses_user_agents() {
        assert_eq!(
            HostInfo::from_user_agent(CHROME_WIN, "Win32"),
            HostInfo::new("Chrome", "120", "Win32")
        );
        assert_eq!(HostInfo::from_user_agent(EDGE_WIN, "Win32").engine_name, "Edge");
        assert_eq!(HostInfo::from_user_agent(EDGE_WIN, "Win32").engine_version, "120");
        assert_eq!(
            HostInfo::from_user_agent(SAFARI_MAC, "MacIntel"),
            HostInfo::new("Safari", "17", "MacIntel")
        );
        assert_eq!(
            HostInfo::from_user_agent(FIREFOX_LINUX, "Linux x86_64").engine_version,
            "121"
        );
        assert_eq!(
            HostInfo::from_user_agent("curl/8.0", "Linux").engine_name,
            "Unknown"
        );
    }

    #[test]
    fn report_counts_and_classifies() {
        let voices = vec![
            VoiceDescriptor::new("Samantha", "en-US"),
            VoiceDescriptor::new("Maged", "ar-SA"),
            VoiceDescriptor::new("Microsoft Hoda", "und"),
            VoiceDescriptor::new("Kyoko", "ja-JP"),
        ];
        let report = VoiceAnalysisReport::from_voices(
            &voices,
            "ar-MA",
            HostInfo::new("Chrome", "120", "Win32"),
            10,
        );

        assert_eq!(report.total_voice_count, 4);
        assert!(report.has_requested_language_support);
        let names: Vec<_> = report.matching_voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["Maged", "Microsoft Hoda"]);
        assert!(report.supported_language_tags.contains("ja-JP"));
        assert!(report.recommendations.iter().any(|r| r.contains("2 Arabic voice(s)")));
        assert!(report.recommendations.iter().any(|r| r.contains("Only 4 voice(s)")));
    }

    #[test]
    fn missing_language_gets_platform_hint() {
        let voices = vec![VoiceDescriptor::new("Samantha", "en-US")];
        let windows = VoiceAnalysisReport::from_voices(
            &voices,
            "ar-SA",
            HostInfo::new("Edge", "120", "Win32"),
            1,
        );
        assert!(!windows.has_requested_language_support);
        assert!(windows.recommendations.iter().any(|r| r == "No Arabic voice was found."));
        assert!(windows.recommendations.iter().any(|r| r.starts_with("Windows:")));
        assert!(!windows.recommendations.iter().any(|r| r.starts_with("Only")));

        let mac = VoiceAnalysisReport::from_voices(
            &voices,
            "ar-SA",
            HostInfo::new("Safari", "17", "MacIntel"),
            1,
        );
        assert!(mac.recommendations.iter().any(|r| r.starts_with("macOS:")));
        assert!(mac.recommendations.iter().any(|r| r.contains("macOS system speech")));
    }

    #[test]
    fn platform_hint_ignores_label_case() {
        let hint = |platform: &str| {
            let host = HostInfo::new("espeak-ng", "1.51", platform);
            VoiceAnalysisReport::from_voices(&[], "ar-SA", host, 10)
                .recommendations
                .into_iter()
                .find(|r| r.ends_with("Arabic."))
                .unwrap_or_default()
        };
        assert!(hint("linux").starts_with("Linux:"));
        assert!(hint("linux").contains("espeak-ng"));
        assert!(hint("macos").starts_with("macOS:"));
        assert!(hint("darwin").starts_with("macOS:"));
        assert!(hint("windows").starts_with("Windows:"));
        assert!(hint("Linux x86_64").starts_with("Linux:"));
    }

    #[test]
    fn summary_lists_matching_voices() {
        let voices = vec![VoiceDescriptor::new("Maged", "ar-SA")];
        let report =
            VoiceAnalysisReport::from_voices(&voices, "ar", HostInfo::unknown(), 10);
        let summary = report.summary();
        assert!(summary.contains("Arabic voices: 1"));
        assert!(summary.contains("1. Maged (ar-SA)"));
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_returns_immediately_when_catalog_loaded() {
        let engine = FakeEngine::with_voices(vec![VoiceDescriptor::new("Maged", "ar-SA")]);
        let inspector = VoiceCatalogInspector::new(engine, &config());

        let started = tokio::time::Instant::now();
        let report = inspector.analyze("ar-SA").await;
        assert_eq!(report.matching_voices.len(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_waits_for_late_catalog() {
        let engine = FakeEngine::with_voices(vec![]);
        engine.populate_after(
            Duration::from_millis(800),
            vec![VoiceDescriptor::new("Shakir", "ar-EG")],
        );
        let inspector = VoiceCatalogInspector::new(engine, &config());

        let started = tokio::time::Instant::now();
        let report = inspector.analyze("ar-SA").await;
        assert_eq!(report.total_voice_count, 1);
        assert!(report.has_requested_language_support);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_gives_up_after_timeout() {
        let engine = FakeEngine::with_voices(vec![]);
        let inspector = VoiceCatalogInspector::new(engine, &config());

        let started = tokio::time::Instant::now();
        let report = inspector.analyze("ar-SA").await;
        assert_eq!(report.total_voice_count, 0);
        assert!(!report.has_requested_language_support);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_on_unavailable_engine_is_empty() {
        let engine = FakeEngine::unavailable();
        let inspector = VoiceCatalogInspector::new(engine, &config());
        let report = inspector.analyze("ar-SA").await;
        assert_eq!(report.total_voice_count, 0);
        assert_eq!(report.host_info, HostInfo::unknown());
    }

    #[tokio::test(start_paused = true)]
    async fn probes_every_matching_voice() {
        let engine = FakeEngine::with_voices(vec![
            VoiceDescriptor::new("Maged", "ar-SA"),
            VoiceDescriptor::new("Samantha", "en-US"),
            VoiceDescriptor::new("Shakir", "ar-EG"),
        ]);
        engine.fail_voice("Shakir", PlatformError::new("synthesis-failed"));
        let inspector = VoiceCatalogInspector::new(engine.clone(), &config());

        let probes = inspector.probe_voices("مرحبا", "ar").await;
        assert_eq!(probes.len(), 2);
        assert!(probes[0].result.is_ok());
        assert_eq!(
            probes[1].result,
            Err(PlatformError::new("synthesis-failed"))
        );
        assert_eq!(engine.spoken().len(), 2);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::SpeechError;

/// A synthetic voice as reported by the host engine.
///
/// Voices are owned by the host; the crate only reads and filters them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    /// Display name (e.g. `"Microsoft Hoda - Arabic (Arabic )"`, `"Maged"`).
    pub name: String,
    /// BCP-47 style tag as reported by the host (e.g. `"ar-SA"`, `"ar_EG"`).
    pub language_tag: String,
    /// Whether the host marks this voice as its default.
    pub is_default: bool,
}

impl VoiceDescriptor {
    pub fn new(name: impl Into<String>, language_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language_tag: language_tag.into(),
            is_default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// The voice's primary subtag, lower-cased.
    pub fn family(&self) -> String {
        primary_subtag(&self.language_tag)
    }
}

/// One request to the host engine to vocalize `text`.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// `None` lets the host pick a voice from `language_tag`.
    pub voice: Option<VoiceDescriptor>,
    pub language_tag: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>, language_tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            language_tag: language_tag.into(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }

    /// Attach a voice. The utterance language follows the voice's tag so
    /// hosts that key on the language instead of the voice stay consistent.
    pub fn with_voice(mut self, voice: VoiceDescriptor) -> Self {
        self.language_tag = voice.language_tag.clone();
        self.voice = Some(voice);
        self
    }
}

/// How well a voice matches a requested language tag.
///
/// Ordered from best to worst so the derived `Ord` gives the selection
/// priority directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    /// Same tag after normalisation.
    Exact,
    /// Same primary subtag (`"ar"` vs `"ar-EG"`).
    PrimarySubtag,
    /// Tag does not match but the display name names the language family.
    NameKeyword,
}

/// Normalise a tag for comparison: `_` becomes `-`, ASCII lower-case.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

/// Primary subtag of a tag, lower-cased (`"ar-SA"` → `"ar"`).
pub fn primary_subtag(tag: &str) -> String {
    normalize_tag(tag)
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Check that `tag` is a syntactically valid language tag.
///
/// Accepts a 2–8 letter primary subtag followed by any number of 1–8
/// character alphanumeric subtags, separated by `-` or `_`.
pub fn validate_language_tag(tag: &str) -> Result<(), SpeechError> {
    let invalid = || SpeechError::InvalidLanguageTag(tag.to_string());
    let normalized = normalize_tag(tag);
    if normalized.is_empty() {
        return Err(invalid());
    }

    let mut subtags = normalized.split('-');
    let primary = subtags.next().ok_or_else(invalid)?;
    if !(2..=8).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }

    for subtag in subtags {
        if !(1..=8).contains(&subtag.len()) || !subtag.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(invalid());
        }
    }

    Ok(())
}

/// Display-name keywords per language family.
///
/// Some hosts label voices with a wrong or generic tag; these keywords
/// catch them by name. Entries are lower-case.
const FAMILY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "ar",
        &[
            "arab", "العربية", "maged", "tarik", "laila", "hoda", "naayf", "zariyah", "hamed",
            "salma", "mouna", "jamal",
        ],
    ),
    ("ja", &["japan", "日本語", "kyoko", "otoya", "haruka", "ayumi", "ichiro", "nanami"]),
    ("fr", &["french", "français", "francais", "thomas", "amelie", "amélie", "hortense"]),
    ("en", &["english"]),
    ("ber", &["tamazight", "berber", "amazigh"]),
];

/// Human-readable name for a language family, used in reports.
pub fn family_name(family: &str) -> &'static str {
    match family {
        "ar" => "Arabic",
        "ja" => "Japanese",
        "fr" => "French",
        "en" => "English",
        "ber" => "Tamazight",
        "es" => "Spanish",
        "de" => "German",
        _ => "requested-language",
    }
}

fn name_mentions_family(name: &str, family: &str) -> bool {
    let lower = name.to_lowercase();
    FAMILY_KEYWORDS
        .iter()
        .find(|(f, _)| *f == family)
        .map(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .unwrap_or(false)
}

/// Classify `voice` against `requested_tag`.
///
/// Returns `None` when the voice does not belong to the requested family
/// by tag or by name.
pub fn classify(voice: &VoiceDescriptor, requested_tag: &str) -> Option<MatchKind> {
    let voice_tag = normalize_tag(&voice.language_tag);
    let requested = normalize_tag(requested_tag);

    if voice_tag == requested {
        return Some(MatchKind::Exact);
    }

    let family = primary_subtag(&requested);
    if !family.is_empty() && primary_subtag(&voice_tag) == family {
        return Some(MatchKind::PrimarySubtag);
    }

    if name_mentions_family(&voice.name, &family) {
        return Some(MatchKind::NameKeyword);
    }

    None
}

/// Pick the best voice for `requested_tag`.
///
/// Priority: exact tag, then primary subtag, then the host's default flag,
/// then enumeration order. Voices that only match by name keyword rank
/// after tag matches but are still eligible.
pub fn select_voice<'a>(
    voices: &'a [VoiceDescriptor],
    requested_tag: &str,
) -> Option<&'a VoiceDescriptor> {
    let candidates: Vec<(&VoiceDescriptor, MatchKind)> = voices
        .iter()
        .filter_map(|v| classify(v, requested_tag).map(|kind| (v, kind)))
        .collect();

    let by_kind = |wanted: MatchKind| {
        candidates
            .iter()
            .find(|(_, kind)| *kind == wanted)
            .map(|(v, _)| *v)
    };

    by_kind(MatchKind::Exact)
        .or_else(|| by_kind(MatchKind::PrimarySubtag))
        .or_else(|| {
            candidates
                .iter()
                .find(|(v, _)| v.is_default)
                .map(|(v, _)| *v)
        })
        .or_else(|| candidates.first().map(|(v, _)| *v))
}

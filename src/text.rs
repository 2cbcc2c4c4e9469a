use std::borrow::Cow;

/// Unicode blocks that make up Arabic script: Arabic, Arabic Supplement,
/// Arabic Extended-A, and the two presentation-form blocks.
const ARABIC_RANGES: &[(char, char)] = &[
    ('\u{0600}', '\u{06FF}'),
    ('\u{0750}', '\u{077F}'),
    ('\u{08A0}', '\u{08FF}'),
    ('\u{FB50}', '\u{FDFF}'),
    ('\u{FE70}', '\u{FEFF}'),
];

pub fn is_arabic_char(ch: char) -> bool {
    ARABIC_RANGES
        .iter()
        .any(|&(lo, hi)| (lo..=hi).contains(&ch))
}

/// Keep only Arabic-script characters and whitespace.
///
/// Guide content often mixes a transliteration or translation into the
/// Arabic phrase (`"مرحبا (marhaba)"`); Arabic voices read the Latin part
/// badly, so it is dropped. Whitespace runs are collapsed and the result is
/// trimmed.
pub fn clean_arabic(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|&c| is_arabic_char(c) || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text to hand to an Arabic voice: the cleaned text, or the original when
/// nothing Arabic remains.
pub fn prepare_arabic(text: &str) -> Cow<'_, str> {
    let cleaned = clean_arabic(text);
    if cleaned.is_empty() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(cleaned)
    }
}

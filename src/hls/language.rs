//! `LANGUAGE="xxx"` normalisation.
//!
//! Players downstream expect two-letter codes. A small table covers the
//! codes whose first two letters differ from ISO 639-1; everything else is
//! cut to its first two characters. That cut is an approximation (`ger`
//! becomes `ge`, not `de`) and is kept as-is because consumers depend on it.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static LANGUAGE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)LANGUAGE="([a-z]{3})""#).expect("valid language regex")
});

/// Three-letter codes with explicit two-letter replacements
const LANGUAGE_OVERRIDES: &[(&str, &str)] = &[
    ("spa", "es"),
    ("por", "pt"),
    ("pol", "pl"),
    ("tur", "tr"),
    ("rus", "ru"),
    ("ita", "it"),
];

/// Map a three-letter code to the two-letter form used in rewritten playlists.
///
/// The table lookup is case-sensitive; unmapped codes keep their case.
pub fn two_letter_code(code: &str) -> &str {
    LANGUAGE_OVERRIDES
        .iter()
        .find(|(three, _)| *three == code)
        .map(|(_, two)| *two)
        .unwrap_or_else(|| &code[..2])
}

/// Rewrite the first three-letter `LANGUAGE` attribute on `line`, if any.
pub fn normalize_language(line: &str) -> Cow<'_, str> {
    LANGUAGE_ATTR.replacen(line, 1, |caps: &Captures| {
        format!("LANGUAGE=\"{}\"", two_letter_code(&caps[1]))
    })
}

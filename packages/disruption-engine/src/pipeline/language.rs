//! Heuristic language identification.
//!
//! Script counts settle non-Latin text outright. Latin-script text is
//! scored against short stopword lists. This only needs to be good enough
//! to keep obviously foreign articles away from an English prompt.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Minimum alphabetic characters before a verdict is attempted.
const MIN_LETTERS: usize = 20;

const STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "of", "to", "in", "is", "was", "for", "on", "that", "with", "by", "at",
            "from", "after", "has", "have", "are", "were", "said",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "de", "del", "y", "en", "que", "por", "para", "con", "una",
            "se", "fue", "tras", "según",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "des", "du", "et", "en", "que", "pour", "dans", "une", "est", "sur",
            "avec", "après", "selon",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "den", "dem", "ist", "mit", "von", "nach", "auf", "ein",
            "eine", "wurde", "nicht",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "as", "do", "da", "dos", "das", "e", "em", "que", "para", "com", "uma",
            "foi", "após", "segundo",
        ],
    ),
    (
        "id",
        &[
            "yang", "dan", "di", "ke", "dari", "ini", "itu", "untuk", "dengan", "pada", "tidak",
            "akan", "oleh", "setelah",
        ],
    ),
];

static STOPWORD_SETS: LazyLock<Vec<(&'static str, HashSet<&'static str>)>> = LazyLock::new(|| {
    STOPWORDS
        .iter()
        .map(|(code, words)| (*code, words.iter().copied().collect()))
        .collect()
});

fn script_of(c: char) -> Option<&'static str> {
    match c {
        '\u{4e00}'..='\u{9fff}' => Some("zh"),
        '\u{3040}'..='\u{30ff}' => Some("ja"),
        '\u{ac00}'..='\u{d7af}' => Some("ko"),
        '\u{0600}'..='\u{06ff}' => Some("ar"),
        '\u{0590}'..='\u{05ff}' => Some("he"),
        '\u{0400}'..='\u{04ff}' => Some("ru"),
        '\u{0e00}'..='\u{0e7f}' => Some("th"),
        '\u{0900}'..='\u{097f}' => Some("hi"),
        _ => None,
    }
}

/// Best-guess ISO 639-1 code, or `None` when the text is too short or
/// ambiguous to call.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let mut latin = 0usize;
    let mut other: Vec<(&'static str, usize)> = Vec::new();

    for c in text.chars().filter(|c| c.is_alphabetic()) {
        match script_of(c) {
            Some(code) => match other.iter_mut().find(|(k, _)| *k == code) {
                Some((_, n)) => *n += 1,
                None => other.push((code, 1)),
            },
            None => latin += 1,
        }
    }

    let scripted: usize = other.iter().map(|(_, n)| n).sum();
    if latin + scripted < MIN_LETTERS {
        return None;
    }

    if scripted > latin {
        // Kanji alongside kana is Japanese
        let has_kana = other.iter().any(|(k, _)| *k == "ja");
        return other
            .iter()
            .max_by_key(|(_, n)| *n)
            .map(|(k, _)| if *k == "zh" && has_kana { "ja" } else { *k });
    }

    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    let mut best: Option<(&'static str, usize)> = None;
    let mut tied = false;
    for (code, set) in STOPWORD_SETS.iter() {
        let hits = words.iter().filter(|w| set.contains(*w)).count();
        match best {
            Some((_, top)) if hits == top => tied = true,
            Some((_, top)) if hits < top => {}
            _ => {
                best = Some((*code, hits));
                tied = false;
            }
        }
    }

    match best {
        Some((code, hits)) if hits > 0 && !tied => Some(code),
        _ => None,
    }
}

/// Whether `text` can be treated as written in `target`.
///
/// Undecidable text passes.
pub fn is_language(text: &str, target: &str) -> bool {
    match detect_language(text) {
        Some(code) => code.eq_ignore_ascii_case(target),
        None => true,
    }
}

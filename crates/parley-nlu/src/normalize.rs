//! Utterance normalization applied before intent scoring.
//!
//! Lower-cases, drops filler words and expands common contractions so the
//! intent patterns only need to handle one spelling of each phrase. Entity
//! extraction works on the raw text instead, keeping spans aligned with the
//! original utterance.

use regex::Regex;
use std::sync::LazyLock;

static FILLERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:um+|uh+|erm|hmm+|you\s+know)\b,?|^\s*well\b,?")
        .expect("Invalid filler regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

const CONTRACTIONS: &[(&str, &str)] = &[
    ("what's", "what is"),
    ("how's", "how is"),
    ("where's", "where is"),
    ("when's", "when is"),
    ("who's", "who is"),
    ("that's", "that is"),
    ("it's", "it is"),
    ("there's", "there is"),
    ("can't", "cannot"),
    ("won't", "will not"),
    ("don't", "do not"),
    ("didn't", "did not"),
    ("doesn't", "does not"),
    ("isn't", "is not"),
    ("i'm", "i am"),
    ("i'd", "i would"),
    ("i'll", "i will"),
    ("let's", "let us"),
];

/// Normalize an utterance for pattern matching.
pub fn normalize(text: &str) -> String {
    let mut processed = text.trim().to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");

    processed = FILLERS.replace_all(&processed, " ").into_owned();

    for (contraction, expansion) in CONTRACTIONS {
        if processed.contains(contraction) {
            processed = processed.replace(contraction, expansion);
        }
    }

    WHITESPACE.replace_all(processed.trim(), " ").into_owned()
}

/// Number of word tokens, ignoring bare punctuation.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .count()
}

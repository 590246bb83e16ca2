//! Open-domain entity backends.
//!
//! The deterministic matchers only cover closed vocabularies. Places and
//! people come from an [`OpenDomainBackend`], which may be slow or fail; the
//! extractor wraps every call in a timeout and carries on without it.

use async_trait::async_trait;
use parley_core::{Entity, EntitySource, EntityType, EntityValue, Result, Span};
use regex::Regex;
use std::sync::LazyLock;

/// A pluggable general-purpose entity recognizer.
#[async_trait]
pub trait OpenDomainBackend: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Extract place names, people and other open-class entities.
    async fn extract_open_domain(&self, text: &str) -> Result<Vec<Entity>>;
}

// =============================================================================
// Proper-noun heuristic backend
// =============================================================================

const CITIES: &[&str] = &[
    "Seattle",
    "New York",
    "Los Angeles",
    "San Francisco",
    "Chicago",
    "Boston",
    "Austin",
    "Denver",
    "Miami",
    "Atlanta",
    "Portland",
    "Dallas",
    "Houston",
    "Phoenix",
    "Toronto",
    "Vancouver",
    "Mexico City",
    "London",
    "Paris",
    "Berlin",
    "Madrid",
    "Barcelona",
    "Rome",
    "Lisbon",
    "Dublin",
    "Amsterdam",
    "Moscow",
    "Cairo",
    "Nairobi",
    "Dubai",
    "Mumbai",
    "Delhi",
    "Bangkok",
    "Singapore",
    "Hong Kong",
    "Beijing",
    "Shanghai",
    "Seoul",
    "Tokyo",
    "Sydney",
];

/// Capitalized words that start sentences or name days, never places.
const COMMON_WORDS: &[&str] = &[
    "The", "This", "That", "These", "Those", "There", "Here", "What", "When", "Where", "Which",
    "Who", "How", "Why", "Is", "Are", "Will", "Can", "Could", "Would", "Should", "Do", "Does",
    "Please", "Play", "Open", "Set", "Search", "Tell", "Show", "Find", "Send", "Check", "And",
    "Also", "Yes", "No", "Ok", "Okay", "Hi", "Hello", "Hey", "Thanks", "Thank", "I", "It", "My",
    "Me", "Today", "Tonight", "Tomorrow", "Now", "Monday", "Tuesday", "Wednesday", "Thursday",
    "Friday", "Saturday", "Sunday", "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

static CITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<String> = CITIES
        .iter()
        .map(|c| c.split_whitespace().collect::<Vec<_>>().join(r"\s+"))
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", names.join("|"))).expect("Invalid city regex")
});

static PLACE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[Ii]n|[Aa]t|[Ff]or|[Nn]ear)\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+){0,2})")
        .expect("Invalid place phrase regex")
});

static ADDRESSEE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(?:to|email|message|text|call))\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)",
    )
    .expect("Invalid addressee regex")
});

static FULL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]+\s+[A-Z][a-z]+)\b").expect("Invalid full name regex")
});

static BARE_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+){0,2})\s*[.!?]?\s*$")
        .expect("Invalid bare reply regex")
});

fn is_common_word(word: &str) -> bool {
    COMMON_WORDS.contains(&word)
}

fn has_common_word(phrase: &str) -> bool {
    phrase.split_whitespace().any(is_common_word)
}

/// Whether every word of `phrase` is a common word in any case, so the
/// phrase cannot be a name or a place.
pub fn only_common_words(phrase: &str) -> bool {
    let mut words = phrase
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .peekable();
    words.peek().is_some() && words.all(|w| COMMON_WORDS.iter().any(|c| c.eq_ignore_ascii_case(w)))
}

fn canonical_city(matched: &str) -> String {
    let squashed = matched.split_whitespace().collect::<Vec<_>>().join(" ");
    CITIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(&squashed))
        .map(|c| c.to_string())
        .unwrap_or(squashed)
}

fn open_entity(entity_type: EntityType, value: &str, confidence: f32, start: usize, end: usize) -> Entity {
    Entity::new(
        entity_type,
        EntityValue::text(value),
        confidence,
        Some(Span::new(start, end)),
        EntitySource::OpenDomain,
    )
}

/// Default backend: a gazetteer of major cities plus capitalization
/// heuristics for places and people.
///
/// Confidences: gazetteer city 0.85, capitalized place after a preposition
/// 0.7, addressee after `to`/`email`/`call` 0.65, `First Last` name 0.6, bare
/// capitalized reply 0.6.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProperNounBackend;

impl ProperNounBackend {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of the heuristic.
    pub fn recognize(&self, text: &str) -> Vec<Entity> {
        let mut out: Vec<Entity> = Vec::new();
        let claimed = |out: &[Entity], start: usize, end: usize| {
            let span = Span::new(start, end);
            out.iter().any(|e| e.span.is_some_and(|s| s.overlaps(&span)))
        };

        for m in CITY_REGEX.find_iter(text) {
            out.push(open_entity(
                EntityType::Location,
                &canonical_city(m.as_str()),
                0.85,
                m.start(),
                m.end(),
            ));
        }

        for caps in PLACE_PHRASE.captures_iter(text) {
            let Some(place) = caps.get(1) else { continue };
            if has_common_word(place.as_str()) || claimed(&out, place.start(), place.end()) {
                continue;
            }
            out.push(open_entity(EntityType::Location, place.as_str(), 0.7, place.start(), place.end()));
        }

        for caps in ADDRESSEE.captures_iter(text) {
            let Some(name) = caps.get(1) else { continue };
            if has_common_word(name.as_str()) || claimed(&out, name.start(), name.end()) {
                continue;
            }
            out.push(open_entity(EntityType::Person, name.as_str(), 0.65, name.start(), name.end()));
        }

        for caps in FULL_NAME.captures_iter(text) {
            let Some(name) = caps.get(1) else { continue };
            if has_common_word(name.as_str()) || claimed(&out, name.start(), name.end()) {
                continue;
            }
            out.push(open_entity(EntityType::Person, name.as_str(), 0.6, name.start(), name.end()));
        }

        if out.is_empty() {
            if let Some(place) = BARE_REPLY.captures(text).and_then(|c| c.get(1)) {
                if !has_common_word(place.as_str()) {
                    out.push(open_entity(
                        EntityType::Location,
                        place.as_str(),
                        0.6,
                        place.start(),
                        place.end(),
                    ));
                }
            }
        }

        out
    }
}

#[async_trait]
impl OpenDomainBackend for ProperNounBackend {
    fn name(&self) -> &str {
        "proper-noun"
    }

    async fn extract_open_domain(&self, text: &str) -> Result<Vec<Entity>> {
        Ok(self.recognize(text))
    }
}

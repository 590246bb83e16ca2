//! Deterministic high-precision entity matchers.
//!
//! Every matcher runs on the raw utterance so spans index into the text the
//! user actually typed. Values are normalized (lower-cased time words,
//! canonical genre names, `15 + 27` style expressions).

use parley_core::{Entity, EntitySource, EntityType, EntityValue, Span};
use regex::{Captures, Regex};
use std::sync::LazyLock;

// =============================================================================
// Number words
// =============================================================================

const UNITS: &[(&str, u32)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
];

const TENS: &[(&str, u32)] = &[
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
    ("sixty", 60),
    ("seventy", 70),
    ("eighty", 80),
    ("ninety", 90),
];

/// Spoken number: a tens word with optional unit, or a units/teens word.
const NUMBER_WORD: &str = r"(?:twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety)(?:[\s-](?:one|two|three|four|five|six|seven|eight|nine))?|zero|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen";

/// Parse a spoken number such as `twenty seven` or `twenty-seven`.
pub fn parse_number_words(words: &str) -> Option<f64> {
    let lower = words.to_lowercase();
    let mut total = 0u32;
    let mut seen = false;
    for part in lower.split(|c: char| c.is_whitespace() || c == '-') {
        if part.is_empty() {
            continue;
        }
        let value = TENS
            .iter()
            .chain(UNITS.iter())
            .find(|(w, _)| *w == part)
            .map(|(_, v)| *v)?;
        total += value;
        seen = true;
    }
    seen.then_some(total as f64)
}

/// Parse either digits or number words.
fn parse_number(token: &str) -> Option<f64> {
    token
        .trim()
        .parse::<f64>()
        .ok()
        .or_else(|| parse_number_words(token))
}

// =============================================================================
// Compiled regex sets (compiled once, reused across calls)
// =============================================================================

static DIGIT_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(?:\.\d+)?\b").expect("Invalid number regex")
});

static WORD_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", NUMBER_WORD)).expect("Invalid number word regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d+(?:\.\d+)?|an?|{})\s+(seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?)\b",
        NUMBER_WORD
    ))
    .expect("Invalid duration regex")
});

static HALF_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bhalf\s+an?\s+hour\b").expect("Invalid half-hour regex")
});

static RELATIVE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(today|tonight|tomorrow|yesterday|right\s+now|now)\b")
        .expect("Invalid relative day regex")
});

static ANCHORED_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(this|next|last)\s+(morning|afternoon|evening|week|weekend|month|year|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
    )
    .expect("Invalid anchored period regex")
});

static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("Invalid weekday regex")
});

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\.?(?:\W|$)|\b(\d{1,2}):(\d{2})\b")
        .expect("Invalid clock time regex")
});

static DAY_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(morning|afternoon|evening|night|noon|midnight)\b")
        .expect("Invalid day part regex")
});

static GENRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jazz|rock|pop|classical|hip[\s-]?hop|rap|country|blues|electronic|edm|reggae|metal|folk|r&b|rnb|soul|indie|lo[\s-]?fi|ambient|disco|punk|techno|funk|gospel|opera)\b",
    )
    .expect("Invalid genre regex")
});

static DIGIT_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*([-+*/x×÷])\s*(\d+(?:\.\d+)?)")
        .expect("Invalid expression regex")
});

static SPOKEN_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    let operand = format!(r"(\d+(?:\.\d+)?|{})", NUMBER_WORD);
    Regex::new(&format!(
        r"(?i)\b{}\s+(plus|minus|times|multiplied\s+by|divided\s+by|over)\s+{}\b",
        operand, operand
    ))
    .expect("Invalid spoken expression regex")
});

static PLAY_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bplay\s+(.+?)[\s.!?]*$").expect("Invalid play query regex")
});

static SEARCH_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:search\s+(?:the\s+web\s+|online\s+)?for|search|google|look\s+up)\s+(.+?)[\s.!?]*$",
    )
    .expect("Invalid search query regex")
});

static TOPIC_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:tell\s+me\s+about|who(?:'s|\s+is|\s+was)|information\s+(?:about|on)|facts\s+about|wiki(?:pedia)?\s+(?:for|on|about))\s+(.+?)[\s.!?]*$",
    )
    .expect("Invalid topic query regex")
});

static NEWS_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bnews\s+(?:about|on|regarding)\s+(.+?)[\s.!?]*$")
        .expect("Invalid news query regex")
});

static OPEN_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bopen\s+(?:up\s+)?(.+?)[\s.!?]*$").expect("Invalid open query regex")
});

// =============================================================================
// Matchers
// =============================================================================

fn pattern_entity(entity_type: EntityType, value: EntityValue, confidence: f32, span: Span) -> Entity {
    Entity::new(entity_type, value, confidence, Some(span), EntitySource::Pattern)
}

fn group_span(caps: &Captures<'_>, index: usize) -> Option<(Span, String)> {
    caps.get(index)
        .map(|m| (Span::new(m.start(), m.end()), m.as_str().to_string()))
}

/// Numbers written as digits (0.9) or words (0.8).
///
/// A bare `one` is skipped; it is almost always a pronoun ("that one").
pub fn numbers(text: &str) -> Vec<Entity> {
    let mut out = Vec::new();
    for m in DIGIT_NUMBER.find_iter(text) {
        if let Ok(n) = m.as_str().parse::<f64>() {
            out.push(pattern_entity(
                EntityType::Number,
                EntityValue::Number(n),
                0.9,
                Span::new(m.start(), m.end()),
            ));
        }
    }
    for m in WORD_NUMBER.find_iter(text) {
        if m.as_str().eq_ignore_ascii_case("one") {
            continue;
        }
        if let Some(n) = parse_number_words(m.as_str()) {
            out.push(pattern_entity(
                EntityType::Number,
                EntityValue::Number(n),
                0.8,
                Span::new(m.start(), m.end()),
            ));
        }
    }
    out
}

fn canonical_unit(unit: &str) -> &'static str {
    let lower = unit.to_lowercase();
    match lower.as_str() {
        u if u.starts_with("sec") => "second",
        u if u.starts_with("min") => "minute",
        u if u.starts_with("h") => "hour",
        u if u.starts_with("day") => "day",
        _ => "week",
    }
}

/// Durations such as `15 minutes`, `an hour` or `half an hour`.
pub fn durations(text: &str) -> Vec<Entity> {
    let mut out = Vec::new();
    for m in HALF_HOUR.find_iter(text) {
        out.push(pattern_entity(
            EntityType::Duration,
            EntityValue::text("30 minutes"),
            0.95,
            Span::new(m.start(), m.end()),
        ));
    }
    for caps in DURATION.captures_iter(text) {
        let (Some(whole), Some(count), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let count_text = count.as_str().to_lowercase();
        let amount = match count_text.as_str() {
            "a" | "an" => Some(1.0),
            other => parse_number(other),
        };
        let Some(amount) = amount else { continue };
        let span = Span::new(whole.start(), whole.end());
        if out.iter().any(|e: &Entity| e.span.is_some_and(|s| s.overlaps(&span))) {
            continue;
        }
        let unit = canonical_unit(unit.as_str());
        let value = if amount == 1.0 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", EntityValue::Number(amount), unit)
        };
        out.push(pattern_entity(EntityType::Duration, EntityValue::Text(value), 0.95, span));
    }
    out
}

fn clock_value(caps: &Captures<'_>) -> Option<String> {
    if let Some(hour) = caps.get(1) {
        let meridiem = caps.get(3)?.as_str().to_lowercase();
        return Some(match caps.get(2) {
            Some(min) => format!("{}:{}{}m", hour.as_str(), min.as_str(), meridiem),
            None => format!("{}{}m", hour.as_str(), meridiem),
        });
    }
    let hour: u32 = caps.get(4)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(5)?.as_str().parse().ok()?;
    (hour < 24 && minute < 60).then(|| format!("{:02}:{:02}", hour, minute))
}

/// Explicit time phrases: relative days, anchored periods, weekdays, clock
/// times (0.95) and bare parts of the day (0.8).
pub fn datetimes(text: &str) -> Vec<Entity> {
    let mut out = Vec::new();
    for caps in RELATIVE_DAY.captures_iter(text) {
        if let Some((span, raw)) = group_span(&caps, 1) {
            let lower = raw.to_lowercase();
            let value = if lower.starts_with("right") { "now".to_string() } else { lower };
            out.push(pattern_entity(EntityType::Datetime, EntityValue::Text(value), 0.95, span));
        }
    }
    for m in ANCHORED_PERIOD.find_iter(text) {
        let value = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        out.push(pattern_entity(
            EntityType::Datetime,
            EntityValue::Text(value),
            0.95,
            Span::new(m.start(), m.end()),
        ));
    }
    for m in WEEKDAY.find_iter(text) {
        out.push(pattern_entity(
            EntityType::Datetime,
            EntityValue::text(m.as_str().to_lowercase()),
            0.9,
            Span::new(m.start(), m.end()),
        ));
    }
    for caps in CLOCK_TIME.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(value) = clock_value(&caps) {
            let matched = whole.as_str().trim_end_matches(|c: char| !c.is_alphanumeric());
            out.push(pattern_entity(
                EntityType::Datetime,
                EntityValue::Text(value),
                0.95,
                Span::new(whole.start(), whole.start() + matched.len()),
            ));
        }
    }
    for m in DAY_PART.find_iter(text) {
        out.push(pattern_entity(
            EntityType::Datetime,
            EntityValue::text(m.as_str().to_lowercase()),
            0.8,
            Span::new(m.start(), m.end()),
        ));
    }
    out
}

/// Canonical genre name for a matched spelling.
pub fn canonical_genre(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let squashed: String = lower.chars().filter(|c| c.is_alphanumeric() || *c == '&').collect();
    match squashed.as_str() {
        "hiphop" => "hip hop".to_string(),
        "lofi" => "lo-fi".to_string(),
        "rnb" | "r&b" => "r&b".to_string(),
        _ => lower,
    }
}

/// Whether a phrase is exactly one of the recognised genres.
pub fn is_genre(phrase: &str) -> bool {
    GENRE
        .find(phrase.trim())
        .is_some_and(|m| m.start() == 0 && m.end() == phrase.trim().len())
}

/// Music genres from a closed list.
pub fn genres(text: &str) -> Vec<Entity> {
    GENRE
        .find_iter(text)
        .map(|m| {
            pattern_entity(
                EntityType::Genre,
                EntityValue::Text(canonical_genre(m.as_str())),
                0.95,
                Span::new(m.start(), m.end()),
            )
        })
        .collect()
}

fn operator_symbol(op: &str) -> &'static str {
    let lower = op.to_lowercase();
    match lower.split_whitespace().next().unwrap_or("") {
        "+" | "plus" => "+",
        "-" | "minus" => "-",
        "/" | "÷" | "divided" | "over" => "/",
        _ => "*",
    }
}

fn expression_entity(caps: &Captures<'_>) -> Option<Entity> {
    let whole = caps.get(0)?;
    let lhs = parse_number(caps.get(1)?.as_str())?;
    let op = operator_symbol(caps.get(2)?.as_str());
    let rhs = parse_number(caps.get(3)?.as_str())?;
    let value = format!("{} {} {}", EntityValue::Number(lhs), op, EntityValue::Number(rhs));
    Some(pattern_entity(
        EntityType::Expression,
        EntityValue::Text(value),
        0.9,
        Span::new(whole.start(), whole.end()),
    ))
}

/// Binary arithmetic, digit (`15+27`) or spoken (`fifteen plus twenty seven`).
pub fn expressions(text: &str) -> Vec<Entity> {
    DIGIT_EXPRESSION
        .captures_iter(text)
        .chain(SPOKEN_EXPRESSION.captures_iter(text))
        .filter_map(|caps| expression_entity(&caps))
        .collect()
}

const PLAY_SKIP_PREFIXES: &[&str] = &[
    "something", "anything", "another", "more", "different", "next", "previous", "it", "that",
    "music", "songs", "the news", "news",
];

const PLAY_FILLERS: &[&str] = &["some", "me", "the", "a", "an", "my"];

const PLAY_SUFFIXES: &[&str] = &[" music", " songs", " song", " tracks"];

/// Strip leading fillers and trailing "music" from a `play ...` capture,
/// returning the byte offsets of the remaining title inside `raw`.
fn trim_play_target(raw: &str) -> Option<(usize, usize)> {
    let mut start = 0;
    loop {
        let rest = &raw[start..];
        let word_len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let word = &rest[..word_len];
        if word_len < rest.len() && PLAY_FILLERS.iter().any(|f| word.eq_ignore_ascii_case(f)) {
            start += word_len;
            start += raw[start..].len() - raw[start..].trim_start().len();
        } else {
            break;
        }
    }
    let mut end = raw.len();
    for suffix in PLAY_SUFFIXES {
        let candidate = &raw[start..end];
        let tail = candidate
            .len()
            .checked_sub(suffix.len())
            .filter(|at| *at > 0)
            .and_then(|at| candidate.get(at..));
        if tail.is_some_and(|t| t.eq_ignore_ascii_case(suffix)) {
            end -= suffix.len();
        }
    }
    (start < end).then_some((start, end))
}

fn query_entity(caps: &Captures<'_>, confidence: f32) -> Option<Entity> {
    let (span, value) = group_span(caps, 1)?;
    let value = value.trim().to_string();
    (!value.is_empty())
        .then(|| pattern_entity(EntityType::Query, EntityValue::Text(value), confidence, span))
}

/// Free-text targets: `play X` (0.7), `search for X` (0.8),
/// `tell me about X` (0.75), `news about X` (0.75), `open X` (0.75).
pub fn queries(text: &str) -> Vec<Entity> {
    let mut out = Vec::new();

    if let Some(target) = PLAY_QUERY.captures(text).and_then(|c| c.get(1)) {
        if let Some((s, e)) = trim_play_target(target.as_str()) {
            let title = &target.as_str()[s..e];
            let lower = title.to_lowercase();
            let skipped = PLAY_SKIP_PREFIXES
                .iter()
                .any(|p| lower == *p || lower.starts_with(&format!("{} ", p)));
            if !skipped && !is_genre(title) {
                out.push(pattern_entity(
                    EntityType::Query,
                    EntityValue::text(title),
                    0.7,
                    Span::new(target.start() + s, target.start() + e),
                ));
            }
        }
    }

    let scored: [(&LazyLock<Regex>, f32); 4] = [
        (&SEARCH_QUERY, 0.8),
        (&TOPIC_QUERY, 0.75),
        (&NEWS_QUERY, 0.75),
        (&OPEN_QUERY, 0.75),
    ];
    for (regex, confidence) in scored {
        if let Some(entity) = regex.captures(text).and_then(|c| query_entity(&c, confidence)) {
            out.push(entity);
        }
    }
    out
}

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// A recognised category of user request.
///
/// Variant order is the catalog's declaration order and doubles as the
/// classifier's tie-break: on equal scores the earlier variant ranks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Weather,
    Music,
    Time,
    Calendar,
    Timer,
    Calculator,
    System,
    Web,
    Email,
    News,
    Wikipedia,
    Joke,
    Greeting,
    Goodbye,
    Help,
}

impl Intent {
    /// Every intent, in declaration order.
    pub const ALL: [Intent; 15] = [
        Intent::Weather,
        Intent::Music,
        Intent::Time,
        Intent::Calendar,
        Intent::Timer,
        Intent::Calculator,
        Intent::System,
        Intent::Web,
        Intent::Email,
        Intent::News,
        Intent::Wikipedia,
        Intent::Joke,
        Intent::Greeting,
        Intent::Goodbye,
        Intent::Help,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Weather => "weather",
            Intent::Music => "music",
            Intent::Time => "time",
            Intent::Calendar => "calendar",
            Intent::Timer => "timer",
            Intent::Calculator => "calculator",
            Intent::System => "system",
            Intent::Web => "web",
            Intent::Email => "email",
            Intent::News => "news",
            Intent::Wikipedia => "wikipedia",
            Intent::Joke => "joke",
            Intent::Greeting => "greeting",
            Intent::Goodbye => "goodbye",
            Intent::Help => "help",
        }
    }

    /// Position in declaration order.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("Unknown intent: {}", s))
    }
}

/// Kinds of typed fragments the extractor can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Location,
    Datetime,
    Duration,
    Number,
    Genre,
    Person,
    Query,
    Expression,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::Location,
        EntityType::Datetime,
        EntityType::Duration,
        EntityType::Number,
        EntityType::Genre,
        EntityType::Person,
        EntityType::Query,
        EntityType::Expression,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Location => "location",
            EntityType::Datetime => "datetime",
            EntityType::Duration => "duration",
            EntityType::Number => "number",
            EntityType::Genre => "genre",
            EntityType::Person => "person",
            EntityType::Query => "query",
            EntityType::Expression => "expression",
        }
    }

    /// Name of the command parameter this entity type fills.
    pub fn param_name(self) -> &'static str {
        match self {
            EntityType::Datetime => "time",
            other => other.as_str(),
        }
    }

    /// Whether a free-text reply can stand in for this type.
    pub fn is_free_text(self) -> bool {
        matches!(
            self,
            EntityType::Location | EntityType::Person | EntityType::Query | EntityType::Genre
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}

/// Where an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    /// Deterministic high-precision matcher.
    Pattern,
    /// Pluggable open-domain backend.
    OpenDomain,
    /// Substituted from session memory.
    Memory,
}

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in seconds since epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Seconds elapsed from `self` until `later`. Negative if `later` is
    /// earlier. Saturates at the `i64` bounds.
    pub fn seconds_until(&self, later: Timestamp) -> i64 {
        later.0.saturating_sub(self.0)
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Normalized entity value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Number(f64),
    Text(String),
}

impl EntityValue {
    pub fn text(value: impl Into<String>) -> Self {
        EntityValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            EntityValue::Text(s) => Some(s),
            EntityValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            EntityValue::Number(n) => Some(*n),
            EntityValue::Text(_) => None,
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            EntityValue::Number(n) => write!(f, "{}", n),
            EntityValue::Text(s) => f.write_str(s),
        }
    }
}

/// Byte range of an entity inside the original utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A typed fragment of information extracted from an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub value: EntityValue,
    /// Always within [0, 1].
    pub confidence: f32,
    /// `None` for entities substituted from memory.
    pub span: Option<Span>,
    pub source: EntitySource,
}

impl Entity {
    /// Build an entity, clamping `confidence` into [0, 1].
    pub fn new(
        entity_type: EntityType,
        value: EntityValue,
        confidence: f32,
        span: Option<Span>,
        source: EntitySource,
    ) -> Self {
        Self {
            entity_type,
            value,
            confidence: clamp_unit(confidence),
            span,
            source,
        }
    }

    /// Whether this entity was stated in the current utterance.
    pub fn is_explicit(&self) -> bool {
        self.source != EntitySource::Memory
    }

    fn collides_with(&self, other: &Entity) -> bool {
        match (&self.span, &other.span) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => self.value == other.value,
        }
    }
}

/// Entities grouped by type, each list ordered by descending confidence.
///
/// Overlapping spans of the same type are collapsed on insert, keeping the
/// more confident candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityMap(BTreeMap<EntityType, Vec<Entity>>);

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) {
        let list = self.0.entry(entity.entity_type).or_default();
        if let Some(pos) = list.iter().position(|e| e.collides_with(&entity)) {
            if entity.confidence > list[pos].confidence {
                list.remove(pos);
            } else {
                return;
            }
        }
        list.push(entity);
        list.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    }

    pub fn get(&self, entity_type: EntityType) -> &[Entity] {
        self.0.get(&entity_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The most confident entity of a type.
    pub fn best(&self, entity_type: EntityType) -> Option<&Entity> {
        self.get(entity_type).first()
    }

    pub fn contains(&self, entity_type: EntityType) -> bool {
        !self.get(entity_type).is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.0
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(t, _)| *t)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.0.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert every entity of `other`, respecting the overlap rule.
    pub fn merge(&mut self, other: &EntityMap) {
        for entity in other.iter() {
            self.insert(entity.clone());
        }
    }
}

impl Extend<Entity> for EntityMap {
    fn extend<I: IntoIterator<Item = Entity>>(&mut self, iter: I) {
        for entity in iter {
            self.insert(entity);
        }
    }
}

impl FromIterator<Entity> for EntityMap {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut map = EntityMap::new();
        map.extend(iter);
        map
    }
}

// =============================================================================
// Turn data
// =============================================================================

/// One user-issued input within a session. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub session_id: Uuid,
    pub text: String,
}

impl Utterance {
    pub fn new(session_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A scored intent hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub intent: Intent,
    pub confidence: f32,
}

impl IntentCandidate {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self {
            intent,
            confidence: clamp_unit(confidence),
        }
    }
}

/// Output of extraction plus classification for a single turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Candidates, non-increasing by confidence.
    pub intents: Vec<IntentCandidate>,
    pub entities: EntityMap,
    /// Aggregate confidence in [0, 1].
    pub confidence: f32,
}

impl AnalysisResult {
    pub fn top(&self) -> Option<&IntentCandidate> {
        self.intents.first()
    }

    pub fn runner_up(&self) -> Option<&IntentCandidate> {
        self.intents.get(1)
    }

    /// Score gap between the top two candidates, `None` with fewer than two.
    pub fn margin(&self) -> Option<f32> {
        match (self.top(), self.runner_up()) {
            (Some(a), Some(b)) => Some(a.confidence - b.confidence),
            _ => None,
        }
    }
}

/// A turn that was resolved and committed to the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub utterance: String,
    pub intent: Option<Intent>,
    /// Entities that fed the resolved command's parameters.
    pub entities: Vec<Entity>,
    pub timestamp: Timestamp,
}

/// The structured command handed to the action layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCommand {
    /// `None` when nothing could be classified.
    pub intent: Option<Intent>,
    /// Intent-specific verb such as `play` or `forecast`.
    pub action: Option<String>,
    pub parameters: BTreeMap<String, EntityValue>,
    pub clarification_needed: bool,
    pub clarification_prompt: Option<String>,
    /// Competing candidates when the turn was ambiguous or unclassified.
    pub candidates: Vec<IntentCandidate>,
    pub confidence: f32,
}

impl ResolvedCommand {
    /// A command that asks the user for clarification.
    pub fn clarification(
        intent: Option<Intent>,
        prompt: impl Into<String>,
        candidates: Vec<IntentCandidate>,
        confidence: f32,
    ) -> Self {
        Self {
            intent,
            action: None,
            parameters: BTreeMap::new(),
            clarification_needed: true,
            clarification_prompt: Some(prompt.into()),
            candidates,
            confidence: clamp_unit(confidence),
        }
    }

    /// Nothing to act on: the user withdrew a pending request.
    pub fn dismissed() -> Self {
        Self {
            intent: None,
            action: None,
            parameters: BTreeMap::new(),
            clarification_needed: false,
            clarification_prompt: None,
            candidates: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn param(&self, name: &str) -> Option<&EntityValue> {
        self.parameters.get(name)
    }

    pub fn param_text(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(EntityValue::as_text)
    }
}

/// Clamp a score into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(t: EntityType, v: &str, conf: f32, start: usize, end: usize) -> Entity {
        Entity::new(
            t,
            EntityValue::text(v),
            conf,
            Some(Span::new(start, end)),
            EntitySource::Pattern,
        )
    }

    #[test]
    fn test_intent_round_trip_names() {
        for intent in Intent::ALL {
            let parsed: Intent = intent.as_str().parse().unwrap();
            assert_eq!(parsed, intent);
        }
        assert!("dance".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_index_matches_declaration_order() {
        for (i, intent) in Intent::ALL.iter().enumerate() {
            assert_eq!(intent.index(), i);
        }
    }

    #[test]
    fn test_datetime_param_name_is_time() {
        assert_eq!(EntityType::Datetime.param_name(), "time");
        assert_eq!(EntityType::Location.param_name(), "location");
    }

    #[test]
    fn test_entity_confidence_clamped() {
        let e = Entity::new(
            EntityType::Number,
            EntityValue::Number(3.0),
            1.7,
            None,
            EntitySource::Pattern,
        );
        assert_eq!(e.confidence, 1.0);
        let e = Entity::new(
            EntityType::Number,
            EntityValue::Number(3.0),
            f32::NAN,
            None,
            EntitySource::Pattern,
        );
        assert_eq!(e.confidence, 0.0);
    }

    #[test]
    fn test_entity_map_sorted_by_confidence() {
        let mut map = EntityMap::new();
        map.insert(pattern(EntityType::Datetime, "morning", 0.8, 0, 7));
        map.insert(pattern(EntityType::Datetime, "tomorrow", 0.95, 10, 18));
        let list = map.get(EntityType::Datetime);
        assert_eq!(list.len(), 2);
        assert!(list[0].confidence >= list[1].confidence);
        assert_eq!(map.best(EntityType::Datetime).unwrap().value.as_text(), Some("tomorrow"));
    }

    #[test]
    fn test_entity_map_overlap_keeps_higher_confidence() {
        let mut map = EntityMap::new();
        map.insert(pattern(EntityType::Datetime, "morning", 0.8, 5, 12));
        map.insert(pattern(EntityType::Datetime, "this morning", 0.95, 0, 12));
        assert_eq!(map.get(EntityType::Datetime).len(), 1);
        assert_eq!(
            map.best(EntityType::Datetime).unwrap().value.as_text(),
            Some("this morning")
        );

        // Lower-confidence overlap is dropped
        map.insert(pattern(EntityType::Datetime, "morning", 0.5, 5, 12));
        assert_eq!(map.get(EntityType::Datetime).len(), 1);
    }

    #[test]
    fn test_entity_map_overlap_only_within_type() {
        let mut map = EntityMap::new();
        map.insert(pattern(EntityType::Duration, "15 minutes", 0.95, 0, 10));
        map.insert(Entity::new(
            EntityType::Number,
            EntityValue::Number(15.0),
            0.9,
            Some(Span::new(0, 2)),
            EntitySource::Pattern,
        ));
        assert_eq!(map.len(), 2);
        assert!(map.contains(EntityType::Duration));
        assert!(map.contains(EntityType::Number));
    }

    #[test]
    fn test_entity_value_display() {
        assert_eq!(EntityValue::Number(15.0).to_string(), "15");
        assert_eq!(EntityValue::Number(2.5).to_string(), "2.5");
        assert_eq!(EntityValue::text("jazz").to_string(), "jazz");
    }

    #[test]
    fn test_entity_value_untagged_json() {
        let json = serde_json::to_string(&EntityValue::text("Seattle")).unwrap();
        assert_eq!(json, "\"Seattle\"");
        let json = serde_json::to_string(&EntityValue::Number(4.0)).unwrap();
        assert_eq!(json, "4.0");
    }

    #[test]
    fn test_entity_map_json_keys_are_type_names() {
        let mut map = EntityMap::new();
        map.insert(pattern(EntityType::Genre, "jazz", 0.95, 0, 4));
        let json = serde_json::to_value(&map).unwrap();
        assert!(json.get("genre").is_some());
        let back: EntityMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_analysis_margin() {
        let analysis = AnalysisResult {
            intents: vec![
                IntentCandidate::new(Intent::Music, 0.55),
                IntentCandidate::new(Intent::News, 0.45),
            ],
            entities: EntityMap::new(),
            confidence: 0.5,
        };
        let margin = analysis.margin().unwrap();
        assert!((margin - 0.10).abs() < 1e-5);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp(1_000);
        assert_eq!(t.plus_secs(300), Timestamp(1_300));
        assert_eq!(t.seconds_until(Timestamp(1_250)), 250);
    }

    #[test]
    fn test_timestamp_arithmetic_saturates() {
        assert_eq!(Timestamp(i64::MIN).seconds_until(Timestamp(1_000)), i64::MAX);
        assert_eq!(Timestamp(1_000).seconds_until(Timestamp(i64::MIN)), i64::MIN);
        assert_eq!(Timestamp(i64::MAX).plus_secs(60), Timestamp(i64::MAX));
    }

    #[test]
    fn test_utterance_blank() {
        let u = Utterance::new(Uuid::new_v4(), "   ");
        assert!(u.is_blank());
    }
}

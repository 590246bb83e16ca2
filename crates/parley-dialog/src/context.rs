//! Per-session conversation memory.
//!
//! Holds a bounded turn history, context variables (`last_location`,
//! `last_intent_family`, ...), a single most-recent value per entity type,
//! and the pending clarification, if any. Committed memory only changes
//! through [`ConversationContext::commit`], which the resolver calls once a
//! turn is fully resolved.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parley_core::config::ContextConfig;
use parley_core::{ConversationTurn, Entity, EntityType, EntityValue, Intent, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::clarification::PendingClarification;

/// Name of the context variable holding the last resolved intent.
pub const LAST_INTENT_FAMILY: &str = "last_intent_family";

/// Context variable name for a parameter, e.g. `last_location`.
pub fn variable_name(param: &str) -> String {
    format!("last_{}", param)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextVariable {
    pub value: EntityValue,
    pub set_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub value: EntityValue,
    pub last_mentioned_at: Timestamp,
}

/// Everything a resolved turn writes to the context, applied in one step.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    pub turn: ConversationTurn,
    /// Overwrites these variables; others are left as they were.
    pub variables: BTreeMap<String, EntityValue>,
    /// Entities stated explicitly in the turn.
    pub remembered: Vec<Entity>,
}

// =============================================================================
// ConversationContext
// =============================================================================

/// Session-scoped conversational state.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    session_id: Uuid,
    history: VecDeque<ConversationTurn>,
    variables: BTreeMap<String, ContextVariable>,
    memory: BTreeMap<EntityType, MemoryEntry>,
    pending: Option<PendingClarification>,
    started_at: Timestamp,
    last_activity: Timestamp,
    history_len: usize,
    recency_window_secs: u64,
}

impl ConversationContext {
    pub fn new(session_id: Uuid, config: &ContextConfig, now: Timestamp) -> Self {
        Self {
            session_id,
            history: VecDeque::with_capacity(config.history_len),
            variables: BTreeMap::new(),
            memory: BTreeMap::new(),
            pending: None,
            started_at: now,
            last_activity: now,
            history_len: config.history_len.max(1),
            recency_window_secs: config.recency_window_secs,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn last_activity(&self) -> Timestamp {
        self.last_activity
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }

    pub fn recency_window_secs(&self) -> u64 {
        self.recency_window_secs
    }

    /// Turns, oldest first.
    pub fn history(&self) -> &VecDeque<ConversationTurn> {
        &self.history
    }

    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.history.back()
    }

    pub fn variables(&self) -> &BTreeMap<String, ContextVariable> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&ContextVariable> {
        self.variables.get(name)
    }

    pub fn memory(&self) -> &BTreeMap<EntityType, MemoryEntry> {
        &self.memory
    }

    pub fn memory_entry(&self, entity_type: EntityType) -> Option<&MemoryEntry> {
        self.memory.get(&entity_type)
    }

    /// Whether something stamped at `at` is still inside the recency window.
    pub fn is_fresh(&self, at: Timestamp, now: Timestamp) -> bool {
        at.seconds_until(now) <= self.recency_window_secs as i64
    }

    /// A context variable, only if set within the recency window.
    pub fn fresh_variable(&self, name: &str, now: Timestamp) -> Option<&ContextVariable> {
        self.variable(name).filter(|v| self.is_fresh(v.set_at, now))
    }

    /// An entity memory value, only if mentioned within the recency window.
    pub fn fresh_memory(&self, entity_type: EntityType, now: Timestamp) -> Option<&MemoryEntry> {
        self.memory_entry(entity_type)
            .filter(|m| self.is_fresh(m.last_mentioned_at, now))
    }

    /// Intent of the most recent resolved turn.
    pub fn last_intent(&self) -> Option<Intent> {
        self.last_turn().and_then(|t| t.intent)
    }

    /// Whether the session has been idle longer than the timeout.
    pub fn is_expired(&self, now: Timestamp, timeout_minutes: u32) -> bool {
        self.last_activity.seconds_until(now) > i64::from(timeout_minutes) * 60
    }

    pub(crate) fn touch(&mut self, now: Timestamp) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn pending(&self) -> Option<&PendingClarification> {
        self.pending.as_ref()
    }

    pub(crate) fn set_pending(&mut self, pending: PendingClarification) {
        self.pending = Some(pending);
    }

    pub(crate) fn take_pending(&mut self) -> Option<PendingClarification> {
        self.pending.take()
    }

    /// Apply a resolved turn: append it (evicting the oldest past the
    /// bound), overwrite its variables, refresh memory for its explicit
    /// entities and drop any pending clarification.
    pub(crate) fn commit(&mut self, commit: TurnCommit) {
        let now = commit.turn.timestamp;

        self.history.push_back(commit.turn);
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }

        for (name, value) in commit.variables {
            self.variables.insert(name, ContextVariable { value, set_at: now });
        }

        for entity in commit.remembered.into_iter().filter(Entity::is_explicit) {
            self.memory.insert(
                entity.entity_type,
                MemoryEntry {
                    value: entity.value,
                    last_mentioned_at: now,
                },
            );
        }

        self.pending = None;
        debug!(
            session_id = %self.session_id,
            turns = self.history.len(),
            memory = self.memory.len(),
            "Context committed"
        );
    }

    /// Drop variables, entity memory and any pending clarification. History
    /// is kept.
    pub fn clear_context(&mut self) {
        self.variables.clear();
        self.memory.clear();
        self.pending = None;
    }

    /// Replace all committed state, used when restoring a snapshot.
    pub(crate) fn restore(
        &mut self,
        history: Vec<ConversationTurn>,
        variables: BTreeMap<String, ContextVariable>,
        memory: BTreeMap<EntityType, MemoryEntry>,
    ) {
        self.history = history.into();
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }
        self.variables = variables;
        self.memory = memory;
        self.pending = None;
    }

    // =========================================================================
    // Summary
    // =========================================================================

    /// Snapshot of the conversation state for diagnostics and UIs.
    pub fn summary(&self, now: Timestamp) -> ConversationSummary {
        ConversationSummary {
            total_turns: self.history.len(),
            current_topic: self.last_intent(),
            context_variables: self
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect(),
            recent_entity_types: self
                .memory
                .iter()
                .filter(|(_, m)| self.is_fresh(m.last_mentioned_at, now))
                .map(|(t, _)| *t)
                .collect(),
            flow: self.flow(),
            last_turn: self.last_turn().cloned(),
        }
    }

    /// Classify the last five turns as initial, focused, alternating or
    /// varied.
    pub fn flow(&self) -> ConversationFlow {
        let recent_intents: Vec<Intent> = self
            .history
            .iter()
            .rev()
            .take(5)
            .rev()
            .filter_map(|t| t.intent)
            .collect();

        if self.history.len() < 2 {
            return ConversationFlow {
                pattern: FlowPattern::Initial,
                dominant_intent: recent_intents.first().copied(),
                recent_intents,
            };
        }

        let n = recent_intents.len();
        let pattern = if n > 0 && recent_intents.iter().all(|i| *i == recent_intents[0]) {
            FlowPattern::Focused
        } else if n > 2 && recent_intents[n - 1] == recent_intents[n - 3] {
            FlowPattern::Alternating
        } else {
            FlowPattern::Varied
        };

        ConversationFlow {
            pattern,
            dominant_intent: dominant(&recent_intents),
            recent_intents,
        }
    }
}

/// Most frequent intent; ties go to the most recent.
fn dominant(intents: &[Intent]) -> Option<Intent> {
    let mut counts: HashMap<Intent, usize> = HashMap::new();
    for intent in intents {
        *counts.entry(*intent).or_default() += 1;
    }
    let mut best: Option<(Intent, usize)> = None;
    for intent in intents.iter().rev() {
        let count = counts[intent];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((*intent, count));
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPattern {
    Initial,
    Focused,
    Alternating,
    Varied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlow {
    pub pattern: FlowPattern,
    /// Intents of up to the last five turns, oldest first.
    pub recent_intents: Vec<Intent>,
    pub dominant_intent: Option<Intent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub total_turns: usize,
    pub current_topic: Option<Intent>,
    pub context_variables: BTreeMap<String, EntityValue>,
    /// Entity types mentioned within the recency window.
    pub recent_entity_types: Vec<EntityType>,
    pub flow: ConversationFlow,
    pub last_turn: Option<ConversationTurn>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{EntitySource, Span};

    fn config(history_len: usize) -> ContextConfig {
        ContextConfig {
            history_len,
            ..ContextConfig::default()
        }
    }

    fn context() -> ConversationContext {
        ConversationContext::new(Uuid::new_v4(), &config(3), Timestamp(0))
    }

    fn explicit(t: EntityType, v: &str) -> Entity {
        Entity::new(t, EntityValue::text(v), 0.9, Some(Span::new(0, v.len())), EntitySource::Pattern)
    }

    fn commit_turn(ctx: &mut ConversationContext, intent: Intent, at: i64, entities: Vec<Entity>) {
        let mut variables = BTreeMap::new();
        for e in &entities {
            variables.insert(variable_name(e.entity_type.param_name()), e.value.clone());
        }
        variables.insert(LAST_INTENT_FAMILY.to_string(), EntityValue::text(intent.as_str()));
        ctx.commit(TurnCommit {
            turn: ConversationTurn {
                utterance: format!("turn at {}", at),
                intent: Some(intent),
                entities: entities.clone(),
                timestamp: Timestamp(at),
            },
            variables,
            remembered: entities,
        });
    }

    #[test]
    fn test_history_bounded_fifo() {
        let mut ctx = context();
        for i in 0..4 {
            commit_turn(&mut ctx, Intent::Joke, i, vec![]);
        }
        assert_eq!(ctx.history().len(), 3);
        assert_eq!(ctx.history().front().unwrap().timestamp, Timestamp(1));
        assert_eq!(ctx.last_turn().unwrap().timestamp, Timestamp(3));
    }

    #[test]
    fn test_memory_single_entry_per_type() {
        let mut ctx = context();
        commit_turn(&mut ctx, Intent::Weather, 10, vec![explicit(EntityType::Location, "Seattle")]);
        commit_turn(&mut ctx, Intent::Weather, 20, vec![explicit(EntityType::Location, "Boston")]);
        assert_eq!(ctx.memory().len(), 1);
        let entry = ctx.memory_entry(EntityType::Location).unwrap();
        assert_eq!(entry.value.as_text(), Some("Boston"));
        assert_eq!(entry.last_mentioned_at, Timestamp(20));
    }

    #[test]
    fn test_memory_ignores_recalled_entities() {
        let mut ctx = context();
        commit_turn(&mut ctx, Intent::Weather, 10, vec![explicit(EntityType::Location, "Seattle")]);
        let recalled = Entity::new(
            EntityType::Location,
            EntityValue::text("Seattle"),
            0.9,
            None,
            EntitySource::Memory,
        );
        commit_turn(&mut ctx, Intent::Weather, 50, vec![recalled]);
        assert_eq!(
            ctx.memory_entry(EntityType::Location).unwrap().last_mentioned_at,
            Timestamp(10)
        );
    }

    #[test]
    fn test_variables_overwritten_per_name() {
        let mut ctx = context();
        commit_turn(&mut ctx, Intent::Weather, 10, vec![explicit(EntityType::Location, "Seattle")]);
        commit_turn(&mut ctx, Intent::Music, 20, vec![explicit(EntityType::Genre, "jazz")]);
        assert_eq!(
            ctx.variable("last_location").unwrap().value.as_text(),
            Some("Seattle")
        );
        assert_eq!(ctx.variable("last_genre").unwrap().value.as_text(), Some("jazz"));
        let family = ctx.variable(LAST_INTENT_FAMILY).unwrap();
        assert_eq!(family.value.as_text(), Some("music"));
        assert_eq!(family.set_at, Timestamp(20));
    }

    #[test]
    fn test_freshness_window_inclusive() {
        let mut ctx = context();
        commit_turn(&mut ctx, Intent::Weather, 0, vec![explicit(EntityType::Location, "Seattle")]);
        assert!(ctx.fresh_memory(EntityType::Location, Timestamp(300)).is_some());
        assert!(ctx.fresh_memory(EntityType::Location, Timestamp(301)).is_none());
        assert!(ctx.fresh_variable("last_location", Timestamp(301)).is_none());
    }

    #[test]
    fn test_session_expiry() {
        let mut ctx = context();
        ctx.touch(Timestamp(100));
        assert!(!ctx.is_expired(Timestamp(100 + 30 * 60), 30));
        assert!(ctx.is_expired(Timestamp(100 + 30 * 60 + 1), 30));
    }

    #[test]
    fn test_clear_context_keeps_history() {
        let mut ctx = context();
        commit_turn(&mut ctx, Intent::Weather, 10, vec![explicit(EntityType::Location, "Seattle")]);
        ctx.clear_context();
        assert!(ctx.variables().is_empty());
        assert!(ctx.memory().is_empty());
        assert_eq!(ctx.history().len(), 1);
    }

    #[test]
    fn test_flow_patterns() {
        let mut ctx = ConversationContext::new(Uuid::new_v4(), &config(10), Timestamp(0));
        assert_eq!(ctx.flow().pattern, FlowPattern::Initial);

        commit_turn(&mut ctx, Intent::Music, 1, vec![]);
        commit_turn(&mut ctx, Intent::Music, 2, vec![]);
        assert_eq!(ctx.flow().pattern, FlowPattern::Focused);

        commit_turn(&mut ctx, Intent::Weather, 3, vec![]);
        commit_turn(&mut ctx, Intent::Music, 4, vec![]);
        let flow = ctx.flow();
        assert_eq!(flow.pattern, FlowPattern::Alternating);
        assert_eq!(flow.dominant_intent, Some(Intent::Music));

        commit_turn(&mut ctx, Intent::Timer, 5, vec![]);
        commit_turn(&mut ctx, Intent::Joke, 6, vec![]);
        assert_eq!(ctx.flow().pattern, FlowPattern::Varied);
        assert_eq!(ctx.flow().recent_intents.len(), 5);
    }

    #[test]
    fn test_summary_recent_entity_types() {
        let mut ctx = context();
        commit_turn(&mut ctx, Intent::Weather, 0, vec![explicit(EntityType::Location, "Seattle")]);
        commit_turn(&mut ctx, Intent::Music, 200, vec![explicit(EntityType::Genre, "jazz")]);
        let summary = ctx.summary(Timestamp(400));
        assert_eq!(summary.total_turns, 2);
        assert_eq!(summary.current_topic, Some(Intent::Music));
        assert_eq!(summary.recent_entity_types, vec![EntityType::Genre]);
        assert_eq!(
            summary.context_variables.get("last_location").and_then(|v| v.as_text()),
            Some("Seattle")
        );
    }
}

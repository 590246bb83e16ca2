//! Versioned JSON snapshots of a conversation context.
//!
//! Import fails closed: a snapshot that does not parse or validate leaves the
//! session with a fresh, empty context.

use std::collections::BTreeMap;

use parley_core::config::ContextConfig;
use parley_core::{ConversationTurn, EntityType, EntityValue, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::{ContextVariable, ConversationContext, MemoryEntry};
use crate::error::DialogError;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Tolerated lead of a snapshot timestamp over the importing clock.
const CLOCK_SKEW_SECS: i64 = 60;

/// Everything committed to a context, minus the pending clarification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub version: u32,
    pub history: Vec<ConversationTurn>,
    pub context_variables: BTreeMap<String, ContextVariable>,
    pub entity_memory: BTreeMap<EntityType, MemoryEntry>,
}

impl ContextSnapshot {
    pub fn capture(ctx: &ConversationContext) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            history: ctx.history().iter().cloned().collect(),
            context_variables: ctx.variables().clone(),
            entity_memory: ctx.memory().clone(),
        }
    }

    pub fn to_json(&self) -> parley_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, DialogError> {
        serde_json::from_str(json).map_err(|e| DialogError::Snapshot(e.to_string()))
    }

    /// Check the snapshot against what a context with `history_len` turns
    /// can hold at time `now`.
    pub fn validate(&self, history_len: usize, now: Timestamp) -> Result<(), DialogError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(DialogError::Snapshot(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.history.len() > history_len {
            return Err(DialogError::Snapshot(format!(
                "{} turns exceed the history bound of {}",
                self.history.len(),
                history_len
            )));
        }
        let mut previous: Option<Timestamp> = None;
        for turn in &self.history {
            check_timestamp("turn", turn.timestamp, now)?;
            if previous.is_some_and(|p| turn.timestamp < p) {
                return Err(DialogError::Snapshot(
                    "history is not in chronological order".to_string(),
                ));
            }
            previous = Some(turn.timestamp);

            for e in &turn.entities {
                check_confidence(e.entity_type, e.confidence)?;
                check_value(&e.entity_type.to_string(), &e.value)?;
            }
        }
        for (name, variable) in &self.context_variables {
            if !name.starts_with("last_") {
                return Err(DialogError::Snapshot(format!(
                    "unknown context variable {}",
                    name
                )));
            }
            check_timestamp(name, variable.set_at, now)?;
            check_value(name, &variable.value)?;
        }
        for (entity_type, entry) in &self.entity_memory {
            let label = entity_type.to_string();
            check_timestamp(&label, entry.last_mentioned_at, now)?;
            check_value(&label, &entry.value)?;
        }
        Ok(())
    }

    /// Validate, then replace the context's committed state.
    pub fn apply(self, ctx: &mut ConversationContext, now: Timestamp) -> Result<(), DialogError> {
        self.validate(ctx.history_len(), now)?;
        ctx.restore(self.history, self.context_variables, self.entity_memory);
        Ok(())
    }
}

/// Timestamps must lie between the epoch and `now`, give or take clock skew.
fn check_timestamp(label: &str, at: Timestamp, now: Timestamp) -> Result<(), DialogError> {
    if at.0 < 0 || at > now.plus_secs(CLOCK_SKEW_SECS) {
        return Err(DialogError::Snapshot(format!(
            "{} timestamp {} out of range",
            label, at.0
        )));
    }
    Ok(())
}

fn check_confidence(entity_type: EntityType, confidence: f32) -> Result<(), DialogError> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(DialogError::Snapshot(format!(
            "{} confidence {} out of range",
            entity_type, confidence
        )));
    }
    Ok(())
}

fn check_value(label: &str, value: &EntityValue) -> Result<(), DialogError> {
    let valid = match value {
        EntityValue::Number(n) => n.is_finite(),
        EntityValue::Text(s) => !s.trim().is_empty(),
    };
    if !valid {
        return Err(DialogError::Snapshot(format!("{} has an invalid value", label)));
    }
    Ok(())
}

/// Import `json` into `ctx`, resetting it to a fresh context on any error.
///
/// Returns whether the snapshot was applied.
pub fn import_or_reset(
    ctx: &mut ConversationContext,
    json: &str,
    config: &ContextConfig,
    now: Timestamp,
) -> bool {
    match ContextSnapshot::from_json(json).and_then(|snapshot| snapshot.apply(ctx, now)) {
        Ok(()) => {
            info!(
                session_id = %ctx.session_id(),
                turns = ctx.history().len(),
                "Context snapshot imported"
            );
            true
        }
        Err(e) => {
            warn!(
                session_id = %ctx.session_id(),
                error = %e,
                "Snapshot rejected, starting with a fresh context"
            );
            *ctx = ConversationContext::new(ctx.session_id(), config, now);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TurnCommit;
    use parley_core::{Entity, EntitySource, Intent, Span};
    use uuid::Uuid;

    fn populated() -> ConversationContext {
        let mut ctx = ConversationContext::new(Uuid::new_v4(), &ContextConfig::default(), Timestamp(0));
        let seattle = Entity::new(
            EntityType::Location,
            EntityValue::text("Seattle"),
            0.85,
            Some(Span::new(23, 30)),
            EntitySource::OpenDomain,
        );
        let mut variables = BTreeMap::new();
        variables.insert("last_location".to_string(), EntityValue::text("Seattle"));
        ctx.commit(TurnCommit {
            turn: ConversationTurn {
                utterance: "What's the weather in Seattle?".to_string(),
                intent: Some(Intent::Weather),
                entities: vec![seattle.clone()],
                timestamp: Timestamp(10),
            },
            variables,
            remembered: vec![seattle],
        });
        ctx
    }

    #[test]
    fn test_snapshot_round_trip() {
        let ctx = populated();
        let json = ContextSnapshot::capture(&ctx).to_json().unwrap();
        assert!(json.contains("\"version\": 1"));
        assert!(json.contains("\"entity_memory\""));

        let mut restored = ConversationContext::new(Uuid::new_v4(), &ContextConfig::default(), Timestamp(20));
        ContextSnapshot::from_json(&json).unwrap().apply(&mut restored, Timestamp(20)).unwrap();
        assert_eq!(restored.history(), ctx.history());
        assert_eq!(restored.variables(), ctx.variables());
        assert_eq!(restored.memory(), ctx.memory());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut snapshot = ContextSnapshot::capture(&populated());
        snapshot.version = 9;
        let err = snapshot.validate(10, Timestamp(100)).unwrap_err();
        assert_eq!(err.to_string(), "snapshot rejected: unsupported version 9");
    }

    #[test]
    fn test_rejects_history_over_bound() {
        let snapshot = ContextSnapshot::capture(&populated());
        assert!(snapshot.validate(1, Timestamp(100)).is_ok());
        assert!(snapshot.validate(0, Timestamp(100)).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let mut snapshot = ContextSnapshot::capture(&populated());
        snapshot.history[0].entities[0].confidence = 1.5;
        assert!(matches!(snapshot.validate(10, Timestamp(100)), Err(DialogError::Snapshot(_))));
    }

    #[test]
    fn test_rejects_unknown_variable() {
        let mut snapshot = ContextSnapshot::capture(&populated());
        snapshot.context_variables.insert(
            "favourite".to_string(),
            ContextVariable {
                value: EntityValue::text("x"),
                set_at: Timestamp(0),
            },
        );
        assert!(snapshot.validate(10, Timestamp(100)).is_err());
    }

    #[test]
    fn test_import_fails_closed() {
        let mut ctx = populated();
        let id = ctx.session_id();
        let applied = import_or_reset(&mut ctx, "{ not json", &ContextConfig::default(), Timestamp(99));
        assert!(!applied);
        assert_eq!(ctx.session_id(), id);
        assert!(ctx.history().is_empty());
        assert!(ctx.memory().is_empty());
        assert!(ctx.variables().is_empty());
    }

    #[test]
    fn test_import_applies_valid_snapshot() {
        let json = ContextSnapshot::capture(&populated()).to_json().unwrap();
        let mut ctx = ConversationContext::new(Uuid::new_v4(), &ContextConfig::default(), Timestamp(50));
        assert!(import_or_reset(&mut ctx, &json, &ContextConfig::default(), Timestamp(50)));
        assert_eq!(ctx.last_intent(), Some(Intent::Weather));
    }

    #[test]
    fn test_rejects_timestamps_out_of_range() {
        let mut snapshot = ContextSnapshot::capture(&populated());
        snapshot.history[0].timestamp = Timestamp(i64::MIN);
        assert!(snapshot.validate(10, Timestamp(100)).is_err());

        let mut snapshot = ContextSnapshot::capture(&populated());
        if let Some(entry) = snapshot.entity_memory.get_mut(&EntityType::Location) {
            entry.last_mentioned_at = Timestamp(i64::MIN);
        }
        assert!(snapshot.validate(10, Timestamp(100)).is_err());

        let mut snapshot = ContextSnapshot::capture(&populated());
        if let Some(variable) = snapshot.context_variables.get_mut("last_location") {
            variable.set_at = Timestamp(10_000);
        }
        assert!(snapshot.validate(10, Timestamp(100)).is_err());
        assert!(snapshot.validate(10, Timestamp(10_000)).is_ok());
    }

    #[test]
    fn test_rejects_invalid_memory_value() {
        let mut snapshot = ContextSnapshot::capture(&populated());
        snapshot.entity_memory.insert(
            EntityType::Number,
            MemoryEntry {
                value: EntityValue::Number(f64::NAN),
                last_mentioned_at: Timestamp(10),
            },
        );
        assert!(snapshot.validate(10, Timestamp(100)).is_err());

        let mut snapshot = ContextSnapshot::capture(&populated());
        if let Some(entry) = snapshot.entity_memory.get_mut(&EntityType::Location) {
            entry.value = EntityValue::text("  ");
        }
        assert!(snapshot.validate(10, Timestamp(100)).is_err());
    }

    #[test]
    fn test_import_with_extreme_timestamps_resets() {
        let mut snapshot = ContextSnapshot::capture(&populated());
        for turn in &mut snapshot.history {
            turn.timestamp = Timestamp(i64::MIN);
        }
        for entry in snapshot.entity_memory.values_mut() {
            entry.last_mentioned_at = Timestamp(i64::MIN);
        }
        let json = snapshot.to_json().unwrap();
        let mut ctx = ConversationContext::new(Uuid::new_v4(), &ContextConfig::default(), Timestamp(50));
        assert!(!import_or_reset(&mut ctx, &json, &ContextConfig::default(), Timestamp(50)));
        assert!(ctx.history().is_empty());
        assert!(ctx.memory().is_empty());
    }
}

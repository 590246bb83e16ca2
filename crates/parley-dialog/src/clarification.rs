//! The short-lived "awaiting clarification" sub-state.
//!
//! A turn that ends in `NeedsClarification` leaves a [`PendingClarification`]
//! on the session. The next non-empty reply consumes it, whether or not the
//! reply turns out to answer the question.

use parley_core::{Entity, EntityMap, EntityType, Intent, IntentCandidate, Timestamp};

/// What the pending question is about.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingKind {
    /// Several intents scored within the ambiguity margin.
    Ambiguous { candidates: Vec<IntentCandidate> },
    /// The intent was accepted but required parameters are missing.
    MissingParameters {
        candidate: IntentCandidate,
        missing: Vec<EntityType>,
    },
}

/// A question waiting for the user's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingClarification {
    pub kind: PendingKind,
    /// The utterance that triggered the question.
    pub utterance: String,
    /// Entities of that utterance, including any inherited from memory.
    pub entities: EntityMap,
    /// Memory values the utterance asked to avoid.
    pub excluded: Vec<Entity>,
    pub asked_at: Timestamp,
}

impl PendingClarification {
    pub fn is_expired(&self, now: Timestamp, timeout_secs: u64) -> bool {
        self.asked_at.seconds_until(now) > timeout_secs as i64
    }

    /// Prompt shown to the user for this question.
    pub fn prompt(&self) -> String {
        match &self.kind {
            PendingKind::Ambiguous { candidates } => ambiguity_prompt(candidates),
            PendingKind::MissingParameters { candidate, missing } => {
                missing_parameter_prompt(candidate.intent, missing)
            }
        }
    }
}

pub const REPEAT_PROMPT: &str = "Sorry, I didn't catch that. Could you please repeat?";
pub const UNCLASSIFIED_PROMPT: &str = "Sorry, I didn't understand that command.";

/// Join names as `a`, `a or b`, `a, b or c`.
fn join_choices(names: &[&str], conjunction: &str) -> String {
    match names {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} {} {}", init.join(", "), conjunction, last),
    }
}

/// "Did you mean music or news?"
pub fn ambiguity_prompt(candidates: &[IntentCandidate]) -> String {
    let names: Vec<&str> = candidates.iter().map(|c| c.intent.as_str()).collect();
    format!("Did you mean {}?", join_choices(&names, "or"))
}

/// "Which location should I use for the weather?"
pub fn missing_parameter_prompt(intent: Intent, missing: &[EntityType]) -> String {
    let names: Vec<&str> = missing.iter().map(|t| t.param_name()).collect();
    format!(
        "Which {} should I use for the {}?",
        join_choices(&names, "and"),
        intent
    )
}

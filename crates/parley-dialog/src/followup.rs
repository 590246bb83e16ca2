//! Follow-up detection and reference resolution.
//!
//! An utterance is a follow-up when it carries a referential cue and lacks
//! an entity type the previous turn relied on. Missing values are pulled
//! from entity memory, but only while they are inside the recency window.

use parley_core::{AnalysisResult, Entity, EntitySource, EntityType, Intent, Timestamp};
use parley_nlu::normalize::{normalize, token_count};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::context::ConversationContext;

/// Confidence given to values recalled from memory.
pub const RECALLED_CONFIDENCE: f32 = 0.9;

/// Elliptical utterances at or below this many tokens count as a cue.
const ELLIPTICAL_MAX_TOKENS: usize = 3;

static CONTRAST_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:different|something\s+else|another|other)\b").expect("Invalid contrast cue regex")
});

static CONTINUATION_CUES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(?:what|how)\s+about\b",
        r"^and\b",
        r"\b(?:also|too|as\s+well|there|that\s+one)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid continuation cue regex"))
    .collect()
});

/// How the utterance relates to the previous turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    /// "what about tomorrow?": reuse the missing values.
    Continuation,
    /// "something different": avoid the missing values.
    Contrast,
}

/// A detected follow-up on the previous turn.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUp {
    pub prior_intent: Intent,
    pub cue: CueKind,
    /// Types the previous turn used that this utterance lacks.
    pub missing: Vec<EntityType>,
}

/// Result of resolving a follow-up against entity memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Recalled entities to add to the utterance (continuation).
    pub inherited: Vec<Entity>,
    /// Recalled entities the user wants to avoid (contrast).
    pub excluded: Vec<Entity>,
    /// Missing types whose memory was too old to use.
    pub stale: Vec<EntityType>,
}

/// Find the referential cue in an utterance, if any.
///
/// The elliptical cue (very short utterance) only counts when the utterance
/// carries at least one entity, so "thanks" is not read as a follow-up.
pub fn detect_cue(text: &str, has_entities: bool) -> Option<CueKind> {
    let normalized = normalize(text);
    if CONTRAST_CUE.is_match(&normalized) {
        return Some(CueKind::Contrast);
    }
    if CONTINUATION_CUES.iter().any(|r| r.is_match(&normalized)) {
        return Some(CueKind::Continuation);
    }
    let tokens = token_count(&normalized);
    (has_entities && tokens > 0 && tokens <= ELLIPTICAL_MAX_TOKENS).then_some(CueKind::Continuation)
}

/// Detects follow-ups and resolves their references from memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FollowUpResolver;

impl FollowUpResolver {
    /// Decide whether `raw` is a follow-up on the last resolved turn.
    ///
    /// `accepted` is the intent the raw analysis would be accepted as on its
    /// own. A confident request for any other intent is never a follow-up,
    /// however the prior intent scored.
    pub fn detect(
        &self,
        text: &str,
        raw: &AnalysisResult,
        accepted: Option<Intent>,
        ctx: &ConversationContext,
    ) -> Option<FollowUp> {
        let prior = ctx.last_turn()?;
        let prior_intent = prior.intent?;

        if accepted.is_some_and(|intent| intent != prior_intent) {
            return None;
        }

        let cue = detect_cue(text, !raw.entities.is_empty())?;

        let mut missing: Vec<EntityType> = prior
            .entities
            .iter()
            .map(|e| e.entity_type)
            .filter(|t| !raw.entities.contains(*t))
            .collect();
        missing.sort();
        missing.dedup();
        if missing.is_empty() {
            return None;
        }

        debug!(
            session_id = %ctx.session_id(),
            prior = %prior_intent,
            cue = ?cue,
            missing = ?missing,
            "Follow-up detected"
        );
        Some(FollowUp {
            prior_intent,
            cue,
            missing,
        })
    }

    /// Pull fresh memory values for each missing type.
    pub fn resolve(
        &self,
        follow_up: &FollowUp,
        ctx: &ConversationContext,
        now: Timestamp,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        for entity_type in &follow_up.missing {
            let Some(entry) = ctx.memory_entry(*entity_type) else {
                continue;
            };
            if !ctx.is_fresh(entry.last_mentioned_at, now) {
                warn!(
                    session_id = %ctx.session_id(),
                    entity_type = %entity_type,
                    age_secs = entry.last_mentioned_at.seconds_until(now),
                    "Entity memory is stale, not substituting"
                );
                resolution.stale.push(*entity_type);
                continue;
            }
            let recalled = Entity::new(
                *entity_type,
                entry.value.clone(),
                RECALLED_CONFIDENCE,
                None,
                EntitySource::Memory,
            );
            match follow_up.cue {
                CueKind::Continuation => resolution.inherited.push(recalled),
                CueKind::Contrast => resolution.excluded.push(recalled),
            }
        }
        resolution
    }
}

//! Per-turn resolution: `New -> Classified -> {Resolved | NeedsClarification}`.
//!
//! The resolver is the only writer of committed conversation state. A turn
//! that ends in clarification leaves history, variables and memory untouched
//! and only records the pending question.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use parley_core::config::ContextConfig;
use parley_core::{
    ConversationTurn, Entity, EntityMap, EntitySource, EntityType, EntityValue, IntentCandidate,
    ParleyConfig, ResolvedCommand, Span, Timestamp,
};
use parley_nlu::{normalize, only_common_words, token_count, Analyzer, Decision};
use regex::Regex;
use tracing::{debug, info};

use crate::clarification::{
    ambiguity_prompt, missing_parameter_prompt, PendingClarification, PendingKind, REPEAT_PROMPT,
    UNCLASSIFIED_PROMPT,
};
use crate::context::{variable_name, ConversationContext, TurnCommit, LAST_INTENT_FAMILY};
use crate::followup::{FollowUpResolver, RECALLED_CONFIDENCE};

/// A bare reply at or below this many tokens can stand in for a text value.
const BARE_REPLY_MAX_TOKENS: usize = 4;

/// Confidence of an entity taken verbatim from a bare clarification reply.
const BARE_REPLY_CONFIDENCE: f32 = 0.6;

/// A reply that withdraws the pending request instead of answering it.
static DISMISSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:no|nope|nah|stop|cancel|abort|quit|nothing|never\s*mind|forget\s+(?:it|that|about\s+it)|cancel\s+(?:it|that))(?:\s+(?:please|thanks|then))?[\s.,!?]*$",
    )
    .expect("Invalid dismissal regex")
});

/// Resolves utterances against a session's conversation context.
#[derive(Clone)]
pub struct IntentResolver {
    analyzer: Analyzer,
    follow_ups: FollowUpResolver,
    context_config: ContextConfig,
}

impl IntentResolver {
    pub fn new(config: &ParleyConfig) -> Self {
        Self::with_analyzer(Analyzer::new(config), config.context.clone())
    }

    pub fn with_analyzer(analyzer: Analyzer, context_config: ContextConfig) -> Self {
        Self {
            analyzer,
            follow_ups: FollowUpResolver,
            context_config,
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn context_config(&self) -> &ContextConfig {
        &self.context_config
    }

    /// Resolve one utterance at the current wall-clock time.
    pub async fn resolve(&self, ctx: &mut ConversationContext, text: &str) -> ResolvedCommand {
        self.resolve_at(ctx, text, Timestamp::now()).await
    }

    /// Resolve one utterance as if received at `now`.
    pub async fn resolve_at(
        &self,
        ctx: &mut ConversationContext,
        text: &str,
        now: Timestamp,
    ) -> ResolvedCommand {
        ctx.touch(now);
        if text.trim().is_empty() {
            debug!(session_id = %ctx.session_id(), "Blank utterance");
            return ResolvedCommand::clarification(None, REPEAT_PROMPT, Vec::new(), 0.0);
        }
        let entities = self.analyzer.extractor().extract(text).await;
        self.decide(ctx, text, entities, now)
    }

    /// Everything after extraction. Synchronous, so the whole decision and
    /// commit happen without yielding.
    pub fn decide(
        &self,
        ctx: &mut ConversationContext,
        text: &str,
        entities: EntityMap,
        now: Timestamp,
    ) -> ResolvedCommand {
        if let Some(pending) = ctx.take_pending() {
            if pending.is_expired(now, self.context_config.clarification_timeout_secs) {
                debug!(session_id = %ctx.session_id(), "Pending clarification expired");
            } else if let Some(command) = self.interpret_reply(ctx, pending, text, &entities, now) {
                return command;
            }
        }

        let classifier = self.analyzer.classifier();
        let raw = self.analyzer.assemble(text, entities, None);
        let raw_decision = classifier.decide(&raw.intents);
        let accepted = match &raw_decision {
            Decision::Accepted(c) => Some(c.intent),
            _ => None,
        };

        let follow_up = self.follow_ups.detect(text, &raw, accepted, ctx);
        let (analysis, decision, excluded) = match follow_up {
            Some(follow_up) => {
                let resolution = self.follow_ups.resolve(&follow_up, ctx, now);
                let mut entities = raw.entities;
                entities.extend(resolution.inherited);
                let analysis = self
                    .analyzer
                    .assemble(text, entities, Some(follow_up.prior_intent));
                let decision = classifier.decide(&analysis.intents);
                (analysis, decision, resolution.excluded)
            }
            None => (raw, raw_decision, Vec::new()),
        };

        match decision {
            Decision::Unclassified => {
                debug!(session_id = %ctx.session_id(), "Utterance unclassified");
                let confidence = analysis.top().map_or(0.0, |c| c.confidence);
                ResolvedCommand::clarification(None, UNCLASSIFIED_PROMPT, analysis.intents, confidence)
            }
            Decision::Ambiguous(candidates) => {
                let prompt = ambiguity_prompt(&candidates);
                let confidence = candidates.first().map_or(0.0, |c| c.confidence);
                debug!(
                    session_id = %ctx.session_id(),
                    candidates = ?candidates.iter().map(|c| c.intent).collect::<Vec<_>>(),
                    "Ambiguous utterance"
                );
                ctx.set_pending(PendingClarification {
                    kind: PendingKind::Ambiguous {
                        candidates: candidates.clone(),
                    },
                    utterance: text.to_string(),
                    entities: analysis.entities,
                    excluded,
                    asked_at: now,
                });
                ResolvedCommand::clarification(None, prompt, candidates, confidence)
            }
            Decision::Accepted(candidate) => {
                self.accept(ctx, text, candidate, analysis.entities, excluded, now)
            }
        }
    }

    // =========================================================================
    // Clarification replies
    // =========================================================================

    /// Try to read `text` as the answer to a pending question. `None` means
    /// the reply is handled as a fresh utterance.
    fn interpret_reply(
        &self,
        ctx: &mut ConversationContext,
        pending: PendingClarification,
        text: &str,
        reply_entities: &EntityMap,
        now: Timestamp,
    ) -> Option<ResolvedCommand> {
        let normalized = normalize(text);
        if DISMISSAL.is_match(&normalized) {
            debug!(session_id = %ctx.session_id(), "Pending clarification dismissed");
            return Some(ResolvedCommand::dismissed());
        }
        match pending.kind {
            PendingKind::Ambiguous { candidates } => {
                let catalog = self.analyzer.classifier().catalog();
                let chosen = candidates
                    .iter()
                    .find(|c| catalog.get(c.intent).is_named_in(&normalized))
                    .copied()?;
                debug!(session_id = %ctx.session_id(), intent = %chosen.intent, "Ambiguity resolved by reply");

                let mut entities = pending.entities;
                add_new_types(&mut entities, reply_entities);
                Some(self.accept(ctx, &pending.utterance, chosen, entities, pending.excluded, now))
            }
            PendingKind::MissingParameters { candidate, missing } => {
                let reply = self.analyzer.assemble(text, reply_entities.clone(), None);
                if let Decision::Accepted(other) = self.analyzer.classifier().decide(&reply.intents) {
                    if other.intent != candidate.intent {
                        return None;
                    }
                }

                let mut entities = pending.entities;
                let mut filled = missing.iter().any(|t| reply.entities.contains(*t));
                if !filled {
                    if let [only] = missing.as_slice() {
                        if only.is_free_text() && token_count(&normalized) <= BARE_REPLY_MAX_TOKENS {
                            if let Some(entity) = bare_reply_entity(*only, text) {
                                entities.insert(entity);
                                filled = true;
                            }
                        }
                    }
                }
                if !filled {
                    return None;
                }

                debug!(session_id = %ctx.session_id(), intent = %candidate.intent, "Missing parameter supplied by reply");
                add_new_types(&mut entities, &reply.entities);
                Some(self.accept(ctx, &pending.utterance, candidate, entities, pending.excluded, now))
            }
        }
    }

    // =========================================================================
    // Parameter assembly and commit
    // =========================================================================

    /// Fill the intent's parameters and either commit the turn or ask for
    /// whatever required parameter is still missing.
    ///
    /// Precedence per parameter: explicit entity > context variable > entity
    /// memory > default. Optional parameters only come from the utterance,
    /// a follow-up's recalled entities, or the default.
    fn accept(
        &self,
        ctx: &mut ConversationContext,
        utterance: &str,
        candidate: IntentCandidate,
        entities: EntityMap,
        excluded: Vec<Entity>,
        now: Timestamp,
    ) -> ResolvedCommand {
        let compiled = self.analyzer.classifier().catalog().get(candidate.intent);
        let hints: BTreeMap<String, EntityValue> = compiled
            .parameter_types()
            .filter_map(|t| entities.best(t).map(|e| (t.param_name().to_string(), e.value.clone())))
            .collect();
        let action = compiled.select_action(&normalize(utterance), &hints);

        let mut parameters: BTreeMap<String, EntityValue> = BTreeMap::new();
        let mut used: Vec<Entity> = Vec::new();
        let mut missing: Vec<EntityType> = Vec::new();

        for entity_type in compiled.parameter_types() {
            let param = entity_type.param_name();
            let found = entities.get(entity_type);
            let explicit = found.iter().find(|e| e.is_explicit()).cloned();
            let inherited = || found.iter().find(|e| !e.is_explicit()).cloned();
            let avoided = excluded.iter().any(|e| e.entity_type == entity_type);

            let chosen = match explicit {
                Some(entity) => Some(entity),
                None if avoided => None,
                None if compiled.requires_for(entity_type, action) => {
                    self.recall(ctx, entity_type, now).or_else(inherited)
                }
                None => inherited(),
            };

            match chosen {
                Some(entity) => {
                    parameters.insert(param.to_string(), entity.value.clone());
                    used.push(entity);
                }
                None => match compiled.default_for(param) {
                    Some(value) => {
                        parameters.insert(param.to_string(), EntityValue::text(value));
                    }
                    None if compiled.requires_for(entity_type, action) => {
                        missing.push(entity_type)
                    }
                    None => {}
                },
            }
        }

        if !missing.is_empty() {
            let prompt = missing_parameter_prompt(candidate.intent, &missing);
            debug!(
                session_id = %ctx.session_id(),
                intent = %candidate.intent,
                missing = ?missing,
                "Required parameters missing"
            );
            ctx.set_pending(PendingClarification {
                kind: PendingKind::MissingParameters {
                    candidate,
                    missing,
                },
                utterance: utterance.to_string(),
                entities,
                excluded,
                asked_at: now,
            });
            return ResolvedCommand::clarification(
                Some(candidate.intent),
                prompt,
                vec![candidate],
                candidate.confidence,
            );
        }

        for entity in &excluded {
            parameters.insert(
                format!("exclude_{}", entity.entity_type.param_name()),
                entity.value.clone(),
            );
        }

        let mut variables: BTreeMap<String, EntityValue> = used
            .iter()
            .filter(|e| e.is_explicit())
            .map(|e| (variable_name(e.entity_type.param_name()), e.value.clone()))
            .collect();
        variables.insert(
            LAST_INTENT_FAMILY.to_string(),
            EntityValue::text(candidate.intent.as_str()),
        );
        let remembered: Vec<Entity> = used.iter().filter(|e| e.is_explicit()).cloned().collect();
        let mut turn_entities = used;
        turn_entities.extend(excluded);

        ctx.commit(TurnCommit {
            turn: ConversationTurn {
                utterance: utterance.to_string(),
                intent: Some(candidate.intent),
                entities: turn_entities,
                timestamp: now,
            },
            variables,
            remembered,
        });

        info!(
            session_id = %ctx.session_id(),
            intent = %candidate.intent,
            action = action.unwrap_or("-"),
            parameters = parameters.len(),
            confidence = candidate.confidence,
            "Turn resolved"
        );

        ResolvedCommand {
            intent: Some(candidate.intent),
            action: action.map(str::to_string),
            parameters,
            clarification_needed: false,
            clarification_prompt: None,
            candidates: Vec::new(),
            confidence: candidate.confidence,
        }
    }

    /// A required value from a fresh context variable, else fresh memory.
    fn recall(
        &self,
        ctx: &ConversationContext,
        entity_type: EntityType,
        now: Timestamp,
    ) -> Option<Entity> {
        let value = ctx
            .fresh_variable(&variable_name(entity_type.param_name()), now)
            .map(|v| v.value.clone())
            .or_else(|| ctx.fresh_memory(entity_type, now).map(|m| m.value.clone()))?;
        Some(Entity::new(
            entity_type,
            value,
            RECALLED_CONFIDENCE,
            None,
            EntitySource::Memory,
        ))
    }
}

impl Default for IntentResolver {
    fn default() -> Self {
        Self::new(&ParleyConfig::default())
    }
}

/// Copy entities of types `target` has no value for.
fn add_new_types(target: &mut EntityMap, source: &EntityMap) {
    let fresh: Vec<Entity> = source
        .iter()
        .filter(|e| !target.contains(e.entity_type))
        .cloned()
        .collect();
    target.extend(fresh);
}

/// The reply text itself, minus surrounding whitespace and final punctuation.
fn bare_reply_entity(entity_type: EntityType, text: &str) -> Option<Entity> {
    let start = text.len() - text.trim_start().len();
    let value = text
        .trim()
        .trim_end_matches(&['.', '!', '?'][..])
        .trim_end();
    if value.is_empty() || only_common_words(value) {
        return None;
    }
    Some(Entity::new(
        entity_type,
        EntityValue::text(value),
        BARE_REPLY_CONFIDENCE,
        Some(Span::new(start, start + value.len())),
        EntitySource::OpenDomain,
    ))
}

//! Weighted intent scoring.
//!
//! Score per intent, before clamping to [0, 1]:
//!
//! ```text
//! (patterns * pattern_weight + multi_pattern_bonus
//!   + min(keywords * keyword_weight, max_keyword_score)
//!   + required_present * required_entity_weight
//!   + optional_present * optional_entity_weight) * length_factor
//! + follow_up_boost (prior intent only)
//! ```
//!
//! where `length_factor = 1 / (1 + length_penalty * excess_tokens)`.

use std::sync::Arc;

use parley_core::config::ClassifierConfig;
use parley_core::{EntityMap, Intent, IntentCandidate};
use tracing::debug;

use super::catalog::{CompiledIntent, IntentCatalog};
use crate::normalize::{normalize, token_count};

/// Outcome of applying the acceptance threshold and ambiguity margin.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No candidate reached the acceptance threshold.
    Unclassified,
    /// The top candidates are within the ambiguity margin of each other.
    Ambiguous(Vec<IntentCandidate>),
    Accepted(IntentCandidate),
}

/// Scores utterances against the intent catalog.
#[derive(Clone)]
pub struct IntentClassifier {
    catalog: Arc<IntentCatalog>,
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            catalog: Arc::new(IntentCatalog::new()),
            config,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn catalog(&self) -> &IntentCatalog {
        &self.catalog
    }

    /// Rank every intent with a positive score, highest first.
    pub fn classify(&self, utterance: &str, entities: &EntityMap) -> Vec<IntentCandidate> {
        self.classify_with_prior(utterance, entities, None)
    }

    /// Like [`classify`](Self::classify), boosting `prior` as the intent the
    /// utterance follows up on.
    pub fn classify_with_prior(
        &self,
        utterance: &str,
        entities: &EntityMap,
        prior: Option<Intent>,
    ) -> Vec<IntentCandidate> {
        self.classify_normalized(&normalize(utterance), entities, prior)
    }

    /// Score text that has already been through [`normalize`].
    pub fn classify_normalized(
        &self,
        normalized: &str,
        entities: &EntityMap,
        prior: Option<Intent>,
    ) -> Vec<IntentCandidate> {
        let tokens = token_count(normalized);
        let mut candidates: Vec<IntentCandidate> = self
            .catalog
            .iter()
            .map(|compiled| {
                let score = self.score(compiled, normalized, tokens, entities, prior);
                IntentCandidate::new(compiled.intent(), score)
            })
            .filter(|c| c.confidence > 0.0)
            .collect();

        // Stable sort keeps declaration order on ties
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        debug!(
            tokens,
            prior = ?prior,
            top = ?candidates.first().map(|c| (c.intent, c.confidence)),
            "Classified utterance"
        );
        candidates
    }

    fn score(
        &self,
        compiled: &CompiledIntent,
        normalized: &str,
        tokens: usize,
        entities: &EntityMap,
        prior: Option<Intent>,
    ) -> f32 {
        let c = &self.config;

        let pattern_hits = compiled.pattern_hits(normalized);
        let mut score = pattern_hits as f32 * c.pattern_weight;
        if pattern_hits > 1 {
            score += c.multi_pattern_bonus;
        }

        let keyword_hits = compiled.keyword_hits(normalized);
        score += (keyword_hits as f32 * c.keyword_weight).min(c.max_keyword_score);

        let def = &compiled.definition;
        let required = def.required.iter().filter(|t| entities.contains(**t)).count();
        let optional = def.optional.iter().filter(|t| entities.contains(**t)).count();
        score += required as f32 * c.required_entity_weight;
        score += optional as f32 * c.optional_entity_weight;

        let excess = tokens.saturating_sub(c.length_free_tokens);
        score /= 1.0 + c.length_penalty * excess as f32;

        if prior == Some(compiled.intent()) {
            score += c.follow_up_boost;
        }
        score
    }

    /// Apply the acceptance threshold and ambiguity margin to a ranked list.
    pub fn decide(&self, candidates: &[IntentCandidate]) -> Decision {
        let Some(top) = candidates.first() else {
            return Decision::Unclassified;
        };
        if top.confidence < self.config.acceptance_threshold {
            return Decision::Unclassified;
        }
        let competing: Vec<IntentCandidate> = candidates
            .iter()
            .take_while(|c| top.confidence - c.confidence < self.config.ambiguity_margin)
            .copied()
            .collect();
        if competing.len() > 1 {
            Decision::Ambiguous(competing)
        } else {
            Decision::Accepted(*top)
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityExtractor;
    use parley_core::{Entity, EntitySource, EntityType, EntityValue};

    fn entities(text: &str) -> EntityMap {
        EntityExtractor::deterministic_only().extract_deterministic(text)
    }

    fn with_location(mut map: EntityMap, city: &str) -> EntityMap {
        map.insert(Entity::new(
            EntityType::Location,
            EntityValue::text(city),
            0.85,
            None,
            EntitySource::OpenDomain,
        ));
        map
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_weather_with_location_scores_high() {
        let classifier = IntentClassifier::default();
        let text = "What's the weather in Seattle?";
        let ranked = classifier.classify(text, &with_location(entities(text), "Seattle"));
        assert_eq!(ranked[0].intent, Intent::Weather);
        assert!(approx(ranked[0].confidence, 1.0));
        assert!(matches!(classifier.decide(&ranked), Decision::Accepted(c) if c.intent == Intent::Weather));
    }

    #[test]
    fn test_candidates_sorted_and_bounded() {
        let classifier = IntentClassifier::default();
        for text in [
            "Play some jazz",
            "what is the weather like tomorrow in the city of lights",
            "hello there, can you help me search the web for the news",
            "",
        ] {
            let ranked = classifier.classify(text, &entities(text));
            for pair in ranked.windows(2) {
                assert!(pair[0].confidence >= pair[1].confidence);
            }
            for c in &ranked {
                assert!((0.0..=1.0).contains(&c.confidence));
                assert!(c.confidence > 0.0);
            }
        }
    }

    #[test]
    fn test_play_some_jazz() {
        let classifier = IntentClassifier::default();
        let ranked = classifier.classify("Play some jazz", &entities("Play some jazz"));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].intent, Intent::Music);
        assert!(approx(ranked[0].confidence, 0.55));
    }

    #[test]
    fn test_play_the_news_is_ambiguous() {
        let classifier = IntentClassifier::default();
        let ranked = classifier.classify("play the news", &entities("play the news"));
        assert_eq!(ranked[0].intent, Intent::Music);
        assert_eq!(ranked[1].intent, Intent::News);
        match classifier.decide(&ranked) {
            Decision::Ambiguous(c) => {
                let names: Vec<Intent> = c.iter().map(|c| c.intent).collect();
                assert_eq!(names, vec![Intent::Music, Intent::News]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let classifier = IntentClassifier::default();
        // A bare datetime is optional for both weather and calendar
        let ranked = classifier.classify("What about tomorrow?", &entities("What about tomorrow?"));
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].intent, Intent::Weather);
        assert_eq!(ranked[1].intent, Intent::Calendar);
        assert!(approx(ranked[0].confidence, ranked[1].confidence));
        assert_eq!(classifier.decide(&ranked), Decision::Unclassified);
    }

    #[test]
    fn test_prior_boost_and_injected_entity_reclassify() {
        let classifier = IntentClassifier::default();
        let text = "What about tomorrow?";
        let augmented = with_location(entities(text), "Seattle");
        let ranked = classifier.classify_with_prior(text, &augmented, Some(Intent::Weather));
        assert_eq!(ranked[0].intent, Intent::Weather);
        assert!(approx(ranked[0].confidence, 0.7));
        assert!(matches!(classifier.decide(&ranked), Decision::Accepted(_)));
    }

    #[test]
    fn test_timer_request() {
        let classifier = IntentClassifier::default();
        let text = "Set a timer for 15 minutes";
        let ranked = classifier.classify(text, &entities(text));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].intent, Intent::Timer);
        assert!(approx(ranked[0].confidence, 1.0));
    }

    #[test]
    fn test_length_penalty_reduces_score() {
        let classifier = IntentClassifier::default();
        let short = classifier.classify("tell me a joke", &EntityMap::new());
        let long = classifier.classify(
            "so i was wondering whether you could maybe tell me a joke right about now",
            &EntityMap::new(),
        );
        let short_joke = short.iter().find(|c| c.intent == Intent::Joke).unwrap();
        let long_joke = long.iter().find(|c| c.intent == Intent::Joke).unwrap();
        assert!(long_joke.confidence < short_joke.confidence);
    }

    #[test]
    fn test_keyword_score_capped() {
        let config = ClassifierConfig {
            pattern_weight: 0.0,
            multi_pattern_bonus: 0.0,
            ..ClassifierConfig::default()
        };
        let classifier = IntentClassifier::new(config);
        let ranked = classifier.classify(
            "weather temperature rain sunny cloudy forecast",
            &EntityMap::new(),
        );
        let weather = ranked.iter().find(|c| c.intent == Intent::Weather).unwrap();
        assert!(approx(weather.confidence, 0.30));
    }

    #[test]
    fn test_unclassified_gibberish() {
        let classifier = IntentClassifier::default();
        let ranked = classifier.classify("blorp zingle", &EntityMap::new());
        assert!(ranked.is_empty());
        assert_eq!(classifier.decide(&ranked), Decision::Unclassified);
    }

    #[test]
    fn test_spoken_arithmetic() {
        let classifier = IntentClassifier::default();
        let text = "what is fifteen plus twenty seven";
        let ranked = classifier.classify(text, &entities(text));
        assert_eq!(ranked[0].intent, Intent::Calculator);
        assert!(matches!(classifier.decide(&ranked), Decision::Accepted(_)));
    }
}

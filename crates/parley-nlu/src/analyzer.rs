//! Per-turn analysis: extraction plus classification.

use parley_core::{AnalysisResult, EntityMap, Intent, IntentCandidate, ParleyConfig};

use crate::entity::EntityExtractor;
use crate::intent::IntentClassifier;

/// Weight of the top intent score in the aggregate confidence; the mean
/// entity confidence carries the rest.
const INTENT_SHARE: f32 = 0.7;

/// Runs the entity extractor and intent classifier over one utterance.
#[derive(Clone)]
pub struct Analyzer {
    extractor: EntityExtractor,
    classifier: IntentClassifier,
}

impl Analyzer {
    pub fn new(config: &ParleyConfig) -> Self {
        Self {
            extractor: EntityExtractor::new(&config.extractor),
            classifier: IntentClassifier::new(config.classifier.clone()),
        }
    }

    pub fn with_parts(extractor: EntityExtractor, classifier: IntentClassifier) -> Self {
        Self {
            extractor,
            classifier,
        }
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Extract entities, then classify with them.
    pub async fn analyze(&self, text: &str) -> AnalysisResult {
        let entities = self.extractor.extract(text).await;
        self.assemble(text, entities, None)
    }

    /// Classify `text` against an already-built entity set, optionally
    /// boosting a prior intent. Used to re-score after reference resolution.
    pub fn assemble(&self, text: &str, entities: EntityMap, prior: Option<Intent>) -> AnalysisResult {
        let intents = self.classifier.classify_with_prior(text, &entities, prior);
        let confidence = aggregate_confidence(&intents, &entities);
        AnalysisResult {
            intents,
            entities,
            confidence,
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(&ParleyConfig::default())
    }
}

/// Blend of the top intent score and the mean best-entity confidence.
pub fn aggregate_confidence(intents: &[IntentCandidate], entities: &EntityMap) -> f32 {
    let top = intents.first().map_or(0.0, |c| c.confidence);
    let best: Vec<f32> = entities
        .types()
        .filter_map(|t| entities.best(t))
        .map(|e| e.confidence)
        .collect();
    if best.is_empty() {
        return top;
    }
    let mean = best.iter().sum::<f32>() / best.len() as f32;
    parley_core::clamp_unit(INTENT_SHARE * top + (1.0 - INTENT_SHARE) * mean)
}

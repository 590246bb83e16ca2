//! Language understanding for Parley.
//!
//! Turns a single utterance into typed entities and a ranked list of intent
//! candidates. Holds no conversational state; the dialog layer decides what
//! to do with the result.

pub mod analyzer;
pub mod entity;
pub mod intent;
pub mod normalize;

pub use analyzer::{aggregate_confidence, Analyzer};
pub use entity::{only_common_words, EntityExtractor, OpenDomainBackend, ProperNounBackend};
pub use intent::{CompiledIntent, Decision, IntentCatalog, IntentClassifier, IntentDefinition};
pub use normalize::{normalize, token_count};

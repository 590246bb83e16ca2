//! Intent catalog and classification.
//!
//! The catalog holds one declarative definition per intent; the classifier
//! scores an utterance against all of them and applies the acceptance and
//! ambiguity thresholds.

pub mod catalog;
pub mod classifier;

pub use catalog::{definition, CompiledIntent, IntentCatalog, IntentDefinition};
pub use classifier::{Decision, IntentClassifier};

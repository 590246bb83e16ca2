//! Layered entity extraction.
//!
//! Deterministic matchers run first and are trusted. The open-domain backend
//! runs second under a timeout and only fills entity types the deterministic
//! layer left empty.

pub mod matchers;
pub mod open_domain;

use std::sync::Arc;
use std::time::Duration;

use parley_core::config::ExtractorConfig;
use parley_core::{Entity, EntityMap, EntityType, ParleyError};
use tracing::{debug, warn};

pub use open_domain::{only_common_words, OpenDomainBackend, ProperNounBackend};

/// Converts raw utterance text into typed entities.
#[derive(Clone)]
pub struct EntityExtractor {
    backend: Option<Arc<dyn OpenDomainBackend>>,
    timeout: Duration,
}

impl EntityExtractor {
    /// Build an extractor from config, using [`ProperNounBackend`] as the
    /// open-domain layer when enabled.
    pub fn new(config: &ExtractorConfig) -> Self {
        let backend: Option<Arc<dyn OpenDomainBackend>> = config
            .open_domain_enabled
            .then(|| Arc::new(ProperNounBackend::new()) as Arc<dyn OpenDomainBackend>);
        Self {
            backend,
            timeout: Duration::from_millis(config.backend_timeout_ms),
        }
    }

    /// Build an extractor with a caller-supplied open-domain backend.
    pub fn with_backend(config: &ExtractorConfig, backend: Arc<dyn OpenDomainBackend>) -> Self {
        Self {
            backend: Some(backend),
            timeout: Duration::from_millis(config.backend_timeout_ms),
        }
    }

    /// An extractor with no open-domain layer.
    pub fn deterministic_only() -> Self {
        Self {
            backend: None,
            timeout: Duration::from_millis(ExtractorConfig::default().backend_timeout_ms),
        }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Run only the high-precision matchers.
    ///
    /// Numbers that sit inside a duration, expression or clock time are
    /// dropped so `15 minutes` does not also yield a bare `15`.
    pub fn extract_deterministic(&self, text: &str) -> EntityMap {
        let mut map = EntityMap::new();
        map.extend(matchers::durations(text));
        map.extend(matchers::datetimes(text));
        map.extend(matchers::genres(text));
        map.extend(matchers::expressions(text));
        map.extend(matchers::queries(text));

        let covering: Vec<_> = [EntityType::Duration, EntityType::Expression, EntityType::Datetime]
            .iter()
            .flat_map(|t| map.get(*t))
            .filter_map(|e| e.span)
            .collect();
        map.extend(matchers::numbers(text).into_iter().filter(|n| {
            n.span
                .map_or(true, |s| !covering.iter().any(|c| c.overlaps(&s)))
        }));

        map
    }

    /// Full layered extraction.
    ///
    /// Backend failure or timeout is logged and the deterministic result is
    /// returned unchanged.
    pub async fn extract(&self, text: &str) -> EntityMap {
        let mut map = self.extract_deterministic(text);
        let Some(backend) = &self.backend else {
            return map;
        };

        let result = tokio::time::timeout(self.timeout, backend.extract_open_domain(text))
            .await
            .unwrap_or_else(|_| Err(ParleyError::BackendTimeout(self.timeout.as_millis() as u64)));

        match result {
            Ok(found) => {
                let accepted = fill_gaps(&map, found);
                debug!(
                    backend = backend.name(),
                    accepted = accepted.len(),
                    "Open-domain entities merged"
                );
                map.extend(accepted);
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "Open-domain extraction failed, using deterministic entities");
            }
        }
        map
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default())
    }
}

/// Keep backend entities whose type the deterministic layer did not produce
/// and whose span does not overlap a deterministic entity.
fn fill_gaps(deterministic: &EntityMap, found: Vec<Entity>) -> Vec<Entity> {
    let taken: Vec<EntityType> = deterministic.types().collect();
    found
        .into_iter()
        .filter(|e| !taken.contains(&e.entity_type))
        .filter(|e| match e.span {
            Some(span) => !deterministic
                .iter()
                .any(|d| d.span.is_some_and(|s| s.overlaps(&span))),
            None => true,
        })
        .collect()
}

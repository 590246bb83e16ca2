use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Top-level configuration for Parley.
///
/// Loaded from `~/.parley/config.toml` by the binary. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

impl ParleyConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing,
    /// unparsable, or fails validation.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        let unit_fields = [
            ("classifier.acceptance_threshold", c.acceptance_threshold),
            ("classifier.ambiguity_margin", c.ambiguity_margin),
            ("classifier.pattern_weight", c.pattern_weight),
            ("classifier.multi_pattern_bonus", c.multi_pattern_bonus),
            ("classifier.keyword_weight", c.keyword_weight),
            ("classifier.max_keyword_score", c.max_keyword_score),
            ("classifier.required_entity_weight", c.required_entity_weight),
            ("classifier.optional_entity_weight", c.optional_entity_weight),
            ("classifier.follow_up_boost", c.follow_up_boost),
            ("classifier.length_penalty", c.length_penalty),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ParleyError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.context.history_len == 0 {
            return Err(ParleyError::Config(
                "context.history_len must be at least 1".to_string(),
            ));
        }
        if self.extractor.backend_timeout_ms == 0 {
            return Err(ParleyError::Config(
                "extractor.backend_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Entity extractor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Run the open-domain layer after the deterministic matchers.
    pub open_domain_enabled: bool,
    /// Upper bound on a single open-domain backend call.
    pub backend_timeout_ms: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            open_domain_enabled: true,
            backend_timeout_ms: 250,
        }
    }
}

/// Intent classifier weights and decision thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Below this, the top candidate is not considered classified.
    pub acceptance_threshold: f32,
    /// Minimum gap between the top two candidates to accept the top one.
    pub ambiguity_margin: f32,
    /// Score per distinct matched pattern.
    pub pattern_weight: f32,
    /// Added once when more than one pattern of an intent matches.
    pub multi_pattern_bonus: f32,
    /// Score per matched keyword.
    pub keyword_weight: f32,
    /// Cap on the summed keyword score.
    pub max_keyword_score: f32,
    /// Score per present entity type the intent requires.
    pub required_entity_weight: f32,
    /// Score per present entity type the intent accepts optionally.
    pub optional_entity_weight: f32,
    /// Added to the prior turn's intent when the utterance is a follow-up.
    pub follow_up_boost: f32,
    /// Token count that carries no length penalty.
    pub length_free_tokens: usize,
    /// Penalty factor per token beyond `length_free_tokens`.
    pub length_penalty: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.40,
            ambiguity_margin: 0.15,
            pattern_weight: 0.35,
            multi_pattern_bonus: 0.10,
            keyword_weight: 0.10,
            max_keyword_score: 0.30,
            required_entity_weight: 0.20,
            optional_entity_weight: 0.10,
            follow_up_boost: 0.40,
            length_free_tokens: 8,
            length_penalty: 0.03,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Number of resolved turns kept in history.
    pub history_len: usize,
    /// Memory older than this is stale and never substituted.
    pub recency_window_secs: u64,
    /// A session idle longer than this starts over with a fresh context.
    pub session_timeout_minutes: u32,
    /// How long a pending clarification waits for its reply.
    pub clarification_timeout_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_len: 10,
            recency_window_secs: 300,
            session_timeout_minutes: 30,
            clarification_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ParleyConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.extractor.open_domain_enabled);
        assert_eq!(config.extractor.backend_timeout_ms, 250);
        assert!((config.classifier.acceptance_threshold - 0.40).abs() < f32::EPSILON);
        assert!((config.classifier.ambiguity_margin - 0.15).abs() < f32::EPSILON);
        assert_eq!(config.context.history_len, 10);
        assert_eq!(config.context.recency_window_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config(
            r#"
[classifier]
ambiguity_margin = 0.2

[context]
history_len = 4
"#,
        );
        let config = ParleyConfig::load(file.path()).unwrap();
        assert!((config.classifier.ambiguity_margin - 0.2).abs() < f32::EPSILON);
        assert!((config.classifier.acceptance_threshold - 0.40).abs() < f32::EPSILON);
        assert_eq!(config.context.history_len, 4);
        assert_eq!(config.context.recency_window_secs, 300);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = ParleyConfig::load(file.path()).unwrap();
        assert_eq!(config, ParleyConfig::default());
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is not [valid toml");
        assert!(ParleyConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_out_of_range_threshold() {
        let file = create_temp_config("[classifier]\nacceptance_threshold = 1.5\n");
        let err = ParleyConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("acceptance_threshold"));
    }

    #[test]
    fn test_validate_rejects_zero_history() {
        let mut config = ParleyConfig::default();
        config.context.history_len = 0;
        assert!(matches!(config.validate(), Err(ParleyError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_backend_timeout() {
        let mut config = ParleyConfig::default();
        config.extractor.backend_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = ParleyConfig::load_or_default(Path::new("/nonexistent/parley.toml"));
        assert_eq!(config, ParleyConfig::default());
    }

    #[test]
    fn test_load_or_default_invalid_values() {
        let file = create_temp_config("[context]\nhistory_len = 0\n");
        let config = ParleyConfig::load_or_default(file.path());
        assert_eq!(config.context.history_len, 10);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ParleyConfig::default();
        config.context.recency_window_secs = 120;
        config.extractor.open_domain_enabled = false;
        config.save(&path).unwrap();

        let loaded = ParleyConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}

//! CLI argument definitions for the Parley binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Parley: turns utterances into structured commands, one JSON object per line.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Context snapshot to import at start and export on exit.
    #[arg(short = 's', long = "snapshot")]
    pub snapshot: Option<PathBuf>,

    /// Write the default configuration to the config path and exit.
    #[arg(long = "init-config")]
    pub init_config: bool,

    /// Utterances to resolve in order. Reads stdin when empty.
    pub utterances: Vec<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > ~/.parley/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter directive.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_and_utterances() {
        let args = CliArgs::parse_from([
            "parley",
            "--config",
            "/tmp/parley.toml",
            "-l",
            "debug",
            "Play some jazz",
            "Play something different",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/parley.toml"));
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert_eq!(args.utterances.len(), 2);
        assert!(!args.init_config);
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let args = CliArgs::parse_from(["parley"]);
        assert_eq!(args.resolve_log_level("warn"), "warn");
        assert!(args.utterances.is_empty());
        assert!(args.snapshot.is_none());
    }
}

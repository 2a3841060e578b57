//! Configuration management for the agenda assistant.
//!
//! Configuration is a single TOML document with four sections. Every field has
//! a default, so a missing file (or a file with only some keys) is fine.
//!
//! ## Resolution order
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory, or `$AGENDA_CONFIG_DIR`
//! 3. Environment variables: `AGENDA_DATA_DIR`, `AGENDA_DB_PATH`,
//!    `GEMINI_API_KEY`, `AGENDA_SEMANTIC_CACHE`
//!
//! ## Example
//!
//! ```toml
//! [llm]
//! primary_model = "gemini-2.0-flash"
//! timeout_secs = 30
//!
//! [database]
//! path = "/srv/agenda/agenda.db"
//!
//! [cache]
//! semantic_enabled = false
//!
//! [pipeline]
//! max_refinements = 2
//! ```
//!
//! ```rust
//! use agenda_core::AgendaConfig;
//!
//! let config: AgendaConfig = toml::from_str("[pipeline]\nmax_refinements = 2")?;
//! assert_eq!(config.pipeline.max_refinements, 2);
//! assert_eq!(config.pipeline.max_history, 10);
//! # Ok::<(), toml::de::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "agenda.db";
const SEMANTIC_CACHE_FILE: &str = "semantic_cache.json";
const STRATEGY_CACHE_FILE: &str = "strategy_cache.json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgendaConfig {
    /// Language model client settings.
    pub llm: LlmConfig,
    /// Contact database settings.
    pub database: DatabaseConfig,
    /// Cache sizing, expiry and persistence.
    pub cache: CacheConfig,
    /// Orchestrator limits.
    pub pipeline: PipelineConfig,
}

/// Gemini client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model tried first.
    pub primary_model: String,
    /// Model tried once when the primary fails.
    pub fallback_model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Default output token cap for the primary model.
    pub max_output_tokens: u32,
    /// Output token ceiling for the fallback model.
    pub fallback_max_output_tokens: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// REST endpoint root, without the `models/...` suffix.
    pub base_url: String,
    /// API key. `GEMINI_API_KEY` takes precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary_model: "gemini-2.0-flash".to_string(),
            fallback_model: "gemini-1.5-flash".to_string(),
            temperature: 0.2,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 2048,
            fallback_max_output_tokens: 1024,
            timeout_secs: 60,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
        }
    }
}

/// Contact database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Contacts table.
    pub table: String,
    /// Distinct names included in the schema preview.
    pub preview_limit: usize,
    /// Example rows included in the schema preview.
    pub example_limit: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join(DATABASE_FILE),
            table: "contactos".to_string(),
            preview_limit: 20,
            example_limit: 3,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the semantic result cache is consulted at all.
    pub semantic_enabled: bool,
    /// Semantic cache capacity.
    pub semantic_max_size: usize,
    /// Semantic cache TTL in seconds; `0` disables expiry.
    pub semantic_ttl_secs: u64,
    /// Strategy cache capacity.
    pub strategy_max_size: usize,
    /// Minimum seconds between opportunistic saves.
    pub save_interval_secs: u64,
    /// Semantic cache file.
    pub semantic_file: PathBuf,
    /// Strategy cache file.
    pub strategy_file: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let cache_dir = default_data_dir().join("cache");
        Self {
            semantic_enabled: true,
            semantic_max_size: 100,
            semantic_ttl_secs: 86_400,
            strategy_max_size: 200,
            save_interval_secs: 300,
            semantic_file: cache_dir.join(SEMANTIC_CACHE_FILE),
            strategy_file: cache_dir.join(STRATEGY_CACHE_FILE),
        }
    }
}

/// Orchestrator limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Automatic refinement attempts per query.
    pub max_refinements: u32,
    /// Conversation turns kept for context.
    pub max_history: usize,
    /// Rows embedded in search, evaluation and response prompts.
    pub max_results_display: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_refinements: 1,
            max_history: 10,
            max_results_display: 50,
        }
    }
}

impl AgendaConfig {
    /// Load from the default location, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    ///
    /// Environment overrides are not applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Location of `config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error when no config directory can be determined.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(dir) = env_value("AGENDA_CONFIG_DIR") {
            return Ok(PathBuf::from(dir).join(CONFIG_FILE));
        }

        directories::ProjectDirs::from("org", "agenda", "agenda")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))
    }

    /// Apply `AGENDA_*` and `GEMINI_API_KEY` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(env_value);
    }

    /// Apply overrides read through `lookup`.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("AGENDA_DATA_DIR") {
            let dir = PathBuf::from(dir);
            self.database.path = dir.join(DATABASE_FILE);
            self.cache.semantic_file = dir.join("cache").join(SEMANTIC_CACHE_FILE);
            self.cache.strategy_file = dir.join("cache").join(STRATEGY_CACHE_FILE);
        }

        if let Some(path) = lookup("AGENDA_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.llm.api_key = Some(key);
        }

        if let Some(flag) = lookup("AGENDA_SEMANTIC_CACHE") {
            self.cache.semantic_enabled = !matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Platform data directory for the database and cache files.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "agenda", "agenda").map_or_else(
        || {
            directories::BaseDirs::new().map_or_else(
                || PathBuf::from(".agenda"),
                |base| base.home_dir().join(".agenda"),
            )
        },
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_values() {
        let config = AgendaConfig::default();
        assert_eq!(config.llm.primary_model, "gemini-2.0-flash");
        assert_eq!(config.llm.fallback_model, "gemini-1.5-flash");
        assert_eq!(config.llm.max_output_tokens, 2048);
        assert_eq!(config.llm.fallback_max_output_tokens, 1024);
        assert_eq!(config.database.table, "contactos");
        assert_eq!(config.cache.semantic_max_size, 100);
        assert_eq!(config.cache.semantic_ttl_secs, 86_400);
        assert_eq!(config.cache.strategy_max_size, 200);
        assert_eq!(config.pipeline.max_refinements, 1);
        assert_eq!(config.pipeline.max_history, 10);
        assert!(config.cache.semantic_enabled);
    }

    #[test]
    fn test_config_load_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = AgendaConfig::load_from(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config, AgendaConfig::default());
    }

    #[test]
    fn test_config_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[llm]\ntimeout_secs = 15\n\n[cache]\nsemantic_enabled = false\n",
        )
        .unwrap();

        let config = AgendaConfig::load_from(&path).unwrap();
        assert_eq!(config.llm.timeout_secs, 15);
        assert_eq!(config.llm.top_k, 40);
        assert!(!config.cache.semantic_enabled);
        assert_eq!(config.cache.semantic_max_size, 100);
    }

    #[test]
    fn test_config_parse_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();

        match AgendaConfig::load_from(&path) {
            Err(Error::Config(msg)) => assert!(msg.contains("Failed to parse config")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AGENDA_DATA_DIR", "/tmp/agenda"),
            ("GEMINI_API_KEY", "secret"),
            ("AGENDA_SEMANTIC_CACHE", "off"),
        ]);
        let mut config = AgendaConfig::default();
        config.apply_overrides_from(|name| env.get(name).map(ToString::to_string));

        assert_eq!(config.database.path, PathBuf::from("/tmp/agenda/agenda.db"));
        assert_eq!(
            config.cache.strategy_file,
            PathBuf::from("/tmp/agenda/cache/strategy_cache.json")
        );
        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        assert!(!config.cache.semantic_enabled);
    }

    #[test]
    fn test_db_path_override_wins_over_data_dir() {
        let mut config = AgendaConfig::default();
        config.apply_overrides_from(|name| match name {
            "AGENDA_DATA_DIR" => Some("/data".to_string()),
            "AGENDA_DB_PATH" => Some("/elsewhere/contacts.db".to_string()),
            _ => None,
        });
        assert_eq!(config.database.path, PathBuf::from("/elsewhere/contacts.db"));
    }

    #[test]
    fn test_semantic_cache_flag_accepts_truthy_values() {
        let mut config = AgendaConfig::default();
        config.cache.semantic_enabled = false;
        config.apply_overrides_from(|name| (name == "AGENDA_SEMANTIC_CACHE").then(|| "1".to_string()));
        assert!(config.cache.semantic_enabled);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = AgendaConfig::default();
        config.pipeline.max_refinements = 3;
        config.llm.api_key = Some("k".into());
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AgendaConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}

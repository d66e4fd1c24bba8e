use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{LoreError, Result};
use crate::memory::decay::DecayConfig;

/// Main configuration structure for lore
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database location and connection settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Confidence decay tuning
    #[serde(default)]
    pub decay: DecayConfig,
    /// Scoring, ranking and budget settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Active learning loop settings
    #[serde(default)]
    pub learning: LearningConfig,
    /// Similarity search backend
    #[serde(default)]
    pub vector: VectorConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all lore data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite file name inside `data_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// How long a writer waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".lore"))
        .unwrap_or_else(|| PathBuf::from(".lore"))
}

fn default_database_file() -> String {
    "lore.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Retrieval configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of decayed confidence in the base score
    #[serde(default = "default_confidence_weight")]
    pub confidence_weight: f64,
    /// Weight of focus/topic overlap in the base score
    #[serde(default = "default_topic_weight")]
    pub topic_weight: f64,
    /// Subtracted once per already-selected result of the same type
    #[serde(default = "default_diversity_penalty")]
    pub diversity_penalty: f64,
    /// Default token budget for a retrieval
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Rows pulled from the store before scoring
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            confidence_weight: default_confidence_weight(),
            topic_weight: default_topic_weight(),
            diversity_penalty: default_diversity_penalty(),
            token_budget: default_token_budget(),
            candidate_limit: default_candidate_limit(),
        }
    }
}

fn default_confidence_weight() -> f64 {
    0.6
}

fn default_topic_weight() -> f64 {
    0.4
}

fn default_diversity_penalty() -> f64 {
    0.05
}

fn default_token_budget() -> usize {
    2000
}

fn default_candidate_limit() -> usize {
    200
}

/// Active learning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LearningConfig {
    /// Added to confidence on confirm
    #[serde(default = "default_confirmation_boost")]
    pub confirmation_boost: f64,
    /// Fraction of confidence removed on reject
    #[serde(default = "default_rejection_penalty")]
    pub rejection_penalty: f64,
    /// Added to confidence on modify
    #[serde(default = "default_modification_boost")]
    pub modification_boost: f64,
    /// A rejected memory at or below this confidence is archived
    #[serde(default = "default_archival_floor")]
    pub archival_floor: f64,
    /// Hours a validated memory stays out of candidate selection
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: u64,
    /// Entries kept in the cooldown map
    #[serde(default = "default_cooldown_capacity")]
    pub cooldown_capacity: usize,
    /// Upper confidence bound for candidate selection
    #[serde(default = "default_max_candidate_confidence")]
    pub max_candidate_confidence: f64,
    /// Candidates returned per selection
    #[serde(default = "default_learning_candidate_limit")]
    pub candidate_limit: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            confirmation_boost: default_confirmation_boost(),
            rejection_penalty: default_rejection_penalty(),
            modification_boost: default_modification_boost(),
            archival_floor: default_archival_floor(),
            cooldown_hours: default_cooldown_hours(),
            cooldown_capacity: default_cooldown_capacity(),
            max_candidate_confidence: default_max_candidate_confidence(),
            candidate_limit: default_learning_candidate_limit(),
        }
    }
}

/// Longest cooldown honoured, roughly a century
const MAX_COOLDOWN_HOURS: u64 = 876_000;

impl LearningConfig {
    pub fn cooldown_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cooldown_hours.min(MAX_COOLDOWN_HOURS) as i64)
    }
}

fn default_confirmation_boost() -> f64 {
    0.1
}

fn default_rejection_penalty() -> f64 {
    0.5
}

fn default_modification_boost() -> f64 {
    0.05
}

fn default_archival_floor() -> f64 {
    0.1
}

fn default_cooldown_hours() -> u64 {
    24
}

fn default_cooldown_capacity() -> usize {
    10_000
}

fn default_max_candidate_confidence() -> f64 {
    0.7
}

fn default_learning_candidate_limit() -> usize {
    10
}

/// Vector backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VectorConfig {
    /// Use the SQLite cosine index; when off, similarity search is a recency scan
    #[serde(default = "default_vector_enabled")]
    pub enabled: bool,
    /// Time allowed for a backend call before falling back
    #[serde(default = "default_vector_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: default_vector_enabled(),
            timeout_ms: default_vector_timeout_ms(),
        }
    }
}

fn default_vector_enabled() -> bool {
    true
}

fn default_vector_timeout_ms() -> u64 {
    2000
}

impl Config {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoreError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| LoreError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first config file found in the default locations, or defaults
    pub fn discover() -> Result<Self> {
        for path in Self::default_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load(&path);
            }
        }
        tracing::debug!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// `~/.lore/config.toml`, `<config dir>/lore/config.toml`, `./lore.toml`
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|h| h.join(".lore").join("config.toml")),
            dirs::config_dir().map(|c| c.join("lore").join("config.toml")),
            Some(PathBuf::from("lore.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.decay.validate()?;

        let retrieval = &self.retrieval;
        for (name, value) in [
            ("retrieval.confidence_weight", retrieval.confidence_weight),
            ("retrieval.topic_weight", retrieval.topic_weight),
            ("retrieval.diversity_penalty", retrieval.diversity_penalty),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(LoreError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if retrieval.token_budget == 0 {
            return Err(LoreError::Config(
                "retrieval.token_budget must be positive".to_string(),
            ));
        }

        let learning = &self.learning;
        for (name, value) in [
            ("learning.confirmation_boost", learning.confirmation_boost),
            ("learning.rejection_penalty", learning.rejection_penalty),
            ("learning.modification_boost", learning.modification_boost),
            ("learning.archival_floor", learning.archival_floor),
            (
                "learning.max_candidate_confidence",
                learning.max_candidate_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LoreError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if learning.cooldown_capacity == 0 {
            return Err(LoreError::Config(
                "learning.cooldown_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

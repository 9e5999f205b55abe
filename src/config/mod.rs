//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional
//! `engram.toml` (working directory first, then the platform config
//! directory), then `ENGRAM_*` environment variables. String values may
//! reference environment variables with `${VAR}` syntax.

use crate::models::{KnowledgeType, SemanticType, default_consistency_table};
use crate::models::HealthStatus;
use crate::{Error, Result};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Tolerance when checking that hybrid weights sum to 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Expands environment variable references in a string.
///
/// Supports `${VAR_NAME}` syntax. If the variable is not set, the original
/// reference is preserved.
///
/// Uses `Cow<str>` to avoid allocation when no expansion is needed.
fn expand_env_vars(input: &str) -> Cow<'_, str> {
    // Fast path: no ${} pattern at all
    if !input.contains("${") {
        return Cow::Borrowed(input);
    }

    let mut result = input.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let var_start = start + var_start;
        if let Some(var_end) = result[var_start..].find('}') {
            let var_end = var_start + var_end;
            let var_name = &result[var_start + 2..var_end];
            if let Ok(value) = std::env::var(var_name) {
                result.replace_range(var_start..=var_end, &value);
                start = var_start + value.len();
            } else {
                start = var_end + 1;
            }
        } else {
            break;
        }
    }

    Cow::Owned(result)
}

/// Weights of the hybrid ranking formula.
///
/// `final = alpha * sim + beta * lex + gamma * importance/100 + delta * recency`.
/// The four weights must sum to 1.0 (± 1e-6).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HybridWeights {
    /// Weight of normalized vector similarity.
    pub alpha: f64,
    /// Weight of normalized lexical score.
    pub beta: f64,
    /// Weight of importance.
    pub gamma: f64,
    /// Weight of recency decay.
    pub delta: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            alpha: 0.55,
            beta: 0.25,
            gamma: 0.15,
            delta: 0.05,
        }
    }
}

impl HybridWeights {
    /// Validates that the weights sum to 1.0.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when the sum is off by more than 1e-6
    /// or any weight is negative.
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("delta", self.delta),
        ] {
            if w.is_nan() || w < 0.0 {
                return Err(Error::Validation(format!(
                    "hybrid weight {name} must be non-negative, got {w}"
                )));
            }
        }
        let sum = self.alpha + self.beta + self.gamma + self.delta;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Validation(format!(
                "hybrid weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Resolved engram configuration.
#[derive(Debug, Clone)]
pub struct EngramConfig {
    /// Data directory (database, vector index snapshots).
    pub data_dir: PathBuf,
    /// SQLite database path.
    pub database_path: PathBuf,
    /// Embedding vector dimension. Changing it requires full re-embedding.
    pub embedding_dimension: usize,
    /// Embedding provider endpoint; absent means the deterministic
    /// hashed embedder is used.
    pub embedding_endpoint: Option<String>,
    /// Embedding provider credential (supports `${VAR}` references).
    pub embedding_api_key: Option<String>,
    /// Embedding provider request timeout.
    pub embedding_timeout_ms: u64,
    /// Bounded size of the embedding LRU cache.
    pub embedding_cache_entries: usize,
    /// Minimum acceptable cosine similarity.
    pub similarity_threshold: f64,
    /// Below this many hits the similarity threshold is relaxed.
    pub min_results: usize,
    /// Warm-cache entry TTL in seconds.
    pub cache_ttl_seconds: u64,
    /// Warm-cache key bound.
    pub cache_max_entries: usize,
    /// Token budget for assembled contexts.
    pub context_token_budget: usize,
    /// Hard cap on items per assembled context.
    pub max_items_per_context: usize,
    /// Hybrid ranking weights.
    pub hybrid_weights: HybridWeights,
    /// Inverted-file lists probed per vector query.
    pub ann_probes: usize,
    /// Minimum status that gets written to the health log.
    pub health_log_level: HealthStatus,
    /// User turns concatenated into the situation text.
    pub situation_turns: usize,
    /// Per-tool-call deadline.
    pub tool_timeout_ms: u64,
    /// Deadline for context assembly.
    pub assemble_timeout_ms: u64,
    /// `knowledge_type` → compatible `semantic_type` table.
    pub consistency: HashMap<KnowledgeType, SemanticType>,
    /// Config files that were loaded (for diagnostics).
    pub config_sources: Vec<PathBuf>,
}

impl Default for EngramConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(".engram");
        Self {
            database_path: data_dir.join("engram.db"),
            data_dir,
            embedding_dimension: 768,
            embedding_endpoint: None,
            embedding_api_key: None,
            embedding_timeout_ms: 10_000,
            embedding_cache_entries: 10_000,
            similarity_threshold: 0.7,
            min_results: 3,
            cache_ttl_seconds: 1_800,
            cache_max_entries: 256,
            context_token_budget: 8_192,
            max_items_per_context: 50,
            hybrid_weights: HybridWeights::default(),
            ann_probes: 10,
            health_log_level: HealthStatus::Healthy,
            situation_turns: 3,
            tool_timeout_ms: 30_000,
            assemble_timeout_ms: 60_000,
            consistency: default_consistency_table(),
            config_sources: Vec::new(),
        }
    }
}

/// On-disk configuration file shape. All fields optional; present fields
/// override the running defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    database_path: Option<PathBuf>,
    embedding_dimension: Option<usize>,
    similarity_threshold: Option<f64>,
    min_results: Option<usize>,
    cache_ttl_seconds: Option<u64>,
    cache_max_entries: Option<usize>,
    context_token_budget: Option<usize>,
    max_items_per_context: Option<usize>,
    ann_probes: Option<usize>,
    health_log_level: Option<String>,
    situation_turns: Option<usize>,
    tool_timeout_ms: Option<u64>,
    assemble_timeout_ms: Option<u64>,
    hybrid_weights: Option<HybridWeights>,
    embedding: Option<EmbeddingSection>,
    consistency: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingSection {
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout_ms: Option<u64>,
    cache_entries: Option<usize>,
}

impl EngramConfig {
    /// Loads configuration from defaults, files, and environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when a file is malformed or the merged
    /// configuration fails [`EngramConfig::validate`].
    pub fn load() -> Result<Self> {
        let mut candidates = vec![PathBuf::from("engram.toml")];
        if let Some(dirs) = directories::ProjectDirs::from("dev", "engram", "engram") {
            candidates.push(dirs.config_dir().join("engram.toml"));
        }
        Self::load_from(&candidates)
    }

    /// Loads configuration from an explicit candidate list plus the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` on malformed files or invalid values.
    pub fn load_from(candidates: &[PathBuf]) -> Result<Self> {
        let mut config = Self::default();

        for path in candidates {
            if !path.is_file() {
                continue;
            }
            let raw = std::fs::read_to_string(path)
                .map_err(|e| Error::internal("read_config", e))?;
            let file: ConfigFile = toml::from_str(&raw)
                .map_err(|e| Error::Validation(format!("{}: {e}", path.display())))?;
            config.apply_file(file)?;
            config.config_sources.push(path.clone());
        }

        config.apply_env()?;
        // A bare filename lands in the data directory; explicit paths
        // (absolute or with a directory component) are respected.
        if !config.database_path.is_absolute()
            && config
                .database_path
                .parent()
                .is_none_or(|p| p.as_os_str().is_empty())
        {
            config.database_path = config.data_dir.join(&config.database_path);
        }
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) -> Result<()> {
        if let Some(v) = file.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = file.database_path {
            self.database_path = v;
        }
        if let Some(v) = file.embedding_dimension {
            self.embedding_dimension = v;
        }
        if let Some(v) = file.similarity_threshold {
            self.similarity_threshold = v;
        }
        if let Some(v) = file.min_results {
            self.min_results = v;
        }
        if let Some(v) = file.cache_ttl_seconds {
            self.cache_ttl_seconds = v;
        }
        if let Some(v) = file.cache_max_entries {
            self.cache_max_entries = v;
        }
        if let Some(v) = file.context_token_budget {
            self.context_token_budget = v;
        }
        if let Some(v) = file.max_items_per_context {
            self.max_items_per_context = v;
        }
        if let Some(v) = file.ann_probes {
            self.ann_probes = v;
        }
        if let Some(v) = file.health_log_level {
            self.health_log_level = HealthStatus::from_str(&v)?;
        }
        if let Some(v) = file.situation_turns {
            self.situation_turns = v;
        }
        if let Some(v) = file.tool_timeout_ms {
            self.tool_timeout_ms = v;
        }
        if let Some(v) = file.assemble_timeout_ms {
            self.assemble_timeout_ms = v;
        }
        if let Some(v) = file.hybrid_weights {
            self.hybrid_weights = v;
        }
        if let Some(section) = file.embedding {
            if let Some(v) = section.endpoint {
                self.embedding_endpoint = Some(expand_env_vars(&v).into_owned());
            }
            if let Some(v) = section.api_key {
                self.embedding_api_key = Some(expand_env_vars(&v).into_owned());
            }
            if let Some(v) = section.timeout_ms {
                self.embedding_timeout_ms = v;
            }
            if let Some(v) = section.cache_entries {
                self.embedding_cache_entries = v;
            }
        }
        if let Some(table) = file.consistency {
            let mut parsed = HashMap::new();
            for (k, v) in table {
                parsed.insert(KnowledgeType::from_str(&k)?, SemanticType::from_str(&v)?);
            }
            self.consistency = parsed;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("ENGRAM_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ENGRAM_DATABASE") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ENGRAM_EMBEDDING_ENDPOINT") {
            self.embedding_endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("ENGRAM_EMBEDDING_API_KEY") {
            self.embedding_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("ENGRAM_EMBEDDING_DIMENSION") {
            self.embedding_dimension = v
                .parse()
                .map_err(|_| Error::Validation(format!("invalid ENGRAM_EMBEDDING_DIMENSION: {v}")))?;
        }
        if let Ok(v) = std::env::var("ENGRAM_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v
                .parse()
                .map_err(|_| Error::Validation(format!("invalid ENGRAM_SIMILARITY_THRESHOLD: {v}")))?;
        }
        if let Ok(v) = std::env::var("ENGRAM_CONTEXT_TOKEN_BUDGET") {
            self.context_token_budget = v
                .parse()
                .map_err(|_| Error::Validation(format!("invalid ENGRAM_CONTEXT_TOKEN_BUDGET: {v}")))?;
        }
        Ok(())
    }

    /// Validates the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when any option is out of its domain.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimension == 0 {
            return Err(Error::Validation(
                "embedding_dimension must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Validation(format!(
                "similarity_threshold must be in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.cache_max_entries == 0 {
            return Err(Error::Validation(
                "cache_max_entries must be positive".to_string(),
            ));
        }
        if self.embedding_cache_entries == 0 {
            return Err(Error::Validation(
                "embedding cache_entries must be positive".to_string(),
            ));
        }
        if self.max_items_per_context == 0 {
            return Err(Error::Validation(
                "max_items_per_context must be positive".to_string(),
            ));
        }
        if self.ann_probes == 0 {
            return Err(Error::Validation("ann_probes must be positive".to_string()));
        }
        if self.situation_turns == 0 {
            return Err(Error::Validation(
                "situation_turns must be positive".to_string(),
            ));
        }
        self.hybrid_weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngramConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding_dimension, 768);
        assert!((config.similarity_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.context_token_budget, 8_192);
        assert_eq!(config.cache_max_entries, 256);
    }

    #[test]
    fn test_weight_sum_enforced() {
        let mut weights = HybridWeights::default();
        assert!(weights.validate().is_ok());
        weights.alpha = 0.9;
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = HybridWeights {
            alpha: 1.2,
            beta: -0.2,
            gamma: 0.0,
            delta: 0.0,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_file_overrides() {
        let file: ConfigFile = toml::from_str(
            r#"
            embedding_dimension = 384
            similarity_threshold = 0.5

            [hybrid_weights]
            alpha = 0.4
            beta = 0.4
            gamma = 0.1
            delta = 0.1

            [consistency]
            technical = "technical_discovery"
            "#,
        )
        .unwrap();

        let mut config = EngramConfig::default();
        config.apply_file(file).unwrap();
        assert_eq!(config.embedding_dimension, 384);
        assert!((config.hybrid_weights.alpha - 0.4).abs() < f64::EPSILON);
        assert_eq!(
            config.consistency[&KnowledgeType::Technical],
            SemanticType::TechnicalDiscovery
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_env_vars_passthrough() {
        assert_eq!(expand_env_vars("no vars here"), "no vars here");
        assert_eq!(expand_env_vars("${ENGRAM_DOES_NOT_EXIST}"), "${ENGRAM_DOES_NOT_EXIST}");
    }

    #[test]
    fn test_bad_threshold_rejected() {
        let mut config = EngramConfig::default();
        config.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}

//! Configuration management for PaperScout
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{env}, config/local)
//! - Default values

use crate::models::Profile;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Interest profile used for relevance scoring
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Signal weights and thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Upstream paper source
    #[serde(default)]
    pub source: SourceConfig,

    /// Enrichment pipeline (acquire/extract/index)
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Embedding provider
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub interest_statements: Vec<String>,
}

impl ProfileConfig {
    /// Snapshot the configured profile as an immutable value.
    pub fn to_profile(&self) -> Profile {
        Profile::new(
            self.keywords.clone(),
            self.categories.clone(),
            self.interest_statements.clone(),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Weight of the keyword signal
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    /// Weight of the category signal
    #[serde(default = "default_category_weight")]
    pub category_weight: f64,

    /// Weight of the semantic signal
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,

    /// Scale applied to adjacent-category matches (same top-level archive)
    #[serde(default = "default_partial_category_factor")]
    pub partial_category_factor: f64,

    /// Papers scoring at or above this are enrichment-eligible
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Days to look back when discovering papers
    #[serde(default = "default_days_lookback")]
    pub days_lookback: u32,

    /// Maximum candidates fetched per run
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// HTTP timeout for source requests in seconds
    #[serde(default = "default_source_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentConfig {
    /// How far enrichment runs: off, acquire, extract, or index
    #[serde(default = "default_enrichment_depth")]
    pub depth: String,

    /// Concurrent enrichment workers (different papers only)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Politeness pacing: minimum interval between consecutive binary
    /// acquisitions from the external source, in milliseconds
    #[serde(default = "default_acquire_interval")]
    pub acquire_interval_ms: u64,

    /// Timeout for a single text-extraction call in seconds
    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai or hash (deterministic, offline)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for remote providers
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries per request
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_keyword_weight() -> f64 { 0.3 }
fn default_category_weight() -> f64 { 0.2 }
fn default_semantic_weight() -> f64 { 0.5 }
fn default_partial_category_factor() -> f64 { 0.5 }
fn default_min_relevance_score() -> f64 { 0.7 }
fn default_days_lookback() -> u32 { 7 }
fn default_max_results() -> usize { 200 }
fn default_source_timeout() -> u64 { 30 }
fn default_enrichment_depth() -> String { "index".to_string() }
fn default_workers() -> usize { 4 }
fn default_acquire_interval() -> u64 { 3000 }
fn default_extract_timeout() -> u64 { 60 }
fn default_embedding_provider() -> String { "hash".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 384 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "paperscout".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SCORING__MIN_RELEVANCE_SCORE=0.8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Check cross-field invariants the serde layer cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weight_sum = self.scoring.keyword_weight
            + self.scoring.category_weight
            + self.scoring.semantic_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Message(format!(
                "scoring weights must sum to 1.0, got {weight_sum}"
            )));
        }
        if !(0.0..=1.0).contains(&self.scoring.min_relevance_score) {
            return Err(ConfigError::Message(format!(
                "min_relevance_score must be in [0.0, 1.0], got {}",
                self.scoring.min_relevance_score
            )));
        }
        if !(0.0..=1.0).contains(&self.scoring.partial_category_factor) {
            return Err(ConfigError::Message(
                "partial_category_factor must be in [0.0, 1.0]".to_string(),
            ));
        }
        if self.enrichment.workers == 0 {
            return Err(ConfigError::Message(
                "enrichment.workers must be at least 1".to_string(),
            ));
        }
        match self.enrichment.depth.as_str() {
            "off" | "acquire" | "extract" | "index" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "enrichment.depth must be one of off/acquire/extract/index, got {other}"
                )))
            }
        }
        Ok(())
    }

    /// Politeness pacing interval as a Duration
    pub fn acquire_interval(&self) -> Duration {
        Duration::from_millis(self.enrichment.acquire_interval_ms)
    }

    /// Extraction timeout as a Duration
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment.extract_timeout_secs)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_keyword_weight(),
            category_weight: default_category_weight(),
            semantic_weight: default_semantic_weight(),
            partial_category_factor: default_partial_category_factor(),
            min_relevance_score: default_min_relevance_score(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            days_lookback: default_days_lookback(),
            max_results: default_max_results(),
            request_timeout_secs: default_source_timeout(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            depth: default_enrichment_depth(),
            workers: default_workers(),
            acquire_interval_ms: default_acquire_interval(),
            extract_timeout_secs: default_extract_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: ProfileConfig::default(),
            scoring: ScoringConfig::default(),
            source: SourceConfig::default(),
            enrichment: EnrichmentConfig::default(),
            embedding: EmbeddingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring.min_relevance_score, 0.7);
        assert_eq!(config.enrichment.depth, "index");
    }

    #[test]
    fn test_weight_sum_validation() {
        let mut config = AppConfig::default();
        config.scoring.keyword_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = AppConfig::default();
        config.enrichment.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_depth_rejected() {
        let mut config = AppConfig::default();
        config.enrichment.depth = "everything".into();
        assert!(config.validate().is_err());
    }
}

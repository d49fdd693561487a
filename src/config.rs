//! Configuration System
//!
//! Layered configuration: built-in defaults, the global config file, workspace config files,
//! then `EXAMFORGE__*` environment variables. Every section has serde defaults so a partial
//! file is always a valid configuration.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod loader;
mod merge;
mod sources;

pub use crate::provider::{ProviderConfig, ProviderKind};
pub use loader::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub research: ResearchSettings,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Global bound on concurrently executing pipelines
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Budget for research plus generation of one run
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    #[serde(default = "default_question_count")]
    pub default_question_count: u32,

    #[serde(default = "default_year")]
    pub default_year: u16,
}

fn default_max_concurrent_runs() -> usize {
    3
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_question_count() -> u32 {
    20
}

fn default_year() -> u16 {
    2025
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            run_timeout_secs: default_run_timeout_secs(),
            default_question_count: default_question_count(),
            default_year: default_year(),
        }
    }
}

/// Backoff settings shared by research and generation calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Proportional jitter in [0, 1)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,

    /// Database directory for the sled backend
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Sled
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".examforge/cache")
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            backend: default_cache_backend(),
            path: default_cache_path(),
        }
    }
}

/// Share of the question count assigned to one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionWeight {
    pub name: String,
    pub percent: u32,
}

impl SectionWeight {
    pub fn new(name: &str, percent: u32) -> Self {
        Self {
            name: name.to_string(),
            percent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Extra attempts after a validation failure
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,

    /// Accepted relative deviation from the requested count
    #[serde(default = "default_count_tolerance")]
    pub count_tolerance: f64,

    /// Requests above this count are generated in chunks
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: u32,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    #[serde(default = "default_sections")]
    pub sections: Vec<SectionWeight>,
}

fn default_max_regenerations() -> u32 {
    2
}

fn default_count_tolerance() -> f64 {
    0.10
}

fn default_chunk_threshold() -> u32 {
    15
}

fn default_chunk_size() -> u32 {
    8
}

fn default_sections() -> Vec<SectionWeight> {
    vec![
        SectionWeight::new("Quantitative Aptitude", 40),
        SectionWeight::new("Logical Reasoning", 35),
        SectionWeight::new("Verbal Ability", 25),
    ]
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_regenerations: default_max_regenerations(),
            count_tolerance: default_count_tolerance(),
            chunk_threshold: default_chunk_threshold(),
            chunk_size: default_chunk_size(),
            sections: default_sections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSettings {
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

fn default_min_content_chars() -> usize {
    200
}

fn default_min_words() -> usize {
    40
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            min_words: default_min_words(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_research_provider")]
    pub research: ProviderConfig,

    #[serde(default = "default_generation_provider")]
    pub generation: ProviderConfig,
}

fn default_research_provider() -> ProviderConfig {
    ProviderConfig::gemini("gemini-2.5-flash")
}

fn default_generation_provider() -> ProviderConfig {
    ProviderConfig::gemini("gemini-2.5-flash")
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            research: default_research_provider(),
            generation: default_generation_provider(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_pattern_data_max_chars")]
    pub pattern_data_max_chars: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".examforge/tests")
}

fn default_pattern_data_max_chars() -> usize {
    5000
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            pattern_data_max_chars: default_pattern_data_max_chars(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Pipeline(String),
    Retry(String),
    Cache(String),
    Generation(String),
    Provider(String, String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Pipeline(msg) => write!(f, "Pipeline: {}", msg),
            ValidationError::Retry(msg) => write!(f, "Retry: {}", msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ForgeConfig {
    /// Validate the entire configuration, collecting every violation
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.pipeline.max_concurrent_runs == 0 {
            errors.push(ValidationError::Pipeline(
                "max_concurrent_runs must be at least 1".to_string(),
            ));
        }
        if self.pipeline.run_timeout_secs == 0 {
            errors.push(ValidationError::Pipeline(
                "run_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            errors.push(ValidationError::Retry(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            errors.push(ValidationError::Retry(format!(
                "multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.retry.jitter) {
            errors.push(ValidationError::Retry(format!(
                "jitter must be in [0, 1), got {}",
                self.retry.jitter
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            errors.push(ValidationError::Retry(
                "base_delay_ms cannot exceed max_delay_ms".to_string(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            errors.push(ValidationError::Cache(
                "ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.cache.backend == CacheBackend::Sled && self.cache.path.as_os_str().is_empty() {
            errors.push(ValidationError::Cache(
                "path is required for the sled backend".to_string(),
            ));
        }

        let generation = &self.generation;
        if generation.chunk_size == 0 {
            errors.push(ValidationError::Generation(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&generation.count_tolerance) {
            errors.push(ValidationError::Generation(format!(
                "count_tolerance must be in [0, 1), got {}",
                generation.count_tolerance
            )));
        }
        if generation.sections.is_empty() {
            errors.push(ValidationError::Generation(
                "at least one section is required".to_string(),
            ));
        } else {
            let total: u32 = generation.sections.iter().map(|s| s.percent).sum();
            if total != 100 {
                errors.push(ValidationError::Generation(format!(
                    "section percentages must sum to 100, got {}",
                    total
                )));
            }
            if generation.sections.iter().any(|s| s.name.trim().is_empty()) {
                errors.push(ValidationError::Generation(
                    "section names cannot be empty".to_string(),
                ));
            }
        }

        for (name, provider) in [
            ("research", &self.providers.research),
            ("generation", &self.providers.generation),
        ] {
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(name.to_string(), e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

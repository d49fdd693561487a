//! Merge rules: defaults, override order, conflict handling.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Provider sections are seeded so that a single overridden field (for example
/// `EXAMFORGE__PROVIDERS__RESEARCH__MODEL`) still yields a complete provider entry.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("pipeline.max_concurrent_runs", 3)?
        .set_default("pipeline.run_timeout_secs", 300)?
        .set_default("cache.ttl_secs", 86_400)?
        .set_default("cache.backend", "sled")?
        .set_default("providers.research.kind", "gemini")?
        .set_default("providers.research.model", "gemini-2.5-flash")?
        .set_default("providers.research.api_key_env", "GEMINI_API_KEY")?
        .set_default("providers.generation.kind", "gemini")?
        .set_default("providers.generation.model", "gemini-2.5-flash")?
        .set_default("providers.generation.api_key_env", "GEMINI_API_KEY")
}

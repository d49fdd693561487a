//! Configuration loading from workspace files

use examforge::config::{CacheBackend, ConfigLoader, ProviderKind};
use std::fs;
use tempfile::TempDir;

fn write_workspace_config(dir: &TempDir, contents: &str) {
    let config_dir = dir.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_workspace_config_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    write_workspace_config(
        &dir,
        r#"
[pipeline]
max_concurrent_runs = 5
run_timeout_secs = 120

[cache]
backend = "sled"
ttl_secs = 3600

[providers.research]
kind = "openai_compatible"
model = "sonar-pro"
endpoint = "https://api.perplexity.ai"
api_key_env = "PERPLEXITY_API_KEY"
"#,
    );

    let config = ConfigLoader::load(dir.path()).unwrap();
    assert_eq!(config.pipeline.max_concurrent_runs, 5);
    assert_eq!(config.pipeline.run_timeout_secs, 120);
    assert_eq!(config.cache.backend, CacheBackend::Sled);
    assert_eq!(config.cache.ttl_secs, 3600);
    assert_eq!(config.providers.research.kind, ProviderKind::OpenaiCompatible);
    assert_eq!(config.providers.research.model, "sonar-pro");
    // Untouched sections keep their defaults
    assert_eq!(config.generation.max_regenerations, 2);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.providers.generation.kind, ProviderKind::Gemini);
}

#[test]
fn test_invalid_values_are_all_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("examforge.toml");
    fs::write(
        &path,
        r#"
[pipeline]
max_concurrent_runs = 0

[generation]
count_tolerance = 2.5
"#,
    )
    .unwrap();

    let err = ConfigLoader::load_from_file(&path).unwrap_err();
    assert_eq!(err.code(), "CONFIG_ERROR");
    let message = err.to_string();
    assert!(message.contains("max_concurrent_runs"));
    assert!(message.contains("count_tolerance"));
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::load_from_file(&dir.path().join("nope.toml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

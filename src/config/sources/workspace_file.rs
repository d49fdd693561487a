//! Workspace config sources: examforge.toml, config/config.toml and config/{env}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};

/// Name of the optional single-file config at the workspace root
pub const ROOT_CONFIG_FILE: &str = "examforge.toml";

/// Candidate files in ascending precedence. Missing files are skipped.
pub fn candidate_paths(workspace_root: &Path) -> Vec<PathBuf> {
    let env_name = std::env::var("EXAMFORGE_ENV").unwrap_or_else(|_| "development".to_string());
    let config_dir = workspace_root.join("config");
    vec![
        workspace_root.join(ROOT_CONFIG_FILE),
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", env_name)),
    ]
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = candidate_paths(workspace_root)
        .into_iter()
        .filter(|path| path.is_file())
        .fold(builder, |builder, path| {
            builder.add_source(File::from(path.as_path()).required(false))
        });
    Ok(builder)
}

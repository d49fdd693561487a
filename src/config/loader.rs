//! Config loading: merges sources in precedence order and validates the result.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::ForgeConfig;
use crate::error::PipelineError;
use config::File;
use std::path::Path;
use tracing::debug;

/// Loads [`ForgeConfig`] from the layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file, workspace files, then environment
    pub fn load(workspace_root: &Path) -> Result<ForgeConfig, PipelineError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        Self::finish(builder.build()?)
    }

    /// Defaults plus one explicit file, then environment
    pub fn load_from_file(path: &Path) -> Result<ForgeConfig, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder);
        Self::finish(builder.build()?)
    }

    fn finish(raw: config::Config) -> Result<ForgeConfig, PipelineError> {
        let config: ForgeConfig = raw.try_deserialize()?;
        config.validate().map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            PipelineError::Config(joined)
        })?;
        debug!(
            max_concurrent_runs = config.pipeline.max_concurrent_runs,
            cache_backend = ?config.cache.backend,
            "Configuration loaded"
        );
        Ok(config)
    }
}

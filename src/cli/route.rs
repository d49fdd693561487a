//! CLI route: single route table and run context. Dispatches to the orchestrator and presentation.

use crate::cache::TieredCache;
use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation;
use crate::company::CompanyTable;
use crate::config::{CacheBackend, ConfigLoader, ForgeConfig};
use crate::error::PipelineError;
use crate::model::GenerationRequest;
use crate::persistence::{PersistenceGateway, SledTestStore};
use crate::pipeline::{PipelineOrchestrator, PipelineStatistics};
use crate::types::TestId;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Runtime context for CLI execution: workspace root and loaded configuration.
///
/// Provider clients are only built for commands that call them, so read-only commands work
/// without API keys.
pub struct RunContext {
    workspace_root: PathBuf,
    config: ForgeConfig,
}

impl RunContext {
    /// Load configuration for `workspace_root`, or from `config_path` when given
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let mut config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config.storage.db_path = resolve_path(&workspace_root, &config.storage.db_path);
        config.cache.path = resolve_path(&workspace_root, &config.cache.path);
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Execute a command and return its rendered output
    pub async fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        let start = Instant::now();
        let result = match command {
            Commands::Generate {
                company,
                year,
                count,
                force,
                format,
            } => {
                self.handle_generate(company, *year, *count, *force, *format)
                    .await
            }
            Commands::Batch {
                companies,
                year,
                count,
                force,
                format,
            } => {
                self.handle_batch(companies, *year, *count, *force, *format)
                    .await
            }
            Commands::Show {
                test_id,
                answers,
                format,
            } => self.handle_show(*test_id, *answers, *format).await,
            Commands::Stats { format } => self.handle_stats(*format).await,
            Commands::Invalidate {
                company,
                year,
                count,
                research,
                expired,
            } => self.handle_invalidate(company.as_deref(), *year, *count, *research, *expired),
            Commands::Companies { format } => {
                presentation::format_companies(CompanyTable::builtin()?, *format)
            }
        };
        info!(
            ok = result.is_ok(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn build_request(
        &self,
        company: &str,
        year: Option<u16>,
        count: Option<u32>,
        force: bool,
    ) -> Result<GenerationRequest, PipelineError> {
        Ok(GenerationRequest::new(
            company,
            year.unwrap_or(self.config.pipeline.default_year),
            count.unwrap_or(self.config.pipeline.default_question_count),
            CompanyTable::builtin()?,
        )?
        .with_force_regenerate(force))
    }

    async fn handle_generate(
        &self,
        company: &str,
        year: Option<u16>,
        count: Option<u32>,
        force: bool,
        format: OutputFormat,
    ) -> Result<String, PipelineError> {
        let request = self.build_request(company, year, count, force)?;
        let orchestrator = PipelineOrchestrator::from_config(&self.config)?;
        let report = orchestrator.generate_sync(request).await?;
        presentation::format_generate_result(&report, format)
    }

    async fn handle_batch(
        &self,
        companies: &[String],
        year: Option<u16>,
        count: Option<u32>,
        force: bool,
        format: OutputFormat,
    ) -> Result<String, PipelineError> {
        let requests = companies
            .iter()
            .map(|company| self.build_request(company, year, count, force))
            .collect::<Result<Vec<_>, _>>()?;
        let orchestrator = PipelineOrchestrator::from_config(&self.config)?;
        let report = orchestrator.generate_batch(requests).await;
        presentation::format_batch_result(&report, format)
    }

    async fn handle_show(
        &self,
        test_id: u64,
        answers: bool,
        format: OutputFormat,
    ) -> Result<String, PipelineError> {
        let store = self.open_store()?;
        match store.get_test(TestId(test_id)).await? {
            Some(artifact) => presentation::format_test(&artifact, answers, format),
            None => Err(PipelineError::InvalidRequest(format!(
                "test {} does not exist",
                test_id
            ))),
        }
    }

    async fn handle_stats(&self, format: OutputFormat) -> Result<String, PipelineError> {
        let store = self.open_store()?;
        let cache = TieredCache::from_settings(&self.config.cache)?;
        let stats = PipelineStatistics {
            store: store.statistics().await?,
            research_cache: cache.research_stats(),
            artifact_cache: cache.artifact_stats(),
            research_entries: cache.research_entries()?,
            artifact_entries: cache.artifact_entries()?,
            in_flight: 0,
            executing: 0,
            pool_size: self.config.pipeline.max_concurrent_runs,
        };
        presentation::format_statistics(&stats, format)
    }

    fn handle_invalidate(
        &self,
        company: Option<&str>,
        year: Option<u16>,
        count: Option<u32>,
        research: bool,
        expired: bool,
    ) -> Result<String, PipelineError> {
        let cache = self.open_durable_cache()?;
        if expired {
            let purged = cache.purge_expired()?;
            return Ok(format!("Purged {} expired cache entries", purged));
        }

        let company = company.ok_or_else(|| {
            PipelineError::InvalidRequest("company is required unless --expired is set".to_string())
        })?;
        let request = self.build_request(company, year, count, false)?;
        let mut removed = cache.invalidate_artifact(&request.fingerprint())?;
        if research {
            removed |= cache.invalidate_research(request.normalized_company(), request.year())?;
        }
        Ok(if removed {
            format!("Invalidated cache entries for {} {}", request.company(), request.year())
        } else {
            format!("No cache entries for {} {}", request.company(), request.year())
        })
    }

    /// The configured cache, refusing backends that do not outlive this process
    fn open_durable_cache(&self) -> Result<TieredCache, PipelineError> {
        if self.config.cache.backend == CacheBackend::Memory {
            return Err(PipelineError::Config(
                "cache.backend is \"memory\"; there are no cache entries outside a running process"
                    .to_string(),
            ));
        }
        TieredCache::from_settings(&self.config.cache)
    }

    fn open_store(&self) -> Result<SledTestStore, PipelineError> {
        SledTestStore::open(
            &self.config.storage.db_path,
            self.config.storage.pattern_data_max_chars,
        )
    }
}

fn resolve_path(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}

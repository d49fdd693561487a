//! Pipeline Orchestrator
//!
//! Drives each fingerprint through cache check, research, generation, persistence and cache
//! population. Every entry point goes through the concurrency guard, so concurrent callers for
//! one fingerprint share a single run and observe the same terminal result.

pub mod state;

pub use state::{PipelineRun, PipelineState};

use crate::batch::{BatchReport, BatchScheduler};
use crate::cache::{CacheStats, EntryCounts, Fingerprint, TieredCache};
use crate::company::CompanyTable;
use crate::config::{ForgeConfig, PipelineSettings};
use crate::error::PipelineError;
use crate::guard::{ActiveRun, ConcurrencyGuard, Subscription};
use crate::model::{GenerationRequest, Question, ResearchOutput, TestArtifact};
use crate::persistence::{NewTest, PersistenceGateway, SledTestStore, StoreStatistics};
use crate::provider::ProviderFactory;
use crate::retry::RetryPolicy;
use crate::stage::{GenerationStage, ResearchStage};
use crate::types::{RunId, TestId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Successful terminal outcome of a request
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub artifact: Arc<TestArtifact>,
    pub fingerprint: Fingerprint,
    /// Run that produced the report; `None` for hits served before admission
    pub run_id: Option<RunId>,
    pub from_cache: bool,
    pub research_reused: bool,
    pub elapsed: Duration,
    /// Time spent in each pipeline state, in the order the run passed through them
    pub timings: Vec<(PipelineState, Duration)>,
}

pub type PipelineResult = Result<PipelineReport, PipelineError>;

/// Aggregate view over storage, cache tiers and the worker pool
#[derive(Debug, Clone)]
pub struct PipelineStatistics {
    pub store: StoreStatistics,
    pub research_cache: CacheStats,
    pub artifact_cache: CacheStats,
    pub research_entries: EntryCounts,
    pub artifact_entries: EntryCounts,
    pub in_flight: usize,
    pub executing: usize,
    pub pool_size: usize,
}

/// Everything a run needs, shared between the orchestrator and its spawned runs
pub struct PipelineContext {
    cache: TieredCache,
    research: ResearchStage,
    generation: GenerationStage,
    gateway: Arc<dyn PersistenceGateway>,
    companies: &'static CompanyTable,
    settings: PipelineSettings,
}

impl PipelineContext {
    pub fn new(
        cache: TieredCache,
        research: ResearchStage,
        generation: GenerationStage,
        gateway: Arc<dyn PersistenceGateway>,
        companies: &'static CompanyTable,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            cache,
            research,
            generation,
            gateway,
            companies,
            settings,
        }
    }

    async fn execute(&self, run_id: RunId, request: GenerationRequest) -> PipelineResult {
        let mut run = PipelineRun::new(run_id, request.fingerprint());
        match self.drive(&mut run, &request).await {
            Ok(report) => {
                info!(
                    run_id = %run_id,
                    company = %request.company(),
                    year = request.year(),
                    test_id = %report.artifact.test_id,
                    questions = report.artifact.question_count(),
                    from_cache = report.from_cache,
                    research_reused = report.research_reused,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Pipeline completed"
                );
                Ok(report)
            }
            Err(e) => {
                let failed_in = run.state();
                run.fail();
                error!(
                    run_id = %run_id,
                    company = %request.company(),
                    year = request.year(),
                    state = %failed_in,
                    code = e.code(),
                    error = %e,
                    elapsed_ms = run.elapsed().as_millis() as u64,
                    "Pipeline failed"
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        request: &GenerationRequest,
    ) -> PipelineResult {
        let fingerprint = request.fingerprint();
        run.advance(PipelineState::CacheCheck)?;

        // A run admitted after another run populated the cache ends here.
        if !request.force_regenerate() {
            if let Some(artifact) = self.cache.get_artifact(&fingerprint) {
                run.advance(PipelineState::Done)?;
                return Ok(PipelineReport {
                    artifact: Arc::new(artifact),
                    fingerprint,
                    run_id: Some(run.run_id()),
                    from_cache: true,
                    research_reused: false,
                    elapsed: run.elapsed(),
                    timings: run.timings().to_vec(),
                });
            }
        }

        run.advance(PipelineState::Research)?;
        let timeout_secs = self.settings.run_timeout_secs;
        let (research, research_reused, questions) = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.research_and_generate(run, request),
        )
        .await
        .map_err(|_| PipelineError::PipelineTimeout { timeout_secs })??;

        run.advance(PipelineState::Persist)?;
        let new_test = NewTest {
            company: request.company().to_string(),
            normalized_company: request.normalized_company().to_string(),
            year: request.year(),
            pattern_data: research.content,
        };
        let artifact = self.gateway.save_test(&new_test, &questions).await?;

        run.advance(PipelineState::CachePopulate)?;
        if let Err(e) = self.cache.put_artifact(&fingerprint, &artifact) {
            warn!(
                fingerprint = %fingerprint.short(),
                error = %e,
                "Failed to populate artifact cache"
            );
        }

        run.advance(PipelineState::Done)?;
        Ok(PipelineReport {
            artifact: Arc::new(artifact),
            fingerprint,
            run_id: Some(run.run_id()),
            from_cache: false,
            research_reused,
            elapsed: run.elapsed(),
            timings: run.timings().to_vec(),
        })
    }

    async fn research_and_generate(
        &self,
        run: &mut PipelineRun,
        request: &GenerationRequest,
    ) -> Result<(ResearchOutput, bool, Vec<Question>), PipelineError> {
        let profile = self.companies.resolve(request.company());
        let cached = if request.force_regenerate() {
            None
        } else {
            self.cache
                .get_research(request.normalized_company(), request.year())
        };

        let (research, reused) = match cached {
            Some(research) => {
                info!(
                    company = %request.normalized_company(),
                    year = request.year(),
                    "Reusing cached research"
                );
                (research, true)
            }
            None => {
                let research = self
                    .research
                    .run(request.company(), profile, request.year())
                    .await?;
                if let Err(e) = self.cache.put_research(
                    request.normalized_company(),
                    request.year(),
                    &research,
                ) {
                    warn!(error = %e, "Failed to populate research cache");
                }
                (research, false)
            }
        };

        run.advance(PipelineState::Generation)?;
        let display_name = profile.map_or(request.company(), |p| p.display_name);
        let questions = self
            .generation
            .run(
                display_name,
                request.year(),
                &research,
                request.question_count(),
            )
            .await?;
        Ok((research, reused, questions))
    }
}

enum HandleState {
    Ready(PipelineResult),
    Pending(Subscription<PipelineReport>),
}

/// Completion handle returned by [`PipelineOrchestrator::generate_async`].
///
/// Dropping it detaches the caller; the run continues for other subscribers.
pub struct GenerationHandle {
    fingerprint: Fingerprint,
    state: HandleState,
}

impl GenerationHandle {
    fn ready(fingerprint: Fingerprint, result: PipelineResult) -> Self {
        Self {
            fingerprint,
            state: HandleState::Ready(result),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn run_id(&self) -> Option<RunId> {
        match &self.state {
            HandleState::Ready(_) => None,
            HandleState::Pending(sub) => Some(sub.run_id()),
        }
    }

    /// Resolved without a run
    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// Attached to a run another caller started
    pub fn joined(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => false,
            HandleState::Pending(sub) => sub.joined(),
        }
    }

    pub async fn wait(self) -> PipelineResult {
        match self.state {
            HandleState::Ready(result) => result,
            HandleState::Pending(sub) => sub.wait().await,
        }
    }

    /// `None` when the wait timed out; the run is not cancelled
    pub async fn wait_timeout(self, timeout: Duration) -> Option<PipelineResult> {
        match self.state {
            HandleState::Ready(result) => Some(result),
            HandleState::Pending(sub) => sub.wait_timeout(timeout).await,
        }
    }
}

pub struct PipelineOrchestrator {
    ctx: Arc<PipelineContext>,
    guard: ConcurrencyGuard<PipelineReport>,
}

impl PipelineOrchestrator {
    /// Must be called from within a tokio runtime
    pub fn new(ctx: PipelineContext) -> Result<Self, PipelineError> {
        let guard = ConcurrencyGuard::start(ctx.settings.max_concurrent_runs)?;
        Ok(Self {
            ctx: Arc::new(ctx),
            guard,
        })
    }

    /// Wire providers, cache and storage from configuration
    pub fn from_config(config: &ForgeConfig) -> Result<Self, PipelineError> {
        config.validate().map_err(|errors| {
            PipelineError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        let companies = CompanyTable::builtin()?;
        let retry = RetryPolicy::from(&config.retry);
        let research = ResearchStage::new(
            ProviderFactory::research_client(&config.providers.research)?,
            retry.clone(),
            config.research.clone(),
        );
        let generation = GenerationStage::new(
            ProviderFactory::generation_client(&config.providers.generation)?,
            retry,
            config.generation.clone(),
        );
        let gateway = Arc::new(SledTestStore::open(
            &config.storage.db_path,
            config.storage.pattern_data_max_chars,
        )?);
        let cache = TieredCache::from_settings(&config.cache)?;

        Self::new(PipelineContext::new(
            cache,
            research,
            generation,
            gateway,
            companies,
            config.pipeline.clone(),
        ))
    }

    /// Validate raw input into a request
    pub fn request(
        &self,
        company: &str,
        year: u16,
        question_count: u32,
    ) -> Result<GenerationRequest, PipelineError> {
        GenerationRequest::new(company, year, question_count, self.ctx.companies)
    }

    pub fn companies(&self) -> &'static CompanyTable {
        self.ctx.companies
    }

    /// Submit a request and return immediately.
    ///
    /// Fresh artifact hits resolve without taking a pool slot.
    pub fn generate_async(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationHandle, PipelineError> {
        let fingerprint = request.fingerprint();
        let submitted = Instant::now();

        if !request.force_regenerate() {
            if let Some(artifact) = self.ctx.cache.get_artifact(&fingerprint) {
                info!(
                    company = %request.company(),
                    year = request.year(),
                    test_id = %artifact.test_id,
                    "Artifact cache hit"
                );
                return Ok(GenerationHandle::ready(
                    fingerprint,
                    Ok(PipelineReport {
                        artifact: Arc::new(artifact),
                        fingerprint,
                        run_id: None,
                        from_cache: true,
                        research_reused: false,
                        elapsed: submitted.elapsed(),
                        timings: Vec::new(),
                    }),
                ));
            }
        }

        let ctx = Arc::clone(&self.ctx);
        let subscription = self.guard.acquire_or_join(fingerprint, move |run_id| {
            Box::pin(async move { ctx.execute(run_id, request).await })
        })?;

        Ok(GenerationHandle {
            fingerprint,
            state: HandleState::Pending(subscription),
        })
    }

    /// Submit a request and wait for its terminal result
    pub async fn generate_sync(&self, request: GenerationRequest) -> PipelineResult {
        self.generate_async(request)?.wait().await
    }

    pub async fn generate_batch(&self, requests: Vec<GenerationRequest>) -> BatchReport {
        BatchScheduler::new(self).run(requests).await
    }

    /// Drop the cached artifact for `request`, and its research entry when `research` is set
    pub fn invalidate(
        &self,
        request: &GenerationRequest,
        research: bool,
    ) -> Result<bool, PipelineError> {
        let mut removed = self.ctx.cache.invalidate_artifact(&request.fingerprint())?;
        if research {
            removed |= self
                .ctx
                .cache
                .invalidate_research(request.normalized_company(), request.year())?;
        }
        info!(
            company = %request.normalized_company(),
            year = request.year(),
            removed,
            "Invalidated cache entries"
        );
        Ok(removed)
    }

    pub fn purge_expired(&self) -> Result<usize, PipelineError> {
        self.ctx.cache.purge_expired()
    }

    pub async fn get_test(&self, test_id: TestId) -> Result<Option<TestArtifact>, PipelineError> {
        self.ctx.gateway.get_test(test_id).await
    }

    pub async fn statistics(&self) -> Result<PipelineStatistics, PipelineError> {
        Ok(PipelineStatistics {
            store: self.ctx.gateway.statistics().await?,
            research_cache: self.ctx.cache.research_stats(),
            artifact_cache: self.ctx.cache.artifact_stats(),
            research_entries: self.ctx.cache.research_entries()?,
            artifact_entries: self.ctx.cache.artifact_entries()?,
            in_flight: self.guard.in_flight_count(),
            executing: self.guard.executing_count(),
            pool_size: self.guard.pool_size(),
        })
    }

    pub fn active_runs(&self) -> Vec<ActiveRun> {
        self.guard.active_runs()
    }

    pub fn subscriber_count(&self, request: &GenerationRequest) -> usize {
        self.guard.subscriber_count(&request.fingerprint())
    }
}

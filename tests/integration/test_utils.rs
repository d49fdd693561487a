//! Shared test utilities for integration tests
//!
//! Scripted research and generation capabilities with call counters, a concurrency tracker,
//! and a harness that wires them into an orchestrator backed by a temporary sled store.

use async_trait::async_trait;
use examforge::cache::{ManualClock, MemoryCacheStore, TieredCache};
use examforge::company::CompanyTable;
use examforge::config::{GenerationSettings, PipelineSettings, ResearchSettings};
use examforge::error::{CapabilityError, PipelineError};
use examforge::model::{Question, TestArtifact};
use examforge::persistence::{NewTest, PersistenceGateway, SledTestStore, StoreStatistics};
use examforge::pipeline::{PipelineContext, PipelineOrchestrator};
use examforge::provider::{
    GenerationCapability, GenerationPrompt, ResearchCapability, ResearchQuery, ResearchResponse,
};
use examforge::retry::RetryPolicy;
use examforge::stage::{GenerationStage, ResearchStage};
use examforge::types::TestId;
use examforge::GenerationRequest;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Research text long enough to pass content checks
pub fn research_text(company: &str) -> String {
    format!(
        "{} recruitment drives use an online test with quantitative aptitude, logical \
         reasoning and verbal ability sections. Candidates report time pressure in the \
         numerical section, data interpretation sets with tables, and reading comprehension \
         passages of moderate difficulty. Negative marking is not applied in recent years.",
        company
    )
}

/// Valid generation output honoring the prompt's count and section split
pub fn questions_json(prompt: &GenerationPrompt) -> String {
    let sections: Vec<_> = prompt
        .section_distribution
        .iter()
        .filter(|s| s.count > 0)
        .map(|s| {
            let questions: Vec<_> = (0..s.count)
                .map(|i| {
                    json!({
                        "question_text": format!("{} question {}: what is {} + {}?", s.name, i + 1, i, i),
                        "options": [
                            format!("{}", 2 * i),
                            format!("{}", 2 * i + 1),
                            format!("{}", 2 * i + 2),
                            format!("{}", 2 * i + 3)
                        ],
                        "correct_answer": "A",
                        "explanation": "Add the two numbers.",
                        "difficulty": "medium",
                    })
                })
                .collect();
            json!({ "section_name": s.name, "questions": questions })
        })
        .collect();
    json!({ "sections": sections }).to_string()
}

/// Copy of `prompt` asking for `n` fewer questions, taken from the last sections first
fn trimmed(prompt: &GenerationPrompt, mut n: u32) -> GenerationPrompt {
    let mut prompt = prompt.clone();
    for section in prompt.section_distribution.iter_mut().rev() {
        let take = n.min(section.count);
        section.count -= take;
        n -= take;
    }
    prompt
}

/// Tracks current and peak concurrency across calls
#[derive(Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Research double: scripted failures first, then valid text
#[derive(Default)]
pub struct ScriptedResearch {
    calls: AtomicU32,
    script: Mutex<VecDeque<Result<ResearchResponse, CapabilityError>>>,
    failing_companies: Vec<String>,
    delay: Duration,
    pub tracker: ConcurrencyTracker,
    queries: Mutex<Vec<String>>,
}

impl ScriptedResearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<Result<ResearchResponse, CapabilityError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail with an auth error whenever the query mentions `company`
    pub fn failing_for(mut self, company: &str) -> Self {
        self.failing_companies.push(company.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl ResearchCapability for ScriptedResearch {
    async fn research(&self, query: &ResearchQuery) -> Result<ResearchResponse, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.company_query.clone());
        self.tracker.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.tracker.exit();

        if self
            .failing_companies
            .iter()
            .any(|c| query.company_query.contains(c.as_str()))
        {
            return Err(CapabilityError::Auth("key revoked".to_string()));
        }
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(ResearchResponse {
                content: research_text(&query.company_query),
                citations: Vec::new(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted-research"
    }
}

/// Generation double: scripted raw outputs first, then valid JSON for the prompt
#[derive(Default)]
pub struct ScriptedGeneration {
    calls: AtomicU32,
    script: Mutex<VecDeque<Result<String, CapabilityError>>>,
    delay: Duration,
    invalid_companies: Vec<String>,
    short_by: u32,
    prompts: Mutex<Vec<GenerationPrompt>>,
}

impl ScriptedGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<Result<String, CapabilityError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Return output with no questions whenever the prompt mentions `company`
    pub fn invalid_for(mut self, company: &str) -> Self {
        self.invalid_companies.push(company.to_string());
        self
    }

    /// Always return `n` fewer questions than the prompt asks for
    pub fn short_by(mut self, n: u32) -> Self {
        self.short_by = n;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<GenerationPrompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerationCapability for ScriptedGeneration {
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self
            .invalid_companies
            .iter()
            .any(|c| prompt.prompt.contains(c.as_str()))
        {
            return Ok(r#"{"questions": []}"#.to_string());
        }
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None if self.short_by > 0 => Ok(questions_json(&trimmed(prompt, self.short_by))),
            None => Ok(questions_json(prompt)),
        }
    }

    fn name(&self) -> &str {
        "scripted-generation"
    }
}

/// Gateway whose `add_questions` always fails, wrapping a real store
pub struct FailingGateway {
    pub inner: SledTestStore,
    pub discarded: AtomicU32,
}

#[async_trait]
impl PersistenceGateway for FailingGateway {
    async fn create_test(&self, test: &NewTest) -> Result<TestId, PipelineError> {
        self.inner.create_test(test).await
    }

    async fn add_questions(
        &self,
        _test_id: TestId,
        _questions: &[Question],
    ) -> Result<(), PipelineError> {
        Err(PipelineError::Persistence("disk full".to_string()))
    }

    async fn discard_pending(&self, test_id: TestId) -> Result<(), PipelineError> {
        self.discarded.fetch_add(1, Ordering::SeqCst);
        self.inner.discard_pending(test_id).await
    }

    async fn get_test(&self, test_id: TestId) -> Result<Option<TestArtifact>, PipelineError> {
        self.inner.get_test(test_id).await
    }

    async fn statistics(&self) -> Result<StoreStatistics, PipelineError> {
        self.inner.statistics().await
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        self.inner.flush().await
    }
}

/// Retries without real waiting
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        multiplier: 2.0,
        max_delay: Duration::from_millis(5),
        jitter: 0.0,
    }
}

pub fn companies() -> &'static CompanyTable {
    CompanyTable::builtin().unwrap()
}

pub fn request(company: &str, year: u16, count: u32) -> GenerationRequest {
    GenerationRequest::new(company, year, count, companies()).unwrap()
}

/// Orchestrator plus handles on everything it was built from
pub struct Harness {
    pub orchestrator: PipelineOrchestrator,
    pub research: Arc<ScriptedResearch>,
    pub generation: Arc<ScriptedGeneration>,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

pub struct HarnessBuilder {
    research: ScriptedResearch,
    generation: ScriptedGeneration,
    settings: PipelineSettings,
    generation_settings: GenerationSettings,
    failing_gateway: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            research: ScriptedResearch::new(),
            generation: ScriptedGeneration::new(),
            settings: PipelineSettings::default(),
            generation_settings: GenerationSettings::default(),
            failing_gateway: false,
        }
    }

    pub fn research(mut self, research: ScriptedResearch) -> Self {
        self.research = research;
        self
    }

    pub fn generation(mut self, generation: ScriptedGeneration) -> Self {
        self.generation = generation;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.settings.max_concurrent_runs = size;
        self
    }

    pub fn run_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.run_timeout_secs = secs;
        self
    }

    pub fn generation_settings(mut self, settings: GenerationSettings) -> Self {
        self.generation_settings = settings;
        self
    }

    pub fn failing_gateway(mut self) -> Self {
        self.failing_gateway = true;
        self
    }

    pub fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = SledTestStore::open(dir.path().join("tests"), 5000).unwrap();
        let gateway: Arc<dyn PersistenceGateway> = if self.failing_gateway {
            Arc::new(FailingGateway {
                inner: store,
                discarded: AtomicU32::new(0),
            })
        } else {
            Arc::new(store)
        };

        let clock = Arc::new(ManualClock::default());
        let cache = TieredCache::new(
            Arc::new(MemoryCacheStore::new()),
            clock.clone(),
            Duration::from_secs(24 * 60 * 60),
        );

        let research = Arc::new(self.research);
        let generation = Arc::new(self.generation);
        let ctx = PipelineContext::new(
            cache,
            ResearchStage::new(research.clone(), fast_retry(), ResearchSettings::default()),
            GenerationStage::new(generation.clone(), fast_retry(), self.generation_settings),
            gateway,
            companies(),
            self.settings,
        );

        Harness {
            orchestrator: PipelineOrchestrator::new(ctx).unwrap(),
            research,
            generation,
            clock,
            _dir: dir,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

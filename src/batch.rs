//! Batch Scheduler: fan a list of requests out to the orchestrator and partition the results

use crate::error::PipelineError;
use crate::model::GenerationRequest;
use crate::pipeline::{PipelineOrchestrator, PipelineReport};
use futures::future::join_all;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BatchSuccess {
    pub request: GenerationRequest,
    pub report: PipelineReport,
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub request: GenerationRequest,
    pub error: PipelineError,
}

/// Results partitioned by outcome, each partition in input order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: Vec<BatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BatchScheduler<'a> {
    orchestrator: &'a PipelineOrchestrator,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(orchestrator: &'a PipelineOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Submit every request, then wait for all of them.
    ///
    /// Concurrency is bounded only by the orchestrator's shared pool. A failed request never
    /// stops the others.
    pub async fn run(&self, requests: Vec<GenerationRequest>) -> BatchReport {
        let start = Instant::now();
        let total = requests.len();
        info!(total, "Starting batch");

        // Submit in input order so FIFO admission follows the list.
        let submissions: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let handle = self.orchestrator.generate_async(request.clone());
                (request, handle)
            })
            .collect();

        let outcomes = join_all(submissions.into_iter().map(|(request, handle)| async move {
            let result = match handle {
                Ok(handle) => handle.wait().await,
                Err(e) => Err(e),
            };
            (request, result)
        }))
        .await;

        let mut report = BatchReport::default();
        for (request, result) in outcomes {
            match result {
                Ok(pipeline_report) => report.succeeded.push(BatchSuccess {
                    request,
                    report: pipeline_report,
                }),
                Err(error) => {
                    warn!(
                        company = %request.company(),
                        year = request.year(),
                        code = error.code(),
                        error = %error,
                        "Batch request failed"
                    );
                    report.failed.push(BatchFailure { request, error });
                }
            }
        }

        info!(
            total,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch completed"
        );
        report
    }
}

//! Generation Stage: prompt, invoke, validate, regenerate
//!
//! Sections are allocated once for the whole request and the allocations are split across
//! chunks. Each chunk has its own regeneration budget. When the combined list still falls
//! outside the count tolerance, the missing questions are requested again under the same
//! budget before the stage gives up. Overshoot is truncated.

use crate::config::GenerationSettings;
use crate::error::{CapabilityError, PipelineError};
use crate::model::{Question, ResearchOutput, SectionAllocation};
use crate::provider::GenerationCapability;
use crate::retry::{RetryError, RetryPolicy};
use crate::stage::prompt::{allocate_sections, generation_prompt};
use crate::stage::validation::{
    count_tolerance, parse_questions, summarize, within_tolerance, ValidationIssue,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct GenerationStage {
    capability: Arc<dyn GenerationCapability>,
    retry: RetryPolicy,
    settings: GenerationSettings,
}

/// Split `count` into near-equal chunks of at most `chunk_size`
pub fn plan_chunks(count: u32, threshold: u32, chunk_size: u32) -> Vec<u32> {
    let chunk_size = chunk_size.max(1);
    if count <= threshold || count <= chunk_size {
        return vec![count];
    }
    let chunks = count.div_ceil(chunk_size);
    let base = count / chunks;
    let extra = count % chunks;
    (0..chunks)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Distribute whole-request allocations over `chunks`, filling each chunk in section order.
///
/// Per-section totals across all chunks equal the input allocations.
pub fn split_allocations(
    allocations: &[SectionAllocation],
    chunks: &[u32],
) -> Vec<Vec<SectionAllocation>> {
    let mut remaining: Vec<(String, u32)> = allocations
        .iter()
        .map(|a| (a.name.clone(), a.count))
        .collect();
    let mut section = 0;

    chunks
        .iter()
        .map(|&size| {
            let mut chunk = Vec::new();
            let mut room = size;
            while room > 0 && section < remaining.len() {
                let (name, left) = &mut remaining[section];
                let take = room.min(*left);
                if take > 0 {
                    chunk.push(SectionAllocation {
                        name: name.clone(),
                        count: take,
                    });
                    *left -= take;
                    room -= take;
                }
                if *left == 0 {
                    section += 1;
                }
            }
            chunk
        })
        .collect()
}

/// Per-section shortfall of `accepted` against `target`.
///
/// Falls back to a fresh allocation of `missing` when the accepted section labels do not
/// account for the gap.
fn shortfall_allocations(
    target: &[SectionAllocation],
    accepted: &[Question],
    missing: u32,
    settings: &GenerationSettings,
) -> Vec<SectionAllocation> {
    let shortfall: Vec<SectionAllocation> = target
        .iter()
        .map(|a| {
            let have = accepted
                .iter()
                .filter(|q| q.section.eq_ignore_ascii_case(&a.name))
                .count() as u32;
            SectionAllocation {
                name: a.name.clone(),
                count: a.count.saturating_sub(have),
            }
        })
        .filter(|a| a.count > 0)
        .collect();

    if shortfall.iter().map(|a| a.count).sum::<u32>() == missing {
        shortfall
    } else {
        allocate_sections(missing, &settings.sections)
    }
}

impl GenerationStage {
    pub fn new(
        capability: Arc<dyn GenerationCapability>,
        retry: RetryPolicy,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            capability,
            retry,
            settings,
        }
    }

    pub async fn run(
        &self,
        company: &str,
        year: u16,
        research: &ResearchOutput,
        question_count: u32,
    ) -> Result<Vec<Question>, PipelineError> {
        let chunks = plan_chunks(
            question_count,
            self.settings.chunk_threshold,
            self.settings.chunk_size,
        );
        if chunks.len() > 1 {
            info!(
                company = %company,
                question_count,
                chunks = chunks.len(),
                "Generating in chunks"
            );
        }

        let allocations = allocate_sections(question_count, &self.settings.sections);
        let per_chunk = split_allocations(&allocations, &chunks);

        let mut questions = Vec::with_capacity(question_count as usize);
        for (chunk_index, (&chunk_count, chunk_allocations)) in
            chunks.iter().zip(&per_chunk).enumerate()
        {
            let mut chunk = self
                .generate_validated(company, year, research, chunk_count, chunk_allocations)
                .await?;
            debug!(
                chunk = chunk_index + 1,
                requested = chunk_count,
                generated = chunk.len(),
                "Chunk accepted"
            );
            questions.append(&mut chunk);
        }

        let mut issues = Vec::new();
        let mut top_ups = 0;
        while !within_tolerance(question_count, questions.len(), self.settings.count_tolerance) {
            let actual = questions.len();
            if actual > question_count as usize {
                break;
            }
            if top_ups == self.settings.max_regenerations {
                if issues.is_empty() {
                    issues.push(ValidationIssue::CountOutOfTolerance {
                        expected: question_count,
                        actual,
                        tolerance: count_tolerance(question_count, self.settings.count_tolerance),
                    });
                }
                return Err(PipelineError::ContentValidation(format!(
                    "expected {} questions after combining chunks, got {} after {} top-up attempts: {}",
                    question_count,
                    actual,
                    top_ups,
                    summarize(&issues)
                )));
            }

            top_ups += 1;
            let missing = question_count - actual as u32;
            let shortfall =
                shortfall_allocations(&allocations, &questions, missing, &self.settings);
            warn!(
                company = %company,
                question_count,
                actual,
                missing,
                attempt = top_ups,
                "Combined chunks fell short, requesting missing questions"
            );
            match self
                .attempt(company, year, research, missing, &shortfall, &issues)
                .await?
            {
                Ok(mut extra) => {
                    questions.append(&mut extra);
                    issues.clear();
                }
                Err(found) => issues = found,
            }
        }

        if !within_tolerance(question_count, questions.len(), self.settings.count_tolerance) {
            return Err(PipelineError::ContentValidation(format!(
                "expected {} questions (+/-{}), got {} after combining chunks",
                question_count,
                count_tolerance(question_count, self.settings.count_tolerance),
                questions.len()
            )));
        }
        questions.truncate(question_count as usize);
        Ok(questions)
    }

    /// One batch with up to `max_regenerations` extra attempts on validation failure
    async fn generate_validated(
        &self,
        company: &str,
        year: u16,
        research: &ResearchOutput,
        count: u32,
        allocations: &[SectionAllocation],
    ) -> Result<Vec<Question>, PipelineError> {
        let mut issues = Vec::new();

        for attempt in 0..=self.settings.max_regenerations {
            match self
                .attempt(company, year, research, count, allocations, &issues)
                .await?
            {
                Ok(questions) => {
                    if attempt > 0 {
                        info!(attempt, count, "Regenerated output accepted");
                    }
                    return Ok(questions);
                }
                Err(found) => {
                    warn!(
                        provider = self.capability.name(),
                        attempt,
                        issues = found.len(),
                        first_issue = %found.first().map(ToString::to_string).unwrap_or_default(),
                        "Generated output failed validation"
                    );
                    issues = found;
                }
            }
        }

        Err(PipelineError::ContentValidation(format!(
            "generation failed validation after {} attempts: {}",
            self.settings.max_regenerations + 1,
            summarize(&issues)
        )))
    }

    /// A single call plus validation.
    ///
    /// The outer error is a transport failure that ends the stage; the inner error lists
    /// output problems that a regeneration may fix. Undecodable provider output counts as
    /// the latter.
    async fn attempt(
        &self,
        company: &str,
        year: u16,
        research: &ResearchOutput,
        count: u32,
        allocations: &[SectionAllocation],
        previous: &[ValidationIssue],
    ) -> Result<Result<Vec<Question>, Vec<ValidationIssue>>, PipelineError> {
        let prompt = generation_prompt(company, year, research, count, allocations, previous);
        let result = self
            .retry
            .execute("generation", |_| {
                let prompt = &prompt;
                let capability = Arc::clone(&self.capability);
                async move { capability.generate(prompt).await }
            })
            .await;

        match result {
            Ok(raw) => Ok(parse_questions(&raw, count, self.settings.count_tolerance)),
            Err(RetryError::Fatal {
                error: CapabilityError::MalformedOutput(message),
                ..
            }) => Ok(Err(vec![ValidationIssue::Unparseable(message)])),
            Err(e) => Err(e.into_pipeline_error("generation")),
        }
    }
}

//! Research Stage: invoke the research capability and reject degenerate output

use crate::company::CompanyProfile;
use crate::config::ResearchSettings;
use crate::error::PipelineError;
use crate::model::ResearchOutput;
use crate::provider::{ResearchCapability, ResearchResponse};
use crate::retry::RetryPolicy;
use crate::stage::prompt;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Phrases that mark a refusal or placeholder rather than research
const REFUSAL_MARKERS: &[&str] = &[
    "i'm sorry",
    "i am sorry",
    "i cannot",
    "i can't",
    "as an ai",
    "unable to provide",
    "no information available",
    "lorem ipsum",
];

/// Only the opening of the text is scanned for refusal markers
const REFUSAL_SCAN_CHARS: usize = 240;

pub struct ResearchStage {
    capability: Arc<dyn ResearchCapability>,
    retry: RetryPolicy,
    settings: ResearchSettings,
}

impl ResearchStage {
    pub fn new(
        capability: Arc<dyn ResearchCapability>,
        retry: RetryPolicy,
        settings: ResearchSettings,
    ) -> Self {
        Self {
            capability,
            retry,
            settings,
        }
    }

    pub async fn run(
        &self,
        raw_company: &str,
        profile: Option<&CompanyProfile>,
        year: u16,
    ) -> Result<ResearchOutput, PipelineError> {
        let query = prompt::research_query(raw_company, profile, year);
        let start = Instant::now();

        let response = self
            .retry
            .execute("research", |attempt| {
                let query = &query;
                let capability = Arc::clone(&self.capability);
                async move {
                    if attempt > 1 {
                        info!(company = %query.company_query, attempt, "Retrying research");
                    }
                    capability.research(query).await
                }
            })
            .await
            .map_err(|e| e.into_pipeline_error("research"))?;

        let output = self.accept(response, start)?;
        info!(
            provider = self.capability.name(),
            company = %query.company_query,
            content_chars = output.content.chars().count(),
            citations = output.citation_count,
            elapsed_ms = output.elapsed_ms,
            "Research completed"
        );
        Ok(output)
    }

    fn accept(
        &self,
        response: ResearchResponse,
        start: Instant,
    ) -> Result<ResearchOutput, PipelineError> {
        let content = response.content.trim().to_string();
        if let Err(reason) = check_content(&content, &self.settings) {
            warn!(reason = %reason, "Research output rejected");
            return Err(PipelineError::ContentValidation(format!(
                "research output rejected: {}",
                reason
            )));
        }

        let citation_count = response.citations.len();
        Ok(ResearchOutput {
            content,
            citations: response.citations,
            citation_count,
            generated_at: Utc::now(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Reject empty, too short, too sparse, or refusal-like research text
pub fn check_content(content: &str, settings: &ResearchSettings) -> Result<(), String> {
    if content.is_empty() {
        return Err("content is empty".to_string());
    }
    let chars = content.chars().count();
    if chars < settings.min_content_chars {
        return Err(format!(
            "content has {} characters, at least {} required",
            chars, settings.min_content_chars
        ));
    }
    let words = content.split_whitespace().count();
    if words < settings.min_words {
        return Err(format!(
            "content has {} words, at least {} required",
            words, settings.min_words
        ));
    }
    let opening: String = content
        .chars()
        .take(REFUSAL_SCAN_CHARS)
        .collect::<String>()
        .to_lowercase();
    if let Some(marker) = REFUSAL_MARKERS.iter().find(|m| opening.contains(*m)) {
        return Err(format!("content looks like a refusal ('{}')", marker));
    }
    Ok(())
}

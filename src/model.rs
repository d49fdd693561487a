//! Domain model: generation requests, questions and test artifacts

use crate::cache::Fingerprint;
use crate::company::CompanyTable;
use crate::error::PipelineError;
use crate::types::TestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub const MIN_COMPANY_CHARS: usize = 2;
pub const MAX_COMPANY_CHARS: usize = 100;
pub const MAX_QUESTION_COUNT: u32 = 100;

/// A validated request to generate a practice test.
///
/// Immutable once constructed; fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    company: String,
    normalized_company: String,
    year: u16,
    question_count: u32,
    force_regenerate: bool,
}

impl GenerationRequest {
    pub fn new(
        company: &str,
        year: u16,
        question_count: u32,
        companies: &CompanyTable,
    ) -> Result<Self, PipelineError> {
        let company = company.trim();
        validate_company_name(company)?;

        if question_count == 0 || question_count > MAX_QUESTION_COUNT {
            return Err(PipelineError::InvalidRequest(format!(
                "question count must be between 1 and {}, got {}",
                MAX_QUESTION_COUNT, question_count
            )));
        }

        let normalized_company = companies.canonical_key(company);
        if companies.resolve(company).is_none() {
            warn!(
                company = %company,
                normalized = %normalized_company,
                "Company is not in the supported table, generating anyway"
            );
        }

        Ok(Self {
            company: company.to_string(),
            normalized_company,
            year,
            question_count,
            force_regenerate: false,
        })
    }

    /// Copy of this request that bypasses every cache tier
    pub fn with_force_regenerate(mut self, force: bool) -> Self {
        self.force_regenerate = force;
        self
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn normalized_company(&self) -> &str {
        &self.normalized_company
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    pub fn force_regenerate(&self) -> bool {
        self.force_regenerate
    }

    /// Dedup and cache key; independent of `force_regenerate`
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_parts(&self.normalized_company, self.year, self.question_count)
    }
}

fn validate_company_name(company: &str) -> Result<(), PipelineError> {
    let chars = company.chars().count();
    if chars < MIN_COMPANY_CHARS || chars > MAX_COMPANY_CHARS {
        return Err(PipelineError::InvalidRequest(format!(
            "company name must be {}-{} characters, got {}",
            MIN_COMPANY_CHARS, MAX_COMPANY_CHARS, chars
        )));
    }
    if let Some(bad) = company
        .chars()
        .find(|c| !(c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '&' | '.' | '+')))
    {
        return Err(PipelineError::InvalidRequest(format!(
            "company name contains unsupported character '{}'",
            bad
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(s)
    }
}

/// A validated multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub options: [String; 4],
    /// 0-based index into `options`
    pub correct_option: usize,
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
    pub section: String,
    pub topic: Option<String>,
}

/// A persisted, validated practice test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestArtifact {
    pub test_id: TestId,
    pub company: String,
    pub normalized_company: String,
    pub year: u16,
    /// Section names in first-seen order
    pub sections: Vec<String>,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

impl TestArtifact {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}

/// Ordered, de-duplicated section names of a question list
pub fn sections_of(questions: &[Question]) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    for q in questions {
        if !sections.iter().any(|s| s == &q.section) {
            sections.push(q.section.clone());
        }
    }
    sections
}

/// Number of questions requested for one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionAllocation {
    pub name: String,
    pub count: u32,
}

/// A source cited by the research capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

/// Accepted research output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutput {
    pub content: String,
    pub citations: Vec<Citation>,
    pub citation_count: usize,
    pub generated_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

//! Prompt construction for research and generation

use crate::company::CompanyProfile;
use crate::config::SectionWeight;
use crate::model::{ResearchOutput, SectionAllocation};
use crate::provider::{GenerationPrompt, ResearchQuery};
use crate::stage::validation::ValidationIssue;
use std::fmt::Write as _;

/// Cap on research text embedded in a generation prompt
const MAX_RESEARCH_CHARS_IN_PROMPT: usize = 12_000;

pub const GENERATION_SYSTEM_PROMPT: &str = "You write realistic placement exam practice \
questions. Respond with a single JSON object and nothing else.";

/// Split `count` across sections by percentage using largest-remainder allocation.
///
/// The returned counts always sum to `count`. Ties on the remainder go to the earlier section.
pub fn allocate_sections(count: u32, weights: &[SectionWeight]) -> Vec<SectionAllocation> {
    let total: u64 = weights.iter().map(|w| w.percent as u64).sum();
    if weights.is_empty() || total == 0 {
        return Vec::new();
    }

    let mut allocations: Vec<(u32, u64)> = weights
        .iter()
        .map(|w| {
            let exact = count as u64 * w.percent as u64;
            ((exact / total) as u32, exact % total)
        })
        .collect();

    let assigned: u32 = allocations.iter().map(|(n, _)| n).sum();
    let mut order: Vec<usize> = (0..allocations.len()).collect();
    order.sort_by(|&a, &b| allocations[b].1.cmp(&allocations[a].1).then(a.cmp(&b)));
    for &idx in order.iter().take((count - assigned) as usize) {
        allocations[idx].0 += 1;
    }

    weights
        .iter()
        .zip(allocations)
        .map(|(w, (n, _))| SectionAllocation {
            name: w.name.clone(),
            count: n,
        })
        .collect()
}

/// "TCS (TCS NQT)" for known companies with an exam name, the display name otherwise
pub fn company_query(raw_company: &str, profile: Option<&CompanyProfile>) -> String {
    match profile {
        Some(p) => match p.exam_name {
            Some(exam) => format!("{} ({})", p.display_name, exam),
            None => p.display_name.to_string(),
        },
        None => raw_company.to_string(),
    }
}

pub fn research_query(
    raw_company: &str,
    profile: Option<&CompanyProfile>,
    year: u16,
) -> ResearchQuery {
    let company = company_query(raw_company, profile);
    let prompt = format!(
        "Research the latest {company} placement exam pattern for {prev}-{year} for freshers.\n\n\
         Provide comprehensive information about:\n\
         1. Exam structure: total questions, time limit, section-wise breakdown and difficulty.\n\
         2. Question types by section: quantitative aptitude topics, logical reasoning puzzle \
         types, verbal ability areas, and any technical or coding questions.\n\
         3. Recent changes in the pattern for {year} and emerging question types.\n\
         4. High-priority topics and their weightage.\n\
         5. Preparation insights and common mistakes.\n\n\
         Be specific and cite sources. The output will be used to generate realistic practice \
         questions.",
        company = company,
        prev = year.saturating_sub(1),
        year = year,
    );
    ResearchQuery {
        company_query: company,
        year,
        prompt,
    }
}

pub fn generation_prompt(
    company: &str,
    year: u16,
    research: &ResearchOutput,
    count: u32,
    allocations: &[SectionAllocation],
    previous_issues: &[ValidationIssue],
) -> GenerationPrompt {
    let research_content: String = research
        .content
        .chars()
        .take(MAX_RESEARCH_CHARS_IN_PROMPT)
        .collect();

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Based on the following research about {} placement exams ({}), generate exactly {} \
         multiple-choice practice questions matching the real exam format.",
        company, year, count
    );
    let _ = writeln!(prompt, "\nRESEARCH DATA:\n{}\n", research_content);
    let _ = writeln!(prompt, "SECTION DISTRIBUTION:");
    for allocation in allocations.iter().filter(|a| a.count > 0) {
        let _ = writeln!(prompt, "- {}: {} questions", allocation.name, allocation.count);
    }
    let _ = writeln!(
        prompt,
        "\nReturn JSON of the form:\n\
         {{\"sections\": [{{\"section_name\": \"Quantitative Aptitude\", \"questions\": [\
         {{\"question_text\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
         \"correct_answer\": \"A\", \"explanation\": \"...\", \"difficulty\": \"medium\", \
         \"topic\": \"...\"}}]}}]}}\n\n\
         Rules: exactly 4 non-empty options per question; correct_answer is one of A, B, C, D; \
         difficulty is easy, medium or hard (roughly 30% easy, 50% medium, 20% hard); every \
         question is unique."
    );

    if !previous_issues.is_empty() {
        let _ = writeln!(
            prompt,
            "\nYOUR PREVIOUS RESPONSE WAS REJECTED. Fix these problems:"
        );
        for issue in previous_issues.iter().take(10) {
            let _ = writeln!(prompt, "- {}", issue);
        }
    }

    GenerationPrompt {
        research_content,
        question_count: count,
        section_distribution: allocations.to_vec(),
        prompt,
        system: GENERATION_SYSTEM_PROMPT.to_string(),
    }
}

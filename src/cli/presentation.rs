//! CLI presentation: text and JSON formatters for command results.

use crate::batch::BatchReport;
use crate::cli::parse::OutputFormat;
use crate::company::CompanyTable;
use crate::error::PipelineError;
use crate::model::TestArtifact;
use crate::pipeline::{PipelineReport, PipelineState, PipelineStatistics};
use comfy_table::{presets::UTF8_FULL, Table};
use owo_colors::OwoColorize;
use serde_json::json;

const OPTION_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

fn to_json(value: &serde_json::Value) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::Internal(format!("Failed to render JSON: {}", e)))
}

fn report_json(report: &PipelineReport) -> serde_json::Value {
    let timings: Vec<_> = report
        .timings
        .iter()
        .map(|(state, spent)| json!({ "state": state.as_str(), "ms": spent.as_millis() as u64 }))
        .collect();
    json!({
        "test_id": report.artifact.test_id,
        "company": report.artifact.company,
        "year": report.artifact.year,
        "sections": report.artifact.sections,
        "question_count": report.artifact.question_count(),
        "fingerprint": report.fingerprint.to_hex(),
        "from_cache": report.from_cache,
        "research_reused": report.research_reused,
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "timings": timings,
    })
}

/// "research 120ms, generation 3400ms" for the states a run passed through
fn timings_line(report: &PipelineReport) -> String {
    let parts: Vec<String> = report
        .timings
        .iter()
        .filter(|(state, _)| *state != PipelineState::Init)
        .map(|(state, spent)| format!("{} {}ms", state, spent.as_millis()))
        .collect();
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn format_generate_result(
    report: &PipelineReport,
    format: OutputFormat,
) -> Result<String, PipelineError> {
    if format == OutputFormat::Json {
        return to_json(&report_json(report));
    }
    let artifact = &report.artifact;
    let source = if report.from_cache {
        "cache".yellow().to_string()
    } else if report.research_reused {
        "generated (cached research)".green().to_string()
    } else {
        "generated".green().to_string()
    };
    Ok(format!(
        "Test {} for {} {}\n  Questions: {}\n  Sections: {}\n  Source: {}\n  Fingerprint: {}\n  Elapsed: {}ms\n  Stages: {}",
        artifact.test_id.bold(),
        artifact.company,
        artifact.year,
        artifact.question_count(),
        artifact.sections.join(", "),
        source,
        report.fingerprint.short(),
        report.elapsed.as_millis(),
        timings_line(report)
    ))
}

pub fn format_batch_result(
    report: &BatchReport,
    format: OutputFormat,
) -> Result<String, PipelineError> {
    if format == OutputFormat::Json {
        let succeeded: Vec<_> = report
            .succeeded
            .iter()
            .map(|s| report_json(&s.report))
            .collect();
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|f| {
                json!({
                    "company": f.request.company(),
                    "year": f.request.year(),
                    "error": f.error.report(),
                })
            })
            .collect();
        return to_json(&json!({ "succeeded": succeeded, "failed": failed }));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Company", "Year", "Status", "Test", "Questions", "Detail"]);
    for s in &report.succeeded {
        table.add_row(vec![
            s.request.company().to_string(),
            s.request.year().to_string(),
            "ok".to_string(),
            s.report.artifact.test_id.to_string(),
            s.report.artifact.question_count().to_string(),
            if s.report.from_cache { "cached" } else { "generated" }.to_string(),
        ]);
    }
    for f in &report.failed {
        table.add_row(vec![
            f.request.company().to_string(),
            f.request.year().to_string(),
            "failed".to_string(),
            "-".to_string(),
            "-".to_string(),
            f.error.code().to_string(),
        ]);
    }

    let summary = format!(
        "{} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    let summary = if report.all_succeeded() {
        summary.green().to_string()
    } else {
        summary.red().to_string()
    };
    Ok(format!("{}\n{}", table, summary))
}

pub fn format_test(
    artifact: &TestArtifact,
    answers: bool,
    format: OutputFormat,
) -> Result<String, PipelineError> {
    if format == OutputFormat::Json {
        let value = serde_json::to_value(artifact)
            .map_err(|e| PipelineError::Internal(format!("Failed to render JSON: {}", e)))?;
        return to_json(&value);
    }

    let mut out = format!(
        "{} {} practice test #{} ({} questions, created {})\n",
        artifact.company.bold(),
        artifact.year,
        artifact.test_id,
        artifact.question_count(),
        artifact.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    for section in &artifact.sections {
        out.push_str(&format!("\n== {} ==\n", section.cyan()));
        for (number, question) in artifact
            .questions
            .iter()
            .enumerate()
            .filter(|(_, q)| &q.section == section)
        {
            out.push_str(&format!(
                "\n{}. {} [{}]\n",
                number + 1,
                question.text,
                question.difficulty
            ));
            for (label, option) in OPTION_LABELS.iter().zip(question.options.iter()) {
                out.push_str(&format!("   {}) {}\n", label, option));
            }
            if answers {
                out.push_str(&format!(
                    "   Answer: {}\n",
                    OPTION_LABELS[question.correct_option].green()
                ));
                if let Some(explanation) = &question.explanation {
                    out.push_str(&format!("   {}\n", explanation.dimmed()));
                }
            }
        }
    }
    Ok(out)
}

pub fn format_statistics(
    stats: &PipelineStatistics,
    format: OutputFormat,
) -> Result<String, PipelineError> {
    if format == OutputFormat::Json {
        return to_json(&json!({
            "store": stats.store,
            "research_cache": stats.research_cache,
            "artifact_cache": stats.artifact_cache,
            "research_entries": stats.research_entries,
            "artifact_entries": stats.artifact_entries,
            "in_flight": stats.in_flight,
            "executing": stats.executing,
            "pool_size": stats.pool_size,
        }));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Company", "Tests"]);
    for (company, count) in &stats.store.tests_per_company {
        table.add_row(vec![company.clone(), count.to_string()]);
    }

    let latest = stats
        .store
        .latest_created_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    Ok(format!(
        "Tests: {}\nQuestions: {}\nLatest: {}\n{}\nResearch cache: {} live, {} stale ({} hits / {} misses)\nArtifact cache: {} live, {} stale ({} hits / {} misses)\nPool: {} executing, {} in flight, {} slots",
        stats.store.total_tests,
        stats.store.total_questions,
        latest,
        table,
        stats.research_entries.live,
        stats.research_entries.stale,
        stats.research_cache.hits,
        stats.research_cache.misses,
        stats.artifact_entries.live,
        stats.artifact_entries.stale,
        stats.artifact_cache.hits,
        stats.artifact_cache.misses,
        stats.executing,
        stats.in_flight,
        stats.pool_size
    ))
}

pub fn format_companies(
    companies: &CompanyTable,
    format: OutputFormat,
) -> Result<String, PipelineError> {
    if format == OutputFormat::Json {
        let list: Vec<_> = companies
            .profiles()
            .iter()
            .map(|p| {
                json!({
                    "key": p.canonical,
                    "name": p.display_name,
                    "exam": p.exam_name,
                    "aliases": p.aliases,
                })
            })
            .collect();
        return to_json(&json!(list));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Key", "Company", "Exam", "Aliases"]);
    for p in companies.profiles() {
        table.add_row(vec![
            p.canonical.to_string(),
            p.display_name.to_string(),
            p.exam_name.unwrap_or("-").to_string(),
            p.aliases.join(", "),
        ]);
    }
    Ok(table.to_string())
}

//! Output validation and the regeneration budget

use crate::integration::test_utils::{request, HarnessBuilder, ScriptedGeneration};
use examforge::config::GenerationSettings;
use examforge::error::CapabilityError;
use serde_json::json;

fn three_options() -> String {
    json!({
        "questions": [{
            "question_text": "Pick one",
            "options": ["a", "b", "c"],
            "correct_answer": "A",
            "difficulty": "easy",
            "section": "Quant"
        }]
    })
    .to_string()
}

fn out_of_range_answer(count: usize) -> String {
    let questions: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "question_text": format!("Question {}", i),
                "options": ["a", "b", "c", "d"],
                "correct_answer": 7,
                "difficulty": "easy",
                "section": "Quant"
            })
        })
        .collect();
    json!({ "questions": questions }).to_string()
}

#[tokio::test]
async fn test_regeneration_recovers_from_bad_output() {
    let harness = HarnessBuilder::new()
        .generation(ScriptedGeneration::with_script(vec![
            Ok(three_options()),
            Ok("not json at all".to_string()),
        ]))
        .build();

    let report = harness
        .orchestrator
        .generate_sync(request("Wipro", 2025, 5))
        .await
        .unwrap();
    assert_eq!(report.artifact.question_count(), 5);
    assert_eq!(harness.generation.calls(), 3);

    // Refined prompts carry the previous rejection
    let prompts = harness.generation.prompts();
    assert!(!prompts[0].prompt.contains("REJECTED"));
    assert!(prompts[1].prompt.contains("REJECTED"));
}

#[tokio::test]
async fn test_regeneration_budget_is_two_extra_attempts() {
    let harness = HarnessBuilder::new()
        .generation(ScriptedGeneration::with_script(vec![
            Ok(out_of_range_answer(5)),
            Ok(out_of_range_answer(5)),
            Ok(out_of_range_answer(5)),
            Ok(out_of_range_answer(5)),
        ]))
        .build();

    let err = harness
        .orchestrator
        .generate_sync(request("TCS", 2025, 5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONTENT_VALIDATION_ERROR");
    assert_eq!(harness.generation.calls(), 3);
    let stats = harness.orchestrator.statistics().await.unwrap();
    assert_eq!(stats.store.total_tests, 0);
}

#[tokio::test]
async fn test_regeneration_budget_follows_settings() {
    let settings = GenerationSettings {
        max_regenerations: 0,
        ..GenerationSettings::default()
    };
    let harness = HarnessBuilder::new()
        .generation_settings(settings)
        .generation(ScriptedGeneration::with_script(vec![Ok(three_options())]))
        .build();

    let err = harness
        .orchestrator
        .generate_sync(request("Infosys", 2025, 5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONTENT_VALIDATION_ERROR");
    assert_eq!(harness.generation.calls(), 1);
}

#[tokio::test]
async fn test_chunks_regenerate_independently() {
    let harness = HarnessBuilder::new()
        .generation(ScriptedGeneration::with_script(vec![
            Ok(three_options()),
        ]))
        .build();

    // 16 questions: two chunks of 8; the first chunk needs one regeneration
    let report = harness
        .orchestrator
        .generate_sync(request("Cognizant", 2025, 16))
        .await
        .unwrap();
    assert_eq!(report.artifact.question_count(), 16);
    assert_eq!(harness.generation.calls(), 3);
    let counts: Vec<_> = harness
        .generation
        .prompts()
        .iter()
        .map(|p| p.question_count)
        .collect();
    assert_eq!(counts, vec![8, 8, 8]);
}

#[tokio::test]
async fn test_short_chunks_are_topped_up() {
    let harness = HarnessBuilder::new()
        .generation(ScriptedGeneration::new().short_by(1))
        .build();

    // 20 questions: chunks of 7, 7 and 6 each come back one short (17 in total)
    let report = harness
        .orchestrator
        .generate_sync(request("TCS", 2025, 20))
        .await
        .unwrap();
    assert_eq!(report.artifact.question_count(), 19);
    assert_eq!(harness.generation.calls(), 4);

    let prompts = harness.generation.prompts();
    assert_eq!(prompts[3].question_count, 3);
    let top_up: u32 = prompts[3].section_distribution.iter().map(|s| s.count).sum();
    assert_eq!(top_up, 3);
}

#[tokio::test]
async fn test_short_chunks_fail_without_budget() {
    let settings = GenerationSettings {
        max_regenerations: 0,
        ..GenerationSettings::default()
    };
    let harness = HarnessBuilder::new()
        .generation_settings(settings)
        .generation(ScriptedGeneration::new().short_by(1))
        .build();

    let err = harness
        .orchestrator
        .generate_sync(request("TCS", 2025, 20))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONTENT_VALIDATION_ERROR");
    assert_eq!(harness.generation.calls(), 3);
}

#[tokio::test]
async fn test_whole_request_section_split() {
    let harness = HarnessBuilder::new().build();

    let report = harness
        .orchestrator
        .generate_sync(request("Infosys", 2025, 20))
        .await
        .unwrap();
    let per_section = |name: &str| {
        report
            .artifact
            .questions
            .iter()
            .filter(|q| q.section == name)
            .count()
    };
    assert_eq!(per_section("Quantitative Aptitude"), 8);
    assert_eq!(per_section("Logical Reasoning"), 7);
    assert_eq!(per_section("Verbal Ability"), 5);
}

#[tokio::test]
async fn test_undecodable_provider_output_is_regenerated() {
    let harness = HarnessBuilder::new()
        .generation(ScriptedGeneration::with_script(vec![Err(
            CapabilityError::MalformedOutput("No candidates in response".to_string()),
        )]))
        .build();

    let report = harness
        .orchestrator
        .generate_sync(request("Wipro", 2025, 5))
        .await
        .unwrap();
    assert_eq!(report.artifact.question_count(), 5);
    assert_eq!(harness.generation.calls(), 2);
    assert!(harness.generation.prompts()[1].prompt.contains("No candidates in response"));
}

//! Batch scheduling with partial failures

use crate::integration::test_utils::{request, HarnessBuilder, ScriptedGeneration, ScriptedResearch};
use std::time::Duration;

#[tokio::test]
async fn test_batch_partitions_results_in_input_order() {
    let harness = HarnessBuilder::new()
        .generation(ScriptedGeneration::new().invalid_for("Accenture"))
        .build();

    let requests = vec![
        request("Accenture", 2025, 5),
        request("Wipro", 2025, 5),
        request("Infosys", 2025, 5),
        request("Cognizant", 2025, 5),
        request("Capgemini", 2025, 5),
    ];
    let report = harness.orchestrator.generate_batch(requests).await;

    let succeeded: Vec<_> = report
        .succeeded
        .iter()
        .map(|s| s.request.company().to_string())
        .collect();
    assert_eq!(succeeded, vec!["Wipro", "Infosys", "Cognizant", "Capgemini"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].request.company(), "Accenture");
    assert_eq!(report.failed[0].error.code(), "CONTENT_VALIDATION_ERROR");
    assert_eq!(report.total(), 5);
    assert!(!report.all_succeeded());

    // One initial attempt plus two regenerations for the failing company
    let accenture_prompts = harness
        .generation
        .prompts()
        .iter()
        .filter(|p| p.prompt.contains("Accenture"))
        .count();
    assert_eq!(accenture_prompts, 3);
}

#[tokio::test]
async fn test_batch_shares_pool_and_dedups_duplicates() {
    let harness = HarnessBuilder::new()
        .pool_size(2)
        .research(ScriptedResearch::new().with_delay(Duration::from_millis(20)))
        .build();

    let requests = vec![
        request("TCS", 2025, 5),
        request("Tata Consultancy Services", 2025, 5),
        request("Wipro", 2025, 5),
        request("HCL", 2025, 5),
    ];
    let report = harness.orchestrator.generate_batch(requests).await;

    assert!(report.all_succeeded());
    assert_eq!(
        report.succeeded[0].report.artifact.test_id,
        report.succeeded[1].report.artifact.test_id
    );
    assert_eq!(harness.research.calls(), 3);
    assert!(harness.research.tracker.peak() <= 2);
}

#[tokio::test]
async fn test_empty_batch() {
    let harness = HarnessBuilder::new().build();
    let report = harness.orchestrator.generate_batch(Vec::new()).await;
    assert_eq!(report.total(), 0);
    assert!(report.all_succeeded());
}

//! End-to-end request scenarios against scripted capabilities

use crate::integration::test_utils::{request, HarnessBuilder, ScriptedGeneration, ScriptedResearch};
use std::time::Duration;

#[tokio::test]
async fn test_tcs_nqt_fresh_request_persists_twenty_questions() {
    let harness = HarnessBuilder::new().build();
    let req = request("TCS NQT", 2025, 20);
    assert_eq!(req.normalized_company(), "tcs");

    let report = harness.orchestrator.generate_sync(req).await.unwrap();

    assert!(!report.from_cache);
    assert_eq!(report.artifact.question_count(), 20);
    assert_eq!(report.artifact.year, 2025);
    assert_eq!(report.artifact.company, "TCS NQT");
    assert_eq!(harness.research.calls(), 1);
    // 20 questions are generated as chunks of 7, 7 and 6
    assert_eq!(harness.generation.calls(), 3);
    assert!(harness.research.queries()[0].contains("TCS NQT"));

    let stored = harness
        .orchestrator
        .get_test(report.artifact.test_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.questions, report.artifact.questions);
    assert_eq!(stored.sections.len(), 3);
}

#[tokio::test]
async fn test_repeat_within_ttl_makes_no_external_calls() {
    let harness = HarnessBuilder::new().build();
    let first = harness
        .orchestrator
        .generate_sync(request("TCS NQT", 2025, 20))
        .await
        .unwrap();
    let research_calls = harness.research.calls();
    let generation_calls = harness.generation.calls();

    harness.clock.advance(Duration::from_secs(23 * 60 * 60));
    let handle = harness
        .orchestrator
        .generate_async(request("Tata Consultancy Services", 2025, 20))
        .unwrap();
    assert!(handle.is_ready());
    let second = handle.wait().await.unwrap();

    assert!(second.from_cache);
    assert_eq!(second.artifact.test_id, first.artifact.test_id);
    assert_eq!(harness.research.calls(), research_calls);
    assert_eq!(harness.generation.calls(), generation_calls);
    assert_eq!(harness.orchestrator.active_runs().len(), 0);
}

#[tokio::test]
async fn test_concurrent_infosys_requests_share_one_test() {
    let harness = HarnessBuilder::new()
        .research(ScriptedResearch::new().with_delay(Duration::from_millis(50)))
        .build();

    let a = harness
        .orchestrator
        .generate_async(request("Infosys", 2025, 15))
        .unwrap();
    let b = harness
        .orchestrator
        .generate_async(request("infosys limited", 2025, 15))
        .unwrap();
    assert!(!a.joined());
    assert!(b.joined());
    assert_eq!(a.run_id(), b.run_id());
    assert_eq!(
        harness
            .orchestrator
            .subscriber_count(&request("Infosys", 2025, 15)),
        2
    );

    let (a, b) = tokio::join!(a.wait(), b.wait());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.artifact.test_id, b.artifact.test_id);
    assert_eq!(harness.research.calls(), 1);
    // 15 is at the chunk threshold, so one generation call
    assert_eq!(harness.generation.calls(), 1);

    let stats = harness.orchestrator.statistics().await.unwrap();
    assert_eq!(stats.store.total_tests, 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_unknown_company_is_generated_under_its_slug() {
    let harness = HarnessBuilder::new()
        .generation(ScriptedGeneration::new())
        .build();
    let req = request("Acme Robotics", 2025, 5);
    assert_eq!(req.normalized_company(), "acme-robotics");

    let report = harness.orchestrator.generate_sync(req).await.unwrap();
    assert_eq!(report.artifact.normalized_company, "acme-robotics");
    assert_eq!(report.artifact.question_count(), 5);
    assert_eq!(harness.research.queries(), vec!["Acme Robotics".to_string()]);
}

//! Cache tier expiry and research reuse through the orchestrator

use crate::integration::test_utils::{request, HarnessBuilder};
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::test]
async fn test_artifact_expires_after_ttl() {
    let harness = HarnessBuilder::new().build();
    let first = harness
        .orchestrator
        .generate_sync(request("Wipro", 2025, 8))
        .await
        .unwrap();

    harness.clock.advance(DAY - Duration::from_secs(1));
    let hit = harness
        .orchestrator
        .generate_sync(request("Wipro", 2025, 8))
        .await
        .unwrap();
    assert!(hit.from_cache);
    assert_eq!(harness.research.calls(), 1);

    // Exactly at the TTL the entry is stale
    harness.clock.advance(Duration::from_secs(1));
    let regenerated = harness
        .orchestrator
        .generate_sync(request("Wipro", 2025, 8))
        .await
        .unwrap();
    assert!(!regenerated.from_cache);
    assert_ne!(regenerated.artifact.test_id, first.artifact.test_id);
    assert_eq!(harness.research.calls(), 2);
}

#[tokio::test]
async fn test_research_reused_for_different_question_count() {
    let harness = HarnessBuilder::new().build();
    harness
        .orchestrator
        .generate_sync(request("Cognizant", 2025, 10))
        .await
        .unwrap();

    let report = harness
        .orchestrator
        .generate_sync(request("Cognizant", 2025, 12))
        .await
        .unwrap();

    assert!(!report.from_cache);
    assert!(report.research_reused);
    assert_eq!(report.artifact.question_count(), 12);
    assert_eq!(harness.research.calls(), 1);
    assert_eq!(harness.generation.calls(), 2);
}

#[tokio::test]
async fn test_stale_research_is_not_reused() {
    let harness = HarnessBuilder::new().build();
    harness
        .orchestrator
        .generate_sync(request("Capgemini", 2025, 5))
        .await
        .unwrap();

    harness.clock.advance(DAY);
    let report = harness
        .orchestrator
        .generate_sync(request("Capgemini", 2025, 6))
        .await
        .unwrap();
    assert!(!report.research_reused);
    assert_eq!(harness.research.calls(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_fresh_run() {
    let harness = HarnessBuilder::new().build();
    let req = request("Infosys", 2025, 5);
    harness.orchestrator.generate_sync(req.clone()).await.unwrap();

    assert!(harness.orchestrator.invalidate(&req, false).unwrap());
    let report = harness.orchestrator.generate_sync(req.clone()).await.unwrap();
    assert!(!report.from_cache);
    assert!(report.research_reused);

    assert!(harness.orchestrator.invalidate(&req, true).unwrap());
    let report = harness.orchestrator.generate_sync(req).await.unwrap();
    assert!(!report.research_reused);
    assert_eq!(harness.research.calls(), 2);
}

#[tokio::test]
async fn test_purge_expired_sweeps_both_tiers() {
    let harness = HarnessBuilder::new().build();
    harness
        .orchestrator
        .generate_sync(request("TCS", 2025, 5))
        .await
        .unwrap();
    assert_eq!(harness.orchestrator.purge_expired().unwrap(), 0);

    harness.clock.advance(DAY + Duration::from_secs(1));
    assert_eq!(harness.orchestrator.purge_expired().unwrap(), 2);
}

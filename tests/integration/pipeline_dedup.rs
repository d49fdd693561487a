//! In-flight dedup, pool bound and failure broadcast through the orchestrator

use crate::integration::test_utils::{
    request, HarnessBuilder, ScriptedGeneration, ScriptedResearch,
};
use examforge::error::CapabilityError;
use std::time::Duration;

#[tokio::test]
async fn test_n_concurrent_callers_one_execution() {
    let harness = HarnessBuilder::new()
        .research(ScriptedResearch::new().with_delay(Duration::from_millis(30)))
        .build();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            harness
                .orchestrator
                .generate_async(request("Wipro", 2025, 10))
                .unwrap()
        })
        .collect();
    assert_eq!(handles.iter().filter(|h| h.joined()).count(), 7);

    let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;
    let ids: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().artifact.test_id)
        .collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(harness.research.calls(), 1);
    assert_eq!(harness.generation.calls(), 1);
}

#[tokio::test]
async fn test_failure_broadcast_to_every_subscriber() {
    let harness = HarnessBuilder::new()
        .research(
            ScriptedResearch::with_script(vec![Err(CapabilityError::Auth(
                "invalid key".to_string(),
            ))])
            .with_delay(Duration::from_millis(20)),
        )
        .build();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            harness
                .orchestrator
                .generate_async(request("Cognizant", 2025, 10))
                .unwrap()
        })
        .collect();
    let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;

    let errors: Vec<_> = results.into_iter().map(|r| r.unwrap_err()).collect();
    assert!(errors.iter().all(|e| e == &errors[0]));
    assert_eq!(errors[0].code(), "AUTH_ERROR");
    // Fatal errors are not retried
    assert_eq!(harness.research.calls(), 1);
    assert_eq!(harness.generation.calls(), 0);

    // Nothing persisted, and the next request starts fresh work
    let stats = harness.orchestrator.statistics().await.unwrap();
    assert_eq!(stats.store.total_tests, 0);
    let report = harness
        .orchestrator
        .generate_sync(request("Cognizant", 2025, 10))
        .await
        .unwrap();
    assert_eq!(report.artifact.question_count(), 10);
    assert_eq!(harness.research.calls(), 2);
}

#[tokio::test]
async fn test_pool_bound_holds_under_load() {
    let harness = HarnessBuilder::new()
        .pool_size(3)
        .research(ScriptedResearch::new().with_delay(Duration::from_millis(40)))
        .build();

    let companies = ["TCS", "Infosys", "Wipro", "Accenture", "Capgemini"];
    let handles: Vec<_> = companies
        .iter()
        .map(|c| {
            harness
                .orchestrator
                .generate_async(request(c, 2025, 5))
                .unwrap()
        })
        .collect();
    assert_eq!(harness.orchestrator.active_runs().len(), 5);

    let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(harness.research.calls(), 5);
    assert!(harness.research.tracker.peak() <= 3);
    assert!(harness.research.tracker.peak() >= 2);
}

#[tokio::test]
async fn test_force_regenerate_bypasses_fresh_cache() {
    let harness = HarnessBuilder::new().build();
    let first = harness
        .orchestrator
        .generate_sync(request("Accenture", 2025, 6))
        .await
        .unwrap();

    let forced = harness
        .orchestrator
        .generate_sync(request("Accenture", 2025, 6).with_force_regenerate(true))
        .await
        .unwrap();

    assert!(!forced.from_cache);
    assert!(!forced.research_reused);
    assert_ne!(forced.artifact.test_id, first.artifact.test_id);
    assert_eq!(harness.research.calls(), 2);
    assert_eq!(harness.generation.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_timeout_reaches_all_subscribers() {
    let harness = HarnessBuilder::new()
        .run_timeout_secs(1)
        .generation(ScriptedGeneration::new().with_delay(Duration::from_secs(5)))
        .build();

    let a = harness
        .orchestrator
        .generate_async(request("Capgemini", 2025, 5))
        .unwrap();
    let b = harness
        .orchestrator
        .generate_async(request("Capgemini", 2025, 5))
        .unwrap();

    let (a, b) = tokio::join!(a.wait(), b.wait());
    assert_eq!(a.unwrap_err().code(), "PIPELINE_TIMEOUT");
    assert_eq!(b.unwrap_err().code(), "PIPELINE_TIMEOUT");
    let stats = harness.orchestrator.statistics().await.unwrap();
    assert_eq!(stats.store.total_tests, 0);
}

#[tokio::test]
async fn test_detached_caller_does_not_cancel_run() {
    let harness = HarnessBuilder::new()
        .research(ScriptedResearch::new().with_delay(Duration::from_millis(100)))
        .build();

    let handle = harness
        .orchestrator
        .generate_async(request("HCL", 2025, 5))
        .unwrap();
    assert!(handle
        .wait_timeout(Duration::from_millis(5))
        .await
        .is_none());

    let late = harness
        .orchestrator
        .generate_async(request("HCL Technologies", 2025, 5))
        .unwrap();
    assert!(late.joined());
    let report = late.wait().await.unwrap();
    assert_eq!(report.artifact.question_count(), 5);
    assert_eq!(harness.research.calls(), 1);
}

#[tokio::test]
async fn test_distinct_requests_admitted_in_submission_order() {
    let harness = HarnessBuilder::new()
        .pool_size(1)
        .research(
            ScriptedResearch::new()
                .with_delay(Duration::from_millis(5))
                .failing_for("Wipro"),
        )
        .build();

    let companies = ["Accenture", "TCS", "Wipro", "Infosys", "Capgemini"];
    let handles: Vec<_> = companies
        .iter()
        .map(|c| {
            harness
                .orchestrator
                .generate_async(request(c, 2025, 5))
                .unwrap()
        })
        .collect();
    let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;

    let queries = harness.research.queries();
    assert_eq!(queries.len(), companies.len());
    for (query, company) in queries.iter().zip(companies) {
        assert!(query.starts_with(company), "{} ran out of order", query);
    }
    assert_eq!(results[2].as_ref().unwrap_err().code(), "AUTH_ERROR");
    assert_eq!(
        results.iter().filter(|r| r.is_ok()).count(),
        companies.len() - 1
    );
    assert_eq!(harness.research.tracker.peak(), 1);
}

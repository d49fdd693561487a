//! Persistence gateway atomicity and orchestrator persistence failures

use crate::integration::test_utils::{request, HarnessBuilder};
use examforge::model::{Difficulty, Question};
use examforge::persistence::{NewTest, PersistenceGateway, SledTestStore};
use examforge::types::TestId;
use tempfile::TempDir;

fn question(section: &str, n: usize) -> Question {
    Question {
        text: format!("{} question {}", section, n),
        options: [
            "one".to_string(),
            "two".to_string(),
            "three".to_string(),
            "four".to_string(),
        ],
        correct_option: n % 4,
        explanation: Some("because".to_string()),
        difficulty: Difficulty::Hard,
        section: section.to_string(),
        topic: Some("Series".to_string()),
    }
}

fn new_test() -> NewTest {
    NewTest {
        company: "Wipro".to_string(),
        normalized_company: "wipro".to_string(),
        year: 2025,
        pattern_data: "Wipro NLTH pattern".to_string(),
    }
}

#[tokio::test]
async fn test_saved_test_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let questions: Vec<_> = (0..4)
        .map(|n| question(if n < 2 { "Quant" } else { "Verbal" }, n))
        .collect();

    let test_id = {
        let store = SledTestStore::open(dir.path(), 5000).unwrap();
        let test_id = store.create_test(&new_test()).await.unwrap();
        store.add_questions(test_id, &questions).await.unwrap();
        store.flush().await.unwrap();
        test_id
    };

    let store = SledTestStore::open(dir.path(), 5000).unwrap();
    let artifact = store.get_test(test_id).await.unwrap().unwrap();
    assert_eq!(artifact.questions, questions);
    assert_eq!(artifact.sections, vec!["Quant", "Verbal"]);
    assert_eq!(artifact.company, "Wipro");
}

#[tokio::test]
async fn test_get_missing_test() {
    let dir = TempDir::new().unwrap();
    let store = SledTestStore::open(dir.path(), 5000).unwrap();
    assert!(store.get_test(TestId(42)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_question_order_preserved_past_ten() {
    let dir = TempDir::new().unwrap();
    let store = SledTestStore::open(dir.path(), 5000).unwrap();
    let questions: Vec<_> = (0..25).map(|n| question("Quant", n)).collect();
    let artifact = store.save_test(&new_test(), &questions).await.unwrap();
    assert_eq!(artifact.questions, questions);
}

#[tokio::test]
async fn test_persistence_failure_leaves_nothing_visible() {
    let harness = HarnessBuilder::new().failing_gateway().build();

    let err = harness
        .orchestrator
        .generate_sync(request("Accenture", 2025, 5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_ERROR");

    let stats = harness.orchestrator.statistics().await.unwrap();
    assert_eq!(stats.store.total_tests, 0);
    // The artifact tier was never populated, so a retry runs the pipeline again
    let err = harness
        .orchestrator
        .generate_sync(request("Accenture", 2025, 5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_ERROR");
    assert_eq!(harness.generation.calls(), 2);
}

//! Persistence Gateway
//!
//! Durable storage of generated tests. A test is created in a pending state and only becomes
//! visible once its questions are committed; questions and the visibility flip happen in one
//! sled transaction, so readers never observe a test with a partial question list.

use crate::error::{PipelineError, StorageError};
use crate::model::{sections_of, Question, TestArtifact};
use crate::types::TestId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default cap on stored research pattern text
pub const DEFAULT_PATTERN_DATA_MAX_CHARS: usize = 5000;

/// Header for a test about to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewTest {
    pub company: String,
    pub normalized_company: String,
    pub year: u16,
    /// Research text the questions were generated from
    pub pattern_data: String,
}

/// Aggregate counts over visible tests
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStatistics {
    pub total_tests: usize,
    pub total_questions: usize,
    pub tests_per_company: BTreeMap<String, usize>,
    pub latest_test: Option<TestId>,
    pub latest_created_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Create a test that stays invisible until questions are added
    async fn create_test(&self, test: &NewTest) -> Result<TestId, PipelineError>;

    /// Atomically attach questions and make the test visible
    async fn add_questions(&self, test_id: TestId, questions: &[Question])
        -> Result<(), PipelineError>;

    /// Drop a test that never received its questions
    async fn discard_pending(&self, test_id: TestId) -> Result<(), PipelineError>;

    async fn get_test(&self, test_id: TestId) -> Result<Option<TestArtifact>, PipelineError>;

    async fn statistics(&self) -> Result<StoreStatistics, PipelineError>;

    /// Push committed writes to durable storage
    async fn flush(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Create, fill and read back a test. Nothing stays visible on failure.
    async fn save_test(
        &self,
        test: &NewTest,
        questions: &[Question],
    ) -> Result<TestArtifact, PipelineError> {
        let test_id = self.create_test(test).await?;
        if let Err(e) = self.add_questions(test_id, questions).await {
            if let Err(cleanup) = self.discard_pending(test_id).await {
                warn!(test_id = %test_id, error = %cleanup, "Failed to discard pending test");
            }
            return Err(e);
        }
        self.flush().await?;
        self.get_test(test_id).await?.ok_or_else(|| {
            PipelineError::Persistence(format!("Test {} missing after commit", test_id))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TestRecord {
    test_id: TestId,
    company: String,
    normalized_company: String,
    year: u16,
    pattern_data: String,
    sections: Vec<String>,
    question_count: usize,
    created_at: DateTime<Utc>,
}

/// Truncate on a character boundary
pub fn truncate_pattern_data(pattern_data: &str, max_chars: usize) -> String {
    pattern_data.chars().take(max_chars).collect()
}

fn question_key(test_id: TestId, index: usize) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&test_id.to_key());
    key[8..].copy_from_slice(&(index as u64).to_be_bytes());
    key
}

/// Sled-based implementation of PersistenceGateway
pub struct SledTestStore {
    db: sled::Db,
    tests: sled::Tree,
    pending: sled::Tree,
    questions: sled::Tree,
    pattern_data_max_chars: usize,
}

impl SledTestStore {
    /// Open (or create) a store at `path`
    pub fn open<P: AsRef<Path>>(path: P, pattern_data_max_chars: usize) -> Result<Self, PipelineError> {
        let db = sled::open(path).map_err(StorageError::from)?;
        Self::from_db(db, pattern_data_max_chars)
    }

    fn from_db(db: sled::Db, pattern_data_max_chars: usize) -> Result<Self, PipelineError> {
        let tests = db.open_tree("tests").map_err(StorageError::from)?;
        let pending = db.open_tree("pending_tests").map_err(StorageError::from)?;
        let questions = db.open_tree("questions").map_err(StorageError::from)?;
        Ok(Self {
            db,
            tests,
            pending,
            questions,
            pattern_data_max_chars,
        })
    }

    fn read_record(tree: &sled::Tree, test_id: TestId) -> Result<Option<TestRecord>, StorageError> {
        match tree.get(test_id.to_key())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_questions(&self, test_id: TestId) -> Result<Vec<Question>, StorageError> {
        let mut questions = Vec::new();
        for item in self.questions.scan_prefix(test_id.to_key()) {
            let (_, value) = item?;
            questions.push(bincode::deserialize(&value)?);
        }
        Ok(questions)
    }
}

#[async_trait]
impl PersistenceGateway for SledTestStore {
    async fn create_test(&self, test: &NewTest) -> Result<TestId, PipelineError> {
        let test_id = TestId(self.db.generate_id().map_err(StorageError::from)?);
        let record = TestRecord {
            test_id,
            company: test.company.clone(),
            normalized_company: test.normalized_company.clone(),
            year: test.year,
            pattern_data: truncate_pattern_data(&test.pattern_data, self.pattern_data_max_chars),
            sections: Vec::new(),
            question_count: 0,
            created_at: Utc::now(),
        };
        let bytes = bincode::serialize(&record).map_err(StorageError::from)?;
        self.pending
            .insert(test_id.to_key(), bytes)
            .map_err(StorageError::from)?;
        debug!(test_id = %test_id, company = %test.company, "Created pending test");
        Ok(test_id)
    }

    async fn add_questions(
        &self,
        test_id: TestId,
        questions: &[Question],
    ) -> Result<(), PipelineError> {
        let encoded: Vec<Vec<u8>> = questions
            .iter()
            .map(bincode::serialize)
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)?;
        let sections = sections_of(questions);
        let key = test_id.to_key();

        let result: Result<(), TransactionError<StorageError>> =
            (&self.pending, &self.tests, &self.questions).transaction(
                |(pending, tests, question_tree)| {
                    let bytes = pending
                        .get(key)?
                        .ok_or(ConflictableTransactionError::Abort(StorageError::TestNotFound(
                            test_id.as_u64(),
                        )))?;
                    let mut record: TestRecord = bincode::deserialize(&bytes).map_err(|e| {
                        ConflictableTransactionError::Abort(StorageError::Codec(e.to_string()))
                    })?;
                    record.sections = sections.clone();
                    record.question_count = encoded.len();
                    let record_bytes = bincode::serialize(&record).map_err(|e| {
                        ConflictableTransactionError::Abort(StorageError::Codec(e.to_string()))
                    })?;

                    for (index, question) in encoded.iter().enumerate() {
                        question_tree.insert(&question_key(test_id, index)[..], question.as_slice())?;
                    }
                    tests.insert(&key[..], record_bytes)?;
                    pending.remove(&key[..])?;
                    Ok(())
                },
            );

        result.map_err(|e| match e {
            TransactionError::Abort(e) => PipelineError::from(e),
            TransactionError::Storage(e) => PipelineError::from(StorageError::from(e)),
        })?;

        info!(
            test_id = %test_id,
            question_count = questions.len(),
            "Committed test questions"
        );
        Ok(())
    }

    async fn discard_pending(&self, test_id: TestId) -> Result<(), PipelineError> {
        self.pending
            .remove(test_id.to_key())
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn get_test(&self, test_id: TestId) -> Result<Option<TestArtifact>, PipelineError> {
        let Some(record) = Self::read_record(&self.tests, test_id)? else {
            return Ok(None);
        };
        let questions = self.read_questions(test_id)?;
        Ok(Some(TestArtifact {
            test_id: record.test_id,
            company: record.company,
            normalized_company: record.normalized_company,
            year: record.year,
            sections: record.sections,
            questions,
            created_at: record.created_at,
        }))
    }

    async fn statistics(&self) -> Result<StoreStatistics, PipelineError> {
        let mut stats = StoreStatistics::default();
        for item in self.tests.iter() {
            let (_, value) = item.map_err(StorageError::from)?;
            let record: TestRecord = bincode::deserialize(&value).map_err(StorageError::from)?;
            stats.total_tests += 1;
            stats.total_questions += record.question_count;
            *stats
                .tests_per_company
                .entry(record.normalized_company.clone())
                .or_insert(0) += 1;
            if stats
                .latest_created_at
                .map_or(true, |latest| record.created_at >= latest)
            {
                stats.latest_created_at = Some(record.created_at);
                stats.latest_test = Some(record.test_id);
            }
        }
        Ok(stats)
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        self.db.flush_async().await.map_err(StorageError::from)?;
        Ok(())
    }
}

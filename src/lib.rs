//! Examforge: Research-Driven Placement Exam Generation
//!
//! Orchestrates a research capability and a question-generation capability into
//! persisted, cached, company-specific practice tests. Identical concurrent requests
//! share one execution, the number of executing pipelines is bounded, and generated
//! content is validated before it is accepted.

pub mod batch;
pub mod cache;
pub mod cli;
pub mod company;
pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod stage;
pub mod types;

pub use batch::{BatchFailure, BatchReport, BatchScheduler, BatchSuccess};
pub use cache::{Fingerprint, TieredCache};
pub use company::CompanyTable;
pub use error::{ErrorReport, PipelineError};
pub use model::{Difficulty, GenerationRequest, Question, TestArtifact};
pub use pipeline::{GenerationHandle, PipelineOrchestrator, PipelineReport, PipelineResult};

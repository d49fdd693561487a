//! External-call stages of the pipeline

pub mod generation;
pub mod prompt;
pub mod research;
pub mod validation;

pub use generation::GenerationStage;
pub use research::ResearchStage;
pub use validation::ValidationIssue;

//! CLI output: error mapping from pipeline errors to the stable CLI surface.

use crate::error::PipelineError;

/// `CODE: message`, one line
pub fn map_error(e: &PipelineError) -> String {
    let report = e.report();
    format!("{}: {}", report.code, report.message)
}

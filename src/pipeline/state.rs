//! Per-run state machine

use crate::cache::Fingerprint;
use crate::error::PipelineError;
use crate::types::RunId;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Init,
    CacheCheck,
    Research,
    Generation,
    Persist,
    CachePopulate,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Init, CacheCheck)
                | (CacheCheck, Done)
                | (CacheCheck, Research)
                | (Research, Generation)
                | (Generation, Persist)
                | (Persist, CachePopulate)
                | (CachePopulate, Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::CacheCheck => "cache_check",
            PipelineState::Research => "research",
            PipelineState::Generation => "generation",
            PipelineState::Persist => "persist",
            PipelineState::CachePopulate => "cache_populate",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state of one run and the time spent in each state
#[derive(Debug)]
pub struct PipelineRun {
    run_id: RunId,
    fingerprint: Fingerprint,
    state: PipelineState,
    entered_at: Instant,
    started_at: Instant,
    timings: Vec<(PipelineState, Duration)>,
}

impl PipelineRun {
    pub fn new(run_id: RunId, fingerprint: Fingerprint) -> Self {
        let now = Instant::now();
        Self {
            run_id,
            fingerprint,
            state: PipelineState::Init,
            entered_at: now,
            started_at: now,
            timings: Vec::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time spent in each state that has been left
    pub fn timings(&self) -> &[(PipelineState, Duration)] {
        &self.timings
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::Internal(format!(
                "illegal pipeline transition {} -> {}",
                self.state, next
            )));
        }
        let now = Instant::now();
        self.timings
            .push((self.state, now.duration_since(self.entered_at)));
        debug!(
            run_id = %self.run_id,
            fingerprint = %self.fingerprint.short(),
            from = %self.state,
            to = %next,
            "Pipeline transition"
        );
        self.state = next;
        self.entered_at = now;
        Ok(())
    }

    /// Move to `Failed` unless already terminal
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            // Non-terminal states always accept Failed.
            let _ = self.advance(PipelineState::Failed);
        }
    }
}

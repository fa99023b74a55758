//! Runner lifecycle
//!
//! `Idle → Initializing → Running(0) → … → Running(n-1) → Aggregating → Done`.
//! A panicking suite moves the runner to `Error`, which resumes at the next
//! suite. `Done` and `Error` return to `Idle` when the runner is reused.

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runner state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunnerState {
    Idle,
    Initializing,
    /// Executing the suite at this index
    Running(usize),
    Aggregating,
    Done,
    /// Recovered failure; execution resumes at `resume_at`
    Error { resume_at: usize },
}

impl RunnerState {
    /// Check if a run is in progress
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Running(_) | Self::Aggregating | Self::Error { .. }
        )
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("IDLE"),
            Self::Initializing => f.write_str("INITIALIZING"),
            Self::Running(i) => write!(f, "RUNNING({i})"),
            Self::Aggregating => f.write_str("AGGREGATING"),
            Self::Done => f.write_str("DONE"),
            Self::Error { resume_at } => write!(f, "ERROR(resume at {resume_at})"),
        }
    }
}

/// Validate a state transition
///
/// # Errors
/// `StateMachineError::InvalidTransition` when `to` is not reachable from `from`.
pub fn validate_transition(from: RunnerState, to: RunnerState) -> Result<(), StateMachineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: RunnerState) -> Vec<RunnerState> {
    use RunnerState::*;
    match from {
        Idle => vec![Initializing, Error { resume_at: 0 }],
        Initializing => vec![Running(0), Aggregating, Error { resume_at: 0 }],
        Running(i) => vec![
            Running(i.saturating_add(1)),
            Aggregating,
            Error {
                resume_at: i.saturating_add(1),
            },
        ],
        Aggregating => vec![Done, Error { resume_at: 0 }],
        Done => vec![Idle],
        Error { resume_at } => vec![Running(resume_at), Aggregating, Idle],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let path = [
            RunnerState::Idle,
            RunnerState::Initializing,
            RunnerState::Running(0),
            RunnerState::Running(1),
            RunnerState::Aggregating,
            RunnerState::Done,
            RunnerState::Idle,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn suites_cannot_be_skipped() {
        assert!(validate_transition(RunnerState::Running(0), RunnerState::Running(2)).is_err());
        assert!(validate_transition(RunnerState::Idle, RunnerState::Running(0)).is_err());
        assert!(validate_transition(RunnerState::Done, RunnerState::Running(0)).is_err());
    }

    #[test]
    fn error_resumes_at_next_suite() {
        let err = RunnerState::Error { resume_at: 3 };
        assert!(validate_transition(RunnerState::Running(2), err).is_ok());
        assert!(validate_transition(err, RunnerState::Running(3)).is_ok());
        assert!(validate_transition(err, RunnerState::Running(2)).is_err());
    }
}

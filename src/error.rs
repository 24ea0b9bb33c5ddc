//! Execution errors and termination reasons

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type for VM execution.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    Timeout,
    Error,
    MaxSteps,
    UserStopped,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationReason::Completed => "completed",
            TerminationReason::Timeout => "timeout",
            TerminationReason::Error => "error",
            TerminationReason::MaxSteps => "max_steps",
            TerminationReason::UserStopped => "user_stopped",
        };
        f.write_str(name)
    }
}

/// An unmatched bracket found by static validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unmatched '{bracket}' at position {position}")]
pub struct BracketError {
    pub bracket: char,
    pub position: usize,
}

/// Failure reported by an [`InputProvider`](crate::input::InputProvider).
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input channel closed")]
    Closed,

    #[error("input read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal conditions that end a run.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Unmatched '{bracket}' at position {position}")]
    UnmatchedBracket { bracket: char, position: usize },

    #[error("Memory limit exceeded ({limit} cells) at position {position}")]
    MemoryLimit { limit: usize, position: usize },

    #[error("Maximum steps exceeded ({limit})")]
    StepLimit { limit: u64 },

    #[error("Execution timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("Execution stopped by user")]
    UserStopped,

    #[error("Input unavailable at position {position}: {source}")]
    InputUnavailable {
        position: usize,
        #[source]
        source: InputError,
    },
}

impl ExecError {
    /// The termination reason reported for this failure.
    pub fn reason(&self) -> TerminationReason {
        match self {
            ExecError::StepLimit { .. } => TerminationReason::MaxSteps,
            ExecError::Timeout { .. } => TerminationReason::Timeout,
            ExecError::UserStopped => TerminationReason::UserStopped,
            ExecError::UnmatchedBracket { .. }
            | ExecError::MemoryLimit { .. }
            | ExecError::InputUnavailable { .. } => TerminationReason::Error,
        }
    }

    /// Program position of the offending instruction, when there is one.
    pub fn position(&self) -> Option<usize> {
        match self {
            ExecError::UnmatchedBracket { position, .. }
            | ExecError::MemoryLimit { position, .. }
            | ExecError::InputUnavailable { position, .. } => Some(*position),
            _ => None,
        }
    }
}

impl From<BracketError> for ExecError {
    fn from(err: BracketError) -> Self {
        ExecError::UnmatchedBracket {
            bracket: err.bracket,
            position: err.position,
        }
    }
}

//! Error types for Selfheal Core
//!
//! Provides error handling for:
//! - Harness infrastructure failures (fatal for a run)
//! - Configuration loading and validation
//! - Remediation failures (recorded per fix, never fatal)

use crate::types::IssueType;
use selfheal_browser::BrowserError;
use std::path::PathBuf;

/// Main harness error type
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Browser session failure outside a test step
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Report artifacts could not be written
    #[error("report output failed at {}: {message}", path.display())]
    Report { path: PathBuf, message: String },

    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Runner state machine violated
    #[error("runner state error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Run aborted by the kill switch
    #[error("run cancelled")]
    Cancelled,

    /// Global run deadline passed
    #[error("run deadline of {secs}s exceeded")]
    DeadlineExceeded { secs: u64 },
}

impl HarnessError {
    /// Check if error must end the process
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::Report { .. } | Self::Serialization(_) => true,
            Self::Browser(e) => e.is_fatal(),
            Self::StateMachine(_) | Self::Cancelled | Self::DeadlineExceeded { .. } => false,
        }
    }

    /// Create report output error
    pub fn report(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Report {
            path: path.into(),
            message: source.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    /// Config file is not valid TOML for the schema
    #[error("cannot parse config: {0}")]
    Parse(String),

    /// URL field is malformed
    #[error("invalid {field} '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// Numeric field must be positive
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Remediation errors
#[derive(Debug, thiserror::Error)]
pub enum FixError {
    /// Patch target could not be read or written
    #[error("cannot patch {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// Persisted state could not be changed
    #[error("state update failed: {0}")]
    Store(#[from] BrowserError),

    /// Backend process could not be managed
    #[error("backend supervisor: {0}")]
    Backend(String),

    /// No remediation registered for the issue type
    #[error("no remediation registered for {0}")]
    NoRemediation(IssueType),

    /// Remediation panicked
    #[error("remediation aborted: {0}")]
    Aborted(String),
}

impl FixError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }
}

/// Runner state machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not in the allowed set
    #[error("invalid runner transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_failure_is_fatal() {
        let err = HarnessError::Browser(BrowserError::LaunchFailed("no chrome".into()));
        assert!(err.is_fatal());
    }

    #[test]
    fn probe_failure_is_not_fatal() {
        let err = HarnessError::Browser(BrowserError::element_not_found(".tab"));
        assert!(!err.is_fatal());
        assert!(!HarnessError::Cancelled.is_fatal());
    }

    #[test]
    fn fix_error_names_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = FixError::io("src/setupProxy.js", &io);
        assert!(err.to_string().contains("src/setupProxy.js"));
    }
}

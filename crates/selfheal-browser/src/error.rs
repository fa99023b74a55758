//! Error types for the browser layer
//!
//! Display strings are part of the contract: the issue classifier reads them,
//! so each variant renders text that names its failure family.

use std::path::PathBuf;

/// Errors raised while driving the application under test
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrowserError {
    /// Browser binary could not be started (fatal for a run)
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    /// Page navigation failed
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// No element matched any selector of a chain
    #[error("element not found: '{selector}'")]
    ElementNotFound { selector: String },

    /// Operation exceeded its time budget
    #[error("timeout after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Login did not leave the login page
    #[error("authentication failed for role '{role}': still on /login ({detail})")]
    Authentication { role: String, detail: String },

    /// No credentials configured for the role
    #[error("no credentials configured for role '{0}'")]
    UnknownRole(String),

    /// Element exists but cannot be interacted with
    #[error("element '{selector}' is not interactable: {reason}")]
    NotInteractable { selector: String, reason: String },

    /// Script evaluation or protocol failure
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// Storage access failed
    #[error("localStorage access failed: {0}")]
    Storage(String),

    /// Screenshot capture or write failed
    #[error("screenshot failed: {0}")]
    Screenshot(String),

    /// Filesystem error
    #[error("io error at {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// Session already closed
    #[error("browser session closed")]
    SessionClosed,
}

impl BrowserError {
    /// Create navigation error
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create element-not-found error
    pub fn element_not_found(selector: impl Into<String>) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
        }
    }

    /// Create timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Check if the error ends the browser session
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LaunchFailed(_) | Self::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_not_found_quotes_selector() {
        let err = BrowserError::element_not_found(".order-item");
        assert_eq!(err.to_string(), "element not found: '.order-item'");
    }

    #[test]
    fn authentication_mentions_login() {
        let err = BrowserError::Authentication {
            role: "barista".into(),
            detail: "401 Unauthorized".into(),
        };
        let text = err.to_string();
        assert!(text.contains("authentication failed"));
        assert!(text.contains("/login"));
    }

    #[test]
    fn fatal_errors() {
        assert!(BrowserError::LaunchFailed("no chrome".into()).is_fatal());
        assert!(BrowserError::SessionClosed.is_fatal());
        assert!(!BrowserError::timeout("load", 100).is_fatal());
    }
}

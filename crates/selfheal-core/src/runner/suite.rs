//! Suite seam and step recording

use crate::config::HarnessConfig;
use crate::types::{elapsed_ms, TestCase};
use parking_lot::Mutex;
use selfheal_browser::{BrowserDriver, BrowserError, Selector, SelectorChain, StoreKey};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Shared, append-only record of executed steps
pub type Recorder = Arc<Mutex<Vec<TestCase>>>;

/// A named group of test steps for one functional area
///
/// Steps record their own results through [`SuiteContext::step`]; `run`
/// never fails.
#[async_trait::async_trait]
pub trait TestSuite: Send + Sync {
    /// Suite name used in test cases and reports
    fn name(&self) -> &str;

    /// Execute every step in declaration order
    async fn run(&self, ctx: &SuiteContext<'_>);
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub message: String,
    pub stack: Option<String>,
}

impl StepFailure {
    /// Create failed assertion
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// With detail text appended for the classifier
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<BrowserError> for StepFailure {
    fn from(error: BrowserError) -> Self {
        Self::assertion(error.to_string())
    }
}

/// Result of one test step
pub type StepResult = Result<(), StepFailure>;

/// Execution context handed to a suite
pub struct SuiteContext<'a> {
    driver: &'a BrowserDriver,
    config: &'a HarnessConfig,
    suite: String,
    recorder: Recorder,
}

impl<'a> SuiteContext<'a> {
    /// Create context for `suite`
    #[must_use]
    pub fn new(
        driver: &'a BrowserDriver,
        config: &'a HarnessConfig,
        suite: impl Into<String>,
        recorder: Recorder,
    ) -> Self {
        Self {
            driver,
            config,
            suite: suite.into(),
            recorder,
        }
    }

    #[inline]
    #[must_use]
    pub fn driver(&self) -> &'a BrowserDriver {
        self.driver
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &'a HarnessConfig {
        self.config
    }

    #[inline]
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Run one named step and record its outcome; returns whether it passed
    ///
    /// A failing step gets a best-effort screenshot.
    pub async fn step<F>(&self, name: &str, fut: F) -> bool
    where
        F: Future<Output = StepResult> + Send,
    {
        let started = Instant::now();
        let outcome = fut.await;
        let duration_ms = elapsed_ms(started);

        let case = match outcome {
            Ok(()) => {
                tracing::info!("  ✓ {}", name);
                TestCase::passed(&self.suite, name)
            }
            Err(failure) => {
                tracing::info!("  ✗ {}: {}", name, failure.message);
                let mut case = TestCase::failed(&self.suite, name, failure.message);
                if let Some(stack) = failure.stack {
                    case = case.with_stack(stack);
                }
                if let Some(path) = self.failure_screenshot(name).await {
                    case = case.with_screenshot(path);
                }
                case
            }
        };
        let passed = case.passed;
        self.recorder.lock().push(case.with_duration_ms(duration_ms));
        passed
    }

    async fn failure_screenshot(&self, name: &str) -> Option<std::path::PathBuf> {
        self.driver.screenshot_dir()?;
        match self
            .driver
            .capture_screenshot(&format!("{}-{}", self.suite, name))
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("failure screenshot for '{}' not captured: {}", name, e);
                None
            }
        }
    }

    /// Sign in as `role` unless that role is already signed in
    ///
    /// # Errors
    /// Login failure.
    pub async fn ensure_login(&self, role: &str) -> StepResult {
        let store = self.driver.store();
        let current_role = store.get(StoreKey::UserRole).await?;
        let token = store.get(StoreKey::AuthToken).await?;
        if current_role.as_deref() == Some(role) && token.is_some() {
            return Ok(());
        }
        self.driver.login(role).await?;
        Ok(())
    }

    /// Click the tab labelled `label`
    ///
    /// # Errors
    /// No such tab, or the click failed.
    pub async fn open_tab(&self, label: &str) -> StepResult {
        let chain = SelectorChain::new(vec![
            Selector::text("[role=\"tab\"]", label),
            Selector::text(".tab", label),
            Selector::text("button", label),
        ]);
        self.driver.click(&chain).await?;
        Ok(())
    }

    /// Require at least one match of `chain`
    ///
    /// # Errors
    /// `ElementNotFound` naming the chain.
    pub async fn expect_any(&self, chain: &SelectorChain) -> StepResult {
        self.driver.expect(chain).await?;
        Ok(())
    }

    /// Navigate and fail the step on navigation error
    ///
    /// # Errors
    /// Navigation failure.
    pub async fn visit(&self, path: &str) -> StepResult {
        self.driver.navigate(path).await.into_result()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_errors_keep_their_text() {
        let failure = StepFailure::from(BrowserError::element_not_found(".stock-item"));
        assert_eq!(failure.message, "element not found: '.stock-item'");
        assert!(failure.stack.is_none());
    }
}

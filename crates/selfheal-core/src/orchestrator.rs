//! Retry loop
//!
//! Drives the cycle `run tests → (all pass → done) | (classify → fix →
//! (anything fixed → cool down → rerun) | (nothing fixed → done))` within the
//! configured cycle budget. One browser session serves the whole run so that
//! persisted state written by fixes is visible to the next cycle.

use crate::classifier::IssueClassifier;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::fixer::Fixer;
use crate::runner::TestRunner;
use crate::types::{elapsed_ms, Cycle, CycleStatus, FinalStatus, Issue, RunResult, TestReport};
use chrono::Utc;
use selfheal_browser::{BrowserDriver, BrowserError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Creates the browser session for a run
#[async_trait::async_trait]
pub trait DriverFactory: Send + Sync {
    /// Start a session configured from `config`
    ///
    /// # Errors
    /// Any launch failure; it ends the run.
    async fn launch(&self, config: &HarnessConfig) -> Result<BrowserDriver, BrowserError>;
}

/// Launches Chrome through the DevTools protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

#[async_trait::async_trait]
impl DriverFactory for ChromeLauncher {
    async fn launch(&self, config: &HarnessConfig) -> Result<BrowserDriver, BrowserError> {
        let driver = BrowserDriver::launch(config.browser.clone(), config.base_url.as_str()).await?;
        Ok(driver
            .with_credentials(config.credentials.clone())
            .with_screenshot_dir(&config.screenshot_dir))
    }
}

/// Clonable kill switch for a run
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Create new untriggered handle
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger cancellation
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Check if cancellation was triggered
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation is triggered
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in self, so this only returns once triggered
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

async fn until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Bounded self-healing loop
pub struct Orchestrator {
    config: Arc<HarnessConfig>,
    runner: TestRunner,
    classifier: IssueClassifier,
    fixer: Fixer,
    launcher: Arc<dyn DriverFactory>,
    cancel: CancelHandle,
}

impl Orchestrator {
    /// Create orchestrator with default suites, remediations and Chrome
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        let config = Arc::new(config);
        Self {
            runner: TestRunner::new(Arc::clone(&config)),
            classifier: IssueClassifier::new(config.api_base_url.as_str()),
            fixer: Fixer::new(Arc::clone(&config)),
            launcher: Arc::new(ChromeLauncher),
            cancel: CancelHandle::new(),
            config,
        }
    }

    /// With a custom session factory
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn DriverFactory>) -> Self {
        self.launcher = launcher;
        self
    }

    /// With a custom runner
    #[must_use]
    pub fn with_runner(mut self, runner: TestRunner) -> Self {
        self.runner = runner;
        self
    }

    /// With a custom fixer
    #[must_use]
    pub fn with_fixer(mut self, fixer: Fixer) -> Self {
        self.fixer = fixer;
        self
    }

    /// With an externally owned kill switch
    #[must_use]
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Kill switch of this orchestrator
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Execute the loop until a terminal condition
    ///
    /// # Errors
    /// `HarnessError::Browser` if the browser session cannot be started.
    /// Everything after launch is recorded in the result instead.
    pub async fn run(&self) -> Result<RunResult, HarnessError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let max_cycles = self.config.max_retries;
        let deadline = self
            .config
            .run_timeout_secs
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

        tracing::info!(
            "→ self-healing run against {} (up to {} cycles)",
            self.config.base_url,
            max_cycles
        );
        let driver = self.launcher.launch(&self.config).await.map_err(|e| {
            tracing::error!("✗ browser launch failed: {}", e);
            HarnessError::from(e)
        })?;

        let mut cycles: Vec<Cycle> = Vec::new();
        let mut final_status = FinalStatus::Failed;

        for number in 1..=max_cycles {
            tracing::info!("=== Cycle {}/{} ===", number, max_cycles);
            let cycle_started = Instant::now();
            driver.events().clear();

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(HarnessError::Cancelled),
                () = until(deadline) => Err(self.deadline_error()),
                report = self.runner.run(&driver) => Ok(report),
            };
            let slow_requests = driver.events().slow_requests(self.config.slow_request_ms);

            let report = match outcome {
                Ok(report) => report,
                Err(reason) => {
                    tracing::warn!("✗ cycle {} aborted: {}", number, reason);
                    cycles.push(Cycle {
                        number,
                        test_report: self.runner.partial_report(),
                        issues: Vec::new(),
                        fixes: Vec::new(),
                        status: CycleStatus::Error,
                        duration_ms: elapsed_ms(cycle_started),
                        slow_requests,
                        error: Some(reason.to_string()),
                    });
                    final_status = FinalStatus::Error;
                    break;
                }
            };

            let mut cycle = Cycle {
                number,
                test_report: TestReport::from_tests(Vec::new()),
                issues: Vec::new(),
                fixes: Vec::new(),
                status: CycleStatus::Failed,
                duration_ms: 0,
                slow_requests,
                error: None,
            };

            if report.all_passed() {
                tracing::info!("✓ all {} tests passed", report.summary.total);
                cycle.status = CycleStatus::Passed;
                cycle.test_report = report;
                cycle.duration_ms = elapsed_ms(cycle_started);
                cycles.push(cycle);
                final_status = FinalStatus::Passed;
                break;
            }

            let issues = self.classifier.analyze(&report);
            for issue in &issues {
                tracing::info!(
                    "  ⚠ {} [{}] {} / {}",
                    issue.issue_type,
                    issue.severity,
                    issue.suite(),
                    issue.source_test.name
                );
            }
            cycle.test_report = report;

            if !issues.iter().any(Issue::is_fixable) {
                tracing::info!("✗ no fixable issues; manual attention required");
                cycle.issues = issues;
                cycle.duration_ms = elapsed_ms(cycle_started);
                cycles.push(cycle);
                break;
            }

            let fixes = self.fixer.fix_all(&issues, driver.store()).await;
            let applied = fixes.iter().filter(|f| f.success).count();
            tracing::info!("→ {} of {} fixes applied", applied, fixes.len());
            cycle.issues = issues;
            cycle.fixes = fixes;
            cycle.duration_ms = elapsed_ms(cycle_started);

            if applied == 0 {
                tracing::info!("✗ no fix succeeded; stopping");
                cycles.push(cycle);
                break;
            }
            cycle.status = CycleStatus::Fixed;
            cycles.push(cycle);

            if number == max_cycles {
                tracing::info!("✗ retry budget of {} cycles exhausted", max_cycles);
                break;
            }

            tracing::info!("→ cooling down for {}ms", self.config.cooldown_ms);
            let interrupted = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Some(HarnessError::Cancelled),
                () = until(deadline) => Some(self.deadline_error()),
                () = tokio::time::sleep(Duration::from_millis(self.config.cooldown_ms)) => None,
            };
            if let Some(reason) = interrupted {
                tracing::warn!("✗ run aborted during cooldown: {}", reason);
                if let Some(last) = cycles.last_mut() {
                    last.error = Some(reason.to_string());
                }
                final_status = FinalStatus::Error;
                break;
            }
        }

        if let Err(e) = driver.close().await {
            tracing::warn!("browser close failed: {}", e);
        }
        self.fixer.shutdown().await;

        let result = RunResult {
            cycles,
            final_status,
            total_duration_ms: elapsed_ms(started),
            started_at,
            base_url: self.config.base_url.clone(),
        };
        tracing::info!(
            "=== {} after {} cycle(s) in {}ms ===",
            result.final_status,
            result.cycles.len(),
            result.total_duration_ms
        );
        Ok(result)
    }

    fn deadline_error(&self) -> HarnessError {
        HarnessError::DeadlineExceeded {
            secs: self.config.run_timeout_secs.unwrap_or_default(),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("base_url", &self.config.base_url)
            .field("max_retries", &self.config.max_retries)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_handle_wakes_waiters() {
        let handle = CancelHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.cancelled().await })
        };
        assert!(!handle.is_cancelled());
        handle.cancel();
        waiter.await.unwrap();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .unwrap();
    }

    #[cfg(not(feature = "cdp"))]
    #[tokio::test]
    async fn launch_failure_is_fatal() {
        let orchestrator = Orchestrator::new(HarnessConfig::default());
        let err = orchestrator.run().await.unwrap_err();
        assert!(err.is_fatal());
    }
}

//! Test execution
//!
//! The [`TestRunner`] executes its suites sequentially against one browser
//! session. Steps record into a shared recorder as they complete, so a run
//! that is aborted midway still yields the results collected so far through
//! [`TestRunner::partial_report`].

pub mod state;
pub mod suite;
pub mod suites;

pub use state::{allowed_transitions, validate_transition, RunnerState};
pub use suite::{Recorder, StepFailure, StepResult, SuiteContext, TestSuite};
pub use suites::default_suites;

use crate::config::HarnessConfig;
use crate::types::{panic_message, TestCase, TestReport};
use futures::FutureExt;
use parking_lot::Mutex;
use selfheal_browser::BrowserDriver;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Name of the synthetic case recorded when a suite aborts
pub const SUITE_EXECUTION: &str = "Suite Execution";

/// Sequential suite executor
pub struct TestRunner {
    suites: Vec<Arc<dyn TestSuite>>,
    config: Arc<HarnessConfig>,
    state: Mutex<RunnerState>,
    recorded: Recorder,
}

impl TestRunner {
    /// Create runner with the default suites
    #[must_use]
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self::with_suites(config, default_suites())
    }

    /// Create runner with custom suites
    #[must_use]
    pub fn with_suites(config: Arc<HarnessConfig>, suites: Vec<Arc<dyn TestSuite>>) -> Self {
        Self {
            suites,
            config,
            state: Mutex::new(RunnerState::Idle),
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    /// Suite names in execution order
    #[must_use]
    pub fn suite_names(&self) -> Vec<&str> {
        self.suites.iter().map(|s| s.name()).collect()
    }

    fn transition(&self, to: RunnerState) {
        let mut state = self.state.lock();
        if let Err(e) = validate_transition(*state, to) {
            tracing::warn!("{}", e);
        }
        tracing::debug!("runner {} -> {}", *state, to);
        *state = to;
    }

    /// Execute every suite and aggregate the results
    ///
    /// Never fails: step failures are recorded as failing cases and a
    /// panicking suite is recorded as a failing [`SUITE_EXECUTION`] case.
    pub async fn run(&self, driver: &BrowserDriver) -> TestReport {
        {
            let mut state = self.state.lock();
            if state.is_active() {
                tracing::warn!("runner restarted while {}", *state);
            }
            *state = RunnerState::Idle;
        }
        self.recorded.lock().clear();

        self.transition(RunnerState::Initializing);
        tracing::info!(
            "→ running {} suites against {}",
            self.suites.len(),
            driver.base_url()
        );

        for (index, suite) in self.suites.iter().enumerate() {
            self.transition(RunnerState::Running(index));
            tracing::info!("▶ {}", suite.name());

            let ctx = SuiteContext::new(
                driver,
                &self.config,
                suite.name(),
                Arc::clone(&self.recorded),
            );
            if let Err(panic) = AssertUnwindSafe(suite.run(&ctx)).catch_unwind().await {
                let message = panic_message(&*panic);
                tracing::warn!("  ✗ {} aborted: {}", suite.name(), message);
                self.recorded.lock().push(TestCase::failed(
                    suite.name(),
                    SUITE_EXECUTION,
                    format!("suite aborted: {message}"),
                ));
                self.transition(RunnerState::Error {
                    resume_at: index + 1,
                });
            }
        }

        self.transition(RunnerState::Aggregating);
        let report = self.partial_report();
        tracing::info!(
            "{} tests: {} passed, {} failed",
            report.summary.total,
            report.summary.passed,
            report.summary.failed
        );
        self.transition(RunnerState::Done);
        report
    }

    /// Report of every case recorded so far in the current run
    #[must_use]
    pub fn partial_report(&self) -> TestReport {
        TestReport::from_tests(self.recorded.lock().clone())
    }
}

impl std::fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunner")
            .field("suites", &self.suite_names())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfheal_browser::{LaunchOptions, ScriptedBackend};

    struct Steps(&'static str, Vec<bool>);

    #[async_trait::async_trait]
    impl TestSuite for Steps {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, ctx: &SuiteContext<'_>) {
            for (i, pass) in self.1.iter().enumerate() {
                ctx.step(&format!("step {i}"), async move {
                    if *pass {
                        Ok(())
                    } else {
                        Err(StepFailure::assertion("element not found: '.x'"))
                    }
                })
                .await;
            }
        }
    }

    struct Panicking;

    #[async_trait::async_trait]
    impl TestSuite for Panicking {
        fn name(&self) -> &str {
            "Panicking"
        }

        async fn run(&self, ctx: &SuiteContext<'_>) {
            ctx.step("before", async { Ok(()) }).await;
            panic!("index out of bounds");
        }
    }

    fn driver() -> BrowserDriver {
        let options = LaunchOptions {
            timeout_ms: 200,
            network_idle_ms: 0,
            ..LaunchOptions::default()
        };
        BrowserDriver::with_backend(
            Arc::new(ScriptedBackend::new("http://app.test")),
            options,
            "http://app.test",
        )
    }

    #[tokio::test]
    async fn failing_step_does_not_stop_suite() {
        let runner = TestRunner::with_suites(
            Arc::new(HarnessConfig::default()),
            vec![Arc::new(Steps("A", vec![true, false, true]))],
        );
        let report = runner.run(&driver()).await;
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(runner.state(), RunnerState::Done);
    }

    #[tokio::test]
    async fn panicking_suite_is_recorded_and_run_continues() {
        let runner = TestRunner::with_suites(
            Arc::new(HarnessConfig::default()),
            vec![
                Arc::new(Panicking),
                Arc::new(Steps("After", vec![true])),
            ],
        );
        let report = runner.run(&driver()).await;
        let names: Vec<&str> = report.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["before", SUITE_EXECUTION, "step 0"]);
        assert!(report.tests[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("index out of bounds")));
        assert_eq!(runner.state(), RunnerState::Done);
    }

    #[tokio::test]
    async fn rerun_starts_fresh() {
        let runner = TestRunner::with_suites(
            Arc::new(HarnessConfig::default()),
            vec![Arc::new(Steps("A", vec![true]))],
        );
        let driver = driver();
        runner.run(&driver).await;
        let second = runner.run(&driver).await;
        assert_eq!(second.summary.total, 1);
    }
}

//! Selfheal Core - autonomous UI test-and-repair loop
//!
//! Provides:
//! - A [`TestRunner`] executing ordered suites against one browser session
//! - An [`IssueClassifier`] turning failures into typed, prioritized issues
//! - A [`Fixer`] applying idempotent remediations to state and source files
//! - An [`Orchestrator`] running the bounded retry loop
//! - A [`ReportGenerator`] rendering the cycle history
//!
//! # Example
//!
//! ```rust,ignore
//! use selfheal_core::{HarnessConfig, Orchestrator, ReportGenerator};
//!
//! # async fn example() -> Result<(), selfheal_core::HarnessError> {
//! let config = HarnessConfig::default().with_max_retries(3);
//! let result = Orchestrator::new(config).run().await?;
//!
//! println!("{}", ReportGenerator::new(&result).generate_text());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod classifier;
pub mod config;
pub mod error;
pub mod fixer;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod types;

pub use classifier::{classify_text, deduplicate, prioritize, IssueClassifier, PatternRule};
pub use config::{BackendConfig, HarnessConfig, PatchTargetPaths};
pub use error::{ConfigError, FixError, HarnessError, StateMachineError};
pub use fixer::{
    BackendStatus, BackendSupervisor, FixContext, FixOutcome, Fixer, PatchEdit, PatchOutcome,
    PatchTarget, Remediation, RemediationRegistry,
};
pub use orchestrator::{CancelHandle, ChromeLauncher, DriverFactory, Orchestrator};
pub use report::{write_artifacts, ArtifactPaths, Metrics, ReportGenerator};
pub use runner::{RunnerState, StepFailure, SuiteContext, TestRunner, TestSuite};
pub use types::{
    Cycle, CycleStatus, FinalStatus, FixResult, Issue, IssueType, RunResult, Severity, Summary,
    TestCase, TestReport,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

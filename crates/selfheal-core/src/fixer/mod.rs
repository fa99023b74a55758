//! Automated remediation
//!
//! A [`Fixer`] maps each fixable [`Issue`] to the [`Remediation`] registered
//! for its type and applies it. Remediations run one at a time; a fix that
//! returns an error or panics is reported as a failed [`FixResult`] and never
//! stops the remaining fixes.

pub mod patch;
pub mod process;
pub mod registry;
pub mod strategies;

pub use patch::{PatchEdit, PatchOutcome, PatchTarget};
pub use process::{BackendStatus, BackendSupervisor};
pub use registry::RemediationRegistry;

use crate::config::HarnessConfig;
use crate::error::FixError;
use crate::types::{panic_message, FixResult, Issue};
use futures::FutureExt;
use selfheal_browser::KeyValueStore;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a remediation may touch
#[derive(Clone)]
pub struct FixContext {
    pub store: Arc<dyn KeyValueStore>,
    pub config: Arc<HarnessConfig>,
    pub supervisor: Arc<BackendSupervisor>,
}

/// What a remediation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixOutcome {
    actions: Vec<String>,
    changed: bool,
}

impl FixOutcome {
    /// Record an action that changed state
    pub fn changed(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
        self.changed = true;
    }

    /// Record an observation without a change
    pub fn note(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
    }

    /// Record a file patch outcome
    pub fn patch(&mut self, outcome: &PatchOutcome) {
        self.actions.push(outcome.describe());
        self.changed |= outcome.changed();
    }

    /// Check if anything changed
    #[inline]
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Recorded actions in order
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Actions joined for the fix result
    #[must_use]
    pub fn summary(&self) -> String {
        self.actions.join("; ")
    }
}

/// Remediation for one family of issues
///
/// Implementations must be idempotent: applying twice leaves the same state
/// as applying once, and the second application reports no change.
#[async_trait::async_trait]
pub trait Remediation: Send + Sync {
    /// Stable identifier
    fn name(&self) -> &'static str;

    /// Apply to the application under test
    ///
    /// # Errors
    /// Any [`FixError`]; the caller records it and continues.
    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<FixOutcome, FixError>;
}

/// Applies remediations for classified issues
pub struct Fixer {
    registry: RemediationRegistry,
    config: Arc<HarnessConfig>,
    supervisor: Arc<BackendSupervisor>,
    write_lock: Mutex<()>,
}

impl Fixer {
    /// Create fixer with the built-in remediations
    #[must_use]
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self::with_registry(config, RemediationRegistry::with_defaults())
    }

    /// Create fixer with a custom registry
    #[must_use]
    pub fn with_registry(config: Arc<HarnessConfig>, registry: RemediationRegistry) -> Self {
        let supervisor = Arc::new(BackendSupervisor::new(
            config.health_url(),
            config.backend.clone(),
        ));
        Self {
            registry,
            config,
            supervisor,
            write_lock: Mutex::new(()),
        }
    }

    /// Registered remediations
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &RemediationRegistry {
        &self.registry
    }

    /// Backend supervisor shared by remediations
    #[inline]
    #[must_use]
    pub fn supervisor(&self) -> &Arc<BackendSupervisor> {
        &self.supervisor
    }

    /// Apply the remediation for one issue
    ///
    /// Succeeds only if something actually changed.
    pub async fn fix(&self, issue: &Issue, store: Arc<dyn KeyValueStore>) -> FixResult {
        let _guard = self.write_lock.lock().await;
        self.fix_locked(issue, store).await
    }

    async fn fix_locked(&self, issue: &Issue, store: Arc<dyn KeyValueStore>) -> FixResult {
        if !issue.is_fixable() {
            return FixResult::failed(issue, "no automated remediation for this issue");
        }
        let Some(remediation) = self.registry.get(issue.issue_type) else {
            return FixResult::failed(issue, FixError::NoRemediation(issue.issue_type).to_string());
        };

        let ctx = FixContext {
            store,
            config: Arc::clone(&self.config),
            supervisor: Arc::clone(&self.supervisor),
        };
        tracing::debug!(
            "applying {} for {} ({})",
            remediation.name(),
            issue.issue_type,
            issue.suite()
        );

        let attempt = AssertUnwindSafe(remediation.apply(issue, &ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(FixError::Aborted(panic_message(&*panic))));

        match attempt {
            Ok(outcome) if outcome.is_changed() => {
                tracing::info!("  ✓ {} ({}): {}", issue.issue_type, issue.suite(), outcome.summary());
                FixResult::applied(issue, outcome.summary())
            }
            Ok(outcome) => {
                tracing::info!(
                    "  · {} ({}): nothing to change ({})",
                    issue.issue_type,
                    issue.suite(),
                    outcome.summary()
                );
                FixResult::unchanged(issue, outcome.summary())
            }
            Err(e) => {
                tracing::warn!("  ✗ {} ({}): {}", issue.issue_type, issue.suite(), e);
                FixResult::failed(issue, e.to_string())
            }
        }
    }

    /// Apply remediations for every fixable issue, in order
    pub async fn fix_all(&self, issues: &[Issue], store: Arc<dyn KeyValueStore>) -> Vec<FixResult> {
        let _guard = self.write_lock.lock().await;
        let mut results = Vec::new();
        for issue in issues {
            if !issue.is_fixable() {
                tracing::info!(
                    "  ⚠ {} ({}) needs manual attention: {}",
                    issue.issue_type,
                    issue.suite(),
                    issue.suggested_fix
                );
                continue;
            }
            results.push(self.fix_locked(issue, Arc::clone(&store)).await);
        }
        results
    }

    /// Stop any backend process started by a remediation
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}

impl std::fmt::Debug for Fixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixer")
            .field("registry", &self.registry)
            .field("dry_run", &self.config.dry_run)
            .finish_non_exhaustive()
    }
}

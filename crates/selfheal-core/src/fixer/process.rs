//! Backend process supervision
//!
//! Probes the backend health endpoint and, when it is down and a spawn
//! command is configured, starts the backend as a child process owned by the
//! current run.

use crate::config::BackendConfig;
use crate::error::FixError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend state after `ensure_running`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    /// Health probe succeeded
    Healthy,
    /// Spawned a process that now answers the probe
    Started { pid: Option<u32> },
    /// Unhealthy and no spawn command configured
    NotConfigured,
    /// Spawned but still not answering
    Unresponsive,
}

/// Owns at most one backend child process
#[derive(Debug)]
pub struct BackendSupervisor {
    client: reqwest::Client,
    health_url: String,
    config: BackendConfig,
    child: Mutex<Option<Child>>,
}

impl BackendSupervisor {
    /// Create supervisor probing `health_url`
    #[must_use]
    pub fn new(health_url: impl Into<String>, config: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            health_url: health_url.into(),
            config,
            child: Mutex::new(None),
        }
    }

    /// Probe URL
    #[inline]
    #[must_use]
    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Check if the health endpoint answers with a success status
    pub async fn probe(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!("health probe {} failed: {}", self.health_url, e);
                false
            }
        }
    }

    /// Start the backend unless it is already healthy
    ///
    /// # Errors
    /// `FixError::Backend` if the configured command cannot be spawned.
    pub async fn ensure_running(&self) -> Result<BackendStatus, FixError> {
        if self.probe().await {
            return Ok(BackendStatus::Healthy);
        }
        let Some(program) = self.config.command.as_deref() else {
            return Ok(BackendStatus::NotConfigured);
        };

        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                tracing::debug!("backend process already running; waiting for health");
                drop(guard);
                return Ok(self.await_health(None).await);
            }
        }

        let mut command = Command::new(program);
        command
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| FixError::Backend(format!("cannot spawn '{program}': {e}")))?;
        let pid = child.id();
        tracing::info!("→ started backend process '{}' (pid {:?})", program, pid);
        *guard = Some(child);
        drop(guard);

        Ok(self.await_health(pid).await)
    }

    async fn await_health(&self, pid: Option<u32>) -> BackendStatus {
        tokio::time::sleep(Duration::from_millis(self.config.startup_wait_ms)).await;
        if self.probe().await {
            BackendStatus::Started { pid }
        } else {
            BackendStatus::Unresponsive
        }
    }

    /// Stop a spawned backend, if any
    pub async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to stop backend process: {}", e);
            }
        }
    }
}

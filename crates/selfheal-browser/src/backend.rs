//! Backend seam between the driver and a concrete browser
//!
//! Implement [`BrowserBackend`] to plug in a different automation engine.

use crate::error::BrowserError;
use crate::events::BrowserEvent;
use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Snapshot of one matched element
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Lowercase tag name
    pub tag: String,
    /// `type` attribute for inputs/buttons
    #[serde(default)]
    pub input_type: Option<String>,
    /// `name` attribute
    #[serde(default)]
    pub name: Option<String>,
    /// Visible text or current value, truncated
    #[serde(default)]
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
}

impl ElementInfo {
    /// Check if the element can be interacted with
    #[inline]
    #[must_use]
    pub fn is_interactable(&self) -> bool {
        self.visible && self.enabled
    }

    /// Short label for logs and interaction records
    #[must_use]
    pub fn label(&self) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }
        self.name
            .clone()
            .unwrap_or_else(|| format!("<{}>", self.tag))
    }
}

/// Launch options for a browser session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,
    /// Pause after each interaction (milliseconds)
    pub slow_mo_ms: u64,
    /// Viewport size
    pub viewport: Viewport,
    /// Per-operation timeout (milliseconds)
    pub timeout_ms: u64,
    /// Quiet window that counts as network idle (milliseconds)
    pub network_idle_ms: u64,
    /// Explicit Chrome/Chromium binary
    #[serde(default)]
    pub chrome_executable: Option<String>,
}

impl LaunchOptions {
    /// Per-operation timeout as a duration
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            slow_mo_ms: 0,
            viewport: Viewport::default(),
            timeout_ms: 15_000,
            network_idle_ms: 500,
            chrome_executable: None,
        }
    }
}

/// Viewport size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Operations a concrete browser must provide
///
/// Every method may suspend; callers bound them with their own timeouts.
#[async_trait::async_trait]
pub trait BrowserBackend: Send + Sync {
    /// Load `url`
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Current page URL
    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Snapshot all elements matching `selector`
    async fn query(&self, selector: &Selector) -> Result<Vec<ElementInfo>, BrowserError>;

    /// Click the `index`-th match of `selector`
    async fn click(&self, selector: &Selector, index: usize) -> Result<(), BrowserError>;

    /// Type `value` into the `index`-th match of `selector`
    async fn fill(&self, selector: &Selector, index: usize, value: &str)
        -> Result<(), BrowserError>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    /// Events observed since the previous drain, in arrival order
    async fn drain_events(&self) -> Result<Vec<BrowserEvent>, BrowserError>;

    /// Read a persisted key
    async fn storage_get(&self, key: &str) -> Result<Option<String>, BrowserError>;

    /// Write a persisted key
    async fn storage_set(&self, key: &str, value: &str) -> Result<(), BrowserError>;

    /// Remove a persisted key
    async fn storage_remove(&self, key: &str) -> Result<(), BrowserError>;

    /// HTTP status of a GET issued from the page context
    async fn fetch_status(&self, url: &str) -> Result<u16, BrowserError>;

    /// End the session
    async fn close(&self) -> Result<(), BrowserError>;
}

//! Browser driver
//!
//! Owns one browser session for the lifetime of a run. Every backend call is
//! bounded by the per-operation timeout; events are drained into the ordered
//! [`EventLog`] after each interaction.

use crate::backend::{BrowserBackend, ElementInfo, LaunchOptions};
use crate::error::BrowserError;
use crate::events::{ConsoleMessage, EventLog, NetworkEvent, NetworkTiming, PageError};
use crate::selector::{Selector, SelectorChain};
use crate::store::{BrowserStore, KeyValueStore, StoreKey};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Login credentials for one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Create credentials
    #[inline]
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Result of a navigation; failures are returned, not raised
#[derive(Debug, Clone)]
pub enum NavigationOutcome {
    Loaded { url: String, elapsed_ms: u64 },
    Failed { url: String, error: BrowserError },
}

impl NavigationOutcome {
    /// Check if the page loaded
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }

    /// Convert into a result for `?` chaining
    pub fn into_result(self) -> Result<(), BrowserError> {
        match self {
            Self::Loaded { .. } => Ok(()),
            Self::Failed { error, .. } => Err(error),
        }
    }
}

/// Kind of fuzzing interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Click,
    Fill,
    Toggle,
}

/// One interaction performed by `click_all_buttons`/`test_all_form_fields`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub kind: InteractionKind,
    pub selector: String,
    pub index: usize,
    pub label: String,
    pub value: Option<String>,
    pub before: Option<PathBuf>,
    pub after: Option<PathBuf>,
    pub error: Option<String>,
}

impl InteractionRecord {
    /// Check if the interaction went through
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Driver over one browser session
pub struct BrowserDriver {
    backend: Arc<dyn BrowserBackend>,
    options: LaunchOptions,
    base_url: String,
    credentials: BTreeMap<String, Credentials>,
    events: EventLog,
    screenshot_dir: Option<PathBuf>,
}

impl std::fmt::Debug for BrowserDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserDriver")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .field("roles", &self.credentials.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl BrowserDriver {
    /// Launch a Chrome session
    ///
    /// # Errors
    /// `BrowserError::LaunchFailed` if the browser cannot start or the crate
    /// was built without the `cdp` feature.
    pub async fn launch(
        options: LaunchOptions,
        base_url: impl Into<String>,
    ) -> Result<Self, BrowserError> {
        let backend = launch_backend(&options).await?;
        Ok(Self::with_backend(backend, options, base_url))
    }

    /// Drive an existing backend
    #[must_use]
    pub fn with_backend(
        backend: Arc<dyn BrowserBackend>,
        options: LaunchOptions,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            options,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: BTreeMap::new(),
            events: EventLog::new(),
            screenshot_dir: None,
        }
    }

    /// With role credential table
    #[must_use]
    pub fn with_credentials(mut self, credentials: BTreeMap<String, Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// With screenshot output directory
    #[must_use]
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    /// Launch options in effect
    #[inline]
    #[must_use]
    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    /// Screenshot output directory, if any
    #[inline]
    #[must_use]
    pub fn screenshot_dir(&self) -> Option<&Path> {
        self.screenshot_dir.as_deref()
    }

    /// Application base URL
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an application path
    #[must_use]
    pub fn url_for(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else if path_or_url.starts_with('/') {
            format!("{}{}", self.base_url, path_or_url)
        } else {
            format!("{}/{}", self.base_url, path_or_url)
        }
    }

    /// Persisted application state of this session
    #[must_use]
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(BrowserStore::new(Arc::clone(&self.backend)))
    }

    /// Event log of this session
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Console messages in arrival order
    #[must_use]
    pub fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.events.console_messages()
    }

    /// Network requests/responses in arrival order
    #[must_use]
    pub fn network_events(&self) -> Vec<NetworkEvent> {
        self.events.network_events()
    }

    /// Uncaught page errors in arrival order
    #[must_use]
    pub fn page_errors(&self) -> Vec<PageError> {
        self.events.page_errors()
    }

    /// Paired request/response timings
    #[must_use]
    pub fn network_timings(&self) -> Vec<NetworkTiming> {
        self.events.network_timings()
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, BrowserError>
    where
        F: Future<Output = Result<T, BrowserError>>,
    {
        match tokio::time::timeout(self.options.timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::timeout(operation, self.options.timeout_ms)),
        }
    }

    /// Move backend events into the log; returns how many arrived
    pub async fn sync_events(&self) -> usize {
        match self.backend.drain_events().await {
            Ok(events) => {
                let count = events.len();
                self.events.extend(events);
                count
            }
            Err(e) => {
                tracing::debug!("event drain failed: {}", e);
                0
            }
        }
    }

    async fn pause(&self) {
        if self.options.slow_mo_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.options.slow_mo_ms)).await;
        }
    }

    /// Load a page and wait for network idle
    pub async fn navigate(&self, path_or_url: &str) -> NavigationOutcome {
        let url = self.url_for(path_or_url);
        self.sync_events().await;
        let started = Instant::now();

        let result = self
            .bounded(
                &format!("navigation to {url}"),
                self.backend.goto(&url, self.options.timeout()),
            )
            .await;

        match result {
            Ok(()) => {
                self.wait_for_network_idle().await;
                let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::debug!("loaded {} in {}ms", url, elapsed_ms);
                NavigationOutcome::Loaded { url, elapsed_ms }
            }
            Err(error) => {
                tracing::debug!("navigation failed: {}", error);
                self.sync_events().await;
                NavigationOutcome::Failed { url, error }
            }
        }
    }

    /// Drain events until the network has been quiet for the idle window
    async fn wait_for_network_idle(&self) {
        let idle = Duration::from_millis(self.options.network_idle_ms);
        let deadline = Instant::now() + self.options.timeout();
        let mut quiet_since = Instant::now();

        loop {
            let before = self.events.network_len();
            self.sync_events().await;
            if self.events.network_len() != before {
                quiet_since = Instant::now();
            }
            if quiet_since.elapsed() >= idle || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL.min(idle)).await;
        }
    }

    /// Current page URL
    ///
    /// # Errors
    /// Backend failure or timeout.
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        self.bounded("current url", self.backend.current_url()).await
    }

    /// First selector of `chain` with at least one match
    ///
    /// # Errors
    /// Backend failure or timeout.
    pub async fn resolve(
        &self,
        chain: &SelectorChain,
    ) -> Result<Option<(Selector, Vec<ElementInfo>)>, BrowserError> {
        for selector in chain {
            let found = self
                .bounded(&format!("query {selector}"), self.backend.query(selector))
                .await?;
            if !found.is_empty() {
                return Ok(Some((selector.clone(), found)));
            }
        }
        Ok(None)
    }

    /// Number of elements matched by the first matching selector
    ///
    /// # Errors
    /// Backend failure or timeout.
    pub async fn element_count(&self, chain: &SelectorChain) -> Result<usize, BrowserError> {
        Ok(self
            .resolve(chain)
            .await?
            .map_or(0, |(_, elements)| elements.len()))
    }

    /// Poll until `chain` matches or `timeout` passes
    ///
    /// # Errors
    /// `BrowserError::ElementNotFound` naming the chain when nothing matched.
    pub async fn wait_for(
        &self,
        chain: &SelectorChain,
        timeout: Duration,
    ) -> Result<(Selector, Vec<ElementInfo>), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self.resolve(chain).await? {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::element_not_found(chain.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }

    /// Wait using the per-operation timeout
    ///
    /// # Errors
    /// See [`BrowserDriver::wait_for`].
    pub async fn expect(
        &self,
        chain: &SelectorChain,
    ) -> Result<(Selector, Vec<ElementInfo>), BrowserError> {
        self.wait_for(chain, self.options.timeout()).await
    }

    /// Click the first interactable match of `chain`
    ///
    /// # Errors
    /// Element missing, not interactable, or backend failure.
    pub async fn click(&self, chain: &SelectorChain) -> Result<(), BrowserError> {
        let (selector, elements) = self.expect(chain).await?;
        let index = elements
            .iter()
            .position(ElementInfo::is_interactable)
            .ok_or_else(|| BrowserError::NotInteractable {
                selector: selector.to_string(),
                reason: "no visible enabled match".into(),
            })?;
        self.bounded(
            &format!("click {selector}"),
            self.backend.click(&selector, index),
        )
        .await?;
        self.pause().await;
        self.sync_events().await;
        Ok(())
    }

    /// Click the `index`-th match of `selector`
    ///
    /// # Errors
    /// Element missing, not interactable, or backend failure.
    pub async fn click_nth(&self, selector: &Selector, index: usize) -> Result<(), BrowserError> {
        self.bounded(
            &format!("click {selector}[{index}]"),
            self.backend.click(selector, index),
        )
        .await?;
        self.pause().await;
        self.sync_events().await;
        Ok(())
    }

    /// Type `value` into the first interactable match of `chain`
    ///
    /// # Errors
    /// Element missing, not interactable, or backend failure.
    pub async fn fill(&self, chain: &SelectorChain, value: &str) -> Result<(), BrowserError> {
        let (selector, elements) = self.expect(chain).await?;
        let index = elements
            .iter()
            .position(ElementInfo::is_interactable)
            .ok_or_else(|| BrowserError::NotInteractable {
                selector: selector.to_string(),
                reason: "no visible enabled match".into(),
            })?;
        self.bounded(
            &format!("fill {selector}"),
            self.backend.fill(&selector, index, value),
        )
        .await?;
        self.pause().await;
        Ok(())
    }

    /// Sign in as `role` using the configured credential table
    ///
    /// # Errors
    /// `BrowserError::UnknownRole`, a navigation/element error, or
    /// `BrowserError::Authentication` when the URL still contains `/login`
    /// after the timeout.
    pub async fn login(&self, role: &str) -> Result<(), BrowserError> {
        let credentials = self
            .credentials
            .get(role)
            .cloned()
            .ok_or_else(|| BrowserError::UnknownRole(role.to_string()))?;
        self.login_with(role, &credentials).await
    }

    /// Sign in with explicit credentials
    ///
    /// # Errors
    /// See [`BrowserDriver::login`].
    pub async fn login_with(
        &self,
        role: &str,
        credentials: &Credentials,
    ) -> Result<(), BrowserError> {
        tracing::debug!("logging in as {}", role);
        self.navigate("/login").await.into_result()?;

        self.fill(&SelectorChain::username_input(), &credentials.username)
            .await?;
        self.fill(&SelectorChain::password_input(), &credentials.password)
            .await?;
        self.click(&SelectorChain::login_submit()).await?;

        let deadline = Instant::now() + self.options.timeout();
        loop {
            let url = self.current_url().await?;
            if !url.contains("/login") {
                self.wait_for_network_idle().await;
                return Ok(());
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            self.sync_events().await;
        }

        let detail = self
            .events
            .console_messages()
            .iter()
            .rev()
            .find(|m| m.is_error())
            .map_or_else(
                || format!("no redirect after {}ms", self.options.timeout_ms),
                |m| m.text.clone(),
            );
        Err(BrowserError::Authentication {
            role: role.to_string(),
            detail,
        })
    }

    /// Sign out and return to the login page
    ///
    /// # Errors
    /// Storage or navigation failure.
    pub async fn logout(&self) -> Result<(), BrowserError> {
        if self.element_count(&SelectorChain::logout()).await? > 0 {
            self.click(&SelectorChain::logout()).await?;
        } else {
            self.store().remove_all(&StoreKey::AUTH).await?;
        }
        self.navigate("/login").await.into_result()
    }

    /// HTTP status of a GET issued from the page
    ///
    /// # Errors
    /// Network failure or timeout.
    pub async fn fetch_status(&self, url: &str) -> Result<u16, BrowserError> {
        let result = self
            .bounded(&format!("fetch {url}"), self.backend.fetch_status(url))
            .await;
        self.sync_events().await;
        result
    }

    /// Click every visible, enabled button on the current page
    ///
    /// Sign-out controls are skipped. Returns to the starting URL whenever a
    /// click navigates away; if that return fails the sweep stops, since the
    /// remaining indices belong to the starting page. Mutates application state.
    pub async fn click_all_buttons(&self) -> Vec<InteractionRecord> {
        let selector = Selector::css("button");
        let mut records = Vec::new();
        let Ok(start_url) = self.current_url().await else {
            return records;
        };
        let Ok(buttons) = self
            .bounded("query buttons", self.backend.query(&selector))
            .await
        else {
            return records;
        };

        for (index, info) in buttons.iter().enumerate() {
            if !info.is_interactable() || is_sign_out(info) {
                continue;
            }
            let label = info.label();
            let before = self.capture_optional(&format!("before-click-{label}")).await;
            let error = self
                .bounded(
                    &format!("click {selector}[{index}]"),
                    self.backend.click(&selector, index),
                )
                .await
                .err()
                .map(|e| e.to_string());
            self.pause().await;
            self.sync_events().await;
            let after = self.capture_optional(&format!("after-click-{label}")).await;

            tracing::debug!("clicked button '{}'", label);
            records.push(InteractionRecord {
                kind: InteractionKind::Click,
                selector: selector.to_string(),
                index,
                label: label.clone(),
                value: None,
                before,
                after,
                error,
            });

            if let Ok(url) = self.current_url().await {
                if url != start_url {
                    if let NavigationOutcome::Failed { error, .. } = self.navigate(&start_url).await {
                        tracing::warn!(
                            "⚠ cannot return to {} after clicking '{}': {}; stopping button sweep",
                            start_url,
                            label,
                            error
                        );
                        break;
                    }
                }
            }
        }
        records
    }

    /// Fill every visible, enabled form field with a type-appropriate value
    ///
    /// Checkboxes and radios are clicked instead. Mutates application state.
    pub async fn test_all_form_fields(&self) -> Vec<InteractionRecord> {
        let mut records = Vec::new();
        for css in ["input", "textarea", "select"] {
            let selector = Selector::css(css);
            let Ok(fields) = self
                .bounded(&format!("query {css}"), self.backend.query(&selector))
                .await
            else {
                continue;
            };

            for (index, info) in fields.iter().enumerate() {
                if !info.is_interactable() {
                    continue;
                }
                let input_type = info.input_type.as_deref().unwrap_or("text");
                if matches!(input_type, "hidden" | "submit" | "button" | "file" | "reset") {
                    continue;
                }
                let label = info.label();
                let before = self.capture_optional(&format!("before-fill-{label}")).await;

                let (kind, value, result) = if matches!(input_type, "checkbox" | "radio") {
                    let result = self
                        .bounded(
                            &format!("toggle {selector}[{index}]"),
                            self.backend.click(&selector, index),
                        )
                        .await;
                    (InteractionKind::Toggle, None, result)
                } else {
                    let value = sample_value(info);
                    let result = self
                        .bounded(
                            &format!("fill {selector}[{index}]"),
                            self.backend.fill(&selector, index, &value),
                        )
                        .await;
                    (InteractionKind::Fill, Some(value), result)
                };
                self.pause().await;
                self.sync_events().await;
                let after = self.capture_optional(&format!("after-fill-{label}")).await;

                records.push(InteractionRecord {
                    kind,
                    selector: selector.to_string(),
                    index,
                    label,
                    value,
                    before,
                    after,
                    error: result.err().map(|e| e.to_string()),
                });
            }
        }
        records
    }

    /// Write a PNG screenshot named after `name`
    ///
    /// # Errors
    /// No screenshot directory configured, capture failure, or write failure.
    pub async fn capture_screenshot(&self, name: &str) -> Result<PathBuf, BrowserError> {
        let dir = self
            .screenshot_dir
            .as_ref()
            .ok_or_else(|| BrowserError::Screenshot("no screenshot directory configured".into()))?;
        let bytes = self
            .bounded("screenshot", self.backend.screenshot())
            .await?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| BrowserError::io(dir, &e))?;
        let path = screenshot_path(dir, name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| BrowserError::io(&path, &e))?;
        Ok(path)
    }

    async fn capture_optional(&self, name: &str) -> Option<PathBuf> {
        if self.screenshot_dir.is_none() {
            return None;
        }
        match self.capture_screenshot(name).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!("interaction screenshot skipped: {}", e);
                None
            }
        }
    }

    /// End the browser session
    ///
    /// # Errors
    /// Backend failure while closing.
    pub async fn close(&self) -> Result<(), BrowserError> {
        self.sync_events().await;
        self.backend.close().await
    }
}

fn is_sign_out(info: &ElementInfo) -> bool {
    let label = info.label().to_ascii_lowercase();
    ["logout", "log out", "sign out"]
        .iter()
        .any(|needle| label.contains(needle))
}

/// Screenshot file path for a step name
#[must_use]
pub fn screenshot_path(dir: &Path, name: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    dir.join(format!("{}-{stamp}.png", sanitize_file_stem(name)))
}

/// Lowercase, alphanumeric-and-dash file stem
#[must_use]
pub fn sanitize_file_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "screenshot".to_string()
    } else {
        trimmed.chars().take(80).collect()
    }
}

/// Sample value matching a field's type
#[must_use]
pub fn sample_value(info: &ElementInfo) -> String {
    if info.tag == "textarea" {
        return "Sample text for testing".to_string();
    }
    let name = info.name.as_deref().unwrap_or_default().to_ascii_lowercase();
    let value = match info.input_type.as_deref().unwrap_or("text") {
        "email" => "test@example.com",
        "number" | "range" => "42",
        "tel" => "555-0100",
        "password" => "Password123!",
        "date" => "2024-01-15",
        "time" => "09:30",
        "url" => "https://example.com",
        "search" => "latte",
        _ if name.contains("email") => "test@example.com",
        _ if name.contains("phone") => "555-0100",
        _ if name.contains("name") => "Test User",
        _ if name.contains("qty") || name.contains("quantity") => "2",
        _ => "Test input",
    };
    value.to_string()
}

#[cfg(feature = "cdp")]
async fn launch_backend(options: &LaunchOptions) -> Result<Arc<dyn BrowserBackend>, BrowserError> {
    let backend = crate::cdp::CdpBackend::launch(options).await?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "cdp"))]
async fn launch_backend(_options: &LaunchOptions) -> Result<Arc<dyn BrowserBackend>, BrowserError> {
    Err(BrowserError::LaunchFailed(
        "built without the `cdp` feature; no browser engine available".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ClickAction, ScriptedBackend, ScriptedElement, ScriptedPage};

    fn fast_options() -> LaunchOptions {
        LaunchOptions {
            timeout_ms: 200,
            network_idle_ms: 0,
            ..LaunchOptions::default()
        }
    }

    fn login_page() -> ScriptedPage {
        ScriptedPage::new("/login")
            .element(ScriptedElement::input("text", "username"))
            .element(ScriptedElement::input("password", "password"))
            .element(
                ScriptedElement::button("Login")
                    .hook(Selector::css("button[type=submit]"))
                    .on_click(ClickAction::SubmitLogin),
            )
    }

    fn driver(backend: ScriptedBackend) -> (BrowserDriver, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let mut creds = BTreeMap::new();
        creds.insert("barista".to_string(), Credentials::new("barista", "barista123"));
        let driver = BrowserDriver::with_backend(
            Arc::clone(&backend) as Arc<dyn BrowserBackend>,
            fast_options(),
            "http://app.test/",
        )
        .with_credentials(creds);
        (driver, backend)
    }

    #[tokio::test]
    async fn login_leaves_login_page() {
        let (driver, _) = driver(
            ScriptedBackend::new("http://app.test")
                .page(login_page())
                .page(ScriptedPage::new("/barista"))
                .account("barista", "barista123", "barista", "/barista"),
        );
        driver.login("barista").await.unwrap();
        assert!(driver.current_url().await.unwrap().ends_with("/barista"));
    }

    #[tokio::test]
    async fn login_failure_is_authentication_error() {
        let (driver, _) = driver(ScriptedBackend::new("http://app.test").page(login_page()));
        let err = driver.login("barista").await.unwrap_err();
        assert!(matches!(err, BrowserError::Authentication { .. }));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn unknown_role_rejected() {
        let (driver, _) = driver(ScriptedBackend::new("http://app.test").page(login_page()));
        assert!(matches!(
            driver.login("owner").await,
            Err(BrowserError::UnknownRole(_))
        ));
    }

    #[tokio::test]
    async fn navigation_failure_is_returned() {
        let (driver, backend) = driver(ScriptedBackend::new("http://app.test"));
        backend.set_unreachable(true);
        let outcome = driver.navigate("/login").await;
        assert!(!outcome.is_loaded());
    }

    #[tokio::test]
    async fn resolve_uses_first_matching_fallback() {
        let (driver, _) = driver(ScriptedBackend::new("http://app.test").page(login_page()));
        driver.navigate("/login").await.into_result().unwrap();
        let chain = SelectorChain::single("#missing").or(Selector::css("input[type=password]"));
        let (selector, found) = driver.resolve(&chain).await.unwrap().unwrap();
        assert_eq!(selector, Selector::css("input[type=password]"));
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn wait_for_missing_element_names_chain() {
        let (driver, _) = driver(ScriptedBackend::new("http://app.test").page(login_page()));
        driver.navigate("/login").await.into_result().unwrap();
        let err = driver
            .wait_for(&SelectorChain::single(".order-item"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "element not found: '.order-item'");
    }

    #[tokio::test]
    async fn click_all_buttons_skips_disabled() {
        let (driver, backend) = driver(
            ScriptedBackend::new("http://app.test").page(
                ScriptedPage::new("/orders")
                    .element(ScriptedElement::button("Start"))
                    .element(ScriptedElement::button("Archive").disabled())
                    .element(ScriptedElement::button("Ghost").hidden())
                    .element(ScriptedElement::button("Logout").on_click(ClickAction::Logout))
                    .element(ScriptedElement::button("Done")),
            ),
        );
        driver.navigate("/orders").await.into_result().unwrap();
        let records = driver.click_all_buttons().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(InteractionRecord::succeeded));
        assert_eq!(backend.clicks(), vec!["Start".to_string(), "Done".to_string()]);
    }

    #[tokio::test]
    async fn click_sweep_stops_when_return_navigation_fails() {
        let (driver, backend) = driver(
            ScriptedBackend::new("http://app.test")
                .page(
                    ScriptedPage::new("/orders")
                        .element(
                            ScriptedElement::button("Leave")
                                .on_click(ClickAction::NavigateThenDisconnect("/elsewhere".into())),
                        )
                        .element(ScriptedElement::button("Done")),
                )
                .page(
                    ScriptedPage::new("/elsewhere")
                        .element(ScriptedElement::button("Wrong page"))
                        .element(ScriptedElement::button("Also wrong")),
                ),
        );
        driver.navigate("/orders").await.into_result().unwrap();
        let records = driver.click_all_buttons().await;
        assert_eq!(records.len(), 1);
        assert_eq!(backend.clicks(), vec!["Leave".to_string()]);
    }

    #[tokio::test]
    async fn form_fields_get_typed_values() {
        let (driver, _) = driver(
            ScriptedBackend::new("http://app.test").page(
                ScriptedPage::new("/messages")
                    .element(ScriptedElement::input("tel", "phone"))
                    .element(ScriptedElement::input("hidden", "csrf"))
                    .element(ScriptedElement::input("checkbox", "notify")),
            ),
        );
        driver.navigate("/messages").await.into_result().unwrap();
        let records = driver.test_all_form_fields().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value.as_deref(), Some("555-0100"));
        assert_eq!(records[1].kind, InteractionKind::Toggle);
    }

    #[tokio::test]
    async fn screenshot_written_with_sanitized_name() {
        let dir = tempfile::tempdir().unwrap();
        let (driver, _) = driver(ScriptedBackend::new("http://app.test"));
        let driver = driver.with_screenshot_dir(dir.path());
        let path = driver.capture_screenshot("Barista Login / step 1").await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("barista-login-step-1-"));
        assert!(name.ends_with(".png"));
        assert!(path.exists());
    }

    #[test]
    fn url_for_joins_paths() {
        let (driver, _) = driver(ScriptedBackend::new("http://app.test"));
        assert_eq!(driver.url_for("/login"), "http://app.test/login");
        assert_eq!(driver.url_for("display"), "http://app.test/display");
        assert_eq!(driver.url_for("http://other/x"), "http://other/x");
    }

    #[test]
    fn sample_values_follow_type() {
        let email = ElementInfo {
            tag: "input".into(),
            input_type: Some("email".into()),
            ..ElementInfo::default()
        };
        assert_eq!(sample_value(&email), "test@example.com");
        let named = ElementInfo {
            tag: "input".into(),
            input_type: Some("text".into()),
            name: Some("customerName".into()),
            ..ElementInfo::default()
        };
        assert_eq!(sample_value(&named), "Test User");
    }
}

//! Testing utilities for the selfheal workspace
//!
//! Scripted café applications, session launchers and throwaway project trees.

#![allow(missing_docs)]

use chrono::{TimeZone, Utc};
use selfheal_browser::{
    BrowserDriver, BrowserError, ClickAction, LaunchOptions, ScriptedBackend, ScriptedElement,
    ScriptedPage, Selector,
};
use selfheal_core::{
    Cycle, CycleStatus, DriverFactory, FinalStatus, FixResult, HarnessConfig, Issue, IssueType,
    RunResult, Severity, TestCase, TestReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Origin of every fixture application; nothing listens on the discard port
pub const FIXTURE_ORIGIN: &str = "http://127.0.0.1:9";

/// Launch options tuned for scripted sessions
#[must_use]
pub fn fast_options() -> LaunchOptions {
    LaunchOptions {
        timeout_ms: 300,
        network_idle_ms: 0,
        ..LaunchOptions::default()
    }
}

fn tab(label: &str, path: &str) -> ScriptedElement {
    ScriptedElement::button(label)
        .hook(Selector::role("tab"))
        .hook(Selector::css(".tab"))
        .on_click(ClickAction::Navigate(path.to_string()))
}

fn logout_button() -> ScriptedElement {
    ScriptedElement::button("Logout")
        .hook(Selector::css(".logout"))
        .on_click(ClickAction::Logout)
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

fn stock_page(gate: Option<(&str, &str)>) -> ScriptedPage {
    let item = |name: &str| {
        let el = ScriptedElement::new("div", &[".stock-item"]).text(name);
        match gate {
            Some((key, value)) => el.gated_on(key, value),
            None => el,
        }
    };
    ScriptedPage::new("/barista/stock")
        .requires_login()
        .element(item("Espresso beans"))
        .element(item("Oat milk"))
        .element(ScriptedElement::button("Restock"))
}

fn cafe_with_stock(stock: ScriptedPage) -> ScriptedBackend {
    ScriptedBackend::new(FIXTURE_ORIGIN)
        .page(login_page())
        .page(
            ScriptedPage::new("/barista")
                .requires_login()
                .element(tab("Orders", "/barista/orders"))
                .element(tab("Stock", "/barista/stock"))
                .element(tab("Settings", "/barista/settings"))
                .element(tab("Messages", "/barista/messages"))
                .element(logout_button()),
        )
        .page(
            ScriptedPage::new("/barista/orders")
                .requires_login()
                .element(ScriptedElement::new("div", &[".order-item"]).text("Latte x2"))
                .element(ScriptedElement::new("div", &[".order-item"]).text("Flat white"))
                .element(ScriptedElement::button("Start"))
                .element(ScriptedElement::button("Done"))
                .element(ScriptedElement::input("text", "customer_name"))
                .element(ScriptedElement::input("number", "quantity")),
        )
        .page(stock)
        .page(
            ScriptedPage::new("/barista/settings")
                .requires_login()
                .element(ScriptedElement::new("div", &[".settings"]))
                .element(ScriptedElement::input("checkbox", "notifications"))
                .element(ScriptedElement::new("select", &["select"])),
        )
        .page(
            ScriptedPage::new("/barista/messages")
                .requires_login()
                .element(ScriptedElement::new("textarea", &["textarea"]))
                .element(ScriptedElement::button("Send")),
        )
        .page(
            ScriptedPage::new("/display")
                .element(ScriptedElement::new("div", &[".order-item"]).text("Latte x2")),
        )
        .account("barista", "barista123", "barista", "/barista")
        .account("admin", "admin123", "admin", "/barista")
        .account("display", "display123", "display", "/display")
        .api_status("/api/health", 200)
}

/// Healthy café application; every default suite passes against it
#[must_use]
pub fn cafe_app() -> ScriptedBackend {
    cafe_with_stock(stock_page(None))
}

/// Café with a stale token that makes the login endpoint answer 401
///
/// Clearing the stored credentials heals it.
#[must_use]
pub fn expired_session_app() -> ScriptedBackend {
    cafe_app()
        .storage("authToken", "expired-token")
        .login_blocked_by("authToken", "expired-token")
}

/// Café whose stock list only renders with fallback data enabled
///
/// The missing element is never fixed by the selector helper.
#[must_use]
pub fn fallback_only_stock_app() -> ScriptedBackend {
    cafe_with_stock(stock_page(Some(("useFallbackData", "true"))))
}

/// Driver over `backend` with the default credential table
#[must_use]
pub fn scripted_driver(backend: Arc<ScriptedBackend>) -> BrowserDriver {
    BrowserDriver::with_backend(backend, fast_options(), FIXTURE_ORIGIN)
        .with_credentials(HarnessConfig::default().credentials)
}

/// Hands out sessions over one shared scripted backend
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    backend: Arc<ScriptedBackend>,
}

impl ScriptedLauncher {
    /// Create new launcher
    #[inline]
    #[must_use]
    pub fn new(backend: ScriptedBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Backend behind every launched session
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &Arc<ScriptedBackend> {
        &self.backend
    }
}

#[async_trait::async_trait]
impl DriverFactory for ScriptedLauncher {
    async fn launch(&self, config: &HarnessConfig) -> Result<BrowserDriver, BrowserError> {
        let backend: Arc<ScriptedBackend> = Arc::clone(&self.backend);
        Ok(
            BrowserDriver::with_backend(backend, config.browser.clone(), config.base_url.as_str())
                .with_credentials(config.credentials.clone())
                .with_screenshot_dir(&config.screenshot_dir),
        )
    }
}

/// Launcher that never starts a session
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingLauncher;

#[async_trait::async_trait]
impl DriverFactory for FailingLauncher {
    async fn launch(&self, _config: &HarnessConfig) -> Result<BrowserDriver, BrowserError> {
        Err(BrowserError::LaunchFailed("no Chrome executable found".into()))
    }
}

pub const AUTH_SERVICE_JS: &str = "export async function login(username, password) {\n  const res = await fetch('/api/auth/login', { method: 'POST', body: JSON.stringify({ username, password }) });\n  return res.json();\n}\n";

pub const SETUP_PROXY_JS: &str = "const { createProxyMiddleware } = require('http-proxy-middleware');\n\nmodule.exports = function (app) {\n  app.use('/api', createProxyMiddleware({\n    target: 'http://localhost:8080',\n    changeOrigin: true\n  }));\n};\n";

pub const TIMEOUTS_JSON: &str = "{\n  \"api\": { \"timeout\": 5000 },\n  \"pageLoadTimeout\": 10000\n}\n";

pub const INDEX_HTML: &str = "<!DOCTYPE html>\n<html>\n  <head><title>Café</title></head>\n  <body>\n    <div id=\"root\"></div>\n  </body>\n</html>\n";

/// Throwaway application source tree holding every patch target
#[derive(Debug)]
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    /// Create tree with the default patch target layout
    ///
    /// # Panics
    /// If the temporary directory cannot be written.
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp project");
        let project = Self { dir };
        project.write("src/services/authService.js", AUTH_SERVICE_JS);
        project.write("src/setupProxy.js", SETUP_PROXY_JS);
        project.write("src/config/timeouts.json", TIMEOUTS_JSON);
        project.write("public/index.html", INDEX_HTML);
        project
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// # Panics
    /// If the file cannot be written.
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(path, content).expect("write project file");
    }

    /// # Panics
    /// If the file cannot be read.
    #[must_use]
    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).expect("read project file")
    }

    /// Directory for report artifacts inside the tree
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.path("test-reports")
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration pointing at the fixture origin and `project`
#[must_use]
pub fn fixture_config(project: &TempProject) -> HarnessConfig {
    HarnessConfig::default()
        .with_base_url(FIXTURE_ORIGIN)
        .with_api_base_url(FIXTURE_ORIGIN)
        .with_browser(fast_options())
        .with_max_retries(3)
        .with_cooldown_ms(0)
        .with_run_timeout_secs(Some(60))
        .with_sandbox_fixtures(false)
        .with_project_root(project.root())
        .with_output_dir(project.output_dir())
}

/// Failing case with `error`
#[must_use]
pub fn failed_case(suite: &str, name: &str, error: &str) -> TestCase {
    TestCase::failed(suite, name, error)
}

/// Authentication issue as the classifier reports it
#[must_use]
pub fn auth_issue() -> Issue {
    Issue::new(
        IssueType::Authentication,
        Severity::High,
        true,
        failed_case(
            "Authentication",
            "Barista login",
            "authentication failed for role 'barista': Login failed: 401 Unauthorized",
        ),
        "Reset stored credentials and retry login with backoff",
    )
    .with_context("role", "barista")
}

/// Mixed passing/failing cases across three suites
#[must_use]
pub fn sample_cases() -> Vec<TestCase> {
    vec![
        TestCase::passed("Authentication", "Login page renders"),
        failed_case(
            "Authentication",
            "Barista login",
            "Login failed: 401 Unauthorized",
        ),
        failed_case(
            "Stock",
            "Stock list renders",
            "element not found: '.stock-item | .inventory-item'",
        ),
        failed_case("API", "No failed API calls", "TypeError: Failed to fetch"),
        TestCase::passed("API", "API root reachable"),
    ]
}

/// Two-cycle run: an authentication fix followed by a clean pass
///
/// The first cycle also carries an unrecognised failure with markup in its
/// text.
#[must_use]
pub fn sample_run() -> RunResult {
    let auth = auth_issue();
    let unknown = Issue::new(
        IssueType::Unknown,
        Severity::Medium,
        false,
        failed_case("Display", "Display shows orders", "<marquee> is not supported"),
        "No automated remediation; investigate manually",
    );
    let first = Cycle {
        number: 1,
        test_report: TestReport::from_tests(vec![
            TestCase::passed("Authentication", "Login page renders"),
            auth.source_test.clone(),
            unknown.source_test.clone(),
            TestCase::passed("API", "API root reachable"),
        ]),
        fixes: vec![FixResult::applied(
            &auth,
            "cleared authToken, userRole; patched src/services/authService.js",
        )],
        issues: vec![auth, unknown],
        status: CycleStatus::Fixed,
        duration_ms: 1_200,
        slow_requests: Vec::new(),
        error: None,
    };
    let second = Cycle {
        number: 2,
        test_report: TestReport::from_tests(vec![
            TestCase::passed("Authentication", "Login page renders"),
            TestCase::passed("Authentication", "Barista login"),
            TestCase::passed("Display", "Display shows orders"),
            TestCase::passed("API", "API root reachable"),
        ]),
        issues: Vec::new(),
        fixes: Vec::new(),
        status: CycleStatus::Passed,
        duration_ms: 800,
        slow_requests: Vec::new(),
        error: None,
    };
    RunResult {
        cycles: vec![first, second],
        final_status: FinalStatus::Passed,
        total_duration_ms: 2_000,
        started_at: Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 30, 0)
            .single()
            .unwrap_or_else(Utc::now),
        base_url: FIXTURE_ORIGIN.to_string(),
    }
}

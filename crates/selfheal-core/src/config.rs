//! Harness configuration
//!
//! Defaults describe a locally served application. A TOML file may override
//! any subset of fields; CLI flags are applied on top by the binary.

use crate::error::ConfigError;
use selfheal_browser::{Credentials, LaunchOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Application under test
    pub base_url: String,
    /// Backend API origin
    pub api_base_url: String,
    /// Browser session options
    pub browser: LaunchOptions,
    /// Maximum number of cycles
    pub max_retries: u32,
    /// Pause between cycles (milliseconds)
    pub cooldown_ms: u64,
    /// Global kill switch; `None` disables it
    pub run_timeout_secs: Option<u64>,
    /// Report artifact directory
    pub output_dir: PathBuf,
    /// Failure/interaction screenshot directory
    pub screenshot_dir: PathBuf,
    /// Root that patch target paths are relative to
    pub project_root: PathBuf,
    /// Role credential table
    pub credentials: BTreeMap<String, Credentials>,
    /// Files remediations may patch
    pub patch_targets: PatchTargetPaths,
    /// Optional backend process management
    pub backend: BackendConfig,
    /// Minimum value timeout fields are raised to (milliseconds)
    pub timeout_floor_ms: u64,
    /// Requests slower than this are reported (milliseconds)
    pub slow_request_ms: u64,
    /// Allow stand-in fixture credentials against loopback hosts
    pub sandbox_fixtures: bool,
    /// Render file patches without writing them
    pub dry_run: bool,
}

/// Relative paths of patchable application files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchTargetPaths {
    pub auth_service: PathBuf,
    pub proxy_config: PathBuf,
    pub timeout_config: PathBuf,
    pub static_html: PathBuf,
}

impl Default for PatchTargetPaths {
    fn default() -> Self {
        Self {
            auth_service: PathBuf::from("src/services/authService.js"),
            proxy_config: PathBuf::from("src/setupProxy.js"),
            timeout_config: PathBuf::from("src/config/timeouts.json"),
            static_html: PathBuf::from("public/index.html"),
        }
    }
}

/// Backend process settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Program to spawn when the health probe fails
    pub command: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Path appended to `api_base_url` for the health probe
    pub health_path: String,
    /// Wait after spawning before re-probing (milliseconds)
    pub startup_wait_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            working_dir: None,
            health_path: "/api/health".to_string(),
            startup_wait_ms: 5_000,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let mut credentials = BTreeMap::new();
        credentials.insert("barista".to_string(), Credentials::new("barista", "barista123"));
        credentials.insert("admin".to_string(), Credentials::new("admin", "admin123"));
        credentials.insert("display".to_string(), Credentials::new("display", "display123"));

        Self {
            base_url: "http://localhost:3000".to_string(),
            api_base_url: "http://localhost:5000".to_string(),
            browser: LaunchOptions::default(),
            max_retries: 5,
            cooldown_ms: 5_000,
            run_timeout_secs: Some(1_800),
            output_dir: PathBuf::from("test-reports"),
            screenshot_dir: PathBuf::from("test-reports/screenshots"),
            project_root: PathBuf::from("."),
            credentials,
            patch_targets: PatchTargetPaths::default(),
            backend: BackendConfig::default(),
            timeout_floor_ms: 30_000,
            slow_request_ms: 2_000,
            sandbox_fixtures: false,
            dry_run: false,
        }
    }
}

impl HarnessConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file; missing fields take defaults
    ///
    /// # Errors
    /// `ConfigError::Read` or `ConfigError::Parse`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed input.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// With application base URL
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// With backend API origin
    #[inline]
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// With headless flag
    #[inline]
    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.browser.headless = headless;
        self
    }

    /// With cycle budget
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// With cooldown between cycles
    #[inline]
    #[must_use]
    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    /// With global run deadline
    #[inline]
    #[must_use]
    pub fn with_run_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.run_timeout_secs = secs;
        self
    }

    /// With report directory; screenshots go to its `screenshots` child
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self.screenshot_dir = self.output_dir.join("screenshots");
        self
    }

    /// With project root for patch targets
    #[inline]
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// With browser options
    #[inline]
    #[must_use]
    pub fn with_browser(mut self, browser: LaunchOptions) -> Self {
        self.browser = browser;
        self
    }

    /// With dry-run flag
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// With sandboxed fixture credentials
    #[inline]
    #[must_use]
    pub fn with_sandbox_fixtures(mut self, enabled: bool) -> Self {
        self.sandbox_fixtures = enabled;
        self
    }

    /// With backend process settings
    #[inline]
    #[must_use]
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Check URLs and positive limits
    ///
    /// # Errors
    /// First invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("base_url", &self.base_url)?;
        check_url("api_base_url", &self.api_base_url)?;
        if self.max_retries == 0 {
            return Err(ConfigError::Zero {
                field: "max_retries",
            });
        }
        if self.browser.timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "browser.timeout_ms",
            });
        }
        if self.run_timeout_secs == Some(0) {
            return Err(ConfigError::Zero {
                field: "run_timeout_secs",
            });
        }
        if self.timeout_floor_ms == 0 {
            return Err(ConfigError::Zero {
                field: "timeout_floor_ms",
            });
        }
        Ok(())
    }

    /// Resolve a project-relative path
    #[must_use]
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.project_root.join(relative)
        }
    }

    /// Health probe URL of the backend
    #[must_use]
    pub fn health_url(&self) -> String {
        match Url::parse(&self.api_base_url).and_then(|u| u.join(&self.backend.health_path)) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}{}",
                self.api_base_url.trim_end_matches('/'),
                self.backend.health_path
            ),
        }
    }

    /// Check if the application is served from a loopback host
    #[must_use]
    pub fn base_is_loopback(&self) -> bool {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .is_some_and(|host| {
                host == "localhost"
                    || host == "[::1]"
                    || host
                        .parse::<std::net::IpAddr>()
                        .is_ok_and(|ip| ip.is_loopback())
            })
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.browser.timeout_ms, 15_000);
        assert_eq!(config.credentials.len(), 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
            base_url = "http://127.0.0.1:4000"
            max_retries = 2

            [browser]
            headless = false
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:4000");
        assert_eq!(config.max_retries, 2);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.timeout_ms, 15_000);
        assert_eq!(config.cooldown_ms, 5_000);
    }

    #[test]
    fn rejects_bad_url_and_zero_retries() {
        let bad = HarnessConfig::default().with_base_url("localhost:3000");
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidUrl { field: "base_url", .. })
        ));
        let zero = HarnessConfig::default().with_max_retries(0);
        assert_eq!(
            zero.validate(),
            Err(ConfigError::Zero {
                field: "max_retries"
            })
        );
    }

    #[test]
    fn loopback_detection() {
        assert!(HarnessConfig::default().base_is_loopback());
        assert!(HarnessConfig::default()
            .with_base_url("http://127.0.0.1:3000")
            .base_is_loopback());
        assert!(!HarnessConfig::default()
            .with_base_url("https://cafe.example.com")
            .base_is_loopback());
    }

    #[test]
    fn health_url_joins_path() {
        assert_eq!(
            HarnessConfig::default().health_url(),
            "http://localhost:5000/api/health"
        );
    }

    #[test]
    fn output_dir_moves_screenshots() {
        let config = HarnessConfig::default().with_output_dir("out");
        assert_eq!(config.screenshot_dir, PathBuf::from("out/screenshots"));
    }
}

//! Core types for the harness
//!
//! Defines the records that flow through a run:
//! - Test cases and per-run test reports
//! - Classified issues and fix results
//! - Cycles and the terminal run result

use chrono::{DateTime, Utc};
use selfheal_browser::NetworkTiming;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One executed test step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub suite: String,
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl TestCase {
    /// Create passing case
    #[must_use]
    pub fn passed(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
            passed: true,
            error: None,
            stack: None,
            timestamp: Utc::now(),
            duration_ms: 0,
            screenshot: None,
        }
    }

    /// Create failing case
    #[must_use]
    pub fn failed(
        suite: impl Into<String>,
        name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
            ..Self::passed(suite, name)
        }
    }

    /// With stack/detail text
    #[inline]
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// With measured duration
    #[inline]
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// With failure screenshot
    #[inline]
    #[must_use]
    pub fn with_screenshot(mut self, path: PathBuf) -> Self {
        self.screenshot = Some(path);
        self
    }

    /// Error text followed by the stack, as fed to the classifier
    #[must_use]
    pub fn failure_text(&self) -> String {
        match (&self.error, &self.stack) {
            (Some(error), Some(stack)) => format!("{error}\n{stack}"),
            (Some(error), None) => error.clone(),
            (None, Some(stack)) => stack.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Pass/fail counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    /// Count a slice of cases
    #[must_use]
    pub fn of(tests: &[TestCase]) -> Self {
        let passed = tests.iter().filter(|t| t.passed).count();
        Self {
            total: tests.len(),
            passed,
            failed: tests.len() - passed,
        }
    }

    /// Fraction of passing tests, 0.0 when empty
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            ratio(self.passed, self.total)
        }
    }
}

/// Results of one runner execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub tests: Vec<TestCase>,
    pub summary: Summary,
}

impl TestReport {
    /// Build report and summary from cases
    #[must_use]
    pub fn from_tests(tests: Vec<TestCase>) -> Self {
        let summary = Summary::of(&tests);
        Self { tests, summary }
    }

    /// Failing cases in execution order
    pub fn failures(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.iter().filter(|t| !t.passed)
    }

    /// Check if at least one test ran and none failed
    #[inline]
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.summary.total > 0 && self.summary.failed == 0
    }

    /// Suite names in first-seen order
    #[must_use]
    pub fn suites(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for test in &self.tests {
            if !names.contains(&test.suite.as_str()) {
                names.push(&test.suite);
            }
        }
        names
    }

    /// Summary restricted to one suite
    #[must_use]
    pub fn suite_summary(&self, suite: &str) -> Summary {
        let cases: Vec<TestCase> = self
            .tests
            .iter()
            .filter(|t| t.suite == suite)
            .cloned()
            .collect();
        Summary::of(&cases)
    }
}

/// Failure families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    Authentication,
    MissingElement,
    NetworkError,
    Permission,
    StateError,
    Timeout,
    LocalStorage,
    Cors,
    UiChange,
    DataFormat,
    Unknown,
}

impl IssueType {
    /// Every issue type
    pub const ALL: [IssueType; 11] = [
        IssueType::Authentication,
        IssueType::MissingElement,
        IssueType::NetworkError,
        IssueType::Permission,
        IssueType::StateError,
        IssueType::Timeout,
        IssueType::LocalStorage,
        IssueType::Cors,
        IssueType::UiChange,
        IssueType::DataFormat,
        IssueType::Unknown,
    ];

    /// Upper-case wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION",
            Self::MissingElement => "MISSING_ELEMENT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Permission => "PERMISSION",
            Self::StateError => "STATE_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::LocalStorage => "LOCAL_STORAGE",
            Self::Cors => "CORS",
            Self::UiChange => "UI_CHANGE",
            Self::DataFormat => "DATA_FORMAT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity; declaration order is priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        })
    }
}

/// Classified interpretation of a failing test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub fixable: bool,
    pub source_test: TestCase,
    pub context: BTreeMap<String, String>,
    pub suggested_fix: String,
}

impl Issue {
    /// Create issue; `Unknown` is never fixable
    #[must_use]
    pub fn new(
        issue_type: IssueType,
        severity: Severity,
        fixable: bool,
        source_test: TestCase,
        suggested_fix: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            fixable: fixable && issue_type != IssueType::Unknown,
            source_test,
            context: BTreeMap::new(),
            suggested_fix: suggested_fix.into(),
        }
    }

    /// With context entry
    #[inline]
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Suite of the source test
    #[inline]
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.source_test.suite
    }

    /// Check if a remediation may be attempted
    ///
    /// `Unknown` is never fixable, whatever the `fixable` field says.
    #[inline]
    #[must_use]
    pub fn is_fixable(&self) -> bool {
        self.fixable && self.issue_type != IssueType::Unknown
    }
}

/// Outcome of one remediation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixResult {
    pub issue_type: IssueType,
    pub suite: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixResult {
    /// Remediation changed something
    #[must_use]
    pub fn applied(issue: &Issue, action: impl Into<String>) -> Self {
        Self {
            issue_type: issue.issue_type,
            suite: issue.suite().to_string(),
            success: true,
            action: Some(action.into()),
            error: None,
        }
    }

    /// Remediation ran but had nothing left to change
    #[must_use]
    pub fn unchanged(issue: &Issue, action: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::applied(issue, action)
        }
    }

    /// Remediation failed
    #[must_use]
    pub fn failed(issue: &Issue, error: impl Into<String>) -> Self {
        Self {
            issue_type: issue.issue_type,
            suite: issue.suite().to_string(),
            success: false,
            action: None,
            error: Some(error.into()),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    /// Every test passed
    Passed,
    /// At least one fix succeeded; a rerun follows if budget remains
    Fixed,
    /// Failures remain and nothing more could be fixed
    Failed,
    /// Aborted by the kill switch or the run deadline
    Error,
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "PASSED",
            Self::Fixed => "FIXED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        })
    }
}

/// One run-tests, classify, fix pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub number: u32,
    pub test_report: TestReport,
    pub issues: Vec<Issue>,
    pub fixes: Vec<FixResult>,
    pub status: CycleStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub slow_requests: Vec<NetworkTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Cycle {
    /// Number of fixes that succeeded
    #[must_use]
    pub fn successful_fixes(&self) -> usize {
        self.fixes.iter().filter(|f| f.success).count()
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Passed,
    Failed,
    Error,
}

impl FinalStatus {
    /// Process exit code
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::Failed | Self::Error => 1,
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        })
    }
}

/// Terminal artifact of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub cycles: Vec<Cycle>,
    pub final_status: FinalStatus,
    pub total_duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub base_url: String,
}

/// `part / whole` as f64; counts here stay far below 2^52
#[allow(clippy::cast_precision_loss)]
pub(crate) fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Elapsed milliseconds saturating into u64
pub(crate) fn elapsed_ms(since: std::time::Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Text carried by a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_match() {
        let report = TestReport::from_tests(vec![
            TestCase::passed("Authentication", "Login page renders"),
            TestCase::failed("Authentication", "Barista login", "401 unauthorized"),
            TestCase::passed("Stock", "Stock list renders"),
        ]);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.passed + report.summary.failed, 3);
        assert!(!report.all_passed());
        assert_eq!(report.suites(), vec!["Authentication", "Stock"]);
        assert_eq!(report.suite_summary("Authentication").failed, 1);
    }

    #[test]
    fn empty_report_is_not_a_pass() {
        assert!(!TestReport::from_tests(Vec::new()).all_passed());
    }

    #[test]
    fn unknown_issue_is_never_fixable() {
        let case = TestCase::failed("API", "API root reachable", "???");
        let issue = Issue::new(IssueType::Unknown, Severity::Medium, true, case, "manual");
        assert!(!issue.fixable);

        let forced = Issue {
            fixable: true,
            ..issue
        };
        assert!(!forced.is_fixable());
    }

    #[test]
    fn failure_text_joins_error_and_stack() {
        let case = TestCase::failed("Stock", "x", "boom").with_stack("at render");
        assert_eq!(case.failure_text(), "boom\nat render");
    }

    #[test]
    fn severity_orders_high_first() {
        let mut v = vec![Severity::Low, Severity::High, Severity::Medium];
        v.sort();
        assert_eq!(v, vec![Severity::High, Severity::Medium, Severity::Low]);
    }

    #[test]
    fn issue_type_serializes_upper_snake() {
        let json = serde_json::to_string(&IssueType::MissingElement).unwrap();
        assert_eq!(json, "\"MISSING_ELEMENT\"");
        assert_eq!(IssueType::UiChange.to_string(), "UI_CHANGE");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(FinalStatus::Passed.exit_code(), 0);
        assert_eq!(FinalStatus::Error.exit_code(), 1);
    }
}

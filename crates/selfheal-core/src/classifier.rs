//! Issue classification
//!
//! Failing tests are matched against an ordered pattern table; the first
//! rule with any matching expression decides the issue type. Surviving
//! issues are deduplicated per `(type, suite)` and priority-sorted.

use crate::types::{Issue, IssueType, Severity, TestCase, TestReport};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet, RegexSetBuilder};
use std::collections::HashSet;

/// One row of the pattern table
#[derive(Debug)]
pub struct PatternRule {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub fixable: bool,
    pub suggested_fix: &'static str,
    patterns: RegexSet,
}

impl PatternRule {
    fn compile(
        issue_type: IssueType,
        severity: Severity,
        suggested_fix: &'static str,
        patterns: &[&str],
    ) -> Option<Self> {
        match RegexSetBuilder::new(patterns).case_insensitive(true).build() {
            Ok(patterns) => Some(Self {
                issue_type,
                severity,
                fixable: true,
                suggested_fix,
                patterns,
            }),
            Err(e) => {
                tracing::error!("pattern table entry {} rejected: {}", issue_type, e);
                None
            }
        }
    }

    /// Check if any expression matches
    #[inline]
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.is_match(text)
    }
}

static RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    use IssueType as T;
    use Severity as S;

    [
        PatternRule::compile(
            T::Authentication,
            S::High,
            "Reset stored credentials and retry login with backoff",
            &[
                r"authentication failed",
                r"login failed",
                r"\b401\b",
                r"unauthori[sz]ed",
                r"(invalid|expired|missing) (jwt |auth |access )?token",
                r"still on /login",
            ],
        ),
        PatternRule::compile(
            T::Permission,
            S::High,
            "Re-authenticate with a role that has access to this view",
            &[
                r"\b403\b",
                r"forbidden",
                r"permission denied",
                r"access denied",
                r"not authori[sz]ed",
            ],
        ),
        PatternRule::compile(
            T::Cors,
            S::High,
            "Point the dev proxy at the backend origin and allow cross-origin headers",
            &[
                r"\bcors\b",
                r"access-control-allow-origin",
                r"cross-origin",
                r"blocked by cors policy",
            ],
        ),
        PatternRule::compile(
            T::NetworkError,
            S::High,
            "Enable fallback data and make sure the backend is running",
            &[
                r"econnrefused",
                r"net::err_",
                r"failed to fetch",
                r"network ?error",
                r"enotfound",
                r"\b50[234]\b",
                r"connection refused",
            ],
        ),
        PatternRule::compile(
            T::MissingElement,
            S::Medium,
            "Inject a wait-for-element helper so late-rendering elements are tolerated",
            &[
                r"element not found",
                r"no element matching",
                r"waiting for selector",
                r"unable to find",
                r"failed to find element",
            ],
        ),
        PatternRule::compile(
            T::Timeout,
            S::Medium,
            "Raise configured timeouts",
            &[r"timeout", r"timed out", r"exceeded"],
        ),
        PatternRule::compile(
            T::LocalStorage,
            S::Medium,
            "Clear cached application state, keeping the signed-in identity",
            &[
                r"localstorage",
                r"sessionstorage",
                r"quotaexceedederror",
                r"storage",
            ],
        ),
        PatternRule::compile(
            T::StateError,
            S::Medium,
            "Reset persisted application state",
            &[
                r"cannot read propert(y|ies) of (undefined|null)",
                r"undefined is not",
                r"is not a function",
                r"invalid state",
            ],
        ),
        PatternRule::compile(
            T::UiChange,
            S::Low,
            "Inject a wait-for-element helper and re-query elements before acting",
            &[
                r"not visible",
                r"detached",
                r"obscured",
                r"intercepts pointer events",
                r"not clickable",
                r"disabled",
            ],
        ),
        PatternRule::compile(
            T::DataFormat,
            S::Low,
            "Clear cached data that no longer parses",
            &[
                r"unexpected token",
                r"\bjson\b",
                r"syntaxerror",
                r"invalid date",
                r"\bnan\b",
                r"parse error",
            ],
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
});

static NOT_FOUND: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"not found: '([^']+)'").ok());
static QUOTED: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"['"`]([^'"`]+)['"`]"#).ok());
static ROLE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"role '([^']+)'").ok());
static MILLIS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d+)\s*ms\b").ok());

const UNKNOWN_FIX: &str = "No automated remediation; investigate manually";

/// Ordered pattern table
#[must_use]
pub fn rules() -> &'static [PatternRule] {
    &RULES
}

/// Type, severity and fixability for a failure text
///
/// Pure function of the pattern table; first match wins.
#[must_use]
pub fn classify_text(text: &str) -> (IssueType, Severity, bool) {
    rules()
        .iter()
        .find(|rule| rule.matches(text))
        .map_or((IssueType::Unknown, Severity::Medium, false), |rule| {
            (rule.issue_type, rule.severity, rule.fixable)
        })
}

fn capture(re: &Lazy<Option<Regex>>, text: &str) -> Option<String> {
    Lazy::force(re)
        .as_ref()?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Classifies failing tests into prioritized issues
#[derive(Debug, Clone)]
pub struct IssueClassifier {
    api_base_url: String,
}

impl IssueClassifier {
    /// Create classifier; `api_base_url` is attached to network issues
    #[inline]
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
        }
    }

    /// Classify one test; `None` for passing tests
    #[must_use]
    pub fn classify(&self, test: &TestCase) -> Option<Issue> {
        if test.passed {
            return None;
        }
        let text = test.failure_text();
        let (issue_type, severity, fixable) = classify_text(&text);
        let suggested_fix = rules()
            .iter()
            .find(|r| r.issue_type == issue_type)
            .map_or(UNKNOWN_FIX, |r| r.suggested_fix);

        let mut issue = Issue::new(issue_type, severity, fixable, test.clone(), suggested_fix)
            .with_context("suite", &test.suite)
            .with_context("test", &test.name);

        match issue_type {
            IssueType::MissingElement => {
                if let Some(selector) =
                    capture(&NOT_FOUND, &text).or_else(|| capture(&QUOTED, &text))
                {
                    issue = issue.with_context("selector", selector);
                }
            }
            IssueType::NetworkError | IssueType::Cors => {
                issue = issue.with_context("api_base_url", &self.api_base_url);
            }
            IssueType::Timeout => {
                if let Some(ms) = capture(&MILLIS, &text) {
                    issue = issue.with_context("timeout_ms", ms);
                }
            }
            IssueType::Authentication | IssueType::Permission => {
                if let Some(role) = capture(&ROLE, &text) {
                    issue = issue.with_context("role", role);
                }
            }
            _ => {}
        }
        Some(issue)
    }

    /// Classify every failure, deduplicate and prioritize
    #[must_use]
    pub fn analyze(&self, report: &TestReport) -> Vec<Issue> {
        let issues: Vec<Issue> = report.failures().filter_map(|t| self.classify(t)).collect();
        prioritize(deduplicate(issues))
    }
}

/// Keep the first issue per `(type, suite)`
#[must_use]
pub fn deduplicate(issues: Vec<Issue>) -> Vec<Issue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|issue| seen.insert((issue.issue_type, issue.suite().to_string())))
        .collect()
}

/// Authentication first, then severity, then fixable before unfixable
#[must_use]
pub fn prioritize(mut issues: Vec<Issue>) -> Vec<Issue> {
    issues.sort_by_key(|issue| {
        (
            issue.issue_type != IssueType::Authentication,
            issue.severity,
            !issue.is_fixable(),
        )
    });
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(suite: &str, error: &str) -> TestCase {
        TestCase::failed(suite, "step", error)
    }

    #[test]
    fn table_compiles_completely() {
        assert_eq!(rules().len(), 10);
        assert_eq!(rules()[0].issue_type, IssueType::Authentication);
        assert_eq!(rules()[9].issue_type, IssueType::DataFormat);
    }

    #[test]
    fn unauthorized_is_authentication() {
        let classifier = IssueClassifier::new("http://localhost:5000");
        let issue = classifier
            .classify(&failing("Authentication", "401 unauthorized"))
            .unwrap();
        assert_eq!(issue.issue_type, IssueType::Authentication);
        assert_eq!(issue.severity, Severity::High);
        assert!(issue.fixable);
    }

    #[test]
    fn first_match_wins_over_later_rules() {
        // matches AUTHENTICATION and TIMEOUT
        let (t, _, _) = classify_text("login failed: timeout after 15000ms");
        assert_eq!(t, IssueType::Authentication);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify_text("NET::ERR_CONNECTION_REFUSED").0, IssueType::NetworkError);
        assert_eq!(classify_text("Blocked by CORS policy").0, IssueType::Cors);
    }

    #[test]
    fn unmatched_text_is_unknown_and_unfixable() {
        let classifier = IssueClassifier::new("http://api");
        let issue = classifier
            .classify(&failing("Display", "the moon is made of cheese"))
            .unwrap();
        assert_eq!(issue.issue_type, IssueType::Unknown);
        assert!(!issue.fixable);
        assert_eq!(issue.suggested_fix, UNKNOWN_FIX);
    }

    #[test]
    fn missing_element_captures_selector() {
        let classifier = IssueClassifier::new("http://api");
        let issue = classifier
            .classify(&failing("Stock", "element not found: '.stock-item'"))
            .unwrap();
        assert_eq!(issue.issue_type, IssueType::MissingElement);
        assert_eq!(issue.context.get("selector").map(String::as_str), Some(".stock-item"));
        assert_eq!(issue.context.get("suite").map(String::as_str), Some("Stock"));
    }

    #[test]
    fn selector_chain_with_inner_quotes_is_kept_whole() {
        let classifier = IssueClassifier::new("http://api");
        let issue = classifier
            .classify(&failing(
                "Navigation",
                r#"element not found: '[role="tab"] | .tab'"#,
            ))
            .unwrap();
        assert_eq!(
            issue.context.get("selector").map(String::as_str),
            Some(r#"[role="tab"] | .tab"#)
        );
    }

    #[test]
    fn selector_capture_stops_at_closing_quote() {
        let classifier = IssueClassifier::new("http://api");
        let issue = classifier
            .classify(&failing(
                "Stock",
                "element not found: '.stock-item' after waiting for 'Restock'",
            ))
            .unwrap();
        assert_eq!(issue.context.get("selector").map(String::as_str), Some(".stock-item"));
    }

    #[test]
    fn network_issue_carries_api_base() {
        let classifier = IssueClassifier::new("http://localhost:5000");
        let issue = classifier
            .classify(&failing("API", "TypeError: Failed to fetch"))
            .unwrap();
        assert_eq!(
            issue.context.get("api_base_url").map(String::as_str),
            Some("http://localhost:5000")
        );
    }

    #[test]
    fn timeout_and_role_context() {
        let classifier = IssueClassifier::new("http://api");
        let timeout = classifier
            .classify(&failing("Stock", "timeout after 15000ms waiting for query"))
            .unwrap();
        assert_eq!(timeout.context.get("timeout_ms").map(String::as_str), Some("15000"));

        let auth = classifier
            .classify(&failing(
                "Authentication",
                "authentication failed for role 'admin': still on /login",
            ))
            .unwrap();
        assert_eq!(auth.context.get("role").map(String::as_str), Some("admin"));
    }

    #[test]
    fn passing_test_yields_nothing() {
        let classifier = IssueClassifier::new("http://api");
        assert!(classifier.classify(&TestCase::passed("Stock", "x")).is_none());
    }

    #[test]
    fn analyze_dedups_per_type_and_suite() {
        let classifier = IssueClassifier::new("http://api");
        let report = TestReport::from_tests(vec![
            failing("Stock", "element not found: '.a'"),
            failing("Stock", "element not found: '.b'"),
            failing("Orders", "element not found: '.c'"),
            TestCase::passed("Stock", "ok"),
        ]);
        let issues = classifier.analyze(&report);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].context.get("selector").map(String::as_str), Some(".a"));
    }

    #[test]
    fn authentication_sorted_first() {
        let classifier = IssueClassifier::new("http://api");
        let report = TestReport::from_tests(vec![
            failing("Settings", "element 'x' is disabled"),
            failing("API", "net::ERR_CONNECTION_REFUSED"),
            failing("Messaging", "???"),
            failing("Authentication", "401"),
        ]);
        let order: Vec<IssueType> = classifier
            .analyze(&report)
            .iter()
            .map(|i| i.issue_type)
            .collect();
        assert_eq!(
            order,
            vec![
                IssueType::Authentication,
                IssueType::NetworkError,
                IssueType::Unknown,
                IssueType::UiChange,
            ]
        );
    }
}

//! Run reports
//!
//! Renders a [`RunResult`] as text and HTML, derives aggregate metrics and
//! recommendations, and writes the HTML report plus the JSON result to the
//! output directory.

use crate::error::HarnessError;
use crate::types::{ratio, Cycle, FinalStatus, Issue, IssueType, RunResult};
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Aggregate numbers over a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_cycles: usize,
    pub average_cycle_ms: u64,
    pub fix_attempts: usize,
    pub successful_fixes: usize,
    /// successful / attempted, 0.0 without attempts
    pub fix_success_rate: f64,
    pub first_cycle_pass_rate: f64,
    pub final_pass_rate: f64,
}

/// Files written by [`write_artifacts`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub html: PathBuf,
    pub json: PathBuf,
}

fn advice(issue_type: IssueType) -> &'static str {
    match issue_type {
        IssueType::Authentication => "review the login system",
        IssueType::Permission => "review role permissions for the affected views",
        IssueType::Cors => "align the dev proxy and backend CORS headers",
        IssueType::NetworkError => "check backend availability and API base URL",
        IssueType::MissingElement => "stabilise selectors or late-rendering views",
        IssueType::Timeout => "investigate slow views and timeout settings",
        IssueType::LocalStorage => "review persisted state handling",
        IssueType::StateError => "guard state access against missing data",
        IssueType::UiChange => "update interaction tests for UI changes",
        IssueType::DataFormat => "validate API payload and cached data formats",
        IssueType::Unknown => "investigate manually",
    }
}

/// Renders one run result
#[derive(Debug, Clone, Copy)]
pub struct ReportGenerator<'a> {
    result: &'a RunResult,
}

impl<'a> ReportGenerator<'a> {
    /// Create generator for a result
    #[inline]
    #[must_use]
    pub fn new(result: &'a RunResult) -> Self {
        Self { result }
    }

    /// Aggregate metrics
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        let cycles = &self.result.cycles;
        let total_ms: u64 = cycles.iter().map(|c| c.duration_ms).sum();
        let fix_attempts: usize = cycles.iter().map(|c| c.fixes.len()).sum();
        let successful_fixes: usize = cycles.iter().map(Cycle::successful_fixes).sum();
        let count = u64::try_from(cycles.len()).unwrap_or(u64::MAX);

        Metrics {
            total_cycles: cycles.len(),
            average_cycle_ms: if count == 0 { 0 } else { total_ms / count },
            fix_attempts,
            successful_fixes,
            fix_success_rate: ratio(successful_fixes, fix_attempts),
            first_cycle_pass_rate: cycles
                .first()
                .map_or(0.0, |c| c.test_report.summary.pass_rate()),
            final_pass_rate: cycles
                .last()
                .map_or(0.0, |c| c.test_report.summary.pass_rate()),
        }
    }

    /// Issue counts per type across cycles, most frequent first
    #[must_use]
    pub fn issue_frequency(&self) -> IndexMap<IssueType, usize> {
        let mut counts: IndexMap<IssueType, usize> = IndexMap::new();
        for issue in self.result.cycles.iter().flat_map(|c| &c.issues) {
            *counts.entry(issue.issue_type).or_default() += 1;
        }
        counts.sort_by(|ka, a, kb, b| b.cmp(a).then(ka.cmp(kb)));
        counts
    }

    /// One line per issue type, plus every unknown failure verbatim
    #[must_use]
    pub fn recommendations(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .issue_frequency()
            .into_iter()
            .filter(|(t, _)| *t != IssueType::Unknown)
            .map(|(t, n)| {
                let times = if n == 1 { "time" } else { "times" };
                format!("{t} failed {n} {times} across cycles → {}", advice(t))
            })
            .collect();

        for issue in self
            .result
            .cycles
            .iter()
            .flat_map(|c| &c.issues)
            .filter(|i| i.issue_type == IssueType::Unknown)
        {
            lines.push(format!(
                "UNKNOWN in {} / {}: {} → {}",
                issue.suite(),
                issue.source_test.name,
                issue.source_test.error.as_deref().unwrap_or("no error text"),
                advice(IssueType::Unknown)
            ));
        }
        lines
    }

    /// Plain-text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let result = self.result;
        let metrics = self.metrics();
        let mut report = String::new();

        report.push_str("=== Self-Healing Test Report ===\n\n");
        report.push_str(&format!("Application: {}\n", result.base_url));
        report.push_str(&format!("Started: {}\n", result.started_at.to_rfc3339()));
        report.push_str(&format!("Total Duration: {}ms\n", result.total_duration_ms));
        report.push_str(&format!("Cycles: {}\n", metrics.total_cycles));
        report.push_str(&format!("Average Cycle Duration: {}ms\n", metrics.average_cycle_ms));
        report.push_str(&format!(
            "Fixes: {}/{} successful ({:.0}%)\n",
            metrics.successful_fixes,
            metrics.fix_attempts,
            metrics.fix_success_rate * 100.0
        ));
        report.push_str(&format!(
            "First Cycle Pass Rate: {:.0}%\n",
            metrics.first_cycle_pass_rate * 100.0
        ));
        report.push_str(&format!(
            "Final Pass Rate: {:.0}%\n",
            metrics.final_pass_rate * 100.0
        ));

        for cycle in &result.cycles {
            let summary = cycle.test_report.summary;
            report.push_str(&format!(
                "\n=== Cycle {}: {} ({}ms) ===\n",
                cycle.number, cycle.status, cycle.duration_ms
            ));
            report.push_str(&format!(
                "Tests: {} total, {} passed, {} failed\n",
                summary.total, summary.passed, summary.failed
            ));
            for suite in cycle.test_report.suites() {
                let s = cycle.test_report.suite_summary(suite);
                report.push_str(&format!("  {suite}: {}/{} passed\n", s.passed, s.total));
            }
            for test in cycle.test_report.failures() {
                report.push_str(&format!(
                    "  ✗ {} / {}: {}\n",
                    test.suite,
                    test.name,
                    test.error.as_deref().unwrap_or("failed")
                ));
            }
            if let Some(error) = &cycle.error {
                report.push_str(&format!("  ! {error}\n"));
            }
            if !cycle.issues.is_empty() {
                report.push_str("Issues → Fixes:\n");
                for (i, issue) in cycle.issues.iter().enumerate() {
                    let (_, outcome) = fix_outcome(cycle, issue);
                    report.push_str(&format!(
                        "  {}. {} [{}] {} → {}\n",
                        i + 1,
                        issue.issue_type,
                        issue.severity,
                        issue.suite(),
                        outcome
                    ));
                }
            }
            if !cycle.slow_requests.is_empty() {
                report.push_str("Slow Requests:\n");
                for t in &cycle.slow_requests {
                    report.push_str(&format!(
                        "  {} {} → {} in {}ms\n",
                        t.method,
                        t.url,
                        t.status.map_or_else(|| "failed".to_string(), |s| s.to_string()),
                        t.duration_ms
                    ));
                }
            }
        }

        let recommendations = self.recommendations();
        if !recommendations.is_empty() {
            report.push_str("\n=== Recommendations ===\n");
            for line in &recommendations {
                report.push_str(&format!("- {line}\n"));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            match result.final_status {
                FinalStatus::Passed => "PASS",
                FinalStatus::Failed => "FAIL",
                FinalStatus::Error => "ERROR",
            }
        ));
        report
    }

    /// Self-contained HTML report
    #[must_use]
    pub fn generate_html(&self) -> String {
        let result = self.result;
        let metrics = self.metrics();
        let mut html = String::new();

        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<title>Self-Healing Test Report</title>\n<style>\n");
        html.push_str(STYLE);
        html.push_str("</style>\n</head>\n<body>\n");
        html.push_str(&format!(
            "<h1>Self-Healing Test Report <span class=\"status {}\">{}</span></h1>\n",
            status_class(result.final_status),
            result.final_status
        ));
        html.push_str(&format!(
            "<p>{} &middot; started {} &middot; {}ms</p>\n",
            escape(&result.base_url),
            result.started_at.to_rfc3339(),
            result.total_duration_ms
        ));

        html.push_str("<table class=\"metrics\">\n");
        for (label, value) in [
            ("Cycles", metrics.total_cycles.to_string()),
            ("Average cycle", format!("{}ms", metrics.average_cycle_ms)),
            (
                "Fix success",
                format!(
                    "{}/{} ({:.0}%)",
                    metrics.successful_fixes,
                    metrics.fix_attempts,
                    metrics.fix_success_rate * 100.0
                ),
            ),
            (
                "First cycle pass rate",
                format!("{:.0}%", metrics.first_cycle_pass_rate * 100.0),
            ),
            ("Final pass rate", format!("{:.0}%", metrics.final_pass_rate * 100.0)),
        ] {
            html.push_str(&format!("<tr><th>{label}</th><td>{value}</td></tr>\n"));
        }
        html.push_str("</table>\n");

        for cycle in &result.cycles {
            let summary = cycle.test_report.summary;
            html.push_str(&format!(
                "<section class=\"cycle\" id=\"cycle-{n}\">\n<h2>Cycle {n} <span class=\"status {cls}\">{status}</span></h2>\n",
                n = cycle.number,
                cls = cycle_class(cycle),
                status = cycle.status
            ));
            html.push_str(&format!(
                "<p>{} tests &middot; {} passed &middot; {} failed &middot; {}ms</p>\n",
                summary.total, summary.passed, summary.failed, cycle.duration_ms
            ));
            if let Some(error) = &cycle.error {
                html.push_str(&format!("<p class=\"error\">{}</p>\n", escape(error)));
            }

            html.push_str("<table>\n<tr><th>Suite</th><th>Test</th><th>Result</th><th>Error</th></tr>\n");
            for test in &cycle.test_report.tests {
                html.push_str(&format!(
                    "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    if test.passed { "pass" } else { "fail" },
                    escape(&test.suite),
                    escape(&test.name),
                    if test.passed { "✓" } else { "✗" },
                    escape(test.error.as_deref().unwrap_or(""))
                ));
            }
            html.push_str("</table>\n");

            if !cycle.issues.is_empty() {
                html.push_str("<h3>Issues &rarr; Fixes</h3>\n<table class=\"issues\">\n<tr><th>#</th><th>Issue</th><th>Suite / Test</th><th>Failure</th><th>Fix</th></tr>\n");
                for (i, issue) in cycle.issues.iter().enumerate() {
                    let (class, outcome) = fix_outcome(cycle, issue);
                    html.push_str(&format!(
                        "<tr class=\"{class}\"><td>{}</td><td><strong>{}</strong> [{}]</td><td>{} / {}</td><td>{}</td><td>{}</td></tr>\n",
                        i + 1,
                        issue.issue_type,
                        issue.severity,
                        escape(issue.suite()),
                        escape(&issue.source_test.name),
                        escape(issue.source_test.error.as_deref().unwrap_or("")),
                        escape(&outcome)
                    ));
                }
                html.push_str("</table>\n");
            }
            if !cycle.slow_requests.is_empty() {
                html.push_str("<h3>Slow requests</h3>\n<table>\n<tr><th>Request</th><th>Status</th><th>Duration</th></tr>\n");
                for t in &cycle.slow_requests {
                    html.push_str(&format!(
                        "<tr><td>{} {}</td><td>{}</td><td>{}ms</td></tr>\n",
                        escape(&t.method),
                        escape(&t.url),
                        t.status.map_or_else(|| "failed".to_string(), |s| s.to_string()),
                        t.duration_ms
                    ));
                }
                html.push_str("</table>\n");
            }
            html.push_str("</section>\n");
        }

        let recommendations = self.recommendations();
        if !recommendations.is_empty() {
            html.push_str("<h2>Recommendations</h2>\n<ul class=\"recommendations\">\n");
            for line in &recommendations {
                html.push_str(&format!("<li>{}</li>\n", escape(line)));
            }
            html.push_str("</ul>\n");
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

/// Fix recorded for `issue` in its cycle, as a CSS class and a status line
fn fix_outcome(cycle: &Cycle, issue: &Issue) -> (&'static str, String) {
    let fix = cycle
        .fixes
        .iter()
        .find(|f| f.issue_type == issue.issue_type && f.suite == issue.suite());
    match fix {
        Some(f) if f.success => (
            "pass",
            format!("✓ {}", f.action.as_deref().unwrap_or("applied")),
        ),
        Some(f) => (
            "fail",
            format!(
                "✗ {}",
                f.error
                    .as_deref()
                    .or(f.action.as_deref())
                    .unwrap_or("no change")
            ),
        ),
        None if issue.is_fixable() => ("", "not attempted".to_string()),
        None => ("manual", format!("⚠ manual: {}", issue.suggested_fix)),
    }
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}
table{border-collapse:collapse;margin:.5rem 0}
th,td{border:1px solid #ddd;padding:.25rem .5rem;text-align:left;vertical-align:top}
tr.pass td:nth-child(3){color:#1a7f37}
tr.fail td:nth-child(3),table.issues tr.fail td:last-child,.error{color:#cf222e}
table.issues tr.pass td:last-child{color:#1a7f37}
table.issues tr.manual td:last-child{color:#9a6700}
.status{font-size:.8em;padding:.1rem .4rem;border-radius:.25rem;color:#fff}
.passed{background:#1a7f37}.fixed{background:#9a6700}.failed{background:#cf222e}.error-status{background:#6e7781}
section.cycle{border-top:2px solid #eee;margin-top:1.5rem}
";

fn status_class(status: FinalStatus) -> &'static str {
    match status {
        FinalStatus::Passed => "passed",
        FinalStatus::Failed => "failed",
        FinalStatus::Error => "error-status",
    }
}

fn cycle_class(cycle: &Cycle) -> &'static str {
    match cycle.status {
        crate::types::CycleStatus::Passed => "passed",
        crate::types::CycleStatus::Fixed => "fixed",
        crate::types::CycleStatus::Failed => "failed",
        crate::types::CycleStatus::Error => "error-status",
    }
}

/// Escape text for HTML element content and attribute values
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Filename-safe ISO-8601 stamp of the run start
#[must_use]
pub fn artifact_stamp(started_at: DateTime<Utc>) -> String {
    started_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-")
}

/// Write the HTML report and the JSON result into `dir`
///
/// Files from an earlier run with the same start stamp are never
/// overwritten; the stamp gains a `-2`, `-3`, ... suffix instead.
///
/// # Errors
/// `HarnessError::Report` if the directory or a file cannot be written,
/// `HarnessError::Serialization` if the result cannot be encoded.
pub async fn write_artifacts(result: &RunResult, dir: &Path) -> Result<ArtifactPaths, HarnessError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| HarnessError::report(dir, &e))?;

    let base = artifact_stamp(result.started_at);
    let mut stamp = base.clone();
    let mut attempt = 1;
    while tokio::fs::try_exists(dir.join(format!("selfheal-result-{stamp}.json")))
        .await
        .unwrap_or(false)
    {
        attempt += 1;
        stamp = format!("{base}-{attempt}");
    }
    let html = dir.join(format!("selfheal-report-{stamp}.html"));
    let json = dir.join(format!("selfheal-result-{stamp}.json"));

    let body = ReportGenerator::new(result).generate_html();
    tokio::fs::write(&html, body)
        .await
        .map_err(|e| HarnessError::report(&html, &e))?;

    let encoded = serde_json::to_string_pretty(result)
        .map_err(|e| HarnessError::Serialization(e.to_string()))?;
    tokio::fs::write(&json, encoded)
        .await
        .map_err(|e| HarnessError::report(&json, &e))?;

    tracing::info!("→ report written to {}", html.display());
    Ok(ArtifactPaths { html, json })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stamp_has_no_colons() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(artifact_stamp(at), "2026-03-01T09-05-07.000Z");
    }

    #[test]
    fn escape_markup() {
        assert_eq!(escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn empty_run_metrics() {
        let result = RunResult {
            cycles: Vec::new(),
            final_status: FinalStatus::Failed,
            total_duration_ms: 0,
            started_at: Utc::now(),
            base_url: "http://localhost:3000".into(),
        };
        let metrics = ReportGenerator::new(&result).metrics();
        assert_eq!(metrics.total_cycles, 0);
        assert_eq!(metrics.average_cycle_ms, 0);
        assert!(metrics.fix_success_rate.abs() < f64::EPSILON);
    }
}

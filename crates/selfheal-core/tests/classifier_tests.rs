use pretty_assertions::assert_eq;
use proptest::prelude::*;
use selfheal_core::classifier::rules;
use selfheal_core::{
    classify_text, deduplicate, prioritize, Issue, IssueClassifier, IssueType, Severity, TestCase,
    TestReport,
};
use selfheal_test_utils::{sample_cases, FIXTURE_ORIGIN};
use std::collections::HashSet;

fn any_issue() -> impl Strategy<Value = Issue> {
    (
        0usize..IssueType::ALL.len(),
        prop_oneof![Just(Severity::High), Just(Severity::Medium), Just(Severity::Low)],
        any::<bool>(),
        prop_oneof![Just("Authentication"), Just("Stock"), Just("API"), Just("Display")],
        "[a-z ]{0,12}",
    )
        .prop_map(|(type_idx, severity, fixable, suite, error)| {
            Issue::new(
                IssueType::ALL[type_idx],
                severity,
                fixable,
                TestCase::failed(suite, "step", error),
                "fix",
            )
        })
}

#[test]
fn test_sample_report_analysis() {
    let classifier = IssueClassifier::new(FIXTURE_ORIGIN);
    let issues = classifier.analyze(&TestReport::from_tests(sample_cases()));
    let summary: Vec<(IssueType, &str)> = issues
        .iter()
        .map(|i| (i.issue_type, i.suite()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (IssueType::Authentication, "Authentication"),
            (IssueType::NetworkError, "API"),
            (IssueType::MissingElement, "Stock"),
        ]
    );
    assert!(issues.iter().all(|i| i.fixable));
    assert_eq!(
        issues[1].context.get("api_base_url").map(String::as_str),
        Some(FIXTURE_ORIGIN)
    );
}

#[test]
fn test_every_rule_is_fixable() {
    assert!(rules().iter().all(|r| r.fixable));
    let types: HashSet<IssueType> = rules().iter().map(|r| r.issue_type).collect();
    assert_eq!(types.len(), rules().len());
    assert!(!types.contains(&IssueType::Unknown));
}

#[test]
fn test_empty_failure_text_is_unknown() {
    let (issue_type, _, fixable) = classify_text("");
    assert_eq!(issue_type, IssueType::Unknown);
    assert!(!fixable);
}

proptest! {
    #[test]
    fn prop_classification_is_deterministic(text in ".{0,80}") {
        prop_assert_eq!(classify_text(&text), classify_text(&text));
    }

    #[test]
    fn prop_first_matching_rule_decides(text in ".{0,80}") {
        let (issue_type, severity, fixable) = classify_text(&text);
        match rules().iter().find(|r| r.matches(&text)) {
            Some(rule) => {
                prop_assert_eq!(issue_type, rule.issue_type);
                prop_assert_eq!(severity, rule.severity);
                prop_assert!(fixable);
            }
            None => {
                prop_assert_eq!(issue_type, IssueType::Unknown);
                prop_assert!(!fixable);
            }
        }
    }

    #[test]
    fn prop_dedup_keeps_first_per_type_and_suite(issues in prop::collection::vec(any_issue(), 0..24)) {
        let kept = deduplicate(issues.clone());

        let keys: Vec<(IssueType, String)> = kept
            .iter()
            .map(|i| (i.issue_type, i.suite().to_string()))
            .collect();
        let unique: HashSet<_> = keys.iter().cloned().collect();
        prop_assert_eq!(unique.len(), keys.len());

        let input_keys: HashSet<(IssueType, String)> = issues
            .iter()
            .map(|i| (i.issue_type, i.suite().to_string()))
            .collect();
        prop_assert_eq!(input_keys, unique);

        for issue in &kept {
            let first = issues
                .iter()
                .find(|i| i.issue_type == issue.issue_type && i.suite() == issue.suite());
            prop_assert_eq!(Some(issue), first);
        }
    }

    #[test]
    fn prop_prioritize_orders_without_losing_issues(issues in prop::collection::vec(any_issue(), 0..24)) {
        let sorted = prioritize(issues.clone());
        prop_assert_eq!(sorted.len(), issues.len());

        let auth_count = issues
            .iter()
            .filter(|i| i.issue_type == IssueType::Authentication)
            .count();
        prop_assert!(sorted[..auth_count]
            .iter()
            .all(|i| i.issue_type == IssueType::Authentication));

        for pair in sorted[auth_count..].windows(2) {
            prop_assert!(pair[0].severity <= pair[1].severity);
            if pair[0].severity == pair[1].severity {
                prop_assert!(pair[0].fixable || !pair[1].fixable);
            }
        }
    }
}

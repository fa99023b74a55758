use selfheal_core::runner::SUITE_EXECUTION;
use selfheal_core::{
    HarnessConfig, IssueClassifier, IssueType, RunnerState, StepFailure, SuiteContext, TestRunner,
    TestSuite,
};
use selfheal_test_utils::{
    cafe_app, fallback_only_stock_app, fast_options, scripted_driver, TempProject, FIXTURE_ORIGIN,
};
use std::sync::Arc;

fn config() -> Arc<HarnessConfig> {
    Arc::new(
        HarnessConfig::default()
            .with_base_url(FIXTURE_ORIGIN)
            .with_api_base_url(FIXTURE_ORIGIN)
            .with_browser(fast_options()),
    )
}

#[tokio::test]
async fn test_default_suites_pass_against_healthy_app() {
    let runner = TestRunner::new(config());
    let report = runner.run(&scripted_driver(Arc::new(cafe_app()))).await;

    let failures: Vec<String> = report
        .failures()
        .map(|t| format!("{} / {}: {}", t.suite, t.name, t.failure_text()))
        .collect();
    assert!(failures.is_empty(), "{failures:#?}");
    assert_eq!(report.summary.total, 21);
    assert_eq!(
        report.suites(),
        vec![
            "Authentication",
            "Navigation",
            "Order Management",
            "Stock",
            "Settings",
            "Display",
            "Messaging",
            "API"
        ]
    );
    assert_eq!(runner.state(), RunnerState::Done);
}

#[tokio::test]
async fn test_hidden_stock_list_is_a_missing_element() {
    let runner = TestRunner::new(config());
    let report = runner
        .run(&scripted_driver(Arc::new(fallback_only_stock_app())))
        .await;

    assert_eq!(report.summary.failed, 1);
    let failed = report.failures().next().unwrap();
    assert_eq!(failed.suite, "Stock");
    assert_eq!(failed.name, "Stock list renders");

    let issues = IssueClassifier::new(FIXTURE_ORIGIN).analyze(&report);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue_type, IssueType::MissingElement);
    assert!(issues[0].context["selector"].contains(".stock-item"));
}

#[tokio::test]
async fn test_unreachable_app_is_recorded_not_raised() {
    let backend = Arc::new(cafe_app());
    backend.set_unreachable(true);
    let runner = TestRunner::new(config());
    let report = runner.run(&scripted_driver(backend)).await;

    assert_eq!(report.summary.total, 21);
    assert!(report.summary.failed > 15);
    let api = report
        .tests
        .iter()
        .find(|t| t.name == "API root reachable")
        .unwrap();
    assert!(!api.passed);
    assert!(api.failure_text().contains("ECONNREFUSED"));

    let issues = IssueClassifier::new(FIXTURE_ORIGIN).analyze(&report);
    assert!(issues.iter().any(|i| i.issue_type == IssueType::NetworkError));
}

#[tokio::test]
async fn test_failure_screenshot_is_attached() {
    let project = TempProject::new();
    let shots = project.path("shots");
    let driver =
        scripted_driver(Arc::new(fallback_only_stock_app())).with_screenshot_dir(&shots);
    let report = TestRunner::new(config()).run(&driver).await;

    let failed = report.failures().next().unwrap();
    let path = failed.screenshot.as_ref().unwrap();
    assert!(path.starts_with(&shots));
    assert!(path.exists());
}

struct Brittle;

#[async_trait::async_trait]
impl TestSuite for Brittle {
    fn name(&self) -> &str {
        "Brittle"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        ctx.step("opens login", async { ctx.visit("/login").await })
            .await;
        ctx.step("asserts", async {
            Err(StepFailure::assertion("Cannot read properties of undefined (reading 'map')"))
        })
        .await;
        panic!("index out of bounds: the len is 0 but the index is 3");
    }
}

#[tokio::test]
async fn test_suite_panic_keeps_earlier_cases_and_later_suites() {
    let mut suites = selfheal_core::runner::default_suites();
    suites.insert(0, Arc::new(Brittle));
    let runner = TestRunner::with_suites(config(), suites);
    let report = runner.run(&scripted_driver(Arc::new(cafe_app()))).await;

    let brittle: Vec<&str> = report
        .tests
        .iter()
        .filter(|t| t.suite == "Brittle")
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(brittle, vec!["opens login", "asserts", SUITE_EXECUTION]);
    assert_eq!(report.summary.total, 24);
    assert_eq!(report.summary.failed, 2);

    let issues = IssueClassifier::new(FIXTURE_ORIGIN).analyze(&report);
    let types: Vec<IssueType> = issues.iter().map(|i| i.issue_type).collect();
    assert_eq!(types, vec![IssueType::StateError, IssueType::Unknown]);
    assert!(!issues[1].fixable);
    assert_eq!(runner.state(), RunnerState::Done);
}

use pretty_assertions::assert_eq;
use selfheal_browser::{KeyValueStore, MemoryStore, StoreKey};
use selfheal_core::fixer::strategies::{AUTH_RETRY_SENTINEL, CORS_SENTINEL, WAIT_HELPER_SENTINEL};
use selfheal_core::{Fixer, Issue, IssueType, Severity};
use selfheal_test_utils::{
    auth_issue, failed_case, fixture_config, TempProject, FIXTURE_ORIGIN, INDEX_HTML,
    SETUP_PROXY_JS, TIMEOUTS_JSON,
};
use std::sync::Arc;

fn issue(issue_type: IssueType, suite: &str, error: &str) -> Issue {
    Issue::new(
        issue_type,
        Severity::Medium,
        true,
        failed_case(suite, "step", error),
        "fix",
    )
}

fn signed_in_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_entries([
        (StoreKey::AuthToken, "expired-token".to_string()),
        (StoreKey::RefreshToken, "r".to_string()),
        (StoreKey::UserRole, "barista".to_string()),
        (StoreKey::Username, "barista".to_string()),
        (StoreKey::Orders, "[]".to_string()),
    ]))
}

#[tokio::test]
async fn test_auth_fix_clears_identity_and_patches_service() {
    let project = TempProject::new();
    let fixer = Fixer::new(Arc::new(fixture_config(&project)));
    let store = signed_in_store();

    let result = fixer.fix(&auth_issue(), store.clone()).await;
    assert!(result.success, "{result:?}");
    assert_eq!(result.issue_type, IssueType::Authentication);

    let left = store.snapshot();
    assert!(StoreKey::AUTH.iter().all(|k| !left.contains_key(k)));
    assert_eq!(left.get(&StoreKey::Orders).map(String::as_str), Some("[]"));

    let service = project.read("src/services/authService.js");
    assert!(service.contains(AUTH_RETRY_SENTINEL));
    assert!(service.contains("withAuthRetry"));
}

#[tokio::test]
async fn test_auth_fix_twice_changes_nothing() {
    let project = TempProject::new();
    let fixer = Fixer::new(Arc::new(fixture_config(&project)));
    let store = signed_in_store();

    assert!(fixer.fix(&auth_issue(), store.clone()).await.success);
    let patched = project.read("src/services/authService.js");

    let again = fixer.fix(&auth_issue(), store).await;
    assert!(!again.success);
    assert!(again.error.is_none());
    assert_eq!(project.read("src/services/authService.js"), patched);
}

#[tokio::test]
async fn test_sandbox_fixture_token_on_loopback() {
    let project = TempProject::new();
    let config = fixture_config(&project).with_sandbox_fixtures(true);
    let fixer = Fixer::new(Arc::new(config));
    let store = Arc::new(MemoryStore::new());

    let result = fixer.fix(&auth_issue(), store.clone()).await;
    assert!(result.success);
    let token = store.get(StoreKey::AuthToken).await.unwrap().unwrap();
    assert!(token.starts_with("sandbox.barista."));
    assert_eq!(
        store.get(StoreKey::UserRole).await.unwrap().as_deref(),
        Some("barista")
    );
}

#[tokio::test]
async fn test_sandbox_fixture_token_refused_off_loopback() {
    let project = TempProject::new();
    let config = fixture_config(&project)
        .with_base_url("https://cafe.example.com")
        .with_sandbox_fixtures(true);
    let fixer = Fixer::new(Arc::new(config));
    let store = Arc::new(MemoryStore::new());

    let _ = fixer.fix(&auth_issue(), store.clone()).await;
    assert!(store.get(StoreKey::AuthToken).await.unwrap().is_none());
}

#[tokio::test]
async fn test_timeout_fix_raises_to_floor_once() {
    let project = TempProject::new();
    let fixer = Fixer::new(Arc::new(fixture_config(&project)));
    let store = Arc::new(MemoryStore::new());
    let timeout = issue(IssueType::Timeout, "Stock", "timeout after 300ms");

    assert!(fixer.fix(&timeout, store.clone()).await.success);
    let raised: serde_json::Value =
        serde_json::from_str(&project.read("src/config/timeouts.json")).unwrap();
    assert_eq!(raised["api"]["timeout"], 30_000);
    assert_eq!(raised["pageLoadTimeout"], 30_000);

    let content = project.read("src/config/timeouts.json");
    assert!(!fixer.fix(&timeout, store).await.success);
    assert_eq!(project.read("src/config/timeouts.json"), content);
    assert_ne!(content, TIMEOUTS_JSON);
}

#[tokio::test]
async fn test_cors_fix_retargets_proxy_once() {
    let project = TempProject::new();
    let fixer = Fixer::new(Arc::new(fixture_config(&project)));
    let store = Arc::new(MemoryStore::new());
    let cors = issue(IssueType::Cors, "API", "blocked by CORS policy");

    assert!(fixer.fix(&cors, store.clone()).await.success);
    let proxy = project.read("src/setupProxy.js");
    assert!(proxy.contains(CORS_SENTINEL));
    assert!(proxy.contains(&format!("target: '{FIXTURE_ORIGIN}'")));
    assert!(proxy.contains("onProxyRes: selfhealCorsHeaders"));
    assert!(!proxy.contains("localhost:8080"));
    assert!(proxy.find(CORS_SENTINEL) < proxy.find("module.exports"));

    assert!(!fixer.fix(&cors, store).await.success);
    assert_eq!(project.read("src/setupProxy.js"), proxy);
    assert_eq!(proxy.matches("onProxyRes").count(), 1);
}

#[tokio::test]
async fn test_missing_element_fix_injects_helper_before_body_end() {
    let project = TempProject::new();
    let fixer = Fixer::new(Arc::new(fixture_config(&project)));
    let missing = issue(
        IssueType::MissingElement,
        "Stock",
        "element not found: '.stock-item'",
    )
    .with_context("selector", ".stock-item");

    let result = fixer.fix(&missing, Arc::new(MemoryStore::new())).await;
    assert!(result.success);
    assert!(result.action.unwrap().contains(".stock-item"));

    let html = project.read("public/index.html");
    assert!(html.find(WAIT_HELPER_SENTINEL) < html.find("</body>"));

    let again = fixer.fix(&missing, Arc::new(MemoryStore::new())).await;
    assert!(!again.success);
    assert_eq!(project.read("public/index.html").matches(WAIT_HELPER_SENTINEL).count(), 1);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let project = TempProject::new();
    let fixer = Fixer::new(Arc::new(fixture_config(&project).with_dry_run(true)));
    let store = Arc::new(MemoryStore::new());

    let results = fixer
        .fix_all(
            &[
                issue(IssueType::Cors, "API", "cors"),
                issue(IssueType::Timeout, "Stock", "timed out"),
                issue(IssueType::MissingElement, "Stock", "element not found: '.x'"),
            ],
            store,
        )
        .await;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| !r.success && r.error.is_none()));
    assert!(results
        .iter()
        .all(|r| r.action.as_deref().is_some_and(|a| a.contains("dry run"))));

    assert_eq!(project.read("src/setupProxy.js"), SETUP_PROXY_JS);
    assert_eq!(project.read("src/config/timeouts.json"), TIMEOUTS_JSON);
    assert_eq!(project.read("public/index.html"), INDEX_HTML);
}

#[tokio::test]
async fn test_network_fix_enables_fallback_without_backend_command() {
    let project = TempProject::new();
    let fixer = Fixer::new(Arc::new(fixture_config(&project)));
    let store = Arc::new(MemoryStore::new());
    let network = issue(IssueType::NetworkError, "API", "TypeError: Failed to fetch");

    let result = fixer.fix(&network, store.clone()).await;
    assert!(result.success);
    assert_eq!(
        store.get(StoreKey::UseFallbackData).await.unwrap().as_deref(),
        Some("true")
    );
    assert!(result.action.unwrap().contains("no start command"));

    assert!(!fixer.fix(&network, store).await.success);
}

#[tokio::test]
async fn test_failed_patch_does_not_stop_other_fixes() {
    let project = TempProject::new();
    std::fs::remove_file(project.path("src/config/timeouts.json")).unwrap();
    let fixer = Fixer::new(Arc::new(fixture_config(&project)));
    let store = signed_in_store();

    let results = fixer
        .fix_all(
            &[
                issue(IssueType::Timeout, "Stock", "timed out"),
                issue(IssueType::DataFormat, "Display", "Unexpected token < in JSON"),
            ],
            store.clone(),
        )
        .await;
    assert!(!results[0].success);
    assert!(results[0].error.is_some());
    assert!(results[1].success);
    let left = store.snapshot();
    assert!(StoreKey::AUTH.iter().all(|k| left.contains_key(k)));
    assert!(!left.contains_key(&StoreKey::Orders));
}

#[tokio::test]
async fn test_storage_reset_keeps_fallback_flag_from_same_cycle() {
    let project = TempProject::new();
    let fixer = Fixer::new(Arc::new(fixture_config(&project)));
    let store = signed_in_store();

    let results = fixer
        .fix_all(
            &[
                issue(IssueType::NetworkError, "API", "TypeError: Failed to fetch"),
                issue(IssueType::DataFormat, "Display", "Unexpected token < in JSON"),
            ],
            store.clone(),
        )
        .await;
    assert!(results.iter().all(|r| r.success), "{results:?}");

    let left = store.snapshot();
    assert_eq!(
        left.get(&StoreKey::UseFallbackData).map(String::as_str),
        Some("true")
    );
    assert!(!left.contains_key(&StoreKey::Orders));
    assert!(StoreKey::AUTH.iter().all(|k| left.contains_key(k)));
}

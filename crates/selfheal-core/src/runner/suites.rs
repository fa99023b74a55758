//! Default suites for the café application
//!
//! Suites share one browser session and run in the order returned by
//! [`default_suites`]. Each step records a test case; a failing step never
//! stops the remaining steps.

use super::suite::{StepFailure, StepResult, SuiteContext, TestSuite};
use selfheal_browser::{BrowserError, Credentials, InteractionRecord, Selector, SelectorChain};
use std::sync::Arc;

const BARISTA: &str = "barista";
const ADMIN: &str = "admin";

/// Suites in execution order
#[must_use]
pub fn default_suites() -> Vec<Arc<dyn TestSuite>> {
    vec![
        Arc::new(AuthenticationSuite),
        Arc::new(NavigationSuite),
        Arc::new(OrderManagementSuite),
        Arc::new(StockSuite),
        Arc::new(SettingsSuite),
        Arc::new(DisplaySuite),
        Arc::new(MessagingSuite),
        Arc::new(ApiSuite),
    ]
}

fn chain(selectors: &[&str]) -> SelectorChain {
    SelectorChain::new(selectors.iter().map(|s| Selector::css(*s)).collect())
}

/// Fail with the errors of any interaction that did not go through
fn interactions_ok(what: &str, records: &[InteractionRecord]) -> StepResult {
    let errors: Vec<String> = records
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.label)))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StepFailure::assertion(format!(
            "{} of {} {what} failed: {}",
            errors.len(),
            records.len(),
            errors.join("; ")
        )))
    }
}

async fn open_view(ctx: &SuiteContext<'_>, tab: &str) -> StepResult {
    ctx.ensure_login(BARISTA).await?;
    ctx.visit("/barista").await?;
    ctx.open_tab(tab).await
}

/// Login, role switching, rejection and logout
#[derive(Debug, Default)]
pub struct AuthenticationSuite;

#[async_trait::async_trait]
impl TestSuite for AuthenticationSuite {
    fn name(&self) -> &str {
        "Authentication"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        let driver = ctx.driver();

        ctx.step("Login page renders", async {
            ctx.visit("/login").await?;
            ctx.expect_any(&SelectorChain::username_input()).await?;
            ctx.expect_any(&SelectorChain::password_input()).await?;
            ctx.expect_any(&SelectorChain::login_submit()).await
        })
        .await;

        ctx.step("Barista login", async {
            driver.login(BARISTA).await?;
            Ok(())
        })
        .await;

        ctx.step("Admin login", async {
            driver.logout().await?;
            driver.login(ADMIN).await?;
            Ok(())
        })
        .await;

        ctx.step("Invalid credentials are rejected", async {
            driver.logout().await?;
            let bogus = Credentials::new(BARISTA, "not-the-password");
            match driver.login_with(BARISTA, &bogus).await {
                Err(BrowserError::Authentication { .. }) => Ok(()),
                Err(e) => Err(e.into()),
                Ok(()) => Err(StepFailure::assertion(
                    "login with a wrong password left the login page",
                )),
            }
        })
        .await;

        ctx.step("Logout returns to login", async {
            ctx.ensure_login(BARISTA).await?;
            driver.logout().await?;
            let url = driver.current_url().await?;
            if url.contains("/login") {
                Ok(())
            } else {
                Err(StepFailure::assertion(format!("still at {url} after logout")))
            }
        })
        .await;
    }
}

/// Tab navigation on the barista view
#[derive(Debug, Default)]
pub struct NavigationSuite;

#[async_trait::async_trait]
impl TestSuite for NavigationSuite {
    fn name(&self) -> &str {
        "Navigation"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        let driver = ctx.driver();
        driver.sync_events().await;
        let baseline = driver.events().page_error_count();

        ctx.step("Tabs are present", async {
            ctx.ensure_login(BARISTA).await?;
            ctx.visit("/barista").await?;
            ctx.expect_any(&SelectorChain::tabs()).await
        })
        .await;

        ctx.step("Every tab is clickable", async {
            let (selector, tabs) = driver.expect(&SelectorChain::tabs()).await?;
            let mut errors = Vec::new();
            for (index, tab) in tabs.iter().enumerate() {
                if let Err(e) = driver.click_nth(&selector, index).await {
                    errors.push(format!("{}: {e}", tab.label()));
                }
                ctx.visit("/barista").await?;
            }
            if errors.is_empty() {
                Ok(())
            } else {
                Err(StepFailure::assertion(errors.join("; ")))
            }
        })
        .await;

        ctx.step("No uncaught page errors", async {
            driver.sync_events().await;
            let errors = driver.page_errors();
            let new = errors.get(baseline..).unwrap_or_default();
            match new.first() {
                None => Ok(()),
                Some(first) => Err(StepFailure::assertion(format!(
                    "{} uncaught page error(s): {}",
                    new.len(),
                    first.message
                ))
                .with_stack(
                    new.iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join("\n"),
                )),
            }
        })
        .await;
    }
}

/// Order queue and order controls
#[derive(Debug, Default)]
pub struct OrderManagementSuite;

#[async_trait::async_trait]
impl TestSuite for OrderManagementSuite {
    fn name(&self) -> &str {
        "Order Management"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        let driver = ctx.driver();

        ctx.step("Order queue renders", async {
            open_view(ctx, "Orders").await?;
            ctx.expect_any(&chain(&[".order-item", "[data-testid=order-item]", ".order-card"]))
                .await
        })
        .await;

        ctx.step("Order status buttons respond", async {
            let records = driver.click_all_buttons().await;
            interactions_ok("button clicks", &records)
        })
        .await;

        ctx.step("Order form fields accept input", async {
            let records = driver.test_all_form_fields().await;
            interactions_ok("field inputs", &records)
        })
        .await;
    }
}

/// Inventory view
#[derive(Debug, Default)]
pub struct StockSuite;

#[async_trait::async_trait]
impl TestSuite for StockSuite {
    fn name(&self) -> &str {
        "Stock"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        let driver = ctx.driver();

        ctx.step("Stock list renders", async {
            open_view(ctx, "Stock").await?;
            ctx.expect_any(&chain(&[".stock-item", ".inventory-item", "[data-testid=stock-item]"]))
                .await
        })
        .await;

        ctx.step("Stock controls respond", async {
            let records = driver.click_all_buttons().await;
            interactions_ok("button clicks", &records)
        })
        .await;
    }
}

/// Settings view
#[derive(Debug, Default)]
pub struct SettingsSuite;

#[async_trait::async_trait]
impl TestSuite for SettingsSuite {
    fn name(&self) -> &str {
        "Settings"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        let driver = ctx.driver();

        ctx.step("Settings view renders", async {
            open_view(ctx, "Settings").await?;
            ctx.expect_any(&chain(&[".settings", "form", "[data-testid=settings]"]))
                .await
        })
        .await;

        ctx.step("Settings inputs can be toggled", async {
            let toggles = driver
                .element_count(&chain(&["input[type=checkbox]", "select"]))
                .await?;
            if toggles == 0 {
                return Err(StepFailure::from(BrowserError::element_not_found(
                    "input[type=checkbox] | select",
                )));
            }
            let records = driver.test_all_form_fields().await;
            interactions_ok("setting changes", &records)
        })
        .await;
    }
}

/// Customer-facing display
#[derive(Debug, Default)]
pub struct DisplaySuite;

#[async_trait::async_trait]
impl TestSuite for DisplaySuite {
    fn name(&self) -> &str {
        "Display"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        let driver = ctx.driver();

        ctx.step("Display view renders without login", async {
            driver.logout().await?;
            ctx.visit("/display").await?;
            let url = driver.current_url().await?;
            if url.contains("/login") {
                Err(StepFailure::assertion(format!(
                    "display redirected to {url}; still on /login without a session"
                )))
            } else {
                Ok(())
            }
        })
        .await;

        ctx.step("Display shows orders", async {
            ctx.expect_any(&chain(&[".order-item", ".display-order", ".order-card"]))
                .await
        })
        .await;
    }
}

/// Staff messaging
#[derive(Debug, Default)]
pub struct MessagingSuite;

#[async_trait::async_trait]
impl TestSuite for MessagingSuite {
    fn name(&self) -> &str {
        "Messaging"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        let driver = ctx.driver();

        ctx.step("Messaging view renders", async {
            open_view(ctx, "Messages").await?;
            ctx.expect_any(&chain(&["textarea", "form", ".messages"])).await
        })
        .await;

        ctx.step("Message form accepts input", async {
            let records = driver.test_all_form_fields().await;
            if records.is_empty() {
                return Err(StepFailure::from(BrowserError::element_not_found(
                    "textarea | input",
                )));
            }
            interactions_ok("message inputs", &records)
        })
        .await;
    }
}

/// Backend reachability from the page
#[derive(Debug, Default)]
pub struct ApiSuite;

#[async_trait::async_trait]
impl TestSuite for ApiSuite {
    fn name(&self) -> &str {
        "API"
    }

    async fn run(&self, ctx: &SuiteContext<'_>) {
        let driver = ctx.driver();

        ctx.step("API root reachable", async {
            let url = ctx.config().health_url();
            let status = driver.fetch_status(&url).await?;
            if status < 500 {
                Ok(())
            } else {
                Err(StepFailure::assertion(format!("GET {url} answered {status}")))
            }
        })
        .await;

        ctx.step("No failed API calls", async {
            driver.sync_events().await;
            let failed: Vec<String> = driver
                .network_timings()
                .into_iter()
                .filter(|t| t.url.contains("/api/") && t.status.map_or(true, |s| s >= 500))
                .map(|t| match t.status {
                    Some(status) => format!("{} {} answered {status}", t.method, t.url),
                    None => format!("{} {}: network error, no response", t.method, t.url),
                })
                .collect();
            if failed.is_empty() {
                Ok(())
            } else {
                Err(StepFailure::assertion(format!(
                    "{} failed API call(s)",
                    failed.len()
                ))
                .with_stack(failed.join("\n")))
            }
        })
        .await;
    }
}

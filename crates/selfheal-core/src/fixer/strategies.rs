//! Built-in remediations
//!
//! Each remediation is safe to apply repeatedly: file patches carry a
//! sentinel or converge to a fixed point, and state changes are only counted
//! when they actually alter something.

use super::patch::{PatchEdit, PatchOutcome, PatchTarget};
use super::process::BackendStatus;
use super::{FixContext, FixOutcome, Remediation};
use crate::error::FixError;
use crate::types::Issue;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use selfheal_browser::StoreKey;
use std::collections::HashSet;
use std::sync::Arc;

/// Marker of the auth retry patch
pub const AUTH_RETRY_SENTINEL: &str = "selfheal:auth-retry";
/// Marker of the wait-for-element helper
pub const WAIT_HELPER_SENTINEL: &str = "selfheal:wait-for-element";
/// Marker of the proxy header helper
pub const CORS_SENTINEL: &str = "selfheal:cors-headers";

const AUTH_RETRY_SNIPPET: &str = r"
// selfheal:auth-retry
export async function withAuthRetry(request, attempts = 3, baseDelayMs = 500) {
  let lastError;
  for (let attempt = 0; attempt < attempts; attempt += 1) {
    try {
      return await request();
    } catch (err) {
      lastError = err;
      const status = err && (err.status || (err.response && err.response.status));
      if (status !== 401 && status !== 403) {
        throw err;
      }
      localStorage.removeItem('authToken');
      localStorage.removeItem('refreshToken');
      await new Promise((resolve) => setTimeout(resolve, baseDelayMs * 2 ** attempt));
    }
  }
  throw lastError;
}
";

const WAIT_HELPER_SNIPPET: &str = r"<!-- selfheal:wait-for-element -->
<script>
  window.waitForElement = function (selector, timeoutMs) {
    timeoutMs = timeoutMs || 10000;
    return new Promise(function (resolve, reject) {
      var found = document.querySelector(selector);
      if (found) { resolve(found); return; }
      var observer = new MutationObserver(function () {
        var el = document.querySelector(selector);
        if (el) { observer.disconnect(); resolve(el); }
      });
      observer.observe(document.documentElement, { childList: true, subtree: true });
      setTimeout(function () {
        observer.disconnect();
        reject(new Error('element not found: ' + selector));
      }, timeoutMs);
    });
  };
</script>
";

const CORS_SNIPPET: &str = r"// selfheal:cors-headers
const selfhealCorsHeaders = (proxyRes) => {
  proxyRes.headers['Access-Control-Allow-Origin'] = '*';
  proxyRes.headers['Access-Control-Allow-Headers'] = 'Content-Type, Authorization';
  proxyRes.headers['Access-Control-Allow-Methods'] = 'GET, POST, PUT, PATCH, DELETE, OPTIONS';
};

";

static PROXY_TARGET: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(target\s*:\s*)(['"`])([^'"`]*)(['"`])"#).ok());
static JS_TIMEOUT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(\b\w*timeout\w*['\x22]?\s*[:=]\s*)(\d+)").ok());

async fn apply_patch(
    target: &PatchTarget,
    ctx: &FixContext,
    outcome: &mut FixOutcome,
) -> Result<(), FixError> {
    let result = target.apply(ctx.config.dry_run).await?;
    if let PatchOutcome::DryRun { path, preview } = &result {
        tracing::info!("→ dry run: {} would become {} bytes", path.display(), preview.len());
        tracing::debug!("dry run preview for {}:\n{}", path.display(), preview);
    }
    outcome.patch(&result);
    Ok(())
}

/// Clear stored auth identity; add retry-with-backoff to the auth service
#[derive(Debug, Default)]
pub struct CredentialReset;

#[async_trait::async_trait]
impl Remediation for CredentialReset {
    fn name(&self) -> &'static str {
        "credential-reset"
    }

    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<FixOutcome, FixError> {
        let mut outcome = FixOutcome::default();

        let removed = ctx.store.remove_all(&StoreKey::AUTH).await?;
        if removed.is_empty() {
            outcome.note("no stored credentials to clear");
        } else {
            outcome.changed(format!("cleared {}", join_keys(&removed)));
        }

        if ctx.config.sandbox_fixtures && ctx.config.base_is_loopback() {
            let role = issue.context.get("role").map_or("barista", String::as_str);
            ctx.store
                .set(StoreKey::AuthToken, &sandbox_token(role))
                .await?;
            ctx.store.set(StoreKey::UserRole, role).await?;
            outcome.changed(format!("seeded sandbox token for '{role}'"));
        }

        let path = ctx.config.resolve(&ctx.config.patch_targets.auth_service);
        if path.exists() {
            let target = PatchTarget::new(&path, PatchEdit::Append(AUTH_RETRY_SNIPPET.into()))
                .with_sentinel(AUTH_RETRY_SENTINEL);
            apply_patch(&target, ctx, &mut outcome).await?;
        } else {
            outcome.note(format!("{} not found; retry patch skipped", path.display()));
        }
        Ok(outcome)
    }
}

/// Unsigned stand-in token; only ever issued for loopback fixture runs
fn sandbox_token(role: &str) -> String {
    format!("sandbox.{role}.{}", Utc::now().timestamp())
}

/// Inject a wait-for-element helper into the static HTML shell
#[derive(Debug, Default)]
pub struct SelectorResilience;

#[async_trait::async_trait]
impl Remediation for SelectorResilience {
    fn name(&self) -> &'static str {
        "selector-resilience"
    }

    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<FixOutcome, FixError> {
        let mut outcome = FixOutcome::default();
        let path = ctx.config.resolve(&ctx.config.patch_targets.static_html);
        let target = PatchTarget::new(
            &path,
            PatchEdit::InsertBefore {
                anchor: "</body>".into(),
                text: WAIT_HELPER_SNIPPET.into(),
            },
        )
        .with_sentinel(WAIT_HELPER_SENTINEL);
        apply_patch(&target, ctx, &mut outcome).await?;
        if let Some(selector) = issue.context.get("selector") {
            outcome.note(format!("late-rendering selector '{selector}'"));
        }
        Ok(outcome)
    }
}

/// Switch the application to fallback data and bring the backend up
#[derive(Debug, Default)]
pub struct FallbackToggle;

#[async_trait::async_trait]
impl Remediation for FallbackToggle {
    fn name(&self) -> &'static str {
        "fallback-toggle"
    }

    async fn apply(&self, _issue: &Issue, ctx: &FixContext) -> Result<FixOutcome, FixError> {
        let mut outcome = FixOutcome::default();

        let current = ctx.store.get(StoreKey::UseFallbackData).await?;
        if current.as_deref() == Some("true") {
            outcome.note("fallback data already enabled");
        } else {
            ctx.store.set(StoreKey::UseFallbackData, "true").await?;
            outcome.changed("enabled fallback data");
        }

        match ctx.supervisor.ensure_running().await {
            Ok(BackendStatus::Started { pid }) => {
                outcome.changed(format!("started backend (pid {pid:?})"));
            }
            Ok(BackendStatus::Healthy) => outcome.note("backend healthy"),
            Ok(BackendStatus::NotConfigured) => outcome.note("backend down; no start command"),
            Ok(BackendStatus::Unresponsive) => outcome.note("backend started but not healthy yet"),
            Err(e) if outcome.is_changed() => outcome.note(e.to_string()),
            Err(e) => return Err(e),
        }
        Ok(outcome)
    }
}

/// Raise timeout values in the timeout configuration to the floor
#[derive(Debug, Default)]
pub struct TimeoutBump;

#[async_trait::async_trait]
impl Remediation for TimeoutBump {
    fn name(&self) -> &'static str {
        "timeout-bump"
    }

    async fn apply(&self, _issue: &Issue, ctx: &FixContext) -> Result<FixOutcome, FixError> {
        let mut outcome = FixOutcome::default();
        let floor = ctx.config.timeout_floor_ms;
        let path = ctx.config.resolve(&ctx.config.patch_targets.timeout_config);
        let target = PatchTarget::new(
            &path,
            PatchEdit::Rewrite(Arc::new(move |content| raise_timeouts(content, floor))),
        );
        apply_patch(&target, ctx, &mut outcome).await?;
        Ok(outcome)
    }
}

/// Raise every timeout-named numeric setting below `floor`
///
/// JSON objects are edited structurally; anything else is treated as script
/// text. Returns `content` unchanged when no value is below the floor.
#[must_use]
pub fn raise_timeouts(content: &str, floor: u64) -> String {
    if let Ok(serde_json::Value::Object(mut map)) = serde_json::from_str(content) {
        let mut found = false;
        let changed = raise_json(&mut map, floor, &mut found);
        if !found {
            map.insert("timeout".into(), floor.into());
        }
        if !changed && found {
            return content.to_string();
        }
        return match serde_json::to_string_pretty(&map) {
            Ok(mut text) => {
                text.push('\n');
                text
            }
            Err(_) => content.to_string(),
        };
    }

    let Some(re) = Lazy::force(&JS_TIMEOUT).as_ref() else {
        return content.to_string();
    };
    re.replace_all(content, |caps: &Captures<'_>| match caps[2].parse::<u64>() {
        Ok(value) if value < floor => format!("{}{floor}", &caps[1]),
        _ => caps[0].to_string(),
    })
    .into_owned()
}

fn raise_json(
    map: &mut serde_json::Map<String, serde_json::Value>,
    floor: u64,
    found: &mut bool,
) -> bool {
    let mut changed = false;
    for (key, value) in map.iter_mut() {
        match value {
            serde_json::Value::Object(inner) => changed |= raise_json(inner, floor, found),
            serde_json::Value::Number(n) if key.to_ascii_lowercase().contains("timeout") => {
                *found = true;
                if n.as_u64().is_some_and(|v| v < floor) {
                    *value = floor.into();
                    changed = true;
                }
            }
            _ => {}
        }
    }
    changed
}

/// Clear cached application state, keeping the signed-in identity
///
/// The fallback flag survives as well, so a reset in the same cycle as
/// [`FallbackToggle`] does not undo it.
#[derive(Debug, Default)]
pub struct StorageReset;

impl StorageReset {
    /// Keys a reset never removes
    #[must_use]
    pub fn preserved() -> HashSet<StoreKey> {
        let mut keep = StoreKey::auth_set();
        keep.insert(StoreKey::UseFallbackData);
        keep
    }
}

#[async_trait::async_trait]
impl Remediation for StorageReset {
    fn name(&self) -> &'static str {
        "storage-reset"
    }

    async fn apply(&self, _issue: &Issue, ctx: &FixContext) -> Result<FixOutcome, FixError> {
        let mut outcome = FixOutcome::default();
        let removed = ctx.store.clear(&Self::preserved()).await?;
        if removed.is_empty() {
            outcome.note("no cached state to clear");
        } else {
            outcome.changed(format!("cleared {}", join_keys(&removed)));
        }
        Ok(outcome)
    }
}

/// Point the dev proxy at the backend and add permissive CORS headers
#[derive(Debug, Default)]
pub struct ProxyRewrite;

#[async_trait::async_trait]
impl Remediation for ProxyRewrite {
    fn name(&self) -> &'static str {
        "proxy-rewrite"
    }

    async fn apply(&self, _issue: &Issue, ctx: &FixContext) -> Result<FixOutcome, FixError> {
        let mut outcome = FixOutcome::default();
        let path = ctx.config.resolve(&ctx.config.patch_targets.proxy_config);

        let helper = PatchTarget::new(
            &path,
            PatchEdit::InsertBefore {
                anchor: "module.exports".into(),
                text: CORS_SNIPPET.into(),
            },
        )
        .with_sentinel(CORS_SENTINEL);
        apply_patch(&helper, ctx, &mut outcome).await?;

        let origin = ctx.config.api_base_url.trim_end_matches('/').to_string();
        let retarget = PatchTarget::new(
            &path,
            PatchEdit::Rewrite(Arc::new(move |content| retarget_proxy(content, &origin))),
        );
        apply_patch(&retarget, ctx, &mut outcome).await?;
        Ok(outcome)
    }
}

/// Rewrite every `target:` URL to `origin` and wire the header helper
#[must_use]
pub fn retarget_proxy(content: &str, origin: &str) -> String {
    let Some(re) = Lazy::force(&PROXY_TARGET).as_ref() else {
        return content.to_string();
    };
    let wire = !content.contains("onProxyRes");
    re.replace_all(content, |caps: &Captures<'_>| {
        let quote = &caps[2];
        let mut out = format!("{}{quote}{origin}{}", &caps[1], &caps[4]);
        if wire {
            out.push_str(",\n    onProxyRes: selfhealCorsHeaders");
        }
        out
    })
    .into_owned()
}

fn join_keys(keys: &[StoreKey]) -> String {
    keys.iter()
        .map(StoreKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_timeouts_raised_to_floor() {
        let out = raise_timeouts(r#"{"apiTimeout": 5000, "nested": {"loginTimeoutMs": 45000}, "retries": 2}"#, 30_000);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["apiTimeout"], 30_000);
        assert_eq!(value["nested"]["loginTimeoutMs"], 45_000);
        assert_eq!(value["retries"], 2);
    }

    #[test]
    fn json_at_floor_is_left_alone() {
        let original = r#"{"timeout": 30000}"#;
        assert_eq!(raise_timeouts(original, 30_000), original);
    }

    #[test]
    fn json_without_timeouts_gains_one() {
        let out = raise_timeouts("{}", 30_000);
        assert!(out.contains("\"timeout\": 30000"));
    }

    #[test]
    fn script_timeouts_raised() {
        let out = raise_timeouts("export const config = { requestTimeout: 8000, retries: 3 };", 30_000);
        assert_eq!(out, "export const config = { requestTimeout: 30000, retries: 3 };");
        assert_eq!(raise_timeouts(&out, 30_000), out);
    }

    #[test]
    fn json_rewrite_keeps_key_order() {
        let out = raise_timeouts(r#"{"zeta": 1, "requestTimeout": 100, "alpha": 2}"#, 30_000);
        let keys: Vec<_> = ["zeta", "requestTimeout", "alpha"]
            .iter()
            .map(|k| out.find(k).unwrap())
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{out}");
    }

    #[test]
    fn oversized_script_timeout_is_left_alone() {
        let src = "const api = { timeout: 99999999999999999999999 };";
        assert_eq!(raise_timeouts(src, 30_000), src);
        assert_eq!(
            raise_timeouts("const t = { timeout: 45000 };", 30_000),
            "const t = { timeout: 45000 };"
        );
    }

    #[test]
    fn proxy_retargeted_once() {
        let src = "module.exports = function (app) {\n  app.use('/api', createProxyMiddleware({\n    target: 'http://localhost:8080',\n    changeOrigin: true,\n  }));\n};\n";
        let once = retarget_proxy(src, "http://localhost:5000");
        assert!(once.contains("target: 'http://localhost:5000',\n    onProxyRes: selfhealCorsHeaders"));
        let twice = retarget_proxy(&once, "http://localhost:5000");
        assert_eq!(once, twice);
    }

    #[test]
    fn sandbox_token_is_marked() {
        assert!(sandbox_token("admin").starts_with("sandbox.admin."));
    }
}

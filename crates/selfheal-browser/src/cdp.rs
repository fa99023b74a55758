//! Chrome DevTools Protocol backend
//!
//! Console output, page errors and `fetch`/XHR traffic are captured by a
//! script installed on every new document. It buffers records in
//! `window.__selfheal.events`, which [`CdpBackend::drain_events`] empties.

use crate::backend::{BrowserBackend, ElementInfo, LaunchOptions};
use crate::error::BrowserError;
use crate::events::BrowserEvent;
use crate::selector::{js_string, Selector};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const CAPTURE_SCRIPT: &str = r"
(() => {
  if (window.__selfheal) { return; }
  const buf = { events: [] };
  window.__selfheal = buf;
  const now = () => Date.now();
  const push = (e) => { buf.events.push(e); };
  const text = (args) => args.map((a) => {
    if (a instanceof Error) { return a.message; }
    if (typeof a === 'object') { try { return JSON.stringify(a); } catch (_) { return String(a); } }
    return String(a);
  }).join(' ');
  for (const level of ['log', 'info', 'warn', 'error', 'debug']) {
    const orig = console[level].bind(console);
    console[level] = (...args) => {
      push({ kind: 'console', level: level === 'warn' ? 'warning' : level, text: text(args), ts: now() });
      orig(...args);
    };
  }
  window.addEventListener('error', (ev) => {
    push({ kind: 'page_error', message: ev.message || String(ev.error), ts: now() });
  });
  window.addEventListener('unhandledrejection', (ev) => {
    const r = ev.reason;
    push({ kind: 'page_error', message: (r && r.message) || String(r), ts: now() });
  });
  const origFetch = window.fetch.bind(window);
  window.fetch = (input, init) => {
    const url = typeof input === 'string' ? input : (input && input.url) || String(input);
    const method = (init && init.method) || (input && input.method) || 'GET';
    push({ kind: 'request', url, method: method.toUpperCase(), ts: now() });
    return origFetch(input, init).then((res) => {
      push({ kind: 'response', url, status: res.status, ts: now() });
      return res;
    }, (err) => {
      push({ kind: 'request_failed', url, error: String(err), ts: now() });
      throw err;
    });
  };
  const open = XMLHttpRequest.prototype.open;
  const send = XMLHttpRequest.prototype.send;
  XMLHttpRequest.prototype.open = function (method, url, ...rest) {
    this.__selfheal = { method: String(method).toUpperCase(), url: String(url) };
    return open.call(this, method, url, ...rest);
  };
  XMLHttpRequest.prototype.send = function (...args) {
    const meta = this.__selfheal;
    if (meta) {
      push({ kind: 'request', url: meta.url, method: meta.method, ts: now() });
      this.addEventListener('loadend', () => {
        if (this.status === 0) {
          push({ kind: 'request_failed', url: meta.url, error: 'net::ERR_FAILED', ts: now() });
        } else {
          push({ kind: 'response', url: meta.url, status: this.status, ts: now() });
        }
      });
    }
    return send.apply(this, args);
  };
})();
";

const DRAIN_SCRIPT: &str =
    "(() => (window.__selfheal ? window.__selfheal.events.splice(0) : []))()";

#[derive(Deserialize)]
struct StorageValue {
    value: Option<String>,
}

#[derive(Deserialize)]
struct FetchOutcome {
    status: Option<u16>,
    error: Option<String>,
}

/// Backend driving Chrome/Chromium over CDP
pub struct CdpBackend {
    browser: tokio::sync::Mutex<Browser>,
    page: Page,
    handler: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for CdpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpBackend")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl CdpBackend {
    /// Launch a browser and open one page with event capture installed
    ///
    /// # Errors
    /// `BrowserError::LaunchFailed` when Chrome cannot be started.
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.viewport.width, options.viewport.height)
            .request_timeout(options.timeout())
            // CI containers usually run as root
            .no_sandbox();
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(CAPTURE_SCRIPT))
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        tracing::info!(
            "browser launched (headless: {}, viewport: {}x{})",
            options.headless,
            options.viewport.width,
            options.viewport.height
        );

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            page,
            handler: parking_lot::Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::SessionClosed);
        }
        Ok(())
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, BrowserError> {
        self.ensure_open()?;
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Script)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn act(&self, selector: &Selector, script: String) -> Result<(), BrowserError> {
        let outcome: String = self.eval(&script).await?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "missing" => Err(BrowserError::element_not_found(selector.to_string())),
            other => Err(BrowserError::NotInteractable {
                selector: selector.to_string(),
                reason: other.to_string(),
            }),
        }
    }
}

impl Drop for CdpBackend {
    fn drop(&mut self) {
        if let Some(handle) = self.handler.lock().take() {
            handle.abort();
        }
    }
}

fn query_script(selector: &Selector) -> String {
    format!(
        "(() => {}.map((el) => {{ \
            const r = el.getBoundingClientRect(); const s = getComputedStyle(el); \
            const useValue = el.tagName !== 'BUTTON' && el.value !== undefined; \
            return {{ tag: el.tagName.toLowerCase(), input_type: el.getAttribute('type'), \
              name: el.getAttribute('name'), \
              text: String((useValue ? el.value : el.textContent) || '').trim().slice(0, 80), \
              visible: r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none', \
              enabled: !el.disabled }}; }}))()",
        selector.to_js_collect()
    )
}

fn click_script(selector: &Selector, index: usize) -> String {
    format!(
        "(() => {{ const el = {}[{index}]; if (!el) {{ return 'missing'; }} \
            if (el.disabled) {{ return 'element is disabled'; }} \
            el.scrollIntoView({{ block: 'center' }}); el.click(); return 'ok'; }})()",
        selector.to_js_collect()
    )
}

fn fill_script(selector: &Selector, index: usize, value: &str) -> String {
    format!(
        "(() => {{ const el = {}[{index}]; if (!el) {{ return 'missing'; }} \
            if (el.disabled || el.readOnly) {{ return 'element is disabled or read-only'; }} \
            el.focus(); \
            const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype \
              : el.tagName === 'SELECT' ? HTMLSelectElement.prototype : HTMLInputElement.prototype; \
            Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {}); \
            el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
            el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
            return 'ok'; }})()",
        selector.to_js_collect(),
        js_string(value)
    )
}

fn fetch_script(url: &str) -> String {
    format!(
        "fetch({}, {{ credentials: 'include' }}) \
            .then((r) => ({{ status: r.status }}), (e) => ({{ error: String(e) }}))",
        js_string(url)
    )
}

#[async_trait::async_trait]
impl BrowserBackend for CdpBackend {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.ensure_open()?;
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::navigation(url, e.to_string())),
            Err(_) => Err(BrowserError::timeout(
                format!("navigation to {url}"),
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        let url = self
            .page
            .url()
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn query(&self, selector: &Selector) -> Result<Vec<ElementInfo>, BrowserError> {
        self.eval(&query_script(selector)).await
    }

    async fn click(&self, selector: &Selector, index: usize) -> Result<(), BrowserError> {
        self.act(selector, click_script(selector, index)).await
    }

    async fn fill(
        &self,
        selector: &Selector,
        index: usize,
        value: &str,
    ) -> Result<(), BrowserError> {
        self.act(selector, fill_script(selector, index, value)).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        use base64::Engine;

        self.ensure_open()?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self
            .page
            .execute(params)
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| BrowserError::Screenshot(e.to_string()))
    }

    async fn drain_events(&self) -> Result<Vec<BrowserEvent>, BrowserError> {
        self.eval(DRAIN_SCRIPT).await
    }

    async fn storage_get(&self, key: &str) -> Result<Option<String>, BrowserError> {
        let script = format!(
            "(() => ({{ value: window.localStorage.getItem({}) }}))()",
            js_string(key)
        );
        let found: StorageValue = self
            .eval(&script)
            .await
            .map_err(|e| BrowserError::Storage(e.to_string()))?;
        Ok(found.value)
    }

    async fn storage_set(&self, key: &str, value: &str) -> Result<(), BrowserError> {
        let script = format!(
            "(() => {{ window.localStorage.setItem({}, {}); return true; }})()",
            js_string(key),
            js_string(value)
        );
        self.eval::<bool>(&script)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Storage(e.to_string()))
    }

    async fn storage_remove(&self, key: &str) -> Result<(), BrowserError> {
        let script = format!(
            "(() => {{ window.localStorage.removeItem({}); return true; }})()",
            js_string(key)
        );
        self.eval::<bool>(&script)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Storage(e.to_string()))
    }

    async fn fetch_status(&self, url: &str) -> Result<u16, BrowserError> {
        let outcome: FetchOutcome = self.eval(&fetch_script(url)).await?;
        match (outcome.status, outcome.error) {
            (Some(status), _) => Ok(status),
            (None, error) => Err(BrowserError::navigation(
                url,
                error.unwrap_or_else(|| "Failed to fetch".to_string()),
            )),
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.browser.lock().await.close().await;
        if let Some(handle) = self.handler.lock().take() {
            handle.abort();
        }
        result
            .map(|_| ())
            .map_err(|e| BrowserError::Script(format!("browser close failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_script_escapes_value() {
        let script = fill_script(&Selector::css("input[name=q]"), 0, "it's \"quoted\"");
        assert!(script.contains(r#""it's \"quoted\"""#));
        assert!(script.contains("dispatchEvent(new Event('input'"));
    }

    #[test]
    fn click_script_indexes_collection() {
        let script = click_script(&Selector::text("button", "Start"), 2);
        assert!(script.contains("[2]"));
        assert!(script.contains("includes(\"Start\")"));
    }

    #[test]
    fn capture_script_tags_match_event_serde() {
        for kind in ["'console'", "'page_error'", "'request'", "'response'", "'request_failed'"] {
            assert!(CAPTURE_SCRIPT.contains(kind), "missing {kind}");
        }
    }
}

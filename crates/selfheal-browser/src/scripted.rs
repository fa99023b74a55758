//! Deterministic in-memory browser backend
//!
//! Models an application as a set of pages whose elements answer to explicit
//! selector hooks. Elements can be gated on a storage value, pages can require
//! a signed-in session, and the login form checks a small account table. Used
//! by tests and fixtures wherever a real browser is not wanted.

use crate::backend::{BrowserBackend, ElementInfo};
use crate::error::BrowserError;
use crate::events::BrowserEvent;
use crate::selector::Selector;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Smallest valid PNG signature, enough for screenshot plumbing
const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// What happens when an element is clicked
#[derive(Debug, Clone, PartialEq)]
pub enum ClickAction {
    /// Nothing observable
    None,
    /// Go to another path
    Navigate(String),
    /// Submit the login form on the current page
    SubmitLogin,
    /// Clear the session and return to `/login`
    Logout,
    /// Emit events (console/network) into the buffer
    Emit(Vec<BrowserEvent>),
    /// Write a storage key
    SetStorage(String, String),
    /// Go to another path, then drop the connection
    NavigateThenDisconnect(String),
}

/// One element on a scripted page
#[derive(Debug, Clone)]
pub struct ScriptedElement {
    hooks: Vec<Selector>,
    info: ElementInfo,
    gate: Option<(String, String)>,
    on_click: ClickAction,
}

impl ScriptedElement {
    /// Create element with tag and the CSS hooks it answers to
    #[must_use]
    pub fn new(tag: &str, hooks: &[&str]) -> Self {
        Self {
            hooks: hooks.iter().map(|h| Selector::css(*h)).collect(),
            info: ElementInfo {
                tag: tag.to_string(),
                input_type: None,
                name: None,
                text: String::new(),
                visible: true,
                enabled: true,
            },
            gate: None,
            on_click: ClickAction::None,
        }
    }

    /// Text input with `name`
    #[must_use]
    pub fn input(input_type: &str, name: &str) -> Self {
        let hooks = [
            format!("input[name={name}]"),
            format!("input[type={input_type}]"),
            format!("#{name}"),
            "input".to_string(),
        ];
        let hooks: Vec<&str> = hooks.iter().map(String::as_str).collect();
        let mut el = Self::new("input", &hooks);
        el.info.input_type = Some(input_type.to_string());
        el.info.name = Some(name.to_string());
        el
    }

    /// Button with text
    #[must_use]
    pub fn button(text: &str) -> Self {
        let mut el = Self::new("button", &["button"]);
        el.info.text = text.to_string();
        el
    }

    /// Add a selector hook
    #[must_use]
    pub fn hook(mut self, selector: Selector) -> Self {
        self.hooks.push(selector);
        self
    }

    /// Set visible text
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.info.text = text.to_string();
        self
    }

    /// Render only while storage `key` equals `value`
    #[must_use]
    pub fn gated_on(mut self, key: &str, value: &str) -> Self {
        self.gate = Some((key.to_string(), value.to_string()));
        self
    }

    /// Click behaviour
    #[must_use]
    pub fn on_click(mut self, action: ClickAction) -> Self {
        self.on_click = action;
        self
    }

    /// Mark disabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.info.enabled = false;
        self
    }

    /// Mark hidden
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.info.visible = false;
        self
    }

    fn matches(&self, selector: &Selector) -> bool {
        if self.hooks.contains(selector) {
            return true;
        }
        match selector {
            Selector::Text { tag, text } => self.info.tag == *tag && self.info.text.contains(text),
            _ => false,
        }
    }
}

/// One scripted page
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    path: String,
    elements: Vec<ScriptedElement>,
    on_load: Vec<BrowserEvent>,
    requires_login: bool,
}

impl ScriptedPage {
    /// Create page at `path`
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }

    /// Add element
    #[must_use]
    pub fn element(mut self, element: ScriptedElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Events emitted every time the page loads
    #[must_use]
    pub fn on_load(mut self, event: BrowserEvent) -> Self {
        self.on_load.push(event);
        self
    }

    /// Redirect to `/login` without a session
    #[must_use]
    pub fn requires_login(mut self) -> Self {
        self.requires_login = true;
        self
    }
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    role: String,
    landing: String,
}

#[derive(Debug, Default)]
struct State {
    path: String,
    pages: HashMap<String, ScriptedPage>,
    storage: BTreeMap<String, String>,
    values: HashMap<(String, usize), String>,
    accounts: HashMap<String, Account>,
    login_blocked_by: Option<(String, String)>,
    api_status: HashMap<String, u16>,
    pending: Vec<BrowserEvent>,
    clicks: Vec<String>,
    unreachable: bool,
    fail_screenshots: bool,
    closed: bool,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 10;
        self.clock
    }

    fn gate_open(&self, gate: Option<&(String, String)>) -> bool {
        gate.map_or(true, |(k, v)| self.storage.get(k) == Some(v))
    }

    fn visible_matches(&self, selector: &Selector) -> Vec<(usize, ElementInfo)> {
        let Some(page) = self.pages.get(&self.path) else {
            return Vec::new();
        };
        page.elements
            .iter()
            .enumerate()
            .filter(|(_, el)| self.gate_open(el.gate.as_ref()) && el.matches(selector))
            .map(|(i, el)| {
                let mut info = el.info.clone();
                if let Some(v) = self.values.get(&(self.path.clone(), i)) {
                    info.text.clone_from(v);
                }
                (i, info)
            })
            .collect()
    }

    fn load(&mut self, path: &str) {
        let mut target = path.to_string();
        if let Some(page) = self.pages.get(&target) {
            if page.requires_login && !self.storage.contains_key("authToken") {
                target = "/login".to_string();
            }
        }
        self.path = target;
        self.values.retain(|(p, _), _| p != &self.path);
        let events = self
            .pages
            .get(&self.path)
            .map(|p| p.on_load.clone())
            .unwrap_or_default();
        for event in events {
            let ts = self.tick();
            self.pending.push(retime(event, ts));
        }
    }

    fn field_value(&self, name: &str) -> Option<String> {
        let page = self.pages.get(&self.path)?;
        let idx = page
            .elements
            .iter()
            .position(|el| el.info.name.as_deref() == Some(name))?;
        self.values.get(&(self.path.clone(), idx)).cloned()
    }

    fn submit_login(&mut self) {
        let username = self.field_value("username").unwrap_or_default();
        let password = self.field_value("password").unwrap_or_default();
        let ts = self.tick();
        self.pending.push(BrowserEvent::Request {
            url: "/api/auth/login".into(),
            method: "POST".into(),
            ts,
        });

        let blocked = self
            .login_blocked_by
            .as_ref()
            .is_some_and(|(k, v)| self.storage.get(k) == Some(v));
        let account = self
            .accounts
            .get(&username)
            .filter(|a| a.password == password)
            .cloned();

        let ts = self.tick();
        match account {
            Some(account) if !blocked => {
                self.pending.push(BrowserEvent::Response {
                    url: "/api/auth/login".into(),
                    status: 200,
                    ts,
                });
                self.storage
                    .insert("authToken".into(), format!("token-{username}"));
                self.storage.insert("userRole".into(), account.role.clone());
                self.storage.insert("username".into(), username);
                self.load(&account.landing);
            }
            _ => {
                self.pending.push(BrowserEvent::Response {
                    url: "/api/auth/login".into(),
                    status: 401,
                    ts,
                });
                self.pending.push(BrowserEvent::Console {
                    level: "error".into(),
                    text: "Login failed: 401 Unauthorized".into(),
                    ts,
                });
            }
        }
    }
}

fn retime(event: BrowserEvent, now: u64) -> BrowserEvent {
    match event {
        BrowserEvent::Console { level, text, .. } => BrowserEvent::Console { level, text, ts: now },
        BrowserEvent::PageError { message, .. } => BrowserEvent::PageError { message, ts: now },
        BrowserEvent::Request { url, method, .. } => BrowserEvent::Request { url, method, ts: now },
        BrowserEvent::Response { url, status, .. } => BrowserEvent::Response { url, status, ts: now },
        BrowserEvent::RequestFailed { url, error, .. } => {
            BrowserEvent::RequestFailed { url, error, ts: now }
        }
    }
}

/// In-memory application model
#[derive(Debug)]
pub struct ScriptedBackend {
    origin: String,
    state: Mutex<State>,
}

impl ScriptedBackend {
    /// Create backend for an application served at `origin`
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            state: Mutex::new(State {
                path: "about:blank".into(),
                ..State::default()
            }),
        }
    }

    /// Add page
    #[must_use]
    pub fn page(self, page: ScriptedPage) -> Self {
        self.state.lock().pages.insert(page.path.clone(), page);
        self
    }

    /// Add login account
    #[must_use]
    pub fn account(self, username: &str, password: &str, role: &str, landing: &str) -> Self {
        self.state.lock().accounts.insert(
            username.to_string(),
            Account {
                password: password.to_string(),
                role: role.to_string(),
                landing: landing.to_string(),
            },
        );
        self
    }

    /// Reject every login while storage `key` equals `value`
    #[must_use]
    pub fn login_blocked_by(self, key: &str, value: &str) -> Self {
        self.state.lock().login_blocked_by = Some((key.to_string(), value.to_string()));
        self
    }

    /// Status returned for page-context fetches of `path`
    #[must_use]
    pub fn api_status(self, path: &str, status: u16) -> Self {
        self.state.lock().api_status.insert(path.to_string(), status);
        self
    }

    /// Seed a storage entry
    #[must_use]
    pub fn storage(self, key: &str, value: &str) -> Self {
        self.state
            .lock()
            .storage
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Toggle unreachable mode (navigation and fetches fail)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Make screenshots fail
    pub fn set_fail_screenshots(&self, fail: bool) {
        self.state.lock().fail_screenshots = fail;
    }

    /// Clicked element labels in order
    #[must_use]
    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    /// Current storage contents
    #[must_use]
    pub fn storage_snapshot(&self) -> BTreeMap<String, String> {
        self.state.lock().storage.clone()
    }

    /// Check if `close` was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn path_of(&self, url: &str) -> String {
        let rest = url.strip_prefix(&self.origin).unwrap_or(url);
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        if rest.is_empty() {
            "/".to_string()
        } else {
            rest.to_string()
        }
    }

    fn guard(&self) -> Result<parking_lot::MutexGuard<'_, State>, BrowserError> {
        let state = self.state.lock();
        if state.closed {
            return Err(BrowserError::SessionClosed);
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl BrowserBackend for ScriptedBackend {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        let path = self.path_of(url);
        let mut state = self.guard()?;
        if state.unreachable {
            return Err(BrowserError::navigation(url, "net::ERR_CONNECTION_REFUSED"));
        }
        state.load(&path);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let state = self.guard()?;
        Ok(format!("{}{}", self.origin, state.path))
    }

    async fn query(&self, selector: &Selector) -> Result<Vec<ElementInfo>, BrowserError> {
        let state = self.guard()?;
        Ok(state
            .visible_matches(selector)
            .into_iter()
            .map(|(_, info)| info)
            .collect())
    }

    async fn click(&self, selector: &Selector, index: usize) -> Result<(), BrowserError> {
        let mut state = self.guard()?;
        let matches = state.visible_matches(selector);
        let Some((element_idx, info)) = matches.get(index).cloned() else {
            return Err(BrowserError::element_not_found(selector.to_string()));
        };
        if !info.is_interactable() {
            return Err(BrowserError::NotInteractable {
                selector: selector.to_string(),
                reason: "element is disabled or not visible".into(),
            });
        }
        state.clicks.push(info.label());
        let action = state
            .pages
            .get(&state.path)
            .and_then(|p| p.elements.get(element_idx))
            .map(|el| el.on_click.clone())
            .unwrap_or(ClickAction::None);

        match action {
            ClickAction::None => {}
            ClickAction::Navigate(path) => state.load(&path),
            ClickAction::NavigateThenDisconnect(path) => {
                state.load(&path);
                state.unreachable = true;
            }
            ClickAction::SubmitLogin => state.submit_login(),
            ClickAction::Logout => {
                for key in ["authToken", "refreshToken", "userRole", "username"] {
                    state.storage.remove(key);
                }
                state.load("/login");
            }
            ClickAction::Emit(events) => {
                for event in events {
                    let ts = state.tick();
                    state.pending.push(retime(event, ts));
                }
            }
            ClickAction::SetStorage(key, value) => {
                state.storage.insert(key, value);
            }
        }
        Ok(())
    }

    async fn fill(
        &self,
        selector: &Selector,
        index: usize,
        value: &str,
    ) -> Result<(), BrowserError> {
        let mut state = self.guard()?;
        let matches = state.visible_matches(selector);
        let Some((element_idx, info)) = matches.get(index).cloned() else {
            return Err(BrowserError::element_not_found(selector.to_string()));
        };
        if !info.is_interactable() {
            return Err(BrowserError::NotInteractable {
                selector: selector.to_string(),
                reason: "element is disabled or not visible".into(),
            });
        }
        let path = state.path.clone();
        state.values.insert((path, element_idx), value.to_string());
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let state = self.guard()?;
        if state.fail_screenshots {
            return Err(BrowserError::Screenshot("capture disabled".into()));
        }
        Ok(PNG_STUB.to_vec())
    }

    async fn drain_events(&self) -> Result<Vec<BrowserEvent>, BrowserError> {
        let mut state = self.guard()?;
        Ok(std::mem::take(&mut state.pending))
    }

    async fn storage_get(&self, key: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.guard()?.storage.get(key).cloned())
    }

    async fn storage_set(&self, key: &str, value: &str) -> Result<(), BrowserError> {
        self.guard()?
            .storage
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn storage_remove(&self, key: &str) -> Result<(), BrowserError> {
        self.guard()?.storage.remove(key);
        Ok(())
    }

    async fn fetch_status(&self, url: &str) -> Result<u16, BrowserError> {
        let path = self.path_of(url);
        let mut state = self.guard()?;
        let ts = state.tick();
        state.pending.push(BrowserEvent::Request {
            url: url.to_string(),
            method: "GET".into(),
            ts,
        });
        let ts = state.tick();
        if state.unreachable {
            state.pending.push(BrowserEvent::RequestFailed {
                url: url.to_string(),
                error: "TypeError: Failed to fetch".into(),
                ts,
            });
            return Err(BrowserError::navigation(url, "Failed to fetch (ECONNREFUSED)"));
        }
        let status = state.api_status.get(&path).copied().unwrap_or(404);
        state.pending.push(BrowserEvent::Response {
            url: url.to_string(),
            status,
            ts,
        });
        Ok(status)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

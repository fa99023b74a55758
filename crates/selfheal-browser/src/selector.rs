//! Element selectors and ordered fallback chains
//!
//! A [`SelectorChain`] is tried front to back; the first selector that
//! matches at least one element wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single way of locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// Plain CSS selector
    Css(String),
    /// Elements of `tag` whose text contains `text`
    Text { tag: String, text: String },
    /// Elements exposing `role="..."`
    Role(String),
}

impl Selector {
    /// CSS selector
    #[inline]
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Tag + contained text
    #[inline]
    #[must_use]
    pub fn text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            tag: tag.into(),
            text: text.into(),
        }
    }

    /// ARIA role
    #[inline]
    #[must_use]
    pub fn role(role: impl Into<String>) -> Self {
        Self::Role(role.into())
    }

    /// JavaScript expression evaluating to an array of matching elements
    #[must_use]
    pub fn to_js_collect(&self) -> String {
        match self {
            Self::Css(css) => format!(
                "Array.from(document.querySelectorAll({}))",
                js_string(css)
            ),
            Self::Text { tag, text } => format!(
                "Array.from(document.querySelectorAll({})).filter(el => (el.textContent || '').includes({}))",
                js_string(tag),
                js_string(text)
            ),
            Self::Role(role) => format!(
                "Array.from(document.querySelectorAll({}))",
                js_string(&format!("[role=\"{role}\"]"))
            ),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "{css}"),
            Self::Text { tag, text } => write!(f, "{tag}:text(\"{text}\")"),
            Self::Role(role) => write!(f, "[role=\"{role}\"]"),
        }
    }
}

/// Ordered list of selectors tried in sequence
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectorChain {
    selectors: Vec<Selector>,
}

impl SelectorChain {
    /// Create chain from selectors
    #[inline]
    #[must_use]
    pub fn new(selectors: Vec<Selector>) -> Self {
        Self { selectors }
    }

    /// Chain with a single CSS selector
    #[inline]
    #[must_use]
    pub fn single(css: impl Into<String>) -> Self {
        Self::new(vec![Selector::css(css)])
    }

    /// Append a fallback
    #[inline]
    #[must_use]
    pub fn or(mut self, selector: Selector) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Selectors in trial order
    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.selectors.iter()
    }

    /// Number of selectors
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    /// Check if chain is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Username input on the login form
    #[must_use]
    pub fn username_input() -> Self {
        Self::new(vec![
            Selector::css("input[name=username]"),
            Selector::css("input[type=text]"),
            Selector::css("#username"),
            Selector::css("input[type=email]"),
        ])
    }

    /// Password input on the login form
    #[must_use]
    pub fn password_input() -> Self {
        Self::new(vec![
            Selector::css("input[name=password]"),
            Selector::css("input[type=password]"),
            Selector::css("#password"),
        ])
    }

    /// Login submit control
    #[must_use]
    pub fn login_submit() -> Self {
        Self::new(vec![
            Selector::css("button[type=submit]"),
            Selector::text("button", "Login"),
            Selector::text("button", "Sign in"),
            Selector::css("form button"),
        ])
    }

    /// Tab-like navigation elements
    #[must_use]
    pub fn tabs() -> Self {
        Self::new(vec![Selector::role("tab"), Selector::css(".tab")])
    }

    /// Logout control
    #[must_use]
    pub fn logout() -> Self {
        Self::new(vec![
            Selector::css("[data-action=logout]"),
            Selector::text("button", "Logout"),
            Selector::text("button", "Log out"),
            Selector::css(".logout"),
        ])
    }
}

impl fmt::Display for SelectorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.selectors.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(" | "))
    }
}

impl From<Selector> for SelectorChain {
    fn from(selector: Selector) -> Self {
        Self::new(vec![selector])
    }
}

impl<'a> IntoIterator for &'a SelectorChain {
    type Item = &'a Selector;
    type IntoIter = std::slice::Iter<'a, Selector>;

    fn into_iter(self) -> Self::IntoIter {
        self.selectors.iter()
    }
}

/// Encode a Rust string as a JavaScript string literal
#[must_use]
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

//! Live page capability.
//!
//! Extractors, pagination and navigation only ever see a [`PageHandle`]. The
//! production implementation drives a Chrome tab; tests use a scripted page.
//! Elements are never held across calls: every query returns owned
//! [`Node`] snapshots, and follow-up actions address elements by locator and
//! index, so a re-rendered list degrades to "not found" instead of a dangling
//! handle.

pub mod chrome;
pub mod navigation;
pub mod session;

pub use navigation::{navigate_with_retry, NavigationError, RetryPolicy};
pub use session::{ChromeSessions, SessionError, SessionFactory};

use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::pacing::Pacer;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("element is no longer attached: {0}")]
    Stale(String),

    #[error("browser connection lost: {0}")]
    Disconnected(String),
}

impl DriverError {
    /// Errors that mean the page or session itself is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::Navigation(_) | DriverError::Timeout(_) | DriverError::Disconnected(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    XPath(String),
}

/// Element address: a selector, optionally evaluated inside the n-th match of a parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub selector: Selector,
    pub scope: Option<(Box<Locator>, usize)>,
}

impl Locator {
    pub fn css(expr: impl Into<String>) -> Self {
        Self {
            selector: Selector::Css(expr.into()),
            scope: None,
        }
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self {
            selector: Selector::XPath(expr.into()),
            scope: None,
        }
    }

    /// Scope this locator to the `index`-th element matched by `parent`.
    /// Scoped XPath expressions should be relative (start with `.`).
    pub fn within(mut self, parent: &Locator, index: usize) -> Self {
        self.scope = Some((Box::new(parent.clone()), index));
        self
    }

    /// Stable textual form, used as a lookup key by scripted pages and in logs.
    pub fn key(&self) -> String {
        let own = match &self.selector {
            Selector::Css(e) => format!("css:{}", e),
            Selector::XPath(e) => format!("xpath:{}", e),
        };
        match &self.scope {
            Some((parent, index)) => format!("{}[{}] >> {}", parent.key(), index, own),
            None => own,
        }
    }

    /// Shape consumed by the in-page resolver script.
    pub fn to_json(&self) -> Value {
        let (kind, expr) = match &self.selector {
            Selector::Css(e) => ("css", e),
            Selector::XPath(e) => ("xpath", e),
        };
        match &self.scope {
            Some((parent, index)) => json!({
                "kind": kind,
                "expr": expr,
                "scope": { "locator": parent.to_json(), "index": index },
            }),
            None => json!({ "kind": kind, "expr": expr }),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Owned snapshot of one matched element.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct Node {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attrs: HashMap<String, String>,
}

impl Node {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attrs: HashMap::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Trimmed attribute value, empty when absent.
    pub fn get(&self, name: &str) -> &str {
        self.attrs.get(name).map(|v| v.trim()).unwrap_or("")
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Scroll position of a scrollable element, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_top: i64,
    pub scroll_height: i64,
    pub client_height: i64,
}

pub trait PageHandle {
    /// Start loading `url` and wait for the navigation to commit.
    fn navigate(&self, url: &str) -> Result<(), DriverError>;

    fn query(&self, locator: &Locator) -> Result<Vec<Node>, DriverError>;

    /// Click the `index`-th match. `Ok(false)` when there is no such element.
    fn click(&self, locator: &Locator, index: usize) -> Result<bool, DriverError>;

    fn scroll_into_view(&self, locator: &Locator, index: usize) -> Result<bool, DriverError>;

    /// Scroll an element's content by `delta` pixels.
    fn scroll_by(&self, locator: &Locator, index: usize, delta: i64) -> Result<bool, DriverError>;

    fn scroll_metrics(&self, locator: &Locator, index: usize) -> Result<Option<ScrollMetrics>, DriverError>;

    fn press_key(&self, key: &str) -> Result<(), DriverError>;

    fn current_url(&self) -> Result<String, DriverError>;

    fn page_source(&self) -> Result<String, DriverError>;

    fn count(&self, locator: &Locator) -> Result<usize, DriverError> {
        self.query(locator).map(|nodes| nodes.len())
    }

    fn exists(&self, locator: &Locator) -> Result<bool, DriverError> {
        self.count(locator).map(|n| n > 0)
    }
}

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Poll until any locator matches or the deadline passes. Returns the index
/// of the first matching locator. Query errors count as "not yet".
pub fn wait_for_any(
    page: &dyn PageHandle,
    pacer: &mut Pacer,
    locators: &[Locator],
    timeout: Duration,
) -> Option<usize> {
    let deadline = pacer.deadline_after(timeout);
    loop {
        for (i, locator) in locators.iter().enumerate() {
            if let Ok(true) = page.exists(locator) {
                return Some(i);
            }
        }
        if pacer.expired(deadline) {
            return None;
        }
        pacer.pause(WAIT_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ManualClock, ScriptedPage};

    #[test]
    fn test_locator_key_includes_scope() {
        let card = Locator::css("div.Nv2PK");
        let title = Locator::css(".qBF1Pd").within(&card, 2);
        assert_eq!(title.key(), "css:div.Nv2PK[2] >> css:.qBF1Pd");
        assert_eq!(Locator::xpath("//h1").key(), "xpath://h1");
    }

    #[test]
    fn test_locator_json_shape() {
        let card = Locator::css("div.Nv2PK");
        let row = Locator::xpath(".//span").within(&card, 0);
        let v = row.to_json();
        assert_eq!(v["kind"], "xpath");
        assert_eq!(v["scope"]["index"], 0);
        assert_eq!(v["scope"]["locator"]["expr"], "div.Nv2PK");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DriverError::Timeout("x".into()).is_fatal());
        assert!(DriverError::Disconnected("x".into()).is_fatal());
        assert!(!DriverError::Stale("x".into()).is_fatal());
        assert!(!DriverError::Script("x".into()).is_fatal());
    }

    #[test]
    fn test_wait_for_any_times_out_on_wall_clock() {
        let page = ScriptedPage::new();
        let clock = ManualClock::new();
        let mut pacer = Pacer::seeded(Box::new(clock.clone()), 1);
        let found = wait_for_any(&page, &mut pacer, &[Locator::css("h1")], Duration::from_secs(3));
        assert_eq!(found, None);
        assert!(clock.elapsed() >= Duration::from_secs(3));
        assert!(clock.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_wait_for_any_reports_first_match() {
        let page = ScriptedPage::new();
        page.set_nodes(&Locator::css("img"), vec![Node::default()]);
        let mut pacer = Pacer::seeded(Box::new(ManualClock::new()), 1);
        let found = wait_for_any(
            &page,
            &mut pacer,
            &[Locator::css("h1"), Locator::css("img")],
            Duration::from_secs(3),
        );
        assert_eq!(found, Some(1));
    }
}

//! [`PageHandle`] over a headless_chrome tab.
//!
//! All DOM work is done by small scripts evaluated in the page. Each script
//! resolves its locator from scratch and returns a JSON string, so nothing on
//! the Rust side refers to a live DOM node.

use headless_chrome::{Browser, Tab};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{DriverError, Locator, Node, PageHandle, ScrollMetrics};

const RESOLVER: &str = r#"
function __mhResolve(spec) {
  let root = document;
  if (spec.scope) {
    const parents = __mhResolve(spec.scope.locator);
    root = parents[spec.scope.index];
    if (!root) return [];
  }
  if (spec.kind === 'css') return Array.from(root.querySelectorAll(spec.expr));
  const res = document.evaluate(spec.expr, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
  const out = [];
  for (let i = 0; i < res.snapshotLength; i++) out.push(res.snapshotItem(i));
  return out;
}
function __mhScrollTarget(el) {
  if (el === document.body || el === document.documentElement) return document.scrollingElement || el;
  return el;
}
"#;

const SNAPSHOT: &str = r#"
return JSON.stringify(els.map(el => {
  const attrs = {};
  if (el.attributes) for (const a of el.attributes) attrs[a.name] = a.value;
  if (typeof el.href === 'string' && el.href) attrs.href = el.href;
  if (typeof el.src === 'string' && el.src) attrs.src = el.currentSrc || el.src;
  const text = (typeof el.innerText === 'string' ? el.innerText : el.textContent) || '';
  return { text, attrs };
}));
"#;

/// Live Chrome tab. Dropping it tears down the browser process.
pub struct ChromePage {
    tab: Arc<Tab>,
    page_load_timeout: Duration,
    script_timeout: Duration,
    // held so the Chrome process lives as long as the page
    _browser: Browser,
}

impl ChromePage {
    pub fn new(browser: Browser, tab: Arc<Tab>, page_load_timeout: Duration, script_timeout: Duration) -> Self {
        tab.set_default_timeout(script_timeout);
        Self {
            tab,
            page_load_timeout,
            script_timeout,
            _browser: browser,
        }
    }

    fn script(locator: &Locator, index: Option<usize>, body: &str) -> String {
        let index = index.map(|i| i.to_string()).unwrap_or_else(|| "null".to_string());
        format!(
            "(function() {{ {} const els = __mhResolve({}); const idx = {}; {} }})()",
            RESOLVER,
            locator.to_json(),
            index,
            body
        )
    }

    fn eval_json<T: DeserializeOwned>(&self, expression: &str) -> Result<T, DriverError> {
        let remote = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| classify(&e.to_string()))?;
        let raw = match remote.value {
            Some(serde_json::Value::String(s)) => s,
            other => {
                return Err(DriverError::Script(format!(
                    "expected JSON string result, got {:?}",
                    other
                )))
            }
        };
        serde_json::from_str(&raw).map_err(|e| DriverError::Script(e.to_string()))
    }

    fn element_action(&self, locator: &Locator, index: usize, action: &str) -> Result<bool, DriverError> {
        let body = format!(
            "const el = els[idx]; if (!el) return JSON.stringify(false); {} return JSON.stringify(true);",
            action
        );
        self.eval_json(&Self::script(locator, Some(index), &body))
    }
}

/// Map a headless_chrome failure message onto the driver taxonomy.
fn classify(message: &str) -> DriverError {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        DriverError::Timeout(message.to_string())
    } else if lower.contains("connection")
        || lower.contains("disconnected")
        || lower.contains("closed")
        || lower.contains("channel")
    {
        DriverError::Disconnected(message.to_string())
    } else if lower.contains("navigat") || lower.contains("net::err") {
        DriverError::Navigation(message.to_string())
    } else if lower.contains("node") && lower.contains("not") {
        DriverError::Stale(message.to_string())
    } else {
        DriverError::Script(message.to_string())
    }
}

impl PageHandle for ChromePage {
    fn navigate(&self, url: &str) -> Result<(), DriverError> {
        debug!("navigate {}", url);
        self.tab.set_default_timeout(self.page_load_timeout);
        let result = self
            .tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| classify(&format!("navigation to {}: {}", url, e)));
        self.tab.set_default_timeout(self.script_timeout);
        result
    }

    fn query(&self, locator: &Locator) -> Result<Vec<Node>, DriverError> {
        self.eval_json(&Self::script(locator, None, SNAPSHOT))
    }

    fn click(&self, locator: &Locator, index: usize) -> Result<bool, DriverError> {
        self.element_action(locator, index, "el.click();")
    }

    fn scroll_into_view(&self, locator: &Locator, index: usize) -> Result<bool, DriverError> {
        self.element_action(locator, index, "el.scrollIntoView({block: 'center'});")
    }

    fn scroll_by(&self, locator: &Locator, index: usize, delta: i64) -> Result<bool, DriverError> {
        let action = format!(
            "const t = __mhScrollTarget(el); t.scrollTop = t.scrollTop + ({});",
            delta
        );
        self.element_action(locator, index, &action)
    }

    fn scroll_metrics(&self, locator: &Locator, index: usize) -> Result<Option<ScrollMetrics>, DriverError> {
        let body = "const el = els[idx]; if (!el) return JSON.stringify(null); \
                    const t = __mhScrollTarget(el); \
                    return JSON.stringify({scrollTop: Math.round(t.scrollTop), \
                    scrollHeight: Math.round(t.scrollHeight), clientHeight: Math.round(t.clientHeight)});";
        self.eval_json(&Self::script(locator, Some(index), body))
    }

    fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.tab
            .press_key(key)
            .map(|_| ())
            .map_err(|e| classify(&e.to_string()))
    }

    fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.tab.get_url())
    }

    fn page_source(&self) -> Result<String, DriverError> {
        self.tab.get_content().map_err(|e| classify(&e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        assert!(matches!(classify("The event waited for never came (timeout)"), DriverError::Timeout(_)));
        assert!(matches!(classify("Unable to make method calls because underlying connection is closed"), DriverError::Disconnected(_)));
        assert!(matches!(classify("Navigate failed: net::ERR_NAME_NOT_RESOLVED"), DriverError::Navigation(_)));
        assert!(matches!(classify("Could not find node with given id"), DriverError::Stale(_)));
        assert!(matches!(classify("SyntaxError: Unexpected token"), DriverError::Script(_)));
    }

    #[test]
    fn test_script_embeds_locator_and_index() {
        let script = ChromePage::script(&Locator::css("div.Nv2PK"), Some(3), "return 1;");
        assert!(script.contains(r#""expr":"div.Nv2PK""#));
        assert!(script.contains("const idx = 3;"));
        let all = ChromePage::script(&Locator::xpath("//h1"), None, "return 1;");
        assert!(all.contains("const idx = null;"));
    }
}

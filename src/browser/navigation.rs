//! Page loads with local retry.
//!
//! A load counts as successful only once one of the `ready` locators shows
//! up. Failed attempts reset the tab to `about:blank` and cool down before the
//! next try. Session recreation is not handled here; the caller decides that
//! after a [`NavigationError`] comes back.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::{wait_for_any, DriverError, Locator, PageHandle};
use crate::config::{BrowserConfig, HarvestConfig};
use crate::pacing::Pacer;

const BLANK_PAGE: &str = "about:blank";

#[derive(Error, Debug, Clone, PartialEq)]
#[error("navigation to {url} failed after {attempts} attempt(s): {source}")]
pub struct NavigationError {
    pub url: String,
    pub attempts: u32,
    /// Cause of the last attempt
    #[source]
    pub source: DriverError,
}

/// How many times to try a load and how long to wait between and during attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub tries: u32,
    pub cooldown: Duration,
    /// How long the ready locators get to appear after each load
    pub ready_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(harvest: &HarvestConfig, browser: &BrowserConfig) -> Self {
        Self {
            tries: harvest.navigation_tries.max(1),
            cooldown: Duration::from_millis(harvest.navigation_cooldown_ms),
            ready_timeout: browser.page_load_timeout(),
        }
    }
}

/// Load `url`, retrying per `policy` until one of `ready` is present.
pub fn navigate_with_retry(
    page: &dyn PageHandle,
    pacer: &mut Pacer,
    url: &str,
    policy: &RetryPolicy,
    ready: &[Locator],
) -> Result<(), NavigationError> {
    let tries = policy.tries.max(1);
    let mut last = DriverError::Navigation("no attempt made".to_string());

    for attempt in 1..=tries {
        match load_once(page, pacer, url, policy.ready_timeout, ready) {
            Ok(()) => {
                debug!("Loaded {} on attempt {}/{}", url, attempt, tries);
                return Ok(());
            }
            Err(e) => {
                warn!("Navigation attempt {}/{} failed: {}", attempt, tries, e);
                if let Err(blank_err) = page.navigate(BLANK_PAGE) {
                    debug!("Could not reset tab to {}: {}", BLANK_PAGE, blank_err);
                }
                pacer.pause(policy.cooldown);
                last = e;
            }
        }
    }

    Err(NavigationError {
        url: url.to_string(),
        attempts: tries,
        source: last,
    })
}

fn load_once(
    page: &dyn PageHandle,
    pacer: &mut Pacer,
    url: &str,
    timeout: Duration,
    ready: &[Locator],
) -> Result<(), DriverError> {
    page.navigate(url)?;
    if ready.is_empty() || wait_for_any(page, pacer, ready, timeout).is_some() {
        Ok(())
    } else {
        Err(DriverError::Timeout(format!(
            "no result card within {}s",
            timeout.as_secs()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Node;
    use crate::test_utils::{ManualClock, ScriptedPage};

    const URL: &str = "https://www.google.com/maps/search/cafe+in+Cairo?hl=en&gl=eg";

    fn policy() -> RetryPolicy {
        RetryPolicy {
            tries: 2,
            cooldown: Duration::from_millis(2500),
            ready_timeout: Duration::from_secs(30),
        }
    }

    fn cards() -> Vec<Locator> {
        vec![Locator::css("div.Nv2PK")]
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let page = ScriptedPage::new();
        page.set_nodes(&cards()[0], vec![Node::default()]);
        let mut pacer = Pacer::seeded(Box::new(ManualClock::new()), 1);
        navigate_with_retry(&page, &mut pacer, URL, &policy(), &cards()).unwrap();
        assert_eq!(page.visited(), vec![URL.to_string()]);
    }

    #[test]
    fn test_transient_failure_is_retried_after_blank_and_cooldown() {
        let page = ScriptedPage::new();
        page.set_nodes(&cards()[0], vec![Node::default()]);
        page.fail_next_navigations(vec![DriverError::Timeout("read timeout".into())]);
        let clock = ManualClock::new();
        let mut pacer = Pacer::seeded(Box::new(clock.clone()), 1);

        navigate_with_retry(&page, &mut pacer, URL, &policy(), &cards()).unwrap();
        assert_eq!(
            page.visited(),
            vec![URL.to_string(), BLANK_PAGE.to_string(), URL.to_string()]
        );
        assert!(clock.elapsed() >= Duration::from_millis(2500));
    }

    #[test]
    fn test_exhausted_retries_carry_last_cause() {
        let page = ScriptedPage::new();
        let clock = ManualClock::new();
        let mut pacer = Pacer::seeded(Box::new(clock.clone()), 1);

        let err = navigate_with_retry(&page, &mut pacer, URL, &policy(), &cards()).unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.url, URL);
        assert!(matches!(err.source, DriverError::Timeout(_)));
        assert_eq!(page.visited().len(), 4);
        assert!(clock.elapsed() >= Duration::from_secs(60));
    }

    #[test]
    fn test_policy_from_config() {
        let config = crate::config::AppConfig::embedded_default().unwrap();
        let policy = RetryPolicy::from_config(&config.harvest, &config.browser);
        assert_eq!(policy.tries, 2);
        assert_eq!(policy.cooldown, Duration::from_millis(2500));
        assert_eq!(policy.ready_timeout, Duration::from_secs(30));
    }
}

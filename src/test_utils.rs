//! In-memory page and clock for exercising harvesting logic without a browser.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser::{DriverError, Locator, Node, PageHandle, ScrollMetrics, SessionError, SessionFactory};
use crate::extract::card::{anchor_locator, card_locator};
use crate::extract::selectors::{CARD_INFO_ROW, DATA_CID, DETAIL_NAME};
use crate::pacing::Clock;

/// Virtual clock: `sleep` advances time instantly. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// What a scripted click changes on the page.
#[derive(Debug, Clone, Default)]
pub struct ClickEffect {
    pub url: Option<String>,
    pub reveal: Vec<(Locator, Vec<Node>)>,
}

#[derive(Default)]
struct ScriptState {
    url: String,
    source: String,
    nodes: HashMap<String, VecDeque<Vec<Node>>>,
    metrics: HashMap<String, VecDeque<ScrollMetrics>>,
    query_errors: HashMap<String, DriverError>,
    click_effects: HashMap<(String, usize), ClickEffect>,
    navigation_failures: VecDeque<DriverError>,
    visited: Vec<String>,
    clicks: Vec<(String, usize)>,
    scrolls: Vec<(String, i64)>,
    keys: Vec<String>,
}

/// A [`PageHandle`] whose DOM is a table of locator keys to node lists.
///
/// A locator may be given a sequence of node lists; each query consumes one
/// stage and the last stage repeats forever. Scroll metrics work the same way.
/// Clones share the same DOM, so a test can keep a handle to a page it hands
/// to a [`ScriptedSessions`].
#[derive(Default, Clone)]
pub struct ScriptedPage {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&self, url: &str) {
        self.state.borrow_mut().url = url.to_string();
    }

    pub fn set_source(&self, source: &str) {
        self.state.borrow_mut().source = source.to_string();
    }

    pub fn set_nodes(&self, locator: &Locator, nodes: Vec<Node>) {
        self.set_sequence(locator, vec![nodes]);
    }

    pub fn set_sequence(&self, locator: &Locator, stages: Vec<Vec<Node>>) {
        self.state
            .borrow_mut()
            .nodes
            .insert(locator.key(), stages.into_iter().collect());
    }

    pub fn set_metrics(&self, locator: &Locator, stages: Vec<ScrollMetrics>) {
        self.state
            .borrow_mut()
            .metrics
            .insert(locator.key(), stages.into_iter().collect());
    }

    pub fn fail_query(&self, locator: &Locator, error: DriverError) {
        self.state.borrow_mut().query_errors.insert(locator.key(), error);
    }

    pub fn fail_next_navigations(&self, errors: Vec<DriverError>) {
        self.state.borrow_mut().navigation_failures.extend(errors);
    }

    pub fn on_click(&self, locator: &Locator, index: usize, effect: ClickEffect) {
        self.state
            .borrow_mut()
            .click_effects
            .insert((locator.key(), index), effect);
    }

    /// Lay out a results list with one card per listing. Clicking a card's
    /// anchor opens that listing's detail pane.
    pub fn set_listings(&self, listings: &[ScriptedListing]) {
        let card = card_locator();
        self.set_nodes(&card, listings.iter().map(|_| Node::default()).collect());
        for (index, listing) in listings.iter().enumerate() {
            let anchor = anchor_locator(index);
            self.set_nodes(
                &anchor,
                vec![Node::default()
                    .attr("aria-label", listing.name.as_str())
                    .attr("href", listing.detail_url.as_str())],
            );
            self.set_nodes(
                &Locator::css(CARD_INFO_ROW).within(&card, index),
                listing.rows.iter().map(|r| Node::with_text(r.as_str())).collect(),
            );
            let cid_nodes = listing
                .cid
                .iter()
                .map(|id| Node::default().attr("data-cid", id.as_str()))
                .collect();
            self.on_click(
                &anchor,
                0,
                ClickEffect {
                    url: Some(listing.detail_url.clone()),
                    reveal: vec![
                        (Locator::xpath(DETAIL_NAME), vec![Node::with_text(listing.detail_name.as_str())]),
                        (Locator::css(DATA_CID[2]), cid_nodes),
                    ],
                },
            );
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.borrow().visited.clone()
    }

    pub fn clicks(&self) -> Vec<(String, usize)> {
        self.state.borrow().clicks.clone()
    }

    pub fn scrolls(&self) -> Vec<(String, i64)> {
        self.state.borrow().scrolls.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.borrow().keys.clone()
    }

    fn current_nodes(&self, key: &str) -> Vec<Node> {
        let mut state = self.state.borrow_mut();
        match state.nodes.get_mut(key) {
            Some(stages) if stages.len() > 1 => stages.pop_front().unwrap_or_default(),
            Some(stages) => stages.front().cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn peek_count(&self, key: &str) -> usize {
        self.state
            .borrow()
            .nodes
            .get(key)
            .and_then(|stages| stages.front())
            .map(|nodes| nodes.len())
            .unwrap_or(0)
    }
}

/// A results card and the detail pane behind it.
#[derive(Debug, Clone, Default)]
pub struct ScriptedListing {
    pub name: String,
    pub detail_name: String,
    pub detail_url: String,
    pub rows: Vec<String>,
    pub cid: Option<String>,
}

impl ScriptedListing {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            detail_name: name.to_string(),
            detail_url: format!(
                "https://www.google.com/maps/place/{}/@30.0444,31.2357,17z/data=!3m1!4b1",
                name.replace(' ', "+")
            ),
            rows: Vec::new(),
            cid: None,
        }
    }

    pub fn with_cid(mut self, cid: &str) -> Self {
        self.cid = Some(cid.to_string());
        self
    }

    pub fn with_rows(mut self, rows: &[&str]) -> Self {
        self.rows = rows.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Heading shown in the detail pane when it differs from the card.
    pub fn with_detail_name(mut self, name: &str) -> Self {
        self.detail_name = name.to_string();
        self
    }
}

/// Open/close counts of a [`ScriptedSessions`], readable after the factory moved.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub opened: Cell<usize>,
    pub closed: Cell<usize>,
}

/// Hands out pre-scripted pages in order; fails to launch once they run out.
pub struct ScriptedSessions {
    pages: VecDeque<ScriptedPage>,
    log: Rc<SessionLog>,
}

impl ScriptedSessions {
    pub fn new(pages: Vec<ScriptedPage>) -> Self {
        Self {
            pages: pages.into(),
            log: Rc::new(SessionLog::default()),
        }
    }

    pub fn log(&self) -> Rc<SessionLog> {
        Rc::clone(&self.log)
    }
}

impl SessionFactory for ScriptedSessions {
    type Page = ScriptedPage;

    fn open(&mut self) -> Result<ScriptedPage, SessionError> {
        let page = self
            .pages
            .pop_front()
            .ok_or_else(|| SessionError::Launch("no scripted session left".to_string()))?;
        self.log.opened.set(self.log.opened.get() + 1);
        Ok(page)
    }

    fn close(&mut self, page: ScriptedPage) {
        self.log.closed.set(self.log.closed.get() + 1);
        drop(page);
    }
}

impl PageHandle for ScriptedPage {
    fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.visited.push(url.to_string());
        if let Some(err) = state.navigation_failures.pop_front() {
            return Err(err);
        }
        state.url = url.to_string();
        Ok(())
    }

    fn query(&self, locator: &Locator) -> Result<Vec<Node>, DriverError> {
        let key = locator.key();
        if let Some(err) = self.state.borrow().query_errors.get(&key) {
            return Err(err.clone());
        }
        Ok(self.current_nodes(&key))
    }

    fn click(&self, locator: &Locator, index: usize) -> Result<bool, DriverError> {
        let key = locator.key();
        if index >= self.peek_count(&key) {
            return Ok(false);
        }
        let effect = {
            let mut state = self.state.borrow_mut();
            state.clicks.push((key.clone(), index));
            state.click_effects.get(&(key, index)).cloned()
        };
        if let Some(effect) = effect {
            if let Some(url) = effect.url {
                self.set_url(&url);
            }
            for (target, nodes) in effect.reveal {
                self.set_nodes(&target, nodes);
            }
        }
        Ok(true)
    }

    fn scroll_into_view(&self, locator: &Locator, index: usize) -> Result<bool, DriverError> {
        Ok(index < self.peek_count(&locator.key()))
    }

    fn scroll_by(&self, locator: &Locator, index: usize, delta: i64) -> Result<bool, DriverError> {
        let key = locator.key();
        if index >= self.peek_count(&key) {
            return Ok(false);
        }
        self.state.borrow_mut().scrolls.push((key, delta));
        Ok(true)
    }

    fn scroll_metrics(&self, locator: &Locator, _index: usize) -> Result<Option<ScrollMetrics>, DriverError> {
        let mut state = self.state.borrow_mut();
        Ok(match state.metrics.get_mut(&locator.key()) {
            Some(stages) if stages.len() > 1 => stages.pop_front(),
            Some(stages) => stages.front().copied(),
            None => None,
        })
    }

    fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.state.borrow_mut().keys.push(key.to_string());
        Ok(())
    }

    fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.borrow().url.clone())
    }

    fn page_source(&self) -> Result<String, DriverError> {
        Ok(self.state.borrow().source.clone())
    }
}

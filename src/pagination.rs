//! Infinite-scroll pagination over the results list.
//!
//! The list loads asynchronously in small batches, so the controller scrolls
//! in randomized bursts and then polls for one of four signals within a
//! wall-clock window:
//!
//! - the card count grew (growth)
//! - the container's scroll height grew past a small slack (growth)
//! - the scroll position reached the container bottom (end)
//! - an explicit "end of results" marker appeared (end)
//!
//! Consecutive rounds without growth count as stalls. The controller stops on
//! any end signal, after `stall_rounds` stalls, or at the `max_rounds` ceiling.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{wait_for_any, Locator, PageHandle, ScrollMetrics};
use crate::config::PaginationConfig;
use crate::extract::selectors::{CARD_CONTAINER, END_OF_LIST, MORE_PLACES, RESULTS_FEED, RESULTS_PANE, ZOOM_OUT};
use crate::pacing::Pacer;

const FEED_WAIT: Duration = Duration::from_secs(10);
const CHIP_WAIT: Duration = Duration::from_millis(2500);

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndMarker,
    BottomReached,
    Stalled,
    RoundCeiling,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::EndMarker => "end-of-list marker",
            StopReason::BottomReached => "reached bottom",
            StopReason::Stalled => "no growth",
            StopReason::RoundCeiling => "round ceiling",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaginationState {
    Settling,
    Scrolling { stalls: u32 },
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundOutcome {
    Growth,
    End(StopReason),
    Quiet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationReport {
    pub rounds: u32,
    pub stop: StopReason,
    /// Cards visible once scrolling stopped
    pub cards: usize,
}

/// Click the map's zoom-out control once, if it is there.
pub fn zoom_out_once(page: &dyn PageHandle, pacer: &mut Pacer) -> bool {
    let button = Locator::xpath(ZOOM_OUT);
    match page.scroll_into_view(&button, 0) {
        Ok(true) => {}
        _ => return false,
    }
    pacer.jitter(0.1, 0.3);
    let clicked = page.click(&button, 0).unwrap_or(false);
    if clicked {
        pacer.jitter(0.3, 0.6);
    }
    clicked
}

/// Click a "More places" / "View all" entry chip if one shows up.
pub fn click_more_places(page: &dyn PageHandle, pacer: &mut Pacer) -> bool {
    for xpath in MORE_PLACES {
        let chip = Locator::xpath(xpath);
        if wait_for_any(page, pacer, std::slice::from_ref(&chip), CHIP_WAIT).is_none() {
            continue;
        }
        let label = page
            .query(&chip)
            .ok()
            .and_then(|nodes| nodes.first().map(|n| n.trimmed_text().to_string()))
            .unwrap_or_default();
        if !page.scroll_into_view(&chip, 0).unwrap_or(false) {
            continue;
        }
        pacer.jitter(0.2, 0.5);
        if page.click(&chip, 0).unwrap_or(false) {
            info!("Clicking entry chip: {}", label);
            pacer.jitter(0.8, 1.2);
            return true;
        }
    }
    false
}

/// Scroll container for the results list; `body` when none renders in time.
pub fn locate_feed(page: &dyn PageHandle, pacer: &mut Pacer) -> Locator {
    let mut candidates: Vec<Locator> = RESULTS_FEED.iter().map(|xp| Locator::xpath(*xp)).collect();
    candidates.push(Locator::css(RESULTS_PANE));
    match wait_for_any(page, pacer, &candidates, FEED_WAIT) {
        Some(i) => candidates.swap_remove(i),
        None => {
            warn!("Results feed not found; falling back to body scroll.");
            Locator::css("body")
        }
    }
}

pub struct PaginationController<'a> {
    page: &'a dyn PageHandle,
    config: &'a PaginationConfig,
    cards: Locator,
    feed: Locator,
}

impl<'a> PaginationController<'a> {
    pub fn new(page: &'a dyn PageHandle, config: &'a PaginationConfig) -> Self {
        Self {
            page,
            config,
            cards: Locator::css(CARD_CONTAINER),
            feed: Locator::css("body"),
        }
    }

    /// Scroll until the list stops growing. `known` is the ledger's unique
    /// count, logged alongside each round.
    pub fn run(&mut self, pacer: &mut Pacer, known: usize) -> PaginationReport {
        let mut state = PaginationState::Settling;
        let mut rounds = 0u32;

        loop {
            state = match state {
                PaginationState::Settling => {
                    click_more_places(self.page, pacer);
                    self.feed = locate_feed(self.page, pacer);
                    if self.page.scroll_into_view(&self.feed, 0).unwrap_or(false) {
                        pacer.jitter(0.15, 0.35);
                    }
                    PaginationState::Scrolling { stalls: 0 }
                }
                PaginationState::Scrolling { stalls } => {
                    if rounds >= self.config.max_rounds {
                        PaginationState::Stopped(StopReason::RoundCeiling)
                    } else {
                        rounds += 1;
                        match self.round(pacer, rounds, known) {
                            RoundOutcome::Growth => PaginationState::Scrolling { stalls: 0 },
                            RoundOutcome::End(reason) => PaginationState::Stopped(reason),
                            RoundOutcome::Quiet if stalls + 1 >= self.config.stall_rounds => {
                                PaginationState::Stopped(StopReason::Stalled)
                            }
                            RoundOutcome::Quiet => PaginationState::Scrolling { stalls: stalls + 1 },
                        }
                    }
                }
                PaginationState::Stopped(stop) => {
                    info!("Stopping scroll after {} round(s): {}", rounds, stop);
                    return PaginationReport {
                        rounds,
                        stop,
                        cards: self.card_count(),
                    };
                }
            };
        }
    }

    fn card_count(&self) -> usize {
        self.page.count(&self.cards).unwrap_or(0)
    }

    fn metrics(&self) -> Option<ScrollMetrics> {
        self.page.scroll_metrics(&self.feed, 0).ok().flatten()
    }

    fn round(&self, pacer: &mut Pacer, round: u32, known: usize) -> RoundOutcome {
        let count = self.card_count();
        info!("[scroll {:02}] visible_cards={} | uniques_so_far={}", round, count, known);
        let before = self.metrics();

        let steps = pacer.int_between(
            i64::from(self.config.scroll_steps_min),
            i64::from(self.config.scroll_steps_max),
        );
        for _ in 0..steps {
            let delta = pacer.int_between(self.config.scroll_delta_min, self.config.scroll_delta_max);
            if !self.page.scroll_by(&self.feed, 0, delta).unwrap_or(false) {
                let _ = self.page.press_key("PageDown");
            }
            pacer.jitter(0.25, 0.7);
        }

        self.poll(pacer, count, before)
    }

    fn poll(&self, pacer: &mut Pacer, count: usize, before: Option<ScrollMetrics>) -> RoundOutcome {
        let window = pacer.uniform(self.config.poll_window_min_secs, self.config.poll_window_max_secs);
        let deadline = pacer.deadline_after(Duration::from_secs_f64(window));
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let end_marker = Locator::xpath(END_OF_LIST);

        while !pacer.expired(deadline) {
            if self.card_count() > count {
                return RoundOutcome::Growth;
            }
            if let Some(now) = self.metrics() {
                if let Some(prev) = before {
                    if now.scroll_height > prev.scroll_height + self.config.growth_slack_px {
                        return RoundOutcome::Growth;
                    }
                }
                if now.scroll_top + now.client_height >= now.scroll_height - self.config.bottom_slack_px {
                    return RoundOutcome::End(StopReason::BottomReached);
                }
            }
            if self.page.exists(&end_marker).unwrap_or(false) {
                return RoundOutcome::End(StopReason::EndMarker);
            }
            pacer.pause(interval);
        }
        debug!("No growth within {:.1}s", window);
        RoundOutcome::Quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Node;
    use crate::test_utils::{ManualClock, ScriptedPage};

    fn feed() -> Locator {
        Locator::xpath(RESULTS_FEED[0])
    }

    fn page_with_feed(cards: usize) -> ScriptedPage {
        let page = ScriptedPage::new();
        page.set_nodes(&feed(), vec![Node::default()]);
        page.set_nodes(&Locator::css(CARD_CONTAINER), vec![Node::default(); cards]);
        page
    }

    fn metrics(top: i64, height: i64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: top,
            scroll_height: height,
            client_height: 600,
        }
    }

    #[test]
    fn test_stops_at_round_ceiling_when_list_keeps_growing() {
        let page = page_with_feed(20);
        let growing: Vec<ScrollMetrics> = (0..400).map(|i| metrics(0, 2_000 + 100 * i)).collect();
        page.set_metrics(&feed(), growing);

        let clock = ManualClock::new();
        let mut pacer = Pacer::seeded(Box::new(clock.clone()), 3);
        let config = PaginationConfig::default();
        let report = PaginationController::new(&page, &config).run(&mut pacer, 0);

        assert_eq!(report.stop, StopReason::RoundCeiling);
        assert_eq!(report.rounds, config.max_rounds);
        assert_eq!(report.cards, 20);
    }

    #[test]
    fn test_stalls_terminate_when_no_signal_fires() {
        let page = page_with_feed(12);
        let clock = ManualClock::new();
        let mut pacer = Pacer::seeded(Box::new(clock.clone()), 3);
        let config = PaginationConfig::default();
        let report = PaginationController::new(&page, &config).run(&mut pacer, 7);

        assert_eq!(report.stop, StopReason::Stalled);
        assert_eq!(report.rounds, config.stall_rounds);
        let min_wait = Duration::from_secs_f64(config.poll_window_min_secs * f64::from(config.stall_rounds));
        assert!(clock.elapsed() >= min_wait);
        assert!(!page.scrolls().is_empty());
        assert!(page.scrolls().iter().all(|(_, d)| (320..=800).contains(d)));
    }

    #[test]
    fn test_card_growth_resets_stall_counter() {
        let page = page_with_feed(0);
        page.set_sequence(
            &Locator::css(CARD_CONTAINER),
            vec![vec![Node::default(); 5], vec![Node::default(); 8]],
        );
        let mut pacer = Pacer::seeded(Box::new(ManualClock::new()), 3);
        let config = PaginationConfig::default();
        let report = PaginationController::new(&page, &config).run(&mut pacer, 0);

        assert_eq!(report.stop, StopReason::Stalled);
        assert_eq!(report.rounds, 1 + config.stall_rounds);
        assert_eq!(report.cards, 8);
    }

    #[test]
    fn test_end_marker_stops_immediately() {
        let page = page_with_feed(3);
        page.set_nodes(&Locator::xpath(END_OF_LIST), vec![Node::with_text("You've reached the end of the list.")]);
        let mut pacer = Pacer::seeded(Box::new(ManualClock::new()), 3);
        let config = PaginationConfig::default();
        let report = PaginationController::new(&page, &config).run(&mut pacer, 0);
        assert_eq!(report.stop, StopReason::EndMarker);
        assert_eq!(report.rounds, 1);
    }

    #[test]
    fn test_bottom_hint_stops() {
        let page = page_with_feed(3);
        page.set_metrics(&feed(), vec![metrics(1_398, 2_000)]);
        let mut pacer = Pacer::seeded(Box::new(ManualClock::new()), 3);
        let config = PaginationConfig::default();
        let report = PaginationController::new(&page, &config).run(&mut pacer, 0);
        assert_eq!(report.stop, StopReason::BottomReached);
    }

    #[test]
    fn test_missing_feed_falls_back_to_body_and_page_down() {
        let page = ScriptedPage::new();
        let clock = ManualClock::new();
        let mut pacer = Pacer::seeded(Box::new(clock.clone()), 3);
        let config = PaginationConfig::default();
        let report = PaginationController::new(&page, &config).run(&mut pacer, 0);
        assert_eq!(report.stop, StopReason::Stalled);
        assert!(page.keys().iter().all(|k| k == "PageDown"));
        assert!(!page.keys().is_empty());
    }

    #[test]
    fn test_more_places_chip_clicked_once() {
        let page = ScriptedPage::new();
        let chip = Locator::xpath(MORE_PLACES[1]);
        page.set_nodes(&chip, vec![Node::with_text("More places")]);
        let mut pacer = Pacer::seeded(Box::new(ManualClock::new()), 3);
        assert!(click_more_places(&page, &mut pacer));
        assert_eq!(page.clicks(), vec![(chip.key(), 0)]);
    }

    #[test]
    fn test_zoom_out_absent_is_noop() {
        let page = ScriptedPage::new();
        let clock = ManualClock::new();
        let mut pacer = Pacer::seeded(Box::new(clock.clone()), 3);
        assert!(!zoom_out_once(&page, &mut pacer));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}

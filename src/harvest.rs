//! Harvest orchestration.
//!
//! One [`Harvester`] drives one browser session through the category list in
//! order. Each category is navigated, paginated and walked card by card;
//! every card is extracted, checked against the [`DedupLedger`], flagged when
//! its name disagrees with its profile slug, and appended to the
//! [`ResultSink`]. A navigation or session failure recycles the session and
//! retries the category once; a second failure skips the category. Card
//! failures only ever skip the card.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::{
    navigate_with_retry, DriverError, NavigationError, PageHandle, RetryPolicy, SessionError,
    SessionFactory,
};
use crate::config::AppConfig;
use crate::dedup::DedupLedger;
use crate::extract::card::card_locator;
use crate::extract::{
    canonical_profile, extract_card, extract_detail, open_card_detail, scroll_photos_into_view, CardFields,
    DetailFields, ExtractContext, ProfileRef,
};
use crate::logger::{HarvestLogger, VerbosityLevel};
use crate::pacing::Pacer;
use crate::pagination::{zoom_out_once, PaginationController, StopReason};
use crate::place::{NameUrlFlag, Place};
use crate::result_sink::ResultSink;
use crate::text_normalizer::{compare_key, similarity, similarity_key};
use crate::url_utils::{build_search_url, canonicalize, extract_cid_from_url, slug_identity, slug_text};

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("output store unavailable: {0:#}")]
    Sink(anyhow::Error),
}

/// Why a single card was skipped.
#[derive(Error, Debug)]
pub enum CardFault {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("failed to persist row: {0:#}")]
    Sink(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardOutcome {
    Written,
    Duplicate,
}

/// Counts for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryReport {
    pub category: String,
    pub cards_found: usize,
    pub attempted: usize,
    pub written: usize,
    pub duplicates: usize,
    pub faults: usize,
    pub stop: Option<StopReason>,
}

impl CategoryReport {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            ..Self::default()
        }
    }
}

/// Counts for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub categories_attempted: usize,
    pub categories_failed: Vec<String>,
    pub cards_attempted: usize,
    pub written: usize,
    pub duplicates: usize,
    pub faults: usize,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn absorb(&mut self, report: &CategoryReport) {
        self.cards_attempted += report.attempted;
        self.written += report.written;
        self.duplicates += report.duplicates;
        self.faults += report.faults;
    }
}

/// Seed the ledger from an existing output file, then open it for appending.
pub fn prepare_output(path: &Path) -> Result<(ResultSink, DedupLedger), HarvestError> {
    let ledger = DedupLedger::seed_from_csv(path).map_err(HarvestError::Sink)?;
    let sink = ResultSink::open(path).map_err(HarvestError::Sink)?;
    Ok((sink, ledger))
}

/// Name/slug consistency. Only a non-empty name against a URL that carries
/// a place slug can be judged.
pub fn name_url_flag(name: &str, slug_url: &str, threshold: f64) -> NameUrlFlag {
    let name = name.trim();
    let slug = slug_text(slug_url);
    if name.is_empty() || slug.is_empty() {
        return NameUrlFlag::Consistent;
    }
    if similarity(&similarity_key(name), &slug_identity(slug_url)) >= threshold {
        return NameUrlFlag::Consistent;
    }
    let name_key = compare_key(name);
    if !name_key.is_empty() && compare_key(&slug).contains(&name_key) {
        return NameUrlFlag::Consistent;
    }
    NameUrlFlag::WeakMatch
}

pub struct Harvester<F: SessionFactory> {
    config: AppConfig,
    factory: F,
    page: Option<F::Page>,
    sink: ResultSink,
    ledger: DedupLedger,
    pacer: Pacer,
    logger: HarvestLogger,
    interrupt: Arc<AtomicBool>,
    location: String,
    summary: RunSummary,
}

impl<F: SessionFactory> Harvester<F> {
    pub fn new(config: AppConfig, factory: F, sink: ResultSink, ledger: DedupLedger, location: &str) -> Self {
        Self {
            config,
            factory,
            page: None,
            sink,
            ledger,
            pacer: Pacer::system(),
            logger: HarvestLogger::new(VerbosityLevel::Silent),
            interrupt: Arc::new(AtomicBool::new(false)),
            location: location.trim().to_string(),
            summary: RunSummary::default(),
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_logger(mut self, logger: HarvestLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Flag polled between cards and categories.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Counts so far, also valid after `run` failed.
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Harvest every category in order.
    ///
    /// Fails only when the very first session cannot be opened; everything
    /// after that is contained to a card or a category.
    pub fn run(&mut self, categories: &[String]) -> Result<RunSummary, HarvestError> {
        self.ensure_session()?;
        let total = categories.len();
        let restart_every = self.config.harvest.restart_every_categories;

        for (i, category) in categories.iter().enumerate() {
            let position = i + 1;
            if self.interrupted() {
                break;
            }
            self.logger.log_category_start(position, total, category);
            info!("=== Category {}/{}: {} | {} ===", position, total, category, self.location);
            self.summary.categories_attempted += 1;

            match self.harvest_with_retry(category) {
                Ok(report) => {
                    self.summary.absorb(&report);
                    self.logger.log_category_report(&report);
                }
                Err(e) => {
                    self.summary.categories_failed.push(category.clone());
                    self.logger.log_category_failed(category, &e.to_string());
                }
            }

            if self.interrupted() || position == total {
                break;
            }
            if restart_every > 0 && position % restart_every == 0 {
                info!("Recycling browser after {} categor(ies)", position);
                self.recycle();
            }
            self.pacer.jitter(1.4, 2.8);
        }

        self.summary.interrupted = self.interrupted();
        self.shutdown();
        info!("Done. Total rows written this run: {}", self.summary.written);
        Ok(self.summary.clone())
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    fn ensure_session(&mut self) -> Result<(), SessionError> {
        if self.page.is_none() {
            self.page = Some(self.factory.open()?);
        }
        Ok(())
    }

    fn recycle(&mut self) {
        if let Some(page) = self.page.take() {
            self.factory.close(page);
        }
    }

    fn shutdown(&mut self) {
        self.recycle();
        debug!("Browser session closed");
    }

    fn harvest_with_retry(&mut self, category: &str) -> Result<CategoryReport, HarvestError> {
        match self.harvest_category(category) {
            Ok(report) => Ok(report),
            Err(first) => {
                warn!("Category '{}' failed: {}", category, first);
                self.logger.log_category_retry(category, &first.to_string());
                self.recycle();
                let retried = self.harvest_category(category);
                if retried.is_err() {
                    // next category starts from a fresh browser
                    self.recycle();
                }
                retried
            }
        }
    }

    fn harvest_category(&mut self, category: &str) -> Result<CategoryReport, HarvestError> {
        self.ensure_session()?;
        let Harvester {
            config,
            page,
            sink,
            ledger,
            pacer,
            interrupt,
            location,
            ..
        } = self;
        let Some(page) = page.as_ref() else {
            return Err(SessionError::Tab("no open session".to_string()).into());
        };

        let mut run = CategoryRun {
            page,
            config,
            location: location.as_str(),
            sink,
            ledger,
            pacer,
            interrupt: interrupt.as_ref(),
            report: CategoryReport::new(category),
        };
        run.execute()?;
        Ok(run.report)
    }
}

/// Borrowed state for harvesting one category.
struct CategoryRun<'r> {
    page: &'r dyn PageHandle,
    config: &'r AppConfig,
    location: &'r str,
    sink: &'r mut ResultSink,
    ledger: &'r mut DedupLedger,
    pacer: &'r mut Pacer,
    interrupt: &'r AtomicBool,
    report: CategoryReport,
}

impl CategoryRun<'_> {
    fn execute(&mut self) -> Result<(), NavigationError> {
        let search = &self.config.search;
        let url = build_search_url(&search.base_url, &self.report.category, self.location, &search.hl, &search.gl);
        info!("Navigating: {}", url);

        let policy = RetryPolicy::from_config(&self.config.harvest, &self.config.browser);
        // An empty feed is a failed load, not an empty category.
        navigate_with_retry(self.page, self.pacer, &url, &policy, &[card_locator()])?;

        self.pacer.jitter(1.0, 1.6);
        zoom_out_once(self.page, self.pacer);
        let pagination =
            PaginationController::new(self.page, &self.config.pagination).run(self.pacer, self.ledger.count());
        self.report.stop = Some(pagination.stop);

        let cards = self.page.count(&card_locator()).unwrap_or(pagination.cards);
        self.report.cards_found = cards;
        info!("Found {} cards for '{}'", cards, self.report.category);

        let cap = self.config.harvest.max_places;
        for index in 0..cards {
            if self.report.written >= cap {
                info!("Reached {} places for '{}'", cap, self.report.category);
                break;
            }
            if self.interrupt.load(Ordering::SeqCst) {
                info!("Interrupted; stopping '{}' after {} card(s)", self.report.category, self.report.attempted);
                break;
            }
            self.report.attempted += 1;
            match self.process_card(index) {
                Ok(CardOutcome::Written) => self.report.written += 1,
                Ok(CardOutcome::Duplicate) => self.report.duplicates += 1,
                Err(CardFault::Driver(DriverError::Stale(msg))) => {
                    debug!("Card {} went stale: {}", index, msg);
                    self.report.faults += 1;
                }
                Err(e) => {
                    warn!("Card {} skipped: {}", index, e);
                    self.report.faults += 1;
                }
            }
            self.pacer.jitter(0.5, 1.2);
        }
        Ok(())
    }

    fn process_card(&mut self, index: usize) -> Result<CardOutcome, CardFault> {
        let card = extract_card(self.page, index)?;
        let wait = Duration::from_secs(self.config.harvest.detail_wait_secs);
        let opened = open_card_detail(self.page, self.pacer, index, wait)?;

        let detail = if opened {
            scroll_photos_into_view(self.page, self.pacer);
            self.pacer.jitter(0.6, 1.0);
            let mut ctx = ExtractContext {
                page: self.page,
                pacer: &mut *self.pacer,
                photos: &self.config.photos,
            };
            extract_detail(&mut ctx)
        } else {
            DetailFields::default()
        };

        let current_url = if opened {
            self.page.current_url().unwrap_or_default()
        } else {
            String::new()
        };
        let profile = self.profile_for(opened, &card);

        let name = if detail.name.trim().is_empty() { card.name.as_str() } else { detail.name.as_str() };
        let id = profile.id.clone().unwrap_or_default();
        if self.ledger.seen(&id, name, self.location) {
            info!("Skipping duplicate (CID/name-city): {} | {}", name, profile.url);
            return Ok(CardOutcome::Duplicate);
        }

        let slug_url = if slug_text(&current_url).is_empty() { card.profile_url.as_str() } else { current_url.as_str() };
        let flag = name_url_flag(&detail.name, slug_url, self.config.harvest.name_url_similarity_threshold);
        if flag == NameUrlFlag::WeakMatch {
            warn!("Name/URL mismatch: '{}' vs slug '{}'", detail.name.trim(), slug_text(slug_url));
        }

        let place = Place::from_parts(&self.report.category, self.location, card, detail, profile.url, flag);
        self.sink.append(&place).map_err(CardFault::Sink)?;
        self.ledger.record(&id, &place.name, self.location);
        info!(
            "[{} {}/{}] Saved: {} | {}",
            self.report.category,
            self.report.written + 1,
            self.config.harvest.max_places,
            place.name,
            place.profile_url
        );
        Ok(CardOutcome::Written)
    }

    /// Profile from the open pane, else from the card's own link.
    fn profile_for(&self, opened: bool, card: &CardFields) -> ProfileRef {
        let profile = if opened {
            canonical_profile(self.page, &self.config.search.base_url)
        } else {
            ProfileRef::default()
        };
        if !profile.url.is_empty() || card.profile_url.trim().is_empty() {
            return profile;
        }
        ProfileRef {
            url: canonicalize(&card.profile_url),
            id: extract_cid_from_url(&card.profile_url),
        }
    }
}
